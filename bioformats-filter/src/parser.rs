//! Turns a raw `showinf` report into ordered informational lines.
//!
//! Two independent steps:
//!
//! - [`parse_info`] drops the fixed banner `showinf` prints before every report.
//!   That is a property of the tool's output format.
//! - [`NoiseFilter`] removes progress/status lines by content when values are
//!   persisted. The set of noise lines is configuration, since it depends on
//!   the Bio-Formats version in use.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Number of banner lines `showinf` prints before the report.
pub const BANNER_LINES: usize = 11;

/// Status lines known to be printed by `showinf` while reading a file.
pub const DEFAULT_NOISE_LINES: [&str; 9] = [
    "-----",
    "Reading global metadata",
    "Reading metadata",
    "Reading core metadata",
    "Populating metadata",
    "Reading tags",
    "Verifying Gatan format",
    "Initializing reader",
    "Checking file format [Gatan Digital Micrograph]",
];

/// Splits `raw` on newlines and drops the banner. Remaining lines are kept
/// verbatim, blank lines included, in output order.
#[must_use]
pub fn parse_info(raw: &str) -> Vec<String> {
    raw.split('\n')
        .skip(BANNER_LINES)
        .map(str::to_owned)
        .collect()
}

/// Literal lines that are never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NoiseFilter {
    lines: BTreeSet<String>,
}

impl Default for NoiseFilter {
    fn default() -> Self {
        DEFAULT_NOISE_LINES.iter().copied().collect()
    }
}

impl<S: Into<String>> FromIterator<S> for NoiseFilter {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        Self {
            lines: iter.into_iter().map(Into::into).collect(),
        }
    }
}

impl NoiseFilter {
    /// A filter that only drops blank lines.
    #[must_use]
    pub fn none() -> Self {
        Self {
            lines: BTreeSet::new(),
        }
    }

    /// `true` if the trimmed line is one of the configured noise lines.
    #[must_use]
    pub fn is_noise(&self, line: &str) -> bool {
        self.lines.contains(line.trim())
    }

    /// Trimmed, non-empty, non-noise lines in their original relative order.
    #[must_use]
    pub fn informational(&self, lines: &[String]) -> Vec<String> {
        lines
            .iter()
            .map(|line| line.trim())
            .filter(|line| !line.is_empty() && !self.is_noise(line))
            .map(str::to_owned)
            .collect()
    }
}
