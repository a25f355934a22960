//! Shared data types for tool configuration, invocations and results.

use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

/// The external binaries this adapter drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ToolKind {
    /// Bio-Formats `showinf`, dumps the metadata report.
    Showinf,
    /// Bio-Formats `bfconvert`, converts a single plane to a raster image.
    Bfconvert,
    /// ImageMagick `convert`, used for the contrast stretch.
    Convert,
}

impl ToolKind {
    /// File name of the executable looked up on `$PATH`.
    #[must_use]
    pub const fn binary_name(self) -> &'static str {
        match self {
            Self::Showinf => "showinf",
            Self::Bfconvert => "bfconvert",
            Self::Convert => "convert",
        }
    }

    /// Environment variable that overrides the binary location.
    #[must_use]
    pub const fn env_var(self) -> &'static str {
        match self {
            Self::Showinf => "BFTOOLS_SHOWINF_BIN",
            Self::Bfconvert => "BFTOOLS_BFCONVERT_BIN",
            Self::Convert => "BFTOOLS_CONVERT_BIN",
        }
    }

    /// Installation hint shown when discovery fails.
    #[must_use]
    pub const fn install_hint(self) -> &'static str {
        match self {
            Self::Showinf | Self::Bfconvert => {
                "Install bftools from https://www.openmicroscopy.org/bio-formats/downloads/"
            }
            Self::Convert => "Install ImageMagick (e.g. apt install imagemagick)",
        }
    }
}

impl fmt::Display for ToolKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.binary_name())
    }
}

/// Explicit binary locations; `None` falls back to discovery.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolPathOverrides {
    pub showinf: Option<PathBuf>,
    pub bfconvert: Option<PathBuf>,
    pub convert: Option<PathBuf>,
}

impl ToolPathOverrides {
    #[must_use]
    pub fn get(&self, kind: ToolKind) -> Option<PathBuf> {
        match kind {
            ToolKind::Showinf => self.showinf.clone(),
            ToolKind::Bfconvert => self.bfconvert.clone(),
            ToolKind::Convert => self.convert.clone(),
        }
    }
}

/// Resolved binary locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolPaths {
    /// Bio-Formats metadata dumper.
    pub showinf: PathBuf,
    /// Bio-Formats format converter.
    pub bfconvert: PathBuf,
    /// ImageMagick `convert`.
    pub convert: PathBuf,
}

impl ToolPaths {
    #[must_use]
    pub const fn get(&self, kind: ToolKind) -> &PathBuf {
        match kind {
            ToolKind::Showinf => &self.showinf,
            ToolKind::Bfconvert => &self.bfconvert,
            ToolKind::Convert => &self.convert,
        }
    }
}

/// A single structured (non-shell) command execution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolInvocation {
    /// Which tool this invocation runs, used for logging and error stages.
    pub kind: ToolKind,
    /// Path to the executable.
    pub program: PathBuf,
    /// Arguments passed verbatim, without shell interpretation.
    pub args: Vec<OsString>,
    /// Working directory for the subprocess.
    pub cwd: Option<PathBuf>,
    /// Maximum wall-clock duration. `None` waits indefinitely.
    pub timeout: Option<Duration>,
}

impl ToolInvocation {
    #[must_use]
    pub fn new(kind: ToolKind, program: impl Into<PathBuf>, args: Vec<OsString>) -> Self {
        Self {
            kind,
            program: program.into(),
            args,
            cwd: None,
            timeout: None,
        }
    }

    #[must_use]
    pub const fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_cwd(mut self, cwd: impl Into<PathBuf>) -> Self {
        self.cwd = Some(cwd.into());
        self
    }

    /// Human-readable command line for logs.
    #[must_use]
    pub fn display_command(&self) -> String {
        let mut line = self.program.display().to_string();
        for arg in &self.args {
            line.push(' ');
            line.push_str(&arg.to_string_lossy());
        }
        line
    }
}

/// Result of a completed tool invocation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunResult {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Standard output and standard error merged in arrival order.
    pub combined: String,
    /// Process exit code (`-1` if terminated by a signal).
    pub exit_code: i32,
    /// Wall-clock duration in milliseconds.
    pub duration_ms: u64,
}

impl RunResult {
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Converts a non-zero exit into [`crate::ToolError::NonZeroExit`].
    ///
    /// # Errors
    ///
    /// Returns `ToolError::NonZeroExit` tagged with `stage` when the exit code is not zero.
    pub fn into_success(self, stage: &str) -> Result<Self, crate::ToolError> {
        if self.success() {
            Ok(self)
        } else {
            Err(crate::ToolError::NonZeroExit {
                stage: stage.to_string(),
                exit_code: self.exit_code,
                output: self.combined,
            })
        }
    }
}
