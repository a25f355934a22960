//! Configuration for eligibility, filtering, locking and preview storage.

use crate::classify::TagFilter;
use crate::lock::DEFAULT_LOCK_TTL;
use crate::parser::NoiseFilter;
use crate::types::{Operation, Schema};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Files larger than this are never processed (1 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1024 * 1024 * 1024;

/// Extensions the Bio-Formats tools are run against.
pub const DEFAULT_SUPPORTED_EXTENSIONS: [&str; 7] = ["dm3", "ims", "jp2", "lif", "nd2", "tif", "vsi"];

/// How the preview is recorded in its parameter set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PreviewStorage {
    /// Write under the metadata root and store the relative path.
    #[default]
    File,
    /// Render into a per-run temporary directory and store the base64-encoded image.
    Inline,
}

/// Where the "already processed" check runs relative to the lock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExistenceCheck {
    /// Only before acquiring. Two near-simultaneous runs may both do the work;
    /// the later one finds the set on save and discards its values.
    OutsideLock,
    /// Before acquiring and again once the lock is held.
    #[default]
    InsideLock,
}

/// Configuration for one [`crate::ExtractionOrchestrator`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Schema receiving the `image_information` lines.
    pub metadata_schema: Schema,
    /// Schema receiving the `previewImage` value.
    pub preview_schema: Schema,
    pub tag_filter: TagFilter,
    /// Lines never persisted (default: the known `showinf` status lines).
    pub noise_lines: NoiseFilter,
    /// Lowercase extensions that are processed at all.
    pub supported_extensions: BTreeSet<String>,
    /// Extensions previewed by other means (default: `tif`).
    pub preview_excluded_extensions: BTreeSet<String>,
    /// Size ceiling in bytes (default: 1 GiB).
    pub max_file_size: u64,
    /// Lock lifetime in seconds (default: 300, minimum: 1).
    pub lock_ttl_secs: u64,
    /// Image format written by `bfconvert` (default: `png`).
    pub preview_extension: String,
    pub preview_storage: PreviewStorage,
    pub existence_check: ExistenceCheck,
    /// Per-tool timeout in seconds (default: none, minimum: 1).
    pub tool_timeout_secs: Option<u64>,
}

/// Whole seconds, rounded up so a sub-second duration never becomes zero.
const fn ceil_secs(duration: Duration) -> u64 {
    if duration.subsec_nanos() > 0 {
        duration.as_secs().saturating_add(1)
    } else {
        duration.as_secs()
    }
}

const fn at_least_one_sec(secs: u64) -> Duration {
    Duration::from_secs(if secs == 0 { 1 } else { secs })
}

fn lowercase_set<'a>(items: impl IntoIterator<Item = &'a str>) -> BTreeSet<String> {
    items.into_iter().map(str::to_ascii_lowercase).collect()
}

impl Default for ExtractionConfig {
    fn default() -> Self {
        Self {
            metadata_schema: Schema::new("http://bioformats.local/schemas/metadata/1", "bioformats"),
            preview_schema: Schema::new("http://bioformats.local/schemas/preview/1", "bioformats preview"),
            tag_filter: TagFilter::default(),
            noise_lines: NoiseFilter::default(),
            supported_extensions: lowercase_set(DEFAULT_SUPPORTED_EXTENSIONS),
            preview_excluded_extensions: lowercase_set(["tif"]),
            max_file_size: DEFAULT_MAX_FILE_SIZE,
            lock_ttl_secs: DEFAULT_LOCK_TTL.as_secs(),
            preview_extension: "png".to_string(),
            preview_storage: PreviewStorage::default(),
            existence_check: ExistenceCheck::default(),
            tool_timeout_secs: None,
        }
    }
}

impl ExtractionConfig {
    #[must_use]
    pub fn with_metadata_schema(mut self, schema: Schema) -> Self {
        self.metadata_schema = schema;
        self
    }

    #[must_use]
    pub fn with_preview_schema(mut self, schema: Schema) -> Self {
        self.preview_schema = schema;
        self
    }

    #[must_use]
    pub fn with_tag_filter(mut self, filter: TagFilter) -> Self {
        self.tag_filter = filter;
        self
    }

    #[must_use]
    pub fn with_noise_lines(mut self, noise: NoiseFilter) -> Self {
        self.noise_lines = noise;
        self
    }

    #[must_use]
    pub const fn with_max_file_size(mut self, bytes: u64) -> Self {
        self.max_file_size = bytes;
        self
    }

    /// Sub-second parts round up to the next second.
    #[must_use]
    pub const fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl_secs = ceil_secs(ttl);
        self
    }

    #[must_use]
    pub const fn with_preview_storage(mut self, storage: PreviewStorage) -> Self {
        self.preview_storage = storage;
        self
    }

    #[must_use]
    pub const fn with_existence_check(mut self, check: ExistenceCheck) -> Self {
        self.existence_check = check;
        self
    }

    /// Sub-second parts round up to the next second.
    #[must_use]
    pub const fn with_tool_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.tool_timeout_secs = match timeout {
            Some(t) => Some(ceil_secs(t)),
            None => None,
        };
        self
    }

    #[must_use]
    pub const fn lock_ttl(&self) -> Duration {
        at_least_one_sec(self.lock_ttl_secs)
    }

    #[must_use]
    pub fn tool_timeout(&self) -> Option<Duration> {
        self.tool_timeout_secs.map(at_least_one_sec)
    }

    #[must_use]
    pub const fn schema_for(&self, operation: Operation) -> &Schema {
        match operation {
            Operation::Metadata => &self.metadata_schema,
            Operation::Preview => &self.preview_schema,
        }
    }

    /// Case-insensitive membership in `supported_extensions`.
    #[must_use]
    pub fn supports(&self, extension: &str) -> bool {
        self.supported_extensions
            .contains(&extension.to_ascii_lowercase())
    }

    /// `false` for extensions in `preview_excluded_extensions`.
    #[must_use]
    pub fn previews(&self, extension: &str) -> bool {
        !self
            .preview_excluded_extensions
            .contains(&extension.to_ascii_lowercase())
    }
}
