//! Worker configuration, loaded from a TOML file.
//!
//! ```toml
//! data_root = "/srv/store"
//! metadata_root = "/srv/metadata"
//!
//! [tools]
//! showinf = "/opt/bftools/showinf"
//!
//! [extraction]
//! preview_storage = "file"
//! tool_timeout_secs = 600
//!
//! [extraction.tag_filter]
//! exclude = ["previewImage"]
//!
//! [dispatch]
//! concurrency = 8
//! ```

use crate::dispatch::DispatchConfig;
use crate::error::WorkerError;
use bftools_adapter::ToolPathOverrides;
use bioformats_filter::{ExtractionConfig, LocalStorage};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything the host needs to wire an orchestrator and a dispatcher.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerConfig {
    pub tools: ToolPathOverrides,
    pub extraction: ExtractionConfig,
    pub dispatch: DispatchConfig,
    /// Root that storage URIs are resolved against (default: `.`).
    pub data_root: PathBuf,
    /// Root under which previews are written (default: `./metadata`).
    pub metadata_root: PathBuf,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            tools: ToolPathOverrides::default(),
            extraction: ExtractionConfig::default(),
            dispatch: DispatchConfig::default(),
            data_root: PathBuf::from("."),
            metadata_root: PathBuf::from("metadata"),
        }
    }
}

impl WorkerConfig {
    /// Reads and parses a TOML file. Missing keys keep their defaults.
    ///
    /// # Errors
    ///
    /// Returns `WorkerError::ConfigRead` or `WorkerError::ConfigParse`.
    pub fn load(path: &Path) -> Result<Self, WorkerError> {
        let text = std::fs::read_to_string(path).map_err(|source| WorkerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| WorkerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })
    }

    #[must_use]
    pub fn storage(&self) -> LocalStorage {
        LocalStorage::new(self.data_root.clone(), self.metadata_root.clone())
    }
}
