use bftools_adapter::ToolError;
use std::path::PathBuf;
use thiserror::Error;

/// Errors relating to the worker host.
#[derive(Debug, Error)]
pub enum WorkerError {
    /// The configuration file could not be read.
    #[error("Could not read config {}: {source}", path.display())]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for [`crate::WorkerConfig`].
    #[error("Invalid config {}: {source}", path.display())]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    /// Tool discovery or health check failed.
    #[error("Tool error: {0}")]
    Tool(#[from] ToolError),

    /// The worker pool no longer accepts work.
    #[error("Dispatch queue {0} is closed")]
    Closed(String),
}
