//! Error types for extraction, preview generation and the collaborators.

use crate::types::ParameterSetId;
use bftools_adapter::ToolError;
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

/// Pipeline stages of a preview build.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PreviewStage {
    /// `bfconvert` writing the first plane.
    ExtractPlane,
    /// Moving the plane aside to the intermediate path.
    Rename,
    /// `convert` writing the final image.
    ContrastStretch,
}

impl fmt::Display for PreviewStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::ExtractPlane => "plane extraction",
            Self::Rename => "stage rename",
            Self::ContrastStretch => "contrast stretch",
        })
    }
}

/// Errors from the three-stage preview pipeline.
#[derive(Debug, Error)]
pub enum PreviewError {
    #[error("Preview {stage} failed: {source}")]
    Tool {
        stage: PreviewStage,
        #[source]
        source: ToolError,
    },

    #[error("Preview {stage} failed for {}: {source}", path.display())]
    Io {
        stage: PreviewStage,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Could not create preview directory {}: {source}", path.display())]
    CreateDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PreviewError {
    /// The stage that failed, if the failure happened inside the pipeline.
    #[must_use]
    pub const fn stage(&self) -> Option<PreviewStage> {
        match self {
            Self::Tool { stage, .. } | Self::Io { stage, .. } => Some(*stage),
            Self::CreateDir { .. } => None,
        }
    }
}

/// Errors reported by a [`crate::store::ParameterStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// Values were appended to a set the store does not know.
    #[error("Parameter set {0} does not exist")]
    UnknownSet(ParameterSetId),

    /// The one set allowed per `(schema, file)` already exists.
    #[error("A parameter set for schema {schema} and file {file_id} already exists ({existing})")]
    Duplicate {
        schema: String,
        file_id: u64,
        existing: ParameterSetId,
    },

    /// The backing database failed.
    #[error("Parameter store backend error: {0}")]
    Backend(String),
}

/// Errors reported by a [`crate::lock::LockStore`].
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock store unavailable: {0}")]
    Unavailable(String),
}

/// Errors reported by a [`crate::storage::StorageResolver`].
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Storage URI has no path component: {uri}")]
    Unresolvable { uri: String },

    /// A `..` segment or an absolute component would leave the root.
    #[error("Storage URI path leaves its root: {uri}")]
    EscapesRoot { uri: String },
}

/// Aggregate error for one extraction sub-operation.
#[derive(Debug, Error)]
pub enum FilterError {
    #[error("Tool invocation failed: {0}")]
    Tool(#[from] ToolError),

    #[error(transparent)]
    Preview(#[from] PreviewError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lock(#[from] LockError),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl FilterError {
    /// `true` for failures of the external tools themselves, as opposed to
    /// faults in this process or its collaborators.
    #[must_use]
    pub const fn is_tool_failure(&self) -> bool {
        matches!(
            self,
            Self::Tool(_)
                | Self::Preview(PreviewError::Tool { .. } | PreviewError::Io { .. })
        )
    }
}
