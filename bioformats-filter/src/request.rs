use crate::error::StorageError;
use crate::storage::{DatafileRecord, StorageResolver};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One file to extract from. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtractionRequest {
    pub file_id: u64,
    pub filename: String,
    /// Lowercased text after the last `.` of `filename`; empty when there is none.
    pub extension: String,
    pub size_bytes: u64,
    /// Absolute path of the source bytes.
    pub path: PathBuf,
    pub storage_uri: String,
}

impl ExtractionRequest {
    #[must_use]
    pub fn new(
        file_id: u64,
        filename: impl Into<String>,
        size_bytes: u64,
        path: impl Into<PathBuf>,
        storage_uri: impl Into<String>,
    ) -> Self {
        let filename = filename.into();
        Self {
            file_id,
            extension: extension_of(&filename),
            filename,
            size_bytes,
            path: path.into(),
            storage_uri: storage_uri.into(),
        }
    }

    /// Builds a request from a host record, resolving the source path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError` when the resolver cannot locate the file.
    pub fn from_record(
        record: &DatafileRecord,
        storage: &dyn StorageResolver,
    ) -> Result<Self, StorageError> {
        Ok(Self::new(
            record.id,
            record.filename.clone(),
            record.size,
            storage.absolute_path(record)?,
            record.uri.clone(),
        ))
    }
}

fn extension_of(filename: &str) -> String {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}
