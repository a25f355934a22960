//! Storage collaborator: where source bytes live and where previews go.

use crate::error::StorageError;
use crate::preview::uri_path;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};

/// The path component of `storage_uri`, safe to join under a root.
///
/// `.` segments are dropped. The result is never empty and never absolute.
///
/// # Errors
///
/// Returns `StorageError::Unresolvable` when the URI has no path and
/// `StorageError::EscapesRoot` when a segment is `..`, a root or a prefix.
pub fn relative_uri_path(storage_uri: &str) -> Result<PathBuf, StorageError> {
    let mut clean = PathBuf::new();
    for component in Path::new(uri_path(storage_uri)).components() {
        match component {
            Component::Normal(part) => clean.push(part),
            Component::CurDir => {}
            Component::ParentDir | Component::RootDir | Component::Prefix(_) => {
                return Err(StorageError::EscapesRoot {
                    uri: storage_uri.to_owned(),
                });
            }
        }
    }
    if clean.as_os_str().is_empty() {
        return Err(StorageError::Unresolvable {
            uri: storage_uri.to_owned(),
        });
    }
    Ok(clean)
}

/// A datafile as the host records it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatafileRecord {
    pub id: u64,
    pub filename: String,
    pub size: u64,
    /// Storage locator, e.g. `file://store/exp1/cells.lif` or `exp1/cells.lif`.
    pub uri: String,
}

/// Resolves records to filesystem locations.
pub trait StorageResolver: Send + Sync {
    /// Absolute path of the source bytes.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Unresolvable` when the record cannot be mapped to a path.
    fn absolute_path(&self, record: &DatafileRecord) -> Result<PathBuf, StorageError>;

    /// Root directory under which derived artifacts are written.
    fn metadata_root(&self) -> PathBuf;
}

/// Files under a local data root, previews under a local metadata root.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalStorage {
    pub data_root: PathBuf,
    pub metadata_root: PathBuf,
}

impl LocalStorage {
    #[must_use]
    pub fn new(data_root: impl Into<PathBuf>, metadata_root: impl Into<PathBuf>) -> Self {
        Self {
            data_root: data_root.into(),
            metadata_root: metadata_root.into(),
        }
    }
}

impl StorageResolver for LocalStorage {
    fn absolute_path(&self, record: &DatafileRecord) -> Result<PathBuf, StorageError> {
        Ok(self.data_root.join(relative_uri_path(&record.uri)?))
    }

    fn metadata_root(&self) -> PathBuf {
        self.metadata_root.clone()
    }
}
