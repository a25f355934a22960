//! Preview path derivation and the three-stage preview build.
//!
//! 1. `bfconvert` writes the first plane to the destination.
//! 2. The plane is renamed to `<destination>.raw` so an interrupted run never
//!    leaves an unstretched file under the final name.
//! 3. `convert` contrast-stretches the intermediate back to the destination.
//!
//! A failure at any stage stops the pipeline. The intermediate is removed on
//! every path and the destination is removed on failure.

use crate::error::{PreviewError, PreviewStage, StorageError};
use crate::storage::relative_uri_path;
use bftools_adapter::BfTools;
use std::ffi::OsString;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Suffix appended to the destination for the pre-stretch plane.
pub const INTERMEDIATE_SUFFIX: &str = "raw";

/// Path component of a storage URI, relative to the storage root.
///
/// Drops `scheme://authority`, any `?query` or `#fragment`, and leading
/// slashes. A bare path is returned unchanged apart from the leading slashes.
#[must_use]
pub fn uri_path(storage_uri: &str) -> &str {
    let without_scheme = storage_uri.split_once("://").map_or(storage_uri, |(_, rest)| {
        rest.find('/').map_or("", |slash| &rest[slash..])
    });
    let end = without_scheme
        .find(['?', '#'])
        .unwrap_or(without_scheme.len());
    without_scheme[..end].trim_start_matches('/')
}

/// `<basename(source)>.<extension>`, e.g. `cells.lif.png`.
#[must_use]
pub fn preview_file_name(source: &Path, extension: &str) -> OsString {
    let mut name = source
        .file_name()
        .map_or_else(OsString::new, ToOwned::to_owned);
    name.push(".");
    name.push(extension);
    name
}

/// Location of a file's preview, relative to the metadata root:
/// `dirname(uri path) / file_id / <basename(source)>.<extension>`.
///
/// Pure: identical inputs always give an identical path.
///
/// # Errors
///
/// Fails when the URI has no path or its path would leave the root it is
/// joined to (see [`relative_uri_path`]).
pub fn preview_relative_path(
    storage_uri: &str,
    file_id: u64,
    source: &Path,
    extension: &str,
) -> Result<PathBuf, StorageError> {
    let uri = relative_uri_path(storage_uri)?;
    let uri_dir = uri.parent().unwrap_or_else(|| Path::new(""));
    Ok(uri_dir
        .join(file_id.to_string())
        .join(preview_file_name(source, extension)))
}

/// `<destination>.raw`
#[must_use]
pub fn intermediate_path(destination: &Path) -> PathBuf {
    let mut path = destination.as_os_str().to_owned();
    path.push(".");
    path.push(INTERMEDIATE_SUFFIX);
    PathBuf::from(path)
}

/// Files produced by a successful preview build.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreviewArtifact {
    /// The contrast-stretched preview.
    pub destination: PathBuf,
    /// The pre-stretch plane; already deleted when the artifact is returned.
    pub intermediate: PathBuf,
}

/// Runs the preview stages through a [`BfTools`] client.
#[derive(Debug, Clone, Copy)]
pub struct PreviewPipeline<'a> {
    tools: &'a BfTools,
}

impl<'a> PreviewPipeline<'a> {
    #[must_use]
    pub const fn new(tools: &'a BfTools) -> Self {
        Self { tools }
    }

    /// Builds the preview of `source` at `destination`, creating the parent
    /// directory when needed.
    ///
    /// # Errors
    ///
    /// Returns the error of the first stage that failed. Nothing is left at
    /// `destination` in that case.
    pub async fn build_preview(
        &self,
        source: &Path,
        destination: &Path,
    ) -> Result<PreviewArtifact, PreviewError> {
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| PreviewError::CreateDir {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }

        let intermediate = intermediate_path(destination);
        let result = self.run_stages(source, destination, &intermediate).await;

        remove_if_present(&intermediate).await;
        if let Err(e) = &result {
            tracing::warn!(
                source = %source.display(),
                stage = ?e.stage(),
                error = %e,
                "preview build failed"
            );
            remove_if_present(destination).await;
        }

        result.map(|()| PreviewArtifact {
            destination: destination.to_path_buf(),
            intermediate,
        })
    }

    async fn run_stages(
        &self,
        source: &Path,
        destination: &Path,
        intermediate: &Path,
    ) -> Result<(), PreviewError> {
        self.tools
            .extract_plane(source, destination)
            .await
            .map_err(|source| PreviewError::Tool {
                stage: PreviewStage::ExtractPlane,
                source,
            })?;

        tokio::fs::rename(destination, intermediate)
            .await
            .map_err(|source| PreviewError::Io {
                stage: PreviewStage::Rename,
                path: destination.to_path_buf(),
                source,
            })?;

        self.tools
            .contrast_stretch(intermediate, destination)
            .await
            .map_err(|source| PreviewError::Tool {
                stage: PreviewStage::ContrastStretch,
                source,
            })?;

        Ok(())
    }
}

async fn remove_if_present(path: &Path) {
    match tokio::fs::remove_file(path).await {
        Ok(()) => tracing::debug!(path = %path.display(), "removed"),
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => tracing::warn!(path = %path.display(), error = %e, "could not remove file"),
    }
}
