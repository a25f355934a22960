//! Runs one extraction request end to end.
//!
//! Each request is checked for eligibility, then the metadata and preview
//! sub-operations run concurrently. Each sub-operation is independently
//! guarded: existence check, lock, work, persist, release. Failures are
//! logged and reported as [`SubOutcome::Failed`]; nothing is ever raised to
//! the caller.

use crate::classify::{build_parameters, values_for};
use crate::config::{ExistenceCheck, ExtractionConfig, PreviewStorage};
use crate::error::{FilterError, StoreError};
use crate::lock::{LockManager, LockStore};
use crate::outcome::{ExtractionOutcome, Ineligibility, SubOutcome};
use crate::parser::parse_info;
use crate::preview::{preview_file_name, preview_relative_path, PreviewPipeline};
use crate::request::ExtractionRequest;
use crate::store::ParameterStore;
use crate::types::{
    MetadataDump, Operation, RawValue, Schema, TypedParameter, IMAGE_INFORMATION, PREVIEW_IMAGE,
};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use bftools_adapter::BfTools;
use std::path::PathBuf;
use std::sync::Arc;

/// Drives the tools and the collaborators for extraction requests.
pub struct ExtractionOrchestrator {
    tools: BfTools,
    store: Arc<dyn ParameterStore>,
    locks: LockManager,
    metadata_root: PathBuf,
    config: ExtractionConfig,
}

impl std::fmt::Debug for ExtractionOrchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExtractionOrchestrator")
            .field("tools", &self.tools)
            .field("locks", &self.locks)
            .field("metadata_root", &self.metadata_root)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl ExtractionOrchestrator {
    /// Creates an orchestrator with the default configuration.
    #[must_use]
    pub fn new(
        tools: BfTools,
        store: Arc<dyn ParameterStore>,
        locks: Arc<dyn LockStore>,
        metadata_root: impl Into<PathBuf>,
    ) -> Self {
        Self {
            tools,
            store,
            locks: LockManager::new(locks),
            metadata_root: metadata_root.into(),
            config: ExtractionConfig::default(),
        }
    }

    /// Replaces the configuration, applying its lock TTL and tool timeout.
    #[must_use]
    pub fn with_config(mut self, config: ExtractionConfig) -> Self {
        self.tools = self.tools.with_timeout(config.tool_timeout());
        self.locks = self.locks.with_ttl(config.lock_ttl());
        self.config = config;
        self
    }

    #[must_use]
    pub const fn config(&self) -> &ExtractionConfig {
        &self.config
    }

    #[must_use]
    pub const fn tools(&self) -> &BfTools {
        &self.tools
    }

    /// Extension and size checks. Touches neither tools nor locks.
    ///
    /// # Errors
    ///
    /// Returns the first [`Ineligibility`] found.
    pub fn check_eligibility(&self, request: &ExtractionRequest) -> Result<(), Ineligibility> {
        if !self.config.supports(&request.extension) {
            return Err(Ineligibility::UnsupportedExtension {
                extension: request.extension.clone(),
            });
        }
        if request.size_bytes > self.config.max_file_size {
            return Err(Ineligibility::TooLarge {
                size_bytes: request.size_bytes,
                limit: self.config.max_file_size,
            });
        }
        Ok(())
    }

    /// Extracts metadata and, unless excluded for this extension, a preview.
    pub async fn extract(&self, request: &ExtractionRequest) -> ExtractionOutcome {
        if let Err(reason) = self.check_eligibility(request) {
            tracing::debug!(file_id = request.file_id, %reason, "not eligible");
            return ExtractionOutcome::Ineligible { reason };
        }

        let (metadata, preview) = tokio::join!(
            self.guarded(request, Operation::Metadata),
            self.preview_if_applicable(request),
        );
        ExtractionOutcome::Processed { metadata, preview }
    }

    async fn preview_if_applicable(&self, request: &ExtractionRequest) -> SubOutcome {
        if self.config.previews(&request.extension) {
            self.guarded(request, Operation::Preview).await
        } else {
            tracing::debug!(
                file_id = request.file_id,
                extension = %request.extension,
                "preview excluded for extension"
            );
            SubOutcome::Skipped
        }
    }

    #[tracing::instrument(skip_all, fields(file_id = request.file_id, operation = %operation))]
    async fn guarded(&self, request: &ExtractionRequest, operation: Operation) -> SubOutcome {
        let outcome = match self.try_guarded(request, operation).await {
            Ok(outcome) => outcome,
            Err(e) if e.is_tool_failure() => {
                tracing::warn!(filename = %request.filename, error = %e, "external tool failed");
                SubOutcome::Failed {
                    reason: e.to_string(),
                }
            }
            Err(e) => {
                tracing::error!(
                    filename = %request.filename,
                    path = %request.path.display(),
                    error = %e,
                    "extraction failed"
                );
                SubOutcome::Failed {
                    reason: e.to_string(),
                }
            }
        };
        tracing::info!(outcome = outcome.label(), "sub-operation finished");
        outcome
    }

    async fn try_guarded(
        &self,
        request: &ExtractionRequest,
        operation: Operation,
    ) -> Result<SubOutcome, FilterError> {
        let schema = self.config.schema_for(operation);
        if let Some(set) = self.store.find_parameter_set(schema, request.file_id).await? {
            return Ok(SubOutcome::AlreadyProcessed { set });
        }

        if !self.locks.try_acquire(request.file_id, operation).await? {
            tracing::warn!("another run holds the lock, skipping");
            return Ok(SubOutcome::LockBusy);
        }

        let result = self.locked(request, operation, schema).await;

        if let Err(e) = self.locks.release(request.file_id, operation).await {
            tracing::warn!(error = %e, "lock release failed, left to expire");
        }
        result
    }

    async fn locked(
        &self,
        request: &ExtractionRequest,
        operation: Operation,
        schema: &Schema,
    ) -> Result<SubOutcome, FilterError> {
        if self.config.existence_check == ExistenceCheck::InsideLock {
            if let Some(set) = self.store.find_parameter_set(schema, request.file_id).await? {
                return Ok(SubOutcome::AlreadyProcessed { set });
            }
        }

        let dump = match operation {
            Operation::Metadata => self.collect_metadata(request).await?,
            Operation::Preview => self.collect_preview(request).await?,
        };
        self.save(request.file_id, schema, &dump).await
    }

    async fn collect_metadata(&self, request: &ExtractionRequest) -> Result<MetadataDump, FilterError> {
        let report = self.tools.dump_metadata(&request.path).await?;
        let lines = parse_info(&report.combined);

        let mut dump = MetadataDump::new();
        if !lines.is_empty() {
            dump.insert(IMAGE_INFORMATION, RawValue::Lines(lines));
        }
        Ok(dump)
    }

    async fn collect_preview(&self, request: &ExtractionRequest) -> Result<MetadataDump, FilterError> {
        let extension = &self.config.preview_extension;
        let pipeline = PreviewPipeline::new(&self.tools);

        let value = match self.config.preview_storage {
            PreviewStorage::File => {
                let relative = preview_relative_path(
                    &request.storage_uri,
                    request.file_id,
                    &request.path,
                    extension,
                )?;
                let destination = self.metadata_root.join(&relative);
                pipeline.build_preview(&request.path, &destination).await?;
                relative.to_string_lossy().into_owned()
            }
            PreviewStorage::Inline => {
                let scratch = tempfile::Builder::new()
                    .prefix("bioformats-preview-")
                    .tempdir()
                    .map_err(|source| FilterError::Io {
                        path: std::env::temp_dir(),
                        source,
                    })?;
                let destination = scratch.path().join(preview_file_name(&request.path, extension));
                pipeline.build_preview(&request.path, &destination).await?;
                let bytes = tokio::fs::read(&destination)
                    .await
                    .map_err(|source| FilterError::Io {
                        path: destination.clone(),
                        source,
                    })?;
                STANDARD.encode(bytes)
            }
        };

        let mut dump = MetadataDump::new();
        dump.insert(PREVIEW_IMAGE, RawValue::Text(value));
        Ok(dump)
    }

    async fn save(
        &self,
        file_id: u64,
        schema: &Schema,
        dump: &MetadataDump,
    ) -> Result<SubOutcome, FilterError> {
        let registry = self.store.parameter_names(schema).await?;
        let planned = build_parameters(
            dump,
            &registry,
            &self.config.tag_filter,
            &self.config.noise_lines,
        );
        if planned.is_empty() {
            return Ok(SubOutcome::NothingToSave);
        }

        let set = match self.store.create_parameter_set(schema, file_id).await {
            Ok(set) => set,
            Err(StoreError::Duplicate { existing, .. }) => {
                tracing::warn!(set = %existing, "set created concurrently, discarding this run");
                return Ok(SubOutcome::AlreadyProcessed { set: existing });
            }
            Err(e) => return Err(e.into()),
        };

        let mut parameters = Vec::new();
        for param in planned {
            if param.is_new {
                tracing::debug!(name = %param.name, kind = ?param.kind, "registering parameter name");
            }
            let descriptor = self
                .store
                .ensure_parameter_name(schema, &param.name, param.kind)
                .await?;
            let values = if descriptor.kind == param.kind {
                param.values
            } else {
                // registered concurrently under the other kind
                tracing::warn!(
                    name = %param.name,
                    planned = ?param.kind,
                    registered = ?descriptor.kind,
                    "parameter kind changed since planning, re-deriving values"
                );
                dump.get(&param.name).map_or_else(Vec::new, |raw| {
                    values_for(&param.name, descriptor.kind, raw, &self.config.noise_lines)
                })
            };
            for value in values {
                self.store
                    .append_parameter(set, &descriptor, value.clone())
                    .await?;
                parameters.push(TypedParameter {
                    name: descriptor.name.clone(),
                    kind: descriptor.kind,
                    value,
                });
            }
        }
        Ok(SubOutcome::Succeeded { set, parameters })
    }
}
