//! Metadata and preview extraction for microscope image files.
//!
//! The [`ExtractionOrchestrator`] takes an [`ExtractionRequest`], runs
//! `showinf` for the metadata report and `bfconvert` + `convert` for the
//! preview, and persists the results as typed parameters through a
//! [`ParameterStore`]. Concurrent runs on the same file are serialized by
//! advisory locks held in a [`LockStore`].

/// Value classification and the parameter plan.
pub mod classify;
/// Extraction configuration.
pub mod config;
/// Error types.
pub mod error;
/// Per-file, per-operation advisory locks.
pub mod lock;
/// Request processing.
pub mod orchestrator;
/// Reported results.
pub mod outcome;
/// `showinf` report parsing and noise filtering.
pub mod parser;
/// Preview path derivation and the preview build pipeline.
pub mod preview;
/// Extraction requests.
pub mod request;
/// Source file and artifact locations.
pub mod storage;
/// Parameter set persistence.
pub mod store;
/// Shared data model.
pub mod types;

pub use config::{ExistenceCheck, ExtractionConfig, PreviewStorage};
pub use error::FilterError;
pub use lock::{LockManager, LockStore, MemoryLockStore};
pub use orchestrator::ExtractionOrchestrator;
pub use outcome::{ExtractionOutcome, Ineligibility, SubOutcome};
pub use request::ExtractionRequest;
pub use storage::{DatafileRecord, LocalStorage, StorageResolver};
pub use store::{MemoryParameterStore, ParameterStore};

/// Common types for wiring an orchestrator.
pub mod prelude {
    pub use crate::classify::TagFilter;
    pub use crate::parser::NoiseFilter;
    pub use crate::types::{Operation, ParameterKind, ParameterValue, Schema};
    pub use crate::{
        ExtractionConfig, ExtractionOrchestrator, ExtractionOutcome, ExtractionRequest,
        LocalStorage, MemoryLockStore, MemoryParameterStore, SubOutcome,
    };
    pub use bftools_adapter::{BfTools, ToolPathOverrides};
}
