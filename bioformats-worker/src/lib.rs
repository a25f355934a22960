//! Worker host for Bio-Formats extraction: a bounded dispatch pool over a
//! shared [`bioformats_filter::ExtractionOrchestrator`] and its configuration.

/// Worker configuration.
pub mod config;
/// Bounded worker pool.
pub mod dispatch;
/// Error types for the worker.
pub mod error;

pub use config::WorkerConfig;
pub use dispatch::{DispatchConfig, Dispatcher};
pub use error::WorkerError;
