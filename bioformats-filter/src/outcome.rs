//! Results reported by the orchestrator. None of these are errors.

use crate::types::{ParameterSetId, TypedParameter};
use serde::Serialize;
use std::fmt;

/// Why a request was not processed at all.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum Ineligibility {
    UnsupportedExtension { extension: String },
    TooLarge { size_bytes: u64, limit: u64 },
}

impl fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedExtension { extension } => {
                write!(f, "unsupported extension {extension:?}")
            }
            Self::TooLarge { size_bytes, limit } => {
                write!(f, "{size_bytes} bytes exceeds the {limit} byte limit")
            }
        }
    }
}

/// Outcome of one sub-operation (metadata or preview).
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SubOutcome {
    /// A new set was created holding `parameters`.
    Succeeded {
        set: ParameterSetId,
        parameters: Vec<TypedParameter>,
    },
    /// A set already existed; nothing was run.
    AlreadyProcessed { set: ParameterSetId },
    /// Another run holds the lock.
    LockBusy,
    /// Not applicable to this file.
    Skipped,
    /// Every value was filtered out; no set was created.
    NothingToSave,
    /// A tool or collaborator failed; nothing was persisted.
    Failed { reason: String },
}

impl SubOutcome {
    #[must_use]
    pub const fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded { .. })
    }

    /// Set id for `Succeeded` and `AlreadyProcessed`.
    #[must_use]
    pub const fn set(&self) -> Option<ParameterSetId> {
        match self {
            Self::Succeeded { set, .. } | Self::AlreadyProcessed { set } => Some(*set),
            _ => None,
        }
    }

    /// Short label for logs.
    #[must_use]
    pub const fn label(&self) -> &'static str {
        match self {
            Self::Succeeded { .. } => "succeeded",
            Self::AlreadyProcessed { .. } => "already_processed",
            Self::LockBusy => "lock_busy",
            Self::Skipped => "skipped",
            Self::NothingToSave => "nothing_to_save",
            Self::Failed { .. } => "failed",
        }
    }
}

/// Outcome of a whole extraction request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ExtractionOutcome {
    Ineligible {
        reason: Ineligibility,
    },
    Processed {
        metadata: SubOutcome,
        preview: SubOutcome,
    },
}

impl ExtractionOutcome {
    /// `(metadata, preview)` when the request was eligible.
    #[must_use]
    pub const fn sub_outcomes(&self) -> Option<(&SubOutcome, &SubOutcome)> {
        match self {
            Self::Processed { metadata, preview } => Some((metadata, preview)),
            Self::Ineligible { .. } => None,
        }
    }
}
