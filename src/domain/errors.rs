//! Error types for the patch engine, layered by concern: path resolution,
//! patch application, proposal gating, port failures, and step execution.

use std::time::Duration;

use thiserror::Error;

use crate::domain::models::pipeline::StepName;

/// Failures while parsing or resolving a target path against a snapshot.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PathError {
    #[error(
        "invalid path syntax: '{0}' (expected 'collection', 'collection[i]', \
         'collection[i].field', or 'collection[i].nested[j]')"
    )]
    InvalidSyntax(String),

    #[error("collection '{collection}' not found in snapshot")]
    UnknownCollection { collection: String },

    #[error("index {index} out of range for '{container}' (length {len})")]
    IndexOutOfRange {
        container: String,
        index: usize,
        len: usize,
    },

    #[error("'{path}' does not address an array")]
    NotAnArray { path: String },

    #[error("'{path}' does not address a record")]
    NotARecord { path: String },

    #[error("field '{field}' not found at '{path}'")]
    UnknownField { path: String, field: String },

    #[error("refusing to delete the entire collection '{collection}'")]
    CannotDeleteCollection { collection: String },
}

pub type PathResult<T> = Result<T, PathError>;

/// Failures while applying a gated correction proposal to a snapshot.
#[derive(Debug, Error)]
pub enum PatchError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error("update_field requires a field-bearing path, got '{0}'")]
    NotAFieldPath(String),

    #[error("{action} requires a bare collection path, got '{path}'")]
    NotACollectionPath { action: String, path: String },

    #[error("new value for add_to_array must be a record")]
    NewValueNotARecord,

    #[error("remove_from_array predicate must be a record of field/value pairs")]
    PredicateNotARecord,

    #[error("no entry in '{collection}' matches the removal predicate")]
    NoMatchingEntry { collection: String },

    #[error("no reference data available for collection '{collection}'")]
    MissingReferenceData { collection: String },
}

pub type PatchResult<T> = Result<T, PatchError>;

/// Failures while admitting an untrusted proposal through the gate.
#[derive(Debug, Error)]
pub enum ProposalError {
    #[error("proposal violates the correction contract: {0}")]
    ContractViolation(String),

    #[error("proposal still invalid after {retries} revision retries: {last_error}")]
    RetriesExhausted { retries: u32, last_error: String },

    #[error("proposer call failed: {0}")]
    ProposerUnavailable(String),

    #[error("artifact storage failed: {0}")]
    Storage(String),
}

pub type ProposalResult<T> = Result<T, ProposalError>;

/// Failures surfaced by the outbound ports (proposer, validation service,
/// document store, artifact storage).
#[derive(Debug, Error)]
pub enum PortError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    #[error("authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    #[error("permanent error: {0}")]
    Permanent(String),

    #[error("transient error: {0}")]
    Transient(String),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("storage error: {0}")]
    Storage(String),
}

impl PortError {
    /// Whether a retry of the same call could plausibly succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Timeout(_) | Self::Transient(_) | Self::Storage(_)
        )
    }
}

impl From<serde_json::Error> for PortError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

pub type PortResult<T> = Result<T, PortError>;

/// Unified error for a single pipeline step, used by the executor to decide
/// between retrying and short-circuiting.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error(transparent)]
    Path(#[from] PathError),

    #[error(transparent)]
    Patch(#[from] PatchError),

    #[error(transparent)]
    Proposal(#[from] ProposalError),

    #[error(transparent)]
    Port(#[from] PortError),

    #[error(
        "required artifact '{required_artifact}' is missing; run the {missing_step} step first"
    )]
    MissingPrerequisite {
        missing_step: StepName,
        required_artifact: String,
    },

    #[error("{0}")]
    Step(String),
}

impl EngineError {
    /// Retry classification for a failed step. Addressing and contract
    /// errors are fatal to the attempt; the terminal conditions a retry
    /// can never fix (missing document, bad credentials, anything flagged
    /// permanent) short-circuit the pipeline.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Port(err) => err.is_retryable(),
            Self::Proposal(ProposalError::ProposerUnavailable(_) | ProposalError::Storage(_)) => {
                true
            }
            Self::Path(_)
            | Self::Patch(_)
            | Self::Proposal(_)
            | Self::MissingPrerequisite { .. } => false,
            Self::Step(message) => !is_terminal_message(message),
        }
    }
}

/// Text fallback for failures that arrive without structure.
fn is_terminal_message(message: &str) -> bool {
    let lower = message.to_lowercase();
    lower.contains("not found")
        || lower.contains("does not exist")
        || lower.contains("authentication failed")
        || lower.contains("client_secret")
        || lower.contains("permanent")
}

pub type EngineResult<T> = Result<T, EngineError>;
