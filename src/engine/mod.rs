//! Sub-models, pipeline loader and the replay executor.

/// Pipeline and per-step form-args loading.
pub mod loader;
/// Per-type sub-models and the registry that dispatches to them.
pub mod models;
/// Sequential replay of a pipeline from an edited step.
pub mod replay;
/// Sub-model trait and submit plumbing.
pub mod traits;

use crate::{
    op::ConcordanceResponse,
    transport::TransportError,
    types::{FormType, RequestId},
};

/// Errors raised while loading, syncing or submitting pipeline steps.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReplayError {
    /// Cached or fetched args declare a different type than the sub-model.
    #[error("form args of type {found} cannot be synced into the {expected} form")]
    SyncTypeMismatch { expected: FormType, found: FormType },

    /// A sort step has no single- or multi-level configuration.
    #[error("no active sort form for operation {op_key}")]
    NoActiveSortModel { op_key: String },

    /// Transport failure during load, fetch or submit.
    #[error("network error: {0}")]
    Network(#[from] TransportError),

    /// The pipeline references an operation type without a handler.
    #[error("unsupported operation type: {0}")]
    UnsupportedOperationType(String),

    /// A sub-model has no form state for the operation it must submit.
    #[error("no form arguments available for operation {op_key}")]
    MissingFormArgs { op_key: String },

    #[error("operation index {idx} out of range (pipeline length {len})")]
    IndexOutOfRange { idx: usize, len: usize },

    /// Locked steps cannot be opened for editing.
    #[error("operation {idx} is locked and cannot be edited")]
    OperationLocked { idx: usize },

    #[error("pipeline is empty")]
    EmptyPipeline,

    /// `submit_new` was called without a draft under the new-operation key.
    #[error("no draft form to submit")]
    MissingDraft,

    #[error("replay request {0} is already running")]
    ReplayInProgress(RequestId),

    /// Malformed server payload.
    #[error("malformed server response: {0}")]
    Decode(String),
}

/// One step that completed before a replay stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletedStep {
    pub idx: usize,
    pub response: ConcordanceResponse,
}

/// Replay abort: the failing step, the steps already completed (kept, not
/// rolled back) and the cause.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("replay failed{}: {error}", .failed_at.map(|i| format!(" at step {i}")).unwrap_or_default())]
pub struct ReplayFailure {
    pub failed_at: Option<usize>,
    pub completed: Vec<CompletedStep>,
    #[source]
    pub error: ReplayError,
}

impl From<ReplayError> for ReplayFailure {
    fn from(error: ReplayError) -> Self {
        Self {
            failed_at: None,
            completed: Vec::new(),
            error,
        }
    }
}
