//! Runtime event stream payloads.

use crate::{
    op::OperationRecord,
    types::{ConcId, RequestId},
};

/// Events emitted from the single-writer runtime loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent {
    ReplayStarted {
        request_id: RequestId,
        changed_op_idx: usize,
    },
    /// A new tail was produced; `operations` is the full updated list.
    OperationAppended {
        operations: Vec<OperationRecord>,
        tail: ConcId,
    },
    /// The client should show this page.
    NavigationRequested { url: String },
    ReplayFinished { request_id: RequestId },
    ReplayFailed {
        request_id: RequestId,
        failed_at: Option<usize>,
        message: String,
    },
    PipelineReloaded { tail: ConcId },
    PipelineTrimmed { len: usize },
    LineGroupLockChanged { locked: bool },
    /// Server message for the user.
    Message { text: String },
    /// Snapshot written to the store.
    Checkpointed { tail: Option<ConcId> },
}
