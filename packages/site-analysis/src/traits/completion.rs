//! Completion signal interface.
//!
//! The dispatcher hands each submitted task a sink to report its outcome
//! through. This is the push path into the status tracker; there is no
//! global signal registry.

use async_trait::async_trait;

use crate::types::{
    kind::WorkKind,
    task::{Outcome, TaskId},
};

/// Receives terminal outcomes pushed by the execution substrate.
#[async_trait]
pub trait CompletionSink: Send + Sync {
    /// Called once per task when execution finishes.
    ///
    /// Implementations must tolerate the same outcome arriving through other
    /// paths (an active poll) before, after or concurrently with this call.
    async fn on_complete(&self, task_id: TaskId, kind: WorkKind, outcome: Outcome);
}
