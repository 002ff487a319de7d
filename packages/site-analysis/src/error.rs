//! Typed errors for the analysis core.
//!
//! Uses `thiserror` for library errors (not `anyhow`) to provide
//! strongly-typed, composable error handling.
//!
//! Only validation, not-found and throttling conditions ever reach a caller.
//! Executor failures are recorded as task data, and store conflicts are
//! absorbed by the reconciler.

use std::time::Duration;

use thiserror::Error;

use crate::types::{kind::WorkKind, task::TaskId};

/// Errors surfaced by the analysis service.
#[derive(Debug, Error)]
pub enum AnalysisError {
    /// Missing or malformed request field
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// No record exists for the subject key
    #[error("subject not found: {subject_key}")]
    SubjectNotFound { subject_key: String },

    /// Task id is neither live nor persisted
    #[error("task not found: {task_id}")]
    TaskNotFound { task_id: TaskId },

    /// Override requested on a task that has not finished yet
    #[error("task {task_id} is still pending")]
    TaskNotTerminal { task_id: TaskId },

    /// Rate bucket stayed empty for longer than the configured max wait
    #[error("{kind} submissions throttled after {waited:?}")]
    Throttled { kind: WorkKind, waited: Duration },

    /// Storage operation failed
    #[error("storage error: {0}")]
    Storage(#[from] StoreError),
}

impl AnalysisError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }
}

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record with the same subject key already exists
    #[error("subject already exists: {subject_key}")]
    Conflict { subject_key: String },

    /// Backend failed (connection, query, transaction)
    #[error("backend error: {0}")]
    Backend(#[source] Box<dyn std::error::Error + Send + Sync>),

    /// Stored row could not be decoded
    #[error("corrupt row: {0}")]
    Corrupt(String),
}

/// Errors raised by work executors.
///
/// These never propagate past the dispatcher; they are folded into a
/// `TaskFailure` and persisted as the task's terminal result.
#[derive(Debug, Error)]
pub enum ExecutorError {
    /// The payload is unusable for this kind of work
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The executor exceeded its time budget
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// An external dependency failed
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// The executor panicked
    #[error("executor panicked: {0}")]
    Panicked(String),
}

impl ExecutorError {
    /// Short machine-readable label stored as `error` in a failure result.
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::Timeout(_) => "timeout",
            Self::Upstream(_) => "upstream",
            Self::Panicked(_) => "panic",
        }
    }
}

/// Result type alias for service operations.
pub type Result<T> = std::result::Result<T, AnalysisError>;

/// Result type alias for storage operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result type alias for executor invocations.
pub type ExecutorResult<T> = std::result::Result<T, ExecutorError>;
