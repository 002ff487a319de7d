//! Task handles - one per dispatched unit of work.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

use super::{kind::WorkKind, timestamps::Timestamps};
use crate::error::ExecutorError;

/// Unique identifier for a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TaskId(pub Uuid);

impl TaskId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl FromStr for TaskId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Uuid::parse_str(s).map(Self)
    }
}

/// Lifecycle state of a task.
///
/// `Pending` is the only non-terminal state. Once a task is `Success` or
/// `Failure` it never returns to `Pending`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskState {
    Pending,
    Success,
    Failure,
}

impl TaskState {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TaskState::Pending)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskState::Pending => "PENDING",
            TaskState::Success => "SUCCESS",
            TaskState::Failure => "FAILURE",
        }
    }
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskState {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(TaskState::Pending),
            "SUCCESS" => Ok(TaskState::Success),
            "FAILURE" => Ok(TaskState::Failure),
            other => Err(format!("unknown task state: {}", other)),
        }
    }
}

/// Structured failure stored as the result of a failed task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskFailure {
    pub error: String,
    pub detail: String,
}

impl TaskFailure {
    pub fn new(error: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            detail: detail.into(),
        }
    }
}

impl From<&ExecutorError> for TaskFailure {
    fn from(err: &ExecutorError) -> Self {
        Self::new(err.label(), err.to_string())
    }
}

/// Terminal outcome of executing a task.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Success(serde_json::Value),
    Failure(TaskFailure),
}

impl Outcome {
    pub fn state(&self) -> TaskState {
        match self {
            Outcome::Success(_) => TaskState::Success,
            Outcome::Failure(_) => TaskState::Failure,
        }
    }

    /// The JSON stored in the task's `result` column.
    pub fn to_result(&self) -> serde_json::Value {
        match self {
            Outcome::Success(value) => value.clone(),
            Outcome::Failure(failure) => serde_json::json!({
                "error": failure.error,
                "detail": failure.detail,
            }),
        }
    }
}

/// Persisted view of a task handle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub kind: WorkKind,
    pub state: TaskState,
    /// Executor output on success, `{error, detail}` on failure
    pub result: Option<serde_json::Value>,
    #[serde(flatten)]
    pub timestamps: Timestamps,
}

impl TaskRecord {
    /// A freshly dispatched task.
    pub fn pending(task_id: TaskId, kind: WorkKind) -> Self {
        Self {
            task_id,
            kind,
            state: TaskState::Pending,
            result: None,
            timestamps: Timestamps::now(),
        }
    }

    /// The terminal row a completion would write for this task.
    pub fn terminal(task_id: TaskId, kind: WorkKind, outcome: &Outcome) -> Self {
        Self {
            task_id,
            kind,
            state: outcome.state(),
            result: Some(outcome.to_result()),
            timestamps: Timestamps::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.state.is_terminal()
    }
}
