//! Storage traits for subjects and task handles.
//!
//! The storage layer is split into focused traits:
//! - `SubjectStore`: one record per subject key, unique on the key
//! - `TaskStore`: one row per task id, terminal state written at most once
//! - `AnalysisStore`: composite trait combining both
//!
//! Every method must be atomic: readers never observe a half-applied
//! upsert or terminal write.

use async_trait::async_trait;

use crate::error::StoreResult;
use crate::types::{
    subject::{Annotation, SubjectPatch, SubjectRecord},
    task::{TaskId, TaskRecord},
};

/// Persistence for subject records.
#[async_trait]
pub trait SubjectStore: Send + Sync {
    /// Get a subject by key.
    async fn get_subject(&self, subject_key: &str) -> StoreResult<Option<SubjectRecord>>;

    /// All subjects, oldest first.
    async fn list_subjects(&self) -> StoreResult<Vec<SubjectRecord>>;

    /// Insert a new subject.
    ///
    /// Must fail with `StoreError::Conflict` when a record with the same
    /// subject key already exists. Never creates a second row for a key.
    async fn insert_subject(&self, record: &SubjectRecord) -> StoreResult<()>;

    /// Apply a partial update to an existing subject.
    ///
    /// Returns `None` when no record exists for the key.
    async fn update_subject(
        &self,
        subject_key: &str,
        patch: &SubjectPatch,
    ) -> StoreResult<Option<SubjectRecord>>;

    /// Set a monotonic annotation.
    ///
    /// Returns `None` when no record exists for the key.
    async fn annotate_subject(
        &self,
        subject_key: &str,
        annotation: Annotation,
    ) -> StoreResult<Option<SubjectRecord>>;

    /// Delete a subject. Returns false when nothing was deleted.
    async fn delete_subject(&self, subject_key: &str) -> StoreResult<bool>;
}

/// Result of a terminal write attempt.
#[derive(Debug, Clone, PartialEq)]
pub struct TerminalWrite {
    /// The row as persisted after the attempt
    pub record: TaskRecord,

    /// Whether this attempt produced the terminal row
    pub written: bool,
}

/// Persistence for task handles.
#[async_trait]
pub trait TaskStore: Send + Sync {
    /// Get a task by id.
    async fn get_task(&self, task_id: TaskId) -> StoreResult<Option<TaskRecord>>;

    /// Record a freshly dispatched task.
    ///
    /// A no-op when a row already exists for the id; a Pending insert must
    /// never overwrite a terminal row.
    async fn insert_pending(&self, record: &TaskRecord) -> StoreResult<()>;

    /// Persist a terminal outcome.
    ///
    /// Insert-if-absent keyed by task id, or transition an existing Pending
    /// row. When a terminal row already exists the attempt is a no-op and the
    /// existing row is returned with `written = false`.
    async fn persist_terminal(&self, record: &TaskRecord) -> StoreResult<TerminalWrite>;

    /// Replace the result of a terminal task.
    ///
    /// Returns `None` when the task is missing or still Pending.
    async fn override_result(
        &self,
        task_id: TaskId,
        result: &serde_json::Value,
    ) -> StoreResult<Option<TaskRecord>>;

    /// Check the backend is reachable.
    async fn ping(&self) -> StoreResult<()> {
        Ok(())
    }
}

/// Composite storage trait used by the analysis service.
pub trait AnalysisStore: SubjectStore + TaskStore {}

// Blanket implementation: anything implementing both traits is an AnalysisStore
impl<T: SubjectStore + TaskStore> AnalysisStore for T {}
