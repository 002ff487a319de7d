//! In-memory storage implementation for testing and development.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

use crate::error::{StoreError, StoreResult};
use crate::traits::store::{SubjectStore, TaskStore, TerminalWrite};
use crate::types::{
    subject::{Annotation, SubjectPatch, SubjectRecord},
    task::{TaskId, TaskRecord},
    timestamps::Timestamps,
};

/// In-memory storage for subjects and tasks.
///
/// The subject table is keyed by subject key, which doubles as the
/// uniqueness constraint. Each method holds the table lock for its whole
/// read-modify-write, so every call is atomic.
///
/// Useful for testing and development. Not suitable for production
/// as data is lost on restart.
pub struct MemoryStore {
    subjects: RwLock<HashMap<String, SubjectRecord>>,
    tasks: RwLock<HashMap<TaskId, TaskRecord>>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned<T>(_: PoisonError<T>) -> StoreError {
    StoreError::Backend("memory store lock poisoned".into())
}

impl MemoryStore {
    /// Create a new empty memory store.
    pub fn new() -> Self {
        Self {
            subjects: RwLock::new(HashMap::new()),
            tasks: RwLock::new(HashMap::new()),
        }
    }

    /// Get the number of stored subjects.
    pub fn subject_count(&self) -> usize {
        self.subjects.read().map(|s| s.len()).unwrap_or_default()
    }

    /// Get the number of stored task rows.
    pub fn task_count(&self) -> usize {
        self.tasks.read().map(|t| t.len()).unwrap_or_default()
    }
}

#[async_trait]
impl SubjectStore for MemoryStore {
    async fn get_subject(&self, subject_key: &str) -> StoreResult<Option<SubjectRecord>> {
        Ok(self.subjects.read().map_err(poisoned)?.get(subject_key).cloned())
    }

    async fn list_subjects(&self) -> StoreResult<Vec<SubjectRecord>> {
        let mut subjects: Vec<_> = self
            .subjects
            .read()
            .map_err(poisoned)?
            .values()
            .cloned()
            .collect();
        subjects.sort_by_key(|s| s.timestamps.created_at);
        Ok(subjects)
    }

    async fn insert_subject(&self, record: &SubjectRecord) -> StoreResult<()> {
        let mut subjects = self.subjects.write().map_err(poisoned)?;
        if subjects.contains_key(&record.subject_key) {
            return Err(StoreError::Conflict {
                subject_key: record.subject_key.clone(),
            });
        }
        subjects.insert(record.subject_key.clone(), record.clone());
        Ok(())
    }

    async fn update_subject(
        &self,
        subject_key: &str,
        patch: &SubjectPatch,
    ) -> StoreResult<Option<SubjectRecord>> {
        let mut subjects = self.subjects.write().map_err(poisoned)?;
        Ok(subjects.get_mut(subject_key).map(|record| {
            record.apply(patch);
            record.clone()
        }))
    }

    async fn annotate_subject(
        &self,
        subject_key: &str,
        annotation: Annotation,
    ) -> StoreResult<Option<SubjectRecord>> {
        let mut subjects = self.subjects.write().map_err(poisoned)?;
        Ok(subjects.get_mut(subject_key).map(|record| {
            record.annotate(annotation);
            record.clone()
        }))
    }

    async fn delete_subject(&self, subject_key: &str) -> StoreResult<bool> {
        Ok(self
            .subjects
            .write()
            .map_err(poisoned)?
            .remove(subject_key)
            .is_some())
    }
}

#[async_trait]
impl TaskStore for MemoryStore {
    async fn get_task(&self, task_id: TaskId) -> StoreResult<Option<TaskRecord>> {
        Ok(self.tasks.read().map_err(poisoned)?.get(&task_id).cloned())
    }

    async fn insert_pending(&self, record: &TaskRecord) -> StoreResult<()> {
        self.tasks
            .write()
            .map_err(poisoned)?
            .entry(record.task_id)
            .or_insert_with(|| record.clone());
        Ok(())
    }

    async fn persist_terminal(&self, record: &TaskRecord) -> StoreResult<TerminalWrite> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        match tasks.get_mut(&record.task_id) {
            Some(existing) if existing.is_terminal() => Ok(TerminalWrite {
                record: existing.clone(),
                written: false,
            }),
            Some(existing) => {
                existing.state = record.state;
                existing.result = record.result.clone();
                existing.timestamps.touch();
                Ok(TerminalWrite {
                    record: existing.clone(),
                    written: true,
                })
            }
            None => {
                let mut row = record.clone();
                row.timestamps = Timestamps::now();
                tasks.insert(row.task_id, row.clone());
                Ok(TerminalWrite {
                    record: row,
                    written: true,
                })
            }
        }
    }

    async fn override_result(
        &self,
        task_id: TaskId,
        result: &serde_json::Value,
    ) -> StoreResult<Option<TaskRecord>> {
        let mut tasks = self.tasks.write().map_err(poisoned)?;
        Ok(tasks
            .get_mut(&task_id)
            .filter(|task| task.is_terminal())
            .map(|task| {
                task.result = Some(result.clone());
                task.timestamps.touch();
                task.clone()
            }))
    }
}
