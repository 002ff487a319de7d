//! Record reconciler - keeps exactly one subject record per key.

use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::error::{AnalysisError, Result, StoreError};
use crate::traits::store::AnalysisStore;
use crate::types::subject::{Annotation, SubjectPatch, SubjectRecord, SubjectView, TaskSlots};

pub struct RecordReconciler<S: AnalysisStore + ?Sized> {
    store: Arc<S>,
    attempts: usize,
}

impl<S: AnalysisStore + ?Sized> RecordReconciler<S> {
    pub fn new(store: Arc<S>, attempts: usize) -> Self {
        Self {
            store,
            attempts: attempts.max(1),
        }
    }

    /// Attach a patch to the record for `subject_key`, creating it if needed.
    ///
    /// Only the fields present in the patch change. A create that loses to a
    /// concurrent create for the same key is retried as an update.
    pub async fn upsert(&self, subject_key: &str, patch: &SubjectPatch) -> Result<SubjectRecord> {
        for attempt in 1..=self.attempts {
            if let Some(record) = self.store.update_subject(subject_key, patch).await? {
                debug!(subject_key = %subject_key, record_id = %record.id, "Updated subject");
                return Ok(record);
            }

            let record = SubjectRecord::new(subject_key, patch);
            match self.store.insert_subject(&record).await {
                Ok(()) => {
                    info!(subject_key = %subject_key, record_id = %record.id, "Created subject");
                    return Ok(record);
                }
                Err(StoreError::Conflict { .. }) => {
                    warn!(subject_key = %subject_key, attempt, "Lost create race, retrying as update");
                }
                Err(e) => return Err(e.into()),
            }
        }

        Err(StoreError::Conflict {
            subject_key: subject_key.to_string(),
        }
        .into())
    }

    pub async fn flag(&self, subject_key: &str) -> Result<SubjectRecord> {
        self.annotate(subject_key, Annotation::Flagged).await
    }

    pub async fn save(&self, subject_key: &str) -> Result<SubjectRecord> {
        self.annotate(subject_key, Annotation::Saved).await
    }

    async fn annotate(&self, subject_key: &str, annotation: Annotation) -> Result<SubjectRecord> {
        let record = self
            .store
            .annotate_subject(subject_key, annotation)
            .await?
            .ok_or_else(|| not_found(subject_key))?;
        debug!(subject_key = %subject_key, annotation = ?annotation, "Annotated subject");
        Ok(record)
    }

    pub async fn get(&self, subject_key: &str) -> Result<SubjectRecord> {
        self.store
            .get_subject(subject_key)
            .await?
            .ok_or_else(|| not_found(subject_key))
    }

    pub async fn list(&self) -> Result<Vec<SubjectRecord>> {
        Ok(self.store.list_subjects().await?)
    }

    /// Delete a record. Task rows it referenced are left alone.
    pub async fn delete(&self, subject_key: &str) -> Result<()> {
        if !self.store.delete_subject(subject_key).await? {
            return Err(not_found(subject_key));
        }
        info!(subject_key = %subject_key, "Deleted subject");
        Ok(())
    }

    /// Resolve task references to their persisted rows.
    ///
    /// A reference whose row is missing resolves to an empty slot.
    pub async fn resolve(&self, record: SubjectRecord) -> Result<SubjectView> {
        let mut tasks = TaskSlots::default();
        for (kind, task_id) in record.tasks.iter() {
            if let Some(task) = self.store.get_task(*task_id).await? {
                tasks.set(kind, task);
            }
        }
        Ok(SubjectView::new(record, tasks))
    }
}

fn not_found(subject_key: &str) -> AnalysisError {
    AnalysisError::SubjectNotFound {
        subject_key: subject_key.to_string(),
    }
}
