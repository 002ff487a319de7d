//! Task status tracker - the single persistence path for task outcomes.
//!
//! Two triggers report completion: the push signal from the substrate and
//! an active poll that finds a finished task in the substrate. Both go
//! through [`TaskStatusTracker::complete`], whose write is insert-if-absent
//! keyed by task id, so whichever arrives second is a no-op.

use async_trait::async_trait;
use std::sync::Arc;
use tracing::{debug, error, info};

use crate::error::{AnalysisError, Result};
use crate::pipeline::substrate::{ExecutionSubstrate, LiveState};
use crate::traits::{completion::CompletionSink, store::TaskStore};
use crate::types::{
    kind::WorkKind,
    task::{Outcome, TaskId, TaskRecord},
};

pub struct TaskStatusTracker<S: TaskStore + ?Sized> {
    store: Arc<S>,
    substrate: Arc<ExecutionSubstrate>,
}

impl<S: TaskStore + ?Sized> TaskStatusTracker<S> {
    pub fn new(store: Arc<S>, substrate: Arc<ExecutionSubstrate>) -> Self {
        Self { store, substrate }
    }

    /// Durably record a freshly accepted task as Pending.
    pub async fn register_pending(&self, task_id: TaskId, kind: WorkKind) -> Result<TaskRecord> {
        let record = TaskRecord::pending(task_id, kind);
        self.store.insert_pending(&record).await?;
        debug!(task_id = %task_id, kind = %kind, "Registered pending task");
        Ok(record)
    }

    /// Persist a terminal outcome and return the row that won.
    ///
    /// When a terminal row already exists this attempt is discarded in
    /// favour of the persisted one.
    pub async fn complete(
        &self,
        task_id: TaskId,
        kind: WorkKind,
        outcome: Outcome,
    ) -> Result<TaskRecord> {
        let write = self
            .store
            .persist_terminal(&TaskRecord::terminal(task_id, kind, &outcome))
            .await?;

        if write.written {
            info!(task_id = %task_id, kind = %kind, state = %write.record.state, "Persisted terminal state");
        } else {
            debug!(task_id = %task_id, "Terminal state already persisted, discarding duplicate");
        }

        self.substrate.forget(task_id);
        Ok(write.record)
    }

    /// Current state of a task.
    ///
    /// Asks the substrate first. A finished task found there is persisted
    /// before answering; tasks the substrate no longer holds are answered
    /// from the store.
    pub async fn poll(&self, task_id: TaskId) -> Result<TaskRecord> {
        match self.substrate.state(task_id) {
            Some(live) => match live.state {
                LiveState::Finished(outcome) => self.complete(task_id, live.kind, outcome).await,
                LiveState::Pending => Ok(self
                    .store
                    .get_task(task_id)
                    .await?
                    .unwrap_or_else(|| TaskRecord::pending(task_id, live.kind))),
            },
            None => self.get(task_id).await,
        }
    }

    /// Persisted state only.
    pub async fn get(&self, task_id: TaskId) -> Result<TaskRecord> {
        self.store
            .get_task(task_id)
            .await?
            .ok_or(AnalysisError::TaskNotFound { task_id })
    }

    /// Replace the result of a terminal task.
    ///
    /// Administrative correction; the state itself is kept.
    pub async fn override_result(
        &self,
        task_id: TaskId,
        result: serde_json::Value,
    ) -> Result<TaskRecord> {
        let current = self.poll(task_id).await?;
        if !current.is_terminal() {
            return Err(AnalysisError::TaskNotTerminal { task_id });
        }

        let record = self
            .store
            .override_result(task_id, &result)
            .await?
            .ok_or(AnalysisError::TaskNotFound { task_id })?;

        info!(task_id = %task_id, "Task result overridden");
        Ok(record)
    }
}

#[async_trait]
impl<S: TaskStore + ?Sized> CompletionSink for TaskStatusTracker<S> {
    async fn on_complete(&self, task_id: TaskId, kind: WorkKind, outcome: Outcome) {
        // The live entry stays put on failure so a later poll can retry
        if let Err(e) = self.complete(task_id, kind, outcome).await {
            error!(task_id = %task_id, kind = %kind, error = %e, "Failed to persist task outcome");
        }
    }
}
