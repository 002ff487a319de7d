//! Task dispatcher - admits work and hands it to the substrate.

use std::sync::Arc;
use tracing::info;

use crate::error::Result;
use crate::pipeline::{rate::RateGate, substrate::ExecutionSubstrate, tracker::TaskStatusTracker};
use crate::traits::{executor::ExecutorSet, store::TaskStore};
use crate::types::{
    kind::WorkKind,
    task::{TaskId, TaskRecord},
    WorkInput,
};

/// Submits work of a given kind under that kind's rate policy.
pub struct TaskDispatcher<S: TaskStore + ?Sized + 'static> {
    gate: RateGate,
    executors: ExecutorSet,
    tracker: Arc<TaskStatusTracker<S>>,
    substrate: Arc<ExecutionSubstrate>,
}

impl<S: TaskStore + ?Sized + 'static> TaskDispatcher<S> {
    pub fn new(
        gate: RateGate,
        executors: ExecutorSet,
        tracker: Arc<TaskStatusTracker<S>>,
        substrate: Arc<ExecutionSubstrate>,
    ) -> Self {
        Self {
            gate,
            executors,
            tracker,
            substrate,
        }
    }

    /// Submit one unit of work and return its Pending handle.
    ///
    /// Waits for a token from the kind's bucket, records the handle as
    /// Pending, then starts execution in the background. The outcome is
    /// reported back through the tracker, never written here.
    pub async fn submit(&self, kind: WorkKind, input: WorkInput) -> Result<TaskRecord> {
        self.gate.admit(kind).await?;

        let task_id = TaskId::new();
        let record = self.tracker.register_pending(task_id, kind).await?;

        info!(
            task_id = %task_id,
            kind = %kind,
            subject_key = %input.subject_key,
            "Dispatching task"
        );

        self.substrate.spawn(
            task_id,
            kind,
            self.executors.get(kind),
            input,
            self.tracker.clone(),
        );

        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stores::MemoryStore;
    use crate::testing::MockExecutor;
    use crate::types::{
        config::{AnalysisConfig, RatePolicy},
        task::TaskState,
    };
    use serde_json::json;
    use std::time::{Duration, Instant};

    fn dispatcher(
        executor: Arc<MockExecutor>,
        config: AnalysisConfig,
    ) -> (TaskDispatcher<MemoryStore>, Arc<TaskStatusTracker<MemoryStore>>, Arc<ExecutionSubstrate>) {
        let store = Arc::new(MemoryStore::new());
        let substrate = Arc::new(ExecutionSubstrate::new(config.executor_timeout));
        let tracker = Arc::new(TaskStatusTracker::new(store, substrate.clone()));
        let dispatcher = TaskDispatcher::new(
            RateGate::new(&config),
            ExecutorSet::uniform(executor),
            tracker.clone(),
            substrate.clone(),
        );
        (dispatcher, tracker, substrate)
    }

    #[tokio::test]
    async fn test_submit_returns_pending_and_push_persists() {
        let executor = Arc::new(MockExecutor::new().returning(json!({"ok": true})).with_latch());
        let (dispatcher, tracker, substrate) = dispatcher(executor.clone(), AnalysisConfig::default());

        let record = dispatcher
            .submit(WorkKind::Social, WorkInput::new("http://test.com", Some("<p/>".into())))
            .await
            .unwrap();
        assert_eq!(record.state, TaskState::Pending);
        assert_eq!(tracker.get(record.task_id).await.unwrap().state, TaskState::Pending);

        executor.release();
        substrate.shutdown().await;

        let persisted = tracker.get(record.task_id).await.unwrap();
        assert_eq!(persisted.state, TaskState::Success);
        assert_eq!(persisted.result, Some(json!({"ok": true})));
        assert_eq!(executor.call_count(), 1);
    }

    #[tokio::test]
    async fn test_executor_failure_is_recorded_not_raised() {
        let executor = Arc::new(MockExecutor::new().failing("dns lookup failed"));
        let (dispatcher, tracker, substrate) = dispatcher(executor, AnalysisConfig::default());

        let record = dispatcher
            .submit(WorkKind::Location, WorkInput::new("http://test.com", None))
            .await
            .unwrap();
        substrate.shutdown().await;

        let persisted = tracker.get(record.task_id).await.unwrap();
        assert_eq!(persisted.state, TaskState::Failure);
        assert_eq!(persisted.result.unwrap()["error"], "upstream");
    }

    #[tokio::test]
    async fn test_exhausted_bucket_delays_submissions_without_dropping() {
        let config = AnalysisConfig::default()
            .with_rate_policy(WorkKind::Location, RatePolicy::per_second(1));
        let executor = Arc::new(MockExecutor::new());
        let (dispatcher, _, substrate) = dispatcher(executor.clone(), config);

        let start = Instant::now();
        let mut admitted = Vec::new();
        for _ in 0..3 {
            dispatcher
                .submit(WorkKind::Location, WorkInput::new("http://test.com", None))
                .await
                .unwrap();
            admitted.push(start.elapsed());
        }
        substrate.shutdown().await;

        assert!(admitted[0] < Duration::from_millis(100));
        assert!(admitted[1] >= Duration::from_millis(900));
        assert!(admitted[2] >= Duration::from_millis(1900));
        assert_eq!(executor.call_count(), 3);
    }
}
