//! Execution substrate - runs executors off the calling path.
//!
//! Owns the live state of every in-flight task. The active poll reads from
//! here rather than from the store, and the push path is driven from here
//! once an executor returns.

use dashmap::DashMap;
use std::any::Any;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinError;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

use crate::error::ExecutorError;
use crate::traits::{completion::CompletionSink, executor::Executor};
use crate::types::{
    kind::WorkKind,
    task::{Outcome, TaskFailure, TaskId},
    WorkInput,
};

/// What the substrate currently knows about a task.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveState {
    Pending,
    Finished(Outcome),
}

/// Live entry for one task.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveTask {
    pub kind: WorkKind,
    pub state: LiveState,
}

/// Explicitly constructed registry of running work.
///
/// Shared through `Arc`; `shutdown` waits for everything spawned so far.
pub struct ExecutionSubstrate {
    live: Arc<DashMap<TaskId, LiveTask>>,
    tracker: TaskTracker,
    executor_timeout: Duration,
}

impl ExecutionSubstrate {
    pub fn new(executor_timeout: Duration) -> Self {
        Self {
            live: Arc::new(DashMap::new()),
            tracker: TaskTracker::new(),
            executor_timeout,
        }
    }

    /// Live state for a task, if the substrate still holds it.
    pub fn state(&self, task_id: TaskId) -> Option<LiveTask> {
        self.live.get(&task_id).map(|entry| entry.value().clone())
    }

    /// Drop a task whose terminal outcome has been persisted.
    pub fn forget(&self, task_id: TaskId) {
        self.live.remove(&task_id);
    }

    /// Tasks the substrate is still holding.
    pub fn live_count(&self) -> usize {
        self.live.len()
    }

    /// Run `executor` for one task in the background.
    ///
    /// The task is visible as Pending before this returns. When the executor
    /// finishes, the live entry is updated first and then `sink` is signalled.
    pub fn spawn(
        &self,
        task_id: TaskId,
        kind: WorkKind,
        executor: Arc<dyn Executor>,
        input: WorkInput,
        sink: Arc<dyn CompletionSink>,
    ) {
        self.live.insert(
            task_id,
            LiveTask {
                kind,
                state: LiveState::Pending,
            },
        );

        let live = self.live.clone();
        let limit = self.executor_timeout;

        self.tracker.spawn(async move {
            let outcome = run_executor(executor, input, limit).await;

            match &outcome {
                Outcome::Success(_) => debug!(task_id = %task_id, kind = %kind, "Executor finished"),
                Outcome::Failure(failure) => warn!(
                    task_id = %task_id,
                    kind = %kind,
                    error = %failure.error,
                    detail = %failure.detail,
                    "Executor failed"
                ),
            }

            live.insert(
                task_id,
                LiveTask {
                    kind,
                    state: LiveState::Finished(outcome.clone()),
                },
            );
            sink.on_complete(task_id, kind, outcome).await;
        });
    }

    /// Close the tracker and wait for in-flight tasks.
    pub async fn shutdown(&self) {
        self.tracker.close();
        self.tracker.wait().await;
    }
}

async fn run_executor(executor: Arc<dyn Executor>, input: WorkInput, limit: Duration) -> Outcome {
    // Inner task so a panicking executor surfaces as a JoinError
    let mut handle = tokio::spawn(async move { executor.execute(&input).await });

    let result = match tokio::time::timeout(limit, &mut handle).await {
        Ok(Ok(result)) => result,
        Ok(Err(join_error)) => Err(ExecutorError::Panicked(panic_message(join_error))),
        Err(_) => {
            handle.abort();
            Err(ExecutorError::Timeout(limit))
        }
    };

    match result {
        Ok(value) => Outcome::Success(value),
        Err(err) => Outcome::Failure(TaskFailure::from(&err)),
    }
}

fn panic_message(err: JoinError) -> String {
    match err.try_into_panic() {
        Ok(payload) => describe_panic(payload.as_ref()),
        Err(err) => err.to_string(),
    }
}

fn describe_panic(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
