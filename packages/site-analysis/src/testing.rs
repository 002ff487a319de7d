//! Testing utilities including mock implementations.
//!
//! These are useful for testing code that drives the analysis service
//! without running real extraction, classification or network lookups.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::sync::watch;

use crate::error::{ExecutorError, ExecutorResult};
use crate::pipeline::AnalysisService;
use crate::stores::MemoryStore;
use crate::traits::executor::{Executor, ExecutorSet};
use crate::types::{config::AnalysisConfig, WorkInput};

/// What a mock executor does when invoked.
#[derive(Debug, Clone, PartialEq)]
pub enum MockBehavior {
    /// Succeed with this value
    Return(Value),
    /// Fail with an upstream error
    Fail(String),
    /// Panic with this message
    Panic(String),
}

impl Default for MockBehavior {
    fn default() -> Self {
        MockBehavior::Return(Value::Object(Default::default()))
    }
}

/// A mock executor for testing.
///
/// Returns scripted outcomes, optionally per subject key, and records every
/// call. With a latch, executions block until [`MockExecutor::release`] is
/// called, which keeps tasks Pending for as long as a test needs.
#[derive(Default)]
pub struct MockExecutor {
    /// Behaviour for subjects without an override
    default: MockBehavior,

    /// Per-subject overrides
    by_subject: RwLock<HashMap<String, MockBehavior>>,

    /// Artificial latency before answering
    delay: Option<Duration>,

    /// Open/closed gate executions wait on
    latch: Option<watch::Sender<bool>>,

    /// Call tracking for assertions
    calls: RwLock<Vec<WorkInput>>,
}

impl MockExecutor {
    /// Create a mock that succeeds with `{}`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Succeed with `value` by default.
    pub fn returning(mut self, value: Value) -> Self {
        self.default = MockBehavior::Return(value);
        self
    }

    /// Fail by default.
    pub fn failing(mut self, message: impl Into<String>) -> Self {
        self.default = MockBehavior::Fail(message.into());
        self
    }

    /// Panic by default.
    pub fn panicking(mut self, message: impl Into<String>) -> Self {
        self.default = MockBehavior::Panic(message.into());
        self
    }

    /// Succeed with `value` for one subject key.
    pub fn with_response(self, subject_key: impl Into<String>, value: Value) -> Self {
        self.with_behavior(subject_key, MockBehavior::Return(value))
    }

    /// Fail for one subject key.
    pub fn with_failure(self, subject_key: impl Into<String>, message: impl Into<String>) -> Self {
        self.with_behavior(subject_key, MockBehavior::Fail(message.into()))
    }

    fn with_behavior(self, subject_key: impl Into<String>, behavior: MockBehavior) -> Self {
        self.by_subject
            .write()
            .unwrap()
            .insert(subject_key.into(), behavior);
        self
    }

    /// Wait this long before answering.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Hold every execution until `release` is called.
    pub fn with_latch(mut self) -> Self {
        self.latch = Some(watch::channel(false).0);
        self
    }

    /// Let held executions (and all later ones) finish.
    pub fn release(&self) {
        if let Some(latch) = &self.latch {
            latch.send_replace(true);
        }
    }

    /// Get all calls made to this mock.
    pub fn calls(&self) -> Vec<WorkInput> {
        self.calls.read().unwrap().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.read().unwrap().len()
    }

    fn behavior_for(&self, subject_key: &str) -> MockBehavior {
        self.by_subject
            .read()
            .unwrap()
            .get(subject_key)
            .cloned()
            .unwrap_or_else(|| self.default.clone())
    }
}

#[async_trait]
impl Executor for MockExecutor {
    async fn execute(&self, input: &WorkInput) -> ExecutorResult<Value> {
        self.calls.write().unwrap().push(input.clone());

        if let Some(latch) = &self.latch {
            let mut open = latch.subscribe();
            let _ = open.wait_for(|open| *open).await;
        }

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        match self.behavior_for(&input.subject_key) {
            MockBehavior::Return(value) => Ok(value),
            MockBehavior::Fail(message) => Err(ExecutorError::Upstream(message)),
            MockBehavior::Panic(message) => panic!("{}", message),
        }
    }
}

/// A service over a fresh `MemoryStore`, returning the store for inspection.
pub fn memory_service(
    executors: ExecutorSet,
    config: AnalysisConfig,
) -> (AnalysisService<MemoryStore>, Arc<MemoryStore>) {
    let store = Arc::new(MemoryStore::new());
    let service = AnalysisService::new(store.clone(), executors, config);
    (service, store)
}
