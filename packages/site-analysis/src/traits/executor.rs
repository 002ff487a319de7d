//! Work executor trait - the opaque analysis engines.

use async_trait::async_trait;
use std::sync::Arc;

use crate::error::ExecutorResult;
use crate::types::{kind::WorkKind, WorkInput};

/// An analysis engine invoked by the dispatcher.
///
/// From the dispatcher's point of view this is a function
/// `input -> value | error`. Implementations should bound their own
/// external calls; the dispatcher additionally enforces an overall timeout.
#[async_trait]
pub trait Executor: Send + Sync {
    async fn execute(&self, input: &WorkInput) -> ExecutorResult<serde_json::Value>;
}

/// One executor per work kind.
#[derive(Clone)]
pub struct ExecutorSet {
    social: Arc<dyn Executor>,
    classification: Arc<dyn Executor>,
    location: Arc<dyn Executor>,
}

impl ExecutorSet {
    pub fn new(
        social: Arc<dyn Executor>,
        classification: Arc<dyn Executor>,
        location: Arc<dyn Executor>,
    ) -> Self {
        Self {
            social,
            classification,
            location,
        }
    }

    /// Use the same executor for every kind (mostly for tests).
    pub fn uniform(executor: Arc<dyn Executor>) -> Self {
        Self::new(executor.clone(), executor.clone(), executor)
    }

    pub fn get(&self, kind: WorkKind) -> Arc<dyn Executor> {
        match kind {
            WorkKind::Social => self.social.clone(),
            WorkKind::Classification => self.classification.clone(),
            WorkKind::Location => self.location.clone(),
        }
    }
}
