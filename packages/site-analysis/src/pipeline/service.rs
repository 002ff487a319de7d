//! The analysis service - main entry point for the request layer.
//!
//! Wires the fingerprint registry, dispatcher, status tracker and
//! reconciler around one store and one execution substrate.
//!
//! # Example
//!
//! ```rust,ignore
//! let service = AnalysisService::new(store, executors, AnalysisConfig::default());
//!
//! let outcome = service
//!     .analyze(WorkKind::Classification, AnalysisRequest::new(url).with_html(html))
//!     .await?;
//!
//! if let AnalysisOutcome::Dispatched { task, .. } = outcome {
//!     let status = service.task(task.task_id).await?;
//! }
//! ```

use futures::future::try_join_all;
use std::sync::Arc;
use tracing::info;
use url::Url;

use crate::error::{AnalysisError, Result};
use crate::pipeline::{
    dispatcher::TaskDispatcher,
    fingerprint::{DedupDecision, FingerprintRegistry},
    rate::RateGate,
    reconciler::RecordReconciler,
    substrate::ExecutionSubstrate,
    tracker::TaskStatusTracker,
};
use crate::traits::{executor::ExecutorSet, store::AnalysisStore};
use crate::types::{
    config::AnalysisConfig,
    fingerprint::Fingerprint,
    kind::WorkKind,
    subject::{SubjectId, SubjectPatch, SubjectRecord, SubjectView, TaskRefs},
    task::{TaskId, TaskRecord},
    WorkInput,
};

/// An inbound analysis request.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub url: String,
    pub html: Option<String>,
    /// Reuse an attached handle for URL-keyed kinds instead of dispatching
    pub reuse: bool,
}

impl AnalysisRequest {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Default::default()
        }
    }

    pub fn with_html(mut self, html: impl Into<String>) -> Self {
        self.html = Some(html.into());
        self
    }

    pub fn with_reuse(mut self, reuse: bool) -> Self {
        self.reuse = reuse;
        self
    }
}

/// What `analyze` did.
#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisOutcome {
    /// New work was submitted.
    Dispatched {
        record_id: SubjectId,
        task: TaskRecord,
    },
    /// Nothing changed; these are the handles already attached.
    Skipped {
        record_id: SubjectId,
        tasks: TaskRefs,
    },
}

pub struct AnalysisService<S: AnalysisStore + ?Sized + 'static> {
    store: Arc<S>,
    registry: FingerprintRegistry<S>,
    dispatcher: TaskDispatcher<S>,
    tracker: Arc<TaskStatusTracker<S>>,
    reconciler: RecordReconciler<S>,
    substrate: Arc<ExecutionSubstrate>,
}

impl<S: AnalysisStore + ?Sized + 'static> AnalysisService<S> {
    pub fn new(store: Arc<S>, executors: ExecutorSet, config: AnalysisConfig) -> Self {
        let substrate = Arc::new(ExecutionSubstrate::new(config.executor_timeout));
        let tracker = Arc::new(TaskStatusTracker::new(store.clone(), substrate.clone()));
        let dispatcher = TaskDispatcher::new(
            RateGate::new(&config),
            executors,
            tracker.clone(),
            substrate.clone(),
        );

        Self {
            registry: FingerprintRegistry::new(store.clone()),
            reconciler: RecordReconciler::new(store.clone(), config.upsert_attempts),
            store,
            dispatcher,
            tracker,
            substrate,
        }
    }

    /// Request analysis of a subject.
    ///
    /// Validation failures are returned before anything is dispatched or
    /// persisted. Executor failures never surface here; they end up as the
    /// task's Failure result.
    pub async fn analyze(&self, kind: WorkKind, request: AnalysisRequest) -> Result<AnalysisOutcome> {
        let subject_key = validate(kind, &request)?;
        let fingerprint = request
            .html
            .as_deref()
            .filter(|_| kind.is_content_keyed())
            .map(Fingerprint::of);

        let decision = self
            .registry
            .should_dispatch_kind(kind, &subject_key, fingerprint.as_ref(), request.reuse)
            .await?;

        if let DedupDecision::Skip { record_id, tasks } = decision {
            info!(subject_key = %subject_key, kind = %kind, "No changes, returning attached tasks");
            return Ok(AnalysisOutcome::Skipped { record_id, tasks });
        }

        let payload = if kind.is_content_keyed() {
            request.html
        } else {
            None
        };
        let task = self
            .dispatcher
            .submit(kind, WorkInput::new(subject_key.clone(), payload))
            .await?;

        let mut patch = SubjectPatch::new().with_task(kind, task.task_id);
        if let Some(fingerprint) = fingerprint {
            patch = patch.with_kind_fingerprint(kind, fingerprint);
        }
        let record = self.reconciler.upsert(&subject_key, &patch).await?;

        Ok(AnalysisOutcome::Dispatched {
            record_id: record.id,
            task,
        })
    }

    /// Current state of a task (active poll).
    pub async fn task(&self, task_id: TaskId) -> Result<TaskRecord> {
        self.tracker.poll(task_id).await
    }

    /// Administrative replacement of a terminal task's result.
    pub async fn override_task(&self, task_id: TaskId, result: serde_json::Value) -> Result<TaskRecord> {
        self.tracker.override_result(task_id, result).await
    }

    pub async fn flag(&self, subject_key: &str) -> Result<SubjectRecord> {
        self.reconciler.flag(subject_key).await
    }

    pub async fn save(&self, subject_key: &str) -> Result<SubjectRecord> {
        self.reconciler.save(subject_key).await
    }

    /// One subject with its tasks resolved.
    pub async fn subject(&self, subject_key: &str) -> Result<SubjectView> {
        let record = self.reconciler.get(subject_key).await?;
        self.reconciler.resolve(record).await
    }

    /// Every subject with its tasks resolved, oldest first.
    pub async fn subjects(&self) -> Result<Vec<SubjectView>> {
        let records = self.reconciler.list().await?;
        try_join_all(records.into_iter().map(|record| self.reconciler.resolve(record))).await
    }

    pub async fn delete_subject(&self, subject_key: &str) -> Result<()> {
        self.reconciler.delete(subject_key).await
    }

    /// Check the store is reachable.
    pub async fn health(&self) -> Result<()> {
        Ok(self.store.ping().await?)
    }

    /// Wait for in-flight executions to finish and persist.
    pub async fn shutdown(&self) {
        self.substrate.shutdown().await;
    }
}

/// Check required fields for `kind` and return the subject key.
fn validate(kind: WorkKind, request: &AnalysisRequest) -> Result<String> {
    let subject_key = request.url.trim();
    if subject_key.is_empty() {
        return Err(AnalysisError::validation("url", "is required"));
    }

    let url = Url::parse(subject_key)
        .map_err(|e| AnalysisError::validation("url", e.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(AnalysisError::validation("url", "must be http or https"));
    }
    if url.host_str().is_none() {
        return Err(AnalysisError::validation("url", "must include a host"));
    }

    if kind.is_content_keyed() && request.html.as_deref().map_or(true, str::is_empty) {
        return Err(AnalysisError::validation("html", "is required"));
    }

    Ok(subject_key.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_content_kinds_require_html() {
        let request = AnalysisRequest::new("http://test.com");
        for kind in [WorkKind::Social, WorkKind::Classification] {
            let err = validate(kind, &request).unwrap_err();
            assert!(matches!(err, AnalysisError::Validation { field: "html", .. }));
        }
        assert_eq!(validate(WorkKind::Location, &request).unwrap(), "http://test.com");
    }

    #[test]
    fn test_url_must_be_absolute_http() {
        for url in ["", "   ", "not a url", "ftp://test.com/file", "test.com"] {
            let err = validate(WorkKind::Location, &AnalysisRequest::new(url)).unwrap_err();
            assert!(matches!(err, AnalysisError::Validation { field: "url", .. }), "{}", url);
        }
    }

    #[test]
    fn test_subject_key_is_trimmed() {
        let request = AnalysisRequest::new("  https://test.com/page  ").with_html("<p/>");
        assert_eq!(
            validate(WorkKind::Social, &request).unwrap(),
            "https://test.com/page"
        );
    }
}
