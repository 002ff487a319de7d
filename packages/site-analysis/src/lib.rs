//! Site Analysis Core
//!
//! Accepts analysis requests keyed by a URL, skips work whose page content
//! has not changed, dispatches the rest as rate-limited background tasks,
//! and reconciles each task's terminal outcome onto the subject's record
//! exactly once, even when a poll and a completion signal race.
//!
//! # Usage
//!
//! ```rust,ignore
//! use site_analysis::{AnalysisConfig, AnalysisRequest, AnalysisService, ExecutorSet, MemoryStore, WorkKind};
//! use site_analysis::executors::{ContactExtractor, DomainLookup, KeywordClassifier};
//!
//! let executors = ExecutorSet::new(
//!     Arc::new(ContactExtractor::new()),
//!     Arc::new(KeywordClassifier::new()),
//!     Arc::new(DomainLookup::new()),
//! );
//! let service = AnalysisService::new(Arc::new(MemoryStore::new()), executors, AnalysisConfig::default());
//!
//! let outcome = service
//!     .analyze(WorkKind::Classification, AnalysisRequest::new("https://example.com").with_html(html))
//!     .await?;
//! ```
//!
//! # Modules
//!
//! - [`types`] - Records, task handles, fingerprints, configuration
//! - [`traits`] - Store, executor and completion-sink abstractions
//! - [`stores`] - Storage implementations (MemoryStore, SqliteStore)
//! - [`pipeline`] - Dedup, rate gate, substrate, dispatcher, tracker, reconciler
//! - [`executors`] - Built-in contact, classification and domain executors
//! - [`testing`] - Mock implementations for testing

pub mod error;
pub mod executors;
pub mod pipeline;
pub mod stores;
pub mod testing;
pub mod traits;
pub mod types;

// Re-export core types at crate root
pub use error::{AnalysisError, ExecutorError, StoreError};
pub use pipeline::{
    AnalysisOutcome, AnalysisRequest, AnalysisService, DedupDecision, ExecutionSubstrate,
    FingerprintRegistry, RateGate, RecordReconciler, TaskDispatcher, TaskStatusTracker,
};
pub use stores::MemoryStore;
#[cfg(feature = "sqlite")]
pub use stores::SqliteStore;
pub use traits::{
    completion::CompletionSink,
    executor::{Executor, ExecutorSet},
    store::{AnalysisStore, SubjectStore, TaskStore, TerminalWrite},
};
pub use types::{
    config::{AnalysisConfig, RatePolicy},
    fingerprint::Fingerprint,
    kind::WorkKind,
    subject::{
        Annotation, FingerprintSlots, SubjectId, SubjectPatch, SubjectRecord, SubjectView, TaskRefs,
        TaskSlots,
    },
    task::{Outcome, TaskFailure, TaskId, TaskRecord, TaskState},
    timestamps::Timestamps,
    WorkInput,
};
