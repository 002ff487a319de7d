//! The analysis pipeline.
//!
//! - `fingerprint` - skip/proceed decision on unchanged content
//! - `rate` - per-kind token buckets
//! - `substrate` - background execution and live task state
//! - `dispatcher` - admission and submission
//! - `tracker` - single persistence path for task outcomes
//! - `reconciler` - subject record upserts and annotations
//! - `service` - the facade the request layer talks to

pub mod dispatcher;
pub mod fingerprint;
pub mod rate;
pub mod reconciler;
pub mod service;
pub mod substrate;
pub mod tracker;

pub use dispatcher::TaskDispatcher;
pub use fingerprint::{DedupDecision, FingerprintRegistry};
pub use rate::RateGate;
pub use reconciler::RecordReconciler;
pub use service::{AnalysisOutcome, AnalysisRequest, AnalysisService};
pub use substrate::{ExecutionSubstrate, LiveState, LiveTask};
pub use tracker::TaskStatusTracker;
