//! Configuration for dispatch rate policy and execution.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::kind::WorkKind;

/// Token-bucket parameters for one work kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RatePolicy {
    /// Sustained admissions per second (refill rate).
    pub per_second: u32,

    /// Bucket capacity - admissions allowed back to back when idle.
    pub burst: u32,

    /// Longest a submission may wait for a token.
    ///
    /// `None` blocks until a token is available. With a bound, an exhausted
    /// bucket turns into a `Throttled` error once the wait expires.
    pub max_wait: Option<Duration>,
}

impl RatePolicy {
    /// Rate with a burst equal to the rate and no wait bound.
    pub fn per_second(per_second: u32) -> Self {
        Self {
            per_second,
            burst: per_second,
            max_wait: None,
        }
    }

    /// Set the bucket capacity.
    pub fn with_burst(mut self, burst: u32) -> Self {
        self.burst = burst;
        self
    }

    /// Bound the admission wait.
    pub fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = Some(max_wait);
        self
    }
}

/// Configuration for the analysis pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Bucket for social/contact extraction.
    ///
    /// Default: 100 per second.
    pub social: RatePolicy,

    /// Bucket for classification.
    ///
    /// Default: 100 per second.
    pub classification: RatePolicy,

    /// Bucket for domain/geo lookups.
    ///
    /// Default: 50 per second.
    pub location: RatePolicy,

    /// Upper bound on a single executor invocation.
    ///
    /// Expiry is recorded as a `timeout` failure. Default: 30s.
    pub executor_timeout: Duration,

    /// Attempts the reconciler makes before giving up on a contended key.
    ///
    /// Default: 3.
    pub upsert_attempts: usize,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            social: RatePolicy::per_second(100),
            classification: RatePolicy::per_second(100),
            location: RatePolicy::per_second(50),
            executor_timeout: Duration::from_secs(30),
            upsert_attempts: 3,
        }
    }
}

impl AnalysisConfig {
    /// Create a new config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn rate_policy(&self, kind: WorkKind) -> RatePolicy {
        match kind {
            WorkKind::Social => self.social,
            WorkKind::Classification => self.classification,
            WorkKind::Location => self.location,
        }
    }

    /// Replace the rate policy for one kind.
    pub fn with_rate_policy(mut self, kind: WorkKind, policy: RatePolicy) -> Self {
        match kind {
            WorkKind::Social => self.social = policy,
            WorkKind::Classification => self.classification = policy,
            WorkKind::Location => self.location = policy,
        }
        self
    }

    /// Set the executor timeout.
    pub fn with_executor_timeout(mut self, timeout: Duration) -> Self {
        self.executor_timeout = timeout;
        self
    }

    /// Set the reconciler attempt budget.
    pub fn with_upsert_attempts(mut self, attempts: usize) -> Self {
        self.upsert_attempts = attempts.max(1);
        self
    }
}
