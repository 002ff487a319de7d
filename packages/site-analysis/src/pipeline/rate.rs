//! Per-kind admission control.
//!
//! One token bucket per work kind, built on the governor crate. The gate
//! governs submission only; admitted work runs without further throttling.

use governor::{Quota, RateLimiter};
use nonzero_ext::nonzero;
use std::num::NonZeroU32;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::error::{AnalysisError, Result};
use crate::types::{
    config::{AnalysisConfig, RatePolicy},
    kind::WorkKind,
};

type DirectRateLimiter = RateLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

struct Bucket {
    limiter: DirectRateLimiter,
    max_wait: Option<Duration>,
}

impl Bucket {
    fn new(policy: RatePolicy) -> Self {
        let rate = NonZeroU32::new(policy.per_second).unwrap_or(nonzero!(1u32));
        let burst = NonZeroU32::new(policy.burst).unwrap_or(rate);
        Self {
            limiter: RateLimiter::direct(Quota::per_second(rate).allow_burst(burst)),
            max_wait: policy.max_wait,
        }
    }
}

/// Token buckets for every work kind.
pub struct RateGate {
    social: Bucket,
    classification: Bucket,
    location: Bucket,
}

impl RateGate {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            social: Bucket::new(config.social),
            classification: Bucket::new(config.classification),
            location: Bucket::new(config.location),
        }
    }

    fn bucket(&self, kind: WorkKind) -> &Bucket {
        match kind {
            WorkKind::Social => &self.social,
            WorkKind::Classification => &self.classification,
            WorkKind::Location => &self.location,
        }
    }

    /// Take one token for `kind`.
    ///
    /// Blocks while the bucket is empty. With a `max_wait` configured, an
    /// exhausted bucket yields `Throttled` once that wait has elapsed.
    pub async fn admit(&self, kind: WorkKind) -> Result<()> {
        let bucket = self.bucket(kind);
        if bucket.limiter.check().is_ok() {
            return Ok(());
        }

        let started = Instant::now();
        debug!(kind = %kind, "Rate bucket exhausted, waiting for a token");

        match bucket.max_wait {
            None => bucket.limiter.until_ready().await,
            Some(max_wait) => {
                tokio::time::timeout(max_wait, bucket.limiter.until_ready())
                    .await
                    .map_err(|_| AnalysisError::Throttled {
                        kind,
                        waited: started.elapsed(),
                    })?;
            }
        }

        debug!(kind = %kind, waited_ms = started.elapsed().as_millis() as u64, "Admitted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate_with(kind: WorkKind, policy: RatePolicy) -> RateGate {
        RateGate::new(&AnalysisConfig::default().with_rate_policy(kind, policy))
    }

    #[tokio::test]
    async fn test_burst_admits_immediately() {
        let gate = gate_with(WorkKind::Social, RatePolicy::per_second(1).with_burst(3));
        let start = Instant::now();
        for _ in 0..3 {
            gate.admit(WorkKind::Social).await.unwrap();
        }
        assert!(start.elapsed() < Duration::from_millis(200));
    }

    #[tokio::test]
    async fn test_exhausted_bucket_delays_instead_of_failing() {
        let gate = gate_with(WorkKind::Location, RatePolicy::per_second(2));
        let start = Instant::now();
        for _ in 0..3 {
            gate.admit(WorkKind::Location).await.unwrap();
        }
        // Two tokens up front, the third after half a second
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    #[tokio::test]
    async fn test_bounded_wait_turns_into_throttled() {
        let gate = gate_with(
            WorkKind::Location,
            RatePolicy::per_second(1).with_max_wait(Duration::from_millis(20)),
        );
        gate.admit(WorkKind::Location).await.unwrap();

        let err = gate.admit(WorkKind::Location).await.unwrap_err();
        assert!(matches!(
            err,
            AnalysisError::Throttled {
                kind: WorkKind::Location,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_buckets_are_independent_per_kind() {
        let config = AnalysisConfig::default().with_rate_policy(
            WorkKind::Location,
            RatePolicy::per_second(1).with_max_wait(Duration::from_millis(10)),
        );
        let gate = RateGate::new(&config);
        gate.admit(WorkKind::Location).await.unwrap();

        // Location is drained; social is untouched
        gate.admit(WorkKind::Social).await.unwrap();
        assert!(gate.admit(WorkKind::Location).await.is_err());
    }
}
