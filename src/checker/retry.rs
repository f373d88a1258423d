//! Retry and backoff
//!
//! Two independent tiers:
//! - request level: a 5xx is retried a bounded number of times with a short
//!   fixed delay before it reaches the classifier
//! - stage level: a rate-limited stage is rescheduled as a whole with
//!   exponential backoff, up to a capped number of attempts

use crate::checker::{classify, LinkProbe, RawOutcome, Verdict};
use crate::config::RetryConfig;
use std::time::Duration;

/// Request-level retry policy for server errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Extra attempts after the first one
    pub retries: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl RetryPolicy {
    pub fn new(retries: u32, delay: Duration) -> Self {
        Self { retries, delay }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(
            config.server_error_retries,
            Duration::from_millis(config.server_error_delay),
        )
    }

    /// A policy that never retries
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }
}

/// Probes a URL, retrying server errors according to the policy
///
/// # Arguments
///
/// * `probe` - The probe issuing requests
/// * `url` - The URL to check
/// * `policy` - Request-level retry policy
///
/// # Returns
///
/// The last observed outcome. A 5xx is returned only when every attempt
/// answered with a server error.
pub async fn check_with_retry(probe: &dyn LinkProbe, url: &str, policy: &RetryPolicy) -> RawOutcome {
    let mut attempt = 0;
    loop {
        let outcome = probe.probe(url).await;
        if classify(&outcome) != Verdict::RetryServerError || attempt >= policy.retries {
            return outcome;
        }

        attempt += 1;
        tracing::debug!(url, attempt, %outcome, "server error, retrying");
        tokio::time::sleep(policy.delay).await;
    }
}

/// Stage-level exponential backoff
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageBackoff {
    pub max_attempts: u32,
    pub base: Duration,
    pub cap: Duration,
}

impl StageBackoff {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.stage_max_attempts,
            base: Duration::from_secs(config.stage_backoff_base),
            cap: Duration::from_secs(config.stage_backoff_cap),
        }
    }

    /// Delay before re-running a stage whose `attempt` (0-based) was rate limited
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.checked_pow(attempt).unwrap_or(u32::MAX);
        self.base.saturating_mul(factor).min(self.cap)
    }

    /// True when the stage may run again after `attempt` (0-based) failed
    pub fn can_retry(&self, attempt: u32) -> bool {
        attempt + 1 < self.max_attempts
    }
}
