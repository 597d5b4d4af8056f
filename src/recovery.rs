//! Bounded retry with exponential backoff.
//!
//! Nothing in the orchestrator retries on its own; callers that want a
//! failed wave or task re-run wrap it in [`retry_with_backoff`] or an
//! [`ErrorRecovery`] instance.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;

use crate::error::{Error, Result};
use crate::{wlog_debug, wlog_warn};

/// Default total attempts, the first one included.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BASE_DELAY_MS: u64 = 1_000;
pub const DEFAULT_MAX_DELAY_MS: u64 = 30_000;

/// Upper bound of the random extra delay when jitter is on.
const JITTER_FRACTION: f64 = 0.25;

fn duration_to_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// How often and how patiently to retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first. Zero behaves like one.
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    /// Add up to 25% random extra delay, still capped at `max_delay_ms`.
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay_ms: DEFAULT_BASE_DELAY_MS,
            max_delay_ms: DEFAULT_MAX_DELAY_MS,
            jitter: false,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration, max_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay_ms: duration_to_millis(base_delay),
            max_delay_ms: duration_to_millis(max_delay),
            jitter: false,
        }
    }

    #[must_use]
    pub fn with_jitter(mut self, jitter: bool) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn base_delay(&self) -> Duration {
        Duration::from_millis(self.base_delay_ms)
    }

    pub fn max_delay(&self) -> Duration {
        Duration::from_millis(self.max_delay_ms)
    }

    fn total_attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Wait after the `attempt`-th failure (1-based):
    /// `min(base * 2^(attempt-1), max)`, before jitter.
    pub fn backoff_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1);
        let factor = 1u64.checked_shl(exponent).unwrap_or(u64::MAX);
        let delay_ms = self.base_delay_ms.saturating_mul(factor).min(self.max_delay_ms);
        Duration::from_millis(delay_ms)
    }

    fn sleep_for(&self, attempt: u32) -> Duration {
        let delay = self.backoff_delay(attempt);
        if !self.jitter {
            return delay;
        }
        let extra = rand::thread_rng().gen_range(0.0..=JITTER_FRACTION);
        delay.mul_f64(1.0 + extra).min(self.max_delay())
    }
}

/// Run `operation` until it succeeds or the policy's attempts are spent.
///
/// The first attempt starts immediately. After a failure the call sleeps
/// for [`RetryPolicy::backoff_delay`] and tries again. On success no
/// further waiting happens.
///
/// # Errors
/// `RetriesExhausted`, carrying the last error as its source.
pub async fn retry_with_backoff<T, E, F, Fut>(mut operation: F, policy: &RetryPolicy) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = std::result::Result<T, E>>,
    E: Into<Box<dyn std::error::Error + Send + Sync>>,
{
    let attempts = policy.total_attempts();
    let mut attempt = 1;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    wlog_debug!("retry: succeeded on attempt {}/{}", attempt, attempts);
                }
                return Ok(value);
            }
            Err(e) => {
                let source = e.into();
                if attempt >= attempts {
                    wlog_warn!("retry: giving up after {} attempts: {}", attempts, source);
                    return Err(Error::RetriesExhausted {
                        attempts: attempt,
                        source,
                    });
                }
                let delay = policy.sleep_for(attempt);
                wlog_debug!(
                    "retry: attempt {}/{} failed ({}), waiting {:?}",
                    attempt,
                    attempts,
                    source,
                    delay
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

/// Retry engine bound to a default policy.
#[derive(Debug, Clone, Default)]
pub struct ErrorRecovery {
    policy: RetryPolicy,
}

impl ErrorRecovery {
    pub fn new(policy: RetryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    pub async fn retry<T, E, F, Fut>(&self, operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        retry_with_backoff(operation, &self.policy).await
    }
}
