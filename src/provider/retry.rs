//! Retry combinator for transient provider failures.
//!
//! The retry predicate is deliberately narrow: only rate-limit classified
//! failures consume the budget. Timeouts, parse failures, and provider
//! errors propagate on the first occurrence.

use crate::models::LlmError;
use rand::Rng;
use std::future::Future;
use std::time::Duration;
use tracing::debug;

/// Backoff schedule for rate-limit retries.
#[derive(Debug, Clone, Copy)]
pub struct BackoffPolicy {
    /// Total attempts, the initial call included
    pub max_attempts: u32,

    /// Delay before the first retry
    pub base_delay: Duration,

    /// Upper bound on any single delay
    pub max_delay: Duration,

    /// Add up to one second of random jitter to each delay
    pub jitter: bool,
}

impl Default for BackoffPolicy {
    /// 3 attempts with delays of roughly 2s, 4s (exponential, capped at 10s).
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(2),
            max_delay: Duration::from_secs(10),
            jitter: true,
        }
    }
}

impl BackoffPolicy {
    /// Delay before retrying after the given failed attempt (1-based):
    /// `base_delay * 2^(attempt-1)`, capped at `max_delay`.
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let exp = attempt.saturating_sub(1).min(16);
        let delay = self
            .base_delay
            .saturating_mul(2u32.saturating_pow(exp))
            .min(self.max_delay);

        if self.jitter {
            delay + Duration::from_millis(rand::thread_rng().gen_range(0..1000))
        } else {
            delay
        }
    }
}

/// Run `op`, retrying while `should_retry` approves the error, up to the
/// policy's attempt budget. The final error is returned unchanged; there is
/// no silent fallback.
pub async fn retry_on<T, F, Fut, P>(
    policy: BackoffPolicy,
    should_retry: P,
    mut op: F,
) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
    P: Fn(&LlmError) -> bool,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt < policy.max_attempts && should_retry(&err) => {
                let delay = policy.delay_after(attempt);
                debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "Transient provider error, backing off"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
