//! Retry with jittered exponential backoff.
//!
//! Every REST exchange in this crate runs through [`retry_with_backoff`],
//! which retries transient failures (transport errors and 5xx responses)
//! and gives up immediately on anything else. The same [`RetryPolicy`]
//! shape also drives the subscription reconnect schedule, which uses the
//! identical backoff formula with its own defaults.
//!
//! ## Backoff
//!
//! ```text
//! delay(n) = min(max_period, random(0, 1) * base_period * 2^n)
//! ```
//!
//! Full jitter: the random factor multiplies the whole exponential term,
//! so concurrent clients recovering from the same broker outage spread out
//! instead of stampeding. Delays suspend only the calling task; nothing
//! else is blocked while an operation waits to retry.

use std::future::Future;
use std::time::Duration;

use tokio::time::sleep;
use tracing::{debug, warn};

use crate::error::Result;

/// Retry schedule configuration.
///
/// Immutable once constructed; one instance is shared per executor.
/// `max_attempts` counts *retries*: an operation runs at most
/// `max_attempts + 1` times.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Base delay before the first retry. Subsequent delays double.
    pub base_period: Duration,

    /// Upper bound on any single delay.
    pub max_period: Duration,

    /// Maximum number of retries before failing with the last error.
    pub max_attempts: u32,
}

impl Default for RetryPolicy {
    /// The broker's request defaults: 200 ms base, 15 s cap, 6 retries.
    fn default() -> Self {
        Self {
            base_period: Duration::from_millis(200),
            max_period: Duration::from_secs(15),
            max_attempts: 6,
        }
    }
}

impl RetryPolicy {
    /// Create a policy with explicit settings.
    pub fn new(base_period: Duration, max_period: Duration, max_attempts: u32) -> Self {
        Self {
            base_period,
            max_period,
            max_attempts,
        }
    }

    /// Jittered delay for a given attempt number (0-indexed).
    ///
    /// Never exceeds `max_period`. The jitter factor is drawn fresh on
    /// every call, so two calls for the same attempt rarely agree.
    pub fn backoff(&self, attempt: u32) -> Duration {
        // 2^32 ms already dwarfs any sane cap, so clamping the exponent
        // keeps the f64 arithmetic well away from infinity.
        let exponent = attempt.min(32) as i32;
        let ceiling = self.base_period.as_millis() as f64 * 2f64.powi(exponent);
        let jittered = Duration::from_millis((rand::random::<f64>() * ceiling) as u64);
        jittered.min(self.max_period)
    }
}

/// Run `operation` until it succeeds, retrying transient failures.
///
/// `operation` performs one request/response exchange per invocation.
/// Failures are classified by [`ClientError::is_retryable`]: transport
/// errors and 5xx-class broker responses are retried after a jittered
/// backoff, everything else fails the call immediately. Once the policy's
/// retry budget is spent, the *last observed error* is returned.
///
/// Attempt state lives entirely on this call's stack; the policy itself
/// carries no state across calls.
///
/// [`ClientError::is_retryable`]: crate::error::ClientError::is_retryable
pub async fn retry_with_backoff<F, Fut, T>(policy: &RetryPolicy, mut operation: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts_made: u32 = 0;

    loop {
        match operation().await {
            Ok(value) => {
                if attempts_made > 0 {
                    debug!(attempts = attempts_made, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) => {
                if !err.is_retryable() {
                    return Err(err);
                }
                if attempts_made >= policy.max_attempts {
                    warn!(
                        attempts = attempts_made,
                        error = %err,
                        "retry budget exhausted, giving up"
                    );
                    return Err(err);
                }

                let delay = policy.backoff(attempts_made);
                debug!(
                    attempt = attempts_made + 1,
                    delay_ms = delay.as_millis() as u64,
                    error = %err,
                    "transient failure, backing off"
                );
                sleep(delay).await;
                attempts_made += 1;
            }
        }
    }
}
