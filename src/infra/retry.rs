//! Retry with exponential backoff
//!
//! Shared by queue publishes and dependency installs. A policy either caps
//! the number of attempts or retries forever.

use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Retry policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt; `None` retries forever
    pub retries: Option<u32>,
    /// Delay before the first retry
    pub min: Duration,
    /// Upper bound for any single delay
    pub max: Duration,
}

impl RetryPolicy {
    /// Policy with a bounded number of retries
    pub const fn bounded(retries: u32, min: Duration, max: Duration) -> Self {
        Self {
            retries: Some(retries),
            min,
            max,
        }
    }

    /// Policy that never gives up
    pub const fn infinite(min: Duration, max: Duration) -> Self {
        Self {
            retries: None,
            min,
            max,
        }
    }

    /// Total attempts allowed, `None` when unbounded
    pub fn attempts(&self) -> Option<u32> {
        self.retries.map(|r| r.saturating_add(1))
    }

    fn backoff(&self) -> ExponentialBackoff {
        ExponentialBackoffBuilder::new()
            .with_initial_interval(self.min)
            .with_max_interval(self.max.max(self.min))
            .with_multiplier(2.0)
            .with_randomization_factor(0.1)
            .with_max_elapsed_time(None)
            .build()
    }
}

/// Run `op` until it succeeds, the policy is exhausted, or `retryable` rejects an error
///
/// Returns the last error when giving up.
pub async fn retry<T, E, F, Fut, R>(
    policy: &RetryPolicy,
    label: &str,
    retryable: R,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
    R: Fn(&E) -> bool,
{
    let attempts = policy.attempts();
    let mut attempt: u32 = 0;

    backoff::future::retry_notify(
        policy.backoff(),
        || {
            attempt += 1;
            let current = attempt;
            let fut = op();
            let exhausted = attempts.is_some_and(|max| current >= max);
            let retryable = &retryable;
            async move {
                match fut.await {
                    Ok(value) => Ok(value),
                    Err(e) if exhausted || !retryable(&e) => Err(backoff::Error::permanent(e)),
                    Err(e) => Err(backoff::Error::transient(e)),
                }
            }
        },
        |e: E, wait: Duration| {
            tracing::warn!("{label} failed, retrying in {}ms: {e}", wait.as_millis());
        },
    )
    .await
}
