//! Bounded exponential backoff for copy initiation.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

use envcopy_config::RetrySettings;
use tracing::{error, warn};

/// Attempt bound and backoff curve applied to one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first.
    pub max_attempts: u32,
    /// Delay before the second attempt.
    pub initial_delay: Duration,
    /// Factor applied to the delay after each failed attempt.
    pub multiplier: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetrySettings::default())
    }
}

impl From<&RetrySettings> for RetryPolicy {
    fn from(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            initial_delay: Duration::from_secs(settings.initial_delay_secs),
            multiplier: settings.multiplier.max(1),
        }
    }
}

impl RetryPolicy {
    /// Delay slept after failed attempt number `attempt` (1-based).
    #[must_use]
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self
            .multiplier
            .checked_pow(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor)
    }

    /// Total backoff slept before attempt number `attempt` starts.
    #[must_use]
    pub fn total_delay_before(&self, attempt: u32) -> Duration {
        (1..attempt).map(|n| self.delay_after(n)).sum()
    }
}

/// Final error of an operation that exhausted its attempts.
#[derive(Debug)]
pub struct RetryExhausted<E> {
    /// Attempts made.
    pub attempts: u32,
    /// Error of the last attempt.
    pub error: E,
}

/// Run `operation` until it succeeds or `policy.max_attempts` is reached,
/// sleeping `initial_delay * multiplier^(n-1)` after failed attempt `n`.
///
/// # Errors
///
/// Returns the last error with the attempt count once attempts run out.
pub async fn retry_with_backoff<F, Fut, T, E>(
    policy: &RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> Result<T, RetryExhausted<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: Display,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;

    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => {
                error!(
                    operation = %operation_name,
                    attempt,
                    error = %err,
                    "operation failed after max attempts"
                );
                return Err(RetryExhausted {
                    attempts: attempt,
                    error: err,
                });
            }
            Err(err) => {
                let delay = policy.delay_after(attempt);
                warn!(
                    operation = %operation_name,
                    attempt,
                    error = %err,
                    delay_secs = delay.as_secs(),
                    "operation failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use tokio::time::Instant;

    #[test]
    fn default_policy_waits_fifteen_seconds_before_third_attempt() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts, 3);
        assert_eq!(policy.delay_after(1), Duration::from_secs(5));
        assert_eq!(policy.delay_after(2), Duration::from_secs(10));
        assert_eq!(policy.total_delay_before(3), Duration::from_secs(15));
    }

    #[tokio::test]
    async fn succeeds_immediately() {
        let result: Result<i32, RetryExhausted<&str>> =
            retry_with_backoff(&RetryPolicy::default(), "op", |_| async { Ok(42) }).await;
        assert_eq!(result.ok(), Some(42));
    }

    #[tokio::test(start_paused = true)]
    async fn succeeds_after_failures() {
        let count = Arc::new(AtomicU32::new(0));
        let c = count.clone();
        let started = Instant::now();

        let result: Result<i32, RetryExhausted<&str>> =
            retry_with_backoff(&RetryPolicy::default(), "op", |_| {
                let c = c.clone();
                async move {
                    if c.fetch_add(1, Ordering::SeqCst) < 1 {
                        Err("fail")
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.ok(), Some(7));
        assert_eq!(count.load(Ordering::SeqCst), 2);
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn exhausts_after_three_attempts() {
        let attempts_seen = Arc::new(AtomicU32::new(0));
        let seen = attempts_seen.clone();
        let started = Instant::now();

        let result: Result<(), RetryExhausted<String>> =
            retry_with_backoff(&RetryPolicy::default(), "op", |attempt| {
                let seen = seen.clone();
                async move {
                    seen.store(attempt, Ordering::SeqCst);
                    Err(format!("attempt {attempt} rejected"))
                }
            })
            .await;

        let exhausted = result.expect_err("must exhaust");
        assert_eq!(exhausted.attempts, 3);
        assert_eq!(exhausted.error, "attempt 3 rejected");
        assert_eq!(attempts_seen.load(Ordering::SeqCst), 3);
        assert_eq!(started.elapsed(), Duration::from_secs(15));
    }
}
