//! Backoff-retry executor for transient external-call failures.
//!
//! Delays grow as `initial_delay * backoff_factor^attempt` and are awaited
//! with `tokio::time::sleep`, so a waiting retry never blocks other work.

use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Configuration for retry behavior.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Retries after the first attempt; total attempts are `max_retries + 1`.
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    /// Multiplier applied per attempt.
    #[serde(default = "default_backoff_factor")]
    pub backoff_factor: f64,
    /// Optional cap on a single delay, in milliseconds.
    #[serde(default)]
    pub max_delay_ms: Option<u64>,
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    1000
}

fn default_backoff_factor() -> f64 {
    2.0
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            backoff_factor: default_backoff_factor(),
            max_delay_ms: None,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a policy that never retries.
    #[must_use]
    pub fn none() -> Self {
        Self::default().with_max_retries(0)
    }

    /// Sets the maximum number of retries.
    #[must_use]
    pub fn with_max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    /// Sets the initial delay.
    #[must_use]
    pub fn with_initial_delay_ms(mut self, delay: u64) -> Self {
        self.initial_delay_ms = delay;
        self
    }

    /// Sets the backoff factor.
    #[must_use]
    pub fn with_backoff_factor(mut self, factor: f64) -> Self {
        self.backoff_factor = factor;
        self
    }

    /// Caps individual delays.
    #[must_use]
    pub fn with_max_delay_ms(mut self, delay: u64) -> Self {
        self.max_delay_ms = Some(delay);
        self
    }

    /// Total operation invocations on full exhaustion.
    #[must_use]
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Delay scheduled after the failure of `attempt` (0-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let mut millis = self.initial_delay_ms as f64 * self.backoff_factor.powi(exponent);
        if let Some(cap) = self.max_delay_ms {
            millis = millis.min(cap as f64);
        }
        Duration::from_millis(millis.max(0.0).round() as u64)
    }

    /// Runs `operation` with this policy, retrying every failure.
    pub async fn run<T, E, F, Fut>(&self, operation: F) -> Result<T, E>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Display,
    {
        retry_with_backoff(self, operation, |_, _| Ok(true)).await
    }
}

/// Executes an operation with exponential backoff.
///
/// `operation` receives the 0-based attempt index. After a failure the error
/// is returned unchanged when the retry budget is spent or when
/// `should_retry` answers `Ok(false)`. If `should_retry` itself fails, its
/// error replaces the original and is returned without further attempts.
pub async fn retry_with_backoff<T, E, F, Fut, P>(
    policy: &RetryPolicy,
    mut operation: F,
    mut should_retry: P,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    P: FnMut(&E, u32) -> Result<bool, E>,
    E: Display,
{
    let mut attempt = 0;

    loop {
        match operation(attempt).await {
            Ok(result) => return Ok(result),
            Err(error) => {
                if attempt >= policy.max_retries {
                    tracing::debug!(attempt, error = %error, "Retries exhausted");
                    return Err(error);
                }
                if !should_retry(&error, attempt)? {
                    tracing::debug!(attempt, error = %error, "Error is not retryable");
                    return Err(error);
                }

                let delay = policy.delay_for(attempt);
                tracing::debug!(
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %error,
                    "Retrying after error"
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;
    use tokio::time::Instant;

    fn assert_elapsed_ms(start: Instant, expected: u64) {
        let elapsed = start.elapsed();
        assert!(
            elapsed >= Duration::from_millis(expected)
                && elapsed < Duration::from_millis(expected + 5),
            "expected ~{expected}ms of scheduled delay, got {elapsed:?}"
        );
    }

    #[test]
    fn test_policy_default() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_retries, 3);
        assert_eq!(policy.initial_delay_ms, 1000);
        assert_eq!(policy.max_attempts(), 4);
    }

    #[test]
    fn test_delay_exponential() {
        let policy = RetryPolicy::new().with_initial_delay_ms(100);

        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
    }

    #[test]
    fn test_delay_custom_factor_and_cap() {
        let policy = RetryPolicy::new()
            .with_initial_delay_ms(100)
            .with_backoff_factor(3.0)
            .with_max_delay_ms(500);

        assert_eq!(policy.delay_for(1), Duration::from_millis(300));
        assert_eq!(policy.delay_for(2), Duration::from_millis(500));
        assert_eq!(policy.delay_for(30), Duration::from_millis(500));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_try_success_has_no_delay() {
        let start = Instant::now();
        let result: Result<i32, String> = RetryPolicy::new().run(|_| async { Ok(42) }).await;

        assert_eq!(result, Ok(42));
        assert_elapsed_ms(start, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_success_at_attempt_k_schedules_k_delays() {
        let policy = RetryPolicy::new();
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result: Result<&str, String> = policy
            .run(move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move {
                    if attempt < 2 {
                        Err(format!("attempt {attempt} failed"))
                    } else {
                        Ok("done")
                    }
                }
            })
            .await;

        assert_eq!(result, Ok("done"));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        // 1000ms after attempt 0, 2000ms after attempt 1.
        assert_elapsed_ms(start, 3000);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhaustion_invokes_max_retries_plus_one() {
        let policy = RetryPolicy::new().with_max_retries(2).with_initial_delay_ms(10);
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), String> = policy
            .run(move |attempt| {
                counter.fetch_add(1, Ordering::SeqCst);
                async move { Err(format!("failure {attempt}")) }
            })
            .await;

        assert_eq!(result, Err("failure 2".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_should_retry_false_stops_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let start = Instant::now();

        let counter = calls.clone();
        let result: Result<(), String> = retry_with_backoff(
            &RetryPolicy::new(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("permanent".to_string()) }
            },
            |_, _| Ok(false),
        )
        .await;

        assert_eq!(result, Err("permanent".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_elapsed_ms(start, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_error_supersedes_original() {
        let calls = Arc::new(AtomicU32::new(0));

        let counter = calls.clone();
        let result: Result<(), String> = retry_with_backoff(
            &RetryPolicy::new(),
            move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
                async { Err("original".to_string()) }
            },
            |_, _| Err("predicate exploded".to_string()),
        )
        .await;

        assert_eq!(result, Err("predicate exploded".to_string()));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_predicate_sees_attempt_index() {
        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));

        let recorder = seen.clone();
        let result: Result<(), String> = retry_with_backoff(
            &RetryPolicy::new().with_initial_delay_ms(1),
            |_| async { Err("nope".to_string()) },
            move |_, attempt| {
                recorder.lock().push(attempt);
                Ok(attempt < 1)
            },
        )
        .await;

        assert!(result.is_err());
        assert_eq!(*seen.lock(), vec![0, 1]);
    }
}
