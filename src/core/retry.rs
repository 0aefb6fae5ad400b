//! Classify-then-backoff retry for provider calls.
//!
//! [`RetryPolicy`] runs an async operation and retries it only when a
//! predicate classifies the failure as transient. Waits grow as
//! `multiplier * 2^attempt` plus up to one second of jitter, capped at
//! `max_wait`.

use std::future::Future;
use std::time::Duration;

use tracing::warn;

use crate::error::AgentError;

/// Default number of attempts (including the first).
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default backoff multiplier.
pub const DEFAULT_MULTIPLIER: Duration = Duration::from_secs(1);
/// Default cap on a single backoff wait.
pub const DEFAULT_MAX_WAIT: Duration = Duration::from_secs(120);

/// Retry policy with exponential backoff and jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first call.
    pub max_retries: u32,
    /// Base unit of the exponential backoff.
    pub multiplier: Duration,
    /// Upper bound on any single wait.
    pub max_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            multiplier: DEFAULT_MULTIPLIER,
            max_wait: DEFAULT_MAX_WAIT,
        }
    }
}

impl RetryPolicy {
    /// Creates a policy with the given attempt budget and default timings.
    #[must_use]
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    /// Sets the backoff multiplier.
    #[must_use]
    pub const fn with_multiplier(mut self, multiplier: Duration) -> Self {
        self.multiplier = multiplier;
        self
    }

    /// Sets the maximum single wait.
    #[must_use]
    pub const fn with_max_wait(mut self, max_wait: Duration) -> Self {
        self.max_wait = max_wait;
        self
    }

    /// Computes the wait before retrying after the given 0-based attempt.
    ///
    /// `jitter` is a fraction in `[0, 1)` seconds added before capping.
    #[must_use]
    pub fn backoff(&self, attempt: u32, jitter: f64) -> Duration {
        let factor = 2_f64.powi(i32::try_from(attempt).unwrap_or(i32::MAX));
        let secs = self.multiplier.as_secs_f64().mul_add(factor, jitter);
        let capped = secs.min(self.max_wait.as_secs_f64());
        Duration::try_from_secs_f64(capped).unwrap_or(self.max_wait)
    }

    /// Runs `operation`, retrying on transient provider errors.
    ///
    /// Equivalent to [`execute_if`](Self::execute_if) with
    /// [`AgentError::is_transient`] as the predicate.
    pub async fn execute<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
    {
        self.execute_if(label, operation, AgentError::is_transient)
            .await
    }

    /// Runs `operation`, retrying while `is_retryable` accepts the failure.
    ///
    /// Non-retryable failures are returned immediately. When the attempt
    /// budget is exhausted the last failure is returned unchanged.
    pub async fn execute_if<T, F, Fut, P>(
        &self,
        label: &str,
        mut operation: F,
        is_retryable: P,
    ) -> Result<T, AgentError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, AgentError>>,
        P: Fn(&AgentError) -> bool,
    {
        let max_attempts = self.max_retries.max(1);
        let mut attempt: u32 = 0;
        loop {
            match operation().await {
                Ok(value) => return Ok(value),
                Err(err) if !is_retryable(&err) => return Err(err),
                Err(err) if attempt + 1 >= max_attempts => return Err(err),
                Err(err) => {
                    let wait = self.backoff(attempt, fastrand::f64());
                    warn!(
                        operation = label,
                        attempt = attempt + 1,
                        max_attempts,
                        wait_secs = wait.as_secs_f64(),
                        error = %err,
                        "transient provider failure, backing off before retry"
                    );
                    tokio::time::sleep(wait).await;
                    attempt += 1;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn transient() -> AgentError {
        AgentError::RateLimited {
            message: "429".into(),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_always_transient_runs_exactly_max_retries() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new(3);
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = policy
            .execute("op", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert!(matches!(result, Err(AgentError::RateLimited { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_propagates_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let start = tokio::time::Instant::now();
        let result: Result<(), _> = RetryPolicy::default()
            .execute("op", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(AgentError::StructuredOutput {
                        message: "bad".into(),
                        content: String::new(),
                    })
                }
            })
            .await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(start.elapsed() < Duration::from_millis(1));
        assert!(matches!(result, Err(AgentError::StructuredOutput { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn test_recovers_after_transient_failures() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result = RetryPolicy::new(5)
            .execute("op", || {
                let counter = Arc::clone(&counter);
                async move {
                    if counter.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(transient())
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;
        assert_eq!(result.ok(), Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_custom_predicate() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = RetryPolicy::new(4)
            .execute_if(
                "op",
                || {
                    let counter = Arc::clone(&counter);
                    async move {
                        counter.fetch_add(1, Ordering::SeqCst);
                        Err(AgentError::ApiRequest {
                            message: "bad gateway".into(),
                            status: Some(502),
                        })
                    }
                },
                |e| matches!(e, AgentError::ApiRequest { status: Some(502), .. }),
            )
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[test]
    fn test_backoff_growth_and_cap() {
        let policy = RetryPolicy::default().with_max_wait(Duration::from_secs(10));
        assert_eq!(policy.backoff(0, 0.0), Duration::from_secs(1));
        assert_eq!(policy.backoff(2, 0.5), Duration::from_millis(4500));
        assert_eq!(policy.backoff(10, 0.9), Duration::from_secs(10));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_budget_still_runs_once() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = Arc::clone(&calls);
        let result: Result<(), _> = RetryPolicy::new(0)
            .execute("op", || {
                let counter = Arc::clone(&counter);
                async move {
                    counter.fetch_add(1, Ordering::SeqCst);
                    Err(transient())
                }
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
