//! Per-run bound on in-flight search tasks.
//!
//! Each workflow run owns its own [`ConcurrencyLimiter`]; two runs asking
//! for the same parallelism never share slots. Permits release their slot
//! when dropped, so every exit path of a task body (success, error,
//! early return) gives the slot back.

use std::sync::Arc;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tracing::debug;

use crate::error::AgentError;

/// Bounds the number of concurrently executing tasks.
///
/// Cloning is cheap and shares the same slots, which is how fan-out
/// tasks spawned onto the runtime reach the limiter.
#[derive(Debug, Clone)]
pub struct ConcurrencyLimiter {
    semaphore: Arc<Semaphore>,
    limit: usize,
}

/// A held slot. The slot is released when the permit is dropped.
#[derive(Debug)]
#[must_use = "dropping a permit releases its slot immediately"]
pub struct Permit {
    _inner: OwnedSemaphorePermit,
}

impl ConcurrencyLimiter {
    /// Creates a limiter allowing `limit` concurrent holders.
    ///
    /// A limit of zero is raised to one so the workflow can make progress.
    #[must_use]
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(limit)),
            limit,
        }
    }

    /// Configured number of slots.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }

    /// Slots currently free.
    #[must_use]
    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Waits until a slot is free and takes it.
    ///
    /// # Errors
    ///
    /// Returns [`AgentError::Orchestration`] if the limiter was closed.
    pub async fn acquire(&self) -> Result<Permit, AgentError> {
        let inner = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|e| AgentError::Orchestration {
                message: format!("Concurrency limiter acquire failed: {e}"),
            })?;
        debug!(available = self.available(), limit = self.limit, "permit acquired");
        Ok(Permit { _inner: inner })
    }

    /// Returns a slot to the limiter.
    ///
    /// Equivalent to dropping the permit.
    pub fn release(&self, permit: Permit) {
        drop(permit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn test_never_exceeds_limit_under_load() {
        let limiter = ConcurrencyLimiter::new(2);
        let in_flight = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..12 {
            let limiter = limiter.clone();
            let in_flight = Arc::clone(&in_flight);
            let peak = Arc::clone(&peak);
            handles.push(tokio::spawn(async move {
                let _permit = limiter.acquire().await?;
                let now = in_flight.fetch_add(1, Ordering::SeqCst) + 1;
                peak.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                in_flight.fetch_sub(1, Ordering::SeqCst);
                Ok::<_, AgentError>(())
            }));
        }
        for handle in handles {
            assert!(matches!(handle.await, Ok(Ok(()))));
        }

        assert_eq!(peak.load(Ordering::SeqCst), 2);
        assert_eq!(limiter.available(), 2);
    }

    #[tokio::test]
    async fn test_release_on_error_path() {
        let limiter = ConcurrencyLimiter::new(1);
        let failing = {
            let limiter = limiter.clone();
            async move {
                let _permit = limiter.acquire().await?;
                Err::<(), _>(AgentError::Orchestration {
                    message: "boom".into(),
                })
            }
        };
        assert!(failing.await.is_err());
        assert_eq!(limiter.available(), 1);
    }

    #[tokio::test]
    async fn test_explicit_release() {
        let limiter = ConcurrencyLimiter::new(1);
        let permit = limiter.acquire().await;
        assert!(permit.is_ok());
        assert_eq!(limiter.available(), 0);
        if let Ok(permit) = permit {
            limiter.release(permit);
        }
        assert_eq!(limiter.available(), 1);
    }

    #[test]
    fn test_zero_limit_raised_to_one() {
        let limiter = ConcurrencyLimiter::new(0);
        assert_eq!(limiter.limit(), 1);
    }

    #[tokio::test]
    async fn test_separate_limiters_do_not_share_slots() {
        let a = ConcurrencyLimiter::new(1);
        let b = ConcurrencyLimiter::new(1);
        let _held = a.acquire().await;
        assert_eq!(a.available(), 0);
        assert_eq!(b.available(), 1);
    }
}
