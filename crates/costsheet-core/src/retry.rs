//! Bounded retry for throttled collaborator calls
//!
//! Only [`ServiceErrorKind::Throttling`](crate::error::ServiceErrorKind)
//! failures are retried. Every other failure, malformed requests in
//! particular, is returned on the first attempt exactly as produced. When the
//! attempts run out the last throttling error is returned unchanged.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// Exponential backoff policy for throttled calls
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one; `1` disables retrying
    pub max_attempts: u32,
    /// Pause before the second attempt
    pub base_delay: Duration,
    /// Upper bound for any single pause
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(5),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Pause before attempt number `attempt + 1` (attempts counted from 1)
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }

    /// Run `op`, retrying throttling failures with backoff
    pub async fn run<T, F, Fut>(&self, operation: &str, mut op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut attempt = 1;
        loop {
            match op().await {
                Err(err) if err.is_throttling() && attempt < self.max_attempts => {
                    let delay = self.delay_for(attempt);
                    warn!(
                        "{operation} throttled (attempt {attempt}/{}), retrying in {:?}",
                        self.max_attempts, delay
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{CostsheetError, ServiceError, ServiceErrorKind};
    use std::cell::Cell;

    fn quick() -> RetryPolicy {
        RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(2),
        }
    }

    fn failure(kind: ServiceErrorKind) -> CostsheetError {
        ServiceError::new(kind, "GetCostAndUsage", "boom").into()
    }

    #[tokio::test]
    async fn test_throttling_is_retried_until_success() {
        let calls = Cell::new(0);
        let result = quick()
            .run("GetCostAndUsage", || {
                calls.set(calls.get() + 1);
                let n = calls.get();
                async move {
                    if n < 3 {
                        Err(failure(ServiceErrorKind::Throttling))
                    } else {
                        Ok(n)
                    }
                }
            })
            .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_exhausted_retries_return_last_error() {
        let calls = Cell::new(0);
        let result: Result<()> = quick()
            .run("GetCostAndUsage", || {
                calls.set(calls.get() + 1);
                async { Err(failure(ServiceErrorKind::Throttling)) }
            })
            .await;
        assert_eq!(calls.get(), 3);
        assert!(result.unwrap_err().is_throttling());
    }

    #[tokio::test]
    async fn test_validation_fails_immediately() {
        let calls = Cell::new(0);
        let result: Result<()> = quick()
            .run("GetCostAndUsage", || {
                calls.set(calls.get() + 1);
                async { Err(failure(ServiceErrorKind::Validation)) }
            })
            .await;
        assert_eq!(calls.get(), 1);
        assert_eq!(
            result.unwrap_err().service_error().map(|e| e.kind),
            Some(ServiceErrorKind::Validation)
        );
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(400));
        assert_eq!(policy.delay_for(10), Duration::from_secs(5));
    }
}
