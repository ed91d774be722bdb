use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

use crate::domain::models::RetryConfig;
use crate::domain::ports::InvestigationError;

/// Exponential backoff for transient investigation errors.
///
/// Only [`InvestigationError::is_transient`] errors are retried; everything
/// else is returned on the first failure.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_retries: u32,
    initial_backoff_ms: u64,
    max_backoff_ms: u64,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, initial_backoff_ms: u64, max_backoff_ms: u64) -> Self {
        Self {
            max_retries,
            initial_backoff_ms: initial_backoff_ms.max(1),
            max_backoff_ms: max_backoff_ms.max(initial_backoff_ms),
        }
    }

    /// A policy that never retries.
    pub fn none() -> Self {
        Self::new(0, 1, 1)
    }

    /// Execute an operation with exponential backoff retry logic
    pub async fn execute<F, Fut, T>(&self, mut operation: F) -> Result<T, InvestigationError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, InvestigationError>>,
    {
        let mut attempt = 0;

        loop {
            match operation().await {
                Ok(result) => {
                    if attempt > 0 {
                        debug!(retries = attempt, "Investigation call succeeded after retries");
                    }
                    return Ok(result);
                }
                Err(err) if self.should_retry(&err, attempt) => {
                    let backoff = self.calculate_backoff(attempt);
                    warn!(
                        attempt = attempt + 1,
                        error = %err,
                        backoff_ms = u64::try_from(backoff.as_millis()).unwrap_or(u64::MAX),
                        "Transient investigation error, retrying"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(err) => {
                    if err.is_transient() {
                        warn!(attempts = attempt + 1, error = %err, "Investigation call retries exhausted");
                    }
                    return Err(err);
                }
            }
        }
    }

    /// Formula: min(initial_backoff * 2^attempt, max_backoff)
    fn calculate_backoff(&self, attempt: u32) -> Duration {
        let backoff_ms = self
            .initial_backoff_ms
            .saturating_mul(2_u64.saturating_pow(attempt))
            .min(self.max_backoff_ms);

        Duration::from_millis(backoff_ms)
    }

    fn should_retry(&self, error: &InvestigationError, attempt: u32) -> bool {
        attempt < self.max_retries && error.is_transient()
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self::new(
            config.max_retries,
            config.initial_backoff_ms,
            config.max_backoff_ms,
        )
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_backoff_calculation() {
        let policy = RetryPolicy::new(5, 1000, 10_000);

        assert_eq!(policy.calculate_backoff(0), Duration::from_millis(1000));
        assert_eq!(policy.calculate_backoff(1), Duration::from_millis(2000));
        assert_eq!(policy.calculate_backoff(3), Duration::from_millis(8000));
        assert_eq!(policy.calculate_backoff(4), Duration::from_millis(10_000));
        assert_eq!(policy.calculate_backoff(40), Duration::from_millis(10_000));
    }

    #[test]
    fn test_should_retry_only_transient_within_budget() {
        let policy = RetryPolicy::new(3, 10, 100);

        assert!(policy.should_retry(&InvestigationError::Timeout, 0));
        assert!(policy.should_retry(&InvestigationError::RateLimited, 2));
        assert!(!policy.should_retry(&InvestigationError::Timeout, 3));
        assert!(!policy.should_retry(
            &InvestigationError::Rejected {
                status: 400,
                message: "bad".to_string()
            },
            0
        ));
    }

    #[tokio::test]
    async fn test_execute_retries_transient_then_succeeds() {
        let policy = RetryPolicy::new(3, 1, 5);
        let calls = Arc::new(AtomicU32::new(0));

        let result = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    if calls.fetch_add(1, Ordering::SeqCst) < 2 {
                        Err(InvestigationError::ServerError {
                            status: 503,
                            message: "busy".to_string(),
                        })
                    } else {
                        Ok(7)
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_execute_does_not_retry_permanent() {
        let policy = RetryPolicy::new(3, 1, 5);
        let calls = Arc::new(AtomicU32::new(0));

        let result: Result<(), _> = policy
            .execute(|| {
                let calls = Arc::clone(&calls);
                async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Err(InvestigationError::InvalidResponse("garbage".to_string()))
                }
            })
            .await;

        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
