//! Retry utilities with exponential backoff for store operations that can race.

use std::time::Duration;
use tokio::time::sleep;

use crate::store::StorageError;

/// Configuration for retry behavior
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first one
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
        }
    }
}

impl RetryConfig {
    /// Set the attempt budget
    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.max_attempts = attempts;
        self
    }

    /// Retry immediately without sleeping (tests, drills)
    pub fn without_delay(mut self) -> Self {
        self.initial_delay = Duration::ZERO;
        self.max_delay = Duration::ZERO;
        self
    }

    /// Delay before the attempt following `attempt` (1-based)
    pub fn delay_after(&self, attempt: u32) -> Duration {
        if attempt <= 1 {
            return self.initial_delay.min(self.max_delay);
        }
        let exp_delay = self.initial_delay.as_secs_f64()
            * self.backoff_multiplier.powf(f64::from(attempt) - 1.0);
        Duration::from_secs_f64(exp_delay.min(self.max_delay.as_secs_f64()))
    }
}

/// Store errors that are worth another attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransientError {
    /// Another writer inserted the same external identifier first
    IdentifierRace(String),
}

impl TransientError {
    /// Check if a StorageError represents a transient error
    pub fn from_storage_error(err: &StorageError) -> Option<Self> {
        match err {
            StorageError::DuplicateIdentifier(identifier) => {
                Some(TransientError::IdentifierRace(identifier.clone()))
            }
            _ => None,
        }
    }
}

/// Result of a retry operation
#[derive(Debug)]
pub enum RetryResult<T> {
    /// Operation succeeded, with the number of attempts it took
    Success(T, u32),
    /// Operation failed with a transient error after all retries
    TransientFailure(StorageError, TransientError, u32),
    /// Operation failed with a permanent error
    PermanentFailure(StorageError),
}

/// Execute an async store operation, retrying transient failures with backoff
///
/// Permanent errors are returned on the first occurrence; transient ones are
/// retried until `config.max_attempts` attempts have been made.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, operation: F) -> RetryResult<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, StorageError>>,
{
    let mut attempts = 0;
    let mut operation = operation;

    loop {
        attempts += 1;

        match operation().await {
            Ok(result) => {
                if attempts > 1 {
                    tracing::debug!(
                        "Operation succeeded on attempt {} after {} transient failures",
                        attempts,
                        attempts - 1
                    );
                }
                return RetryResult::Success(result, attempts);
            }
            Err(error) => {
                let Some(transient) = TransientError::from_storage_error(&error) else {
                    return RetryResult::PermanentFailure(error);
                };

                if attempts >= config.max_attempts {
                    tracing::warn!("Operation failed after {} attempts: {}", attempts, error);
                    return RetryResult::TransientFailure(error, transient, attempts);
                }

                let delay = config.delay_after(attempts);
                tracing::debug!(
                    "Transient error on attempt {}: {:?}, retrying in {:?}",
                    attempts,
                    transient,
                    delay
                );
                if !delay.is_zero() {
                    sleep(delay).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig::default()
            .max_attempts(max_attempts)
            .without_delay()
    }

    #[tokio::test]
    async fn test_retry_success_first_try() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(fast_config(3), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, StorageError>("ok")
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success("ok", 1)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_success_after_race() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = with_retry(fast_config(4), move || {
            let counter = counter.clone();
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if n < 3 {
                    Err(StorageError::DuplicateIdentifier("0000-0001".to_string()))
                } else {
                    Ok(n)
                }
            }
        })
        .await;

        assert!(matches!(result, RetryResult::Success(3, 3)));
    }

    #[tokio::test]
    async fn test_retry_exhaustion_is_reported() {
        let result: RetryResult<()> = with_retry(fast_config(2), || async {
            Err(StorageError::DuplicateIdentifier("0000-0002".to_string()))
        })
        .await;

        match result {
            RetryResult::TransientFailure(_, TransientError::IdentifierRace(id), attempts) => {
                assert_eq!(id, "0000-0002");
                assert_eq!(attempts, 2);
            }
            other => panic!("expected transient failure, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_permanent_error_is_not_retried() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result: RetryResult<()> = with_retry(fast_config(5), move || {
            let counter = counter.clone();
            async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Err(StorageError::Backend("disk full".to_string()))
            }
        })
        .await;

        assert!(matches!(
            result,
            RetryResult::PermanentFailure(StorageError::Backend(_))
        ));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_transient_error_detection() {
        let race = StorageError::DuplicateIdentifier("x".to_string());
        assert!(TransientError::from_storage_error(&race).is_some());

        let missing = StorageError::RecordNotFound("r1".to_string());
        assert!(TransientError::from_storage_error(&missing).is_none());
    }

    #[test]
    fn test_backoff_is_capped() {
        let config = RetryConfig {
            max_attempts: 10,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(50),
            backoff_multiplier: 2.0,
        };
        assert_eq!(config.delay_after(1), Duration::from_millis(10));
        assert!((config.delay_after(2).as_secs_f64() - 0.020).abs() < 1e-6);
        assert!((config.delay_after(5).as_secs_f64() - 0.050).abs() < 1e-6);
    }
}
