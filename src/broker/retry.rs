//! Retry logic with exponential backoff
//!
//! Used for idempotent broker calls only (reads and stop-loss replacement).
//! Order placement and position closes are never retried here: a timed-out
//! close may still have executed.

use super::errors::BrokerError;
use std::future::Future;
use tokio::time::{sleep, Duration};
use tracing::{debug, warn};

/// Backoff schedule for idempotent broker calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Attempts after the first one
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_delay: Duration::from_millis(200),
            max_delay: Duration::from_secs(2),
        }
    }
}

impl RetryConfig {
    /// Delay before retry number `retry` (1-based), doubling up to `max_delay`
    fn delay_before(&self, retry: u32) -> Duration {
        let factor = 1u32.checked_shl(retry.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Run `call` until it succeeds, fails with a non-retryable error, or runs
/// out of retries. The last error is returned.
pub async fn with_retry<T, F, Fut>(config: &RetryConfig, what: &str, mut call: F) -> Result<T, BrokerError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, BrokerError>>,
{
    let mut retry = 0;
    loop {
        let err = match call().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        if !err.is_retryable() {
            return Err(err);
        }
        if retry == config.max_retries {
            warn!("[Retry] {} gave up after {} attempts: {}", what, retry + 1, err);
            return Err(err);
        }

        retry += 1;
        let delay = config.delay_before(retry);
        debug!("[Retry] {} failed ({}), retry {}/{} in {:?}", what, err, retry, config.max_retries, delay);
        sleep(delay).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn fast() -> RetryConfig {
        RetryConfig {
            max_retries: 3,
            initial_delay: Duration::from_millis(5),
            max_delay: Duration::from_millis(20),
        }
    }

    #[test]
    fn test_delay_doubles_up_to_cap() {
        let config = fast();
        assert_eq!(config.delay_before(1), Duration::from_millis(5));
        assert_eq!(config.delay_before(2), Duration::from_millis(10));
        assert_eq!(config.delay_before(3), Duration::from_millis(20));
        assert_eq!(config.delay_before(40), Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_retry_succeeds_after_retries() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(), "test", || {
            let count = counter_clone.fetch_add(1, Ordering::SeqCst);
            async move {
                if count < 2 {
                    Err(BrokerError::Network("reset".to_string()))
                } else {
                    Ok(42)
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), 42);
        assert_eq!(counter.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_retry_not_configured_fails_immediately() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(), "test", || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(BrokerError::NotConfigured) }
        })
        .await;

        assert_eq!(result, Err(BrokerError::NotConfigured));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retry_gives_up() {
        let counter = Arc::new(AtomicU32::new(0));
        let counter_clone = counter.clone();

        let result = with_retry(&fast(), "test", || {
            counter_clone.fetch_add(1, Ordering::SeqCst);
            async { Err::<i32, _>(BrokerError::RateLimited) }
        })
        .await;

        assert_eq!(result, Err(BrokerError::RateLimited));
        assert_eq!(counter.load(Ordering::SeqCst), 4);
    }
}
