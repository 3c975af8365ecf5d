//! # Rate-limit retry
//!
//! Bounded exponential backoff for provider calls that answer 429. The key
//! and usage-metric facades wrap every provider round-trip in
//! [`with_rate_limit_retry`]; all other error classes surface immediately.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::clients::error::is_rate_limited;
use crate::constants::{RATE_LIMIT_RETRY_ATTEMPTS, RATE_LIMIT_RETRY_BASE_SECS};

/// Exponential backoff calculator.
///
/// Each backoff doubles the previous one, capped at `max`.
#[derive(Debug, Clone)]
pub struct ExponentialBackoff {
    current: Duration,
    max: Duration,
}

impl ExponentialBackoff {
    #[must_use]
    pub fn new(base: Duration, max: Duration) -> Self {
        Self { current: base, max }
    }

    /// Get the next backoff duration and advance the sequence.
    pub fn next_backoff(&mut self) -> Duration {
        let result = self.current;
        self.current = std::cmp::min(self.current * 2, self.max);
        result
    }
}

/// Retry policy for rate-limited provider endpoints.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub base: Duration,
    pub max: Duration,
}

impl RetryPolicy {
    /// The operator default: 5 attempts, 15s base sleep, doubling.
    #[must_use]
    pub fn rate_limit_default() -> Self {
        Self {
            attempts: RATE_LIMIT_RETRY_ATTEMPTS,
            base: Duration::from_secs(RATE_LIMIT_RETRY_BASE_SECS),
            max: Duration::from_secs(RATE_LIMIT_RETRY_BASE_SECS * 16),
        }
    }

    /// The sleeps taken between attempts, in order.
    #[must_use]
    pub fn delays(&self) -> Vec<Duration> {
        let mut backoff = ExponentialBackoff::new(self.base, self.max);
        (1..self.attempts).map(|_| backoff.next_backoff()).collect()
    }
}

/// Run `op`, retrying only rate-limited failures per `policy`. The final
/// attempt's error surfaces unchanged.
pub async fn with_rate_limit_retry<T, F, Fut>(
    policy: &RetryPolicy,
    op_name: &str,
    mut op: F,
) -> anyhow::Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = anyhow::Result<T>>,
{
    let mut backoff = ExponentialBackoff::new(policy.base, policy.max);
    let mut attempt = 1;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if is_rate_limited(&err) && attempt < policy.attempts => {
                let sleep = backoff.next_backoff();
                warn!(
                    "{} rate limited (attempt {}/{}), backing off {:?}",
                    op_name, attempt, policy.attempts, sleep
                );
                tokio::time::sleep(sleep).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clients::error::ApiError;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_exponential_backoff_doubles() {
        let mut backoff =
            ExponentialBackoff::new(Duration::from_secs(15), Duration::from_secs(240));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(15));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(30));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(120));
    }

    #[test]
    fn test_exponential_backoff_caps_at_max() {
        let mut backoff = ExponentialBackoff::new(Duration::from_secs(15), Duration::from_secs(60));
        backoff.next_backoff();
        backoff.next_backoff();
        backoff.next_backoff();
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
        assert_eq!(backoff.next_backoff(), Duration::from_secs(60));
    }

    #[test]
    fn test_default_policy_shape() {
        let policy = RetryPolicy::rate_limit_default();
        assert_eq!(policy.attempts, 5);
        assert_eq!(
            policy.delays(),
            vec![
                Duration::from_secs(15),
                Duration::from_secs(30),
                Duration::from_secs(60),
                Duration::from_secs(120),
            ]
        );
    }

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            attempts: 3,
            base: Duration::from_millis(1),
            max: Duration::from_millis(4),
        }
    }

    #[tokio::test]
    async fn test_retries_only_rate_limits() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<u32> =
            with_rate_limit_retry(&fast_policy(), "op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::Error::new(ApiError::Unexpected {
                    status: 500,
                    body: "boom".to_string(),
                }))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rate_limit_exhausts_attempts() {
        let calls = AtomicU32::new(0);
        let result: anyhow::Result<u32> =
            with_rate_limit_retry(&fast_policy(), "op", || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Err(anyhow::Error::new(ApiError::RateLimited("429".to_string())))
            })
            .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_recovers_after_rate_limit() {
        let calls = AtomicU32::new(0);
        let result = with_rate_limit_retry(&fast_policy(), "op", || async {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            if n == 0 {
                Err(anyhow::Error::new(ApiError::RateLimited("429".to_string())))
            } else {
                Ok(7)
            }
        })
        .await;
        assert_eq!(result.unwrap(), 7);
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }
}
