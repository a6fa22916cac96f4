//! Bounded exponential backoff for rate-limited generation calls.

use std::future::Future;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::config::RetryConfig;
use crate::error::AppError;

use super::generator::GenerationError;

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_retries: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    pub fn from_config(config: &RetryConfig) -> Self {
        Self::new(config.max_retries, Duration::from_secs(config.base_delay_secs))
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_retries + 1
    }

    /// Delay after the failed attempt with zero-based index `attempt`:
    /// `base * 2^(attempt + 1)`, so 10s, 20s, 40s with the default base.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(2u32.saturating_pow(attempt + 1))
    }

    /// Run `call` until it succeeds, fails with a non-retryable error, or the
    /// attempt budget is spent. Only `GenerationError::RateLimited` is
    /// retried. Cancellation aborts both an in-flight call and a backoff sleep.
    pub async fn execute<T, F, Fut>(
        &self,
        operation: &str,
        cancel: &CancellationToken,
        mut call: F,
    ) -> Result<T, AppError>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Result<T, GenerationError>>,
    {
        let max_attempts = self.max_attempts();
        let mut attempt = 0u32;

        loop {
            if cancel.is_cancelled() {
                return Err(AppError::Cancelled);
            }

            let result = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(AppError::Cancelled),
                r = call(attempt) => r,
            };

            match result {
                Ok(value) => {
                    if attempt > 0 {
                        tracing::info!(operation, attempt = attempt + 1, "generation succeeded after retry");
                    }
                    return Ok(value);
                }
                Err(GenerationError::RateLimited(message)) => {
                    if attempt + 1 >= max_attempts {
                        tracing::error!(
                            operation,
                            attempts = max_attempts,
                            last_error = %message,
                            "rate limit retries exhausted"
                        );
                        return Err(AppError::RateLimited {
                            attempts: max_attempts,
                            last_error: message,
                        });
                    }

                    let delay = self.delay_for(attempt);
                    tracing::warn!(
                        operation,
                        attempt = attempt + 1,
                        max_attempts,
                        delay_secs = delay.as_secs(),
                        "rate limited by provider, backing off"
                    );
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return Err(AppError::Cancelled),
                        _ = tokio::time::sleep(delay) => {}
                    }
                    attempt += 1;
                }
                Err(other) => {
                    tracing::warn!(operation, attempt = attempt + 1, error = %other, "non-retryable generation error");
                    return Err(other.into());
                }
            }
        }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn rate_limited() -> GenerationError {
        GenerationError::RateLimited("429 Too Many Requests".into())
    }

    #[test]
    fn test_delay_schedule() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.max_attempts(), 4);
        assert_eq!(policy.delay_for(0), Duration::from_secs(10));
        assert_eq!(policy.delay_for(1), Duration::from_secs(20));
        assert_eq!(policy.delay_for(2), Duration::from_secs(40));
    }

    #[tokio::test(start_paused = true)]
    async fn test_succeeds_on_fourth_attempt() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let started = tokio::time::Instant::now();

        let result = policy
            .execute("ideas", &CancellationToken::new(), |_| {
                let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
                async move {
                    if n < 4 {
                        Err(rate_limited())
                    } else {
                        Ok("ideas")
                    }
                }
            })
            .await;

        assert_eq!(result.unwrap(), "ideas");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert_eq!(started.elapsed(), Duration::from_secs(70));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gives_up_after_exactly_four_attempts() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .execute("ideas", &CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        match result.unwrap_err() {
            AppError::RateLimited {
                attempts,
                last_error,
            } => {
                assert_eq!(attempts, 4);
                assert!(last_error.contains("429"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_non_retryable_fails_immediately() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);

        let result: Result<(), _> = policy
            .execute("mutation", &CancellationToken::new(), |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(GenerationError::Provider("500 upstream".into())) }
            })
            .await;

        assert!(matches!(result, Err(AppError::GenerationFailure(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_backoff() {
        let policy = RetryPolicy::default();
        let calls = AtomicU32::new(0);
        let cancel = CancellationToken::new();

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(3)).await;
            trigger.cancel();
        });

        let result: Result<(), _> = policy
            .execute("features", &cancel, |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                async { Err(rate_limited()) }
            })
            .await;

        assert!(matches!(result, Err(AppError::Cancelled)));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
