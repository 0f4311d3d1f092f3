//! Bounded retry with linear backoff.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;

/// Attempt bound and backoff unit.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of attempts, the first call included.
    pub max_attempts: u32,
    /// Delay unit; the wait after attempt `n` is `n * base_delay`.
    pub base_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    /// Create a new retry configuration.
    #[must_use]
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            ..Default::default()
        }
    }

    /// Set the backoff unit.
    #[must_use]
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Wait applied after the given (1-based) failed attempt.
    pub fn backoff(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Outcome of [`with_retry`].
#[derive(Debug)]
pub enum RetryResult<T, E> {
    /// Operation succeeded.
    Success(T),
    /// The last error and how many calls were made.
    Failed { last_error: E, attempts: u32 },
}

impl<T, E> RetryResult<T, E> {
    /// Convert to a Result, discarding retry information.
    pub fn into_result(self) -> Result<T, E> {
        match self {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed { last_error, .. } => Err(last_error),
        }
    }
}

/// Classifies errors worth another attempt.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

/// Execute an async operation, retrying retryable failures with linear backoff.
///
/// The operation runs at most `max_attempts` times (at least once). A
/// non-retryable error ends the loop immediately.
pub async fn with_retry<T, E, F, Fut>(config: &RetryConfig, mut operation: F) -> RetryResult<T, E>
where
    E: Retryable + std::fmt::Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempts = 0;

    loop {
        attempts += 1;

        match operation().await {
            Ok(value) => return RetryResult::Success(value),
            Err(error) => {
                if attempts >= max_attempts || !error.is_retryable() {
                    return RetryResult::Failed {
                        last_error: error,
                        attempts,
                    };
                }

                let delay = config.backoff(attempts);
                tracing::warn!(
                    attempt = attempts + 1,
                    max_attempts,
                    wait_secs = delay.as_secs_f64(),
                    "{error}; retrying"
                );
                sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EmbeddingError;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays `script` one outcome per call; returns the retry result and call count.
    async fn replay(
        config: RetryConfig,
        script: Vec<Result<u32, EmbeddingError>>,
    ) -> (RetryResult<u32, EmbeddingError>, usize) {
        let total = script.len();
        let script = Mutex::new(VecDeque::from(script));
        let result = with_retry(&config, || {
            let next = script
                .lock()
                .unwrap()
                .pop_front()
                .expect("operation called more often than scripted");
            async move { next }
        })
        .await;
        let left = script.lock().unwrap().len();
        (result, total - left)
    }

    fn throttled() -> EmbeddingError {
        EmbeddingError::RateLimited("429".into())
    }

    #[test]
    fn test_backoff_is_linear() {
        let config = RetryConfig::new(3).with_base_delay(Duration::from_secs(30));
        assert_eq!(config.backoff(1), Duration::from_secs(30));
        assert_eq!(config.backoff(2), Duration::from_secs(60));
        assert_eq!(config.backoff(3), Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_first_success_makes_one_call() {
        let (result, calls) = replay(RetryConfig::new(3), vec![Ok(7)]).await;
        assert!(matches!(result, RetryResult::Success(7)));
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rate_limits_back_off_linearly() {
        let started = tokio::time::Instant::now();
        let (result, calls) = replay(
            RetryConfig::new(3),
            vec![Err(throttled()), Err(throttled()), Ok(1)],
        )
        .await;

        assert!(matches!(result, RetryResult::Success(1)));
        assert_eq!(calls, 3);
        // 30s after the first failure, 60s after the second.
        assert!(started.elapsed() >= Duration::from_secs(90));
    }

    #[tokio::test]
    async fn test_fatal_error_stops_immediately() {
        let (result, calls) = replay(
            RetryConfig::new(3),
            vec![Err(EmbeddingError::Unauthorized("bad key".into()))],
        )
        .await;

        match result {
            RetryResult::Failed {
                last_error: EmbeddingError::Unauthorized(_),
                attempts: 1,
            } => {}
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_exhausted_attempts_return_last_rate_limit() {
        let (result, calls) = replay(
            RetryConfig::new(3).with_base_delay(Duration::from_millis(10)),
            vec![Err(throttled()), Err(throttled()), Err(throttled())],
        )
        .await;

        match result {
            RetryResult::Failed {
                last_error: EmbeddingError::RateLimited(_),
                attempts: 3,
            } => {}
            other => panic!("unexpected result: {other:?}"),
        }
        assert_eq!(calls, 3);
    }

    #[tokio::test]
    async fn test_zero_attempts_still_runs_once() {
        let (result, calls) = replay(RetryConfig::new(0), vec![Err(throttled())]).await;
        assert!(result.into_result().is_err());
        assert_eq!(calls, 1);
    }
}
