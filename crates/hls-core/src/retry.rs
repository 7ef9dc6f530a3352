//! Generic retry-with-backoff executor shared by C3's fetch paths.
//!
//! Lifted nearly verbatim from the teacher's `crates/mesio/src/hls/retry.rs`
//! `RetryPolicy` / `RetryAction` / `retry_with_backoff`, retargeted at
//! `NetworkError` instead of `HlsDownloaderError`.

use std::time::Duration;

use rand::Rng;
use tokio_util::sync::CancellationToken;

use crate::error::NetworkError;

const MAX_DELAY: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub max_retries: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: f64,
}

impl RetryPolicy {
    pub fn new(retry_attempts: u32, retry_backoff_base: f64) -> Self {
        Self {
            max_retries: retry_attempts,
            base_delay: Duration::from_secs_f64(retry_backoff_base),
            max_delay: MAX_DELAY,
            jitter: 0.1,
        }
    }

    /// Delay before retry attempt `attempt` (0-indexed), per spec.md §4.3:
    /// `base * 2^n` clamped to `max_delay`, with uniform jitter of ±`jitter`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.base_delay.as_secs_f64() * 2f64.powi(attempt as i32);
        let capped = scaled.min(self.max_delay.as_secs_f64());

        let jitter_span = capped * self.jitter;
        let jittered = if jitter_span > 0.0 {
            let offset = rand::rng().random_range(-jitter_span..=jitter_span);
            (capped + offset).max(0.0)
        } else {
            capped
        };

        Duration::from_secs_f64(jittered.min(self.max_delay.as_secs_f64()))
    }
}

pub enum RetryAction<T> {
    Success(T),
    Retry(NetworkError),
    Fail(NetworkError),
}

/// Runs `operation` up to `policy.max_retries + 1` total times, sleeping
/// between attempts per `delay_for_attempt`, observing `token` for
/// cooperative cancellation during the sleep.
pub async fn retry_with_backoff<T, F, Fut>(
    policy: &RetryPolicy,
    token: &CancellationToken,
    mut operation: F,
) -> Result<T, NetworkError>
where
    F: FnMut(u32) -> Fut,
    Fut: std::future::Future<Output = RetryAction<T>>,
{
    let mut last_error = None;

    for attempt in 0..=policy.max_retries {
        if token.is_cancelled() {
            return Err(last_error.unwrap_or(NetworkError::Unknown {
                url: String::new(),
                reason: "cancelled".to_string(),
            }));
        }

        match operation(attempt).await {
            RetryAction::Success(value) => return Ok(value),
            RetryAction::Fail(err) => return Err(err),
            RetryAction::Retry(err) => {
                last_error = Some(err);
                if attempt == policy.max_retries {
                    break;
                }
                let delay = policy.delay_for_attempt(attempt);
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.cancelled() => {
                        return Err(last_error.unwrap());
                    }
                }
            }
        }
    }

    Err(last_error.expect("loop always sets last_error before exhausting"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn delay_grows_exponentially_within_jitter_band() {
        let policy = RetryPolicy::new(3, 0.5);
        for n in 0..3u32 {
            let delay = policy.delay_for_attempt(n).as_secs_f64();
            let nominal = 0.5 * 2f64.powi(n as i32);
            assert!(delay >= nominal * 0.9 - 1e-9, "n={n} delay={delay} nominal={nominal}");
            assert!(delay <= nominal * 1.1 + 1e-9, "n={n} delay={delay} nominal={nominal}");
        }
    }

    #[test]
    fn delay_is_capped_at_max_delay() {
        let policy = RetryPolicy::new(10, 100.0);
        let delay = policy.delay_for_attempt(8);
        assert!(delay <= policy.max_delay + Duration::from_secs(3));
    }

    #[tokio::test]
    async fn succeeds_without_retry_on_first_try() {
        let policy = RetryPolicy::new(3, 0.0);
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&policy, &token, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { RetryAction::Success::<u32>(42) }
        })
        .await;
        assert_eq!(result.unwrap(), 42);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn exhausts_after_max_retries_plus_one_attempts() {
        let policy = RetryPolicy::new(3, 0.0);
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&policy, &token, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                RetryAction::Retry::<u32>(NetworkError::ServerError {
                    url: "http://x".into(),
                    status_code: 503,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn fail_action_does_not_retry() {
        let policy = RetryPolicy::new(3, 0.0);
        let token = CancellationToken::new();
        let calls = AtomicU32::new(0);
        let result = retry_with_backoff(&policy, &token, |_attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async {
                RetryAction::Fail::<u32>(NetworkError::ClientError {
                    url: "http://x".into(),
                    status_code: 404,
                })
            }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
