//! Exponential-backoff retry for gateway calls.
//!
//! Retries only `UPSTREAM` failures (provider 5xx); every other kind is
//! returned immediately. Delay doubles from the base and is capped.

use std::future::Future;
use std::time::Duration;

use crate::config::RetryConfig;
use crate::error::{ErrorKind, Result};

/// Backoff before attempt `n` (1-based; attempt 1 has no delay).
pub fn backoff_delay(attempt: u32, config: &RetryConfig) -> Duration {
    if attempt <= 1 {
        return Duration::ZERO;
    }
    let exp = attempt.saturating_sub(2).min(16);
    let secs = config
        .base_secs
        .saturating_mul(1_u64 << exp)
        .min(config.cap_secs);
    Duration::from_secs(secs)
}

/// Run `op` with retries. `op` receives the attempt number (1-based).
/// Returns the first success, the first non-retryable error, or the last
/// upstream error once attempts are exhausted.
pub async fn with_retries<T, F, Fut>(config: &RetryConfig, mut op: F) -> (Result<T>, u32)
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let max = config.max_attempts.max(1);
    let mut attempt = 0;
    loop {
        attempt += 1;
        let delay = backoff_delay(attempt, config);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        match op(attempt).await {
            Ok(v) => return (Ok(v), attempt),
            Err(e) if e.kind == ErrorKind::Upstream && attempt < max => {
                tracing::debug!(attempt, error = %e, "gateway attempt failed — retrying");
            }
            Err(e) => return (Err(e), attempt),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::AppError;
    use std::sync::atomic::{AtomicU32, Ordering};

    fn fast_config(max_attempts: u32) -> RetryConfig {
        RetryConfig {
            base_secs: 1,
            cap_secs: 60,
            max_attempts,
        }
    }

    #[test]
    fn backoff_doubles_and_caps() {
        let config = fast_config(5);
        assert_eq!(backoff_delay(1, &config), Duration::ZERO);
        assert_eq!(backoff_delay(2, &config), Duration::from_secs(1));
        assert_eq!(backoff_delay(3, &config), Duration::from_secs(2));
        assert_eq!(backoff_delay(4, &config), Duration::from_secs(4));
        assert_eq!(backoff_delay(8, &config), Duration::from_secs(60));
        assert_eq!(backoff_delay(30, &config), Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_upstream_until_success() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = with_retries(&fast_config(5), |_| {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    Err(AppError::upstream("503"))
                } else {
                    Ok("delivered")
                }
            }
        })
        .await;
        assert_eq!(result.expect("eventual success"), "delivered");
        assert_eq!(attempts, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_last_upstream_error() {
        let (result, attempts) =
            with_retries::<(), _, _>(&fast_config(3), |_| async { Err(AppError::upstream("503")) })
                .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Upstream);
        assert_eq!(attempts, 3);
    }

    #[tokio::test]
    async fn validation_errors_do_not_retry() {
        let calls = AtomicU32::new(0);
        let (result, attempts) = with_retries::<(), _, _>(&fast_config(5), |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(AppError::validation("bad phone")) }
        })
        .await;
        assert_eq!(result.unwrap_err().kind, ErrorKind::Validation);
        assert_eq!(attempts, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }
}
