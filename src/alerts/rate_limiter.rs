//! Token-bucket rate limiter for outbound provider calls.
//!
//! One bucket per provider (SMS gateway, voice). Callers wait a bounded
//! time for a token; exhaustion after the wait surfaces `RATE_LIMITED`
//! back-pressure instead of queueing unbounded work.

use std::sync::Mutex;
use std::time::{Duration, Instant};

use crate::error::{AppError, Result};

struct BucketState {
    tokens: f64,
    last_refill: Instant,
}

/// See module docs.
pub struct TokenBucket {
    capacity: f64,
    refill_per_sec: f64,
    state: Mutex<BucketState>,
}

impl TokenBucket {
    pub fn new(capacity: f64, refill_per_sec: f64) -> Self {
        Self {
            capacity: capacity.max(1.0),
            refill_per_sec: refill_per_sec.max(0.01),
            state: Mutex::new(BucketState {
                tokens: capacity.max(1.0),
                last_refill: Instant::now(),
            }),
        }
    }

    fn refill(&self, state: &mut BucketState) {
        let elapsed = state.last_refill.elapsed().as_secs_f64();
        state.tokens = (state.tokens + elapsed * self.refill_per_sec).min(self.capacity);
        state.last_refill = Instant::now();
    }

    /// Take one token now, or report how long until one is available.
    pub fn try_acquire(&self) -> std::result::Result<(), Duration> {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        self.refill(&mut state);
        if state.tokens >= 1.0 {
            state.tokens -= 1.0;
            Ok(())
        } else {
            let deficit = 1.0 - state.tokens;
            Err(Duration::from_secs_f64(deficit / self.refill_per_sec))
        }
    }

    /// Wait up to `max_wait` for a token; `RATE_LIMITED` with a retry hint
    /// when the bucket stays dry.
    pub async fn acquire_within(&self, max_wait: Duration) -> Result<()> {
        match self.try_acquire() {
            Ok(()) => Ok(()),
            Err(needed) if needed <= max_wait => {
                tokio::time::sleep(needed).await;
                match self.try_acquire() {
                    Ok(()) => Ok(()),
                    Err(still_needed) => Err(AppError::rate_limited("provider limiter exhausted")
                        .with_retry_after(still_needed.as_secs().max(1))),
                }
            }
            Err(needed) => Err(AppError::rate_limited("provider limiter exhausted")
                .with_retry_after(needed.as_secs().max(1))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn burst_up_to_capacity_then_dry() {
        let bucket = TokenBucket::new(3.0, 0.5);
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());
        assert!(bucket.try_acquire().is_ok());
        let wait = bucket.try_acquire().expect_err("dry bucket");
        assert!(wait > Duration::ZERO);
        // Refill rate 0.5/s: a full token needs about 2 s
        assert!(wait <= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn bounded_wait_surfaces_rate_limited() {
        let bucket = TokenBucket::new(1.0, 0.1); // 10 s per token
        assert!(bucket.try_acquire().is_ok());
        let err = bucket
            .acquire_within(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::RateLimited);
        assert!(err.retry_after.is_some());
    }

    #[tokio::test]
    async fn short_deficit_waits_and_succeeds() {
        let bucket = TokenBucket::new(1.0, 50.0); // 20 ms per token
        assert!(bucket.try_acquire().is_ok());
        bucket
            .acquire_within(Duration::from_millis(200))
            .await
            .expect("token after short wait");
    }
}
