//! Per-IP rate limiting for the HTTP surface.
//!
//! The same token-bucket mechanism used for provider back-pressure, one
//! bucket per caller address. Buckets are pruned opportunistically so the
//! map does not grow unbounded.

use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use dashmap::DashMap;

use crate::alerts::TokenBucket;
use crate::config::defaults::{API_BUCKET_CAPACITY, API_BUCKET_REFILL_PER_SEC};
use crate::error::AppError;

/// Per-address buckets.
pub struct IpLimiter {
    buckets: DashMap<String, Arc<TokenBucket>>,
}

impl Default for IpLimiter {
    fn default() -> Self {
        Self {
            buckets: DashMap::new(),
        }
    }
}

impl IpLimiter {
    /// Take a token for `addr`; on exhaustion returns the wait hint.
    pub fn check(&self, addr: &str) -> Result<(), std::time::Duration> {
        // Cheap bound on map growth.
        if self.buckets.len() > 10_000 {
            self.buckets.clear();
        }
        let bucket = self
            .buckets
            .entry(addr.to_string())
            .or_insert_with(|| {
                Arc::new(TokenBucket::new(API_BUCKET_CAPACITY, API_BUCKET_REFILL_PER_SEC))
            })
            .clone();
        bucket.try_acquire()
    }
}

fn caller_address(request: &Request) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(',').next())
        .map(|v| v.trim().to_string())
        .or_else(|| {
            request
                .extensions()
                .get::<axum::extract::ConnectInfo<std::net::SocketAddr>>()
                .map(|info| info.0.ip().to_string())
        })
        .unwrap_or_else(|| "unknown".to_string())
}

/// Axum middleware: 429 with `Retry-After` when a caller's bucket is dry.
pub async fn ip_rate_limit(
    State(limiter): State<Arc<IpLimiter>>,
    request: Request,
    next: Next,
) -> Response {
    let addr = caller_address(&request);
    match limiter.check(&addr) {
        Ok(()) => next.run(request).await,
        Err(wait) => AppError::rate_limited("request rate exceeded")
            .with_retry_after(wait.as_secs().max(1))
            .into_response(),
    }
}
