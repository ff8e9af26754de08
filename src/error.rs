//! Error taxonomy for the burn coordination pipeline.
//!
//! Every public fallible operation returns [`AppError`]. The [`ErrorKind`]
//! carried inside is the contract with API callers: each kind maps to one
//! HTTP status, and wrapping an error never changes its kind. `Internal`
//! is reserved for unclassified failures.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use thiserror::Error;

/// Machine-readable error kinds surfaced at the API boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Caller input violates a documented rule (400).
    Validation,
    /// Entity does not exist (404).
    NotFound,
    /// Forbidden state transition or duplicate submission (409).
    Conflict,
    /// Per-IP / per-provider limiter tripped (429).
    RateLimited,
    /// Caller-level dependency unmet, e.g. predict without weather (422).
    Precondition,
    /// External provider failed after retries (502).
    Upstream,
    /// Deadline exceeded (504).
    Timeout,
    /// Client-aborted (499).
    Cancelled,
    /// Optimizer could not place all requests (422).
    Feasibility,
    /// Storage layer failure (500).
    Storage,
    /// Anything else (500).
    Internal,
}

impl ErrorKind {
    /// HTTP status for this kind.
    pub fn status(self) -> StatusCode {
        match self {
            ErrorKind::Validation => StatusCode::BAD_REQUEST,
            ErrorKind::NotFound => StatusCode::NOT_FOUND,
            ErrorKind::Conflict => StatusCode::CONFLICT,
            ErrorKind::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ErrorKind::Precondition | ErrorKind::Feasibility => StatusCode::UNPROCESSABLE_ENTITY,
            ErrorKind::Upstream => StatusCode::BAD_GATEWAY,
            ErrorKind::Timeout => StatusCode::GATEWAY_TIMEOUT,
            // 499 is the client-closed-request status; StatusCode only
            // exposes it through from_u16.
            ErrorKind::Cancelled => {
                StatusCode::from_u16(499).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR)
            }
            ErrorKind::Storage | ErrorKind::Internal => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::RateLimited => "RATE_LIMITED",
            ErrorKind::Precondition => "PRECONDITION",
            ErrorKind::Upstream => "UPSTREAM",
            ErrorKind::Timeout => "TIMEOUT",
            ErrorKind::Cancelled => "CANCELLED",
            ErrorKind::Feasibility => "FEASIBILITY",
            ErrorKind::Storage => "STORAGE",
            ErrorKind::Internal => "INTERNAL",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Application error: a kind, a human-readable message, and optional
/// structured details (e.g. offending field names on `VALIDATION`).
#[derive(Debug, Error)]
#[error("{kind}: {message}")]
pub struct AppError {
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<serde_json::Value>,
    /// Retry hint in seconds for UPSTREAM / TIMEOUT / RATE_LIMITED.
    pub retry_after: Option<u64>,
}

impl AppError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            details: None,
            retry_after: None,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after = Some(secs);
        self
    }

    /// Wrap with added context. The kind is preserved.
    pub fn context(mut self, ctx: &str) -> Self {
        self.message = format!("{ctx}: {}", self.message);
        self
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, message)
    }

    /// VALIDATION error enumerating the offending fields.
    pub fn validation_fields(message: impl Into<String>, fields: &[&str]) -> Self {
        Self::new(ErrorKind::Validation, message)
            .with_details(serde_json::json!({ "fields": fields }))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Conflict, message)
    }

    pub fn precondition(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Precondition, message)
    }

    pub fn upstream(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Upstream, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    pub fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "operation cancelled")
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::RateLimited, message)
    }

    pub fn feasibility(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Feasibility, message)
    }

    pub fn storage(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Storage, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => AppError::not_found("row not found"),
            other => AppError::storage(other.to_string()),
        }
    }
}

impl From<reqwest::Error> for AppError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            AppError::timeout(err.to_string())
        } else {
            AppError::upstream(err.to_string())
        }
    }
}

/// JSON body for error responses: `{ "error": KIND, "details"?: {...} }`.
#[derive(Debug, Serialize)]
struct ErrorBody<'a> {
    error: &'a str,
    message: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<&'a serde_json::Value>,
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.kind.status();

        // Full error goes to the log; the response body never carries
        // stack traces.
        if status.is_server_error() {
            tracing::error!(kind = %self.kind, message = %self.message, "request failed");
        } else {
            tracing::debug!(kind = %self.kind, message = %self.message, "request rejected");
        }

        let body = serde_json::to_string(&ErrorBody {
            error: self.kind.as_str(),
            message: &self.message,
            details: self.details.as_ref(),
        })
        .unwrap_or_else(|_| format!(r#"{{"error":"{}"}}"#, self.kind.as_str()));

        let mut response = Response::new(body.into());
        *response.status_mut() = status;
        response.headers_mut().insert(
            axum::http::header::CONTENT_TYPE,
            axum::http::HeaderValue::from_static("application/json"),
        );
        if let Some(secs) = self.retry_after {
            if let Ok(v) = axum::http::HeaderValue::from_str(&secs.to_string()) {
                response
                    .headers_mut()
                    .insert(axum::http::header::RETRY_AFTER, v);
            }
        }
        response
    }
}

/// Convenience alias used throughout the crate.
pub type Result<T, E = AppError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping_matches_contract() {
        assert_eq!(ErrorKind::Validation.status(), StatusCode::BAD_REQUEST);
        assert_eq!(ErrorKind::NotFound.status(), StatusCode::NOT_FOUND);
        assert_eq!(ErrorKind::Conflict.status(), StatusCode::CONFLICT);
        assert_eq!(ErrorKind::RateLimited.status(), StatusCode::TOO_MANY_REQUESTS);
        assert_eq!(ErrorKind::Precondition.status(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ErrorKind::Upstream.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(ErrorKind::Timeout.status(), StatusCode::GATEWAY_TIMEOUT);
        assert_eq!(ErrorKind::Cancelled.status().as_u16(), 499);
        assert_eq!(ErrorKind::Internal.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn context_preserves_kind() {
        let err = AppError::upstream("provider 503").context("fetching forecast");
        assert_eq!(err.kind, ErrorKind::Upstream);
        assert!(err.message.contains("fetching forecast"));
        assert!(err.message.contains("provider 503"));
    }

    #[test]
    fn validation_fields_lists_offenders() {
        let err = AppError::validation_fields("bad input", &["area_hectares", "crop_type"]);
        let details = err.details.expect("details");
        assert_eq!(details["fields"][0], "area_hectares");
        assert_eq!(details["fields"][1], "crop_type");
    }
}
