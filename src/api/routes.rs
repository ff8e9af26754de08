//! Route table for the coordination API.

use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use super::handlers::{self, ApiState};
use super::middleware::{ip_rate_limit, IpLimiter};

/// Build the full application router.
pub fn app_router(state: ApiState) -> Router {
    let limiter = Arc::new(IpLimiter::default());

    Router::new()
        .route(
            "/burn-requests",
            post(handlers::submit_burn_request).get(handlers::list_burn_requests),
        )
        .route(
            "/burn-requests/:id",
            get(handlers::get_burn_request)
                .put(handlers::update_burn_request)
                .delete(handlers::cancel_burn_request),
        )
        .route(
            "/burn-requests/detect-conflicts",
            post(handlers::detect_conflicts),
        )
        .route("/weather/current", get(handlers::weather_current))
        .route("/weather/forecast", get(handlers::weather_forecast))
        .route("/weather/analyze", post(handlers::weather_analyze))
        .route("/schedule/optimize", post(handlers::schedule_optimize))
        .route("/schedule/constraints", post(handlers::schedule_constraints))
        .route("/alerts/send", post(handlers::alerts_send))
        .route("/alerts/acknowledge", post(handlers::alerts_acknowledge))
        .route("/alerts/emergency", post(handlers::alerts_emergency))
        .route("/health", get(handlers::health))
        .layer(axum::middleware::from_fn_with_state(limiter, ip_rate_limit))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
