//! HTTP surface for the coordination pipeline.
//!
//! The transport framework is a thin shell: handlers adapt wire shapes to
//! the pipeline stages, the middleware applies per-IP back-pressure, and
//! `AppError` maps every failure to its documented status.

pub mod envelope;
pub mod handlers;
pub mod middleware;
pub mod routes;

pub use handlers::ApiState;
pub use routes::app_router;
