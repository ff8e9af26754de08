//! Application Configuration Module
//!
//! Provides process-wide configuration loaded from TOML files and the
//! environment, replacing hardcoded pipeline parameters with operator-tunable
//! values.
//!
//! ## Loading Order
//!
//! 1. `BURNCAST_CONFIG` environment variable (path to TOML file)
//! 2. `burncast.toml` in the current working directory
//! 3. Built-in defaults
//!
//! Environment variables override file values for deployment secrets
//! (`DATABASE_URL`, `WEATHER_API_KEY`, ...).
//!
//! ## Usage
//!
//! Call `config::init()` once at startup, then `config::get()` anywhere:
//!
//! ```ignore
//! // In main():
//! config::init(AppConfig::load()?);
//!
//! // Anywhere in the codebase:
//! let r_max = config::get().predictor.r_max_km;
//! ```

mod app_config;
pub mod defaults;
mod validation;

pub use app_config::*;
pub use validation::{validate, ValidationWarning};

use std::sync::OnceLock;

/// Global application configuration, initialized once at startup.
static APP_CONFIG: OnceLock<AppConfig> = OnceLock::new();

/// Initialize the global configuration.
///
/// Must be called exactly once before any calls to `get()`. A second call
/// is ignored with a warning.
pub fn init(config: AppConfig) {
    if APP_CONFIG.set(config).is_err() {
        tracing::warn!("config::init() called more than once — ignoring");
    }
}

/// Get a reference to the global configuration.
///
/// Panics if `init()` has not been called. A missing config is a fatal
/// startup error, not a recoverable condition.
pub fn get() -> &'static AppConfig {
    APP_CONFIG
        .get()
        .expect("config::get() called before config::init() — this is a startup bug")
}

/// Check whether the config has been initialized.
///
/// Useful for tests and optional config paths.
pub fn is_initialized() -> bool {
    APP_CONFIG.get().is_some()
}

/// Initialize with defaults if nothing has been loaded yet (test helper).
pub fn init_default_for_tests() {
    let _ = APP_CONFIG.set(AppConfig::default());
}
