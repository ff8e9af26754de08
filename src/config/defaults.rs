//! System-wide default constants.
//!
//! Centralises the pipeline's tunable magic numbers. Grouped by subsystem
//! for easy discovery. Anything an operator may want to change belongs in
//! `AppConfig`; these are the fallback values.

// ============================================================================
// Coordinator
// ============================================================================

/// Maximum field area accepted at submission (hectares).
pub const MAX_AREA_HECTARES: f64 = 10_000.0;

/// Minimum burn window duration (minutes).
pub const MIN_WINDOW_MINUTES: i64 = 120;

/// How far ahead a burn may be requested (days).
pub const MAX_LEAD_DAYS: i64 = 365;

/// Declared acreage may deviate from the polygon's geodesic area by this
/// fraction before a warning is attached (never a rejection).
pub const AREA_MISMATCH_WARN_FRACTION: f64 = 0.10;

/// Duplicate-submission detection window (seconds).
pub const DUPLICATE_WINDOW_SECS: i64 = 60;

/// Hectares → acres conversion used by the priority acreage term.
pub const ACRES_PER_HECTARE: f64 = 2.471;

// ============================================================================
// Weather
// ============================================================================

/// Current-conditions cache TTL (seconds).
pub const WEATHER_CURRENT_TTL_SECS: u64 = 3_600;

/// Forecast cache TTL (seconds).
pub const WEATHER_FORECAST_TTL_SECS: u64 = 10_800;

/// Cache cell resolution: lat/lon rounded to this many decimal degrees.
pub const WEATHER_CELL_DEGREES: f64 = 0.01;

/// Suitability hard band for wind, m/s (2–15 mph).
pub const WIND_SUITABLE_MIN_MS: f64 = 0.894;
pub const WIND_SUITABLE_MAX_MS: f64 = 6.706;

/// Suitability band for relative humidity, percent.
pub const HUMIDITY_SUITABLE_MIN_PCT: f64 = 25.0;
pub const HUMIDITY_SUITABLE_MAX_PCT: f64 = 75.0;

/// Minimum visibility for a burn, km.
pub const VISIBILITY_MIN_KM: f64 = 2.0;

/// Red-flag derivation thresholds for forecast alerts.
pub const RED_FLAG_WIND_MS: f64 = 13.4;
pub const RED_FLAG_HUMIDITY_PCT: f64 = 25.0;

// ============================================================================
// Predictor
// ============================================================================

/// Plume polygons are clipped to this radius around the source (km).
pub const PLUME_R_MAX_KM: f64 = 30.0;

/// Calm-air threshold: below this wind speed the plume is a circle (m/s).
pub const CALM_WIND_MS: f64 = 1.0;

/// Calm-air plume radius (km).
pub const CALM_PLUME_RADIUS_KM: f64 = 2.0;

/// Grid step for PM2.5 sampling across plume intersections (km).
pub const CONFLICT_GRID_STEP_KM: f64 = 0.25;

/// Smoke persistence window appended to burn windows for overlap tests
/// (hours).
pub const SMOKE_PERSISTENCE_HOURS: u32 = 2;

/// Conflict emission thresholds: combined PM2.5 (µg/m³) or overlap area
/// (km²).
pub const CONFLICT_PM25_THRESHOLD: f64 = 35.0;
pub const CONFLICT_AREA_THRESHOLD_KM2: f64 = 0.1;

/// Concentration clamp ceiling (µg/m³).
pub const PM25_CLAMP_MAX: f64 = 10_000.0;

/// Fraction of fuel consumed per hour of active burning.
pub const BURN_RATE_PER_HOUR: f64 = 0.3;

/// Cancellation poll cadence for long sampling loops (iterations).
pub const CANCEL_CHECK_EVERY: u64 = 256;

// ============================================================================
// Optimizer
// ============================================================================

/// Initial annealing temperature.
pub const SA_T0: f64 = 1_000.0;

/// Stop when temperature drops below this.
pub const SA_T_MIN: f64 = 1.0;

/// Geometric cooling rate, within [0.90, 0.99].
pub const SA_ALPHA: f64 = 0.95;

/// Iteration cap multiplier: max_iterations = this × |requests|.
pub const SA_ITERATIONS_PER_REQUEST: u64 = 1_000;

/// Legal burn hours (local): [start, end).
pub const LEGAL_HOUR_START: u32 = 6;
pub const LEGAL_HOUR_END: u32 = 16;

/// Date flexibility around the requested date, days either side.
pub const DATE_FLEX_DAYS: i64 = 3;

/// Cost-term weights.
pub const W_CONFLICT: f64 = 10.0;
pub const W_PM25: f64 = 0.05;
pub const W_PRIORITY: f64 = 0.1;
pub const W_WEATHER: f64 = 2.0;
pub const W_DEFER: f64 = 50.0;

// ============================================================================
// Alerts
// ============================================================================

/// Retry backoff base delay (seconds).
pub const ALERT_RETRY_BASE_SECS: u64 = 1;

/// Retry backoff cap (seconds).
pub const ALERT_RETRY_CAP_SECS: u64 = 60;

/// Maximum delivery attempts per channel.
pub const ALERT_RETRY_MAX_ATTEMPTS: u32 = 5;

/// SMS gateway token bucket: capacity and refill per second.
pub const SMS_BUCKET_CAPACITY: f64 = 10.0;
pub const SMS_BUCKET_REFILL_PER_SEC: f64 = 1.0;

/// Bounded wait before RATE_LIMITED is surfaced to the caller (ms).
pub const RATE_LIMIT_MAX_WAIT_MS: u64 = 2_000;

/// Cascade escalation delay per severity level (seconds).
pub const CASCADE_DELAY_SECS: u64 = 900;

// ============================================================================
// Pipeline
// ============================================================================

/// Periodic optimization cycle interval (seconds).
pub const OPTIMIZATION_CYCLE_SECS: u64 = 900;

/// Weather-change triggers: deltas that invalidate predictions.
pub const WEATHER_DELTA_WIND_MS: f64 = 5.0;
pub const WEATHER_DELTA_HUMIDITY_PCT: f64 = 20.0;

/// Default per-operation deadlines (seconds).
pub const DEADLINE_SUBMISSION_SECS: u64 = 5;
pub const DEADLINE_WEATHER_SECS: u64 = 10;
pub const DEADLINE_PREDICTOR_SECS: u64 = 2;
pub const DEADLINE_OPTIMIZER_SECS: u64 = 30;
pub const DEADLINE_ALERT_SECS: u64 = 15;

// ============================================================================
// API
// ============================================================================

/// Listing pagination cap.
pub const MAX_PAGE_LIMIT: u32 = 100;

/// Per-IP token bucket for the HTTP surface.
pub const API_BUCKET_CAPACITY: f64 = 30.0;
pub const API_BUCKET_REFILL_PER_SEC: f64 = 10.0;
