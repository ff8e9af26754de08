//! Typed configuration records for every tunable subsystem.
//!
//! All sections are optional in the TOML file; missing keys fall back to
//! the constants in [`super::defaults`]. Deployment secrets come from the
//! environment and override file values.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::defaults;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub weather: WeatherConfig,
    pub embedding: EmbeddingConfig,
    pub priority: PriorityWeights,
    pub optimizer: OptimizerParams,
    pub predictor: PredictorConfig,
    pub alerts: AlertsConfig,
}

/// HTTP server binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8080".to_string(),
        }
    }
}

/// Database connection settings. The DSN itself always comes from
/// `DATABASE_URL`; only pool tuning lives in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    #[serde(skip_serializing)]
    pub url: String,
    pub max_connections: u32,
    pub acquire_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            max_connections: 20,
            acquire_timeout_secs: 10,
        }
    }
}

/// Weather provider + cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WeatherConfig {
    pub provider_base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub cache_ttl_current_secs: u64,
    pub cache_ttl_forecast_secs: u64,
    pub fetch_timeout_secs: u64,
}

impl Default for WeatherConfig {
    fn default() -> Self {
        Self {
            provider_base_url: String::new(),
            api_key: None,
            cache_ttl_current_secs: defaults::WEATHER_CURRENT_TTL_SECS,
            cache_ttl_forecast_secs: defaults::WEATHER_FORECAST_TTL_SECS,
            fetch_timeout_secs: defaults::DEADLINE_WEATHER_SECS,
        }
    }
}

/// External text-embedding provider (optional). When unset the semantic
/// dims of the terrain vector are zero-filled.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub api_url: Option<String>,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

/// Priority-score term weights (must sum to 1.0; validated at startup).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityWeights {
    pub acreage: f64,
    pub crop_rank: f64,
    pub window_flex: f64,
    pub weather_sensitivity: f64,
    pub proximity_to_population: f64,
    pub historical_success: f64,
}

impl Default for PriorityWeights {
    fn default() -> Self {
        Self {
            acreage: 0.25,
            crop_rank: 0.20,
            window_flex: 0.15,
            weather_sensitivity: 0.15,
            proximity_to_population: 0.15,
            historical_success: 0.10,
        }
    }
}

impl PriorityWeights {
    pub fn sum(&self) -> f64 {
        self.acreage
            + self.crop_rank
            + self.window_flex
            + self.weather_sensitivity
            + self.proximity_to_population
            + self.historical_success
    }
}

/// Simulated-annealing cost weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CostWeights {
    pub conf: f64,
    pub pm25: f64,
    pub prio: f64,
    pub weather: f64,
    pub defer: f64,
}

impl Default for CostWeights {
    fn default() -> Self {
        Self {
            conf: defaults::W_CONFLICT,
            pm25: defaults::W_PM25,
            prio: defaults::W_PRIORITY,
            weather: defaults::W_WEATHER,
            defer: defaults::W_DEFER,
        }
    }
}

/// Simulated-annealing parameters. Held constant for the duration of a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OptimizerParams {
    pub t0: f64,
    pub t_min: f64,
    pub alpha: f64,
    /// 0 means "derive from request count" (1000 × |R|).
    pub max_iterations: u64,
    pub seed: u64,
    pub weights: CostWeights,
    /// Date flexibility either side of the requested date, days.
    pub date_flex_days: i64,
    /// Legal burn hours, local: [start, end).
    pub legal_hour_start: u32,
    pub legal_hour_end: u32,
}

impl Default for OptimizerParams {
    fn default() -> Self {
        Self {
            t0: defaults::SA_T0,
            t_min: defaults::SA_T_MIN,
            alpha: defaults::SA_ALPHA,
            max_iterations: 0,
            seed: 42,
            weights: CostWeights::default(),
            date_flex_days: defaults::DATE_FLEX_DAYS,
            legal_hour_start: defaults::LEGAL_HOUR_START,
            legal_hour_end: defaults::LEGAL_HOUR_END,
        }
    }
}

impl OptimizerParams {
    /// Effective iteration cap for a run over `n` requests.
    pub fn effective_max_iterations(&self, n: usize) -> u64 {
        if self.max_iterations > 0 {
            self.max_iterations
        } else {
            defaults::SA_ITERATIONS_PER_REQUEST * n.max(1) as u64
        }
    }
}

/// Plume/conflict computation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PredictorConfig {
    pub grid_step_km: f64,
    pub r_max_km: f64,
    pub persistence_hours: u32,
}

impl Default for PredictorConfig {
    fn default() -> Self {
        Self {
            grid_step_km: defaults::CONFLICT_GRID_STEP_KM,
            r_max_km: defaults::PLUME_R_MAX_KM,
            persistence_hours: defaults::SMOKE_PERSISTENCE_HOURS,
        }
    }
}

/// Delivery retry policy.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub base_secs: u64,
    pub cap_secs: u64,
    pub max_attempts: u32,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            base_secs: defaults::ALERT_RETRY_BASE_SECS,
            cap_secs: defaults::ALERT_RETRY_CAP_SECS,
            max_attempts: defaults::ALERT_RETRY_MAX_ATTEMPTS,
        }
    }
}

/// Per-provider token-bucket rate limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RateLimitConfig {
    pub sms_capacity: f64,
    pub sms_refill_per_sec: f64,
    pub max_wait_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            sms_capacity: defaults::SMS_BUCKET_CAPACITY,
            sms_refill_per_sec: defaults::SMS_BUCKET_REFILL_PER_SEC,
            max_wait_ms: defaults::RATE_LIMIT_MAX_WAIT_MS,
        }
    }
}

/// Alert dispatch settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertsConfig {
    pub sms_gateway_url: Option<String>,
    #[serde(skip_serializing)]
    pub sms_gateway_token: Option<String>,
    pub retry: RetryConfig,
    pub rate_limits: RateLimitConfig,
    pub cascade_delay_secs: u64,
    pub send_timeout_secs: u64,
}

impl Default for AlertsConfig {
    fn default() -> Self {
        Self {
            sms_gateway_url: None,
            sms_gateway_token: None,
            retry: RetryConfig::default(),
            rate_limits: RateLimitConfig::default(),
            cascade_delay_secs: defaults::CASCADE_DELAY_SECS,
            send_timeout_secs: defaults::DEADLINE_ALERT_SECS,
        }
    }
}

/// Where the config came from, for the startup banner.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum ConfigProvenance {
    EnvPath(String),
    WorkingDirectory,
    #[default]
    BuiltInDefaults,
}

impl std::fmt::Display for ConfigProvenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigProvenance::EnvPath(p) => write!(f, "BURNCAST_CONFIG={p}"),
            ConfigProvenance::WorkingDirectory => write!(f, "./burncast.toml"),
            ConfigProvenance::BuiltInDefaults => write!(f, "built-in defaults"),
        }
    }
}

impl AppConfig {
    /// Load from TOML (see module docs for search order), then apply
    /// environment overrides. Returns the config and its provenance.
    ///
    /// Fails only on a present-but-malformed file; a missing file falls
    /// back to defaults.
    pub fn load() -> anyhow::Result<(Self, ConfigProvenance)> {
        let (mut config, provenance) = match std::env::var("BURNCAST_CONFIG") {
            Ok(path) => {
                let parsed = Self::from_file(Path::new(&path))?;
                (parsed, ConfigProvenance::EnvPath(path))
            }
            Err(_) => {
                let cwd = Path::new("burncast.toml");
                if cwd.exists() {
                    (Self::from_file(cwd)?, ConfigProvenance::WorkingDirectory)
                } else {
                    (Self::default(), ConfigProvenance::BuiltInDefaults)
                }
            }
        };

        config.apply_env_overrides();
        Ok((config, provenance))
    }

    fn from_file(path: &Path) -> anyhow::Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("cannot read config file {}: {e}", path.display()))?;
        let config: AppConfig = toml::from_str(&raw)
            .map_err(|e| anyhow::anyhow!("malformed config file {}: {e}", path.display()))?;
        Ok(config)
    }

    /// Deployment secrets and addresses from the environment take
    /// precedence over file values.
    fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("DATABASE_URL") {
            self.database.url = v;
        }
        if let Ok(v) = std::env::var("WEATHER_API_BASE_URL") {
            self.weather.provider_base_url = v;
        }
        if let Ok(v) = std::env::var("WEATHER_API_KEY") {
            self.weather.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("EMBEDDING_API_URL") {
            self.embedding.api_url = Some(v);
        }
        if let Ok(v) = std::env::var("EMBEDDING_API_KEY") {
            self.embedding.api_key = Some(v);
        }
        if let Ok(v) = std::env::var("SMS_GATEWAY_URL") {
            self.alerts.sms_gateway_url = Some(v);
        }
        if let Ok(v) = std::env::var("SMS_GATEWAY_TOKEN") {
            self.alerts.sms_gateway_token = Some(v);
        }
        if let Ok(v) = std::env::var("BURNCAST_SERVER_ADDR") {
            self.server.addr = v;
        }
    }

    /// Check that variables required by the `serve` command are present.
    /// Returns the missing names for the startup diagnostic.
    pub fn missing_required(&self) -> Vec<&'static str> {
        let mut missing = Vec::new();
        if self.database.url.is_empty() {
            missing.push("DATABASE_URL");
        }
        if self.weather.provider_base_url.is_empty() {
            missing.push("WEATHER_API_BASE_URL");
        }
        missing
    }
}
