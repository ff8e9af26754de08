//! Weather provider seam: raw conditions from an upstream HTTP API.
//!
//! The provider returns raw readings only; stability classification,
//! mixing height, dew point backfill, and the 128-d embedding happen in
//! the service layer. On upstream failure the error is `UPSTREAM` —
//! fabricated readings are never substituted.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, Result};
use crate::types::GeoPoint;

/// A raw provider reading at a valid time.
#[derive(Debug, Clone)]
pub struct RawObservation {
    pub location: GeoPoint,
    /// Epoch microseconds UTC.
    pub valid_at: i64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_ms: f64,
    pub wind_direction_deg: f64,
    pub pressure_hpa: f64,
    pub visibility_km: f64,
    pub cloud_cover_pct: f64,
    pub precipitation_mm: f64,
}

/// Upstream weather source.
#[async_trait]
pub trait WeatherProvider: Send + Sync {
    async fn fetch_current(&self, location: GeoPoint) -> Result<RawObservation>;

    /// Hourly forecast covering `horizon_hours` from now.
    async fn fetch_forecast(
        &self,
        location: GeoPoint,
        horizon_hours: u32,
    ) -> Result<Vec<RawObservation>>;

    /// Reachability probe for the health endpoint.
    async fn probe(&self) -> Result<()>;
}

// ============================================================================
// HTTP provider (open-meteo wire shape)
// ============================================================================

/// HTTP provider speaking the open-meteo style JSON shape.
pub struct HttpWeatherProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl HttpWeatherProvider {
    pub fn new(base_url: String, api_key: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::internal(format!("weather client: {e}")))?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

#[derive(Deserialize)]
struct CurrentResponse {
    current: CurrentBlock,
}

#[derive(Deserialize)]
struct CurrentBlock {
    #[serde(rename = "time")]
    time_epoch: i64,
    temperature_2m: f64,
    relative_humidity_2m: f64,
    wind_speed_10m: f64,
    wind_direction_10m: f64,
    surface_pressure: f64,
    #[serde(default)]
    visibility: Option<f64>,
    cloud_cover: f64,
    precipitation: f64,
}

#[derive(Deserialize)]
struct ForecastResponse {
    hourly: HourlyBlock,
}

#[derive(Deserialize)]
struct HourlyBlock {
    #[serde(rename = "time")]
    time_epoch: Vec<i64>,
    temperature_2m: Vec<f64>,
    relative_humidity_2m: Vec<f64>,
    wind_speed_10m: Vec<f64>,
    wind_direction_10m: Vec<f64>,
    surface_pressure: Vec<f64>,
    #[serde(default)]
    visibility: Vec<f64>,
    cloud_cover: Vec<f64>,
    precipitation: Vec<f64>,
}

const CURRENT_FIELDS: &str = "temperature_2m,relative_humidity_2m,wind_speed_10m,\
wind_direction_10m,surface_pressure,visibility,cloud_cover,precipitation";

#[async_trait]
impl WeatherProvider for HttpWeatherProvider {
    async fn fetch_current(&self, location: GeoPoint) -> Result<RawObservation> {
        let mut request = self
            .client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", location.lat.to_string()),
                ("longitude", location.lon.to_string()),
                ("current", CURRENT_FIELDS.to_string()),
                ("windspeed_unit", "ms".to_string()),
                ("timeformat", "unixtime".to_string()),
            ]);
        if let Some(ref key) = self.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AppError::upstream(format!(
                "weather provider returned {}",
                response.status()
            )));
        }
        let body: CurrentResponse = response
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("weather response: {e}")))?;

        let c = body.current;
        Ok(RawObservation {
            location,
            valid_at: c.time_epoch * 1_000_000,
            temperature_c: c.temperature_2m,
            humidity_pct: c.relative_humidity_2m,
            wind_speed_ms: c.wind_speed_10m,
            wind_direction_deg: c.wind_direction_10m,
            pressure_hpa: c.surface_pressure,
            // Provider reports meters; missing visibility means "clear".
            visibility_km: c.visibility.map_or(10.0, |v| v / 1_000.0),
            cloud_cover_pct: c.cloud_cover,
            precipitation_mm: c.precipitation,
        })
    }

    async fn fetch_forecast(
        &self,
        location: GeoPoint,
        horizon_hours: u32,
    ) -> Result<Vec<RawObservation>> {
        let days = horizon_hours.div_ceil(24).max(1);
        let mut request = self
            .client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[
                ("latitude", location.lat.to_string()),
                ("longitude", location.lon.to_string()),
                ("hourly", CURRENT_FIELDS.to_string()),
                ("forecast_days", days.to_string()),
                ("windspeed_unit", "ms".to_string()),
                ("timeformat", "unixtime".to_string()),
            ]);
        if let Some(ref key) = self.api_key {
            request = request.query(&[("apikey", key.as_str())]);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AppError::upstream(format!(
                "weather provider returned {}",
                response.status()
            )));
        }
        let body: ForecastResponse = response
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("forecast response: {e}")))?;

        let h = body.hourly;
        let n = h
            .time_epoch
            .len()
            .min(h.temperature_2m.len())
            .min(h.wind_speed_10m.len())
            .min(horizon_hours as usize);

        let mut out = Vec::with_capacity(n);
        for i in 0..n {
            out.push(RawObservation {
                location,
                valid_at: h.time_epoch[i] * 1_000_000,
                temperature_c: h.temperature_2m[i],
                humidity_pct: h.relative_humidity_2m.get(i).copied().unwrap_or(50.0),
                wind_speed_ms: h.wind_speed_10m[i],
                wind_direction_deg: h.wind_direction_10m.get(i).copied().unwrap_or(0.0),
                pressure_hpa: h.surface_pressure.get(i).copied().unwrap_or(1_013.0),
                visibility_km: h.visibility.get(i).map_or(10.0, |v| v / 1_000.0),
                cloud_cover_pct: h.cloud_cover.get(i).copied().unwrap_or(0.0),
                precipitation_mm: h.precipitation.get(i).copied().unwrap_or(0.0),
            });
        }
        Ok(out)
    }

    async fn probe(&self) -> Result<()> {
        let response = self
            .client
            .get(format!("{}/v1/forecast", self.base_url))
            .query(&[("latitude", "0"), ("longitude", "0"), ("current", "temperature_2m")])
            .send()
            .await?;
        if response.status().is_server_error() {
            return Err(AppError::upstream(format!(
                "weather provider probe returned {}",
                response.status()
            )));
        }
        Ok(())
    }
}

// ============================================================================
// Static provider (tests, seed --dry-run)
// ============================================================================

/// Fixed-conditions provider for tests and offline runs.
pub struct StaticWeatherProvider {
    pub conditions: RawObservation,
    /// When true every call fails with `UPSTREAM` (outage simulation).
    pub failing: bool,
}

impl StaticWeatherProvider {
    pub fn with_conditions(conditions: RawObservation) -> Self {
        Self {
            conditions,
            failing: false,
        }
    }

    /// 8 mph southerly wind, 55% humidity, clear: the textbook good burn
    /// day.
    pub fn fair_weather(location: GeoPoint, valid_at: i64) -> Self {
        Self::with_conditions(RawObservation {
            location,
            valid_at,
            temperature_c: 22.0,
            humidity_pct: 55.0,
            wind_speed_ms: 3.6,
            wind_direction_deg: 180.0,
            pressure_hpa: 1_013.0,
            visibility_km: 16.0,
            cloud_cover_pct: 15.0,
            precipitation_mm: 0.0,
        })
    }
}

#[async_trait]
impl WeatherProvider for StaticWeatherProvider {
    async fn fetch_current(&self, location: GeoPoint) -> Result<RawObservation> {
        if self.failing {
            return Err(AppError::upstream("static provider configured to fail"));
        }
        let mut obs = self.conditions.clone();
        obs.location = location;
        Ok(obs)
    }

    async fn fetch_forecast(
        &self,
        location: GeoPoint,
        horizon_hours: u32,
    ) -> Result<Vec<RawObservation>> {
        if self.failing {
            return Err(AppError::upstream("static provider configured to fail"));
        }
        let mut out = Vec::with_capacity(horizon_hours as usize);
        for h in 0..horizon_hours {
            let mut obs = self.conditions.clone();
            obs.location = location;
            obs.valid_at += i64::from(h) * 3_600_000_000;
            out.push(obs);
        }
        Ok(out)
    }

    async fn probe(&self) -> Result<()> {
        if self.failing {
            return Err(AppError::upstream("static provider configured to fail"));
        }
        Ok(())
    }
}
