//! Stage 2: weather retrieval, stability classification, suitability
//! scoring, and the 128-d weather embedding.
//!
//! The service wraps an upstream [`WeatherProvider`] with the (cell, hour)
//! cache and enriches every raw reading with derived quantities before it
//! is persisted. Cache staleness triggers a refetch; upstream failure with
//! no cache surfaces `UPSTREAM` — readings are never fabricated.

pub mod cache;
pub mod embedding;
pub mod provider;
pub mod stability;
pub mod suitability;

pub use cache::{CacheOutcome, CellKey, WeatherCache};
pub use provider::{HttpWeatherProvider, RawObservation, StaticWeatherProvider, WeatherProvider};

use std::sync::Arc;
use std::time::Duration;

use chrono::{Datelike, NaiveDate, TimeZone, Timelike, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::WeatherConfig;
use crate::error::{AppError, Result};
use crate::store::Store;
use crate::types::{epoch_micros, BurnSuitability, GeoPoint, WeatherObservation};

/// A contiguous run of forecast hours suitable for burning.
#[derive(Debug, Clone, Serialize)]
pub struct BurnWindow {
    pub date: NaiveDate,
    pub start_hour: u32,
    pub end_hour: u32,
    /// Mean suitability score across the window's hours.
    pub quality: f64,
}

/// A forecast-derived advisory surfaced on the forecast endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct WeatherAlertNotice {
    pub valid_at: i64,
    pub kind: String,
    pub message: String,
}

/// See module docs.
pub struct WeatherService {
    provider: Arc<dyn WeatherProvider>,
    store: Arc<dyn Store>,
    cache: WeatherCache,
}

impl WeatherService {
    pub fn new(
        provider: Arc<dyn WeatherProvider>,
        store: Arc<dyn Store>,
        config: &WeatherConfig,
    ) -> Self {
        Self {
            provider,
            store,
            cache: WeatherCache::new(
                Duration::from_secs(config.cache_ttl_current_secs),
                Duration::from_secs(config.cache_ttl_forecast_secs),
            ),
        }
    }

    /// Current conditions for a location, cache-first.
    pub async fn fetch_current(
        &self,
        location: GeoPoint,
    ) -> Result<(WeatherObservation, CacheOutcome)> {
        let now = epoch_micros(Utc::now());
        let key = CellKey::new(location, now, false);

        if let Some(cached) = self.cache.get(&key) {
            if let Some(obs) = cached.into_iter().next() {
                debug!(lat = location.lat, lon = location.lon, "weather cache hit");
                return Ok((obs, CacheOutcome::Hit));
            }
        }

        let raw = self
            .provider
            .fetch_current(location)
            .await
            .map_err(|e| e.context("fetching current conditions"))?;
        let obs = self.enrich_and_store(raw, false).await?;
        self.cache.put(key, vec![obs.clone()]);
        Ok((obs, CacheOutcome::Miss))
    }

    /// Hourly forecast for `days` days, cache-first.
    pub async fn fetch_forecast(
        &self,
        location: GeoPoint,
        days: u32,
    ) -> Result<(Vec<WeatherObservation>, CacheOutcome)> {
        let now = epoch_micros(Utc::now());
        let key = CellKey::new(location, now, true);
        let horizon_hours = days.clamp(1, 7) * 24;

        if let Some(cached) = self.cache.get(&key) {
            if cached.len() >= horizon_hours as usize {
                return Ok((
                    cached.into_iter().take(horizon_hours as usize).collect(),
                    CacheOutcome::Hit,
                ));
            }
        }

        let raw = self
            .provider
            .fetch_forecast(location, horizon_hours)
            .await
            .map_err(|e| e.context("fetching forecast"))?;

        let mut observations = Vec::with_capacity(raw.len());
        for r in raw {
            observations.push(self.enrich_and_store(r, true).await?);
        }
        self.cache.put(key, observations.clone());
        Ok((observations, CacheOutcome::Miss))
    }

    /// Non-fetching peek at cached current conditions (used by the
    /// submission fast-path).
    pub fn cached_current(&self, location: GeoPoint) -> Option<WeatherObservation> {
        let now = epoch_micros(Utc::now());
        let key = CellKey::new(location, now, false);
        self.cache.get(&key).and_then(|v| v.into_iter().next())
    }

    /// Suitability verdict for a burn at `location` on `date`.
    ///
    /// Today uses current conditions; future dates use the forecast hour
    /// nearest mid-morning (10:00), the representative burn start.
    pub async fn analyze_for_burn(
        &self,
        location: GeoPoint,
        date: NaiveDate,
    ) -> Result<(BurnSuitability, WeatherObservation)> {
        let today = Utc::now().date_naive();

        let obs = if date <= today {
            self.fetch_current(location).await?.0
        } else {
            let days_ahead = (date - today).num_days().clamp(1, 7) as u32;
            let (forecast, _) = self.fetch_forecast(location, days_ahead).await?;
            pick_for_date(&forecast, date).ok_or_else(|| {
                AppError::precondition(format!("no forecast hours cover {date}"))
            })?
        };

        let verdict = suitability::analyze(&obs);
        Ok((verdict, obs))
    }

    /// Persist an externally supplied observation (already enriched).
    pub async fn store_observation(&self, obs: WeatherObservation) -> Result<WeatherObservation> {
        self.store.insert_observation(obs).await
    }

    /// Most recent stored observation near a location (pipeline change
    /// detection).
    pub async fn last_stored_near(
        &self,
        location: GeoPoint,
        max_age: Duration,
    ) -> Result<Option<WeatherObservation>> {
        let now = epoch_micros(Utc::now());
        self.store
            .latest_observation_near(location, now, max_age.as_micros() as i64)
            .await
    }

    /// Provider reachability for the health endpoint.
    pub async fn probe(&self) -> Result<()> {
        self.provider.probe().await
    }

    pub fn evict_stale_cache(&self) -> usize {
        self.cache.evict_stale()
    }

    /// Derive stability, mixing height, dew point and the embedding, then
    /// persist.
    async fn enrich_and_store(
        &self,
        raw: RawObservation,
        is_forecast: bool,
    ) -> Result<WeatherObservation> {
        let obs = enrich(raw, is_forecast);
        match self.store.insert_observation(obs.clone()).await {
            Ok(stored) => Ok(stored),
            Err(e) => {
                // A storage hiccup must not block analysis on fresh data.
                warn!(error = %e, "failed to persist weather observation");
                Ok(obs)
            }
        }
    }
}

/// Enrich a raw reading into a full observation (pure).
pub fn enrich(raw: RawObservation, is_forecast: bool) -> WeatherObservation {
    let t = Utc
        .timestamp_micros(raw.valid_at)
        .single()
        .unwrap_or_else(Utc::now);
    // Approximate local solar hour from longitude (15° per hour).
    let local_hour =
        ((f64::from(t.hour()) + raw.location.lon / 15.0).rem_euclid(24.0)) as u32 % 24;
    let stability = stability::stability_class(
        raw.wind_speed_ms,
        local_hour,
        t.month(),
        raw.cloud_cover_pct,
    );

    let mut obs = WeatherObservation {
        id: 0,
        location: raw.location,
        observed_at: raw.valid_at,
        temperature_c: raw.temperature_c,
        humidity_pct: raw.humidity_pct,
        wind_speed_ms: raw.wind_speed_ms,
        wind_direction_deg: raw.wind_direction_deg,
        pressure_hpa: raw.pressure_hpa,
        visibility_km: raw.visibility_km,
        cloud_cover_pct: raw.cloud_cover_pct,
        precipitation_mm: raw.precipitation_mm,
        dew_point_c: stability::dew_point_c(raw.temperature_c, raw.humidity_pct),
        stability,
        mixing_height_m: stability::mixing_height_m(stability),
        is_forecast,
        weather_vector: Vec::new(),
    };
    obs.weather_vector = embedding::weather_vector(&obs);
    obs
}

/// Pick the forecast hour nearest 10:00 solar-local on `date`.
fn pick_for_date(forecast: &[WeatherObservation], date: NaiveDate) -> Option<WeatherObservation> {
    forecast
        .iter()
        .filter(|o| {
            Utc.timestamp_micros(o.observed_at)
                .single()
                .is_some_and(|t| t.date_naive() == date)
        })
        .min_by_key(|o| {
            let utc_hour = Utc
                .timestamp_micros(o.observed_at)
                .single()
                .map_or(0.0, |t| f64::from(t.hour()));
            let local_hour = (utc_hour + o.location.lon / 15.0).rem_euclid(24.0);
            (local_hour - 10.0).abs() as i64
        })
        .cloned()
}

/// Fold contiguous suitable hours into burn windows with a quality score.
pub fn burn_windows(forecast: &[WeatherObservation]) -> Vec<BurnWindow> {
    let mut windows = Vec::new();
    let mut open: Option<(NaiveDate, u32, u32, Vec<f64>)> = None;

    for obs in forecast {
        let Some(t) = Utc.timestamp_micros(obs.observed_at).single() else {
            continue;
        };
        let verdict = suitability::analyze(obs);
        if verdict.suitable {
            match open.as_mut() {
                Some((date, _, end, scores))
                    if *date == t.date_naive() && *end == t.hour() =>
                {
                    *end = t.hour() + 1;
                    scores.push(verdict.score);
                }
                _ => {
                    if let Some(w) = open.take() {
                        windows.push(close_window(w));
                    }
                    open = Some((t.date_naive(), t.hour(), t.hour() + 1, vec![verdict.score]));
                }
            }
        } else if let Some(w) = open.take() {
            windows.push(close_window(w));
        }
    }
    if let Some(w) = open.take() {
        windows.push(close_window(w));
    }
    windows
}

fn close_window((date, start, end, scores): (NaiveDate, u32, u32, Vec<f64>)) -> BurnWindow {
    let quality = if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    };
    BurnWindow {
        date,
        start_hour: start,
        end_hour: end,
        quality,
    }
}

/// Red-flag style advisories derived from forecast rows.
pub fn forecast_alerts(forecast: &[WeatherObservation]) -> Vec<WeatherAlertNotice> {
    use crate::config::defaults::{RED_FLAG_HUMIDITY_PCT, RED_FLAG_WIND_MS};
    forecast
        .iter()
        .filter(|o| o.wind_speed_ms > RED_FLAG_WIND_MS && o.humidity_pct < RED_FLAG_HUMIDITY_PCT)
        .map(|o| WeatherAlertNotice {
            valid_at: o.observed_at,
            kind: "red_flag".to_string(),
            message: format!(
                "wind {:.0} m/s with humidity {:.0}% — burn operations halt",
                o.wind_speed_ms, o.humidity_pct
            ),
        })
        .collect()
}
