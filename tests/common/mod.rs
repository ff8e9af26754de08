//! Shared test harness: a full pipeline over the in-memory store with a
//! fixed-conditions weather provider and log-only delivery gateways.
#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use burncast::alerts::channels::{LogEmailGateway, LogSmsGateway};
use burncast::alerts::AlertService;
use burncast::config::{self, AlertsConfig, OptimizerParams, PredictorConfig, WeatherConfig};
use burncast::coordinator::{Coordinator, SubmitBurnRequest};
use burncast::embedding::NullEmbeddingProvider;
use burncast::optimizer::Optimizer;
use burncast::pipeline::Pipeline;
use burncast::predictor::Predictor;
use burncast::store::{spatial, MemStore, Store};
use burncast::types::{epoch_micros, Farm, GeoPoint};
use burncast::weather::{RawObservation, StaticWeatherProvider, WeatherService};

pub fn sacramento() -> GeoPoint {
    GeoPoint::new(38.58, -121.49)
}

/// Fixed ambient conditions for a test run.
pub fn conditions(wind_ms: f64, wind_from_deg: f64, humidity: f64) -> RawObservation {
    RawObservation {
        location: sacramento(),
        // Anchor at 18:00 UTC = ~10:00 solar-local at -121° so derived
        // stability lands in the daytime classes.
        valid_at: daytime_anchor_micros(),
        temperature_c: 22.0,
        humidity_pct: humidity,
        wind_speed_ms: wind_ms,
        wind_direction_deg: wind_from_deg,
        pressure_hpa: 1_013.0,
        visibility_km: 16.0,
        cloud_cover_pct: 15.0,
        precipitation_mm: 0.0,
    }
}

pub fn daytime_anchor_micros() -> i64 {
    use chrono::Timelike;
    let now = Utc::now();
    // Keep the anchor ahead of `now` so stored observations never age out
    // of the conflict detector's freshness window mid-test.
    let date = if now.hour() >= 15 {
        now.date_naive() + chrono::Duration::days(1)
    } else {
        now.date_naive()
    };
    let anchor = date
        .and_hms_opt(18, 0, 0)
        .unwrap_or_else(|| date.and_hms_opt(0, 0, 0).expect("midnight exists"));
    epoch_micros(anchor.and_utc())
}

/// Build the whole pipeline over MemStore + static weather.
pub fn build_pipeline(raw: RawObservation) -> (Arc<Pipeline>, Arc<MemStore>) {
    config::init_default_for_tests();
    let store = Arc::new(MemStore::new());
    let store_dyn: Arc<dyn Store> = store.clone();

    let weather = Arc::new(WeatherService::new(
        Arc::new(StaticWeatherProvider::with_conditions(raw)),
        store_dyn.clone(),
        &WeatherConfig::default(),
    ));
    let alerts = Arc::new(AlertService::new(
        store_dyn.clone(),
        Arc::new(LogSmsGateway),
        Arc::new(LogEmailGateway),
        AlertsConfig::default(),
    ));
    let pipeline = Arc::new(Pipeline::new(
        store_dyn.clone(),
        Coordinator::new(store_dyn.clone(), Arc::new(NullEmbeddingProvider)),
        weather,
        Arc::new(Predictor::new(store_dyn.clone(), PredictorConfig::default())),
        Optimizer::new(OptimizerParams {
            seed: 42,
            ..OptimizerParams::default()
        }),
        alerts,
    ));
    (pipeline, store)
}

pub async fn register_farm(store: &Arc<MemStore>, index: u32, location: GeoPoint) -> Farm {
    store
        .insert_farm(Farm {
            id: 0,
            name: format!("Test Farm {index}"),
            owner_name: format!("Owner {index}"),
            phone: format!("+1555123{:04}", 1_000 + index),
            email: format!("owner{index}@example.com"),
            location,
            permit_number: Some(format!("CA-2026-{index:04}")),
            total_area_hectares: 400.0,
            created_at: 0,
        })
        .await
        .expect("farm insert")
}

/// A submission for a square field of ~`area_ha` centered at `center`.
pub fn submission(
    farm_id: i64,
    field_name: &str,
    center: GeoPoint,
    area_ha: f64,
    crop: &str,
    days_ahead: i64,
    window: (&str, &str),
) -> SubmitBurnRequest {
    let side_m = (area_ha * 10_000.0).sqrt();
    SubmitBurnRequest {
        farm_id,
        field_name: field_name.to_string(),
        field_boundary: spatial::square_around(center, side_m),
        area_hectares: area_ha,
        crop_type: crop.to_string(),
        burn_date: Utc::now().date_naive() + chrono::Duration::days(days_ahead),
        time_window_start: window.0.to_string(),
        time_window_end: window.1.to_string(),
        fuel_load_t_per_ha: 15.0,
        requested_priority: None,
    }
}

/// Let spawned prediction stages settle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(50)).await;
}
