//! Stage 3: smoke dispersion prediction and conflict detection.
//!
//! `predict_plume` is pure: request + weather in, [`SmokePrediction`] out.
//! The [`Predictor`] service wraps it with store access for the
//! date-scoped detection path and persists conflicts idempotently.

pub mod conflicts;
pub mod embedding;
pub mod gaussian;
pub mod plume;

pub use conflicts::BurnPlume;
pub use gaussian::TerrainKind;

use std::sync::Arc;

use chrono::{NaiveDate, Utc};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::PredictorConfig;
use crate::error::{AppError, Result};
use crate::store::{spatial, Store};
use crate::types::{
    epoch_micros, BurnRequest, Conflict, GeoPoint, SmokePrediction, StabilityClass,
    WeatherObservation,
};

/// A plume's concentration field: everything needed to evaluate ground-
/// level PM2.5 at an arbitrary point.
#[derive(Debug, Clone)]
pub struct PlumeField {
    pub source: GeoPoint,
    pub downwind_bearing_deg: f64,
    pub wind_ms: f64,
    pub stability: StabilityClass,
    pub emission_g_per_s: f64,
    pub effective_height_m: f64,
    pub mixing_height_m: f64,
    pub terrain: TerrainKind,
}

impl PlumeField {
    /// Ground-level concentration at `p`, µg/m³. Zero upwind.
    pub fn concentration_at(&self, p: GeoPoint) -> f64 {
        let d = spatial::distance_meters(self.source, p).max(10.0);

        let (x, y) = if self.wind_ms < crate::config::defaults::CALM_WIND_MS {
            // Calm air: radially symmetric, treat all directions as
            // downwind along the axis.
            (d, 0.0)
        } else {
            let bearing = spatial::bearing_deg(self.source, p);
            let mut delta = bearing - self.downwind_bearing_deg;
            delta = (delta + 180.0).rem_euclid(360.0) - 180.0;
            let delta_rad = delta.to_radians();
            (d * delta_rad.cos(), d * delta_rad.sin())
        };

        if x <= 0.0 {
            return 0.0;
        }
        gaussian::concentration_ug_m3(
            self.emission_g_per_s,
            self.wind_ms,
            x,
            y,
            self.effective_height_m,
            self.stability,
            self.mixing_height_m,
            self.terrain,
        )
    }
}

/// Assemble a [`PlumeField`] from burn and weather parameters.
#[allow(clippy::too_many_arguments)]
pub fn build_field(
    source: GeoPoint,
    crop: crate::types::CropType,
    area_hectares: f64,
    fuel_load_t_per_ha: f64,
    wind_ms: f64,
    wind_direction_deg: f64,
    stability: StabilityClass,
    mixing_height_m: f64,
) -> PlumeField {
    let emission = gaussian::emission_rate_g_per_s(crop, area_hectares, fuel_load_t_per_ha);
    let rise = gaussian::briggs_plume_rise(fuel_load_t_per_ha, wind_ms, stability);
    PlumeField {
        source,
        downwind_bearing_deg: (wind_direction_deg + 180.0).rem_euclid(360.0),
        wind_ms,
        stability,
        emission_g_per_s: emission,
        // Ground-level release plus buoyant rise.
        effective_height_m: rise,
        mixing_height_m,
        terrain: TerrainKind::Flat,
    }
}

/// Compute a full smoke prediction for a burn under given weather (pure).
pub fn predict_plume(
    request: &BurnRequest,
    weather: &WeatherObservation,
    config: &PredictorConfig,
    now_micros: i64,
) -> Result<SmokePrediction> {
    if request.area_hectares <= 0.0 {
        return Err(AppError::precondition("burn request has no area"));
    }

    let field = build_field(
        request.centroid,
        request.crop_type,
        request.area_hectares,
        request.fuel_load_t_per_ha,
        weather.wind_speed_ms,
        weather.wind_direction_deg,
        weather.stability,
        weather.mixing_height_m,
    );
    let shape = plume::fan_shape(weather.wind_speed_ms, weather.stability, config.r_max_km);
    let ring = plume::plume_ring(request.centroid, field.downwind_bearing_deg, &shape);

    // Peak along the axis: sample from the near field out to full reach.
    let mut max_pm25: f64 = 0.0;
    let reach_m = shape.length_km * 1_000.0;
    for step in 1..=64 {
        let x = reach_m * f64::from(step) / 64.0;
        let c = gaussian::concentration_ug_m3(
            field.emission_g_per_s,
            field.wind_ms,
            x,
            0.0,
            field.effective_height_m,
            field.stability,
            field.mixing_height_m,
            field.terrain,
        );
        max_pm25 = max_pm25.max(c);
    }

    let affected_area_km2 = spatial::area_meters(&ring) / 1.0e6;

    // Confidence: forecasts and edge conditions cost certainty.
    let mut confidence: f64 = 0.9;
    if weather.is_forecast {
        confidence -= 0.15;
    }
    if shape.calm {
        confidence -= 0.1;
    }
    if weather.stability == StabilityClass::F || weather.stability == StabilityClass::A {
        confidence -= 0.05;
    }
    let confidence = confidence.clamp(0.3, 0.95);

    let plume_vector = embedding::plume_vector(&embedding::PlumeFeatures {
        emission_g_per_s: field.emission_g_per_s,
        area_hectares: request.area_hectares,
        stability: field.stability,
        wind_ms: field.wind_ms,
        wind_direction_deg: weather.wind_direction_deg,
        shape,
        affected_area_km2,
    });

    Ok(SmokePrediction {
        id: 0,
        burn_request_id: request.id,
        predicted_at: now_micros,
        plume: ring,
        max_pm25,
        affected_area_km2,
        dispersion_radius_km: shape.length_km,
        confidence,
        plume_vector,
    })
}

/// See module docs.
pub struct Predictor {
    store: Arc<dyn Store>,
    config: PredictorConfig,
}

impl Predictor {
    pub fn new(store: Arc<dyn Store>, config: PredictorConfig) -> Self {
        Self { store, config }
    }

    /// Predict and persist, superseding earlier predictions for the
    /// request.
    pub async fn predict_and_store(
        &self,
        request: &BurnRequest,
        weather: &WeatherObservation,
    ) -> Result<SmokePrediction> {
        let prediction =
            predict_plume(request, weather, &self.config, epoch_micros(Utc::now()))?;
        let stored = self.store.insert_prediction(prediction).await?;
        debug!(
            request_id = request.id,
            max_pm25 = stored.max_pm25,
            radius_km = stored.dispersion_radius_km,
            "smoke prediction stored"
        );
        Ok(stored)
    }

    /// Pairwise conflicts for an explicit burn set under shared ambient
    /// weather (the detect-conflicts endpoint).
    pub fn pairwise_conflicts(
        &self,
        burns: &[BurnRequest],
        weather: &WeatherObservation,
        cancel: &CancellationToken,
    ) -> Result<Vec<Conflict>> {
        let plumes = burns
            .iter()
            .filter_map(|r| self.plume_for(r, weather))
            .collect::<Vec<_>>();
        conflicts::detect(&plumes, &self.config, cancel)
    }

    /// Pairs where one burn sits directly inside the other's plume
    /// footprint (downwind exposure), ordered ascending.
    pub fn downwind_pairs(
        &self,
        burns: &[BurnRequest],
        weather: &WeatherObservation,
    ) -> Vec<(i64, i64)> {
        let plumes: Vec<BurnPlume> = burns
            .iter()
            .filter_map(|r| self.plume_for(r, weather))
            .collect();
        let mut pairs = Vec::new();
        for upwind in &plumes {
            for exposed in &plumes {
                if upwind.request_id == exposed.request_id {
                    continue;
                }
                if spatial::contains_point(&upwind.ring, exposed.field.source) {
                    pairs.push((upwind.request_id, exposed.request_id));
                }
            }
        }
        pairs.sort_unstable();
        pairs
    }

    /// Load pending + scheduled burns for `date`, compute all pairwise
    /// conflicts from each site's latest stored weather, and persist them.
    pub async fn detect_all_conflicts_for(
        &self,
        date: NaiveDate,
        cancel: &CancellationToken,
    ) -> Result<Vec<Conflict>> {
        let requests = self.store.requests_for_date(date).await?;
        if requests.len() < 2 {
            return Ok(Vec::new());
        }

        let now = epoch_micros(Utc::now());
        let max_age = 3 * 3_600 * 1_000_000_i64;
        let mut plumes = Vec::with_capacity(requests.len());
        for request in &requests {
            let weather = self
                .store
                .latest_observation_near(request.centroid, now, max_age)
                .await?
                .ok_or_else(|| {
                    AppError::precondition(format!(
                        "no recent weather for burn request {}",
                        request.id
                    ))
                })?;
            if let Some(plume) = self.plume_for(request, &weather) {
                plumes.push(plume);
            }
        }

        let detected = conflicts::detect(&plumes, &self.config, cancel)?;
        let mut stored = Vec::with_capacity(detected.len());
        for conflict in detected {
            stored.push(self.store.upsert_conflict(conflict).await?);
        }
        info!(date = %date, conflicts = stored.len(), "conflict detection complete");
        Ok(stored)
    }

    /// Build a [`BurnPlume`], skipping degenerate geometry with a warning.
    fn plume_for(&self, request: &BurnRequest, weather: &WeatherObservation) -> Option<BurnPlume> {
        let field = build_field(
            request.centroid,
            request.crop_type,
            request.area_hectares,
            request.fuel_load_t_per_ha,
            weather.wind_speed_ms,
            weather.wind_direction_deg,
            weather.stability,
            weather.mixing_height_m,
        );
        let shape = plume::fan_shape(weather.wind_speed_ms, weather.stability, self.config.r_max_km);
        let ring = plume::plume_ring(request.centroid, field.downwind_bearing_deg, &shape);
        if !spatial::spatial_valid(&ring) {
            warn!(request_id = request.id, "degenerate plume polygon — skipping");
            return None;
        }
        Some(BurnPlume {
            request_id: request.id,
            date: request.burn_date,
            window: request.window,
            ring,
            field,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CropType, RequestStatus, TimeWindow};
    use crate::weather::suitability::observation_with;

    fn request(id: i64, area_ha: f64) -> BurnRequest {
        BurnRequest {
            id,
            field_id: 1,
            farm_id: 1,
            burn_date: NaiveDate::from_ymd_opt(2026, 8, 4).expect("valid date"),
            window: TimeWindow::from_hours(9, 13),
            fuel_load_t_per_ha: 15.0,
            area_hectares: area_ha,
            crop_type: CropType::Rice,
            centroid: GeoPoint::new(38.58, -121.49),
            status: RequestStatus::Pending,
            priority_score: 7,
            terrain_vector: vec![0.0; crate::types::TERRAIN_DIMS],
            created_at: 0,
            updated_at: 0,
        }
    }

    #[test]
    fn isolated_safe_burn_stays_under_threshold_at_distance() {
        // 50 ha rice under fair weather: ambient PM2.5 beyond 2 km must be
        // below the 35 µg/m³ threshold.
        let weather = observation_with(3.6, 55.0, StabilityClass::D);
        let req = request(1, 50.0);
        let pred =
            predict_plume(&req, &weather, &PredictorConfig::default(), 0).expect("prediction");

        assert!(pred.max_pm25.is_finite());
        assert_eq!(pred.plume_vector.len(), crate::types::PLUME_DIMS);
        assert!(spatial::spatial_valid(&pred.plume));

        let field = build_field(
            req.centroid,
            req.crop_type,
            req.area_hectares,
            req.fuel_load_t_per_ha,
            weather.wind_speed_ms,
            weather.wind_direction_deg,
            weather.stability,
            weather.mixing_height_m,
        );
        let at_2km = spatial::destination(req.centroid, field.downwind_bearing_deg, 2_000.0);
        let c = field.concentration_at(at_2km);
        assert!(c < 35.0, "PM2.5 at 2 km = {c}");
    }

    #[test]
    fn axis_concentration_non_increasing_beyond_touchdown() {
        // The Briggs rise makes the burn an elevated source, so the
        // ground-level axial profile peaks at the plume touchdown point;
        // the monotone-decay guarantee applies from there outward (see
        // gaussian::touchdown_distance_m).
        let weather = observation_with(3.6, 55.0, StabilityClass::D);
        let req = request(1, 100.0);
        let field = build_field(
            req.centroid,
            req.crop_type,
            req.area_hectares,
            req.fuel_load_t_per_ha,
            weather.wind_speed_ms,
            weather.wind_direction_deg,
            weather.stability,
            weather.mixing_height_m,
        );
        let touchdown_m =
            gaussian::touchdown_distance_m(field.effective_height_m, field.stability);
        assert!(touchdown_m > 0.0, "elevated plume expected for a real fuel load");

        let mut prev = f64::INFINITY;
        for step in 0..=20 {
            let distance = touchdown_m + 1_000.0 * f64::from(step);
            let p = spatial::destination(req.centroid, field.downwind_bearing_deg, distance);
            let c = field.concentration_at(p);
            assert!(
                c <= prev + 1e-9,
                "rising at {:.1} km: {c} > {prev}",
                distance / 1_000.0
            );
            prev = c;
        }
    }

    #[test]
    fn upwind_concentration_is_zero() {
        let weather = observation_with(3.6, 55.0, StabilityClass::D);
        let req = request(1, 100.0);
        let field = build_field(
            req.centroid,
            req.crop_type,
            req.area_hectares,
            req.fuel_load_t_per_ha,
            weather.wind_speed_ms,
            weather.wind_direction_deg,
            weather.stability,
            weather.mixing_height_m,
        );
        let upwind_bearing = (field.downwind_bearing_deg + 180.0).rem_euclid(360.0);
        let upwind = spatial::destination(req.centroid, upwind_bearing, 3_000.0);
        assert_eq!(field.concentration_at(upwind), 0.0);
    }

    #[test]
    fn forecast_weather_lowers_confidence() {
        let mut weather = observation_with(3.6, 55.0, StabilityClass::D);
        let req = request(1, 50.0);
        let current =
            predict_plume(&req, &weather, &PredictorConfig::default(), 0).expect("prediction");
        weather.is_forecast = true;
        let forecast =
            predict_plume(&req, &weather, &PredictorConfig::default(), 0).expect("prediction");
        assert!(forecast.confidence < current.confidence);
    }

    #[tokio::test]
    async fn date_scoped_detection_requires_weather() {
        use crate::store::MemStore;
        let store = Arc::new(MemStore::new());
        let predictor = Predictor::new(store.clone(), PredictorConfig::default());

        // Two requests but no stored weather: PRECONDITION.
        let farm = store
            .insert_farm(crate::types::Farm {
                id: 0,
                name: "F".into(),
                owner_name: "O".into(),
                phone: "+15551230001".into(),
                email: "o@example.com".into(),
                location: GeoPoint::new(38.58, -121.49),
                permit_number: None,
                total_area_hectares: 100.0,
                created_at: 0,
            })
            .await
            .expect("farm");
        let field = store
            .insert_field(crate::types::Field {
                id: 0,
                farm_id: farm.id,
                name: "N".into(),
                boundary: spatial::square_around(GeoPoint::new(38.58, -121.49), 700.0),
                area_hectares: 49.0,
                crop_type: CropType::Rice,
                last_burn_date: None,
            })
            .await
            .expect("field");
        for _ in 0..2 {
            let mut r = request(0, 50.0);
            r.farm_id = farm.id;
            r.field_id = field.id;
            store
                .insert_request_with_prediction(r, None)
                .await
                .expect("request");
        }

        let err = predictor
            .detect_all_conflicts_for(
                NaiveDate::from_ymd_opt(2026, 8, 4).expect("valid date"),
                &CancellationToken::new(),
            )
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Precondition);
    }
}
