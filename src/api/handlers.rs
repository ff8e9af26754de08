//! HTTP handlers for the coordination API.
//!
//! Thin adapters: parse and validate the wire shape, call the pipeline
//! components, shape the response. All domain rules live in the stages;
//! every error funnels through `AppError`'s status mapping.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::response::{AppendHeaders, IntoResponse, Response};
use axum::Json;
use chrono::{NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::alerts::{AlertRequest, EmergencyRegion};
use crate::coordinator::SubmitBurnRequest;
use crate::error::{AppError, Result};
use crate::optimizer::{OptimizationInput, Optimizer, WeatherTable};
use crate::pipeline::Pipeline;
use crate::store::{RequestFilter, RequestPatch, RequestSort, VectorMatch};
use crate::types::{
    epoch_micros, AlertRecipient, AlertSeverity, AlertType, BurnRequest, Channel, GeoPoint,
    RequestStatus, TimeWindow, WeatherObservation,
};
use crate::weather::{self, suitability, CacheOutcome, RawObservation};

/// Shared handler state.
#[derive(Clone)]
pub struct ApiState {
    pub pipeline: Arc<Pipeline>,
}

fn cache_header(outcome: CacheOutcome) -> AppendHeaders<[(&'static str, &'static str); 1]> {
    AppendHeaders([("x-cache", outcome.header_value())])
}

// ============================================================================
// Burn requests
// ============================================================================

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitResponse {
    pub request_id: i64,
    pub priority: u8,
    pub status: RequestStatus,
    pub next_stage: &'static str,
    pub similar: Vec<VectorMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub warnings: Vec<String>,
}

/// POST /burn-requests
pub async fn submit_burn_request(
    State(state): State<ApiState>,
    Json(body): Json<SubmitBurnRequest>,
) -> Result<Json<SubmitResponse>> {
    let outcome = state.pipeline.handle_submission(body).await?;
    Ok(Json(SubmitResponse {
        request_id: outcome.request.id,
        priority: outcome.request.priority_score,
        status: outcome.request.status,
        next_stage: outcome.next_stage,
        similar: outcome.similar,
        warnings: outcome.warnings,
    }))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub status: Option<String>,
    #[serde(alias = "farmId")]
    pub farm_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: Option<u32>,
    pub limit: Option<u32>,
    pub sort: Option<String>,
    pub order: Option<String>,
}

/// GET /burn-requests
pub async fn list_burn_requests(
    State(state): State<ApiState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<super::envelope::ListResponse<BurnRequest>>> {
    let status = match query.status.as_deref() {
        Some(s) => Some(
            RequestStatus::parse(s)
                .ok_or_else(|| AppError::validation(format!("unknown status '{s}'")))?,
        ),
        None => None,
    };
    let sort = match query.sort.as_deref() {
        Some(s) => RequestSort::parse(s)
            .ok_or_else(|| AppError::validation(format!("unknown sort column '{s}'")))?,
        None => RequestSort::default(),
    };
    let descending = match query.order.as_deref() {
        Some("desc") => true,
        Some("asc") | None => false,
        Some(other) => {
            return Err(AppError::validation(format!("unknown order '{other}'")));
        }
    };

    let filter = RequestFilter {
        status,
        farm_id: query.farm_id,
        from: query.from,
        to: query.to,
        page: query.page.unwrap_or(1),
        limit: query.limit.unwrap_or(20),
        sort,
        descending,
    };
    let page = state.pipeline.store().list_burn_requests(&filter).await?;
    Ok(Json(page.into()))
}

#[derive(Debug, Deserialize)]
pub struct GetQuery {
    #[serde(default)]
    pub expanded: Option<bool>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestDetail {
    #[serde(flatten)]
    pub request: BurnRequest,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prediction: Option<crate::types::SmokePrediction>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schedule_entry: Option<crate::types::ScheduleEntry>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub farm: Option<crate::types::Farm>,
}

/// GET /burn-requests/:id
pub async fn get_burn_request(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Query(query): Query<GetQuery>,
) -> Result<Json<RequestDetail>> {
    let store = state.pipeline.store();
    let request = store
        .get_burn_request(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))?;

    let mut detail = RequestDetail {
        request,
        prediction: None,
        schedule_entry: None,
        farm: None,
    };
    if query.expanded.unwrap_or(false) {
        detail.prediction = store.latest_prediction_for(id).await?;
        detail.schedule_entry = store.active_entry_for(id).await?;
        detail.farm = store.get_farm(detail.request.farm_id).await?;
    }
    Ok(Json(detail))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateBody {
    pub burn_date: Option<NaiveDate>,
    pub time_window_start: Option<String>,
    pub time_window_end: Option<String>,
    pub fuel_load_t_per_ha: Option<f64>,
    pub priority_score: Option<u8>,
}

/// PUT /burn-requests/:id
pub async fn update_burn_request(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<UpdateBody>,
) -> Result<Json<BurnRequest>> {
    let window = match (&body.time_window_start, &body.time_window_end) {
        (Some(start), Some(end)) => {
            let w = TimeWindow::parse(start, end)
                .ok_or_else(|| AppError::validation("time window must be HH:MM"))?;
            if w.duration_minutes() < crate::config::defaults::MIN_WINDOW_MINUTES {
                return Err(AppError::validation("burn window must be at least 2 hours"));
            }
            Some(w)
        }
        (None, None) => None,
        _ => {
            return Err(AppError::validation(
                "time window start and end must be updated together",
            ));
        }
    };
    if let Some(date) = body.burn_date {
        let today = Utc::now().date_naive();
        if date < today || date > today + chrono::Duration::days(365) {
            return Err(AppError::validation("burn date outside the allowed range"));
        }
    }
    if let Some(p) = body.priority_score {
        if !(1..=10).contains(&p) {
            return Err(AppError::validation("priority must be 1..=10"));
        }
    }
    if let Some(f) = body.fuel_load_t_per_ha {
        if !(f > 0.0 && f <= 100.0) {
            return Err(AppError::validation("fuel load out of range"));
        }
    }

    let patch = RequestPatch {
        burn_date: body.burn_date,
        window,
        fuel_load_t_per_ha: body.fuel_load_t_per_ha,
        priority_score: body.priority_score,
    };
    if patch.is_empty() {
        return Err(AppError::validation("no updatable fields supplied"));
    }
    let updated = state
        .pipeline
        .store()
        .update_request_fields(id, &patch)
        .await?;
    Ok(Json(updated))
}

#[derive(Debug, Deserialize)]
pub struct CancelBody {
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelResponse {
    pub status: RequestStatus,
    pub cancellation_reason: String,
}

/// DELETE /burn-requests/:id
pub async fn cancel_burn_request(
    State(state): State<ApiState>,
    Path(id): Path<i64>,
    Json(body): Json<CancelBody>,
) -> Result<Json<CancelResponse>> {
    let store = state.pipeline.store();
    let request = store
        .get_burn_request(id)
        .await?
        .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))?;
    let updated = store
        .update_request_status(id, request.status, RequestStatus::Cancelled)
        .await?;
    Ok(Json(CancelResponse {
        status: updated.status,
        cancellation_reason: body.reason,
    }))
}

// ============================================================================
// Conflict detection
// ============================================================================

/// Ambient conditions supplied inline on detection/optimization requests.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AmbientWeather {
    pub wind_speed_ms: f64,
    pub wind_direction_deg: f64,
    #[serde(default = "default_humidity")]
    pub humidity_pct: f64,
    #[serde(default = "default_temperature")]
    pub temperature_c: f64,
    #[serde(default = "default_pressure")]
    pub pressure_hpa: f64,
    #[serde(default = "default_visibility")]
    pub visibility_km: f64,
    #[serde(default = "default_cloud")]
    pub cloud_cover_pct: f64,
    #[serde(default)]
    pub precipitation_mm: f64,
}

fn default_humidity() -> f64 {
    50.0
}
fn default_temperature() -> f64 {
    20.0
}
fn default_pressure() -> f64 {
    1_013.0
}
fn default_visibility() -> f64 {
    10.0
}
fn default_cloud() -> f64 {
    20.0
}

impl AmbientWeather {
    fn into_observation(self, location: GeoPoint) -> WeatherObservation {
        weather::enrich(
            RawObservation {
                location,
                valid_at: epoch_micros(Utc::now()),
                temperature_c: self.temperature_c,
                humidity_pct: self.humidity_pct,
                wind_speed_ms: self.wind_speed_ms,
                wind_direction_deg: self.wind_direction_deg,
                pressure_hpa: self.pressure_hpa,
                visibility_km: self.visibility_km,
                cloud_cover_pct: self.cloud_cover_pct,
                precipitation_mm: self.precipitation_mm,
            },
            false,
        )
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectConflictsBody {
    pub burn_requests: Vec<i64>,
    pub weather: Option<AmbientWeather>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DetectConflictsResponse {
    pub conflicts: Vec<crate::types::Conflict>,
    pub downwind_conflicts: Vec<(i64, i64)>,
    pub combined_pm25: f64,
    pub safety_violation: bool,
}

/// POST /burn-requests/detect-conflicts
pub async fn detect_conflicts(
    State(state): State<ApiState>,
    Json(body): Json<DetectConflictsBody>,
) -> Result<Json<DetectConflictsResponse>> {
    if body.burn_requests.len() < 2 {
        return Err(AppError::validation(
            "conflict detection needs at least two burn requests",
        ));
    }

    let store = state.pipeline.store();
    let mut burns = Vec::with_capacity(body.burn_requests.len());
    for id in &body.burn_requests {
        let request = store
            .get_burn_request(*id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))?;
        burns.push(request);
    }

    let center = mean_centroid(&burns);
    let observation = match body.weather {
        Some(ambient) => ambient.into_observation(center),
        None => state.pipeline.weather().fetch_current(center).await?.0,
    };

    let cancel = CancellationToken::new();
    let conflicts = state
        .pipeline
        .predictor()
        .pairwise_conflicts(&burns, &observation, &cancel)?;
    let downwind = state.pipeline.predictor().downwind_pairs(&burns, &observation);

    let combined = conflicts
        .iter()
        .map(|c| c.max_combined_pm25)
        .fold(0.0_f64, f64::max);

    Ok(Json(DetectConflictsResponse {
        safety_violation: combined > 35.0,
        combined_pm25: combined,
        downwind_conflicts: downwind,
        conflicts,
    }))
}

fn mean_centroid(burns: &[BurnRequest]) -> GeoPoint {
    let n = burns.len().max(1) as f64;
    let (mut lat, mut lon) = (0.0, 0.0);
    for b in burns {
        lat += b.centroid.lat;
        lon += b.centroid.lon;
    }
    GeoPoint::new(lat / n, lon / n)
}

// ============================================================================
// Weather
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct LocationQuery {
    pub lat: f64,
    pub lon: f64,
}

/// GET /weather/current
pub async fn weather_current(
    State(state): State<ApiState>,
    Query(query): Query<LocationQuery>,
) -> Result<Response> {
    validate_coordinates(query.lat, query.lon)?;
    let (observation, outcome) = state
        .pipeline
        .weather()
        .fetch_current(GeoPoint::new(query.lat, query.lon))
        .await?;
    Ok((cache_header(outcome), Json(observation)).into_response())
}

#[derive(Debug, Deserialize)]
pub struct ForecastQuery {
    pub lat: f64,
    pub lon: f64,
    #[serde(default = "default_days")]
    pub days: u32,
}

fn default_days() -> u32 {
    3
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForecastResponse {
    pub forecast: Vec<WeatherObservation>,
    pub burn_windows: Vec<weather::BurnWindow>,
    pub alerts: Vec<weather::WeatherAlertNotice>,
}

/// GET /weather/forecast
pub async fn weather_forecast(
    State(state): State<ApiState>,
    Query(query): Query<ForecastQuery>,
) -> Result<Response> {
    validate_coordinates(query.lat, query.lon)?;
    if !(1..=7).contains(&query.days) {
        return Err(AppError::validation("days must be 1..=7"));
    }
    let (forecast, outcome) = state
        .pipeline
        .weather()
        .fetch_forecast(GeoPoint::new(query.lat, query.lon), query.days)
        .await?;
    let body = ForecastResponse {
        burn_windows: weather::burn_windows(&forecast),
        alerts: weather::forecast_alerts(&forecast),
        forecast,
    };
    Ok((cache_header(outcome), Json(body)).into_response())
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeBody {
    pub lat: f64,
    pub lon: f64,
    pub date: NaiveDate,
    pub burn_request_id: Option<i64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalyzeResponse {
    pub suitable: bool,
    pub score: f64,
    pub factors: Vec<crate::types::SuitabilityFactor>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plume: Option<crate::types::SmokePrediction>,
    pub alternatives: Vec<weather::BurnWindow>,
}

/// POST /weather/analyze
pub async fn weather_analyze(
    State(state): State<ApiState>,
    Json(body): Json<AnalyzeBody>,
) -> Result<Json<AnalyzeResponse>> {
    validate_coordinates(body.lat, body.lon)?;
    let location = GeoPoint::new(body.lat, body.lon);
    let (verdict, observation) = state
        .pipeline
        .weather()
        .analyze_for_burn(location, body.date)
        .await?;

    // Alternative windows from the full horizon.
    let alternatives = match state.pipeline.weather().fetch_forecast(location, 7).await {
        Ok((forecast, _)) => weather::burn_windows(&forecast)
            .into_iter()
            .filter(|w| w.quality > 0.0)
            .take(5)
            .collect(),
        Err(_) => Vec::new(),
    };

    let plume = match body.burn_request_id {
        Some(id) => {
            let request = state
                .pipeline
                .store()
                .get_burn_request(id)
                .await?
                .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))?;
            Some(crate::predictor::predict_plume(
                &request,
                &observation,
                &crate::config::get().predictor,
                epoch_micros(Utc::now()),
            )?)
        }
        None => None,
    };

    Ok(Json(AnalyzeResponse {
        suitable: verdict.suitable,
        score: verdict.score,
        factors: verdict.factors,
        plume,
        alternatives,
    }))
}

fn validate_coordinates(lat: f64, lon: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
        return Err(AppError::validation_fields(
            "coordinates out of range",
            &["lat", "lon"],
        ));
    }
    Ok(())
}

// ============================================================================
// Schedule
// ============================================================================

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeParameters {
    pub seed: Option<u64>,
    pub horizon_days: Option<i64>,
    pub date_flex_days: Option<i64>,
    pub legal_hour_start: Option<u32>,
    pub legal_hour_end: Option<u32>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeBody {
    pub burn_requests: Vec<i64>,
    pub weather: Option<AmbientWeather>,
    #[serde(default)]
    pub parameters: OptimizeParameters,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OptimizeResponse {
    pub schedule: Vec<crate::optimizer::AssignmentOutcome>,
    pub cost: f64,
    pub improvements: crate::types::OptimizationImprovements,
    pub iterations: u64,
    pub feasible: bool,
}

/// POST /schedule/optimize
pub async fn schedule_optimize(
    State(state): State<ApiState>,
    Json(body): Json<OptimizeBody>,
) -> Result<Json<OptimizeResponse>> {
    run_optimize(state, body).await
}

/// POST /schedule/constraints — the same run with explicit constraints.
pub async fn schedule_constraints(
    State(state): State<ApiState>,
    Json(body): Json<OptimizeBody>,
) -> Result<Json<OptimizeResponse>> {
    run_optimize(state, body).await
}

async fn run_optimize(state: ApiState, body: OptimizeBody) -> Result<Json<OptimizeResponse>> {
    if body.burn_requests.is_empty() {
        return Ok(Json(OptimizeResponse {
            schedule: Vec::new(),
            cost: 0.0,
            improvements: crate::types::OptimizationImprovements::default(),
            iterations: 0,
            feasible: true,
        }));
    }

    let store = state.pipeline.store();
    let mut requests = Vec::with_capacity(body.burn_requests.len());
    for id in &body.burn_requests {
        let request = store
            .get_burn_request(*id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))?;
        if !request.status.is_optimizable() {
            return Err(AppError::conflict(format!(
                "burn request {id} is {} and cannot be optimized",
                request.status
            )));
        }
        requests.push(request);
    }

    // Conflicts across all dates in the set.
    let mut dates: Vec<NaiveDate> = requests.iter().map(|r| r.burn_date).collect();
    dates.sort_unstable();
    dates.dedup();
    let mut conflicts = Vec::new();
    for date in &dates {
        conflicts.extend(store.conflicts_for_date(*date).await?);
    }

    let mut predicted_pm25 = HashMap::new();
    for request in &requests {
        if let Some(pred) = store.latest_prediction_for(request.id).await? {
            predicted_pm25.insert(request.id, pred.max_pm25);
        }
    }

    // Ambient weather (when given) scores every slot uniformly; this keeps
    // explicit optimization runs deterministic for a fixed input.
    let weather_table = match body.weather {
        Some(ambient) => {
            let observation = ambient.into_observation(mean_centroid(&requests));
            WeatherTable::uniform(suitability::analyze(&observation).score)
        }
        None => WeatherTable::uniform(0.7),
    };

    let horizon_start = dates.first().copied().unwrap_or_else(|| Utc::now().date_naive());
    let horizon_days = body.parameters.horizon_days.unwrap_or(7).clamp(1, 7);

    let mut params = state.pipeline.optimizer().params().clone();
    if let Some(flex) = body.parameters.date_flex_days {
        params.date_flex_days = flex.clamp(0, 14);
    }
    if let Some(start) = body.parameters.legal_hour_start {
        params.legal_hour_start = start.min(23);
    }
    if let Some(end) = body.parameters.legal_hour_end {
        params.legal_hour_end = end.min(24);
    }
    if params.legal_hour_start >= params.legal_hour_end {
        return Err(AppError::validation("legal hours are not a valid range"));
    }

    let input = OptimizationInput::new(
        requests,
        conflicts,
        weather_table,
        predicted_pm25,
        horizon_start,
        horizon_days,
    );

    let seed = body.parameters.seed;
    let cancel = state.pipeline.shutdown_token().child_token();
    let outcome = tokio::task::spawn_blocking(move || {
        Optimizer::new(params).optimize(&input, seed, &cancel)
    })
    .await
    .map_err(|e| AppError::internal(format!("optimizer task: {e}")))??;

    let feasible = outcome.any_scheduled;
    Ok(Json(OptimizeResponse {
        schedule: outcome.assignments,
        cost: outcome.improvements.final_cost,
        iterations: outcome.improvements.iterations,
        improvements: outcome.improvements,
        feasible,
    }))
}

// ============================================================================
// Alerts
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecipientBody {
    pub farm_id: Option<i64>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    pub channels: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
}

fn default_language() -> String {
    "en".to_string()
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSendBody {
    pub alert_type: String,
    pub severity: String,
    pub burn_request_id: Option<i64>,
    #[serde(default)]
    pub variables: HashMap<String, String>,
    pub recipients: Vec<RecipientBody>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AlertSendResponse {
    pub alert_id: uuid::Uuid,
    pub sent: usize,
    pub failed: usize,
    pub delivery_stats: HashMap<String, u32>,
    pub notifications: Vec<crate::types::DeliveryRecord>,
}

/// POST /alerts/send
pub async fn alerts_send(
    State(state): State<ApiState>,
    Json(body): Json<AlertSendBody>,
) -> Result<Json<AlertSendResponse>> {
    let alert_type = AlertType::parse(&body.alert_type)
        .ok_or_else(|| AppError::validation(format!("unknown alert type '{}'", body.alert_type)))?;
    let severity = AlertSeverity::parse(&body.severity)
        .ok_or_else(|| AppError::validation(format!("unknown severity '{}'", body.severity)))?;

    let mut recipients = Vec::with_capacity(body.recipients.len());
    for (i, r) in body.recipients.into_iter().enumerate() {
        let channels = r
            .channels
            .iter()
            .map(|c| {
                Channel::parse(c)
                    .ok_or_else(|| AppError::validation(format!("unknown channel '{c}'")))
            })
            .collect::<Result<Vec<_>>>()?;
        if channels.is_empty() {
            return Err(AppError::validation("recipient needs at least one channel"));
        }
        let stored = state
            .pipeline
            .store()
            .insert_recipient(AlertRecipient {
                id: i as i64,
                farm_id: r.farm_id,
                name: r.name,
                phone: r.phone,
                email: r.email,
                channels,
                language: r.language,
            })
            .await?;
        recipients.push(stored);
    }

    let report = state
        .pipeline
        .alerts()
        .send(AlertRequest {
            alert_type,
            severity,
            burn_request_id: body.burn_request_id,
            variables: body.variables,
            recipients,
        })
        .await?;

    let mut delivery_stats: HashMap<String, u32> = HashMap::new();
    for d in &report.deliveries {
        if let Some(channel) = d.delivered_via {
            *delivery_stats.entry(channel.as_str().to_string()).or_default() += 1;
        }
    }

    Ok(Json(AlertSendResponse {
        alert_id: report.alert_id,
        sent: report.sent,
        failed: report.failed,
        delivery_stats,
        notifications: report.deliveries,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AckBody {
    pub alert_id: uuid::Uuid,
    pub recipient_id: i64,
    pub response: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AckResponse {
    pub acknowledged: bool,
    pub timestamp: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub follow_up: Option<&'static str>,
}

/// POST /alerts/acknowledge
pub async fn alerts_acknowledge(
    State(state): State<ApiState>,
    Json(body): Json<AckBody>,
) -> Result<Json<AckResponse>> {
    let (ack, follow_up) = state
        .pipeline
        .alerts()
        .acknowledge(body.alert_id, body.recipient_id, body.response)
        .await?;
    Ok(Json(AckResponse {
        acknowledged: true,
        timestamp: ack.acknowledged_at,
        follow_up,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyBody {
    pub lat: f64,
    pub lon: f64,
    pub radius_km: f64,
    pub reason: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EmergencyResponse {
    pub alert_id: uuid::Uuid,
    pub cancelled_requests: Vec<i64>,
    pub sent: usize,
    pub failed: usize,
    pub per_channel: HashMap<&'static str, (u32, u32)>,
}

/// POST /alerts/emergency
pub async fn alerts_emergency(
    State(state): State<ApiState>,
    Json(body): Json<EmergencyBody>,
) -> Result<Json<EmergencyResponse>> {
    validate_coordinates(body.lat, body.lon)?;
    if !(body.radius_km > 0.0 && body.radius_km <= 200.0) {
        return Err(AppError::validation("radius_km must be in (0, 200]"));
    }
    let report = state
        .pipeline
        .emergency_halt(
            EmergencyRegion {
                center: GeoPoint::new(body.lat, body.lon),
                radius_km: body.radius_km,
            },
            &body.reason,
        )
        .await?;
    Ok(Json(EmergencyResponse {
        alert_id: report.alert_id,
        cancelled_requests: report.cancelled_requests,
        sent: report.sent,
        failed: report.failed,
        per_channel: report.per_channel,
    }))
}

// ============================================================================
// Health
// ============================================================================

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub components: HashMap<&'static str, bool>,
    pub stats: crate::pipeline::StatsView,
}

/// GET /health
pub async fn health(State(state): State<ApiState>) -> Json<HealthResponse> {
    let components = state.pipeline.component_health().await;
    let healthy = components.values().filter(|ok| **ok).count();
    let status = if healthy == components.len() {
        "healthy"
    } else if components.get("store").copied().unwrap_or(false) {
        "degraded"
    } else {
        "unhealthy"
    };
    Json(HealthResponse {
        status,
        components,
        stats: state.pipeline.stats.view(),
    })
}
