//! Persistence layer: entity storage plus fixed-dimension vector search.
//!
//! The [`Store`] trait is the seam between the pipeline and its backing
//! database. Two implementations ship:
//!
//! - [`PgStore`]: PostgreSQL via sqlx, vector columns via pgvector with
//!   HNSW indexes, used in production.
//! - [`MemStore`]: in-process maps with an exact cosine scan, used by the
//!   test suites and `seed --dry-run`.
//!
//! Both enforce the request-status transition DAG and the idempotent
//! conflict pair key. Inserts take an entity with `id == 0` and return the
//! stored row with its assigned id.

pub mod memory;
pub mod postgres;
pub mod spatial;

pub use memory::MemStore;
pub use postgres::PgStore;

use async_trait::async_trait;
use chrono::NaiveDate;

use crate::error::Result;
use crate::types::{
    Acknowledgment, Alert, AlertRecipient, BurnRequest, Conflict, DeliveryRecord, Farm, Field,
    RequestStatus, ResolutionStatus, ScheduleEntry, SmokePrediction, WeatherObservation,
    PLUME_DIMS, TERRAIN_DIMS, WEATHER_DIMS,
};

/// Which vector column a similarity query runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorColumn {
    /// `burn_requests.terrain_vector`, 32-d.
    Terrain,
    /// `smoke_predictions.plume_vector`, 64-d.
    Plume,
    /// `weather_observations.weather_vector`, 128-d.
    Weather,
}

impl VectorColumn {
    pub fn dims(self) -> usize {
        match self {
            VectorColumn::Terrain => TERRAIN_DIMS,
            VectorColumn::Plume => PLUME_DIMS,
            VectorColumn::Weather => WEATHER_DIMS,
        }
    }
}

/// One nearest-neighbor hit: row id and cosine distance (ascending order).
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct VectorMatch {
    pub id: i64,
    pub distance: f64,
}

/// Sort column for request listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestSort {
    #[default]
    CreatedAt,
    BurnDate,
    PriorityScore,
}

impl RequestSort {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "created_at" => Some(RequestSort::CreatedAt),
            "burn_date" => Some(RequestSort::BurnDate),
            "priority_score" => Some(RequestSort::PriorityScore),
            _ => None,
        }
    }
}

/// Listing filter with pagination. `page` is 1-based.
#[derive(Debug, Clone, Default)]
pub struct RequestFilter {
    pub status: Option<RequestStatus>,
    pub farm_id: Option<i64>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    pub page: u32,
    pub limit: u32,
    pub sort: RequestSort,
    pub descending: bool,
}

impl RequestFilter {
    /// Clamp pagination to sane bounds.
    pub fn normalized(mut self) -> Self {
        if self.page == 0 {
            self.page = 1;
        }
        if self.limit == 0 {
            self.limit = 20;
        }
        self.limit = self.limit.min(crate::config::defaults::MAX_PAGE_LIMIT);
        self
    }

    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// A page of rows plus the total matching count.
#[derive(Debug, Clone)]
pub struct PageOf<T> {
    pub data: Vec<T>,
    pub page: u32,
    pub limit: u32,
    pub total: u64,
}

/// Patchable burn-request columns for `PUT /burn-requests/:id`.
#[derive(Debug, Clone, Default)]
pub struct RequestPatch {
    pub burn_date: Option<NaiveDate>,
    pub window: Option<crate::types::TimeWindow>,
    pub fuel_load_t_per_ha: Option<f64>,
    pub priority_score: Option<u8>,
}

impl RequestPatch {
    pub fn is_empty(&self) -> bool {
        self.burn_date.is_none()
            && self.window.is_none()
            && self.fuel_load_t_per_ha.is_none()
            && self.priority_score.is_none()
    }
}

/// Validate a query vector's dimensionality against the target column.
pub fn check_dims(column: VectorColumn, query: &[f32]) -> Result<()> {
    if query.len() != column.dims() {
        return Err(crate::error::AppError::validation(format!(
            "query vector has {} dims, column expects {}",
            query.len(),
            column.dims()
        )));
    }
    Ok(())
}

/// Cosine distance in [0, 2]; 0 = identical direction.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let mut dot = 0.0_f64;
    let mut norm_a = 0.0_f64;
    let mut norm_b = 0.0_f64;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += f64::from(*x) * f64::from(*y);
        norm_a += f64::from(*x) * f64::from(*x);
        norm_b += f64::from(*y) * f64::from(*y);
    }
    let denom = norm_a.sqrt() * norm_b.sqrt();
    if denom <= f64::EPSILON {
        return 1.0;
    }
    1.0 - dot / denom
}

/// The persistence seam. See module docs.
#[async_trait]
pub trait Store: Send + Sync {
    // ── Farms & fields ──────────────────────────────────────────────────

    async fn insert_farm(&self, farm: Farm) -> Result<Farm>;
    async fn get_farm(&self, id: i64) -> Result<Option<Farm>>;
    async fn insert_field(&self, field: Field) -> Result<Field>;
    async fn get_field(&self, id: i64) -> Result<Option<Field>>;
    /// Look up a field by owning farm and name (unique per farm).
    async fn find_field(&self, farm_id: i64, name: &str) -> Result<Option<Field>>;

    // ── Burn requests ───────────────────────────────────────────────────

    /// Insert a request and (when present) its initial prediction under a
    /// single transaction.
    async fn insert_request_with_prediction(
        &self,
        request: BurnRequest,
        prediction: Option<SmokePrediction>,
    ) -> Result<BurnRequest>;

    async fn get_burn_request(&self, id: i64) -> Result<Option<BurnRequest>>;

    async fn list_burn_requests(&self, filter: &RequestFilter) -> Result<PageOf<BurnRequest>>;

    /// Compare-and-set status change. Rejects transitions outside the DAG
    /// with `CONFLICT`, and stale `from` values with `CONFLICT`.
    async fn update_request_status(
        &self,
        id: i64,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<BurnRequest>;

    async fn update_request_fields(&self, id: i64, patch: &RequestPatch) -> Result<BurnRequest>;

    /// Duplicate probe: same (farm, field, date, window start) submitted
    /// at or after `since_micros`.
    async fn find_duplicate(
        &self,
        farm_id: i64,
        field_id: i64,
        burn_date: NaiveDate,
        start_minute: u32,
        since_micros: i64,
    ) -> Result<Option<i64>>;

    /// Pending + scheduled requests for a burn date (the optimizer's and
    /// conflict detector's working set).
    async fn requests_for_date(&self, date: NaiveDate) -> Result<Vec<BurnRequest>>;

    // ── Weather ─────────────────────────────────────────────────────────

    async fn insert_observation(&self, obs: WeatherObservation) -> Result<WeatherObservation>;

    /// Most recent stored observation within ~cell distance of `location`
    /// not older than `max_age_micros` before `now_micros`.
    async fn latest_observation_near(
        &self,
        location: crate::types::GeoPoint,
        now_micros: i64,
        max_age_micros: i64,
    ) -> Result<Option<WeatherObservation>>;

    // ── Smoke predictions ───────────────────────────────────────────────

    async fn insert_prediction(&self, pred: SmokePrediction) -> Result<SmokePrediction>;
    async fn latest_prediction_for(&self, burn_request_id: i64)
        -> Result<Option<SmokePrediction>>;
    /// Drop predictions for the given requests (weather-change
    /// invalidation).
    async fn invalidate_predictions(&self, burn_request_ids: &[i64]) -> Result<u64>;

    // ── Conflicts ───────────────────────────────────────────────────────

    /// Idempotent on `(min(request ids), max(request ids), date)`:
    /// re-detection updates the existing row.
    async fn upsert_conflict(&self, conflict: Conflict) -> Result<Conflict>;
    async fn conflicts_for_date(&self, date: NaiveDate) -> Result<Vec<Conflict>>;
    async fn set_conflict_resolution(&self, id: i64, status: ResolutionStatus) -> Result<()>;

    // ── Schedule entries ────────────────────────────────────────────────

    /// Replace the active entries for all requests named in `entries`
    /// (one run's output) atomically.
    async fn replace_schedule_entries(
        &self,
        entries: Vec<ScheduleEntry>,
    ) -> Result<Vec<ScheduleEntry>>;

    async fn active_entry_for(&self, burn_request_id: i64) -> Result<Option<ScheduleEntry>>;

    // ── Alerts ──────────────────────────────────────────────────────────

    async fn insert_alert(&self, alert: Alert) -> Result<()>;
    async fn get_alert(&self, id: uuid::Uuid) -> Result<Option<Alert>>;
    async fn update_alert_deliveries(
        &self,
        id: uuid::Uuid,
        deliveries: &[DeliveryRecord],
    ) -> Result<()>;
    async fn insert_ack(&self, ack: Acknowledgment) -> Result<()>;
    async fn acks_for_alert(&self, alert_id: uuid::Uuid) -> Result<Vec<Acknowledgment>>;
    async fn insert_recipient(&self, recipient: AlertRecipient) -> Result<AlertRecipient>;
    /// Recipients attached to any of the given farms.
    async fn recipients_for_farms(&self, farm_ids: &[i64]) -> Result<Vec<AlertRecipient>>;

    // ── Vector similarity ───────────────────────────────────────────────

    /// Top-k rows by ascending cosine distance. Fails with `VALIDATION`
    /// when the query dimensionality does not match the column.
    async fn vector_top_k(
        &self,
        column: VectorColumn,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<VectorMatch>>;

    // ── Health ──────────────────────────────────────────────────────────

    /// Cheap round-trip probe for the health endpoint.
    async fn health_check(&self) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_distance_basics() {
        let a = [1.0_f32, 0.0];
        let b = [0.0_f32, 1.0];
        assert!((cosine_distance(&a, &a) - 0.0).abs() < 1e-9);
        assert!((cosine_distance(&a, &b) - 1.0).abs() < 1e-9);
        let neg = [-1.0_f32, 0.0];
        assert!((cosine_distance(&a, &neg) - 2.0).abs() < 1e-9);
    }

    #[test]
    fn dims_check_rejects_mismatch() {
        assert!(check_dims(VectorColumn::Terrain, &[0.0; 32]).is_ok());
        assert!(check_dims(VectorColumn::Terrain, &[0.0; 31]).is_err());
        assert!(check_dims(VectorColumn::Plume, &[0.0; 64]).is_ok());
        assert!(check_dims(VectorColumn::Weather, &[0.0; 127]).is_err());
    }

    #[test]
    fn filter_normalization_clamps() {
        let f = RequestFilter {
            page: 0,
            limit: 1_000,
            ..RequestFilter::default()
        }
        .normalized();
        assert_eq!(f.page, 1);
        assert_eq!(f.limit, crate::config::defaults::MAX_PAGE_LIMIT);
        assert_eq!(f.offset(), 0);
    }
}
