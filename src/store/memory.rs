//! In-memory [`Store`] implementation.
//!
//! Backs the test suites and `seed --dry-run`. Single-process only; the
//! whole state sits behind one `RwLock`, which is plenty for tests and
//! keeps the transition/idempotence semantics identical to Postgres.

use std::collections::HashMap;
use std::sync::RwLock;

use async_trait::async_trait;
use chrono::NaiveDate;

use super::{
    check_dims, cosine_distance, spatial, PageOf, RequestFilter, RequestPatch, RequestSort, Store,
    VectorColumn, VectorMatch,
};
use crate::error::{AppError, Result};
use crate::types::{
    epoch_micros, Acknowledgment, Alert, AlertRecipient, BurnRequest, Conflict, DeliveryRecord,
    Farm, Field, GeoPoint, RequestStatus, ResolutionStatus, ScheduleEntry, SmokePrediction,
    WeatherObservation,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    farms: HashMap<i64, Farm>,
    fields: HashMap<i64, Field>,
    requests: HashMap<i64, BurnRequest>,
    observations: Vec<WeatherObservation>,
    predictions: Vec<SmokePrediction>,
    conflicts: HashMap<(i64, i64, NaiveDate), Conflict>,
    schedule_entries: Vec<ScheduleEntry>,
    alerts: HashMap<uuid::Uuid, Alert>,
    acks: Vec<Acknowledgment>,
    recipients: Vec<AlertRecipient>,
}

impl Inner {
    fn alloc_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

/// See module docs.
#[derive(Default)]
pub struct MemStore {
    inner: RwLock<Inner>,
}

impl MemStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl Store for MemStore {
    async fn insert_farm(&self, mut farm: Farm) -> Result<Farm> {
        let mut inner = self.write();
        farm.id = inner.alloc_id();
        inner.farms.insert(farm.id, farm.clone());
        Ok(farm)
    }

    async fn get_farm(&self, id: i64) -> Result<Option<Farm>> {
        Ok(self.read().farms.get(&id).cloned())
    }

    async fn insert_field(&self, mut field: Field) -> Result<Field> {
        let mut inner = self.write();
        if !inner.farms.contains_key(&field.farm_id) {
            return Err(AppError::not_found(format!("farm {} not found", field.farm_id)));
        }
        field.id = inner.alloc_id();
        inner.fields.insert(field.id, field.clone());
        Ok(field)
    }

    async fn get_field(&self, id: i64) -> Result<Option<Field>> {
        Ok(self.read().fields.get(&id).cloned())
    }

    async fn find_field(&self, farm_id: i64, name: &str) -> Result<Option<Field>> {
        Ok(self
            .read()
            .fields
            .values()
            .find(|f| f.farm_id == farm_id && f.name == name)
            .cloned())
    }

    async fn insert_request_with_prediction(
        &self,
        mut request: BurnRequest,
        prediction: Option<SmokePrediction>,
    ) -> Result<BurnRequest> {
        let mut inner = self.write();
        if !inner.fields.contains_key(&request.field_id) {
            return Err(AppError::not_found(format!(
                "field {} not found",
                request.field_id
            )));
        }
        request.id = inner.alloc_id();
        inner.requests.insert(request.id, request.clone());
        if let Some(mut pred) = prediction {
            pred.id = inner.alloc_id();
            pred.burn_request_id = request.id;
            inner.predictions.push(pred);
        }
        Ok(request)
    }

    async fn get_burn_request(&self, id: i64) -> Result<Option<BurnRequest>> {
        Ok(self.read().requests.get(&id).cloned())
    }

    async fn list_burn_requests(&self, filter: &RequestFilter) -> Result<PageOf<BurnRequest>> {
        let filter = filter.clone().normalized();
        let inner = self.read();
        let mut rows: Vec<BurnRequest> = inner
            .requests
            .values()
            .filter(|r| filter.status.map_or(true, |s| r.status == s))
            .filter(|r| filter.farm_id.map_or(true, |f| r.farm_id == f))
            .filter(|r| filter.from.map_or(true, |d| r.burn_date >= d))
            .filter(|r| filter.to.map_or(true, |d| r.burn_date <= d))
            .cloned()
            .collect();

        rows.sort_by(|a, b| {
            let ord = match filter.sort {
                RequestSort::CreatedAt => a.created_at.cmp(&b.created_at),
                RequestSort::BurnDate => a.burn_date.cmp(&b.burn_date),
                RequestSort::PriorityScore => a.priority_score.cmp(&b.priority_score),
            }
            .then(a.id.cmp(&b.id));
            if filter.descending {
                ord.reverse()
            } else {
                ord
            }
        });

        let total = rows.len() as u64;
        let data: Vec<BurnRequest> = rows
            .into_iter()
            .skip(filter.offset() as usize)
            .take(filter.limit as usize)
            .collect();

        Ok(PageOf {
            data,
            page: filter.page,
            limit: filter.limit,
            total,
        })
    }

    async fn update_request_status(
        &self,
        id: i64,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<BurnRequest> {
        let mut inner = self.write();
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))?;

        if request.status != from {
            return Err(AppError::conflict(format!(
                "burn request {id} is {} (expected {from})",
                request.status
            )));
        }
        if !from.can_transition_to(to) {
            return Err(AppError::conflict(format!(
                "transition {from} -> {to} is not allowed"
            )));
        }
        request.status = to;
        request.updated_at = epoch_micros(chrono::Utc::now());
        Ok(request.clone())
    }

    async fn update_request_fields(&self, id: i64, patch: &RequestPatch) -> Result<BurnRequest> {
        let mut inner = self.write();
        let request = inner
            .requests
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))?;
        if request.status.is_terminal() {
            return Err(AppError::conflict(format!(
                "burn request {id} is {} and cannot be modified",
                request.status
            )));
        }
        if let Some(d) = patch.burn_date {
            request.burn_date = d;
        }
        if let Some(w) = patch.window {
            request.window = w;
        }
        if let Some(f) = patch.fuel_load_t_per_ha {
            request.fuel_load_t_per_ha = f;
        }
        if let Some(p) = patch.priority_score {
            request.priority_score = p;
        }
        request.updated_at = epoch_micros(chrono::Utc::now());
        Ok(request.clone())
    }

    async fn find_duplicate(
        &self,
        farm_id: i64,
        field_id: i64,
        burn_date: NaiveDate,
        start_minute: u32,
        since_micros: i64,
    ) -> Result<Option<i64>> {
        Ok(self
            .read()
            .requests
            .values()
            .find(|r| {
                r.farm_id == farm_id
                    && r.field_id == field_id
                    && r.burn_date == burn_date
                    && r.window.start_minute == start_minute
                    && r.created_at >= since_micros
                    && !r.status.is_terminal()
            })
            .map(|r| r.id))
    }

    async fn requests_for_date(&self, date: NaiveDate) -> Result<Vec<BurnRequest>> {
        let mut rows: Vec<BurnRequest> = self
            .read()
            .requests
            .values()
            .filter(|r| r.burn_date == date && r.status.is_optimizable())
            .cloned()
            .collect();
        rows.sort_by_key(|r| r.id);
        Ok(rows)
    }

    async fn insert_observation(&self, mut obs: WeatherObservation) -> Result<WeatherObservation> {
        let mut inner = self.write();
        obs.id = inner.alloc_id();
        inner.observations.push(obs.clone());
        Ok(obs)
    }

    async fn latest_observation_near(
        &self,
        location: GeoPoint,
        now_micros: i64,
        max_age_micros: i64,
    ) -> Result<Option<WeatherObservation>> {
        // "Near" means within the cache cell radius, ~1.5 km.
        const NEAR_METERS: f64 = 1_500.0;
        Ok(self
            .read()
            .observations
            .iter()
            .filter(|o| o.observed_at >= now_micros - max_age_micros)
            .filter(|o| spatial::distance_meters(o.location, location) <= NEAR_METERS)
            .max_by_key(|o| o.observed_at)
            .cloned())
    }

    async fn insert_prediction(&self, mut pred: SmokePrediction) -> Result<SmokePrediction> {
        let mut inner = self.write();
        if !inner.requests.contains_key(&pred.burn_request_id) {
            return Err(AppError::not_found(format!(
                "burn request {} not found",
                pred.burn_request_id
            )));
        }
        pred.id = inner.alloc_id();
        inner.predictions.push(pred.clone());
        Ok(pred)
    }

    async fn latest_prediction_for(
        &self,
        burn_request_id: i64,
    ) -> Result<Option<SmokePrediction>> {
        Ok(self
            .read()
            .predictions
            .iter()
            .filter(|p| p.burn_request_id == burn_request_id)
            .max_by_key(|p| (p.predicted_at, p.id))
            .cloned())
    }

    async fn invalidate_predictions(&self, burn_request_ids: &[i64]) -> Result<u64> {
        let mut inner = self.write();
        let before = inner.predictions.len();
        inner
            .predictions
            .retain(|p| !burn_request_ids.contains(&p.burn_request_id));
        Ok((before - inner.predictions.len()) as u64)
    }

    async fn upsert_conflict(&self, mut conflict: Conflict) -> Result<Conflict> {
        let key = conflict.pair_key();
        // Normalize the stored pair ordering to the key.
        conflict.request_a = key.0;
        conflict.request_b = key.1;
        let mut inner = self.write();
        if let Some(existing) = inner.conflicts.get(&key) {
            conflict.id = existing.id;
        } else {
            conflict.id = inner.alloc_id();
        }
        inner.conflicts.insert(key, conflict.clone());
        Ok(conflict)
    }

    async fn conflicts_for_date(&self, date: NaiveDate) -> Result<Vec<Conflict>> {
        let mut rows: Vec<Conflict> = self
            .read()
            .conflicts
            .values()
            .filter(|c| c.date == date)
            .cloned()
            .collect();
        rows.sort_by_key(|c| (c.request_a, c.request_b));
        Ok(rows)
    }

    async fn set_conflict_resolution(&self, id: i64, status: ResolutionStatus) -> Result<()> {
        let mut inner = self.write();
        for conflict in inner.conflicts.values_mut() {
            if conflict.id == id {
                conflict.resolution_status = status;
                return Ok(());
            }
        }
        Err(AppError::not_found(format!("conflict {id} not found")))
    }

    async fn replace_schedule_entries(
        &self,
        entries: Vec<ScheduleEntry>,
    ) -> Result<Vec<ScheduleEntry>> {
        let mut inner = self.write();
        let affected: Vec<i64> = entries.iter().map(|e| e.burn_request_id).collect();
        inner
            .schedule_entries
            .retain(|e| !affected.contains(&e.burn_request_id));
        let mut stored = Vec::with_capacity(entries.len());
        for mut entry in entries {
            entry.id = inner.alloc_id();
            inner.schedule_entries.push(entry.clone());
            stored.push(entry);
        }
        Ok(stored)
    }

    async fn active_entry_for(&self, burn_request_id: i64) -> Result<Option<ScheduleEntry>> {
        Ok(self
            .read()
            .schedule_entries
            .iter()
            .filter(|e| e.burn_request_id == burn_request_id)
            .max_by_key(|e| e.created_at)
            .cloned())
    }

    async fn insert_alert(&self, alert: Alert) -> Result<()> {
        self.write().alerts.insert(alert.id, alert);
        Ok(())
    }

    async fn get_alert(&self, id: uuid::Uuid) -> Result<Option<Alert>> {
        Ok(self.read().alerts.get(&id).cloned())
    }

    async fn update_alert_deliveries(
        &self,
        id: uuid::Uuid,
        deliveries: &[DeliveryRecord],
    ) -> Result<()> {
        let mut inner = self.write();
        let alert = inner
            .alerts
            .get_mut(&id)
            .ok_or_else(|| AppError::not_found(format!("alert {id} not found")))?;
        alert.deliveries = deliveries.to_vec();
        Ok(())
    }

    async fn insert_ack(&self, ack: Acknowledgment) -> Result<()> {
        let mut inner = self.write();
        if !inner.alerts.contains_key(&ack.alert_id) {
            return Err(AppError::not_found(format!("alert {} not found", ack.alert_id)));
        }
        inner.acks.push(ack);
        Ok(())
    }

    async fn acks_for_alert(&self, alert_id: uuid::Uuid) -> Result<Vec<Acknowledgment>> {
        Ok(self
            .read()
            .acks
            .iter()
            .filter(|a| a.alert_id == alert_id)
            .cloned()
            .collect())
    }

    async fn insert_recipient(&self, mut recipient: AlertRecipient) -> Result<AlertRecipient> {
        let mut inner = self.write();
        recipient.id = inner.alloc_id();
        inner.recipients.push(recipient.clone());
        Ok(recipient)
    }

    async fn recipients_for_farms(&self, farm_ids: &[i64]) -> Result<Vec<AlertRecipient>> {
        Ok(self
            .read()
            .recipients
            .iter()
            .filter(|r| r.farm_id.map_or(false, |f| farm_ids.contains(&f)))
            .cloned()
            .collect())
    }

    async fn vector_top_k(
        &self,
        column: VectorColumn,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<VectorMatch>> {
        check_dims(column, query)?;
        let inner = self.read();
        let mut scored: Vec<VectorMatch> = match column {
            VectorColumn::Terrain => inner
                .requests
                .values()
                .filter(|r| r.terrain_vector.len() == column.dims())
                .map(|r| VectorMatch {
                    id: r.id,
                    distance: cosine_distance(query, &r.terrain_vector),
                })
                .collect(),
            VectorColumn::Plume => inner
                .predictions
                .iter()
                .filter(|p| p.plume_vector.len() == column.dims())
                .map(|p| VectorMatch {
                    id: p.id,
                    distance: cosine_distance(query, &p.plume_vector),
                })
                .collect(),
            VectorColumn::Weather => inner
                .observations
                .iter()
                .filter(|o| o.weather_vector.len() == column.dims())
                .map(|o| VectorMatch {
                    id: o.id,
                    distance: cosine_distance(query, &o.weather_vector),
                })
                .collect(),
        };
        scored.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        scored.truncate(k);
        Ok(scored)
    }

    async fn health_check(&self) -> Result<()> {
        // A lock acquisition is the whole round-trip here.
        let _guard = self.read();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CropType, PolygonRing, TimeWindow};

    fn sample_farm() -> Farm {
        Farm {
            id: 0,
            name: "Johnson Ranch".to_string(),
            owner_name: "Dale Johnson".to_string(),
            phone: "+15551230001".to_string(),
            email: "dale@example.com".to_string(),
            location: GeoPoint::new(38.58, -121.49),
            permit_number: Some("CA-2026-0042".to_string()),
            total_area_hectares: 320.0,
            created_at: 0,
        }
    }

    fn sample_field(farm_id: i64) -> Field {
        Field {
            id: 0,
            farm_id,
            name: "North 40".to_string(),
            boundary: spatial::square_around(GeoPoint::new(38.58, -121.49), 700.0),
            area_hectares: 49.0,
            crop_type: CropType::Rice,
            last_burn_date: None,
        }
    }

    fn sample_request(farm_id: i64, field_id: i64, date: NaiveDate) -> BurnRequest {
        BurnRequest {
            id: 0,
            field_id,
            farm_id,
            burn_date: date,
            window: TimeWindow::from_hours(9, 13),
            fuel_load_t_per_ha: 15.0,
            area_hectares: 49.0,
            crop_type: CropType::Rice,
            centroid: GeoPoint::new(38.58, -121.49),
            status: RequestStatus::Pending,
            priority_score: 7,
            terrain_vector: vec![0.0; crate::types::TERRAIN_DIMS],
            created_at: 1_000,
            updated_at: 1_000,
        }
    }

    #[tokio::test]
    async fn request_lifecycle_and_transition_guard() {
        let store = MemStore::new();
        let farm = store.insert_farm(sample_farm()).await.unwrap();
        let field = store.insert_field(sample_field(farm.id)).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 8, 4).unwrap();
        let req = store
            .insert_request_with_prediction(sample_request(farm.id, field.id, date), None)
            .await
            .unwrap();
        assert!(req.id > 0);

        // Legal: pending -> scheduled
        let scheduled = store
            .update_request_status(req.id, RequestStatus::Pending, RequestStatus::Scheduled)
            .await
            .unwrap();
        assert_eq!(scheduled.status, RequestStatus::Scheduled);

        // Stale CAS: still thinks it's pending
        let err = store
            .update_request_status(req.id, RequestStatus::Pending, RequestStatus::Cancelled)
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Conflict);

        // Illegal: scheduled -> completed skips active
        let err = store
            .update_request_status(req.id, RequestStatus::Scheduled, RequestStatus::Completed)
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Conflict);
    }

    #[tokio::test]
    async fn conflict_upsert_is_idempotent_on_pair_key() {
        let store = MemStore::new();
        let date = NaiveDate::from_ymd_opt(2026, 8, 4).unwrap();
        let conflict = Conflict {
            id: 0,
            request_a: 9,
            request_b: 4,
            date,
            overlap: PolygonRing::default(),
            overlap_area_km2: 0.5,
            max_combined_pm25: 60.0,
            severity: crate::types::ConflictSeverity::High,
            resolution_status: ResolutionStatus::Pending,
        };
        let first = store.upsert_conflict(conflict.clone()).await.unwrap();
        // Stored normalized: a < b
        assert_eq!((first.request_a, first.request_b), (4, 9));

        let second = store.upsert_conflict(conflict).await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(store.conflicts_for_date(date).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn vector_top_k_orders_by_distance_and_checks_dims() {
        let store = MemStore::new();
        let farm = store.insert_farm(sample_farm()).await.unwrap();
        let field = store.insert_field(sample_field(farm.id)).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 8, 4).unwrap();

        let mut near = sample_request(farm.id, field.id, date);
        near.terrain_vector = {
            let mut v = vec![0.0_f32; 32];
            v[0] = 1.0;
            v
        };
        let near = store.insert_request_with_prediction(near, None).await.unwrap();

        let mut far = sample_request(farm.id, field.id, date);
        far.terrain_vector = {
            let mut v = vec![0.0_f32; 32];
            v[1] = 1.0;
            v
        };
        store.insert_request_with_prediction(far, None).await.unwrap();

        let mut query = vec![0.0_f32; 32];
        query[0] = 1.0;
        let hits = store
            .vector_top_k(VectorColumn::Terrain, &query, 5)
            .await
            .unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].id, near.id);
        assert!(hits[0].distance < hits[1].distance);

        let err = store
            .vector_top_k(VectorColumn::Terrain, &[0.0; 16], 5)
            .await
            .unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Validation);
    }

    #[tokio::test]
    async fn duplicate_probe_matches_window_start() {
        let store = MemStore::new();
        let farm = store.insert_farm(sample_farm()).await.unwrap();
        let field = store.insert_field(sample_field(farm.id)).await.unwrap();
        let date = NaiveDate::from_ymd_opt(2026, 8, 4).unwrap();
        let req = store
            .insert_request_with_prediction(sample_request(farm.id, field.id, date), None)
            .await
            .unwrap();

        let hit = store
            .find_duplicate(farm.id, field.id, date, 9 * 60, 0)
            .await
            .unwrap();
        assert_eq!(hit, Some(req.id));

        // Different start minute is not a duplicate
        let miss = store
            .find_duplicate(farm.id, field.id, date, 10 * 60, 0)
            .await
            .unwrap();
        assert_eq!(miss, None);

        // Outside the window (created before since_micros)
        let miss = store
            .find_duplicate(farm.id, field.id, date, 9 * 60, 2_000)
            .await
            .unwrap();
        assert_eq!(miss, None);
    }
}
