//! PostgreSQL [`Store`] implementation.
//!
//! Plain `sqlx::query` / `query_as` with bind parameters throughout.
//! Vector columns are pgvector `vector(N)` types queried with the `<=>`
//! cosine-distance operator (HNSW-indexed, see migrations). Polygon rings
//! are stored as JSONB in WGS84; geometric predicates run in-process
//! (`store::spatial`), so no PostGIS extension is required.

use async_trait::async_trait;
use chrono::NaiveDate;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::info;

use super::{
    check_dims, PageOf, RequestFilter, RequestPatch, RequestSort, Store, VectorColumn, VectorMatch,
};
use crate::error::{AppError, Result};
use crate::types::{
    epoch_micros, Acknowledgment, Alert, AlertRecipient, AlertSeverity, AlertType, BurnRequest,
    Channel, Conflict, ConflictSeverity, CropType, DeliveryRecord, DeliveryStatus, Farm, Field,
    GeoPoint, PolygonRing, RequestStatus, ResolutionStatus, ScheduleEntry, ScheduleStatus,
    SmokePrediction, StabilityClass, TimeWindow, WeatherObservation,
};

/// Burn-request SELECT column list. Keep in sync with `request_from_row`.
const REQUEST_COLS: &str = "\
    id, field_id, farm_id, burn_date, window_start_minute, window_end_minute, \
    fuel_load_t_per_ha, area_hectares, crop_type, centroid_lat, centroid_lon, \
    status, priority_score, terrain_vector, created_at, updated_at";

/// Weather observation SELECT column list. Keep in sync with `observation_from_row`.
const OBSERVATION_COLS: &str = "\
    id, lat, lon, observed_at, temperature_c, humidity_pct, wind_speed_ms, \
    wind_direction_deg, pressure_hpa, visibility_km, cloud_cover_pct, \
    precipitation_mm, dew_point_c, stability, mixing_height_m, is_forecast, \
    weather_vector";

/// See module docs.
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    /// Connect and build the pool.
    pub async fn connect(
        database_url: &str,
        max_connections: u32,
        acquire_timeout: Duration,
    ) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(acquire_timeout)
            .connect(database_url)
            .await?;
        info!("Connected to PostgreSQL");
        Ok(Self { pool })
    }

    /// Run database migrations from the migrations/ directory.
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations...");
        sqlx::migrate!("./migrations")
            .run(&self.pool)
            .await
            .map_err(|e| AppError::storage(e.to_string()))?;
        info!("Migrations complete");
        Ok(())
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

fn polygon_to_json(ring: &PolygonRing) -> serde_json::Value {
    serde_json::to_value(ring).unwrap_or(serde_json::Value::Null)
}

fn polygon_from_json(value: serde_json::Value) -> PolygonRing {
    serde_json::from_value(value).unwrap_or_default()
}

fn vec_to_pg(v: &[f32]) -> pgvector::Vector {
    pgvector::Vector::from(v.to_vec())
}

fn request_from_row(row: &sqlx::postgres::PgRow) -> Result<BurnRequest> {
    let crop: String = row.try_get("crop_type")?;
    let status: String = row.try_get("status")?;
    let terrain: pgvector::Vector = row.try_get("terrain_vector")?;
    Ok(BurnRequest {
        id: row.try_get("id")?,
        field_id: row.try_get("field_id")?,
        farm_id: row.try_get("farm_id")?,
        burn_date: row.try_get("burn_date")?,
        window: TimeWindow {
            start_minute: row.try_get::<i32, _>("window_start_minute")? as u32,
            end_minute: row.try_get::<i32, _>("window_end_minute")? as u32,
        },
        fuel_load_t_per_ha: row.try_get("fuel_load_t_per_ha")?,
        area_hectares: row.try_get("area_hectares")?,
        crop_type: CropType::parse(&crop)
            .ok_or_else(|| AppError::storage(format!("unknown crop_type '{crop}' in row")))?,
        centroid: GeoPoint::new(row.try_get("centroid_lat")?, row.try_get("centroid_lon")?),
        status: RequestStatus::parse(&status)
            .ok_or_else(|| AppError::storage(format!("unknown status '{status}' in row")))?,
        priority_score: row.try_get::<i16, _>("priority_score")? as u8,
        terrain_vector: terrain.to_vec(),
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn observation_from_row(row: &sqlx::postgres::PgRow) -> Result<WeatherObservation> {
    let stability: String = row.try_get("stability")?;
    let vector: pgvector::Vector = row.try_get("weather_vector")?;
    Ok(WeatherObservation {
        id: row.try_get("id")?,
        location: GeoPoint::new(row.try_get("lat")?, row.try_get("lon")?),
        observed_at: row.try_get("observed_at")?,
        temperature_c: row.try_get("temperature_c")?,
        humidity_pct: row.try_get("humidity_pct")?,
        wind_speed_ms: row.try_get("wind_speed_ms")?,
        wind_direction_deg: row.try_get("wind_direction_deg")?,
        pressure_hpa: row.try_get("pressure_hpa")?,
        visibility_km: row.try_get("visibility_km")?,
        cloud_cover_pct: row.try_get("cloud_cover_pct")?,
        precipitation_mm: row.try_get("precipitation_mm")?,
        dew_point_c: row.try_get("dew_point_c")?,
        stability: StabilityClass::parse(&stability)
            .ok_or_else(|| AppError::storage(format!("unknown stability '{stability}'")))?,
        mixing_height_m: row.try_get("mixing_height_m")?,
        is_forecast: row.try_get("is_forecast")?,
        weather_vector: vector.to_vec(),
    })
}

fn prediction_from_row(row: &sqlx::postgres::PgRow) -> Result<SmokePrediction> {
    let plume: serde_json::Value = row.try_get("plume")?;
    let vector: pgvector::Vector = row.try_get("plume_vector")?;
    Ok(SmokePrediction {
        id: row.try_get("id")?,
        burn_request_id: row.try_get("burn_request_id")?,
        predicted_at: row.try_get("predicted_at")?,
        plume: polygon_from_json(plume),
        max_pm25: row.try_get("max_pm25")?,
        affected_area_km2: row.try_get("affected_area_km2")?,
        dispersion_radius_km: row.try_get("dispersion_radius_km")?,
        confidence: row.try_get("confidence")?,
        plume_vector: vector.to_vec(),
    })
}

fn conflict_from_row(row: &sqlx::postgres::PgRow) -> Result<Conflict> {
    let severity: String = row.try_get("severity")?;
    let resolution: String = row.try_get("resolution_status")?;
    let overlap: serde_json::Value = row.try_get("overlap")?;
    Ok(Conflict {
        id: row.try_get("id")?,
        request_a: row.try_get("request_a")?,
        request_b: row.try_get("request_b")?,
        date: row.try_get("date")?,
        overlap: polygon_from_json(overlap),
        overlap_area_km2: row.try_get("overlap_area_km2")?,
        max_combined_pm25: row.try_get("max_combined_pm25")?,
        severity: ConflictSeverity::parse(&severity)
            .ok_or_else(|| AppError::storage(format!("unknown severity '{severity}'")))?,
        resolution_status: ResolutionStatus::parse(&resolution)
            .ok_or_else(|| AppError::storage(format!("unknown resolution '{resolution}'")))?,
    })
}

async fn insert_prediction_on<'e, E>(executor: E, pred: &SmokePrediction) -> Result<i64>
where
    E: sqlx::PgExecutor<'e>,
{
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO smoke_predictions \
         (burn_request_id, predicted_at, plume, max_pm25, affected_area_km2, \
          dispersion_radius_km, confidence, plume_vector) \
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8) RETURNING id",
    )
    .bind(pred.burn_request_id)
    .bind(pred.predicted_at)
    .bind(polygon_to_json(&pred.plume))
    .bind(pred.max_pm25)
    .bind(pred.affected_area_km2)
    .bind(pred.dispersion_radius_km)
    .bind(pred.confidence)
    .bind(vec_to_pg(&pred.plume_vector))
    .fetch_one(executor)
    .await?;
    Ok(id)
}

#[async_trait]
impl Store for PgStore {
    async fn insert_farm(&self, mut farm: Farm) -> Result<Farm> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO farms \
             (name, owner_name, phone, email, lat, lon, permit_number, \
              total_area_hectares, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(&farm.name)
        .bind(&farm.owner_name)
        .bind(&farm.phone)
        .bind(&farm.email)
        .bind(farm.location.lat)
        .bind(farm.location.lon)
        .bind(&farm.permit_number)
        .bind(farm.total_area_hectares)
        .bind(farm.created_at)
        .fetch_one(&self.pool)
        .await?;
        farm.id = id;
        Ok(farm)
    }

    async fn get_farm(&self, id: i64) -> Result<Option<Farm>> {
        let row = sqlx::query(
            "SELECT id, name, owner_name, phone, email, lat, lon, permit_number, \
             total_area_hectares, created_at FROM farms WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| {
            Ok(Farm {
                id: r.try_get("id")?,
                name: r.try_get("name")?,
                owner_name: r.try_get("owner_name")?,
                phone: r.try_get("phone")?,
                email: r.try_get("email")?,
                location: GeoPoint::new(r.try_get("lat")?, r.try_get("lon")?),
                permit_number: r.try_get("permit_number")?,
                total_area_hectares: r.try_get("total_area_hectares")?,
                created_at: r.try_get("created_at")?,
            })
        })
        .transpose()
    }

    async fn insert_field(&self, mut field: Field) -> Result<Field> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO fields \
             (farm_id, name, boundary, area_hectares, crop_type, last_burn_date) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(field.farm_id)
        .bind(&field.name)
        .bind(polygon_to_json(&field.boundary))
        .bind(field.area_hectares)
        .bind(field.crop_type.as_str())
        .bind(field.last_burn_date)
        .fetch_one(&self.pool)
        .await?;
        field.id = id;
        Ok(field)
    }

    async fn get_field(&self, id: i64) -> Result<Option<Field>> {
        let row = sqlx::query(
            "SELECT id, farm_id, name, boundary, area_hectares, crop_type, \
             last_burn_date FROM fields WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| field_from_row(&r)).transpose()
    }

    async fn find_field(&self, farm_id: i64, name: &str) -> Result<Option<Field>> {
        let row = sqlx::query(
            "SELECT id, farm_id, name, boundary, area_hectares, crop_type, \
             last_burn_date FROM fields WHERE farm_id = $1 AND name = $2",
        )
        .bind(farm_id)
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| field_from_row(&r)).transpose()
    }

    async fn insert_request_with_prediction(
        &self,
        mut request: BurnRequest,
        prediction: Option<SmokePrediction>,
    ) -> Result<BurnRequest> {
        let mut tx = self.pool.begin().await?;

        let id: i64 = sqlx::query_scalar(
            "INSERT INTO burn_requests \
             (field_id, farm_id, burn_date, window_start_minute, window_end_minute, \
              fuel_load_t_per_ha, area_hectares, crop_type, centroid_lat, centroid_lon, \
              status, priority_score, terrain_vector, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15) \
             RETURNING id",
        )
        .bind(request.field_id)
        .bind(request.farm_id)
        .bind(request.burn_date)
        .bind(request.window.start_minute as i32)
        .bind(request.window.end_minute as i32)
        .bind(request.fuel_load_t_per_ha)
        .bind(request.area_hectares)
        .bind(request.crop_type.as_str())
        .bind(request.centroid.lat)
        .bind(request.centroid.lon)
        .bind(request.status.as_str())
        .bind(i16::from(request.priority_score))
        .bind(vec_to_pg(&request.terrain_vector))
        .bind(request.created_at)
        .bind(request.updated_at)
        .fetch_one(&mut *tx)
        .await?;

        if let Some(mut pred) = prediction {
            pred.burn_request_id = id;
            insert_prediction_on(&mut *tx, &pred).await?;
        }

        tx.commit().await?;
        request.id = id;
        Ok(request)
    }

    async fn get_burn_request(&self, id: i64) -> Result<Option<BurnRequest>> {
        let row = sqlx::query(&format!(
            "SELECT {REQUEST_COLS} FROM burn_requests WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| request_from_row(&r)).transpose()
    }

    async fn list_burn_requests(&self, filter: &RequestFilter) -> Result<PageOf<BurnRequest>> {
        let filter = filter.clone().normalized();

        // Sort column comes from a closed enum, not user input.
        let sort_col = match filter.sort {
            RequestSort::CreatedAt => "created_at",
            RequestSort::BurnDate => "burn_date",
            RequestSort::PriorityScore => "priority_score",
        };
        let order = if filter.descending { "DESC" } else { "ASC" };

        let where_clause = "($1::text IS NULL OR status = $1) \
             AND ($2::bigint IS NULL OR farm_id = $2) \
             AND ($3::date IS NULL OR burn_date >= $3) \
             AND ($4::date IS NULL OR burn_date <= $4)";

        let total: i64 = sqlx::query_scalar(&format!(
            "SELECT COUNT(*) FROM burn_requests WHERE {where_clause}"
        ))
        .bind(filter.status.map(RequestStatus::as_str))
        .bind(filter.farm_id)
        .bind(filter.from)
        .bind(filter.to)
        .fetch_one(&self.pool)
        .await?;

        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLS} FROM burn_requests WHERE {where_clause} \
             ORDER BY {sort_col} {order}, id {order} LIMIT $5 OFFSET $6"
        ))
        .bind(filter.status.map(RequestStatus::as_str))
        .bind(filter.farm_id)
        .bind(filter.from)
        .bind(filter.to)
        .bind(i64::from(filter.limit))
        .bind(filter.offset() as i64)
        .fetch_all(&self.pool)
        .await?;

        let data = rows
            .iter()
            .map(request_from_row)
            .collect::<Result<Vec<_>>>()?;

        Ok(PageOf {
            data,
            page: filter.page,
            limit: filter.limit,
            total: total as u64,
        })
    }

    async fn update_request_status(
        &self,
        id: i64,
        from: RequestStatus,
        to: RequestStatus,
    ) -> Result<BurnRequest> {
        if !from.can_transition_to(to) {
            return Err(AppError::conflict(format!(
                "transition {from} -> {to} is not allowed"
            )));
        }

        let mut tx = self.pool.begin().await?;
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM burn_requests WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        let current = current
            .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))?;
        if current != from.as_str() {
            return Err(AppError::conflict(format!(
                "burn request {id} is {current} (expected {from})"
            )));
        }

        sqlx::query("UPDATE burn_requests SET status = $1, updated_at = $2 WHERE id = $3")
            .bind(to.as_str())
            .bind(epoch_micros(chrono::Utc::now()))
            .bind(id)
            .execute(&mut *tx)
            .await?;
        tx.commit().await?;

        self.get_burn_request(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))
    }

    async fn update_request_fields(&self, id: i64, patch: &RequestPatch) -> Result<BurnRequest> {
        let mut tx = self.pool.begin().await?;
        let current: Option<String> =
            sqlx::query_scalar("SELECT status FROM burn_requests WHERE id = $1 FOR UPDATE")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;
        let current = current
            .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))?;
        if RequestStatus::parse(&current).is_some_and(RequestStatus::is_terminal) {
            return Err(AppError::conflict(format!(
                "burn request {id} is {current} and cannot be modified"
            )));
        }

        sqlx::query(
            "UPDATE burn_requests SET \
             burn_date = COALESCE($1, burn_date), \
             window_start_minute = COALESCE($2, window_start_minute), \
             window_end_minute = COALESCE($3, window_end_minute), \
             fuel_load_t_per_ha = COALESCE($4, fuel_load_t_per_ha), \
             priority_score = COALESCE($5, priority_score), \
             updated_at = $6 \
             WHERE id = $7",
        )
        .bind(patch.burn_date)
        .bind(patch.window.map(|w| w.start_minute as i32))
        .bind(patch.window.map(|w| w.end_minute as i32))
        .bind(patch.fuel_load_t_per_ha)
        .bind(patch.priority_score.map(i16::from))
        .bind(epoch_micros(chrono::Utc::now()))
        .bind(id)
        .execute(&mut *tx)
        .await?;
        tx.commit().await?;

        self.get_burn_request(id)
            .await?
            .ok_or_else(|| AppError::not_found(format!("burn request {id} not found")))
    }

    async fn find_duplicate(
        &self,
        farm_id: i64,
        field_id: i64,
        burn_date: NaiveDate,
        start_minute: u32,
        since_micros: i64,
    ) -> Result<Option<i64>> {
        let id: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM burn_requests \
             WHERE farm_id = $1 AND field_id = $2 AND burn_date = $3 \
               AND window_start_minute = $4 AND created_at >= $5 \
               AND status NOT IN ('completed', 'cancelled', 'rejected') \
             LIMIT 1",
        )
        .bind(farm_id)
        .bind(field_id)
        .bind(burn_date)
        .bind(start_minute as i32)
        .bind(since_micros)
        .fetch_optional(&self.pool)
        .await?;
        Ok(id)
    }

    async fn requests_for_date(&self, date: NaiveDate) -> Result<Vec<BurnRequest>> {
        let rows = sqlx::query(&format!(
            "SELECT {REQUEST_COLS} FROM burn_requests \
             WHERE burn_date = $1 AND status IN ('pending', 'scheduled') \
             ORDER BY id"
        ))
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(request_from_row).collect()
    }

    async fn insert_observation(&self, mut obs: WeatherObservation) -> Result<WeatherObservation> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO weather_observations \
             (lat, lon, observed_at, temperature_c, humidity_pct, wind_speed_ms, \
              wind_direction_deg, pressure_hpa, visibility_km, cloud_cover_pct, \
              precipitation_mm, dew_point_c, stability, mixing_height_m, is_forecast, \
              weather_vector) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15, $16) \
             RETURNING id",
        )
        .bind(obs.location.lat)
        .bind(obs.location.lon)
        .bind(obs.observed_at)
        .bind(obs.temperature_c)
        .bind(obs.humidity_pct)
        .bind(obs.wind_speed_ms)
        .bind(obs.wind_direction_deg)
        .bind(obs.pressure_hpa)
        .bind(obs.visibility_km)
        .bind(obs.cloud_cover_pct)
        .bind(obs.precipitation_mm)
        .bind(obs.dew_point_c)
        .bind(obs.stability.as_str())
        .bind(obs.mixing_height_m)
        .bind(obs.is_forecast)
        .bind(vec_to_pg(&obs.weather_vector))
        .fetch_one(&self.pool)
        .await?;
        obs.id = id;
        Ok(obs)
    }

    async fn latest_observation_near(
        &self,
        location: GeoPoint,
        now_micros: i64,
        max_age_micros: i64,
    ) -> Result<Option<WeatherObservation>> {
        // ~0.014° lat ≈ 1.5 km; longitude widened for mid-latitudes.
        let row = sqlx::query(&format!(
            "SELECT {OBSERVATION_COLS} FROM weather_observations \
             WHERE abs(lat - $1) < 0.014 AND abs(lon - $2) < 0.020 \
               AND observed_at >= $3 \
             ORDER BY observed_at DESC LIMIT 1"
        ))
        .bind(location.lat)
        .bind(location.lon)
        .bind(now_micros - max_age_micros)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| observation_from_row(&r)).transpose()
    }

    async fn insert_prediction(&self, mut pred: SmokePrediction) -> Result<SmokePrediction> {
        pred.id = insert_prediction_on(&self.pool, &pred).await?;
        Ok(pred)
    }

    async fn latest_prediction_for(
        &self,
        burn_request_id: i64,
    ) -> Result<Option<SmokePrediction>> {
        let row = sqlx::query(
            "SELECT id, burn_request_id, predicted_at, plume, max_pm25, \
             affected_area_km2, dispersion_radius_km, confidence, plume_vector \
             FROM smoke_predictions WHERE burn_request_id = $1 \
             ORDER BY predicted_at DESC, id DESC LIMIT 1",
        )
        .bind(burn_request_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| prediction_from_row(&r)).transpose()
    }

    async fn invalidate_predictions(&self, burn_request_ids: &[i64]) -> Result<u64> {
        let result =
            sqlx::query("DELETE FROM smoke_predictions WHERE burn_request_id = ANY($1)")
                .bind(burn_request_ids)
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected())
    }

    async fn upsert_conflict(&self, mut conflict: Conflict) -> Result<Conflict> {
        let (a, b, date) = conflict.pair_key();
        conflict.request_a = a;
        conflict.request_b = b;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO burn_conflicts \
             (request_a, request_b, date, overlap, overlap_area_km2, \
              max_combined_pm25, severity, resolution_status) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8) \
             ON CONFLICT (request_a, request_b, date) DO UPDATE SET \
               overlap = EXCLUDED.overlap, \
               overlap_area_km2 = EXCLUDED.overlap_area_km2, \
               max_combined_pm25 = EXCLUDED.max_combined_pm25, \
               severity = EXCLUDED.severity \
             RETURNING id",
        )
        .bind(a)
        .bind(b)
        .bind(date)
        .bind(polygon_to_json(&conflict.overlap))
        .bind(conflict.overlap_area_km2)
        .bind(conflict.max_combined_pm25)
        .bind(conflict.severity.as_str())
        .bind(conflict.resolution_status.as_str())
        .fetch_one(&self.pool)
        .await?;
        conflict.id = id;
        Ok(conflict)
    }

    async fn conflicts_for_date(&self, date: NaiveDate) -> Result<Vec<Conflict>> {
        let rows = sqlx::query(
            "SELECT id, request_a, request_b, date, overlap, overlap_area_km2, \
             max_combined_pm25, severity, resolution_status \
             FROM burn_conflicts WHERE date = $1 ORDER BY request_a, request_b",
        )
        .bind(date)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(conflict_from_row).collect()
    }

    async fn set_conflict_resolution(&self, id: i64, status: ResolutionStatus) -> Result<()> {
        let result = sqlx::query("UPDATE burn_conflicts SET resolution_status = $1 WHERE id = $2")
            .bind(status.as_str())
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(AppError::not_found(format!("conflict {id} not found")));
        }
        Ok(())
    }

    async fn replace_schedule_entries(
        &self,
        entries: Vec<ScheduleEntry>,
    ) -> Result<Vec<ScheduleEntry>> {
        let mut tx = self.pool.begin().await?;
        let affected: Vec<i64> = entries.iter().map(|e| e.burn_request_id).collect();
        sqlx::query("DELETE FROM schedule_entries WHERE burn_request_id = ANY($1)")
            .bind(&affected)
            .execute(&mut *tx)
            .await?;

        let mut stored = Vec::with_capacity(entries.len());
        for mut entry in entries {
            let id: i64 = sqlx::query_scalar(
                "INSERT INTO schedule_entries \
                 (burn_request_id, run_id, status, assigned_date, \
                  assigned_start_minute, assigned_end_minute, cost, reason, created_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
            )
            .bind(entry.burn_request_id)
            .bind(entry.run_id)
            .bind(entry.status.as_str())
            .bind(entry.assigned_date)
            .bind(entry.assigned_window.map(|w| w.start_minute as i32))
            .bind(entry.assigned_window.map(|w| w.end_minute as i32))
            .bind(entry.cost)
            .bind(&entry.reason)
            .bind(entry.created_at)
            .fetch_one(&mut *tx)
            .await?;
            entry.id = id;
            stored.push(entry);
        }
        tx.commit().await?;
        Ok(stored)
    }

    async fn active_entry_for(&self, burn_request_id: i64) -> Result<Option<ScheduleEntry>> {
        let row = sqlx::query(
            "SELECT id, burn_request_id, run_id, status, assigned_date, \
             assigned_start_minute, assigned_end_minute, cost, reason, created_at \
             FROM schedule_entries WHERE burn_request_id = $1 \
             ORDER BY created_at DESC LIMIT 1",
        )
        .bind(burn_request_id)
        .fetch_optional(&self.pool)
        .await?;
        row.map(|r| schedule_entry_from_row(&r)).transpose()
    }

    async fn insert_alert(&self, alert: Alert) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            "INSERT INTO alerts \
             (id, alert_type, severity, burn_request_id, message, requires_ack, created_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7)",
        )
        .bind(alert.id)
        .bind(alert.alert_type.as_str())
        .bind(alert.severity.as_str())
        .bind(alert.burn_request_id)
        .bind(&alert.message)
        .bind(alert.requires_ack)
        .bind(alert.created_at)
        .execute(&mut *tx)
        .await?;

        for d in &alert.deliveries {
            insert_delivery_on(&mut tx, alert.id, d).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get_alert(&self, id: uuid::Uuid) -> Result<Option<Alert>> {
        let row = sqlx::query(
            "SELECT id, alert_type, severity, burn_request_id, message, requires_ack, \
             created_at FROM alerts WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        let Some(row) = row else { return Ok(None) };

        let delivery_rows = sqlx::query(
            "SELECT recipient_id, status, delivered_via, attempts, last_error, completed_at \
             FROM alert_recipients WHERE alert_id = $1 ORDER BY recipient_id",
        )
        .bind(id)
        .fetch_all(&self.pool)
        .await?;

        let deliveries = delivery_rows
            .iter()
            .map(delivery_from_row)
            .collect::<Result<Vec<_>>>()?;

        let alert_type: String = row.try_get("alert_type")?;
        let severity: String = row.try_get("severity")?;
        Ok(Some(Alert {
            id: row.try_get("id")?,
            alert_type: AlertType::parse(&alert_type)
                .ok_or_else(|| AppError::storage(format!("unknown alert type '{alert_type}'")))?,
            severity: parse_alert_severity(&severity)?,
            burn_request_id: row.try_get("burn_request_id")?,
            message: row.try_get("message")?,
            deliveries,
            requires_ack: row.try_get("requires_ack")?,
            created_at: row.try_get("created_at")?,
        }))
    }

    async fn update_alert_deliveries(
        &self,
        id: uuid::Uuid,
        deliveries: &[DeliveryRecord],
    ) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM alert_recipients WHERE alert_id = $1")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        for d in deliveries {
            insert_delivery_on(&mut tx, id, d).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn insert_ack(&self, ack: Acknowledgment) -> Result<()> {
        sqlx::query(
            "INSERT INTO acknowledgments (alert_id, recipient_id, response, acknowledged_at) \
             VALUES ($1, $2, $3, $4)",
        )
        .bind(ack.alert_id)
        .bind(ack.recipient_id)
        .bind(&ack.response)
        .bind(ack.acknowledged_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn acks_for_alert(&self, alert_id: uuid::Uuid) -> Result<Vec<Acknowledgment>> {
        let rows = sqlx::query(
            "SELECT alert_id, recipient_id, response, acknowledged_at \
             FROM acknowledgments WHERE alert_id = $1 ORDER BY acknowledged_at",
        )
        .bind(alert_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(Acknowledgment {
                    alert_id: r.try_get("alert_id")?,
                    recipient_id: r.try_get("recipient_id")?,
                    response: r.try_get("response")?,
                    acknowledged_at: r.try_get("acknowledged_at")?,
                })
            })
            .collect()
    }

    async fn insert_recipient(&self, mut recipient: AlertRecipient) -> Result<AlertRecipient> {
        let channels = serde_json::to_value(&recipient.channels)
            .map_err(|e| AppError::internal(e.to_string()))?;
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO recipients (farm_id, name, phone, email, channels, language) \
             VALUES ($1, $2, $3, $4, $5, $6) RETURNING id",
        )
        .bind(recipient.farm_id)
        .bind(&recipient.name)
        .bind(&recipient.phone)
        .bind(&recipient.email)
        .bind(channels)
        .bind(&recipient.language)
        .fetch_one(&self.pool)
        .await?;
        recipient.id = id;
        Ok(recipient)
    }

    async fn recipients_for_farms(&self, farm_ids: &[i64]) -> Result<Vec<AlertRecipient>> {
        let rows = sqlx::query(
            "SELECT id, farm_id, name, phone, email, channels, language \
             FROM recipients WHERE farm_id = ANY($1) ORDER BY id",
        )
        .bind(farm_ids)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                let channels: serde_json::Value = r.try_get("channels")?;
                Ok(AlertRecipient {
                    id: r.try_get("id")?,
                    farm_id: r.try_get("farm_id")?,
                    name: r.try_get("name")?,
                    phone: r.try_get("phone")?,
                    email: r.try_get("email")?,
                    channels: serde_json::from_value(channels)
                        .map_err(|e| AppError::storage(e.to_string()))?,
                    language: r.try_get("language")?,
                })
            })
            .collect()
    }

    async fn vector_top_k(
        &self,
        column: VectorColumn,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<VectorMatch>> {
        check_dims(column, query)?;
        let (table, col) = match column {
            VectorColumn::Terrain => ("burn_requests", "terrain_vector"),
            VectorColumn::Plume => ("smoke_predictions", "plume_vector"),
            VectorColumn::Weather => ("weather_observations", "weather_vector"),
        };
        // Table/column names come from the closed enum above, not from input.
        let rows = sqlx::query(&format!(
            "SELECT id, ({col} <=> $1)::float8 AS distance FROM {table} \
             WHERE {col} IS NOT NULL ORDER BY {col} <=> $1, id LIMIT $2"
        ))
        .bind(vec_to_pg(query))
        .bind(k as i64)
        .fetch_all(&self.pool)
        .await?;
        rows.iter()
            .map(|r| {
                Ok(VectorMatch {
                    id: r.try_get("id")?,
                    distance: r.try_get("distance")?,
                })
            })
            .collect()
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

fn field_from_row(row: &sqlx::postgres::PgRow) -> Result<Field> {
    let crop: String = row.try_get("crop_type")?;
    let boundary: serde_json::Value = row.try_get("boundary")?;
    Ok(Field {
        id: row.try_get("id")?,
        farm_id: row.try_get("farm_id")?,
        name: row.try_get("name")?,
        boundary: polygon_from_json(boundary),
        area_hectares: row.try_get("area_hectares")?,
        crop_type: CropType::parse(&crop)
            .ok_or_else(|| AppError::storage(format!("unknown crop_type '{crop}'")))?,
        last_burn_date: row.try_get("last_burn_date")?,
    })
}

fn schedule_entry_from_row(row: &sqlx::postgres::PgRow) -> Result<ScheduleEntry> {
    let status: String = row.try_get("status")?;
    let start: Option<i32> = row.try_get("assigned_start_minute")?;
    let end: Option<i32> = row.try_get("assigned_end_minute")?;
    Ok(ScheduleEntry {
        id: row.try_get("id")?,
        burn_request_id: row.try_get("burn_request_id")?,
        run_id: row.try_get("run_id")?,
        status: ScheduleStatus::parse(&status)
            .ok_or_else(|| AppError::storage(format!("unknown schedule status '{status}'")))?,
        assigned_date: row.try_get("assigned_date")?,
        assigned_window: match (start, end) {
            (Some(s), Some(e)) => Some(TimeWindow {
                start_minute: s as u32,
                end_minute: e as u32,
            }),
            _ => None,
        },
        cost: row.try_get("cost")?,
        reason: row.try_get("reason")?,
        created_at: row.try_get("created_at")?,
    })
}

fn delivery_from_row(row: &sqlx::postgres::PgRow) -> Result<DeliveryRecord> {
    let status: String = row.try_get("status")?;
    let via: Option<String> = row.try_get("delivered_via")?;
    Ok(DeliveryRecord {
        recipient_id: row.try_get("recipient_id")?,
        status: parse_delivery_status(&status)?,
        delivered_via: via.as_deref().map(parse_channel).transpose()?,
        attempts: row.try_get::<i32, _>("attempts")? as u32,
        last_error: row.try_get("last_error")?,
        completed_at: row.try_get("completed_at")?,
    })
}

async fn insert_delivery_on(
    tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
    alert_id: uuid::Uuid,
    d: &DeliveryRecord,
) -> Result<()> {
    sqlx::query(
        "INSERT INTO alert_recipients \
         (alert_id, recipient_id, status, delivered_via, attempts, last_error, completed_at) \
         VALUES ($1, $2, $3, $4, $5, $6, $7)",
    )
    .bind(alert_id)
    .bind(d.recipient_id)
    .bind(delivery_status_str(d.status))
    .bind(d.delivered_via.map(Channel::as_str))
    .bind(d.attempts as i32)
    .bind(&d.last_error)
    .bind(d.completed_at)
    .execute(&mut **tx)
    .await?;
    Ok(())
}

fn delivery_status_str(s: DeliveryStatus) -> &'static str {
    match s {
        DeliveryStatus::Pending => "pending",
        DeliveryStatus::Sent => "sent",
        DeliveryStatus::Failed => "failed",
    }
}

fn parse_delivery_status(s: &str) -> Result<DeliveryStatus> {
    match s {
        "pending" => Ok(DeliveryStatus::Pending),
        "sent" => Ok(DeliveryStatus::Sent),
        "failed" => Ok(DeliveryStatus::Failed),
        other => Err(AppError::storage(format!("unknown delivery status '{other}'"))),
    }
}

fn parse_channel(s: &str) -> Result<Channel> {
    match s {
        "sms" => Ok(Channel::Sms),
        "voice" => Ok(Channel::Voice),
        "email" => Ok(Channel::Email),
        other => Err(AppError::storage(format!("unknown channel '{other}'"))),
    }
}

fn parse_alert_severity(s: &str) -> Result<AlertSeverity> {
    match s {
        "info" => Ok(AlertSeverity::Info),
        "warning" => Ok(AlertSeverity::Warning),
        "urgent" => Ok(AlertSeverity::Urgent),
        "emergency" => Ok(AlertSeverity::Emergency),
        other => Err(AppError::storage(format!("unknown alert severity '{other}'"))),
    }
}
