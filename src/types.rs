//! Shared data structures for the burn coordination pipeline
//!
//! This module defines the core entities that flow through the five stages:
//! - Stage 1: BurnRequest + Farm/Field (coordinator inputs)
//! - Stage 2: WeatherObservation, StabilityClass (weather analysis)
//! - Stage 3: SmokePrediction, Conflict (dispersion + conflict detection)
//! - Stage 4: ScheduleEntry (optimizer output)
//! - Stage 5: Alert, AlertRecipient, Acknowledgment (notification dispatch)
//!
//! Cross-entity references are integer foreign keys only; no in-memory
//! back-pointers.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Terrain embedding dimensionality.
pub const TERRAIN_DIMS: usize = 32;
/// Smoke plume embedding dimensionality.
pub const PLUME_DIMS: usize = 64;
/// Weather embedding dimensionality.
pub const WEATHER_DIMS: usize = 128;

/// Convert a UTC timestamp to epoch microseconds (storage convention).
pub fn epoch_micros(t: DateTime<Utc>) -> i64 {
    t.timestamp_micros()
}

/// Normalize a vector to unit magnitude in place.
///
/// A vector whose magnitude is near zero is left untouched — callers treat
/// an all-near-zero vector as "explicitly zero".
pub fn normalize_in_place(v: &mut [f32]) {
    let mag: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag > 1e-6 {
        for x in v.iter_mut() {
            *x /= mag;
        }
    }
}

/// True if the vector has unit norm within tolerance, or is explicitly zero.
pub fn is_unit_or_zero(v: &[f32]) -> bool {
    let mag: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    (0.999..=1.001).contains(&mag) || mag <= 1e-3
}

// ============================================================================
// Geometry
// ============================================================================

/// A WGS84 point, latitude/longitude in degrees.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct GeoPoint {
    pub lat: f64,
    pub lon: f64,
}

impl GeoPoint {
    pub fn new(lat: f64, lon: f64) -> Self {
        Self { lat, lon }
    }
}

/// A closed polygon ring in WGS84. The first and last vertex must be equal.
///
/// This is the wire/storage representation; geometric predicates convert to
/// `geo::Polygon` (see `store::spatial`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct PolygonRing {
    pub points: Vec<GeoPoint>,
}

impl PolygonRing {
    pub fn new(points: Vec<GeoPoint>) -> Self {
        Self { points }
    }

    /// Vertex count including the closing vertex.
    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// True if first and last vertices coincide.
    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => (a.lat - b.lat).abs() < 1e-7 && (a.lon - b.lon).abs() < 1e-7,
            _ => false,
        }
    }

    /// Arithmetic centroid of the ring vertices (closing vertex excluded).
    pub fn centroid(&self) -> GeoPoint {
        if self.points.is_empty() {
            return GeoPoint::default();
        }
        let n = if self.is_closed() && self.points.len() > 1 {
            self.points.len() - 1
        } else {
            self.points.len()
        };
        let (mut lat, mut lon) = (0.0, 0.0);
        for p in &self.points[..n] {
            lat += p.lat;
            lon += p.lon;
        }
        GeoPoint::new(lat / n as f64, lon / n as f64)
    }
}

// ============================================================================
// Stage 1: Farms, fields, burn requests
// ============================================================================

/// Crop / fuel type for a field. Fixed enumeration; `Other` catches the rest.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CropType {
    Rice,
    Wheat,
    Corn,
    Barley,
    Oats,
    Sorghum,
    Cotton,
    Soybeans,
    Sunflower,
    Other,
}

impl CropType {
    pub const ALL: [CropType; 10] = [
        CropType::Rice,
        CropType::Wheat,
        CropType::Corn,
        CropType::Barley,
        CropType::Oats,
        CropType::Sorghum,
        CropType::Cotton,
        CropType::Soybeans,
        CropType::Sunflower,
        CropType::Other,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CropType::Rice => "rice",
            CropType::Wheat => "wheat",
            CropType::Corn => "corn",
            CropType::Barley => "barley",
            CropType::Oats => "oats",
            CropType::Sorghum => "sorghum",
            CropType::Cotton => "cotton",
            CropType::Soybeans => "soybeans",
            CropType::Sunflower => "sunflower",
            CropType::Other => "other",
        }
    }

    /// Parse from string (API/config).
    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "rice" => Some(CropType::Rice),
            "wheat" => Some(CropType::Wheat),
            "corn" | "maize" => Some(CropType::Corn),
            "barley" => Some(CropType::Barley),
            "oats" => Some(CropType::Oats),
            "sorghum" => Some(CropType::Sorghum),
            "cotton" => Some(CropType::Cotton),
            "soybeans" | "soybean" => Some(CropType::Soybeans),
            "sunflower" => Some(CropType::Sunflower),
            "other" => Some(CropType::Other),
            _ => None,
        }
    }

    /// One-hot slot in the 10-wide crop block of the terrain embedding.
    pub fn one_hot_index(self) -> usize {
        match self {
            CropType::Rice => 0,
            CropType::Wheat => 1,
            CropType::Corn => 2,
            CropType::Barley => 3,
            CropType::Oats => 4,
            CropType::Sorghum => 5,
            CropType::Cotton => 6,
            CropType::Soybeans => 7,
            CropType::Sunflower => 8,
            CropType::Other => 9,
        }
    }

    /// Priority-rank table (0-10): crops with narrow seasonal burn windows
    /// rank higher.
    pub fn priority_rank(self) -> f64 {
        match self {
            CropType::Rice => 10.0,
            CropType::Wheat | CropType::Cotton => 7.0,
            CropType::Corn | CropType::Barley => 6.0,
            CropType::Sorghum | CropType::Oats | CropType::Sunflower => 5.0,
            CropType::Soybeans => 4.0,
            CropType::Other => 3.0,
        }
    }

    /// Weather-sensitivity factor used in priority scoring. Fine fuels that
    /// reabsorb moisture quickly rate higher.
    pub fn weather_sensitivity(self) -> f64 {
        match self {
            CropType::Rice | CropType::Cotton | CropType::Sunflower => 8.0,
            _ => 5.0,
        }
    }

    /// PM2.5 emission factor, kg per hectare burned. Literature midpoints
    /// for open agricultural burning.
    pub fn emission_factor_kg_per_ha(self) -> f64 {
        match self {
            CropType::Rice => 13.0,
            CropType::Wheat => 9.0,
            CropType::Corn => 11.0,
            CropType::Barley => 9.0,
            CropType::Oats => 8.5,
            CropType::Sorghum => 10.0,
            CropType::Cotton => 12.0,
            CropType::Soybeans => 8.0,
            CropType::Sunflower => 9.5,
            CropType::Other => 10.0,
        }
    }
}

impl std::fmt::Display for CropType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A registered farm. Never deleted while referenced by requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Farm {
    pub id: i64,
    pub name: String,
    pub owner_name: String,
    /// E.164 phone, e.g. "+15551234567".
    pub phone: String,
    pub email: String,
    pub location: GeoPoint,
    pub permit_number: Option<String>,
    pub total_area_hectares: f64,
    /// Epoch microseconds UTC.
    pub created_at: i64,
}

/// A field belonging to exactly one farm.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub id: i64,
    pub farm_id: i64,
    pub name: String,
    pub boundary: PolygonRing,
    pub area_hectares: f64,
    pub crop_type: CropType,
    pub last_burn_date: Option<NaiveDate>,
}

/// Burn request lifecycle status.
///
/// ```text
/// pending ──→ scheduled ──→ active ──→ completed
///    │            │           │
///    │            ├──→ pending (re-optimization bumps it back)
///    ├──→ rejected│
///    └──→ cancelled ←─────────┘
/// ```
/// `completed`, `cancelled`, `rejected` are terminal.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    #[default]
    Pending,
    Scheduled,
    Active,
    Completed,
    Cancelled,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Scheduled => "scheduled",
            RequestStatus::Active => "active",
            RequestStatus::Completed => "completed",
            RequestStatus::Cancelled => "cancelled",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(RequestStatus::Pending),
            "scheduled" => Some(RequestStatus::Scheduled),
            "active" => Some(RequestStatus::Active),
            "completed" => Some(RequestStatus::Completed),
            "cancelled" | "canceled" => Some(RequestStatus::Cancelled),
            "rejected" => Some(RequestStatus::Rejected),
            _ => None,
        }
    }

    /// Terminal states are absorbing.
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            RequestStatus::Completed | RequestStatus::Cancelled | RequestStatus::Rejected
        )
    }

    /// The allowed transition DAG. Both store implementations enforce this.
    pub fn can_transition_to(self, next: RequestStatus) -> bool {
        use RequestStatus::{Active, Cancelled, Completed, Pending, Rejected, Scheduled};
        if self == next {
            return false;
        }
        match self {
            Pending => matches!(next, Scheduled | Cancelled | Rejected),
            Scheduled => matches!(next, Active | Pending | Cancelled),
            Active => matches!(next, Completed | Cancelled),
            Completed | Cancelled | Rejected => false,
        }
    }

    /// Only pending and scheduled requests enter an optimizer run.
    pub fn is_optimizable(self) -> bool {
        matches!(self, RequestStatus::Pending | RequestStatus::Scheduled)
    }
}

impl std::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A requested burn window within a single day, minutes from midnight,
/// half-open `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_minute: u32,
    pub end_minute: u32,
}

impl TimeWindow {
    /// Build from "HH:MM" endpoints.
    pub fn parse(start: &str, end: &str) -> Option<Self> {
        Some(Self {
            start_minute: parse_hhmm(start)?,
            end_minute: parse_hhmm(end)?,
        })
    }

    pub fn from_hours(start_hour: u32, end_hour: u32) -> Self {
        Self {
            start_minute: start_hour * 60,
            end_minute: end_hour * 60,
        }
    }

    pub fn duration_minutes(&self) -> i64 {
        i64::from(self.end_minute) - i64::from(self.start_minute)
    }

    pub fn duration_hours(&self) -> f64 {
        self.duration_minutes() as f64 / 60.0
    }

    /// Half-open overlap test.
    pub fn overlaps(&self, other: &TimeWindow) -> bool {
        self.start_minute < other.end_minute && other.start_minute < self.end_minute
    }

    /// Extend the end by whole hours (smoke persistence), clamped to 24:00.
    pub fn extended_by_hours(&self, hours: u32) -> TimeWindow {
        TimeWindow {
            start_minute: self.start_minute,
            end_minute: (self.end_minute + hours * 60).min(24 * 60),
        }
    }

    pub fn format(&self) -> String {
        format!(
            "{:02}:{:02}-{:02}:{:02}",
            self.start_minute / 60,
            self.start_minute % 60,
            self.end_minute / 60,
            self.end_minute % 60
        )
    }
}

/// Parse an "HH:MM" clock string into minutes from midnight.
pub fn parse_hhmm(s: &str) -> Option<u32> {
    let (h, m) = s.split_once(':')?;
    if h.len() != 2 || m.len() != 2 {
        return None;
    }
    let h: u32 = h.parse().ok()?;
    let m: u32 = m.parse().ok()?;
    if h > 23 || m > 59 {
        return None;
    }
    Some(h * 60 + m)
}

/// A validated burn request, the unit of work for the whole pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnRequest {
    pub id: i64,
    pub field_id: i64,
    pub farm_id: i64,
    pub burn_date: NaiveDate,
    pub window: TimeWindow,
    /// Fuel load in tonnes per hectare.
    pub fuel_load_t_per_ha: f64,
    pub area_hectares: f64,
    pub crop_type: CropType,
    /// Field centroid, cached at submission for plume anchoring.
    pub centroid: GeoPoint,
    pub status: RequestStatus,
    /// Integer 1..=10.
    pub priority_score: u8,
    /// 32-d unit-normalized terrain embedding.
    pub terrain_vector: Vec<f32>,
    /// Epoch microseconds UTC.
    pub created_at: i64,
    pub updated_at: i64,
}

// ============================================================================
// Stage 2: Weather
// ============================================================================

/// Pasquill–Gifford atmospheric stability class.
///
/// A = very unstable (strong daytime convection) through F = very stable
/// (night-time inversion). Selects the σ_y/σ_z dispersion curves.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum StabilityClass {
    A,
    B,
    C,
    #[default]
    D,
    E,
    F,
}

impl StabilityClass {
    pub const ALL: [StabilityClass; 6] = [
        StabilityClass::A,
        StabilityClass::B,
        StabilityClass::C,
        StabilityClass::D,
        StabilityClass::E,
        StabilityClass::F,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StabilityClass::A => "A",
            StabilityClass::B => "B",
            StabilityClass::C => "C",
            StabilityClass::D => "D",
            StabilityClass::E => "E",
            StabilityClass::F => "F",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_uppercase().as_str() {
            "A" => Some(StabilityClass::A),
            "B" => Some(StabilityClass::B),
            "C" => Some(StabilityClass::C),
            "D" => Some(StabilityClass::D),
            "E" => Some(StabilityClass::E),
            "F" => Some(StabilityClass::F),
            _ => None,
        }
    }

    /// One-hot slot in weather/plume embeddings.
    pub fn one_hot_index(self) -> usize {
        match self {
            StabilityClass::A => 0,
            StabilityClass::B => 1,
            StabilityClass::C => 2,
            StabilityClass::D => 3,
            StabilityClass::E => 4,
            StabilityClass::F => 5,
        }
    }
}

impl std::fmt::Display for StabilityClass {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time atmospheric conditions at (lat, lon, t). Immutable once
/// stored; superseded by newer observations for the same (cell, hour).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub id: i64,
    pub location: GeoPoint,
    /// Epoch microseconds UTC of the observation (or forecast valid time).
    pub observed_at: i64,
    pub temperature_c: f64,
    pub humidity_pct: f64,
    pub wind_speed_ms: f64,
    /// Meteorological convention: direction the wind blows FROM, degrees.
    pub wind_direction_deg: f64,
    pub pressure_hpa: f64,
    pub visibility_km: f64,
    pub cloud_cover_pct: f64,
    pub precipitation_mm: f64,
    pub dew_point_c: f64,
    pub stability: StabilityClass,
    pub mixing_height_m: f64,
    /// True when this row came from a forecast rather than an observation.
    pub is_forecast: bool,
    /// 128-d unit-normalized weather embedding.
    pub weather_vector: Vec<f32>,
}

impl WeatherObservation {
    /// Bearing the plume travels TOWARD (downwind), degrees.
    pub fn downwind_bearing_deg(&self) -> f64 {
        (self.wind_direction_deg + 180.0).rem_euclid(360.0)
    }
}

/// Per-factor suitability breakdown produced by `analyze_for_burn`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SuitabilityFactor {
    pub name: String,
    pub value: f64,
    pub score: f64,
    pub pass: bool,
    pub detail: String,
}

/// Weather suitability verdict for a burn at a location/date.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BurnSuitability {
    pub suitable: bool,
    /// Product of per-factor soft scores in [0, 1].
    pub score: f64,
    pub factors: Vec<SuitabilityFactor>,
    /// The observation the verdict was computed from.
    pub observation_id: Option<i64>,
}

// ============================================================================
// Stage 3: Smoke predictions & conflicts
// ============================================================================

/// Dispersion prediction for one burn request at a prediction time.
/// The latest prediction for a request supersedes earlier ones.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmokePrediction {
    pub id: i64,
    pub burn_request_id: i64,
    /// Epoch microseconds UTC.
    pub predicted_at: i64,
    /// Wind-oriented fan polygon (or calm-air circle) anchored at the
    /// field centroid.
    pub plume: PolygonRing,
    /// Peak ground-level concentration, µg/m³, clamped to [0, 10000].
    pub max_pm25: f64,
    pub affected_area_km2: f64,
    pub dispersion_radius_km: f64,
    /// Confidence in [0, 1].
    pub confidence: f64,
    /// 64-d unit-normalized plume embedding.
    pub plume_vector: Vec<f32>,
}

/// Conflict severity bands, EPA-aligned on combined PM2.5 (µg/m³):
/// low ≤ 35, moderate ≤ 55, high ≤ 150, critical > 150.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum ConflictSeverity {
    Low,
    Moderate,
    High,
    Critical,
}

impl ConflictSeverity {
    /// Band a combined PM2.5 value.
    pub fn from_combined_pm25(pm25: f64) -> Self {
        if pm25 > 150.0 {
            ConflictSeverity::Critical
        } else if pm25 > 55.0 {
            ConflictSeverity::High
        } else if pm25 > 35.0 {
            ConflictSeverity::Moderate
        } else {
            ConflictSeverity::Low
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ConflictSeverity::Low => "low",
            ConflictSeverity::Moderate => "moderate",
            ConflictSeverity::High => "high",
            ConflictSeverity::Critical => "critical",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "low" => Some(ConflictSeverity::Low),
            "moderate" => Some(ConflictSeverity::Moderate),
            "high" => Some(ConflictSeverity::High),
            "critical" => Some(ConflictSeverity::Critical),
            _ => None,
        }
    }

    /// Weight used by the optimizer's conflict cost term.
    pub fn cost_weight(self) -> f64 {
        match self {
            ConflictSeverity::Low => 1.0,
            ConflictSeverity::Moderate => 3.0,
            ConflictSeverity::High => 8.0,
            ConflictSeverity::Critical => 20.0,
        }
    }
}

impl std::fmt::Display for ConflictSeverity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Resolution state of a detected conflict.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionStatus {
    #[default]
    Pending,
    Resolved,
    Ignored,
}

impl ResolutionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolutionStatus::Pending => "pending",
            ResolutionStatus::Resolved => "resolved",
            ResolutionStatus::Ignored => "ignored",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(ResolutionStatus::Pending),
            "resolved" => Some(ResolutionStatus::Resolved),
            "ignored" => Some(ResolutionStatus::Ignored),
            _ => None,
        }
    }
}

/// An unordered pair of burn requests whose plumes overlap in space and
/// time on a date. `request_a < request_b` always (normalized pair key).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Conflict {
    pub id: i64,
    pub request_a: i64,
    pub request_b: i64,
    pub date: NaiveDate,
    pub overlap: PolygonRing,
    pub overlap_area_km2: f64,
    pub max_combined_pm25: f64,
    pub severity: ConflictSeverity,
    pub resolution_status: ResolutionStatus,
}

impl Conflict {
    /// Normalized pair key for idempotent writes: `(min, max, date)`.
    pub fn pair_key(&self) -> (i64, i64, NaiveDate) {
        (
            self.request_a.min(self.request_b),
            self.request_a.max(self.request_b),
            self.date,
        )
    }
}

// ============================================================================
// Stage 4: Schedule
// ============================================================================

/// Optimizer placement outcome for one request.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleStatus {
    Scheduled,
    Deferred,
    Rejected,
}

impl ScheduleStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            ScheduleStatus::Scheduled => "scheduled",
            ScheduleStatus::Deferred => "deferred",
            ScheduleStatus::Rejected => "rejected",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "scheduled" => Some(ScheduleStatus::Scheduled),
            "deferred" => Some(ScheduleStatus::Deferred),
            "rejected" => Some(ScheduleStatus::Rejected),
            _ => None,
        }
    }
}

/// One row of an optimized schedule. At most one active entry per request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduleEntry {
    pub id: i64,
    pub burn_request_id: i64,
    /// Optimizer run that produced this entry.
    pub run_id: uuid::Uuid,
    pub status: ScheduleStatus,
    /// Assigned date; None for deferred/rejected entries.
    pub assigned_date: Option<NaiveDate>,
    pub assigned_window: Option<TimeWindow>,
    pub cost: f64,
    /// Reason for deferral/rejection, e.g. "weather_unsuitable".
    pub reason: Option<String>,
    pub created_at: i64,
}

/// Aggregate improvement metrics for one optimizer run.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct OptimizationImprovements {
    pub conflicts_resolved: usize,
    pub initial_cost: f64,
    pub final_cost: f64,
    pub iterations: u64,
    pub converged: bool,
}

// ============================================================================
// Stage 5: Alerts
// ============================================================================

/// Category of an outbound alert; selects the message template.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum AlertType {
    Approval,
    ScheduleChange,
    ConflictNotice,
    WeatherUnsuitable,
    EmergencyHalt,
    DecisionRequired,
}

impl AlertType {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertType::Approval => "approval",
            AlertType::ScheduleChange => "schedule_change",
            AlertType::ConflictNotice => "conflict_notice",
            AlertType::WeatherUnsuitable => "weather_unsuitable",
            AlertType::EmergencyHalt => "emergency_halt",
            AlertType::DecisionRequired => "decision_required",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "approval" => Some(AlertType::Approval),
            "schedule_change" => Some(AlertType::ScheduleChange),
            "conflict_notice" => Some(AlertType::ConflictNotice),
            "weather_unsuitable" => Some(AlertType::WeatherUnsuitable),
            "emergency_halt" => Some(AlertType::EmergencyHalt),
            "decision_required" => Some(AlertType::DecisionRequired),
            _ => None,
        }
    }
}

/// Alert severity drives channel selection and cascade timing.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum AlertSeverity {
    Info,
    Warning,
    Urgent,
    Emergency,
}

impl AlertSeverity {
    pub fn as_str(self) -> &'static str {
        match self {
            AlertSeverity::Info => "info",
            AlertSeverity::Warning => "warning",
            AlertSeverity::Urgent => "urgent",
            AlertSeverity::Emergency => "emergency",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "info" => Some(AlertSeverity::Info),
            "warning" => Some(AlertSeverity::Warning),
            "urgent" => Some(AlertSeverity::Urgent),
            "emergency" => Some(AlertSeverity::Emergency),
            _ => None,
        }
    }

    /// Next severity up, saturating at Emergency. Used by cascades.
    pub fn escalated(self) -> AlertSeverity {
        match self {
            AlertSeverity::Info => AlertSeverity::Warning,
            AlertSeverity::Warning => AlertSeverity::Urgent,
            AlertSeverity::Urgent | AlertSeverity::Emergency => AlertSeverity::Emergency,
        }
    }
}

/// Delivery channel. Each recipient carries an ordered preference list.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Sms,
    Voice,
    Email,
}

impl Channel {
    pub fn as_str(self) -> &'static str {
        match self {
            Channel::Sms => "sms",
            Channel::Voice => "voice",
            Channel::Email => "email",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sms" => Some(Channel::Sms),
            "voice" => Some(Channel::Voice),
            "email" => Some(Channel::Email),
            _ => None,
        }
    }
}

/// Per-recipient delivery outcome.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Sent,
    Failed,
}

/// A message recipient with ordered channel preferences.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AlertRecipient {
    pub id: i64,
    pub farm_id: Option<i64>,
    pub name: String,
    pub phone: Option<String>,
    pub email: Option<String>,
    /// Channels tried in order until one succeeds.
    pub channels: Vec<Channel>,
    /// BCP-47 language code for template selection, e.g. "en", "es".
    pub language: String,
}

/// Per-recipient delivery record inside an [`Alert`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryRecord {
    pub recipient_id: i64,
    pub status: DeliveryStatus,
    /// The channel that ultimately succeeded, if any.
    pub delivered_via: Option<Channel>,
    pub attempts: u32,
    pub last_error: Option<String>,
    /// Epoch microseconds UTC of the final attempt.
    pub completed_at: Option<i64>,
}

/// Immutable record of a dispatched alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Alert {
    pub id: uuid::Uuid,
    pub alert_type: AlertType,
    pub severity: AlertSeverity,
    /// Related burn request, if any.
    pub burn_request_id: Option<i64>,
    pub message: String,
    pub deliveries: Vec<DeliveryRecord>,
    pub requires_ack: bool,
    pub created_at: i64,
}

/// A recipient's acknowledgment of a dispatched alert.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Acknowledgment {
    pub alert_id: uuid::Uuid,
    pub recipient_id: i64,
    pub response: Option<String>,
    pub acknowledged_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_transitions_follow_dag() {
        use RequestStatus::{Active, Cancelled, Completed, Pending, Rejected, Scheduled};
        assert!(Pending.can_transition_to(Scheduled));
        assert!(Pending.can_transition_to(Rejected));
        assert!(Pending.can_transition_to(Cancelled));
        assert!(Scheduled.can_transition_to(Active));
        assert!(Scheduled.can_transition_to(Pending));
        assert!(Active.can_transition_to(Completed));
        assert!(Active.can_transition_to(Cancelled));

        // Terminal states are absorbing
        for terminal in [Completed, Cancelled, Rejected] {
            for next in [Pending, Scheduled, Active, Completed, Cancelled, Rejected] {
                assert!(!terminal.can_transition_to(next), "{terminal} -> {next}");
            }
        }

        // No self-transitions
        assert!(!Pending.can_transition_to(Pending));
    }

    #[test]
    fn severity_bands_match_epa_thresholds() {
        assert_eq!(ConflictSeverity::from_combined_pm25(34.9), ConflictSeverity::Low);
        assert_eq!(ConflictSeverity::from_combined_pm25(35.0), ConflictSeverity::Low);
        assert_eq!(ConflictSeverity::from_combined_pm25(35.1), ConflictSeverity::Moderate);
        assert_eq!(ConflictSeverity::from_combined_pm25(55.0), ConflictSeverity::Moderate);
        assert_eq!(ConflictSeverity::from_combined_pm25(55.1), ConflictSeverity::High);
        assert_eq!(ConflictSeverity::from_combined_pm25(150.0), ConflictSeverity::High);
        assert_eq!(ConflictSeverity::from_combined_pm25(150.1), ConflictSeverity::Critical);
    }

    #[test]
    fn window_parsing_and_overlap() {
        let w = TimeWindow::parse("09:00", "13:00").expect("valid window");
        assert_eq!(w.start_minute, 540);
        assert_eq!(w.end_minute, 780);
        assert!((w.duration_hours() - 4.0).abs() < f64::EPSILON);

        let other = TimeWindow::parse("12:00", "16:00").expect("valid window");
        assert!(w.overlaps(&other));

        // Half-open: [09:00,13:00) does not overlap [13:00,15:00)
        let adjacent = TimeWindow::parse("13:00", "15:00").expect("valid window");
        assert!(!w.overlaps(&adjacent));

        assert!(parse_hhmm("24:00").is_none());
        assert!(parse_hhmm("9:00").is_none());
        assert!(parse_hhmm("09:60").is_none());
    }

    #[test]
    fn window_persistence_extension_clamps_to_midnight() {
        let w = TimeWindow::parse("21:00", "23:30").expect("valid window");
        let ext = w.extended_by_hours(2);
        assert_eq!(ext.end_minute, 24 * 60);
    }

    #[test]
    fn normalize_leaves_zero_vectors_alone() {
        let mut v = vec![0.0_f32; 8];
        normalize_in_place(&mut v);
        assert!(v.iter().all(|x| *x == 0.0));
        assert!(is_unit_or_zero(&v));

        let mut v = vec![3.0_f32, 4.0];
        normalize_in_place(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6);
        assert!((v[1] - 0.8).abs() < 1e-6);
        assert!(is_unit_or_zero(&v));
    }

    #[test]
    fn conflict_pair_key_is_order_independent() {
        let date = NaiveDate::from_ymd_opt(2026, 8, 1).expect("valid date");
        let c1 = Conflict {
            id: 1,
            request_a: 7,
            request_b: 3,
            date,
            overlap: PolygonRing::default(),
            overlap_area_km2: 0.0,
            max_combined_pm25: 40.0,
            severity: ConflictSeverity::Moderate,
            resolution_status: ResolutionStatus::Pending,
        };
        assert_eq!(c1.pair_key(), (3, 7, date));
    }

    #[test]
    fn crop_parse_round_trips() {
        for crop in CropType::ALL {
            assert_eq!(CropType::parse(crop.as_str()), Some(crop));
        }
        assert_eq!(CropType::parse("maize"), Some(CropType::Corn));
        assert_eq!(CropType::parse("grapes"), None);
    }

    #[test]
    fn downwind_bearing_opposes_wind_direction() {
        let mut obs = WeatherObservation {
            id: 1,
            location: GeoPoint::new(38.58, -121.49),
            observed_at: 0,
            temperature_c: 22.0,
            humidity_pct: 55.0,
            wind_speed_ms: 3.5,
            wind_direction_deg: 180.0,
            pressure_hpa: 1013.0,
            visibility_km: 10.0,
            cloud_cover_pct: 20.0,
            precipitation_mm: 0.0,
            dew_point_c: 12.0,
            stability: StabilityClass::D,
            mixing_height_m: 800.0,
            is_forecast: false,
            weather_vector: Vec::new(),
        };
        assert!((obs.downwind_bearing_deg() - 0.0).abs() < 1e-9);
        obs.wind_direction_deg = 225.0;
        assert!((obs.downwind_bearing_deg() - 45.0).abs() < 1e-9);
    }
}
