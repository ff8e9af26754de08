//! Submission validation: the rules every accepted burn request satisfies.
//!
//! Validation is fail-fast in the sense that all rules are checked and the
//! complete list of offending fields is returned in one `VALIDATION`
//! error. The acreage/geometry mismatch is the single warn-only rule.

use chrono::NaiveDate;

use crate::config::defaults;
use crate::error::{AppError, Result};
use crate::store::spatial;
use crate::types::{parse_hhmm, CropType, PolygonRing, TimeWindow};

/// Raw submission payload as received at the API boundary.
#[derive(Debug, Clone, serde::Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitBurnRequest {
    pub farm_id: i64,
    #[serde(alias = "field")]
    pub field_name: String,
    #[serde(alias = "polygon")]
    pub field_boundary: PolygonRing,
    #[serde(alias = "area")]
    pub area_hectares: f64,
    pub crop_type: String,
    #[serde(alias = "date")]
    pub burn_date: NaiveDate,
    /// "HH:MM"
    pub time_window_start: String,
    /// "HH:MM"
    pub time_window_end: String,
    #[serde(alias = "fuel")]
    pub fuel_load_t_per_ha: f64,
    /// Optional operator override blended into the computed priority.
    #[serde(default)]
    pub requested_priority: Option<u8>,
}

/// A validated submission with parsed fields.
#[derive(Debug, Clone)]
pub struct ValidatedSubmission {
    pub farm_id: i64,
    pub field_name: String,
    pub field_boundary: PolygonRing,
    pub area_hectares: f64,
    pub crop_type: CropType,
    pub burn_date: NaiveDate,
    pub window: TimeWindow,
    pub fuel_load_t_per_ha: f64,
    pub requested_priority: Option<u8>,
    /// Warn-only findings attached to the submission response.
    pub warnings: Vec<String>,
}

/// Validate a submission against today's date. Returns the parsed form or
/// a `VALIDATION` error listing every offending field.
pub fn validate(req: &SubmitBurnRequest, today: NaiveDate) -> Result<ValidatedSubmission> {
    let mut offending: Vec<&'static str> = Vec::new();
    let mut warnings = Vec::new();

    if req.field_name.is_empty() || req.field_name.len() > 255 {
        offending.push("field_name");
    }

    let polygon_ok = req.field_boundary.len() >= 4 && spatial::spatial_valid(&req.field_boundary);
    if !polygon_ok {
        offending.push("field_boundary");
    }

    if !(req.area_hectares > 0.0 && req.area_hectares <= defaults::MAX_AREA_HECTARES) {
        offending.push("area_hectares");
    }

    let start = parse_hhmm(&req.time_window_start);
    let end = parse_hhmm(&req.time_window_end);
    if start.is_none() {
        offending.push("time_window_start");
    }
    if end.is_none() {
        offending.push("time_window_end");
    }

    let window = match (start, end) {
        (Some(s), Some(e)) => {
            let w = TimeWindow {
                start_minute: s,
                end_minute: e,
            };
            if w.duration_minutes() <= 0 {
                offending.push("time_window_end");
                None
            } else if w.duration_minutes() < defaults::MIN_WINDOW_MINUTES {
                offending.push("time_window");
                None
            } else {
                Some(w)
            }
        }
        _ => None,
    };

    if req.burn_date < today
        || req.burn_date > today + chrono::Duration::days(defaults::MAX_LEAD_DAYS)
    {
        offending.push("burn_date");
    }

    let crop_type = CropType::parse(&req.crop_type);
    if crop_type.is_none() {
        offending.push("crop_type");
    }

    if !(req.fuel_load_t_per_ha > 0.0 && req.fuel_load_t_per_ha <= 100.0) {
        offending.push("fuel_load_t_per_ha");
    }

    if let Some(p) = req.requested_priority {
        if !(1..=10).contains(&p) {
            offending.push("requested_priority");
        }
    }

    if !offending.is_empty() {
        return Err(AppError::validation_fields(
            "burn request failed validation",
            &offending,
        ));
    }

    // Warn-only: declared acreage vs geodesic area of the polygon.
    if polygon_ok && req.area_hectares > 0.0 {
        let geo_ha = spatial::area_hectares(&req.field_boundary);
        let mismatch = (geo_ha - req.area_hectares).abs() / req.area_hectares;
        if mismatch > defaults::AREA_MISMATCH_WARN_FRACTION {
            warnings.push(format!(
                "declared area {:.1} ha differs from polygon area {:.1} ha by {:.0}%",
                req.area_hectares,
                geo_ha,
                mismatch * 100.0
            ));
        }
    }

    // offending is empty here, so window and crop_type parsed.
    let window = window.ok_or_else(|| AppError::internal("window parsed but missing"))?;
    let crop_type = crop_type.ok_or_else(|| AppError::internal("crop parsed but missing"))?;

    Ok(ValidatedSubmission {
        farm_id: req.farm_id,
        field_name: req.field_name.clone(),
        field_boundary: req.field_boundary.clone(),
        area_hectares: req.area_hectares,
        crop_type,
        burn_date: req.burn_date,
        window,
        fuel_load_t_per_ha: req.fuel_load_t_per_ha,
        requested_priority: req.requested_priority,
        warnings,
    })
}

#[cfg(test)]
pub(crate) fn sample_submission(today: NaiveDate) -> SubmitBurnRequest {
    use crate::types::GeoPoint;
    SubmitBurnRequest {
        farm_id: 1,
        field_name: "F1".to_string(),
        field_boundary: spatial::square_around(GeoPoint::new(38.58, -121.49), 707.0),
        area_hectares: 50.0,
        crop_type: "rice".to_string(),
        burn_date: today + chrono::Duration::days(3),
        time_window_start: "09:00".to_string(),
        time_window_end: "13:00".to_string(),
        fuel_load_t_per_ha: 15.0,
        requested_priority: None,
    }
}
