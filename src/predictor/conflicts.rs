//! Pairwise conflict detection.
//!
//! For every unordered pair of burns on the same date whose (persistence-
//! extended) windows overlap, intersect the plume polygons and sample the
//! summed PM2.5 fields on a grid across the intersection. A conflict is
//! emitted iff the combined peak exceeds 35 µg/m³ OR the overlap exceeds
//! 0.1 km². Output ordering and pair keys are deterministic: ascending
//! request id.

use chrono::NaiveDate;
use rayon::prelude::*;
use tokio_util::sync::CancellationToken;

use crate::config::defaults::{
    CANCEL_CHECK_EVERY, CONFLICT_AREA_THRESHOLD_KM2, CONFLICT_PM25_THRESHOLD,
};
use crate::config::PredictorConfig;
use crate::error::{AppError, Result};
use crate::store::spatial;
use crate::types::{
    Conflict, ConflictSeverity, GeoPoint, PolygonRing, ResolutionStatus, TimeWindow,
};

use super::PlumeField;

/// One burn's plume, ready for pairing.
#[derive(Debug, Clone)]
pub struct BurnPlume {
    pub request_id: i64,
    pub date: NaiveDate,
    pub window: TimeWindow,
    pub ring: PolygonRing,
    pub field: PlumeField,
}

/// The conflict emission rule.
pub fn should_emit(combined_pm25: f64, overlap_area_km2: f64) -> bool {
    combined_pm25 > CONFLICT_PM25_THRESHOLD || overlap_area_km2 > CONFLICT_AREA_THRESHOLD_KM2
}

/// Detect all pairwise conflicts among `plumes`. Pairs are evaluated in
/// parallel; each samples its own grid and polls the cancellation token.
pub fn detect(
    plumes: &[BurnPlume],
    config: &PredictorConfig,
    cancel: &CancellationToken,
) -> Result<Vec<Conflict>> {
    let mut pairs = Vec::new();
    for i in 0..plumes.len() {
        for j in (i + 1)..plumes.len() {
            let (a, b) = (&plumes[i], &plumes[j]);
            if a.date != b.date {
                continue;
            }
            let ext_a = a.window.extended_by_hours(config.persistence_hours);
            let ext_b = b.window.extended_by_hours(config.persistence_hours);
            if !ext_a.overlaps(&b.window) && !ext_b.overlaps(&a.window) {
                continue;
            }
            // Normalize pair ordering by ascending request id.
            if a.request_id <= b.request_id {
                pairs.push((a, b));
            } else {
                pairs.push((b, a));
            }
        }
    }
    pairs.sort_by_key(|(a, b)| (a.request_id, b.request_id));

    let results: Vec<Result<Option<Conflict>>> = pairs
        .par_iter()
        .map(|(a, b)| evaluate_pair(a, b, config, cancel))
        .collect();

    let mut conflicts = Vec::new();
    for r in results {
        if let Some(c) = r? {
            conflicts.push(c);
        }
    }
    conflicts.sort_by_key(|c| (c.request_a, c.request_b));
    Ok(conflicts)
}

fn evaluate_pair(
    a: &BurnPlume,
    b: &BurnPlume,
    config: &PredictorConfig,
    cancel: &CancellationToken,
) -> Result<Option<Conflict>> {
    let Some((overlap_ring, overlap_m2)) = spatial::intersection(&a.ring, &b.ring) else {
        return Ok(None);
    };
    let overlap_km2 = overlap_m2 / 1.0e6;

    let max_combined = sample_combined_peak(&overlap_ring, &a.field, &b.field, config, cancel)?;

    if !should_emit(max_combined, overlap_km2) {
        return Ok(None);
    }

    Ok(Some(Conflict {
        id: 0,
        request_a: a.request_id,
        request_b: b.request_id,
        date: a.date,
        overlap: overlap_ring,
        overlap_area_km2: overlap_km2,
        max_combined_pm25: max_combined,
        severity: ConflictSeverity::from_combined_pm25(max_combined),
        resolution_status: ResolutionStatus::Pending,
    }))
}

/// Peak of the summed concentration fields across the overlap region.
fn sample_combined_peak(
    overlap: &PolygonRing,
    a: &PlumeField,
    b: &PlumeField,
    config: &PredictorConfig,
    cancel: &CancellationToken,
) -> Result<f64> {
    let (mut min_lat, mut max_lat) = (f64::INFINITY, f64::NEG_INFINITY);
    let (mut min_lon, mut max_lon) = (f64::INFINITY, f64::NEG_INFINITY);
    for p in &overlap.points {
        min_lat = min_lat.min(p.lat);
        max_lat = max_lat.max(p.lat);
        min_lon = min_lon.min(p.lon);
        max_lon = max_lon.max(p.lon);
    }
    if !min_lat.is_finite() {
        return Ok(0.0);
    }

    let mid_lat = (min_lat + max_lat) / 2.0;
    let step_lat = config.grid_step_km / 111.2;
    let step_lon = config.grid_step_km / (111.2 * mid_lat.to_radians().cos().abs().max(0.1));

    let mut peak: f64 = 0.0;
    let mut iterations: u64 = 0;

    let mut lat = min_lat;
    while lat <= max_lat {
        let mut lon = min_lon;
        while lon <= max_lon {
            iterations += 1;
            if iterations % CANCEL_CHECK_EVERY == 0 && cancel.is_cancelled() {
                return Err(AppError::cancelled());
            }
            let p = GeoPoint::new(lat, lon);
            if spatial::contains_point(overlap, p) {
                let combined = a.concentration_at(p) + b.concentration_at(p);
                peak = peak.max(combined);
            }
            lon += step_lon;
        }
        lat += step_lat;
    }

    // Tiny overlaps can slip between grid lines; fall back to the overlap
    // vertices and centroid.
    if peak == 0.0 {
        for p in overlap.points.iter().copied().chain([overlap.centroid()]) {
            peak = peak.max(a.concentration_at(p) + b.concentration_at(p));
        }
    }

    Ok(peak)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{build_field, plume::fan_shape, plume::plume_ring};
    use crate::types::{CropType, StabilityClass};

    fn plume_at(request_id: i64, center: GeoPoint, window: TimeWindow) -> BurnPlume {
        let config = PredictorConfig::default();
        let field = build_field(
            center,
            CropType::Rice,
            100.0,
            15.0,
            3.6,
            225.0,
            StabilityClass::D,
            800.0,
        );
        let shape = fan_shape(3.6, StabilityClass::D, config.r_max_km);
        BurnPlume {
            request_id,
            date: NaiveDate::from_ymd_opt(2026, 8, 4).expect("valid date"),
            window,
            ring: plume_ring(center, field.downwind_bearing_deg, &shape),
            field,
        }
    }

    #[test]
    fn adjacent_simultaneous_burns_conflict() {
        let origin = GeoPoint::new(38.58, -121.49);
        let nearby = spatial::destination(origin, 45.0, 2_000.0);
        let window = TimeWindow::from_hours(9, 13);
        let plumes = vec![plume_at(1, origin, window), plume_at(2, nearby, window)];

        let conflicts = detect(&plumes, &PredictorConfig::default(), &CancellationToken::new())
            .expect("detection");
        assert_eq!(conflicts.len(), 1);
        let c = &conflicts[0];
        assert_eq!((c.request_a, c.request_b), (1, 2));
        assert!(c.max_combined_pm25 > 0.0);
        assert!(c.overlap_area_km2 > 0.0);
    }

    #[test]
    fn detection_is_symmetric_and_idempotent() {
        let origin = GeoPoint::new(38.58, -121.49);
        let nearby = spatial::destination(origin, 45.0, 2_000.0);
        let window = TimeWindow::from_hours(9, 13);
        let forward = vec![plume_at(1, origin, window), plume_at(2, nearby, window)];
        let reversed = vec![plume_at(2, nearby, window), plume_at(1, origin, window)];

        let config = PredictorConfig::default();
        let cancel = CancellationToken::new();
        let a = detect(&forward, &config, &cancel).expect("detect");
        let b = detect(&reversed, &config, &cancel).expect("detect");
        let keys_a: Vec<_> = a.iter().map(Conflict::pair_key).collect();
        let keys_b: Vec<_> = b.iter().map(Conflict::pair_key).collect();
        assert_eq!(keys_a, keys_b);

        let again = detect(&forward, &config, &cancel).expect("detect");
        let keys_again: Vec<_> = again.iter().map(Conflict::pair_key).collect();
        assert_eq!(keys_a, keys_again);
    }

    #[test]
    fn disjoint_windows_do_not_conflict() {
        let origin = GeoPoint::new(38.58, -121.49);
        let nearby = spatial::destination(origin, 45.0, 2_000.0);
        // Second window starts 3h after the first ends; the 2h persistence
        // extension does not bridge the gap.
        let plumes = vec![
            plume_at(1, origin, TimeWindow::from_hours(6, 9)),
            plume_at(2, nearby, TimeWindow::from_hours(14, 17)),
        ];
        let conflicts = detect(&plumes, &PredictorConfig::default(), &CancellationToken::new())
            .expect("detection");
        assert!(conflicts.is_empty());
    }

    #[test]
    fn persistence_extension_bridges_adjacent_windows() {
        let origin = GeoPoint::new(38.58, -121.49);
        let nearby = spatial::destination(origin, 45.0, 2_000.0);
        // [6,9) and [10,13): 2h persistence extends the first to 11:00.
        let plumes = vec![
            plume_at(1, origin, TimeWindow::from_hours(6, 9)),
            plume_at(2, nearby, TimeWindow::from_hours(10, 13)),
        ];
        let conflicts = detect(&plumes, &PredictorConfig::default(), &CancellationToken::new())
            .expect("detection");
        assert_eq!(conflicts.len(), 1);
    }

    #[test]
    fn far_apart_burns_do_not_conflict() {
        let origin = GeoPoint::new(38.58, -121.49);
        let far = spatial::destination(origin, 0.0, 120_000.0);
        let window = TimeWindow::from_hours(9, 13);
        let plumes = vec![plume_at(1, origin, window), plume_at(2, far, window)];
        let conflicts = detect(&plumes, &PredictorConfig::default(), &CancellationToken::new())
            .expect("detection");
        assert!(conflicts.is_empty());
    }

    #[test]
    fn emission_rule_boundaries() {
        assert!(!should_emit(34.9, 0.05));
        assert!(!should_emit(35.0, 0.05)); // strictly greater-than
        assert!(should_emit(35.1, 0.05));
        assert!(should_emit(10.0, 0.2)); // area alone can emit
    }

    #[test]
    fn cancelled_token_aborts_detection() {
        let origin = GeoPoint::new(38.58, -121.49);
        let nearby = spatial::destination(origin, 45.0, 1_000.0);
        let window = TimeWindow::from_hours(9, 13);
        let plumes = vec![plume_at(1, origin, window), plume_at(2, nearby, window)];
        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = detect(&plumes, &PredictorConfig::default(), &cancel).unwrap_err();
        assert_eq!(err.kind, crate::error::ErrorKind::Cancelled);
    }
}
