//! Plume polygon geometry.
//!
//! A wind-oriented fan anchored at the field centroid: along-wind length
//! and half-angle are functions of wind speed and stability class, the
//! polygon is clipped to `r_max`, and calm air (< 1 m/s) degenerates to a
//! circle with no preferred direction. All produced rings are simple and
//! closed.

use crate::config::defaults::{CALM_PLUME_RADIUS_KM, CALM_WIND_MS};
use crate::store::spatial;
use crate::types::{GeoPoint, PolygonRing, StabilityClass};

/// Arc sample count across the fan mouth.
const ARC_POINTS: usize = 9;
/// Sample count for the calm-air circle.
const CIRCLE_POINTS: usize = 16;

/// Fan geometry descriptor.
#[derive(Debug, Clone, Copy)]
pub struct FanShape {
    pub length_km: f64,
    pub half_angle_deg: f64,
    /// True when the plume is a calm-air circle.
    pub calm: bool,
}

/// Along-wind reach (km) before clipping. Stable classes carry smoke
/// farther; wind stretches the plume.
fn raw_length_km(wind_ms: f64, class: StabilityClass) -> f64 {
    let stability_reach = match class {
        StabilityClass::A => 4.0,
        StabilityClass::B => 6.0,
        StabilityClass::C => 8.0,
        StabilityClass::D => 12.0,
        StabilityClass::E => 16.0,
        StabilityClass::F => 20.0,
    };
    stability_reach + 2.5 * wind_ms
}

/// Fan half-angle (degrees). Unstable air fans smoke wide; strong wind
/// narrows the cone.
fn half_angle_deg(wind_ms: f64, class: StabilityClass) -> f64 {
    let base = match class {
        StabilityClass::A => 35.0,
        StabilityClass::B => 30.0,
        StabilityClass::C => 25.0,
        StabilityClass::D => 20.0,
        StabilityClass::E => 12.0,
        StabilityClass::F => 8.0,
    };
    (base * (1.0 + 1.0 / (1.0 + wind_ms))).clamp(5.0, 45.0)
}

/// Compute the fan shape for the given conditions, clipped to `r_max_km`.
pub fn fan_shape(wind_ms: f64, class: StabilityClass, r_max_km: f64) -> FanShape {
    if wind_ms < CALM_WIND_MS {
        return FanShape {
            length_km: CALM_PLUME_RADIUS_KM.min(r_max_km),
            half_angle_deg: 180.0,
            calm: true,
        };
    }
    FanShape {
        length_km: raw_length_km(wind_ms, class).min(r_max_km).max(0.5),
        half_angle_deg: half_angle_deg(wind_ms, class),
        calm: false,
    }
}

/// Build the plume ring anchored at `centroid`, oriented along
/// `downwind_bearing_deg`.
pub fn plume_ring(centroid: GeoPoint, downwind_bearing_deg: f64, shape: &FanShape) -> PolygonRing {
    if shape.calm {
        return circle_ring(centroid, shape.length_km * 1_000.0);
    }

    let length_m = shape.length_km * 1_000.0;
    let mut points = Vec::with_capacity(ARC_POINTS + 2);
    points.push(centroid);

    // Arc from -θ to +θ around the downwind bearing, at full reach.
    for i in 0..ARC_POINTS {
        let t = i as f64 / (ARC_POINTS - 1) as f64;
        let offset = -shape.half_angle_deg + 2.0 * shape.half_angle_deg * t;
        let bearing = (downwind_bearing_deg + offset).rem_euclid(360.0);
        points.push(spatial::destination(centroid, bearing, length_m));
    }

    points.push(centroid);
    PolygonRing::new(points)
}

fn circle_ring(center: GeoPoint, radius_m: f64) -> PolygonRing {
    let mut points = Vec::with_capacity(CIRCLE_POINTS + 1);
    for i in 0..CIRCLE_POINTS {
        let bearing = 360.0 * i as f64 / CIRCLE_POINTS as f64;
        points.push(spatial::destination(center, bearing, radius_m));
    }
    points.push(points[0]);
    PolygonRing::new(points)
}
