//! 64-d plume embedding.
//!
//! Block allocation (stable within and across runs):
//! ```text
//!   0-15  emission block: RBF over emission rate (8) and area (8)
//!  16-27  stability block: one-hot (6) + one-hot × normalized intensity (6)
//!  28-39  wind block: speed RBF (10) + direction sin/cos (2)
//!  40-51  time-decay basis: concentration retention at 1/2/4/8 h,
//!         3 dims each (value, sqrt, square)
//!  52-63  geometry: length RBF (4), half-angle RBF (4), fan area RBF (4)
//! ```
//! Unit-normalized at the end.

use crate::types::{normalize_in_place, StabilityClass, PLUME_DIMS};

use super::plume::FanShape;

/// Inputs for the embedding, all already computed by the predictor.
#[derive(Debug, Clone, Copy)]
pub struct PlumeFeatures {
    pub emission_g_per_s: f64,
    pub area_hectares: f64,
    pub stability: StabilityClass,
    pub wind_ms: f64,
    pub wind_direction_deg: f64,
    pub shape: FanShape,
    pub affected_area_km2: f64,
}

fn rbf_block(out: &mut [f32], value: f64, min: f64, max: f64) {
    let n = out.len();
    if n == 0 {
        return;
    }
    let spacing = (max - min) / (n.saturating_sub(1).max(1)) as f64;
    let gamma = 1.0 / (2.0 * spacing * spacing).max(1e-9);
    let clamped = value.clamp(min, max);
    for (i, slot) in out.iter_mut().enumerate() {
        let center = min + spacing * i as f64;
        let d = clamped - center;
        *slot = (-gamma * d * d).exp() as f32;
    }
}

/// Smoke retention fraction after `hours`, by stability. Stable air holds
/// smoke near the ground far longer.
fn retention(hours: f64, stability: StabilityClass) -> f64 {
    let half_life_h = match stability {
        StabilityClass::A => 0.75,
        StabilityClass::B => 1.0,
        StabilityClass::C => 1.5,
        StabilityClass::D => 2.0,
        StabilityClass::E => 3.5,
        StabilityClass::F => 5.0,
    };
    0.5_f64.powf(hours / half_life_h)
}

/// Build the 64-d plume vector.
pub fn plume_vector(f: &PlumeFeatures) -> Vec<f32> {
    let mut v = vec![0.0_f32; PLUME_DIMS];

    // Emission block: log-scaled rate, linear area.
    rbf_block(&mut v[0..8], (f.emission_g_per_s.max(0.1)).ln(), -2.0, 8.0);
    rbf_block(&mut v[8..16], f.area_hectares, 0.0, 2_000.0);

    // Stability block.
    let s = f.stability.one_hot_index();
    v[16 + s] = 1.0;
    let intensity = ((f.emission_g_per_s / 500.0).min(1.0)) as f32;
    v[22 + s] = intensity;

    // Wind block.
    rbf_block(&mut v[28..38], f.wind_ms, 0.0, 20.0);
    let dir = f.wind_direction_deg.to_radians();
    v[38] = dir.sin() as f32;
    v[39] = dir.cos() as f32;

    // Time-decay basis at 1/2/4/8 h.
    for (i, hours) in [1.0, 2.0, 4.0, 8.0].iter().enumerate() {
        let r = retention(*hours, f.stability);
        let base = 40 + i * 3;
        v[base] = r as f32;
        v[base + 1] = r.sqrt() as f32;
        v[base + 2] = (r * r) as f32;
    }

    // Geometry block.
    rbf_block(&mut v[52..56], f.shape.length_km, 0.0, 30.0);
    rbf_block(&mut v[56..60], f.shape.half_angle_deg, 0.0, 180.0);
    rbf_block(&mut v[60..64], f.affected_area_km2, 0.0, 500.0);

    normalize_in_place(&mut v);
    v
}
