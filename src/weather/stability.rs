//! Pasquill–Gifford stability classification.
//!
//! Deterministic classification from 10 m wind speed, solar insolation
//! (approximated from hour of day, cloud cover, and season) and day/night.
//! Pure functions, no I/O.

use crate::types::StabilityClass;

/// Solar insolation category used by the classic PG table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Insolation {
    Strong,
    Moderate,
    Slight,
    NightThinOvercast,
    NightClear,
}

/// Approximate solar elevation proxy in [0, 1] for an hour of (local) day
/// and month. Peaks at solar noon, higher in summer.
fn solar_elevation_proxy(hour: u32, month: u32) -> f64 {
    if !(6..=18).contains(&hour) {
        return 0.0;
    }
    let day_fraction = (hour as f64 - 6.0) / 12.0;
    let diurnal = (std::f64::consts::PI * day_fraction).sin();
    // Seasonal amplitude: ~1.0 in June/July, ~0.55 in December/January
    // (northern-hemisphere convention; magnitude only matters relatively).
    let seasonal = 0.775 + 0.225 * ((month as f64 - 6.5) / 6.0 * std::f64::consts::PI).cos();
    (diurnal * seasonal).clamp(0.0, 1.0)
}

fn insolation(hour: u32, month: u32, cloud_cover_pct: f64) -> Insolation {
    let elevation = solar_elevation_proxy(hour, month);
    if elevation <= 0.0 {
        // Night: ≥4/8 cloud keeps the surface layer from decoupling.
        return if cloud_cover_pct >= 50.0 {
            Insolation::NightThinOvercast
        } else {
            Insolation::NightClear
        };
    }
    // Cloud attenuates incoming radiation.
    let effective = elevation * (1.0 - 0.65 * (cloud_cover_pct / 100.0));
    if effective > 0.55 {
        Insolation::Strong
    } else if effective > 0.25 {
        Insolation::Moderate
    } else {
        Insolation::Slight
    }
}

/// Classify stability from 10 m wind speed (m/s), hour of day, month, and
/// cloud cover. The standard PG lookup with A-B/B-C midpoints resolved
/// toward the less stable class.
pub fn stability_class(
    wind_speed_ms: f64,
    hour: u32,
    month: u32,
    cloud_cover_pct: f64,
) -> StabilityClass {
    use Insolation::{Moderate, NightClear, NightThinOvercast, Slight, Strong};
    use StabilityClass::{A, B, C, D, E, F};

    let ins = insolation(hour, month, cloud_cover_pct);
    match ins {
        Strong => match wind_speed_ms {
            w if w < 2.0 => A,
            w if w < 3.0 => A,
            w if w < 5.0 => B,
            w if w < 6.0 => C,
            _ => C,
        },
        Moderate => match wind_speed_ms {
            w if w < 2.0 => A,
            w if w < 3.0 => B,
            w if w < 5.0 => B,
            w if w < 6.0 => C,
            _ => D,
        },
        Slight => match wind_speed_ms {
            w if w < 2.0 => B,
            w if w < 3.0 => C,
            w if w < 5.0 => C,
            _ => D,
        },
        NightThinOvercast => match wind_speed_ms {
            w if w < 3.0 => E,
            w if w < 5.0 => D,
            _ => D,
        },
        NightClear => match wind_speed_ms {
            w if w < 3.0 => F,
            w if w < 5.0 => E,
            _ => D,
        },
    }
}

/// Representative mixing height for a stability class, meters. Low values
/// inhibit vertical dispersion.
pub fn mixing_height_m(class: StabilityClass) -> f64 {
    match class {
        StabilityClass::A => 2_000.0,
        StabilityClass::B => 1_500.0,
        StabilityClass::C => 1_200.0,
        StabilityClass::D => 800.0,
        StabilityClass::E => 400.0,
        StabilityClass::F => 200.0,
    }
}

/// Magnus-formula dew point from temperature (°C) and relative humidity
/// (%). Clamped humidity keeps the log defined.
pub fn dew_point_c(temperature_c: f64, humidity_pct: f64) -> f64 {
    const A: f64 = 17.62;
    const B: f64 = 243.12;
    let rh = (humidity_pct / 100.0).clamp(0.01, 1.0);
    let gamma = (A * temperature_c) / (B + temperature_c) + rh.ln();
    B * gamma / (A - gamma)
}
