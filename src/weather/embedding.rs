//! 128-d weather embedding.
//!
//! A fixed feature map: each continuous variable projects onto a small
//! block of evenly spaced radial basis centers, categorical stability is
//! one-hot, and a handful of raw normalized values, cyclical time
//! encodings and flags fill the tail. Unit-normalized at the end.
//!
//! Block layout (stable across runs):
//! ```text
//!   0- 11  temperature RBF      (-10..45 °C)
//!  12- 23  humidity RBF         (0..100 %)
//!  24- 35  wind speed RBF       (0..20 m/s)
//!  36- 37  wind direction sin/cos
//!  38- 45  wind direction octant one-hot
//!  46- 55  pressure RBF         (950..1050 hPa)
//!  56- 63  visibility RBF       (0..20 km)
//!  64- 71  cloud cover RBF      (0..100 %)
//!  72- 79  precipitation RBF    (0..20 mm)
//!  80- 89  dew point RBF        (-10..30 °C)
//!  90- 99  mixing height RBF    (0..3000 m)
//! 100-105  stability one-hot
//! 106-114  raw normalized values (temp, humidity, wind, pressure,
//!          visibility, cloud, precip, dew point, mixing height)
//! 115-116  hour-of-day sin/cos
//! 117-118  day-of-year sin/cos
//! 119      forecast flag
//! 120-123  season one-hot
//! 124      day flag (06-18)
//! 125      calm flag (wind < 1 m/s)
//! 126      measurable-precipitation flag
//! 127      red-flag conditions flag
//! ```

use chrono::{Datelike, TimeZone, Timelike, Utc};

use crate::config::defaults::{CALM_WIND_MS, RED_FLAG_HUMIDITY_PCT, RED_FLAG_WIND_MS};
use crate::types::{normalize_in_place, WeatherObservation, WEATHER_DIMS};

/// Write an RBF block for `value` over `[min, max]` into `out`.
/// Gamma is tied to center spacing so adjacent centers overlap mildly.
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

fn norm(value: f64, min: f64, max: f64) -> f32 {
    (((value - min) / (max - min)).clamp(0.0, 1.0)) as f32
}

/// Build the 128-d embedding for an observation.
pub fn weather_vector(obs: &WeatherObservation) -> Vec<f32> {
    let mut v = vec![0.0_f32; WEATHER_DIMS];

    rbf_block(&mut v[0..12], obs.temperature_c, -10.0, 45.0);
    rbf_block(&mut v[12..24], obs.humidity_pct, 0.0, 100.0);
    rbf_block(&mut v[24..36], obs.wind_speed_ms, 0.0, 20.0);

    let dir_rad = obs.wind_direction_deg.to_radians();
    v[36] = dir_rad.sin() as f32;
    v[37] = dir_rad.cos() as f32;
    let octant = ((obs.wind_direction_deg.rem_euclid(360.0) + 22.5) / 45.0) as usize % 8;
    v[38 + octant] = 1.0;

    rbf_block(&mut v[46..56], obs.pressure_hpa, 950.0, 1_050.0);
    rbf_block(&mut v[56..64], obs.visibility_km, 0.0, 20.0);
    rbf_block(&mut v[64..72], obs.cloud_cover_pct, 0.0, 100.0);
    rbf_block(&mut v[72..80], obs.precipitation_mm, 0.0, 20.0);
    rbf_block(&mut v[80..90], obs.dew_point_c, -10.0, 30.0);
    rbf_block(&mut v[90..100], obs.mixing_height_m, 0.0, 3_000.0);

    v[100 + obs.stability.one_hot_index()] = 1.0;

    v[106] = norm(obs.temperature_c, -10.0, 45.0);
    v[107] = norm(obs.humidity_pct, 0.0, 100.0);
    v[108] = norm(obs.wind_speed_ms, 0.0, 20.0);
    v[109] = norm(obs.pressure_hpa, 950.0, 1_050.0);
    v[110] = norm(obs.visibility_km, 0.0, 20.0);
    v[111] = norm(obs.cloud_cover_pct, 0.0, 100.0);
    v[112] = norm(obs.precipitation_mm, 0.0, 20.0);
    v[113] = norm(obs.dew_point_c, -10.0, 30.0);
    v[114] = norm(obs.mixing_height_m, 0.0, 3_000.0);

    let t = Utc
        .timestamp_micros(obs.observed_at)
        .single()
        .unwrap_or_else(|| Utc.timestamp_micros(0).single().unwrap_or_default());
    let hour_angle = f64::from(t.hour()) / 24.0 * std::f64::consts::TAU;
    v[115] = hour_angle.sin() as f32;
    v[116] = hour_angle.cos() as f32;
    let doy_angle = f64::from(t.ordinal()) / 365.25 * std::f64::consts::TAU;
    v[117] = doy_angle.sin() as f32;
    v[118] = doy_angle.cos() as f32;

    v[119] = if obs.is_forecast { 1.0 } else { 0.0 };

    let season = match t.month() {
        12 | 1 | 2 => 0,
        3..=5 => 1,
        6..=8 => 2,
        _ => 3,
    };
    v[120 + season] = 1.0;

    v[124] = if (6..18).contains(&t.hour()) { 1.0 } else { 0.0 };
    v[125] = if obs.wind_speed_ms < CALM_WIND_MS { 1.0 } else { 0.0 };
    v[126] = if obs.precipitation_mm >= 0.1 { 1.0 } else { 0.0 };
    v[127] = if obs.wind_speed_ms > RED_FLAG_WIND_MS
        && obs.humidity_pct < RED_FLAG_HUMIDITY_PCT
    {
        1.0
    } else {
        0.0
    };

    normalize_in_place(&mut v);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{is_unit_or_zero, StabilityClass};
    use crate::weather::suitability::observation_with;

    #[test]
    fn vector_shape_and_norm() {
        let v = weather_vector(&observation_with(3.6, 55.0, StabilityClass::D));
        assert_eq!(v.len(), WEATHER_DIMS);
        assert!(v.iter().all(|x| x.is_finite()));
        assert!(is_unit_or_zero(&v));
    }

    #[test]
    fn determinism() {
        let obs = observation_with(3.6, 55.0, StabilityClass::D);
        assert_eq!(weather_vector(&obs), weather_vector(&obs));
    }

    #[test]
    fn different_conditions_produce_different_vectors() {
        let mild = weather_vector(&observation_with(3.6, 55.0, StabilityClass::D));
        let harsh = weather_vector(&observation_with(15.0, 10.0, StabilityClass::F));
        let distance = crate::store::cosine_distance(&mild, &harsh);
        assert!(distance > 0.05, "distance {distance}");
    }

    #[test]
    fn rbf_block_peaks_at_value() {
        let mut block = [0.0_f32; 10];
        rbf_block(&mut block, 25.0, 0.0, 100.0);
        let peak = block
            .iter()
            .enumerate()
            .max_by(|a, b| a.1.partial_cmp(b.1).unwrap_or(std::cmp::Ordering::Equal))
            .map(|(i, _)| i)
            .unwrap_or(0);
        // 25 over [0,100] with 10 centers (spacing 11.1): nearest center idx 2
        assert_eq!(peak, 2);
    }
}
