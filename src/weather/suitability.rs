//! Burn suitability scoring.
//!
//! Hard pass bands gate `suitable`; soft per-factor scores inside the
//! bands multiply into the overall score. A single hard failure makes the
//! verdict unsuitable regardless of the other factors.

use crate::config::defaults::{
    HUMIDITY_SUITABLE_MAX_PCT, HUMIDITY_SUITABLE_MIN_PCT, VISIBILITY_MIN_KM, WIND_SUITABLE_MAX_MS,
    WIND_SUITABLE_MIN_MS,
};
use crate::types::{BurnSuitability, StabilityClass, SuitabilityFactor, WeatherObservation};

/// Plateau score: 1.0 in the comfortable middle of [min, max], tapering
/// linearly to 0.2 at the band edges, 0.0 outside.
fn band_score(value: f64, min: f64, max: f64) -> f64 {
    if value < min || value > max {
        return 0.0;
    }
    let span = max - min;
    let margin = span * 0.2;
    let from_edge = (value - min).min(max - value);
    if from_edge >= margin {
        1.0
    } else {
        0.2 + 0.8 * (from_edge / margin)
    }
}

/// Evaluate an observation against the burn bands.
pub fn analyze(obs: &WeatherObservation) -> BurnSuitability {
    let mut factors = Vec::with_capacity(5);

    let wind_pass =
        (WIND_SUITABLE_MIN_MS..=WIND_SUITABLE_MAX_MS).contains(&obs.wind_speed_ms);
    factors.push(SuitabilityFactor {
        name: "windSpeed".to_string(),
        value: obs.wind_speed_ms,
        score: band_score(obs.wind_speed_ms, WIND_SUITABLE_MIN_MS, WIND_SUITABLE_MAX_MS),
        pass: wind_pass,
        detail: format!(
            "{:.1} m/s (band {:.1}-{:.1})",
            obs.wind_speed_ms, WIND_SUITABLE_MIN_MS, WIND_SUITABLE_MAX_MS
        ),
    });

    let humidity_pass =
        (HUMIDITY_SUITABLE_MIN_PCT..=HUMIDITY_SUITABLE_MAX_PCT).contains(&obs.humidity_pct);
    factors.push(SuitabilityFactor {
        name: "humidity".to_string(),
        value: obs.humidity_pct,
        score: band_score(
            obs.humidity_pct,
            HUMIDITY_SUITABLE_MIN_PCT,
            HUMIDITY_SUITABLE_MAX_PCT,
        ),
        pass: humidity_pass,
        detail: format!(
            "{:.0}% (band {:.0}-{:.0}%)",
            obs.humidity_pct, HUMIDITY_SUITABLE_MIN_PCT, HUMIDITY_SUITABLE_MAX_PCT
        ),
    });

    // "No measurable precipitation": trace amounts under 0.1 mm pass.
    let precip_pass = obs.precipitation_mm < 0.1;
    factors.push(SuitabilityFactor {
        name: "precipitation".to_string(),
        value: obs.precipitation_mm,
        score: if precip_pass { 1.0 } else { 0.0 },
        pass: precip_pass,
        detail: format!("{:.1} mm", obs.precipitation_mm),
    });

    let stability_pass = obs.stability != StabilityClass::F;
    factors.push(SuitabilityFactor {
        name: "stability".to_string(),
        value: obs.stability.one_hot_index() as f64,
        score: match obs.stability {
            StabilityClass::F => 0.0,
            StabilityClass::E => 0.4,
            StabilityClass::A => 0.7,
            _ => 1.0,
        },
        pass: stability_pass,
        detail: format!("class {}", obs.stability),
    });

    let visibility_pass = obs.visibility_km >= VISIBILITY_MIN_KM;
    factors.push(SuitabilityFactor {
        name: "visibility".to_string(),
        value: obs.visibility_km,
        score: if visibility_pass {
            (obs.visibility_km / 10.0).clamp(0.3, 1.0)
        } else {
            0.0
        },
        pass: visibility_pass,
        detail: format!("{:.1} km (min {VISIBILITY_MIN_KM})", obs.visibility_km),
    });

    let suitable = factors.iter().all(|f| f.pass);
    let score = if suitable {
        factors.iter().map(|f| f.score).product::<f64>().clamp(0.0, 1.0)
    } else {
        0.0
    };

    BurnSuitability {
        suitable,
        score,
        factors,
        observation_id: Some(obs.id),
    }
}

#[cfg(test)]
pub(crate) fn observation_with(
    wind_ms: f64,
    humidity: f64,
    stability: StabilityClass,
) -> WeatherObservation {
    WeatherObservation {
        id: 1,
        location: crate::types::GeoPoint::new(38.58, -121.49),
        observed_at: 0,
        temperature_c: 22.0,
        humidity_pct: humidity,
        wind_speed_ms: wind_ms,
        wind_direction_deg: 180.0,
        pressure_hpa: 1013.0,
        visibility_km: 10.0,
        cloud_cover_pct: 20.0,
        precipitation_mm: 0.0,
        dew_point_c: 12.0,
        stability,
        mixing_height_m: 800.0,
        is_forecast: false,
        weather_vector: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn moderate_conditions_are_suitable() {
        // 8 mph ≈ 3.6 m/s, 55% humidity, neutral stability
        let verdict = analyze(&observation_with(3.6, 55.0, StabilityClass::D));
        assert!(verdict.suitable);
        assert!(verdict.score > 0.5, "score {}", verdict.score);
    }

    #[test]
    fn dangerous_wind_and_humidity_fail_with_named_factors() {
        // 30 mph ≈ 13.4 m/s, 12% humidity
        let verdict = analyze(&observation_with(13.4, 12.0, StabilityClass::C));
        assert!(!verdict.suitable);
        assert_eq!(verdict.score, 0.0);
        let failing: Vec<&str> = verdict
            .factors
            .iter()
            .filter(|f| !f.pass)
            .map(|f| f.name.as_str())
            .collect();
        assert!(failing.contains(&"windSpeed"));
        assert!(failing.contains(&"humidity"));
    }

    #[test]
    fn calm_air_fails_the_wind_band() {
        let verdict = analyze(&observation_with(0.4, 55.0, StabilityClass::D));
        assert!(!verdict.suitable);
    }

    #[test]
    fn severe_inversion_fails() {
        let verdict = analyze(&observation_with(3.6, 55.0, StabilityClass::F));
        assert!(!verdict.suitable);
        let stability = verdict
            .factors
            .iter()
            .find(|f| f.name == "stability")
            .expect("factor present");
        assert!(!stability.pass);
    }

    #[test]
    fn precipitation_fails() {
        let mut obs = observation_with(3.6, 55.0, StabilityClass::D);
        obs.precipitation_mm = 1.5;
        assert!(!analyze(&obs).suitable);
    }

    #[test]
    fn band_score_tapers_toward_edges() {
        let mid = band_score(4.0, WIND_SUITABLE_MIN_MS, WIND_SUITABLE_MAX_MS);
        let edge = band_score(1.0, WIND_SUITABLE_MIN_MS, WIND_SUITABLE_MAX_MS);
        assert!(mid > edge);
        assert_eq!(band_score(0.5, WIND_SUITABLE_MIN_MS, WIND_SUITABLE_MAX_MS), 0.0);
    }
}
