//! Weather-change detection.
//!
//! A new observation invalidates existing smoke predictions for a site
//! when it differs from the previous one beyond configured thresholds:
//! |Δwind| > 5 m/s, |Δhumidity| > 20 %, or any stability class change.

use crate::config::defaults::{WEATHER_DELTA_HUMIDITY_PCT, WEATHER_DELTA_WIND_MS};
use crate::types::WeatherObservation;

/// What tripped the detector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    WindShift,
    HumiditySwing,
    StabilityFlip,
}

impl ChangeKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ChangeKind::WindShift => "wind_shift",
            ChangeKind::HumiditySwing => "humidity_swing",
            ChangeKind::StabilityFlip => "stability_flip",
        }
    }
}

/// Compare consecutive observations for one site. Returns the first
/// threshold breached, wind > humidity > stability.
pub fn significant_change(
    previous: &WeatherObservation,
    current: &WeatherObservation,
) -> Option<ChangeKind> {
    if (current.wind_speed_ms - previous.wind_speed_ms).abs() > WEATHER_DELTA_WIND_MS {
        return Some(ChangeKind::WindShift);
    }
    if (current.humidity_pct - previous.humidity_pct).abs() > WEATHER_DELTA_HUMIDITY_PCT {
        return Some(ChangeKind::HumiditySwing);
    }
    if current.stability != previous.stability {
        return Some(ChangeKind::StabilityFlip);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::StabilityClass;
    use crate::weather::suitability::observation_with;

    #[test]
    fn small_drift_is_not_significant() {
        let prev = observation_with(4.0, 55.0, StabilityClass::D);
        let mut cur = prev.clone();
        cur.wind_speed_ms = 6.0;
        cur.humidity_pct = 45.0;
        assert_eq!(significant_change(&prev, &cur), None);
    }

    #[test]
    fn wind_jump_trips_first() {
        let prev = observation_with(3.0, 55.0, StabilityClass::D);
        let mut cur = observation_with(9.0, 20.0, StabilityClass::F);
        cur.wind_speed_ms = 9.0;
        assert_eq!(significant_change(&prev, &cur), Some(ChangeKind::WindShift));
    }

    #[test]
    fn humidity_swing_detected() {
        let prev = observation_with(4.0, 60.0, StabilityClass::D);
        let cur = observation_with(4.5, 35.0, StabilityClass::D);
        assert_eq!(
            significant_change(&prev, &cur),
            Some(ChangeKind::HumiditySwing)
        );
    }

    #[test]
    fn stability_flip_detected() {
        let prev = observation_with(4.0, 55.0, StabilityClass::D);
        let cur = observation_with(4.0, 55.0, StabilityClass::F);
        assert_eq!(
            significant_change(&prev, &cur),
            Some(ChangeKind::StabilityFlip)
        );
    }

    #[test]
    fn thresholds_are_exclusive_bounds() {
        let prev = observation_with(4.0, 55.0, StabilityClass::D);
        // Exactly 5 m/s and exactly 20% do not trip
        let cur = observation_with(9.0, 35.0, StabilityClass::D);
        assert_eq!(significant_change(&prev, &cur), None);
    }
}
