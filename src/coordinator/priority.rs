//! Deterministic priority scoring.
//!
//! A weighted sum of six factors, each on a 0-10 scale, clamped to [1, 10]
//! and rounded to an integer. Weights come from config and must sum to 1.
//! An operator override blends as `0.7·computed + 0.3·override`.

use crate::config::defaults::ACRES_PER_HECTARE;
use crate::config::PriorityWeights;
use crate::types::{CropType, TimeWindow};

/// Inputs beyond the request itself. Both factors default to 5.0 when no
/// data source is available.
#[derive(Debug, Clone, Copy)]
pub struct PriorityContext {
    /// 0-10, from a population raster when available.
    pub proximity_to_population: f64,
    /// 0-10, per-crop completion average from history.
    pub historical_success: f64,
}

impl Default for PriorityContext {
    fn default() -> Self {
        Self {
            proximity_to_population: 5.0,
            historical_success: 5.0,
        }
    }
}

/// Compute the integer priority score in [1, 10].
pub fn compute_priority(
    weights: &PriorityWeights,
    area_hectares: f64,
    crop: CropType,
    window: &TimeWindow,
    ctx: &PriorityContext,
    override_priority: Option<u8>,
) -> u8 {
    let acres = area_hectares * ACRES_PER_HECTARE;
    let acreage_term = (acres / 1_000.0).min(1.0) * 10.0;
    let window_flex = (window.duration_hours() / 8.0).min(1.0) * 10.0;

    let computed = acreage_term * weights.acreage
        + crop.priority_rank() * weights.crop_rank
        + window_flex * weights.window_flex
        + crop.weather_sensitivity() * weights.weather_sensitivity
        + ctx.proximity_to_population * weights.proximity_to_population
        + ctx.historical_success * weights.historical_success;

    let blended = match override_priority {
        Some(p) => 0.7 * computed + 0.3 * f64::from(p),
        None => computed,
    };

    blended.round().clamp(1.0, 10.0) as u8
}
