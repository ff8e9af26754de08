//! 32-d terrain embedding.
//!
//! Layout (stable across runs):
//! - 0:  longitude, normalized to [0, 1]
//! - 1:  latitude, normalized to [0, 1]
//! - 2:  acreage, min(acres/1000, 1)
//! - 3:  window start hour / 24
//! - 4:  window length / 12 h
//! - 5-14: crop one-hot (10 slots)
//! - 15: burn month / 12
//! - 16: fuel load / 50 t/ha
//! - 17-31: semantic dims from the external text-embedding provider;
//!          zero-filled when the provider is unavailable.
//!
//! The vector is unit-normalized at the end. If the magnitude is zero the
//! pre-normalized (all near-zero) vector is returned as-is.

use chrono::Datelike;

use crate::config::defaults::ACRES_PER_HECTARE;
use crate::embedding::EmbeddingProvider;
use crate::types::{normalize_in_place, GeoPoint, TERRAIN_DIMS};

use super::validation::ValidatedSubmission;

/// Number of semantic dims taken from the provider.
pub const SEMANTIC_DIMS: usize = 15;
/// First semantic dim index.
pub const SEMANTIC_OFFSET: usize = TERRAIN_DIMS - SEMANTIC_DIMS;

/// Deterministic structural block (dims 0-16) for a submission.
pub fn structural_block(submission: &ValidatedSubmission, centroid: GeoPoint) -> Vec<f32> {
    let mut v = vec![0.0_f32; TERRAIN_DIMS];

    v[0] = (((centroid.lon + 180.0) / 360.0).clamp(0.0, 1.0)) as f32;
    v[1] = (((centroid.lat + 90.0) / 180.0).clamp(0.0, 1.0)) as f32;
    v[2] = ((submission.area_hectares * ACRES_PER_HECTARE / 1_000.0).min(1.0)) as f32;
    v[3] = submission.window.start_minute as f32 / (24.0 * 60.0);
    v[4] = (submission.window.duration_hours() / 12.0).min(1.0) as f32;
    v[5 + submission.crop_type.one_hot_index()] = 1.0;
    v[15] = submission.burn_date.month() as f32 / 12.0;
    v[16] = ((submission.fuel_load_t_per_ha / 50.0).min(1.0)) as f32;

    v
}

/// Human-readable description fed to the embedding provider.
pub fn describe(submission: &ValidatedSubmission, centroid: GeoPoint) -> String {
    format!(
        "{} field of {:.0} hectares near ({:.3}, {:.3}), fuel load {:.1} t/ha, \
         burn window {} on {}",
        submission.crop_type,
        submission.area_hectares,
        centroid.lat,
        centroid.lon,
        submission.fuel_load_t_per_ha,
        submission.window.format(),
        submission.burn_date,
    )
}

/// Build the full terrain vector. Provider failure degrades to a zero
/// semantic block; the submission still succeeds.
pub async fn terrain_vector(
    submission: &ValidatedSubmission,
    centroid: GeoPoint,
    provider: &dyn EmbeddingProvider,
) -> Vec<f32> {
    let mut v = structural_block(submission, centroid);

    if provider.is_configured() {
        match provider.embed(&describe(submission, centroid), SEMANTIC_DIMS).await {
            Ok(semantic) => {
                for (slot, value) in v[SEMANTIC_OFFSET..].iter_mut().zip(semantic.iter()) {
                    *slot = *value;
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "embedding provider failed — semantic dims zeroed");
            }
        }
    }

    normalize_in_place(&mut v);
    v
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::coordinator::validation::{sample_submission, validate};
    use crate::embedding::NullEmbeddingProvider;
    use crate::types::is_unit_or_zero;

    fn submission() -> ValidatedSubmission {
        let today = chrono::NaiveDate::from_ymd_opt(2026, 8, 1).expect("valid date");
        validate(&sample_submission(today), today).expect("valid")
    }

    #[tokio::test]
    async fn vector_has_right_shape_and_norm() {
        let s = submission();
        let centroid = s.field_boundary.centroid();
        let v = terrain_vector(&s, centroid, &NullEmbeddingProvider).await;
        assert_eq!(v.len(), TERRAIN_DIMS);
        assert!(v.iter().all(|x| x.is_finite()));
        assert!(is_unit_or_zero(&v));
        // Semantic block zeroed with the null provider
        assert!(v[SEMANTIC_OFFSET..].iter().all(|x| *x == 0.0));
    }

    #[tokio::test]
    async fn determinism_for_identical_input() {
        let s = submission();
        let centroid = s.field_boundary.centroid();
        let a = terrain_vector(&s, centroid, &NullEmbeddingProvider).await;
        let b = terrain_vector(&s, centroid, &NullEmbeddingProvider).await;
        assert_eq!(a, b);
    }

    #[test]
    fn crop_one_hot_is_exclusive() {
        let s = submission();
        let v = structural_block(&s, s.field_boundary.centroid());
        let ones: Vec<usize> = (5..15).filter(|i| v[*i] == 1.0).collect();
        assert_eq!(ones.len(), 1);
        assert_eq!(ones[0], 5 + s.crop_type.one_hot_index());
    }
}
