//! Stage 1: request validation, priority scoring, terrain embedding,
//! persistence.
//!
//! `submit` is the single public operation. It validates, scores, embeds,
//! runs duplicate detection, and persists the request as `pending`. When
//! the caller already holds fresh weather for the site, the initial smoke
//! prediction is computed here too so both rows land in one transaction.

pub mod priority;
pub mod terrain;
pub mod validation;

pub use priority::{compute_priority, PriorityContext};
pub use validation::{SubmitBurnRequest, ValidatedSubmission};

use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::config;
use crate::config::defaults::DUPLICATE_WINDOW_SECS;
use crate::embedding::EmbeddingProvider;
use crate::error::{AppError, Result};
use crate::predictor;
use crate::store::{Store, VectorColumn, VectorMatch};
use crate::types::{
    epoch_micros, BurnRequest, Field, RequestStatus, SmokePrediction, WeatherObservation,
};

/// Result of a successful submission.
#[derive(Debug, Clone)]
pub struct SubmissionOutcome {
    pub request: BurnRequest,
    pub warnings: Vec<String>,
    /// Top-5 terrain-vector neighbors of the new request.
    pub similar: Vec<VectorMatch>,
    /// Where the pipeline takes the request next.
    pub next_stage: &'static str,
}

/// See module docs.
pub struct Coordinator {
    store: Arc<dyn Store>,
    embedding: Arc<dyn EmbeddingProvider>,
}

impl Coordinator {
    pub fn new(store: Arc<dyn Store>, embedding: Arc<dyn EmbeddingProvider>) -> Self {
        Self { store, embedding }
    }

    /// Validate and persist a burn request.
    ///
    /// `cached_weather`, when present, lets the initial smoke prediction
    /// join the request insert in one transaction; otherwise the predictor
    /// stage fills it in asynchronously.
    pub async fn submit(
        &self,
        req: SubmitBurnRequest,
        cached_weather: Option<&WeatherObservation>,
    ) -> Result<SubmissionOutcome> {
        let now = Utc::now();
        let today = now.date_naive();
        let validated = validation::validate(&req, today)?;

        let farm = self
            .store
            .get_farm(validated.farm_id)
            .await
            .map_err(|e| e.context("looking up farm"))?
            .ok_or_else(|| AppError::not_found(format!("farm {} not found", validated.farm_id)))?;

        let field = match self.store.find_field(farm.id, &validated.field_name).await? {
            Some(existing) => existing,
            None => {
                self.store
                    .insert_field(Field {
                        id: 0,
                        farm_id: farm.id,
                        name: validated.field_name.clone(),
                        boundary: validated.field_boundary.clone(),
                        area_hectares: validated.area_hectares,
                        crop_type: validated.crop_type,
                        last_burn_date: None,
                    })
                    .await?
            }
        };

        // Duplicate detection: same (farm, field, date, window start) within
        // the last minute.
        let since = epoch_micros(now) - DUPLICATE_WINDOW_SECS * 1_000_000;
        if let Some(dup) = self
            .store
            .find_duplicate(
                farm.id,
                field.id,
                validated.burn_date,
                validated.window.start_minute,
                since,
            )
            .await?
        {
            return Err(AppError::conflict("duplicate submission")
                .with_details(serde_json::json!({ "duplicate_of": dup })));
        }

        let centroid = validated.field_boundary.centroid();
        let priority = compute_priority(
            &config::get().priority,
            validated.area_hectares,
            validated.crop_type,
            &validated.window,
            &PriorityContext::default(),
            validated.requested_priority,
        );

        let terrain_vector =
            terrain::terrain_vector(&validated, centroid, self.embedding.as_ref()).await;

        let request = BurnRequest {
            id: 0,
            field_id: field.id,
            farm_id: farm.id,
            burn_date: validated.burn_date,
            window: validated.window,
            fuel_load_t_per_ha: validated.fuel_load_t_per_ha,
            area_hectares: validated.area_hectares,
            crop_type: validated.crop_type,
            centroid,
            status: RequestStatus::Pending,
            priority_score: priority,
            terrain_vector: terrain_vector.clone(),
            created_at: epoch_micros(now),
            updated_at: epoch_micros(now),
        };

        let initial_prediction: Option<SmokePrediction> = match cached_weather {
            Some(weather) => {
                match predictor::predict_plume(
                    &request,
                    weather,
                    &config::get().predictor,
                    epoch_micros(now),
                ) {
                    Ok(pred) => Some(pred),
                    Err(e) => {
                        warn!(error = %e, "initial plume prediction failed — deferring to pipeline");
                        None
                    }
                }
            }
            None => None,
        };

        let request = self
            .store
            .insert_request_with_prediction(request, initial_prediction)
            .await
            .map_err(|e| e.context("persisting burn request"))?;

        info!(
            request_id = request.id,
            farm_id = farm.id,
            field_id = field.id,
            priority = request.priority_score,
            date = %request.burn_date,
            "burn request accepted"
        );

        // Neighbor lookup is best-effort; a storage hiccup here must not
        // fail an already-persisted submission.
        let similar = match self
            .store
            .vector_top_k(VectorColumn::Terrain, &terrain_vector, 6)
            .await
        {
            Ok(hits) => hits
                .into_iter()
                .filter(|m| m.id != request.id)
                .take(5)
                .collect(),
            Err(e) => {
                warn!(error = %e, "similar-request lookup failed");
                Vec::new()
            }
        };

        Ok(SubmissionOutcome {
            request,
            warnings: validated.warnings,
            similar,
            next_stage: "weather_analysis",
        })
    }
}
