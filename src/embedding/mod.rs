//! External text-embedding provider seam.
//!
//! Only the 15 semantic dims of the terrain vector come from here; every
//! other embedding dimension in the system is computed deterministically
//! in-process. Provider failure is always recoverable — the coordinator
//! zero-fills the semantic block and the submission proceeds.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

use crate::error::{AppError, Result};

/// Produces a fixed-length embedding for a text description.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embed `text` into exactly `dims` components. Implementations
    /// truncate or pad their native dimensionality.
    async fn embed(&self, text: &str, dims: usize) -> Result<Vec<f32>>;

    /// Whether this provider can actually produce embeddings.
    fn is_configured(&self) -> bool {
        true
    }
}

/// Stand-in used when no provider is configured: always returns zeros.
pub struct NullEmbeddingProvider;

#[async_trait]
impl EmbeddingProvider for NullEmbeddingProvider {
    async fn embed(&self, _text: &str, dims: usize) -> Result<Vec<f32>> {
        Ok(vec![0.0; dims])
    }

    fn is_configured(&self) -> bool {
        false
    }
}

/// HTTP embedding provider speaking the common
/// `POST {url} {"input": "..."} -> {"embedding": [...]}` shape.
pub struct HttpEmbeddingProvider {
    client: reqwest::Client,
    url: String,
    api_key: Option<String>,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    embedding: Vec<f32>,
}

impl HttpEmbeddingProvider {
    pub fn new(url: String, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| AppError::internal(format!("embedding client: {e}")))?;
        Ok(Self { client, url, api_key })
    }
}

#[async_trait]
impl EmbeddingProvider for HttpEmbeddingProvider {
    async fn embed(&self, text: &str, dims: usize) -> Result<Vec<f32>> {
        let mut request = self
            .client
            .post(&self.url)
            .json(&serde_json::json!({ "input": text }));
        if let Some(ref key) = self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(AppError::upstream(format!(
                "embedding provider returned {}",
                response.status()
            )));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| AppError::upstream(format!("embedding response: {e}")))?;

        let mut out = body.embedding;
        out.resize(dims, 0.0);
        Ok(out)
    }
}
