//! Embedding Client (C1, §4.1).
//!
//! `embed(text) -> vector[dim]` against an Ollama-compatible `/api/embed` endpoint.
//! `dim` is fixed at process start from configuration and must match the vector
//! store collection (checked by [`ragcore_config::Settings::validate`]).

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::RagError;

#[derive(Debug, Clone)]
pub struct EmbeddingClientConfig {
    pub endpoint: String,
    pub model: String,
    pub dim: usize,
    pub timeout_ms: u64,
    /// Whether to L2-normalize before returning (the store uses cosine distance).
    pub normalize: bool,
}

impl Default for EmbeddingClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:11434".to_string(),
            model: "nomic-embed-text".to_string(),
            dim: 768,
            timeout_ms: 3_000,
            normalize: true,
        }
    }
}

impl From<&ragcore_config::EmbeddingConfig> for EmbeddingClientConfig {
    fn from(cfg: &ragcore_config::EmbeddingConfig) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            model: cfg.model.clone(),
            dim: cfg.dim,
            timeout_ms: cfg.timeout_ms,
            normalize: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct EmbedRequest<'a> {
    model: &'a str,
    input: &'a str,
}

#[derive(Debug, Deserialize)]
struct EmbedResponse {
    embeddings: Vec<Vec<f32>>,
}

/// External embedding service client. A network or HTTP error surfaces as
/// `RagError::EmbeddingUnavailable`, which the orchestrator treats as a non-retriable
/// stage failure and falls back to keyword-only retrieval (§7).
pub struct EmbeddingClient {
    client: Client,
    config: EmbeddingClientConfig,
}

impl EmbeddingClient {
    pub fn new(config: EmbeddingClientConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::Embedding(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn dim(&self) -> usize {
        self.config.dim
    }

    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        let request = EmbedRequest {
            model: &self.config.model,
            input: text,
        };
        let url = format!("{}/api/embed", self.config.endpoint.trim_end_matches('/'));

        let response = self
            .client
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(|e| RagError::Embedding(format!("embedding request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Embedding(format!(
                "embedding service returned {status}: {body}"
            )));
        }

        let parsed: EmbedResponse = response
            .json()
            .await
            .map_err(|e| RagError::Embedding(format!("malformed embedding response: {e}")))?;

        let mut vector = parsed
            .embeddings
            .into_iter()
            .next()
            .ok_or_else(|| RagError::Embedding("embedding service returned no vectors".to_string()))?;

        if vector.len() != self.config.dim {
            return Err(RagError::DimensionMismatch {
                expected: self.config.dim,
                actual: vector.len(),
            });
        }

        if self.config.normalize {
            l2_normalize(&mut vector);
        }

        Ok(vector)
    }

    /// Embed several texts, used by section reconstruction to batch sibling lookups
    /// when a fresh query vector is needed per part.
    pub async fn embed_batch(&self, texts: &[&str]) -> Result<Vec<Vec<f32>>, RagError> {
        let mut out = Vec::with_capacity(texts.len());
        for text in texts {
            out.push(self.embed(text).await?);
        }
        Ok(out)
    }
}

fn l2_normalize(vector: &mut [f32]) {
    let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in vector.iter_mut() {
            *v /= norm;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_has_nonzero_dim() {
        let config = EmbeddingClientConfig::default();
        assert!(config.dim > 0);
    }

    #[test]
    fn l2_normalize_yields_unit_vector() {
        let mut v = vec![3.0, 4.0];
        l2_normalize(&mut v);
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-5);
    }

    #[test]
    fn l2_normalize_leaves_zero_vector_unchanged() {
        let mut v = vec![0.0, 0.0];
        l2_normalize(&mut v);
        assert_eq!(v, vec![0.0, 0.0]);
    }
}
