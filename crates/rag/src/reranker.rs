//! Reranker Client (C6, §4.4).
//!
//! Cross-encoder call over the top-N fused passages. Implemented as an HTTP
//! JSON client in the same shape as [`crate::embedding::EmbeddingClient`] —
//! the collaborator contract (`rerank(query, passages) -> {id, score}[]`,
//! §6) names a network service, not an in-process model.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

use ragcore_core::Passage;

use crate::RagError;

#[derive(Debug, Clone)]
pub struct RerankerClientConfig {
    pub endpoint: String,
    pub timeout_ms: u64,
    pub candidate_cap: usize,
    pub final_top_k: usize,
}

impl Default for RerankerClientConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:8090".to_string(),
            timeout_ms: 5_000,
            candidate_cap: 20,
            final_top_k: 8,
        }
    }
}

impl From<&ragcore_config::RerankerConfig> for RerankerClientConfig {
    fn from(cfg: &ragcore_config::RerankerConfig) -> Self {
        Self {
            endpoint: cfg.url.clone(),
            timeout_ms: cfg.timeout_ms,
            candidate_cap: cfg.candidate_cap,
            final_top_k: cfg.final_top_k,
        }
    }
}

#[derive(Debug, Serialize)]
struct RerankPassage<'a> {
    id: &'a str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct RerankRequest<'a> {
    query: &'a str,
    passages: Vec<RerankPassage<'a>>,
}

#[derive(Debug, Deserialize)]
struct RerankResultItem {
    id: String,
    score: f32,
}

#[derive(Debug, Deserialize)]
struct RerankResponse {
    results: Vec<RerankResultItem>,
}

pub struct RerankerClient {
    client: Client,
    config: RerankerClientConfig,
}

impl RerankerClient {
    pub fn new(config: RerankerClientConfig) -> Result<Self, RagError> {
        let client = Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| RagError::Reranker(e.to_string()))?;
        Ok(Self { client, config })
    }

    /// Rerank up to `candidate_cap` fused passages, resort by `rerankerScore`,
    /// and truncate to `final_top_k`. On timeout or HTTP failure the caller
    /// must bypass — not retry — and keep the fused order (§4.4); this
    /// function only ever returns `Err` for that reason, never retries
    /// internally.
    pub async fn rerank(&self, query: &str, passages: &[Passage]) -> Result<Vec<Passage>, RagError> {
        let candidates: Vec<&Passage> = passages.iter().take(self.config.candidate_cap).collect();
        let request = RerankRequest {
            query,
            passages: candidates.iter().map(|p| RerankPassage { id: &p.id, content: &p.content }).collect(),
        };

        let response = self
            .client
            .post(&self.config.endpoint)
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(RagError::Reranker(format!("reranker returned {status}: {body}")));
        }

        let parsed: RerankResponse = response
            .json()
            .await
            .map_err(|e| RagError::Reranker(format!("malformed reranker response: {e}")))?;

        let scores: std::collections::HashMap<String, f32> = parsed.results.into_iter().map(|r| (r.id, r.score)).collect();

        let mut reranked: Vec<Passage> = candidates
            .into_iter()
            .filter_map(|p| {
                scores.get(&p.id).map(|&score| {
                    let mut p = p.clone();
                    p.reranker_score = Some(score);
                    p.final_score = score;
                    p
                })
            })
            .collect();

        reranked.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap());
        reranked.truncate(self.config.final_top_k);
        Ok(reranked)
    }
}

fn classify_reqwest_error(err: reqwest::Error) -> RagError {
    if err.is_timeout() {
        RagError::RerankerTimeout(err.to_string())
    } else {
        RagError::Reranker(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_caps_candidates_at_twenty() {
        assert_eq!(RerankerClientConfig::default().candidate_cap, 20);
    }

    #[test]
    fn config_default_final_top_k_is_eight() {
        assert_eq!(RerankerClientConfig::default().final_top_k, 8);
    }
}
