//! Vector Search Adapter (C2, §4.2), backed by Qdrant.

use chrono::Utc;
use qdrant_client::qdrant::value::Kind;
use qdrant_client::qdrant::{
    CreateCollectionBuilder, Distance, PointStruct, SearchPointsBuilder, UpsertPointsBuilder,
    VectorParamsBuilder,
};
use qdrant_client::Qdrant;
use std::collections::HashMap;

use ragcore_core::{Passage, PassagePayload, SearchType};

use crate::access_filter::AccessFilter;
use crate::RagError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VectorDistance {
    Cosine,
    Euclidean,
    DotProduct,
}

impl From<VectorDistance> for Distance {
    fn from(d: VectorDistance) -> Self {
        match d {
            VectorDistance::Cosine => Distance::Cosine,
            VectorDistance::Euclidean => Distance::Euclid,
            VectorDistance::DotProduct => Distance::Dot,
        }
    }
}

#[derive(Debug, Clone)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub collection: String,
    pub vector_dim: usize,
    pub distance: VectorDistance,
    pub api_key: Option<String>,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: "http://localhost:6334".to_string(),
            collection: "ragcore_passages".to_string(),
            vector_dim: 768,
            distance: VectorDistance::Cosine,
            api_key: None,
        }
    }
}

impl From<&ragcore_config::VectorStoreConfig> for VectorStoreConfig {
    fn from(cfg: &ragcore_config::VectorStoreConfig) -> Self {
        Self {
            endpoint: cfg.endpoint.clone(),
            collection: cfg.collection.clone(),
            vector_dim: cfg.vector_dim,
            distance: VectorDistance::Cosine,
            api_key: cfg.api_key.clone(),
        }
    }
}

/// Vector store adapter. The one required invariant beyond search correctness:
/// `collection vector dimension` (a static property) must equal the embedding
/// dimension (§6) — checked once at `ensure_collection` time.
pub struct VectorStore {
    client: Qdrant,
    config: VectorStoreConfig,
}

impl VectorStore {
    pub async fn new(config: VectorStoreConfig) -> Result<Self, RagError> {
        let mut builder = Qdrant::from_url(&config.endpoint);
        if let Some(ref api_key) = config.api_key {
            builder = builder.api_key(api_key.clone());
        }
        let client = builder.build().map_err(|e| RagError::Connection(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub async fn ensure_collection(&self) -> Result<(), RagError> {
        let exists = self
            .client
            .collection_exists(&self.config.collection)
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        if !exists {
            self.client
                .create_collection(CreateCollectionBuilder::new(&self.config.collection).vectors_config(
                    VectorParamsBuilder::new(self.config.vector_dim as u64, self.config.distance.into()),
                ))
                .await
                .map_err(|e| RagError::VectorStore(e.to_string()))?;
        }
        Ok(())
    }

    /// Run ANN search against the collection with an optional prefilter (§4.2).
    /// Timeouts surface as `RagError::Timeout`; malformed filters as
    /// `RagError::BadRequest` — both map to fatal stage errors in the orchestrator.
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        filter: Option<AccessFilter>,
    ) -> Result<Vec<Passage>, RagError> {
        let mut builder = SearchPointsBuilder::new(&self.config.collection, query_vector.to_vec(), limit as u64)
            .with_payload(true);

        if let Some(filter) = filter {
            builder = builder.filter(filter.into_qdrant());
        }

        let response = self
            .client
            .search_points(builder)
            .await
            .map_err(|e| classify_qdrant_error(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let score = point.score;
                let id = point_id_to_string(point.id);
                payload_to_passage(id, point.payload, SearchType::VectorOnly, score)
            })
            .collect())
    }

    /// Fetch specific sibling parts by id, used by the Section Reconstructor (C7).
    /// Applies the same tenant/acl prefilter as the originating search so
    /// reconstruction can never cross a tenant or ACL boundary.
    pub async fn scroll_by_ids(&self, ids: &[String], filter: AccessFilter) -> Result<Vec<Passage>, RagError> {
        use qdrant_client::qdrant::condition::ConditionOneOf;
        use qdrant_client::qdrant::r#match::MatchValue;
        use qdrant_client::qdrant::{Condition, FieldCondition, Match, RepeatedStrings, ScrollPointsBuilder};

        let mut qdrant_filter = filter.into_qdrant();
        qdrant_filter.must.push(Condition {
            condition_one_of: Some(ConditionOneOf::Field(FieldCondition {
                key: "id".to_string(),
                r#match: Some(Match {
                    match_value: Some(MatchValue::Keywords(RepeatedStrings { strings: ids.to_vec() })),
                }),
                ..Default::default()
            })),
        });

        let response = self
            .client
            .scroll(ScrollPointsBuilder::new(&self.config.collection).filter(qdrant_filter).with_payload(true))
            .await
            .map_err(|e| classify_qdrant_error(e.to_string()))?;

        Ok(response
            .result
            .into_iter()
            .map(|point| {
                let id = point_id_to_string(point.id);
                payload_to_passage(id, point.payload, SearchType::VectorOnly, 0.0)
            })
            .collect())
    }

    pub async fn upsert(&self, passages: &[Passage], embeddings: &[Vec<f32>]) -> Result<(), RagError> {
        if passages.len() != embeddings.len() {
            return Err(RagError::VectorStore("passage/embedding count mismatch".to_string()));
        }

        let points: Vec<PointStruct> = passages
            .iter()
            .zip(embeddings.iter())
            .map(|(passage, embedding)| {
                let mut payload: HashMap<String, qdrant_client::qdrant::Value> = HashMap::new();
                payload.insert("content".to_string(), passage.content.clone().into());
                payload.insert("tenant_id".to_string(), passage.payload.tenant_id.clone().into());
                payload.insert("doc_id".to_string(), passage.payload.doc_id.clone().into());
                payload.insert("acl".to_string(), passage.payload.acl.clone().into());
                payload.insert("language".to_string(), passage.payload.language.clone().into());
                if let Some(ref section_path) = passage.payload.section_path {
                    payload.insert("section_path".to_string(), section_path.clone().into());
                }
                if let Some(ref url) = passage.payload.url {
                    payload.insert("url".to_string(), url.clone().into());
                }
                if let Some(ref title) = passage.payload.title {
                    payload.insert("title".to_string(), title.clone().into());
                }
                payload.insert("created_at".to_string(), passage.payload.created_at.to_rfc3339().into());
                payload.insert("modified_at".to_string(), passage.payload.modified_at.to_rfc3339().into());

                PointStruct::new(passage.id.clone(), embedding.clone(), payload)
            })
            .collect();

        self.client
            .upsert_points(UpsertPointsBuilder::new(&self.config.collection, points))
            .await
            .map_err(|e| RagError::VectorStore(e.to_string()))?;

        Ok(())
    }
}

fn point_id_to_string(id: Option<qdrant_client::qdrant::PointId>) -> String {
    id.map(|pid| match pid.point_id_options {
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Uuid(u)) => u,
        Some(qdrant_client::qdrant::point_id::PointIdOptions::Num(n)) => n.to_string(),
        None => String::new(),
    })
    .unwrap_or_default()
}

fn payload_to_passage(
    id: String,
    payload: HashMap<String, qdrant_client::qdrant::Value>,
    search_type: SearchType,
    score: f32,
) -> Passage {
    let mut content = String::new();
    let mut tenant_id = String::new();
    let mut doc_id = String::new();
    let mut acl = Vec::new();
    let mut language = "en".to_string();
    let mut section_path = None;
    let mut url = None;
    let mut title = None;
    let mut created_at = Utc::now();
    let mut modified_at = Utc::now();

    for (key, value) in payload {
        match (key.as_str(), value.kind) {
            ("content", Some(Kind::StringValue(s))) => content = s,
            ("tenant_id", Some(Kind::StringValue(s))) => tenant_id = s,
            ("doc_id", Some(Kind::StringValue(s))) => doc_id = s,
            ("acl", Some(Kind::ListValue(list))) => {
                acl = list
                    .values
                    .into_iter()
                    .filter_map(|v| match v.kind {
                        Some(Kind::StringValue(s)) => Some(s),
                        _ => None,
                    })
                    .collect();
            }
            ("language", Some(Kind::StringValue(s))) => language = s,
            ("section_path", Some(Kind::StringValue(s))) => section_path = Some(s),
            ("url", Some(Kind::StringValue(s))) => url = Some(s),
            ("title", Some(Kind::StringValue(s))) => title = Some(s),
            ("created_at", Some(Kind::StringValue(s))) => {
                if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(&s) {
                    created_at = parsed.with_timezone(&Utc);
                }
            }
            ("modified_at", Some(Kind::StringValue(s))) => {
                if let Ok(parsed) = chrono::DateTime::parse_from_rfc3339(&s) {
                    modified_at = parsed.with_timezone(&Utc);
                }
            }
            _ => {}
        }
    }

    Passage {
        id,
        content,
        vector_score: Some(score),
        keyword_score: None,
        fused_score: None,
        reranker_score: None,
        final_score: score,
        search_type,
        payload: PassagePayload {
            tenant_id,
            doc_id,
            acl,
            language,
            section_path,
            created_at,
            modified_at,
            url,
            title,
        },
    }
}

fn classify_qdrant_error(message: String) -> RagError {
    let lower = message.to_lowercase();
    if lower.contains("timeout") || lower.contains("timed out") {
        RagError::Timeout(message)
    } else if lower.contains("invalid") || lower.contains("bad request") || lower.contains("parse") {
        RagError::BadRequest(message)
    } else {
        RagError::VectorStore(message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_uses_cosine() {
        assert_eq!(VectorStoreConfig::default().distance, VectorDistance::Cosine);
    }

    #[test]
    fn distance_conversion_is_total() {
        let _: Distance = VectorDistance::Cosine.into();
        let _: Distance = VectorDistance::Euclidean.into();
        let _: Distance = VectorDistance::DotProduct.into();
    }

    #[test]
    fn timeout_errors_are_classified_transient() {
        match classify_qdrant_error("operation timed out".to_string()) {
            RagError::Timeout(_) => {}
            other => panic!("expected Timeout, got {other:?}"),
        }
    }
}
