//! Hybrid retrieval pipeline: embedding, vector/keyword search, access
//! filtering, fusion, reranking, section reconstruction, confidence scoring,
//! the answerability guardrail, and context packing (C1-C10, §4).

pub mod access_filter;
pub mod confidence;
pub mod context_pack;
pub mod embedding;
pub mod fusion;
pub mod guardrail;
pub mod reranker;
pub mod section;
pub mod sparse_search;
pub mod vector_store;

pub use access_filter::{AccessFilter, AccessFilterBuilder, FilterCondition};
pub use embedding::{EmbeddingClient, EmbeddingClientConfig};
pub use fusion::{fuse, FusionConfig as FusionEngineConfig, FusionWeights};
pub use reranker::{RerankerClient, RerankerClientConfig};
pub use sparse_search::{SparseDocument, SparseIndex, SparseIndexConfig};
pub use vector_store::{VectorDistance, VectorStore, VectorStoreConfig};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum RagError {
    #[error("embedding service error: {0}")]
    Embedding(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("vector store connection error: {0}")]
    Connection(String),

    #[error("vector store error: {0}")]
    VectorStore(String),

    #[error("sparse index error: {0}")]
    Index(String),

    #[error("search error: {0}")]
    Search(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("reranker error: {0}")]
    Reranker(String),

    #[error("reranker timed out: {0}")]
    RerankerTimeout(String),
}

impl RagError {
    /// True for errors the orchestrator treats as recoverable (§7): a
    /// non-transient error aborts the request, a transient one degrades —
    /// keyword-only retrieval, bypassed reranking, or a lower confidence tier.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            RagError::Embedding(_)
                | RagError::Connection(_)
                | RagError::Timeout(_)
                | RagError::RerankerTimeout(_)
                | RagError::Reranker(_)
        )
    }
}

impl From<RagError> for ragcore_core::CoreError {
    fn from(err: RagError) -> Self {
        match err {
            RagError::Embedding(msg) => ragcore_core::CoreError::EmbeddingUnavailable(msg),
            RagError::DimensionMismatch { expected, actual } => {
                ragcore_core::CoreError::DimensionMismatch { expected, actual }
            }
            RagError::Timeout(msg) => ragcore_core::CoreError::StoreTimeout(msg),
            RagError::RerankerTimeout(msg) => ragcore_core::CoreError::RerankerTimeout(msg),
            RagError::BadRequest(msg) => ragcore_core::CoreError::StoreBadRequest(msg),
            RagError::Connection(msg) | RagError::VectorStore(msg) | RagError::Index(msg) | RagError::Search(msg) => {
                ragcore_core::CoreError::Internal(msg)
            }
            RagError::Reranker(msg) => ragcore_core::CoreError::Internal(msg),
        }
    }
}
