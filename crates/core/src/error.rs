//! Shared error taxonomy for the RAG core.
//!
//! Every crate-local error (`RagError`, `LlmError`, `ConfigError`) converts into
//! `CoreError` via `From`; the server crate wraps `CoreError` one more hop into an
//! HTTP-facing `ApiError` that maps `code()` to a status.

use thiserror::Error;

/// Stable error codes from the error taxonomy (§7). Text is informational; `code()`
/// is what clients and audit records key on.
#[derive(Error, Debug)]
pub enum CoreError {
    #[error("validation failed: {0}")]
    ValidationFailed(String),

    #[error("tenantId is required")]
    TenantRequired,

    #[error("access denied")]
    AccessDenied,

    #[error("embedding service unavailable: {0}")]
    EmbeddingUnavailable(String),

    #[error("vector/keyword store timed out: {0}")]
    StoreTimeout(String),

    #[error("reranker timed out: {0}")]
    RerankerTimeout(String),

    #[error("llm request timed out: {0}")]
    LlmTimeout(String),

    #[error("store rejected the request: {0}")]
    StoreBadRequest(String),

    #[error("llm returned a malformed response: {0}")]
    LlmBadResponse(String),

    #[error("embedding dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("filter structure invalid: {0}")]
    FilterStructureInvalid(String),

    #[error("citation references a passage not present in the context pack: {0}")]
    CitationInconsistent(String),

    #[error("client disconnected")]
    ClientDisconnected,

    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// The stable string code used in audit records and the error envelope (§6, §7).
    pub fn code(&self) -> &'static str {
        match self {
            Self::ValidationFailed(_) => "VALIDATION_FAILED",
            Self::TenantRequired => "TENANT_REQUIRED",
            Self::AccessDenied => "ACCESS_DENIED",
            Self::EmbeddingUnavailable(_) => "EMBEDDING_UNAVAILABLE",
            Self::StoreTimeout(_) => "STORE_TIMEOUT",
            Self::RerankerTimeout(_) => "RERANKER_TIMEOUT",
            Self::LlmTimeout(_) => "LLM_TIMEOUT",
            Self::StoreBadRequest(_) => "STORE_BAD_REQUEST",
            Self::LlmBadResponse(_) => "LLM_BAD_RESPONSE",
            Self::DimensionMismatch { .. } => "DIMENSION_MISMATCH",
            Self::FilterStructureInvalid(_) => "FILTER_STRUCTURE_INVALID",
            Self::CitationInconsistent(_) => "CITATION_INCONSISTENT",
            Self::ClientDisconnected => "CLIENT_DISCONNECTED",
            Self::Internal(_) => "INTERNAL",
        }
    }

    /// Whether this error is the kind the orchestrator treats as a recoverable,
    /// single-stage degradation rather than a fatal invariant violation.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::EmbeddingUnavailable(_)
                | Self::StoreTimeout(_)
                | Self::RerankerTimeout(_)
                | Self::LlmTimeout(_)
        )
    }
}
