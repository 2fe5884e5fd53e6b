//! Retrieval/synthesis HTTP server: orchestrator, SSE framing, routes, and
//! shared application state.

pub mod audit;
pub mod http;
pub mod orchestrator;
pub mod sse;
pub mod state;

pub use http::create_router;
pub use orchestrator::{OrchestratorEvent, RunOutcome};
pub use state::AppState;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;

/// Maps a terminal [`ragcore_core::CoreError`] to the error envelope and
/// status code from §6/§7: `400` validation, `401/403` access, `504`
/// upstream timeouts, `503` degraded services that could not recover, `500`
/// invariant violations.
pub struct ApiError(pub ragcore_core::CoreError);

impl From<ragcore_core::CoreError> for ApiError {
    fn from(err: ragcore_core::CoreError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        use ragcore_core::CoreError::*;

        let status = match &self.0 {
            ValidationFailed(_) | FilterStructureInvalid(_) => StatusCode::BAD_REQUEST,
            TenantRequired => StatusCode::BAD_REQUEST,
            AccessDenied => StatusCode::FORBIDDEN,
            EmbeddingUnavailable(_) | StoreTimeout(_) | RerankerTimeout(_) | LlmTimeout(_) => StatusCode::GATEWAY_TIMEOUT,
            StoreBadRequest(_) => StatusCode::SERVICE_UNAVAILABLE,
            ClientDisconnected => StatusCode::BAD_REQUEST,
            DimensionMismatch { .. } | CitationInconsistent(_) | LlmBadResponse(_) | Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };

        let body = Json(serde_json::json!({
            "error": {
                "code": self.0.code(),
                "message": self.0.to_string(),
            }
        }));

        (status, body).into_response()
    }
}
