//! HTTP routes (§6): `/ask`, `/ask/stream`, `/health`, `/ready`, `/metrics`,
//! `/admin/config/reload`.

use axum::extract::State;
use axum::http::{HeaderValue, Method, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tower_http::compression::CompressionLayer;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use ragcore_core::{Citation, GuardrailDecision, Passage, Query, UserContext};
use tokio_util::sync::CancellationToken;

use crate::orchestrator::{self, OrchestratorEvent};
use crate::state::AppState;
use crate::ApiError;

pub fn create_router(state: AppState) -> Router {
    let settings = state.current_settings();
    let cors_layer = build_cors_layer(&settings.server.cors_allowed_origins);
    drop(settings);

    Router::new()
        .route("/ask", post(ask))
        .route("/ask/stream", post(ask_stream))
        .route("/health", get(health_check))
        .route("/ready", get(readiness_check))
        .route("/metrics", get(metrics_handler))
        .route("/admin/config/reload", post(reload_config))
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(cors_layer)
        .with_state(state)
}

fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        tracing::warn!("CORS origins include \"*\" - allowing all origins");
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods([Method::GET, Method::POST])
            .allow_headers(Any);
    }

    let parsed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| {
            origin.parse::<HeaderValue>().ok().or_else(|| {
                tracing::warn!(origin = %origin, "invalid CORS origin, skipping");
                None
            })
        })
        .collect();

    if parsed.is_empty() {
        tracing::warn!("no valid CORS origins configured, falling back to permissive");
        return CorsLayer::permissive();
    }

    CorsLayer::new()
        .allow_origin(parsed)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers(Any)
        .allow_credentials(true)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UserContextRequest {
    id: String,
    tenant_id: String,
    #[serde(default)]
    group_ids: Vec<String>,
    #[serde(default)]
    preferred_languages: Vec<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AskRequest {
    query: String,
    user_context: UserContextRequest,
    #[serde(default)]
    k: Option<usize>,
    #[serde(default)]
    doc_id: Option<String>,
    #[serde(default)]
    include_metrics: bool,
    #[serde(default)]
    include_debug_info: bool,
}

const MAX_K: usize = 50;

impl AskRequest {
    fn into_query(self) -> Result<(Query, bool, bool), ragcore_core::CoreError> {
        if self.query.trim().is_empty() {
            return Err(ragcore_core::CoreError::ValidationFailed("query must not be empty".to_string()));
        }
        if self.user_context.tenant_id.trim().is_empty() {
            return Err(ragcore_core::CoreError::TenantRequired);
        }
        let k = self.k.unwrap_or(8);
        if k == 0 || k > MAX_K {
            return Err(ragcore_core::CoreError::ValidationFailed(format!("k must be between 1 and {MAX_K}")));
        }

        Ok((
            Query {
                text: self.query,
                user_context: UserContext {
                    user_id: self.user_context.id,
                    tenant_id: self.user_context.tenant_id,
                    group_ids: self.user_context.group_ids,
                    preferred_languages: self.user_context.preferred_languages,
                },
                k,
                doc_id_filter: self.doc_id,
                debug: self.include_debug_info,
                streaming: true,
            },
            self.include_metrics,
            self.include_debug_info,
        ))
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AskResponse {
    query_id: String,
    answer: String,
    citations: Vec<Citation>,
    retrieved_documents: Vec<Passage>,
    guardrail_decision: GuardrailDecision,
    confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    metrics: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    debug: Option<serde_json::Value>,
}

/// `POST /ask` — drains the orchestrator's event channel (every send is
/// best-effort, see `orchestrator.rs`) and responds with the resolved
/// [`orchestrator::RunOutcome`].
async fn ask(State(state): State<AppState>, Json(request): Json<AskRequest>) -> Result<Json<AskResponse>, ApiError> {
    let (query, include_metrics, include_debug) = request.into_query()?;
    let (tx, mut rx) = tokio::sync::mpsc::channel(32);
    let cancel = CancellationToken::new();

    let drain = tokio::spawn(async move { while rx.recv().await.is_some() {} });

    let outcome = orchestrator::run(&state, query, tx, cancel).await?;
    drop(drain);

    let metrics = include_metrics.then(|| {
        serde_json::json!({
            "componentTimingsMs": outcome.audit.component_timings_ms,
            "fusionTrace": outcome.fusion_trace,
        })
    });
    let debug = include_debug.then(|| serde_json::json!({ "fusionTrace": outcome.fusion_trace }));

    Ok(Json(AskResponse {
        query_id: outcome.query_id,
        answer: outcome.answer,
        citations: outcome.citations,
        retrieved_documents: outcome.retrieved_documents,
        guardrail_decision: outcome.guardrail_decision,
        confidence: outcome.confidence,
        metrics,
        debug,
    }))
}

/// `POST /ask/stream` — `text/event-stream`, one frame per
/// [`OrchestratorEvent`]. Cancellation follows client disconnect: the SSE
/// stream returned here carries `cancel`'s [`tokio_util::sync::DropGuard`]
/// (see `sse::event_stream`), so when axum drops the response body — which
/// happens exactly on disconnect, since nothing else ever drops this stream —
/// the guard fires `cancel.cancel()` and the spawned orchestrator task
/// observes it at its next suspension point.
async fn ask_stream(
    State(state): State<AppState>,
    Json(request): Json<AskRequest>,
) -> Result<Sse<impl futures::Stream<Item = Result<axum::response::sse::Event, std::convert::Infallible>>>, ApiError> {
    let (query, _include_metrics, _include_debug) = request.into_query()?;
    let (tx, rx) = tokio::sync::mpsc::channel::<OrchestratorEvent>(32);
    let cancel = CancellationToken::new();
    let run_cancel = cancel.clone();

    tokio::spawn(async move {
        if let Err(e) = orchestrator::run(&state, query, tx, run_cancel).await {
            tracing::debug!(error = %e, "streamed request ended in error");
        }
    });

    Ok(Sse::new(crate::sse::event_stream(rx, cancel)).keep_alive(KeepAlive::default()))
}

async fn health_check() -> StatusCode {
    StatusCode::OK
}

/// `GET /ready` pings the vector store; a degraded search backend should not
/// receive new traffic even though the process itself is alive.
async fn readiness_check(State(state): State<AppState>) -> impl IntoResponse {
    match state.vector_store.ensure_collection().await {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "ready" }))),
        Err(e) => {
            tracing::warn!(error = %e, "readiness check failed");
            (StatusCode::SERVICE_UNAVAILABLE, Json(serde_json::json!({ "status": "not_ready" })))
        }
    }
}

async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics_handle.render()
}

async fn reload_config(State(state): State<AppState>) -> impl IntoResponse {
    match state.reload_settings() {
        Ok(()) => (StatusCode::OK, Json(serde_json::json!({ "status": "reloaded" }))),
        Err(e) => {
            tracing::error!(error = %e, "config reload failed");
            (StatusCode::INTERNAL_SERVER_ERROR, Json(serde_json::json!({ "status": "error", "message": e.to_string() })))
        }
    }
}
