//! Application state shared across all handlers (§5, §9: "no global mutable
//! request state"). Everything here is either immutable for the life of the
//! process or behind an atomic swap — no handler ever takes a lock that
//! another suspended request could be waiting on.

use std::sync::Arc;

use arc_swap::ArcSwap;
use metrics_exporter_prometheus::PrometheusHandle;

use ragcore_config::{Settings, TenantConfigStore};
use ragcore_llm::LLMClient;
use ragcore_rag::{EmbeddingClient, RerankerClient, SparseIndex, VectorStore};

/// Shared across every request handler. Cloning is cheap — every field is an
/// `Arc`.
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<ArcSwap<Settings>>,
    pub tenant_config: Arc<TenantConfigStore>,
    pub vector_store: Arc<VectorStore>,
    pub sparse_index: Arc<SparseIndex>,
    pub embedding_client: Arc<EmbeddingClient>,
    pub reranker_client: Option<Arc<RerankerClient>>,
    pub llm_client: Arc<dyn LLMClient>,
    /// The config-environment name (`RAGCORE_ENV`) `Settings` was loaded with,
    /// kept around so `reload_settings` can re-resolve the same environment.
    pub env: Option<String>,
    /// Handle to the process-wide recorder installed once at startup; `/metrics`
    /// renders from this rather than building a fresh recorder per request.
    pub metrics_handle: PrometheusHandle,
}

impl AppState {
    pub fn new(
        settings: Settings,
        tenant_config: TenantConfigStore,
        vector_store: VectorStore,
        sparse_index: SparseIndex,
        embedding_client: EmbeddingClient,
        reranker_client: Option<RerankerClient>,
        llm_client: Arc<dyn LLMClient>,
        env: Option<String>,
        metrics_handle: PrometheusHandle,
    ) -> Self {
        Self {
            settings: Arc::new(ArcSwap::from_pointee(settings)),
            tenant_config: Arc::new(tenant_config),
            vector_store: Arc::new(vector_store),
            sparse_index: Arc::new(sparse_index),
            embedding_client: Arc::new(embedding_client),
            reranker_client: reranker_client.map(Arc::new),
            llm_client,
            env,
            metrics_handle,
        }
    }

    pub fn current_settings(&self) -> Arc<Settings> {
        self.settings.load_full()
    }

    /// `POST /admin/config/reload`: re-read `Settings` from disk/env and swap
    /// the whole snapshot atomically. Tenant overrides are reloaded by a
    /// separate call against `tenant_config` (no tenant table on disk in this
    /// deployment shape — see DESIGN.md open question).
    pub fn reload_settings(&self) -> Result<(), ragcore_config::ConfigError> {
        let new_settings = ragcore_config::load_settings(self.env.as_deref())?;
        self.settings.store(Arc::new(new_settings));
        tracing::info!("settings reloaded");
        Ok(())
    }
}
