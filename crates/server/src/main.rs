//! Process entry point: load configuration, construct the retrieval/LLM
//! clients, bind the router, serve with graceful shutdown.

use std::net::SocketAddr;
use std::sync::Arc;

use metrics_exporter_prometheus::PrometheusBuilder;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, Layer};

use ragcore_config::{load_settings, Settings, TenantConfigStore};
use ragcore_llm::{LLMClient, OpenAiCompatClient, OpenAiCompatConfig};
use ragcore_rag::{EmbeddingClient, EmbeddingClientConfig, RerankerClient, RerankerClientConfig, SparseIndex, SparseIndexConfig, VectorStore, VectorStoreConfig};
use ragcore_server::{create_router, AppState};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let env = std::env::var("RAGCORE_ENV").ok();
    let settings = match load_settings(env.as_deref()) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("failed to load configuration: {e}. Using defaults.");
            Settings::default()
        }
    };

    init_tracing(&settings);

    tracing::info!(version = env!("CARGO_PKG_VERSION"), environment = ?settings.environment, "starting ragcore-server");

    let metrics_handle = PrometheusBuilder::new().install_recorder().map_err(|e| format!("failed to install metrics recorder: {e}"))?;

    let vector_store = VectorStore::new(VectorStoreConfig::from(&settings.rag.vector_store)).await?;
    vector_store.ensure_collection().await?;

    let sparse_index = SparseIndex::new(SparseIndexConfig::from(&settings.rag.sparse_index))?;

    let embedding_client = EmbeddingClient::new(EmbeddingClientConfig::from(&settings.rag.embedding))?;

    let reranker_client = if settings.rag.reranker.enabled {
        Some(RerankerClient::new(RerankerClientConfig::from(&settings.rag.reranker))?)
    } else {
        None
    };

    let llm_client: Arc<dyn LLMClient> = Arc::new(OpenAiCompatClient::new(OpenAiCompatConfig::from(&settings.llm))?);

    let tenant_config = TenantConfigStore::new(settings.rag.guardrail.clone(), settings.rag.fusion.clone());

    let addr = SocketAddr::from(([0, 0, 0, 0], settings.server.port));

    let state = AppState::new(
        settings,
        tenant_config,
        vector_store,
        sparse_index,
        embedding_client,
        reranker_client,
        llm_client,
        env,
        metrics_handle,
    );

    let app = create_router(state);

    tracing::info!(%addr, "listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()).await?;

    tracing::info!("server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => tracing::info!("received Ctrl+C, shutting down"),
        _ = terminate => tracing::info!("received SIGTERM, shutting down"),
    }
}

#[cfg(feature = "telemetry")]
fn init_tracing(settings: &Settings) {
    use opentelemetry_otlp::WithExportConfig;

    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ragcore={},tower_http=debug", settings.observability.log_level).into()
    });
    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    if let (Some(endpoint), true) = (&settings.observability.otlp_endpoint, settings.observability.tracing_enabled) {
        match opentelemetry_otlp::new_pipeline()
            .tracing()
            .with_exporter(opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint))
            .with_trace_config(opentelemetry_sdk::trace::Config::default().with_resource(opentelemetry_sdk::Resource::new(vec![
                opentelemetry::KeyValue::new("service.name", "ragcore-server"),
                opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
            ])))
            .install_batch(opentelemetry_sdk::runtime::Tokio)
        {
            Ok(tracer) => {
                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                subscriber.with(fmt_layer).with(otel_layer).init();
                tracing::info!(%endpoint, "OpenTelemetry tracing enabled");
                return;
            }
            Err(e) => eprintln!("failed to initialize OpenTelemetry: {e}. Falling back to console logging."),
        }
    }
    subscriber.with(fmt_layer).init();
}

#[cfg(not(feature = "telemetry"))]
fn init_tracing(settings: &Settings) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        format!("ragcore={},tower_http=debug", settings.observability.log_level).into()
    });
    let subscriber = tracing_subscriber::registry().with(env_filter);
    let fmt_layer = if settings.observability.log_json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };
    subscriber.with(fmt_layer).init();
}
