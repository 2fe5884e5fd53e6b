//! Settings, per-tenant configuration, and centralized constants for the RAG core.

pub mod constants;
mod settings;
mod tenant;

pub use settings::{
    load_settings, ConfidenceMethod, ContextPackConfig, EmbeddingConfig, FusionConfig,
    GuardrailConfig, LlmProvider, LlmSettings, NormalizationMethod, ObservabilityConfig,
    RagSettings, ReconstructionConfig, RerankerConfig, RuntimeEnvironment, ServerConfig, Settings,
    SparseIndexConfig, VectorStoreConfig,
};
pub use tenant::{TenantConfig, TenantConfigStore};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("configuration validation failed: {0}")]
    Validation(String),

    #[error("configuration source error: {0}")]
    Source(#[from] config::ConfigError),
}

impl From<ConfigError> for ragcore_core::CoreError {
    fn from(err: ConfigError) -> Self {
        ragcore_core::CoreError::Internal(err.to_string())
    }
}
