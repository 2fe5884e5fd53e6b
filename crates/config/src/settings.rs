//! Process-wide settings: loaded once at startup from file + environment, then held
//! read-only behind an `Arc` for the lifetime of the process (§5, §9 "no global
//! mutable state in requests"). Per-tenant overrides live in [`crate::tenant`].

use ragcore_core::FusionStrategy;
use serde::{Deserialize, Serialize};

use crate::constants::{rag as rag_constants, timeouts};
use crate::ConfigError;

/// Deployment environment; loosens or tightens validation strictness the way the
/// reference backend's `RuntimeEnvironment` does (e.g. `Production` forbids
/// `localhost` endpoints).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    #[default]
    Development,
    Staging,
    Production,
}

impl RuntimeEnvironment {
    pub fn is_production(self) -> bool {
        matches!(self, Self::Production)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NormalizationMethod {
    None,
    Minmax,
    Zscore,
}

impl Default for NormalizationMethod {
    fn default() -> Self {
        Self::Minmax
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceMethod {
    MeanOfTopChunks,
    SourceAware,
}

impl Default for ConfidenceMethod {
    fn default() -> Self {
        Self::SourceAware
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    Openai,
    Vllm,
}

impl Default for LlmProvider {
    fn default() -> Self {
        Self::Openai
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub cors_allowed_origins: Vec<String>,
    pub request_timeout_ms: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 8080,
            cors_allowed_origins: vec!["*".to_string()],
            request_timeout_ms: timeouts::WHOLE_REQUEST_MS,
        }
    }
}

/// Fusion Engine configuration (§4.3, §6 `FUSION_*`/`HYBRID_*` knobs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FusionConfig {
    pub strategy: FusionStrategy,
    pub normalization: NormalizationMethod,
    pub k_param: f32,
    pub vector_weight: f32,
    pub keyword_weight: f32,
    pub query_adaptive_weights: bool,
    pub debug_trace: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: FusionStrategy::WeightedAverage,
            normalization: NormalizationMethod::Minmax,
            k_param: rag_constants::DEFAULT_FUSION_K_PARAM,
            vector_weight: rag_constants::DEFAULT_VECTOR_WEIGHT,
            keyword_weight: rag_constants::DEFAULT_KEYWORD_WEIGHT,
            query_adaptive_weights: true,
            debug_trace: false,
        }
    }
}

/// Reranker Client configuration (§4.4).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankerConfig {
    pub enabled: bool,
    pub url: String,
    pub timeout_ms: u64,
    pub fallback_enabled: bool,
    pub candidate_cap: usize,
    pub final_top_k: usize,
}

impl Default for RerankerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            url: crate::constants::endpoints::RERANKER_DEFAULT.clone(),
            timeout_ms: timeouts::RERANKER_MS,
            fallback_enabled: true,
            candidate_cap: rag_constants::RERANK_CANDIDATE_CAP,
            final_top_k: rag_constants::DEFAULT_FINAL_TOP_K,
        }
    }
}

/// Section Reconstructor bounds (§4.5).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconstructionConfig {
    pub max_sections: usize,
    pub max_parts: usize,
}

impl Default for ReconstructionConfig {
    fn default() -> Self {
        Self {
            max_sections: rag_constants::RECON_MAX_SECTIONS,
            max_parts: rag_constants::RECON_MAX_PARTS,
        }
    }
}

/// Context Packer configuration (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ContextPackConfig {
    pub token_budget: usize,
    pub per_passage_token_cap: usize,
}

impl Default for ContextPackConfig {
    fn default() -> Self {
        Self {
            token_budget: rag_constants::DEFAULT_CONTEXT_TOKEN_BUDGET,
            per_passage_token_cap: rag_constants::DEFAULT_PER_PASSAGE_TOKEN_CAP,
        }
    }
}

/// Per-tenant Answerability Guardrail thresholds (§4.7). Also doubles as the
/// process-wide default when no tenant override is registered.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GuardrailConfig {
    pub min_confidence: f32,
    pub min_top_score: f32,
    pub min_mean_score: f32,
    pub max_std_dev: f32,
    pub min_result_count: usize,
    pub idk_message: String,
    pub confidence_method: ConfidenceMethod,
}

impl Default for GuardrailConfig {
    fn default() -> Self {
        Self {
            min_confidence: 0.35,
            min_top_score: 0.2,
            min_mean_score: 0.15,
            max_std_dev: 0.9,
            min_result_count: 1,
            idk_message: "I don't have enough information in the available documents to answer that.".to_string(),
            confidence_method: ConfidenceMethod::SourceAware,
        }
    }
}

/// Embedding Client configuration (§4.1).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub endpoint: String,
    pub model: String,
    pub dim: usize,
    pub timeout_ms: u64,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::constants::endpoints::EMBEDDING_DEFAULT.clone(),
            model: "nomic-embed-text".to_string(),
            dim: 768,
            timeout_ms: timeouts::EMBEDDING_MS,
        }
    }
}

/// Vector store connection (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VectorStoreConfig {
    pub endpoint: String,
    pub collection: String,
    pub api_key: Option<String>,
    pub vector_dim: usize,
    pub search_timeout_ms: u64,
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            endpoint: crate::constants::endpoints::QDRANT_DEFAULT.clone(),
            collection: "ragcore_passages".to_string(),
            api_key: None,
            vector_dim: 768,
            search_timeout_ms: timeouts::SEARCH_MS,
        }
    }
}

/// Sparse / keyword index configuration (C3).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SparseIndexConfig {
    pub index_path: String,
    pub search_timeout_ms: u64,
}

impl Default for SparseIndexConfig {
    fn default() -> Self {
        Self {
            index_path: "./data/sparse_index".to_string(),
            search_timeout_ms: timeouts::SEARCH_MS,
        }
    }
}

/// Everything the retrieval/synthesis pipeline needs, grouped the way the reference
/// backend groups its `RagConfig`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagSettings {
    pub enabled: bool,
    pub embedding: EmbeddingConfig,
    pub vector_store: VectorStoreConfig,
    pub sparse_index: SparseIndexConfig,
    pub fusion: FusionConfig,
    pub reranker: RerankerConfig,
    pub reconstruction: ReconstructionConfig,
    pub context_pack: ContextPackConfig,
    pub guardrail: GuardrailConfig,
}

impl Default for RagSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            embedding: EmbeddingConfig::default(),
            vector_store: VectorStoreConfig::default(),
            sparse_index: SparseIndexConfig::default(),
            fusion: FusionConfig::default(),
            reranker: RerankerConfig::default(),
            reconstruction: ReconstructionConfig::default(),
            context_pack: ContextPackConfig::default(),
            guardrail: GuardrailConfig::default(),
        }
    }
}

/// LLM Synthesis configuration (§4.9, §6 `LLM_*` knobs).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmSettings {
    pub enabled: bool,
    pub provider: LlmProvider,
    pub model: String,
    pub endpoint: String,
    pub api_key: Option<String>,
    pub streaming: bool,
    pub timeout_ms: u64,
    pub max_tokens: usize,
}

impl Default for LlmSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            provider: LlmProvider::Openai,
            model: "gpt-4o-mini".to_string(),
            endpoint: crate::constants::endpoints::LLM_DEFAULT.clone(),
            api_key: None,
            streaming: true,
            timeout_ms: timeouts::LLM_MS,
            max_tokens: 1024,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_json: bool,
    pub otlp_endpoint: Option<String>,
    pub tracing_enabled: bool,
    pub metrics_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            otlp_endpoint: None,
            tracing_enabled: false,
            metrics_enabled: true,
        }
    }
}

/// Top-level process settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub environment: RuntimeEnvironment,
    pub server: ServerConfig,
    pub rag: RagSettings,
    pub llm: LlmSettings,
    pub observability: ObservabilityConfig,
    /// `ANSWERABILITY_THRESHOLD`: overrides every tenant's `minConfidence` when set (§6).
    pub answerability_threshold_override: Option<f32>,
    pub cancellation_grace_ms: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            server: ServerConfig::default(),
            rag: RagSettings::default(),
            llm: LlmSettings::default(),
            observability: ObservabilityConfig::default(),
            answerability_threshold_override: None,
            cancellation_grace_ms: crate::constants::timeouts::CANCELLATION_GRACE_MS,
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.validate_server());
        errors.extend(self.validate_rag());
        errors.extend(self.validate_llm());

        if errors.is_empty() {
            Ok(())
        } else {
            Err(ConfigError::Validation(errors.join("; ")))
        }
    }

    fn validate_server(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.environment.is_production() && self.server.cors_allowed_origins == vec!["*".to_string()]
        {
            errors.push("server.cors_allowed_origins must not be wildcard in production".to_string());
        }
        errors
    }

    fn validate_rag(&self) -> Vec<String> {
        let mut errors = Vec::new();
        let sum = self.rag.fusion.vector_weight + self.rag.fusion.keyword_weight;
        if (sum - 1.0).abs() > 1e-3 {
            errors.push(format!(
                "rag.fusion.vector_weight + keyword_weight must sum to 1, got {sum}"
            ));
        }
        if self.rag.fusion.k_param < 1.0 {
            errors.push("rag.fusion.k_param must be >= 1".to_string());
        }
        if self.rag.vector_store.vector_dim != self.rag.embedding.dim {
            errors.push(format!(
                "rag.vector_store.vector_dim ({}) must equal rag.embedding.dim ({})",
                self.rag.vector_store.vector_dim, self.rag.embedding.dim
            ));
        }
        if self.environment.is_production() && self.rag.vector_store.endpoint.contains("localhost") {
            errors.push("rag.vector_store.endpoint must not be localhost in production".to_string());
        }
        if !(0.0..=1.0).contains(&self.rag.guardrail.min_confidence) {
            errors.push("rag.guardrail.min_confidence must be within [0,1]".to_string());
        }
        errors
    }

    fn validate_llm(&self) -> Vec<String> {
        let mut errors = Vec::new();
        if self.llm.enabled && self.llm.endpoint.is_empty() {
            errors.push("llm.endpoint must be set when llm.enabled".to_string());
        }
        if self.environment.is_production()
            && self.llm.provider == LlmProvider::Openai
            && self.llm.api_key.is_none()
        {
            errors.push("llm.api_key must be set for the openai provider in production".to_string());
        }
        errors
    }

    /// The effective `minConfidence` for a tenant, honoring the process-wide override.
    pub fn effective_min_confidence(&self, tenant_guardrail: &GuardrailConfig) -> f32 {
        self.answerability_threshold_override
            .unwrap_or(tenant_guardrail.min_confidence)
    }
}

/// Load configuration from files and environment.
///
/// Priority (highest first): environment variables prefixed `RAGCORE__`, then
/// `config/{env}.yaml`, then `config/default.yaml`, then the compiled-in defaults —
/// the same layering the reference backend's `load_settings` uses.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let env_name = env.unwrap_or("development");

    let builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name(&format!("config/{env_name}")).required(false))
        .add_source(
            config::Environment::with_prefix("RAGCORE")
                .separator("__")
                .try_parsing(true),
        );

    let settings: Settings = builder.build()?.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_are_valid() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn fusion_weight_sum_is_enforced() {
        let mut settings = Settings::default();
        settings.rag.fusion.vector_weight = 0.9;
        settings.rag.fusion.keyword_weight = 0.9;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn vector_dim_mismatch_is_rejected() {
        let mut settings = Settings::default();
        settings.rag.vector_store.vector_dim = 1536;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn production_requires_non_wildcard_cors() {
        let mut settings = Settings::default();
        settings.environment = RuntimeEnvironment::Production;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn effective_min_confidence_honors_override() {
        let mut settings = Settings::default();
        settings.answerability_threshold_override = Some(0.9);
        let tenant_guardrail = GuardrailConfig::default();
        assert_eq!(settings.effective_min_confidence(&tenant_guardrail), 0.9);
    }
}
