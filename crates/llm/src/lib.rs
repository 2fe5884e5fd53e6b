//! Provider-agnostic streaming LLM client, prompt construction, and
//! synthesis (citation extraction, confidence, degraded fallback) — C11 (§4.9).

pub mod backend;
pub mod prompt;
pub mod synthesis;

pub use backend::{LLMClient, OpenAiCompatClient, OpenAiCompatConfig, StreamEvent};
pub use prompt::{build_messages, Message, Role};
pub use synthesis::{extract_citations, fallback_synthesis, synthesis_confidence, SynthesisResult};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlmError {
    #[error("generation error: {0}")]
    Generation(String),

    #[error("API error: {0}")]
    Api(String),

    #[error("network error: {0}")]
    Network(String),

    #[error("invalid response: {0}")]
    InvalidResponse(String),

    #[error("timeout")]
    Timeout,

    #[error("model not found: {0}")]
    ModelNotFound(String),

    #[error("configuration error: {0}")]
    Configuration(String),
}

impl From<reqwest::Error> for LlmError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            LlmError::Timeout
        } else {
            LlmError::Network(err.to_string())
        }
    }
}

impl From<LlmError> for ragcore_core::CoreError {
    fn from(err: LlmError) -> Self {
        match err {
            LlmError::Timeout => ragcore_core::CoreError::LlmTimeout(err.to_string()),
            LlmError::InvalidResponse(msg) => ragcore_core::CoreError::LlmBadResponse(msg),
            LlmError::Generation(_) | LlmError::Api(_) | LlmError::Network(_) | LlmError::ModelNotFound(_) | LlmError::Configuration(_) => {
                ragcore_core::CoreError::Internal(err.to_string())
            }
        }
    }
}
