//! Provider-agnostic streaming LLM client (C11, §4.9).
//!
//! Generalizes the reference backend's `LlmBackend` trait (`generate`,
//! `generate_stream` over an `mpsc::Sender<String>`) into one `LLMClient`
//! trait emitting the full `StreamEvent` contract, with two OpenAI-compatible
//! providers (chat-completions, vLLM) sharing one wire format.

use std::time::Duration;

use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use unicode_segmentation::UnicodeSegmentation;

use ragcore_core::CompletionReason;

use crate::prompt::{Message, Role};
use crate::LlmError;

/// Same grapheme-based approximation used for chunking and context packing —
/// there is no real tokenizer for a non-streaming completion's `totalTokens`.
fn estimate_tokens(text: &str) -> usize {
    text.graphemes(true).count().max(1) / 4
}

/// `StreamEvent` ∈ `{chunk(text), completion(totalTokens, reason, model), error(message), done}` (§4.9).
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(String),
    Completion { total_tokens: usize, reason: CompletionReason, model: String },
    Error(String),
    Done,
}

#[async_trait]
pub trait LLMClient: Send + Sync {
    fn supports_streaming(&self) -> bool;

    /// Stream a completion. Events are pushed onto `tx` in order; `Done` is
    /// always the last event this call sends, even on error (preceded by an
    /// `Error` event) — §5's "if error is emitted, no further events follow"
    /// refers to the orchestrator's client-facing sequence, which mirrors
    /// this one event-for-event.
    async fn stream(&self, messages: &[Message], max_tokens: usize, tx: mpsc::Sender<StreamEvent>) -> Result<(), LlmError>;

    /// One non-streaming completion, used when `LLM_STREAMING` is off
    /// (§4.9: the orchestrator still emits the same external event sequence,
    /// built from a single completion rather than per-token chunks).
    async fn generate(&self, messages: &[Message], max_tokens: usize) -> Result<(String, usize), LlmError>;

    fn model_name(&self) -> &str;
}

/// Configuration shared by both OpenAI-compatible providers. `vllm()`
/// mirrors the reference backend's `OpenAIConfig::local()` constructor: same
/// wire format, no `Authorization` header required.
#[derive(Debug, Clone)]
pub struct OpenAiCompatConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: usize,
    pub temperature: f32,
    pub timeout: Duration,
}

impl OpenAiCompatConfig {
    pub fn openai(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: Some(api_key.into()),
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.3,
            timeout: Duration::from_secs(25),
        }
    }

    pub fn vllm(endpoint: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: None,
            model: model.into(),
            max_tokens: 1024,
            temperature: 0.3,
            timeout: Duration::from_secs(25),
        }
    }
}

impl From<&ragcore_config::LlmSettings> for OpenAiCompatConfig {
    fn from(cfg: &ragcore_config::LlmSettings) -> Self {
        let api_key = match cfg.provider {
            ragcore_config::LlmProvider::Vllm => None,
            ragcore_config::LlmProvider::Openai => cfg.api_key.clone(),
        };
        Self {
            endpoint: cfg.endpoint.clone(),
            api_key,
            model: cfg.model.clone(),
            max_tokens: cfg.max_tokens,
            temperature: 0.3,
            timeout: Duration::from_millis(cfg.timeout_ms),
        }
    }
}

fn to_wire_role(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    messages: Vec<ChatMessage>,
    max_tokens: usize,
    temperature: f32,
    stream: bool,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: String,
}

#[derive(Debug, Deserialize)]
struct StreamChunk {
    choices: Vec<StreamChoice>,
}

#[derive(Debug, Deserialize)]
struct StreamChoice {
    delta: StreamDelta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct StreamDelta {
    content: Option<String>,
}

/// One OpenAI-compatible chat-completions client backs both required
/// providers (§4.9); only construction (headers, default endpoint) differs
/// between `openai()` and `vllm()`.
pub struct OpenAiCompatClient {
    client: Client,
    config: OpenAiCompatConfig,
}

impl OpenAiCompatClient {
    pub fn new(config: OpenAiCompatConfig) -> Result<Self, LlmError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| LlmError::Configuration(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn chat_url(&self) -> String {
        format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'))
    }

    fn headers(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::CONTENT_TYPE, reqwest::header::HeaderValue::from_static("application/json"));
        if let Some(ref key) = self.config.api_key {
            if let Ok(val) = reqwest::header::HeaderValue::from_str(&format!("Bearer {key}")) {
                headers.insert(reqwest::header::AUTHORIZATION, val);
            }
        }
        headers
    }

    fn wire_messages(messages: &[Message]) -> Vec<ChatMessage> {
        messages
            .iter()
            .map(|m| ChatMessage { role: to_wire_role(m.role), content: m.content.clone() })
            .collect()
    }
}

#[async_trait]
impl LLMClient for OpenAiCompatClient {
    fn supports_streaming(&self) -> bool {
        true
    }

    async fn stream(&self, messages: &[Message], max_tokens: usize, tx: mpsc::Sender<StreamEvent>) -> Result<(), LlmError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: Self::wire_messages(messages),
            max_tokens,
            temperature: self.config.temperature,
            stream: true,
        };

        let response = match self.client.post(self.chat_url()).headers(self.headers()).json(&request).send().await {
            Ok(r) => r,
            Err(e) => {
                let message = classify_send_error(&e);
                let _ = tx.send(StreamEvent::Error(message.to_string())).await;
                let _ = tx.send(StreamEvent::Done).await;
                return Err(message);
            }
        };

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            let err = LlmError::Api(format!("HTTP {status}: {body}"));
            let _ = tx.send(StreamEvent::Error(err.to_string())).await;
            let _ = tx.send(StreamEvent::Done).await;
            return Err(err);
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();
        let mut total_tokens = 0usize;
        let mut finish_reason = CompletionReason::Success;

        while let Some(chunk) = stream.next().await {
            let chunk = match chunk {
                Ok(c) => c,
                Err(e) => {
                    let err = LlmError::Network(e.to_string());
                    let _ = tx.send(StreamEvent::Error(err.to_string())).await;
                    let _ = tx.send(StreamEvent::Done).await;
                    return Err(err);
                }
            };
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            while let Some(line_end) = buffer.find('\n') {
                let line = buffer[..line_end].trim().to_string();
                buffer.drain(..=line_end);

                if line.is_empty() || line == "data: [DONE]" {
                    continue;
                }
                let Some(json_str) = line.strip_prefix("data: ") else { continue };
                let Ok(parsed) = serde_json::from_str::<StreamChunk>(json_str) else { continue };
                let Some(choice) = parsed.choices.first() else { continue };

                if let Some(ref content) = choice.delta.content {
                    total_tokens += 1;
                    if tx.send(StreamEvent::Chunk(content.clone())).await.is_err() {
                        return Ok(());
                    }
                }
                if let Some(reason) = &choice.finish_reason {
                    finish_reason = match reason.as_str() {
                        "length" => CompletionReason::Success,
                        _ => CompletionReason::Success,
                    };
                }
            }
        }

        let _ = tx
            .send(StreamEvent::Completion {
                total_tokens,
                reason: finish_reason,
                model: self.config.model.clone(),
            })
            .await;
        let _ = tx.send(StreamEvent::Done).await;
        Ok(())
    }

    async fn generate(&self, messages: &[Message], max_tokens: usize) -> Result<(String, usize), LlmError> {
        let request = ChatRequest {
            model: self.config.model.clone(),
            messages: Self::wire_messages(messages),
            max_tokens,
            temperature: self.config.temperature,
            stream: false,
        };

        let response = self
            .client
            .post(self.chat_url())
            .headers(self.headers())
            .json(&request)
            .send()
            .await
            .map_err(|e| classify_send_error(&e))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(LlmError::Api(format!("HTTP {status}: {body}")));
        }

        let parsed: ChatResponse = response.json().await.map_err(|e| LlmError::InvalidResponse(e.to_string()))?;
        let choice = parsed.choices.first().ok_or_else(|| LlmError::InvalidResponse("no choices in response".to_string()))?;
        let total_tokens = estimate_tokens(&choice.message.content);
        Ok((choice.message.content.clone(), total_tokens))
    }

    fn model_name(&self) -> &str {
        &self.config.model
    }
}

fn classify_send_error(err: &reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else {
        LlmError::Network(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vllm_config_has_no_api_key() {
        let config = OpenAiCompatConfig::vllm("http://localhost:8000/v1", "llama-3");
        assert!(config.api_key.is_none());
    }

    #[test]
    fn openai_config_carries_api_key() {
        let config = OpenAiCompatConfig::openai("https://api.openai.com/v1", "sk-xxx", "gpt-4o-mini");
        assert_eq!(config.api_key.as_deref(), Some("sk-xxx"));
    }

    #[test]
    fn chat_url_appends_chat_completions() {
        let config = OpenAiCompatConfig::vllm("http://localhost:8000/v1", "llama-3");
        let client = OpenAiCompatClient::new(config).unwrap();
        assert_eq!(client.chat_url(), "http://localhost:8000/v1/chat/completions");
    }
}
