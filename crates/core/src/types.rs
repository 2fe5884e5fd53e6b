//! The request-scoped data model (§3). Every entity here is owned by the orchestrator
//! for the lifetime of one request; passages handed to events are copies.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Caller identity, threaded unchanged through a request. `tenant_id` is immutable
/// once the request starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserContext {
    pub user_id: String,
    pub tenant_id: String,
    #[serde(default)]
    pub group_ids: Vec<String>,
    #[serde(default)]
    pub preferred_languages: Vec<String>,
}

/// A single incoming query, knobs included.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Query {
    pub text: String,
    pub user_context: UserContext,
    #[serde(default = "default_k")]
    pub k: usize,
    #[serde(default)]
    pub doc_id_filter: Option<String>,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_streaming")]
    pub streaming: bool,
}

fn default_k() -> usize {
    8
}
fn default_streaming() -> bool {
    true
}

/// Which stage last produced or touched a passage's score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SearchType {
    VectorOnly,
    KeywordOnly,
    Hybrid,
    Reranked,
}

/// Metadata carried alongside a passage's text; this is what filters and
/// `validateAccess` operate on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassagePayload {
    pub tenant_id: String,
    pub doc_id: String,
    #[serde(default)]
    pub acl: Vec<String>,
    #[serde(default = "default_language")]
    pub language: String,
    #[serde(default)]
    pub section_path: Option<String>,
    pub created_at: DateTime<Utc>,
    pub modified_at: DateTime<Utc>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
}

fn default_language() -> String {
    "en".to_string()
}

/// A retrieved chunk. Scores are kept in their native stage units and never
/// rewritten in place — each stage appends its own score field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Passage {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub vector_score: Option<f32>,
    #[serde(default)]
    pub keyword_score: Option<f32>,
    #[serde(default)]
    pub fused_score: Option<f32>,
    #[serde(default)]
    pub reranker_score: Option<f32>,
    pub final_score: f32,
    pub search_type: SearchType,
    pub payload: PassagePayload,
}

impl Passage {
    /// `(userId ∪ groupIds ∪ {"public"}) ∩ acl ≠ ∅` (§3 invariant ii).
    pub fn acl_permits(&self, user_id: &str, group_ids: &[String]) -> bool {
        self.payload.acl.iter().any(|principal| {
            principal == user_id || principal == "public" || group_ids.contains(principal)
        })
    }
}

/// The four fusion strategies (§4.3). `BordaRank` is retained only for regression
/// tests; it is never the default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FusionStrategy {
    WeightedAverage,
    ScoreWeightedRrf,
    MaxConfidence,
    BordaRank,
}

impl Default for FusionStrategy {
    fn default() -> Self {
        Self::WeightedAverage
    }
}

/// Lightweight query intent classification used to pick fusion weights (§4.3).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryIntent {
    Definition,
    Measurement,
    Procedure,
    EntityLookup,
    Exploratory,
}

/// Per-candidate fusion debug record, emitted only when `FUSION_DEBUG_TRACE` is on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FusionTraceEntry {
    pub id: String,
    pub rank_vec: Option<usize>,
    pub rank_kw: Option<usize>,
    pub norm_vec: Option<f32>,
    pub norm_kw: Option<f32>,
    pub strategy: FusionStrategy,
    pub fused_score: f32,
}

/// Per-stage confidence summary over the top-n scores of that stage (§4.6).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageConfidence {
    pub top_score: f32,
    pub mean_score: f32,
    pub std_dev: f32,
    pub count: usize,
    pub confidence: f32,
    #[serde(default)]
    pub quality_preservation: Option<f32>,
}

/// A record that a downstream stage lost most of the signal present upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DegradationAlert {
    pub stage: String,
    pub severity: f32,
    pub previous_confidence: f32,
    pub current_confidence: f32,
    pub description: String,
    pub recommendation: String,
    pub critical: bool,
}

/// How `finalConfidence` was derived (§4.6).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceStrategy {
    TrustSource,
    WeightedBlend,
    MaxConfidence,
    DegradedFallback,
}

/// The full per-stage confidence record plus the reconciled final confidence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfidenceBundle {
    pub vector: StageConfidence,
    #[serde(default)]
    pub keyword: Option<StageConfidence>,
    pub fusion: StageConfidence,
    #[serde(default)]
    pub reranker: Option<StageConfidence>,
    pub degradation_alerts: Vec<DegradationAlert>,
    pub final_confidence: f32,
    pub strategy: ConfidenceStrategy,
    /// Set when the embedding service was unavailable and retrieval fell back
    /// to keyword-only search (§4.1, `EMBEDDING_UNAVAILABLE`).
    #[serde(default)]
    pub vector_stage_missing: bool,
}

/// Why the guardrail refused (or accepted) an answer (§4.7).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum GuardrailReasonCode {
    Answerable,
    LowConfidence,
    NoRelevantDocs,
    DegradedFusion,
    RerankerReject,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GuardrailDecision {
    pub is_answerable: bool,
    pub confidence: f32,
    pub threshold: f32,
    pub reason_code: GuardrailReasonCode,
    #[serde(default)]
    pub idk_message: Option<String>,
}

/// `{marker, passageId, docId, url?, title?, excerpt, relevanceScore}` (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    pub marker: String,
    pub passage_id: String,
    pub doc_id: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    pub excerpt: String,
    pub relevance_score: f32,
    /// True when this citation was attached by the rule-based rescue pass (§4.9)
    /// rather than by an explicit `[^n]` marker in the generated text.
    pub rule_based: bool,
}

/// One passage slotted into the packed context, tagged with its citation marker.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextEntry {
    pub marker: String,
    pub passage: Passage,
}

/// The budget-bound serialized context handed to the LLM (§4.8).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextPack {
    pub entries: Vec<ContextEntry>,
    pub serialized: String,
    pub token_count: usize,
    pub truncated: bool,
}

/// Why a streamed response ended (maps to `response_completed.summary.completionReason`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionReason {
    Success,
    Fallback,
    Idk,
    Error,
    Cancelled,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SynthesisSummary {
    pub total_chunks: usize,
    pub total_tokens: usize,
    pub response_time_ms: u64,
    pub success: bool,
    pub completion_reason: CompletionReason,
}

/// One structured record per terminal request state. Never contains raw passage
/// text or PII (§3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub query_id: String,
    pub query_hash: String,
    pub tenant_id: String,
    pub user_id: String,
    pub strategy: FusionStrategy,
    pub component_timings_ms: HashMap<String, u64>,
    pub final_confidence: f32,
    pub guardrail_decision: GuardrailDecision,
    pub citation_count: usize,
    pub outcome: String,
    pub timestamp: DateTime<Utc>,
}
