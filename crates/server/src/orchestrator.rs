//! Orchestrator & Event Emitter (C12, §4.10).
//!
//! One state machine backs both routes: `run()` drives
//! `RECEIVED -> EMBEDDING -> SEARCH -> FUSION -> [RERANK] -> RECONSTRUCT ->
//! CONFIDENCE -> GUARDRAIL -> (ANSWERABLE|IDK) -> (PACK -> SYNTH_STREAMING) ->
//! DONE`, emitting an [`OrchestratorEvent`] at every transition and per LLM
//! chunk. `/ask/stream` turns the event channel directly into SSE; `/ask`
//! drains it and returns the [`RunOutcome`] `run()` resolves to.

use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use ragcore_core::{
    AuditRecord, Citation, CompletionReason, ContextPack, FusionStrategy, FusionTraceEntry,
    GuardrailDecision, Passage, Query, SynthesisSummary,
};
use ragcore_llm::StreamEvent;
use ragcore_rag::{AccessFilter, AccessFilterBuilder, FusionEngineConfig, RagError};

use crate::state::AppState;

/// One SSE frame, or (for `/ask`) one item drained from the channel and
/// folded into the final [`RunOutcome`]. Tagged exactly as the wire format
/// (§6): `event: <type>\ndata: <json>\n\n`.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OrchestratorEvent {
    ConnectionOpened {
        query_id: String,
    },
    Chunk {
        text: String,
    },
    Citations {
        citations: HashMap<String, Citation>,
    },
    Metadata {
        synthesis_time_ms: u64,
        tokens_used: usize,
        confidence: f32,
        model_used: String,
        retrieved_documents: usize,
        freshness_stats: FreshnessStats,
    },
    ResponseCompleted {
        summary: SynthesisSummary,
    },
    Error {
        message: String,
        code: String,
    },
    Done,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FreshnessStats {
    pub oldest_modified_at: Option<chrono::DateTime<chrono::Utc>>,
    pub newest_modified_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl FreshnessStats {
    fn from_passages(passages: &[Passage]) -> Self {
        let oldest = passages.iter().map(|p| p.payload.modified_at).min();
        let newest = passages.iter().map(|p| p.payload.modified_at).max();
        Self {
            oldest_modified_at: oldest,
            newest_modified_at: newest,
        }
    }
}

/// The terminal result `run()` resolves to, used by the non-streaming `/ask`
/// handler (the streaming handler only needs the event channel).
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub query_id: String,
    pub answer: String,
    pub citations: Vec<Citation>,
    pub retrieved_documents: Vec<Passage>,
    pub guardrail_decision: GuardrailDecision,
    pub confidence: f32,
    pub fusion_trace: Vec<FusionTraceEntry>,
    pub audit: AuditRecord,
}

const DEFAULT_CANDIDATE_MULTIPLIER: usize = 4;

/// Drive one request end to end. Terminal states (DONE, CANCELLED, FAILED)
/// all converge on exactly one [`AuditRecord`] emission via
/// [`crate::audit::emit`] before returning.
pub async fn run(
    state: &AppState,
    query: Query,
    tx: mpsc::Sender<OrchestratorEvent>,
    cancel: CancellationToken,
) -> Result<RunOutcome, ragcore_core::CoreError> {
    let query_id = uuid::Uuid::new_v4().to_string();
    let started = Instant::now();
    let mut timings: HashMap<String, u64> = HashMap::new();
    let mut checkpoint = Instant::now();

    let _ = tx
        .send(OrchestratorEvent::ConnectionOpened {
            query_id: query_id.clone(),
        })
        .await;

    let tenant_id = query.user_context.tenant_id.clone();
    let settings = state.current_settings();

    macro_rules! mark {
        ($label:expr) => {
            timings.insert($label.to_string(), checkpoint.elapsed().as_millis() as u64);
            checkpoint = Instant::now();
        };
    }
    macro_rules! bail_if_cancelled {
        () => {
            if cancel.is_cancelled() {
                return Err(finish_cancelled(&query, &query_id, &timings));
            }
        };
    }

    // EMBEDDING (C1) — single attempt, no retry. `EMBEDDING_UNAVAILABLE` is
    // non-retriable but not fatal: fall back to keyword-only retrieval with
    // an empty vector result set rather than failing the whole request (§4.1, §7).
    bail_if_cancelled!();
    let mut vector_stage_missing = false;
    let query_vector: Option<Vec<f32>> = match state.embedding_client.embed(&query.text).await {
        Ok(v) => Some(v),
        Err(e) => {
            tracing::warn!(error = %e, "embedding service unavailable, falling back to keyword-only retrieval");
            vector_stage_missing = true;
            None
        }
    };
    mark!("embedding");

    // SEARCH (C2, C3) — concurrent, each retried once on a transient error,
    // degraded (not aborted) if the retry also fails transiently.
    bail_if_cancelled!();
    let filter = AccessFilterBuilder::new(tenant_id.clone())
        .with_acl(&query.user_context.user_id, &query.user_context.group_ids)
        .with_language(&query.user_context.preferred_languages, false)
        .with_doc_id(query.doc_id_filter.as_deref())
        .build();

    let candidate_limit = (query.k * DEFAULT_CANDIDATE_MULTIPLIER).max(query.k);

    let vector_store = Arc::clone(&state.vector_store);
    let sparse_index = Arc::clone(&state.sparse_index);
    let vec_filter = filter.clone();
    let kw_filter = filter.clone();
    let kw_query = query.text.clone();

    let vector_fut = async move {
        match query_vector {
            Some(vector) => search_with_retry_vector(&vector_store, &vector, candidate_limit, vec_filter).await,
            None => Ok(Vec::new()),
        }
    };
    let keyword_fut =
        tokio::task::spawn_blocking(move || search_with_retry_keyword(&sparse_index, &kw_query, candidate_limit, &kw_filter));

    let (vector_outcome, keyword_outcome) = tokio::join!(vector_fut, keyword_fut);

    let vector_passages = match vector_outcome {
        Ok(passages) => passages,
        Err(e) if e.is_transient() => {
            tracing::warn!(error = %e, "vector search degraded after retry, continuing keyword-only");
            Vec::new()
        }
        Err(e) => return Err(finish_failed(&query, &query_id, &timings, &tx, e.into()).await),
    };
    let keyword_passages = match keyword_outcome {
        Ok(Ok(passages)) => passages,
        Ok(Err(e)) if e.is_transient() => {
            tracing::warn!(error = %e, "keyword search degraded after retry, continuing vector-only");
            Vec::new()
        }
        Ok(Err(e)) => return Err(finish_failed(&query, &query_id, &timings, &tx, e.into()).await),
        Err(join_err) => {
            tracing::warn!(error = %join_err, "keyword search task panicked, continuing vector-only");
            Vec::new()
        }
    };
    mark!("search");

    // FUSION (C5) — query-adaptive weight/strategy selection, then fuse.
    bail_if_cancelled!();
    let mut fusion_cfg = FusionEngineConfig::from(&state.tenant_config.fusion_for(&tenant_id));
    if fusion_cfg.query_adaptive {
        let intent = ragcore_rag::fusion::classify_intent(&query.text);
        let top_vector_norm = vector_passages.first().and_then(|p| p.vector_score).unwrap_or(0.0);
        let (weights, strategy) = ragcore_rag::fusion::adaptive_selection(intent, top_vector_norm);
        fusion_cfg.weights = weights;
        fusion_cfg.strategy = strategy;
    }
    let reranker_settings = settings.rag.reranker.clone();
    let fuse_k = if reranker_settings.enabled && state.reranker_client.is_some() {
        reranker_settings.candidate_cap.max(query.k)
    } else {
        query.k
    };
    let (fused_passages, fusion_trace) = ragcore_rag::fuse(&vector_passages, &keyword_passages, &fusion_cfg, fuse_k);
    mark!("fusion");

    // RERANK (C6) — optional; bypass (never retry) on timeout or failure.
    bail_if_cancelled!();
    let (post_rerank_passages, reranker_scores): (Vec<Passage>, Option<Vec<f32>>) =
        if reranker_settings.enabled {
            match &state.reranker_client {
                Some(reranker) => match reranker.rerank(&query.text, &fused_passages).await {
                    Ok(reranked) => {
                        let scores = reranked.iter().filter_map(|p| p.reranker_score).collect();
                        (reranked, Some(scores))
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "reranker bypassed");
                        let mut fallback = fused_passages.clone();
                        fallback.truncate(reranker_settings.final_top_k.max(query.k));
                        (fallback, None)
                    }
                },
                None => {
                    let mut fallback = fused_passages.clone();
                    fallback.truncate(reranker_settings.final_top_k.max(query.k));
                    (fallback, None)
                }
            }
        } else {
            (fused_passages.clone(), None)
        };
    mark!("rerank");

    // RECONSTRUCT (C7)
    bail_if_cancelled!();
    let reconstruction_cfg = settings.rag.reconstruction.clone();
    let (reconstructed_passages, skipped_sections) =
        match ragcore_rag::section::reconstruct(&state.vector_store, &post_rerank_passages, &filter, &reconstruction_cfg).await {
            Ok(r) => r,
            Err(e) if e.is_transient() => {
                tracing::warn!(error = %e, "section reconstruction degraded, using un-reconstructed candidates");
                (post_rerank_passages.clone(), 0)
            }
            Err(e) => return Err(finish_failed(&query, &query_id, &timings, &tx, e.into()).await),
        };
    if skipped_sections > 0 {
        tracing::debug!(skipped_sections, "reconstruction bound reached, some sections left fragmented");
    }
    mark!("reconstruct");

    // CONFIDENCE (C8)
    bail_if_cancelled!();
    let vector_scores: Vec<f32> = vector_passages.iter().filter_map(|p| p.vector_score).collect();
    let keyword_scores: Vec<f32> = keyword_passages.iter().filter_map(|p| p.keyword_score).collect();
    let fusion_scores: Vec<f32> = fused_passages.iter().map(|p| p.fused_score.unwrap_or(p.final_score)).collect();
    let guardrail_cfg = {
        let mut cfg = state.tenant_config.guardrail_for(&tenant_id);
        cfg.min_confidence = settings.effective_min_confidence(&cfg);
        cfg
    };
    let bundle = ragcore_rag::confidence::build_bundle(
        &vector_scores,
        if keyword_scores.is_empty() { None } else { Some(&keyword_scores) },
        &fusion_scores,
        reranker_scores.as_deref(),
        guardrail_cfg.confidence_method,
        vector_stage_missing,
    );
    mark!("confidence");

    // GUARDRAIL (C9)
    bail_if_cancelled!();
    let decision = ragcore_rag::guardrail::evaluate(&guardrail_cfg, &bundle, reconstructed_passages.len());
    mark!("guardrail");

    if !decision.is_answerable {
        let idk_message = decision.idk_message.clone().unwrap_or_default();
        let _ = tx
            .send(OrchestratorEvent::Chunk {
                text: idk_message.clone(),
            })
            .await;
        let summary = SynthesisSummary {
            total_chunks: 1,
            total_tokens: 0,
            response_time_ms: started.elapsed().as_millis() as u64,
            success: true,
            completion_reason: CompletionReason::Idk,
        };
        let _ = tx.send(OrchestratorEvent::Citations { citations: HashMap::new() }).await;
        let _ = tx
            .send(OrchestratorEvent::Metadata {
                synthesis_time_ms: 0,
                tokens_used: 0,
                confidence: decision.confidence,
                model_used: state.llm_client.model_name().to_string(),
                retrieved_documents: reconstructed_passages.len(),
                freshness_stats: FreshnessStats::from_passages(&reconstructed_passages),
            })
            .await;
        let _ = tx.send(OrchestratorEvent::ResponseCompleted { summary: summary.clone() }).await;
        let _ = tx.send(OrchestratorEvent::Done).await;

        let audit = build_audit(&query, &query_id, fusion_cfg.strategy, &timings, &decision, 0, "idk");
        crate::audit::emit(&audit);

        return Ok(RunOutcome {
            query_id,
            answer: idk_message,
            citations: Vec::new(),
            retrieved_documents: reconstructed_passages.clone(),
            guardrail_decision: decision,
            confidence: bundle.final_confidence,
            fusion_trace,
            audit,
        });
    }

    // PACK (C10)
    bail_if_cancelled!();
    let context_pack_cfg = settings.rag.context_pack.clone();
    let pack = ragcore_rag::context_pack::pack(&reconstructed_passages, &context_pack_cfg);
    mark!("pack");

    // SYNTH_STREAMING (C11) — `LLM_ENABLED=false` still walks PACK and the full
    // event sequence, built from one degraded completion instead of a real
    // call, so retrieval and the guardrail decision are unaffected by the flag
    // and only the answer text differs (§4.9, §8).
    let synthesis_started = Instant::now();
    let synthesis_result = if settings.llm.enabled {
        match synthesize(state, &query, &pack, &tx, &cancel).await {
            Ok(r) => r,
            Err(ragcore_core::CoreError::ClientDisconnected) => {
                return Err(finish_cancelled(&query, &query_id, &timings));
            }
            Err(e) => return Err(finish_failed(&query, &query_id, &timings, &tx, e).await),
        }
    } else {
        tracing::debug!("llm synthesis disabled, emitting degraded synthesis");
        synthesize_disabled(&pack, &tx).await
    };
    mark!("synthesis");

    let citations_map: HashMap<String, Citation> =
        synthesis_result.citations.iter().map(|c| (c.marker.clone(), c.clone())).collect();
    let _ = tx.send(OrchestratorEvent::Citations { citations: citations_map }).await;

    let synthesis_time_ms = synthesis_started.elapsed().as_millis() as u64;
    let _ = tx
        .send(OrchestratorEvent::Metadata {
            synthesis_time_ms,
            tokens_used: synthesis_result.total_tokens,
            confidence: synthesis_result.confidence,
            model_used: synthesis_result.model_used.clone(),
            retrieved_documents: reconstructed_passages.len(),
            freshness_stats: FreshnessStats::from_passages(&reconstructed_passages),
        })
        .await;

    let summary = SynthesisSummary {
        total_chunks: synthesis_result.chunks_emitted,
        total_tokens: synthesis_result.total_tokens,
        response_time_ms: started.elapsed().as_millis() as u64,
        success: !synthesis_result.fallback_used,
        completion_reason: synthesis_result.completion_reason,
    };
    let _ = tx.send(OrchestratorEvent::ResponseCompleted { summary }).await;
    let _ = tx.send(OrchestratorEvent::Done).await;

    let outcome = if synthesis_result.fallback_used { "fallback" } else { "answered" };
    let audit = build_audit(
        &query,
        &query_id,
        fusion_cfg.strategy,
        &timings,
        &decision,
        synthesis_result.citations.len(),
        outcome,
    );
    crate::audit::emit(&audit);

    Ok(RunOutcome {
        query_id,
        answer: synthesis_result.text,
        citations: synthesis_result.citations,
        retrieved_documents: reconstructed_passages.clone(),
        guardrail_decision: decision,
        confidence: bundle.final_confidence,
        fusion_trace,
        audit,
    })
}

async fn search_with_retry_vector(
    store: &ragcore_rag::VectorStore,
    vector: &[f32],
    limit: usize,
    filter: AccessFilter,
) -> Result<Vec<Passage>, RagError> {
    match store.search(vector, limit, Some(filter.clone())).await {
        Ok(r) => Ok(r),
        Err(e) if e.is_transient() => store.search(vector, limit, Some(filter)).await,
        Err(e) => Err(e),
    }
}

fn search_with_retry_keyword(
    index: &ragcore_rag::SparseIndex,
    query: &str,
    limit: usize,
    filter: &AccessFilter,
) -> Result<Vec<Passage>, RagError> {
    match index.search(query, limit, Some(filter)) {
        Ok(r) => Ok(r),
        Err(e) if e.is_transient() => index.search(query, limit, Some(filter)),
        Err(e) => Err(e),
    }
}

struct SynthesisOutcome {
    text: String,
    citations: Vec<Citation>,
    confidence: f32,
    model_used: String,
    total_tokens: usize,
    chunks_emitted: usize,
    fallback_used: bool,
    completion_reason: CompletionReason,
}

/// Drive the synthesis call, forwarding chunks as they arrive, honoring
/// `cancellationGraceMs` on cancellation, and falling back on LLM failure
/// (§4.9, §4.10). Honors `LLM_STREAMING`: when the flag is off, or the
/// configured client doesn't support streaming, falls through to
/// [`synthesize_once`] instead — the client-facing event sequence is the
/// same either way, built from a single chunk rather than many.
async fn synthesize(
    state: &AppState,
    query: &Query,
    pack: &ContextPack,
    tx: &mpsc::Sender<OrchestratorEvent>,
    cancel: &CancellationToken,
) -> Result<SynthesisOutcome, ragcore_core::CoreError> {
    let settings = state.current_settings();
    let messages = ragcore_llm::build_messages(&query.text, &pack.serialized);
    let max_tokens = settings.llm.max_tokens;

    if !settings.llm.streaming || !state.llm_client.supports_streaming() {
        return synthesize_once(state, pack, &messages, max_tokens, tx, cancel, settings.cancellation_grace_ms).await;
    }

    let (llm_tx, mut llm_rx) = mpsc::channel::<StreamEvent>(64);
    let llm_client = Arc::clone(&state.llm_client);
    let stream_handle = tokio::spawn(async move { llm_client.stream(&messages, max_tokens, llm_tx).await });
    let abort_handle = stream_handle.abort_handle();

    let mut answer_text = String::new();
    let mut total_tokens = 0usize;
    let mut model_used = state.llm_client.model_name().to_string();
    let mut llm_failed = false;
    let mut chunks_emitted = 0usize;

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                let grace = Duration::from_millis(settings.cancellation_grace_ms);
                let _ = tokio::time::timeout(grace, &mut stream_handle).await;
                abort_handle.abort();
                return Err(ragcore_core::CoreError::ClientDisconnected);
            }
            event = llm_rx.recv() => {
                match event {
                    Some(StreamEvent::Chunk(text)) => {
                        answer_text.push_str(&text);
                        chunks_emitted += 1;
                        let _ = tx.send(OrchestratorEvent::Chunk { text }).await;
                    }
                    Some(StreamEvent::Completion { total_tokens: t, model, .. }) => {
                        total_tokens = t;
                        model_used = model;
                    }
                    Some(StreamEvent::Error(message)) => {
                        tracing::warn!(%message, "llm stream reported an error, falling back to degraded synthesis");
                        llm_failed = true;
                    }
                    Some(StreamEvent::Done) | None => break,
                }
            }
        }
    }

    if let Err(join_err) = stream_handle.await {
        if !join_err.is_cancelled() {
            tracing::warn!(error = %join_err, "llm stream task panicked");
            llm_failed = true;
        }
    }

    if llm_failed || answer_text.trim().is_empty() {
        return Ok(fallback_outcome(pack, tx, model_used, total_tokens, chunks_emitted).await);
    }

    let citations = ragcore_llm::extract_citations(&answer_text, pack);
    let confidence = ragcore_llm::synthesis_confidence(&answer_text, &citations, pack);
    Ok(SynthesisOutcome {
        text: answer_text,
        citations,
        confidence,
        model_used,
        total_tokens,
        chunks_emitted,
        fallback_used: false,
        completion_reason: CompletionReason::Success,
    })
}

/// `LLM_STREAMING=false` (or a client that doesn't support streaming): one
/// blocking completion, emitted as a single chunk so the client-facing event
/// sequence is identical to the streaming path (§4.9).
async fn synthesize_once(
    state: &AppState,
    pack: &ContextPack,
    messages: &[ragcore_llm::Message],
    max_tokens: usize,
    tx: &mpsc::Sender<OrchestratorEvent>,
    cancel: &CancellationToken,
    cancellation_grace_ms: u64,
) -> Result<SynthesisOutcome, ragcore_core::CoreError> {
    let llm_client = Arc::clone(&state.llm_client);
    let owned_messages = messages.to_vec();
    let mut generate_handle = tokio::spawn(async move { llm_client.generate(&owned_messages, max_tokens).await });
    let abort_handle = generate_handle.abort_handle();
    let model_used = state.llm_client.model_name().to_string();

    let result = tokio::select! {
        _ = cancel.cancelled() => {
            let grace = Duration::from_millis(cancellation_grace_ms);
            let _ = tokio::time::timeout(grace, &mut generate_handle).await;
            abort_handle.abort();
            return Err(ragcore_core::CoreError::ClientDisconnected);
        }
        result = &mut generate_handle => result,
    };

    match result {
        Ok(Ok((text, total_tokens))) if !text.trim().is_empty() => {
            let _ = tx.send(OrchestratorEvent::Chunk { text: text.clone() }).await;
            let citations = ragcore_llm::extract_citations(&text, pack);
            let confidence = ragcore_llm::synthesis_confidence(&text, &citations, pack);
            Ok(SynthesisOutcome {
                text,
                citations,
                confidence,
                model_used,
                total_tokens,
                chunks_emitted: 1,
                fallback_used: false,
                completion_reason: CompletionReason::Success,
            })
        }
        Ok(Ok(_)) => Ok(fallback_outcome(pack, tx, model_used, 0, 0).await),
        Ok(Err(e)) => {
            tracing::warn!(error = %e, "non-streaming llm call failed, falling back to degraded synthesis");
            Ok(fallback_outcome(pack, tx, model_used, 0, 0).await)
        }
        Err(join_err) => {
            tracing::warn!(error = %join_err, "non-streaming llm task panicked");
            Ok(fallback_outcome(pack, tx, model_used, 0, 0).await)
        }
    }
}

/// Shared degraded-completion fallback: used when a real LLM call fails, and
/// when `LLM_ENABLED=false` skips the call entirely.
async fn fallback_outcome(
    pack: &ContextPack,
    tx: &mpsc::Sender<OrchestratorEvent>,
    model_used: String,
    total_tokens: usize,
    chunks_so_far: usize,
) -> SynthesisOutcome {
    let fallback = ragcore_llm::fallback_synthesis(pack);
    let fallback_chunks = if fallback.text.is_empty() {
        0
    } else {
        let _ = tx
            .send(OrchestratorEvent::Chunk {
                text: fallback.text.clone(),
            })
            .await;
        1
    };
    SynthesisOutcome {
        text: fallback.text,
        citations: fallback.citations,
        confidence: fallback.confidence,
        model_used,
        total_tokens,
        chunks_emitted: chunks_so_far + fallback_chunks,
        fallback_used: true,
        completion_reason: fallback.completion_reason,
    }
}

/// `LLM_ENABLED=false`: skip the real completion call entirely but still emit
/// the same event sequence a real synthesis would, built from one degraded
/// completion (§4.9, §8's LLM-disabled round-trip property).
async fn synthesize_disabled(pack: &ContextPack, tx: &mpsc::Sender<OrchestratorEvent>) -> SynthesisOutcome {
    fallback_outcome(pack, tx, "disabled".to_string(), 0, 0).await
}

fn hash_query(text: &str) -> String {
    let mut hasher = std::collections::hash_map::DefaultHasher::new();
    text.hash(&mut hasher);
    format!("{:016x}", hasher.finish())
}

fn build_audit(
    query: &Query,
    query_id: &str,
    strategy: FusionStrategy,
    timings: &HashMap<String, u64>,
    decision: &GuardrailDecision,
    citation_count: usize,
    outcome: &str,
) -> AuditRecord {
    AuditRecord {
        query_id: query_id.to_string(),
        query_hash: hash_query(&query.text),
        tenant_id: query.user_context.tenant_id.clone(),
        user_id: query.user_context.user_id.clone(),
        strategy,
        component_timings_ms: timings.clone(),
        final_confidence: decision.confidence,
        guardrail_decision: decision.clone(),
        citation_count,
        outcome: outcome.to_string(),
        timestamp: chrono::Utc::now(),
    }
}

async fn finish_failed(
    query: &Query,
    query_id: &str,
    timings: &HashMap<String, u64>,
    tx: &mpsc::Sender<OrchestratorEvent>,
    error: ragcore_core::CoreError,
) -> ragcore_core::CoreError {
    let _ = tx
        .send(OrchestratorEvent::Error {
            message: error.to_string(),
            code: error.code().to_string(),
        })
        .await;
    let _ = tx.send(OrchestratorEvent::Done).await;

    let decision = GuardrailDecision {
        is_answerable: false,
        confidence: 0.0,
        threshold: 0.0,
        reason_code: ragcore_core::GuardrailReasonCode::LowConfidence,
        idk_message: None,
    };
    let audit = build_audit(query, query_id, FusionStrategy::default(), timings, &decision, 0, "failed");
    crate::audit::emit(&audit);
    error
}

/// No events are sent on cancellation (§5: "no further events after
/// cancellation") — the client is already gone.
fn finish_cancelled(query: &Query, query_id: &str, timings: &HashMap<String, u64>) -> ragcore_core::CoreError {
    let decision = GuardrailDecision {
        is_answerable: false,
        confidence: 0.0,
        threshold: 0.0,
        reason_code: ragcore_core::GuardrailReasonCode::LowConfidence,
        idk_message: None,
    };
    let audit = build_audit(query, query_id, FusionStrategy::default(), timings, &decision, 0, "cancelled");
    crate::audit::emit(&audit);
    ragcore_core::CoreError::ClientDisconnected
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn query_hash_is_stable_and_deterministic() {
        assert_eq!(hash_query("what is the rate?"), hash_query("what is the rate?"));
        assert_ne!(hash_query("a"), hash_query("b"));
    }
}
