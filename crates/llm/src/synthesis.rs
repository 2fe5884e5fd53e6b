//! Citation extraction, synthesis confidence, and the degraded fallback (§4.9).

use ragcore_core::{Citation, CompletionReason, ContextPack};

const RESCUE_MIN_CONSECUTIVE_TOKENS: usize = 3;
const FALLBACK_EXCERPT_CHARS: usize = 300;

/// Result of synthesizing an answer from a context pack: the generated text,
/// its citations, a confidence score, and whether the degraded fallback fired.
#[derive(Debug, Clone)]
pub struct SynthesisResult {
    pub text: String,
    pub citations: Vec<Citation>,
    pub confidence: f32,
    pub fallback_used: bool,
    pub completion_reason: CompletionReason,
}

/// Extract citations from generated `text`: explicit `[^n]` markers matched
/// to pack entries by number, then a rule-based rescue pass for unmarked
/// spans that substring-match ≥3 consecutive non-trivial tokens of a
/// passage's content.
pub fn extract_citations(text: &str, pack: &ContextPack) -> Vec<Citation> {
    let mut citations = Vec::new();
    let mut cited_markers = std::collections::HashSet::new();

    for entry in &pack.entries {
        let needle = format!("[^{}]", entry.marker);
        if text.contains(&needle) {
            cited_markers.insert(entry.marker.clone());
            citations.push(citation_from_entry(entry, false));
        }
    }

    for entry in &pack.entries {
        if cited_markers.contains(&entry.marker) {
            continue;
        }
        if rescue_match(text, &entry.passage.content) {
            cited_markers.insert(entry.marker.clone());
            citations.push(citation_from_entry(entry, true));
        }
    }

    citations
}

fn citation_from_entry(entry: &ragcore_core::ContextEntry, rule_based: bool) -> Citation {
    let passage = &entry.passage;
    let excerpt: String = passage.content.chars().take(FALLBACK_EXCERPT_CHARS).collect();
    Citation {
        marker: entry.marker.clone(),
        passage_id: passage.id.clone(),
        doc_id: passage.payload.doc_id.clone(),
        url: passage.payload.url.clone(),
        title: passage.payload.title.clone(),
        excerpt,
        relevance_score: passage.final_score,
        rule_based,
    }
}

/// Does `text` contain a run of ≥3 consecutive non-trivial tokens from
/// `passage_content`, as a literal substring? Non-trivial excludes tokens of
/// length < 3 (stopword-ish noise), mirroring the kind of minimal-content
/// filter the corpus applies to keyword tokens.
fn rescue_match(text: &str, passage_content: &str) -> bool {
    let tokens: Vec<&str> = passage_content.split_whitespace().filter(|t| t.len() >= 3).collect();
    if tokens.len() < RESCUE_MIN_CONSECUTIVE_TOKENS {
        return false;
    }
    let lower_text = text.to_lowercase();
    for window in tokens.windows(RESCUE_MIN_CONSECUTIVE_TOKENS) {
        let span = window.join(" ").to_lowercase();
        if lower_text.contains(&span) {
            return true;
        }
    }
    false
}

/// `0.4·citationCoverage + 0.4·avgCitationRelevance + 0.2·lengthPenalty` (§4.9).
/// `citationCoverage` is the fraction of pack entries that ended up cited.
pub fn synthesis_confidence(text: &str, citations: &[Citation], pack: &ContextPack) -> f32 {
    let coverage = if pack.entries.is_empty() {
        0.0
    } else {
        citations.len() as f32 / pack.entries.len() as f32
    }
    .min(1.0);

    let avg_relevance = if citations.is_empty() {
        0.0
    } else {
        citations.iter().map(|c| c.relevance_score).sum::<f32>() / citations.len() as f32
    };

    let length_penalty = match text.chars().count() {
        0..=49 => 0.5,
        50..=2000 => 1.0,
        _ => 0.8,
    };

    (0.4 * coverage + 0.4 * avg_relevance + 0.2 * length_penalty).clamp(0.0, 1.0)
}

/// Degraded synthesis on LLM failure: the highest-scoring passage's first
/// 300 characters plus a single citation (§4.9).
pub fn fallback_synthesis(pack: &ContextPack) -> SynthesisResult {
    let Some(top_entry) = pack.entries.iter().max_by(|a, b| a.passage.final_score.partial_cmp(&b.passage.final_score).unwrap()) else {
        return SynthesisResult {
            text: String::new(),
            citations: Vec::new(),
            confidence: 0.0,
            fallback_used: true,
            completion_reason: CompletionReason::Fallback,
        };
    };

    let excerpt: String = top_entry.passage.content.chars().take(FALLBACK_EXCERPT_CHARS).collect();
    let citation = citation_from_entry(top_entry, false);

    SynthesisResult {
        text: excerpt,
        citations: vec![citation],
        confidence: top_entry.passage.final_score,
        fallback_used: true,
        completion_reason: CompletionReason::Fallback,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ragcore_core::{ContextEntry, Passage, PassagePayload, SearchType};

    fn entry(marker: &str, content: &str, score: f32) -> ContextEntry {
        ContextEntry {
            marker: marker.to_string(),
            passage: Passage {
                id: format!("p-{marker}"),
                content: content.to_string(),
                vector_score: None,
                keyword_score: None,
                fused_score: None,
                reranker_score: None,
                final_score: score,
                search_type: SearchType::Hybrid,
                payload: PassagePayload {
                    tenant_id: "tenant-a".to_string(),
                    doc_id: format!("doc-{marker}"),
                    acl: vec!["public".to_string()],
                    language: "en".to_string(),
                    section_path: None,
                    created_at: Utc::now(),
                    modified_at: Utc::now(),
                    url: Some("https://example.com".to_string()),
                    title: Some("Title".to_string()),
                },
            },
        }
    }

    fn pack(entries: Vec<ContextEntry>) -> ContextPack {
        ContextPack { entries, serialized: String::new(), token_count: 0, truncated: false }
    }

    #[test]
    fn extracts_explicit_marker_citations() {
        let context = pack(vec![entry("1", "the capital of France is Paris", 0.9)]);
        let text = "The capital is Paris [^1].";
        let citations = extract_citations(text, &context);
        assert_eq!(citations.len(), 1);
        assert!(!citations[0].rule_based);
    }

    #[test]
    fn rescue_pass_tags_rule_based_citation() {
        let context = pack(vec![entry("1", "the annual interest rate is capped at twelve percent", 0.9)]);
        let text = "The annual interest rate is capped at twelve percent according to the policy.";
        let citations = extract_citations(text, &context);
        assert_eq!(citations.len(), 1);
        assert!(citations[0].rule_based);
    }

    #[test]
    fn short_text_gets_length_penalty_half() {
        let context = pack(vec![entry("1", "short", 1.0)]);
        let citations = vec![citation_from_entry(&context.entries[0], false)];
        let confidence = synthesis_confidence("no", &citations, &context);
        assert!(confidence > 0.0);
    }

    #[test]
    fn fallback_uses_highest_scoring_passage() {
        let context = pack(vec![entry("1", "low score content here", 0.2), entry("2", "high score content here", 0.95)]);
        let result = fallback_synthesis(&context);
        assert!(result.fallback_used);
        assert_eq!(result.citations.len(), 1);
        assert_eq!(result.citations[0].passage_id, "p-2");
        assert_eq!(result.completion_reason, CompletionReason::Fallback);
    }
}
