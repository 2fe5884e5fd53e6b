//! Context Packer (C10, §4.8).
//!
//! Orders candidates by `finalScore`, tags each with `[^n]`, and concatenates
//! into a context block subject to a token budget. Token estimation mirrors
//! the grapheme-based approximation used for chunking (§4.8's "approximate
//! tokenizer" is this same heuristic, not a real tokenizer dependency).

use unicode_segmentation::UnicodeSegmentation;

use ragcore_config::ContextPackConfig;
use ragcore_core::{ContextEntry, ContextPack, Passage};

fn estimate_tokens(text: &str) -> usize {
    let grapheme_count = text.graphemes(true).count();
    let devanagari_count = text.chars().filter(|c| ('\u{0900}'..='\u{097F}').contains(c)).count();
    if devanagari_count > grapheme_count / 3 {
        grapheme_count.max(1) / 2
    } else {
        grapheme_count.max(1) / 4
    }
}

/// Truncate `text` to at most `max_tokens` (estimated) on a sentence
/// boundary, appending an ellipsis when truncated.
fn truncate_to_budget(text: &str, max_tokens: usize) -> (String, bool) {
    if estimate_tokens(text) <= max_tokens {
        return (text.to_string(), false);
    }

    let sentences: Vec<&str> = text.split_inclusive(['.', '!', '?']).collect();
    let mut out = String::new();
    for sentence in &sentences {
        let candidate_tokens = estimate_tokens(&format!("{out}{sentence}"));
        if candidate_tokens > max_tokens && !out.is_empty() {
            break;
        }
        out.push_str(sentence);
    }

    if out.is_empty() {
        // No sentence boundary found within budget; hard-truncate by grapheme.
        let target_graphemes = (max_tokens * 4).max(1);
        out = text.graphemes(true).take(target_graphemes).collect();
    }

    (format!("{}…", out.trim_end()), true)
}

/// Build the context pack (§4.8). `passages` must already be ordered by the
/// guardrail's admitted candidate set; this function re-sorts defensively by
/// `finalScore` to keep the ordering invariant local to one place.
pub fn pack(passages: &[Passage], config: &ContextPackConfig) -> ContextPack {
    let mut ordered: Vec<&Passage> = passages.iter().collect();
    ordered.sort_by(|a, b| b.final_score.partial_cmp(&a.final_score).unwrap());

    let mut entries = Vec::new();
    let mut serialized = String::new();
    let mut token_count = 0usize;
    let mut truncated_budget = false;

    for (index, passage) in ordered.into_iter().enumerate() {
        let marker = index + 1;
        let (content, passage_truncated) = truncate_to_budget(&passage.content, config.per_passage_token_cap);
        let passage_tokens = estimate_tokens(&content);

        if token_count + passage_tokens > config.token_budget {
            truncated_budget = true;
            break;
        }

        let metadata_line = format_metadata(passage);
        serialized.push_str(&format!("[^{marker}] {metadata_line}\n{content}\n\n"));
        token_count += passage_tokens;

        let mut entry_passage = passage.clone();
        entry_passage.content = content;
        entries.push(ContextEntry {
            marker: marker.to_string(),
            passage: entry_passage,
        });

        let _ = passage_truncated;
    }

    ContextPack {
        entries,
        serialized,
        token_count,
        truncated: truncated_budget,
    }
}

fn format_metadata(passage: &Passage) -> String {
    let title = passage.payload.title.as_deref().unwrap_or("untitled");
    let url = passage.payload.url.as_deref().unwrap_or("");
    format!("{title} ({url}, modified {})", passage.payload.modified_at.to_rfc3339())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ragcore_core::{PassagePayload, SearchType};

    fn passage(id: &str, content: &str, score: f32) -> Passage {
        Passage {
            id: id.to_string(),
            content: content.to_string(),
            vector_score: None,
            keyword_score: None,
            fused_score: None,
            reranker_score: None,
            final_score: score,
            search_type: SearchType::Hybrid,
            payload: PassagePayload {
                tenant_id: "tenant-a".to_string(),
                doc_id: "doc-1".to_string(),
                acl: vec!["public".to_string()],
                language: "en".to_string(),
                section_path: None,
                created_at: Utc::now(),
                modified_at: Utc::now(),
                url: Some("https://example.com".to_string()),
                title: Some("Title".to_string()),
            },
        }
    }

    #[test]
    fn orders_by_final_score_and_tags_sequentially() {
        let passages = vec![passage("a", "low score content", 0.2), passage("b", "high score content", 0.9)];
        let config = ContextPackConfig::default();
        let pack_result = pack(&passages, &config);
        assert_eq!(pack_result.entries[0].passage.id, "b");
        assert_eq!(pack_result.entries[0].marker, "1");
        assert_eq!(pack_result.entries[1].marker, "2");
    }

    #[test]
    fn per_passage_cap_truncates_with_ellipsis() {
        let long_content = "This is a sentence. ".repeat(200);
        let (truncated, was_truncated) = truncate_to_budget(&long_content, 20);
        assert!(was_truncated);
        assert!(truncated.ends_with('…'));
    }

    #[test]
    fn token_budget_drops_tail_passages() {
        let passages: Vec<Passage> = (0..50).map(|i| passage(&format!("p{i}"), &"word ".repeat(100), 1.0 - i as f32 * 0.001)).collect();
        let mut config = ContextPackConfig::default();
        config.token_budget = 50;
        let pack_result = pack(&passages, &config);
        assert!(pack_result.truncated);
        assert!(pack_result.entries.len() < passages.len());
    }
}
