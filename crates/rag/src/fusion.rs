//! Fusion Engine (C5, §4.3).
//!
//! Generalizes the reference retriever's single reciprocal-rank-fusion pass
//! (`rrf_fusion` in the teacher's `retriever.rs`) into four selectable
//! strategies, with query-adaptive weight/strategy selection by intent.

use std::collections::HashMap;

use ragcore_config::constants::rag::{HIGH_CONFIDENCE_SHORTCUT_THRESHOLD, HIGH_CONFIDENCE_SHORTCUT_THRESHOLD_NARROW};
use ragcore_core::{FusionStrategy, FusionTraceEntry, Passage, QueryIntent, SearchType};

#[derive(Debug, Clone, Copy)]
pub struct FusionWeights {
    pub vector: f32,
    pub keyword: f32,
}

impl FusionWeights {
    pub fn new(vector: f32, keyword: f32) -> Self {
        Self { vector, keyword }
    }
}

#[derive(Debug, Clone)]
pub struct FusionConfig {
    pub strategy: FusionStrategy,
    pub weights: FusionWeights,
    pub k_param: f32,
    pub query_adaptive: bool,
    pub debug_trace: bool,
}

impl Default for FusionConfig {
    fn default() -> Self {
        Self {
            strategy: FusionStrategy::WeightedAverage,
            weights: FusionWeights::new(0.5, 0.5),
            k_param: 5.0,
            query_adaptive: true,
            debug_trace: false,
        }
    }
}

impl From<&ragcore_config::FusionConfig> for FusionConfig {
    fn from(cfg: &ragcore_config::FusionConfig) -> Self {
        Self {
            strategy: cfg.strategy,
            weights: FusionWeights::new(cfg.vector_weight, cfg.keyword_weight),
            k_param: cfg.k_param,
            query_adaptive: cfg.query_adaptive_weights,
            debug_trace: cfg.debug_trace,
        }
    }
}

/// Classify a query into an intent bucket by lightweight keyword/shape
/// heuristics (§4.3). Order matters: the first matching rule wins.
pub fn classify_intent(query: &str) -> QueryIntent {
    let lower = query.to_lowercase();
    let words: Vec<&str> = lower.split_whitespace().collect();

    let starts_with_any = |prefixes: &[&str]| words.first().is_some_and(|w| prefixes.contains(w));

    if starts_with_any(&["what", "define", "definition"]) || lower.contains("what is") || lower.contains("what are") {
        QueryIntent::Definition
    } else if starts_with_any(&["how much", "how many"])
        || lower.contains("how much")
        || lower.contains("how many")
        || lower.contains("rate")
        || lower.contains("percentage")
        || lower.contains("interest")
    {
        QueryIntent::Measurement
    } else if starts_with_any(&["how"]) || lower.contains("steps") || lower.contains("process for") {
        QueryIntent::Procedure
    } else if lower.split_whitespace().count() <= 3 || query.chars().next().is_some_and(|c| c.is_uppercase()) {
        QueryIntent::EntityLookup
    } else {
        QueryIntent::Exploratory
    }
}

/// Select weights and strategy for the classified intent (§4.3), deferring to
/// the high-confidence shortcut when the top vector score warrants it.
pub fn adaptive_selection(intent: QueryIntent, top_vector_norm: f32) -> (FusionWeights, FusionStrategy) {
    let (weights, base_strategy) = match intent {
        QueryIntent::Definition | QueryIntent::Measurement | QueryIntent::Procedure => {
            (FusionWeights::new(0.5, 0.5), FusionStrategy::WeightedAverage)
        }
        QueryIntent::EntityLookup | QueryIntent::Exploratory => {
            (FusionWeights::new(0.7, 0.3), FusionStrategy::WeightedAverage)
        }
    };

    let first_three = matches!(
        intent,
        QueryIntent::Definition | QueryIntent::Measurement | QueryIntent::Procedure
    );
    let shortcut = top_vector_norm >= HIGH_CONFIDENCE_SHORTCUT_THRESHOLD
        || (first_three && top_vector_norm >= HIGH_CONFIDENCE_SHORTCUT_THRESHOLD_NARROW);

    if shortcut {
        (weights, FusionStrategy::MaxConfidence)
    } else {
        (weights, base_strategy)
    }
}

struct Candidate {
    passage: Passage,
    rank_vec: Option<usize>,
    rank_kw: Option<usize>,
    raw_vec: Option<f32>,
    raw_kw: Option<f32>,
}

/// Min-max normalize raw scores over a source list; a constant (or singleton)
/// list normalizes every member to 0.5 (§4.3).
fn min_max_normalize(scores: &[(String, f32)]) -> HashMap<String, f32> {
    if scores.is_empty() {
        return HashMap::new();
    }
    let min = scores.iter().map(|(_, s)| *s).fold(f32::INFINITY, f32::min);
    let max = scores.iter().map(|(_, s)| *s).fold(f32::NEG_INFINITY, f32::max);
    scores
        .iter()
        .map(|(id, s)| {
            let norm = if (max - min).abs() < f32::EPSILON { 0.5 } else { (s - min) / (max - min) };
            (id.clone(), norm)
        })
        .collect()
}

/// Fuse vector and keyword result lists into a single ordered list of length
/// `≤ k` (§4.3). Returns the fused passages and, when `debug_trace` is set,
/// the per-candidate trace entries.
pub fn fuse(
    vector_results: &[Passage],
    keyword_results: &[Passage],
    config: &FusionConfig,
    k: usize,
) -> (Vec<Passage>, Vec<FusionTraceEntry>) {
    let vec_raw: Vec<(String, f32)> = vector_results.iter().map(|p| (p.id.clone(), p.vector_score.unwrap_or(0.0))).collect();
    let kw_raw: Vec<(String, f32)> = keyword_results.iter().map(|p| (p.id.clone(), p.keyword_score.unwrap_or(0.0))).collect();

    let vec_norm = min_max_normalize(&vec_raw);
    let kw_norm = min_max_normalize(&kw_raw);

    let mut candidates: HashMap<String, Candidate> = HashMap::new();

    for (rank, passage) in vector_results.iter().enumerate() {
        candidates.insert(
            passage.id.clone(),
            Candidate {
                passage: passage.clone(),
                rank_vec: Some(rank + 1),
                rank_kw: None,
                raw_vec: passage.vector_score,
                raw_kw: None,
            },
        );
    }
    for (rank, passage) in keyword_results.iter().enumerate() {
        candidates
            .entry(passage.id.clone())
            .and_modify(|c| {
                c.rank_kw = Some(rank + 1);
                c.raw_kw = passage.keyword_score;
                c.passage.keyword_score = passage.keyword_score;
                c.passage.search_type = SearchType::Hybrid;
            })
            .or_insert(Candidate {
                passage: passage.clone(),
                rank_vec: None,
                rank_kw: Some(rank + 1),
                raw_vec: None,
                raw_kw: passage.keyword_score,
            });
    }

    let w = config.weights;
    let k_p = config.k_param;

    let mut trace = Vec::with_capacity(candidates.len());
    let mut fused: Vec<Passage> = Vec::with_capacity(candidates.len());

    for (id, candidate) in candidates {
        let nv = candidate.rank_vec.map(|_| *vec_norm.get(&id).unwrap_or(&0.0));
        let nk = candidate.rank_kw.map(|_| *kw_norm.get(&id).unwrap_or(&0.0));
        let norm_vec = nv.unwrap_or(0.0);
        let norm_kw = nk.unwrap_or(0.0);

        let fused_score = match config.strategy {
            FusionStrategy::WeightedAverage => match (nv, nk) {
                (Some(v), Some(k)) => w.vector * v + w.keyword * k,
                (Some(v), None) => v,
                (None, Some(k)) => k,
                (None, None) => 0.0,
            },
            FusionStrategy::ScoreWeightedRrf => {
                let v_term = candidate.rank_vec.map(|r| w.vector * norm_vec / (r as f32 + k_p)).unwrap_or(0.0);
                let k_term = candidate.rank_kw.map(|r| w.keyword * norm_kw / (r as f32 + k_p)).unwrap_or(0.0);
                v_term + k_term
            }
            FusionStrategy::MaxConfidence => norm_vec.max(norm_kw),
            FusionStrategy::BordaRank => {
                let v_term = candidate.rank_vec.map(|r| w.vector / (r as f32 + k_p)).unwrap_or(0.0);
                let k_term = candidate.rank_kw.map(|r| w.keyword / (r as f32 + k_p)).unwrap_or(0.0);
                v_term + k_term
            }
        };

        let mut passage = candidate.passage;
        passage.fused_score = Some(fused_score);
        passage.final_score = fused_score;

        if config.debug_trace {
            trace.push(FusionTraceEntry {
                id: id.clone(),
                rank_vec: candidate.rank_vec,
                rank_kw: candidate.rank_kw,
                norm_vec: nv,
                norm_kw: nk,
                strategy: config.strategy,
                fused_score,
            });
        }

        fused.push(passage);
        let _ = (candidate.raw_vec, candidate.raw_kw);
    }

    // Ties: higher norm_v, then higher norm_kw, then lexicographic id (§4.3).
    fused.sort_by(|a, b| {
        b.fused_score
            .partial_cmp(&a.fused_score)
            .unwrap()
            .then_with(|| {
                let a_nv = a.vector_score.unwrap_or(0.0);
                let b_nv = b.vector_score.unwrap_or(0.0);
                b_nv.partial_cmp(&a_nv).unwrap()
            })
            .then_with(|| {
                let a_nk = a.keyword_score.unwrap_or(0.0);
                let b_nk = b.keyword_score.unwrap_or(0.0);
                b_nk.partial_cmp(&a_nk).unwrap()
            })
            .then_with(|| a.id.cmp(&b.id))
    });

    fused.truncate(k);
    if config.debug_trace {
        trace.sort_by(|a, b| b.fused_score.partial_cmp(&a.fused_score).unwrap());
    } else {
        trace.clear();
    }

    (fused, trace)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ragcore_core::PassagePayload;

    fn passage(id: &str, vector_score: Option<f32>, keyword_score: Option<f32>) -> Passage {
        Passage {
            id: id.to_string(),
            content: "content".to_string(),
            vector_score,
            keyword_score,
            fused_score: None,
            reranker_score: None,
            final_score: 0.0,
            search_type: SearchType::VectorOnly,
            payload: PassagePayload {
                tenant_id: "tenant-a".to_string(),
                doc_id: "doc-1".to_string(),
                acl: vec!["public".to_string()],
                language: "en".to_string(),
                section_path: None,
                created_at: Utc::now(),
                modified_at: Utc::now(),
                url: None,
                title: None,
            },
        }
    }

    #[test]
    fn weighted_average_uses_full_weight_when_only_one_source_has_the_id() {
        let vec_results = vec![passage("a", Some(1.0), None), passage("b", Some(0.5), None)];
        let kw_results = vec![passage("c", None, Some(1.0))];
        let config = FusionConfig::default();
        let (fused, _) = fuse(&vec_results, &kw_results, &config, 10);
        let c = fused.iter().find(|p| p.id == "c").unwrap();
        assert!((c.final_score - 1.0).abs() < 1e-5);
    }

    #[test]
    fn borda_rank_collapses_scores_with_large_k_param() {
        let vec_results = vec![passage("a", Some(1.0), None)];
        let kw_results = vec![];
        let mut config = FusionConfig {
            strategy: FusionStrategy::BordaRank,
            ..Default::default()
        };
        config.k_param = ragcore_config::constants::rag::LEGACY_BORDA_K_PARAM;
        let (fused, _) = fuse(&vec_results, &kw_results, &config, 10);
        assert!(fused[0].final_score < 0.02);
    }

    #[test]
    fn truncates_to_k() {
        let vec_results: Vec<Passage> = (0..20).map(|i| passage(&format!("v{i}"), Some(1.0 - i as f32 * 0.01), None)).collect();
        let (fused, _) = fuse(&vec_results, &[], &FusionConfig::default(), 5);
        assert_eq!(fused.len(), 5);
    }

    #[test]
    fn debug_trace_empty_when_disabled() {
        let vec_results = vec![passage("a", Some(1.0), None)];
        let (_, trace) = fuse(&vec_results, &[], &FusionConfig::default(), 5);
        assert!(trace.is_empty());
    }

    #[test]
    fn high_confidence_shortcut_switches_to_max_confidence() {
        let (_, strategy) = adaptive_selection(QueryIntent::Exploratory, 0.8);
        assert_eq!(strategy, FusionStrategy::MaxConfidence);
    }

    #[test]
    fn definition_intent_uses_balanced_weights_below_shortcut() {
        let (weights, strategy) = adaptive_selection(QueryIntent::Definition, 0.5);
        assert_eq!(strategy, FusionStrategy::WeightedAverage);
        assert!((weights.vector - 0.5).abs() < 1e-6);
    }
}
