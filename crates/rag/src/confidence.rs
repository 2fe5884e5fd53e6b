//! Source-Aware Confidence (C8, §4.6).
//!
//! Per-stage confidence from a raw score list, quality preservation across
//! the fusion boundary, degradation alerts, and the final-confidence
//! strategy selection that keeps an upstream score collapse from being
//! averaged away.

use ragcore_config::constants::rag::{
    CONFIDENCE_MIN_COUNT_FOR_NO_PENALTY as MIN_COUNT_FOR_NO_PENALTY, CONFIDENCE_TOP_N as TOP_N,
    QUALITY_PRESERVATION_CRITICAL, QUALITY_PRESERVATION_DEGRADED,
};
use ragcore_config::ConfidenceMethod;
use ragcore_core::{ConfidenceBundle, ConfidenceStrategy, DegradationAlert, StageConfidence};

/// `stageConfidence = 0.5*topScore + 0.3*meanScore + 0.2*(1 - min(1, stdDev))`,
/// with a small floor penalty when fewer than 3 items back the stage.
pub fn stage_confidence(scores: &[f32]) -> StageConfidence {
    if scores.is_empty() {
        return StageConfidence {
            top_score: 0.0,
            mean_score: 0.0,
            std_dev: 0.0,
            count: 0,
            confidence: 0.0,
            quality_preservation: None,
        };
    }

    let mut sorted: Vec<f32> = scores.to_vec();
    sorted.sort_by(|a, b| b.partial_cmp(a).unwrap());
    let top_n: Vec<f32> = sorted.into_iter().take(TOP_N).collect();

    let count = top_n.len();
    let top_score = top_n[0];
    let mean_score = top_n.iter().sum::<f32>() / count as f32;
    let variance = top_n.iter().map(|s| (s - mean_score).powi(2)).sum::<f32>() / count as f32;
    let std_dev = variance.sqrt();

    let mut confidence = 0.5 * top_score + 0.3 * mean_score + 0.2 * (1.0 - std_dev.min(1.0));
    if scores.len() < MIN_COUNT_FOR_NO_PENALTY {
        confidence *= 0.5 + 0.5 * (scores.len() as f32 / MIN_COUNT_FOR_NO_PENALTY as f32);
    }

    StageConfidence {
        top_score,
        mean_score,
        std_dev,
        count,
        confidence: confidence.clamp(0.0, 1.0),
        quality_preservation: None,
    }
}

/// `qp = clamp(fusion.topScore / max(vector.topScore, keyword.topScore), 0, 1)`.
pub fn quality_preservation(fusion: &StageConfidence, vector: &StageConfidence, keyword: Option<&StageConfidence>) -> f32 {
    let upstream_top = vector.top_score.max(keyword.map(|k| k.top_score).unwrap_or(0.0));
    if upstream_top <= f32::EPSILON {
        return 1.0;
    }
    (fusion.top_score / upstream_top).clamp(0.0, 1.0)
}

fn degradation_alert(stage: &str, qp: f32, previous_confidence: f32, current_confidence: f32) -> Option<DegradationAlert> {
    if qp >= QUALITY_PRESERVATION_DEGRADED {
        return None;
    }
    let severity = 1.0 - qp;
    Some(DegradationAlert {
        stage: stage.to_string(),
        severity,
        previous_confidence,
        current_confidence,
        description: format!("{stage} preserved only {:.0}% of upstream top score", qp * 100.0),
        recommendation: "inspect fusion weights and source score distributions".to_string(),
        critical: qp < QUALITY_PRESERVATION_CRITICAL,
    })
}

/// Assemble the full confidence bundle for a request (§4.6). `reranker_scores`
/// is `None` when the reranker was bypassed or disabled.
pub fn build_bundle(
    vector_scores: &[f32],
    keyword_scores: Option<&[f32]>,
    fusion_scores: &[f32],
    reranker_scores: Option<&[f32]>,
    method: ConfidenceMethod,
    vector_stage_missing: bool,
) -> ConfidenceBundle {
    let vector = stage_confidence(vector_scores);
    let keyword = keyword_scores.map(stage_confidence);
    let mut fusion = stage_confidence(fusion_scores);

    let fusion_qp = quality_preservation(&fusion, &vector, keyword.as_ref());
    fusion.quality_preservation = Some(fusion_qp);

    let mut alerts = Vec::new();
    if let Some(alert) = degradation_alert("fusion", fusion_qp, vector.confidence, fusion.confidence) {
        alerts.push(alert);
    }

    let reranker = reranker_scores.map(|scores| {
        let mut reranker_stage = stage_confidence(scores);
        let reranker_qp = quality_preservation(&reranker_stage, &fusion, None);
        reranker_stage.quality_preservation = Some(reranker_qp);
        if let Some(alert) = degradation_alert("reranker", reranker_qp, fusion.confidence, reranker_stage.confidence) {
            alerts.push(alert);
        }
        reranker_stage
    });

    let (final_confidence, strategy) = match method {
        ConfidenceMethod::MeanOfTopChunks => {
            let mean = fusion_scores.iter().take(TOP_N).sum::<f32>() / fusion_scores.len().max(1) as f32;
            (mean.clamp(0.0, 1.0), ConfidenceStrategy::WeightedBlend)
        }
        ConfidenceMethod::SourceAware => select_final_confidence(&vector, keyword.as_ref(), &fusion, reranker.as_ref(), &alerts),
    };

    ConfidenceBundle {
        vector,
        keyword,
        fusion,
        reranker,
        degradation_alerts: alerts,
        final_confidence,
        strategy,
        vector_stage_missing,
    }
}

/// Final-confidence strategy selection, in priority order (§4.6). Averaging
/// across stages would hide the exact failure this module exists to catch —
/// score collapse from rank-only fusion — so each branch picks a single
/// stage's confidence rather than blending unconditionally.
fn select_final_confidence(
    vector: &StageConfidence,
    keyword: Option<&StageConfidence>,
    fusion: &StageConfidence,
    reranker: Option<&StageConfidence>,
    alerts: &[DegradationAlert],
) -> (f32, ConfidenceStrategy) {
    let upstream_top = vector.top_score.max(keyword.map(|k| k.top_score).unwrap_or(0.0));
    if alerts.iter().any(|a| a.critical) && upstream_top >= 0.7 {
        return (upstream_top, ConfidenceStrategy::TrustSource);
    }

    let reranker_degraded = alerts.iter().any(|a| a.stage == "reranker");
    if let Some(reranker) = reranker {
        if !reranker_degraded {
            return (reranker.confidence, ConfidenceStrategy::MaxConfidence);
        }
    }

    let fusion_qp = fusion.quality_preservation.unwrap_or(1.0);
    if fusion_qp >= QUALITY_PRESERVATION_DEGRADED {
        let blend = 0.6 * fusion.confidence + 0.4 * upstream_top.max(fusion.confidence);
        return (blend.clamp(0.0, 1.0), ConfidenceStrategy::WeightedBlend);
    }

    let fallback = vector
        .confidence
        .max(keyword.map(|k| k.confidence).unwrap_or(0.0))
        .max(fusion.confidence);
    (fallback, ConfidenceStrategy::DegradedFallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_confidence_of_empty_scores_is_zero() {
        let sc = stage_confidence(&[]);
        assert_eq!(sc.confidence, 0.0);
        assert_eq!(sc.count, 0);
    }

    #[test]
    fn stage_confidence_penalizes_small_counts() {
        let small = stage_confidence(&[0.9]);
        let large = stage_confidence(&[0.9, 0.9, 0.9, 0.9, 0.9]);
        assert!(small.confidence < large.confidence);
    }

    #[test]
    fn quality_preservation_is_one_when_no_upstream_signal() {
        let fusion = stage_confidence(&[0.5]);
        let vector = stage_confidence(&[]);
        assert_eq!(quality_preservation(&fusion, &vector, None), 1.0);
    }

    #[test]
    fn critical_degradation_alert_below_020_quality_preservation() {
        let fusion = stage_confidence(&[0.05]);
        let vector = stage_confidence(&[0.9]);
        let qp = quality_preservation(&fusion, &vector, None);
        let alert = degradation_alert("fusion", qp, vector.confidence, fusion.confidence).unwrap();
        assert!(alert.critical);
    }

    #[test]
    fn trust_source_wins_when_critical_and_upstream_strong() {
        let vector_scores = vec![0.95, 0.9, 0.85];
        let fusion_scores = vec![0.02, 0.01];
        let bundle = build_bundle(&vector_scores, None, &fusion_scores, None, ConfidenceMethod::SourceAware, false);
        assert_eq!(bundle.strategy, ConfidenceStrategy::TrustSource);
        assert!((bundle.final_confidence - 0.95).abs() < 1e-5);
    }

    #[test]
    fn weighted_blend_used_when_preservation_is_healthy() {
        let vector_scores = vec![0.8, 0.75, 0.7];
        let fusion_scores = vec![0.78, 0.7, 0.6];
        let bundle = build_bundle(&vector_scores, None, &fusion_scores, None, ConfidenceMethod::SourceAware, false);
        assert_eq!(bundle.strategy, ConfidenceStrategy::WeightedBlend);
    }
}
