//! Answerability Guardrail (C9, §4.7).
//!
//! Evaluates per-tenant thresholds against the post-reconstruction,
//! post-reranker candidate set and the final confidence. The first failed
//! check names the reason code; all five must pass for `answerable=true`.

use ragcore_config::GuardrailConfig;
use ragcore_core::{ConfidenceBundle, GuardrailDecision, GuardrailReasonCode, StageConfidence};

/// Evaluate the guardrail against the stage that best represents the final
/// candidate set (reranker if present, else fusion).
pub fn evaluate(config: &GuardrailConfig, bundle: &ConfidenceBundle, result_count: usize) -> GuardrailDecision {
    let representative: &StageConfidence = bundle.reranker.as_ref().unwrap_or(&bundle.fusion);

    let reason_code = if result_count < config.min_result_count {
        Some(GuardrailReasonCode::NoRelevantDocs)
    } else if representative.top_score < config.min_top_score {
        Some(GuardrailReasonCode::DegradedFusion)
    } else if representative.mean_score < config.min_mean_score {
        Some(GuardrailReasonCode::DegradedFusion)
    } else if representative.std_dev > config.max_std_dev {
        Some(GuardrailReasonCode::DegradedFusion)
    } else if bundle.degradation_alerts.iter().any(|a| a.critical) {
        Some(GuardrailReasonCode::RerankerReject)
    } else if bundle.final_confidence < config.min_confidence {
        Some(GuardrailReasonCode::LowConfidence)
    } else {
        None
    };

    match reason_code {
        None => GuardrailDecision {
            is_answerable: true,
            confidence: bundle.final_confidence,
            threshold: config.min_confidence,
            reason_code: GuardrailReasonCode::Answerable,
            idk_message: None,
        },
        Some(reason_code) => GuardrailDecision {
            is_answerable: false,
            confidence: bundle.final_confidence,
            threshold: config.min_confidence,
            reason_code,
            idk_message: Some(config.idk_message.clone()),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ragcore_core::ConfidenceStrategy;

    fn stage(top: f32, mean: f32, std_dev: f32) -> StageConfidence {
        StageConfidence {
            top_score: top,
            mean_score: mean,
            std_dev,
            count: 5,
            confidence: top,
            quality_preservation: None,
        }
    }

    fn bundle(fusion: StageConfidence, final_confidence: f32) -> ConfidenceBundle {
        ConfidenceBundle {
            vector: stage(0.5, 0.4, 0.2),
            keyword: None,
            fusion,
            reranker: None,
            degradation_alerts: vec![],
            final_confidence,
            strategy: ConfidenceStrategy::WeightedBlend,
            vector_stage_missing: false,
        }
    }

    #[test]
    fn answerable_when_all_thresholds_pass() {
        let config = GuardrailConfig::default();
        let decision = evaluate(&config, &bundle(stage(0.8, 0.7, 0.2), 0.8), 5);
        assert!(decision.is_answerable);
        assert_eq!(decision.reason_code, GuardrailReasonCode::Answerable);
        assert!(decision.idk_message.is_none());
    }

    #[test]
    fn no_relevant_docs_when_result_count_too_low() {
        let mut config = GuardrailConfig::default();
        config.min_result_count = 2;
        let decision = evaluate(&config, &bundle(stage(0.8, 0.7, 0.2), 0.8), 1);
        assert!(!decision.is_answerable);
        assert_eq!(decision.reason_code, GuardrailReasonCode::NoRelevantDocs);
        assert!(decision.idk_message.is_some());
    }

    #[test]
    fn low_confidence_reason_code_when_only_final_confidence_fails() {
        let config = GuardrailConfig::default();
        let decision = evaluate(&config, &bundle(stage(0.3, 0.2, 0.3), 0.1), 5);
        assert_eq!(decision.reason_code, GuardrailReasonCode::LowConfidence);
    }
}
