//! Audit emission (§3, §11). Exactly one `AuditRecord` is emitted per
//! request, on whatever path reaches a terminal orchestrator state. A record
//! never carries passage content or raw query text — only the query hash,
//! ids, timings and scores already present on `AuditRecord` — so this module
//! has nothing to redact before logging.

use ragcore_core::AuditRecord;

/// Emit one structured log line per terminal request. Downstream collection
/// (an OTLP/log pipeline) treats `target = "ragcore_audit"` as the stable
/// selector for this event stream, independent of whatever else the process
/// logs at the same level.
pub fn emit(record: &AuditRecord) {
    tracing::info!(
        target: "ragcore_audit",
        query_id = %record.query_id,
        query_hash = %record.query_hash,
        tenant_id = %record.tenant_id,
        user_id = %record.user_id,
        strategy = ?record.strategy,
        final_confidence = record.final_confidence,
        guardrail_decision = ?record.guardrail_decision.reason_code,
        citation_count = record.citation_count,
        outcome = %record.outcome,
        timestamp = %record.timestamp,
        component_timings_ms = ?record.component_timings_ms,
        "request audited",
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ragcore_core::{FusionStrategy, GuardrailDecision, GuardrailReasonCode};
    use std::collections::HashMap;

    fn sample_record() -> AuditRecord {
        AuditRecord {
            query_id: "q-1".to_string(),
            query_hash: "abc123".to_string(),
            tenant_id: "tenant-a".to_string(),
            user_id: "user-1".to_string(),
            strategy: FusionStrategy::WeightedAverage,
            component_timings_ms: HashMap::new(),
            final_confidence: 0.8,
            guardrail_decision: GuardrailDecision {
                is_answerable: true,
                confidence: 0.8,
                threshold: 0.35,
                reason_code: GuardrailReasonCode::Answerable,
                idk_message: None,
            },
            citation_count: 2,
            outcome: "answered".to_string(),
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn emit_does_not_panic() {
        emit(&sample_record());
    }
}
