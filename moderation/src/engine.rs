//! ModerationEngine - evaluates one candidate against the configured backend.
//!
//! The engine is a pure decision function. It never persists anything and
//! never returns an error to its caller: any failure on the way becomes
//! [`EvaluationOutcome::Degraded`], which every policy maps to `Pending`.

use serde_json::Value;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

use crate::audit::{content_digest, AuditEntry, ModerationAudit};
use crate::backend::traits::{CompletionRequest, FinishReason, LlmBackend, LlmError};
use crate::config::ModerationConfig;
use crate::prompt::PromptAssembler;
use crate::types::{EvaluationOutcome, ModerationCandidate, ModerationDecision, ModerationResult};

/// Why an evaluation could not produce a result.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ModerationError {
    /// Backend returned an error
    #[error("Backend error: {0}")]
    Backend(#[from] LlmError),

    /// Backend did not answer within the configured timeout
    #[error("Evaluation timed out after {0}ms")]
    Timeout(u64),

    /// Backend answered with nothing
    #[error("Empty response from backend")]
    EmptyResponse,

    /// The provider's own content filter withheld the answer
    #[error("Response withheld by provider content filter")]
    Filtered,

    /// Backend answered, but not in the required shape
    #[error("Malformed response: {0}")]
    Malformed(String),
}

/// Evaluates candidates and records every evaluation.
pub struct ModerationEngine {
    backend: Arc<dyn LlmBackend>,
    config: ModerationConfig,
    audit: Arc<ModerationAudit>,
}

impl ModerationEngine {
    /// Create an engine over a backend.
    pub fn new(backend: Arc<dyn LlmBackend>, config: ModerationConfig) -> Self {
        Self {
            backend,
            config,
            audit: Arc::new(ModerationAudit::new()),
        }
    }

    /// Share an existing audit log.
    pub fn with_audit(mut self, audit: Arc<ModerationAudit>) -> Self {
        self.audit = audit;
        self
    }

    pub fn audit(&self) -> Arc<ModerationAudit> {
        Arc::clone(&self.audit)
    }

    pub fn config(&self) -> &ModerationConfig {
        &self.config
    }

    /// Auto-approval threshold in use.
    pub fn threshold(&self) -> f64 {
        self.config.auto_approve_threshold
    }

    /// Evaluate one candidate.
    pub async fn evaluate(&self, candidate: &ModerationCandidate) -> EvaluationOutcome {
        let started = Instant::now();
        let digest = content_digest(&PromptAssembler::audit_text(candidate));

        debug!(
            candidate_id = %candidate.id,
            content_type = %candidate.content_type,
            digest = %digest,
            "Evaluating candidate"
        );

        let outcome = match self.try_evaluate(candidate).await {
            Ok(result) => {
                info!(
                    candidate_id = %candidate.id,
                    content_type = %candidate.content_type,
                    decision = ?result.decision,
                    confidence = result.confidence,
                    auto_approve = result.auto_approve,
                    "Evaluation complete"
                );
                EvaluationOutcome::Assessed(result)
            }
            Err(e) => {
                warn!(
                    candidate_id = %candidate.id,
                    content_type = %candidate.content_type,
                    digest = %digest,
                    error = %e,
                    "Evaluation degraded; item stays pending"
                );
                EvaluationOutcome::Degraded {
                    reason: e.to_string(),
                }
            }
        };

        let duration_ms = started.elapsed().as_millis() as u64;
        self.audit
            .record(AuditEntry::new(
                candidate.id,
                candidate.content_type,
                digest,
                self.backend.id(),
                outcome.clone(),
                duration_ms,
            ))
            .await;

        outcome
    }

    async fn try_evaluate(
        &self,
        candidate: &ModerationCandidate,
    ) -> Result<ModerationResult, ModerationError> {
        let request = CompletionRequest::user(PromptAssembler::candidate_prompt(candidate))
            .with_system(PromptAssembler::system_prompt(candidate.content_type))
            .with_max_tokens(self.config.max_output_tokens)
            .with_temperature(self.config.temperature)
            .with_json_output();

        let completion = tokio::time::timeout(self.config.timeout(), self.backend.complete(request))
            .await
            .map_err(|_| ModerationError::Timeout(self.config.timeout_ms))??;

        debug!(
            candidate_id = %candidate.id,
            tokens = completion.usage.total(),
            finish_reason = ?completion.finish_reason,
            "Evaluation response received"
        );
        if completion.finish_reason == FinishReason::ContentFilter {
            return Err(ModerationError::Filtered);
        }

        parse_result(&completion.content, self.threshold())
    }
}

/// Parse backend output into a result, applying the threshold locally.
///
/// Accepts the first JSON object found in the text, so code fences and
/// surrounding prose are tolerated. Any `autoApprove` in the output is
/// ignored.
pub fn parse_result(content: &str, threshold: f64) -> Result<ModerationResult, ModerationError> {
    if content.trim().is_empty() {
        return Err(ModerationError::EmptyResponse);
    }

    let object = extract_json_object(content)
        .ok_or_else(|| ModerationError::Malformed("no JSON object in response".to_string()))?;

    let data: Value = serde_json::from_str(object)
        .map_err(|e| ModerationError::Malformed(format!("invalid JSON: {}", e)))?;

    let decision = data
        .get("decision")
        .and_then(Value::as_str)
        .map(ModerationDecision::from_label)
        .unwrap_or(ModerationDecision::Escalate);

    let confidence = match data.get("confidence") {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|c| c.is_finite())
    .ok_or_else(|| ModerationError::Malformed("missing or non-numeric confidence".to_string()))?;

    if !(0.0..=1.0).contains(&confidence) {
        return Err(ModerationError::Malformed(format!(
            "confidence {} outside [0, 1]",
            confidence
        )));
    }

    let reason = data
        .get("reason")
        .and_then(Value::as_str)
        .unwrap_or_default();

    Ok(ModerationResult::new(decision, confidence, reason, threshold))
}

/// Slice out the first balanced `{...}` in `text`, honoring JSON strings.
fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::MockBackend;
    use crate::types::ContentType;
    use std::time::Duration;
    use uuid::Uuid;

    fn letter() -> ModerationCandidate {
        ModerationCandidate::new(Uuid::new_v4(), ContentType::Letter)
            .with_text("content", "<p>I miss my mother</p>")
    }

    fn engine(backend: MockBackend) -> ModerationEngine {
        ModerationEngine::new(Arc::new(backend), ModerationConfig::default())
    }

    #[tokio::test]
    async fn test_high_confidence_approve_auto_approves() {
        let engine = engine(MockBackend::default().with_response(
            r#"{"decision":"APPROVE","confidence":0.95,"reason":"heartfelt"}"#,
        ));

        let outcome = engine.evaluate(&letter()).await;
        let result = outcome.result().unwrap();
        assert_eq!(result.decision, ModerationDecision::Approve);
        assert!(result.auto_approve);
        assert_eq!(result.reason, "heartfelt");
    }

    #[tokio::test]
    async fn test_low_confidence_approve_does_not_auto_approve() {
        let engine = engine(
            MockBackend::default()
                .with_response(r#"{"decision":"APPROVE","confidence":0.6,"reason":"unsure"}"#),
        );

        let outcome = engine.evaluate(&letter()).await;
        assert!(!outcome.is_degraded());
        assert!(!outcome.auto_approve());
    }

    #[tokio::test]
    async fn test_model_auto_approve_flag_is_ignored() {
        let engine = engine(MockBackend::default().with_response(
            r#"{"decision":"REJECT","confidence":0.99,"reason":"spam","autoApprove":true}"#,
        ));

        let outcome = engine.evaluate(&letter()).await;
        assert!(!outcome.auto_approve());
    }

    #[tokio::test]
    async fn test_timeout_degrades() {
        let backend = MockBackend::default().with_delay(
            Duration::from_millis(200),
            r#"{"decision":"APPROVE","confidence":0.99}"#,
        );
        let engine = ModerationEngine::new(
            Arc::new(backend),
            ModerationConfig::default().with_timeout_ms(20),
        );

        let outcome = engine.evaluate(&letter()).await;
        assert!(outcome.is_degraded());
        assert!(!outcome.auto_approve());
    }

    #[tokio::test]
    async fn test_backend_failure_degrades() {
        let engine = engine(
            MockBackend::default().with_failure(LlmError::NetworkError("down".to_string())),
        );

        let outcome = engine.evaluate(&letter()).await;
        match outcome {
            EvaluationOutcome::Degraded { reason } => assert!(reason.contains("down")),
            other => panic!("expected degraded, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_malformed_output_degrades() {
        let engine = engine(MockBackend::default().with_response("I think it's fine!"));
        assert!(engine.evaluate(&letter()).await.is_degraded());

        let engine = engine_with(r#"{"decision":"APPROVE"}"#);
        assert!(engine.evaluate(&letter()).await.is_degraded());

        let engine = engine_with("");
        assert!(engine.evaluate(&letter()).await.is_degraded());
    }

    fn engine_with(response: &str) -> ModerationEngine {
        engine(MockBackend::default().with_response(response))
    }

    #[tokio::test]
    async fn test_request_shape() {
        let backend = Arc::new(MockBackend::default().with_response(
            r#"{"decision":"APPROVE","confidence":0.95,"reason":"ok"}"#,
        ));
        let engine = ModerationEngine::new(backend.clone(), ModerationConfig::default());

        engine.evaluate(&letter()).await;

        let request = backend.last_request().unwrap();
        assert_eq!(request.max_tokens, Some(300));
        assert!(request.json_output);
        assert!(request.system_prompt.unwrap().contains("letter"));
        assert!(request.turns[0].content.contains("I miss my mother"));
        assert!(!request.turns[0].content.contains("<p>"));
    }

    #[tokio::test]
    async fn test_every_evaluation_is_audited() {
        let engine = engine(
            MockBackend::default()
                .with_reply(crate::backend::MockReply::Content(
                    r#"{"decision":"APPROVE","confidence":0.95}"#.to_string(),
                ))
                .with_failure(LlmError::Timeout(5000)),
        );
        let candidate = letter();

        engine.evaluate(&candidate).await;
        engine.evaluate(&candidate).await;

        let entries = engine.audit().for_candidate(candidate.id).await;
        assert_eq!(entries.len(), 2);
        assert!(entries[0].outcome.is_degraded());
        assert!(!entries[1].outcome.is_degraded());
        assert_eq!(entries[1].backend_id, "mock-model");
        assert_eq!(entries[1].content_digest, content_digest("I miss my mother"));
    }

    #[test]
    fn test_parse_tolerates_fences_and_prose() {
        let content = "Sure, here you go:\n```json\n{\"decision\": \"approved\", \"confidence\": \"0.93\", \"reason\": \"kind {words}\"}\n```";
        let result = parse_result(content, 0.9).unwrap();
        assert_eq!(result.decision, ModerationDecision::Approve);
        assert_eq!(result.confidence, 0.93);
        assert_eq!(result.reason, "kind {words}");
        assert!(result.auto_approve);
    }

    #[test]
    fn test_parse_unknown_decision_escalates() {
        let result = parse_result(r#"{"decision":"flag","confidence":0.99}"#, 0.9).unwrap();
        assert_eq!(result.decision, ModerationDecision::Escalate);
        assert!(!result.auto_approve);
        assert_eq!(result.reason, "");
    }

    #[test]
    fn test_parse_rejects_out_of_range_confidence() {
        for confidence in ["60", "1.01", "-0.2"] {
            let content = format!(r#"{{"decision":"APPROVE","confidence":{}}}"#, confidence);
            assert!(matches!(
                parse_result(&content, 0.9),
                Err(ModerationError::Malformed(_))
            ));
        }

        let edge = parse_result(r#"{"decision":"APPROVE","confidence":1}"#, 0.9).unwrap();
        assert_eq!(edge.confidence, 1.0);
        assert!(edge.auto_approve);
    }

    #[tokio::test]
    async fn test_percent_scale_confidence_degrades() {
        let engine = engine_with(r#"{"decision":"APPROVE","confidence":60,"reason":"60% sure"}"#);

        let outcome = engine.evaluate(&letter()).await;
        assert!(outcome.is_degraded());
        assert!(!outcome.auto_approve());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(parse_result("  ", 0.9), Err(ModerationError::EmptyResponse));
        assert!(matches!(
            parse_result(r#"{"decision":"APPROVE","confidence":"high"}"#, 0.9),
            Err(ModerationError::Malformed(_))
        ));
        assert!(matches!(
            parse_result(r#"{"decision": "APPROVE""#, 0.9),
            Err(ModerationError::Malformed(_))
        ));
    }
}
