//! Intent and risk classification of incoming questions
//!
//! Two independent sub-steps: structured extraction of topic/goal/affect,
//! and risk detection (moderation verdict, academic-integrity judgment,
//! and a textual PII heuristic). A malformed extraction falls back to an
//! unknown/neutral intent instead of failing the request.

use crate::error::{PaideiaError, Result};
use crate::services::{CompletionService, ModerationService};
use crate::types::{AffectiveState, Goal, ParsedIntent, RiskFlag};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{debug, warn};

/// Self-identifying phrasing that suggests the student pasted personal
/// details into the question
static PII_PATTERNS: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\bmy name is\b",
        r"(?i)\bmy email (?:is|address is)\b",
        r"(?i)\bmy phone number is\b",
        r"(?i)\bmy (?:home )?address is\b",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("static PII pattern"))
    .collect()
});

/// Structured extraction payload the model is constrained to
#[derive(Debug, Deserialize)]
struct IntentAnalysis {
    topic: String,
    goal: Goal,
    affective_state: AffectiveState,
}

impl IntentAnalysis {
    fn fallback() -> Self {
        Self {
            topic: "unknown".to_string(),
            goal: Goal::Unknown,
            affective_state: AffectiveState::Neutral,
        }
    }
}

/// Classifies free text into a [`ParsedIntent`]
pub struct IntentClassifier {
    completion: Arc<dyn CompletionService>,
    moderation: Arc<dyn ModerationService>,
}

impl IntentClassifier {
    pub fn new(
        completion: Arc<dyn CompletionService>,
        moderation: Arc<dyn ModerationService>,
    ) -> Self {
        Self {
            completion,
            moderation,
        }
    }

    /// Classify a student question
    pub async fn classify(&self, text: &str) -> Result<ParsedIntent> {
        let analysis = self.analyze(text).await?;
        let risk_flags = self.detect_risk_flags(text).await?;

        Ok(ParsedIntent {
            original_text: text.to_string(),
            topic: analysis.topic,
            goal: analysis.goal,
            affective_state: analysis.affective_state,
            risk_flags,
        })
    }

    /// Structured extraction of topic, goal, and affective state
    async fn analyze(&self, text: &str) -> Result<IntentAnalysis> {
        let prompt = format!(
            r#"You are analyzing a student's question for a tutoring system.

Student question: "{}"

Respond with a JSON object containing exactly these fields:
- "topic": the academic topic of the question, as a short phrase
- "goal": one of "solve_specific_problem", "understand_concept", "prepare_for_test", "exploration", "unknown"
- "affective_state": one of "frustrated", "confused", "curious", "confident", "neutral"

Respond with the JSON object only."#,
            text
        );

        match self.completion.complete_structured(&prompt).await {
            Ok(value) => match serde_json::from_value::<IntentAnalysis>(value) {
                Ok(analysis) => Ok(analysis),
                Err(e) => {
                    debug!(error = %e, "Intent extraction did not match schema, using fallback");
                    Ok(IntentAnalysis::fallback())
                }
            },
            // Unparsable model output is recovered locally; transport
            // failures still fail the request.
            Err(PaideiaError::Serialization(e)) => {
                debug!(error = %e, "Intent extraction returned malformed JSON, using fallback");
                Ok(IntentAnalysis::fallback())
            }
            Err(e) => Err(e),
        }
    }

    /// Risk detection: moderation verdict, integrity judgment, PII heuristic
    async fn detect_risk_flags(&self, text: &str) -> Result<BTreeSet<RiskFlag>> {
        let mut flags = BTreeSet::new();

        // Moderation check. Fail-open on transport errors: the verdict is
        // skipped for this sub-check only, and the remaining checks still
        // run. See DESIGN.md for the rationale and the case for revisiting.
        match self.moderation.moderate(text).await {
            Ok(verdict) => {
                if verdict.flagged {
                    flags.insert(RiskFlag::InappropriateContent);
                }
                if verdict.self_harm {
                    flags.insert(RiskFlag::SelfHarmConcern);
                }
            }
            Err(e) => {
                warn!(error = %e, "Moderation service unavailable, proceeding without its verdict");
            }
        }

        if self.requests_direct_answer(text).await? {
            flags.insert(RiskFlag::AcademicIntegrityConcern);
        }

        if PII_PATTERNS.iter().any(|p| p.is_match(text)) {
            flags.insert(RiskFlag::PiiDetected);
        }

        Ok(flags)
    }

    /// Boolean judgment: is the student asking for an assignment or test
    /// answer outright?
    async fn requests_direct_answer(&self, text: &str) -> Result<bool> {
        let prompt = format!(
            r#"You check tutoring questions for academic integrity.

Question: "{}"

Is the student asking you to directly provide the answer to an assignment, homework problem, or test question, rather than asking to learn or understand?

Answer with the single word "true" or "false"."#,
            text
        );

        let reply = self.completion.complete(&prompt).await?;
        Ok(reply.to_lowercase().contains("true"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::ModerationVerdict;
    use async_trait::async_trait;

    /// Scripted completion service: structured reply + integrity reply
    struct ScriptedCompletion {
        structured: Result<serde_json::Value>,
        integrity_reply: String,
    }

    #[async_trait]
    impl CompletionService for ScriptedCompletion {
        async fn complete(&self, _prompt: &str) -> Result<String> {
            Ok(self.integrity_reply.clone())
        }

        async fn complete_structured(&self, _prompt: &str) -> Result<serde_json::Value> {
            match &self.structured {
                Ok(v) => Ok(v.clone()),
                Err(_) => Err(PaideiaError::Serialization(
                    serde_json::from_str::<serde_json::Value>("garbage").unwrap_err(),
                )),
            }
        }
    }

    struct ScriptedModeration {
        verdict: Option<ModerationVerdict>,
    }

    #[async_trait]
    impl ModerationService for ScriptedModeration {
        async fn moderate(&self, _text: &str) -> Result<ModerationVerdict> {
            self.verdict
                .ok_or_else(|| PaideiaError::Moderation("service down".to_string()))
        }
    }

    fn classifier(
        structured: Result<serde_json::Value>,
        integrity_reply: &str,
        verdict: Option<ModerationVerdict>,
    ) -> IntentClassifier {
        IntentClassifier::new(
            Arc::new(ScriptedCompletion {
                structured,
                integrity_reply: integrity_reply.to_string(),
            }),
            Arc::new(ScriptedModeration { verdict }),
        )
    }

    #[tokio::test]
    async fn test_clean_question_parses_fully() {
        let classifier = classifier(
            Ok(serde_json::json!({
                "topic": "quadratic equations",
                "goal": "understand_concept",
                "affective_state": "confused"
            })),
            "false",
            Some(ModerationVerdict::default()),
        );

        let intent = classifier
            .classify("Why does completing the square work?")
            .await
            .unwrap();

        assert_eq!(intent.topic, "quadratic equations");
        assert_eq!(intent.goal, Goal::UnderstandConcept);
        assert_eq!(intent.affective_state, AffectiveState::Confused);
        assert!(intent.risk_flags.is_empty());
    }

    #[tokio::test]
    async fn test_malformed_extraction_falls_back_to_neutral() {
        let classifier = classifier(
            Err(PaideiaError::Other(String::new())),
            "false",
            Some(ModerationVerdict::default()),
        );

        let intent = classifier.classify("help me").await.unwrap();
        assert_eq!(intent.topic, "unknown");
        assert_eq!(intent.goal, Goal::Unknown);
        assert_eq!(intent.affective_state, AffectiveState::Neutral);
    }

    #[tokio::test]
    async fn test_schema_mismatch_falls_back_to_neutral() {
        let classifier = classifier(
            Ok(serde_json::json!({"unexpected": "shape"})),
            "false",
            Some(ModerationVerdict::default()),
        );

        let intent = classifier.classify("help me").await.unwrap();
        assert_eq!(intent.goal, Goal::Unknown);
    }

    #[tokio::test]
    async fn test_integrity_concern_flagged() {
        let classifier = classifier(
            Ok(serde_json::json!({
                "topic": "algebra",
                "goal": "solve_specific_problem",
                "affective_state": "neutral"
            })),
            "true",
            Some(ModerationVerdict::default()),
        );

        let intent = classifier
            .classify("Give me the answers to problem set 4")
            .await
            .unwrap();
        assert!(intent.risk_flags.contains(&RiskFlag::AcademicIntegrityConcern));
    }

    #[tokio::test]
    async fn test_moderation_flags_map_to_risk_flags() {
        let classifier = classifier(
            Ok(serde_json::json!({
                "topic": "unknown",
                "goal": "unknown",
                "affective_state": "neutral"
            })),
            "false",
            Some(ModerationVerdict {
                flagged: true,
                self_harm: true,
            }),
        );

        let intent = classifier.classify("...").await.unwrap();
        assert!(intent.risk_flags.contains(&RiskFlag::InappropriateContent));
        assert!(intent.risk_flags.contains(&RiskFlag::SelfHarmConcern));
    }

    #[tokio::test]
    async fn test_moderation_outage_fails_open_for_that_check_only() {
        let classifier = classifier(
            Ok(serde_json::json!({
                "topic": "algebra",
                "goal": "unknown",
                "affective_state": "neutral"
            })),
            "true",
            None,
        );

        let intent = classifier.classify("solve this for me").await.unwrap();
        // Moderation flags absent, but the integrity check still fired.
        assert!(!intent.risk_flags.contains(&RiskFlag::InappropriateContent));
        assert!(intent.risk_flags.contains(&RiskFlag::AcademicIntegrityConcern));
    }

    #[tokio::test]
    async fn test_pii_heuristic() {
        let classifier = classifier(
            Ok(serde_json::json!({
                "topic": "algebra",
                "goal": "unknown",
                "affective_state": "neutral"
            })),
            "false",
            Some(ModerationVerdict::default()),
        );

        let intent = classifier
            .classify("My name is Jordan Smith and I need help with algebra")
            .await
            .unwrap();
        assert!(intent.risk_flags.contains(&RiskFlag::PiiDetected));

        let intent = classifier.classify("What is a derivative?").await.unwrap();
        assert!(!intent.risk_flags.contains(&RiskFlag::PiiDetected));
    }
}
