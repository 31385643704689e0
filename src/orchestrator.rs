//! Response synthesis orchestrator
//!
//! Sequences the pipeline for one question: consent check, intent and
//! risk classification, policy gate, retrieval, citation-aware prompt
//! construction, completion, and memory write-back. Each invocation is
//! independent and stateless; the struct holds only shared read-only
//! clients and is safe to use from concurrent requests.

use crate::config::PaideiaConfig;
use crate::consent::ConsentGate;
use crate::difficulty::DifficultyEstimator;
use crate::error::Result;
use crate::intent::IntentClassifier;
use crate::retrieval::{RetrievalEngine, RetrievalParams};
use crate::services::CompletionService;
use crate::storage::{FilterField, MemoryStore, RecordFilter};
use crate::types::{
    LearningTrajectory, MemoryRecord, MemoryType, MetadataValue, ParsedIntent, RecordId, RiskFlag,
    ScoredRecord, DIFFICULTY_MAX, DIFFICULTY_MIN,
};
use std::sync::Arc;
use tracing::{debug, info};

/// Refusal for questions that ask for an assignment or test answer outright
pub const INTEGRITY_REFUSAL: &str = "I can help you understand the concepts, but I cannot provide direct answers to assignments or tests. Let's work through a similar example problem.";

/// Refusal for questions that carry personal information
pub const PII_REFUSAL: &str = "It looks like you may have shared some personal information. To protect your privacy, please rephrase your question without including any personal details.";

/// Refusal for any other policy flag
pub const GENERIC_REFUSAL: &str = "I am unable to process this request. Please try rephrasing your question or ask something else.";

/// Candidates fetched for trajectory aggregation
const TRAJECTORY_POOL: usize = 50;

/// Personalized tutoring pipeline
pub struct TutoringPipeline {
    store: Arc<dyn MemoryStore>,
    completion: Arc<dyn CompletionService>,
    gate: ConsentGate,
    classifier: IntentClassifier,
    engine: RetrievalEngine,
    config: PaideiaConfig,
}

impl TutoringPipeline {
    /// Assemble the pipeline from its collaborators
    pub fn new(
        store: Arc<dyn MemoryStore>,
        completion: Arc<dyn CompletionService>,
        gate: ConsentGate,
        classifier: IntentClassifier,
        config: PaideiaConfig,
    ) -> Self {
        let estimator =
            DifficultyEstimator::new(store.clone(), config.retrieval.default_difficulty);
        let engine = RetrievalEngine::new(store.clone(), estimator);
        Self {
            store,
            completion,
            gate,
            classifier,
            engine,
            config,
        }
    }

    /// Answer a student's question with personalized context
    ///
    /// Linear state machine, no branching back: consent check, intent
    /// classification, risk gate, retrieval, citation, prompt, completion,
    /// write-back. Policy refusals are valid terminal responses, not
    /// errors; infrastructure failures propagate to the caller.
    pub async fn answer(
        &self,
        student_id: &str,
        question: &str,
        subject: &str,
        topic: &str,
        context_limit: usize,
    ) -> Result<String> {
        let student = self.gate.resolve(student_id).await?;
        let intent = self.classifier.classify(question).await?;

        if intent.is_flagged() {
            info!(student_id, flags = ?intent.risk_flags, "Question refused by policy gate");
            return Ok(refusal_for(&intent).to_string());
        }

        // Intent extraction is assumed more precise than the caller's
        // topic label, except when it produced nothing usable.
        let parsed_topic = if intent.topic == "unknown" {
            topic
        } else {
            intent.topic.as_str()
        };

        let params = RetrievalParams {
            limit: context_limit,
            ..RetrievalParams::from(&self.config.retrieval)
        };
        let (context, assessed_difficulty) = self
            .engine
            .retrieve(&student, parsed_topic, Some(subject), None, &params)
            .await?;

        let prompt = build_prompt(subject, parsed_topic, question, &intent, &context);
        let answer = self.completion.complete(&prompt).await?;

        // Every non-refused exchange becomes future context, even when
        // retrieval came back empty.
        let mut record = MemoryRecord::new(
            student_id,
            subject,
            parsed_topic,
            assessed_difficulty,
            "mixed",
            format!("Q: {}\nA: {}", question, answer),
            MemoryType::LearningInteraction,
        );
        record.document_title = Some(format!("Tutoring session: {}", parsed_topic));
        record
            .extra
            .insert("goal".to_string(), MetadataValue::from(intent.goal.as_str()));
        record.extra.insert(
            "affective_state".to_string(),
            MetadataValue::from(intent.affective_state.as_str()),
        );
        self.store_learning_interaction(record).await?;

        Ok(answer)
    }

    /// Persist one record through the sanitation boundary
    ///
    /// Public write path, also used by the enclosing service's indexing
    /// flow. Validates invariants before the record reaches the store.
    pub async fn store_learning_interaction(&self, record: MemoryRecord) -> Result<RecordId> {
        record.validate()?;
        let id = self.store.insert(&record).await?;
        debug!(record_id = %id, memory_type = %record.memory_type, "Stored memory record");
        Ok(id)
    }

    /// Record a competency measurement as a skill-assessment memory
    pub async fn record_skill_assessment(
        &self,
        student_id: &str,
        subject: &str,
        skill_area: &str,
        competency_level: f32,
        assessment_details: &str,
    ) -> Result<RecordId> {
        let difficulty = ((competency_level * 10.0).round() as i64)
            .clamp(DIFFICULTY_MIN as i64, DIFFICULTY_MAX as i64) as u8;

        let mut record = MemoryRecord::new(
            student_id,
            subject,
            skill_area,
            difficulty,
            "assessment",
            format!(
                "Skill assessment for {}: {}. Competency level: {}",
                skill_area, assessment_details, competency_level
            ),
            MemoryType::SkillAssessment,
        );
        record.extra.insert(
            "competency_level".to_string(),
            MetadataValue::Float(competency_level as f64),
        );
        record
            .extra
            .insert("skill_area".to_string(), MetadataValue::from(skill_area));

        self.store_learning_interaction(record).await
    }

    /// Aggregate the student's progress within a subject
    ///
    /// Per-student only; never reads across students.
    pub async fn learning_trajectory(
        &self,
        student_id: &str,
        subject: &str,
    ) -> Result<LearningTrajectory> {
        let filters = vec![
            RecordFilter::eq(FilterField::StudentId, student_id),
            RecordFilter::eq(FilterField::Subject, subject),
        ];
        let query_text = format!("learning progress and achievements in {}", subject);
        let records = self
            .store
            .query(&filters, &query_text, TRAJECTORY_POOL)
            .await?;

        let mut trajectory = LearningTrajectory {
            total_interactions: records.len(),
            ..LearningTrajectory::default()
        };
        let mut seen_topics = std::collections::BTreeSet::new();

        for (record, _) in &records {
            match record.memory_type {
                MemoryType::SkillAssessment => trajectory.skill_assessments += 1,
                MemoryType::ErrorPattern => trajectory.error_patterns += 1,
                MemoryType::SuccessMilestone => trajectory.success_milestones += 1,
                MemoryType::LearningInteraction
                | MemoryType::ContentMastery
                | MemoryType::LearningPreference => {}
            }
            if seen_topics.insert(record.topic.clone()) {
                trajectory.recent_topics.push(record.topic.clone());
            }
            trajectory.difficulty_progression.push(record.difficulty_level);
        }

        Ok(trajectory)
    }

    /// Cross-student pattern lookup, delegated to the retrieval engine
    pub async fn find_similar_learning_patterns(
        &self,
        student_id: &str,
        current_challenge: &str,
    ) -> Result<Vec<ScoredRecord>> {
        self.engine
            .find_similar_learning_patterns(student_id, current_challenge, true)
            .await
    }
}

/// Pick the refusal wording for a flagged intent
fn refusal_for(intent: &ParsedIntent) -> &'static str {
    if intent.risk_flags.contains(&RiskFlag::AcademicIntegrityConcern) {
        INTEGRITY_REFUSAL
    } else if intent.risk_flags.contains(&RiskFlag::PiiDetected) {
        PII_REFUSAL
    } else {
        GENERIC_REFUSAL
    }
}

/// Assemble the completion prompt with context excerpts and citations
fn build_prompt(
    subject: &str,
    topic: &str,
    question: &str,
    intent: &ParsedIntent,
    context: &[ScoredRecord],
) -> String {
    let sources = citation_sources(context);

    let context_block = if context.is_empty() {
        "No uploaded study materials or learning history were found for this topic.".to_string()
    } else {
        context
            .iter()
            .map(|scored| match scored.record.citation_source() {
                Some(source) => format!("[{}] {}", source, scored.record.content),
                None => format!("Previous learning: {}", scored.record.content),
            })
            .collect::<Vec<_>>()
            .join("\n")
    };

    let citation_mandate = if sources.is_empty() {
        "No uploaded materials matched this topic. Answer briefly and accurately from general \
         knowledge, and explicitly invite the student to upload course materials, textbooks, or \
         notes so future answers can be tailored to their curriculum."
            .to_string()
    } else {
        format!(
            "Cite every fact drawn from the materials above with [Source Title] immediately after \
             the sentence that uses it. Available sources: {}.",
            sources.join(", ")
        )
    };

    format!(
        r#"You are an AI tutor helping a student with {subject}.

Student's learning context:
{context_block}

- Current goal: the student wants to {goal}.
- Current emotional state: the student seems to be feeling {affect}.
- Detected topic: {topic}

Student's question: "{question}"

{citation_mandate}

Provide a personalized and empathetic response that:
1. Acknowledges their emotional state and goal.
2. Builds on their existing knowledge.
3. Addresses any previous misconceptions.
4. Provides guidance at an appropriate difficulty level."#,
        subject = subject,
        context_block = context_block,
        goal = intent.goal.describe(),
        affect = intent.affective_state.as_str(),
        topic = topic,
        question = question,
        citation_mandate = citation_mandate,
    )
}

/// Distinct citation sources present in the retrieved context, in
/// retrieval order
fn citation_sources(context: &[ScoredRecord]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut sources = Vec::new();
    for scored in context {
        if let Some(source) = scored.record.citation_source() {
            if seen.insert(source.to_string()) {
                sources.push(source.to_string());
            }
        }
    }
    sources
}
