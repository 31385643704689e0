//! Core data types for the Paideia tutoring memory core
//!
//! This module defines the fundamental data structures used throughout the
//! pipeline: memory records, students and their consent levels, parsed
//! intents, and scored retrieval results.

use crate::error::{PaideiaError, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Lowest valid difficulty level
pub const DIFFICULTY_MIN: u8 = 1;

/// Highest valid difficulty level
pub const DIFFICULTY_MAX: u8 = 10;

/// Unique identifier for memory records
///
/// Derived from `student_id + memory_type + timestamp`, so a record's
/// identity is stable across processes and duplicate write-backs collide
/// instead of silently forking history.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordId(pub String);

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Memory type classification for filtering and aggregation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MemoryType {
    /// A question/answer exchange from a tutoring session
    LearningInteraction,

    /// Competency measurement for a skill area
    SkillAssessment,

    /// Mastered content from uploaded materials
    ContentMastery,

    /// How the student prefers to learn
    LearningPreference,

    /// A recurring mistake worth addressing
    ErrorPattern,

    /// A milestone the student reached
    SuccessMilestone,
}

impl MemoryType {
    /// Stable string form used in store metadata and record ids
    pub fn as_str(&self) -> &'static str {
        match self {
            MemoryType::LearningInteraction => "learning_interaction",
            MemoryType::SkillAssessment => "skill_assessment",
            MemoryType::ContentMastery => "content_mastery",
            MemoryType::LearningPreference => "learning_preference",
            MemoryType::ErrorPattern => "error_pattern",
            MemoryType::SuccessMilestone => "success_milestone",
        }
    }

    /// Parse the stable string form back into a variant
    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "learning_interaction" => Ok(MemoryType::LearningInteraction),
            "skill_assessment" => Ok(MemoryType::SkillAssessment),
            "content_mastery" => Ok(MemoryType::ContentMastery),
            "learning_preference" => Ok(MemoryType::LearningPreference),
            "error_pattern" => Ok(MemoryType::ErrorPattern),
            "success_milestone" => Ok(MemoryType::SuccessMilestone),
            other => Err(PaideiaError::InvalidRecord(format!(
                "unknown memory type: {}",
                other
            ))),
        }
    }
}

impl std::fmt::Display for MemoryType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Scalar metadata value accepted by the store boundary
///
/// Arbitrary payloads are restricted to primitive scalars; nested
/// structures must be serialized to strings before they reach the store.
/// See [`sanitize_metadata`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MetadataValue {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl From<&str> for MetadataValue {
    fn from(v: &str) -> Self {
        MetadataValue::Str(v.to_string())
    }
}

impl From<String> for MetadataValue {
    fn from(v: String) -> Self {
        MetadataValue::Str(v)
    }
}

impl From<i64> for MetadataValue {
    fn from(v: i64) -> Self {
        MetadataValue::Int(v)
    }
}

impl From<f64> for MetadataValue {
    fn from(v: f64) -> Self {
        MetadataValue::Float(v)
    }
}

impl From<bool> for MetadataValue {
    fn from(v: bool) -> Self {
        MetadataValue::Bool(v)
    }
}

/// Reduce an arbitrary JSON map to the scalar metadata the store accepts
///
/// Nulls are dropped; arrays and objects are serialized to JSON strings.
pub fn sanitize_metadata(
    raw: &serde_json::Map<String, serde_json::Value>,
) -> BTreeMap<String, MetadataValue> {
    let mut clean = BTreeMap::new();
    for (key, value) in raw {
        let sanitized = match value {
            serde_json::Value::Null => continue,
            serde_json::Value::Bool(b) => MetadataValue::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    MetadataValue::Int(i)
                } else {
                    MetadataValue::Float(n.as_f64().unwrap_or_default())
                }
            }
            serde_json::Value::String(s) => MetadataValue::Str(s.clone()),
            nested => MetadataValue::Str(nested.to_string()),
        };
        clean.insert(key.clone(), sanitized);
    }
    clean
}

/// One stored unit of a student's learning history
///
/// Records are append-only: created once by the write-back step, never
/// mutated or deleted by this core. The owning student's id is exact-match
/// on retrieval, never fuzzy.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemoryRecord {
    /// Owning student (immutable)
    pub student_id: String,

    /// Subject area, e.g. "Mathematics"
    pub subject: String,

    /// Topic within the subject, e.g. "Algebra"
    pub topic: String,

    /// Competence calibration for this record (1-10)
    pub difficulty_level: u8,

    /// Learning style tag, e.g. "visual", "mixed", "assessment"
    pub learning_style: String,

    /// Creation instant. Records written through this crate always carry
    /// one; rows indexed by external collaborators may not, and such rows
    /// are unusable for recency ranking.
    pub timestamp: Option<DateTime<Utc>>,

    /// Full record text
    pub content: String,

    /// Memory type classification
    pub memory_type: MemoryType,

    /// Source document title, used for citation
    pub document_title: Option<String>,

    /// Additional scalar metadata
    pub extra: BTreeMap<String, MetadataValue>,
}

impl MemoryRecord {
    /// Create a record stamped with the current instant
    pub fn new(
        student_id: impl Into<String>,
        subject: impl Into<String>,
        topic: impl Into<String>,
        difficulty_level: u8,
        learning_style: impl Into<String>,
        content: impl Into<String>,
        memory_type: MemoryType,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            subject: subject.into(),
            topic: topic.into(),
            difficulty_level,
            learning_style: learning_style.into(),
            timestamp: Some(Utc::now()),
            content: content.into(),
            memory_type,
            document_title: None,
            extra: BTreeMap::new(),
        }
    }

    /// Derive the record's identity key
    pub fn record_id(&self) -> Result<RecordId> {
        let ts = self.timestamp.ok_or_else(|| {
            PaideiaError::InvalidRecord("record has no timestamp".to_string())
        })?;
        // Microsecond precision: same-second writes for one student must
        // not collide.
        Ok(RecordId(format!(
            "{}_{}_{}",
            self.student_id,
            self.memory_type.as_str(),
            ts.timestamp_micros()
        )))
    }

    /// Check data-model invariants before the record reaches the store
    pub fn validate(&self) -> Result<()> {
        if self.student_id.is_empty() {
            return Err(PaideiaError::InvalidRecord(
                "record has no student_id".to_string(),
            ));
        }
        if !(DIFFICULTY_MIN..=DIFFICULTY_MAX).contains(&self.difficulty_level) {
            return Err(PaideiaError::InvalidRecord(format!(
                "difficulty_level {} outside [{}, {}]",
                self.difficulty_level, DIFFICULTY_MIN, DIFFICULTY_MAX
            )));
        }
        if self.timestamp.is_none() {
            return Err(PaideiaError::InvalidRecord(
                "record has no timestamp".to_string(),
            ));
        }
        Ok(())
    }

    /// Citation tag for this record: document title, or the original
    /// filename recorded by the upload path
    pub fn citation_source(&self) -> Option<&str> {
        if let Some(title) = self.document_title.as_deref() {
            return Some(title);
        }
        match self.extra.get("file_name") {
            Some(MetadataValue::Str(name)) => Some(name),
            _ => None,
        }
    }
}

/// Tri-state policy flag controlling whether personalized history may be
/// retrieved
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConsentLevel {
    /// Full personalization over the student's own history
    FullProfile,

    /// Personalization permitted, identifying details withheld downstream
    LimitedAnonymized,

    /// No personalized retrieval at all
    MinimalPseudonymous,
}

impl ConsentLevel {
    /// Whether this level permits retrieving the student's own history
    pub fn permits_personalization(&self) -> bool {
        match self {
            ConsentLevel::FullProfile | ConsentLevel::LimitedAnonymized => true,
            ConsentLevel::MinimalPseudonymous => false,
        }
    }
}

/// Session-scoped view of a student, constructed fresh per request by the
/// consent gate. Never cached across requests.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Student {
    pub student_id: String,
    pub consent_level: ConsentLevel,
    pub session_purpose: Option<String>,
    pub data_sharing_scope: BTreeMap<String, bool>,
}

/// The student's primary learning goal, extracted from free text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Goal {
    SolveSpecificProblem,
    UnderstandConcept,
    PrepareForTest,
    Exploration,
    #[serde(other)]
    Unknown,
}

impl Goal {
    pub fn as_str(&self) -> &'static str {
        match self {
            Goal::SolveSpecificProblem => "solve_specific_problem",
            Goal::UnderstandConcept => "understand_concept",
            Goal::PrepareForTest => "prepare_for_test",
            Goal::Exploration => "exploration",
            Goal::Unknown => "unknown",
        }
    }

    /// Human-readable phrasing for prompt construction
    pub fn describe(&self) -> &'static str {
        match self {
            Goal::SolveSpecificProblem => "solve a specific problem",
            Goal::UnderstandConcept => "understand a concept",
            Goal::PrepareForTest => "prepare for a test",
            Goal::Exploration => "explore the subject",
            Goal::Unknown => "learn",
        }
    }
}

/// The student's emotional state, extracted from free text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AffectiveState {
    Frustrated,
    Confused,
    Curious,
    Confident,
    #[serde(other)]
    Neutral,
}

impl AffectiveState {
    pub fn as_str(&self) -> &'static str {
        match self {
            AffectiveState::Frustrated => "frustrated",
            AffectiveState::Confused => "confused",
            AffectiveState::Curious => "curious",
            AffectiveState::Confident => "confident",
            AffectiveState::Neutral => "neutral",
        }
    }
}

/// Policy/safety classification attached to a query
///
/// Any non-empty set short-circuits the pipeline before retrieval or
/// write-back.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RiskFlag {
    PiiDetected,
    SelfHarmConcern,
    AcademicIntegrityConcern,
    InappropriateContent,
}

/// Structured interpretation of one incoming question (ephemeral)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ParsedIntent {
    pub original_text: String,
    pub topic: String,
    pub goal: Goal,
    pub affective_state: AffectiveState,
    pub risk_flags: BTreeSet<RiskFlag>,
}

impl ParsedIntent {
    /// Whether any policy flag is present
    pub fn is_flagged(&self) -> bool {
        !self.risk_flags.is_empty()
    }
}

/// A retrieved record with its ranking scores
#[derive(Debug, Clone)]
pub struct ScoredRecord {
    /// The record that matched
    pub record: MemoryRecord,

    /// Raw similarity reported by the store
    pub similarity: f32,

    /// Blended similarity/recency score used for the final ranking
    pub score: f32,
}

/// Aggregate view of a student's progress within a subject
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LearningTrajectory {
    pub total_interactions: usize,
    pub skill_assessments: usize,
    pub error_patterns: usize,
    pub success_milestones: usize,
    pub recent_topics: Vec<String>,
    pub difficulty_progression: Vec<u8>,
}
