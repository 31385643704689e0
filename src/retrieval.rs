//! Retrieval and re-ranking engine
//!
//! The central algorithm of the pipeline: bound candidates to a difficulty
//! window around the student's current level, over-fetch by native
//! similarity, then re-rank with an exponential recency decay blended
//! against similarity. Determinism and explainability matter more than
//! optimality here, so the blend is a fixed linear formula rather than a
//! learned model.

use crate::config::RetrievalConfig;
use crate::difficulty::DifficultyEstimator;
use crate::error::Result;
use crate::storage::{FilterField, MemoryStore, RecordFilter};
use crate::types::{
    MemoryType, MetadataValue, ScoredRecord, Student, DIFFICULTY_MAX, DIFFICULTY_MIN,
};
use chrono::Utc;
use std::cmp::Ordering;
use std::sync::Arc;
use tracing::debug;

/// Over-fetch multiplier: the candidate pool is this many times the
/// requested limit, to give the re-ranker room to reorder
const OVERFETCH_FACTOR: usize = 2;

/// Cross-student pattern lookup result cap
const PATTERN_LIMIT: usize = 5;

/// Per-request tuning for one retrieval
#[derive(Debug, Clone)]
pub struct RetrievalParams {
    pub limit: usize,
    pub similarity_threshold: f32,
    pub recency_alpha: f32,
    pub decay_rate: f32,
}

impl Default for RetrievalParams {
    fn default() -> Self {
        Self {
            limit: 10,
            similarity_threshold: 0.7,
            recency_alpha: 0.5,
            decay_rate: 0.1,
        }
    }
}

impl From<&RetrievalConfig> for RetrievalParams {
    fn from(config: &RetrievalConfig) -> Self {
        Self {
            limit: config.context_limit,
            similarity_threshold: config.similarity_threshold,
            recency_alpha: config.recency_alpha,
            decay_rate: config.decay_rate,
        }
    }
}

/// Inclusive difficulty band around the student's current level
///
/// A record matched by pure semantic similarity may be calibrated to a
/// competence level too far above or below the student's current level to
/// be useful, so candidates are bounded to this window.
pub fn difficulty_window(difficulty: u8) -> (u8, u8) {
    let low = difficulty.saturating_sub(1).max(DIFFICULTY_MIN);
    let high = (difficulty + 1).min(DIFFICULTY_MAX);
    (low, high)
}

/// Retrieval engine over the memory store
pub struct RetrievalEngine {
    store: Arc<dyn MemoryStore>,
    estimator: DifficultyEstimator,
}

impl RetrievalEngine {
    pub fn new(store: Arc<dyn MemoryStore>, estimator: DifficultyEstimator) -> Self {
        Self { store, estimator }
    }

    /// Retrieve the student's personalized context for a topic
    ///
    /// Returns the re-ranked records and the assessed difficulty level.
    /// For `minimal_pseudonymous` consent no vector query is issued and
    /// the record list is empty; the difficulty estimate (a
    /// non-identifying aggregate) still runs.
    pub async fn retrieve(
        &self,
        student: &Student,
        topic: &str,
        subject: Option<&str>,
        memory_types: Option<&[MemoryType]>,
        params: &RetrievalParams,
    ) -> Result<(Vec<ScoredRecord>, u8)> {
        let difficulty = self
            .estimator
            .current_difficulty(&student.student_id, topic, subject)
            .await?;

        if !student.consent_level.permits_personalization() {
            debug!(student_id = %student.student_id, "Personalized retrieval disabled by consent");
            return Ok((Vec::new(), difficulty));
        }

        let (low, high) = difficulty_window(difficulty);
        let window: Vec<MetadataValue> =
            (low..=high).map(|d| MetadataValue::Int(d as i64)).collect();

        let mut filters = vec![
            RecordFilter::eq(FilterField::StudentId, student.student_id.as_str()),
            RecordFilter::within(FilterField::DifficultyLevel, window),
        ];
        if let Some(subject) = subject {
            filters.push(RecordFilter::eq(FilterField::Subject, subject));
        }
        if let Some(types) = memory_types {
            filters.push(RecordFilter::within(
                FilterField::MemoryType,
                types.iter().map(|t| MetadataValue::from(t.as_str())).collect(),
            ));
        }

        let pool = self
            .store
            .query(&filters, topic, params.limit * OVERFETCH_FACTOR)
            .await?;

        let ranked = re_rank(pool, params);
        debug!(
            student_id = %student.student_id,
            topic,
            difficulty,
            returned = ranked.len(),
            "Retrieval complete"
        );

        Ok((ranked, difficulty))
    }

    /// Find how students facing a similar challenge succeeded or stumbled
    ///
    /// A narrow aggregate lookup over success/error records. When
    /// `exclude_student` is set, the querying student's own records are
    /// filtered out. Returned records are anonymized: the owner id is
    /// blanked and extra metadata dropped, so no identifying field leaves
    /// this call.
    pub async fn find_similar_learning_patterns(
        &self,
        student_id: &str,
        current_challenge: &str,
        exclude_student: bool,
    ) -> Result<Vec<ScoredRecord>> {
        let mut filters = Vec::new();
        if exclude_student {
            filters.push(RecordFilter::ne(FilterField::StudentId, student_id));
        }
        filters.push(RecordFilter::within(
            FilterField::MemoryType,
            vec![
                MetadataValue::from(MemoryType::SuccessMilestone.as_str()),
                MetadataValue::from(MemoryType::ErrorPattern.as_str()),
            ],
        ));

        let matches = self
            .store
            .query(&filters, current_challenge, PATTERN_LIMIT)
            .await?;

        Ok(matches
            .into_iter()
            .map(|(mut record, similarity)| {
                record.student_id = String::new();
                record.extra.clear();
                ScoredRecord {
                    record,
                    similarity,
                    score: similarity,
                }
            })
            .collect())
    }
}

/// Blend similarity with recency, threshold, and truncate
///
/// Candidates without a usable timestamp are dropped: recency cannot be
/// computed, and silently assuming "new" or "old" would bias the ranking
/// unpredictably.
fn re_rank(
    pool: Vec<(crate::types::MemoryRecord, f32)>,
    params: &RetrievalParams,
) -> Vec<ScoredRecord> {
    let now = Utc::now();

    let mut ranked: Vec<ScoredRecord> = pool
        .into_iter()
        .filter_map(|(record, similarity)| {
            let timestamp = record.timestamp?;
            let days_since = (now - timestamp).num_days() as f32;
            let recency = (-params.decay_rate * days_since).exp();
            let score = params.recency_alpha * similarity + (1.0 - params.recency_alpha) * recency;
            Some(ScoredRecord {
                record,
                similarity,
                score,
            })
        })
        .collect();

    // Stable sort keeps the store's original order on score ties.
    ranked.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    ranked.retain(|r| r.score >= params.similarity_threshold);
    ranked.truncate(params.limit);
    ranked
}
