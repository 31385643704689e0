//! Per-topic difficulty estimation
//!
//! A student's current competence level for a topic is the difficulty of
//! their most recent matching record. Any match is equally valid, so no
//! semantic ranking is needed; the query text only steers the store's
//! candidate selection.

use crate::error::Result;
use crate::storage::{FilterField, MemoryStore, RecordFilter};
use crate::types::{DIFFICULTY_MAX, DIFFICULTY_MIN};
use std::sync::Arc;
use tracing::debug;

/// Candidates fetched per estimate
const CANDIDATE_POOL: usize = 10;

/// Estimates a student's current difficulty level for a topic
pub struct DifficultyEstimator {
    store: Arc<dyn MemoryStore>,
    default_level: u8,
}

impl DifficultyEstimator {
    pub fn new(store: Arc<dyn MemoryStore>, default_level: u8) -> Self {
        Self {
            store,
            default_level: default_level.clamp(DIFFICULTY_MIN, DIFFICULTY_MAX),
        }
    }

    /// Difficulty level of the student's most recent record for this
    /// topic, or the configured default when no history exists
    pub async fn current_difficulty(
        &self,
        student_id: &str,
        topic: &str,
        subject: Option<&str>,
    ) -> Result<u8> {
        let mut filters = vec![
            RecordFilter::eq(FilterField::StudentId, student_id),
            RecordFilter::eq(FilterField::Topic, topic),
        ];
        if let Some(subject) = subject {
            filters.push(RecordFilter::eq(FilterField::Subject, subject));
        }

        let query_text = format!("interactions about {}", topic);
        let mut candidates = self.store.query(&filters, &query_text, CANDIDATE_POOL).await?;

        if candidates.is_empty() {
            debug!(student_id, topic, default = self.default_level, "No difficulty history");
            return Ok(self.default_level);
        }

        // Most recent record wins; rows without a timestamp sort last.
        candidates.sort_by(|(a, _), (b, _)| b.timestamp.cmp(&a.timestamp));

        let level = candidates[0].0.difficulty_level;
        debug!(student_id, topic, level, "Estimated current difficulty");
        Ok(level)
    }
}
