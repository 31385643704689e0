//! Common test utilities and helpers

use async_trait::async_trait;
use chrono::{Duration, Utc};
use paideia_core::{
    CompletionService, MemoryRecord, MemoryStore, MemoryType, PaideiaError, RecordFilter, RecordId,
    Result,
};
use std::sync::{Arc, Mutex, Once};

static TRACING: Once = Once::new();

/// Install a test subscriber once, honoring RUST_LOG
pub fn init_tracing() {
    TRACING.call_once(|| {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .try_init();
    });
}

/// Store double that replays a fixed candidate pool and records every
/// insert and query it receives
pub struct RecordingStore {
    pub pool: Vec<(MemoryRecord, f32)>,
    pub inserts: Mutex<Vec<MemoryRecord>>,
    pub queries: Mutex<Vec<(Vec<RecordFilter>, String, usize)>>,
    pub fail_queries: bool,
}

impl RecordingStore {
    pub fn new(pool: Vec<(MemoryRecord, f32)>) -> Arc<Self> {
        Arc::new(Self {
            pool,
            inserts: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            fail_queries: false,
        })
    }

    pub fn failing() -> Arc<Self> {
        Arc::new(Self {
            pool: Vec::new(),
            inserts: Mutex::new(Vec::new()),
            queries: Mutex::new(Vec::new()),
            fail_queries: true,
        })
    }

    pub fn insert_count(&self) -> usize {
        self.inserts.lock().unwrap().len()
    }
}

#[async_trait]
impl MemoryStore for RecordingStore {
    async fn insert(&self, record: &MemoryRecord) -> Result<RecordId> {
        let id = record.record_id()?;
        self.inserts.lock().unwrap().push(record.clone());
        Ok(id)
    }

    async fn query(
        &self,
        filters: &[RecordFilter],
        query_text: &str,
        top_k: usize,
    ) -> Result<Vec<(MemoryRecord, f32)>> {
        if self.fail_queries {
            return Err(PaideiaError::StoreQuery("store unavailable".to_string()));
        }
        self.queries
            .lock()
            .unwrap()
            .push((filters.to_vec(), query_text.to_string(), top_k));
        Ok(self.pool.iter().take(top_k).cloned().collect())
    }
}

/// Completion double: fixed structured reply, scripted integrity verdict,
/// canned final answer; captures every free-text prompt
pub struct ScriptedCompletion {
    pub structured: serde_json::Value,
    pub integrity_reply: String,
    pub answer: String,
    pub prompts: Mutex<Vec<String>>,
}

impl ScriptedCompletion {
    pub fn new(structured: serde_json::Value, integrity_reply: &str, answer: &str) -> Arc<Self> {
        Arc::new(Self {
            structured,
            integrity_reply: integrity_reply.to_string(),
            answer: answer.to_string(),
            prompts: Mutex::new(Vec::new()),
        })
    }

    /// The synthesis prompt is the last free-text completion issued
    pub fn last_prompt(&self) -> String {
        self.prompts.lock().unwrap().last().cloned().unwrap_or_default()
    }
}

#[async_trait]
impl CompletionService for ScriptedCompletion {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        // The integrity check asks for a bare boolean; everything else is
        // the synthesis prompt.
        if prompt.contains("academic integrity") {
            Ok(self.integrity_reply.clone())
        } else {
            Ok(self.answer.clone())
        }
    }

    async fn complete_structured(&self, _prompt: &str) -> Result<serde_json::Value> {
        Ok(self.structured.clone())
    }
}

/// A record `days_ago` days old, owned by `student_id`
pub fn history_record(
    student_id: &str,
    topic: &str,
    difficulty: u8,
    days_ago: i64,
    title: Option<&str>,
) -> MemoryRecord {
    let mut record = MemoryRecord::new(
        student_id,
        "Mathematics",
        topic,
        difficulty,
        "mixed",
        format!("Previously worked on {}", topic),
        MemoryType::LearningInteraction,
    );
    record.timestamp = Some(Utc::now() - Duration::days(days_ago));
    record.document_title = title.map(|t| t.to_string());
    record
}

/// Intent extraction payload for a clean question
pub fn clean_intent(topic: &str) -> serde_json::Value {
    serde_json::json!({
        "topic": topic,
        "goal": "understand_concept",
        "affective_state": "curious"
    })
}
