//! Paideia - Consent-Aware Tutoring Memory Core
//!
//! A retrieval-ranking-policy pipeline that personalizes tutoring answers
//! from a student's own learning history:
//! - Consent-based access control over personalized retrieval
//! - Intent and risk classification of incoming questions
//! - Adaptive per-topic difficulty estimation
//! - Metadata-filtered vector retrieval with a dynamic difficulty window
//! - Recency-weighted re-ranking
//! - Memory write-back with citation metadata
//!
//! # Architecture
//!
//! The crate is organized into several layers:
//! - **Types**: Core data structures (MemoryRecord, Student, ParsedIntent)
//! - **Storage**: The store contract and a sqlite-vec backed adapter
//! - **Services**: Completion, moderation, and embedding integration
//! - **Pipeline**: Consent gate, classifier, estimator, retrieval engine,
//!   and the response synthesis orchestrator
//!
//! # Example
//!
//! ```ignore
//! use paideia_core::{
//!     ConsentGate, IntentClassifier, PaideiaConfig, SqliteMemoryStore,
//!     TutoringPipeline,
//! };
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = PaideiaConfig::from_env()?;
//!     let pipeline = TutoringPipeline::new(store, completion, gate, classifier, config);
//!
//!     let answer = pipeline
//!         .answer("student-42", "Why does completing the square work?",
//!                 "Mathematics", "Algebra", 5)
//!         .await?;
//!
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod consent;
pub mod difficulty;
pub mod error;
pub mod intent;
pub mod orchestrator;
pub mod retrieval;
pub mod services;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use config::{PaideiaConfig, RetrievalConfig};
pub use consent::{ConsentDirectory, ConsentGate, ConsentProfile};
pub use difficulty::DifficultyEstimator;
pub use error::{PaideiaError, Result};
pub use intent::IntentClassifier;
pub use orchestrator::{
    TutoringPipeline, GENERIC_REFUSAL, INTEGRITY_REFUSAL, PII_REFUSAL,
};
pub use retrieval::{difficulty_window, RetrievalEngine, RetrievalParams};
pub use services::{
    CompletionService, EmbeddingService, ModerationService, ModerationVerdict, OpenAiClient,
    OpenAiConfig, OpenAiModerationClient, RemoteEmbeddingService,
};
pub use storage::{FilterField, FilterOp, MemoryStore, RecordFilter, SqliteMemoryStore};
pub use types::{
    AffectiveState, ConsentLevel, Goal, LearningTrajectory, MemoryRecord, MemoryType,
    MetadataValue, ParsedIntent, RecordId, RiskFlag, ScoredRecord, Student,
};
