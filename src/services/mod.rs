//! Services layer for the Paideia tutoring memory core
//!
//! Provides completion, moderation, and embedding integration.

pub mod embeddings;
pub mod llm;
pub mod moderation;

pub use embeddings::{cosine_similarity, EmbeddingService, RemoteEmbeddingService};
pub use llm::{CompletionService, OpenAiClient, OpenAiConfig};
pub use moderation::{ModerationService, ModerationVerdict, OpenAiModerationClient};
