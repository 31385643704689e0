//! Configuration for the Paideia pipeline
//!
//! Tuning knobs ship with defaults matching the production calibration and
//! can be overridden through `PAIDEIA_`-prefixed environment variables
//! (e.g. `PAIDEIA_RETRIEVAL__RECENCY_ALPHA=0.8`). API keys are read from
//! the environment only and never serialized.

use crate::error::{PaideiaError, Result};
use serde::{Deserialize, Serialize};
use std::env;

/// Environment variable holding the OpenAI API key
pub const API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Retrieval and ranking tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalConfig {
    /// Maximum records returned to the caller
    pub context_limit: usize,

    /// Minimum blended score a record must reach to be returned
    pub similarity_threshold: f32,

    /// Linear blend weight: alpha on similarity, (1 - alpha) on recency
    pub recency_alpha: f32,

    /// Exponential decay rate per day (0.1 gives a half-life of ~7 days)
    pub decay_rate: f32,

    /// Difficulty assumed for students with no history on a topic
    pub default_difficulty: u8,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            context_limit: 10,
            similarity_threshold: 0.7,
            recency_alpha: 0.5,
            decay_rate: 0.1,
            default_difficulty: 3,
        }
    }
}

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaideiaConfig {
    /// Chat completion model
    pub completion_model: String,

    /// Embedding model used by the store adapter
    pub embedding_model: String,

    /// Embedding dimensionality (1536 for text-embedding-3-small)
    pub embedding_dimensions: usize,

    /// Retrieval tuning
    pub retrieval: RetrievalConfig,
}

impl Default for PaideiaConfig {
    fn default() -> Self {
        Self {
            completion_model: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            embedding_dimensions: 1536,
            retrieval: RetrievalConfig::default(),
        }
    }
}

impl PaideiaConfig {
    /// Load configuration: defaults overlaid with `PAIDEIA_*` env vars
    pub fn from_env() -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(
                config::Environment::with_prefix("PAIDEIA")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        Ok(settings.try_deserialize()?)
    }

    /// Read the OpenAI API key from the environment
    pub fn api_key() -> Result<String> {
        match env::var(API_KEY_ENV) {
            Ok(key) if !key.is_empty() => Ok(key),
            _ => Err(PaideiaError::Config(config::ConfigError::Message(
                format!("{} not set", API_KEY_ENV),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_calibration() {
        let cfg = PaideiaConfig::default();
        assert_eq!(cfg.retrieval.context_limit, 10);
        assert_eq!(cfg.retrieval.similarity_threshold, 0.7);
        assert_eq!(cfg.retrieval.recency_alpha, 0.5);
        assert_eq!(cfg.retrieval.decay_rate, 0.1);
        assert_eq!(cfg.retrieval.default_difficulty, 3);
        assert_eq!(cfg.embedding_dimensions, 1536);
    }

    #[test]
    fn test_from_env_without_overrides_is_default() {
        let cfg = PaideiaConfig::from_env().unwrap();
        assert_eq!(cfg.completion_model, PaideiaConfig::default().completion_model);
    }
}
