//! Content moderation service
//!
//! Wraps the OpenAI moderations endpoint. The classifier consumes the
//! verdict; transport failures are the caller's policy decision.

use crate::config::PaideiaConfig;
use crate::error::{PaideiaError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Outcome of a moderation check
#[derive(Debug, Clone, Copy, Default)]
pub struct ModerationVerdict {
    /// Whether the classifier flagged the text at all
    pub flagged: bool,

    /// Whether the self-harm category fired
    pub self_harm: bool,
}

/// Moderation contract
#[async_trait]
pub trait ModerationService: Send + Sync {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict>;
}

/// OpenAI moderations client
pub struct OpenAiModerationClient {
    api_key: String,
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ModerationRequest {
    input: String,
}

#[derive(Debug, Deserialize)]
struct ModerationResponse {
    results: Vec<ModerationResult>,
}

#[derive(Debug, Deserialize)]
struct ModerationResult {
    flagged: bool,
    categories: ModerationCategories,
}

#[derive(Debug, Default, Deserialize)]
struct ModerationCategories {
    #[serde(rename = "self-harm", default)]
    self_harm: bool,
    #[serde(rename = "self-harm/intent", default)]
    self_harm_intent: bool,
    #[serde(rename = "self-harm/instructions", default)]
    self_harm_instructions: bool,
}

impl OpenAiModerationClient {
    /// Create a new moderation client reading the key from the environment
    pub fn new() -> Result<Self> {
        Self::with_base_url("https://api.openai.com/v1".to_string())
    }

    /// Create a client against a custom endpoint (used in tests)
    pub fn with_base_url(base_url: String) -> Result<Self> {
        let api_key = PaideiaConfig::api_key()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            api_key,
            base_url,
            client,
        })
    }
}

#[async_trait]
impl ModerationService for OpenAiModerationClient {
    async fn moderate(&self, text: &str) -> Result<ModerationVerdict> {
        debug!("Calling moderations API");

        let request = ModerationRequest {
            input: text.to_string(),
        };

        let response = self
            .client
            .post(format!("{}/moderations", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| PaideiaError::Moderation(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PaideiaError::Moderation(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: ModerationResponse = response
            .json()
            .await
            .map_err(|e| PaideiaError::Moderation(format!("Failed to parse response: {}", e)))?;

        let result = api_response
            .results
            .first()
            .ok_or_else(|| PaideiaError::Moderation("Empty moderation response".to_string()))?;

        Ok(ModerationVerdict {
            flagged: result.flagged,
            self_harm: result.categories.self_harm
                || result.categories.self_harm_intent
                || result.categories.self_harm_instructions,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_categories_deserialize_hyphenated_keys() {
        let raw = serde_json::json!({
            "results": [{
                "flagged": true,
                "categories": {
                    "self-harm": true,
                    "violence": false
                }
            }]
        });
        let parsed: ModerationResponse = serde_json::from_value(raw).unwrap();
        assert!(parsed.results[0].flagged);
        assert!(parsed.results[0].categories.self_harm);
        assert!(!parsed.results[0].categories.self_harm_intent);
    }
}
