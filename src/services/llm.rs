//! Completion service for response synthesis and intent extraction
//!
//! Provides integration with the OpenAI chat completions API for:
//! - Final tutoring answer synthesis
//! - Structured intent extraction (JSON mode)
//! - Academic integrity judgments

use crate::config::PaideiaConfig;
use crate::error::{PaideiaError, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

/// Request timeout duration
const REQUEST_TIMEOUT_SECS: u64 = 60;

/// Single-turn completion contract
///
/// `complete_structured` constrains the model to emit a JSON object and
/// returns the parsed value; a transport failure surfaces as
/// `CompletionApi`, unparsable model output as `Serialization` so callers
/// can recover locally.
#[async_trait]
pub trait CompletionService: Send + Sync {
    /// Free-text completion
    async fn complete(&self, prompt: &str) -> Result<String>;

    /// JSON-constrained completion
    async fn complete_structured(&self, prompt: &str) -> Result<serde_json::Value>;
}

/// Configuration for the OpenAI-backed completion client
#[derive(Debug, Clone)]
pub struct OpenAiConfig {
    /// OpenAI API key
    pub api_key: String,

    /// Model to use (default: gpt-4o-mini)
    pub model: String,

    /// Max tokens for responses
    pub max_tokens: usize,

    /// Temperature for sampling
    pub temperature: f32,

    /// API base URL
    pub base_url: String,
}

impl OpenAiConfig {
    /// Build from the environment and pipeline configuration
    pub fn from_config(config: &PaideiaConfig) -> Result<Self> {
        Ok(Self {
            api_key: PaideiaConfig::api_key()?,
            model: config.completion_model.clone(),
            max_tokens: 1024,
            temperature: 0.1,
            base_url: "https://api.openai.com/v1".to_string(),
        })
    }
}

/// OpenAI chat completions client
pub struct OpenAiClient {
    config: OpenAiConfig,
    client: reqwest::Client,
}

/// Chat completions request format
#[derive(Debug, Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: usize,
    temperature: f32,
    messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: String,
}

/// Chat completions response format
#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAiClient {
    /// Create a new completion client
    pub fn new(config: OpenAiConfig) -> Result<Self> {
        if config.api_key.is_empty() {
            return Err(PaideiaError::Config(config::ConfigError::Message(
                "OpenAI API key not set".to_string(),
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()?;

        Ok(Self { config, client })
    }

    /// Make a chat completions API call
    async fn call_api(&self, prompt: &str, json_mode: bool) -> Result<String> {
        debug!(model = %self.config.model, json_mode, "Calling chat completions API");

        let request = ChatRequest {
            model: self.config.model.clone(),
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            messages: vec![ChatMessage {
                role: "user".to_string(),
                content: prompt.to_string(),
            }],
            response_format: json_mode.then(|| ResponseFormat {
                format_type: "json_object".to_string(),
            }),
        };

        let response = self
            .client
            .post(format!("{}/chat/completions", self.config.base_url))
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(PaideiaError::CompletionApi(format!(
                "API request failed with status {}: {}",
                status, error_text
            )));
        }

        let api_response: ChatResponse = response
            .json()
            .await
            .map_err(|e| PaideiaError::CompletionApi(format!("Failed to parse response: {}", e)))?;

        api_response
            .choices
            .first()
            .and_then(|c| c.message.content.clone())
            .ok_or_else(|| PaideiaError::CompletionApi("Empty response from API".to_string()))
    }
}

#[async_trait]
impl CompletionService for OpenAiClient {
    async fn complete(&self, prompt: &str) -> Result<String> {
        self.call_api(prompt, false).await
    }

    async fn complete_structured(&self, prompt: &str) -> Result<serde_json::Value> {
        let text = self.call_api(prompt, true).await?;
        parse_json_reply(&text)
    }
}

/// Parse a model reply as JSON, tolerating a fenced code block wrapper
pub(crate) fn parse_json_reply(text: &str) -> Result<serde_json::Value> {
    let trimmed = text.trim();
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Ok(value);
    }

    let unfenced = trimmed
        .strip_prefix("```json")
        .or_else(|| trimmed.strip_prefix("```"))
        .and_then(|rest| rest.strip_suffix("```"))
        .map(str::trim)
        .unwrap_or(trimmed);

    Ok(serde_json::from_str(unfenced)?)
}
