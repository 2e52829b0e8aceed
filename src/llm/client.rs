//! LLM client for video analysis.
//!
//! Talks to an OpenAI-compatible chat completion endpoint (OpenRouter by
//! default).

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use super::catalog::ModelCatalog;
use super::prompts::PromptTemplates;
use crate::scrapers::HttpClient;

/// Configuration for the LLM client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    /// Chat completion API root (default: https://openrouter.ai/api/v1)
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Bearer token; usually supplied through OPENROUTER_API_KEY
    #[serde(default)]
    pub api_key: Option<String>,
    /// Model used when a request names none
    #[serde(default = "default_model")]
    pub default_model: String,
    /// Sent as HTTP-Referer
    #[serde(default = "default_referer")]
    pub referer: String,
    /// Sent as X-Title
    #[serde(default = "default_title")]
    pub title: String,
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub models: ModelCatalog,
    #[serde(default)]
    pub prompts: PromptTemplates,
}

fn default_endpoint() -> String {
    "https://openrouter.ai/api/v1".to_string()
}
fn default_model() -> String {
    "deepseek/deepseek-chat-v3-0324".to_string()
}
fn default_referer() -> String {
    "http://localhost".to_string()
}
fn default_title() -> String {
    "ytinsights".to_string()
}
fn default_timeout_secs() -> u64 {
    300
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            endpoint: default_endpoint(),
            api_key: None,
            default_model: default_model(),
            referer: default_referer(),
            title: default_title(),
            timeout_secs: default_timeout_secs(),
            models: ModelCatalog::default(),
            prompts: PromptTemplates::default(),
        }
    }
}

impl LlmConfig {
    pub fn with_endpoint(mut self, endpoint: &str) -> Self {
        self.endpoint = endpoint.trim_end_matches('/').to_string();
        self
    }

    pub fn with_api_key(mut self, api_key: &str) -> Self {
        self.api_key = Some(api_key.to_string());
        self
    }

    pub fn with_model(mut self, model: &str) -> Self {
        self.default_model = model.to_string();
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Resolve a display name or model id, falling back to the default model.
    pub fn resolve_model(&self, requested: Option<&str>) -> Result<String, LlmError> {
        match requested.map(str::trim).filter(|r| !r.is_empty()) {
            None => Ok(self.default_model.clone()),
            Some(name) => self
                .models
                .resolve(name)
                .ok_or_else(|| LlmError::UnknownModel(name.to_string())),
        }
    }
}

/// Errors that can occur during LLM operations.
#[derive(Debug, Error)]
pub enum LlmError {
    #[error("connection error: {0}")]
    Connection(#[from] reqwest::Error),

    #[error("API error (HTTP {status}): {message}")]
    Api { status: u16, message: String },

    #[error("parse error: {0}")]
    Parse(String),

    #[error("response contained no choices")]
    NoChoices,

    #[error("no API key configured (set OPENROUTER_API_KEY)")]
    MissingApiKey,

    #[error("unknown model: {0}")]
    UnknownModel(String),
}

/// Produces an analysis for a prompt.
#[async_trait]
pub trait Analyzer: Send + Sync {
    async fn analyze(&self, prompt: &str, model_id: &str) -> Result<String, LlmError>;
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

/// Chat completion client.
#[derive(Debug, Clone)]
pub struct OpenRouterClient {
    config: LlmConfig,
    http: HttpClient,
}

impl OpenRouterClient {
    pub fn new(config: LlmConfig, http: HttpClient) -> Self {
        Self { config, http }
    }

    /// Build with a dedicated HTTP client using the configured timeout.
    pub fn from_config(config: LlmConfig) -> Result<Self, LlmError> {
        let http = HttpClient::new(config.timeout())?;
        Ok(Self::new(config, http))
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    async fn call_chat_completion(&self, prompt: &str, model_id: &str) -> Result<String, LlmError> {
        let api_key = self
            .config
            .api_key
            .as_deref()
            .filter(|k| !k.trim().is_empty())
            .ok_or(LlmError::MissingApiKey)?;

        let request = ChatRequest {
            model: model_id,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
        };
        let url = format!("{}/chat/completions", self.config.endpoint.trim_end_matches('/'));
        let authorization = format!("Bearer {}", api_key);
        let headers = [
            ("Authorization", authorization.as_str()),
            ("HTTP-Referer", self.config.referer.as_str()),
            ("X-Title", self.config.title.as_str()),
        ];

        let resp = self.http.post_json(&url, &headers, &request).await?;
        if resp.status.as_u16() != 200 {
            let status = resp.status.as_u16();
            let message = resp.text().await.unwrap_or_default();
            return Err(LlmError::Api { status, message });
        }

        let body = resp.text().await?;
        let parsed: ChatResponse =
            serde_json::from_str(&body).map_err(|e| LlmError::Parse(e.to_string()))?;

        parsed
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.unwrap_or_default())
            .ok_or(LlmError::NoChoices)
    }
}

#[async_trait]
impl Analyzer for OpenRouterClient {
    async fn analyze(&self, prompt: &str, model_id: &str) -> Result<String, LlmError> {
        debug!("Sending {} char prompt to {}", prompt.len(), model_id);
        let content = self.call_chat_completion(prompt, model_id).await?;
        info!("Model {} returned {} chars", model_id, content.len());
        Ok(content)
    }
}
