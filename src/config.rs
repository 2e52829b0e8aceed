//! Configuration management for ytinsights using the prefer crate.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use prefer::ConfigValue;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use crate::cache::{CacheError, CacheStore};
use crate::fetch::CommentSettings;
use crate::llm::{LlmConfig, OpenRouterClient};
use crate::pipeline::{Pipeline, PipelineOptions, Sources};
use crate::scrapers::{HttpClient, RateLimiter, RetryPolicy, TokioSleeper};
use crate::youtube::{DataApiClient, TranscriptClient};

/// Environment variable holding the YouTube Data API key.
pub const YOUTUBE_API_KEY_ENV: &str = "YOUTUBE_API_KEY";
/// Environment variable holding the OpenRouter API key.
pub const OPENROUTER_API_KEY_ENV: &str = "OPENROUTER_API_KEY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to build HTTP client: {0}")]
    Http(#[from] reqwest::Error),

    #[error(transparent)]
    Cache(#[from] CacheError),
}

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Root of the transcript, comment and analysis caches.
    pub cache_dir: PathBuf,
    /// User agent for HTTP requests (None = default, "impersonate" = browser).
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    pub request_timeout: u64,
    /// Delay between requests in milliseconds.
    pub request_delay_ms: u64,
    /// Proxy for transcript requests only.
    pub proxy_url: Option<String>,
    /// Preferred transcript language.
    pub language: String,
    pub retry: RetryPolicy,
    pub comments: CommentSettings,
    pub youtube_api_key: Option<String>,
    pub llm: LlmConfig,
    /// Bind address for `serve`.
    pub host: String,
    pub port: u16,
}

impl Default for Settings {
    fn default() -> Self {
        let cache_dir = dirs::cache_dir()
            .unwrap_or_else(|| dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")))
            .join("ytinsights");

        Self {
            cache_dir,
            user_agent: None,
            request_timeout: 30,
            request_delay_ms: 0,
            proxy_url: None,
            language: crate::fetch::transcript::DEFAULT_LANGUAGE.to_string(),
            retry: RetryPolicy::default(),
            comments: CommentSettings::default(),
            youtube_api_key: None,
            llm: LlmConfig::default(),
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

impl Settings {
    /// Create settings with a custom cache directory.
    pub fn with_cache_dir(cache_dir: PathBuf) -> Self {
        Self {
            cache_dir,
            ..Default::default()
        }
    }

    /// Read API keys from the process environment.
    pub fn apply_env(&mut self) {
        self.apply_env_with(|key| std::env::var(key).ok());
    }

    /// Read API keys through `lookup`; blank values are ignored.
    pub fn apply_env_with(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let non_blank = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());
        if let Some(key) = non_blank(YOUTUBE_API_KEY_ENV) {
            self.youtube_api_key = Some(key);
        }
        if let Some(key) = non_blank(OPENROUTER_API_KEY_ENV) {
            self.llm.api_key = Some(key);
        }
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout)
    }

    pub fn open_cache(&self) -> Result<CacheStore, CacheError> {
        CacheStore::open(&self.cache_dir)
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            retry: self.retry.clone(),
            comments: self.comments.clone(),
            language: self.language.clone(),
            prompts: self.llm.prompts.clone(),
        }
    }

    /// Wire up the live upstream clients and the cache.
    ///
    /// YouTube clients share one rate limiter; only transcript requests go
    /// through the configured proxy.
    pub fn build_pipeline(&self) -> Result<Pipeline, ConfigError> {
        let cache = self.open_cache()?;
        let limiter = RateLimiter::new();
        let delay = Duration::from_millis(self.request_delay_ms);

        let api_http = HttpClient::builder(self.request_timeout())
            .user_agent(self.user_agent.as_deref())
            .request_delay(delay)
            .rate_limiter(limiter.clone())
            .build()?;
        let transcript_http = HttpClient::builder(self.request_timeout())
            .user_agent(self.user_agent.as_deref())
            .proxy(self.proxy_url.as_deref())
            .request_delay(delay)
            .rate_limiter(limiter)
            .build()?;
        let llm_http = HttpClient::builder(self.llm.timeout()).build()?;

        let data_api = Arc::new(DataApiClient::new(
            api_http,
            self.youtube_api_key.clone().unwrap_or_default(),
        ));
        let sources = Sources {
            transcripts: Arc::new(TranscriptClient::new(transcript_http)),
            comments: data_api.clone(),
            metadata: data_api,
            analyzer: Arc::new(OpenRouterClient::new(self.llm.clone(), llm_http)),
            sleeper: Arc::new(TokioSleeper),
        };

        Ok(Pipeline::new(cache, sources, self.pipeline_options()))
    }
}

/// Configuration file structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Cache directory (`~` is expanded).
    #[serde(default)]
    pub cache_dir: Option<String>,
    #[serde(default)]
    pub user_agent: Option<String>,
    /// Request timeout in seconds.
    #[serde(default)]
    pub request_timeout: Option<u64>,
    /// Delay between requests in milliseconds.
    #[serde(default)]
    pub request_delay_ms: Option<u64>,
    /// Proxy URL for transcript requests.
    #[serde(default)]
    pub proxy_url: Option<String>,
    #[serde(default)]
    pub language: Option<String>,
    /// Transcript attempts, including the first.
    #[serde(default)]
    pub retry_attempts: Option<u32>,
    /// First retry wait in milliseconds; later waits double.
    #[serde(default)]
    pub retry_base_delay_ms: Option<u64>,
    #[serde(default)]
    pub comment_page_size: Option<u32>,
    #[serde(default)]
    pub max_comments: Option<usize>,
    /// Pause between comment pages in milliseconds.
    #[serde(default)]
    pub comment_page_delay_ms: Option<u64>,
    #[serde(default)]
    pub youtube_api_key: Option<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub port: Option<u16>,
    /// LLM endpoint, model catalogue and prompt templates.
    #[serde(default)]
    pub llm: LlmConfig,
}

impl Config {
    /// Load configuration using prefer crate.
    /// Automatically discovers ytinsights config files in standard locations.
    pub async fn load() -> Self {
        match prefer::load("ytinsights").await {
            Ok(pref_config) => {
                let cache_dir: Option<String> = pref_config.get("cache_dir").ok();
                let user_agent: Option<String> = pref_config.get("user_agent").ok();
                let request_timeout: Option<u64> = pref_config.get("request_timeout").ok();
                let request_delay_ms: Option<u64> = pref_config.get("request_delay_ms").ok();
                let proxy_url: Option<String> = pref_config.get("proxy_url").ok();
                let language: Option<String> = pref_config.get("language").ok();
                let retry_attempts: Option<u32> = pref_config.get("retry_attempts").ok();
                let retry_base_delay_ms: Option<u64> = pref_config.get("retry_base_delay_ms").ok();
                let comment_page_size: Option<u32> = pref_config.get("comment_page_size").ok();
                let max_comments: Option<usize> = pref_config.get("max_comments").ok();
                let comment_page_delay_ms: Option<u64> =
                    pref_config.get("comment_page_delay_ms").ok();
                let youtube_api_key: Option<String> = pref_config.get("youtube_api_key").ok();
                let host: Option<String> = pref_config.get("host").ok();
                let port: Option<u16> = pref_config.get("port").ok();
                let llm = match pref_config.get_value("llm") {
                    Ok(value) => llm_from_value(value),
                    Err(_) => LlmConfig::default(),
                };

                Config {
                    cache_dir,
                    user_agent,
                    request_timeout,
                    request_delay_ms,
                    proxy_url,
                    language,
                    retry_attempts,
                    retry_base_delay_ms,
                    comment_page_size,
                    max_comments,
                    comment_page_delay_ms,
                    youtube_api_key,
                    host,
                    port,
                    llm,
                }
            }
            Err(_) => {
                // No config file found, use defaults
                Self::default()
            }
        }
    }

    /// Apply configuration to settings.
    pub fn apply_to_settings(&self, settings: &mut Settings) {
        if let Some(ref cache_dir) = self.cache_dir {
            let path = shellexpand::tilde(cache_dir);
            settings.cache_dir = PathBuf::from(path.as_ref());
        }
        if let Some(ref user_agent) = self.user_agent {
            settings.user_agent = Some(user_agent.clone());
        }
        if let Some(timeout) = self.request_timeout {
            settings.request_timeout = timeout;
        }
        if let Some(delay) = self.request_delay_ms {
            settings.request_delay_ms = delay;
        }
        if let Some(ref proxy) = self.proxy_url {
            settings.proxy_url = Some(proxy.clone());
        }
        if let Some(ref language) = self.language {
            settings.language = language.clone();
        }
        if let Some(attempts) = self.retry_attempts {
            settings.retry = settings.retry.clone().with_max_attempts(attempts);
        }
        if let Some(delay) = self.retry_base_delay_ms {
            settings.retry = settings
                .retry
                .clone()
                .with_base_delay(Duration::from_millis(delay));
        }
        if let Some(size) = self.comment_page_size {
            settings.comments.page_size = size;
        }
        if let Some(max) = self.max_comments {
            settings.comments.max_comments = max;
        }
        if let Some(delay) = self.comment_page_delay_ms {
            settings.comments.page_delay = Duration::from_millis(delay);
        }
        if let Some(ref key) = self.youtube_api_key {
            settings.youtube_api_key = Some(key.clone());
        }
        if let Some(ref host) = self.host {
            settings.host = host.clone();
        }
        if let Some(port) = self.port {
            settings.port = port;
        }
        settings.llm = self.llm.clone();
    }
}

/// Decode the `llm` table. Unknown or mistyped fields leave the whole
/// section at its defaults, with a warning.
fn llm_from_value(value: &ConfigValue) -> LlmConfig {
    match serde_json::from_value(config_value_to_json(value)) {
        Ok(llm) => llm,
        Err(e) => {
            warn!("Ignoring invalid llm config section: {}", e);
            LlmConfig::default()
        }
    }
}

fn config_value_to_json(value: &ConfigValue) -> serde_json::Value {
    match value {
        ConfigValue::Null => serde_json::Value::Null,
        ConfigValue::Bool(b) => serde_json::Value::Bool(*b),
        ConfigValue::Integer(i) => serde_json::Value::from(*i),
        ConfigValue::Float(f) => serde_json::Number::from_f64(*f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ConfigValue::String(s) => serde_json::Value::String(s.clone()),
        ConfigValue::Array(items) => {
            serde_json::Value::Array(items.iter().map(config_value_to_json).collect())
        }
        ConfigValue::Object(map) => serde_json::Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), config_value_to_json(v)))
                .collect(),
        ),
    }
}

/// Load settings from configuration and the environment.
pub async fn load_settings() -> Settings {
    let config = Config::load().await;
    let mut settings = Settings::default();
    config.apply_to_settings(&mut settings);
    settings.apply_env();
    settings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::prompts::{DEFAULT_PROMPT_COMMENT_LIMIT, DEFAULT_TRANSCRIPT_INSTRUCTION};

    #[test]
    fn test_defaults() {
        let settings = Settings::default();
        assert!(settings.cache_dir.ends_with("ytinsights"));
        assert_eq!(settings.language, "en");
        assert_eq!(settings.retry.max_attempts, 3);
        assert_eq!(settings.comments.max_comments, 3000);
        assert_eq!(settings.port, 8000);
        assert!(settings.proxy_url.is_none());
    }

    #[test]
    fn test_apply_config() {
        let config: Config = serde_json::from_str(
            r#"{
                "cache_dir": "~/yt-cache",
                "proxy_url": "socks5://127.0.0.1:9050",
                "retry_attempts": 5,
                "retry_base_delay_ms": 500,
                "max_comments": 200,
                "comment_page_delay_ms": 0,
                "llm": {"default_model": "openai/gpt-4o-mini"}
            }"#,
        )
        .unwrap();

        let mut settings = Settings::default();
        config.apply_to_settings(&mut settings);

        assert!(!settings.cache_dir.to_string_lossy().starts_with('~'));
        assert!(settings.cache_dir.ends_with("yt-cache"));
        assert_eq!(settings.proxy_url.as_deref(), Some("socks5://127.0.0.1:9050"));
        assert_eq!(settings.retry.max_attempts, 5);
        assert_eq!(settings.retry.base_delay, Duration::from_millis(500));
        assert_eq!(settings.comments.max_comments, 200);
        assert_eq!(settings.comments.page_delay, Duration::ZERO);
        assert_eq!(settings.comments.page_size, 100);
        assert_eq!(settings.llm.default_model, "openai/gpt-4o-mini");
    }

    fn object(entries: Vec<(&str, ConfigValue)>) -> ConfigValue {
        ConfigValue::Object(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect(),
        )
    }

    #[test]
    fn test_llm_section_with_partial_prompts() {
        let value = object(vec![
            ("api_key", ConfigValue::String("sk-test".into())),
            ("timeout_secs", ConfigValue::Integer(30)),
            (
                "prompts",
                object(vec![("comments", ConfigValue::String("Count the jokes.".into()))]),
            ),
        ]);

        let llm = llm_from_value(&value);
        assert_eq!(llm.api_key.as_deref(), Some("sk-test"));
        assert_eq!(llm.timeout_secs, 30);
        assert_eq!(llm.prompts.comments, "Count the jokes.");
        assert_eq!(llm.prompts.transcript, DEFAULT_TRANSCRIPT_INSTRUCTION);
        assert_eq!(llm.prompts.comment_limit, DEFAULT_PROMPT_COMMENT_LIMIT);
    }

    #[test]
    fn test_invalid_llm_section_falls_back_to_defaults() {
        let value = object(vec![("timeout_secs", ConfigValue::String("soon".into()))]);
        let llm = llm_from_value(&value);
        let defaults = LlmConfig::default();
        assert_eq!(llm.timeout_secs, defaults.timeout_secs);
        assert_eq!(llm.default_model, defaults.default_model);
        assert_eq!(llm.prompts, defaults.prompts);
    }

    #[test]
    fn test_env_keys_override_config() {
        let mut settings = Settings::default();
        settings.youtube_api_key = Some("from-file".into());
        settings.apply_env_with(|key| match key {
            YOUTUBE_API_KEY_ENV => Some("yt-env".into()),
            OPENROUTER_API_KEY_ENV => Some("  ".into()),
            _ => None,
        });
        assert_eq!(settings.youtube_api_key.as_deref(), Some("yt-env"));
        assert!(settings.llm.api_key.is_none());
    }

    #[test]
    fn test_build_pipeline_creates_cache_dirs() {
        let dir = tempfile::TempDir::new().unwrap();
        let settings = Settings::with_cache_dir(dir.path().join("cache"));
        let pipeline = settings.build_pipeline().unwrap();
        assert!(pipeline.cache().root().join("transcripts").is_dir());
        assert!(pipeline.cache().root().join("analyses").is_dir());
    }
}
