//! Configuration management for research-stream
//!
//! Supports configuration via:
//! 1. Config file (~/.config/research-stream/config.toml)
//! 2. Environment variables (GOOGLE_API_KEY, RESEARCH_STREAM_BASE_URL, RESEARCH_STREAM_AGENT_ID)
//! 3. CLI arguments (override file/env settings)

use crate::api::{ApiKey, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL};
use crate::research::DEFAULT_FOLLOW_UP_MODEL;
use crate::stream::DEEP_RESEARCH_AGENT_ID;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const BASE_URL_ENV: &str = "RESEARCH_STREAM_BASE_URL";
pub const AGENT_ID_ENV: &str = "RESEARCH_STREAM_AGENT_ID";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Config file not found: {0}")]
    NotFound(PathBuf),

    #[error("Failed to read config: {0}")]
    ReadError(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    ParseError(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    SerializeError(#[from] toml::ser::Error),

    #[error("No API key: pass one explicitly or set {0}")]
    MissingApiKey(String),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Interactions API access
    pub api: ApiSettings,

    /// Stream decoding settings
    pub stream: StreamConfig,

    /// Reconnect policy
    pub reconnect: ReconnectConfig,

    /// Poll-based research settings
    pub research: ResearchConfig,
}

/// Interactions API settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiSettings {
    /// API key (can also use the `api_key_env` variable)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Environment variable holding the API key
    pub api_key_env: String,

    /// Base URL for the Interactions API
    pub base_url: String,

    /// Research agent identifier
    pub agent_id: String,

    /// Model for follow-up questions
    pub follow_up_model: String,
}

impl Default for ApiSettings {
    fn default() -> Self {
        Self {
            api_key: None,
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            base_url: DEFAULT_BASE_URL.to_string(),
            agent_id: DEEP_RESEARCH_AGENT_ID.to_string(),
            follow_up_model: DEFAULT_FOLLOW_UP_MODEL.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamConfig {
    /// Request thought summaries
    pub include_thoughts: bool,

    /// Longest wait for a single chunk, 0 disables
    pub idle_timeout_secs: u64,

    /// Surface unrecognized chunks as error events
    pub strict_decoding: bool,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            include_thoughts: true,
            idle_timeout_secs: 300,
            strict_decoding: false,
        }
    }
}

impl StreamConfig {
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_secs > 0).then(|| Duration::from_secs(self.idle_timeout_secs))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackoffKind {
    Exponential,
    Fixed,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReconnectConfig {
    /// Reconnects allowed before giving up
    pub max_attempts: u32,

    pub backoff: BackoffKind,

    /// Fixed delay, or the base of the exponential schedule
    pub retry_delay_ms: u64,

    /// Cap on exponential delays
    pub max_delay_ms: u64,

    /// Spread exponential delays by ±25%
    pub jitter: bool,

    /// Restore the retry budget once a reconnected stream makes progress
    pub reset_on_progress: bool,

    /// End the task when upstream reports an error
    pub stop_on_upstream_error: bool,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            backoff: BackoffKind::Exponential,
            retry_delay_ms: 2000,
            max_delay_ms: 30_000,
            jitter: true,
            reset_on_progress: true,
            stop_on_upstream_error: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResearchConfig {
    /// Seconds between status checks
    pub poll_interval_secs: u64,

    /// Give up after this many seconds
    pub max_research_secs: u64,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: 10,
            max_research_secs: 3600,
        }
    }
}

impl Config {
    /// Get default config file path
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("research-stream")
            .join("config.toml")
    }

    /// Load config from default location
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(Self::default_path())
    }

    /// Load config from specific path, falling back to defaults if absent
    pub fn load_from(path: PathBuf) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default().with_env_overrides());
        }
        Self::read(&path)
    }

    /// Load config from a file that must exist
    pub fn read(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Err(ConfigError::NotFound(path.to_path_buf()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;

        Ok(config.with_env_overrides())
    }

    /// Apply environment variable overrides
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(url) = non_empty_env(BASE_URL_ENV) {
            self.api.base_url = url;
        }
        if let Some(agent) = non_empty_env(AGENT_ID_ENV) {
            self.api.agent_id = agent;
        }
        self
    }

    /// Save config to default location
    pub fn save(&self) -> Result<(), ConfigError> {
        self.save_to(Self::default_path())
    }

    /// Save config to specific path
    pub fn save_to(&self, path: PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let content = toml::to_string_pretty(self)?;
        std::fs::write(&path, content)?;

        Ok(())
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.api.agent_id.trim().is_empty() {
            return Err(ConfigError::Invalid("api.agent_id must not be empty".to_string()));
        }
        if self.api.base_url.trim().is_empty() {
            return Err(ConfigError::Invalid("api.base_url must not be empty".to_string()));
        }
        if self.research.poll_interval_secs == 0 {
            return Err(ConfigError::Invalid(
                "research.poll_interval_secs must be at least 1".to_string(),
            ));
        }
        if self.reconnect.backoff == BackoffKind::Exponential {
            if self.reconnect.retry_delay_ms == 0 {
                return Err(ConfigError::Invalid(
                    "reconnect.retry_delay_ms must be positive for exponential backoff"
                        .to_string(),
                ));
            }
            if self.reconnect.max_delay_ms < self.reconnect.retry_delay_ms {
                return Err(ConfigError::Invalid(
                    "reconnect.max_delay_ms must not be below reconnect.retry_delay_ms"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Resolve the API key (from config or env)
    pub fn api_key(&self) -> Result<ApiKey, ConfigError> {
        ApiKey::resolve(self.api.api_key.clone(), &self.api.api_key_env)
    }

    /// Generate example config content
    pub fn example() -> String {
        let example = Config::default();
        toml::to_string_pretty(&example).unwrap_or_default()
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

/// Builder for creating Config programmatically
pub struct ConfigBuilder {
    config: Config,
}

impl ConfigBuilder {
    pub fn new() -> Self {
        Self {
            config: Config::default(),
        }
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api.api_key = Some(key.into());
        self
    }

    pub fn api_key_env(mut self, name: impl Into<String>) -> Self {
        self.config.api.api_key_env = name.into();
        self
    }

    pub fn base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api.base_url = url.into();
        self
    }

    pub fn agent_id(mut self, agent: impl Into<String>) -> Self {
        self.config.api.agent_id = agent.into();
        self
    }

    pub fn include_thoughts(mut self, include: bool) -> Self {
        self.config.stream.include_thoughts = include;
        self
    }

    pub fn idle_timeout_secs(mut self, secs: u64) -> Self {
        self.config.stream.idle_timeout_secs = secs;
        self
    }

    pub fn strict_decoding(mut self, strict: bool) -> Self {
        self.config.stream.strict_decoding = strict;
        self
    }

    pub fn max_attempts(mut self, attempts: u32) -> Self {
        self.config.reconnect.max_attempts = attempts;
        self
    }

    pub fn backoff(mut self, kind: BackoffKind, retry_delay_ms: u64) -> Self {
        self.config.reconnect.backoff = kind;
        self.config.reconnect.retry_delay_ms = retry_delay_ms;
        self
    }

    pub fn poll_interval_secs(mut self, secs: u64) -> Self {
        self.config.research.poll_interval_secs = secs;
        self
    }

    pub fn build(self) -> Config {
        self.config
    }
}

impl Default for ConfigBuilder {
    fn default() -> Self {
        Self::new()
    }
}
