//! Interactions API surface: wire types, SSE decoding and the transport seam

mod client;
mod request;
mod response;
pub mod sse;
mod streaming;

#[cfg(test)]
pub(crate) mod mock;

pub use client::{HttpTransport, DEFAULT_BASE_URL};
pub use request::{AgentConfig, CreateRequest, ResumeRequest, DEEP_RESEARCH_AGENT_TYPE};
pub use response::{InteractionError, InteractionOutput, InteractionSnapshot};
pub use sse::{DecodeAnomaly, Decoded};
pub use streaming::{
    ProgressEvent, ProgressKind, COMPLETE_MESSAGE, START_MESSAGE, UNKNOWN_ERROR_MESSAGE,
};

use crate::config::ConfigError;
use async_trait::async_trait;
use futures_util::Stream;
use serde_json::Value;
use std::fmt;
use std::pin::Pin;
use std::time::Duration;
use thiserror::Error;

/// Environment variable consulted when no key is passed explicitly
pub const DEFAULT_API_KEY_ENV: &str = "GOOGLE_API_KEY";

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Authentication failed: {0}")]
    Auth(String),

    #[error("Rate limited: retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },

    #[error("Provider error: {0}")]
    Provider(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("No data received for {0:?}")]
    Timeout(Duration),

    #[error("Stream error: {0}")]
    Stream(String),
}

impl ApiError {
    /// Whether reconnecting could help. Credentials and malformed requests
    /// fail the same way on every attempt.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, ApiError::Auth(_) | ApiError::InvalidRequest(_))
    }
}

/// A resolved API credential. Debug output never shows the key.
#[derive(Clone, PartialEq, Eq)]
pub struct ApiKey(String);

impl ApiKey {
    /// Resolve a credential: a non-blank explicit key wins, otherwise the
    /// named environment variable.
    pub fn resolve(explicit: Option<String>, env_var: &str) -> Result<Self, ConfigError> {
        explicit
            .filter(|k| !k.trim().is_empty())
            .or_else(|| std::env::var(env_var).ok().filter(|k| !k.trim().is_empty()))
            .map(|k| ApiKey(k.trim().to_string()))
            .ok_or_else(|| ConfigError::MissingApiKey(env_var.to_string()))
    }

    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for ApiKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("ApiKey(***)")
    }
}

/// Raw JSON chunks of one open connection. Dropping it releases the connection.
pub type ChunkStream = Pin<Box<dyn Stream<Item = Result<Value, ApiError>> + Send>>;

/// The remote interactions service
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Create an interaction and stream its chunks
    async fn create_stream(
        &self,
        key: &ApiKey,
        request: &CreateRequest,
    ) -> Result<ChunkStream, ApiError>;

    /// Reopen the stream of an existing interaction after `last_event_id`
    async fn resume_stream(
        &self,
        key: &ApiKey,
        request: &ResumeRequest,
    ) -> Result<ChunkStream, ApiError>;

    /// Create an interaction without streaming
    async fn create(
        &self,
        key: &ApiKey,
        request: &CreateRequest,
    ) -> Result<InteractionSnapshot, ApiError>;

    /// Fetch the current state of an interaction
    async fn get(&self, key: &ApiKey, interaction_id: &str)
        -> Result<InteractionSnapshot, ApiError>;
}
