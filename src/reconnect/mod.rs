//! Auto-reconnecting research streams
//!
//! A [`Reconnector`] drives one research task across as many connections as
//! its [`RetryPolicy`] allows:
//! - the first connection creates the task
//! - after a transport failure it waits, then resumes strictly after the
//!   last forwarded event, so nothing is skipped or repeated
//! - every outcome, including giving up, arrives as a [`ProgressEvent`]
//!
//! Connections are pulled lazily. Each one is dropped before the next is
//! opened, and dropping the returned stream drops whichever is open.

mod backoff;
mod state;

pub use backoff::{Backoff, RetryPolicy};
pub use state::{Phase, ReconnectState, Recovery, RETRIES_EXHAUSTED_PREFIX};

use crate::api::{ApiError, HttpTransport, ProgressEvent, Transport};
use crate::config::{Config, ConfigError};
use crate::metrics::StreamMetrics;
use crate::stream::{StreamClient, StreamOptions};
use futures_util::{Stream, StreamExt};
use std::pin::Pin;
use tracing::{info, warn};

/// Progress events of a whole research task
pub type EventStream = Pin<Box<dyn Stream<Item = ProgressEvent> + Send>>;

pub struct Reconnector<T: Transport = HttpTransport> {
    client: StreamClient<T>,
    policy: RetryPolicy,
    metrics: Option<StreamMetrics>,
}

impl Reconnector<HttpTransport> {
    /// Reconnector with the default policy. Without an explicit key the
    /// `GOOGLE_API_KEY` environment variable is used.
    pub fn new(api_key: Option<String>) -> Result<Self, ConfigError> {
        Ok(Self::with_client(
            StreamClient::new(api_key)?,
            RetryPolicy::default(),
        ))
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        Ok(Self::with_client(
            StreamClient::from_config(config)?,
            RetryPolicy::from(&config.reconnect),
        ))
    }
}

impl<T: Transport> Reconnector<T> {
    /// The policy decides whether an upstream Error ends the connection
    pub fn with_client(client: StreamClient<T>, policy: RetryPolicy) -> Self {
        Self {
            client: client.with_stop_on_error(policy.stop_on_upstream_error),
            policy,
            metrics: None,
        }
    }

    /// Record connections and forwarded events into `metrics`
    pub fn with_metrics(mut self, metrics: StreamMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Run a research task to completion or failure.
    ///
    /// The stream ends after a Complete event or after exactly one terminal
    /// Error event; transport errors never escape it.
    pub fn stream(self, query: &str, options: StreamOptions) -> EventStream {
        let Reconnector {
            client,
            policy,
            metrics,
        } = self;
        let query = query.to_string();

        Box::pin(async_stream::stream! {
            let mut state = ReconnectState::new(policy);

            loop {
                let mut connection = match state.interaction_id() {
                    Some(interaction_id) => client.resume(interaction_id, state.last_event_id()),
                    None => client.open(&query, options),
                };
                state.connecting();
                if let Some(metrics) = &metrics {
                    metrics.record_connection(state.connections() > 1);
                }

                let failure = loop {
                    match connection.next().await {
                        Some(Ok(event)) => {
                            let event = state.observe(event);
                            if let Some(metrics) = &metrics {
                                metrics.record_event(&event);
                            }
                            yield event;
                            if state.phase().is_terminal() {
                                break None;
                            }
                        }
                        Some(Err(e)) => break Some(e),
                        None => {
                            break Some(ApiError::Stream(
                                "stream ended before completion".to_string(),
                            ))
                        }
                    }
                };
                drop(connection);

                let Some(error) = failure else {
                    info!(
                        "Research {:?} finished after {} connection(s)",
                        state.phase(),
                        state.connections()
                    );
                    return;
                };

                warn!("Research stream failed: {}", error);
                if let Some(metrics) = &metrics {
                    metrics.record_failure();
                }

                match state.failure(&error) {
                    Recovery::Retry { attempt, delay } => {
                        warn!(
                            "Reconnecting in {:?} (attempt {}/{}, after event {:?})",
                            delay,
                            attempt,
                            state.policy().max_attempts,
                            state.last_event_id()
                        );
                        tokio::time::sleep(delay).await;
                    }
                    Recovery::GiveUp(event) => {
                        warn!("Giving up on research: {}", event.content);
                        if let Some(metrics) = &metrics {
                            metrics.record_event(&event);
                        }
                        yield event;
                        return;
                    }
                }
            }
        })
    }
}
