//! Reconnect state machine
//!
//! Tracks where a research task is (`Init → Streaming ⇄ Reconnecting →
//! Complete | Failed`), the resume cursor, and the retry budget. It performs
//! no I/O; the driver in the parent module feeds it events and failures.

use super::backoff::RetryPolicy;
use crate::api::{ApiError, ProgressEvent, ProgressKind};
use serde::Serialize;
use std::time::Duration;
use tracing::{debug, warn};

pub const RETRIES_EXHAUSTED_PREFIX: &str = "Maximum retries exceeded";

/// Lifecycle phase of a research task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    /// Nothing opened yet
    Init,
    /// A connection is being read
    Streaming,
    /// Waiting out the delay before the next connection
    Reconnecting,
    /// The task finished
    Complete,
    /// The task ended without finishing
    Failed,
}

impl Phase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Phase::Complete | Phase::Failed)
    }
}

/// Outcome of a failed connection
#[derive(Debug, Clone, PartialEq)]
pub enum Recovery {
    /// Wait `delay`, then open the next connection
    Retry { attempt: u32, delay: Duration },
    /// Forward this terminal event and stop
    GiveUp(ProgressEvent),
}

#[derive(Debug)]
pub struct ReconnectState {
    policy: RetryPolicy,
    phase: Phase,
    interaction_id: Option<String>,
    last_event_id: Option<String>,
    attempt_count: u32,
    connections: u32,
    progressed: bool,
}

impl ReconnectState {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            phase: Phase::Init,
            interaction_id: None,
            last_event_id: None,
            attempt_count: 0,
            connections: 0,
            progressed: false,
        }
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn interaction_id(&self) -> Option<&str> {
        self.interaction_id.as_deref()
    }

    /// Cursor of the last forwarded event
    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }

    pub fn attempt_count(&self) -> u32 {
        self.attempt_count
    }

    /// Connections opened so far
    pub fn connections(&self) -> u32 {
        self.connections
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// A new connection is being opened
    pub fn connecting(&mut self) {
        self.phase = Phase::Streaming;
        self.connections += 1;
        self.progressed = false;
    }

    /// Record an event about to be forwarded and return it, flagged if its
    /// cursor moved backwards.
    pub fn observe(&mut self, mut event: ProgressEvent) -> ProgressEvent {
        if self.interaction_id.is_none() {
            self.interaction_id = event.interaction_id.clone();
        }

        if let Some(event_id) = event.event_id.clone() {
            if let Some(previous) = &self.last_event_id {
                if is_regression(previous, &event_id) {
                    warn!(
                        "Event id went backwards: {} after {} (interaction {:?})",
                        event_id, previous, self.interaction_id
                    );
                    event = event.with_metadata("out_of_order", true);
                }
            }
            self.last_event_id = Some(event_id);
        }

        if !self.progressed && self.connections > 1 && self.policy.reset_on_progress {
            if self.attempt_count > 0 {
                debug!("Reconnected stream made progress, resetting retry budget");
            }
            self.attempt_count = 0;
        }
        self.progressed = true;

        match event.kind {
            ProgressKind::Complete => self.phase = Phase::Complete,
            ProgressKind::Error
                if self.policy.stop_on_upstream_error
                    && !event.metadata.contains_key("decode_anomaly") =>
            {
                self.phase = Phase::Failed
            }
            _ => {}
        }

        event
    }

    /// Record a failed connection and decide whether to reconnect
    pub fn failure(&mut self, error: &ApiError) -> Recovery {
        if !error.is_retryable() {
            self.phase = Phase::Failed;
            return Recovery::GiveUp(self.terminal_error(error.to_string()));
        }

        self.attempt_count += 1;
        if self.attempt_count > self.policy.max_attempts {
            self.phase = Phase::Failed;
            let event = self
                .terminal_error(format!("{}: {}", RETRIES_EXHAUSTED_PREFIX, error))
                .with_metadata("retries_exhausted", true)
                .with_metadata("attempts", self.attempt_count);
            return Recovery::GiveUp(event);
        }

        self.phase = Phase::Reconnecting;
        let mut delay = self.policy.backoff.delay(self.attempt_count);
        if let ApiError::RateLimited { retry_after_secs } = error {
            delay = delay.max(Duration::from_secs(*retry_after_secs));
        }
        Recovery::Retry {
            attempt: self.attempt_count,
            delay,
        }
    }

    fn terminal_error(&self, message: String) -> ProgressEvent {
        let mut event = ProgressEvent::error(message).with_event_id(self.last_event_id.clone());
        event.interaction_id = self.interaction_id.clone();
        event
    }
}

/// Both ids numeric and the new one lower
fn is_regression(previous: &str, current: &str) -> bool {
    match (previous.parse::<u64>(), current.parse::<u64>()) {
        (Ok(prev), Ok(cur)) => cur < prev,
        _ => false,
    }
}
