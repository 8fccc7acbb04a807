//! Uniform progress events decoded from a research stream

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

pub const START_MESSAGE: &str = "Research started";
pub const COMPLETE_MESSAGE: &str = "Research complete";
pub const UNKNOWN_ERROR_MESSAGE: &str = "Unknown error";

/// The kind of a progress update
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProgressKind {
    /// The interaction was created and has an id
    Start,
    /// An intermediate reasoning summary
    Thought,
    /// A piece of the final report
    Content,
    /// The interaction finished
    Complete,
    /// Upstream reported an error, or the client gave up
    Error,
}

impl ProgressKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressKind::Start => "start",
            ProgressKind::Thought => "thought",
            ProgressKind::Content => "content",
            ProgressKind::Complete => "complete",
            ProgressKind::Error => "error",
        }
    }
}

/// A progress update from the research stream
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub kind: ProgressKind,

    /// Human-readable payload
    #[serde(default)]
    pub content: String,

    /// Interaction this event belongs to, once known
    #[serde(skip_serializing_if = "Option::is_none")]
    pub interaction_id: Option<String>,

    /// Upstream position of this event, used as the resume cursor
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_id: Option<String>,

    /// Provider-specific extras, never required for control flow
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ProgressEvent {
    pub fn new(kind: ProgressKind, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
            interaction_id: None,
            event_id: None,
            metadata: BTreeMap::new(),
        }
    }

    pub fn start(interaction_id: impl Into<String>) -> Self {
        Self::new(ProgressKind::Start, START_MESSAGE).with_interaction(interaction_id)
    }

    pub fn thought(text: impl Into<String>) -> Self {
        Self::new(ProgressKind::Thought, text)
    }

    pub fn content(text: impl Into<String>) -> Self {
        Self::new(ProgressKind::Content, text)
    }

    pub fn complete() -> Self {
        Self::new(ProgressKind::Complete, COMPLETE_MESSAGE)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(ProgressKind::Error, message)
    }

    pub fn with_interaction(mut self, interaction_id: impl Into<String>) -> Self {
        self.interaction_id = Some(interaction_id.into());
        self
    }

    pub fn with_event_id(mut self, event_id: Option<String>) -> Self {
        self.event_id = event_id;
        self
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, ProgressKind::Complete | ProgressKind::Error)
    }
}
