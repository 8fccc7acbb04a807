//! Interaction response structures

use serde::{Deserialize, Serialize};

/// A single output block of an interaction
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InteractionOutput {
    #[serde(default)]
    pub text: Option<String>,
}

/// Error details attached to a failed interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InteractionError {
    Message(String),
    Detail { message: Option<String> },
}

impl InteractionError {
    pub fn message(&self) -> &str {
        match self {
            InteractionError::Message(msg) => msg,
            InteractionError::Detail { message } => {
                message.as_deref().unwrap_or(super::streaming::UNKNOWN_ERROR_MESSAGE)
            }
        }
    }
}

/// Non-streaming view of an interaction, as returned by create and get
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InteractionSnapshot {
    pub id: String,

    /// Raw upstream status ("in_progress", "completed", ...)
    #[serde(default)]
    pub status: String,

    #[serde(default)]
    pub outputs: Vec<InteractionOutput>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<InteractionError>,
}

impl InteractionSnapshot {
    /// Text of the last output block, empty if there is none
    pub fn last_output_text(&self) -> String {
        self.outputs
            .last()
            .and_then(|o| o.text.clone())
            .unwrap_or_default()
    }
}
