//! Server-Sent Events framing and interaction chunk decoding
//!
//! The interactions stream is SSE where every `data:` line carries one JSON
//! chunk discriminated by `event_type`:
//! - `interaction.start`: `{"interaction":{"id":"..."}}`
//! - `content.delta`: `{"delta":{"type":"text","text":"..."}}` or
//!   `{"delta":{"type":"thought_summary","content":{"text":"..."}}}`
//! - `interaction.complete`
//! - `error`: `{"message":"..."}` or `{"error":{"message":"..."}}`

use super::streaming::{ProgressEvent, UNKNOWN_ERROR_MESSAGE};
use super::ApiError;
use serde::Deserialize;
use serde_json::Value;
use std::fmt;

/// Splits a byte stream into lines, keeping partial lines across reads.
#[derive(Debug, Default)]
pub struct LineBuffer {
    buffer: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append bytes and return every complete line they finish
    pub fn push(&mut self, bytes: &[u8]) -> Vec<String> {
        self.buffer.extend_from_slice(bytes);

        let mut lines = Vec::new();
        while let Some(newline_pos) = self.buffer.iter().position(|b| *b == b'\n') {
            let line: Vec<u8> = self.buffer.drain(..=newline_pos).collect();
            lines.push(String::from_utf8_lossy(&line[..line.len() - 1]).into_owned());
        }
        lines
    }

    /// Whatever is left once the body has ended
    pub fn finish(&mut self) -> Option<String> {
        if self.buffer.is_empty() {
            return None;
        }
        let rest = std::mem::take(&mut self.buffer);
        Some(String::from_utf8_lossy(&rest).into_owned())
    }
}

/// Parse a single SSE line into a JSON chunk.
/// Returns None if the line should be skipped (comments, empty lines, non-data fields).
pub fn parse_sse_line(line: &str) -> Option<Result<Value, ApiError>> {
    let line = line.trim();

    // Skip empty lines and SSE comments
    if line.is_empty() || line.starts_with(':') {
        return None;
    }

    // event:, id: and retry: fields carry nothing the chunk doesn't
    let data = line.strip_prefix("data:")?.trim_start();

    if data.is_empty() || data == "[DONE]" {
        return None;
    }

    Some(serde_json::from_str(data).map_err(ApiError::from))
}

#[derive(Debug, Deserialize)]
#[serde(tag = "event_type")]
enum WireChunk {
    #[serde(rename = "interaction.start")]
    InteractionStart { interaction: InteractionRef },

    #[serde(rename = "content.delta")]
    ContentDelta { delta: WireDelta },

    #[serde(rename = "interaction.complete")]
    InteractionComplete,

    #[serde(rename = "error")]
    Error {
        #[serde(default)]
        message: Option<String>,
        #[serde(default)]
        error: Option<Value>,
    },
}

#[derive(Debug, Deserialize)]
struct InteractionRef {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum WireDelta {
    Text {
        #[serde(default)]
        text: String,
    },
    ThoughtSummary {
        #[serde(default)]
        content: Option<ThoughtContent>,
    },
}

#[derive(Debug, Deserialize)]
struct ThoughtContent {
    #[serde(default)]
    text: String,
}

/// A chunk whose shape is not part of the decoding contract
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodeAnomaly {
    /// The chunk's `event_type`, if it had one
    pub event_type: Option<String>,
    pub reason: String,
}

impl DecodeAnomaly {
    /// A `data:` line whose payload is not JSON
    pub fn invalid_json(error: &serde_json::Error) -> Self {
        Self {
            event_type: None,
            reason: format!("invalid JSON: {}", error),
        }
    }
}

impl fmt::Display for DecodeAnomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.event_type {
            Some(t) => write!(f, "Unrecognized chunk '{}': {}", t, self.reason),
            None => write!(f, "Unrecognized chunk: {}", self.reason),
        }
    }
}

/// Result of decoding one chunk
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// A progress event, without cursor or interaction correlation applied
    Event(ProgressEvent),
    Anomaly(DecodeAnomaly),
}

/// The chunk's `event_id`, if it carries one (strings and numbers accepted)
pub fn chunk_event_id(chunk: &Value) -> Option<String> {
    match chunk.get("event_id")? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Classify a chunk into a progress event
pub fn decode_chunk(chunk: &Value) -> Decoded {
    let event_type = chunk
        .get("event_type")
        .and_then(Value::as_str)
        .map(str::to_string);

    if event_type.is_none() {
        return Decoded::Anomaly(DecodeAnomaly {
            event_type: None,
            reason: "missing event_type".to_string(),
        });
    }

    let wire: WireChunk = match serde_json::from_value(chunk.clone()) {
        Ok(w) => w,
        Err(e) => {
            return Decoded::Anomaly(DecodeAnomaly {
                event_type,
                reason: e.to_string(),
            })
        }
    };

    let event = match wire {
        WireChunk::InteractionStart { interaction } => ProgressEvent::start(interaction.id),
        WireChunk::ContentDelta { delta } => match delta {
            WireDelta::Text { text } => ProgressEvent::content(text),
            WireDelta::ThoughtSummary { content } => {
                ProgressEvent::thought(content.map(|c| c.text).unwrap_or_default())
            }
        },
        WireChunk::InteractionComplete => ProgressEvent::complete(),
        WireChunk::Error { message, error } => ProgressEvent::error(error_message(message, error)),
    };

    Decoded::Event(event)
}

fn error_message(message: Option<String>, error: Option<Value>) -> String {
    if let Some(msg) = message.filter(|m| !m.is_empty()) {
        return msg;
    }
    match error {
        Some(Value::String(s)) if !s.is_empty() => s,
        Some(obj) => obj["message"]
            .as_str()
            .unwrap_or(UNKNOWN_ERROR_MESSAGE)
            .to_string(),
        None => UNKNOWN_ERROR_MESSAGE.to_string(),
    }
}
