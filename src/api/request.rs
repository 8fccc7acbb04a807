//! Interaction request structures

use serde::{Deserialize, Serialize};

pub const DEEP_RESEARCH_AGENT_TYPE: &str = "deep-research";

/// Agent configuration sent when creating a research interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    #[serde(rename = "type")]
    pub agent_type: String,

    /// Set to "auto" to receive thought summaries. Omitted entirely when
    /// thoughts are disabled so the upstream never produces them.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_summaries: Option<String>,
}

impl AgentConfig {
    pub fn deep_research(include_thoughts: bool) -> Self {
        Self {
            agent_type: DEEP_RESEARCH_AGENT_TYPE.to_string(),
            thinking_summaries: include_thoughts.then(|| "auto".to_string()),
        }
    }
}

/// Request that creates a new interaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CreateRequest {
    /// The research query or follow-up question
    pub input: String,

    /// Agent identifier (research tasks)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,

    /// Model identifier (follow-up questions)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    pub background: bool,

    pub stream: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_config: Option<AgentConfig>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_interaction_id: Option<String>,
}

impl CreateRequest {
    /// A streamed background research task
    pub fn research_stream(query: &str, agent_id: &str, include_thoughts: bool) -> Self {
        Self {
            input: query.to_string(),
            agent: Some(agent_id.to_string()),
            model: None,
            background: true,
            stream: true,
            agent_config: Some(AgentConfig::deep_research(include_thoughts)),
            previous_interaction_id: None,
        }
    }

    /// A background research task that is polled for completion
    pub fn research_background(query: &str, agent_id: &str) -> Self {
        Self {
            input: query.to_string(),
            agent: Some(agent_id.to_string()),
            model: None,
            background: true,
            stream: false,
            agent_config: None,
            previous_interaction_id: None,
        }
    }

    /// A question about a previous interaction
    pub fn follow_up(previous_interaction_id: &str, question: &str, model: &str) -> Self {
        Self {
            input: question.to_string(),
            agent: None,
            model: Some(model.to_string()),
            background: false,
            stream: false,
            agent_config: None,
            previous_interaction_id: Some(previous_interaction_id.to_string()),
        }
    }

    pub fn thoughts_requested(&self) -> bool {
        self.agent_config
            .as_ref()
            .map(|c| c.thinking_summaries.is_some())
            .unwrap_or(false)
    }
}

/// Request that reopens the stream of an existing interaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResumeRequest {
    pub interaction_id: String,

    pub stream: bool,

    /// Resume strictly after this event
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_event_id: Option<String>,
}

impl ResumeRequest {
    pub fn new(interaction_id: impl Into<String>, last_event_id: Option<String>) -> Self {
        Self {
            interaction_id: interaction_id.into(),
            stream: true,
            last_event_id,
        }
    }

    /// Query parameters for the resume call
    pub fn query_params(&self) -> Vec<(&'static str, String)> {
        let mut params = vec![("stream", self.stream.to_string()), ("alt", "sse".to_string())];
        if let Some(last) = &self.last_event_id {
            params.push(("last_event_id", last.clone()));
        }
        params
    }
}
