//! Poll-based background research
//!
//! For callers that want a finished report rather than a live stream: the
//! task is started in the background and its status is polled until it
//! completes, fails, or runs out of time.

mod citations;

pub use citations::extract_citations;

use crate::api::{
    ApiError, ApiKey, CreateRequest, HttpTransport, InteractionSnapshot, Transport,
    DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL, UNKNOWN_ERROR_MESSAGE,
};
use crate::config::{Config, ConfigError};
use crate::stream::DEEP_RESEARCH_AGENT_ID;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

pub const DEFAULT_FOLLOW_UP_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(10);
pub const MAX_RESEARCH_TIME: Duration = Duration::from_secs(60 * 60);

/// Status of a background research task
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResearchStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl ResearchStatus {
    /// Map an upstream status string. Anything unknown is still running.
    pub fn parse(status: &str) -> Self {
        match status {
            "pending" => ResearchStatus::Pending,
            "completed" => ResearchStatus::Completed,
            "failed" => ResearchStatus::Failed,
            _ => ResearchStatus::InProgress,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ResearchStatus::Pending => "pending",
            ResearchStatus::InProgress => "in_progress",
            ResearchStatus::Completed => "completed",
            ResearchStatus::Failed => "failed",
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, ResearchStatus::Completed | ResearchStatus::Failed)
    }
}

impl fmt::Display for ResearchStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A started background task
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResearchTask {
    pub id: String,
    pub status: ResearchStatus,
}

/// One status check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PollResult {
    pub id: String,
    pub status: ResearchStatus,
    /// Final report, once completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<String>,
    /// Failure reason, once failed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl From<InteractionSnapshot> for PollResult {
    fn from(snapshot: InteractionSnapshot) -> Self {
        let status = ResearchStatus::parse(&snapshot.status);
        let report = (status == ResearchStatus::Completed).then(|| snapshot.last_output_text());
        let error = (status == ResearchStatus::Failed).then(|| {
            snapshot
                .error
                .as_ref()
                .map(|e| e.message().to_string())
                .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string())
        });
        Self {
            id: snapshot.id,
            status,
            report,
            error,
        }
    }
}

/// Outcome of a full research run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResearchResult {
    pub id: String,
    pub status: ResearchStatus,
    pub report: String,
    pub citations: Vec<String>,
    pub elapsed: Duration,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ResearchResult {
    fn completed(id: String, report: String, elapsed: Duration) -> Self {
        Self {
            id,
            status: ResearchStatus::Completed,
            citations: extract_citations(&report),
            report,
            elapsed,
            error: None,
        }
    }

    fn failed(id: String, error: String, elapsed: Duration) -> Self {
        Self {
            id,
            status: ResearchStatus::Failed,
            report: String::new(),
            citations: Vec::new(),
            elapsed,
            error: Some(error),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ResearchStatus::Completed
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResearchSettings {
    pub agent_id: String,
    pub follow_up_model: String,
    pub poll_interval: Duration,
    /// Give up polling after this long
    pub max_research_time: Duration,
}

impl Default for ResearchSettings {
    fn default() -> Self {
        Self {
            agent_id: DEEP_RESEARCH_AGENT_ID.to_string(),
            follow_up_model: DEFAULT_FOLLOW_UP_MODEL.to_string(),
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_research_time: MAX_RESEARCH_TIME,
        }
    }
}

impl From<&Config> for ResearchSettings {
    fn from(config: &Config) -> Self {
        Self {
            agent_id: config.api.agent_id.clone(),
            follow_up_model: config.api.follow_up_model.clone(),
            poll_interval: Duration::from_secs(config.research.poll_interval_secs),
            max_research_time: Duration::from_secs(config.research.max_research_secs),
        }
    }
}

/// Starts background research tasks and polls them to completion
pub struct ResearchAgent<T: Transport = HttpTransport> {
    transport: Arc<T>,
    key: ApiKey,
    settings: ResearchSettings,
}

impl ResearchAgent<HttpTransport> {
    pub fn new(api_key: Option<String>) -> Result<Self, ConfigError> {
        let key = ApiKey::resolve(api_key, DEFAULT_API_KEY_ENV)?;
        Ok(Self::with_transport(
            key,
            HttpTransport::new(DEFAULT_BASE_URL),
            ResearchSettings::default(),
        ))
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let key = config.api_key()?;
        Ok(Self::with_transport(
            key,
            HttpTransport::new(config.api.base_url.clone()),
            ResearchSettings::from(config),
        ))
    }
}

impl<T: Transport> ResearchAgent<T> {
    pub fn with_transport(key: ApiKey, transport: T, settings: ResearchSettings) -> Self {
        Self {
            transport: Arc::new(transport),
            key,
            settings,
        }
    }

    pub fn settings(&self) -> &ResearchSettings {
        &self.settings
    }

    /// Start a background task without waiting for it
    pub async fn start(&self, query: &str) -> Result<ResearchTask, ApiError> {
        if query.trim().is_empty() {
            return Err(ApiError::InvalidRequest("query must not be empty".to_string()));
        }

        let request = CreateRequest::research_background(query, &self.settings.agent_id);
        let snapshot = self.transport.create(&self.key, &request).await?;
        info!("Started research {} ({})", snapshot.id, snapshot.status);

        Ok(ResearchTask {
            status: ResearchStatus::parse(&snapshot.status),
            id: snapshot.id,
        })
    }

    /// Check a task once
    pub async fn poll(&self, interaction_id: &str) -> Result<PollResult, ApiError> {
        let snapshot = self.transport.get(&self.key, interaction_id).await?;
        Ok(PollResult::from(snapshot))
    }

    /// Start a task and poll until it finishes or the time limit passes.
    ///
    /// `on_status` sees every polled status with the time elapsed so far.
    /// Failure and timeout are reported in the result; only transport
    /// errors are returned as `Err`.
    pub async fn run<F>(&self, query: &str, mut on_status: F) -> Result<ResearchResult, ApiError>
    where
        F: FnMut(ResearchStatus, Duration),
    {
        let started = Instant::now();
        let task = self.start(query).await?;

        loop {
            let elapsed = started.elapsed();
            if elapsed > self.settings.max_research_time {
                warn!("Research {} timed out after {:?}", task.id, elapsed);
                return Ok(ResearchResult::failed(
                    task.id,
                    format!(
                        "Research timed out after {} seconds",
                        self.settings.max_research_time.as_secs()
                    ),
                    elapsed,
                ));
            }

            let poll = self.poll(&task.id).await?;
            debug!("Research {} is {}", task.id, poll.status);
            on_status(poll.status, elapsed);

            match poll.status {
                ResearchStatus::Completed => {
                    info!("Research {} completed in {:?}", task.id, elapsed);
                    return Ok(ResearchResult::completed(
                        task.id,
                        poll.report.unwrap_or_default(),
                        elapsed,
                    ));
                }
                ResearchStatus::Failed => {
                    let error = poll
                        .error
                        .unwrap_or_else(|| UNKNOWN_ERROR_MESSAGE.to_string());
                    warn!("Research {} failed: {}", task.id, error);
                    return Ok(ResearchResult::failed(task.id, error, elapsed));
                }
                ResearchStatus::Pending | ResearchStatus::InProgress => {
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
            }
        }
    }

    /// [`run`](Self::run) with output format instructions appended to the query
    pub async fn run_with_format<F>(
        &self,
        query: &str,
        format_instructions: &str,
        on_status: F,
    ) -> Result<ResearchResult, ApiError>
    where
        F: FnMut(ResearchStatus, Duration),
    {
        let formatted = format!("{}\n\n{}", query, format_instructions);
        self.run(&formatted, on_status).await
    }

    /// Ask a question about a finished task. Uses the configured follow-up
    /// model unless `model` is given.
    pub async fn follow_up(
        &self,
        interaction_id: &str,
        question: &str,
        model: Option<&str>,
    ) -> Result<String, ApiError> {
        let model = model.unwrap_or(&self.settings.follow_up_model);
        let request = CreateRequest::follow_up(interaction_id, question, model);
        let snapshot = self.transport.create(&self.key, &request).await?;
        Ok(snapshot.last_output_text())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::*;
    use crate::api::{InteractionError, InteractionOutput};

    fn snapshot(status: &str) -> InteractionSnapshot {
        InteractionSnapshot {
            id: "res-1".to_string(),
            status: status.to_string(),
            outputs: Vec::new(),
            error: None,
        }
    }

    fn with_output(mut snapshot: InteractionSnapshot, text: &str) -> InteractionSnapshot {
        snapshot.outputs.push(InteractionOutput {
            text: Some(text.to_string()),
        });
        snapshot
    }

    fn fast_settings() -> ResearchSettings {
        ResearchSettings {
            poll_interval: Duration::from_millis(1),
            ..ResearchSettings::default()
        }
    }

    fn agent(transport: FakeTransport, settings: ResearchSettings) -> ResearchAgent<FakeTransport> {
        ResearchAgent::with_transport(test_key(), transport, settings)
    }

    #[test]
    fn test_status_parse() {
        assert_eq!(ResearchStatus::parse("pending"), ResearchStatus::Pending);
        assert_eq!(ResearchStatus::parse("completed"), ResearchStatus::Completed);
        assert_eq!(ResearchStatus::parse("failed"), ResearchStatus::Failed);
        assert_eq!(ResearchStatus::parse("in_progress"), ResearchStatus::InProgress);
        assert_eq!(ResearchStatus::parse("requires_action"), ResearchStatus::InProgress);
        assert_eq!(ResearchStatus::InProgress.to_string(), "in_progress");
    }

    #[tokio::test]
    async fn test_start_sends_background_request() {
        let transport =
            FakeTransport::scripted(vec![]).with_snapshots(vec![Ok(snapshot("in_progress"))]);
        let task = agent(transport.clone(), fast_settings())
            .start("AI trends 2025")
            .await
            .unwrap();

        assert_eq!(task.id, "res-1");
        assert_eq!(task.status, ResearchStatus::InProgress);

        let requests = transport.create_requests();
        assert_eq!(requests.len(), 1);
        assert!(requests[0].background);
        assert!(!requests[0].stream);
        assert_eq!(requests[0].agent.as_deref(), Some(DEEP_RESEARCH_AGENT_ID));
    }

    #[tokio::test]
    async fn test_poll_reports_by_status() {
        let failed = InteractionSnapshot {
            error: Some(InteractionError::Message("quota".into())),
            ..snapshot("failed")
        };
        let transport = FakeTransport::scripted(vec![]).with_snapshots(vec![
            Ok(snapshot("in_progress")),
            Ok(with_output(snapshot("completed"), "Final report")),
            Ok(failed),
        ]);
        let agent = agent(transport, fast_settings());

        let running = agent.poll("res-1").await.unwrap();
        assert!(running.report.is_none() && running.error.is_none());

        let done = agent.poll("res-1").await.unwrap();
        assert_eq!(done.report.as_deref(), Some("Final report"));

        let failed = agent.poll("res-1").await.unwrap();
        assert_eq!(failed.status, ResearchStatus::Failed);
        assert_eq!(failed.error.as_deref(), Some("quota"));
    }

    #[tokio::test]
    async fn test_run_polls_until_complete() {
        let report = "Findings [1] https://example.com/paper.";
        let transport = FakeTransport::scripted(vec![]).with_snapshots(vec![
            Ok(snapshot("pending")),
            Ok(snapshot("in_progress")),
            Ok(snapshot("in_progress")),
            Ok(with_output(snapshot("completed"), report)),
        ]);
        let mut seen = Vec::new();
        let result = agent(transport.clone(), fast_settings())
            .run("AI trends 2025", |status, _| seen.push(status))
            .await
            .unwrap();

        assert!(result.is_success());
        assert_eq!(result.report, report);
        assert_eq!(result.citations, vec!["https://example.com/paper"]);
        assert_eq!(
            seen,
            vec![
                ResearchStatus::InProgress,
                ResearchStatus::InProgress,
                ResearchStatus::Completed
            ]
        );
        // One create, three gets
        assert_eq!(transport.calls().len(), 4);
    }

    #[tokio::test]
    async fn test_run_reports_failure() {
        let transport = FakeTransport::scripted(vec![]).with_snapshots(vec![
            Ok(snapshot("in_progress")),
            Ok(snapshot("failed")),
        ]);
        let result = agent(transport, fast_settings()).run("q", |_, _| {}).await.unwrap();

        assert_eq!(result.status, ResearchStatus::Failed);
        assert_eq!(result.error.as_deref(), Some(UNKNOWN_ERROR_MESSAGE));
        assert!(result.report.is_empty());
    }

    #[tokio::test]
    async fn test_run_times_out() {
        let snapshots = (0..200).map(|_| Ok(snapshot("in_progress"))).collect();
        let transport = FakeTransport::scripted(vec![]).with_snapshots(snapshots);
        let settings = ResearchSettings {
            poll_interval: Duration::from_millis(2),
            max_research_time: Duration::from_millis(20),
            ..ResearchSettings::default()
        };
        let result = agent(transport, settings).run("q", |_, _| {}).await.unwrap();

        assert_eq!(result.status, ResearchStatus::Failed);
        assert!(result.error.unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_run_with_format_appends_instructions() {
        let transport = FakeTransport::scripted(vec![]).with_snapshots(vec![
            Ok(snapshot("in_progress")),
            Ok(with_output(snapshot("completed"), "ok")),
        ]);
        agent(transport.clone(), fast_settings())
            .run_with_format("EV batteries", "1. Summary", |_, _| {})
            .await
            .unwrap();

        assert_eq!(transport.create_requests()[0].input, "EV batteries\n\n1. Summary");
    }

    #[tokio::test]
    async fn test_follow_up_uses_model() {
        let transport = FakeTransport::scripted(vec![])
            .with_snapshots(vec![Ok(with_output(snapshot("completed"), "Elaborated"))]);
        let agent = agent(transport.clone(), fast_settings());
        let answer = agent.follow_up("res-1", "Elaborate", None).await.unwrap();

        assert_eq!(answer, "Elaborated");
        let request = &transport.create_requests()[0];
        assert_eq!(request.model.as_deref(), Some(DEFAULT_FOLLOW_UP_MODEL));
        assert_eq!(request.previous_interaction_id.as_deref(), Some("res-1"));
    }

    #[tokio::test]
    async fn test_empty_query_rejected() {
        let transport = FakeTransport::scripted(vec![]);
        let result = agent(transport.clone(), fast_settings()).start("").await;
        assert!(matches!(result, Err(ApiError::InvalidRequest(_))));
        assert!(transport.calls().is_empty());
    }
}
