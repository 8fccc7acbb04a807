//! Single-connection research streaming
//!
//! A [`StreamClient`] turns one outstanding request into a lazy, finite
//! sequence of [`ProgressEvent`]s. It does not reconnect; transport failures
//! surface as `Err` items and end the sequence. See
//! [`crate::reconnect::Reconnector`] for the resumable variant.

use crate::api::sse::{chunk_event_id, decode_chunk};
use crate::api::{
    ApiError, ApiKey, CreateRequest, DecodeAnomaly, Decoded, HttpTransport, ProgressEvent,
    ProgressKind, ResumeRequest, Transport, DEFAULT_API_KEY_ENV, DEFAULT_BASE_URL,
};
use crate::config::{Config, ConfigError};
use futures_util::{stream, Stream, StreamExt};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Agent that performs background deep research
pub const DEEP_RESEARCH_AGENT_ID: &str = "deep-research-pro-preview-12-2025";

/// Default bound on the wait for a single chunk
pub const DEFAULT_IDLE_TIMEOUT: Duration = Duration::from_secs(300);

/// Progress events of one connection
pub type ProgressStream = Pin<Box<dyn Stream<Item = Result<ProgressEvent, ApiError>> + Send>>;

/// Per-request options
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamOptions {
    /// Ask the agent for thought summaries
    pub include_thoughts: bool,
}

impl Default for StreamOptions {
    fn default() -> Self {
        Self {
            include_thoughts: true,
        }
    }
}

impl StreamOptions {
    pub fn without_thoughts() -> Self {
        Self {
            include_thoughts: false,
        }
    }
}

/// Client-wide settings, fixed at construction
#[derive(Debug, Clone, PartialEq)]
pub struct StreamSettings {
    pub agent_id: String,
    /// Longest wait for the next chunk before the read counts as failed
    pub idle_timeout: Option<Duration>,
    /// Surface unrecognized chunks as Error events instead of skipping them
    pub strict_decoding: bool,
    /// End the connection after an upstream Error chunk. When false the
    /// connection is read until Complete or until the transport closes.
    pub stop_on_error: bool,
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            agent_id: DEEP_RESEARCH_AGENT_ID.to_string(),
            idle_timeout: Some(DEFAULT_IDLE_TIMEOUT),
            strict_decoding: false,
            stop_on_error: true,
        }
    }
}

impl From<&Config> for StreamSettings {
    fn from(config: &Config) -> Self {
        Self {
            agent_id: config.api.agent_id.clone(),
            idle_timeout: config.stream.idle_timeout(),
            strict_decoding: config.stream.strict_decoding,
            stop_on_error: config.reconnect.stop_on_upstream_error,
        }
    }
}

enum Connect {
    Create(CreateRequest),
    Resume(ResumeRequest),
}

/// Opens research streams against the interactions service
pub struct StreamClient<T: Transport = HttpTransport> {
    transport: Arc<T>,
    key: ApiKey,
    settings: StreamSettings,
}

impl<T: Transport> Clone for StreamClient<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            key: self.key.clone(),
            settings: self.settings.clone(),
        }
    }
}

impl StreamClient<HttpTransport> {
    /// Client for the public endpoint. Without an explicit key the
    /// `GOOGLE_API_KEY` environment variable is used.
    pub fn new(api_key: Option<String>) -> Result<Self, ConfigError> {
        let key = ApiKey::resolve(api_key, DEFAULT_API_KEY_ENV)?;
        Ok(Self::with_transport(
            key,
            HttpTransport::new(DEFAULT_BASE_URL),
            StreamSettings::default(),
        ))
    }

    pub fn from_config(config: &Config) -> Result<Self, ConfigError> {
        let key = config.api_key()?;
        Ok(Self::with_transport(
            key,
            HttpTransport::new(config.api.base_url.clone()),
            StreamSettings::from(config),
        ))
    }
}

impl<T: Transport> StreamClient<T> {
    pub fn with_transport(key: ApiKey, transport: T, settings: StreamSettings) -> Self {
        Self {
            transport: Arc::new(transport),
            key,
            settings,
        }
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn with_stop_on_error(mut self, stop: bool) -> Self {
        self.settings.stop_on_error = stop;
        self
    }

    /// Start a new research task and stream its progress
    pub fn open(&self, query: &str, options: StreamOptions) -> ProgressStream {
        if query.trim().is_empty() {
            let err = ApiError::InvalidRequest("query must not be empty".to_string());
            return Box::pin(stream::once(async move { Err(err) }));
        }
        let request =
            CreateRequest::research_stream(query, &self.settings.agent_id, options.include_thoughts);
        Box::pin(self.connection(Connect::Create(request)))
    }

    /// Continue streaming an existing interaction strictly after `last_event_id`
    pub fn resume(&self, interaction_id: &str, last_event_id: Option<&str>) -> ProgressStream {
        let request = ResumeRequest::new(interaction_id, last_event_id.map(str::to_string));
        Box::pin(self.connection(Connect::Resume(request)))
    }

    fn connection(
        &self,
        connect: Connect,
    ) -> impl Stream<Item = Result<ProgressEvent, ApiError>> + Send + 'static {
        let transport = Arc::clone(&self.transport);
        let key = self.key.clone();
        let settings = self.settings.clone();

        async_stream::try_stream! {
            let (mut interaction_id, mut cursor, mut chunks) = match connect {
                Connect::Create(request) => {
                    info!(
                        "Opening research stream (agent: {}, thoughts: {})",
                        request.agent.as_deref().unwrap_or_default(),
                        request.thoughts_requested()
                    );
                    let chunks = transport.create_stream(&key, &request).await?;
                    (None, None, chunks)
                }
                Connect::Resume(request) => {
                    info!(
                        "Resuming interaction {} after event {:?}",
                        request.interaction_id, request.last_event_id
                    );
                    let chunks = transport.resume_stream(&key, &request).await?;
                    (Some(request.interaction_id), request.last_event_id, chunks)
                }
            };

            loop {
                let next = match settings.idle_timeout {
                    Some(limit) => tokio::time::timeout(limit, chunks.next())
                        .await
                        .map_err(|_| ApiError::Timeout(limit))?,
                    None => chunks.next().await,
                };
                let Some(chunk) = next else { break };

                let decoded = match chunk {
                    Ok(chunk) => {
                        // Every chunk moves the cursor, whatever it decodes to
                        if let Some(event_id) = chunk_event_id(&chunk) {
                            cursor = Some(event_id);
                        }
                        decode_chunk(&chunk)
                    }
                    // A line that isn't JSON is a bad chunk, not a broken connection
                    Err(ApiError::Serialization(e)) => {
                        Decoded::Anomaly(DecodeAnomaly::invalid_json(&e))
                    }
                    Err(e) => Err::<Decoded, _>(e)?,
                };

                match decoded {
                    Decoded::Event(mut event) => {
                        if event.kind == ProgressKind::Start {
                            interaction_id = event.interaction_id.clone();
                        } else {
                            event.interaction_id = interaction_id.clone();
                        }
                        event.event_id = cursor.clone();

                        let terminal = match event.kind {
                            ProgressKind::Complete => true,
                            ProgressKind::Error => settings.stop_on_error,
                            _ => false,
                        };
                        yield event;
                        if terminal {
                            break;
                        }
                    }
                    Decoded::Anomaly(anomaly) if settings.strict_decoding => {
                        warn!("{}", anomaly);
                        let mut event = ProgressEvent::error(anomaly.to_string())
                            .with_event_id(cursor.clone())
                            .with_metadata(
                                "decode_anomaly",
                                anomaly.event_type.clone().unwrap_or_default(),
                            );
                        event.interaction_id = interaction_id.clone();
                        yield event;
                    }
                    Decoded::Anomaly(anomaly) => {
                        debug!("Skipping chunk: {}", anomaly);
                    }
                }
            }
        }
    }
}

/// Stream a research task over a single connection, without reconnecting.
///
/// Fails fast with [`ConfigError::MissingApiKey`] when no key is given and
/// `GOOGLE_API_KEY` is unset.
pub fn stream_research(
    query: &str,
    api_key: Option<String>,
    include_thoughts: bool,
) -> Result<ProgressStream, ConfigError> {
    let client = StreamClient::new(api_key)?;
    Ok(client.open(query, StreamOptions { include_thoughts }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::mock::*;
    use futures_util::StreamExt;
    use serde_json::json;

    fn client(transport: FakeTransport) -> StreamClient<FakeTransport> {
        StreamClient::with_transport(test_key(), transport, StreamSettings::default())
    }

    async fn collect(stream: ProgressStream) -> Vec<Result<ProgressEvent, ApiError>> {
        stream.collect().await
    }

    fn ok_events(items: Vec<Result<ProgressEvent, ApiError>>) -> Vec<ProgressEvent> {
        items.into_iter().map(|r| r.unwrap()).collect()
    }

    #[tokio::test]
    async fn test_open_decodes_full_sequence() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(with_id(start_chunk("abc"), "1")),
            Step::Chunk(with_id(thought_chunk("Looking at sources"), "2")),
            Step::Chunk(with_id(text_chunk("Part A. "), "3")),
            Step::Chunk(with_id(text_chunk("Part B."), "4")),
            Step::Chunk(with_id(complete_chunk(), "5")),
        ]]);
        let events = ok_events(collect(client(transport.clone()).open("AI trends 2025", StreamOptions::default())).await);

        let kinds: Vec<ProgressKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProgressKind::Start,
                ProgressKind::Thought,
                ProgressKind::Content,
                ProgressKind::Content,
                ProgressKind::Complete
            ]
        );
        assert!(events.iter().all(|e| e.interaction_id.as_deref() == Some("abc")));
        assert_eq!(events[2].event_id.as_deref(), Some("3"));
        assert_eq!(events[4].event_id.as_deref(), Some("5"));
        assert_eq!(transport.released(), 1);
    }

    #[tokio::test]
    async fn test_thoughts_disabled_in_request() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(start_chunk("abc")),
            Step::Chunk(complete_chunk()),
        ]]);
        let _ = collect(client(transport.clone()).open("q", StreamOptions::without_thoughts())).await;

        let requests = transport.create_requests();
        assert_eq!(requests.len(), 1);
        assert!(!requests[0].thoughts_requested());
        let body = serde_json::to_value(&requests[0]).unwrap();
        assert!(body["agent_config"].get("thinking_summaries").is_none());
        assert_eq!(body["agent"], DEEP_RESEARCH_AGENT_ID);
    }

    #[tokio::test]
    async fn test_cursor_advances_on_skipped_chunks() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(with_id(start_chunk("abc"), "1")),
            Step::Chunk(json!({"event_type": "interaction.status_update", "event_id": "2"})),
            Step::Chunk(text_chunk("after skip")),
        ]]);
        let events = ok_events(collect(client(transport).open("q", StreamOptions::default())).await);

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].content, "after skip");
        assert_eq!(events[1].event_id.as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_strict_decoding_surfaces_anomaly() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(start_chunk("abc")),
            Step::Chunk(json!({"event_type": "mystery"})),
            Step::Chunk(text_chunk("still going")),
            Step::Chunk(complete_chunk()),
        ]]);
        let settings = StreamSettings {
            strict_decoding: true,
            ..StreamSettings::default()
        };
        let client = StreamClient::with_transport(test_key(), transport, settings);
        let events = ok_events(collect(client.open("q", StreamOptions::default())).await);

        assert_eq!(events.len(), 4);
        assert_eq!(events[1].kind, ProgressKind::Error);
        assert!(events[1].content.contains("mystery"));
        assert_eq!(events[1].metadata["decode_anomaly"], "mystery");
        assert_eq!(events[2].content, "still going");
    }

    #[tokio::test]
    async fn test_upstream_error_ends_stream() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(start_chunk("abc")),
            Step::Chunk(error_chunk("quota exceeded")),
            Step::Chunk(text_chunk("never seen")),
        ]]);
        let events = ok_events(collect(client(transport).open("q", StreamOptions::default())).await);

        assert_eq!(events.len(), 2);
        assert_eq!(events[1].kind, ProgressKind::Error);
        assert_eq!(events[1].content, "quota exceeded");
        assert_eq!(events[1].interaction_id.as_deref(), Some("abc"));
    }

    #[tokio::test]
    async fn test_error_read_past_when_not_stopping() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(with_id(start_chunk("abc"), "1")),
            Step::Chunk(with_id(error_chunk("hiccup"), "2")),
            Step::Chunk(with_id(text_chunk("more"), "3")),
            Step::Chunk(with_id(complete_chunk(), "4")),
        ]]);
        let client = client(transport.clone()).with_stop_on_error(false);
        let events = ok_events(collect(client.open("q", StreamOptions::default())).await);

        let kinds: Vec<ProgressKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(
            kinds,
            vec![
                ProgressKind::Start,
                ProgressKind::Error,
                ProgressKind::Content,
                ProgressKind::Complete
            ]
        );
        assert_eq!(events[2].event_id.as_deref(), Some("3"));
        assert_eq!(transport.opened(), 1);
    }

    #[tokio::test]
    async fn test_invalid_json_skipped_when_lenient() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(with_id(start_chunk("abc"), "1")),
            Step::Chunk(with_id(text_chunk("Part A. "), "2")),
            Step::Malformed("{not json".into()),
            Step::Chunk(with_id(text_chunk("Part B."), "3")),
            Step::Chunk(with_id(complete_chunk(), "4")),
        ]]);
        let items = collect(client(transport).open("q", StreamOptions::default())).await;

        assert!(items.iter().all(|r| r.is_ok()));
        let events = ok_events(items);
        let text: String = events
            .iter()
            .filter(|e| e.kind == ProgressKind::Content)
            .map(|e| e.content.as_str())
            .collect();
        assert_eq!(text, "Part A. Part B.");
        assert_eq!(events.last().unwrap().kind, ProgressKind::Complete);
    }

    #[tokio::test]
    async fn test_invalid_json_surfaced_when_strict() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(with_id(start_chunk("abc"), "1")),
            Step::Malformed("{not json".into()),
            Step::Chunk(with_id(text_chunk("still going"), "2")),
            Step::Chunk(with_id(complete_chunk(), "3")),
        ]]);
        let settings = StreamSettings {
            strict_decoding: true,
            ..StreamSettings::default()
        };
        let client = StreamClient::with_transport(test_key(), transport, settings);
        let events = ok_events(collect(client.open("q", StreamOptions::default())).await);

        assert_eq!(events.len(), 4);
        assert_eq!(events[1].kind, ProgressKind::Error);
        assert!(events[1].content.contains("invalid JSON"));
        assert_eq!(events[1].metadata["decode_anomaly"], "");
        assert_eq!(events[1].event_id.as_deref(), Some("1"));
        assert_eq!(events[1].interaction_id.as_deref(), Some("abc"));
        assert_eq!(events[3].kind, ProgressKind::Complete);
    }

    #[tokio::test]
    async fn test_transport_failure_is_err_item() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(start_chunk("abc")),
            Step::Fail("connection reset".into()),
        ]]);
        let items = collect(client(transport.clone()).open("q", StreamOptions::default())).await;

        assert_eq!(items.len(), 2);
        assert!(items[0].is_ok());
        assert!(matches!(items[1], Err(ApiError::Stream(_))));
        assert_eq!(transport.released(), 1);
    }

    #[tokio::test]
    async fn test_idle_timeout() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(start_chunk("abc")),
            Step::Stall,
        ]]);
        let settings = StreamSettings {
            idle_timeout: Some(Duration::from_millis(20)),
            ..StreamSettings::default()
        };
        let client = StreamClient::with_transport(test_key(), transport.clone(), settings);
        let items = collect(client.open("q", StreamOptions::default())).await;

        assert_eq!(items.len(), 2);
        assert!(matches!(items[1], Err(ApiError::Timeout(_))));
        assert_eq!(transport.released(), 1);
    }

    #[tokio::test]
    async fn test_resume_uses_cursor_and_known_interaction() {
        let transport = FakeTransport::ledger(numbered_ledger("abc", 4), &[]);
        let events = ok_events(collect(client(transport.clone()).resume("abc", Some("3"))).await);

        let ids: Vec<&str> = events.iter().map(|e| e.event_id.as_deref().unwrap()).collect();
        assert_eq!(ids, vec!["4", "5", "6"]);
        assert!(events.iter().all(|e| e.interaction_id.as_deref() == Some("abc")));

        let resumes = transport.resume_requests();
        assert_eq!(resumes.len(), 1);
        assert_eq!(resumes[0].last_event_id.as_deref(), Some("3"));
        assert!(transport.create_requests().is_empty());
    }

    #[tokio::test]
    async fn test_empty_query_rejected_without_io() {
        let transport = FakeTransport::scripted(vec![]);
        let items = collect(client(transport.clone()).open("   ", StreamOptions::default())).await;

        assert_eq!(items.len(), 1);
        assert!(matches!(items[0], Err(ApiError::InvalidRequest(_))));
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_open_is_lazy() {
        let transport = FakeTransport::scripted(vec![]);
        let stream = client(transport.clone()).open("q", StreamOptions::default());
        drop(stream);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_early_drop_releases_connection() {
        let transport = FakeTransport::scripted(vec![vec![
            Step::Chunk(start_chunk("abc")),
            Step::Chunk(text_chunk("one")),
            Step::Chunk(text_chunk("two")),
        ]]);
        let mut stream = client(transport.clone()).open("q", StreamOptions::default());
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.kind, ProgressKind::Start);
        assert_eq!(transport.released(), 0);

        drop(stream);
        assert_eq!(transport.opened(), 1);
        assert_eq!(transport.released(), 1);
    }

    #[test]
    fn test_stream_research_with_explicit_key() {
        let stream = stream_research("q", Some("explicit".into()), true);
        assert!(stream.is_ok());
    }
}
