//! Deterministic in-memory transport for tests

use super::{
    ApiError, ApiKey, ChunkStream, CreateRequest, InteractionSnapshot, ResumeRequest, Transport,
};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// One step of a scripted connection
#[derive(Debug, Clone)]
pub(crate) enum Step {
    Chunk(Value),
    /// The read fails with a stream error, ending the connection
    Fail(String),
    /// The read never completes
    Stall,
    /// A `data:` line whose payload is not JSON
    Malformed(String),
}

/// A recorded transport call
#[derive(Debug, Clone)]
pub(crate) enum Call {
    CreateStream(CreateRequest),
    ResumeStream(ResumeRequest),
    Create(CreateRequest),
    Get(String),
}

enum Mode {
    /// Each connection (create or resume) takes the next script in order
    Scripted(Mutex<VecDeque<Result<Vec<Step>, ApiError>>>),
    /// One upstream event log; resumes honor `last_event_id`. Each connection
    /// pops the next failure point and breaks right after emitting that id.
    Ledger {
        events: Vec<Value>,
        fail_after: Mutex<VecDeque<String>>,
    },
}

struct Inner {
    mode: Mode,
    calls: Mutex<Vec<Call>>,
    snapshots: Mutex<VecDeque<Result<InteractionSnapshot, ApiError>>>,
    opened: AtomicUsize,
    released: Arc<AtomicUsize>,
}

#[derive(Clone)]
pub(crate) struct FakeTransport {
    inner: Arc<Inner>,
}

struct ReleaseGuard(Arc<AtomicUsize>);

impl Drop for ReleaseGuard {
    fn drop(&mut self) {
        self.0.fetch_add(1, Ordering::SeqCst);
    }
}

impl FakeTransport {
    fn with_mode(mode: Mode) -> Self {
        Self {
            inner: Arc::new(Inner {
                mode,
                calls: Mutex::new(Vec::new()),
                snapshots: Mutex::new(VecDeque::new()),
                opened: AtomicUsize::new(0),
                released: Arc::new(AtomicUsize::new(0)),
            }),
        }
    }

    pub(crate) fn scripted(connections: Vec<Vec<Step>>) -> Self {
        Self::with_mode(Mode::Scripted(Mutex::new(
            connections.into_iter().map(Ok).collect(),
        )))
    }

    /// Scripted connections where some fail to open at all
    pub(crate) fn scripted_results(connections: Vec<Result<Vec<Step>, ApiError>>) -> Self {
        Self::with_mode(Mode::Scripted(Mutex::new(connections.into_iter().collect())))
    }

    /// Every connection fails on its first read
    pub(crate) fn always_failing(connections: usize) -> Self {
        Self::scripted(vec![vec![Step::Fail("connection reset".into())]; connections])
    }

    pub(crate) fn ledger(events: Vec<Value>, fail_after: &[&str]) -> Self {
        Self::with_mode(Mode::Ledger {
            events,
            fail_after: Mutex::new(fail_after.iter().map(|s| s.to_string()).collect()),
        })
    }

    pub(crate) fn with_snapshots(self, snapshots: Vec<Result<InteractionSnapshot, ApiError>>) -> Self {
        self.inner.snapshots.lock().unwrap().extend(snapshots);
        self
    }

    pub(crate) fn calls(&self) -> Vec<Call> {
        self.inner.calls.lock().unwrap().clone()
    }

    pub(crate) fn create_requests(&self) -> Vec<CreateRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::CreateStream(r) | Call::Create(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn resume_requests(&self) -> Vec<ResumeRequest> {
        self.calls()
            .into_iter()
            .filter_map(|c| match c {
                Call::ResumeStream(r) => Some(r),
                _ => None,
            })
            .collect()
    }

    pub(crate) fn opened(&self) -> usize {
        self.inner.opened.load(Ordering::SeqCst)
    }

    pub(crate) fn released(&self) -> usize {
        self.inner.released.load(Ordering::SeqCst)
    }

    fn record(&self, call: Call) {
        self.inner.calls.lock().unwrap().push(call);
    }

    fn connect(&self, last_event_id: Option<&str>) -> Result<ChunkStream, ApiError> {
        let steps = match &self.inner.mode {
            Mode::Scripted(scripts) => scripts
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(ApiError::Provider("no connection scripted".into())))?,
            Mode::Ledger { events, fail_after } => {
                let start = last_event_id
                    .and_then(|last| {
                        events
                            .iter()
                            .position(|e| e["event_id"].as_str() == Some(last))
                    })
                    .map(|i| i + 1)
                    .unwrap_or(0);
                let fail_at = fail_after.lock().unwrap().pop_front();

                let mut steps = Vec::new();
                for event in &events[start..] {
                    steps.push(Step::Chunk(event.clone()));
                    if fail_at.is_some() && event["event_id"].as_str() == fail_at.as_deref() {
                        steps.push(Step::Fail("connection reset".into()));
                        break;
                    }
                }
                steps
            }
        };

        self.inner.opened.fetch_add(1, Ordering::SeqCst);
        let guard = ReleaseGuard(self.inner.released.clone());

        Ok(Box::pin(async_stream::stream! {
            let _guard = guard;
            for step in steps {
                match step {
                    Step::Chunk(chunk) => yield Ok(chunk),
                    Step::Fail(msg) => {
                        yield Err(ApiError::Stream(msg));
                        return;
                    }
                    Step::Stall => std::future::pending::<()>().await,
                    Step::Malformed(line) => {
                        yield Err(ApiError::Serialization(
                            serde_json::from_str::<Value>(&line).unwrap_err(),
                        ))
                    }
                }
            }
        }))
    }

    fn next_snapshot(&self) -> Result<InteractionSnapshot, ApiError> {
        self.inner
            .snapshots
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(ApiError::Provider("no snapshot scripted".into())))
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn create_stream(
        &self,
        _key: &ApiKey,
        request: &CreateRequest,
    ) -> Result<ChunkStream, ApiError> {
        self.record(Call::CreateStream(request.clone()));
        self.connect(None)
    }

    async fn resume_stream(
        &self,
        _key: &ApiKey,
        request: &ResumeRequest,
    ) -> Result<ChunkStream, ApiError> {
        self.record(Call::ResumeStream(request.clone()));
        self.connect(request.last_event_id.as_deref())
    }

    async fn create(
        &self,
        _key: &ApiKey,
        request: &CreateRequest,
    ) -> Result<InteractionSnapshot, ApiError> {
        self.record(Call::Create(request.clone()));
        self.next_snapshot()
    }

    async fn get(
        &self,
        _key: &ApiKey,
        interaction_id: &str,
    ) -> Result<InteractionSnapshot, ApiError> {
        self.record(Call::Get(interaction_id.to_string()));
        self.next_snapshot()
    }
}

pub(crate) fn test_key() -> ApiKey {
    ApiKey::resolve(Some("test-key".into()), "UNUSED_TEST_ENV").unwrap()
}

pub(crate) fn start_chunk(interaction_id: &str) -> Value {
    json!({"event_type": "interaction.start", "interaction": {"id": interaction_id}})
}

pub(crate) fn text_chunk(text: &str) -> Value {
    json!({"event_type": "content.delta", "delta": {"type": "text", "text": text}})
}

pub(crate) fn thought_chunk(text: &str) -> Value {
    json!({
        "event_type": "content.delta",
        "delta": {"type": "thought_summary", "content": {"text": text}}
    })
}

pub(crate) fn complete_chunk() -> Value {
    json!({"event_type": "interaction.complete"})
}

pub(crate) fn error_chunk(message: &str) -> Value {
    json!({"event_type": "error", "message": message})
}

pub(crate) fn with_id(mut chunk: Value, event_id: &str) -> Value {
    chunk["event_id"] = json!(event_id);
    chunk
}

/// Start, `n` text deltas and complete, with event ids 1..=n+2
pub(crate) fn numbered_ledger(interaction_id: &str, n: usize) -> Vec<Value> {
    let mut events = vec![with_id(start_chunk(interaction_id), "1")];
    for i in 0..n {
        events.push(with_id(text_chunk(&format!("[{}]", i + 2)), &(i + 2).to_string()));
    }
    events.push(with_id(complete_chunk(), &(n + 2).to_string()));
    events
}
