//! Callback-style consumption of a research task

use crate::api::{ProgressEvent, ProgressKind, Transport};
use crate::config::ConfigError;
use crate::reconnect::Reconnector;
use crate::stream::StreamOptions;
use futures_util::{Stream, StreamExt};
use std::pin::pin;

type Handler = Box<dyn FnMut(&str) + Send>;

/// Optional handlers, one per event kind of interest
#[derive(Default)]
pub struct ResearchCallbacks {
    on_thought: Option<Handler>,
    on_content: Option<Handler>,
    on_complete: Option<Handler>,
    on_error: Option<Handler>,
}

impl ResearchCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Called with each thought summary
    pub fn on_thought(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_thought = Some(Box::new(f));
        self
    }

    /// Called with each piece of report text
    pub fn on_content(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_content = Some(Box::new(f));
        self
    }

    /// Called once with the interaction id, or `""` if none was assigned
    pub fn on_complete(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_complete = Some(Box::new(f));
        self
    }

    /// Called with the message of every error event
    pub fn on_error(mut self, f: impl FnMut(&str) + Send + 'static) -> Self {
        self.on_error = Some(Box::new(f));
        self
    }
}

/// Routes progress events to callbacks and accumulates the report
pub struct CallbackAdapter {
    callbacks: ResearchCallbacks,
    report: String,
    interaction_id: Option<String>,
}

impl CallbackAdapter {
    pub fn new(callbacks: ResearchCallbacks) -> Self {
        Self {
            callbacks,
            report: String::new(),
            interaction_id: None,
        }
    }

    /// Dispatch one event. Returns true once the task has completed.
    pub fn handle(&mut self, event: &ProgressEvent) -> bool {
        if self.interaction_id.is_none() {
            self.interaction_id = event.interaction_id.clone();
        }

        let handler = match event.kind {
            ProgressKind::Start => None,
            ProgressKind::Thought => self.callbacks.on_thought.as_mut(),
            ProgressKind::Content => {
                self.report.push_str(&event.content);
                self.callbacks.on_content.as_mut()
            }
            ProgressKind::Complete => {
                if let Some(f) = self.callbacks.on_complete.as_mut() {
                    f(self.interaction_id.as_deref().unwrap_or(""));
                }
                None
            }
            ProgressKind::Error => self.callbacks.on_error.as_mut(),
        };
        if let Some(f) = handler {
            f(&event.content);
        }

        event.kind == ProgressKind::Complete
    }

    /// Report text accumulated so far
    pub fn report(&self) -> &str {
        &self.report
    }

    /// Consume `stream` until it ends and return the concatenated report
    pub async fn drive_to_completion<S>(mut self, stream: S) -> String
    where
        S: Stream<Item = ProgressEvent>,
    {
        let mut stream = pin!(stream);
        while let Some(event) = stream.next().await {
            if self.handle(&event) {
                break;
            }
        }
        self.report
    }
}

/// Run a research task through a [`Reconnector`] and return the report.
///
/// Fails only if no API key can be resolved; every other failure reaches
/// `on_error` and ends the run with whatever text arrived.
///
/// This is async and must run inside a tokio runtime. Callers without one
/// can use `tokio::runtime::Runtime::block_on` on the returned future.
pub async fn stream_research_with_callback(
    query: &str,
    callbacks: ResearchCallbacks,
    api_key: Option<String>,
) -> Result<String, ConfigError> {
    let reconnector = Reconnector::new(api_key)?;
    Ok(drive_reconnector(reconnector, query, callbacks).await)
}

/// [`stream_research_with_callback`] over an already built reconnector
pub async fn drive_reconnector<T: Transport>(
    reconnector: Reconnector<T>,
    query: &str,
    callbacks: ResearchCallbacks,
) -> String {
    let events = reconnector.stream(query, StreamOptions::default());
    CallbackAdapter::new(callbacks).drive_to_completion(events).await
}
