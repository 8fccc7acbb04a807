//! Terminal UI for research runs
//!
//! Renders a live progress stream: a spinner until the task starts, thought
//! summaries dimmed, report text as it arrives, and the finished report as
//! markdown with its sources.

pub mod renderer;
pub mod spinner;
pub mod theme;

use crate::api::{ProgressEvent, ProgressKind};
use crate::research::extract_citations;
use futures_util::{Stream, StreamExt};
use renderer::TerminalRenderer;
use spinner::ResearchSpinner;
use std::pin::pin;

/// What a rendered stream produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct StreamOutcome {
    pub interaction_id: Option<String>,
    pub report: String,
    pub completed: bool,
    /// Message of the last error event, if any
    pub error: Option<String>,
}

/// Drives a progress stream to the terminal
pub struct StreamView {
    renderer: TerminalRenderer,
    spinner: ResearchSpinner,
    show_thoughts: bool,
}

impl StreamView {
    pub fn new(show_thoughts: bool) -> Self {
        Self {
            renderer: TerminalRenderer::new(),
            spinner: ResearchSpinner::new(),
            show_thoughts,
        }
    }

    pub fn renderer(&mut self) -> &mut TerminalRenderer {
        &mut self.renderer
    }

    /// Render every event until the stream ends
    pub async fn run<S>(&mut self, events: S) -> StreamOutcome
    where
        S: Stream<Item = ProgressEvent>,
    {
        let mut events = pin!(events);
        let mut outcome = StreamOutcome::default();
        self.spinner.start("Starting research...");

        while let Some(event) = events.next().await {
            outcome.record(&event);

            match event.kind {
                ProgressKind::Start => {
                    self.spinner.stop();
                    self.renderer.render_event(&event, self.show_thoughts);
                    self.spinner.start("Researching...");
                }
                ProgressKind::Thought if !self.show_thoughts => {}
                _ => {
                    self.spinner.stop();
                    self.renderer.render_event(&event, self.show_thoughts);
                }
            }
        }
        self.spinner.stop();

        if outcome.completed && !outcome.report.is_empty() {
            self.renderer.render_markdown(&outcome.report);
            self.renderer
                .render_citations(&extract_citations(&outcome.report));
        }
        outcome
    }
}

impl StreamOutcome {
    fn record(&mut self, event: &ProgressEvent) {
        if self.interaction_id.is_none() {
            self.interaction_id = event.interaction_id.clone();
        }
        match event.kind {
            ProgressKind::Content => self.report.push_str(&event.content),
            ProgressKind::Complete => self.completed = true,
            ProgressKind::Error => self.error = Some(event.content.clone()),
            ProgressKind::Start | ProgressKind::Thought => {}
        }
    }
}
