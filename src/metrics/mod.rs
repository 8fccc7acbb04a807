//! Metrics for research streams

use crate::api::{ProgressEvent, ProgressKind};
use serde::{Deserialize, Serialize};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

/// Counters for one or more research streams
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamCounters {
    /// Connections opened, first ones included
    pub connections_opened: u64,
    /// Connections opened to resume or re-create a task
    pub reconnects: u64,
    /// Connections that ended in a transport failure
    pub transport_failures: u64,
    pub starts: u64,
    pub thoughts: u64,
    pub content_events: u64,
    pub completions: u64,
    pub errors: u64,
    /// Bytes of report text forwarded
    pub content_bytes: u64,
    /// Events forwarded with a regressing event id
    pub out_of_order: u64,
}

impl StreamCounters {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_connection(&mut self, is_reconnect: bool) {
        self.connections_opened += 1;
        if is_reconnect {
            self.reconnects += 1;
        }
    }

    pub fn record_failure(&mut self) {
        self.transport_failures += 1;
    }

    pub fn record_event(&mut self, event: &ProgressEvent) {
        match event.kind {
            ProgressKind::Start => self.starts += 1,
            ProgressKind::Thought => self.thoughts += 1,
            ProgressKind::Content => {
                self.content_events += 1;
                self.content_bytes += event.content.len() as u64;
            }
            ProgressKind::Complete => self.completions += 1,
            ProgressKind::Error => self.errors += 1,
        }
        if event.metadata.contains_key("out_of_order") {
            self.out_of_order += 1;
        }
    }

    pub fn events_forwarded(&self) -> u64 {
        self.starts + self.thoughts + self.content_events + self.completions + self.errors
    }
}

/// Thread-safe metrics tracker
#[derive(Clone)]
pub struct StreamMetrics {
    inner: Arc<Mutex<StreamCounters>>,
    started_at: Instant,
}

impl StreamMetrics {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(StreamCounters::new())),
            started_at: Instant::now(),
        }
    }

    pub fn record_connection(&self, is_reconnect: bool) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.record_connection(is_reconnect);
        }
    }

    pub fn record_failure(&self) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.record_failure();
        }
    }

    pub fn record_event(&self, event: &ProgressEvent) {
        if let Ok(mut counters) = self.inner.lock() {
            counters.record_event(event);
        }
    }

    pub fn get_counters(&self) -> StreamCounters {
        self.inner
            .lock()
            .map(|c| c.clone())
            .unwrap_or_default()
    }

    pub fn summary(&self) -> MetricsSummary {
        let counters = self.get_counters();
        MetricsSummary {
            connections_opened: counters.connections_opened,
            reconnects: counters.reconnects,
            transport_failures: counters.transport_failures,
            events_forwarded: counters.events_forwarded(),
            thoughts: counters.thoughts,
            content_bytes: counters.content_bytes,
            out_of_order: counters.out_of_order,
            elapsed: self.started_at.elapsed(),
        }
    }
}

impl Default for StreamMetrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MetricsSummary {
    pub connections_opened: u64,
    pub reconnects: u64,
    pub transport_failures: u64,
    pub events_forwarded: u64,
    pub thoughts: u64,
    pub content_bytes: u64,
    pub out_of_order: u64,
    pub elapsed: Duration,
}

impl std::fmt::Display for MetricsSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Stream Summary ===")?;
        writeln!(f, "Connections opened: {}", self.connections_opened)?;
        writeln!(f, "Reconnects: {}", self.reconnects)?;
        writeln!(f, "Transport failures: {}", self.transport_failures)?;
        writeln!(f, "Events forwarded: {}", self.events_forwarded)?;
        writeln!(f, "Thought summaries: {}", self.thoughts)?;
        writeln!(f, "Report bytes: {}", self.content_bytes)?;
        if self.out_of_order > 0 {
            writeln!(f, "Out-of-order events: {}", self.out_of_order)?;
        }
        writeln!(f, "Elapsed: {:.1}s", self.elapsed.as_secs_f64())?;
        Ok(())
    }
}
