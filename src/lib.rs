//! research-stream - Resumable streaming client for background deep research
//!
//! Opens a long-running research task on the Interactions API and turns its
//! server-sent events into a uniform sequence of progress events.
//!
//! ## Key Features
//!
//! - **Streaming**: lazy, pull-based progress events (start, thought, content, complete, error)
//! - **Reconnection**: resume after transport failures without gaps or duplicates
//! - **Callbacks**: drive a task to completion and collect the report
//! - **Polling**: background research with status polling, follow-ups and citations
//! - **Metrics**: connection and event counters per run

pub mod api;
pub mod callback;
pub mod config;
pub mod metrics;
pub mod reconnect;
pub mod research;
pub mod stream;
pub mod tui;

pub use api::{ApiError, ApiKey, HttpTransport, ProgressEvent, ProgressKind, Transport};
pub use callback::{stream_research_with_callback, CallbackAdapter, ResearchCallbacks};
pub use config::{Config, ConfigBuilder, ConfigError};
pub use metrics::{MetricsSummary, StreamMetrics};
pub use reconnect::{Backoff, EventStream, Phase, Reconnector, RetryPolicy};
pub use research::{extract_citations, ResearchAgent, ResearchResult, ResearchStatus};
pub use stream::{stream_research, StreamClient, StreamOptions, StreamSettings};
