//! Event sink trait and implementations.

use async_trait::async_trait;
use serde_json::Value;
use std::fmt;
use tracing::{debug, info, warn, Level};

/// Lifecycle transitions reported by pipelines and the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PipelineEvent {
    /// A stage was dispatched.
    StageStarted,
    /// A stage exited with status 0.
    StageCompleted,
    /// A stage was not applicable and did not run.
    StageSkipped,
    /// A stage failed.
    StageFailed,
    /// Every stage of a unit finished.
    PipelineCompleted,
    /// A unit stopped at a failed stage.
    PipelineAborted,
    /// A subject was left out of group aggregation.
    GroupExcluded,
    /// Group aggregation finished successfully.
    GroupCompleted,
    /// Group aggregation failed.
    GroupFailed,
}

impl PipelineEvent {
    /// Dotted event name, e.g. `stage.started`.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StageStarted => "stage.started",
            Self::StageCompleted => "stage.completed",
            Self::StageSkipped => "stage.skipped",
            Self::StageFailed => "stage.failed",
            Self::PipelineCompleted => "pipeline.completed",
            Self::PipelineAborted => "pipeline.aborted",
            Self::GroupExcluded => "group.excluded",
            Self::GroupCompleted => "group.completed",
            Self::GroupFailed => "group.failed",
        }
    }

    /// Whether the event reports something going wrong.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::StageFailed | Self::PipelineAborted | Self::GroupFailed)
    }
}

impl fmt::Display for PipelineEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Receives pipeline events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Emits an event asynchronously.
    async fn emit(&self, event: PipelineEvent, data: Option<Value>);

    /// Emits an event without awaiting. Never fails.
    fn try_emit(&self, event: PipelineEvent, data: Option<Value>);
}

/// Discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: PipelineEvent, _data: Option<Value>) {}

    fn try_emit(&self, _event: PipelineEvent, _data: Option<Value>) {}
}

/// Forwards events to `tracing`. Failure events are always logged at warn.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self { level: Level::INFO }
    }
}

impl LoggingEventSink {
    /// Creates a logging sink for the given level.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Creates a debug-level logging sink.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    fn log_event(&self, event: PipelineEvent, data: Option<&Value>) {
        let data = data.map(Value::to_string).unwrap_or_default();
        if event.is_failure() {
            warn!(event_type = %event, event_data = %data, "Event: {}", event);
        } else if self.level == Level::DEBUG {
            debug!(event_type = %event, event_data = %data, "Event: {}", event);
        } else {
            info!(event_type = %event, event_data = %data, "Event: {}", event);
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: PipelineEvent, data: Option<Value>) {
        self.log_event(event, data.as_ref());
    }

    fn try_emit(&self, event: PipelineEvent, data: Option<Value>) {
        self.log_event(event, data.as_ref());
    }
}

/// Records events in memory; used by tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<(PipelineEvent, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<(PipelineEvent, Option<Value>)> {
        self.events.read().clone()
    }

    /// Returns the collected event kinds, in order.
    #[must_use]
    pub fn kinds(&self) -> Vec<PipelineEvent> {
        self.events.read().iter().map(|(kind, _)| *kind).collect()
    }

    /// Returns the number of collected events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    /// Returns true if no events have been collected.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    /// Clears all collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }

    /// Returns the payloads of one event kind.
    #[must_use]
    pub fn payloads_of(&self, event: PipelineEvent) -> Vec<Value> {
        self.events
            .read()
            .iter()
            .filter(|(kind, _)| *kind == event)
            .filter_map(|(_, data)| data.clone())
            .collect()
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: PipelineEvent, data: Option<Value>) {
        self.events.write().push((event, data));
    }

    fn try_emit(&self, event: PipelineEvent, data: Option<Value>) {
        self.events.write().push((event, data));
    }
}
