//! Pipeline event emission.
//!
//! Stage and pipeline transitions are reported through an [`EventSink`]
//! passed explicitly to whoever emits them. The binary uses
//! [`LoggingEventSink`]; tests collect events with [`CollectingEventSink`].

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};

use crate::core::StageOutcome;
use serde_json::{json, Value};

/// Standard payload describing a stage outcome.
#[must_use]
pub fn outcome_payload(outcome: &StageOutcome) -> Value {
    json!({
        "stage": outcome.stage,
        "subject": outcome.subject,
        "session": outcome.session,
        "analysis": outcome.analysis,
        "status": outcome.status.to_string(),
        "exit_status": outcome.exit_status,
        "log_path": outcome.log_path.as_ref().map(|p| p.display().to_string()),
        "message": outcome.message,
        "duration_ms": outcome.duration_ms(),
    })
}
