//! Pipeline planning and execution.
//!
//! This module provides:
//! - Steps selectable on the command line and the stages they expand to
//! - The per-subject/session state machine
//! - The orchestrator that fans subjects out over a bounded pool
//! - Structured per-unit and per-run reports

mod integration_tests;
mod orchestrator;
mod plan;
mod report;
mod subject;

pub use orchestrator::{Orchestrator, RunPlan, RunRequest, SubjectPlan, NO_SESSION};
pub use plan::PipelineStep;
pub use report::{RunSummary, SubjectReport, UnitState};
pub use subject::{PipelineState, SubjectPipeline};
