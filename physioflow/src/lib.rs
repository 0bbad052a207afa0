//! # Physioflow
//!
//! Event-locked physiological timing construction and a per-subject
//! neuroimaging pipeline runner.
//!
//! Physioflow provides:
//!
//! - **Timing construction**: pair skin-conductance response amplitudes from
//!   an event-related analysis table with behavioral onsets, one timing file
//!   per run
//! - **Stage execution**: run external preprocessing and modeling scripts
//!   with per-stage logs, never propagating their failures as errors
//! - **Subject pipelines**: fail-fast sequencing of stages per
//!   subject/session, with analyses skipped when the session lacks the
//!   required signal
//! - **Orchestration**: a bounded worker pool over subjects followed by an
//!   optional group aggregation
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use physioflow::prelude::*;
//!
//! let config = PipelineConfig::load(Path::new(DEFAULT_MAIN_CONFIG))?;
//! let catalog = AnalysisCatalog::load(Path::new(DEFAULT_ANALYSIS_MODELS))?;
//! let runner = Arc::new(ScriptRunner::from_config(&config));
//!
//! let summary = Orchestrator::new(config, catalog, runner)
//!     .run(&RunRequest::new(PipelineStep::Preprocess).with_n_procs(4))
//!     .await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod alignment;
pub mod config;
pub mod core;
pub mod errors;
pub mod events;
pub mod group;
pub mod observability;
pub mod pipeline;
pub mod stages;

#[cfg(test)]
pub(crate) mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::alignment::{
        Acquisition, AlignmentMode, EventRecord, ExperimentDesign, TimingBuilder, TimingReport,
    };
    pub use crate::config::{
        AnalysisCatalog, AnalysisModel, PipelineConfig, SessionConfig, SubjectConfig,
        DEFAULT_ANALYSIS_MODELS, DEFAULT_MAIN_CONFIG,
    };
    pub use crate::core::{StageOutcome, StageStatus};
    pub use crate::errors::{AlignmentError, ConfigError, PartitionError, PhysioflowError};
    pub use crate::events::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink, PipelineEvent};
    pub use crate::group::{GroupReport, GroupStatus};
    pub use crate::observability::{init_tracing, LogFormat};
    pub use crate::pipeline::{Orchestrator, PipelineStep, RunRequest, RunSummary, SubjectReport, UnitState};
    pub use crate::stages::{ScriptRunner, StageName, StageRunner};
}
