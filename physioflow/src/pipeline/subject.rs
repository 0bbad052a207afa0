//! The per-subject/session pipeline.
//!
//! Runs stages strictly in order, fans modeling out over analyses, skips
//! analyses the session cannot satisfy, and stops at the first failure.

use super::report::SubjectReport;
use crate::config::{AnalysisModel, SubjectSessionContext};
use crate::core::StageOutcome;
use crate::events::{outcome_payload, EventSink, NoOpEventSink, PipelineEvent};
use crate::stages::{ExtraArgs, StageName, StageRequest, StageRunner};
use serde_json::json;
use std::fmt;
use std::sync::Arc;
use tracing::{info, warn};

/// Where a pipeline is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PipelineState {
    /// Not started.
    Pending,
    /// Running the given stage.
    Running(StageName),
    /// Every stage ran or was skipped.
    Completed,
    /// Stopped at the given stage.
    Aborted(StageName),
}

impl PipelineState {
    /// Returns true once the pipeline can no longer change.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Aborted(_))
    }
}

impl fmt::Display for PipelineState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running(stage) => write!(f, "running({stage})"),
            Self::Completed => write!(f, "completed"),
            Self::Aborted(stage) => write!(f, "aborted({stage})"),
        }
    }
}

/// Sequences stages for one subject/session.
pub struct SubjectPipeline {
    context: SubjectSessionContext,
    stages: Vec<StageName>,
    analyses: Vec<AnalysisModel>,
    runner: Arc<dyn StageRunner>,
    sink: Arc<dyn EventSink>,
    state: PipelineState,
}

impl fmt::Debug for SubjectPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubjectPipeline")
            .field("subject", &self.context.subject_id)
            .field("session", &self.context.session_id)
            .field("stages", &self.stages)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

impl SubjectPipeline {
    /// Creates a pending pipeline.
    #[must_use]
    pub fn new(context: SubjectSessionContext, stages: Vec<StageName>, runner: Arc<dyn StageRunner>) -> Self {
        Self {
            context,
            stages,
            analyses: Vec::new(),
            runner,
            sink: Arc::new(NoOpEventSink),
            state: PipelineState::Pending,
        }
    }

    /// Analyses the modeling stage fans out over, in order.
    #[must_use]
    pub fn with_analyses(mut self, analyses: Vec<AnalysisModel>) -> Self {
        self.analyses = analyses;
        self
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Current state.
    #[must_use]
    pub fn state(&self) -> PipelineState {
        self.state
    }

    /// Runs every stage and reports the terminal state.
    pub async fn run(&mut self) -> SubjectReport {
        let mut outcomes = Vec::new();
        let stages = self.stages.clone();

        for stage in stages {
            self.state = PipelineState::Running(stage);
            let ok = if stage.config().accepts_analysis_name {
                self.run_models(stage, &mut outcomes).await
            } else {
                let request = self.request(stage);
                let outcome = self.dispatch(&request).await;
                let ok = !outcome.is_failure();
                outcomes.push(outcome);
                ok
            };

            if !ok {
                self.state = PipelineState::Aborted(stage);
                return self.abort(stage, outcomes);
            }
        }

        self.state = PipelineState::Completed;
        self.sink.try_emit(
            PipelineEvent::PipelineCompleted,
            Some(json!({
                "subject": self.context.subject_id,
                "session": self.context.session_label(),
                "stages": outcomes.len(),
            })),
        );
        SubjectReport::completed(&self.context.subject_id, self.context.session_label(), outcomes)
            .with_group(self.context.group.clone())
    }

    async fn run_models(&self, stage: StageName, outcomes: &mut Vec<StageOutcome>) -> bool {
        let session = self.context.session_label();
        if self.analyses.is_empty() {
            let outcome = StageOutcome::failed(
                stage.as_str(),
                &self.context.subject_id,
                &session,
                chrono::Utc::now(),
                format!("--analysis is required for '{stage}' step"),
            );
            self.sink.try_emit(PipelineEvent::StageFailed, Some(outcome_payload(&outcome)));
            outcomes.push(outcome);
            return false;
        }

        for analysis in &self.analyses {
            if analysis.requires_scr && !self.context.has_scr {
                info!(
                    subject = %self.context.subject_id,
                    session = %session,
                    analysis = %analysis.name,
                    "Skipping '{}' (no SCR data)", analysis.name
                );
                let outcome = StageOutcome::skipped(stage.as_str(), &self.context.subject_id, &session, "no SCR data")
                    .with_analysis(Some(analysis.name.clone()));
                self.sink.try_emit(PipelineEvent::StageSkipped, Some(outcome_payload(&outcome)));
                outcomes.push(outcome);
                continue;
            }

            let request = self.request(stage).with_analysis(&analysis.name);
            let outcome = self.dispatch(&request).await;
            let failed = outcome.is_failure();
            outcomes.push(outcome);
            if failed {
                return false;
            }
        }
        true
    }

    fn request(&self, stage: StageName) -> StageRequest {
        let request = StageRequest::new(stage.as_str(), &self.context.subject_id, self.context.session_label());
        match stage.config().extra_args {
            ExtraArgs::BlockLags => request.with_extra_args(self.context.lag_args()),
            ExtraArgs::None => request,
        }
    }

    async fn dispatch(&self, request: &StageRequest) -> StageOutcome {
        self.sink
            .emit(
                PipelineEvent::StageStarted,
                Some(json!({
                    "stage": request.stage,
                    "subject": request.subject,
                    "session": request.session,
                    "analysis": request.analysis,
                })),
            )
            .await;

        let outcome = self.runner.run(request).await;
        let event = if outcome.is_failure() {
            PipelineEvent::StageFailed
        } else if outcome.is_skipped() {
            PipelineEvent::StageSkipped
        } else {
            PipelineEvent::StageCompleted
        };
        self.sink.emit(event, Some(outcome_payload(&outcome))).await;
        outcome
    }

    fn abort(&self, stage: StageName, outcomes: Vec<StageOutcome>) -> SubjectReport {
        let label = outcomes
            .last()
            .map_or_else(|| stage.to_string(), StageOutcome::label);
        let reason = format!("'{label}' failed");
        warn!(
            subject = %self.context.subject_id,
            session = %self.context.session_label(),
            stage = %stage,
            "Stopping pipeline for {} because {reason}", self.context.subject_id
        );
        self.sink.try_emit(
            PipelineEvent::PipelineAborted,
            Some(json!({
                "subject": self.context.subject_id,
                "session": self.context.session_label(),
                "failed_stage": label,
            })),
        );
        SubjectReport::aborted(&self.context.subject_id, self.context.session_label(), outcomes, reason)
            .with_group(self.context.group.clone())
    }
}
