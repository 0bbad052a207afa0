//! Stage outcome produced by a stage runner.

use super::StageStatus;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// The result of running (or skipping) one stage for one subject/session.
///
/// Outcomes are immutable once created. The subject pipeline reads
/// [`StageOutcome::status`] to decide whether to continue; nothing else
/// about the external process is parsed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutcome {
    /// Stage name as requested.
    pub stage: String,
    /// Subject id.
    pub subject: String,
    /// Session id.
    pub session: String,
    /// Analysis name for modeling stages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub analysis: Option<String>,
    /// Terminal status.
    pub status: StageStatus,
    /// Exit status of the external process, when one was launched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exit_status: Option<i32>,
    /// Combined stdout/stderr log of the process.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
    /// Failure or skip reason.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// When the stage started.
    pub started_at: DateTime<Utc>,
    /// When the stage ended.
    pub ended_at: DateTime<Utc>,
}

impl StageOutcome {
    fn new(
        stage: impl Into<String>,
        subject: impl Into<String>,
        session: impl Into<String>,
        status: StageStatus,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self {
            stage: stage.into(),
            subject: subject.into(),
            session: session.into(),
            analysis: None,
            status,
            exit_status: None,
            log_path: None,
            message: None,
            started_at,
            ended_at: Utc::now(),
        }
    }

    /// Creates a successful outcome.
    #[must_use]
    pub fn ok(
        stage: impl Into<String>,
        subject: impl Into<String>,
        session: impl Into<String>,
        started_at: DateTime<Utc>,
    ) -> Self {
        Self::new(stage, subject, session, StageStatus::Ok, started_at).with_exit_status(0)
    }

    /// Creates a failed outcome.
    #[must_use]
    pub fn failed(
        stage: impl Into<String>,
        subject: impl Into<String>,
        session: impl Into<String>,
        started_at: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        let mut outcome = Self::new(stage, subject, session, StageStatus::Fail, started_at);
        outcome.message = Some(message.into());
        outcome
    }

    /// Creates a skipped outcome. Skips take no time.
    #[must_use]
    pub fn skipped(
        stage: impl Into<String>,
        subject: impl Into<String>,
        session: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        let now = Utc::now();
        let mut outcome = Self::new(stage, subject, session, StageStatus::Skip, now);
        outcome.ended_at = now;
        outcome.message = Some(reason.into());
        outcome
    }

    /// Sets the analysis name.
    #[must_use]
    pub fn with_analysis(mut self, analysis: Option<String>) -> Self {
        self.analysis = analysis;
        self
    }

    /// Sets the process exit status.
    #[must_use]
    pub fn with_exit_status(mut self, code: i32) -> Self {
        self.exit_status = Some(code);
        self
    }

    /// Sets the log path.
    #[must_use]
    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Returns the duration in milliseconds.
    #[must_use]
    pub fn duration_ms(&self) -> f64 {
        (self.ended_at - self.started_at).num_milliseconds() as f64
    }

    /// Returns true if the stage exited successfully.
    #[must_use]
    pub fn is_success(&self) -> bool {
        self.status == StageStatus::Ok
    }

    /// Returns true if the stage was skipped.
    #[must_use]
    pub fn is_skipped(&self) -> bool {
        self.status == StageStatus::Skip
    }

    /// Returns true if the stage failed.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        self.status.is_failure()
    }

    /// Short label used in logs, e.g. `glm:pain_by_rating`.
    #[must_use]
    pub fn label(&self) -> String {
        match &self.analysis {
            Some(analysis) => format!("{}:{}", self.stage, analysis),
            None => self.stage.clone(),
        }
    }
}
