//! Structured results of subject pipelines and whole runs.

use crate::core::StageOutcome;
use crate::group::GroupReport;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Terminal state of one subject/session unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UnitState {
    /// Every stage ran or was skipped.
    Completed,
    /// A stage failed; later stages did not run.
    Aborted,
    /// The unit did not apply (e.g. the subject lacks the session).
    Skipped,
}

impl fmt::Display for UnitState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Aborted => write!(f, "aborted"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

/// What happened to one subject/session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectReport {
    /// Subject id.
    pub subject: String,
    /// Session id.
    pub session: String,
    /// Group label of the subject.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
    /// Terminal state.
    pub state: UnitState,
    /// Outcomes in execution order.
    pub outcomes: Vec<StageOutcome>,
    /// Why the unit was skipped or aborted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl SubjectReport {
    /// A unit that ran to the end.
    #[must_use]
    pub fn completed(subject: impl Into<String>, session: impl Into<String>, outcomes: Vec<StageOutcome>) -> Self {
        Self {
            subject: subject.into(),
            session: session.into(),
            group: None,
            state: UnitState::Completed,
            outcomes,
            reason: None,
        }
    }

    /// A unit that stopped at a failure.
    #[must_use]
    pub fn aborted(
        subject: impl Into<String>,
        session: impl Into<String>,
        outcomes: Vec<StageOutcome>,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            state: UnitState::Aborted,
            reason: Some(reason.into()),
            ..Self::completed(subject, session, outcomes)
        }
    }

    /// A unit that did not apply.
    #[must_use]
    pub fn skipped(subject: impl Into<String>, session: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            state: UnitState::Skipped,
            reason: Some(reason.into()),
            ..Self::completed(subject, session, Vec::new())
        }
    }

    /// Sets the group label.
    #[must_use]
    pub fn with_group(mut self, group: Option<String>) -> Self {
        self.group = group;
        self
    }

    /// Returns true if the unit completed.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.state == UnitState::Completed
    }

    /// The outcome that aborted the unit.
    #[must_use]
    pub fn failed_outcome(&self) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.is_failure())
    }

    /// Outcomes that were skipped.
    pub fn skipped_outcomes(&self) -> impl Iterator<Item = &StageOutcome> {
        self.outcomes.iter().filter(|o| o.is_skipped())
    }
}

/// Everything one invocation did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Unique id of this invocation.
    pub run_id: Uuid,
    /// Step that was run.
    pub step: String,
    /// When the run started.
    pub started_at: DateTime<Utc>,
    /// When the run ended.
    pub ended_at: DateTime<Utc>,
    /// Per-unit reports, sorted by subject then session.
    pub units: Vec<SubjectReport>,
    /// Group aggregation, when one was run.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<GroupReport>,
}

impl RunSummary {
    /// Creates a summary; units are sorted for stable output.
    #[must_use]
    pub fn new(step: impl Into<String>, started_at: DateTime<Utc>, mut units: Vec<SubjectReport>) -> Self {
        units.sort_by(|a, b| {
            a.subject
                .cmp(&b.subject)
                .then_with(|| a.session.parse::<u32>().ok().cmp(&b.session.parse::<u32>().ok()))
                .then_with(|| a.session.cmp(&b.session))
        });
        Self {
            run_id: Uuid::new_v4(),
            step: step.into(),
            started_at,
            ended_at: Utc::now(),
            units,
            group: None,
        }
    }

    /// Attaches a group report.
    #[must_use]
    pub fn with_group(mut self, group: Option<GroupReport>) -> Self {
        self.group = group;
        self.ended_at = Utc::now();
        self
    }

    fn count(&self, state: UnitState) -> usize {
        self.units.iter().filter(|u| u.state == state).count()
    }

    /// Units that completed.
    #[must_use]
    pub fn completed(&self) -> usize {
        self.count(UnitState::Completed)
    }

    /// Units that aborted.
    #[must_use]
    pub fn aborted(&self) -> usize {
        self.count(UnitState::Aborted)
    }

    /// Units that were skipped.
    #[must_use]
    pub fn skipped(&self) -> usize {
        self.count(UnitState::Skipped)
    }

    /// Looks a unit up.
    #[must_use]
    pub fn unit(&self, subject: &str, session: &str) -> Option<&SubjectReport> {
        self.units
            .iter()
            .find(|u| u.subject == subject && u.session == session)
    }

    /// Serializes the summary as pretty JSON.
    ///
    /// # Errors
    ///
    /// Fails only if serialization fails.
    pub fn to_json(&self) -> Result<String, crate::errors::PhysioflowError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
