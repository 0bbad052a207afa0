//! Group-level aggregation.
//!
//! Runs after every subject worker has finished. Inputs are gathered from
//! the first-level outputs on disk ([`inputs`]), a group mask is built with
//! the configured mask tool, and the group script is launched once.

mod analysis;
mod inputs;

pub use analysis::GroupAnalysis;
pub use inputs::{
    assemble, mask_prefix, select_subjects, stats_prefix, DataTable, Exclusion, GroupInputs,
};

use crate::config::GroupModelKind;
use crate::core::StageOutcome;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Terminal state of a group aggregation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupStatus {
    /// The group tool exited successfully.
    Completed,
    /// The mask tool or the group tool failed.
    Failed,
    /// Inputs could not be assembled; no tool ran.
    Aborted,
}

impl fmt::Display for GroupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Aborted => write!(f, "aborted"),
        }
    }
}

/// What a group aggregation did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupReport {
    /// First-level analysis.
    pub analysis: String,
    /// Group model name.
    pub group_model: String,
    /// Group tool.
    pub kind: GroupModelKind,
    /// `{output_dir}/group_analysis/{analysis}/{group_model}`.
    pub output_dir: PathBuf,
    /// Subjects that contributed inputs.
    pub included: Vec<String>,
    /// Subjects left out, with reasons.
    pub excluded: Vec<Exclusion>,
    /// Terminal state.
    pub status: GroupStatus,
    /// Mask tool and group tool outcomes, in launch order.
    pub outcomes: Vec<StageOutcome>,
    /// Why the aggregation did not complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl GroupReport {
    /// Returns true if the group tool ran successfully.
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == GroupStatus::Completed
    }

    /// The tool outcome that stopped the aggregation.
    #[must_use]
    pub fn failed_outcome(&self) -> Option<&StageOutcome> {
        self.outcomes.iter().find(|o| o.is_failure())
    }
}
