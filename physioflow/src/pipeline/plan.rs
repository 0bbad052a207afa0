//! Pipeline steps selectable on the command line.

use crate::errors::ConfigError;
use crate::stages::StageName;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// What one invocation runs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    /// Timing construction only.
    CreateTimings,
    /// Anatomical preprocessing only.
    PreprocessAnat,
    /// Functional preprocessing only.
    PreprocessFunc,
    /// Modeling only.
    Glm,
    /// Timings, anatomical and functional preprocessing.
    Preprocess,
    /// Preprocessing followed by modeling, optionally then group aggregation.
    All,
    /// Group aggregation only.
    GroupAnalysis,
}

impl PipelineStep {
    /// Every step, in the order shown in help text.
    pub const ALL: [Self; 7] = [
        Self::CreateTimings,
        Self::PreprocessAnat,
        Self::PreprocessFunc,
        Self::Glm,
        Self::Preprocess,
        Self::All,
        Self::GroupAnalysis,
    ];

    /// Name used on the command line.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTimings => "create_timings",
            Self::PreprocessAnat => "preprocess_anat",
            Self::PreprocessFunc => "preprocess_func",
            Self::Glm => "glm",
            Self::Preprocess => "preprocess",
            Self::All => "all",
            Self::GroupAnalysis => "group_analysis",
        }
    }

    /// Per-subject stages in execution order; empty for group aggregation.
    #[must_use]
    pub fn stages(&self) -> Vec<StageName> {
        match self {
            Self::CreateTimings => vec![StageName::CreateTimings],
            Self::PreprocessAnat => vec![StageName::PreprocessAnat],
            Self::PreprocessFunc => vec![StageName::PreprocessFunc],
            Self::Glm => vec![StageName::Glm],
            Self::Preprocess => vec![
                StageName::CreateTimings,
                StageName::PreprocessAnat,
                StageName::PreprocessFunc,
            ],
            Self::All => StageName::ALL.to_vec(),
            Self::GroupAnalysis => Vec::new(),
        }
    }

    /// Whether the step runs first-level modeling.
    #[must_use]
    pub fn runs_models(&self) -> bool {
        matches!(self, Self::Glm | Self::All)
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PipelineStep {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|step| step.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownStage(s.to_string()))
    }
}
