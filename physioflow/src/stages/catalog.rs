//! The fixed set of per-subject stages and how each is invoked.

use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// A per-subject processing stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    /// Builds per-run timing files from physiological and behavioral logs.
    CreateTimings,
    /// Anatomical preprocessing.
    PreprocessAnat,
    /// Functional preprocessing.
    PreprocessFunc,
    /// First-level statistical modeling, once per analysis.
    Glm,
}

impl StageName {
    /// All stages in pipeline order.
    pub const ALL: [Self; 4] = [
        Self::CreateTimings,
        Self::PreprocessAnat,
        Self::PreprocessFunc,
        Self::Glm,
    ];

    /// Name used on the command line and in logs.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CreateTimings => "create_timings",
            Self::PreprocessAnat => "preprocess_anat",
            Self::PreprocessFunc => "preprocess_func",
            Self::Glm => "glm",
        }
    }

    /// Static invocation settings.
    #[must_use]
    pub fn config(&self) -> &'static StageConfig {
        match self {
            Self::CreateTimings => &CREATE_TIMINGS,
            Self::PreprocessAnat => &PREPROCESS_ANAT,
            Self::PreprocessFunc => &PREPROCESS_FUNC,
            Self::Glm => &GLM,
        }
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| ConfigError::UnknownStage(s.to_string()))
    }
}

/// Extra arguments a stage receives beyond the common ones.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExtraArgs {
    /// Nothing extra.
    None,
    /// `--lag_block_1 X --lag_block_2 Y` from the session.
    BlockLags,
}

/// How a stage's script is invoked.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StageConfig {
    /// Script file name inside the scripts directory.
    pub script_name: &'static str,
    /// Passes `--input <input_dir>`.
    pub requires_input_dir: bool,
    /// Passes `--output <output_dir>`.
    pub requires_output_dir: bool,
    /// Passes `--analysis <name>` and runs once per analysis.
    pub accepts_analysis_name: bool,
    /// Stage-specific arguments.
    pub extra_args: ExtraArgs,
}

static CREATE_TIMINGS: StageConfig = StageConfig {
    script_name: "00_create_timings.sh",
    requires_input_dir: true,
    requires_output_dir: false,
    accepts_analysis_name: false,
    extra_args: ExtraArgs::BlockLags,
};

static PREPROCESS_ANAT: StageConfig = StageConfig {
    script_name: "01_preprocess_anat.sh",
    requires_input_dir: true,
    requires_output_dir: true,
    accepts_analysis_name: false,
    extra_args: ExtraArgs::None,
};

static PREPROCESS_FUNC: StageConfig = StageConfig {
    script_name: "02_preprocess_func.sh",
    requires_input_dir: true,
    requires_output_dir: true,
    accepts_analysis_name: false,
    extra_args: ExtraArgs::None,
};

static GLM: StageConfig = StageConfig {
    script_name: "03_run_glm.sh",
    requires_input_dir: true,
    requires_output_dir: true,
    accepts_analysis_name: true,
    extra_args: ExtraArgs::None,
};

/// Script run by group aggregation.
pub const GROUP_SCRIPT: &str = "04_run_group_analysis.sh";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip_names() {
        for stage in StageName::ALL {
            assert_eq!(stage.as_str().parse::<StageName>().unwrap(), stage);
        }
    }

    #[test]
    fn test_unknown_stage() {
        assert_eq!(
            "smooth".parse::<StageName>(),
            Err(ConfigError::UnknownStage("smooth".to_string()))
        );
    }

    #[test]
    fn test_static_configs() {
        let timings = StageName::CreateTimings.config();
        assert_eq!(timings.script_name, "00_create_timings.sh");
        assert!(!timings.requires_output_dir);
        assert_eq!(timings.extra_args, ExtraArgs::BlockLags);

        assert!(StageName::Glm.config().accepts_analysis_name);
        assert!(!StageName::PreprocessFunc.config().accepts_analysis_name);
    }
}
