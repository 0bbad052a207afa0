//! Stage status enum.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The execution status of a stage invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    /// Stage is pending execution.
    #[default]
    Pending,
    /// Stage is currently running.
    Running,
    /// Stage exited with status zero.
    Ok,
    /// Stage did not apply to this subject/session.
    Skip,
    /// Stage exited non-zero or could not be launched.
    Fail,
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Ok => write!(f, "ok"),
            Self::Skip => write!(f, "skip"),
            Self::Fail => write!(f, "fail"),
        }
    }
}

impl StageStatus {
    /// Returns true if the status represents a terminal state.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip | Self::Fail)
    }

    /// Returns true if the pipeline may continue past this status.
    #[must_use]
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Ok | Self::Skip)
    }

    /// Returns true if the status indicates failure.
    #[must_use]
    pub fn is_failure(&self) -> bool {
        matches!(self, Self::Fail)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_status_display() {
        assert_eq!(StageStatus::Ok.to_string(), "ok");
        assert_eq!(StageStatus::Fail.to_string(), "fail");
        assert_eq!(StageStatus::Skip.to_string(), "skip");
    }

    #[test]
    fn test_stage_status_is_terminal() {
        assert!(StageStatus::Ok.is_terminal());
        assert!(StageStatus::Skip.is_terminal());
        assert!(StageStatus::Fail.is_terminal());
        assert!(!StageStatus::Pending.is_terminal());
        assert!(!StageStatus::Running.is_terminal());
    }

    #[test]
    fn test_skip_is_not_failure() {
        assert!(StageStatus::Skip.is_success());
        assert!(!StageStatus::Skip.is_failure());
    }

    #[test]
    fn test_stage_status_serialize() {
        let json = serde_json::to_string(&StageStatus::Skip).unwrap();
        assert_eq!(json, r#""skip""#);

        let deserialized: StageStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized, StageStatus::Skip);
    }
}
