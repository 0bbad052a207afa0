//! Error types for physioflow.
//!
//! The taxonomy mirrors how failures propagate through a run:
//! configuration problems abort the whole invocation before anything is
//! dispatched, alignment problems abort one timing build, and stage
//! failures never surface here at all (they are recorded as
//! [`StageOutcome`](crate::core::StageOutcome)s instead).

use std::path::PathBuf;
use thiserror::Error;

/// The main error type for physioflow operations.
#[derive(Debug, Error)]
pub enum PhysioflowError {
    /// Configuration was missing, malformed or referenced unknown names.
    #[error("{0}")]
    Config(#[from] ConfigError),

    /// Timing construction failed.
    #[error("{0}")]
    Alignment(#[from] AlignmentError),

    /// A group aggregation could not be assembled.
    #[error("Group aggregation error: {0}")]
    Group(String),

    /// A worker task died without producing a report.
    #[error("Internal error: {0}")]
    Internal(String),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for PhysioflowError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Errors raised while loading or validating configuration.
///
/// All of these are fatal and are raised before any stage is dispatched.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// A configuration file could not be read.
    #[error("Configuration file not found: {path} ({reason})")]
    Missing {
        /// The path that was read.
        path: PathBuf,
        /// Underlying IO error text.
        reason: String,
    },

    /// A configuration file could not be parsed.
    #[error("Could not parse configuration file {path}: {reason}")]
    Parse {
        /// The path that was parsed.
        path: PathBuf,
        /// Parser error text.
        reason: String,
    },

    /// A configuration value is structurally invalid.
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// An analysis model name is not in the catalog.
    #[error("Analysis model '{0}' not found in the analysis catalog")]
    UnknownAnalysis(String),

    /// A group model name is not defined under its analysis.
    #[error("Group analysis model '{group_model}' not found under '{analysis}'")]
    UnknownGroupModel {
        /// The first-level analysis.
        analysis: String,
        /// The requested group model.
        group_model: String,
    },

    /// A subject id is not in the roster.
    #[error("Subject '{0}' not found in the subject roster")]
    UnknownSubject(String),

    /// A pipeline step or stage name is not recognized.
    #[error("Invalid step name '{0}'")]
    UnknownStage(String),

    /// The session selector is not an integer.
    #[error("--session must be an integer, got '{0}'")]
    MalformedSession(String),

    /// A CLI argument combination is not valid for the requested step.
    #[error("{0}")]
    Usage(String),
}

impl ConfigError {
    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }

    /// Creates a usage error.
    #[must_use]
    pub fn usage(message: impl Into<String>) -> Self {
        Self::Usage(message.into())
    }
}

/// Error raised when a run slice cannot be taken from an alignment table.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum PartitionError {
    /// Runs are numbered from 1.
    #[error("Run index must be >= 1, got 0")]
    ZeroRunIndex,

    /// A block of zero rows cannot partition anything.
    #[error("Rows per block must be > 0")]
    EmptyBlock,

    /// The requested run extends past the end of the table.
    #[error("Run {run_index} needs rows [{start}, {end}) but the table only has {total_rows} rows")]
    OutOfBounds {
        /// The requested run.
        run_index: usize,
        /// Slice start.
        start: usize,
        /// Slice end (exclusive).
        end: usize,
        /// Table length.
        total_rows: usize,
    },
}

/// Errors raised while constructing timing files.
#[derive(Debug, Error)]
pub enum AlignmentError {
    /// The run slice could not be taken.
    #[error("{0}")]
    Partition(#[from] PartitionError),

    /// An input file does not exist.
    #[error("Input path is invalid: {0}")]
    MissingInput(PathBuf),

    /// No behavioral event file matched a run.
    #[error("Event file for run {run} not found in {dir} (expected suffix '{suffix}')")]
    MissingEventFile {
        /// The run that was searched for.
        run: usize,
        /// The searched directory.
        dir: PathBuf,
        /// The expected file-name suffix.
        suffix: String,
    },

    /// A tabular input or output file could not be read or written.
    #[error("Malformed table {path}: {reason}")]
    Table {
        /// The offending file.
        path: PathBuf,
        /// Parser error text.
        reason: String,
    },

    /// The experiment design is unusable.
    #[error("Invalid experiment design: {0}")]
    Design(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl AlignmentError {
    /// Wraps a csv error with the path it came from.
    #[must_use]
    pub fn table(path: impl Into<PathBuf>, err: &csv::Error) -> Self {
        Self::Table {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partition_error_message() {
        let err = PartitionError::OutOfBounds {
            run_index: 6,
            start: 150,
            end: 180,
            total_rows: 150,
        };
        assert!(err.to_string().contains("[150, 180)"));
        assert!(err.to_string().contains("150 rows"));
    }

    #[test]
    fn test_config_error_converts() {
        let err: PhysioflowError = ConfigError::UnknownAnalysis("pain_by_rating".to_string()).into();
        assert!(matches!(err, PhysioflowError::Config(_)));
        assert!(err.to_string().contains("pain_by_rating"));
    }

    #[test]
    fn test_alignment_error_from_partition() {
        let err: AlignmentError = PartitionError::ZeroRunIndex.into();
        assert_eq!(err.to_string(), "Run index must be >= 1, got 0");
    }

    #[test]
    fn test_unknown_group_model_message() {
        let err = ConfigError::UnknownGroupModel {
            analysis: "image".to_string(),
            group_model: "lme".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Group analysis model 'lme' not found under 'image'"
        );
    }
}
