//! Experiment designs: which codes are tracked and how runs are laid out.

use super::partition::Ladder;
use super::record::EventCode;
use crate::errors::AlignmentError;
use serde::{Deserialize, Serialize};

/// How table rows are turned into amplitudes.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AlignmentMode {
    /// One averaged amplitude per code per run.
    #[default]
    Aggregate,
    /// One row per onset, paired by position.
    Positional,
    /// Block-start onsets expanded into a ladder of sub-onsets.
    Binned {
        /// Sub-onsets per block start.
        ladder_size: usize,
        /// Seconds between sub-onsets.
        step: f64,
    },
}

/// Layout of one task's timing construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExperimentDesign {
    /// Design name, used on the command line.
    pub name: String,
    /// BIDS task label used to locate `task-<task>_run-<i>_events.tsv`.
    pub task: String,
    /// Output file prefix; files are written as `<prefix>_run-<i>.txt`.
    pub output_prefix: String,
    /// Tracked codes, in output order.
    pub event_codes: Vec<EventCode>,
    /// How many times each code occurs per run.
    pub occurrences_per_code: usize,
    /// Number of runs in a session.
    pub runs: usize,
    /// Alignment variant.
    #[serde(default)]
    pub mode: AlignmentMode,
}

/// Names accepted by [`ExperimentDesign::preset`].
pub const PRESET_NAMES: [&str; 4] = ["anticipation", "pain", "image", "binned"];

impl ExperimentDesign {
    /// Returns a built-in design by name.
    #[must_use]
    pub fn preset(name: &str) -> Option<Self> {
        let design = match name {
            "anticipation" => Self {
                name: name.to_string(),
                task: "tim".to_string(),
                output_prefix: "anticipation_scr_amplitude".to_string(),
                event_codes: vec![21, 22, 23, 24, 25, 41, 42, 43, 44, 45, 81, 82, 83, 84, 85],
                occurrences_per_code: 2,
                runs: 5,
                mode: AlignmentMode::Aggregate,
            },
            "pain" => Self {
                name: name.to_string(),
                task: "tim".to_string(),
                output_prefix: "pain_scr_amplitude".to_string(),
                event_codes: vec![26, 46, 86],
                occurrences_per_code: 2,
                runs: 5,
                mode: AlignmentMode::Positional,
            },
            "image" => Self {
                name: name.to_string(),
                task: "war".to_string(),
                output_prefix: "image_scr".to_string(),
                event_codes: vec![31, 32, 33, 34, 51, 52, 53, 54, 71, 72, 73, 74],
                occurrences_per_code: 3,
                runs: 2,
                mode: AlignmentMode::Aggregate,
            },
            "binned" => Self {
                name: name.to_string(),
                task: "war".to_string(),
                output_prefix: "binned_scr".to_string(),
                event_codes: vec![31, 51, 71],
                occurrences_per_code: 3,
                runs: 2,
                mode: AlignmentMode::Binned {
                    ladder_size: 11,
                    step: 2.0,
                },
            },
            _ => return None,
        };
        Some(design)
    }

    /// Overrides the number of runs.
    #[must_use]
    pub fn with_runs(mut self, runs: usize) -> Self {
        self.runs = runs;
        self
    }

    /// Rows each run occupies in the filtered alignment table.
    #[must_use]
    pub fn rows_per_block(&self) -> usize {
        let per_code = match self.mode {
            AlignmentMode::Aggregate | AlignmentMode::Positional => self.occurrences_per_code,
            AlignmentMode::Binned { ladder_size, .. } => ladder_size * self.occurrences_per_code,
        };
        self.event_codes.len() * per_code
    }

    /// Rows the whole session should contribute.
    #[must_use]
    pub fn expected_rows(&self) -> usize {
        self.rows_per_block() * self.runs
    }

    /// The ladder for binned designs.
    #[must_use]
    pub fn ladder(&self) -> Option<Ladder> {
        match self.mode {
            AlignmentMode::Binned { ladder_size, step } => Some(Ladder::new(ladder_size, step)),
            _ => None,
        }
    }

    /// File-name suffix of run `run`'s behavioral event log.
    #[must_use]
    pub fn events_suffix(&self, run: usize) -> String {
        format!("task-{}_run-{}_events.tsv", self.task, run)
    }

    /// File name of run `run`'s timing output.
    #[must_use]
    pub fn output_file_name(&self, run: usize) -> String {
        format!("{}_run-{}.txt", self.output_prefix, run)
    }

    /// Checks the design can partition a table at all.
    ///
    /// # Errors
    ///
    /// Returns an error for empty code lists, zero runs or occurrences,
    /// duplicate codes, or an unusable ladder.
    pub fn validate(&self) -> Result<(), AlignmentError> {
        if self.event_codes.is_empty() {
            return Err(AlignmentError::Design(format!("design '{}' tracks no event codes", self.name)));
        }
        if self.runs == 0 || self.occurrences_per_code == 0 {
            return Err(AlignmentError::Design(format!(
                "design '{}' needs at least one run and one occurrence per code",
                self.name
            )));
        }
        let mut codes = self.event_codes.clone();
        codes.sort_unstable();
        codes.dedup();
        if codes.len() != self.event_codes.len() {
            return Err(AlignmentError::Design(format!("design '{}' lists an event code twice", self.name)));
        }
        if let AlignmentMode::Binned { ladder_size, step } = self.mode {
            if ladder_size == 0 || !step.is_finite() || step <= 0.0 {
                return Err(AlignmentError::Design(format!(
                    "design '{}' has an invalid ladder ({ladder_size} x {step})",
                    self.name
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_presets_rows_per_block() {
        let block = |name: &str| ExperimentDesign::preset(name).unwrap().rows_per_block();
        assert_eq!(block("anticipation"), 30);
        assert_eq!(block("pain"), 6);
        assert_eq!(block("image"), 36);
        assert_eq!(block("binned"), 99);
    }

    #[test]
    fn test_all_presets_validate() {
        for name in PRESET_NAMES {
            assert!(ExperimentDesign::preset(name).unwrap().validate().is_ok(), "{name}");
        }
        assert!(ExperimentDesign::preset("unknown").is_none());
    }

    #[test]
    fn test_file_names() {
        let design = ExperimentDesign::preset("anticipation").unwrap();
        assert_eq!(design.events_suffix(3), "task-tim_run-3_events.tsv");
        assert_eq!(design.output_file_name(3), "anticipation_scr_amplitude_run-3.txt");
    }

    #[test]
    fn test_duplicate_codes_rejected() {
        let mut design = ExperimentDesign::preset("pain").unwrap();
        design.event_codes.push(26);
        assert!(design.validate().is_err());
    }

    #[test]
    fn test_design_from_toml() {
        let design: ExperimentDesign = toml::from_str(
            r#"
            name = "custom"
            task = "war"
            output_prefix = "custom_scr"
            event_codes = [31, 51]
            occurrences_per_code = 2
            runs = 3
            mode = { kind = "binned", ladder_size = 5, step = 1.5 }
            "#,
        )
        .unwrap();

        assert_eq!(design.rows_per_block(), 20);
        assert_eq!(design.ladder(), Some(Ladder::new(5, 1.5)));
    }
}
