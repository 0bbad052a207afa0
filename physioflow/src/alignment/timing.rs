//! Timing construction for one subject/session.
//!
//! Reads the session's analysis table and per-run event logs, aligns every
//! run according to the experiment design, and writes one timing file per
//! run.

use super::aligner::{align, align_binned, align_positional};
use super::design::{AlignmentMode, ExperimentDesign};
use super::io::{read_alignment_table, read_event_track, read_ratings, TimingWriter, RATINGS_COLUMN};
use super::record::EventRecord;
use super::table::AlignmentTable;
use crate::errors::AlignmentError;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// What a timing build produced.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TimingReport {
    /// Written timing files, in run order.
    pub files: Vec<PathBuf>,
    /// Total records written.
    pub records: usize,
    /// Records whose amplitude is NaN.
    pub nan_records: usize,
}

/// Builds the timing files of one subject/session.
#[derive(Debug, Clone)]
pub struct TimingBuilder {
    design: ExperimentDesign,
    era_path: PathBuf,
    events_dir: PathBuf,
    output_dir: PathBuf,
    ratings_path: Option<PathBuf>,
    ratings_column: String,
}

impl TimingBuilder {
    /// Creates a builder for `design`.
    #[must_use]
    pub fn new(
        design: ExperimentDesign,
        era_path: impl Into<PathBuf>,
        events_dir: impl Into<PathBuf>,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            design,
            era_path: era_path.into(),
            events_dir: events_dir.into(),
            output_dir: output_dir.into(),
            ratings_path: None,
            ratings_column: RATINGS_COLUMN.to_string(),
        }
    }

    /// Attaches a per-trial ratings file (positional designs only).
    #[must_use]
    pub fn with_ratings(mut self, path: impl Into<PathBuf>) -> Self {
        self.ratings_path = Some(path.into());
        self
    }

    /// Reads ratings from `column` instead of [`RATINGS_COLUMN`].
    #[must_use]
    pub fn with_ratings_column(mut self, column: impl Into<String>) -> Self {
        self.ratings_column = column.into();
        self
    }

    /// The design this builder runs.
    #[must_use]
    pub fn design(&self) -> &ExperimentDesign {
        &self.design
    }

    /// Runs the build.
    ///
    /// # Errors
    ///
    /// Fails when the design is invalid, an input is missing or malformed,
    /// a run's event file cannot be found, or a run slice falls outside the
    /// table.
    pub fn build(&self) -> Result<TimingReport, AlignmentError> {
        let design = &self.design;
        design.validate()?;

        let table = self.load_table()?;
        let ratings = self.load_ratings()?;
        fs::create_dir_all(&self.output_dir)?;

        let rows_per_block = design.rows_per_block();
        let mut report = TimingReport::default();

        for run in 1..=design.runs {
            let events_path = find_event_file(&self.events_dir, &design.events_suffix(run), run)?;
            let track = read_event_track(&events_path)?;
            debug!(run, events = %events_path.display(), onsets = track.len(), "Loaded event track");

            let records = match design.mode {
                AlignmentMode::Aggregate => align(&table, &track, run, &design.event_codes, rows_per_block)?,
                AlignmentMode::Binned { .. } => align_binned(
                    &table,
                    &track,
                    run,
                    &design.event_codes,
                    design.ladder().unwrap_or_default(),
                    rows_per_block,
                )?,
                AlignmentMode::Positional => {
                    let run_ratings = ratings
                        .as_deref()
                        .map(|all| run_chunk(all, run, rows_per_block));
                    align_positional(&table, &track, run, &design.event_codes, rows_per_block, run_ratings)?
                }
            };

            let path = self.write_run(run, &records)?;
            report.records += records.len();
            report.nan_records += records.iter().filter(|r| !r.has_amplitude()).count();
            report.files.push(path);
        }

        info!(
            design = %design.name,
            runs = design.runs,
            records = report.records,
            nan_records = report.nan_records,
            output = %self.output_dir.display(),
            "Timing files written"
        );
        Ok(report)
    }

    fn load_table(&self) -> Result<AlignmentTable, AlignmentError> {
        let design = &self.design;
        let table = read_alignment_table(&self.era_path)?.retain_codes(&design.event_codes);
        let expected = design.expected_rows();

        if table.len() == expected {
            return Ok(table);
        }
        if matches!(design.mode, AlignmentMode::Positional) && table.len() > expected {
            warn!(
                rows = table.len(),
                expected,
                "Alignment table is longer than the design; keeping the trailing rows"
            );
            return Ok(table.tail(expected));
        }
        warn!(
            rows = table.len(),
            expected,
            rows_per_block = design.rows_per_block(),
            runs = design.runs,
            "Alignment table length does not match the design"
        );
        Ok(table)
    }

    fn load_ratings(&self) -> Result<Option<Vec<f64>>, AlignmentError> {
        let Some(path) = &self.ratings_path else {
            return Ok(None);
        };
        if !matches!(self.design.mode, AlignmentMode::Positional) {
            warn!(design = %self.design.name, "Ratings are only attached to positional designs; ignoring");
            return Ok(None);
        }

        let mut ratings = read_ratings(path, &self.ratings_column)?;
        let expected = self.design.expected_rows();
        if ratings.len() != expected {
            warn!(ratings = ratings.len(), expected, "Rating count does not match the design");
            if ratings.len() > expected {
                ratings.drain(..ratings.len() - expected);
            }
        }
        Ok(Some(ratings))
    }

    fn write_run(&self, run: usize, records: &[EventRecord]) -> Result<PathBuf, AlignmentError> {
        let path = self.output_dir.join(self.design.output_file_name(run));
        let mut writer = TimingWriter::create(&path)?;
        writer.write_all(records)?;
        writer.finish()
    }
}

/// The ratings belonging to run `run`, clamped to what exists.
fn run_chunk(ratings: &[f64], run: usize, rows_per_block: usize) -> &[f64] {
    let start = (run - 1).saturating_mul(rows_per_block).min(ratings.len());
    let end = run.saturating_mul(rows_per_block).min(ratings.len());
    &ratings[start..end]
}

/// Finds the first file (in name order) in `dir` whose name ends with `suffix`.
///
/// # Errors
///
/// Fails when the directory cannot be listed or nothing matches.
pub fn find_event_file(dir: &Path, suffix: &str, run: usize) -> Result<PathBuf, AlignmentError> {
    if !dir.is_dir() {
        return Err(AlignmentError::MissingInput(dir.to_path_buf()));
    }
    let mut names: Vec<PathBuf> = fs::read_dir(dir)?
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|name| name.to_str())
                .is_some_and(|name| name.ends_with(suffix))
        })
        .collect();
    names.sort();
    names.into_iter().next().ok_or_else(|| AlignmentError::MissingEventFile {
        run,
        dir: dir.to_path_buf(),
        suffix: suffix.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alignment::io::TimingReader;
    use crate::testing::fixtures::{write_era_table, write_events};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_anticipation_session_writes_one_file_per_run() {
        let dir = tempfile::tempdir().unwrap();
        let design = ExperimentDesign::preset("anticipation").unwrap();
        let era = write_era_table(dir.path(), &design, |i| f64::from(i) + 0.5, 0.5);
        for run in 1..=5 {
            write_events(dir.path(), "sub-01_ses-1", &design, run, &[(81, 12.5), (7, 13.0), (81, 45.2)]);
        }

        let out = dir.path().join("timings");
        let report = TimingBuilder::new(design, &era, dir.path(), &out).build().unwrap();

        assert_eq!(report.files.len(), 5);
        assert_eq!(report.records, 10);
        assert_eq!(report.nan_records, 0);

        let run3 = TimingReader::read(&out.join("anticipation_scr_amplitude_run-3.txt")).unwrap();
        assert_eq!(
            run3,
            vec![
                EventRecord::new(81, 12.5, 80.5),
                EventRecord::new(81, 45.2, 80.5),
            ]
        );
    }

    #[test]
    fn test_missing_event_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let design = ExperimentDesign::preset("image").unwrap();
        let era = write_era_table(dir.path(), &design, |_| 1.0, 0.0);
        write_events(dir.path(), "sub-01_ses-1", &design, 1, &[(31, 2.0)]);

        let err = TimingBuilder::new(design, &era, dir.path(), dir.path().join("out"))
            .build()
            .unwrap_err();
        assert!(matches!(err, AlignmentError::MissingEventFile { run: 2, .. }));
    }

    #[test]
    fn test_short_table_fails_on_uncovered_run() {
        let dir = tempfile::tempdir().unwrap();
        let full = ExperimentDesign::preset("image").unwrap();
        let era = write_era_table(dir.path(), &full.clone().with_runs(1), |_| 1.0, 0.0);
        for run in 1..=2 {
            write_events(dir.path(), "sub-01_ses-1", &full, run, &[(31, 2.0)]);
        }

        let err = TimingBuilder::new(full, &era, dir.path(), dir.path().join("out"))
            .build()
            .unwrap_err();
        assert!(matches!(err, AlignmentError::Partition(_)));
    }

    #[test]
    fn test_pain_keeps_trailing_rows_and_ratings() {
        let dir = tempfile::tempdir().unwrap();
        let design = ExperimentDesign::preset("pain").unwrap().with_runs(1);
        // Two practice rows in front of the six real ones.
        let era = write_era_table(dir.path(), &design.clone().with_runs(2), |i| f64::from(i), 0.0);
        write_events(
            dir.path(),
            "sub-01_ses-1",
            &design,
            1,
            &[(26, 1.0), (46, 2.0), (86, 3.0), (26, 4.0), (46, 5.0), (86, 6.0)],
        );
        let ratings = dir.path().join("sub-01_Pain_ratings.csv");
        fs::write(&ratings, "Trial,Pain\n1,9\n2,9\n3,1\n4,2\n5,3\n6,4\n7,5\n8,6\n").unwrap();

        let out = dir.path().join("out");
        TimingBuilder::new(design, &era, dir.path(), &out)
            .with_ratings(&ratings)
            .build()
            .unwrap();

        let records = TimingReader::read(&out.join("pain_scr_amplitude_run-1.txt")).unwrap();
        assert_eq!(records.len(), 6);
        // The table held 12 rows; the trailing six are rows 6..12.
        // Ratings are trimmed the same way: the two leading 9s are dropped.
        assert_eq!(records[0], EventRecord::new(26, 1.0, 6.0).with_rating(1.0));
        assert_eq!(records[1], EventRecord::new(46, 2.0, 7.0).with_rating(2.0));
        assert_eq!(records[5].rating, Some(6.0));
    }

    #[test]
    fn test_pain_without_ratings_writes_zero_rating_column() {
        let dir = tempfile::tempdir().unwrap();
        let design = ExperimentDesign::preset("pain").unwrap().with_runs(1);
        let era = write_era_table(dir.path(), &design, |_| 2.0, 0.5);
        write_events(
            dir.path(),
            "sub-01_ses-1",
            &design,
            1,
            &[(26, 1.0), (46, 2.0), (86, 3.0), (26, 4.0), (46, 5.0), (86, 6.0)],
        );

        let out = dir.path().join("out");
        TimingBuilder::new(design, &era, dir.path(), &out).build().unwrap();

        let path = out.join("pain_scr_amplitude_run-1.txt");
        let text = fs::read_to_string(&path).unwrap();
        assert!(text.lines().all(|line| line.split('\t').count() == 4));
        assert!(text.starts_with("26\t1.0\t1.5\t0.0\n"));
        let records = TimingReader::read(&path).unwrap();
        assert!(records.iter().all(|r| r.rating == Some(0.0)));
    }

    #[test]
    fn test_find_event_file_takes_first_sorted_match() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("sub-02_task-tim_run-1_events.tsv"), "").unwrap();
        fs::write(dir.path().join("sub-01_task-tim_run-1_events.tsv"), "").unwrap();
        fs::write(dir.path().join("sub-01_task-tim_run-11_events.tsv"), "").unwrap();

        let found = find_event_file(dir.path(), "task-tim_run-1_events.tsv", 1).unwrap();
        assert_eq!(found.file_name().unwrap(), "sub-01_task-tim_run-1_events.tsv");
    }
}
