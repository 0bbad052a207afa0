//! Tab-separated readers and writers shared by every stage that touches
//! timing data.
//!
//! Timing files are positional and header-less (`event_code`, `onset_time`,
//! `amplitude`, plus `rating` for positional designs), so producer and consumers go through the
//! same [`TimingWriter`] / [`TimingReader`] pair. NaN values are written as
//! empty fields.

use super::record::{EventCode, EventRecord};
use super::table::{AlignmentRow, AlignmentTable};
use super::track::{EventOnset, EventTrack};
use crate::errors::AlignmentError;
use serde::Deserialize;
use std::fs::File;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize)]
struct EraRow {
    #[serde(rename = "Event.Name")]
    event_name: String,
    #[serde(rename = "Global.Mean", default, deserialize_with = "csv::invalid_option")]
    global_mean: Option<f64>,
    #[serde(rename = "CDA.Tonic", default, deserialize_with = "csv::invalid_option")]
    tonic: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct EventRow {
    #[serde(default, deserialize_with = "csv::invalid_option")]
    onset: Option<f64>,
    condition: String,
}

fn tsv_reader(path: &Path, has_headers: bool) -> Result<csv::Reader<File>, AlignmentError> {
    if !path.exists() {
        return Err(AlignmentError::MissingInput(path.to_path_buf()));
    }
    csv::ReaderBuilder::new()
        .delimiter(b'\t')
        .has_headers(has_headers)
        .flexible(true)
        .from_path(path)
        .map_err(|e| AlignmentError::table(path, &e))
}

/// Parses an event code written either as an integer or as an integral float.
#[must_use]
pub fn parse_event_code(raw: &str) -> Option<EventCode> {
    let raw = raw.trim();
    raw.parse::<EventCode>().ok().or_else(|| {
        raw.parse::<f64>()
            .ok()
            .filter(|v| v.is_finite() && v.fract() == 0.0)
            .map(|v| v as EventCode)
    })
}

/// Reads a Ledalab event-related analysis export.
///
/// Rows whose event name is not an integer code are dropped; missing
/// numeric cells become NaN.
///
/// # Errors
///
/// Fails when the file is missing or its header lacks the required columns.
pub fn read_alignment_table(path: &Path) -> Result<AlignmentTable, AlignmentError> {
    let mut reader = tsv_reader(path, true)?;
    let mut rows = Vec::new();
    for result in reader.deserialize::<EraRow>() {
        let row = result.map_err(|e| AlignmentError::table(path, &e))?;
        if let Some(code) = parse_event_code(&row.event_name) {
            rows.push(AlignmentRow::new(
                code,
                row.global_mean.unwrap_or(f64::NAN),
                row.tonic.unwrap_or(f64::NAN),
            ));
        }
    }
    Ok(AlignmentTable::new(rows))
}

/// Reads a BIDS `_events.tsv` file into an [`EventTrack`].
///
/// # Errors
///
/// Fails when the file is missing or lacks `onset`/`condition` columns.
pub fn read_event_track(path: &Path) -> Result<EventTrack, AlignmentError> {
    let mut reader = tsv_reader(path, true)?;
    let mut onsets = Vec::new();
    for result in reader.deserialize::<EventRow>() {
        let row = result.map_err(|e| AlignmentError::table(path, &e))?;
        if let (Some(onset), Some(code)) = (row.onset, parse_event_code(&row.condition)) {
            onsets.push(EventOnset::new(code, onset));
        }
    }
    Ok(EventTrack::new(onsets))
}

/// Column holding the per-trial rating in a ratings export.
pub const RATINGS_COLUMN: &str = "Pain";

/// Reads the `column` of a comma-separated ratings export with a header row.
///
/// Rows keep their position: an empty cell becomes NaN.
///
/// # Errors
///
/// Fails when the file is missing, lacks `column`, or a cell is not a number.
pub fn read_ratings(path: &Path, column: &str) -> Result<Vec<f64>, AlignmentError> {
    if !path.exists() {
        return Err(AlignmentError::MissingInput(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| AlignmentError::table(path, &e))?;
    let index = reader
        .headers()
        .map_err(|e| AlignmentError::table(path, &e))?
        .iter()
        .position(|header| header == column)
        .ok_or_else(|| AlignmentError::Table {
            path: path.to_path_buf(),
            reason: format!("missing column '{column}'"),
        })?;

    let mut ratings = Vec::new();
    for result in reader.records() {
        let record = result.map_err(|e| AlignmentError::table(path, &e))?;
        let field = record.get(index).unwrap_or_default();
        let value = parse_field(field).ok_or_else(|| AlignmentError::Table {
            path: path.to_path_buf(),
            reason: format!("rating '{field}' is not a number"),
        })?;
        ratings.push(value);
    }
    Ok(ratings)
}

/// Formats a float the way the downstream modeling scripts expect:
/// integral values keep a trailing `.0`, NaN is an empty field.
#[must_use]
pub fn format_float(value: f64) -> String {
    if value.is_nan() {
        String::new()
    } else if value.is_finite() && value.fract() == 0.0 && value.abs() < 1e16 {
        format!("{value:.1}")
    } else {
        format!("{value}")
    }
}

/// Writes header-less timing files.
pub struct TimingWriter {
    path: PathBuf,
    writer: csv::Writer<File>,
}

impl TimingWriter {
    /// Creates (or truncates) a timing file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be created.
    pub fn create(path: impl Into<PathBuf>) -> Result<Self, AlignmentError> {
        let path = path.into();
        let writer = csv::WriterBuilder::new()
            .delimiter(b'\t')
            .has_headers(false)
            .flexible(true)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_path(&path)
            .map_err(|e| AlignmentError::table(&path, &e))?;
        Ok(Self { path, writer })
    }

    /// Appends one record.
    ///
    /// # Errors
    ///
    /// Fails on write errors.
    pub fn write(&mut self, record: &EventRecord) -> Result<(), AlignmentError> {
        let mut fields = vec![
            record.event_code.to_string(),
            format_float(record.onset_time),
            format_float(record.amplitude),
        ];
        if let Some(rating) = record.rating {
            fields.push(format_float(rating));
        }
        self.writer
            .write_record(&fields)
            .map_err(|e| AlignmentError::table(&self.path, &e))
    }

    /// Appends all records in order.
    ///
    /// # Errors
    ///
    /// Fails on write errors.
    pub fn write_all<'a>(
        &mut self,
        records: impl IntoIterator<Item = &'a EventRecord>,
    ) -> Result<(), AlignmentError> {
        for record in records {
            self.write(record)?;
        }
        Ok(())
    }

    /// Flushes and closes the file, returning its path.
    ///
    /// # Errors
    ///
    /// Fails when the flush fails.
    pub fn finish(mut self) -> Result<PathBuf, AlignmentError> {
        self.writer.flush()?;
        Ok(self.path)
    }
}

impl std::fmt::Debug for TimingWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimingWriter").field("path", &self.path).finish()
    }
}

/// Reads header-less timing files produced by [`TimingWriter`].
#[derive(Debug)]
pub struct TimingReader;

impl TimingReader {
    /// Reads every record of a timing file.
    ///
    /// # Errors
    ///
    /// Fails when the file is missing or a row is malformed.
    pub fn read(path: &Path) -> Result<Vec<EventRecord>, AlignmentError> {
        let mut reader = tsv_reader(path, false)?;
        let mut records = Vec::new();
        for (line, result) in reader.records().enumerate() {
            let row = result.map_err(|e| AlignmentError::table(path, &e))?;
            let malformed = |what: &str| AlignmentError::Table {
                path: path.to_path_buf(),
                reason: format!("line {}: {what}", line + 1),
            };

            let code = row
                .get(0)
                .and_then(parse_event_code)
                .ok_or_else(|| malformed("bad event code"))?;
            let onset = row
                .get(1)
                .and_then(parse_field)
                .filter(|v| !v.is_nan())
                .ok_or_else(|| malformed("bad onset time"))?;
            let amplitude = row
                .get(2)
                .and_then(parse_field)
                .ok_or_else(|| malformed("bad amplitude"))?;

            let mut record = EventRecord::new(code, onset, amplitude);
            if let Some(rating) = row.get(3).and_then(parse_field) {
                record = record.with_rating(rating);
            }
            records.push(record);
        }
        Ok(records)
    }
}

fn parse_field(raw: &str) -> Option<f64> {
    let raw = raw.trim();
    if raw.is_empty() {
        Some(f64::NAN)
    } else {
        raw.parse().ok()
    }
}
