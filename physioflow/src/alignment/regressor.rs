//! Per-volume magnitude regressors built from binned timing files.

use super::io::{format_float, TimingReader};
use super::record::EventRecord;
use crate::errors::AlignmentError;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tracing::{info, warn};

/// Acquisition parameters of the functional run a regressor is built for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Acquisition {
    /// Seconds removed from every onset before binning.
    pub lag: f64,
    /// Volumes acquired without any lag.
    pub volumes: usize,
    /// Repetition time in seconds.
    pub tr: f64,
}

impl Default for Acquisition {
    fn default() -> Self {
        Self {
            lag: 0.0,
            volumes: 300,
            tr: 2.0,
        }
    }
}

impl Acquisition {
    /// Volumes left once the lagged leading volumes are dropped.
    #[must_use]
    pub fn effective_volumes(&self) -> usize {
        let dropped = (self.lag / self.tr).floor();
        if dropped <= 0.0 {
            return self.volumes;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let dropped = dropped as usize;
        self.volumes.saturating_sub(dropped)
    }
}

/// Places each record's amplitude in the volume its lag-shifted onset falls
/// into. Later records overwrite earlier ones in the same volume; onsets at
/// or before zero are dropped.
#[must_use]
pub fn magnitude_series(records: &[EventRecord], acquisition: Acquisition) -> Vec<Option<f64>> {
    let mut series = vec![None; acquisition.effective_volumes()];
    for record in records {
        let time = record.onset_time - acquisition.lag;
        if time <= 0.0 {
            continue;
        }
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let volume = (time / acquisition.tr).floor() as usize;
        match series.get_mut(volume) {
            Some(slot) => *slot = Some(record.amplitude),
            None => warn!(
                onset = record.onset_time,
                volume,
                volumes = series.len(),
                "Onset falls after the last volume; ignoring"
            ),
        }
    }
    series
}

/// Reads a timing file and writes its magnitude regressor, one value per line.
///
/// # Errors
///
/// Fails when the timing file cannot be read or the output cannot be written.
pub fn write_regressor(
    timing_path: &Path,
    output_path: &Path,
    acquisition: Acquisition,
) -> Result<usize, AlignmentError> {
    if !(acquisition.tr.is_finite() && acquisition.tr > 0.0) {
        return Err(AlignmentError::Design(format!("TR must be positive, got {}", acquisition.tr)));
    }
    let records = TimingReader::read(timing_path)?;
    let series = magnitude_series(&records, acquisition);

    let mut out = BufWriter::new(File::create(output_path)?);
    for value in &series {
        let line = match value {
            None => "0".to_string(),
            Some(v) if v.is_nan() => "nan".to_string(),
            Some(v) => format_float(*v),
        };
        writeln!(out, "{line}")?;
    }
    out.flush()?;

    info!(
        timing = %timing_path.display(),
        output = %output_path.display(),
        volumes = series.len(),
        "Regressor written"
    );
    Ok(series.len())
}
