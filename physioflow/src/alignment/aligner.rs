//! Event timing alignment.
//!
//! Every function here is pure apart from logging: the same table, track
//! and run index always produce the same records in the same order. The
//! table passed in must already be restricted to the design's tracked
//! codes, otherwise the run slices land on the wrong rows.

use super::partition::{slice_bounds, Ladder};
use super::record::{mean, round_amplitude, EventCode, EventRecord};
use super::table::{AlignmentRow, AlignmentTable};
use super::track::EventTrack;
use crate::errors::PartitionError;
use tracing::warn;

/// Aggregate alignment: one amplitude per tracked code per run, paired with
/// every onset of that code in the run.
///
/// Records come out grouped by code (in `event_codes` order) and, within a
/// code, in track order.
///
/// # Errors
///
/// Fails when the run slice is out of range.
pub fn align(
    table: &AlignmentTable,
    track: &EventTrack,
    run_index: usize,
    event_codes: &[EventCode],
    rows_per_block: usize,
) -> Result<Vec<EventRecord>, PartitionError> {
    let block = run_block(table, run_index, rows_per_block)?;

    let mut records = Vec::new();
    for &code in event_codes {
        let amplitude = block_amplitude(block, code, run_index);
        records.extend(
            track
                .times_for(code)
                .map(|time| EventRecord::new(code, time, amplitude)),
        );
    }
    Ok(records)
}

/// Binned alignment: each onset of a block-start code expands to a ladder of
/// sub-onsets, all carrying the code's aggregate run amplitude.
///
/// # Errors
///
/// Fails when the run slice is out of range.
pub fn align_binned(
    table: &AlignmentTable,
    track: &EventTrack,
    run_index: usize,
    start_codes: &[EventCode],
    ladder: Ladder,
    rows_per_block: usize,
) -> Result<Vec<EventRecord>, PartitionError> {
    let block = run_block(table, run_index, rows_per_block)?;

    let mut records = Vec::new();
    for &code in start_codes {
        let amplitude = block_amplitude(block, code, run_index);
        records.extend(
            track
                .times_for(code)
                .flat_map(|onset| ladder.expand(onset))
                .map(|time| EventRecord::new(code, time, amplitude)),
        );
    }
    Ok(records)
}

/// Rating written for positional records when no ratings file is given.
pub const DEFAULT_RATING: f64 = 0.0;

/// Positional alignment: the n-th tracked onset of the run is paired with
/// the n-th row of the run slice.
///
/// When the counts differ a warning is logged and only the shorter length
/// is emitted. This can hide a misaligned recording; it is kept as-is
/// until someone confirms what the data should look like.
///
/// `ratings` holds the run's per-trial ratings in the same order; missing
/// entries become NaN. Without ratings every record carries a rating of
/// [`DEFAULT_RATING`], so positional timing files always have four columns.
///
/// # Errors
///
/// Fails when the run slice is out of range.
pub fn align_positional(
    table: &AlignmentTable,
    track: &EventTrack,
    run_index: usize,
    event_codes: &[EventCode],
    rows_per_block: usize,
    ratings: Option<&[f64]>,
) -> Result<Vec<EventRecord>, PartitionError> {
    let block = run_block(table, run_index, rows_per_block)?;
    let rows: Vec<&AlignmentRow> = block
        .iter()
        .filter(|row| event_codes.contains(&row.event_code))
        .collect();
    let onsets: Vec<_> = track.tracked(event_codes).collect();

    if rows.len() != onsets.len() {
        warn!(
            run = run_index,
            rows = rows.len(),
            onsets = onsets.len(),
            "Row/onset count mismatch; pairing by position on the shorter length"
        );
    }

    let records = onsets
        .iter()
        .zip(rows.iter())
        .enumerate()
        .map(|(i, (onset, row))| {
            let amplitude = round_amplitude(row.response());
            if amplitude.is_nan() {
                warn!(run = run_index, event_code = onset.event_code, position = i, "NaN amplitude found");
            }
            let record = EventRecord::new(onset.event_code, onset.onset_time, amplitude);
            match ratings {
                Some(ratings) => record.with_rating(ratings.get(i).copied().unwrap_or(f64::NAN)),
                None => record.with_rating(DEFAULT_RATING),
            }
        })
        .collect();
    Ok(records)
}

fn run_block(
    table: &AlignmentTable,
    run_index: usize,
    rows_per_block: usize,
) -> Result<&[AlignmentRow], PartitionError> {
    let (start, end) = slice_bounds(run_index, rows_per_block, table.len())?;
    Ok(table.slice(start, end))
}

fn block_amplitude(block: &[AlignmentRow], code: EventCode, run_index: usize) -> f64 {
    let amplitude = round_amplitude(mean(
        block
            .iter()
            .filter(|row| row.event_code == code)
            .map(AlignmentRow::response),
    ));
    if amplitude.is_nan() {
        warn!(run = run_index, event_code = code, "NaN amplitude found");
    }
    amplitude
}
