//! The block-partitioned physiological analysis table.

use super::record::EventCode;
use serde::{Deserialize, Serialize};

/// One analysis window of the physiological recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AlignmentRow {
    /// Event code the window was locked to.
    pub event_code: EventCode,
    /// Mean phasic activity over the window.
    pub global_mean: f64,
    /// Tonic baseline over the window.
    pub tonic_baseline: f64,
}

impl AlignmentRow {
    /// Creates a new row.
    #[must_use]
    pub fn new(event_code: EventCode, global_mean: f64, tonic_baseline: f64) -> Self {
        Self {
            event_code,
            global_mean,
            tonic_baseline,
        }
    }

    /// Activity above baseline for this window.
    #[must_use]
    pub fn response(&self) -> f64 {
        self.global_mean - self.tonic_baseline
    }
}

/// Ordered rows in recording order.
///
/// There is no run identifier: rows of one run form one contiguous slice
/// whose position is computed from the experiment design. If the producing
/// tool reorders or drops rows, alignment shifts silently.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AlignmentTable {
    rows: Vec<AlignmentRow>,
}

impl AlignmentTable {
    /// Creates a table from rows in recording order.
    #[must_use]
    pub fn new(rows: Vec<AlignmentRow>) -> Self {
        Self { rows }
    }

    /// Returns the number of rows.
    #[must_use]
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Returns true if the table has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Returns all rows.
    #[must_use]
    pub fn rows(&self) -> &[AlignmentRow] {
        &self.rows
    }

    /// Returns a new table holding only rows whose code is tracked, order preserved.
    #[must_use]
    pub fn retain_codes(&self, codes: &[EventCode]) -> Self {
        Self {
            rows: self
                .rows
                .iter()
                .filter(|row| codes.contains(&row.event_code))
                .copied()
                .collect(),
        }
    }

    /// Returns a new table with only the last `count` rows.
    #[must_use]
    pub fn tail(&self, count: usize) -> Self {
        let start = self.rows.len().saturating_sub(count);
        Self {
            rows: self.rows[start..].to_vec(),
        }
    }

    /// Rows in `[start, end)`. Callers obtain the bounds from
    /// [`slice_bounds`](super::slice_bounds), which guarantees they are in range.
    #[must_use]
    pub fn slice(&self, start: usize, end: usize) -> &[AlignmentRow] {
        &self.rows[start..end]
    }
}

impl FromIterator<AlignmentRow> for AlignmentTable {
    fn from_iter<T: IntoIterator<Item = AlignmentRow>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}
