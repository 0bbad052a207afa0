//! Block partitioning: run slice arithmetic and onset ladders.

use crate::errors::PartitionError;
use serde::{Deserialize, Serialize};

/// Returns the `[start, end)` row range of run `run_index` (1-based).
///
/// # Errors
///
/// Fails when `run_index` is zero, `rows_per_block` is zero, or the slice
/// would run past `total_rows`.
pub fn slice_bounds(
    run_index: usize,
    rows_per_block: usize,
    total_rows: usize,
) -> Result<(usize, usize), PartitionError> {
    if run_index == 0 {
        return Err(PartitionError::ZeroRunIndex);
    }
    if rows_per_block == 0 {
        return Err(PartitionError::EmptyBlock);
    }

    let start = rows_per_block * (run_index - 1);
    let end = rows_per_block * run_index;
    if end > total_rows {
        return Err(PartitionError::OutOfBounds {
            run_index,
            start,
            end,
            total_rows,
        });
    }
    Ok((start, end))
}

/// Expands one block-start onset into `ladder_size` evenly spaced sub-onsets.
#[must_use]
pub fn expand_ladder(onset_time: f64, ladder_size: usize, step: f64) -> Vec<f64> {
    (0..ladder_size)
        .map(|j| onset_time + j as f64 * step)
        .collect()
}

/// Shape of the sub-onset ladder used by binned alignment.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Ladder {
    /// Sub-onsets per real onset.
    pub size: usize,
    /// Spacing between sub-onsets in seconds.
    pub step: f64,
}

impl Ladder {
    /// Creates a ladder.
    #[must_use]
    pub fn new(size: usize, step: f64) -> Self {
        Self { size, step }
    }

    /// Expands one onset.
    #[must_use]
    pub fn expand(&self, onset_time: f64) -> Vec<f64> {
        expand_ladder(onset_time, self.size, self.step)
    }
}

impl Default for Ladder {
    fn default() -> Self {
        Self { size: 11, step: 2.0 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_slice_bounds_formula() {
        assert_eq!(slice_bounds(1, 30, 150), Ok((0, 30)));
        assert_eq!(slice_bounds(3, 30, 150), Ok((60, 90)));
        assert_eq!(slice_bounds(5, 30, 150), Ok((120, 150)));
    }

    #[test]
    fn test_slice_bounds_overflow_fails() {
        assert_eq!(
            slice_bounds(6, 30, 150),
            Err(PartitionError::OutOfBounds {
                run_index: 6,
                start: 150,
                end: 180,
                total_rows: 150,
            })
        );
        assert!(slice_bounds(2, 30, 59).is_err());
    }

    #[test]
    fn test_slice_bounds_rejects_degenerate_input() {
        assert_eq!(slice_bounds(0, 30, 150), Err(PartitionError::ZeroRunIndex));
        assert_eq!(slice_bounds(1, 0, 150), Err(PartitionError::EmptyBlock));
    }

    #[test]
    fn test_expand_ladder_eleven_steps() {
        let t0 = 7.5;
        let ladder = expand_ladder(t0, 11, 2.0);
        let expected: Vec<f64> = (0..11).map(|j| t0 + 2.0 * f64::from(j)).collect();

        assert_eq!(ladder.len(), 11);
        assert_eq!(ladder, expected);
        assert_eq!(ladder.first(), Some(&7.5));
        assert_eq!(ladder.last(), Some(&27.5));
    }

    #[test]
    fn test_default_ladder() {
        assert_eq!(Ladder::default().expand(0.0).len(), 11);
    }
}
