//! Aligned event records.

use serde::{Deserialize, Serialize};

/// Integer identifier for a category of behavioral/physiological event.
pub type EventCode = i64;

/// Number of decimals amplitudes are rounded to.
pub const AMPLITUDE_DECIMALS: i32 = 2;

/// One aligned occurrence: an event onset paired with a physiological amplitude.
///
/// The amplitude may be NaN when the underlying rows were missing or
/// non-finite. Such records are kept so downstream consumers can detect
/// and filter them.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventRecord {
    /// Event code.
    pub event_code: EventCode,
    /// Onset time in seconds.
    pub onset_time: f64,
    /// Response amplitude.
    pub amplitude: f64,
    /// Per-trial rating, only produced by positional alignment.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rating: Option<f64>,
}

impl EventRecord {
    /// Creates a record without a rating.
    #[must_use]
    pub fn new(event_code: EventCode, onset_time: f64, amplitude: f64) -> Self {
        Self {
            event_code,
            onset_time,
            amplitude,
            rating: None,
        }
    }

    /// Attaches a rating.
    #[must_use]
    pub fn with_rating(mut self, rating: f64) -> Self {
        self.rating = Some(rating);
        self
    }

    /// Returns true if the amplitude is usable.
    #[must_use]
    pub fn has_amplitude(&self) -> bool {
        !self.amplitude.is_nan()
    }
}

/// Rounds an amplitude to [`AMPLITUDE_DECIMALS`] places, ties to even.
///
/// Matches the scale-round-unscale behaviour of numpy's `round`, so
/// `0.125` becomes `0.12` and `0.375` becomes `0.38`.
#[must_use]
pub fn round_amplitude(value: f64) -> f64 {
    let scale = 10f64.powi(AMPLITUDE_DECIMALS);
    (value * scale).round_ties_even() / scale
}

/// Arithmetic mean; NaN for an empty slice.
#[must_use]
pub fn mean(values: impl IntoIterator<Item = f64>) -> f64 {
    let (sum, count) = values
        .into_iter()
        .fold((0.0, 0usize), |(sum, count), v| (sum + v, count + 1));
    if count == 0 {
        f64::NAN
    } else {
        sum / count as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_amplitude_ties_to_even() {
        assert!((round_amplitude(0.125) - 0.12).abs() < 1e-12);
        assert!((round_amplitude(0.375) - 0.38).abs() < 1e-12);
        assert!((round_amplitude(-1.234) + 1.23).abs() < 1e-12);
    }

    #[test]
    fn test_round_amplitude_keeps_nan() {
        assert!(round_amplitude(f64::NAN).is_nan());
    }

    #[test]
    fn test_mean_of_empty_is_nan() {
        assert!(mean(Vec::<f64>::new()).is_nan());
        assert!((mean([1.0, 2.0, 6.0]) - 3.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_record_nan_detection() {
        let record = EventRecord::new(81, 12.5, f64::NAN);
        assert!(!record.has_amplitude());
        assert!(EventRecord::new(81, 12.5, 0.3).has_amplitude());
    }
}
