//! Behavioral event onsets for one run.

use super::record::EventCode;
use serde::{Deserialize, Serialize};

/// A single behavioral event occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EventOnset {
    /// Event code.
    pub event_code: EventCode,
    /// Onset in seconds from run start.
    pub onset_time: f64,
}

impl EventOnset {
    /// Creates a new onset.
    #[must_use]
    pub fn new(event_code: EventCode, onset_time: f64) -> Self {
        Self {
            event_code,
            onset_time,
        }
    }
}

/// The ordered event log of one (subject, session, run).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventTrack {
    onsets: Vec<EventOnset>,
}

impl EventTrack {
    /// Creates a track from onsets in log order.
    #[must_use]
    pub fn new(onsets: Vec<EventOnset>) -> Self {
        Self { onsets }
    }

    /// Returns all onsets.
    #[must_use]
    pub fn onsets(&self) -> &[EventOnset] {
        &self.onsets
    }

    /// Returns the number of onsets.
    #[must_use]
    pub fn len(&self) -> usize {
        self.onsets.len()
    }

    /// Returns true if the track is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.onsets.is_empty()
    }

    /// Onset times of one code, in log order.
    pub fn times_for(&self, code: EventCode) -> impl Iterator<Item = f64> + '_ {
        self.onsets
            .iter()
            .filter(move |o| o.event_code == code)
            .map(|o| o.onset_time)
    }

    /// Onsets whose code is tracked, in log order.
    pub fn tracked<'a>(&'a self, codes: &'a [EventCode]) -> impl Iterator<Item = &'a EventOnset> + 'a {
        self.onsets
            .iter()
            .filter(move |o| codes.contains(&o.event_code))
    }
}

impl FromIterator<EventOnset> for EventTrack {
    fn from_iter<T: IntoIterator<Item = EventOnset>>(iter: T) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_times_for_keeps_log_order() {
        let track: EventTrack = vec![
            EventOnset::new(81, 45.2),
            EventOnset::new(21, 3.0),
            EventOnset::new(81, 12.5),
        ]
        .into_iter()
        .collect();

        let times: Vec<_> = track.times_for(81).collect();
        assert_eq!(times, vec![45.2, 12.5]);
        assert_eq!(track.tracked(&[21]).count(), 1);
    }
}
