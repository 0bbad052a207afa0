//! Event timing alignment.
//!
//! Pairs behavioral event onsets with physiological response amplitudes
//! taken from a block-partitioned analysis table:
//! - [`AlignmentTable`] / [`EventTrack`] inputs
//! - [`slice_bounds`] / [`expand_ladder`] partition arithmetic
//! - [`align`], [`align_positional`], [`align_binned`] variants
//! - [`TimingBuilder`] for a whole session, [`TimingWriter`] / [`TimingReader`]
//!   for the interchange files
//! - [`write_regressor`] for per-volume magnitude series

mod aligner;
mod design;
pub mod io;
mod partition;
mod record;
mod regressor;
mod table;
mod timing;
mod track;

pub use aligner::{align, align_binned, align_positional, DEFAULT_RATING};
pub use design::{AlignmentMode, ExperimentDesign, PRESET_NAMES};
pub use io::{TimingReader, TimingWriter, RATINGS_COLUMN};
pub use partition::{expand_ladder, slice_bounds, Ladder};
pub use record::{mean, round_amplitude, EventCode, EventRecord, AMPLITUDE_DECIMALS};
pub use regressor::{magnitude_series, write_regressor, Acquisition};
pub use table::{AlignmentRow, AlignmentTable};
pub use timing::{find_event_file, TimingBuilder, TimingReport};
pub use track::{EventOnset, EventTrack};
