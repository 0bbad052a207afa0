//! Core domain model types for physioflow.
//!
//! This module contains the types shared by the stage runner, the subject
//! pipeline and the orchestrator:
//! - Stage status enum
//! - Stage outcome record

mod outcome;
mod status;

pub use outcome::StageOutcome;
pub use status::StageStatus;
