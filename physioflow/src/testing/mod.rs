//! Testing utilities for physioflow.
//!
//! This module provides:
//! - A recording stage runner with scripted failures
//! - Input file fixtures (alignment tables, event logs, group artifacts)

pub mod fixtures;
mod mocks;

pub use mocks::MockRunner;

use crate::config::{SessionConfig, SubjectConfig, SubjectSessionContext};

/// Context of a roster entry holding just `session`.
#[must_use]
pub fn context(subject: &str, session: &SessionConfig) -> SubjectSessionContext {
    SubjectConfig::new(subject)
        .with_session(session.clone())
        .context(session)
}
