//! Per-subject stages and the runners that execute them.
//!
//! A stage is an external script identified by a [`StageName`]. A
//! [`StageRunner`] turns a [`StageRequest`] into a process launch and
//! reports a [`StageOutcome`](crate::core::StageOutcome); it never returns
//! an error.

mod catalog;
mod request;
mod runner;

pub use catalog::{ExtraArgs, StageConfig, StageName, GROUP_SCRIPT};
pub use request::{Invocation, StageRequest};
pub use runner::{run_process, ScriptRunner, StageRunner};

#[cfg(test)]
pub use runner::MockStageRunner;
