//! What a runner is asked to do.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One stage for one subject/session.
///
/// `stage` is kept as the raw name so that an unknown stage can be reported
/// as a failed outcome rather than rejected before it reaches the runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageRequest {
    /// Stage name.
    pub stage: String,
    /// Subject id.
    pub subject: String,
    /// Session id.
    pub session: String,
    /// Analysis for modeling stages.
    pub analysis: Option<String>,
    /// Arguments appended after the common ones.
    pub extra_args: Vec<String>,
}

impl StageRequest {
    /// Creates a request without analysis or extra arguments.
    #[must_use]
    pub fn new(stage: impl Into<String>, subject: impl Into<String>, session: impl Into<String>) -> Self {
        Self {
            stage: stage.into(),
            subject: subject.into(),
            session: session.into(),
            analysis: None,
            extra_args: Vec::new(),
        }
    }

    /// Sets the analysis name.
    #[must_use]
    pub fn with_analysis(mut self, analysis: impl Into<String>) -> Self {
        self.analysis = Some(analysis.into());
        self
    }

    /// Sets the extra arguments.
    #[must_use]
    pub fn with_extra_args(mut self, args: Vec<String>) -> Self {
        self.extra_args = args;
        self
    }

    /// Log file name: `<subject>_ses-<session>_<stage>[_<analysis>].log`.
    #[must_use]
    pub fn log_file_name(&self) -> String {
        match &self.analysis {
            Some(analysis) => format!("{}_ses-{}_{}_{analysis}.log", self.subject, self.session, self.stage),
            None => format!("{}_ses-{}_{}.log", self.subject, self.session, self.stage),
        }
    }
}

/// A fully resolved external process launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Invocation {
    /// Stage label reported in the outcome.
    pub stage: String,
    /// Subject label reported in the outcome.
    pub subject: String,
    /// Session label reported in the outcome.
    pub session: String,
    /// Analysis label reported in the outcome.
    pub analysis: Option<String>,
    /// Program to execute.
    pub program: String,
    /// Program arguments.
    pub args: Vec<String>,
    /// Working directory; inherited when unset.
    pub cwd: Option<PathBuf>,
    /// File receiving combined stdout/stderr, truncated first.
    pub log_path: PathBuf,
}

impl Invocation {
    /// Creates an invocation of `program` logging to `log_path`.
    #[must_use]
    pub fn new(stage: impl Into<String>, program: impl Into<String>, log_path: impl Into<PathBuf>) -> Self {
        Self {
            stage: stage.into(),
            subject: String::new(),
            session: String::new(),
            analysis: None,
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            log_path: log_path.into(),
        }
    }

    /// Sets the subject and session labels.
    #[must_use]
    pub fn for_unit(mut self, subject: impl Into<String>, session: impl Into<String>) -> Self {
        self.subject = subject.into();
        self.session = session.into();
        self
    }

    /// Sets the analysis label.
    #[must_use]
    pub fn with_analysis(mut self, analysis: Option<String>) -> Self {
        self.analysis = analysis;
        self
    }

    /// Appends one argument.
    #[must_use]
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends arguments.
    #[must_use]
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Sets the working directory.
    #[must_use]
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    /// The command line as a single string, for logs.
    #[must_use]
    pub fn command_line(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }
}
