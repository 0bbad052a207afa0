//! Site configuration: directories, tools and the subject roster.

use super::read_config_file;
use crate::errors::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Top-level settings loaded from `main_config.toml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Root of the raw per-subject data.
    pub input_dir: PathBuf,
    /// Root every stage writes into.
    pub output_dir: PathBuf,
    /// Directory holding the stage scripts.
    #[serde(default = "PipelineConfig::default_scripts_dir")]
    pub scripts_dir: PathBuf,
    /// Directory stage logs are written to.
    #[serde(default = "PipelineConfig::default_log_dir")]
    pub log_dir: PathBuf,
    /// Interpreter the stage scripts are run with.
    #[serde(default = "PipelineConfig::default_shell")]
    pub shell: String,
    /// Binary that intersects subject masks into a group mask.
    #[serde(default = "PipelineConfig::default_mask_tool")]
    pub mask_tool: String,
    /// Fraction of subjects a voxel must be in to survive the group mask.
    #[serde(default = "PipelineConfig::default_mask_fraction")]
    pub mask_fraction: f64,
    /// Subject roster.
    #[serde(default)]
    pub subjects: Vec<SubjectConfig>,
}

impl PipelineConfig {
    fn default_scripts_dir() -> PathBuf {
        PathBuf::from("scripts")
    }
    fn default_log_dir() -> PathBuf {
        PathBuf::from("logs")
    }
    fn default_shell() -> String {
        "bash".to_string()
    }
    fn default_mask_tool() -> String {
        "3dmask_tool".to_string()
    }
    fn default_mask_fraction() -> f64 {
        0.4
    }

    /// Creates a configuration with default tooling and an empty roster.
    #[must_use]
    pub fn new(input_dir: impl Into<PathBuf>, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            input_dir: input_dir.into(),
            output_dir: output_dir.into(),
            scripts_dir: Self::default_scripts_dir(),
            log_dir: Self::default_log_dir(),
            shell: Self::default_shell(),
            mask_tool: Self::default_mask_tool(),
            mask_fraction: Self::default_mask_fraction(),
            subjects: Vec::new(),
        }
    }

    /// Sets the scripts directory.
    #[must_use]
    pub fn with_scripts_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.scripts_dir = dir.into();
        self
    }

    /// Sets the log directory.
    #[must_use]
    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = dir.into();
        self
    }

    /// Sets the shell.
    #[must_use]
    pub fn with_shell(mut self, shell: impl Into<String>) -> Self {
        self.shell = shell.into();
        self
    }

    /// Sets the mask tool.
    #[must_use]
    pub fn with_mask_tool(mut self, tool: impl Into<String>) -> Self {
        self.mask_tool = tool.into();
        self
    }

    /// Adds a subject to the roster.
    #[must_use]
    pub fn with_subject(mut self, subject: SubjectConfig) -> Self {
        self.subjects.push(subject);
        self
    }

    /// Loads and validates a configuration file.
    ///
    /// # Errors
    ///
    /// Fails when the file cannot be read, parsed or validated.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = read_config_file(path)?;
        Self::from_toml_str(&text, path)
    }

    /// Parses and validates configuration text; `origin` is only used in errors.
    ///
    /// # Errors
    ///
    /// Fails when the text cannot be parsed or validated.
    pub fn from_toml_str(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            reason: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Checks roster consistency.
    ///
    /// # Errors
    ///
    /// Fails on empty or duplicate subject ids, duplicate session ids within a
    /// subject, or an out-of-range mask fraction.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.mask_fraction > 0.0 && self.mask_fraction <= 1.0) {
            return Err(ConfigError::invalid(format!(
                "mask_fraction must be in (0, 1], got {}",
                self.mask_fraction
            )));
        }
        if self.shell.trim().is_empty() {
            return Err(ConfigError::invalid("shell must not be empty"));
        }

        let mut seen = HashSet::new();
        for subject in &self.subjects {
            if subject.id.trim().is_empty() {
                return Err(ConfigError::invalid("subject id must not be empty"));
            }
            if !seen.insert(subject.id.as_str()) {
                return Err(ConfigError::invalid(format!("subject '{}' is listed twice", subject.id)));
            }
            let mut sessions = HashSet::new();
            for session in &subject.sessions {
                if !sessions.insert(session.id) {
                    return Err(ConfigError::invalid(format!(
                        "subject '{}' lists session {} twice",
                        subject.id, session.id
                    )));
                }
            }
        }
        Ok(())
    }

    /// Looks a subject up by id.
    #[must_use]
    pub fn subject(&self, id: &str) -> Option<&SubjectConfig> {
        self.subjects.iter().find(|s| s.id == id)
    }

    /// Every roster subject id, in file order.
    #[must_use]
    pub fn subject_ids(&self) -> Vec<String> {
        self.subjects.iter().map(|s| s.id.clone()).collect()
    }
}

/// One roster entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectConfig {
    /// Subject identifier, e.g. `sub-AL01`.
    pub id: String,
    /// Group label used by group models.
    #[serde(default)]
    pub group: Option<String>,
    /// Sessions recorded for this subject.
    #[serde(default)]
    pub sessions: Vec<SessionConfig>,
}

impl SubjectConfig {
    /// Creates a subject without sessions.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            group: None,
            sessions: Vec::new(),
        }
    }

    /// Sets the group label.
    #[must_use]
    pub fn with_group(mut self, group: impl Into<String>) -> Self {
        self.group = Some(group.into());
        self
    }

    /// Adds a session.
    #[must_use]
    pub fn with_session(mut self, session: SessionConfig) -> Self {
        self.sessions.push(session);
        self
    }

    /// Looks a session up by id.
    #[must_use]
    pub fn session(&self, id: u32) -> Option<&SessionConfig> {
        self.sessions.iter().find(|s| s.id == id)
    }

    /// Builds the read-only context of one session.
    #[must_use]
    pub fn context(&self, session: &SessionConfig) -> SubjectSessionContext {
        SubjectSessionContext {
            subject_id: self.id.clone(),
            session_id: session.id,
            lag_block_1: session.lag_block_1,
            lag_block_2: session.lag_block_2,
            has_scr: session.has_scr,
            group: self.group.clone(),
        }
    }
}

/// One recorded session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session number.
    pub id: u32,
    /// Whether skin conductance was recorded.
    #[serde(default)]
    pub has_scr: bool,
    /// Physiological recording lag for the first block, seconds.
    #[serde(default)]
    pub lag_block_1: f64,
    /// Physiological recording lag for the second block, seconds.
    #[serde(default)]
    pub lag_block_2: f64,
}

impl SessionConfig {
    /// Creates a session with no signal and zero lags.
    #[must_use]
    pub fn new(id: u32) -> Self {
        Self {
            id,
            has_scr: false,
            lag_block_1: 0.0,
            lag_block_2: 0.0,
        }
    }

    /// Marks the session as having skin conductance.
    #[must_use]
    pub fn with_scr(mut self) -> Self {
        self.has_scr = true;
        self
    }

    /// Sets both block lags.
    #[must_use]
    pub fn with_lags(mut self, lag_block_1: f64, lag_block_2: f64) -> Self {
        self.lag_block_1 = lag_block_1;
        self.lag_block_2 = lag_block_2;
        self
    }
}

/// Everything a worker needs to know about one subject/session.
///
/// Built once from the roster; each worker owns its copy.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubjectSessionContext {
    /// Subject identifier.
    pub subject_id: String,
    /// Session number.
    pub session_id: u32,
    /// First block lag.
    pub lag_block_1: f64,
    /// Second block lag.
    pub lag_block_2: f64,
    /// Whether the session carries skin conductance data.
    pub has_scr: bool,
    /// Group label.
    pub group: Option<String>,
}

impl SubjectSessionContext {
    /// Session id as passed on the command line.
    #[must_use]
    pub fn session_label(&self) -> String {
        self.session_id.to_string()
    }

    /// Arguments the timing construction stage receives.
    #[must_use]
    pub fn lag_args(&self) -> Vec<String> {
        vec![
            "--lag_block_1".to_string(),
            format_lag(self.lag_block_1),
            "--lag_block_2".to_string(),
            format_lag(self.lag_block_2),
        ]
    }
}

/// Integral lags are passed without a fractional part.
fn format_lag(lag: f64) -> String {
    if lag.fract() == 0.0 && lag.abs() < 1e15 {
        format!("{lag:.0}")
    } else {
        lag.to_string()
    }
}
