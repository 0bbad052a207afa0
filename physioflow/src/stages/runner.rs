//! Stage runners: turn a [`StageRequest`] into an external process.

use super::catalog::StageName;
use super::request::{Invocation, StageRequest};
use crate::config::PipelineConfig;
use crate::core::StageOutcome;
use async_trait::async_trait;
use chrono::Utc;
use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, error, info};

/// Runs stages and external tools.
///
/// Implementations never return errors: anything that goes wrong is a
/// failed [`StageOutcome`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StageRunner: Send + Sync {
    /// Runs one per-subject stage to completion.
    async fn run(&self, request: &StageRequest) -> StageOutcome;

    /// Runs an arbitrary resolved invocation to completion.
    async fn launch(&self, invocation: &Invocation) -> StageOutcome;
}

/// Runs stage scripts with the configured shell.
#[derive(Debug, Clone)]
pub struct ScriptRunner {
    shell: String,
    scripts_dir: PathBuf,
    input_dir: PathBuf,
    output_dir: PathBuf,
    log_dir: PathBuf,
}

impl ScriptRunner {
    /// Creates a runner from the site configuration.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            shell: config.shell.clone(),
            scripts_dir: config.scripts_dir.clone(),
            input_dir: config.input_dir.clone(),
            output_dir: config.output_dir.clone(),
            log_dir: config.log_dir.clone(),
        }
    }

    /// Directory stage logs are written to.
    #[must_use]
    pub fn log_dir(&self) -> &Path {
        &self.log_dir
    }

    /// Resolves a request into the process it launches.
    ///
    /// # Errors
    ///
    /// Returns the failure message when the stage is unknown or its script
    /// is missing.
    pub fn resolve(&self, request: &StageRequest) -> Result<Invocation, String> {
        let stage: StageName = request.stage.parse().map_err(|e| format!("{e}"))?;
        let config = stage.config();

        let script = self.scripts_dir.join(config.script_name);
        if !script.is_file() {
            return Err(format!("Script not found at {}", script.display()));
        }

        let mut invocation = Invocation::new(
            stage.as_str(),
            self.shell.clone(),
            self.log_dir.join(request.log_file_name()),
        )
        .for_unit(&request.subject, &request.session)
        .arg(script.display().to_string())
        .args([
            "--subject",
            request.subject.as_str(),
            "--session",
            request.session.as_str(),
        ]);

        if config.requires_input_dir {
            invocation = invocation.args(["--input".to_string(), self.input_dir.display().to_string()]);
        }
        if config.requires_output_dir {
            invocation = invocation.args(["--output".to_string(), self.output_dir.display().to_string()]);
        }
        if config.accepts_analysis_name {
            if let Some(analysis) = &request.analysis {
                invocation = invocation
                    .with_analysis(Some(analysis.clone()))
                    .args(["--analysis", analysis.as_str()]);
            }
        }
        Ok(invocation.args(request.extra_args.iter().cloned()))
    }
}

#[async_trait]
impl StageRunner for ScriptRunner {
    async fn run(&self, request: &StageRequest) -> StageOutcome {
        match self.resolve(request) {
            Ok(invocation) => self.launch(&invocation).await,
            Err(message) => {
                error!(
                    subject = %request.subject,
                    session = %request.session,
                    stage = %request.stage,
                    "{message}"
                );
                StageOutcome::failed(&request.stage, &request.subject, &request.session, Utc::now(), message)
                    .with_analysis(request.analysis.clone())
            }
        }
    }

    async fn launch(&self, invocation: &Invocation) -> StageOutcome {
        run_process(invocation).await
    }
}

/// Launches `invocation`, waits for it, and reports the outcome.
pub async fn run_process(invocation: &Invocation) -> StageOutcome {
    let started_at = Utc::now();
    let failed = |message: String| {
        error!(
            subject = %invocation.subject,
            session = %invocation.session,
            stage = %invocation.stage,
            analysis = ?invocation.analysis,
            "{message}"
        );
        StageOutcome::failed(
            &invocation.stage,
            &invocation.subject,
            &invocation.session,
            started_at,
            message,
        )
        .with_analysis(invocation.analysis.clone())
        .with_log_path(&invocation.log_path)
    };

    let (stdout, stderr) = match open_log(&invocation.log_path) {
        Ok(handles) => handles,
        Err(e) => return failed(format!("Cannot open log {}: {e}", invocation.log_path.display())),
    };

    debug!(
        subject = %invocation.subject,
        stage = %invocation.stage,
        command = %invocation.command_line(),
        "Executing"
    );

    let mut command = Command::new(&invocation.program);
    command
        .args(&invocation.args)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr);
    if let Some(cwd) = &invocation.cwd {
        command.current_dir(cwd);
    }

    let status = match command.status().await {
        Ok(status) => status,
        Err(e) => return failed(format!("Failed to launch {}: {e}", invocation.program)),
    };

    match status.code() {
        Some(0) => {
            info!(
                subject = %invocation.subject,
                session = %invocation.session,
                stage = %invocation.stage,
                analysis = ?invocation.analysis,
                "✓ {} completed", invocation.stage
            );
            StageOutcome::ok(&invocation.stage, &invocation.subject, &invocation.session, started_at)
                .with_analysis(invocation.analysis.clone())
                .with_log_path(&invocation.log_path)
        }
        Some(code) => failed(format!(
            "✖ {} failed with exit status {code}. See log: {}",
            invocation.stage,
            invocation.log_path.display()
        ))
        .with_exit_status(code),
        None => failed(format!(
            "✖ {} was terminated by a signal. See log: {}",
            invocation.stage,
            invocation.log_path.display()
        )),
    }
}

/// Creates the log directory and truncates the log, returning handles for
/// stdout and stderr.
fn open_log(path: &Path) -> std::io::Result<(Stdio, Stdio)> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }
    let file = File::create(path)?;
    let clone = file.try_clone()?;
    Ok((Stdio::from(file), Stdio::from(clone)))
}
