//! Launching the mask tool and the group script.

use super::inputs::{assemble, Exclusion, GroupInputs};
use super::{GroupReport, GroupStatus};
use crate::config::{GroupModel, GroupModelKind, PipelineConfig};
use crate::events::{EventSink, NoOpEventSink, PipelineEvent};
use crate::stages::{Invocation, StageRunner, GROUP_SCRIPT};
use serde_json::json;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};

/// One group model run over the first-level outputs.
pub struct GroupAnalysis {
    config: Arc<PipelineConfig>,
    analysis: String,
    model: GroupModel,
    runner: Arc<dyn StageRunner>,
    sink: Arc<dyn EventSink>,
    exclusions: HashMap<String, String>,
}

impl fmt::Debug for GroupAnalysis {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("GroupAnalysis")
            .field("analysis", &self.analysis)
            .field("group_model", &self.model.name)
            .field("exclusions", &self.exclusions)
            .finish_non_exhaustive()
    }
}

fn absolute(path: &Path) -> std::io::Result<PathBuf> {
    if path.is_absolute() {
        Ok(path.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(path))
    }
}

impl GroupAnalysis {
    /// Creates a group run of `model` under `analysis`.
    #[must_use]
    pub fn new(
        config: Arc<PipelineConfig>,
        analysis: impl Into<String>,
        model: GroupModel,
        runner: Arc<dyn StageRunner>,
    ) -> Self {
        Self {
            config,
            analysis: analysis.into(),
            model,
            runner,
            sink: Arc::new(NoOpEventSink),
            exclusions: HashMap::new(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Subjects that must not contribute, keyed by id, with the reason.
    #[must_use]
    pub fn with_exclusions(mut self, exclusions: HashMap<String, String>) -> Self {
        self.exclusions = exclusions;
        self
    }

    /// `{output_dir}/group_analysis/{analysis}/{group_model}`.
    #[must_use]
    pub fn output_dir(&self) -> PathBuf {
        self.config
            .output_dir
            .join("group_analysis")
            .join(&self.analysis)
            .join(&self.model.name)
    }

    fn log_path(&self, kind: &str) -> PathBuf {
        self.config
            .log_dir
            .join(format!("{kind}_{}_{}.log", self.analysis, self.model.name))
    }

    fn sessions_label(&self) -> String {
        self.model
            .sessions
            .iter()
            .map(u32::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }

    /// Assembles inputs, builds the group mask and runs the group script.
    ///
    /// Never fails: problems are reported through [`GroupReport::status`].
    pub async fn run(&self) -> GroupReport {
        info!(analysis = %self.analysis, group_model = %self.model.name, "Group analysis: {}", self.model.name);

        let mut report = GroupReport {
            analysis: self.analysis.clone(),
            group_model: self.model.name.clone(),
            kind: self.model.kind,
            output_dir: self.output_dir(),
            included: Vec::new(),
            excluded: Vec::new(),
            status: GroupStatus::Aborted,
            outcomes: Vec::new(),
            message: None,
        };

        let prepared = self.prepare(&mut report);
        let (output_dir, script, inputs) = match prepared {
            Ok(prepared) => prepared,
            Err(message) => return self.finish(report, GroupStatus::Aborted, Some(message)),
        };

        let group_mask = output_dir.join("group_mask");
        let mask = self.runner.launch(&self.mask_invocation(&inputs, &group_mask)).await;
        let mask_failed = mask.is_failure();
        report.outcomes.push(mask);
        if mask_failed {
            return self.finish(report, GroupStatus::Failed, Some("Group mask creation failed".to_string()));
        }

        let invocation = self.script_invocation(&script, &output_dir, &group_mask, &inputs);
        info!(log_path = %invocation.log_path.display(), "Executing group analysis");
        let outcome = self.runner.launch(&invocation).await;
        let status = if outcome.is_success() {
            info!(output_dir = %output_dir.display(), "Group analysis complete");
            GroupStatus::Completed
        } else {
            error!(log_path = %invocation.log_path.display(), "Group analysis failed");
            GroupStatus::Failed
        };
        let message = outcome.message.clone();
        report.outcomes.push(outcome);
        self.finish(report, status, message)
    }

    fn prepare(&self, report: &mut GroupReport) -> Result<(PathBuf, PathBuf, GroupInputs), String> {
        let output_root = absolute(&self.config.output_dir).map_err(|e| e.to_string())?;
        let output_dir = output_root
            .join("group_analysis")
            .join(&self.analysis)
            .join(&self.model.name);
        report.output_dir.clone_from(&output_dir);
        std::fs::create_dir_all(&output_dir)
            .map_err(|e| format!("Could not create {}: {e}", output_dir.display()))?;

        let script = absolute(&self.config.scripts_dir.join(GROUP_SCRIPT)).map_err(|e| e.to_string())?;
        if !script.is_file() {
            return Err(format!("Group analysis script not found: {}", script.display()));
        }

        // Inputs are handed to a tool running inside the output directory.
        let config = PipelineConfig {
            output_dir: output_root,
            ..(*self.config).clone()
        };
        let inputs = match assemble(&config, &self.analysis, &self.model, &self.exclusions) {
            Ok(inputs) => inputs,
            Err(e) => {
                report.excluded = self.known_exclusions();
                error!(analysis = %self.analysis, group_model = %self.model.name, "{e}");
                return Err(e.to_string());
            }
        };
        report.included.clone_from(&inputs.subjects);
        report.excluded.clone_from(&inputs.excluded);

        if let Some(table) = &inputs.data_table {
            let path = output_dir.join("data_table.txt");
            std::fs::write(&path, table.to_tsv())
                .map_err(|e| format!("Could not write {}: {e}", path.display()))?;
        }
        Ok((output_dir, script, inputs))
    }

    fn known_exclusions(&self) -> Vec<Exclusion> {
        let mut excluded: Vec<_> = self
            .exclusions
            .iter()
            .map(|(subject, reason)| Exclusion::new(subject, reason))
            .collect();
        excluded.sort_by(|a, b| a.subject.cmp(&b.subject));
        excluded
    }

    fn mask_invocation(&self, inputs: &GroupInputs, group_mask: &Path) -> Invocation {
        Invocation::new("group_mask", &self.config.mask_tool, self.log_path("group_mask"))
            .for_unit("group", self.sessions_label())
            .with_analysis(Some(self.analysis.clone()))
            .arg("-input")
            .args(inputs.masks.iter().map(|m| m.display().to_string()))
            .args([
                "-prefix".to_string(),
                group_mask.display().to_string(),
                "-frac".to_string(),
                self.config.mask_fraction.to_string(),
                "-overwrite".to_string(),
            ])
    }

    fn script_invocation(
        &self,
        script: &Path,
        output_dir: &Path,
        group_mask: &Path,
        inputs: &GroupInputs,
    ) -> Invocation {
        let invocation = Invocation::new("group_analysis", &self.config.shell, self.log_path("group_analysis"))
            .for_unit("group", self.sessions_label())
            .with_analysis(Some(self.analysis.clone()))
            .current_dir(output_dir)
            .args([
                script.display().to_string(),
                "--type".to_string(),
                self.model.kind.to_string(),
                "--output_prefix".to_string(),
                output_dir.join(format!("result_{}", self.model.name)).display().to_string(),
                "--mask".to_string(),
                format!("{}+tlrc", group_mask.display()),
            ]);

        match self.model.kind {
            GroupModelKind::Lmer => {
                let glt_codes = self
                    .model
                    .glt
                    .iter()
                    .map(|g| format!("-gltCode {} \"{}\"", g.label, g.sym))
                    .collect::<Vec<_>>()
                    .join(" ");
                invocation.args([
                    "--data_table".to_string(),
                    output_dir.join("data_table.txt").display().to_string(),
                    "--model".to_string(),
                    self.model.model.clone().unwrap_or_default(),
                    "--glt_codes".to_string(),
                    glt_codes,
                ])
            }
            GroupModelKind::TTest => {
                let set_a_files = inputs
                    .set_a
                    .iter()
                    .map(|(subject, file)| format!("{subject} {file}"))
                    .collect::<Vec<_>>()
                    .join(" ");
                invocation.args([
                    "--setA_label".to_string(),
                    self.model.set_a_label.clone().unwrap_or_default(),
                    "--setA_files".to_string(),
                    set_a_files,
                ])
            }
        }
    }

    fn finish(&self, mut report: GroupReport, status: GroupStatus, message: Option<String>) -> GroupReport {
        report.status = status;
        report.message = message;

        for exclusion in &report.excluded {
            self.sink.try_emit(
                PipelineEvent::GroupExcluded,
                Some(json!({
                    "analysis": report.analysis,
                    "group_model": report.group_model,
                    "subject": exclusion.subject,
                    "reason": exclusion.reason,
                })),
            );
        }

        let event = if status == GroupStatus::Completed {
            PipelineEvent::GroupCompleted
        } else {
            if let Some(message) = &report.message {
                warn!(analysis = %report.analysis, group_model = %report.group_model, status = %status, "{message}");
            }
            PipelineEvent::GroupFailed
        };
        self.sink.try_emit(
            event,
            Some(json!({
                "analysis": report.analysis,
                "group_model": report.group_model,
                "status": status,
                "included": report.included.len(),
                "excluded": report.excluded.len(),
                "output_dir": report.output_dir,
                "message": report.message,
                "log_paths": report.outcomes.iter().filter_map(|o| o.log_path.clone()).collect::<Vec<_>>(),
            })),
        );
        report
    }
}
