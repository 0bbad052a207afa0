//! Fan-out of subject pipelines over a bounded worker pool, then fan-in to
//! group aggregation.

use super::plan::PipelineStep;
use super::report::{RunSummary, SubjectReport, UnitState};
use super::subject::SubjectPipeline;
use crate::config::{AnalysisCatalog, AnalysisModel, GroupModel, PipelineConfig, SessionConfig, SubjectConfig};
use crate::errors::{ConfigError, PhysioflowError};
use crate::events::{EventSink, NoOpEventSink};
use crate::group::{GroupAnalysis, GroupReport};
use crate::stages::{StageName, StageRunner};
use chrono::Utc;
use futures::stream::{FuturesUnordered, StreamExt};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

/// What the user asked for on the command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    /// Step to run.
    pub step: PipelineStep,
    /// Explicit subjects; empty means "derive the work set".
    pub subjects: Vec<String>,
    /// Analyses for modeling and aggregation.
    pub analyses: Vec<String>,
    /// Session selector as typed.
    pub session: Option<String>,
    /// Maximum concurrent subject workers.
    pub n_procs: usize,
    /// Group model to aggregate with.
    pub group_model: Option<String>,
}

impl RunRequest {
    /// A request for `step` over the whole roster with one worker.
    #[must_use]
    pub fn new(step: PipelineStep) -> Self {
        Self {
            step,
            subjects: Vec::new(),
            analyses: Vec::new(),
            session: None,
            n_procs: 1,
            group_model: None,
        }
    }

    /// Restricts the run to `subjects`.
    #[must_use]
    pub fn with_subjects<I, S>(mut self, subjects: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.subjects = subjects.into_iter().map(Into::into).collect();
        self
    }

    /// Selects analyses.
    #[must_use]
    pub fn with_analyses<I, S>(mut self, analyses: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.analyses = analyses.into_iter().map(Into::into).collect();
        self
    }

    /// Selects one session.
    #[must_use]
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.session = Some(session.into());
        self
    }

    /// Sets the worker count.
    #[must_use]
    pub fn with_n_procs(mut self, n_procs: usize) -> Self {
        self.n_procs = n_procs;
        self
    }

    /// Selects a group model.
    #[must_use]
    pub fn with_group_model(mut self, group_model: impl Into<String>) -> Self {
        self.group_model = Some(group_model.into());
        self
    }
}

/// One subject's share of the work.
#[derive(Debug, Clone, PartialEq)]
pub struct SubjectPlan {
    /// The roster entry, copied for the worker.
    pub subject: SubjectConfig,
    /// Sessions to run, in configuration order.
    pub sessions: Vec<SessionConfig>,
    /// The selected session when the subject does not have it.
    pub missing_session: Option<u32>,
}

/// A validated run, ready to dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct RunPlan {
    /// Step to run.
    pub step: PipelineStep,
    /// Subject work items.
    pub units: Vec<SubjectPlan>,
    /// Analyses the modeling stage fans out over.
    pub analyses: Vec<AnalysisModel>,
    /// First-level analysis and group model to aggregate.
    pub group: Option<(String, GroupModel)>,
    /// Worker count.
    pub n_procs: usize,
}

/// Runs subject pipelines concurrently and aggregates afterwards.
pub struct Orchestrator {
    config: Arc<PipelineConfig>,
    catalog: Arc<AnalysisCatalog>,
    runner: Arc<dyn StageRunner>,
    sink: Arc<dyn EventSink>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("subjects", &self.config.subjects.len())
            .field("analyses", &self.catalog.names())
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Creates an orchestrator over validated configuration.
    #[must_use]
    pub fn new(config: PipelineConfig, catalog: AnalysisCatalog, runner: Arc<dyn StageRunner>) -> Self {
        Self {
            config: Arc::new(config),
            catalog: Arc::new(catalog),
            runner,
            sink: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink shared by every worker.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = sink;
        self
    }

    /// Validates `request` against the configuration.
    ///
    /// Nothing is dispatched when this fails.
    ///
    /// # Errors
    ///
    /// Fails on unknown analyses, group models or subjects, a malformed
    /// session selector, a zero worker count, or argument combinations the
    /// step does not accept.
    pub fn plan(&self, request: &RunRequest) -> Result<RunPlan, ConfigError> {
        let step = request.step;
        if request.n_procs == 0 {
            return Err(ConfigError::usage("--n-procs must be at least 1"));
        }
        let session = request
            .session
            .as_deref()
            .map(|s| s.trim().parse::<u32>().map_err(|_| ConfigError::MalformedSession(s.to_string())))
            .transpose()?;

        let mut analyses = request
            .analyses
            .iter()
            .map(|name| self.catalog.require(name).cloned())
            .collect::<Result<Vec<_>, _>>()?;
        if step.runs_models() && analyses.is_empty() {
            if self.catalog.is_empty() {
                return Err(ConfigError::usage("--analysis is required for 'glm' step"));
            }
            analyses = self.catalog.models().to_vec();
        }

        let group = self.plan_group(request)?;
        if step == PipelineStep::GroupAnalysis {
            return Ok(RunPlan {
                step,
                units: Vec::new(),
                analyses,
                group,
                n_procs: request.n_procs,
            });
        }

        let units = self
            .work_set(request)?
            .into_iter()
            .map(|subject| plan_subject(subject, session))
            .collect();
        Ok(RunPlan {
            step,
            units,
            analyses,
            group,
            n_procs: request.n_procs,
        })
    }

    fn plan_group(&self, request: &RunRequest) -> Result<Option<(String, GroupModel)>, ConfigError> {
        match (request.step, &request.group_model) {
            (PipelineStep::GroupAnalysis, None) => Err(ConfigError::usage(
                "Please specify a group analysis model using --group-model",
            )),
            (PipelineStep::GroupAnalysis, Some(group_model)) => {
                let [analysis] = request.analyses.as_slice() else {
                    return Err(ConfigError::usage(
                        "Please specify exactly one first-level analysis model using --analysis",
                    ));
                };
                let model = self.catalog.group_model(analysis, group_model)?;
                Ok(Some((analysis.clone(), model.clone())))
            }
            (PipelineStep::All, Some(group_model)) => {
                let Some(analysis) = request.analyses.first() else {
                    return Err(ConfigError::usage(
                        "--group-model with step 'all' needs the first-level model given with --analysis",
                    ));
                };
                let model = self.catalog.group_model(analysis, group_model)?;
                Ok(Some((analysis.clone(), model.clone())))
            }
            (step, Some(group_model)) => {
                warn!(step = %step, group_model = %group_model, "--group-model is ignored for this step");
                Ok(None)
            }
            (_, None) => Ok(None),
        }
    }

    fn work_set(&self, request: &RunRequest) -> Result<Vec<SubjectConfig>, ConfigError> {
        if !request.subjects.is_empty() {
            return request
                .subjects
                .iter()
                .map(|id| {
                    self.config
                        .subject(id)
                        .cloned()
                        .ok_or_else(|| ConfigError::UnknownSubject(id.clone()))
                })
                .collect();
        }

        let restriction = request
            .analyses
            .first()
            .filter(|_| request.step.runs_models())
            .and_then(|name| self.catalog.get(name))
            .and_then(|model| model.subjects.as_ref());
        if let Some(ids) = restriction {
            info!(count = ids.len(), "Using subjects listed by the first analysis");
            return Ok(ids
                .iter()
                .filter_map(|id| {
                    let subject = self.config.subject(id).cloned();
                    if subject.is_none() {
                        warn!(subject = %id, "Subject listed by the analysis is not in the roster; skipping");
                    }
                    subject
                })
                .collect());
        }

        Ok(self.config.subjects.clone())
    }

    /// Plans, dispatches every subject, waits for all of them, then runs
    /// group aggregation when one was requested.
    ///
    /// # Errors
    ///
    /// Only configuration problems are returned; stage failures are
    /// recorded in the summary.
    pub async fn run(&self, request: &RunRequest) -> Result<RunSummary, PhysioflowError> {
        let started_at = Utc::now();
        let plan = self.plan(request)?;
        info!(
            step = %plan.step,
            subjects = plan.units.len(),
            n_procs = plan.n_procs,
            "fMRI analysis pipeline, step: {}", plan.step
        );

        let units = self.dispatch(&plan).await;
        let group = match &plan.group {
            Some((analysis, model)) => Some(self.aggregate(&plan, analysis, model, &units).await),
            None => None,
        };

        let summary = RunSummary::new(plan.step.as_str(), started_at, units).with_group(group);
        info!(
            completed = summary.completed(),
            aborted = summary.aborted(),
            skipped = summary.skipped(),
            "All processing complete"
        );
        Ok(summary)
    }

    async fn dispatch(&self, plan: &RunPlan) -> Vec<SubjectReport> {
        let semaphore = Arc::new(Semaphore::new(plan.n_procs));
        let stages = plan.step.stages();
        let mut workers = FuturesUnordered::new();

        for unit in &plan.units {
            let unit = unit.clone();
            let subject = unit.subject.id.clone();
            let labels: Vec<String> = unit.sessions.iter().map(|s| s.id.to_string()).collect();
            let semaphore = semaphore.clone();
            let stages = stages.clone();
            let analyses = plan.analyses.clone();
            let runner = self.runner.clone();
            let sink = self.sink.clone();

            let handle = tokio::spawn(async move {
                let Ok(_permit) = semaphore.acquire_owned().await else {
                    return unit
                        .sessions
                        .iter()
                        .map(|s| SubjectReport::aborted(&unit.subject.id, s.id.to_string(), Vec::new(), "worker pool closed"))
                        .collect::<Vec<_>>();
                };
                run_subject(unit, stages, analyses, runner, sink).await
            });
            workers.push(async move { (subject, labels, handle.await) });
        }

        let mut reports = Vec::new();
        while let Some((subject, labels, joined)) = workers.next().await {
            match joined {
                Ok(subject_reports) => reports.extend(subject_reports),
                Err(e) => {
                    error!(subject = %subject, "Subject worker failed: {e}");
                    reports.extend(labels.into_iter().map(|session| {
                        SubjectReport::aborted(&subject, session, Vec::new(), format!("worker failed: {e}"))
                    }));
                }
            }
        }
        reports
    }

    async fn aggregate(
        &self,
        plan: &RunPlan,
        analysis: &str,
        model: &GroupModel,
        units: &[SubjectReport],
    ) -> GroupReport {
        let exclusions = if plan.step == PipelineStep::GroupAnalysis {
            HashMap::new()
        } else {
            group_exclusions(&self.config, model, units)
        };
        GroupAnalysis::new(self.config.clone(), analysis, model.clone(), self.runner.clone())
            .with_sink(self.sink.clone())
            .with_exclusions(exclusions)
            .run()
            .await
    }
}

/// Session label of the unit reported for a subject with no sessions.
pub const NO_SESSION: &str = "-";

fn plan_subject(subject: SubjectConfig, session: Option<u32>) -> SubjectPlan {
    match session {
        Some(id) => match subject.session(id).cloned() {
            Some(found) => SubjectPlan {
                subject,
                sessions: vec![found],
                missing_session: None,
            },
            None => SubjectPlan {
                subject,
                sessions: Vec::new(),
                missing_session: Some(id),
            },
        },
        None => SubjectPlan {
            sessions: subject.sessions.clone(),
            subject,
            missing_session: None,
        },
    }
}

async fn run_subject(
    unit: SubjectPlan,
    stages: Vec<StageName>,
    analyses: Vec<AnalysisModel>,
    runner: Arc<dyn StageRunner>,
    sink: Arc<dyn EventSink>,
) -> Vec<SubjectReport> {
    let subject = &unit.subject;
    if let Some(missing) = unit.missing_session {
        info!(subject = %subject.id, session = missing, "Session {missing} not configured for {}; skipping", subject.id);
        return vec![SubjectReport::skipped(
            &subject.id,
            missing.to_string(),
            format!("session {missing} not configured"),
        )
        .with_group(subject.group.clone())];
    }

    if unit.sessions.is_empty() {
        warn!(subject = %subject.id, "No sessions found for {}; skipping", subject.id);
        return vec![SubjectReport::skipped(&subject.id, NO_SESSION, "no sessions configured")
            .with_group(subject.group.clone())];
    }

    let mut reports = Vec::with_capacity(unit.sessions.len());
    for session in &unit.sessions {
        info!(subject = %subject.id, session = session.id, "Processing {} session {}", subject.id, session.id);
        let mut pipeline = SubjectPipeline::new(subject.context(session), stages.clone(), runner.clone())
            .with_analyses(analyses.clone())
            .with_sink(sink.clone());
        reports.push(pipeline.run().await);
    }
    reports
}

/// Subjects that must not feed a group model after this run, with reasons.
fn group_exclusions(config: &PipelineConfig, model: &GroupModel, units: &[SubjectReport]) -> HashMap<String, String> {
    let mut excluded = HashMap::new();
    for subject in &config.subjects {
        let mine: Vec<&SubjectReport> = units.iter().filter(|u| u.subject == subject.id).collect();
        if mine.is_empty() {
            excluded.insert(subject.id.clone(), "not processed in this run".to_string());
            continue;
        }
        let bad = mine.iter().find(|u| {
            u.state != UnitState::Completed
                && u.session.parse::<u32>().map_or(true, |s| model.sessions.contains(&s))
        });
        if let Some(unit) = bad {
            let reason = match &unit.reason {
                Some(reason) => format!("session {} {}: {reason}", unit.session, unit.state),
                None => format!("session {} {}", unit.session, unit.state),
            };
            excluded.insert(subject.id.clone(), reason);
        }
    }
    excluded
}
