//! End-to-end tests of planning, dispatch and aggregation.

#[cfg(test)]
mod tests {
    use crate::config::{AnalysisCatalog, AnalysisModel, PipelineConfig, SessionConfig, SubjectConfig};
    use crate::core::StageOutcome;
    use crate::errors::{ConfigError, PhysioflowError};
    use crate::events::{CollectingEventSink, PipelineEvent};
    use crate::group::{mask_prefix, stats_prefix, GroupStatus};
    use crate::pipeline::{Orchestrator, PipelineStep, RunRequest, UnitState, NO_SESSION};
    use crate::stages::{Invocation, StageRequest, StageRunner, GROUP_SCRIPT};
    use crate::testing::fixtures::{touch_head, ttest_model};
    use crate::testing::MockRunner;
    use async_trait::async_trait;
    use chrono::Utc;
    use pretty_assertions::assert_eq;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;
    use std::time::Duration;

    /// Tracks how many requests are in flight at once.
    #[derive(Debug, Default)]
    struct GaugeRunner {
        current: AtomicUsize,
        peak: AtomicUsize,
    }

    #[async_trait]
    impl StageRunner for GaugeRunner {
        async fn run(&self, request: &StageRequest) -> StageOutcome {
            let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(now, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.current.fetch_sub(1, Ordering::SeqCst);
            StageOutcome::ok(&request.stage, &request.subject, &request.session, Utc::now())
        }

        async fn launch(&self, invocation: &Invocation) -> StageOutcome {
            StageOutcome::ok(&invocation.stage, &invocation.subject, &invocation.session, Utc::now())
        }
    }

    fn roster(output: &Path) -> PipelineConfig {
        [("sub-01", "control"), ("sub-02", "patient"), ("sub-03", "control")]
            .into_iter()
            .fold(PipelineConfig::new("raw", output), |config, (id, group)| {
                config.with_subject(
                    SubjectConfig::new(id)
                        .with_group(group)
                        .with_session(SessionConfig::new(1).with_scr())
                        .with_session(SessionConfig::new(2)),
                )
            })
    }

    fn catalog() -> AnalysisCatalog {
        AnalysisCatalog::new(vec![
            AnalysisModel::new("image").with_group_model(ttest_model()),
            AnalysisModel::new("binned_scr").requiring_scr(),
            AnalysisModel::new("pilot").with_subjects(vec!["sub-03".to_string(), "sub-99".to_string()]),
        ])
    }

    #[tokio::test]
    async fn test_failure_halts_only_its_own_subject() {
        let runner = Arc::new(MockRunner::new().fail_subject_stage("sub-02", "preprocess_anat"));
        let orchestrator = Orchestrator::new(roster(Path::new("out")), catalog(), runner.clone());

        let summary = orchestrator
            .run(&RunRequest::new(PipelineStep::Preprocess).with_session("1").with_n_procs(3))
            .await
            .unwrap();

        assert_eq!(summary.completed(), 2);
        assert_eq!(summary.aborted(), 1);
        let sub02 = summary.unit("sub-02", "1").unwrap();
        assert_eq!(sub02.outcomes.len(), 2);
        assert_eq!(sub02.reason.as_deref(), Some("'preprocess_anat' failed"));

        let sub02_stages: Vec<_> = runner
            .requests()
            .into_iter()
            .filter(|r| r.subject == "sub-02")
            .map(|r| r.stage)
            .collect();
        assert_eq!(sub02_stages, vec!["create_timings", "preprocess_anat"]);
        assert_eq!(runner.requests().len(), 8);
    }

    #[tokio::test]
    async fn test_sessions_run_in_order_and_missing_session_is_skipped() {
        let config = roster(Path::new("out")).with_subject(
            SubjectConfig::new("sub-04").with_session(SessionConfig::new(2)),
        );
        let runner = Arc::new(MockRunner::new());
        let orchestrator = Orchestrator::new(config, catalog(), runner.clone());

        let all_sessions = orchestrator
            .run(&RunRequest::new(PipelineStep::PreprocessAnat).with_subjects(["sub-01"]))
            .await
            .unwrap();
        let sessions: Vec<_> = runner.requests().into_iter().map(|r| r.session).collect();
        assert_eq!(sessions, vec!["1", "2"]);
        assert_eq!(all_sessions.units.len(), 2);

        let selected = orchestrator
            .run(&RunRequest::new(PipelineStep::PreprocessAnat).with_session("1"))
            .await
            .unwrap();
        let sub04 = selected.unit("sub-04", "1").unwrap();
        assert_eq!(sub04.state, UnitState::Skipped);
        assert_eq!(selected.skipped(), 1);
        assert_eq!(selected.completed(), 3);
    }

    #[tokio::test]
    async fn test_subject_without_sessions_is_reported_as_skipped() {
        let config = PipelineConfig::new("raw", "out")
            .with_subject(SubjectConfig::new("sub-01").with_session(SessionConfig::new(1)))
            .with_subject(SubjectConfig::new("sub-02").with_group("patient"));
        let runner = Arc::new(MockRunner::new());
        let orchestrator = Orchestrator::new(config, catalog(), runner.clone());

        let summary = orchestrator
            .run(&RunRequest::new(PipelineStep::PreprocessAnat))
            .await
            .unwrap();

        assert_eq!(summary.units.len(), 2);
        assert_eq!(summary.completed(), 1);
        let sub02 = summary.unit("sub-02", NO_SESSION).unwrap();
        assert_eq!(sub02.state, UnitState::Skipped);
        assert_eq!(sub02.reason.as_deref(), Some("no sessions configured"));
        assert!(runner.requests().iter().all(|r| r.subject == "sub-01"));
    }

    #[tokio::test]
    async fn test_modeling_defaults_to_every_analysis_and_skips_without_scr() {
        let runner = Arc::new(MockRunner::new());
        let orchestrator = Orchestrator::new(roster(Path::new("out")), catalog(), runner.clone());

        let summary = orchestrator
            .run(&RunRequest::new(PipelineStep::Glm).with_subjects(["sub-01"]).with_session("2"))
            .await
            .unwrap();

        let unit = summary.unit("sub-01", "2").unwrap();
        assert_eq!(unit.state, UnitState::Completed);
        assert_eq!(unit.skipped_outcomes().count(), 1);
        let analyses: Vec<_> = runner.requests().into_iter().filter_map(|r| r.analysis).collect();
        assert_eq!(analyses, vec!["image", "pilot"]);
    }

    #[tokio::test]
    async fn test_work_set_follows_first_analysis_restriction() {
        let orchestrator = Orchestrator::new(roster(Path::new("out")), catalog(), Arc::new(MockRunner::new()));

        let plan = orchestrator
            .plan(&RunRequest::new(PipelineStep::Glm).with_analyses(["pilot", "image"]))
            .unwrap();
        let ids: Vec<_> = plan.units.iter().map(|u| u.subject.id.as_str()).collect();
        assert_eq!(ids, vec!["sub-03"]);

        let plan = orchestrator
            .plan(&RunRequest::new(PipelineStep::Preprocess).with_analyses(["pilot"]))
            .unwrap();
        assert_eq!(plan.units.len(), 3);
    }

    #[tokio::test]
    async fn test_configuration_errors_stop_before_dispatch() {
        let runner = Arc::new(MockRunner::new());
        let orchestrator = Orchestrator::new(roster(Path::new("out")), catalog(), runner.clone());

        let err = orchestrator
            .run(&RunRequest::new(PipelineStep::All).with_analyses(["image", "missing"]))
            .await
            .unwrap_err();
        assert!(matches!(err, PhysioflowError::Config(ConfigError::UnknownAnalysis(ref name)) if name == "missing"));

        let cases = [
            (RunRequest::new(PipelineStep::Preprocess).with_subjects(["sub-01", "sub-42"]), "sub-42"),
            (RunRequest::new(PipelineStep::Preprocess).with_session("one"), "'one'"),
            (RunRequest::new(PipelineStep::Preprocess).with_n_procs(0), "--n-procs"),
            (
                RunRequest::new(PipelineStep::GroupAnalysis).with_group_model("ttest"),
                "exactly one",
            ),
            (
                RunRequest::new(PipelineStep::GroupAnalysis)
                    .with_analyses(["image"])
                    .with_group_model("lme"),
                "'lme'",
            ),
        ];
        for (request, needle) in cases {
            let err = orchestrator.plan(&request).unwrap_err();
            assert!(err.to_string().contains(needle), "{err} should mention {needle}");
        }
        assert!(runner.requests().is_empty());
    }

    #[tokio::test]
    async fn test_pool_is_bounded_by_n_procs() {
        let config = (1..=6).fold(PipelineConfig::new("raw", "out"), |config, i| {
            config.with_subject(SubjectConfig::new(format!("sub-{i:02}")).with_session(SessionConfig::new(1)))
        });
        let runner = Arc::new(GaugeRunner::default());
        let orchestrator = Orchestrator::new(config, catalog(), runner.clone());

        let summary = orchestrator
            .run(&RunRequest::new(PipelineStep::PreprocessFunc).with_n_procs(2))
            .await
            .unwrap();

        assert_eq!(summary.completed(), 6);
        assert!(runner.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_group_excludes_aborted_subject() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join(GROUP_SCRIPT), "").unwrap();
        let output = dir.path().join("derivatives");
        for id in ["sub-01", "sub-02", "sub-03"] {
            touch_head(&mask_prefix(&output, id, 1));
            touch_head(&stats_prefix(&output, id, 1, "image"));
        }
        let config = roster(&output)
            .with_scripts_dir(&scripts)
            .with_log_dir(dir.path().join("logs"));
        let runner = Arc::new(MockRunner::new().fail_subject_stage("sub-02", "glm"));
        let sink = Arc::new(CollectingEventSink::new());
        let orchestrator = Orchestrator::new(config, catalog(), runner.clone()).with_sink(sink.clone());

        let summary = orchestrator
            .run(
                &RunRequest::new(PipelineStep::All)
                    .with_analyses(["image"])
                    .with_session("1")
                    .with_n_procs(3)
                    .with_group_model("ttest"),
            )
            .await
            .unwrap();

        assert_eq!(summary.aborted(), 1);
        let group = summary.group.as_ref().unwrap();
        assert_eq!(group.status, GroupStatus::Completed);
        assert_eq!(group.included, vec!["sub-01", "sub-03"]);
        assert_eq!(group.excluded.len(), 1);
        assert_eq!(group.excluded[0].subject, "sub-02");
        assert!(group.excluded[0].reason.contains("'glm:image' failed"));

        let set_a = runner.invocations()[1].args.last().cloned().unwrap();
        assert!(!set_a.contains("sub-02"));
        assert_eq!(sink.payloads_of(PipelineEvent::GroupExcluded).len(), 1);
        assert_eq!(sink.payloads_of(PipelineEvent::GroupCompleted).len(), 1);
    }

    #[tokio::test]
    async fn test_group_step_runs_without_subject_workers() {
        let dir = tempfile::tempdir().unwrap();
        let scripts = dir.path().join("scripts");
        std::fs::create_dir_all(&scripts).unwrap();
        std::fs::write(scripts.join(GROUP_SCRIPT), "").unwrap();
        let output = dir.path().join("derivatives");
        touch_head(&mask_prefix(&output, "sub-01", 1));
        touch_head(&stats_prefix(&output, "sub-01", 1, "image"));
        let config = roster(&output).with_scripts_dir(&scripts);
        let runner = Arc::new(MockRunner::new());
        let orchestrator = Orchestrator::new(config, catalog(), runner.clone());

        let summary = orchestrator
            .run(
                &RunRequest::new(PipelineStep::GroupAnalysis)
                    .with_analyses(["image"])
                    .with_group_model("ttest"),
            )
            .await
            .unwrap();

        assert!(summary.units.is_empty());
        assert!(runner.requests().is_empty());
        let group = summary.group.unwrap();
        assert!(group.is_completed());
        assert_eq!(group.included, vec!["sub-01"]);
        assert_eq!(group.excluded.len(), 2);
    }
}
