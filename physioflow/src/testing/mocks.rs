//! Mock stage runner for testing.

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::PathBuf;

use crate::core::StageOutcome;
use crate::stages::{Invocation, StageRequest, StageRunner};

#[derive(Debug, Clone)]
struct Failure {
    stage: String,
    analysis: Option<String>,
    subject: Option<String>,
}

impl Failure {
    fn matches(&self, request: &StageRequest) -> bool {
        self.stage == request.stage
            && self.analysis.as_ref().map_or(true, |a| request.analysis.as_ref() == Some(a))
            && self.subject.as_ref().map_or(true, |s| *s == request.subject)
    }
}

/// A runner that records every request and fails the ones it was told to.
///
/// Failed requests report exit status 1; everything else succeeds with a
/// log path under `logs/`.
#[derive(Debug, Default)]
pub struct MockRunner {
    failures: Vec<Failure>,
    failing_launches: Vec<String>,
    requests: Mutex<Vec<StageRequest>>,
    invocations: Mutex<Vec<Invocation>>,
}

impl MockRunner {
    /// Creates a runner where everything succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Fails `stage` for every subject.
    #[must_use]
    pub fn fail_stage(mut self, stage: &str) -> Self {
        self.failures.push(Failure {
            stage: stage.to_string(),
            analysis: None,
            subject: None,
        });
        self
    }

    /// Fails `stage` when it runs `analysis`.
    #[must_use]
    pub fn fail_analysis(mut self, stage: &str, analysis: &str) -> Self {
        self.failures.push(Failure {
            stage: stage.to_string(),
            analysis: Some(analysis.to_string()),
            subject: None,
        });
        self
    }

    /// Fails `stage` for one subject only.
    #[must_use]
    pub fn fail_subject_stage(mut self, subject: &str, stage: &str) -> Self {
        self.failures.push(Failure {
            stage: stage.to_string(),
            analysis: None,
            subject: Some(subject.to_string()),
        });
        self
    }

    /// Fails launches whose stage label is `stage`.
    #[must_use]
    pub fn fail_launch(mut self, stage: &str) -> Self {
        self.failing_launches.push(stage.to_string());
        self
    }

    /// Every request seen, in arrival order.
    #[must_use]
    pub fn requests(&self) -> Vec<StageRequest> {
        self.requests.lock().clone()
    }

    /// Stage names of every request, in arrival order.
    #[must_use]
    pub fn stages_run(&self) -> Vec<String> {
        self.requests.lock().iter().map(|r| r.stage.clone()).collect()
    }

    /// Every launched invocation, in arrival order.
    #[must_use]
    pub fn invocations(&self) -> Vec<Invocation> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl StageRunner for MockRunner {
    async fn run(&self, request: &StageRequest) -> StageOutcome {
        self.requests.lock().push(request.clone());
        let started_at = Utc::now();

        let outcome = if self.failures.iter().any(|f| f.matches(request)) {
            StageOutcome::failed(
                &request.stage,
                &request.subject,
                &request.session,
                started_at,
                format!("Error in {} step for subject {}", request.stage, request.subject),
            )
            .with_exit_status(1)
        } else {
            StageOutcome::ok(&request.stage, &request.subject, &request.session, started_at)
        };
        outcome
            .with_analysis(request.analysis.clone())
            .with_log_path(PathBuf::from("logs").join(request.log_file_name()))
    }

    async fn launch(&self, invocation: &Invocation) -> StageOutcome {
        self.invocations.lock().push(invocation.clone());
        let started_at = Utc::now();

        let outcome = if self.failing_launches.contains(&invocation.stage) {
            StageOutcome::failed(
                &invocation.stage,
                &invocation.subject,
                &invocation.session,
                started_at,
                format!("{} exited with status 1", invocation.program),
            )
            .with_exit_status(1)
        } else {
            StageOutcome::ok(&invocation.stage, &invocation.subject, &invocation.session, started_at)
        };
        outcome
            .with_analysis(invocation.analysis.clone())
            .with_log_path(invocation.log_path.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_scripted_failures() {
        let runner = MockRunner::new()
            .fail_analysis("glm", "image")
            .fail_subject_stage("sub-02", "preprocess_anat");

        let glm = StageRequest::new("glm", "sub-01", "1");
        assert!(runner.run(&glm.clone().with_analysis("image")).await.is_failure());
        assert!(runner.run(&glm.with_analysis("pain")).await.is_success());
        assert!(runner.run(&StageRequest::new("preprocess_anat", "sub-01", "1")).await.is_success());

        let failed = runner.run(&StageRequest::new("preprocess_anat", "sub-02", "1")).await;
        assert_eq!(failed.exit_status, Some(1));
        assert_eq!(runner.stages_run().len(), 4);
    }

    #[tokio::test]
    async fn test_launch_is_recorded() {
        let runner = MockRunner::new().fail_launch("group_mask");
        let invocation = Invocation::new("group_mask", "3dmask_tool", "logs/mask.log");

        assert!(runner.launch(&invocation).await.is_failure());
        assert_eq!(runner.invocations()[0].program, "3dmask_tool");
    }
}
