// file: src/pipeline/runner.rs
// description: runs exactly one stage and certifies what it left behind
// reference: executor outcome, then manifest validation

use crate::error::{PipelineError, Result};
use crate::executor::{ExecutionOutcome, ExecutionStatus, StageInvocation, ToolExecutor};
use crate::models::{
    CertifiedManifest, Stage, StageFailure, StageOutcome, StageReport, Upstream,
};
use crate::utils::OperationTimer;
use crate::validation::{REPORT_FILE_NAME, ValidationResult, Validator};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info, warn};

const SLOW_STAGE: Duration = Duration::from_secs(600);

/// What one stage produced.
#[derive(Debug)]
pub struct StageRun {
    pub report: StageReport,
    /// Absent when the executor failed and validation never ran.
    pub validation: Option<ValidationResult>,
    pub certified: Option<CertifiedManifest>,
}

impl StageRun {
    pub fn passed(&self) -> bool {
        self.report.outcome == StageOutcome::Passed
    }
}

pub struct StageRunner {
    capture_logs: bool,
}

impl StageRunner {
    pub fn new(capture_logs: bool) -> Self {
        Self { capture_logs }
    }

    pub async fn run(
        &self,
        stage: Stage,
        upstream: Upstream<'_>,
        executor: &dyn ToolExecutor,
        root: &Path,
    ) -> StageRun {
        let descriptor = stage.descriptor();
        let output_dir = descriptor.output_dir(root);
        let manifest_path = descriptor.manifest_path(root);
        let timer = OperationTimer::new(format!("stage {}", descriptor.dir_name()));

        let mut report = StageReport {
            outcome: StageOutcome::Failed,
            output_dir: Some(output_dir.clone()),
            manifest_path: manifest_path.clone(),
            ..StageReport::not_attempted(stage, Some(executor.strategy()))
        };

        if let Err(e) = prepare_output_dir(stage, &output_dir) {
            warn!("Cannot prepare {}: {}", output_dir.display(), e);
            report.failure = Some(StageFailure::io(&e));
            report.duration_ms = timer.elapsed_ms();
            return StageRun {
                report,
                validation: None,
                certified: None,
            };
        }

        let invocation = StageInvocation {
            descriptor,
            upstream,
            output_dir: &output_dir,
        };

        info!(
            "[{}/{}] Running {} ({})",
            stage.index(),
            Stage::COUNT,
            stage,
            executor.strategy()
        );

        let outcome = match executor.execute(&invocation).await {
            Ok(outcome) => outcome,
            Err(e) => {
                warn!("{} executor error: {}", stage, e);
                ExecutionOutcome::failed(None, e.to_string())
            }
        };

        if self.capture_logs
            && let Err(e) = write_logs(stage, &output_dir, &outcome)
        {
            warn!("Failed to keep logs for {}: {}", stage, e);
        }

        if !outcome.is_success() {
            report.failure = Some(subprocess_failure(&outcome));
            report.duration_ms = timer.finish("failed").as_millis() as u64;
            return StageRun {
                report,
                validation: None,
                certified: None,
            };
        }

        let (validation, certified) = match &manifest_path {
            Some(path) => Validator::validate_file(stage, path),
            None => (Validator::validate_terminal(stage, &output_dir), None),
        };

        if validation.passed() {
            report.outcome = StageOutcome::Passed;
        } else {
            for violation in &validation.violations {
                debug!("{} violation: {}", stage, violation);
            }
            report.failure = Some(StageFailure::validation(validation.violations.clone()));
        }

        timer.warn_if_slow(SLOW_STAGE);
        report.duration_ms = timer.finish(report.outcome.label()).as_millis() as u64;

        StageRun {
            report,
            validation: Some(validation),
            certified,
        }
    }
}

/// Creates the stage directory and removes output an earlier run may have left,
/// so nothing stale can be certified.
fn prepare_output_dir(stage: Stage, output_dir: &Path) -> Result<()> {
    fs::create_dir_all(output_dir).map_err(|e| PipelineError::file(output_dir, e))?;

    let stale = match stage.descriptor().manifest_file_name() {
        Some(name) => output_dir.join(name),
        None => output_dir.join(REPORT_FILE_NAME),
    };
    if stale.exists() {
        debug!("Removing stale {}", stale.display());
        fs::remove_file(&stale).map_err(|e| PipelineError::file(&stale, e))?;
    }
    Ok(())
}

fn write_logs(stage: Stage, output_dir: &Path, outcome: &ExecutionOutcome) -> Result<()> {
    for (stream, content) in [("stdout", &outcome.stdout), ("stderr", &outcome.stderr)] {
        let path: PathBuf = output_dir.join(format!("{}.{}.log", stage.slug(), stream));
        fs::write(&path, content).map_err(|e| PipelineError::file(&path, e))?;
    }
    Ok(())
}

fn subprocess_failure(outcome: &ExecutionOutcome) -> StageFailure {
    match &outcome.status {
        ExecutionStatus::Failed { exit_code, reason } => {
            StageFailure::subprocess(reason.clone(), *exit_code, false, outcome.diagnostics())
        }
        ExecutionStatus::TimedOut { after } => StageFailure::subprocess(
            format!("timed out after {}s", after.as_secs()),
            None,
            true,
            outcome.diagnostics(),
        ),
        ExecutionStatus::Succeeded => {
            StageFailure::subprocess("executor reported success", None, false, "")
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{MockExecutor, Strategy};
    use crate::models::{FailureKind, InitialInputs};
    use crate::validation::ViolationKind;
    use async_trait::async_trait;
    use tempfile::TempDir;

    struct Exits(i32);

    #[async_trait]
    impl ToolExecutor for Exits {
        fn strategy(&self) -> Strategy {
            Strategy::Real
        }

        async fn execute(&self, _invocation: &StageInvocation<'_>) -> Result<ExecutionOutcome> {
            Ok(ExecutionOutcome {
                stdout: "starting\n".to_string(),
                stderr: "boom\n".to_string(),
                ..ExecutionOutcome::failed(Some(self.0), format!("exit status {}", self.0))
            })
        }
    }

    /// Succeeds without writing anything.
    struct Silent;

    #[async_trait]
    impl ToolExecutor for Silent {
        fn strategy(&self) -> Strategy {
            Strategy::Real
        }

        async fn execute(&self, _invocation: &StageInvocation<'_>) -> Result<ExecutionOutcome> {
            Ok(ExecutionOutcome::succeeded())
        }
    }

    #[tokio::test]
    async fn test_mock_stage_is_certified() {
        let root = TempDir::new().unwrap();
        let inputs = InitialInputs::default();
        let run = StageRunner::new(true)
            .run(
                Stage::Harvester,
                Upstream::Initial(&inputs),
                &MockExecutor::new(),
                root.path(),
            )
            .await;

        assert!(run.passed(), "{:?}", run.report.failure);
        let certified = run.certified.unwrap();
        assert_eq!(certified.entries("genomes").len(), 2);
        assert!(root.path().join("01_harvester/harvester.stdout.log").exists());
    }

    #[tokio::test]
    async fn test_executor_failure_skips_validation() {
        let root = TempDir::new().unwrap();
        let inputs = InitialInputs::default();
        let run = StageRunner::new(true)
            .run(Stage::Harvester, Upstream::Initial(&inputs), &Exits(4), root.path())
            .await;

        assert_eq!(run.report.outcome, StageOutcome::Failed);
        assert!(run.validation.is_none());
        let failure = run.report.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::SubprocessFailure);
        assert_eq!(failure.exit_code, Some(4));
        assert!(failure.diagnostics.contains("boom"));
        assert_eq!(
            fs::read_to_string(root.path().join("01_harvester/harvester.stderr.log")).unwrap(),
            "boom\n"
        );
    }

    #[tokio::test]
    async fn test_stale_manifest_is_not_certified() {
        let root = TempDir::new().unwrap();
        let inputs = InitialInputs::default();
        let runner = StageRunner::new(false);

        let first = runner
            .run(
                Stage::Harvester,
                Upstream::Initial(&inputs),
                &MockExecutor::new(),
                root.path(),
            )
            .await;
        assert!(first.passed());

        let second = runner
            .run(Stage::Harvester, Upstream::Initial(&inputs), &Silent, root.path())
            .await;
        assert!(!second.passed());
        let validation = second.validation.unwrap();
        assert_eq!(validation.kinds(), vec![ViolationKind::ArtifactMissingError]);
        let failure = second.report.failure.unwrap();
        assert_eq!(failure.kind, FailureKind::ValidationFailure);
        assert!(failure.has_violation(ViolationKind::ArtifactMissingError));
        assert!(!failure.has_violation(ViolationKind::MalformedArtifactError));
        assert!(!root.path().join("01_harvester/harvester.stdout.log").exists());
    }
}
