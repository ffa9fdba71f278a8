// file: src/models/report.rs
// description: per-stage outcomes and the run report written at the output root
// reference: serialized with serde_json for postmortem inspection

use crate::error::{EXIT_STAGE_FAILED, EXIT_SUCCESS, PipelineError, Result};
use crate::executor::{ExecutionPlan, Strategy};
use crate::models::stage::Stage;
use crate::validation::{Violation, ViolationKind};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const RUN_REPORT_FILE: &str = "run_report.json";

/// `Pending -> Running -> {StageFailed | Completed}`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Pending,
    Running { stage: Stage },
    StageFailed { stage: Stage },
    Completed,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::StageFailed { .. } | RunState::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageOutcome {
    Passed,
    Failed,
    NotAttempted,
    /// Output certified by an earlier run and reused when resuming.
    Reused,
}

impl StageOutcome {
    pub fn label(self) -> &'static str {
        match self {
            StageOutcome::Passed => "passed",
            StageOutcome::Failed => "failed",
            StageOutcome::NotAttempted => "not attempted",
            StageOutcome::Reused => "reused",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FailureKind {
    SubprocessFailure,
    ValidationFailure,
    IoFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageFailure {
    pub kind: FailureKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(default)]
    pub timed_out: bool,
    /// Captured stdout/stderr or the mock generation error.
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub diagnostics: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub violations: Vec<Violation>,
}

impl StageFailure {
    pub fn subprocess(
        message: impl Into<String>,
        exit_code: Option<i32>,
        timed_out: bool,
        diagnostics: impl Into<String>,
    ) -> Self {
        Self {
            kind: FailureKind::SubprocessFailure,
            message: message.into(),
            exit_code,
            timed_out,
            diagnostics: diagnostics.into(),
            violations: Vec::new(),
        }
    }

    pub fn validation(violations: Vec<Violation>) -> Self {
        Self {
            kind: FailureKind::ValidationFailure,
            message: format!("{} validation violation(s)", violations.len()),
            exit_code: None,
            timed_out: false,
            diagnostics: String::new(),
            violations,
        }
    }

    pub fn io(error: &PipelineError) -> Self {
        Self {
            kind: FailureKind::IoFailure,
            message: error.to_string(),
            exit_code: None,
            timed_out: false,
            diagnostics: String::new(),
            violations: Vec::new(),
        }
    }

    pub fn has_violation(&self, kind: ViolationKind) -> bool {
        self.violations.iter().any(|v| v.kind == kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageReport {
    pub index: usize,
    pub stage: Stage,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub strategy: Option<Strategy>,
    pub outcome: StageOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_dir: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_path: Option<PathBuf>,
    #[serde(default)]
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<StageFailure>,
}

impl StageReport {
    pub fn not_attempted(stage: Stage, strategy: Option<Strategy>) -> Self {
        Self {
            index: stage.index(),
            stage,
            strategy,
            outcome: StageOutcome::NotAttempted,
            output_dir: None,
            manifest_path: None,
            duration_ms: 0,
            failure: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: String,
    pub finished_at: String,
    pub output_root: PathBuf,
    pub start_stage: Stage,
    pub state: RunState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan: Option<ExecutionPlan>,
    pub stages: Vec<StageReport>,
}

impl RunReport {
    pub fn exit_code(&self) -> u8 {
        match self.state {
            RunState::Completed => EXIT_SUCCESS,
            _ => EXIT_STAGE_FAILED,
        }
    }

    pub fn succeeded(&self) -> bool {
        self.state == RunState::Completed
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|report| report.stage == stage)
    }

    pub fn outcome(&self, stage: Stage) -> Option<StageOutcome> {
        self.stage(stage).map(|report| report.outcome)
    }

    pub fn count(&self, outcome: StageOutcome) -> usize {
        self.stages
            .iter()
            .filter(|report| report.outcome == outcome)
            .count()
    }

    /// Stages whose output is certified, whether produced now or reused.
    pub fn certified_count(&self) -> usize {
        self.count(StageOutcome::Passed) + self.count(StageOutcome::Reused)
    }

    pub fn first_failure(&self) -> Option<&StageReport> {
        self.stages
            .iter()
            .find(|report| report.outcome == StageOutcome::Failed)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write(&self, root: &Path) -> Result<PathBuf> {
        let path = root.join(RUN_REPORT_FILE);
        fs::write(&path, self.to_json()?).map_err(|e| PipelineError::file(&path, e))?;
        Ok(path)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = fs::read_to_string(path).map_err(|e| PipelineError::file(path, e))?;
        Ok(serde_json::from_str(&raw)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn report(state: RunState, outcomes: &[StageOutcome]) -> RunReport {
        RunReport {
            run_id: "run".to_string(),
            started_at: "2026-01-01T00:00:00Z".to_string(),
            finished_at: "2026-01-01T00:00:01Z".to_string(),
            output_root: PathBuf::from("/tmp/run"),
            start_stage: Stage::Harvester,
            state,
            plan: Some(ExecutionPlan::uniform(Strategy::Mock, Stage::Harvester)),
            stages: Stage::ALL
                .iter()
                .zip(outcomes)
                .map(|(stage, outcome)| StageReport {
                    outcome: *outcome,
                    ..StageReport::not_attempted(*stage, Some(Strategy::Mock))
                })
                .collect(),
        }
    }

    #[test]
    fn test_exit_codes() {
        let done = report(RunState::Completed, &[StageOutcome::Passed; 7]);
        assert_eq!(done.exit_code(), 0);
        assert_eq!(done.certified_count(), 7);

        let failed = report(
            RunState::StageFailed {
                stage: Stage::Extractor,
            },
            &[
                StageOutcome::Passed,
                StageOutcome::Passed,
                StageOutcome::Failed,
                StageOutcome::NotAttempted,
                StageOutcome::NotAttempted,
                StageOutcome::NotAttempted,
                StageOutcome::NotAttempted,
            ],
        );
        assert_eq!(failed.exit_code(), 1);
        assert_eq!(failed.first_failure().unwrap().stage, Stage::Extractor);
        assert_eq!(failed.count(StageOutcome::NotAttempted), 4);
    }

    #[test]
    fn test_report_file_round_trip() {
        let temp = TempDir::new().unwrap();
        let original = report(RunState::Completed, &[StageOutcome::Reused; 7]);
        let path = original.write(temp.path()).unwrap();
        assert_eq!(path, temp.path().join(RUN_REPORT_FILE));
        assert_eq!(RunReport::load(&path).unwrap(), original);
    }

    #[test]
    fn test_run_state_serialization() {
        let json = serde_json::to_string(&RunState::StageFailed {
            stage: Stage::CoOccurrence,
        })
        .unwrap();
        assert_eq!(json, r#"{"state":"stage_failed","stage":"co_occurrence"}"#);
        assert!(!RunState::Running { stage: Stage::Aligner }.is_terminal());
    }
}
