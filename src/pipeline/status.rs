// file: src/pipeline/status.rs
// description: inspects an existing output root and re-validates each stage
// reference: https://docs.rs/walkdir

use crate::models::{RUN_REPORT_FILE, RunReport, Stage};
use crate::pipeline::lock::LOCK_FILE;
use crate::utils::logging::{format_error, format_info, format_step, format_success};
use crate::validation::{ValidationResult, Validator, Violation};
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageState {
    /// No output directory.
    Absent,
    Certified { mock: bool },
    Invalid { violations: Vec<Violation> },
}

#[derive(Debug, Clone)]
pub struct StageStatus {
    pub stage: Stage,
    pub output_dir: PathBuf,
    pub files: usize,
    pub state: StageState,
}

#[derive(Debug, Clone)]
pub struct StatusReport {
    pub root: PathBuf,
    pub locked: bool,
    pub last_run: Option<RunReport>,
    pub stages: Vec<StageStatus>,
}

impl StatusReport {
    /// Walks `root` and re-validates whatever each stage left there.
    pub fn inspect(root: &Path) -> Self {
        let stages = Stage::ALL
            .iter()
            .map(|stage| inspect_stage(root, *stage))
            .collect();

        let report_path = root.join(RUN_REPORT_FILE);
        let last_run = if report_path.is_file() {
            match RunReport::load(&report_path) {
                Ok(report) => Some(report),
                Err(e) => {
                    tracing::warn!("Ignoring unreadable {}: {}", report_path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        Self {
            root: root.to_path_buf(),
            locked: root.join(LOCK_FILE).exists(),
            last_run,
            stages,
        }
    }

    /// Stages certified without a gap from the first one.
    pub fn certified_prefix(&self) -> usize {
        self.stages
            .iter()
            .take_while(|s| matches!(s.state, StageState::Certified { .. }))
            .count()
    }

    pub fn format(&self) -> String {
        let mut lines = vec![format_info(&format!("Output root: {}", self.root.display()))];
        if self.locked {
            lines.push(format_info("A run currently owns this root"));
        }
        if let Some(run) = &self.last_run {
            lines.push(format_info(&format!(
                "Last run {} finished {} (exit code {})",
                run.run_id,
                run.finished_at,
                run.exit_code()
            )));
        }

        for status in &self.stages {
            let line = match &status.state {
                StageState::Absent => format!("{}: absent", status.stage),
                StageState::Certified { mock } => format_success(&format!(
                    "{}: certified{} ({} files)",
                    status.stage,
                    if *mock { ", mock" } else { "" },
                    status.files
                )),
                StageState::Invalid { violations } => format_error(&format!(
                    "{}: {} violation(s)",
                    status.stage,
                    violations.len()
                )),
            };
            lines.push(format_step(status.stage.index(), Stage::COUNT, &line));
            if let StageState::Invalid { violations } = &status.state {
                for violation in violations {
                    lines.push(format!("    - {}", violation));
                }
            }
        }

        lines.push(format!(
            "Resumable from stage {}",
            (self.certified_prefix() + 1).min(Stage::COUNT)
        ));
        lines.join("\n")
    }
}

fn inspect_stage(root: &Path, stage: Stage) -> StageStatus {
    let descriptor = stage.descriptor();
    let output_dir = descriptor.output_dir(root);

    if !output_dir.is_dir() {
        return StageStatus {
            stage,
            output_dir,
            files: 0,
            state: StageState::Absent,
        };
    }

    let files = WalkDir::new(&output_dir)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_file())
        .count();

    let (validation, mock): (ValidationResult, bool) = match descriptor.manifest_path(root) {
        Some(path) => {
            let (validation, certified) = Validator::validate_file(stage, &path);
            let mock = certified.map(|m| m.is_mock()).unwrap_or(false);
            (validation, mock)
        }
        None => (Validator::validate_terminal(stage, &output_dir), false),
    };

    let state = if validation.passed() {
        StageState::Certified { mock }
    } else {
        StageState::Invalid {
            violations: validation.violations,
        }
    };

    StageStatus {
        stage,
        output_dir,
        files,
        state,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::{MockExecutor, StageInvocation};
    use crate::models::{InitialInputs, Upstream};
    use crate::validation::ViolationKind;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_partial_tree() {
        let root = TempDir::new().unwrap();
        let inputs = InitialInputs::default();
        let descriptor = Stage::Harvester.descriptor();
        let output_dir = descriptor.output_dir(root.path());
        MockExecutor::new()
            .generate(&StageInvocation {
                descriptor,
                upstream: Upstream::Initial(&inputs),
                output_dir: &output_dir,
            })
            .unwrap();
        fs::create_dir_all(Stage::Annotator.descriptor().output_dir(root.path())).unwrap();

        let status = StatusReport::inspect(root.path());
        assert_eq!(status.stages[0].state, StageState::Certified { mock: true });
        assert_eq!(status.stages[0].files, 4);
        match &status.stages[1].state {
            StageState::Invalid { violations } => {
                assert_eq!(violations[0].kind, ViolationKind::ArtifactMissingError)
            }
            other => panic!("unexpected state {:?}", other),
        }
        assert_eq!(status.stages[2].state, StageState::Absent);
        assert_eq!(status.certified_prefix(), 1);
        assert!(!status.locked);
        assert!(status.format().contains("Resumable from stage 2"));
    }
}
