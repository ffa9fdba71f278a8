// file: src/pipeline/orchestrator.rs
// description: drives the seven stages in order and stops at the first failure
// reference: state machine Pending -> Running -> StageFailed | Completed

use crate::config::Config;
use crate::error::{PipelineError, Result};
use crate::executor::{
    CapabilityReport, ExecutionPlan, MockExecutor, Mode, PlatformProbe, RealExecutor, Strategy,
    ToolExecutor,
};
use crate::models::{
    CertifiedManifest, InitialInputs, RunReport, RunState, Stage, StageOutcome, StageReport,
    Upstream,
};
use crate::pipeline::lock::RunLock;
use crate::pipeline::progress::StageProgress;
use crate::pipeline::runner::{StageRun, StageRunner};
use crate::validation::Validator;
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fs;
use std::io::IsTerminal;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// What to run and where.
#[derive(Debug, Clone)]
pub struct RunRequest {
    pub output_root: PathBuf,
    pub start: Stage,
    pub mode: Mode,
    pub inputs: InitialInputs,
    pub overrides: BTreeMap<Stage, Strategy>,
    pub allow_mock_fallback: bool,
}

impl RunRequest {
    pub fn new(output_root: impl Into<PathBuf>, mode: Mode) -> Self {
        Self {
            output_root: output_root.into(),
            start: Stage::Harvester,
            mode,
            inputs: InitialInputs::default(),
            overrides: BTreeMap::new(),
            allow_mock_fallback: false,
        }
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(Self {
            output_root: config.pipeline.output_root.clone(),
            start: config.start_stage()?,
            mode: config.pipeline.mode,
            inputs: config.initial_inputs(),
            overrides: config.stage_overrides()?,
            allow_mock_fallback: config.pipeline.allow_mock_fallback,
        })
    }

    pub fn starting_at(mut self, stage: Stage) -> Self {
        self.start = stage;
        self
    }

    pub fn with_inputs(mut self, inputs: InitialInputs) -> Self {
        self.inputs = inputs;
        self
    }
}

/// Mutable state of one run. Only the output tree outlives it.
#[derive(Debug)]
pub struct PipelineRun {
    id: String,
    root: PathBuf,
    start: Stage,
    plan: ExecutionPlan,
    state: RunState,
    started_at: DateTime<Utc>,
    manifests: BTreeMap<Stage, CertifiedManifest>,
    reports: Vec<StageReport>,
}

impl PipelineRun {
    pub fn new(root: impl Into<PathBuf>, start: Stage, plan: ExecutionPlan) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            root: root.into(),
            start,
            plan,
            state: RunState::Pending,
            started_at: Utc::now(),
            manifests: BTreeMap::new(),
            reports: Vec::with_capacity(Stage::COUNT),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn plan(&self) -> &ExecutionPlan {
        &self.plan
    }

    pub fn manifest(&self, stage: Stage) -> Option<&CertifiedManifest> {
        self.manifests.get(&stage)
    }

    /// The input of `stage`: initial inputs for the first stage, otherwise the
    /// manifest certified for its predecessor.
    pub fn upstream<'a>(&'a self, stage: Stage, inputs: &'a InitialInputs) -> Result<Upstream<'a>> {
        match stage.previous() {
            None => Ok(Upstream::Initial(inputs)),
            Some(previous) => self
                .manifests
                .get(&previous)
                .map(Upstream::Manifest)
                .ok_or_else(|| {
                    PipelineError::Config(format!(
                        "{} cannot start: no certified manifest for {}",
                        stage, previous
                    ))
                }),
        }
    }

    /// Records output certified by an earlier run.
    pub fn record_reused(&mut self, stage: Stage, manifest: Option<CertifiedManifest>) {
        let descriptor = stage.descriptor();
        self.reports.push(StageReport {
            outcome: StageOutcome::Reused,
            output_dir: Some(descriptor.output_dir(&self.root)),
            manifest_path: descriptor.manifest_path(&self.root),
            ..StageReport::not_attempted(stage, None)
        });
        if let Some(manifest) = manifest {
            self.manifests.insert(stage, manifest);
        }
    }

    pub fn begin(&mut self, stage: Stage) {
        self.state = RunState::Running { stage };
    }

    /// Stores the stage's result. Returns whether the run may advance; on
    /// failure every later stage is marked not attempted.
    pub fn record(&mut self, run: StageRun) -> bool {
        let stage = run.report.stage;
        let passed = run.passed();
        self.reports.push(run.report);

        if passed {
            if let Some(manifest) = run.certified {
                self.manifests.insert(stage, manifest);
            }
            if stage.is_terminal() {
                self.state = RunState::Completed;
            }
            return true;
        }

        self.state = RunState::StageFailed { stage };
        let mut next = stage.next();
        while let Some(later) = next {
            self.reports
                .push(StageReport::not_attempted(later, self.plan.strategy(later)));
            next = later.next();
        }
        false
    }

    pub fn finish(self) -> RunReport {
        RunReport {
            run_id: self.id,
            started_at: self.started_at.to_rfc3339(),
            finished_at: Utc::now().to_rfc3339(),
            output_root: self.root,
            start_stage: self.start,
            state: self.state,
            plan: Some(self.plan),
            stages: self.reports,
        }
    }
}

pub struct PipelineOrchestrator {
    config: Config,
    probe: PlatformProbe,
    injected: BTreeMap<Stage, Arc<dyn ToolExecutor>>,
    show_progress: bool,
}

impl PipelineOrchestrator {
    pub fn new(config: Config) -> Self {
        let probe = PlatformProbe::new(&config.executor.scripts_dir);
        let show_progress = config.pipeline.show_progress;
        Self {
            config,
            probe,
            injected: BTreeMap::new(),
            show_progress,
        }
    }

    /// Uses `executor` for `stage` regardless of mode or probe.
    pub fn with_executor(mut self, stage: Stage, executor: Arc<dyn ToolExecutor>) -> Self {
        self.injected.insert(stage, executor);
        self
    }

    pub fn with_probe(mut self, probe: PlatformProbe) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn capabilities(&self) -> CapabilityReport {
        let mut report = self.probe.probe();
        for capability in &mut report.stages {
            if self.injected.contains_key(&capability.stage) {
                capability.available = true;
            }
        }
        report
    }

    pub fn plan(&self, request: &RunRequest) -> Result<ExecutionPlan> {
        let mut plan = ExecutionPlan::select(
            request.mode,
            &self.capabilities(),
            &request.overrides,
            request.allow_mock_fallback,
            request.start,
        )?;

        for (stage, executor) in &self.injected {
            if let Some(slot) = plan.strategies.get_mut(stage) {
                *slot = executor.strategy();
                if !plan.overridden.contains(stage) {
                    plan.overridden.push(*stage);
                }
            }
        }
        Ok(plan)
    }

    pub async fn run(&self, request: RunRequest) -> Result<RunReport> {
        let root = prepare_root(&request.output_root)?;
        let plan = self.plan(&request)?;
        info!("Execution plan: {}", plan.describe());
        self.preflight(&request, &plan)?;

        let executors = self.executors(&plan);
        let mut run = PipelineRun::new(&root, request.start, plan);
        let _lock = RunLock::acquire(&root, run.id())?;
        info!("Run {} owns {}", run.id(), root.display());

        resume(&mut run, &root, request.start)?;

        let progress = if self.show_progress && std::io::stderr().is_terminal() {
            StageProgress::new(
                Stage::COUNT - request.start.index() + 1,
                colored::control::SHOULD_COLORIZE.should_colorize(),
            )
        } else {
            StageProgress::hidden(Stage::COUNT - request.start.index() + 1)
        };

        let runner = StageRunner::new(self.config.executor.capture_logs);
        for stage in Stage::ALL.into_iter().filter(|s| *s >= request.start) {
            let executor = executors.get(&stage).ok_or_else(|| {
                PipelineError::Config(format!("no executor selected for {}", stage))
            })?;

            run.begin(stage);
            progress.start_stage(stage);
            let stage_run = {
                let upstream = run.upstream(stage, &request.inputs)?;
                runner.run(stage, upstream, executor.as_ref(), &root).await
            };
            progress.finish_stage(stage, stage_run.report.outcome);

            if !run.record(stage_run) {
                error!("{} failed, halting run", stage);
                break;
            }
        }
        progress.finish();

        let report = run.finish();
        match report.write(&root) {
            Ok(path) => info!("Run report written to {}", path.display()),
            Err(e) => warn!("Failed to write run report: {}", e),
        }
        Ok(report)
    }

    /// Structural checks that must pass before any stage runs.
    fn preflight(&self, request: &RunRequest, plan: &ExecutionPlan) -> Result<()> {
        for (stage, strategy) in &plan.strategies {
            if *strategy != Strategy::Real || self.injected.contains_key(stage) {
                continue;
            }
            let script = stage.descriptor().script_path(&self.config.executor.scripts_dir);
            if !script.is_file() {
                return Err(PipelineError::Config(format!(
                    "stage script for {} not found: {}",
                    stage,
                    script.display()
                )));
            }
        }

        if let Some(file) = &request.inputs.accessions_file
            && !file.is_file()
        {
            return Err(PipelineError::Config(format!(
                "accessions file not found: {}",
                file.display()
            )));
        }

        let real_harvest = request.start == Stage::Harvester
            && plan.strategy(Stage::Harvester) == Some(Strategy::Real)
            && !self.injected.contains_key(&Stage::Harvester);
        if real_harvest && request.inputs.is_empty() {
            return Err(PipelineError::Config(
                "the real Harvester needs accessions (--accession or --accessions-file)"
                    .to_string(),
            ));
        }
        Ok(())
    }

    fn executors(&self, plan: &ExecutionPlan) -> BTreeMap<Stage, Arc<dyn ToolExecutor>> {
        let real: Arc<dyn ToolExecutor> = Arc::new(RealExecutor::new(&self.config.executor));
        let mock: Arc<dyn ToolExecutor> = Arc::new(MockExecutor::new());
        plan.strategies
            .iter()
            .map(|(stage, strategy)| {
                let executor = match self.injected.get(stage) {
                    Some(injected) => Arc::clone(injected),
                    None if *strategy == Strategy::Real => Arc::clone(&real),
                    None => Arc::clone(&mock),
                };
                (*stage, executor)
            })
            .collect()
    }
}

/// Creates the output root and pins it to an absolute path.
fn prepare_root(output_root: &Path) -> Result<PathBuf> {
    fs::create_dir_all(output_root).map_err(|e| {
        PipelineError::Config(format!(
            "cannot create output root {}: {}",
            output_root.display(),
            e
        ))
    })?;
    fs::canonicalize(output_root).map_err(|e| PipelineError::file(output_root, e))
}

/// Re-certifies every stage before `start`, in order, from the existing
/// output tree and records each one as reused. The first stage that no longer
/// validates stops the resume.
fn resume(run: &mut PipelineRun, root: &Path, start: Stage) -> Result<()> {
    if start.previous().is_none() {
        return Ok(());
    }

    for stage in Stage::ALL.into_iter().filter(|s| *s < start) {
        let descriptor = stage.descriptor();
        let (validation, certified, checked) = match descriptor.manifest_path(root) {
            Some(path) => {
                let (validation, certified) = Validator::validate_file(stage, &path);
                (validation, certified, path)
            }
            None => {
                let output_dir = descriptor.output_dir(root);
                (Validator::validate_terminal(stage, &output_dir), None, output_dir)
            }
        };

        if !validation.passed() {
            let details = validation
                .violations
                .iter()
                .map(|v| v.to_string())
                .collect::<Vec<_>>()
                .join("; ");
            return Err(PipelineError::Config(format!(
                "cannot resume at {}: {} output {} is not certifiable ({})",
                start,
                stage,
                checked.display(),
                details
            )));
        }
        debug!("{} re-certified from {}", stage, checked.display());
        run.record_reused(stage, certified);
    }

    info!("Resuming at {} from {}", start, root.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::StageFailure;

    fn passed(stage: Stage) -> StageRun {
        StageRun {
            report: StageReport {
                outcome: StageOutcome::Passed,
                ..StageReport::not_attempted(stage, Some(Strategy::Mock))
            },
            validation: None,
            certified: None,
        }
    }

    fn failed(stage: Stage) -> StageRun {
        StageRun {
            report: StageReport {
                outcome: StageOutcome::Failed,
                failure: Some(StageFailure::subprocess("exit 1", Some(1), false, "")),
                ..StageReport::not_attempted(stage, Some(Strategy::Mock))
            },
            validation: None,
            certified: None,
        }
    }

    #[test]
    fn test_state_machine_early_exit() {
        let plan = ExecutionPlan::uniform(Strategy::Mock, Stage::Harvester);
        let mut run = PipelineRun::new("/tmp/root", Stage::Harvester, plan);
        assert_eq!(run.state(), RunState::Pending);

        run.begin(Stage::Harvester);
        assert!(run.record(passed(Stage::Harvester)));
        run.begin(Stage::Annotator);
        assert_eq!(run.state(), RunState::Running { stage: Stage::Annotator });
        assert!(!run.record(failed(Stage::Annotator)));

        let report = run.finish();
        assert_eq!(report.state, RunState::StageFailed { stage: Stage::Annotator });
        assert_eq!(report.stages.len(), 7);
        assert_eq!(report.count(StageOutcome::NotAttempted), 5);
        assert_eq!(report.exit_code(), 1);
    }

    #[test]
    fn test_terminal_stage_completes_run() {
        let plan = ExecutionPlan::uniform(Strategy::Mock, Stage::Reporter);
        let mut run = PipelineRun::new("/tmp/root", Stage::Reporter, plan);
        for stage in Stage::ALL.into_iter().filter(|s| *s < Stage::Reporter) {
            run.record_reused(stage, None);
        }
        run.begin(Stage::Reporter);
        assert!(run.record(passed(Stage::Reporter)));
        assert_eq!(run.state(), RunState::Completed);

        let report = run.finish();
        assert_eq!(report.count(StageOutcome::Reused), 6);
        assert_eq!(report.exit_code(), 0);
    }

    async fn mock_tree(root: &Path) {
        let mut config = Config::default_config();
        config.pipeline.show_progress = false;
        let report = PipelineOrchestrator::new(config)
            .run(RunRequest::new(root, Mode::Mock))
            .await
            .unwrap();
        assert!(report.succeeded());
    }

    #[tokio::test]
    async fn test_resume_recertifies_every_earlier_stage() {
        let temp = tempfile::TempDir::new().unwrap();
        mock_tree(temp.path()).await;

        let plan = ExecutionPlan::uniform(Strategy::Mock, Stage::Analyzer);
        let mut run = PipelineRun::new(temp.path(), Stage::Analyzer, plan);
        resume(&mut run, temp.path(), Stage::Analyzer).unwrap();

        for stage in [Stage::Harvester, Stage::Annotator, Stage::Extractor, Stage::Aligner] {
            let certified = run.manifest(stage).unwrap();
            assert_eq!(certified.stage(), stage);
        }
        assert!(run.manifest(Stage::Analyzer).is_none());
        assert!(matches!(
            run.upstream(Stage::Analyzer, &InitialInputs::default()),
            Ok(Upstream::Manifest(_))
        ));
        assert_eq!(run.finish().count(StageOutcome::Reused), 4);
    }

    #[tokio::test]
    async fn test_resume_stops_at_first_uncertifiable_stage() {
        let temp = tempfile::TempDir::new().unwrap();
        mock_tree(temp.path()).await;
        fs::remove_file(temp.path().join("02_annotator/annotator_manifest.json")).unwrap();

        let plan = ExecutionPlan::uniform(Strategy::Mock, Stage::Analyzer);
        let mut run = PipelineRun::new(temp.path(), Stage::Analyzer, plan);
        let err = resume(&mut run, temp.path(), Stage::Analyzer).unwrap_err();

        assert!(matches!(err, PipelineError::Config(ref message) if message.contains("Annotator")));
        assert!(run.manifest(Stage::Harvester).is_some());
        assert!(run.manifest(Stage::Extractor).is_none());
    }

    #[test]
    fn test_upstream_requires_certified_predecessor() {
        let plan = ExecutionPlan::uniform(Strategy::Mock, Stage::Harvester);
        let run = PipelineRun::new("/tmp/root", Stage::Harvester, plan);
        let inputs = InitialInputs::default();
        assert!(matches!(
            run.upstream(Stage::Harvester, &inputs),
            Ok(Upstream::Initial(_))
        ));
        assert!(matches!(
            run.upstream(Stage::Aligner, &inputs),
            Err(PipelineError::Config(_))
        ));
    }
}
