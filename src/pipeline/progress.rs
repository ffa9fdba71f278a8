// file: src/pipeline/progress.rs
// description: stage-level progress bar and counters for a pipeline run
// reference: uses indicatif for progress bars

use crate::models::{Stage, StageOutcome};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::sync::atomic::{AtomicUsize, Ordering};

pub struct StageProgress {
    main_bar: ProgressBar,
    detail_bar: ProgressBar,
    passed: AtomicUsize,
    failed: AtomicUsize,
    total: usize,
}

impl StageProgress {
    pub fn new(total_stages: usize, colored: bool) -> Self {
        let multi_progress = MultiProgress::new();
        let main_bar = create_progress_bar(&multi_progress, total_stages as u64, colored);
        let detail_bar = create_detail_bar(&multi_progress);
        Self::from_bars(main_bar, detail_bar, total_stages)
    }

    /// Tracks counts without drawing anything.
    pub fn hidden(total_stages: usize) -> Self {
        Self::from_bars(ProgressBar::hidden(), ProgressBar::hidden(), total_stages)
    }

    fn from_bars(main_bar: ProgressBar, detail_bar: ProgressBar, total: usize) -> Self {
        Self {
            main_bar,
            detail_bar,
            passed: AtomicUsize::new(0),
            failed: AtomicUsize::new(0),
            total,
        }
    }

    pub fn start_stage(&self, stage: Stage) {
        self.main_bar
            .set_message(format!("[{}/{}] {}", stage.index(), Stage::COUNT, stage));
    }

    pub fn finish_stage(&self, stage: Stage, outcome: StageOutcome) {
        match outcome {
            StageOutcome::Passed | StageOutcome::Reused => {
                self.passed.fetch_add(1, Ordering::SeqCst);
            }
            StageOutcome::Failed => {
                self.failed.fetch_add(1, Ordering::SeqCst);
            }
            StageOutcome::NotAttempted => return,
        }
        self.main_bar.inc(1);
        self.detail_bar
            .set_message(format!("{} {} | {}", stage, outcome.label(), self.summary()));
    }

    pub fn passed(&self) -> usize {
        self.passed.load(Ordering::SeqCst)
    }

    pub fn failed(&self) -> usize {
        self.failed.load(Ordering::SeqCst)
    }

    pub fn summary(&self) -> String {
        format!(
            "Passed: {}/{} | Failed: {}",
            self.passed(),
            self.total,
            self.failed()
        )
    }

    pub fn finish(&self) {
        if self.failed() > 0 {
            self.main_bar.abandon_with_message("Pipeline halted");
        } else {
            self.main_bar.finish_with_message("Pipeline complete");
        }
        self.detail_bar.finish_and_clear();
    }
}

impl Drop for StageProgress {
    fn drop(&mut self) {
        if !self.main_bar.is_finished() {
            self.finish();
        }
    }
}

fn create_progress_bar(multi_progress: &MultiProgress, total: u64, colored: bool) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(total));
    let template = if colored {
        "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} {msg}"
    } else {
        "{spinner} [{elapsed_precise}] [{bar:40}] {pos}/{len} {msg}"
    };
    match ProgressStyle::default_bar().template(template) {
        Ok(style) => bar.set_style(style.progress_chars(if colored { "█▓▒░" } else { "=>-" })),
        Err(e) => tracing::debug!("Falling back to default progress style: {}", e),
    }
    bar
}

fn create_detail_bar(multi_progress: &MultiProgress) -> ProgressBar {
    let bar = multi_progress.add(ProgressBar::new(0));
    if let Ok(style) = ProgressStyle::default_bar().template("{msg}") {
        bar.set_style(style);
    }
    bar
}
