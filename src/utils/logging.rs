// file: src/utils/logging.rs
// description: Tracing subscriber initialization with optional ANSI coloring

use crate::models::{RunReport, StageOutcome, StageReport};
use colored::*;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// `RUST_LOG` wins over the verbosity flag when set.
pub fn init_logger(colored_output: bool, verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    colored::control::set_override(colored_output);

    let fmt_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(verbose)
        .with_line_number(verbose)
        .with_writer(std::io::stderr)
        .compact()
        .with_ansi(colored_output);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

pub fn format_success(msg: &str) -> String {
    format!("{} {}", "✓".green().bold(), msg.green())
}

pub fn format_error(msg: &str) -> String {
    format!("{} {}", "✗".red().bold(), msg.red())
}

pub fn format_warning(msg: &str) -> String {
    format!("{} {}", "⚠".yellow().bold(), msg.yellow())
}

pub fn format_info(msg: &str) -> String {
    format!("{} {}", "ℹ".blue().bold(), msg)
}

pub fn format_step(step: usize, total: usize, msg: &str) -> String {
    format!("{} {}", format!("[{}/{}]", step, total).cyan().bold(), msg)
}

pub fn format_stage(report: &StageReport, total: usize) -> String {
    let strategy = report
        .strategy
        .map(|s| format!(" ({})", s))
        .unwrap_or_default();
    let line = format!("{}{}: {}", report.stage, strategy, report.outcome.label());
    let line = match report.outcome {
        StageOutcome::Passed | StageOutcome::Reused => format_success(&line),
        StageOutcome::Failed => format_error(&line),
        StageOutcome::NotAttempted => line.dimmed().to_string(),
    };
    format_step(report.index, total, &line)
}

/// Human-readable run summary: one line per stage, then every violation and the
/// captured diagnostics of the failing stage.
pub fn format_run_report(report: &RunReport) -> String {
    let total = crate::models::Stage::COUNT;
    let mut lines: Vec<String> = report
        .stages
        .iter()
        .map(|stage| format_stage(stage, total))
        .collect();

    if let Some(failed) = report.first_failure()
        && let Some(failure) = &failed.failure
    {
        lines.push(format_error(&format!(
            "{} failed: {:?}: {}",
            failed.stage, failure.kind, failure.message
        )));
        for violation in &failure.violations {
            lines.push(format!("    - {}", violation));
        }
        for line in failure.diagnostics.lines() {
            lines.push(format!("    | {}", line));
        }
    }

    let summary = format!(
        "{}/{} stages certified, exit code {}",
        report.certified_count(),
        report.stages.len(),
        report.exit_code()
    );
    lines.push(if report.succeeded() {
        format_success(&summary)
    } else {
        format_warning(&summary)
    });
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::Strategy;
    use crate::models::{Stage, StageFailure};

    #[test]
    fn test_format_stage_mentions_strategy_and_outcome() {
        colored::control::set_override(false);
        let report = StageReport {
            outcome: StageOutcome::Failed,
            failure: Some(StageFailure::subprocess("exit 1", Some(1), false, "")),
            ..StageReport::not_attempted(Stage::Extractor, Some(Strategy::Real))
        };
        let line = format_stage(&report, 7);
        assert_eq!(line, "[3/7] ✗ Extractor (real): failed");
    }
}
