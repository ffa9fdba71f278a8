// file: src/main.rs
// description: commandline application entry point with command handling
// reference: application bootstrap and orchestration

use anyhow::{Context, Result};
use clap::{ArgAction, Parser, Subcommand};
use dominos::error::{EXIT_MISCONFIGURED, EXIT_STAGE_FAILED, EXIT_SUCCESS};
use dominos::executor::{Mode, Strategy};
use dominos::utils::logging::{format_error, format_info, format_run_report, format_success};
use dominos::{
    Config, PipelineError, PipelineOrchestrator, RunRequest, Stage, StatusReport, Validator,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(name = "dominos")]
#[command(version = "0.1.0")]
#[command(about = "Manifest-driven antimicrobial resistance analysis pipeline", long_about = None)]
struct Cli {
    #[arg(
        short,
        long,
        value_name = "FILE",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[arg(long, default_value_t = true, action = ArgAction::Set)]
    color: bool,

    #[arg(short, long, action = ArgAction::SetTrue)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the pipeline, or resume it from a later stage
    Run {
        #[arg(long, value_name = "MODE")]
        mode: Option<Mode>,

        #[arg(short, long, value_name = "DIR")]
        output_root: Option<PathBuf>,

        /// Stage to start from (1-7); earlier output must already be certified
        #[arg(long, value_name = "N")]
        start_stage: Option<usize>,

        #[arg(long = "accession", value_name = "ACC")]
        accessions: Vec<String>,

        #[arg(long, value_name = "FILE")]
        accessions_file: Option<PathBuf>,

        /// Per-stage strategy, e.g. `--override aligner=mock`
        #[arg(long = "override", value_name = "STAGE=STRATEGY", value_parser = parse_override)]
        overrides: Vec<(Stage, Strategy)>,

        #[arg(long, action = ArgAction::SetTrue)]
        allow_mock_fallback: bool,

        #[arg(long, action = ArgAction::SetTrue)]
        no_progress: bool,
    },

    /// Validate one manifest against its stage schema
    Validate {
        #[arg(long, value_name = "N")]
        stage: String,

        /// Manifest file, or the output directory for the terminal stage
        #[arg(long, value_name = "FILE")]
        manifest: PathBuf,
    },

    /// Re-validate what each stage left in an output root
    Status {
        #[arg(short, long, value_name = "DIR")]
        output_root: Option<PathBuf>,
    },

    /// Probe the platform and show the plan a run would use
    Doctor {
        #[arg(long, value_name = "MODE")]
        mode: Option<Mode>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    dominos::utils::logging::init_logger(cli.color, cli.verbose);

    match dispatch(cli).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            error!("{:#}", e);
            eprintln!("{}", format_error(&format!("{:#}", e)));
            let code = e
                .downcast_ref::<PipelineError>()
                .map(PipelineError::exit_code)
                .unwrap_or(EXIT_MISCONFIGURED);
            ExitCode::from(code)
        }
    }
}

async fn dispatch(cli: Cli) -> Result<u8> {
    info!("dominos AMR pipeline");
    let mut config = load_config(&cli.config)?;

    match cli.command {
        Commands::Run {
            mode,
            output_root,
            start_stage,
            accessions,
            accessions_file,
            overrides,
            allow_mock_fallback,
            no_progress,
        } => {
            if let Some(mode) = mode {
                config.pipeline.mode = mode;
            }
            if let Some(output_root) = output_root {
                config.pipeline.output_root = output_root;
            }
            if let Some(start_stage) = start_stage {
                config.pipeline.start_stage = start_stage;
            }
            if !accessions.is_empty() {
                config.pipeline.accessions = accessions;
            }
            if accessions_file.is_some() {
                config.pipeline.accessions_file = accessions_file;
            }
            for (stage, strategy) in overrides {
                config.set_override(stage, strategy);
            }
            config.pipeline.allow_mock_fallback |= allow_mock_fallback;
            if no_progress {
                config.pipeline.show_progress = false;
            }
            config.validate()?;
            cmd_run(config).await
        }
        Commands::Validate { stage, manifest } => cmd_validate(&stage, &manifest),
        Commands::Status { output_root } => {
            let root = output_root.unwrap_or(config.pipeline.output_root);
            cmd_status(&root)
        }
        Commands::Doctor { mode } => {
            if let Some(mode) = mode {
                config.pipeline.mode = mode;
            }
            cmd_doctor(config)
        }
    }
}

fn load_config(path: &Path) -> Result<Config> {
    info!("Loading configuration from: {}", path.display());
    if path.exists() {
        Config::load(Some(path)).context("Failed to load configuration")
    } else {
        warn!(
            "Config file {} not found, using default configuration",
            path.display()
        );
        Config::load(None).context("Failed to load configuration")
    }
}

async fn cmd_run(config: Config) -> Result<u8> {
    let request = RunRequest::from_config(&config)?;
    info!(
        "Running from stage {} in {} mode into {}",
        request.start.index(),
        request.mode,
        request.output_root.display()
    );

    let orchestrator = PipelineOrchestrator::new(config);
    let report = orchestrator.run(request).await?;

    println!("{}", format_run_report(&report));
    Ok(report.exit_code())
}

fn cmd_validate(stage: &str, manifest: &Path) -> Result<u8> {
    let stage = Stage::parse(stage)
        .ok_or_else(|| PipelineError::Config(format!("unknown stage: {}", stage)))?;

    let result = if stage.is_terminal() {
        Validator::validate_terminal(stage, manifest)
    } else {
        Validator::validate_file(stage, manifest).0
    };

    if result.passed() {
        println!(
            "{}",
            format_success(&format!("{} passes {} validation", manifest.display(), stage))
        );
        return Ok(EXIT_SUCCESS);
    }

    println!(
        "{}",
        format_error(&format!(
            "{} has {} violation(s)",
            manifest.display(),
            result.violations.len()
        ))
    );
    for violation in &result.violations {
        println!("    - {}", violation);
    }
    Ok(EXIT_STAGE_FAILED)
}

fn cmd_status(root: &Path) -> Result<u8> {
    if !root.is_dir() {
        println!(
            "{}",
            format_info(&format!("{} does not exist yet", root.display()))
        );
        return Ok(EXIT_SUCCESS);
    }
    println!("{}", StatusReport::inspect(root).format());
    Ok(EXIT_SUCCESS)
}

fn cmd_doctor(config: Config) -> Result<u8> {
    let request = RunRequest::from_config(&config)?;
    let orchestrator = PipelineOrchestrator::new(config);

    print!("{}", orchestrator.capabilities().format());
    match orchestrator.plan(&request) {
        Ok(plan) => {
            println!(
                "{}",
                format_success(&format!("{} mode plan: {}", request.mode, plan.describe()))
            );
            Ok(EXIT_SUCCESS)
        }
        Err(e) => {
            println!("{}", format_error(&e.to_string()));
            Ok(e.exit_code())
        }
    }
}

fn parse_override(value: &str) -> std::result::Result<(Stage, Strategy), String> {
    let (stage, strategy) = value
        .split_once('=')
        .ok_or_else(|| format!("expected STAGE=real|mock, got '{}'", value))?;
    let stage = Stage::parse(stage).ok_or_else(|| format!("unknown stage '{}'", stage))?;
    Ok((stage, strategy.parse()?))
}
