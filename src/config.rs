// file: src/config.rs
// description: application configuration management with toml support
// reference: https://docs.rs/config

use crate::error::{PipelineError, Result};
use crate::executor::{Mode, Strategy};
use crate::models::{InitialInputs, Stage};
use dotenvy::dotenv;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub pipeline: PipelineConfig,
    pub executor: ExecutorConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    pub output_root: PathBuf,
    pub mode: Mode,
    pub start_stage: usize,
    pub allow_mock_fallback: bool,
    #[serde(default)]
    pub accessions: Vec<String>,
    #[serde(default)]
    pub accessions_file: Option<PathBuf>,
    /// Stage (index or name) to strategy, applied on top of the mode.
    #[serde(default)]
    pub overrides: BTreeMap<String, Strategy>,
    pub show_progress: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExecutorConfig {
    pub scripts_dir: PathBuf,
    /// Program used to run stage scripts; empty runs the script directly.
    #[serde(default)]
    pub interpreter: String,
    pub timeout_secs: u64,
    pub capture_logs: bool,
}

impl ExecutorConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self> {
        dotenv().ok();

        let defaults = config::Config::try_from(&Self::default_config())
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("DOMINOS")
                .separator("__")
                .try_parsing(true),
        );

        let settings = builder
            .build()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        let config: Config = settings
            .try_deserialize()
            .map_err(|e| PipelineError::Config(e.to_string()))?;

        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            pipeline: PipelineConfig {
                output_root: PathBuf::from("./dominos_output"),
                mode: Mode::Auto,
                start_stage: 1,
                allow_mock_fallback: false,
                accessions: vec![],
                accessions_file: None,
                overrides: BTreeMap::new(),
                show_progress: true,
            },
            executor: ExecutorConfig {
                scripts_dir: PathBuf::from("./scripts"),
                interpreter: "python3".to_string(),
                timeout_secs: 3600,
                capture_logs: true,
            },
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.executor.timeout_secs == 0 {
            return Err(PipelineError::Config(
                "timeout_secs must be greater than 0".to_string(),
            ));
        }

        self.start_stage()?;
        self.stage_overrides()?;

        Ok(())
    }

    pub fn start_stage(&self) -> Result<Stage> {
        Stage::from_index(self.pipeline.start_stage).ok_or_else(|| {
            PipelineError::Config(format!(
                "start_stage must be between 1 and {}, got {}",
                Stage::COUNT,
                self.pipeline.start_stage
            ))
        })
    }

    /// Overrides keyed by stage. Two keys naming the same stage (`3` and
    /// `extractor`) with different strategies are a configuration error.
    pub fn stage_overrides(&self) -> Result<BTreeMap<Stage, Strategy>> {
        let mut overrides = BTreeMap::new();
        for (key, strategy) in &self.pipeline.overrides {
            let stage = Stage::parse(key).ok_or_else(|| {
                PipelineError::Config(format!("unknown stage in overrides: {}", key))
            })?;
            if let Some(previous) = overrides.insert(stage, *strategy)
                && previous != *strategy
            {
                return Err(PipelineError::Config(format!(
                    "conflicting overrides for {}: {} and {}",
                    stage, previous, strategy
                )));
            }
        }
        Ok(overrides)
    }

    /// Sets the strategy for `stage`, replacing whatever key the configuration
    /// file used for the same stage.
    pub fn set_override(&mut self, stage: Stage, strategy: Strategy) {
        self.pipeline
            .overrides
            .retain(|key, _| Stage::parse(key) != Some(stage));
        self.pipeline
            .overrides
            .insert(stage.slug().to_string(), strategy);
    }

    pub fn initial_inputs(&self) -> InitialInputs {
        InitialInputs {
            accessions: self.pipeline.accessions.clone(),
            accessions_file: self.pipeline.accessions_file.clone(),
        }
    }
}
