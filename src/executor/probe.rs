// file: src/executor/probe.rs
// description: one-shot platform and tool availability probe run before a pipeline starts
// reference: executable lookup on PATH

use crate::models::{STAGE_TABLE, Stage, StageDescriptor};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Whether the real strategy can run one stage on this machine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageCapability {
    pub stage: Stage,
    pub available: bool,
    pub script: PathBuf,
    pub script_present: bool,
    pub missing_tools: Vec<String>,
    pub os_supported: bool,
}

impl StageCapability {
    pub fn reason(&self) -> Option<String> {
        if self.available {
            return None;
        }
        let mut reasons = Vec::new();
        if !self.os_supported {
            reasons.push(format!("{} tools are not available on {}", self.stage, env::consts::OS));
        }
        if !self.script_present {
            reasons.push(format!("script not found: {}", self.script.display()));
        }
        if !self.missing_tools.is_empty() {
            reasons.push(format!("not on PATH: {}", self.missing_tools.join(", ")));
        }
        Some(reasons.join("; "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CapabilityReport {
    pub stages: Vec<StageCapability>,
}

impl CapabilityReport {
    pub fn get(&self, stage: Stage) -> Option<&StageCapability> {
        self.stages.iter().find(|c| c.stage == stage)
    }

    pub fn all_available(&self) -> bool {
        self.stages.iter().all(|c| c.available)
    }

    pub fn format(&self) -> String {
        let mut output = format!(
            "Platform: {} ({})\n",
            env::consts::OS,
            env::consts::ARCH
        );
        for capability in &self.stages {
            let icon = if capability.available { "✓" } else { "✗" };
            output.push_str(&format!(
                "{} [{}/{}] {}",
                icon,
                capability.stage.index(),
                Stage::COUNT,
                capability.stage
            ));
            if let Some(reason) = capability.reason() {
                output.push_str(&format!("\n  {}", reason));
            }
            output.push('\n');
        }
        output
    }
}

/// Checks stage scripts and native tools. The result is consumed by strategy
/// selection only and never persisted.
#[derive(Debug, Clone)]
pub struct PlatformProbe {
    scripts_dir: PathBuf,
    search_path: Vec<PathBuf>,
    unix: bool,
}

impl PlatformProbe {
    pub fn new(scripts_dir: impl Into<PathBuf>) -> Self {
        let search_path = env::var_os("PATH")
            .map(|path| env::split_paths(&path).collect())
            .unwrap_or_default();
        Self {
            scripts_dir: scripts_dir.into(),
            search_path,
            unix: cfg!(unix),
        }
    }

    pub fn with_search_path(mut self, search_path: Vec<PathBuf>) -> Self {
        self.search_path = search_path;
        self
    }

    pub fn probe(&self) -> CapabilityReport {
        CapabilityReport {
            stages: STAGE_TABLE.iter().map(|d| self.probe_stage(d)).collect(),
        }
    }

    pub fn probe_stage(&self, descriptor: &StageDescriptor) -> StageCapability {
        let script = descriptor.script_path(&self.scripts_dir);
        let script_present = script.is_file();
        let missing_tools: Vec<String> = descriptor
            .native_tools
            .iter()
            .filter(|tool| self.find_executable(tool).is_none())
            .map(|tool| tool.to_string())
            .collect();
        let os_supported = self.unix || !descriptor.unix_only;
        let available = script_present && missing_tools.is_empty() && os_supported;

        debug!(
            "Probe {}: script={} missing_tools={:?} os_supported={}",
            descriptor.name, script_present, missing_tools, os_supported
        );

        StageCapability {
            stage: descriptor.stage,
            available,
            script,
            script_present,
            missing_tools,
            os_supported,
        }
    }

    pub fn find_executable(&self, name: &str) -> Option<PathBuf> {
        self.search_path
            .iter()
            .flat_map(|dir| candidates(dir, name))
            .find(|candidate| candidate.is_file())
    }
}

fn candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    if cfg!(windows) {
        vec![dir.join(format!("{}.exe", name)), dir.join(name)]
    } else {
        vec![dir.join(name)]
    }
}
