// file: src/executor/mod.rs
// description: tool executor abstraction with real and mock strategies
// reference: https://docs.rs/async-trait

pub mod mock;
pub mod plan;
pub mod probe;
pub mod real;

pub use mock::MockExecutor;
pub use plan::{ExecutionPlan, Mode};
pub use probe::{CapabilityReport, PlatformProbe, StageCapability};
pub use real::RealExecutor;

use crate::error::Result;
use crate::models::{StageDescriptor, Upstream};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// How a stage's domain work gets done.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// Run the external stage script and its native tools.
    Real,
    /// Write deterministic placeholder output.
    Mock,
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strategy::Real => f.write_str("real"),
            Strategy::Mock => f.write_str("mock"),
        }
    }
}

impl std::str::FromStr for Strategy {
    type Err = String;

    fn from_str(value: &str) -> std::result::Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "real" => Ok(Strategy::Real),
            "mock" => Ok(Strategy::Mock),
            other => Err(format!("unknown strategy '{}' (expected real or mock)", other)),
        }
    }
}

/// Everything an executor needs to run one stage. Paths are explicit; nothing
/// depends on the process working directory.
#[derive(Debug, Clone, Copy)]
pub struct StageInvocation<'a> {
    pub descriptor: &'static StageDescriptor,
    pub upstream: Upstream<'a>,
    pub output_dir: &'a Path,
}

impl StageInvocation<'_> {
    /// Where the stage must write its manifest, if it has one.
    pub fn manifest_path(&self) -> Option<PathBuf> {
        self.descriptor
            .manifest_file_name()
            .map(|name| self.output_dir.join(name))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionStatus {
    Succeeded,
    Failed {
        exit_code: Option<i32>,
        reason: String,
    },
    TimedOut {
        after: Duration,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    pub status: ExecutionStatus,
    pub stdout: String,
    pub stderr: String,
}

impl ExecutionOutcome {
    pub fn succeeded() -> Self {
        Self {
            status: ExecutionStatus::Succeeded,
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn failed(exit_code: Option<i32>, reason: impl Into<String>) -> Self {
        Self {
            status: ExecutionStatus::Failed {
                exit_code,
                reason: reason.into(),
            },
            stdout: String::new(),
            stderr: String::new(),
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == ExecutionStatus::Succeeded
    }

    /// Captured output for failure reports, stderr first.
    pub fn diagnostics(&self) -> String {
        let mut text = String::new();
        if !self.stderr.trim().is_empty() {
            text.push_str("--- stderr ---\n");
            text.push_str(self.stderr.trim_end());
            text.push('\n');
        }
        if !self.stdout.trim().is_empty() {
            text.push_str("--- stdout ---\n");
            text.push_str(self.stdout.trim_end());
            text.push('\n');
        }
        text
    }
}

/// Does one stage's domain work and leaves its manifest and artifacts in the
/// invocation's output directory.
#[async_trait]
pub trait ToolExecutor: Send + Sync {
    fn strategy(&self) -> Strategy;

    async fn execute(&self, invocation: &StageInvocation<'_>) -> Result<ExecutionOutcome>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strategy_parsing() {
        assert_eq!("Mock".parse::<Strategy>(), Ok(Strategy::Mock));
        assert_eq!(" real ".parse::<Strategy>(), Ok(Strategy::Real));
        assert!("dry".parse::<Strategy>().is_err());
    }

    #[test]
    fn test_diagnostics_put_stderr_first() {
        let outcome = ExecutionOutcome {
            status: ExecutionStatus::Failed {
                exit_code: Some(2),
                reason: "exit status 2".to_string(),
            },
            stdout: "downloading\n".to_string(),
            stderr: "amrfinder: database missing\n".to_string(),
        };
        let text = outcome.diagnostics();
        assert!(text.starts_with("--- stderr ---\namrfinder"));
        assert!(text.contains("--- stdout ---\ndownloading"));
        assert!(!outcome.is_success());
    }
}
