// file: src/lib.rs
// description: library entry point and public api exports
// reference: rust library patterns
#![doc = include_str!(concat!(env!("CARGO_MANIFEST_DIR"), "/readme.md"))]

pub mod config;
pub mod error;
pub mod executor;
pub mod models;
pub mod pipeline;
pub mod utils;
pub mod validation;

pub use config::{Config, ExecutorConfig, PipelineConfig};
pub use error::{PipelineError, Result};
pub use executor::{
    ExecutionOutcome, ExecutionPlan, MockExecutor, Mode, PlatformProbe, RealExecutor,
    StageInvocation, Strategy, ToolExecutor,
};
pub use models::{
    ArtifactReference, ArtifactType, CertifiedManifest, InitialInputs, Manifest, RunReport,
    RunState, Stage, StageDescriptor, StageOutcome, StageReport, Upstream,
};
pub use pipeline::{PipelineOrchestrator, PipelineRun, RunRequest, StageRunner, StatusReport};
pub use utils::OperationTimer;
pub use validation::{SchemaRegistry, ValidationResult, Validator, Violation, ViolationKind};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_exports() {
        let config = Config::default_config();
        let request = RunRequest::from_config(&config).unwrap();
        assert_eq!(request.start, Stage::Harvester);
        assert_eq!(SchemaRegistry::all().len(), Stage::COUNT);
    }
}
