// file: src/models/mod.rs
// description: data models module exports
// reference: internal module structure

pub mod artifact;
pub mod manifest;
pub mod report;
pub mod stage;

pub use artifact::{ArtifactReference, ArtifactType, resolve_artifact_path};
pub use manifest::{
    CertifiedManifest, InitialInputs, MOCK_MARKER, Manifest, ManifestLoadError, TEST_MODE_KEY,
    Upstream,
};
pub use report::{
    FailureKind, RUN_REPORT_FILE, RunReport, RunState, StageFailure, StageOutcome, StageReport,
};
pub use stage::{STAGE_TABLE, Stage, StageDescriptor};
