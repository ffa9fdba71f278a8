// file: src/pipeline/mod.rs
// description: pipeline module exports and public api
// reference: pipeline orchestration

mod lock;
mod orchestrator;
mod progress;
mod runner;
mod status;

pub use lock::{LOCK_FILE, RunLock};
pub use orchestrator::{PipelineOrchestrator, PipelineRun, RunRequest};
pub use progress::StageProgress;
pub use runner::{StageRun, StageRunner};
pub use status::{StageState, StageStatus, StatusReport};
