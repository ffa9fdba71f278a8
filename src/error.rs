// file: src/error.rs
// description: Custom error types and result type aliases
// reference: https://docs.rs/thiserror

use std::path::PathBuf;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

/// Exit code for a run where every stage passed.
pub const EXIT_SUCCESS: u8 = 0;
/// Exit code for a run halted by a stage failure.
pub const EXIT_STAGE_FAILED: u8 = 1;
/// Exit code for misconfiguration detected before any stage ran.
pub const EXIT_MISCONFIGURED: u8 = 2;

#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Platform unsupported for stage {stage}: {reason}")]
    PlatformUnsupported { stage: String, reason: String },

    #[error("Subprocess failure in {stage}: {message}")]
    Subprocess { stage: String, message: String },

    #[error("File operation failed for {path}: {source}")]
    FileOperation {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl PipelineError {
    pub fn file(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::FileOperation {
            path: path.into(),
            source,
        }
    }

    /// Fatal errors surface before any stage runs and map to their own exit code.
    pub fn is_fatal_setup(&self) -> bool {
        matches!(self, Self::Config(_) | Self::PlatformUnsupported { .. })
    }

    pub fn exit_code(&self) -> u8 {
        if self.is_fatal_setup() {
            EXIT_MISCONFIGURED
        } else {
            EXIT_STAGE_FAILED
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_setup_errors_map_to_misconfigured() {
        let err = PipelineError::Config("missing script".to_string());
        assert_eq!(err.exit_code(), EXIT_MISCONFIGURED);

        let err = PipelineError::PlatformUnsupported {
            stage: "Annotator".to_string(),
            reason: "amrfinder not on PATH".to_string(),
        };
        assert_eq!(err.exit_code(), EXIT_MISCONFIGURED);
    }

    #[test]
    fn test_runtime_errors_map_to_stage_failed() {
        let err = PipelineError::Subprocess {
            stage: "Extractor".to_string(),
            message: "exit status 1".to_string(),
        };
        assert_eq!(err.exit_code(), EXIT_STAGE_FAILED);
        assert!(err.to_string().contains("Extractor"));
    }
}
