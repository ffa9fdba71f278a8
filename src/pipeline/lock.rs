// file: src/pipeline/lock.rs
// description: exclusive ownership of an output root for the lifetime of a run
// reference: lock file created with create_new

use crate::error::{PipelineError, Result};
use chrono::Utc;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

pub const LOCK_FILE: &str = ".dominos.lock";

/// Held while a run owns its output root; the lock file is removed on drop.
#[derive(Debug)]
pub struct RunLock {
    path: PathBuf,
}

impl RunLock {
    pub fn acquire(root: &Path, run_id: &str) -> Result<Self> {
        let path = root.join(LOCK_FILE);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
        {
            Ok(mut file) => {
                let payload = format!(
                    "{{\"run_id\":\"{}\",\"pid\":{},\"acquired_at\":\"{}\"}}\n",
                    run_id,
                    std::process::id(),
                    Utc::now().to_rfc3339()
                );
                file.write_all(payload.as_bytes())
                    .map_err(|e| PipelineError::file(&path, e))?;
                Ok(Self { path })
            }
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
                Err(PipelineError::Config(format!(
                    "output root {} is owned by another run (remove {} if that run is gone)",
                    root.display(),
                    path.display()
                )))
            }
            Err(e) => Err(PipelineError::file(&path, e)),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for RunLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!("Failed to release {}: {}", self.path.display(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_second_acquire_fails_until_released() {
        let temp = TempDir::new().unwrap();
        let lock = RunLock::acquire(temp.path(), "run-1").unwrap();
        assert!(lock.path().exists());

        let err = RunLock::acquire(temp.path(), "run-2").unwrap_err();
        assert!(matches!(err, PipelineError::Config(_)));

        drop(lock);
        assert!(!temp.path().join(LOCK_FILE).exists());
        assert!(RunLock::acquire(temp.path(), "run-3").is_ok());
    }
}
