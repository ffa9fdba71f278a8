// file: src/executor/real.rs
// description: runs the external stage script with a bounded timeout
// reference: https://docs.rs/tokio/latest/tokio/process

use crate::config::ExecutorConfig;
use crate::error::{PipelineError, Result};
use crate::executor::{ExecutionOutcome, ExecutionStatus, StageInvocation, Strategy, ToolExecutor};
use crate::models::{InitialInputs, Upstream};
use async_trait::async_trait;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tracing::{debug, info, warn};

const ACCESSIONS_FILE: &str = "accessions.txt";

/// Invokes `<interpreter> <scripts_dir>/<script> (--accessions FILE | --manifest FILE)
/// --output-dir DIR`. Any non-zero exit or a timeout is a failed execution.
#[derive(Debug, Clone)]
pub struct RealExecutor {
    scripts_dir: PathBuf,
    interpreter: String,
    timeout: Duration,
}

impl RealExecutor {
    pub fn new(config: &ExecutorConfig) -> Self {
        let scripts_dir =
            std::path::absolute(&config.scripts_dir).unwrap_or_else(|_| config.scripts_dir.clone());
        Self {
            scripts_dir,
            interpreter: config.interpreter.trim().to_string(),
            timeout: config.timeout(),
        }
    }

    pub fn script_path(&self, invocation: &StageInvocation<'_>) -> PathBuf {
        invocation.descriptor.script_path(&self.scripts_dir)
    }

    fn command(&self, invocation: &StageInvocation<'_>) -> Result<Command> {
        let script = self.script_path(invocation);
        if !script.is_file() {
            return Err(PipelineError::Config(format!(
                "stage script for {} not found: {}",
                invocation.descriptor.name,
                script.display()
            )));
        }

        let mut command = if self.interpreter.is_empty() {
            Command::new(&script)
        } else {
            let mut command = Command::new(&self.interpreter);
            command.arg(&script);
            command
        };

        match invocation.upstream {
            Upstream::Initial(inputs) => {
                let file = accessions_file(inputs, invocation.output_dir)?;
                command.arg("--accessions").arg(file);
            }
            Upstream::Manifest(manifest) => {
                command.arg("--manifest").arg(manifest.path());
            }
        }

        command
            .arg("--output-dir")
            .arg(invocation.output_dir)
            .current_dir(invocation.output_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        Ok(command)
    }
}

#[async_trait]
impl ToolExecutor for RealExecutor {
    fn strategy(&self) -> Strategy {
        Strategy::Real
    }

    async fn execute(&self, invocation: &StageInvocation<'_>) -> Result<ExecutionOutcome> {
        let stage = invocation.descriptor.name;
        let mut command = self.command(invocation)?;
        info!("Running {} ({:?})", stage, command.as_std());

        let mut child = command.spawn().map_err(|e| PipelineError::Subprocess {
            stage: stage.to_string(),
            message: format!("failed to spawn: {}", e),
        })?;

        let mut stdout = Captured::spawn(child.stdout.take());
        let mut stderr = Captured::spawn(child.stderr.take());

        let finished = timeout(self.timeout, async {
            let status = child.wait().await;
            stdout.finish().await;
            stderr.finish().await;
            status
        })
        .await;

        let status = match finished {
            Ok(result) => result.map_err(|e| PipelineError::Subprocess {
                stage: stage.to_string(),
                message: format!("failed to wait for process: {}", e),
            })?,
            Err(_) => {
                warn!("{} timed out after {}s", stage, self.timeout.as_secs());
                if let Err(e) = child.kill().await {
                    warn!("Failed to kill {}: {}", stage, e);
                }
                stdout.abort();
                stderr.abort();
                return Ok(ExecutionOutcome {
                    status: ExecutionStatus::TimedOut {
                        after: self.timeout,
                    },
                    stdout: stdout.text(),
                    stderr: stderr.text(),
                });
            }
        };

        let status = if status.success() {
            ExecutionStatus::Succeeded
        } else {
            ExecutionStatus::Failed {
                exit_code: status.code(),
                reason: format!("{} exited with {}", stage, status),
            }
        };

        debug!("{} finished: {:?}", stage, status);
        Ok(ExecutionOutcome {
            status,
            stdout: stdout.text(),
            stderr: stderr.text(),
        })
    }
}

/// One output pipe drained in the background, so whatever arrived before a
/// timeout is still available after the process is killed.
struct Captured {
    buffer: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
}

impl Captured {
    fn spawn<R>(pipe: Option<R>) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        let buffer = Arc::new(Mutex::new(Vec::new()));
        let reader = pipe.map(|mut pipe| {
            let sink = Arc::clone(&buffer);
            tokio::spawn(async move {
                let mut chunk = [0u8; 8192];
                loop {
                    match pipe.read(&mut chunk).await {
                        Ok(0) | Err(_) => break,
                        Ok(n) => {
                            if let Ok(mut buffer) = sink.lock() {
                                buffer.extend_from_slice(&chunk[..n]);
                            }
                        }
                    }
                }
            })
        });
        Self { buffer, reader }
    }

    /// Waits until the pipe reaches end of file.
    async fn finish(&mut self) {
        if let Some(reader) = self.reader.take()
            && let Err(e) = reader.await
        {
            debug!("Output reader ended abnormally: {}", e);
        }
    }

    fn abort(&mut self) {
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }

    fn text(&self) -> String {
        self.buffer
            .lock()
            .map(|buffer| String::from_utf8_lossy(&buffer).into_owned())
            .unwrap_or_default()
    }
}

/// The file handed to the first stage. A configured file is passed through
/// untouched; inline accessions are written into the stage directory.
fn accessions_file(inputs: &InitialInputs, output_dir: &Path) -> Result<PathBuf> {
    if inputs.accessions.is_empty() {
        if let Some(file) = &inputs.accessions_file {
            return Ok(std::path::absolute(file).unwrap_or_else(|_| file.clone()));
        }
    }

    let accessions = inputs.resolve_accessions()?;
    if accessions.is_empty() {
        return Err(PipelineError::Config(
            "the real Harvester needs at least one accession".to_string(),
        ));
    }

    fs::create_dir_all(output_dir).map_err(|e| PipelineError::file(output_dir, e))?;
    let path = output_dir.join(ACCESSIONS_FILE);
    let mut content = accessions.join("\n");
    content.push('\n');
    fs::write(&path, content).map_err(|e| PipelineError::file(&path, e))?;
    Ok(path)
}
