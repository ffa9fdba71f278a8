// file: src/utils/telemetry.rs
// description: timing helpers for stage execution
// reference: structured tracing spans around long operations

use std::time::{Duration, Instant};
use tracing::{info, warn};

/// Logs when an operation starts and how long it took when it finishes.
pub struct OperationTimer {
    operation: String,
    start: Instant,
}

impl OperationTimer {
    pub fn new(operation: impl Into<String>) -> Self {
        let operation = operation.into();
        info!("Starting {}", operation);
        Self {
            operation,
            start: Instant::now(),
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    pub fn finish(self, outcome: &str) -> Duration {
        let elapsed = self.elapsed();
        info!(
            "Finished {} ({}) in {:.2}s",
            self.operation,
            outcome,
            elapsed.as_secs_f64()
        );
        elapsed
    }

    pub fn warn_if_slow(&self, threshold: Duration) {
        let elapsed = self.elapsed();
        if elapsed > threshold {
            warn!(
                "Slow operation [{}]: took {:.2}s (threshold: {:.2}s)",
                self.operation,
                elapsed.as_secs_f64(),
                threshold.as_secs_f64()
            );
        }
    }
}
