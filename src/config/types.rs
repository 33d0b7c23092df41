//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::execution::{WorkerPool, hardware_concurrency};

use super::error::ConfigError;

/// Scheduler configuration (taskloom.yaml).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Worker pool size. Defaults to the hardware concurrency; raised to 2 if lower.
    pub worker_threads: Option<usize>,
    /// Capacity of the scheduler command channel.
    pub command_buffer: usize,
    /// Reset the global progress counters whenever the registry empties.
    pub reset_progress_when_idle: bool,
    /// Seconds `shutdown` waits for cancelled tasks to finish.
    pub shutdown_timeout_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            worker_threads: None,
            command_buffer: 32,
            reset_progress_when_idle: true,
            shutdown_timeout_secs: 30,
        }
    }
}

impl SchedulerConfig {
    /// Builder: set the worker pool size.
    pub fn with_worker_threads(mut self, threads: usize) -> Self {
        self.worker_threads = Some(threads);
        self
    }

    /// Builder: set the command channel capacity.
    pub fn with_command_buffer(mut self, capacity: usize) -> Self {
        self.command_buffer = capacity;
        self
    }

    /// Builder: set the shutdown drain timeout.
    pub fn with_shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout_secs = timeout.as_secs();
        self
    }

    /// Builder: keep progress counters across idle periods.
    pub fn with_progress_reset(mut self, reset: bool) -> Self {
        self.reset_progress_when_idle = reset;
        self
    }

    /// Pool size actually used.
    pub fn effective_worker_threads(&self) -> usize {
        self.worker_threads
            .unwrap_or_else(hardware_concurrency)
            .max(WorkerPool::MIN_WORKERS)
    }

    /// Shutdown drain timeout.
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Check values that would prevent the scheduler from starting.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.command_buffer == 0 {
            return Err(ConfigError::InvalidConfig(
                "command_buffer must be at least 1".into(),
            ));
        }
        Ok(())
    }
}
