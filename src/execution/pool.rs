//! Bounded worker pool.
//!
//! The `WorkerPool` runs task bodies on the tokio runtime with:
//! - A fixed number of concurrent slots enforced by a semaphore
//! - Cancelled-before-dispatch tasks finalized without taking a slot

use std::num::NonZeroUsize;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::core::state::TaskState;
use crate::core::task::Task;

/// Number of hardware threads reported by the platform (at least 1).
pub fn hardware_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
}

/// Fixed-size pool of execution slots.
///
/// Cloning yields another handle to the same slots.
#[derive(Clone)]
pub struct WorkerPool {
    size: usize,
    semaphore: Arc<Semaphore>,
}

impl WorkerPool {
    /// Smallest permitted pool size.
    pub const MIN_WORKERS: usize = 2;

    /// Create a pool with `size` slots, raised to [`Self::MIN_WORKERS`] if smaller.
    pub fn new(size: usize) -> Self {
        let size = if size < Self::MIN_WORKERS {
            warn!(
                requested = size,
                used = Self::MIN_WORKERS,
                "worker pool too small, raising to minimum"
            );
            Self::MIN_WORKERS
        } else {
            size
        };
        Self {
            size,
            semaphore: Arc::new(Semaphore::new(size)),
        }
    }

    /// Create a pool sized to the hardware concurrency.
    pub fn with_hardware_concurrency() -> Self {
        Self::new(hardware_concurrency().max(Self::MIN_WORKERS))
    }

    /// Number of slots.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Slots not currently held by a running task.
    pub fn available_permits(&self) -> usize {
        self.semaphore.available_permits()
    }

    /// Hand a task to the pool.
    ///
    /// The task moves to `Starting` and runs once a slot frees up. A task
    /// already marked `Cancelling`, or cancelled while waiting for a slot,
    /// goes straight to `Cancelled` without consuming one. The returned
    /// handle resolves to the task's final state and may be dropped.
    pub fn dispatch(&self, task: Arc<Task>) -> JoinHandle<TaskState> {
        if !task.mark_starting() {
            let state = task.state();
            debug!(task = %task.name(), state = %state, "task not dispatched to a worker");
            return tokio::spawn(async move { state });
        }

        let semaphore = Arc::clone(&self.semaphore);
        tokio::spawn(async move {
            // a task cancelled while waiting for a slot finalizes without one
            let _permit = tokio::select! {
                permit = semaphore.acquire_owned() => permit.ok(),
                _ = task.cancellation() => None,
            };
            task.run().await
        })
    }
}

impl Default for WorkerPool {
    fn default() -> Self {
        Self::with_hardware_concurrency()
    }
}
