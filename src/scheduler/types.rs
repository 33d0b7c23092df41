//! Scheduler type definitions.
//!
//! This module contains error types, progress snapshots and command types
//! for the scheduler.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::oneshot;

use crate::core::state::TaskState;
use crate::core::types::TaskUid;

use super::task_handle::TaskHandle;

/// Errors that can occur in the scheduler.
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// A task with this UID is already registered.
    #[error("task already registered: {0}")]
    DuplicateTask(String),

    /// The task has already been dispatched or finished elsewhere.
    #[error("task {uid} cannot be submitted in state {state}")]
    TaskNotIdle { uid: String, state: TaskState },

    /// The scheduler is draining and accepts no new work.
    #[error("scheduler is shutting down")]
    ShuttingDown,

    /// Channel error.
    #[error("channel error: {0}")]
    ChannelError(String),
}

/// Aggregate progress over all registered tasks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Progress {
    /// Steps reported as done.
    pub steps_made: u64,
    /// Steps announced.
    pub steps_total: u64,
    /// Tasks currently registered.
    pub active_tasks: usize,
}

impl Progress {
    /// Completion ratio in `[0, 1]`; `1.0` when nothing was announced.
    pub fn fraction(&self) -> f64 {
        if self.steps_total == 0 {
            1.0
        } else {
            (self.steps_made as f64 / self.steps_total as f64).min(1.0)
        }
    }
}

/// Commands that can be sent to the scheduler.
pub(crate) enum SchedulerCommand {
    /// Register and dispatch a task.
    Submit {
        uid: TaskUid,
        handle: TaskHandle,
        response: oneshot::Sender<Result<(), SchedulerError>>,
    },
    /// Request cancellation of a registered task.
    Cancel {
        uid: TaskUid,
        response: oneshot::Sender<bool>,
    },
    /// Query a task's state.
    State {
        uid: TaskUid,
        response: oneshot::Sender<TaskState>,
    },
    /// Look up a registered handle.
    Find {
        uid: TaskUid,
        response: oneshot::Sender<Option<Arc<TaskHandle>>>,
    },
    /// Snapshot of the registry.
    AllHandles {
        response: oneshot::Sender<HashMap<TaskUid, Arc<TaskHandle>>>,
    },
    /// Global progress snapshot.
    Progress { response: oneshot::Sender<Progress> },
    /// Resolve once the task has left the registry.
    Wait {
        uid: TaskUid,
        response: oneshot::Sender<()>,
    },
    /// Cancel everything and stop.
    Shutdown { response: oneshot::Sender<()> },
}
