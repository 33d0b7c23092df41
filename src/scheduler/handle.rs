//! Scheduler handle for talking to the scheduler.
//!
//! This module provides the `SchedulerHandle` type: the cloneable front end
//! every producer of asynchronous work holds. Registry operations are sent
//! as commands to the scheduler loop; direct execution goes straight to the
//! shared worker pool.

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

use crate::core::state::TaskState;
use crate::core::task::Task;
use crate::core::types::TaskUid;
use crate::execution::WorkerPool;

use super::task_handle::TaskHandle;
use super::types::{Progress, SchedulerCommand, SchedulerError};

/// Handle for controlling the scheduler.
#[derive(Clone)]
pub struct SchedulerHandle {
    pub(crate) command_tx: mpsc::Sender<SchedulerCommand>,
    pub(crate) pool: WorkerPool,
}

impl SchedulerHandle {
    /// Helper to send a command and wait for its response.
    async fn send_command<T>(
        &self,
        build_command: impl FnOnce(oneshot::Sender<T>) -> SchedulerCommand,
        operation: &str,
    ) -> Result<T, SchedulerError> {
        let (response_tx, response_rx) = oneshot::channel();
        self.command_tx
            .send(build_command(response_tx))
            .await
            .map_err(|_| {
                SchedulerError::ChannelError(format!("failed to send {} command", operation))
            })?;

        response_rx.await.map_err(|_| {
            SchedulerError::ChannelError(format!("failed to receive {} response", operation))
        })
    }

    /// Register a task under `uid` and dispatch it.
    ///
    /// Fails with [`SchedulerError::DuplicateTask`] if `uid` is already
    /// registered; the existing task is left untouched and `handle` is dropped.
    pub async fn submit(
        &self,
        handle: TaskHandle,
        uid: impl Into<TaskUid>,
    ) -> Result<(), SchedulerError> {
        let uid = uid.into();
        self.send_command(
            |response| SchedulerCommand::Submit {
                uid,
                handle,
                response,
            },
            "submit",
        )
        .await?
    }

    /// Request cancellation. Returns whether `uid` was registered.
    pub async fn cancel(&self, uid: impl Into<TaskUid>) -> Result<bool, SchedulerError> {
        let uid = uid.into();
        self.send_command(|response| SchedulerCommand::Cancel { uid, response }, "cancel")
            .await
    }

    /// State of a registered task, or `Finished` if `uid` is not registered.
    pub async fn state(&self, uid: impl Into<TaskUid>) -> Result<TaskState, SchedulerError> {
        let uid = uid.into();
        self.send_command(|response| SchedulerCommand::State { uid, response }, "state")
            .await
    }

    /// The handle registered under `uid`.
    pub async fn find(
        &self,
        uid: impl Into<TaskUid>,
    ) -> Result<Option<Arc<TaskHandle>>, SchedulerError> {
        let uid = uid.into();
        self.send_command(|response| SchedulerCommand::Find { uid, response }, "find")
            .await
    }

    /// Snapshot of every registered handle.
    pub async fn all_handles(&self) -> Result<HashMap<TaskUid, Arc<TaskHandle>>, SchedulerError> {
        self.send_command(
            |response| SchedulerCommand::AllHandles { response },
            "all_handles",
        )
        .await
    }

    /// Aggregate progress over registered tasks.
    pub async fn progress(&self) -> Result<Progress, SchedulerError> {
        self.send_command(|response| SchedulerCommand::Progress { response }, "progress")
            .await
    }

    /// Wait until `uid` has finished and left the registry.
    ///
    /// Resolves immediately if `uid` is not registered. The terminal state is
    /// read from the task itself, which stays valid after deregistration.
    pub async fn wait(&self, uid: impl Into<TaskUid>) -> Result<(), SchedulerError> {
        let uid = uid.into();
        self.send_command(|response| SchedulerCommand::Wait { uid, response }, "wait")
            .await
    }

    /// Cancel every registered task, wait for them to drain and stop the scheduler.
    pub async fn shutdown(&self) -> Result<(), SchedulerError> {
        self.send_command(|response| SchedulerCommand::Shutdown { response }, "shutdown")
            .await
    }

    /// Run a task on the worker pool without registering it.
    ///
    /// The task gets no UID, no progress aggregation and no events on the
    /// scheduler's bus; it only shares the pool's concurrency limit.
    pub fn run_direct(&self, task: Arc<Task>) -> JoinHandle<TaskState> {
        self.pool.dispatch(task)
    }

    /// The shared worker pool.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }
}
