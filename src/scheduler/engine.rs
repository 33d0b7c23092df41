//! Scheduler engine implementation.
//!
//! The scheduler is responsible for:
//! - Keeping the registry of submitted tasks keyed by UID
//! - Serializing tasks that share a sequential tag
//! - Dispatching tasks to the shared worker pool
//! - Aggregating progress across registered tasks
//! - Event emission
//!
//! All registry state is owned by a single loop task. Handles talk to it
//! through a command channel; task notifications reach it through one
//! forwarder per registered task.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::config::SchedulerConfig;
use crate::core::state::{TaskEvent, TaskState};
use crate::core::types::{SequentialTag, TaskUid};
use crate::events::{Event, EventBus};
use crate::execution::WorkerPool;

use super::handle::SchedulerHandle;
use super::task_handle::TaskHandle;
use super::types::{Progress, SchedulerCommand, SchedulerError};

/// A registered task.
struct Entry {
    handle: Arc<TaskHandle>,
    running_since: Option<Instant>,
}

/// Main scheduler for task execution.
pub struct TaskScheduler {
    config: SchedulerConfig,
    pool: WorkerPool,
    event_bus: Arc<EventBus>,
}

impl TaskScheduler {
    /// Create a scheduler with its own worker pool.
    pub fn new(config: SchedulerConfig) -> Self {
        let pool = WorkerPool::new(config.effective_worker_threads());
        Self {
            config,
            pool,
            event_bus: Arc::new(EventBus::new()),
        }
    }

    /// Set the event bus.
    pub fn with_event_bus(mut self, event_bus: EventBus) -> Self {
        self.event_bus = Arc::new(event_bus);
        self
    }

    /// Share an event bus with other components.
    pub fn with_shared_event_bus(mut self, event_bus: Arc<EventBus>) -> Self {
        self.event_bus = event_bus;
        self
    }

    /// Get the event bus.
    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    /// The worker pool tasks are dispatched to.
    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    /// Start the scheduler and return a handle for controlling it.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(self) -> (SchedulerHandle, JoinHandle<()>) {
        let (command_tx, command_rx) = mpsc::channel(self.config.command_buffer.max(1));
        let (notify_tx, notify_rx) = mpsc::unbounded_channel();

        tracing::info!(
            workers = self.pool.size(),
            command_buffer = self.config.command_buffer,
            "Starting task scheduler"
        );

        let handle = SchedulerHandle {
            command_tx,
            pool: self.pool.clone(),
        };

        let core = SchedulerLoop {
            shutdown_timeout: self.config.shutdown_timeout(),
            reset_progress_when_idle: self.config.reset_progress_when_idle,
            pool: self.pool,
            event_bus: self.event_bus,
            entries: HashMap::new(),
            tag_queues: HashMap::new(),
            steps_made: 0,
            steps_total: 0,
            waiters: HashMap::new(),
            notify_tx,
            shutdown_deadline: None,
            shutdown_waiters: Vec::new(),
        };

        let scheduler_task = tokio::spawn(async move {
            core.run(command_rx, notify_rx).await;
        });

        (handle, scheduler_task)
    }
}

/// State owned by the scheduler loop.
struct SchedulerLoop {
    shutdown_timeout: Duration,
    reset_progress_when_idle: bool,
    pool: WorkerPool,
    event_bus: Arc<EventBus>,
    entries: HashMap<TaskUid, Entry>,
    /// FIFO per exclusive tag. The front entry is the one dispatched.
    tag_queues: HashMap<SequentialTag, VecDeque<TaskUid>>,
    steps_made: u64,
    steps_total: u64,
    waiters: HashMap<TaskUid, Vec<oneshot::Sender<()>>>,
    notify_tx: mpsc::UnboundedSender<(TaskUid, TaskEvent)>,
    shutdown_deadline: Option<Instant>,
    shutdown_waiters: Vec<oneshot::Sender<()>>,
}

impl SchedulerLoop {
    /// Main scheduler loop.
    async fn run(
        mut self,
        mut command_rx: mpsc::Receiver<SchedulerCommand>,
        mut notify_rx: mpsc::UnboundedReceiver<(TaskUid, TaskEvent)>,
    ) {
        let mut commands_open = true;

        loop {
            let deadline = self.shutdown_deadline;

            tokio::select! {
                command = command_rx.recv(), if commands_open => {
                    match command {
                        Some(command) => self.handle_command(command).await,
                        None => {
                            tracing::debug!("All scheduler handles dropped");
                            commands_open = false;
                        }
                    }
                }

                Some((uid, event)) = notify_rx.recv() => {
                    self.handle_notification(uid, event).await;
                }

                _ = tokio::time::sleep_until(deadline.unwrap_or_else(Instant::now)), if deadline.is_some() => {
                    tracing::warn!(
                        "Graceful shutdown timeout ({:?}) exceeded with {} task(s) still registered",
                        self.shutdown_timeout,
                        self.entries.len()
                    );
                    self.complete_shutdown();
                    break;
                }
            }

            if self.shutdown_deadline.is_some() && self.entries.is_empty() {
                tracing::info!("All tasks drained, scheduler stopped");
                self.complete_shutdown();
                break;
            }
            if !commands_open && self.entries.is_empty() {
                break;
            }
        }
    }

    async fn handle_command(&mut self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::Submit {
                uid,
                handle,
                response,
            } => {
                let result = self.submit(uid, handle).await;
                let _ = response.send(result);
            }
            SchedulerCommand::Cancel { uid, response } => {
                let found = self.cancel(&uid);
                let _ = response.send(found);
            }
            SchedulerCommand::State { uid, response } => {
                let state = self
                    .entries
                    .get(&uid)
                    .map(|entry| entry.handle.state())
                    .unwrap_or(TaskState::Finished);
                let _ = response.send(state);
            }
            SchedulerCommand::Find { uid, response } => {
                let handle = self.entries.get(&uid).map(|entry| Arc::clone(&entry.handle));
                let _ = response.send(handle);
            }
            SchedulerCommand::AllHandles { response } => {
                let handles = self
                    .entries
                    .iter()
                    .map(|(uid, entry)| (uid.clone(), Arc::clone(&entry.handle)))
                    .collect();
                let _ = response.send(handles);
            }
            SchedulerCommand::Progress { response } => {
                let _ = response.send(Progress {
                    steps_made: self.steps_made,
                    steps_total: self.steps_total,
                    active_tasks: self.entries.len(),
                });
            }
            SchedulerCommand::Wait { uid, response } => {
                if self.entries.contains_key(&uid) {
                    self.waiters.entry(uid).or_default().push(response);
                } else {
                    let _ = response.send(());
                }
            }
            SchedulerCommand::Shutdown { response } => {
                self.shutdown_waiters.push(response);
                if self.shutdown_deadline.is_none() {
                    self.begin_shutdown();
                }
            }
        }
    }

    async fn submit(&mut self, uid: TaskUid, handle: TaskHandle) -> Result<(), SchedulerError> {
        if self.shutdown_deadline.is_some() {
            return Err(SchedulerError::ShuttingDown);
        }
        if self.entries.contains_key(&uid) {
            tracing::warn!(uid = %uid, "Rejecting task with duplicate uid");
            return Err(SchedulerError::DuplicateTask(uid.to_string()));
        }
        let state = handle.state();
        if !matches!(state, TaskState::Idle | TaskState::Cancelling) {
            tracing::warn!(uid = %uid, state = %state, "Rejecting task that is not idle");
            return Err(SchedulerError::TaskNotIdle {
                uid: uid.to_string(),
                state,
            });
        }

        let handle = Arc::new(handle);
        if let Some(mut events) = handle.take_events() {
            let notify_tx = self.notify_tx.clone();
            let forward_uid = uid.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    let terminal = matches!(
                        &event,
                        TaskEvent::StateChanged { state, .. } if state.is_terminal()
                    );
                    if notify_tx.send((forward_uid.clone(), event)).is_err() || terminal {
                        break;
                    }
                }
            });
        }

        self.entries.insert(
            uid.clone(),
            Entry {
                handle: Arc::clone(&handle),
                running_since: None,
            },
        );
        tracing::info!(
            uid = %uid,
            description = %handle.description(),
            tag = %handle.sequential_tag(),
            "Task submitted"
        );
        self.event_bus
            .emit(Event::task_added(uid.clone(), handle.description()))
            .await;

        let tag = handle.sequential_tag();
        if tag.is_exclusive() {
            let queue = self.tag_queues.entry(tag).or_default();
            queue.push_back(uid.clone());
            if queue.len() > 1 {
                tracing::debug!(uid = %uid, tag = %tag, position = queue.len() - 1, "Task queued behind its tag");
                return Ok(());
            }
        }
        self.dispatch(&handle);
        Ok(())
    }

    fn dispatch(&self, handle: &TaskHandle) {
        let _ = self.pool.dispatch(Arc::clone(handle.task()));
    }

    /// Request cancellation of a registered task. Returns whether it was found.
    fn cancel(&mut self, uid: &TaskUid) -> bool {
        let Some(entry) = self.entries.get(uid) else {
            return false;
        };
        let handle = Arc::clone(&entry.handle);
        handle.task().cancel();
        tracing::debug!(uid = %uid, "Cancellation requested");

        // A task waiting behind its tag is finalized now instead of when it reaches the front.
        let tag = handle.sequential_tag();
        if tag.is_exclusive() {
            if let Some(queue) = self.tag_queues.get_mut(&tag) {
                if queue.front() != Some(uid) {
                    if let Some(position) = queue.iter().position(|queued| queued == uid) {
                        queue.remove(position);
                        self.dispatch(&handle);
                    }
                }
            }
        }
        true
    }

    fn begin_shutdown(&mut self) {
        tracing::info!(
            "Graceful shutdown: cancelling {} task(s) (timeout: {:?})",
            self.entries.len(),
            self.shutdown_timeout
        );
        self.shutdown_deadline = Some(Instant::now() + self.shutdown_timeout);
        let uids: Vec<TaskUid> = self.entries.keys().cloned().collect();
        for uid in &uids {
            self.cancel(uid);
        }
    }

    fn complete_shutdown(&mut self) {
        for waiter in self.shutdown_waiters.drain(..) {
            let _ = waiter.send(());
        }
    }

    async fn handle_notification(&mut self, uid: TaskUid, event: TaskEvent) {
        let Some(entry) = self.entries.get_mut(&uid) else {
            tracing::debug!(uid = %uid, "Notification for unregistered task");
            return;
        };
        let handle = Arc::clone(&entry.handle);
        if let TaskEvent::StateChanged {
            state: TaskState::Running,
            ..
        } = &event
        {
            entry.running_since = Some(Instant::now());
        }
        handle.record(&event);

        match event {
            TaskEvent::StepsAdded(steps) => {
                self.steps_total += steps;
                self.emit_progress(&uid, &handle).await;
            }
            TaskEvent::StepsCompleted(steps) => {
                self.steps_made += steps;
                self.emit_progress(&uid, &handle).await;
            }
            TaskEvent::StateChanged { state, message } => {
                tracing::debug!(uid = %uid, state = %state, "Task state changed");
                self.event_bus
                    .emit(Event::task_state_changed(uid.clone(), state, message.clone()))
                    .await;
                if state.is_terminal() {
                    self.finish(uid, state, message).await;
                }
            }
        }
    }

    async fn emit_progress(&self, uid: &TaskUid, handle: &TaskHandle) {
        self.event_bus
            .emit(Event::task_progress(
                uid.clone(),
                handle.steps_made(),
                handle.steps_total(),
            ))
            .await;
    }

    /// Remove a task that reached a terminal state and start whatever it was blocking.
    async fn finish(&mut self, uid: TaskUid, state: TaskState, message: String) {
        let Some(entry) = self.entries.remove(&uid) else {
            return;
        };
        let handle = entry.handle;
        let duration = entry.running_since.map(|since| since.elapsed());
        self.steps_made += handle.settle_progress();

        match state {
            TaskState::Failed if !handle.silent_failure() => {
                tracing::error!(
                    uid = %uid,
                    description = %handle.description(),
                    message = %message,
                    "Task failed"
                );
                self.event_bus
                    .emit(Event::task_failure_reported(
                        uid.clone(),
                        handle.description(),
                        message.clone(),
                    ))
                    .await;
            }
            TaskState::Failed => {
                tracing::debug!(uid = %uid, message = %message, "Task failed silently");
            }
            _ => {
                tracing::info!(uid = %uid, state = %state, duration = ?duration, "Task completed");
            }
        }

        self.event_bus
            .emit(Event::task_completed(uid.clone(), state, message, duration))
            .await;

        if let Some(waiters) = self.waiters.remove(&uid) {
            for waiter in waiters {
                let _ = waiter.send(());
            }
        }

        self.advance_tag_queue(handle.sequential_tag(), &uid);

        if self.entries.is_empty() && self.reset_progress_when_idle {
            self.steps_made = 0;
            self.steps_total = 0;
        }
    }

    fn advance_tag_queue(&mut self, tag: SequentialTag, uid: &TaskUid) {
        if !tag.is_exclusive() {
            return;
        }
        let Some(queue) = self.tag_queues.get_mut(&tag) else {
            return;
        };

        let mut next = None;
        if queue.front() == Some(uid) {
            queue.pop_front();
            next = queue.front().cloned();
        } else {
            queue.retain(|queued| queued != uid);
        }
        if queue.is_empty() {
            self.tag_queues.remove(&tag);
        }

        if let Some(next) = next {
            if let Some(entry) = self.entries.get(&next) {
                tracing::debug!(uid = %next, tag = %tag, "Dispatching next task for tag");
                self.dispatch(&entry.handle);
            }
        }
    }
}
