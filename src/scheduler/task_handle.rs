//! Task handles.
//!
//! A `TaskHandle` owns one task on behalf of the scheduler. It captures the
//! task's notifications from construction onward in an ordered channel and
//! carries the metadata the scheduler needs: description, sequential tag,
//! failure visibility and progress counters.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

use crate::core::state::{TaskEvent, TaskState};
use crate::core::task::{Task, lock};
use crate::core::types::SequentialTag;

/// Scheduling wrapper around a single task.
pub struct TaskHandle {
    task: Arc<Task>,
    description: String,
    sequential_tag: SequentialTag,
    silent_failure: bool,
    steps_total: AtomicU64,
    steps_made: AtomicU64,
    events: Mutex<Option<mpsc::UnboundedReceiver<TaskEvent>>>,
}

impl TaskHandle {
    /// Bind a task. Notifications emitted from now on are queued for the scheduler.
    pub fn new(task: Arc<Task>) -> Self {
        let events = task.subscribe();
        Self {
            description: task.name().to_string(),
            task,
            sequential_tag: SequentialTag::NONE,
            silent_failure: false,
            steps_total: AtomicU64::new(0),
            steps_made: AtomicU64::new(0),
            events: Mutex::new(Some(events)),
        }
    }

    /// Builder: set the description.
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Builder: set the sequential tag.
    pub fn with_sequential_tag(mut self, tag: impl Into<SequentialTag>) -> Self {
        self.sequential_tag = tag.into();
        self
    }

    /// Builder: suppress user-facing failure reports.
    pub fn with_silent_failure(mut self, silent: bool) -> Self {
        self.silent_failure = silent;
        self
    }

    pub fn set_description(&mut self, description: impl Into<String>) {
        self.description = description.into();
    }

    pub fn set_sequential_tag(&mut self, tag: impl Into<SequentialTag>) {
        self.sequential_tag = tag.into();
    }

    pub fn set_silent_failure(&mut self, silent: bool) {
        self.silent_failure = silent;
    }

    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn sequential_tag(&self) -> SequentialTag {
        self.sequential_tag
    }

    pub fn silent_failure(&self) -> bool {
        self.silent_failure
    }

    /// Steps announced so far.
    pub fn steps_total(&self) -> u64 {
        self.steps_total.load(Ordering::SeqCst)
    }

    /// Steps completed so far.
    pub fn steps_made(&self) -> u64 {
        self.steps_made.load(Ordering::SeqCst)
    }

    /// Current state of the wrapped task.
    pub fn state(&self) -> TaskState {
        self.task.state()
    }

    /// Take the notification channel. Only the first caller gets it.
    pub(crate) fn take_events(&self) -> Option<mpsc::UnboundedReceiver<TaskEvent>> {
        lock(&self.events).take()
    }

    /// Update the counters for a delivered notification.
    pub(crate) fn record(&self, event: &TaskEvent) {
        match event {
            TaskEvent::StepsAdded(steps) => {
                self.steps_total.fetch_add(*steps, Ordering::SeqCst);
            }
            TaskEvent::StepsCompleted(steps) => {
                self.steps_made.fetch_add(*steps, Ordering::SeqCst);
            }
            TaskEvent::StateChanged { .. } => {}
        }
    }

    /// Mark all announced steps as made and return how many were missing.
    pub(crate) fn settle_progress(&self) -> u64 {
        let total = self.steps_total();
        let made = self.steps_made();
        let missing = total.saturating_sub(made);
        self.steps_made.fetch_add(missing, Ordering::SeqCst);
        missing
    }
}

impl fmt::Debug for TaskHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskHandle")
            .field("task", &self.task)
            .field("description", &self.description)
            .field("sequential_tag", &self.sequential_tag)
            .field("silent_failure", &self.silent_failure)
            .field("steps_total", &self.steps_total())
            .field("steps_made", &self.steps_made())
            .finish()
    }
}
