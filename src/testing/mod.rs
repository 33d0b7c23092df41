//! Testing utilities for users of the taskloom library.
//!
//! This module provides ready-made task bodies and observers:
//!
//! - [`SleepTask`]: sleeps, then finishes (ignores cancellation)
//! - [`CooperativeTask`]: runs until cancelled or a deadline passes
//! - [`FailingTask`] / [`PanickingTask`]: fail by error or by panic
//! - [`IntervalLog`]: records when tasks ran, for overlap assertions
//! - [`RecordingHandler`]: captures scheduler events

use async_trait::async_trait;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use crate::core::state::TaskState;
use crate::core::task::{Runnable, Task, TaskContext, TaskError, TaskOutcome, lock};
use crate::core::types::TaskUid;
use crate::events::{Event, EventHandler};

/// A task that sleeps for a fixed duration and finishes.
///
/// It never checks for cancellation, so a cancel request only changes
/// the reported result.
pub struct SleepTask {
    duration: Duration,
}

impl SleepTask {
    pub fn new(duration: Duration) -> Self {
        Self { duration }
    }

    /// Build an idle [`Task`] with this body.
    pub fn task(name: impl Into<String>, duration: Duration) -> Arc<Task> {
        Task::new(name, Self::new(duration))
    }
}

#[async_trait]
impl Runnable for SleepTask {
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        ctx.add_steps(1);
        tokio::time::sleep(self.duration).await;
        ctx.complete_steps(1);
        Ok(TaskOutcome::finished(format!("{} slept", ctx.task_name())))
    }
}

/// A task that polls for cancellation until `limit` elapses.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use taskloom::testing::CooperativeTask;
///
/// let task = CooperativeTask::task("interactive", Duration::from_secs(5));
/// task.cancel();
/// ```
pub struct CooperativeTask {
    limit: Duration,
    poll_interval: Duration,
}

impl CooperativeTask {
    pub fn new(limit: Duration) -> Self {
        Self {
            limit,
            poll_interval: Duration::from_millis(2),
        }
    }

    /// Build an idle [`Task`] with this body.
    pub fn task(name: impl Into<String>, limit: Duration) -> Arc<Task> {
        Task::new(name, Self::new(limit))
    }
}

#[async_trait]
impl Runnable for CooperativeTask {
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        let deadline = Instant::now() + self.limit;
        while Instant::now() < deadline {
            if ctx.is_cancelled() {
                return Ok(TaskOutcome::cancelled("stopped on request"));
            }
            tokio::time::sleep(self.poll_interval).await;
        }
        Ok(TaskOutcome::finished("ran to the limit"))
    }
}

/// A task whose body returns an error.
pub struct FailingTask {
    message: String,
}

impl FailingTask {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build an idle [`Task`] with this body.
    pub fn task(name: impl Into<String>, message: impl Into<String>) -> Arc<Task> {
        Task::new(name, Self::new(message))
    }
}

#[async_trait]
impl Runnable for FailingTask {
    async fn run(&self, _ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        Err(TaskError::ExecutionFailed(self.message.clone()))
    }
}

/// A task whose body panics.
pub struct PanickingTask {
    message: String,
}

impl PanickingTask {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    /// Build an idle [`Task`] with this body.
    pub fn task(name: impl Into<String>, message: impl Into<String>) -> Arc<Task> {
        Task::new(name, Self::new(message))
    }
}

#[async_trait]
impl Runnable for PanickingTask {
    async fn run(&self, _ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        panic!("{}", self.message);
    }
}

/// When a recorded task body ran.
#[derive(Debug, Clone)]
pub struct Interval {
    pub name: String,
    pub start: Instant,
    pub end: Instant,
}

impl Interval {
    /// Whether the two intervals share any instant.
    pub fn overlaps(&self, other: &Interval) -> bool {
        self.start < other.end && other.start < self.end
    }
}

/// Shared log of task execution intervals.
#[derive(Clone, Default)]
pub struct IntervalLog {
    intervals: Arc<Mutex<Vec<Interval>>>,
}

impl IntervalLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// A sleeping task that records its running interval in this log.
    pub fn sleep_task(&self, name: impl Into<String>, duration: Duration) -> Arc<Task> {
        Task::new(
            name,
            RecordedSleep {
                duration,
                log: self.clone(),
            },
        )
    }

    /// Recorded intervals ordered by start time.
    pub fn intervals(&self) -> Vec<Interval> {
        let mut intervals = lock(&self.intervals).clone();
        intervals.sort_by_key(|i| i.start);
        intervals
    }

    /// Whether the named tasks ran at the same time.
    pub fn overlapped(&self, a: &str, b: &str) -> bool {
        let intervals = self.intervals();
        let find = |name: &str| intervals.iter().find(|i| i.name == name).cloned();
        match (find(a), find(b)) {
            (Some(a), Some(b)) => a.overlaps(&b),
            _ => false,
        }
    }

    /// Largest number of intervals active at one instant.
    pub fn max_overlap(&self) -> usize {
        let mut edges: Vec<(Instant, i32)> = Vec::new();
        for interval in self.intervals() {
            edges.push((interval.start, 1));
            edges.push((interval.end, -1));
        }
        // ends sort before starts at the same instant
        edges.sort();
        let mut current = 0i32;
        let mut peak = 0i32;
        for (_, delta) in edges {
            current += delta;
            peak = peak.max(current);
        }
        peak as usize
    }

    fn record(&self, interval: Interval) {
        lock(&self.intervals).push(interval);
    }
}

struct RecordedSleep {
    duration: Duration,
    log: IntervalLog,
}

#[async_trait]
impl Runnable for RecordedSleep {
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        let start = Instant::now();
        tokio::time::sleep(self.duration).await;
        self.log.record(Interval {
            name: ctx.task_name().to_string(),
            start,
            end: Instant::now(),
        });
        Ok(TaskOutcome::finished(""))
    }
}

/// Event handler that records every scheduler event.
#[derive(Default)]
pub struct RecordingHandler {
    events: tokio::sync::Mutex<Vec<Event>>,
}

impl RecordingHandler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// All events received so far.
    pub async fn events(&self) -> Vec<Event> {
        self.events.lock().await.clone()
    }

    /// States reported for `uid`, in delivery order.
    pub async fn states_for(&self, uid: &TaskUid) -> Vec<TaskState> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                Event::TaskStateChanged {
                    uid: event_uid,
                    state,
                    ..
                } if event_uid == uid => Some(*state),
                _ => None,
            })
            .collect()
    }

    /// Messages surfaced through the failure channel.
    pub async fn reported_failures(&self) -> Vec<String> {
        self.events
            .lock()
            .await
            .iter()
            .filter_map(|event| match event {
                Event::TaskFailureReported { message, .. } => Some(message.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl EventHandler for RecordingHandler {
    async fn handle(&self, event: &Event) {
        self.events.lock().await.push(event.clone());
    }
}
