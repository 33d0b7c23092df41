//! Scheduler events and event handling.
//!
//! This module provides broadcast of task lifecycle events from the
//! scheduler to any number of observers (progress views, loggers).

use async_trait::async_trait;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;

use crate::core::state::TaskState;
use crate::core::types::TaskUid;

/// Lifecycle events emitted by the scheduler.
#[derive(Debug, Clone)]
pub enum Event {
    /// A task was accepted into the registry.
    TaskAdded {
        uid: TaskUid,
        description: String,
        timestamp: Instant,
    },

    /// A registered task changed state.
    TaskStateChanged {
        uid: TaskUid,
        state: TaskState,
        message: String,
        timestamp: Instant,
    },

    /// A registered task reported progress.
    TaskProgress {
        uid: TaskUid,
        steps_made: u64,
        steps_total: u64,
        timestamp: Instant,
    },

    /// A registered task reached a terminal state and left the registry.
    TaskCompleted {
        uid: TaskUid,
        state: TaskState,
        message: String,
        /// Time spent running, when the task was observed running.
        duration: Option<Duration>,
        timestamp: Instant,
    },

    /// A task failure that should be shown to the user.
    TaskFailureReported {
        uid: TaskUid,
        description: String,
        message: String,
        timestamp: Instant,
    },
}

impl Event {
    /// Get the timestamp of the event.
    pub fn timestamp(&self) -> Instant {
        match self {
            Event::TaskAdded { timestamp, .. } => *timestamp,
            Event::TaskStateChanged { timestamp, .. } => *timestamp,
            Event::TaskProgress { timestamp, .. } => *timestamp,
            Event::TaskCompleted { timestamp, .. } => *timestamp,
            Event::TaskFailureReported { timestamp, .. } => *timestamp,
        }
    }

    /// The task the event concerns.
    pub fn uid(&self) -> &TaskUid {
        match self {
            Event::TaskAdded { uid, .. } => uid,
            Event::TaskStateChanged { uid, .. } => uid,
            Event::TaskProgress { uid, .. } => uid,
            Event::TaskCompleted { uid, .. } => uid,
            Event::TaskFailureReported { uid, .. } => uid,
        }
    }

    /// Create a TaskAdded event.
    pub fn task_added(uid: TaskUid, description: impl Into<String>) -> Self {
        Event::TaskAdded {
            uid,
            description: description.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskStateChanged event.
    pub fn task_state_changed(uid: TaskUid, state: TaskState, message: impl Into<String>) -> Self {
        Event::TaskStateChanged {
            uid,
            state,
            message: message.into(),
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskProgress event.
    pub fn task_progress(uid: TaskUid, steps_made: u64, steps_total: u64) -> Self {
        Event::TaskProgress {
            uid,
            steps_made,
            steps_total,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskCompleted event.
    pub fn task_completed(
        uid: TaskUid,
        state: TaskState,
        message: impl Into<String>,
        duration: Option<Duration>,
    ) -> Self {
        Event::TaskCompleted {
            uid,
            state,
            message: message.into(),
            duration,
            timestamp: Instant::now(),
        }
    }

    /// Create a TaskFailureReported event.
    pub fn task_failure_reported(
        uid: TaskUid,
        description: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Event::TaskFailureReported {
            uid,
            description: description.into(),
            message: message.into(),
            timestamp: Instant::now(),
        }
    }
}

/// Handler for receiving scheduler events.
///
/// Handlers run on the scheduler loop and should return quickly.
#[async_trait]
pub trait EventHandler: Send + Sync {
    /// Handle an event.
    async fn handle(&self, event: &Event);
}

/// Event bus for distributing events to registered handlers.
pub struct EventBus {
    handlers: RwLock<Vec<Arc<dyn EventHandler>>>,
}

impl EventBus {
    /// Create a new event bus with no handlers.
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register an event handler.
    pub async fn register(&self, handler: Arc<dyn EventHandler>) {
        let mut handlers = self.handlers.write().await;
        handlers.push(handler);
    }

    /// Emit an event to all registered handlers.
    pub async fn emit(&self, event: Event) {
        let handlers = self.handlers.read().await;
        for handler in handlers.iter() {
            handler.handle(&event).await;
        }
    }

    /// Get the number of registered handlers.
    pub async fn handler_count(&self) -> usize {
        self.handlers.read().await.len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
