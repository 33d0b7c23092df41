//! Task lifecycle states and notifications.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Lifecycle state of a [`Task`](super::task::Task).
///
/// `Idle -> Starting -> Running -> (Cancelling) -> Cancelled | Failed | Finished`.
/// The last three are terminal: once reached, a task never changes state again.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskState {
    /// Constructed, not yet scheduled.
    Idle,
    /// Accepted by a scheduler, waiting for a worker.
    Starting,
    /// Body executing on a worker.
    Running,
    /// Cancellation requested; the body decides when to stop.
    Cancelling,
    /// Stopped at the request of a caller.
    Cancelled,
    /// The body reported failure or panicked.
    Failed,
    /// The body completed.
    Finished,
}

impl TaskState {
    /// Whether this state is final.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskState::Cancelled | TaskState::Failed | TaskState::Finished
        )
    }
}

/// Free-function form of [`TaskState::is_terminal`].
pub fn is_terminal(state: TaskState) -> bool {
    state.is_terminal()
}

impl fmt::Display for TaskState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskState::Idle => "idle",
            TaskState::Starting => "starting",
            TaskState::Running => "running",
            TaskState::Cancelling => "cancelling",
            TaskState::Cancelled => "cancelled",
            TaskState::Failed => "failed",
            TaskState::Finished => "finished",
        };
        write!(f, "{}", s)
    }
}

/// Notification emitted by a task.
///
/// Delivered in emission order to every subscriber of the task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskEvent {
    /// The task moved to a new state.
    StateChanged { state: TaskState, message: String },
    /// The body announced additional units of work.
    StepsAdded(u64),
    /// The body completed units of work.
    StepsCompleted(u64),
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [TaskState; 7] = [
        TaskState::Idle,
        TaskState::Starting,
        TaskState::Running,
        TaskState::Cancelling,
        TaskState::Cancelled,
        TaskState::Failed,
        TaskState::Finished,
    ];

    #[test]
    fn test_terminal_states() {
        let terminal: Vec<_> = ALL.iter().filter(|s| is_terminal(**s)).collect();
        assert_eq!(
            terminal,
            vec![&TaskState::Cancelled, &TaskState::Failed, &TaskState::Finished]
        );
    }

    #[test]
    fn test_cancelling_is_not_terminal() {
        assert!(!TaskState::Cancelling.is_terminal());
    }

    #[test]
    fn test_state_display() {
        assert_eq!(TaskState::Cancelling.to_string(), "cancelling");
        assert_eq!(TaskState::Finished.to_string(), "finished");
    }
}
