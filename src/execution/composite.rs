//! Composite tasks.
//!
//! A `CompositeTask` runs a group of child tasks as one logical task. The
//! children start according to an [`ExecutionStrategy`] and run on the
//! scheduler's worker pool; the composite keeps its own worker slot until
//! every child has reached a terminal state.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tracing::{Instrument, debug, info_span, warn};

use crate::core::state::{TaskEvent, TaskState};
use crate::core::task::{Runnable, Task, TaskContext, TaskError, TaskOutcome, lock};
use crate::scheduler::SchedulerHandle;

use super::strategy::ExecutionStrategy;

/// A task that orchestrates child tasks.
///
/// Aggregation once all children are terminal:
/// - any child `Failed`: the composite is `Finished` with a message listing
///   the failures
/// - otherwise any child `Cancelled`: the composite is `Cancelled`
/// - otherwise `Finished`
///
/// Cancelling the composite cancels every child. A failing child does not
/// cancel its siblings.
pub struct CompositeTask {
    strategy: Mutex<Option<Box<dyn ExecutionStrategy>>>,
    children: Vec<Arc<Task>>,
    scheduler: SchedulerHandle,
}

/// Per-child bookkeeping while the composite runs.
struct Progress {
    started: Vec<bool>,
    done: Vec<bool>,
    remaining: usize,
    in_flight: usize,
}

impl CompositeTask {
    /// Create a composite whose children run on `scheduler`'s pool.
    pub fn new(scheduler: &SchedulerHandle, strategy: impl ExecutionStrategy) -> Self {
        let children = strategy.tasks().to_vec();
        Self {
            strategy: Mutex::new(Some(Box::new(strategy))),
            children,
            scheduler: scheduler.clone(),
        }
    }

    /// Wrap into a schedulable [`Task`].
    pub fn into_task(self, name: impl Into<String>) -> Arc<Task> {
        Task::new(name, self)
    }

    /// The child tasks, in declaration order.
    pub fn children(&self) -> &[Arc<Task>] {
        &self.children
    }

    fn start(&self, index: usize, progress: &mut Progress) {
        progress.in_flight += 1;
        let child = Arc::clone(&self.children[index]);
        debug!(child = %child.name(), index, "starting subtask");
        self.scheduler.run_direct(child);
    }

    /// Watch every child and funnel its terminal state into one channel.
    fn watch_children(&self) -> mpsc::UnboundedReceiver<(usize, TaskState)> {
        let (tx, rx) = mpsc::unbounded_channel();
        for (index, child) in self.children.iter().enumerate() {
            let mut events = child.subscribe();
            let tx = tx.clone();
            tokio::spawn(async move {
                while let Some(event) = events.recv().await {
                    if let TaskEvent::StateChanged { state, .. } = event {
                        if state.is_terminal() {
                            let _ = tx.send((index, state));
                            break;
                        }
                    }
                }
            });
        }
        rx
    }

    async fn drive(
        &self,
        ctx: &TaskContext,
        mut strategy: Box<dyn ExecutionStrategy>,
    ) -> Result<TaskOutcome, TaskError> {
        let total = self.children.len();
        let starting = strategy.starting_tasks();
        if starting.is_empty() {
            debug!("composite has nothing to start");
            return Ok(TaskOutcome::finished("no subtasks to run"));
        }

        let mut terminal = self.watch_children();
        ctx.add_steps(total as u64);

        let mut progress = Progress {
            started: vec![false; total],
            done: vec![false; total],
            remaining: total,
            in_flight: 0,
        };
        for (index, child) in self.children.iter().enumerate() {
            if child.state().is_terminal() {
                progress.done[index] = true;
                progress.remaining -= 1;
                ctx.complete_steps(1);
            }
        }

        let mut queue: VecDeque<usize> = starting.into();
        loop {
            while let Some(index) = queue.pop_front() {
                if index >= total || progress.started[index] {
                    continue;
                }
                progress.started[index] = true;
                if progress.done[index] {
                    queue.extend(strategy.next_tasks(index));
                } else {
                    self.start(index, &mut progress);
                }
            }

            if progress.remaining == 0 {
                break;
            }

            if progress.in_flight == 0 {
                warn!(
                    remaining = progress.remaining,
                    "strategy stopped producing work, cancelling remaining subtasks"
                );
                for index in 0..total {
                    if !progress.started[index] && !progress.done[index] {
                        progress.started[index] = true;
                        self.children[index].cancel();
                        self.start(index, &mut progress);
                    }
                }
                if progress.in_flight == 0 {
                    break;
                }
            }

            let Some((index, state)) = terminal.recv().await else {
                break;
            };
            if progress.done[index] {
                continue;
            }
            progress.done[index] = true;
            progress.remaining -= 1;
            ctx.complete_steps(1);
            debug!(
                child = %self.children[index].name(),
                state = %state,
                remaining = progress.remaining,
                "subtask finished"
            );

            if progress.started[index] {
                progress.in_flight -= 1;
                queue.extend(strategy.next_tasks(index));
            } else {
                // finished outside this composite; never handed to the strategy
                progress.started[index] = true;
            }
        }

        Ok(self.aggregate())
    }

    fn aggregate(&self) -> TaskOutcome {
        let total = self.children.len();
        let failures: Vec<String> = self
            .children
            .iter()
            .filter(|child| child.state() == TaskState::Failed)
            .map(|child| format!("{}: {}", child.name(), child.last_message()))
            .collect();
        if !failures.is_empty() {
            return TaskOutcome::finished(format!(
                "{} of {} subtasks failed: {}",
                failures.len(),
                total,
                failures.join("; ")
            ));
        }

        let cancelled = self
            .children
            .iter()
            .filter(|child| child.state() == TaskState::Cancelled)
            .count();
        if cancelled > 0 {
            return TaskOutcome::cancelled(format!(
                "{} of {} subtasks cancelled",
                cancelled, total
            ));
        }

        TaskOutcome::finished(format!("all {} subtasks finished", total))
    }
}

#[async_trait]
impl Runnable for CompositeTask {
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        let strategy = lock(&self.strategy)
            .take()
            .ok_or_else(|| TaskError::ExecutionFailed("composite task already ran".into()))?;

        let span = info_span!(
            "composite",
            task = %ctx.task_name(),
            subtasks = self.children.len(),
        );
        self.drive(ctx, strategy).instrument(span).await
    }

    fn on_cancel(&self) {
        for child in &self.children {
            child.cancel();
        }
    }

    fn on_skipped(&self) {
        for child in &self.children {
            child.cancel();
            if child.finalize_if_undispatched() {
                debug!(child = %child.name(), "subtask cancelled before it started");
            }
        }
    }
}
