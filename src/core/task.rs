//! Task type, body trait and error types.
//!
//! A [`Task`] wraps a [`Runnable`] body with the lifecycle state machine,
//! cooperative cancellation and notification fan-out. Bodies are either a
//! type implementing [`Runnable`] or a closure passed to [`Task::from_fn`].

use async_trait::async_trait;
use std::any::Any;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use thiserror::Error;
use tokio::sync::{Notify, mpsc};
use tracing::{Instrument, debug, debug_span, warn};

use super::state::{TaskEvent, TaskState};

/// Errors a task body can return.
///
/// Any error returned from [`Runnable::run`] ends the task in
/// [`TaskState::Failed`] with the error's display text as its message.
#[derive(Debug, Error)]
pub enum TaskError {
    /// Task execution failed with a message.
    #[error("execution failed: {0}")]
    ExecutionFailed(String),

    /// The task was given input it cannot work with.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Generic error wrapper.
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

/// Terminal result reported by a task body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskOutcome {
    state: TaskState,
    message: String,
}

impl TaskOutcome {
    /// The body completed its work.
    pub fn finished(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Finished,
            message: message.into(),
        }
    }

    /// The body gave up on its work.
    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Failed,
            message: message.into(),
        }
    }

    /// The body stopped early after observing a cancellation request.
    pub fn cancelled(message: impl Into<String>) -> Self {
        Self {
            state: TaskState::Cancelled,
            message: message.into(),
        }
    }

    /// The terminal state carried by this outcome.
    pub fn state(&self) -> TaskState {
        self.state
    }

    /// The message carried by this outcome.
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// The work performed by a task.
///
/// # Example
///
/// ```ignore
/// use taskloom::{Runnable, TaskContext, TaskError, TaskOutcome};
/// use async_trait::async_trait;
///
/// struct Smooth { iterations: u64 }
///
/// #[async_trait]
/// impl Runnable for Smooth {
///     async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
///         ctx.add_steps(self.iterations);
///         for _ in 0..self.iterations {
///             if ctx.is_cancelled() {
///                 return Ok(TaskOutcome::cancelled("smoothing interrupted"));
///             }
///             // one smoothing pass
///             ctx.complete_steps(1);
///         }
///         Ok(TaskOutcome::finished("surface smoothed"))
///     }
/// }
/// ```
#[async_trait]
pub trait Runnable: Send + Sync + 'static {
    /// Execute the body. Called at most once per task.
    ///
    /// Long-running bodies should poll [`TaskContext::is_cancelled`] and
    /// return early when it turns true.
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError>;

    /// Hook invoked once the owning task has moved to `Cancelling`.
    fn on_cancel(&self) {}

    /// Called instead of [`Runnable::run`] when the task is cancelled before
    /// its body starts.
    fn on_skipped(&self) {}
}

/// View of a running task handed to its body.
#[derive(Clone)]
pub struct TaskContext {
    task: Arc<Task>,
}

impl TaskContext {
    pub(crate) fn for_task(task: &Arc<Task>) -> Self {
        Self {
            task: Arc::clone(task),
        }
    }

    /// Whether cancellation has been requested for this task.
    pub fn is_cancelled(&self) -> bool {
        self.task.is_cancel_requested()
    }

    /// Announce `steps` more units of work.
    pub fn add_steps(&self, steps: u64) {
        self.task.emit(TaskEvent::StepsAdded(steps));
    }

    /// Report `steps` units of work as done.
    pub fn complete_steps(&self, steps: u64) {
        self.task.emit(TaskEvent::StepsCompleted(steps));
    }

    /// Name of the running task.
    pub fn task_name(&self) -> &str {
        self.task.name()
    }
}

struct Status {
    state: TaskState,
    message: String,
    /// Set once the task has been handed to a worker or started running.
    dispatched: bool,
}

/// A cancellable, observable unit of work with a fixed state machine.
///
/// Tasks are shared as `Arc<Task>`: the scheduler, a [`TaskHandle`] and a
/// composite parent may all hold the same instance.
///
/// [`TaskHandle`]: crate::scheduler::TaskHandle
pub struct Task {
    name: String,
    body: Arc<dyn Runnable>,
    status: Mutex<Status>,
    cancel_requested: AtomicBool,
    cancel_notify: Notify,
    listeners: Mutex<Vec<mpsc::UnboundedSender<TaskEvent>>>,
}

/// Lock a std mutex, recovering the guard if a previous holder panicked.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

struct FnBody<F> {
    f: F,
}

#[async_trait]
impl<F, Fut> Runnable for FnBody<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutcome, TaskError>> + Send + 'static,
{
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        (self.f)(ctx.clone()).await
    }
}

impl Task {
    /// Create an idle task around a body.
    pub fn new(name: impl Into<String>, body: impl Runnable) -> Arc<Self> {
        Self::from_shared(name, Arc::new(body))
    }

    /// Create an idle task around an already shared body.
    pub fn from_shared(name: impl Into<String>, body: Arc<dyn Runnable>) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            body,
            status: Mutex::new(Status {
                state: TaskState::Idle,
                message: String::new(),
                dispatched: false,
            }),
            cancel_requested: AtomicBool::new(false),
            cancel_notify: Notify::new(),
            listeners: Mutex::new(Vec::new()),
        })
    }

    /// Create an idle task whose body is a closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Arc<Self>
    where
        F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutcome, TaskError>> + Send + 'static,
    {
        Self::new(name, FnBody { f })
    }

    /// Name used in logs and diagnostics.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state.
    pub fn state(&self) -> TaskState {
        lock(&self.status).state
    }

    /// Most recent status or error text.
    pub fn last_message(&self) -> String {
        lock(&self.status).message.clone()
    }

    /// Whether [`Task::cancel`] has been called on a non-terminal task.
    pub fn is_cancel_requested(&self) -> bool {
        self.cancel_requested.load(Ordering::SeqCst)
    }

    /// Subscribe to this task's notifications.
    ///
    /// Only notifications emitted after the call are delivered.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<TaskEvent> {
        let (tx, rx) = mpsc::unbounded_channel();
        lock(&self.listeners).push(tx);
        rx
    }

    /// Request cancellation.
    ///
    /// No-op on a terminal task. Otherwise the body's cancel hook runs and the
    /// task moves to [`TaskState::Cancelling`]; stopping is up to the body.
    pub fn cancel(&self) {
        {
            let mut status = lock(&self.status);
            if status.state.is_terminal() || status.state == TaskState::Cancelling {
                return;
            }
            self.cancel_requested.store(true, Ordering::SeqCst);
            debug!(task = %self.name, from = %status.state, "cancellation requested");
            status.state = TaskState::Cancelling;
            self.emit(TaskEvent::StateChanged {
                state: TaskState::Cancelling,
                message: status.message.clone(),
            });
        }
        self.cancel_notify.notify_waiters();
        self.body.on_cancel();
    }

    /// Resolve once cancellation has been requested.
    pub(crate) async fn cancellation(&self) {
        let notified = self.cancel_notify.notified();
        tokio::pin!(notified);
        notified.as_mut().enable();
        if self.is_cancel_requested() {
            return;
        }
        notified.await;
    }

    /// Finalize a cancelled task that was never handed to a worker.
    ///
    /// Returns whether the task moved to `Cancelled`.
    pub(crate) fn finalize_if_undispatched(&self) -> bool {
        {
            let mut status = lock(&self.status);
            if status.dispatched || status.state != TaskState::Cancelling {
                return false;
            }
            status.state = TaskState::Cancelled;
            self.emit(TaskEvent::StateChanged {
                state: TaskState::Cancelled,
                message: status.message.clone(),
            });
        }
        self.body.on_skipped();
        true
    }

    /// Move an idle task to `Starting`.
    ///
    /// A task cancelled before dispatch goes straight to `Cancelled` instead.
    /// Returns whether the task should be handed to a worker.
    pub(crate) fn mark_starting(&self) -> bool {
        {
            let mut status = lock(&self.status);
            match status.state {
                TaskState::Idle => {
                    status.state = TaskState::Starting;
                    status.dispatched = true;
                    self.emit(TaskEvent::StateChanged {
                        state: TaskState::Starting,
                        message: status.message.clone(),
                    });
                    return true;
                }
                TaskState::Cancelling if !status.dispatched => {}
                state => {
                    warn!(task = %self.name, state = %state, "task dispatched twice, ignoring");
                    return false;
                }
            }
        }
        self.finalize_if_undispatched();
        false
    }

    /// Run the body to completion and return the terminal state.
    ///
    /// The body runs in its own tokio task so that a panic is contained and
    /// reported as [`TaskState::Failed`].
    pub async fn run(self: &Arc<Self>) -> TaskState {
        {
            let mut status = lock(&self.status);
            if status.state.is_terminal() {
                return status.state;
            }
            if status.state == TaskState::Running {
                warn!(task = %self.name, "task is already running");
                return TaskState::Running;
            }
            if status.state != TaskState::Cancelling && !self.is_cancel_requested() {
                status.dispatched = true;
                status.state = TaskState::Running;
                self.emit(TaskEvent::StateChanged {
                    state: TaskState::Running,
                    message: status.message.clone(),
                });
            } else {
                status.state = TaskState::Cancelled;
                self.emit(TaskEvent::StateChanged {
                    state: TaskState::Cancelled,
                    message: status.message.clone(),
                });
                drop(status);
                self.body.on_skipped();
                return TaskState::Cancelled;
            }
        }

        let ctx = TaskContext::for_task(self);
        let body = Arc::clone(&self.body);
        let span = debug_span!("task_body", task = %self.name);
        let joined = tokio::spawn(async move { body.run(&ctx).await }.instrument(span)).await;

        let (state, message) = match joined {
            Ok(Ok(outcome)) => (outcome.state, outcome.message),
            Ok(Err(err)) => (TaskState::Failed, err.to_string()),
            Err(err) if err.is_panic() => (TaskState::Failed, panic_message(err.into_panic())),
            Err(_) => (TaskState::Failed, "task was aborted".to_string()),
        };

        self.finish(state, message)
    }

    fn finish(&self, mut state: TaskState, message: String) -> TaskState {
        let mut status = lock(&self.status);
        if status.state.is_terminal() {
            return status.state;
        }
        if self.is_cancel_requested() && state != TaskState::Cancelled {
            debug!(task = %self.name, reported = %state, "overriding result after cancellation");
            state = TaskState::Cancelled;
        }
        debug!(task = %self.name, state = %state, message = %message, "task reached terminal state");
        status.state = state;
        status.message = message;
        self.emit(TaskEvent::StateChanged {
            state,
            message: status.message.clone(),
        });
        state
    }

    fn emit(&self, event: TaskEvent) {
        let mut listeners = lock(&self.listeners);
        listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = lock(&self.status);
        f.debug_struct("Task")
            .field("name", &self.name)
            .field("state", &status.state)
            .field("message", &status.message)
            .finish()
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown error".to_string()
    }
}
