//! Tasks that produce a typed value.

use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, OnceLock};

use super::task::{Runnable, Task, TaskContext, TaskError, TaskOutcome};

/// Write-once storage for a task's result.
///
/// Only the task body receives a `ResultSlot`; everyone else reads through
/// [`ResultTask`].
pub struct ResultSlot<T> {
    cell: Arc<OnceLock<T>>,
}

impl<T> ResultSlot<T> {
    fn new() -> Self {
        Self {
            cell: Arc::new(OnceLock::new()),
        }
    }

    /// Store the result. Returns `false` if a value was already stored,
    /// in which case the first value is kept.
    pub fn set(&self, value: T) -> bool {
        self.cell.set(value).is_ok()
    }

    /// The stored value, if any.
    pub fn get(&self) -> Option<&T> {
        self.cell.get()
    }
}

impl<T> Clone for ResultSlot<T> {
    fn clone(&self) -> Self {
        Self {
            cell: Arc::clone(&self.cell),
        }
    }
}

/// Body of a task that computes a value.
#[async_trait]
pub trait ResultRunnable: Send + Sync + 'static {
    /// Type of the computed value.
    type Output: Send + Sync + 'static;

    /// Execute the body, storing the value in `result` once computed.
    async fn run(
        &self,
        ctx: &TaskContext,
        result: &ResultSlot<Self::Output>,
    ) -> Result<TaskOutcome, TaskError>;

    /// Hook invoked when the owning task is cancelled.
    fn on_cancel(&self) {}

    /// See [`Runnable::on_skipped`](crate::core::task::Runnable::on_skipped).
    fn on_skipped(&self) {}
}

struct ResultBody<R: ResultRunnable> {
    inner: R,
    slot: ResultSlot<R::Output>,
}

#[async_trait]
impl<R: ResultRunnable> Runnable for ResultBody<R> {
    async fn run(&self, ctx: &TaskContext) -> Result<TaskOutcome, TaskError> {
        self.inner.run(ctx, &self.slot).await
    }

    fn on_cancel(&self) {
        self.inner.on_cancel();
    }

    fn on_skipped(&self) {
        self.inner.on_skipped();
    }
}

struct FnResultBody<F, T> {
    f: F,
    _output: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T, F, Fut> ResultRunnable for FnResultBody<F, T>
where
    T: Send + Sync + 'static,
    F: Fn(TaskContext, ResultSlot<T>) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<TaskOutcome, TaskError>> + Send + 'static,
{
    type Output = T;

    async fn run(
        &self,
        ctx: &TaskContext,
        result: &ResultSlot<T>,
    ) -> Result<TaskOutcome, TaskError> {
        (self.f)(ctx.clone(), result.clone()).await
    }
}

/// A [`Task`] paired with the value its body computes.
///
/// The value is absent until the body stores it, and stays absent if the
/// body fails first.
pub struct ResultTask<T> {
    task: Arc<Task>,
    slot: ResultSlot<T>,
}

impl<T: Send + Sync + 'static> ResultTask<T> {
    /// Create an idle result task around a body.
    pub fn new<R>(name: impl Into<String>, body: R) -> Self
    where
        R: ResultRunnable<Output = T>,
    {
        let slot = ResultSlot::new();
        let task = Task::new(
            name,
            ResultBody {
                inner: body,
                slot: slot.clone(),
            },
        );
        Self { task, slot }
    }

    /// Create an idle result task whose body is a closure.
    pub fn from_fn<F, Fut>(name: impl Into<String>, f: F) -> Self
    where
        F: Fn(TaskContext, ResultSlot<T>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<TaskOutcome, TaskError>> + Send + 'static,
    {
        Self::new(
            name,
            FnResultBody {
                f,
                _output: PhantomData,
            },
        )
    }

    /// The underlying task, for submission or inspection.
    pub fn task(&self) -> &Arc<Task> {
        &self.task
    }

    /// The computed value, if the body stored one.
    pub fn result(&self) -> Option<&T> {
        self.slot.get()
    }
}

impl<T> Clone for ResultTask<T> {
    fn clone(&self) -> Self {
        Self {
            task: Arc::clone(&self.task),
            slot: self.slot.clone(),
        }
    }
}
