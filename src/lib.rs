//! taskloom - an in-process task scheduler.
//!
//! Units of asynchronous work are [`Task`]s with an observable state machine.
//! A [`TaskScheduler`] registers them under unique ids, runs tasks sharing a
//! sequential tag one at a time in submission order and aggregates progress.
//! [`CompositeTask`] groups child tasks under an [`ExecutionStrategy`].

pub mod config;
pub mod core;
pub mod events;
pub mod execution;
pub mod scheduler;
pub mod testing;

pub use config::{ConfigError, ConfigLoader, SchedulerConfig};
pub use core::resource::{ResourceClaims, ResourceSet};
pub use core::result::{ResultRunnable, ResultSlot, ResultTask};
pub use core::state::{TaskEvent, TaskState, is_terminal};
pub use core::task::{Runnable, Task, TaskContext, TaskError, TaskOutcome};
pub use core::types::{SequentialTag, TaskUid};
pub use events::{Event, EventBus, EventHandler};
pub use execution::{
    CompositeTask, ExecutionStrategy, ResourceConstrained, RunAll, Sequential, WorkerPool,
    hardware_concurrency,
};
pub use scheduler::{Progress, SchedulerError, SchedulerHandle, TaskHandle, TaskScheduler};
