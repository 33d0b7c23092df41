//! Task scheduler.
//!
//! This module provides the registry of submitted tasks, sequential tag
//! ordering and progress aggregation on top of the shared worker pool.

mod engine;
mod handle;
mod task_handle;
mod types;

pub use engine::TaskScheduler;
pub use handle::SchedulerHandle;
pub use task_handle::TaskHandle;
pub use types::{Progress, SchedulerError};
