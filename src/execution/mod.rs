//! Task execution infrastructure.
//!
//! This module provides the bounded worker pool, execution strategies and
//! composite tasks that orchestrate groups of child tasks.

mod composite;
mod pool;
mod strategy;

pub use composite::CompositeTask;
pub use pool::{WorkerPool, hardware_concurrency};
pub use strategy::{ExecutionStrategy, ResourceConstrained, RunAll, Sequential};
