//! Execution strategies for composite tasks.
//!
//! A strategy owns the child tasks of a [`CompositeTask`] and decides which
//! of them start first and which start after each child finishes. Children
//! are referred to by their index in [`ExecutionStrategy::tasks`].
//!
//! [`CompositeTask`]: super::composite::CompositeTask

use std::sync::Arc;

use crate::core::resource::{ResourceClaims, ResourceSet};
use crate::core::task::Task;

use super::pool::hardware_concurrency;

/// Policy deciding the start order of a composite's children.
///
/// The composite calls [`starting_tasks`](Self::starting_tasks) once, then
/// [`next_tasks`](Self::next_tasks) once per child it started, after that
/// child reaches a terminal state. Every index returned must be started at
/// most once; the composite ignores repeats.
pub trait ExecutionStrategy: Send + 'static {
    /// All child tasks, in declaration order.
    fn tasks(&self) -> &[Arc<Task>];

    /// Children to start immediately.
    fn starting_tasks(&mut self) -> Vec<usize>;

    /// Children to start now that `finished` has terminated.
    fn next_tasks(&mut self, finished: usize) -> Vec<usize>;
}

/// Start every child at once.
pub struct RunAll {
    tasks: Vec<Arc<Task>>,
}

impl RunAll {
    pub fn new(tasks: Vec<Arc<Task>>) -> Self {
        Self { tasks }
    }
}

impl ExecutionStrategy for RunAll {
    fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    fn starting_tasks(&mut self) -> Vec<usize> {
        (0..self.tasks.len()).collect()
    }

    fn next_tasks(&mut self, _finished: usize) -> Vec<usize> {
        Vec::new()
    }
}

/// Run children one at a time in declaration order.
pub struct Sequential {
    tasks: Vec<Arc<Task>>,
    next: usize,
}

impl Sequential {
    pub fn new(tasks: Vec<Arc<Task>>) -> Self {
        Self { tasks, next: 0 }
    }

    fn advance(&mut self) -> Vec<usize> {
        if self.next < self.tasks.len() {
            self.next += 1;
            vec![self.next - 1]
        } else {
            Vec::new()
        }
    }
}

impl ExecutionStrategy for Sequential {
    fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    fn starting_tasks(&mut self) -> Vec<usize> {
        self.advance()
    }

    fn next_tasks(&mut self, _finished: usize) -> Vec<usize> {
        self.advance()
    }
}

/// Run children concurrently unless they share a resource index.
///
/// A child runs only while none of its indices is claimed by another
/// running child, and at most `max_concurrency` children run at once.
/// Admission is greedy in declaration order.
pub struct ResourceConstrained {
    tasks: Vec<Arc<Task>>,
    resources: Vec<ResourceSet>,
    started: Vec<bool>,
    claims: ResourceClaims,
    running: usize,
    max_concurrency: usize,
}

impl ResourceConstrained {
    /// Create an empty strategy capped at [`Self::default_max_concurrency`].
    pub fn new() -> Self {
        Self {
            tasks: Vec::new(),
            resources: Vec::new(),
            started: Vec::new(),
            claims: ResourceClaims::new(),
            running: 0,
            max_concurrency: Self::default_max_concurrency(),
        }
    }

    /// One slot fewer than the hardware threads, and at least one.
    pub fn default_max_concurrency() -> usize {
        hardware_concurrency().saturating_sub(1).max(1)
    }

    /// Builder: cap concurrent children (values below 1 become 1).
    pub fn with_max_concurrency(mut self, max: usize) -> Self {
        self.max_concurrency = max.max(1);
        self
    }

    /// Builder: add a child with the resource indices it needs.
    pub fn with_task(mut self, task: Arc<Task>, resources: impl Into<ResourceSet>) -> Self {
        self.push(task, resources);
        self
    }

    /// Add a child with the resource indices it needs.
    pub fn push(&mut self, task: Arc<Task>, resources: impl Into<ResourceSet>) {
        self.tasks.push(task);
        self.resources.push(resources.into());
        self.started.push(false);
    }

    /// Concurrency cap in effect.
    pub fn max_concurrency(&self) -> usize {
        self.max_concurrency
    }

    /// Resource indices declared for a child.
    pub fn resources(&self, index: usize) -> Option<&ResourceSet> {
        self.resources.get(index)
    }

    fn admit(&mut self) -> Vec<usize> {
        let mut admitted = Vec::new();
        for index in 0..self.tasks.len() {
            if self.running >= self.max_concurrency {
                break;
            }
            if self.started[index] || !self.claims.try_claim(&self.resources[index]) {
                continue;
            }
            self.started[index] = true;
            self.running += 1;
            admitted.push(index);
        }
        admitted
    }
}

impl Default for ResourceConstrained {
    fn default() -> Self {
        Self::new()
    }
}

impl ExecutionStrategy for ResourceConstrained {
    fn tasks(&self) -> &[Arc<Task>] {
        &self.tasks
    }

    fn starting_tasks(&mut self) -> Vec<usize> {
        self.admit()
    }

    fn next_tasks(&mut self, finished: usize) -> Vec<usize> {
        if let Some(resources) = self.resources.get(finished) {
            if self.started[finished] {
                self.claims.release(resources);
                self.running = self.running.saturating_sub(1);
            }
        }
        self.admit()
    }
}
