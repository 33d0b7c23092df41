//! Core task abstractions.
//!
//! This module defines the task state machine, task bodies, typed result
//! tasks, identifiers and resource index sets.

pub mod resource;
pub mod result;
pub mod state;
pub mod task;
pub mod types;
