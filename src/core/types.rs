//! Core identifier types for the scheduler.
//!
//! These types provide type-safe identifiers for registered tasks and
//! sequential execution groups.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Caller-chosen key identifying one in-flight task in the scheduler registry.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TaskUid(String);

/// Mutual-exclusion group for tasks submitted to the scheduler.
///
/// Tasks sharing a tag run one at a time in submission order.
/// [`SequentialTag::NONE`] places no constraint on the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SequentialTag(i64);

impl TaskUid {
    /// Create a new TaskUid from a string.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Generate a random TaskUid for callers without a natural key.
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Get the underlying string value.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TaskUid {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for TaskUid {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl fmt::Display for TaskUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl SequentialTag {
    /// Sentinel value: no exclusivity constraint.
    pub const NONE: SequentialTag = SequentialTag(-1);

    /// Create a tag from its raw value.
    pub const fn new(value: i64) -> Self {
        Self(value)
    }

    /// Get the raw tag value.
    pub fn value(&self) -> i64 {
        self.0
    }

    /// Whether this tag constrains execution.
    pub fn is_exclusive(&self) -> bool {
        *self != Self::NONE
    }
}

impl Default for SequentialTag {
    fn default() -> Self {
        Self::NONE
    }
}

impl From<i64> for SequentialTag {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

impl fmt::Display for SequentialTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_exclusive() {
            write!(f, "{}", self.0)
        } else {
            write!(f, "none")
        }
    }
}
