//! Exclusive resource indices for task admission.
//!
//! A task declares the logical resources it touches as a set of indices
//! (for example, the vessels a meshing operation reads and writes). Two
//! tasks whose sets intersect must not run at the same time.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Resource indices a task needs exclusively.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceSet {
    indices: BTreeSet<usize>,
}

impl ResourceSet {
    /// Create an empty set (no exclusivity constraints).
    pub fn none() -> Self {
        Self::default()
    }

    /// Builder: add a resource index.
    pub fn with(mut self, index: usize) -> Self {
        self.indices.insert(index);
        self
    }

    /// Iterate the indices in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.indices.iter().copied()
    }

    /// Whether this set has any indices.
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    /// Number of indices.
    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Whether the two sets share an index.
    pub fn intersects(&self, other: &ResourceSet) -> bool {
        !self.indices.is_disjoint(&other.indices)
    }
}

impl FromIterator<usize> for ResourceSet {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        Self {
            indices: iter.into_iter().collect(),
        }
    }
}

impl<const N: usize> From<[usize; N]> for ResourceSet {
    fn from(indices: [usize; N]) -> Self {
        indices.into_iter().collect()
    }
}

/// Indices currently claimed by running tasks.
#[derive(Debug, Clone, Default)]
pub struct ResourceClaims {
    claimed: BTreeSet<usize>,
}

impl ResourceClaims {
    /// Create with nothing claimed.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether none of `resources` is claimed.
    pub fn is_free(&self, resources: &ResourceSet) -> bool {
        self.claimed.is_disjoint(&resources.indices)
    }

    /// Claim every index in `resources` if all are free.
    ///
    /// Returns `false` and claims nothing on conflict.
    pub fn try_claim(&mut self, resources: &ResourceSet) -> bool {
        if !self.is_free(resources) {
            return false;
        }
        self.claimed.extend(resources.iter());
        true
    }

    /// Release every index in `resources`.
    pub fn release(&mut self, resources: &ResourceSet) {
        for index in resources.iter() {
            self.claimed.remove(&index);
        }
    }

    /// Whether a specific index is claimed.
    pub fn is_claimed(&self, index: usize) -> bool {
        self.claimed.contains(&index)
    }

    /// Whether nothing is claimed.
    pub fn is_empty(&self) -> bool {
        self.claimed.is_empty()
    }
}
