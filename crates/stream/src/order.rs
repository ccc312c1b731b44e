//! Stream ordering key
//!
//! The global traversal order is a pure function of `(priority, sequence)`:
//! higher priority first, then lower sequence (insertion order) within a
//! priority. The key is a plain value, so cursors can hold one across calls
//! without referencing any mutable node of the index.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Ordering key of an item within its stream
///
/// `OrderKey`s are totally ordered and stable for the lifetime of both
/// items being compared: sequence numbers are never reused and priority is
/// fixed at add time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrderKey {
    /// Larger priority sorts earlier
    pub priority: i32,
    /// Monotonic insertion counter, FIFO tie-breaker within a priority
    pub sequence: u64,
}

impl OrderKey {
    /// Build a key from an item's priority and assigned sequence
    pub fn new(priority: i32, sequence: u64) -> Self {
        Self { priority, sequence }
    }
}

impl Ord for OrderKey {
    fn cmp(&self, other: &Self) -> Ordering {
        // Descending priority, then ascending sequence
        other
            .priority
            .cmp(&self.priority)
            .then_with(|| self.sequence.cmp(&other.sequence))
    }
}

impl PartialOrd for OrderKey {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl fmt::Display for OrderKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "p{}/s{}", self.priority, self.sequence)
    }
}
