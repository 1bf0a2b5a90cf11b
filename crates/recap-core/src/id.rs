//! Strongly-typed identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Ordinal of a selector within a recorder.
///
/// Assigned in registration order when selectors are attached to a save
/// schedule. `SelectorId(n)` is the n-th saved selector, and names the
/// per-selector table, group or file in every backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SelectorId(pub u32);

impl fmt::Display for SelectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for SelectorId {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Index of a run within a run group, numbered from 0 by the owning backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RunId(pub u64);

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u64> for RunId {
    fn from(v: u64) -> Self {
        Self(v)
    }
}

/// Rank of a process inside a process group. Rank 0 is the coordinator.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Rank(pub u32);

impl Rank {
    /// The coordinator rank.
    pub const COORDINATOR: Rank = Rank(0);

    /// Whether this rank is the coordinator.
    pub fn is_coordinator(self) -> bool {
        self == Self::COORDINATOR
    }
}

impl fmt::Display for Rank {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for Rank {
    fn from(v: u32) -> Self {
        Self(v)
    }
}

/// Counter for unique [`SimInstanceId`] allocation.
static SIM_INSTANCE_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Unique per-instance identifier for a simulation object.
///
/// Allocated from a monotonic atomic counter via [`SimInstanceId::next`].
/// Selectors only record this id, and two selectors are compatible exactly
/// when they carry the same one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SimInstanceId(u64);

impl SimInstanceId {
    /// Allocate a fresh, unique instance ID. Thread-safe.
    pub fn next() -> Self {
        Self(SIM_INSTANCE_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for SimInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Opaque token identifying one save event.
///
/// Handed to [`Simulation::query`](crate::Simulation::query) so that a
/// simulation can reuse a quantity computed for another leaf within the
/// same event. Two queries carrying equal hints observe the same state.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StateHint {
    /// Run the event belongs to.
    pub run: RunId,
    /// Per-run event counter.
    pub event: u64,
}

impl StateHint {
    /// Hint for the `event`-th save event of `run`.
    pub fn new(run: RunId, event: u64) -> Self {
        Self { run, event }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn instance_ids_are_unique() {
        let a = SimInstanceId::next();
        let b = SimInstanceId::next();
        assert_ne!(a, b);
        assert!(b > a);
    }

    #[test]
    fn coordinator_is_rank_zero() {
        assert!(Rank(0).is_coordinator());
        assert!(!Rank(3).is_coordinator());
    }
}
