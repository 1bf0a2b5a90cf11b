//! Collaborator traits: the simulation being recorded and the process
//! group the recorder runs in.

use crate::error::{CommError, SimError};
use crate::id::{Rank, RunId, SimInstanceId, StateHint};
use crate::mesh::Mesh;
use crate::path::SimPath;
use crate::value::MetaData;

/// Static description of what a path yields.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PathInfo {
    /// One label per output column, e.g. `comp1.S1.Count`.
    pub labels: Vec<String>,
    /// Automatic per-column metadata such as `loc_type` and `loc_id`.
    pub metadata: MetaData,
}

impl PathInfo {
    /// Number of columns the path yields.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the path yields nothing.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }
}

/// The simulation whose state is being recorded.
///
/// Selectors hold only the [`SimInstanceId`]; every evaluation borrows the
/// simulation through `&dyn Simulation`, so a simulation can be advanced
/// between save events without invalidating selectors.
pub trait Simulation {
    /// Identity used for selector compatibility checks.
    fn instance_id(&self) -> SimInstanceId;

    /// Current simulated time.
    fn time(&self) -> f64;

    /// Run the simulation is currently executing.
    fn run_id(&self) -> RunId;

    /// Reset state for a new run.
    fn new_run(&mut self) -> Result<(), SimError>;

    /// Advance simulated time to `t`.
    fn advance_to(&mut self, t: f64) -> Result<(), SimError>;

    /// Labels and automatic metadata of the full, unrestricted `path`.
    fn describe(&self, path: &SimPath) -> Result<PathInfo, SimError>;

    /// Values of `path` at the current state.
    ///
    /// When the path carries a subset, only those columns are returned, in
    /// subset order. `hint` identifies the save event.
    fn query(&self, path: &SimPath, hint: StateHint) -> Result<Vec<f64>, SimError>;

    /// Positions of `path`'s columns owned by this rank.
    ///
    /// `None` means the path is not partitioned and every rank holds all
    /// of it.
    fn distribute(&self, _path: &SimPath) -> Result<Option<Vec<usize>>, SimError> {
        Ok(None)
    }

    /// Whether the simulation is partitioned across ranks.
    fn is_distributed(&self) -> bool {
        false
    }

    /// Mesh of the simulation, if it has one.
    fn mesh(&self) -> Option<&dyn Mesh> {
        None
    }
}

/// Collective operations of a group of cooperating processes.
///
/// Every rank must issue the same collectives in the same order. Payloads
/// are opaque bytes; [`ProcessContext`](crate::ProcessContext) layers typed
/// helpers on top.
pub trait ProcessGroup {
    /// Rank of the calling process.
    fn rank(&self) -> Rank;

    /// Number of processes in the group.
    fn size(&self) -> usize;

    /// Gather one payload per rank on the coordinator.
    ///
    /// The coordinator receives `Some` with payloads in rank order, other
    /// ranks receive `None`.
    fn gather(&self, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, CommError>;

    /// Broadcast the coordinator's payload to every rank.
    ///
    /// Non-coordinator ranks pass `None`.
    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, CommError>;

    /// Gather every rank's payload on every rank.
    fn all_gather(&self, payload: Vec<u8>) -> Result<Vec<Vec<u8>>, CommError> {
        let gathered = self.gather(payload)?;
        let packed = match gathered {
            Some(all) => Some(bincode::serialize(&all)?),
            None => None,
        };
        let bytes = self.broadcast(packed)?;
        Ok(bincode::deserialize(&bytes)?)
    }
}
