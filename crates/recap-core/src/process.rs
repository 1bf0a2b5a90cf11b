//! Explicit process context threaded through every rank-aware component.

use crate::error::CommError;
use crate::id::Rank;
use crate::traits::ProcessGroup;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fmt;
use std::rc::Rc;

/// Process group of a single process.
///
/// Every collective is the identity.
#[derive(Clone, Copy, Debug, Default)]
pub struct SingleProcess;

impl ProcessGroup for SingleProcess {
    fn rank(&self) -> Rank {
        Rank::COORDINATOR
    }

    fn size(&self) -> usize {
        1
    }

    fn gather(&self, payload: Vec<u8>) -> Result<Option<Vec<Vec<u8>>>, CommError> {
        Ok(Some(vec![payload]))
    }

    fn broadcast(&self, payload: Option<Vec<u8>>) -> Result<Vec<u8>, CommError> {
        payload.ok_or(CommError::Disconnected { peer: None })
    }
}

/// Rank identity and typed collectives for one process.
///
/// Constructed once at startup and cloned into every component that needs
/// to know whether it is the coordinator or must take part in a
/// collective.
#[derive(Clone)]
pub struct ProcessContext {
    group: Rc<dyn ProcessGroup>,
}

impl ProcessContext {
    /// Wrap a process group.
    pub fn new(group: Rc<dyn ProcessGroup>) -> Self {
        Self { group }
    }

    /// Context of a lone process.
    pub fn single() -> Self {
        Self::new(Rc::new(SingleProcess))
    }

    /// Rank of this process.
    pub fn rank(&self) -> Rank {
        self.group.rank()
    }

    /// Number of processes.
    pub fn size(&self) -> usize {
        self.group.size()
    }

    /// Whether this process is the coordinator.
    pub fn is_coordinator(&self) -> bool {
        self.rank().is_coordinator()
    }

    /// Whether more than one process takes part.
    pub fn is_group(&self) -> bool {
        self.size() > 1
    }

    /// Gather one value per rank on the coordinator.
    pub fn gather<T: Serialize + DeserializeOwned>(
        &self,
        value: &T,
    ) -> Result<Option<Vec<T>>, CommError> {
        let payload = bincode::serialize(value)?;
        match self.group.gather(payload)? {
            Some(all) => {
                let decoded = all
                    .iter()
                    .map(|b| bincode::deserialize(b))
                    .collect::<Result<Vec<T>, _>>()?;
                Ok(Some(decoded))
            }
            None => Ok(None),
        }
    }

    /// Broadcast the coordinator's value. Other ranks pass `None`.
    pub fn broadcast<T: Serialize + DeserializeOwned>(
        &self,
        value: Option<&T>,
    ) -> Result<T, CommError> {
        let payload = match value {
            Some(v) if self.is_coordinator() => Some(bincode::serialize(v)?),
            _ => None,
        };
        let bytes = self.group.broadcast(payload)?;
        Ok(bincode::deserialize(&bytes)?)
    }

    /// Gather every rank's value on every rank.
    pub fn all_gather<T: Serialize + DeserializeOwned>(
        &self,
        value: &T,
    ) -> Result<Vec<T>, CommError> {
        let payload = bincode::serialize(value)?;
        self.group
            .all_gather(payload)?
            .iter()
            .map(|b| bincode::deserialize(b).map_err(CommError::from))
            .collect()
    }

    /// Coordinator computes a value, every rank receives it.
    ///
    /// Used for coordinator-writes, others-wait negotiations: `f` runs on
    /// the coordinator only and its result, success or failure, reaches
    /// every rank.
    pub fn on_coordinator<T, F>(&self, f: F) -> Result<Result<T, String>, CommError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T, String>,
    {
        if !self.is_group() {
            return Ok(f());
        }
        let outcome = if self.is_coordinator() {
            Some(f())
        } else {
            None
        };
        self.broadcast(outcome.as_ref())
    }
}

impl Default for ProcessContext {
    fn default() -> Self {
        Self::single()
    }
}

impl fmt::Debug for ProcessContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessContext")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}
