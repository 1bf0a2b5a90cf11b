//! Errors raised while driving a simulation through its save schedule.

use std::error::Error;
use std::fmt;

use recap_core::{SelectorId, SimError};
use recap_dist::DistError;
use recap_selector::SelectorError;
use recap_store::StoreError;

/// Errors from [`Recorder`](crate::Recorder) operations.
#[derive(Debug)]
pub enum RecordError {
    /// Building, evaluating or scheduling a selector failed.
    Selector(SelectorError),
    /// A backend or run-group store failed.
    Store(StoreError),
    /// Reconciling partitioned selectors failed.
    Dist(DistError),
    /// The simulation could not start a run or advance.
    Sim(SimError),
    /// No source is registered under this id.
    UnknownSelector {
        /// Requested id.
        id: SelectorId,
    },
    /// The operation needs a started run.
    NoRun,
    /// Sources and sinks cannot change once the first run started.
    Started,
    /// The source has no results on this process.
    NotSaved {
        /// Requested id.
        id: SelectorId,
    },
    /// Rows can only be supplied for custom results.
    NotCustom {
        /// Requested id.
        id: SelectorId,
    },
}

impl fmt::Display for RecordError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Selector(e) => write!(f, "selector error: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Dist(e) => write!(f, "distribution error: {e}"),
            Self::Sim(e) => write!(f, "simulation error: {e}"),
            Self::UnknownSelector { id } => write!(f, "no source registered with id {id}"),
            Self::NoRun => write!(f, "no run was started"),
            Self::Started => write!(f, "cannot change the schedule once saving has started"),
            Self::NotSaved { id } => write!(
                f,
                "source {id} has no results on this process; it was either never \
                 saved or is saved by another rank"
            ),
            Self::NotCustom { id } => write!(f, "source {id} is not a custom result"),
        }
    }
}

impl Error for RecordError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Selector(e) => Some(e),
            Self::Store(e) => Some(e),
            Self::Dist(e) => Some(e),
            Self::Sim(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SelectorError> for RecordError {
    fn from(e: SelectorError) -> Self {
        Self::Selector(e)
    }
}

impl From<StoreError> for RecordError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<DistError> for RecordError {
    fn from(e: DistError) -> Self {
        Self::Dist(e)
    }
}

impl From<SimError> for RecordError {
    fn from(e: SimError) -> Self {
        Self::Sim(e)
    }
}
