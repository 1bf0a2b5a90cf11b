//! Error types for distributed saving.

use std::error::Error;
use std::fmt;

use recap_core::{CommError, SelectorId};
use recap_selector::SelectorError;
use recap_store::StoreError;

/// Errors from reconciling or reading distributed selectors.
#[derive(Debug)]
pub enum DistError {
    /// A collective failed.
    Comm(CommError),
    /// A selector could not be distributed.
    Selector(SelectorError),
    /// Reading or writing a store failed.
    Store(StoreError),
    /// Ranks disagree about the shape of a selector.
    Layout {
        /// Selector whose layouts disagree.
        selector: SelectorId,
        /// What is inconsistent.
        detail: String,
    },
    /// No rank claimed a column of a selector.
    Unclaimed {
        /// Selector with a missing column.
        selector: SelectorId,
        /// First unclaimed global column.
        column: usize,
    },
    /// The coordinator failed; other ranks only receive its message.
    Remote {
        /// Message reported by the coordinator.
        reason: String,
    },
}

impl fmt::Display for DistError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Comm(e) => write!(f, "collective failed: {e}"),
            Self::Selector(e) => write!(f, "distribution failed: {e}"),
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Layout { selector, detail } => {
                write!(f, "inconsistent layouts for selector {selector}: {detail}")
            }
            Self::Unclaimed { selector, column } => write!(
                f,
                "column {column} of selector {selector} is not owned by any process"
            ),
            Self::Remote { reason } => write!(f, "coordinator failed: {reason}"),
        }
    }
}

impl Error for DistError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Comm(e) => Some(e),
            Self::Selector(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<CommError> for DistError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

impl From<SelectorError> for DistError {
    fn from(e: SelectorError) -> Self {
        Self::Selector(e)
    }
}

impl From<StoreError> for DistError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}
