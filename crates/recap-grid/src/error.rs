//! Error types for grid partitioning and XDMF export.

use std::error::Error;
use std::fmt;
use std::io;

use recap_core::{CommError, LocationKind, SelectorId};
use recap_store::StoreError;

/// Errors from building grids or writing XDMF descriptors.
#[derive(Debug)]
pub enum GridError {
    /// The underlying store failed.
    Store(StoreError),
    /// Exchanging grid locations between ranks failed.
    Comm(CommError),
    /// An XML event could not be written.
    Xml(quick_xml::Error),
    /// A descriptor file could not be written.
    Io(io::Error),
    /// A selector column is tagged with a region the mesh does not have.
    UnknownRegion {
        /// Kind of the region.
        kind: LocationKind,
        /// Name of the region.
        name: String,
    },
    /// A `loc_type` / `loc_id` pair that cannot be interpreted.
    Location {
        /// Selector holding the column.
        selector: SelectorId,
        /// Column index.
        column: usize,
        /// What is wrong with it.
        detail: String,
    },
    /// The store holds grid geometry from a different partition.
    Splitting {
        /// Grid name.
        grid: String,
        /// Number of elements stored.
        stored: usize,
        /// Number of elements of the current partition.
        expected: usize,
    },
}

impl fmt::Display for GridError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Store(e) => write!(f, "store error: {e}"),
            Self::Comm(e) => write!(f, "collective failed: {e}"),
            Self::Xml(e) => write!(f, "xml error: {e}"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::UnknownRegion { kind, name } => {
                write!(f, "the mesh has no {kind} named '{name}'")
            }
            Self::Location {
                selector,
                column,
                detail,
            } => write!(
                f,
                "column {column} of selector {selector} has an invalid location: {detail}"
            ),
            Self::Splitting {
                grid,
                stored,
                expected,
            } => write!(
                f,
                "grid {grid} was saved with {stored} elements but now has {expected}; \
                 previous runs used a different mesh splitting"
            ),
        }
    }
}

impl Error for GridError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Store(e) => Some(e),
            Self::Comm(e) => Some(e),
            Self::Xml(e) => Some(e),
            Self::Io(e) => Some(e),
            _ => None,
        }
    }
}

impl From<StoreError> for GridError {
    fn from(e: StoreError) -> Self {
        Self::Store(e)
    }
}

impl From<CommError> for GridError {
    fn from(e: CommError) -> Self {
        Self::Comm(e)
    }
}

impl From<quick_xml::Error> for GridError {
    fn from(e: quick_xml::Error) -> Self {
        Self::Xml(e)
    }
}

impl From<io::Error> for GridError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<GridError> for StoreError {
    fn from(e: GridError) -> Self {
        match e {
            GridError::Store(e) => e,
            GridError::Io(e) => StoreError::Io(e),
            GridError::Splitting { .. } => StoreError::Consistency {
                detail: e.to_string(),
            },
            other => StoreError::Malformed {
                detail: other.to_string(),
            },
        }
    }
}
