//! Error types for the external collaborators: the simulation and the
//! process group.

use std::error::Error;
use std::fmt;

/// Errors reported by a [`Simulation`](crate::Simulation).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimError {
    /// The path does not resolve to anything in the simulation.
    PathNotFound {
        /// Dotted form of the offending path.
        path: String,
    },
    /// The path resolves, but the terminal property is unknown.
    UnknownProperty {
        /// Dotted form of the path.
        path: String,
        /// Requested property.
        property: String,
    },
    /// The simulation failed while answering a query or advancing.
    Failed {
        /// Human-readable description of the failure.
        reason: String,
    },
}

impl fmt::Display for SimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PathNotFound { path } => write!(f, "path '{path}' not found in simulation"),
            Self::UnknownProperty { path, property } => {
                write!(f, "'{path}' has no property '{property}'")
            }
            Self::Failed { reason } => write!(f, "simulation failed: {reason}"),
        }
    }
}

impl Error for SimError {}

/// Errors from collective operations on a
/// [`ProcessGroup`](crate::ProcessGroup).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum CommError {
    /// A peer went away before the collective completed.
    Disconnected {
        /// Rank of the peer, if known.
        peer: Option<u32>,
    },
    /// A payload could not be encoded or decoded.
    Codec {
        /// Underlying codec message.
        reason: String,
    },
    /// A message from a different collective call arrived.
    OutOfOrder {
        /// Sequence number this rank expected.
        expected: u64,
        /// Sequence number actually received.
        got: u64,
    },
}

impl fmt::Display for CommError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Disconnected { peer: Some(p) } => write!(f, "rank {p} disconnected"),
            Self::Disconnected { peer: None } => write!(f, "process group disconnected"),
            Self::Codec { reason } => write!(f, "collective payload codec error: {reason}"),
            Self::OutOfOrder { expected, got } => {
                write!(f, "collective out of order: expected #{expected}, got #{got}")
            }
        }
    }
}

impl Error for CommError {}

impl From<bincode::Error> for CommError {
    fn from(e: bincode::Error) -> Self {
        Self::Codec {
            reason: e.to_string(),
        }
    }
}
