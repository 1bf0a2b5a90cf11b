//! Selector error types.

use recap_core::SimError;
use std::error::Error;
use std::fmt;

/// Errors from building, mutating or evaluating selectors.
#[derive(Clone, Debug, PartialEq)]
pub enum SelectorError {
    /// Operands belong to different simulation instances.
    Incompatible,
    /// Operand lengths cannot be combined.
    Shape {
        /// Operation being built, e.g. `+`.
        op: String,
        /// Length of the left operand.
        left: usize,
        /// Length of the right operand.
        right: usize,
    },
    /// The path is not bound to a terminal property.
    Incomplete {
        /// Dotted form of the incomplete path.
        path: String,
    },
    /// Labels, metadata or description changed after saving started.
    Frozen {
        /// What the caller tried to change.
        what: &'static str,
    },
    /// A per-column list has the wrong length.
    Length {
        /// Number of columns of the selector.
        expected: usize,
        /// Length supplied.
        got: usize,
    },
    /// The metadata key is reserved for backend bookkeeping.
    ReservedKey {
        /// Offending key.
        key: String,
    },
    /// Metadata values must be numbers, strings or None.
    InvalidMetadata {
        /// Offending key.
        key: String,
    },
    /// A custom row value does not match its declared column type.
    InvalidValue {
        /// Label of the offending column.
        column: String,
    },
    /// `JOIN` needs at least one selector.
    EmptyJoin,
    /// Timing cannot be used with this source.
    InvalidTiming {
        /// Why the timing was rejected.
        reason: String,
    },
    /// The simulation failed to describe or answer a query.
    Sim(SimError),
}

impl fmt::Display for SelectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Incompatible => {
                write!(f, "cannot combine selectors associated to different simulations")
            }
            Self::Shape { op, left, right } => write!(
                f,
                "cannot apply '{op}': incompatible output lengths {left} and {right}"
            ),
            Self::Incomplete { path } => write!(f, "'{path}' is not a complete selector"),
            Self::Frozen { what } => {
                write!(f, "cannot modify the {what} once saving has started")
            }
            Self::Length { expected, got } => {
                write!(f, "expected a list of length {expected}, got {got}")
            }
            Self::ReservedKey { key } => write!(f, "metadata key '{key}' is reserved"),
            Self::InvalidMetadata { key } => write!(
                f,
                "metadata '{key}' can only be composed of numbers, strings and None"
            ),
            Self::InvalidValue { column } => {
                write!(f, "value of column '{column}' does not match its declared type")
            }
            Self::EmptyJoin => write!(f, "at least one selector should be supplied to JOIN"),
            Self::InvalidTiming { reason } => write!(f, "invalid save timing: {reason}"),
            Self::Sim(e) => write!(f, "simulation error: {e}"),
        }
    }
}

impl Error for SelectorError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Sim(e) => Some(e),
            _ => None,
        }
    }
}

impl From<SimError> for SelectorError {
    fn from(e: SimError) -> Self {
        Self::Sim(e)
    }
}
