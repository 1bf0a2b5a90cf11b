//! Encoder error types.

use std::error::Error;
use std::fmt;

/// Errors that can occur while writing encoded values.
///
/// Reads never fail: a missing or damaged record is reported with a
/// warning and decoded as the absent value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum EncodeError {
    /// The storage was opened read-only.
    ReadOnly,
    /// The underlying storage rejected an append.
    Storage {
        /// Description from the storage.
        reason: String,
    },
}

impl fmt::Display for EncodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadOnly => write!(f, "compound storage is read-only"),
            Self::Storage { reason } => write!(f, "compound storage error: {reason}"),
        }
    }
}

impl Error for EncodeError {}
