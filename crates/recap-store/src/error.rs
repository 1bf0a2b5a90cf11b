//! Error types for the persistence backends.

use std::fmt;
use std::io;

use recap_encode::EncodeError;

/// Errors that can occur while saving or loading results.
#[derive(Debug)]
pub enum StoreError {
    /// An I/O error occurred during read or write.
    Io(io::Error),
    /// A file could not be decoded (truncated or corrupt data).
    Malformed {
        /// Human-readable description of what went wrong.
        detail: String,
    },
    /// The SQLite database reported an error.
    Sqlite(rusqlite::Error),
    /// The HDF5 library reported an error.
    Hdf5(hdf5::Error),
    /// A binary payload could not be encoded or decoded.
    Codec(bincode::Error),
    /// A JSON metadata blob could not be encoded or decoded.
    Json(serde_json::Error),
    /// A compound value could not be encoded.
    Encode(EncodeError),
    /// The data already stored disagrees with what is being saved.
    Consistency {
        /// What disagrees, and how.
        detail: String,
    },
    /// The data lives on another process and cannot be reached from here.
    AccessScope {
        /// Which access was refused.
        detail: String,
    },
    /// An index falls outside its dimension.
    OutOfRange {
        /// Dimension being indexed (`run`, `row`, `column`).
        dim: &'static str,
        /// Requested index, as given.
        index: isize,
        /// Size of the dimension.
        len: usize,
    },
    /// The backend does not support the requested operation.
    Unsupported {
        /// The operation that was attempted.
        op: String,
    },
    /// User metadata uses a key reserved by the backend.
    ReservedKey {
        /// The reserved key.
        key: String,
    },
    /// A named entity does not exist.
    NotFound {
        /// What was looked up.
        what: String,
    },
    /// A row was saved before any run was started.
    NoRun,
    /// The store was opened read-only.
    ReadOnly,
}

impl fmt::Display for StoreError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Malformed { detail } => write!(f, "malformed data: {detail}"),
            Self::Sqlite(e) => write!(f, "sqlite error: {e}"),
            Self::Hdf5(e) => write!(f, "hdf5 error: {e}"),
            Self::Codec(e) => write!(f, "binary codec error: {e}"),
            Self::Json(e) => write!(f, "json codec error: {e}"),
            Self::Encode(e) => write!(f, "{e}"),
            Self::Consistency { detail } => write!(
                f,
                "stored data does not match: {detail}; target a different file or run group"
            ),
            Self::AccessScope { detail } => write!(f, "access refused: {detail}"),
            Self::OutOfRange { dim, index, len } => {
                write!(f, "{dim} index {index} out of range for length {len}")
            }
            Self::Unsupported { op } => write!(f, "unsupported operation: {op}"),
            Self::ReservedKey { key } => {
                write!(f, "metadata key '{key}' is reserved")
            }
            Self::NotFound { what } => write!(f, "{what} not found"),
            Self::NoRun => write!(f, "no run started; call new_run before saving"),
            Self::ReadOnly => write!(f, "store was opened read-only"),
        }
    }
}

impl std::error::Error for StoreError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Sqlite(e) => Some(e),
            Self::Hdf5(e) => Some(e),
            Self::Codec(e) => Some(e),
            Self::Json(e) => Some(e),
            Self::Encode(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        Self::Sqlite(e)
    }
}

impl From<hdf5::Error> for StoreError {
    fn from(e: hdf5::Error) -> Self {
        Self::Hdf5(e)
    }
}

impl From<bincode::Error> for StoreError {
    fn from(e: bincode::Error) -> Self {
        Self::Codec(e)
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Json(e)
    }
}

impl From<EncodeError> for StoreError {
    fn from(e: EncodeError) -> Self {
        Self::Encode(e)
    }
}
