//! Saved selectors loaded back for reading.

use std::fmt;
use std::path::Path;

use recap_core::{MetaData, Value};

use crate::backend::Backend;
use crate::error::StoreError;
use crate::file::FileBackend;
use crate::slice::Slice;

/// A selector's saved results, without the simulation that produced them.
///
/// Obtained from a result file or from a run group's `results()`.
pub struct ReadOnlySelector {
    backend: Box<dyn Backend>,
}

impl ReadOnlySelector {
    /// Wrap a backend positioned on stored results.
    pub fn new(backend: Box<dyn Backend>) -> Self {
        Self { backend }
    }

    /// Open a result file written by a [`FileBackend`], possibly while
    /// another process is still writing it.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        Ok(Self::new(Box::new(FileBackend::open_read_only(path)?)))
    }

    /// Number of stored runs.
    pub fn run_count(&mut self) -> Result<usize, StoreError> {
        self.backend.run_count()
    }

    /// Save times, run × row.
    pub fn time(&mut self, runs: &Slice, rows: &Slice) -> Result<Vec<Vec<f64>>, StoreError> {
        self.backend.time(runs, rows)
    }

    /// Saved values, run × row × column.
    pub fn data(
        &mut self,
        runs: &Slice,
        rows: &Slice,
        cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, StoreError> {
        self.backend.data(runs, rows, cols)
    }

    /// Column labels.
    pub fn labels(&self) -> Result<Vec<String>, StoreError> {
        self.backend.labels()
    }

    /// Per-column metadata.
    pub fn metadata(&self) -> Result<MetaData, StoreError> {
        self.backend.metadata()
    }

    /// Selector description.
    pub fn description(&self) -> Result<String, StoreError> {
        self.backend.description()
    }
}

impl fmt::Debug for ReadOnlySelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReadOnlySelector")
            .field("description", &self.description().unwrap_or_default())
            .finish_non_exhaustive()
    }
}
