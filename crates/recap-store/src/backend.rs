//! The contract shared by every persistence backend.

use recap_core::{MetaData, RunId, Value};

use crate::error::StoreError;
use crate::slice::Slice;

/// Sink and source of one selector's results.
///
/// A backend is created with the selector's frozen schema. Writing follows
/// `new_run`, any number of `save`, then `finalize`; reads may interleave
/// with writes and always see every saved row.
///
/// Reads return full nested blocks: `time` is run × row, `data` is run ×
/// row × column.
pub trait Backend {
    /// Start a new run and return its id.
    fn new_run(&mut self) -> Result<RunId, StoreError>;

    /// Append one row at time `time` to the current run.
    fn save(&mut self, time: f64, row: &[Value]) -> Result<(), StoreError>;

    /// Flush pending rows and close the current run.
    fn finalize(&mut self) -> Result<(), StoreError>;

    /// Discard every stored run.
    fn clear(&mut self) -> Result<(), StoreError> {
        Err(StoreError::Unsupported {
            op: "clear".to_string(),
        })
    }

    /// Whether at least one run was started.
    fn saving_started(&self) -> bool;

    /// Number of runs stored.
    fn run_count(&mut self) -> Result<usize, StoreError>;

    /// Save times, run × row.
    fn time(&mut self, runs: &Slice, rows: &Slice) -> Result<Vec<Vec<f64>>, StoreError>;

    /// Saved values, run × row × column.
    fn data(
        &mut self,
        runs: &Slice,
        rows: &Slice,
        cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, StoreError>;

    /// Column labels.
    fn labels(&self) -> Result<Vec<String>, StoreError>;

    /// Per-column metadata.
    fn metadata(&self) -> Result<MetaData, StoreError>;

    /// Selector description.
    fn description(&self) -> Result<String, StoreError>;
}

/// Pick `cols` out of a full row. Missing positions read as `None`.
pub(crate) fn pick(row: &[Value], cols: &[usize]) -> Vec<Value> {
    cols.iter()
        .map(|&c| row.get(c).cloned().unwrap_or_default())
        .collect()
}

/// Stand-in for a selector written by another process.
///
/// Saving is a no-op; every read is refused.
#[derive(Clone, Debug, Default)]
pub struct RemoteBackend {
    runs: usize,
}

impl RemoteBackend {
    /// A fresh stand-in.
    pub fn new() -> Self {
        Self::default()
    }

    fn refused<T>(&self) -> Result<T, StoreError> {
        Err(StoreError::AccessScope {
            detail: "results are saved by the coordinator process".to_string(),
        })
    }
}

impl Backend for RemoteBackend {
    fn new_run(&mut self) -> Result<RunId, StoreError> {
        self.runs += 1;
        Ok(RunId(self.runs as u64 - 1))
    }

    fn save(&mut self, _time: f64, _row: &[Value]) -> Result<(), StoreError> {
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn saving_started(&self) -> bool {
        self.runs > 0
    }

    fn run_count(&mut self) -> Result<usize, StoreError> {
        self.refused()
    }

    fn time(&mut self, _runs: &Slice, _rows: &Slice) -> Result<Vec<Vec<f64>>, StoreError> {
        self.refused()
    }

    fn data(
        &mut self,
        _runs: &Slice,
        _rows: &Slice,
        _cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, StoreError> {
        self.refused()
    }

    fn labels(&self) -> Result<Vec<String>, StoreError> {
        self.refused()
    }

    fn metadata(&self) -> Result<MetaData, StoreError> {
        self.refused()
    }

    fn description(&self) -> Result<String, StoreError> {
        self.refused()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_accepts_rows_and_refuses_reads() {
        let mut b = RemoteBackend::new();
        assert!(!b.saving_started());
        assert_eq!(b.new_run().unwrap(), RunId(0));
        b.save(0.0, &[Value::Float(1.0)]).unwrap();
        assert!(b.saving_started());
        assert!(matches!(
            b.data(&Slice::All, &Slice::All, &Slice::All),
            Err(StoreError::AccessScope { .. })
        ));
    }

    #[test]
    fn pick_fills_missing() {
        let row = [Value::Int(1), Value::Int(2)];
        assert_eq!(pick(&row, &[1, 5]), vec![Value::Int(2), Value::None]);
    }
}
