//! Append-only array storage behind the encoder.

use crate::error::EncodeError;
use crate::record::Record;

/// Five append-only arrays holding encoded values.
///
/// Implementations only append; existing elements never change, so a
/// handle's referent is stable once written. Range reads return `None`
/// when the range lies outside the array.
pub trait CompoundStorage {
    /// Number of records (valid handles are `0..record_count()`).
    fn record_count(&self) -> usize;

    /// Record at `index`, `None` if missing or undecodable.
    fn record(&self, index: usize) -> Option<Record>;

    /// Append a record and return its handle.
    fn push_record(&mut self, record: Record) -> Result<i64, EncodeError>;

    /// Append integers, returning the `(start, end)` range.
    fn push_ints(&mut self, data: &[i64]) -> Result<(i64, i64), EncodeError>;

    /// Append floats, returning the `(start, end)` range.
    fn push_floats(&mut self, data: &[f64]) -> Result<(i64, i64), EncodeError>;

    /// Append string bytes, returning the `(start, end)` range.
    fn push_bytes(&mut self, data: &[u8]) -> Result<(i64, i64), EncodeError>;

    /// Append child handles, returning the `(start, end)` range.
    fn push_handles(&mut self, data: &[i64]) -> Result<(i64, i64), EncodeError>;

    /// Integers in `start..end`.
    fn ints(&self, start: usize, end: usize) -> Option<Vec<i64>>;

    /// Floats in `start..end`.
    fn floats(&self, start: usize, end: usize) -> Option<Vec<f64>>;

    /// String bytes in `start..end`.
    fn bytes(&self, start: usize, end: usize) -> Option<Vec<u8>>;

    /// Child handles in `start..end`.
    fn handles(&self, start: usize, end: usize) -> Option<Vec<i64>>;

    /// Total number of stored elements across all arrays.
    fn stored_len(&self) -> usize;
}

/// In-memory storage backed by plain vectors.
#[derive(Clone, Debug, Default)]
pub struct VecStorage {
    records: Vec<[i64; 3]>,
    ints: Vec<i64>,
    floats: Vec<f64>,
    bytes: Vec<u8>,
    handles: Vec<i64>,
    read_only: bool,
}

fn append<T: Clone>(dst: &mut Vec<T>, data: &[T]) -> (i64, i64) {
    let start = dst.len() as i64;
    dst.extend_from_slice(data);
    (start, dst.len() as i64)
}

fn range<T: Clone>(src: &[T], start: usize, end: usize) -> Option<Vec<T>> {
    src.get(start..end).map(<[T]>::to_vec)
}

impl VecStorage {
    /// Empty writable storage.
    pub fn new() -> Self {
        Self::default()
    }

    /// Freeze the storage: every later append fails.
    pub fn into_read_only(mut self) -> Self {
        self.read_only = true;
        self
    }

    fn check_writable(&self) -> Result<(), EncodeError> {
        if self.read_only {
            Err(EncodeError::ReadOnly)
        } else {
            Ok(())
        }
    }
}

impl CompoundStorage for VecStorage {
    fn record_count(&self) -> usize {
        self.records.len()
    }

    fn record(&self, index: usize) -> Option<Record> {
        self.records.get(index).copied().and_then(Record::from_row)
    }

    fn push_record(&mut self, record: Record) -> Result<i64, EncodeError> {
        self.check_writable()?;
        self.records.push(record.to_row());
        Ok(self.records.len() as i64 - 1)
    }

    fn push_ints(&mut self, data: &[i64]) -> Result<(i64, i64), EncodeError> {
        self.check_writable()?;
        Ok(append(&mut self.ints, data))
    }

    fn push_floats(&mut self, data: &[f64]) -> Result<(i64, i64), EncodeError> {
        self.check_writable()?;
        Ok(append(&mut self.floats, data))
    }

    fn push_bytes(&mut self, data: &[u8]) -> Result<(i64, i64), EncodeError> {
        self.check_writable()?;
        Ok(append(&mut self.bytes, data))
    }

    fn push_handles(&mut self, data: &[i64]) -> Result<(i64, i64), EncodeError> {
        self.check_writable()?;
        Ok(append(&mut self.handles, data))
    }

    fn ints(&self, start: usize, end: usize) -> Option<Vec<i64>> {
        range(&self.ints, start, end)
    }

    fn floats(&self, start: usize, end: usize) -> Option<Vec<f64>> {
        range(&self.floats, start, end)
    }

    fn bytes(&self, start: usize, end: usize) -> Option<Vec<u8>> {
        range(&self.bytes, start, end)
    }

    fn handles(&self, start: usize, end: usize) -> Option<Vec<i64>> {
        range(&self.handles, start, end)
    }

    fn stored_len(&self) -> usize {
        self.records.len() + self.ints.len() + self.floats.len() + self.bytes.len() + self.handles.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Kind;

    #[test]
    fn ranges_are_contiguous() {
        let mut s = VecStorage::new();
        assert_eq!(s.push_ints(&[1, 2]).unwrap(), (0, 2));
        assert_eq!(s.push_ints(&[3]).unwrap(), (2, 3));
        assert_eq!(s.ints(1, 3), Some(vec![2, 3]));
        assert_eq!(s.ints(2, 9), None);
    }

    #[test]
    fn read_only_rejects_appends() {
        let mut s = VecStorage::new().into_read_only();
        let rec = Record {
            kind: Kind::Int,
            start: 0,
            end: -1,
        };
        assert_eq!(s.push_record(rec), Err(EncodeError::ReadOnly));
        assert_eq!(s.push_bytes(b"x"), Err(EncodeError::ReadOnly));
    }
}
