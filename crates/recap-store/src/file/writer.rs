//! Result file writer.
//!
//! [`FileWriter`] appends runs to any seekable sink. The label and
//! metadata blocks are written on construction; run headers are rewritten
//! in place when the next run starts and when the writer is finalized.

use std::io::{Seek, SeekFrom, Write};

use recap_core::{Schema, Value};

use crate::config::FileFormat;
use crate::error::StoreError;
use crate::file::codec::{
    with_reserved, write_header, write_labels, write_metadata, write_row, RunHeader,
    RESERVED_KEYS,
};

/// Writes one selector's runs to a byte stream.
///
/// Generic over `W: Write + Seek` so tests can use `Cursor<Vec<u8>>` and
/// production code can use `BufWriter<File>`.
///
/// # Examples
///
/// ```
/// use std::io::Cursor;
/// use recap_core::{MetaData, Schema, SelectorId, Value};
/// use recap_store::file::{FileReader, FileWriter};
/// use recap_store::FileFormat;
///
/// let schema = Schema {
///     index: SelectorId(0),
///     description: "A.Count".into(),
///     labels: vec!["A.Count".into()],
///     metadata: MetaData::new(),
///     value_names: vec![None],
/// };
/// let mut writer = FileWriter::new(Cursor::new(Vec::new()), &schema, FileFormat::Current).unwrap();
/// writer.new_run().unwrap();
/// writer.write_row(0.0, &[Value::Float(100.0)]).unwrap();
/// writer.write_row(0.1, &[Value::Float(99.0)]).unwrap();
/// writer.finalize().unwrap();
///
/// let bytes = writer.into_inner().into_inner();
/// let mut reader = FileReader::open(Cursor::new(bytes)).unwrap();
/// assert_eq!(reader.labels(), ["A.Count"]);
/// let runs = reader.runs().unwrap();
/// assert_eq!(runs[0].rows, Some(2));
/// ```
pub struct FileWriter<W: Write + Seek> {
    writer: W,
    format: FileFormat,
    len: usize,
    current: Option<(u64, RunHeader)>,
    runs_written: u64,
}

impl<W: Write + Seek> FileWriter<W> {
    /// Create a writer, immediately writing the label and metadata blocks.
    ///
    /// Fails if the schema metadata uses a reserved key.
    pub fn new(mut writer: W, schema: &Schema, format: FileFormat) -> Result<Self, StoreError> {
        check_reserved(schema)?;
        write_labels(&mut writer, &schema.labels)?;
        write_metadata(
            &mut writer,
            &with_reserved(&schema.metadata, format, &schema.description),
        )?;
        Ok(Self {
            writer,
            format,
            len: schema.len(),
            current: None,
            runs_written: 0,
        })
    }

    /// Close the current run, if any, and start the next one.
    pub fn new_run(&mut self) -> Result<u64, StoreError> {
        let start = self.writer.seek(SeekFrom::End(0))?;
        if let Some((offset, mut header)) = self.current.take() {
            header.next = start;
            self.rewrite(offset, &header)?;
        }
        let run_id = self.runs_written;
        let header = RunHeader::open(run_id, self.len);
        write_header(&mut self.writer, &header)?;
        self.current = Some((start, header));
        self.runs_written += 1;
        Ok(run_id)
    }

    /// Append a row to the current run.
    pub fn write_row(&mut self, time: f64, row: &[Value]) -> Result<(), StoreError> {
        let (_, header) = self.current.as_mut().ok_or(StoreError::NoRun)?;
        if row.len() != self.len {
            return Err(StoreError::Malformed {
                detail: format!("row of {} values, expected {}", row.len(), self.len),
            });
        }
        write_row(&mut self.writer, self.format, time, row)?;
        header.rows += 1;
        Ok(())
    }

    /// Record the current run's row count in its header and flush.
    pub fn finalize(&mut self) -> Result<(), StoreError> {
        if let Some((offset, header)) = self.current {
            self.rewrite(offset, &header)?;
        }
        self.flush()
    }

    /// Flush buffered bytes to the sink.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        self.writer.flush()?;
        Ok(())
    }

    /// Rows written to the current run.
    pub fn current_rows(&self) -> u64 {
        self.current.map_or(0, |(_, h)| h.rows)
    }

    /// Number of runs started.
    pub fn runs_written(&self) -> u64 {
        self.runs_written
    }

    /// Consume the writer, returning the sink.
    pub fn into_inner(self) -> W {
        self.writer
    }

    fn rewrite(&mut self, offset: u64, header: &RunHeader) -> Result<(), StoreError> {
        self.writer.seek(SeekFrom::Start(offset))?;
        write_header(&mut self.writer, header)?;
        self.writer.seek(SeekFrom::End(0))?;
        Ok(())
    }
}

/// Reject schemas whose metadata collides with the backend's own keys.
pub fn check_reserved(schema: &Schema) -> Result<(), StoreError> {
    match RESERVED_KEYS
        .iter()
        .find(|k| schema.metadata.contains_key(**k))
    {
        Some(k) => Err(StoreError::ReservedKey { key: k.to_string() }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::file::codec::{read_header, read_labels, read_metadata};
    use recap_core::{MetaData, SelectorId};
    use std::io::Cursor;

    fn schema(len: usize) -> Schema {
        Schema {
            index: SelectorId(0),
            description: "test".into(),
            labels: (0..len).map(|i| format!("c{i}")).collect(),
            metadata: MetaData::new(),
            value_names: vec![None; len],
        }
    }

    #[test]
    fn headers_are_chained() {
        let mut w = FileWriter::new(Cursor::new(Vec::new()), &schema(1), FileFormat::Legacy)
            .unwrap();
        w.new_run().unwrap();
        w.write_row(0.0, &[Value::Float(1.0)]).unwrap();
        w.new_run().unwrap();
        w.write_row(0.0, &[Value::Float(2.0)]).unwrap();
        w.write_row(1.0, &[Value::Float(3.0)]).unwrap();
        w.finalize().unwrap();

        let bytes = w.into_inner().into_inner();
        let mut r = bytes.as_slice();
        read_labels(&mut r).unwrap();
        read_metadata(&mut r).unwrap();
        let data_start = (bytes.len() - r.len()) as u64;

        let first = read_header(&mut r).unwrap().unwrap();
        assert_eq!(first.run_id, 0);
        assert_eq!(first.rows, 1);
        assert_eq!(first.next, data_start + RunHeader::SIZE + 16);
        let mut at = &bytes[first.next as usize..];
        let second = read_header(&mut at).unwrap().unwrap();
        assert_eq!(second.run_id, 1);
        assert_eq!(second.rows, 2);
        assert_eq!(second.next, 0);
    }

    #[test]
    fn reserved_keys_rejected() {
        let mut s = schema(1);
        s.metadata
            .insert("__recap_format__".into(), vec![Value::None]);
        assert!(matches!(
            FileWriter::new(Cursor::new(Vec::new()), &s, FileFormat::Current),
            Err(StoreError::ReservedKey { .. })
        ));
    }

    #[test]
    fn rows_need_a_run() {
        let mut w = FileWriter::new(Cursor::new(Vec::new()), &schema(2), FileFormat::Current)
            .unwrap();
        assert!(matches!(
            w.write_row(0.0, &[Value::None, Value::None]),
            Err(StoreError::NoRun)
        ));
        w.new_run().unwrap();
        assert!(w.write_row(0.0, &[Value::None]).is_err());
    }
}
