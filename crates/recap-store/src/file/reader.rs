//! Result file reader.
//!
//! [`FileReader`] decodes the label and metadata blocks on construction and
//! walks the run header chain on demand, so a file still being written by
//! another process can be read repeatedly.

use std::io::{Read, Seek, SeekFrom};

use recap_core::{MetaData, Value};
use tracing::warn;

use crate::config::FileFormat;
use crate::error::StoreError;
use crate::file::codec::{
    legacy_row_size, read_header, read_labels, read_metadata, read_row, read_u32_be,
    split_reserved, RunHeader,
};

/// Location and size of one stored run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunInfo {
    /// Run ordinal recorded in the header.
    pub run_id: u64,
    /// Offset of the run's first row.
    pub offset: u64,
    /// Row count, `None` when the run was never closed.
    pub rows: Option<u64>,
}

impl RunInfo {
    /// Whether the writer stopped before closing this run.
    pub fn is_partial(&self) -> bool {
        self.rows.is_none()
    }
}

/// Reads a result file from a seekable byte source.
///
/// Generic over `R: Read + Seek` so tests can use `Cursor<Vec<u8>>` and
/// production code can use `BufReader<File>`.
pub struct FileReader<R: Read + Seek> {
    reader: R,
    labels: Vec<String>,
    metadata: MetaData,
    description: String,
    format: FileFormat,
    data_start: u64,
}

impl<R: Read + Seek> FileReader<R> {
    /// Decode the label and metadata blocks.
    pub fn open(mut reader: R) -> Result<Self, StoreError> {
        let labels = read_labels(&mut reader)?;
        let (metadata, format, description) = split_reserved(read_metadata(&mut reader)?)?;
        let data_start = reader.stream_position()?;
        Ok(Self {
            reader,
            labels,
            metadata,
            description,
            format,
            data_start,
        })
    }

    /// Column labels.
    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    /// User metadata, without the reserved keys.
    pub fn metadata(&self) -> &MetaData {
        &self.metadata
    }

    /// Selector description, empty in files that predate it.
    pub fn description(&self) -> &str {
        &self.description
    }

    /// Row encoding of the file.
    pub fn format(&self) -> FileFormat {
        self.format
    }

    /// Number of columns.
    pub fn len(&self) -> usize {
        self.labels.len()
    }

    /// Whether the selector has no column.
    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    /// Walk the header chain.
    pub fn runs(&mut self) -> Result<Vec<RunInfo>, StoreError> {
        let mut out = Vec::new();
        let mut pos = self.data_start;
        loop {
            self.reader.seek(SeekFrom::Start(pos))?;
            let Some(h) = read_header(&mut self.reader)? else {
                break;
            };
            if h.cols != 1 + self.len() as u64 {
                return Err(StoreError::Malformed {
                    detail: format!(
                        "run {} has {} columns, expected {}",
                        h.run_id,
                        h.cols,
                        1 + self.len()
                    ),
                });
            }
            out.push(RunInfo {
                run_id: h.run_id,
                offset: pos + RunHeader::SIZE,
                rows: (!h.is_partial()).then_some(h.rows),
            });
            if h.next == 0 {
                break;
            }
            if h.next <= pos {
                return Err(StoreError::Malformed {
                    detail: format!("run header chain loops back to offset {}", h.next),
                });
            }
            pos = h.next;
        }
        Ok(out)
    }

    /// Offsets of the rows of `run`, up to `limit` rows.
    ///
    /// A partial run is scanned to the end of the file; a truncated trailing
    /// row is dropped.
    fn row_offsets(&mut self, run: &RunInfo, limit: Option<u64>) -> Result<Vec<u64>, StoreError> {
        let end = self.reader.seek(SeekFrom::End(0))?;
        let limit = match (run.rows, limit) {
            (Some(r), Some(l)) => r.min(l),
            (Some(r), None) => r,
            (None, l) => l.unwrap_or(u64::MAX),
        };
        let mut out = Vec::new();
        let mut pos = run.offset;
        while (out.len() as u64) < limit {
            let size = match self.format {
                FileFormat::Legacy => legacy_row_size(self.len()),
                FileFormat::Current => {
                    if pos + 4 > end {
                        break;
                    }
                    self.reader.seek(SeekFrom::Start(pos))?;
                    4 + read_u32_be(&mut self.reader)? as u64
                }
            };
            if pos + size > end {
                if run.is_partial() {
                    warn!(offset = pos, "dropping truncated row at end of result file");
                    break;
                }
                return Err(StoreError::Malformed {
                    detail: format!("run {} is shorter than its header", run.run_id),
                });
            }
            out.push(pos);
            pos += size;
        }
        Ok(out)
    }

    /// Number of rows available in `run`.
    pub fn row_count(&mut self, run: &RunInfo) -> Result<u64, StoreError> {
        match run.rows {
            Some(r) => Ok(r),
            None => {
                let n = self.row_offsets(run, None)?.len() as u64;
                warn!(
                    run = run.run_id,
                    rows = n,
                    "run was not closed properly; returning the rows available"
                );
                Ok(n)
            }
        }
    }

    /// Rows of `run` at `indices`, in the order given.
    pub fn read_rows(
        &mut self,
        run: &RunInfo,
        indices: &[usize],
    ) -> Result<Vec<(f64, Vec<Value>)>, StoreError> {
        let Some(&max) = indices.iter().max() else {
            return Ok(Vec::new());
        };
        let offsets = self.row_offsets(run, Some(max as u64 + 1))?;
        let (format, len) = (self.format, self.len());
        indices
            .iter()
            .map(|&i| {
                let offset = *offsets.get(i).ok_or(StoreError::OutOfRange {
                    dim: "row",
                    index: i as isize,
                    len: offsets.len(),
                })?;
                self.reader.seek(SeekFrom::Start(offset))?;
                read_row(&mut self.reader, format, len)?.ok_or_else(|| {
                    StoreError::Malformed {
                        detail: format!("missing row {i} of run {}", run.run_id),
                    }
                })
            })
            .collect()
    }
}
