//! Binary encode/decode for result files.
//!
//! All integers are big-endian. A file holds a label block, a metadata
//! block, then a chain of runs, each a fixed 32-byte header followed by
//! its rows:
//!
//! ```text
//! labels    u32 count, then per label u32 length + UTF-8 bytes
//! metadata  u32 length + bincode blob
//! header    u64 run_id, u64 row_count, u64 col_count, u64 next_offset
//! row       legacy:  col_count x f64 (t, v0 .. vN)
//!           current: u32 length + bincode (t, row)
//! ```
//!
//! A header is written with `row_count == 0` and `next_offset == 0` and
//! rewritten in place once the run is closed.

use std::io::{ErrorKind, Read, Write};

use recap_core::{MetaData, Value};

use crate::config::FileFormat;
use crate::error::StoreError;

/// Metadata key recording the row encoding of the file.
pub const FORMAT_KEY: &str = "__recap_format__";

/// Metadata key holding the selector description.
pub const DESCRIPTION_KEY: &str = "__selector_description__";

/// Keys the file backend writes into the metadata block itself.
pub const RESERVED_KEYS: [&str; 2] = [FORMAT_KEY, DESCRIPTION_KEY];

// ── Primitive writers ───────────────────────────────────────────

/// Write a big-endian u32.
pub fn write_u32_be(w: &mut dyn Write, v: u32) -> Result<(), StoreError> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Write a big-endian u64.
pub fn write_u64_be(w: &mut dyn Write, v: u64) -> Result<(), StoreError> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Write a big-endian f64.
pub fn write_f64_be(w: &mut dyn Write, v: f64) -> Result<(), StoreError> {
    w.write_all(&v.to_be_bytes())?;
    Ok(())
}

/// Write a length-prefixed byte array (u32 length + bytes).
pub fn write_length_prefixed_bytes(w: &mut dyn Write, b: &[u8]) -> Result<(), StoreError> {
    write_u32_be(w, b.len() as u32)?;
    w.write_all(b)?;
    Ok(())
}

// ── Primitive readers ───────────────────────────────────────────

/// Read a big-endian u32.
pub fn read_u32_be(r: &mut dyn Read) -> Result<u32, StoreError> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Read a big-endian u64.
pub fn read_u64_be(r: &mut dyn Read) -> Result<u64, StoreError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Read a big-endian f64.
pub fn read_f64_be(r: &mut dyn Read) -> Result<f64, StoreError> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(f64::from_be_bytes(buf))
}

/// Read a length-prefixed byte array.
pub fn read_length_prefixed_bytes(r: &mut dyn Read) -> Result<Vec<u8>, StoreError> {
    let len = read_u32_be(r)? as usize;
    let mut buf = vec![0u8; len];
    r.read_exact(&mut buf)?;
    Ok(buf)
}

/// Fill `buf`, returning `false` on clean EOF (no bytes available).
///
/// A partial fill is a truncated file.
fn fill_or_eof(r: &mut dyn Read, buf: &mut [u8]) -> Result<bool, StoreError> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..]) {
            Ok(0) if filled == 0 => return Ok(false),
            Ok(0) => {
                return Err(StoreError::Malformed {
                    detail: format!("truncated record: got {filled} of {} bytes", buf.len()),
                })
            }
            Ok(n) => filled += n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(StoreError::Io(e)),
        }
    }
    Ok(true)
}

// ── Blocks ──────────────────────────────────────────────────────

/// Write the label block.
pub fn write_labels(w: &mut dyn Write, labels: &[String]) -> Result<(), StoreError> {
    write_u32_be(w, labels.len() as u32)?;
    for l in labels {
        write_length_prefixed_bytes(w, l.as_bytes())?;
    }
    Ok(())
}

/// Read the label block.
pub fn read_labels(r: &mut dyn Read) -> Result<Vec<String>, StoreError> {
    let count = read_u32_be(r)? as usize;
    (0..count)
        .map(|_| {
            String::from_utf8(read_length_prefixed_bytes(r)?).map_err(|e| StoreError::Malformed {
                detail: format!("invalid UTF-8 label: {e}"),
            })
        })
        .collect()
}

/// Write the metadata block.
pub fn write_metadata(w: &mut dyn Write, metadata: &MetaData) -> Result<(), StoreError> {
    let blob = bincode::serialize(metadata)?;
    write_length_prefixed_bytes(w, &blob)
}

/// Read the metadata block.
pub fn read_metadata(r: &mut dyn Read) -> Result<MetaData, StoreError> {
    let blob = read_length_prefixed_bytes(r)?;
    Ok(bincode::deserialize(&blob)?)
}

/// Split the backend's own keys out of a stored metadata block.
///
/// Returns the user metadata, the row format (legacy when the key is
/// absent) and the description.
pub fn split_reserved(mut metadata: MetaData) -> Result<(MetaData, FileFormat, String), StoreError> {
    let format = match metadata.shift_remove(FORMAT_KEY) {
        None => FileFormat::Legacy,
        Some(v) => {
            let tag = v.first().and_then(Value::as_str).unwrap_or_default();
            FileFormat::from_tag(tag).ok_or_else(|| StoreError::Malformed {
                detail: format!("unknown row format '{tag}'"),
            })?
        }
    };
    let description = metadata
        .shift_remove(DESCRIPTION_KEY)
        .and_then(|v| v.first().and_then(Value::as_str).map(str::to_string))
        .unwrap_or_default();
    Ok((metadata, format, description))
}

/// User metadata plus the backend's own keys.
pub fn with_reserved(metadata: &MetaData, format: FileFormat, description: &str) -> MetaData {
    let mut out = metadata.clone();
    out.insert(FORMAT_KEY.to_string(), vec![Value::from(format.tag())]);
    out.insert(DESCRIPTION_KEY.to_string(), vec![Value::from(description)]);
    out
}

// ── Run headers ─────────────────────────────────────────────────

/// Fixed-size header preceding the rows of a run.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RunHeader {
    /// Run ordinal.
    pub run_id: u64,
    /// Rows in the run, 0 until the run is closed.
    pub rows: u64,
    /// Values per row, the time included.
    pub cols: u64,
    /// Offset of the next header, 0 for the last run.
    pub next: u64,
}

impl RunHeader {
    /// Encoded size in bytes.
    pub const SIZE: u64 = 32;

    /// Header of a freshly started run.
    pub fn open(run_id: u64, len: usize) -> Self {
        Self {
            run_id,
            rows: 0,
            cols: 1 + len as u64,
            next: 0,
        }
    }

    /// Whether the run was never closed (interrupted writer).
    pub fn is_partial(&self) -> bool {
        self.next == 0 && self.rows == 0
    }
}

/// Write a run header.
pub fn write_header(w: &mut dyn Write, h: &RunHeader) -> Result<(), StoreError> {
    write_u64_be(w, h.run_id)?;
    write_u64_be(w, h.rows)?;
    write_u64_be(w, h.cols)?;
    write_u64_be(w, h.next)
}

/// Read a run header, or `None` on clean EOF.
pub fn read_header(r: &mut dyn Read) -> Result<Option<RunHeader>, StoreError> {
    let mut buf = [0u8; RunHeader::SIZE as usize];
    if !fill_or_eof(r, &mut buf)? {
        return Ok(None);
    }
    let word = |i: usize| {
        let mut b = [0u8; 8];
        b.copy_from_slice(&buf[i * 8..i * 8 + 8]);
        u64::from_be_bytes(b)
    };
    Ok(Some(RunHeader {
        run_id: word(0),
        rows: word(1),
        cols: word(2),
        next: word(3),
    }))
}

// ── Rows ────────────────────────────────────────────────────────

/// Write one row in `format`.
///
/// Legacy rows only hold numbers; `None` is written as NaN.
pub fn write_row(
    w: &mut dyn Write,
    format: FileFormat,
    time: f64,
    row: &[Value],
) -> Result<(), StoreError> {
    match format {
        FileFormat::Legacy => {
            write_f64_be(w, time)?;
            for v in row {
                let x = match v {
                    Value::None => f64::NAN,
                    other => other.as_f64().ok_or_else(|| StoreError::Unsupported {
                        op: format!("saving a {} value in a legacy file", other.type_name()),
                    })?,
                };
                write_f64_be(w, x)?;
            }
            Ok(())
        }
        FileFormat::Current => {
            let blob = bincode::serialize(&(time, row))?;
            write_length_prefixed_bytes(w, &blob)
        }
    }
}

/// Read one row of `len` values, or `None` on clean EOF.
pub fn read_row(
    r: &mut dyn Read,
    format: FileFormat,
    len: usize,
) -> Result<Option<(f64, Vec<Value>)>, StoreError> {
    match format {
        FileFormat::Legacy => {
            let mut buf = vec![0u8; 8 * (len + 1)];
            if !fill_or_eof(r, &mut buf)? {
                return Ok(None);
            }
            let mut vals = buf.chunks_exact(8).map(|c| {
                let mut b = [0u8; 8];
                b.copy_from_slice(c);
                f64::from_be_bytes(b)
            });
            let time = vals.next().unwrap_or(f64::NAN);
            Ok(Some((time, vals.map(Value::Float).collect())))
        }
        FileFormat::Current => {
            let mut prefix = [0u8; 4];
            if !fill_or_eof(r, &mut prefix)? {
                return Ok(None);
            }
            let mut blob = vec![0u8; u32::from_be_bytes(prefix) as usize];
            r.read_exact(&mut blob)?;
            let (time, row): (f64, Vec<Value>) = bincode::deserialize(&blob)?;
            if row.len() != len {
                return Err(StoreError::Malformed {
                    detail: format!("row of {} values, expected {len}", row.len()),
                });
            }
            Ok(Some((time, row)))
        }
    }
}

/// Size of a legacy row of `len` values, the time included.
pub fn legacy_row_size(len: usize) -> u64 {
    8 * (len as u64 + 1)
}
