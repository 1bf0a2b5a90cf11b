//! Path-addressed access to the groups, attributes and datasets of an
//! HDF5 file.
//!
//! Paths are `/`-separated, without a leading slash; `""` is the root
//! group. Every ancestor of a node is a group.
//!
//! Two kinds of datasets are written: fixed ones, stored whole by
//! [`TreeStore::put_dataset`], and extendable ones, created chunked with an
//! unlimited first dimension by [`TreeStore::create_extendable`] and grown by
//! [`TreeStore::append`]. Appended elements go straight to the file's chunk
//! cache; [`TreeStore::flush`] pushes the cache to disk.
//!
//! Attributes hold one [`Value`] each. Integers, floats and strings use the
//! matching HDF5 type; other values are stored as JSON bytes.

use std::path::{Path, PathBuf};

use hdf5::types::{TypeDescriptor, VarLenUnicode};
use hdf5::{File, Group, H5Type, SimpleExtents};
use indexmap::IndexMap;
use recap_core::Value;
use tracing::warn;

use crate::error::StoreError;

/// Attributes of a group.
pub type Attrs = IndexMap<String, Value>;

/// Elements per chunk of an extendable dataset.
const CHUNK_ELEMS: usize = 4096;

/// Typed contents of a dataset.
#[derive(Clone, Debug, PartialEq)]
pub enum Data {
    /// Floating point numbers.
    F64(Vec<f64>),
    /// Signed integers.
    I64(Vec<i64>),
    /// Raw bytes.
    U8(Vec<u8>),
    /// Strings.
    Str(Vec<String>),
}

impl Data {
    /// Number of elements.
    pub fn len(&self) -> usize {
        match self {
            Data::F64(v) => v.len(),
            Data::I64(v) => v.len(),
            Data::U8(v) => v.len(),
            Data::Str(v) => v.len(),
        }
    }

    /// Whether the dataset holds no element.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// An n-dimensional array in row-major order, read or written whole.
#[derive(Clone, Debug, PartialEq)]
pub struct Dataset {
    /// Extent of each dimension.
    pub shape: Vec<usize>,
    /// Elements.
    pub data: Data,
}

impl Dataset {
    /// A one-dimensional dataset.
    pub fn vector(data: Data) -> Self {
        Self {
            shape: vec![data.len()],
            data,
        }
    }

    /// Number of rows (extent of the first dimension).
    pub fn rows(&self) -> usize {
        self.shape.first().copied().unwrap_or(0)
    }

    /// Elements per row.
    pub fn row_len(&self) -> usize {
        self.shape.iter().skip(1).product()
    }

    /// Row `i` of a float dataset.
    pub fn row(&self, i: usize) -> Option<&[f64]> {
        let row_len = self.row_len();
        match &self.data {
            Data::F64(v) => v.get(i * row_len..(i + 1) * row_len),
            _ => None,
        }
    }
}

fn unicode(s: &str) -> Result<VarLenUnicode, StoreError> {
    s.parse::<VarLenUnicode>()
        .map_err(|e| StoreError::Unsupported {
            op: format!("storing string {s:?}: {e}"),
        })
}

fn unicode_all(strings: &[String]) -> Result<Vec<VarLenUnicode>, StoreError> {
    strings.iter().map(|s| unicode(s)).collect()
}

fn split(path: &str) -> (&str, &str) {
    match path.rfind('/') {
        Some(i) => (&path[..i], &path[i + 1..]),
        None => ("", path),
    }
}

fn absolute(path: &str) -> String {
    format!("/{path}")
}

/// An HDF5 file addressed by `/`-separated paths.
pub struct TreeStore {
    path: PathBuf,
    file: File,
    read_only: bool,
}

impl std::fmt::Debug for TreeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TreeStore")
            .field("path", &self.path)
            .field("read_only", &self.read_only)
            .finish()
    }
}

impl TreeStore {
    /// Open the file at `path` for writing, creating it if needed.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        Ok(Self {
            path: path.to_path_buf(),
            file: File::append(path)?,
            read_only: false,
        })
    }

    /// Open an existing file for reading only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(StoreError::NotFound {
                what: format!("store file {}", path.display()),
            });
        }
        Ok(Self {
            path: path.to_path_buf(),
            file: File::open(path)?,
            read_only: true,
        })
    }

    /// Path of the backing file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Whether the file was opened read-only.
    pub fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn writable(&self) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        Ok(())
    }

    fn group(&self, path: &str) -> Option<Group> {
        self.file.group(&absolute(path)).ok()
    }

    fn h5_dataset(&self, path: &str) -> Option<hdf5::Dataset> {
        if path.is_empty() {
            return None;
        }
        self.file.dataset(&absolute(path)).ok()
    }

    /// Whether a node exists at `path`.
    pub fn contains(&self, path: &str) -> bool {
        self.is_group(path) || self.h5_dataset(path).is_some()
    }

    /// Whether `path` is a group.
    pub fn is_group(&self, path: &str) -> bool {
        self.group(path).is_some()
    }

    fn ensure_group(&self, path: &str) -> Result<Group, StoreError> {
        if let Some(g) = self.group(path) {
            return Ok(g);
        }
        if self.h5_dataset(path).is_some() {
            return Err(StoreError::Consistency {
                detail: format!("'{path}' is a dataset, not a group"),
            });
        }
        self.writable()?;
        let (parent, name) = split(path);
        Ok(self.ensure_group(parent)?.create_group(name)?)
    }

    /// Create the group at `path` and its missing ancestors.
    ///
    /// Existing groups are left untouched.
    pub fn create_group(&mut self, path: &str) -> Result<(), StoreError> {
        self.ensure_group(path).map(drop)
    }

    /// Attributes of the group at `path`, empty when there is no group.
    pub fn attrs(&self, path: &str) -> Attrs {
        let Some(group) = self.group(path) else {
            return Attrs::new();
        };
        let names = group.attr_names().unwrap_or_default();
        names
            .into_iter()
            .filter_map(|name| {
                let value = read_attr(&group, &name)?;
                Some((name, value))
            })
            .collect()
    }

    /// Attribute `key` of the group at `path`.
    pub fn attr(&self, path: &str, key: &str) -> Option<Value> {
        read_attr(&self.group(path)?, key)
    }

    /// Set attribute `key` of the group at `path`, creating the group.
    ///
    /// Attributes are written once; setting an existing key again with an
    /// equal value is a no-op and with a different value an error.
    pub fn set_attr(&mut self, path: &str, key: &str, value: Value) -> Result<(), StoreError> {
        self.writable()?;
        let group = self.ensure_group(path)?;
        if let Some(stored) = read_attr(&group, key) {
            if stored == value {
                return Ok(());
            }
            return Err(StoreError::Consistency {
                detail: format!("attribute '{key}' of '{path}' already holds {stored}"),
            });
        }
        match &value {
            Value::Int(i) => {
                group
                    .new_attr::<i64>()
                    .shape(SimpleExtents::fixed([1usize]))
                    .create(key)?
                    .write_raw(&[*i])?;
            }
            Value::Float(x) => {
                group
                    .new_attr::<f64>()
                    .shape(SimpleExtents::fixed([1usize]))
                    .create(key)?
                    .write_raw(&[*x])?;
            }
            Value::Str(s) => {
                let s = [unicode(s)?];
                group
                    .new_attr::<VarLenUnicode>()
                    .shape(SimpleExtents::fixed([1usize]))
                    .create(key)?
                    .write_raw(&s)?;
            }
            other => {
                let json = serde_json::to_vec(other)?;
                group
                    .new_attr::<u8>()
                    .shape(SimpleExtents::fixed([json.len()]))
                    .create(key)?
                    .write_raw(&json)?;
            }
        }
        Ok(())
    }

    /// Names of the direct children of `path` (`""` for the root), sorted.
    pub fn children(&self, path: &str) -> Vec<String> {
        let mut names = self
            .group(path)
            .and_then(|g| g.member_names().ok())
            .unwrap_or_default();
        names.sort();
        names
    }

    /// Dataset at `path`, read whole.
    pub fn dataset(&self, path: &str) -> Result<Option<Dataset>, StoreError> {
        let Some(ds) = self.h5_dataset(path) else {
            return Ok(None);
        };
        let shape = ds.shape();
        let data = match ds.dtype()?.to_descriptor()? {
            TypeDescriptor::Float(_) => Data::F64(ds.read_raw::<f64>()?),
            TypeDescriptor::Integer(_) => Data::I64(ds.read_raw::<i64>()?),
            TypeDescriptor::Unsigned(_) => Data::U8(ds.read_raw::<u8>()?),
            TypeDescriptor::VarLenUnicode => Data::Str(
                ds.read_raw::<VarLenUnicode>()?
                    .iter()
                    .map(|s| s.as_str().to_string())
                    .collect(),
            ),
            other => {
                return Err(StoreError::Unsupported {
                    op: format!("reading {path} of type {other:?}"),
                })
            }
        };
        Ok(Some(Dataset { shape, data }))
    }

    /// Store a fixed dataset at `path`, replacing any previous one.
    pub fn put_dataset(&mut self, path: &str, dataset: Dataset) -> Result<(), StoreError> {
        self.writable()?;
        if self.is_group(path) {
            return Err(StoreError::Consistency {
                detail: format!("'{path}' is a group, not a dataset"),
            });
        }
        let (parent, name) = split(path);
        let group = self.ensure_group(parent)?;
        if self.h5_dataset(path).is_some() {
            group.unlink(name)?;
        }
        let shape = SimpleExtents::fixed(dataset.shape.clone());
        match &dataset.data {
            Data::F64(v) => write_fixed(&group, name, shape, v.as_slice())?,
            Data::I64(v) => write_fixed(&group, name, shape, v.as_slice())?,
            Data::U8(v) => write_fixed(&group, name, shape, v.as_slice())?,
            Data::Str(v) => write_fixed(&group, name, shape, unicode_all(v)?.as_slice())?,
        }
        Ok(())
    }

    /// Create an empty extendable dataset of `T` at `path`.
    ///
    /// Without `row_len` the dataset is a vector grown element-wise;
    /// otherwise it is a `0 x row_len` matrix grown one row at a time.
    pub fn create_extendable<T: H5Type>(
        &mut self,
        path: &str,
        row_len: Option<usize>,
    ) -> Result<(), StoreError> {
        self.writable()?;
        let (parent, name) = split(path);
        let group = self.ensure_group(parent)?;
        if self.h5_dataset(path).is_some() {
            group.unlink(name)?;
        }
        match row_len {
            None => {
                group
                    .new_dataset::<T>()
                    .chunk(CHUNK_ELEMS)
                    .shape(SimpleExtents::resizable([0usize]))
                    .create(name)?;
            }
            Some(cols) => {
                let chunk_rows = (CHUNK_ELEMS / cols.max(1)).max(1);
                group
                    .new_dataset::<T>()
                    .chunk((chunk_rows, cols.max(1)))
                    .shape(SimpleExtents::resizable([0usize, cols]))
                    .create(name)?;
            }
        }
        Ok(())
    }

    /// Append to the extendable dataset at `path` and return the range of
    /// first-dimension indices written.
    ///
    /// A vector takes any number of elements; a matrix takes exactly one
    /// row.
    pub fn append<T: H5Type>(
        &mut self,
        path: &str,
        values: &[T],
    ) -> Result<(usize, usize), StoreError> {
        self.writable()?;
        let ds = self.h5_dataset(path).ok_or_else(|| StoreError::NotFound {
            what: format!("dataset {path}"),
        })?;
        let shape = ds.shape();
        match shape.as_slice() {
            [len] => {
                let (start, end) = (*len, len + values.len());
                if end > start {
                    ds.resize(end)?;
                    ds.write_slice(values, start..end)?;
                }
                Ok((start, end))
            }
            [rows, cols] if values.len() == *cols => {
                ds.resize((rows + 1, *cols))?;
                ds.write_slice(values, (*rows, ..))?;
                Ok((*rows, rows + 1))
            }
            _ => Err(StoreError::Consistency {
                detail: format!(
                    "cannot append {} values to {path} of shape {shape:?}",
                    values.len()
                ),
            }),
        }
    }

    /// Extent of the first dimension of the dataset at `path`.
    pub fn len(&self, path: &str) -> usize {
        self.h5_dataset(path)
            .and_then(|ds| ds.shape().first().copied())
            .unwrap_or(0)
    }

    /// Total number of elements of the dataset at `path`.
    pub fn size(&self, path: &str) -> usize {
        self.h5_dataset(path).map_or(0, |ds| ds.size())
    }

    /// Elements `start..end` of the vector at `path`, or `None` when the
    /// range is out of bounds.
    pub fn read_range<T: H5Type>(
        &self,
        path: &str,
        start: usize,
        end: usize,
    ) -> Result<Option<Vec<T>>, StoreError> {
        let Some(ds) = self.h5_dataset(path) else {
            return Ok(None);
        };
        if start > end || ds.shape().as_slice() != [ds.size()] || end > ds.size() {
            return Ok(None);
        }
        if start == end {
            return Ok(Some(Vec::new()));
        }
        Ok(Some(ds.read_slice_1d::<T, _>(start..end)?.to_vec()))
    }

    /// Row `i` of the matrix at `path`.
    pub fn read_row<T: H5Type>(&self, path: &str, i: usize) -> Result<Option<Vec<T>>, StoreError> {
        let Some(ds) = self.h5_dataset(path) else {
            return Ok(None);
        };
        match ds.shape().as_slice() {
            [rows, _] if i < *rows => Ok(Some(ds.read_slice_1d::<T, _>((i, ..))?.to_vec())),
            _ => Ok(None),
        }
    }

    /// Push buffered writes to disk.
    pub fn flush(&mut self) -> Result<(), StoreError> {
        if self.read_only {
            return Ok(());
        }
        Ok(self.file.flush()?)
    }
}

fn write_fixed<T: H5Type>(
    group: &Group,
    name: &str,
    shape: SimpleExtents,
    data: &[T],
) -> Result<(), StoreError> {
    let ds = group.new_dataset::<T>().shape(shape).create(name)?;
    if !data.is_empty() {
        ds.write_raw(data)?;
    }
    Ok(())
}

fn read_attr(group: &Group, key: &str) -> Option<Value> {
    let attr = group.attr(key).ok()?;
    let decoded = (|| -> Result<Option<Value>, StoreError> {
        Ok(match attr.dtype()?.to_descriptor()? {
            TypeDescriptor::Integer(_) => attr.read_raw::<i64>()?.first().map(|&i| Value::Int(i)),
            TypeDescriptor::Float(_) => attr.read_raw::<f64>()?.first().map(|&x| Value::Float(x)),
            TypeDescriptor::VarLenUnicode => attr
                .read_raw::<VarLenUnicode>()?
                .first()
                .map(|s| Value::from(s.as_str())),
            TypeDescriptor::Unsigned(_) => {
                Some(serde_json::from_slice(&attr.read_raw::<u8>()?)?)
            }
            _ => None,
        })
    })();
    match decoded {
        Ok(value) => value,
        Err(e) => {
            warn!("skipping unreadable attribute '{key}': {e}");
            None
        }
    }
}
