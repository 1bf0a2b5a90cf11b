//! Run groups in a hierarchical store.
//!
//! Layout of a store file:
//!
//! ```text
//! {uid}                                 attrs: timestamp, engine_version,
//! │                                            nb_distributed_ranks, params
//! ├── ResultSelector{i}                 attrs: Description, RSIndex
//! │   ├── labels
//! │   ├── metaData/{key}
//! │   ├── ColumnRemapping               optional, immutable
//! │   └── runs/Run_{n}/{time, data}
//! ├── DistributedResultSelector{i}      coordinator of a distributed group
//! │   ├── labels, metaData/{key}
//! │   └── DistributedColumnMap          2 x N: owning rank, local column
//! └── staticData                        attrs: key -> encoded handle
//! CompoundObjects/{CompObjs, Ints, Floats, Strings, Lists}
//! ```
//!
//! Single-process groups live in `{prefix}.h5`. In a distributed
//! simulation every rank writes its own columns to `{prefix}_rank{r}.h5`.
//! `time` and `data` of a run are extendable datasets grown by one row per
//! save, so the rows saved before a crash can be read back.

use std::cell::RefCell;
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use hdf5::H5Type;
use recap_core::{ColumnMap, MetaData, Rank, RunId, Schema, SelectorId, Value, ENGINE_VERSION};
use recap_encode::{CompoundStorage, EncodeError, Encoder, Record};
use tracing::debug;

use crate::backend::{pick, Backend, RemoteBackend};
use crate::config::HierConfig;
use crate::error::StoreError;
use crate::group::{
    check_params, check_schema, timestamp, GroupLayout, GroupRequest, Params, RunGroupInfo,
    RunGroupStore,
};
use crate::readonly::ReadOnlySelector;
use crate::slice::Slice;
use crate::tree::{Data, Dataset, TreeStore};

/// Extension of hierarchical store files.
pub const EXTENSION: &str = "h5";

const COMPOUND_ROOT: &str = "CompoundObjects";
const SELECTOR_PREFIX: &str = "ResultSelector";
const DIST_SELECTOR_PREFIX: &str = "DistributedResultSelector";
const GROUP_ATTRS: [&str; 3] = ["timestamp", "engine_version", "nb_distributed_ranks"];

/// File of a single-process store.
pub fn shared_path(prefix: &Path) -> PathBuf {
    with_suffix(prefix, &format!(".{EXTENSION}"))
}

/// File written by `rank` in a distributed simulation.
pub fn rank_path(prefix: &Path, rank: Rank) -> PathBuf {
    with_suffix(prefix, &format!("_rank{}.{EXTENSION}", rank.0))
}

fn with_suffix(prefix: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = prefix.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

/// Path of selector `index` inside group `uid`.
pub fn selector_path(uid: &str, index: SelectorId) -> String {
    format!("{uid}/{SELECTOR_PREFIX}{}", index.0)
}

/// Path of the complete description of distributed selector `index`.
pub fn dist_selector_path(uid: &str, index: SelectorId) -> String {
    format!("{uid}/{DIST_SELECTOR_PREFIX}{}", index.0)
}

type SharedTree = Rc<RefCell<TreeStore>>;

// ── Compound storage ────────────────────────────────────────────

/// [`CompoundStorage`] over the `CompoundObjects` datasets of a store file.
///
/// `CompObjs` is an `N x 3` matrix of records; the other datasets are
/// vectors of their element type.
pub struct TreeStorage {
    tree: SharedTree,
}

fn storage_error(e: StoreError) -> EncodeError {
    EncodeError::Storage {
        reason: e.to_string(),
    }
}

impl TreeStorage {
    fn path(name: &str) -> String {
        format!("{COMPOUND_ROOT}/{name}")
    }

    fn append<T: H5Type>(
        &mut self,
        name: &str,
        row_len: Option<usize>,
        data: &[T],
    ) -> Result<(i64, i64), EncodeError> {
        let mut tree = self.tree.borrow_mut();
        if tree.is_read_only() {
            return Err(EncodeError::ReadOnly);
        }
        let path = Self::path(name);
        if !tree.contains(&path) {
            tree.create_extendable::<T>(&path, row_len)
                .map_err(storage_error)?;
        }
        let (start, end) = tree.append(&path, data).map_err(storage_error)?;
        Ok((start as i64, end as i64))
    }

    fn range<T: H5Type>(&self, name: &str, start: usize, end: usize) -> Option<Vec<T>> {
        self.tree
            .borrow()
            .read_range(&Self::path(name), start, end)
            .ok()
            .flatten()
    }
}

impl CompoundStorage for TreeStorage {
    fn record_count(&self) -> usize {
        self.tree.borrow().len(&Self::path("CompObjs"))
    }

    fn record(&self, index: usize) -> Option<Record> {
        let row = self
            .tree
            .borrow()
            .read_row::<i64>(&Self::path("CompObjs"), index)
            .ok()
            .flatten()?;
        match row.as_slice() {
            [a, b, c] => Record::from_row([*a, *b, *c]),
            _ => None,
        }
    }

    fn push_record(&mut self, record: Record) -> Result<i64, EncodeError> {
        let (row, _) = self.append("CompObjs", Some(3), &record.to_row())?;
        Ok(row)
    }

    fn push_ints(&mut self, data: &[i64]) -> Result<(i64, i64), EncodeError> {
        self.append("Ints", None, data)
    }

    fn push_floats(&mut self, data: &[f64]) -> Result<(i64, i64), EncodeError> {
        self.append("Floats", None, data)
    }

    fn push_bytes(&mut self, data: &[u8]) -> Result<(i64, i64), EncodeError> {
        self.append("Strings", None, data)
    }

    fn push_handles(&mut self, data: &[i64]) -> Result<(i64, i64), EncodeError> {
        self.append("Lists", None, data)
    }

    fn ints(&self, start: usize, end: usize) -> Option<Vec<i64>> {
        self.range("Ints", start, end)
    }

    fn floats(&self, start: usize, end: usize) -> Option<Vec<f64>> {
        self.range("Floats", start, end)
    }

    fn bytes(&self, start: usize, end: usize) -> Option<Vec<u8>> {
        self.range("Strings", start, end)
    }

    fn handles(&self, start: usize, end: usize) -> Option<Vec<i64>> {
        self.range("Lists", start, end)
    }

    fn stored_len(&self) -> usize {
        let tree = self.tree.borrow();
        ["CompObjs", "Ints", "Floats", "Strings", "Lists"]
            .iter()
            .map(|n| tree.size(&Self::path(n)))
            .sum()
    }
}

// ── Shared file handle ──────────────────────────────────────────

/// A store file and the encoder writing into it.
#[derive(Clone)]
struct HierFile {
    path: PathBuf,
    tree: SharedTree,
    encoder: Rc<RefCell<Encoder<TreeStorage>>>,
    flush_freq: usize,
}

impl HierFile {
    fn open(path: PathBuf, config: &HierConfig, read_only: bool) -> Result<Self, StoreError> {
        let tree = if read_only {
            TreeStore::open_read_only(&path)?
        } else {
            TreeStore::open(&path)?
        };
        let tree = Rc::new(RefCell::new(tree));
        let storage = TreeStorage { tree: tree.clone() };
        Ok(Self {
            path,
            encoder: Rc::new(RefCell::new(Encoder::open(storage, config.encoder()))),
            tree,
            flush_freq: config.flush_freq.max(1),
        })
    }

    fn flush(&self) -> Result<(), StoreError> {
        self.tree.borrow_mut().flush()
    }
}

fn read_schema(tree: &TreeStore, path: &str) -> Result<Schema, StoreError> {
    let missing = |what: &str| StoreError::Malformed {
        detail: format!("{path} has no {what}"),
    };
    let description = match tree.attr(path, "Description") {
        Some(Value::Str(d)) => d,
        _ => return Err(missing("Description")),
    };
    let index = match tree.attr(path, "RSIndex") {
        Some(Value::Int(i)) if i >= 0 => SelectorId(i as u32),
        _ => return Err(missing("RSIndex")),
    };
    let labels = match tree.dataset(&format!("{path}/labels"))?.map(|d| d.data) {
        Some(Data::Str(l)) => l,
        _ => return Err(missing("labels")),
    };
    let mut metadata = MetaData::new();
    let md_path = format!("{path}/metaData");
    for key in tree.children(&md_path) {
        let stored = tree.dataset(&format!("{md_path}/{key}"))?.map(|d| d.data);
        if let Some(Data::Str(json)) = stored {
            let values = json
                .iter()
                .map(|v| serde_json::from_str(v))
                .collect::<Result<Vec<Value>, _>>()?;
            metadata.insert(key, values);
        }
    }
    Ok(Schema {
        index,
        description,
        value_names: vec![None; labels.len()],
        labels,
        metadata,
    })
}

fn write_schema(tree: &mut TreeStore, path: &str, schema: &Schema) -> Result<(), StoreError> {
    if let Some(key) = schema.metadata.keys().find(|k| k.contains('/')) {
        return Err(StoreError::Unsupported {
            op: format!("metadata key '{key}' containing '/'"),
        });
    }
    tree.set_attr(path, "Description", Value::from(schema.description.as_str()))?;
    tree.set_attr(path, "RSIndex", Value::Int(schema.index.0 as i64))?;
    tree.put_dataset(
        &format!("{path}/labels"),
        Dataset::vector(Data::Str(schema.labels.clone())),
    )?;
    tree.create_group(&format!("{path}/metaData"))?;
    for (key, values) in &schema.metadata {
        let json = values
            .iter()
            .map(serde_json::to_string)
            .collect::<Result<Vec<String>, _>>()?;
        tree.put_dataset(
            &format!("{path}/metaData/{key}"),
            Dataset::vector(Data::Str(json)),
        )?;
    }
    Ok(())
}

fn read_column_map(tree: &TreeStore, path: &str) -> Result<Option<ColumnMap>, StoreError> {
    let Some(ds) = tree.dataset(&format!("{path}/DistributedColumnMap"))? else {
        return Ok(None);
    };
    let (Data::I64(v), [2, n]) = (&ds.data, ds.shape.as_slice()) else {
        return Err(StoreError::Malformed {
            detail: format!("{path}/DistributedColumnMap is not a 2 x N integer array"),
        });
    };
    if v.len() != 2 * n {
        return Err(StoreError::Malformed {
            detail: format!("{path}/DistributedColumnMap holds {} elements", v.len()),
        });
    }
    let (ranks, locals) = v.split_at(*n);
    ColumnMap::from_rows(ranks.to_vec(), locals.to_vec())
        .map(Some)
        .ok_or_else(|| StoreError::Malformed {
            detail: format!("{path}/DistributedColumnMap rows differ in length"),
        })
}

fn write_column_map(tree: &mut TreeStore, path: &str, map: &ColumnMap) -> Result<(), StoreError> {
    let mut data = map.ranks().to_vec();
    data.extend_from_slice(map.locals());
    tree.put_dataset(
        &format!("{path}/DistributedColumnMap"),
        Dataset {
            shape: vec![2, map.len()],
            data: Data::I64(data),
        },
    )
}

fn selector_children(tree: &TreeStore, uid: &str, prefix: &str) -> Vec<SelectorId> {
    let mut out: Vec<SelectorId> = tree
        .children(uid)
        .iter()
        .filter_map(|c| c.strip_prefix(prefix)?.parse::<u32>().ok())
        .map(SelectorId)
        .collect();
    out.sort_unstable();
    out
}

// ── Store ───────────────────────────────────────────────────────

struct OpenGroup {
    uid: String,
    rank: Rank,
    writes: bool,
    schemas: Vec<Schema>,
}

/// A hierarchical store of run groups.
pub struct HierStore {
    prefix: PathBuf,
    config: HierConfig,
    file: Option<HierFile>,
    current: Option<OpenGroup>,
    read_only: bool,
}

impl HierStore {
    /// A store at `prefix`, opening `{prefix}.h5` or, failing that,
    /// `{prefix}_rank0.h5` when either exists.
    pub fn open(prefix: impl AsRef<Path>, config: HierConfig) -> Result<Self, StoreError> {
        Self::with_mode(prefix.as_ref(), config, false)
    }

    /// An existing store at `prefix`, for reading only.
    pub fn open_read_only(prefix: impl AsRef<Path>) -> Result<Self, StoreError> {
        let store = Self::with_mode(prefix.as_ref(), HierConfig::new(), true)?;
        if store.file.is_none() {
            return Err(StoreError::NotFound {
                what: format!("store file for prefix {}", prefix.as_ref().display()),
            });
        }
        Ok(store)
    }

    /// The file of one rank of a distributed store, for reading only.
    pub fn open_rank_read_only(prefix: impl AsRef<Path>, rank: Rank) -> Result<Self, StoreError> {
        let config = HierConfig::new();
        let file = HierFile::open(rank_path(prefix.as_ref(), rank), &config, true)?;
        Ok(Self {
            prefix: prefix.as_ref().to_path_buf(),
            config,
            file: Some(file),
            current: None,
            read_only: true,
        })
    }

    fn with_mode(prefix: &Path, config: HierConfig, read_only: bool) -> Result<Self, StoreError> {
        let existing = [shared_path(prefix), rank_path(prefix, Rank::COORDINATOR)]
            .into_iter()
            .find(|p| p.exists());
        let file = match existing {
            Some(p) => Some(HierFile::open(p, &config, read_only)?),
            None => None,
        };
        Ok(Self {
            prefix: prefix.to_path_buf(),
            config,
            file,
            current: None,
            read_only,
        })
    }

    /// Prefix of the store files.
    pub fn prefix(&self) -> &Path {
        &self.prefix
    }

    /// Path of the file currently open, if any.
    pub fn file_path(&self) -> Option<&Path> {
        self.file.as_ref().map(|f| f.path.as_path())
    }

    /// Unique id of the open run group.
    pub fn current_uid(&self) -> Option<&str> {
        self.current.as_ref().map(|g| g.uid.as_str())
    }

    fn file(&self) -> Result<&HierFile, StoreError> {
        self.file.as_ref().ok_or_else(|| StoreError::NotFound {
            what: format!("store file for prefix {}", self.prefix.display()),
        })
    }

    fn switch_file(&mut self, path: PathBuf) -> Result<(), StoreError> {
        if self.file.as_ref().is_some_and(|f| f.path == path) {
            return Ok(());
        }
        if let Some(f) = self.file.take() {
            f.flush()?;
        }
        self.file = Some(HierFile::open(path, &self.config, false)?);
        Ok(())
    }

    fn group_params(tree: &TreeStore, uid: &str) -> Params {
        tree.attrs(uid)
            .into_iter()
            .filter(|(k, _)| !GROUP_ATTRS.contains(&k.as_str()))
            .collect()
    }

    fn nb_ranks(layout: &GroupLayout) -> i64 {
        match layout {
            GroupLayout::Shared => 1,
            GroupLayout::Distributed { nb_ranks, .. } => *nb_ranks as i64,
        }
    }

    fn create_group(tree: &mut TreeStore, uid: &str, request: &GroupRequest) -> Result<(), StoreError> {
        tree.set_attr(uid, "timestamp", Value::from(timestamp()))?;
        tree.set_attr(uid, "engine_version", Value::from(ENGINE_VERSION))?;
        tree.set_attr(
            uid,
            "nb_distributed_ranks",
            Value::Int(Self::nb_ranks(&request.layout)),
        )?;
        for (k, v) in &request.params {
            tree.set_attr(uid, k, v.clone())?;
        }
        for schema in &request.schemas {
            let path = selector_path(uid, schema.index);
            write_schema(tree, &path, schema)?;
            tree.create_group(&format!("{path}/runs"))?;
        }
        if let GroupLayout::Distributed {
            full_schemas,
            column_maps,
            ..
        } = &request.layout
        {
            if request.rank.is_coordinator() {
                for (schema, map) in full_schemas.iter().zip(column_maps) {
                    let path = dist_selector_path(uid, schema.index);
                    write_schema(tree, &path, schema)?;
                    write_column_map(tree, &path, map)?;
                }
            }
        }
        Ok(())
    }

    fn check_group(tree: &TreeStore, uid: &str, request: &GroupRequest) -> Result<(), StoreError> {
        let fail = |detail: String| Err(StoreError::Consistency { detail });
        if tree.attr(uid, "engine_version") != Some(Value::from(ENGINE_VERSION)) {
            return fail(format!("run group '{uid}' was saved by another engine version"));
        }
        let ranks = Value::Int(Self::nb_ranks(&request.layout));
        if tree.attr(uid, "nb_distributed_ranks") != Some(ranks) {
            return fail(format!(
                "run group '{uid}' was saved with a different number of processes"
            ));
        }
        if Self::group_params(tree, uid) != request.params {
            return fail(format!("run group '{uid}' was saved with different parameters"));
        }
        let stored = selector_children(tree, uid, SELECTOR_PREFIX);
        if stored.len() != request.schemas.len() {
            return fail(format!(
                "run group '{uid}' holds {} selectors, {} are being saved",
                stored.len(),
                request.schemas.len()
            ));
        }
        for schema in &request.schemas {
            check_schema(&read_schema(tree, &selector_path(uid, schema.index))?, schema)?;
        }
        if let GroupLayout::Distributed {
            full_schemas,
            column_maps,
            ..
        } = &request.layout
        {
            if request.rank.is_coordinator() {
                for (schema, map) in full_schemas.iter().zip(column_maps) {
                    let path = dist_selector_path(uid, schema.index);
                    check_schema(&read_schema(tree, &path)?, schema)?;
                    let stored = read_column_map(tree, &path)?.ok_or_else(|| {
                        StoreError::Malformed {
                            detail: format!("{path} has no DistributedColumnMap"),
                        }
                    })?;
                    if let Some(col) = stored.first_mismatch(map) {
                        return fail(format!(
                            "selector {} is distributed differently from the stored run group \
                             (first difference at column {col})",
                            schema.index
                        ));
                    }
                }
            }
        }
        Ok(())
    }

    /// Record that selector `index` of group `uid` stores, at position `j`
    /// of each saved row, its column `remap[j]`.
    ///
    /// The remapping is immutable once written.
    pub fn set_column_remapping(
        &mut self,
        uid: &str,
        index: SelectorId,
        remap: &[usize],
    ) -> Result<(), StoreError> {
        let file = self.file()?;
        let mut tree = file.tree.borrow_mut();
        let path = format!("{}/ColumnRemapping", selector_path(uid, index));
        let wanted: Vec<i64> = remap.iter().map(|&i| i as i64).collect();
        match tree.dataset(&path)?.map(|d| d.data) {
            Some(Data::I64(stored)) if stored == wanted => Ok(()),
            Some(_) => Err(StoreError::Consistency {
                detail: format!("selector {index} was saved with a different column remapping"),
            }),
            None => tree.put_dataset(&path, Dataset::vector(Data::I64(wanted))),
        }
    }

    /// Column remapping of selector `index` of group `uid`, if any.
    pub fn column_remapping(
        &self,
        uid: &str,
        index: SelectorId,
    ) -> Result<Option<Vec<usize>>, StoreError> {
        read_remap(&self.file()?.tree.borrow(), &selector_path(uid, index))
    }

    /// Stored schema of selector `index` of group `uid`.
    pub fn schema(&self, uid: &str, index: SelectorId) -> Result<Schema, StoreError> {
        read_schema(&self.file()?.tree.borrow(), &selector_path(uid, index))
    }

    /// Selectors of group `uid` saved in distributed form.
    pub fn distributed_selectors(&self, uid: &str) -> Result<Vec<SelectorId>, StoreError> {
        Ok(selector_children(
            &self.file()?.tree.borrow(),
            uid,
            DIST_SELECTOR_PREFIX,
        ))
    }

    /// Complete schema and column map of distributed selector `index`.
    pub fn distributed_selector(
        &self,
        uid: &str,
        index: SelectorId,
    ) -> Result<(Schema, ColumnMap), StoreError> {
        let tree = self.file()?.tree.borrow();
        let path = dist_selector_path(uid, index);
        let schema = read_schema(&tree, &path)?;
        let map = read_column_map(&tree, &path)?.ok_or_else(|| StoreError::Malformed {
            detail: format!("{path} has no DistributedColumnMap"),
        })?;
        Ok((schema, map))
    }

    /// Number of processes group `uid` was saved with.
    pub fn group_ranks(&self, uid: &str) -> Result<usize, StoreError> {
        match self.file()?.tree.borrow().attr(uid, "nb_distributed_ranks") {
            Some(Value::Int(n)) if n > 0 => Ok(n as usize),
            _ => Err(StoreError::NotFound {
                what: format!("run group '{uid}'"),
            }),
        }
    }

    /// Read-only backend over selector `index` of group `uid`.
    pub fn selector_backend(&self, uid: &str, index: SelectorId) -> Result<HierBackend, StoreError> {
        let file = self.file()?.clone();
        let path = selector_path(uid, index);
        let schema = read_schema(&file.tree.borrow(), &path)?;
        HierBackend::new(file, path, schema, true)
    }

    fn check_static_scope(&self) -> Result<(), StoreError> {
        match &self.current {
            Some(g) if !g.rank.is_coordinator() => Err(StoreError::AccessScope {
                detail: "static data is only accessible from the coordinator process".to_string(),
            }),
            _ => Ok(()),
        }
    }

    /// Static value `key` of group `uid`.
    pub fn static_get(&self, uid: &str, key: &str) -> Result<Option<Value>, StoreError> {
        self.check_static_scope()?;
        let file = self.file()?;
        let handle = match file.tree.borrow().attr(&format!("{uid}/staticData"), key) {
            Some(Value::Int(h)) => h,
            _ => return Ok(None),
        };
        Ok(Some(file.encoder.borrow().read(handle)))
    }

    /// Keys of the static values of group `uid`.
    pub fn static_keys(&self, uid: &str) -> Result<Vec<String>, StoreError> {
        self.check_static_scope()?;
        Ok(self
            .file()?
            .tree
            .borrow()
            .attrs(&format!("{uid}/staticData"))
            .into_keys()
            .collect())
    }

    /// Store static value `key` of group `uid`.
    ///
    /// Writing a key again with an equal value is a no-op; a different
    /// value is an error.
    pub fn static_set(&mut self, uid: &str, key: &str, value: &Value) -> Result<(), StoreError> {
        self.check_static_scope()?;
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        if let Some(stored) = self.static_get(uid, key)? {
            if stored == *value {
                return Ok(());
            }
            return Err(StoreError::Consistency {
                detail: format!("static data '{key}' of run group '{uid}' already holds {stored}"),
            });
        }
        let file = self.file()?;
        if !file.tree.borrow().is_group(uid) {
            return Err(StoreError::NotFound {
                what: format!("run group '{uid}'"),
            });
        }
        let handle = file.encoder.borrow_mut().write(value)?;
        let mut tree = file.tree.borrow_mut();
        tree.set_attr(&format!("{uid}/staticData"), key, Value::Int(handle))?;
        tree.flush()
    }

    /// Dataset at `path` of the current file.
    pub fn dataset(&self, path: &str) -> Result<Option<Dataset>, StoreError> {
        self.file()?.tree.borrow().dataset(path)
    }

    /// Store an auxiliary dataset at `path` of the current file, next to
    /// the run groups.
    pub fn put_dataset(&mut self, path: &str, dataset: Dataset) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.file()?.tree.borrow_mut().put_dataset(path, dataset)
    }

    /// Set attribute `key` of the group at `path` of the current file.
    pub fn set_attr(&mut self, path: &str, key: &str, value: Value) -> Result<(), StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        self.file()?.tree.borrow_mut().set_attr(path, key, value)
    }
}

impl RunGroupStore for HierStore {
    fn open_group(&mut self, request: &GroupRequest) -> Result<String, StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        check_params(&request.params)?;
        if !request.writes() {
            self.current = Some(OpenGroup {
                uid: request.uid.clone().unwrap_or_default(),
                rank: request.rank,
                writes: false,
                schemas: request.schemas.clone(),
            });
            return Ok(request.uid.clone().unwrap_or_default());
        }
        let path = match request.layout {
            GroupLayout::Shared => shared_path(&self.prefix),
            GroupLayout::Distributed { .. } => rank_path(&self.prefix, request.rank),
        };
        self.switch_file(path)?;
        let uid = match &request.uid {
            Some(uid) => uid.clone(),
            None => self.default_uid()?,
        };
        let file = self.file()?;
        {
            let mut tree = file.tree.borrow_mut();
            if tree.is_group(&uid) {
                debug!(%uid, "reopening run group");
                Self::check_group(&tree, &uid, request)?;
            } else {
                debug!(%uid, "creating run group");
                Self::create_group(&mut tree, &uid, request)?;
            }
            tree.flush()?;
        }
        self.current = Some(OpenGroup {
            uid: uid.clone(),
            rank: request.rank,
            writes: true,
            schemas: request.schemas.clone(),
        });
        Ok(uid)
    }

    fn backend_for(&mut self, index: SelectorId) -> Result<Box<dyn Backend>, StoreError> {
        let open = self.current.as_ref().ok_or_else(|| StoreError::NotFound {
            what: "open run group".to_string(),
        })?;
        let schema = open
            .schemas
            .iter()
            .find(|s| s.index == index)
            .ok_or_else(|| StoreError::NotFound {
                what: format!("selector {index} in the open run group"),
            })?
            .clone();
        if !open.writes {
            return Ok(Box::new(RemoteBackend::new()));
        }
        let path = selector_path(&open.uid, index);
        let backend = HierBackend::new(self.file()?.clone(), path, schema, false)?;
        Ok(Box::new(backend))
    }

    fn groups(&self) -> Result<Vec<RunGroupInfo>, StoreError> {
        let Some(file) = &self.file else {
            return Ok(Vec::new());
        };
        let tree = file.tree.borrow();
        Ok(tree
            .children("")
            .into_iter()
            .filter(|uid| tree.attr(uid, "engine_version").is_some())
            .map(|uid| RunGroupInfo {
                timestamp: tree
                    .attr(&uid, "timestamp")
                    .and_then(|t| t.as_str().map(str::to_string))
                    .unwrap_or_default(),
                nb_selectors: selector_children(&tree, &uid, SELECTOR_PREFIX)
                    .len()
                    .max(selector_children(&tree, &uid, DIST_SELECTOR_PREFIX).len()),
                params: Self::group_params(&tree, &uid),
                uid,
            })
            .collect())
    }

    fn results(&self, uid: &str) -> Result<Vec<ReadOnlySelector>, StoreError> {
        self.group(uid)?;
        if !self.distributed_selectors(uid)?.is_empty() {
            return Err(StoreError::Unsupported {
                op: format!(
                    "reading distributed run group '{uid}' from a single rank file; \
                     use a distributed reader"
                ),
            });
        }
        let ids = selector_children(&self.file()?.tree.borrow(), uid, SELECTOR_PREFIX);
        ids.into_iter()
            .map(|i| -> Result<ReadOnlySelector, StoreError> {
                Ok(ReadOnlySelector::new(Box::new(self.selector_backend(uid, i)?)))
            })
            .collect()
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        match &self.file {
            Some(f) => f.flush(),
            None => Ok(()),
        }
    }
}

fn read_remap(tree: &TreeStore, selector: &str) -> Result<Option<Vec<usize>>, StoreError> {
    let path = format!("{selector}/ColumnRemapping");
    match tree.dataset(&path)?.map(|d| d.data) {
        None => Ok(None),
        Some(Data::I64(v)) => Ok(Some(v.iter().map(|&i| i.max(0) as usize).collect())),
        Some(_) => Err(StoreError::Malformed {
            detail: format!("{path} is not an integer array"),
        }),
    }
}

// ── Backend ─────────────────────────────────────────────────────

/// Saves one selector to its group of a [`HierStore`].
///
/// Compound columns (metadata `value_type`) are stored as encoder handles.
/// Numeric columns saved as `None` read back as NaN.
///
/// Every save appends to the run's datasets in the file, which is flushed
/// every `flush_freq` rows. A run cut short keeps the rows flushed so far.
pub struct HierBackend {
    file: HierFile,
    path: String,
    schema: Schema,
    compound: Vec<usize>,
    remap: Option<Vec<usize>>,
    run: Option<String>,
    pending: usize,
    read_only: bool,
}

impl HierBackend {
    fn new(
        file: HierFile,
        path: String,
        schema: Schema,
        read_only: bool,
    ) -> Result<Self, StoreError> {
        let remap = read_remap(&file.tree.borrow(), &path)?;
        Ok(Self {
            compound: schema.compound_columns(),
            file,
            path,
            schema,
            remap,
            run: None,
            pending: 0,
            read_only,
        })
    }

    /// Path of the selector group inside the store.
    pub fn path(&self) -> &str {
        &self.path
    }

    fn runs_path(&self) -> String {
        format!("{}/runs", self.path)
    }

    fn stored_columns(&self) -> Vec<usize> {
        match &self.remap {
            None => (0..self.schema.len()).collect(),
            Some(remap) => {
                // stored[j] = row[remap[j]]: column c lives at the j with remap[j] == c.
                let mut inverse = vec![0; remap.len()];
                for (j, &c) in remap.iter().enumerate() {
                    if let Some(slot) = inverse.get_mut(c) {
                        *slot = j;
                    }
                }
                inverse
            }
        }
    }

    fn encode_row(&self, row: &[Value]) -> Result<Vec<f64>, StoreError> {
        let mut vals = Vec::with_capacity(row.len());
        for (c, v) in row.iter().enumerate() {
            let x = if self.compound.contains(&c) {
                self.file.encoder.borrow_mut().write(v)? as f64
            } else {
                match v {
                    Value::None => f64::NAN,
                    other => other.as_f64().ok_or_else(|| StoreError::Unsupported {
                        op: format!(
                            "saving a {} value in column {c}, which is not declared compound",
                            other.type_name()
                        ),
                    })?,
                }
            };
            vals.push(x);
        }
        Ok(match &self.remap {
            Some(remap) => remap.iter().map(|&i| vals.get(i).copied().unwrap_or(f64::NAN)).collect(),
            None => vals,
        })
    }

    fn decode(&self, col: usize, x: f64) -> Value {
        if self.compound.contains(&col) {
            self.file.encoder.borrow().read(x as i64)
        } else {
            Value::Float(x)
        }
    }

    fn run_names(&self) -> Vec<String> {
        let tree = self.file.tree.borrow();
        let mut runs: Vec<(u64, String)> = tree
            .children(&self.runs_path())
            .into_iter()
            .filter_map(|n| Some((n.strip_prefix("Run_")?.parse().ok()?, n)))
            .collect();
        runs.sort_unstable();
        runs.into_iter().map(|(_, n)| n).collect()
    }

    fn run_dataset(&self, run: &str, name: &str) -> Result<Dataset, StoreError> {
        let path = format!("{}/{run}/{name}", self.runs_path());
        self.file
            .tree
            .borrow()
            .dataset(&path)?
            .ok_or_else(|| StoreError::Malformed {
                detail: format!("{path} is missing"),
            })
    }
}

impl Backend for HierBackend {
    fn new_run(&mut self) -> Result<RunId, StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let id = self.run_names().len() as u64;
        let run = format!("{}/Run_{id}", self.runs_path());
        {
            let mut tree = self.file.tree.borrow_mut();
            tree.create_extendable::<f64>(&format!("{run}/time"), None)?;
            tree.create_extendable::<f64>(&format!("{run}/data"), Some(self.schema.len()))?;
            tree.flush()?;
        }
        self.remap = read_remap(&self.file.tree.borrow(), &self.path)?;
        self.run = Some(run);
        self.pending = 0;
        Ok(RunId(id))
    }

    fn save(&mut self, time: f64, row: &[Value]) -> Result<(), StoreError> {
        let run = self.run.clone().ok_or(StoreError::NoRun)?;
        if row.len() != self.schema.len() {
            return Err(StoreError::Malformed {
                detail: format!("row of {} values, expected {}", row.len(), self.schema.len()),
            });
        }
        let vals = self.encode_row(row)?;
        let mut tree = self.file.tree.borrow_mut();
        tree.append(&format!("{run}/data"), &vals)?;
        tree.append(&format!("{run}/time"), &[time])?;
        self.pending += 1;
        if self.pending >= self.file.flush_freq {
            tree.flush()?;
            self.pending = 0;
        }
        Ok(())
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        if self.read_only {
            return Ok(());
        }
        self.pending = 0;
        self.file.flush()
    }

    fn saving_started(&self) -> bool {
        self.run.is_some() || !self.run_names().is_empty()
    }

    fn run_count(&mut self) -> Result<usize, StoreError> {
        Ok(self.run_names().len())
    }

    fn time(&mut self, runs: &Slice, rows: &Slice) -> Result<Vec<Vec<f64>>, StoreError> {
        let names = self.run_names();
        runs.resolve(names.len(), "run")?
            .into_iter()
            .map(|r| -> Result<Vec<f64>, StoreError> {
                let ds = self.run_dataset(&names[r], "time")?;
                let Data::F64(t) = ds.data else {
                    return Err(StoreError::Malformed {
                        detail: format!("time of {} is not a float array", names[r]),
                    });
                };
                Ok(rows
                    .resolve(t.len(), "row")?
                    .into_iter()
                    .map(|i| t[i])
                    .collect())
            })
            .collect()
    }

    fn data(
        &mut self,
        runs: &Slice,
        rows: &Slice,
        cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, StoreError> {
        let cols = cols.resolve(self.schema.len(), "column")?;
        let stored = self.stored_columns();
        let names = self.run_names();
        runs.resolve(names.len(), "run")?
            .into_iter()
            .map(|r| -> Result<Vec<Vec<Value>>, StoreError> {
                let ds = self.run_dataset(&names[r], "data")?;
                rows.resolve(ds.rows(), "row")?
                    .into_iter()
                    .map(|i| -> Result<Vec<Value>, StoreError> {
                        let raw = ds.row(i).ok_or_else(|| StoreError::Malformed {
                            detail: format!("data of {} is not a float matrix", names[r]),
                        })?;
                        let full: Vec<Value> = stored
                            .iter()
                            .enumerate()
                            .map(|(c, &j)| self.decode(c, raw.get(j).copied().unwrap_or(f64::NAN)))
                            .collect();
                        Ok(pick(&full, &cols))
                    })
                    .collect()
            })
            .collect()
    }

    fn labels(&self) -> Result<Vec<String>, StoreError> {
        Ok(self.schema.labels.clone())
    }

    fn metadata(&self) -> Result<MetaData, StoreError> {
        Ok(self.schema.metadata.clone())
    }

    fn description(&self) -> Result<String, StoreError> {
        Ok(self.schema.description.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use recap_core::VALUE_TYPE_KEY;

    fn schema(index: u32) -> Schema {
        let mut metadata = MetaData::new();
        metadata.insert(
            VALUE_TYPE_KEY.into(),
            vec![Value::None, Value::from("dict"), Value::None],
        );
        Schema {
            index: SelectorId(index),
            description: "CustomResults".into(),
            labels: vec!["a".into(), "b".into(), "c".into()],
            metadata,
            value_names: vec![None; 3],
        }
    }

    #[test]
    fn compound_columns_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HierStore::open(dir.path().join("res"), HierConfig::new()).unwrap();
        let uid = store
            .open_group(&GroupRequest::new(None, Params::new(), vec![schema(0)]))
            .unwrap();
        let mut b = store.backend_for(SelectorId(0)).unwrap();
        b.new_run().unwrap();
        let mut map = indexmap::IndexMap::new();
        map.insert("k".to_string(), Value::List(vec![Value::Int(1), Value::from("x")]));
        let row = vec![Value::Int(3), Value::Map(map), Value::Float(0.5)];
        b.save(0.0, &row).unwrap();
        b.finalize().unwrap();
        let got = b.data(&Slice::All, &Slice::All, &Slice::All).unwrap();
        assert_eq!(got[0][0][1], row[1]);
        assert_eq!(got[0][0][0], Value::Float(3.0));
        assert_eq!(store.file_path().unwrap(), shared_path(&dir.path().join("res")));

        drop(b);
        drop(store);
        let reader = HierStore::open_read_only(dir.path().join("res")).unwrap();
        let mut res = reader.results(&uid).unwrap();
        assert_eq!(res[0].labels().unwrap(), ["a", "b", "c"]);
        assert_eq!(
            res[0].data(&Slice::All, &Slice::All, &Slice::Index(1)).unwrap()[0][0][0],
            row[1]
        );
    }

    #[test]
    fn remapping_applied_and_inverted() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HierStore::open(dir.path().join("res"), HierConfig::new()).unwrap();
        let mut s = schema(0);
        s.metadata.clear();
        let uid = store
            .open_group(&GroupRequest::new(Some("g".into()), Params::new(), vec![s]))
            .unwrap();
        store.set_column_remapping(&uid, SelectorId(0), &[2, 0, 1]).unwrap();
        store.set_column_remapping(&uid, SelectorId(0), &[2, 0, 1]).unwrap();
        assert!(store.set_column_remapping(&uid, SelectorId(0), &[0, 1, 2]).is_err());

        let mut b = store.backend_for(SelectorId(0)).unwrap();
        b.new_run().unwrap();
        b.save(0.0, &[Value::Float(10.0), Value::Float(11.0), Value::Float(12.0)])
            .unwrap();
        let raw = store.dataset("g/ResultSelector0/runs/Run_0/data").unwrap().unwrap();
        assert_eq!(raw.row(0).unwrap(), &[12.0, 10.0, 11.0]);
        assert_eq!(
            b.data(&Slice::All, &Slice::All, &Slice::All).unwrap()[0][0],
            vec![Value::Float(10.0), Value::Float(11.0), Value::Float(12.0)]
        );
    }

    #[test]
    fn reopen_checks_and_resumes_runs() {
        let dir = tempfile::tempdir().unwrap();
        let prefix = dir.path().join("res");
        let mut params = Params::new();
        params.insert("seed".into(), Value::Int(1));
        {
            let mut store = HierStore::open(&prefix, HierConfig::new()).unwrap();
            store
                .open_group(&GroupRequest::new(Some("g".into()), params.clone(), vec![schema(0)]))
                .unwrap();
            let mut b = store.backend_for(SelectorId(0)).unwrap();
            b.new_run().unwrap();
            b.finalize().unwrap();
        }
        let mut store = HierStore::open(&prefix, HierConfig::new()).unwrap();
        let mut other = params.clone();
        other.insert("seed".into(), Value::Int(2));
        assert!(matches!(
            store.open_group(&GroupRequest::new(Some("g".into()), other, vec![schema(0)])),
            Err(StoreError::Consistency { .. })
        ));
        let mut relabeled = schema(0);
        relabeled.labels[0] = "z".into();
        assert!(store
            .open_group(&GroupRequest::new(Some("g".into()), params.clone(), vec![relabeled]))
            .is_err());
        store
            .open_group(&GroupRequest::new(Some("g".into()), params, vec![schema(0)]))
            .unwrap();
        let mut b = store.backend_for(SelectorId(0)).unwrap();
        assert_eq!(b.new_run().unwrap(), RunId(1));
    }

    #[test]
    fn static_data_is_write_once() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = HierStore::open(dir.path().join("res"), HierConfig::new()).unwrap();
        let uid = store
            .open_group(&GroupRequest::new(None, Params::new(), vec![schema(0)]))
            .unwrap();
        let v = Value::List(vec![Value::Int(1), Value::Int(2)]);
        store.static_set(&uid, "mesh", &v).unwrap();
        store.static_set(&uid, "mesh", &v).unwrap();
        assert!(matches!(
            store.static_set(&uid, "mesh", &Value::Int(3)),
            Err(StoreError::Consistency { .. })
        ));
        assert_eq!(store.static_get(&uid, "mesh").unwrap(), Some(v));
        assert_eq!(store.static_keys(&uid).unwrap(), ["mesh"]);
        assert_eq!(store.static_get(&uid, "none").unwrap(), None);
    }
}
