//! Reading distributed selectors back from per-rank store files.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use recap_core::{ColumnMap, MetaData, Rank, RunId, Schema, SelectorId, Value};
use recap_store::{
    Backend, HierBackend, HierStore, ReadOnlySelector, RunGroupStore, Slice, StoreError,
};

/// A distributed selector seen as one undistributed selector.
///
/// Requested columns are grouped by owning rank; each rank's file is
/// opened on first use and kept for later reads.
pub struct DistributedReader {
    prefix: PathBuf,
    uid: String,
    schema: Schema,
    map: ColumnMap,
    ranks: BTreeMap<Rank, HierBackend>,
}

impl DistributedReader {
    /// Reader over the selector described by `schema` in group `uid`,
    /// saved under `prefix`.
    pub fn new(prefix: impl AsRef<Path>, uid: &str, schema: Schema, map: ColumnMap) -> Self {
        Self {
            prefix: prefix.as_ref().to_path_buf(),
            uid: uid.to_string(),
            schema,
            map,
            ranks: BTreeMap::new(),
        }
    }

    /// Global column map.
    pub fn map(&self) -> &ColumnMap {
        &self.map
    }

    /// Number of rank files opened so far.
    pub fn open_ranks(&self) -> usize {
        self.ranks.len()
    }

    fn rank(&mut self, rank: Rank) -> Result<&mut HierBackend, StoreError> {
        if !self.ranks.contains_key(&rank) {
            let store = HierStore::open_rank_read_only(&self.prefix, rank)?;
            let backend = store.selector_backend(&self.uid, self.schema.index)?;
            self.ranks.insert(rank, backend);
        }
        self.ranks.get_mut(&rank).ok_or_else(|| StoreError::NotFound {
            what: format!("store file of rank {rank}"),
        })
    }

    /// Rank holding the first column, used for run and time reads.
    fn first_owner(&self) -> Result<Rank, StoreError> {
        (0..self.map.len())
            .find_map(|g| self.map.owner(g))
            .map(|(rank, _)| rank)
            .ok_or_else(|| StoreError::NotFound {
                what: format!("owner of selector {}", self.schema.index),
            })
    }
}

impl Backend for DistributedReader {
    fn new_run(&mut self) -> Result<RunId, StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn save(&mut self, _time: f64, _row: &[Value]) -> Result<(), StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        Ok(())
    }

    fn saving_started(&self) -> bool {
        true
    }

    fn run_count(&mut self) -> Result<usize, StoreError> {
        let owner = self.first_owner()?;
        self.rank(owner)?.run_count()
    }

    fn time(&mut self, runs: &Slice, rows: &Slice) -> Result<Vec<Vec<f64>>, StoreError> {
        let owner = self.first_owner()?;
        self.rank(owner)?.time(runs, rows)
    }

    fn data(
        &mut self,
        runs: &Slice,
        rows: &Slice,
        cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, StoreError> {
        let cols = cols.resolve(self.map.len(), "column")?;
        let mut out: Vec<Vec<Vec<Value>>> = self
            .time(runs, rows)?
            .iter()
            .map(|t| vec![vec![Value::None; cols.len()]; t.len()])
            .collect();
        for (rank, wanted) in self.map.group_by_rank(&cols) {
            let locals: Vec<isize> = wanted.iter().map(|&(_, l)| l as isize).collect();
            let block = self.rank(rank)?.data(runs, rows, &Slice::List(locals))?;
            for (r, run) in block.into_iter().enumerate() {
                for (i, values) in run.into_iter().enumerate() {
                    let target = out.get_mut(r).and_then(|run| run.get_mut(i)).ok_or_else(|| {
                        StoreError::Malformed {
                            detail: format!("rank {rank} holds rows missing from the other ranks"),
                        }
                    })?;
                    for (&(pos, _), v) in wanted.iter().zip(values) {
                        target[pos] = v;
                    }
                }
            }
        }
        Ok(out)
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

/// Reading run groups that may have been saved by several processes.
pub trait DistributedResults {
    /// Read-only selectors of group `uid`, merging per-rank files when the
    /// group was saved distributed.
    fn distributed_results(&self, uid: &str) -> Result<Vec<ReadOnlySelector>, StoreError>;
}

impl DistributedResults for HierStore {
    fn distributed_results(&self, uid: &str) -> Result<Vec<ReadOnlySelector>, StoreError> {
        let ids: Vec<SelectorId> = self.distributed_selectors(uid)?;
        if ids.is_empty() {
            return self.results(uid);
        }
        ids.into_iter()
            .map(|id| -> Result<ReadOnlySelector, StoreError> {
                let (schema, map) = self.distributed_selector(uid, id)?;
                Ok(ReadOnlySelector::new(Box::new(DistributedReader::new(
                    self.prefix(),
                    uid,
                    schema,
                    map,
                ))))
            })
            .collect()
    }
}
