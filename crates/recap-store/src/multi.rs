//! Reading run groups spread over several hierarchical stores.

use std::path::Path;

use recap_core::SelectorId;

use crate::backend::Backend;
use crate::error::StoreError;
use crate::group::{GroupRequest, RunGroupInfo, RunGroupStore};
use crate::hier::HierStore;
use crate::readonly::ReadOnlySelector;

/// Read-only view over the run groups of several [`HierStore`]s.
///
/// Groups are listed store by store. Two stores holding the same unique
/// id are rejected when the view is built.
pub struct MultiReader {
    stores: Vec<HierStore>,
}

impl MultiReader {
    /// Open every store prefix read-only.
    pub fn open<P: AsRef<Path>>(prefixes: &[P]) -> Result<Self, StoreError> {
        let stores = prefixes
            .iter()
            .map(HierStore::open_read_only)
            .collect::<Result<Vec<_>, _>>()?;
        Self::new(stores)
    }

    /// Aggregate already opened stores.
    pub fn new(stores: Vec<HierStore>) -> Result<Self, StoreError> {
        let reader = Self { stores };
        let mut seen: Vec<String> = Vec::new();
        for (i, store) in reader.stores.iter().enumerate() {
            for g in store.groups()? {
                if seen.contains(&g.uid) {
                    return Err(StoreError::Consistency {
                        detail: format!(
                            "run group '{}' of {} is also held by another store",
                            g.uid,
                            reader.stores[i].prefix().display()
                        ),
                    });
                }
                seen.push(g.uid);
            }
        }
        Ok(reader)
    }

    /// Aggregated stores.
    pub fn stores(&self) -> &[HierStore] {
        &self.stores
    }

    /// Store holding group `uid`.
    pub fn store_of(&self, uid: &str) -> Result<&HierStore, StoreError> {
        for store in &self.stores {
            if store.groups()?.iter().any(|g| g.uid == uid) {
                return Ok(store);
            }
        }
        Err(StoreError::NotFound {
            what: format!("run group '{uid}'"),
        })
    }
}

impl RunGroupStore for MultiReader {
    fn open_group(&mut self, _request: &GroupRequest) -> Result<String, StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn backend_for(&mut self, _index: SelectorId) -> Result<Box<dyn Backend>, StoreError> {
        Err(StoreError::ReadOnly)
    }

    fn groups(&self) -> Result<Vec<RunGroupInfo>, StoreError> {
        let mut out = Vec::new();
        for store in &self.stores {
            out.extend(store.groups()?);
        }
        Ok(out)
    }

    fn results(&self, uid: &str) -> Result<Vec<ReadOnlySelector>, StoreError> {
        self.store_of(uid)?.results(uid)
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::HierConfig;
    use crate::group::Params;
    use crate::slice::Slice;
    use recap_core::{MetaData, Schema, Value};

    fn schema() -> Schema {
        Schema {
            index: SelectorId(0),
            description: "A.Count".into(),
            labels: vec!["A.Count".into()],
            metadata: MetaData::new(),
            value_names: vec![None],
        }
    }

    fn write(prefix: &Path, uid: &str, value: f64) {
        let mut store = HierStore::open(prefix, HierConfig::new()).unwrap();
        store
            .open_group(&GroupRequest::new(Some(uid.into()), Params::new(), vec![schema()]))
            .unwrap();
        let mut b = store.backend_for(SelectorId(0)).unwrap();
        b.new_run().unwrap();
        b.save(0.0, &[Value::Float(value)]).unwrap();
        b.finalize().unwrap();
    }

    #[test]
    fn groups_of_every_store() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a"), dir.path().join("b"));
        write(&a, "first", 1.0);
        write(&b, "second", 2.0);
        let multi = MultiReader::open(&[&a, &b]).unwrap();
        let uids: Vec<String> = multi.groups().unwrap().into_iter().map(|g| g.uid).collect();
        assert_eq!(uids, ["first", "second"]);
        let mut res = multi.results("second").unwrap();
        assert_eq!(
            res[0].data(&Slice::All, &Slice::All, &Slice::All).unwrap(),
            vec![vec![vec![Value::Float(2.0)]]]
        );
        assert!(multi.results("third").is_err());
    }

    #[test]
    fn duplicate_uid_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let (a, b) = (dir.path().join("a"), dir.path().join("b"));
        write(&a, "same", 1.0);
        write(&b, "same", 2.0);
        assert!(matches!(
            MultiReader::open(&[&a, &b]),
            Err(StoreError::Consistency { .. })
        ));
    }
}
