//! Run groups: several sequences of runs kept in one database.
//!
//! A run group gathers the runs of one set of saved selectors under a
//! unique id and a set of user parameters. [`RunGroupStore`] is the
//! contract shared by the SQLite and hierarchical stores; parameter
//! queries are provided on top of [`RunGroupStore::groups`].

use std::time::{SystemTime, UNIX_EPOCH};

use indexmap::IndexMap;
use recap_core::{ColumnMap, Rank, Schema, SelectorId, Value};

use crate::backend::Backend;
use crate::error::StoreError;
use crate::readonly::ReadOnlySelector;

/// User parameters of a run group. Values are numbers or strings.
pub type Params = IndexMap<String, Value>;

/// How the selectors of a run group are spread across processes.
#[derive(Clone, Debug, Default, PartialEq)]
pub enum GroupLayout {
    /// The coordinator saves every selector; other ranks save nothing.
    #[default]
    Shared,
    /// Every rank saves its own columns to a private file.
    Distributed {
        /// Number of processes.
        nb_ranks: usize,
        /// Schemas of the complete, undistributed selectors.
        full_schemas: Vec<Schema>,
        /// Global to local column maps, only known on the coordinator.
        column_maps: Vec<ColumnMap>,
    },
}

/// Everything needed to create or reopen a run group.
#[derive(Clone, Debug)]
pub struct GroupRequest {
    /// Unique id; a fresh `RunGroup{:04}` id is chosen when `None`.
    pub uid: Option<String>,
    /// User parameters.
    pub params: Params,
    /// Schemas of the selectors saved by this process.
    pub schemas: Vec<Schema>,
    /// Rank of this process.
    pub rank: Rank,
    /// Process layout.
    pub layout: GroupLayout,
}

impl GroupRequest {
    /// A request for a single-process run group.
    pub fn new(uid: Option<String>, params: Params, schemas: Vec<Schema>) -> Self {
        Self {
            uid,
            params,
            schemas,
            rank: Rank::COORDINATOR,
            layout: GroupLayout::Shared,
        }
    }

    /// Whether this process writes to the store at all.
    pub fn writes(&self) -> bool {
        self.rank.is_coordinator() || matches!(self.layout, GroupLayout::Distributed { .. })
    }
}

/// Summary of a stored run group.
#[derive(Clone, Debug, PartialEq)]
pub struct RunGroupInfo {
    /// Unique id.
    pub uid: String,
    /// Creation time, seconds since the Unix epoch.
    pub timestamp: String,
    /// Number of saved selectors.
    pub nb_selectors: usize,
    /// User parameters.
    pub params: Params,
}

impl RunGroupInfo {
    /// Whether the group was saved with `name == value`.
    pub fn matches(&self, name: &str, value: &Value) -> bool {
        self.params.get(name) == Some(value)
    }
}

/// A database holding several run groups.
pub trait RunGroupStore {
    /// Create the group described by `request`, or reopen it if its id
    /// already exists, checking that the stored selectors match.
    ///
    /// Returns the group's unique id.
    fn open_group(&mut self, request: &GroupRequest) -> Result<String, StoreError>;

    /// Backend saving selector `index` of the open group.
    fn backend_for(&mut self, index: SelectorId) -> Result<Box<dyn Backend>, StoreError>;

    /// Every stored group, in creation order.
    fn groups(&self) -> Result<Vec<RunGroupInfo>, StoreError>;

    /// Read-only selectors of group `uid`, in saving order.
    fn results(&self, uid: &str) -> Result<Vec<ReadOnlySelector>, StoreError>;

    /// Flush everything written so far.
    fn finalize(&mut self) -> Result<(), StoreError>;

    /// The group with unique id `uid`.
    fn group(&self, uid: &str) -> Result<RunGroupInfo, StoreError> {
        self.groups()?
            .into_iter()
            .find(|g| g.uid == uid)
            .ok_or_else(|| StoreError::NotFound {
                what: format!("run group '{uid}'"),
            })
    }

    /// First `RunGroup{:04}` id not already taken, counting from the
    /// number of stored groups.
    fn default_uid(&self) -> Result<String, StoreError> {
        let groups = self.groups()?;
        let mut n = groups.len();
        loop {
            let uid = format!("RunGroup{n:04}");
            if !groups.iter().any(|g| g.uid == uid) {
                return Ok(uid);
            }
            n += 1;
        }
    }

    /// Every parameter name with the distinct values it takes.
    fn parameters(&self) -> Result<IndexMap<String, Vec<Value>>, StoreError> {
        let mut out: IndexMap<String, Vec<Value>> = IndexMap::new();
        for g in self.groups()? {
            for (name, value) in g.params {
                let values = out.entry(name).or_default();
                if !values.contains(&value) {
                    values.push(value);
                }
            }
        }
        Ok(out)
    }

    /// Groups saved with every given parameter value.
    ///
    /// Unknown parameter names are an error; no parameters selects every
    /// group.
    fn filter(&self, params: &Params) -> Result<Vec<RunGroupInfo>, StoreError> {
        let known = self.parameters()?;
        if let Some(name) = params.keys().find(|k| !known.contains_key(*k)) {
            return Err(StoreError::NotFound {
                what: format!("parameter '{name}'"),
            });
        }
        Ok(self
            .groups()?
            .into_iter()
            .filter(|g| params.iter().all(|(k, v)| g.matches(k, v)))
            .collect())
    }

    /// The single group matching `params`.
    fn get(&self, params: &Params) -> Result<RunGroupInfo, StoreError> {
        let mut found = self.filter(params)?;
        match found.len() {
            1 => Ok(found.remove(0)),
            0 => Err(StoreError::NotFound {
                what: format!("run group with parameters {}", describe(params)),
            }),
            n => Err(StoreError::Consistency {
                detail: format!(
                    "{n} run groups match parameters {}, expected one",
                    describe(params)
                ),
            }),
        }
    }
}

fn describe(params: &Params) -> String {
    let parts: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
    format!("{{{}}}", parts.join(", "))
}

/// Current time as stored in group timestamps.
pub(crate) fn timestamp() -> String {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
        .to_string()
}

/// Check that user parameters only hold scalars.
pub(crate) fn check_params(params: &Params) -> Result<(), StoreError> {
    match params
        .iter()
        .find(|(_, v)| !matches!(v, Value::Int(_) | Value::Float(_) | Value::Str(_)))
    {
        Some((k, v)) => Err(StoreError::Unsupported {
            op: format!("parameter '{k}' of type {}", v.type_name()),
        }),
        None => Ok(()),
    }
}

/// Compare the stored description of selector `index` with `expected`.
pub(crate) fn check_schema(stored: &Schema, expected: &Schema) -> Result<(), StoreError> {
    let i = expected.index;
    let fail = |what: &str| {
        Err(StoreError::Consistency {
            detail: format!("selector {i} has a different {what} than the one stored"),
        })
    };
    if stored.index != expected.index {
        return fail("index");
    }
    if stored.description != expected.description {
        return fail("description");
    }
    if stored.len() != expected.len() {
        return fail("number of columns");
    }
    if stored.labels != expected.labels {
        return fail("set of labels");
    }
    if stored.metadata != expected.metadata {
        return fail("metadata");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(Vec<RunGroupInfo>);

    impl RunGroupStore for Fixed {
        fn open_group(&mut self, _request: &GroupRequest) -> Result<String, StoreError> {
            unimplemented!()
        }
        fn backend_for(&mut self, _index: SelectorId) -> Result<Box<dyn Backend>, StoreError> {
            unimplemented!()
        }
        fn groups(&self) -> Result<Vec<RunGroupInfo>, StoreError> {
            Ok(self.0.clone())
        }
        fn results(&self, _uid: &str) -> Result<Vec<ReadOnlySelector>, StoreError> {
            Ok(Vec::new())
        }
        fn finalize(&mut self) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn info(uid: &str, params: &[(&str, Value)]) -> RunGroupInfo {
        RunGroupInfo {
            uid: uid.into(),
            timestamp: "0".into(),
            nb_selectors: 1,
            params: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.clone()))
                .collect(),
        }
    }

    fn store() -> Fixed {
        Fixed(vec![
            info("RunGroup0001", &[("seed", Value::Int(1)), ("dt", Value::Float(0.1))]),
            info("a", &[("seed", Value::Int(2)), ("dt", Value::Float(0.1))]),
            info("b", &[("seed", Value::Int(1)), ("dt", Value::Float(0.2))]),
        ])
    }

    #[test]
    fn default_uid_skips_taken_names() {
        let s = store();
        // Three groups: start at 3, nothing taken.
        assert_eq!(s.default_uid().unwrap(), "RunGroup0003");
        let s = Fixed(vec![info("x", &[]), info("RunGroup0002", &[])]);
        assert_eq!(s.default_uid().unwrap(), "RunGroup0003");
    }

    #[test]
    fn parameters_collect_distinct_values() {
        let p = store().parameters().unwrap();
        assert_eq!(p["seed"], vec![Value::Int(1), Value::Int(2)]);
        assert_eq!(p["dt"], vec![Value::Float(0.1), Value::Float(0.2)]);
    }

    #[test]
    fn filter_and_get() {
        let s = store();
        let mut q = Params::new();
        q.insert("seed".into(), Value::Int(1));
        assert_eq!(s.filter(&q).unwrap().len(), 2);
        assert!(matches!(s.get(&q), Err(StoreError::Consistency { .. })));
        q.insert("dt".into(), Value::Float(0.2));
        assert_eq!(s.get(&q).unwrap().uid, "b");
        assert_eq!(s.filter(&Params::new()).unwrap().len(), 3);

        let mut unknown = Params::new();
        unknown.insert("temperature".into(), Value::Int(3));
        assert!(matches!(s.filter(&unknown), Err(StoreError::NotFound { .. })));
        assert!(matches!(s.group("zzz"), Err(StoreError::NotFound { .. })));
    }
}
