//! Run groups in a SQLite database.
//!
//! Bookkeeping tables describe the groups and their selectors; every saved
//! selector gets a data table of its own:
//!
//! ```text
//! SimGroups        (groupid, timestamp, uniqueid, nbselectors, <params>...)
//! ResultSelectors  (groupid, rsid, descr, tabName, nbcols)
//! Labels           (groupid, rsid, colind, label)
//! MetaData         (groupid, rsid, data)            JSON blob
//! Group_{g}_Selector_{s} (runid, time, Col_0, ..., Col_{n-1})
//! ```

use std::cell::Cell;
use std::path::Path;
use std::rc::Rc;

use recap_core::{MetaData, RunId, Schema, SelectorId, Value, ENGINE_VERSION};
use rusqlite::types::{Value as SqlValue, ValueRef};
use rusqlite::{params, params_from_iter, Connection, OpenFlags, OptionalExtension};
use tracing::{debug, warn};

use crate::backend::{pick, Backend, RemoteBackend};
use crate::config::SqliteConfig;
use crate::error::StoreError;
use crate::group::{
    check_params, check_schema, timestamp, GroupLayout, GroupRequest, Params, RunGroupInfo,
    RunGroupStore,
};
use crate::readonly::ReadOnlySelector;
use crate::slice::Slice;

/// Metadata key recording the engine version in stored metadata blobs.
pub const VERSION_KEY: &str = "__recap_version__";

const DEFAULT_COLUMNS: [&str; 4] = ["groupid", "timestamp", "uniqueid", "nbselectors"];

/// Connection shared by a store and its backends.
///
/// Inserts are batched in transactions of `commit_freq` rows. The counter
/// is per connection since a transaction spans every table.
struct Db {
    conn: Connection,
    pending: Cell<usize>,
    commit_freq: usize,
    read_only: bool,
}

impl Db {
    fn insert(&self, sql: &str, values: &[SqlValue]) -> Result<(), StoreError> {
        if self.conn.is_autocommit() {
            self.conn.execute_batch("BEGIN")?;
        }
        self.conn
            .prepare_cached(sql)?
            .execute(params_from_iter(values.iter()))?;
        self.pending.set(self.pending.get() + 1);
        if self.pending.get() >= self.commit_freq {
            self.commit()?;
        }
        Ok(())
    }

    fn commit(&self) -> Result<(), StoreError> {
        if !self.conn.is_autocommit() {
            self.conn.execute_batch("COMMIT")?;
        }
        self.pending.set(0);
        Ok(())
    }

    fn table_exists(&self, name: &str) -> Result<bool, StoreError> {
        Ok(self
            .conn
            .query_row(
                "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
                params![name],
                |_| Ok(()),
            )
            .optional()?
            .is_some())
    }
}

impl Drop for Db {
    fn drop(&mut self) {
        if let Err(e) = self.commit() {
            warn!("failed to commit pending rows: {e}");
        }
    }
}

fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        r#"
CREATE TABLE IF NOT EXISTS SimGroups (
  groupid INTEGER PRIMARY KEY AUTOINCREMENT,
  timestamp date,
  uniqueid text UNIQUE,
  nbselectors int
);

CREATE TABLE IF NOT EXISTS ResultSelectors (
  groupid int,
  rsid int,
  descr text,
  tabName text,
  nbcols int
);

CREATE TABLE IF NOT EXISTS Labels (
  groupid int,
  rsid int,
  colind int,
  label text
);

CREATE TABLE IF NOT EXISTS MetaData (
  groupid int,
  rsid int,
  data blob
);
"#,
    )
}

fn table_name(group: i64, index: SelectorId) -> String {
    format!("Group_{group}_Selector_{}", index.0)
}

fn sql_type(v: &Value) -> &'static str {
    match v {
        Value::Int(_) => "int",
        Value::Float(_) => "real",
        _ => "text",
    }
}

fn to_sql(v: &Value) -> Result<SqlValue, StoreError> {
    match v {
        Value::None => Ok(SqlValue::Null),
        Value::Int(i) => Ok(SqlValue::Integer(*i)),
        Value::Float(x) => Ok(SqlValue::Real(*x)),
        Value::Str(s) => Ok(SqlValue::Text(s.clone())),
        other => Err(StoreError::Unsupported {
            op: format!("saving a {} value to SQLite", other.type_name()),
        }),
    }
}

fn from_sql(v: ValueRef<'_>) -> Value {
    match v {
        ValueRef::Null | ValueRef::Blob(_) => Value::None,
        ValueRef::Integer(i) => Value::Int(i),
        ValueRef::Real(x) => Value::Float(x),
        ValueRef::Text(t) => Value::Str(String::from_utf8_lossy(t).into_owned()),
    }
}

/// Parameter names must be plain identifiers to be used as column names.
fn check_column_name(name: &str) -> Result<(), StoreError> {
    let mut chars = name.chars();
    let ok = chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');
    if ok && !DEFAULT_COLUMNS.contains(&name) {
        Ok(())
    } else {
        Err(StoreError::Unsupported {
            op: format!("parameter name '{name}'"),
        })
    }
}

struct OpenGroup {
    id: Option<i64>,
    schemas: Vec<Schema>,
}

/// A SQLite database of run groups.
pub struct SqliteStore {
    db: Rc<Db>,
    current: Option<OpenGroup>,
}

impl SqliteStore {
    /// Open or create the database at `path`.
    pub fn open(path: impl AsRef<Path>, config: SqliteConfig) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?, config, false)
    }

    /// Open an existing database for reading only.
    pub fn open_read_only(path: impl AsRef<Path>) -> Result<Self, StoreError> {
        let conn = Connection::open_with_flags(path, OpenFlags::SQLITE_OPEN_READ_ONLY)?;
        Self::with_connection(conn, SqliteConfig::new(), true)
    }

    /// A database living in memory only.
    pub fn in_memory(config: SqliteConfig) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?, config, false)
    }

    fn with_connection(
        conn: Connection,
        config: SqliteConfig,
        read_only: bool,
    ) -> Result<Self, StoreError> {
        if !read_only {
            init(&conn)?;
        }
        Ok(Self {
            db: Rc::new(Db {
                conn,
                pending: Cell::new(0),
                commit_freq: config.commit_freq.max(1),
                read_only,
            }),
            current: None,
        })
    }

    fn existing_columns(&self) -> Result<Vec<String>, StoreError> {
        let mut stmt = self.db.conn.prepare("PRAGMA table_info(SimGroups)")?;
        let names = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(names)
    }

    fn add_param_columns(&self, params: &Params) -> Result<(), StoreError> {
        let existing = self.existing_columns()?;
        for (name, value) in params {
            check_column_name(name)?;
            if !existing.iter().any(|c| c == name) {
                self.db.conn.execute(
                    &format!("ALTER TABLE SimGroups ADD COLUMN {name} {}", sql_type(value)),
                    [],
                )?;
            }
        }
        Ok(())
    }

    fn group_id(&self, uid: &str) -> Result<Option<i64>, StoreError> {
        Ok(self
            .db
            .conn
            .query_row(
                "SELECT groupid FROM SimGroups WHERE uniqueid = ?1",
                params![uid],
                |row| row.get(0),
            )
            .optional()?)
    }

    fn stored_schema(&self, group: i64, rsid: u32) -> Result<Schema, StoreError> {
        let conn = &self.db.conn;
        let (description, nbcols): (String, i64) = conn
            .query_row(
                "SELECT descr, nbcols FROM ResultSelectors WHERE groupid = ?1 AND rsid = ?2",
                params![group, rsid],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?
            .ok_or_else(|| StoreError::NotFound {
                what: format!("selector {rsid} of group {group}"),
            })?;
        let labels = conn
            .prepare("SELECT label FROM Labels WHERE groupid = ?1 AND rsid = ?2 ORDER BY colind")?
            .query_map(params![group, rsid], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        let blob: Vec<u8> = conn.query_row(
            "SELECT data FROM MetaData WHERE groupid = ?1 AND rsid = ?2",
            params![group, rsid],
            |row| row.get(0),
        )?;
        let mut metadata: MetaData = serde_json::from_slice(&blob)?;
        metadata.shift_remove(VERSION_KEY);
        if labels.len() as i64 != nbcols {
            return Err(StoreError::Malformed {
                detail: format!("selector {rsid} has {nbcols} columns but {} labels", labels.len()),
            });
        }
        Ok(Schema {
            index: SelectorId(rsid),
            description,
            value_names: vec![None; labels.len()],
            labels,
            metadata,
        })
    }

    fn create_group(&self, uid: &str, request: &GroupRequest) -> Result<i64, StoreError> {
        self.add_param_columns(&request.params)?;
        let mut cols = vec!["timestamp", "uniqueid", "nbselectors"];
        cols.extend(request.params.keys().map(String::as_str));
        let placeholders: Vec<String> = (1..=cols.len()).map(|i| format!("?{i}")).collect();
        let mut values = vec![
            SqlValue::Text(timestamp()),
            SqlValue::Text(uid.to_string()),
            SqlValue::Integer(request.schemas.len() as i64),
        ];
        for v in request.params.values() {
            values.push(to_sql(v)?);
        }
        let conn = &self.db.conn;
        conn.execute(
            &format!(
                "INSERT INTO SimGroups ({}) VALUES ({})",
                cols.join(", "),
                placeholders.join(", ")
            ),
            params_from_iter(values.iter()),
        )?;
        let group = conn.last_insert_rowid();

        for schema in &request.schemas {
            let rsid = schema.index.0;
            conn.execute(
                "INSERT INTO ResultSelectors (groupid, rsid, descr, tabName, nbcols) \
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![
                    group,
                    rsid,
                    schema.description,
                    table_name(group, schema.index),
                    schema.len() as i64
                ],
            )?;
            for (i, label) in schema.labels.iter().enumerate() {
                conn.execute(
                    "INSERT INTO Labels (groupid, rsid, colind, label) VALUES (?1, ?2, ?3, ?4)",
                    params![group, rsid, i as i64, label],
                )?;
            }
            let mut metadata = schema.metadata.clone();
            metadata.insert(VERSION_KEY.to_string(), vec![Value::from(ENGINE_VERSION)]);
            conn.execute(
                "INSERT INTO MetaData (groupid, rsid, data) VALUES (?1, ?2, ?3)",
                params![group, rsid, serde_json::to_vec(&metadata)?],
            )?;
        }
        Ok(group)
    }

    fn check_group(&self, uid: &str, group: i64, request: &GroupRequest) -> Result<(), StoreError> {
        let info = self.group(uid)?;
        if info.params != request.params {
            return Err(StoreError::Consistency {
                detail: format!("run group '{uid}' was saved with different parameters"),
            });
        }
        if info.nb_selectors != request.schemas.len() {
            return Err(StoreError::Consistency {
                detail: format!(
                    "run group '{uid}' holds {} selectors, {} are being saved",
                    info.nb_selectors,
                    request.schemas.len()
                ),
            });
        }
        for schema in &request.schemas {
            check_schema(&self.stored_schema(group, schema.index.0)?, schema)?;
        }
        Ok(())
    }
}

impl RunGroupStore for SqliteStore {
    fn open_group(&mut self, request: &GroupRequest) -> Result<String, StoreError> {
        if self.db.read_only {
            return Err(StoreError::ReadOnly);
        }
        if matches!(request.layout, GroupLayout::Distributed { .. }) {
            return Err(StoreError::Unsupported {
                op: "saving a distributed simulation to SQLite".to_string(),
            });
        }
        check_params(&request.params)?;
        if let Some(s) = request
            .schemas
            .iter()
            .find(|s| s.metadata.contains_key(VERSION_KEY))
        {
            debug!(selector = %s.index, "reserved metadata key in selector");
            return Err(StoreError::ReservedKey {
                key: VERSION_KEY.to_string(),
            });
        }
        let uid = match &request.uid {
            Some(uid) => uid.clone(),
            None => self.default_uid()?,
        };
        let id = if request.writes() {
            Some(match self.group_id(&uid)? {
                Some(group) => {
                    debug!(%uid, group, "reopening run group");
                    self.check_group(&uid, group, request)?;
                    group
                }
                None => {
                    let group = self.create_group(&uid, request)?;
                    debug!(%uid, group, "created run group");
                    group
                }
            })
        } else {
            None
        };
        self.current = Some(OpenGroup {
            id,
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
            })?;
        Ok(match open.id {
            Some(group) => Box::new(SqliteBackend::new(
                self.db.clone(),
                table_name(group, index),
                schema.clone(),
                false,
            )),
            None => Box::new(RemoteBackend::new()),
        })
    }

    fn groups(&self) -> Result<Vec<RunGroupInfo>, StoreError> {
        if !self.db.table_exists("SimGroups")? {
            return Ok(Vec::new());
        }
        let mut stmt = self
            .db
            .conn
            .prepare("SELECT * FROM SimGroups ORDER BY groupid")?;
        let names: Vec<String> = stmt.column_names().into_iter().map(str::to_string).collect();
        let mut rows = stmt.query([])?;
        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut info = RunGroupInfo {
                uid: String::new(),
                timestamp: String::new(),
                nb_selectors: 0,
                params: Params::new(),
            };
            for (i, name) in names.iter().enumerate() {
                let v = from_sql(row.get_ref(i)?);
                match name.as_str() {
                    "groupid" => {}
                    "timestamp" => info.timestamp = v.to_string(),
                    "uniqueid" => info.uid = v.as_str().unwrap_or_default().to_string(),
                    "nbselectors" => {
                        info.nb_selectors = v.as_f64().map_or(0, |n| n as usize)
                    }
                    _ if v.is_none() => {}
                    _ => {
                        info.params.insert(name.clone(), v);
                    }
                }
            }
            out.push(info);
        }
        Ok(out)
    }

    fn results(&self, uid: &str) -> Result<Vec<ReadOnlySelector>, StoreError> {
        let group = self.group_id(uid)?.ok_or_else(|| StoreError::NotFound {
            what: format!("run group '{uid}'"),
        })?;
        let info = self.group(uid)?;
        (0..info.nb_selectors as u32)
            .map(|rsid| {
                let schema = self.stored_schema(group, rsid)?;
                Ok(ReadOnlySelector::new(Box::new(SqliteBackend::new(
                    self.db.clone(),
                    table_name(group, SelectorId(rsid)),
                    schema,
                    true,
                ))))
            })
            .collect()
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        self.db.commit()
    }
}

/// Saves one selector to its table of a [`SqliteStore`].
pub struct SqliteBackend {
    db: Rc<Db>,
    table: String,
    schema: Schema,
    run: Option<u64>,
    read_only: bool,
}

impl SqliteBackend {
    fn new(db: Rc<Db>, table: String, schema: Schema, read_only: bool) -> Self {
        Self {
            db,
            table,
            schema,
            run: None,
            read_only,
        }
    }

    /// Name of the data table.
    pub fn table(&self) -> &str {
        &self.table
    }

    fn create_table(&self) -> Result<(), StoreError> {
        let cols: Vec<String> = (0..self.schema.len())
            .map(|i| format!(", Col_{i} real"))
            .collect();
        self.db.conn.execute(
            &format!(
                "CREATE TABLE IF NOT EXISTS {} (runid int, time real{})",
                self.table,
                cols.concat()
            ),
            [],
        )?;
        Ok(())
    }

    fn max_run(&self) -> Result<Option<i64>, StoreError> {
        if !self.db.table_exists(&self.table)? {
            return Ok(None);
        }
        Ok(self.db.conn.query_row(
            &format!("SELECT MAX(runid) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?)
    }

    /// Every row of run `run`, in insertion order.
    fn run_rows(&self, run: usize) -> Result<Vec<(f64, Vec<Value>)>, StoreError> {
        let mut stmt = self.db.conn.prepare_cached(&format!(
            "SELECT * FROM {} WHERE runid = ?1 ORDER BY rowid",
            self.table
        ))?;
        let len = self.schema.len();
        let rows = stmt
            .query_map(params![run as i64], |row| {
                let time: f64 = row.get(1)?;
                let values = (0..len)
                    .map(|c| row.get_ref(c + 2).map(from_sql))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((time, values))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn rows(
        &mut self,
        runs: &Slice,
        rows: &Slice,
    ) -> Result<Vec<Vec<(f64, Vec<Value>)>>, StoreError> {
        let count = self.run_count()?;
        runs.resolve(count, "run")?
            .into_iter()
            .map(|r| {
                let all = self.run_rows(r)?;
                Ok(rows
                    .resolve(all.len(), "row")?
                    .into_iter()
                    .map(|i| all[i].clone())
                    .collect())
            })
            .collect()
    }
}

impl Backend for SqliteBackend {
    fn new_run(&mut self) -> Result<RunId, StoreError> {
        if self.read_only {
            return Err(StoreError::ReadOnly);
        }
        let next = match self.run {
            Some(r) => r + 1,
            None => {
                self.create_table()?;
                self.max_run()?.map_or(0, |m| m as u64 + 1)
            }
        };
        self.run = Some(next);
        Ok(RunId(next))
    }

    fn save(&mut self, time: f64, row: &[Value]) -> Result<(), StoreError> {
        let run = self.run.ok_or(StoreError::NoRun)?;
        if row.len() != self.schema.len() {
            return Err(StoreError::Malformed {
                detail: format!("row of {} values, expected {}", row.len(), self.schema.len()),
            });
        }
        let mut values = Vec::with_capacity(row.len() + 2);
        values.push(SqlValue::Integer(run as i64));
        values.push(SqlValue::Real(time));
        for v in row {
            values.push(match v {
                Value::None => SqlValue::Null,
                other => SqlValue::Real(other.as_f64().ok_or_else(|| StoreError::Unsupported {
                    op: format!("saving a {} value to SQLite", other.type_name()),
                })?),
            });
        }
        let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("?{i}")).collect();
        self.db.insert(
            &format!(
                "INSERT INTO {} VALUES ({})",
                self.table,
                placeholders.join(", ")
            ),
            &values,
        )
    }

    fn finalize(&mut self) -> Result<(), StoreError> {
        self.db.commit()
    }

    fn saving_started(&self) -> bool {
        self.run.is_some() || self.read_only
    }

    fn run_count(&mut self) -> Result<usize, StoreError> {
        Ok(self.max_run()?.map_or(0, |m| m as usize + 1))
    }

    fn time(&mut self, runs: &Slice, rows: &Slice) -> Result<Vec<Vec<f64>>, StoreError> {
        Ok(self
            .rows(runs, rows)?
            .into_iter()
            .map(|run| run.into_iter().map(|(t, _)| t).collect())
            .collect())
    }

    fn data(
        &mut self,
        runs: &Slice,
        rows: &Slice,
        cols: &Slice,
    ) -> Result<Vec<Vec<Vec<Value>>>, StoreError> {
        let cols = cols.resolve(self.schema.len(), "column")?;
        Ok(self
            .rows(runs, rows)?
            .into_iter()
            .map(|run| run.into_iter().map(|(_, row)| pick(&row, &cols)).collect())
            .collect())
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
