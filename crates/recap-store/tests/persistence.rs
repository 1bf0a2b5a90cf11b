//! On-disk backends reopened by a later reader.

use std::fs::File;
use std::io::BufWriter;

use recap_core::{ColumnMap, MetaData, Rank, RunId, Schema, SelectorId, Value};
use recap_store::file::FileWriter;
use recap_store::{
    Backend, FileBackend, FileConfig, FileFormat, GroupLayout, GroupRequest, HierConfig,
    HierStore, Params, ReadOnlySelector, RunGroupStore, Slice, SqliteConfig, SqliteStore,
    StoreError,
};

// ── Helpers ─────────────────────────────────────────────────────

fn schema(index: u32, labels: &[&str]) -> Schema {
    Schema {
        index: SelectorId(index),
        description: labels.join(" << "),
        labels: labels.iter().map(|l| l.to_string()).collect(),
        metadata: MetaData::new(),
        value_names: vec![None; labels.len()],
    }
}

fn row(values: &[f64]) -> Vec<Value> {
    values.iter().map(|&v| Value::Float(v)).collect()
}

fn params(seed: i64) -> Params {
    let mut p = Params::new();
    p.insert("seed".into(), Value::Int(seed));
    p.insert("model".into(), Value::from("decay"));
    p
}

// ── Binary file ─────────────────────────────────────────────────

#[test]
fn file_reopened_by_reader() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("a.bin");
    for format in [FileFormat::Legacy, FileFormat::Current] {
        {
            let config = FileConfig {
                format,
                ..FileConfig::new()
            };
            let mut b = FileBackend::create(&path, schema(0, &["A", "B"]), config).unwrap();
            for run in 0..2 {
                b.new_run().unwrap();
                for i in 0..3 {
                    let t = i as f64 * 0.5;
                    b.save(t, &row(&[t, run as f64])).unwrap();
                }
            }
            b.finalize().unwrap();
        }
        let mut r = ReadOnlySelector::from_file(&path).unwrap();
        assert_eq!(r.run_count().unwrap(), 2);
        assert_eq!(r.labels().unwrap(), ["A", "B"]);
        assert_eq!(r.description().unwrap(), "A << B");
        assert_eq!(
            r.time(&Slice::Index(-1), &Slice::All).unwrap(),
            vec![vec![0.0, 0.5, 1.0]]
        );
        assert_eq!(
            r.data(&Slice::All, &Slice::Index(-1), &Slice::Index(1)).unwrap(),
            vec![vec![vec![Value::Float(0.0)]], vec![vec![Value::Float(1.0)]]]
        );
        assert!(matches!(
            r.data(&Slice::Index(2), &Slice::All, &Slice::All),
            Err(StoreError::OutOfRange { dim: "run", .. })
        ));
    }
}

#[test]
fn partial_run_after_crash_is_readable() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("crashed.bin");
    {
        let out = BufWriter::new(File::create(&path).unwrap());
        let mut w = FileWriter::new(out, &schema(0, &["A"]), FileFormat::Current).unwrap();
        w.new_run().unwrap();
        w.write_row(0.0, &row(&[1.0])).unwrap();
        w.new_run().unwrap();
        w.write_row(0.0, &row(&[2.0])).unwrap();
        w.write_row(1.0, &row(&[3.0])).unwrap();
        // Stop without recording the last run's row count.
        w.flush().unwrap();
    }
    let mut r = ReadOnlySelector::from_file(&path).unwrap();
    assert_eq!(r.run_count().unwrap(), 2);
    assert_eq!(
        r.data(&Slice::Index(1), &Slice::All, &Slice::All).unwrap(),
        vec![vec![row(&[2.0]), row(&[3.0])]]
    );
    assert_eq!(r.time(&Slice::Index(0), &Slice::All).unwrap(), vec![vec![0.0]]);
    assert!(r.data(&Slice::Index(1), &Slice::Index(-1), &Slice::All).is_err());
}

// ── SQLite ──────────────────────────────────────────────────────

#[test]
fn sqlite_group_resumes_runs() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("runs.db");
    let schemas = vec![schema(0, &["A"]), schema(1, &["A", "B"])];
    let uid = {
        let mut db = SqliteStore::open(&path, SqliteConfig::new()).unwrap();
        let uid = db
            .open_group(&GroupRequest::new(None, params(1), schemas.clone()))
            .unwrap();
        let mut b = db.backend_for(SelectorId(1)).unwrap();
        for _ in 0..2 {
            b.new_run().unwrap();
            b.save(0.0, &row(&[1.0, 2.0])).unwrap();
        }
        b.finalize().unwrap();
        db.finalize().unwrap();
        uid
    };
    assert_eq!(uid, "RunGroup0000");

    let mut db = SqliteStore::open(&path, SqliteConfig::new()).unwrap();
    let reopened = db
        .open_group(&GroupRequest::new(Some(uid.clone()), params(1), schemas.clone()))
        .unwrap();
    assert_eq!(reopened, uid);
    let mut b = db.backend_for(SelectorId(1)).unwrap();
    assert_eq!(b.new_run().unwrap(), RunId(2));
    b.save(0.0, &row(&[5.0, 6.0])).unwrap();
    b.finalize().unwrap();

    let other = db
        .open_group(&GroupRequest::new(None, params(2), schemas))
        .unwrap();
    assert_eq!(other, "RunGroup0001");
    db.finalize().unwrap();
    drop(b);
    drop(db);

    let db = SqliteStore::open_read_only(&path).unwrap();
    assert_eq!(db.groups().unwrap().len(), 2);
    assert_eq!(db.get(&params(2)).unwrap().uid, "RunGroup0001");
    let mut res = db.results(&uid).unwrap();
    assert_eq!(res.len(), 2);
    assert_eq!(res[1].run_count().unwrap(), 3);
    assert_eq!(
        res[1].data(&Slice::Index(-1), &Slice::All, &Slice::All).unwrap(),
        vec![vec![row(&[5.0, 6.0])]]
    );
}

// ── Hierarchical, distributed ───────────────────────────────────

#[test]
fn distributed_ranks_write_private_files() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("dist");
    let full = schema(0, &["c0", "c1", "c2"]);
    let mut map = ColumnMap::unassigned(3);
    map.assign(0, Rank(0), 0);
    map.assign(1, Rank(1), 0);
    map.assign(2, Rank(0), 1);
    let layout = GroupLayout::Distributed {
        nb_ranks: 2,
        full_schemas: vec![full],
        column_maps: vec![map.clone()],
    };
    let locals = [schema(0, &["c0", "c2"]), schema(0, &["c1"])];
    for (rank, local) in locals.iter().enumerate() {
        let mut store = HierStore::open(&prefix, HierConfig::new()).unwrap();
        let request = GroupRequest {
            uid: Some("g".into()),
            params: Params::new(),
            schemas: vec![local.clone()],
            rank: Rank(rank as u32),
            layout: layout.clone(),
        };
        assert_eq!(store.open_group(&request).unwrap(), "g");
        let mut b = store.backend_for(SelectorId(0)).unwrap();
        b.new_run().unwrap();
        let vals: Vec<f64> = (0..local.len()).map(|c| (rank * 10 + c) as f64).collect();
        b.save(0.0, &row(&vals)).unwrap();
        b.finalize().unwrap();
    }

    let coordinator = HierStore::open_read_only(&prefix).unwrap();
    assert!(matches!(
        coordinator.results("g"),
        Err(StoreError::Unsupported { .. })
    ));
    assert_eq!(coordinator.group_ranks("g").unwrap(), 2);
    let (stored, stored_map) = coordinator.distributed_selector("g", SelectorId(0)).unwrap();
    assert_eq!(stored.labels, ["c0", "c1", "c2"]);
    assert_eq!(stored_map.first_mismatch(&map), None);

    let rank1 = HierStore::open_rank_read_only(&prefix, Rank(1)).unwrap();
    let mut b = rank1.selector_backend("g", SelectorId(0)).unwrap();
    assert_eq!(
        b.data(&Slice::All, &Slice::All, &Slice::All).unwrap(),
        vec![vec![row(&[10.0])]]
    );
}

#[test]
fn hier_rows_survive_an_abandoned_run() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("crash");
    let config = HierConfig {
        flush_freq: 5,
        ..HierConfig::new()
    };
    let mut store = HierStore::open(&prefix, config).unwrap();
    store
        .open_group(&GroupRequest::new(Some("g".into()), params(1), vec![schema(0, &["A"])]))
        .unwrap();
    let mut b = store.backend_for(SelectorId(0)).unwrap();
    b.new_run().unwrap();
    for i in 0..100 {
        b.save(i as f64, &row(&[i as f64])).unwrap();
    }
    let head = std::fs::read(store.file_path().unwrap()).unwrap();
    assert_eq!(&head[..8], b"\x89HDF\r\n\x1a\n");
    // Neither finalized nor dropped, as if the process had died here.
    std::mem::forget(b);
    std::mem::forget(store);

    let reader = HierStore::open_read_only(&prefix).unwrap();
    let mut res = reader.results("g").unwrap();
    assert_eq!(res[0].run_count().unwrap(), 1);
    assert_eq!(
        res[0].time(&Slice::All, &Slice::Index(-1)).unwrap(),
        vec![vec![99.0]]
    );
    assert_eq!(
        res[0].data(&Slice::All, &Slice::All, &Slice::All).unwrap()[0].len(),
        100
    );
}

#[test]
fn shared_layout_only_coordinator_writes() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("shared");
    let mut store = HierStore::open(&prefix, HierConfig::new()).unwrap();
    let mut request = GroupRequest::new(Some("g".into()), Params::new(), vec![schema(0, &["A"])]);
    request.rank = Rank(1);
    store.open_group(&request).unwrap();
    let mut b = store.backend_for(SelectorId(0)).unwrap();
    b.new_run().unwrap();
    b.save(0.0, &row(&[1.0])).unwrap();
    assert!(matches!(
        b.data(&Slice::All, &Slice::All, &Slice::All),
        Err(StoreError::AccessScope { .. })
    ));
    assert!(store.file_path().is_none());
}
