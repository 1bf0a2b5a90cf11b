//! End-to-end recording of the mock simulation through every kind of sink.

use std::rc::Rc;

use recap::prelude::*;
use recap_test_utils::{MockMesh, MockSimulation};

fn whole_a(sim: &MockSimulation) -> Selector {
    Selector::leaf(sim, path().member("A").terminal("Count")).unwrap()
}

fn tets(sim: &MockSimulation) -> Selector {
    let ids = (0..4i64).map(Value::from).collect();
    Selector::leaf(sim, path().call("TETS", ids).member("A").terminal("Count")).unwrap()
}

#[test]
fn decaying_count_in_memory() {
    let mut sim = MockSimulation::new();
    let mut rec = Recorder::new(ProcessContext::single());
    let id = rec.add(vec![whole_a(&sim).into()], Timing::Interval(0.1)).unwrap()[0];
    rec.new_run(&mut sim).unwrap();
    rec.run(&mut sim, 1.0).unwrap();

    let time = rec.time(id, &Slice::All, &Slice::All).unwrap();
    assert_eq!(time.len(), 1);
    assert_eq!(time[0].len(), 11);
    for (i, t) in time[0].iter().enumerate() {
        assert!((t - i as f64 * 0.1).abs() < 1e-12, "{t}");
    }
    assert_eq!(time[0][10], 1.0);
    assert_eq!(
        rec.data(id, &Slice::Index(0), &Slice::Index(-1), &Slice::All).unwrap(),
        vec![vec![vec![Value::Float(90.0)]]]
    );
}

#[test]
fn explicit_file_backend_is_readable_later() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("a.bin");
    let mut sim = MockSimulation::new();
    let mut rec = Recorder::new(ProcessContext::single());
    let sel = whole_a(&sim);
    let schema = sel.schema(SelectorId(0));
    let id = rec.add(vec![sel.into()], Timing::Interval(0.5)).unwrap()[0];
    rec.attach_backend(id, Box::new(FileBackend::create(&file, schema, FileConfig::new()).unwrap()))
        .unwrap();
    for _ in 0..2 {
        rec.new_run(&mut sim).unwrap();
        rec.run(&mut sim, 1.0).unwrap();
    }
    rec.finalize().unwrap();
    drop(rec);

    let mut res = ReadOnlySelector::from_file(&file).unwrap();
    assert_eq!(res.run_count().unwrap(), 2);
    assert_eq!(res.labels().unwrap(), vec!["A.Count".to_string()]);
    assert_eq!(
        res.time(&Slice::Index(1), &Slice::All).unwrap(),
        vec![vec![0.0, 0.5, 1.0]]
    );
}

#[test]
fn run_group_store_receives_every_source() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("res");
    let mut sim = MockSimulation::new();
    let mut rec = Recorder::new(ProcessContext::single());
    rec.add(vec![whole_a(&sim).into(), tets(&sim).into()], Timing::Interval(0.5))
        .unwrap();
    let store = HierStore::open(&prefix, HierConfig::new()).unwrap();
    rec.attach_store(Box::new(store), Some("g".into()), Params::new())
        .unwrap();
    rec.new_run(&mut sim).unwrap();
    rec.run(&mut sim, 1.0).unwrap();
    rec.finalize().unwrap();
    assert_eq!(rec.group_uid(), Some("g"));
    drop(rec);

    let store = HierStore::open_read_only(&prefix).unwrap();
    let mut res = store.results("g").unwrap();
    assert_eq!(res.len(), 2);
    assert_eq!(
        res[1].data(&Slice::All, &Slice::Index(-1), &Slice::All).unwrap(),
        vec![vec![vec![
            Value::Float(90.0),
            Value::Float(91.0),
            Value::Float(92.0),
            Value::Float(93.0)
        ]]]
    );
}

#[test]
fn xdmf_descriptors_follow_runs() {
    let dir = tempfile::tempdir().unwrap();
    let mut sim = MockSimulation::new();
    let mut rec = Recorder::new(ProcessContext::single());
    rec.add(vec![tets(&sim).into()], Timing::Interval(0.5)).unwrap();
    let hier = HierStore::open(dir.path().join("res"), HierConfig::new()).unwrap();
    let store = XdmfStore::new(hier, XdmfConfig::new(), Rc::new(MockMesh::new()));
    rec.attach_store(Box::new(store), Some("g".into()), Params::new())
        .unwrap();
    for _ in 0..2 {
        rec.new_run(&mut sim).unwrap();
        rec.run(&mut sim, 1.0).unwrap();
    }
    rec.finalize().unwrap();
    drop(rec);

    for run in ["g_Run0_rank0.xmf", "g_Run1_rank0.xmf"] {
        let text = std::fs::read_to_string(dir.path().join(run)).unwrap();
        assert!(text.contains("Value=\"1\""), "{run}");
    }
}

#[test]
fn partitioned_ranks_save_their_own_columns() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("res");
    let out = ThreadGroup::run(2, |ctx| {
        let rank = ctx.rank().0;
        let mut sim = MockSimulation::new().with_partition(rank, ctx.size() as u32);
        let mut rec = Recorder::new(ctx);
        rec.add(vec![tets(&sim).into(), whole_a(&sim).into()], Timing::Interval(0.5))
            .unwrap();
        let store = HierStore::open(&prefix, HierConfig::new()).unwrap();
        rec.attach_store(Box::new(store), Some("g".into()), Params::new())
            .unwrap();
        rec.new_run(&mut sim).unwrap();
        rec.run(&mut sim, 1.0).unwrap();
        rec.finalize().unwrap();
        let layout = rec.reconciliation().map(|r| r.layouts[0].local.clone());
        (rec.group_uid().map(String::from), layout)
    });
    let worker = out[1].as_ref().unwrap();
    assert_eq!(worker.0.as_deref(), Some("g"));
    assert_eq!(worker.1, Some(vec![1, 3]));

    let store = HierStore::open_read_only(&prefix).unwrap();
    let mut res = store.distributed_results("g").unwrap();
    assert_eq!(
        res[0].data(&Slice::All, &Slice::Index(-1), &Slice::All).unwrap(),
        vec![vec![vec![
            Value::Float(90.0),
            Value::Float(91.0),
            Value::Float(92.0),
            Value::Float(93.0)
        ]]]
    );
    assert_eq!(
        res[1].time(&Slice::All, &Slice::All).unwrap(),
        vec![vec![0.0, 0.5, 1.0]]
    );
}
