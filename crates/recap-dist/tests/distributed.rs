//! Two ranks on threads save a partitioned selector, then a single reader
//! merges their files.

use recap_core::{path, ProcessContext, Rank, RunId, SelectorId, Simulation, StateHint, Value};
use recap_dist::{reconcile, DistributedResults, Reconciliation, ThreadGroup};
use recap_selector::{EvalContext, Schedule, Selector, Timing};
use recap_store::{GroupRequest, HierConfig, HierStore, Params, RunGroupStore, Slice};
use recap_test_utils::MockSimulation;

fn tets(sim: &MockSimulation) -> Selector {
    let ids = (0..4i64).map(Value::from).collect();
    Selector::leaf(sim, path().call("TETS", ids).member("A").terminal("Count")).unwrap()
}

fn save_rank(ctx: ProcessContext, prefix: &std::path::Path) -> Reconciliation {
    let sim = MockSimulation::new().with_partition(ctx.rank().0, ctx.size() as u32);
    let mut schedule = Schedule::new();
    let total = Selector::sum(&tets(&sim));
    schedule
        .add_group(vec![tets(&sim).into(), total.into()], Timing::Interval(1.0))
        .unwrap();
    let rec = reconcile(&mut schedule, &sim, &ctx).unwrap();

    let schemas = schedule
        .entries()
        .iter()
        .filter(|e| e.present)
        .map(|e| e.source.header().schema(e.id))
        .collect();
    let mut store = HierStore::open(prefix, HierConfig::new()).unwrap();
    let request = GroupRequest {
        uid: Some("g".into()),
        params: Params::new(),
        schemas,
        rank: ctx.rank(),
        layout: rec.group_layout(ctx.size()),
    };
    store.open_group(&request).unwrap();

    let mut eval = EvalContext::new(&sim, StateHint::new(RunId(0), 0));
    let rows = schedule.collect_due(&mut eval, sim.time(), 1e-10).unwrap();
    for (id, values) in rows {
        let mut b = store.backend_for(id).unwrap();
        b.new_run().unwrap();
        let row: Vec<Value> = values.into_iter().map(Value::Float).collect();
        b.save(0.0, &row).unwrap();
        b.finalize().unwrap();
    }
    store.finalize().unwrap();
    rec
}

#[test]
fn ranks_save_and_reader_merges() {
    let dir = tempfile::tempdir().unwrap();
    let prefix = dir.path().join("res");
    let out = ThreadGroup::run(2, |ctx| save_rank(ctx, &prefix));
    let coordinator = out[0].as_ref().unwrap();
    let worker = out[1].as_ref().unwrap();

    // Rank 1 owns odd tets and none of the aggregate.
    assert_eq!(worker.layouts.len(), 1);
    assert_eq!(worker.layouts[0].local, vec![1, 3]);
    assert!(worker.maps.is_none());
    let map = coordinator.map(SelectorId(0)).unwrap();
    assert_eq!(map.ranks(), &[0, 1, 0, 1]);
    assert_eq!(map.locals(), &[0, 0, 1, 1]);
    assert_eq!(coordinator.map(SelectorId(1)).unwrap().owner(0), Some((Rank(0), 0)));

    let store = HierStore::open_read_only(&prefix).unwrap();
    let mut res = store.distributed_results("g").unwrap();
    assert_eq!(res.len(), 2);
    assert_eq!(res[0].labels().unwrap().len(), 4);
    assert_eq!(
        res[0].data(&Slice::All, &Slice::All, &Slice::All).unwrap(),
        vec![vec![vec![
            Value::Float(100.0),
            Value::Float(101.0),
            Value::Float(102.0),
            Value::Float(103.0)
        ]]]
    );
    assert_eq!(
        res[0].data(&Slice::All, &Slice::All, &Slice::List(vec![3, 0])).unwrap(),
        vec![vec![vec![Value::Float(103.0), Value::Float(100.0)]]]
    );
    assert_eq!(
        res[1].data(&Slice::All, &Slice::All, &Slice::All).unwrap(),
        vec![vec![vec![Value::Float(406.0)]]]
    );
    assert_eq!(res[1].time(&Slice::All, &Slice::All).unwrap(), vec![vec![0.0]]);
}
