//! Evaluation of selector trees against the mock simulation.

use recap_core::{path, RunId, Simulation, StateHint, Value};
use recap_selector::{EvalContext, EvalPlan, Selector, SelectorError};
use recap_test_utils::MockSimulation;

fn count(sim: &MockSimulation, region: &str, species: &str) -> Selector {
    Selector::leaf(sim, path().member(region).member(species).terminal("Count")).unwrap()
}

fn tets(sim: &MockSimulation, species: &str) -> Selector {
    let ids = (0..4).map(Value::from).collect();
    Selector::leaf(sim, path().call("TETS", ids).member(species).terminal("Count")).unwrap()
}

#[test]
fn join_concatenates_lengths_and_values() {
    let mut sim = MockSimulation::new();
    sim.new_run().unwrap();
    sim.advance_to(0.5).unwrap();
    let parts = vec![
        count(&sim, "comp1", "A"),
        tets(&sim, "B"),
        Selector::sum(&tets(&sim, "A")),
    ];
    let joined = Selector::join(&parts).unwrap();
    assert_eq!(joined.len(), parts.iter().map(Selector::len).sum::<usize>());

    let mut ctx = EvalContext::new(&sim, StateHint::new(RunId(0), 1));
    let expected: Vec<f64> = parts
        .iter()
        .flat_map(|p| p.evaluate(&mut ctx).unwrap())
        .collect();
    assert_eq!(joined.evaluate(&mut ctx).unwrap(), expected);
    assert_eq!(joined.labels()[0], "comp1.A.Count");
    assert_eq!(joined.labels()[5], "SUM(TETS(0, 1, 2, 3).A.Count)");
}

#[test]
fn plan_queries_each_path_once() {
    let sim = MockSimulation::new();
    let a = count(&sim, "comp1", "A");
    let b = count(&sim, "comp1", "B");
    let ratio = a.div(&b).unwrap();
    let total = a.add(&b).unwrap().mul(0.5).unwrap();
    let selectors = vec![a.clone(), ratio, total, Selector::join(&[a, b]).unwrap()];

    let plan = EvalPlan::compile(&selectors);
    assert_eq!(plan.len(), 2);

    let mut ctx = EvalContext::new(&sim, StateHint::new(RunId(0), 0));
    let rows = plan.execute(&mut ctx, &selectors).unwrap();
    assert_eq!(ctx.queries(), 2);
    assert_eq!(sim.queries(), 2);
    assert_eq!(rows[1], vec![100.0 / 1.0]);
    assert_eq!(rows[2], vec![(100.0 + 1.0) * 0.5]);
    assert_eq!(rows[3], vec![100.0, 1.0]);
}

#[test]
fn nested_combinations_keep_metadata_consistent() {
    let sim = MockSimulation::new();
    let diff = tets(&sim, "A").sub(&tets(&sim, "B")).unwrap();
    assert_eq!(diff.len(), 4);
    assert_eq!(diff.metadata()["loc_type"], vec![Value::from("tet"); 4]);
    assert_eq!(diff.metadata()["property"], vec![Value::from("Count"); 4]);
    assert_eq!(
        diff.value_names()[0].as_deref(),
        Some("(A.Count - B.Count)")
    );

    let mixed = tets(&sim, "A").add(&count(&sim, "comp1", "A")).unwrap();
    // comp1 is not a tet: aligned loc_type values differ everywhere.
    assert!(!mixed.metadata().contains_key("loc_type"));
    assert!(mixed.metadata().contains_key("property"));
}

#[test]
fn unknown_paths_surface_simulation_errors() {
    let sim = MockSimulation::new();
    let err = Selector::leaf(&sim, path().member("comp9").member("A").terminal("Count"))
        .unwrap_err();
    assert!(matches!(err, SelectorError::Sim(_)));
}

#[test]
fn user_labels_and_description() {
    let sim = MockSimulation::new();
    let mut s = tets(&sim, "A");
    s.set_description("A in the first tets").unwrap();
    assert!(s.set_labels(vec!["x".into()]).is_err());
    s.set_labels((0..4).map(|i| format!("tet{i}.A")).collect())
        .unwrap();
    assert_eq!(s.value_names()[2].as_deref(), Some("A"));
    let sum = Selector::sum(&s);
    assert_eq!(sum.description(), "SUM(A in the first tets)");
}
