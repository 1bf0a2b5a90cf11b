//! Criterion micro-benchmarks for selector evaluation and shared query plans.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recap_bench::reference_selectors;
use recap_core::{RunId, StateHint};
use recap_selector::{EvalContext, Schedule, Source, Timing};
use recap_test_utils::MockSimulation;

/// Schedule the reference selectors, either as one optimisation group or
/// one group per selector.
fn make_schedule(sim: &MockSimulation, shared: bool) -> Schedule {
    let sources: Vec<Source> = reference_selectors(sim)
        .unwrap()
        .into_iter()
        .map(Source::from)
        .collect();
    let mut schedule = Schedule::new();
    if shared {
        schedule.add_group(sources, Timing::Interval(1.0)).unwrap();
    } else {
        for s in sources {
            schedule.add_group(vec![s], Timing::Interval(1.0)).unwrap();
        }
    }
    schedule
}

/// Benchmark: one save event, every leaf path queried once.
fn bench_collect_shared_plan(c: &mut Criterion) {
    let sim = MockSimulation::new();
    let mut schedule = make_schedule(&sim, true);
    let mut event = 0;

    c.bench_function("collect_shared_plan", |b| {
        b.iter(|| {
            schedule.reset();
            let mut ctx = EvalContext::new(&sim, StateHint::new(RunId(0), event));
            event += 1;
            black_box(schedule.collect_due(&mut ctx, 0.0, 1e-10).unwrap());
        });
    });
}

/// Benchmark: one save event with a plan per selector.
fn bench_collect_separate_plans(c: &mut Criterion) {
    let sim = MockSimulation::new();
    let mut schedule = make_schedule(&sim, false);
    let mut event = 0;

    c.bench_function("collect_separate_plans", |b| {
        b.iter(|| {
            schedule.reset();
            let mut ctx = EvalContext::new(&sim, StateHint::new(RunId(0), event));
            event += 1;
            black_box(schedule.collect_due(&mut ctx, 0.0, 1e-10).unwrap());
        });
    });
}

/// Benchmark: build the reference selectors, labels and metadata included.
fn bench_build_selectors(c: &mut Criterion) {
    let sim = MockSimulation::new();

    c.bench_function("build_reference_selectors", |b| {
        b.iter(|| {
            black_box(reference_selectors(&sim).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_collect_shared_plan,
    bench_collect_separate_plans,
    bench_build_selectors
);
criterion_main!(benches);
