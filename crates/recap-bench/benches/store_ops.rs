//! Criterion micro-benchmarks for appending rows to backends.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recap_bench::reference_selectors;
use recap_core::{SelectorId, Value};
use recap_store::{
    Backend, FileBackend, FileConfig, GroupRequest, HierConfig, HierStore, MemoryBackend, Params,
    RunGroupStore,
};
use recap_test_utils::MockSimulation;

fn row(len: usize, t: f64) -> Vec<Value> {
    (0..len).map(|i| Value::Float(i as f64 + t)).collect()
}

/// Benchmark: 100 rows of a 12-column selector into memory.
fn bench_memory_save_100(c: &mut Criterion) {
    let sim = MockSimulation::new();
    let schema = reference_selectors(&sim).unwrap()[4].schema(SelectorId(0));
    let len = schema.len();

    c.bench_function("memory_save_100", |b| {
        b.iter(|| {
            let mut backend = MemoryBackend::new(schema.clone());
            backend.new_run().unwrap();
            for i in 0..100 {
                backend.save(i as f64, &row(len, i as f64)).unwrap();
            }
            black_box(backend.run_count().unwrap());
        });
    });
}

/// Benchmark: 100 rows of a 12-column selector into a binary file.
fn bench_file_save_100(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let sim = MockSimulation::new();
    let schema = reference_selectors(&sim).unwrap()[4].schema(SelectorId(0));
    let len = schema.len();
    let mut n = 0;

    c.bench_function("file_save_100", |b| {
        b.iter(|| {
            let path = dir.path().join(format!("sel{n}.bin"));
            n += 1;
            let mut backend = FileBackend::create(&path, schema.clone(), FileConfig::new()).unwrap();
            backend.new_run().unwrap();
            for i in 0..100 {
                backend.save(i as f64, &row(len, i as f64)).unwrap();
            }
            backend.finalize().unwrap();
        });
    });
}

/// Benchmark: 100 rows appended to one run of a hierarchical store.
fn bench_hier_save_100(c: &mut Criterion) {
    let dir = tempfile::tempdir().unwrap();
    let sim = MockSimulation::new();
    let schema = reference_selectors(&sim).unwrap()[4].schema(SelectorId(0));
    let len = schema.len();
    let mut store = HierStore::open(dir.path().join("res"), HierConfig::new()).unwrap();
    store
        .open_group(&GroupRequest::new(Some("bench".into()), Params::new(), vec![schema]))
        .unwrap();
    let mut backend = store.backend_for(SelectorId(0)).unwrap();

    c.bench_function("hier_save_100", |b| {
        b.iter(|| {
            backend.new_run().unwrap();
            for i in 0..100 {
                backend.save(i as f64, &row(len, i as f64)).unwrap();
            }
        });
    });
    backend.finalize().unwrap();
}

criterion_group!(
    benches,
    bench_memory_save_100,
    bench_file_save_100,
    bench_hier_save_100
);
criterion_main!(benches);
