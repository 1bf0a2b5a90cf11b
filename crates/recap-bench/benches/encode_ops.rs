//! Criterion micro-benchmarks for the nested-value encoder.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use recap_bench::nested_value;
use recap_encode::{Encoder, EncoderConfig, VecStorage};

/// Benchmark: write a fresh depth-3 value into an empty store.
fn bench_encode_write_uncached(c: &mut Criterion) {
    let value = nested_value(3, 6);

    c.bench_function("encode_write_uncached", |b| {
        b.iter(|| {
            let mut enc = Encoder::open(VecStorage::new(), EncoderConfig::uncached());
            black_box(enc.write(&value).unwrap());
        });
    });
}

/// Benchmark: rewrite a value already in the cache.
fn bench_encode_write_cached_hit(c: &mut Criterion) {
    let value = nested_value(3, 6);
    let mut enc = Encoder::open(VecStorage::new(), EncoderConfig::new());
    enc.write(&value).unwrap();

    c.bench_function("encode_write_cached_hit", |b| {
        b.iter(|| {
            black_box(enc.write(black_box(&value)).unwrap());
        });
    });
}

/// Benchmark: rebuild a depth-3 value from its handle.
fn bench_encode_read(c: &mut Criterion) {
    let value = nested_value(3, 6);
    let mut enc = Encoder::open(VecStorage::new(), EncoderConfig::new());
    let handle = enc.write(&value).unwrap();

    c.bench_function("encode_read", |b| {
        b.iter(|| {
            black_box(enc.read(black_box(handle)));
        });
    });
}

/// Benchmark: reopen a populated store, replaying every record into the cache.
fn bench_encode_reopen(c: &mut Criterion) {
    let mut enc = Encoder::open(VecStorage::new(), EncoderConfig::new());
    for depth in 0..4 {
        for width in 1..8 {
            enc.write(&nested_value(depth, width)).unwrap();
        }
    }
    let storage = enc.into_storage();

    c.bench_function("encode_reopen", |b| {
        b.iter(|| {
            let enc = Encoder::open(storage.clone(), EncoderConfig::new());
            black_box(enc.storage());
        });
    });
}

criterion_group!(
    benches,
    bench_encode_write_uncached,
    bench_encode_write_cached_hit,
    bench_encode_read,
    bench_encode_reopen
);
criterion_main!(benches);
