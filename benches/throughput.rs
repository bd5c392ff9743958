//! Throughput Benchmark for keydeck
//!
//! Measures the accessor over the in-process store: single-key inspection
//! per shape, page hydration at different fan-out limits, the write
//! encoders, and raw pattern scans.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keydeck::store::MemoryStore;
use keydeck::{AccessorConfig, KeyAccessor, WriteRequest};
use serde_json::json;
use std::sync::Arc;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

/// One key of every shape, plus 1 000 `user:*` strings.
fn populated_store() -> Arc<MemoryStore> {
    let store = Arc::new(MemoryStore::new());
    store.set("small", Bytes::from("small_value"));
    store.set("large", Bytes::from("x".repeat(64 * 1024)));
    store
        .rpush("queue", (0..1_000).map(|i| Bytes::from(format!("job:{}", i))).collect())
        .unwrap();
    store
        .sadd("tags", (0..1_000).map(|i| Bytes::from(format!("tag:{}", i))).collect())
        .unwrap();
    store
        .hset(
            "profile",
            (0..100)
                .map(|i| (Bytes::from(format!("field:{}", i)), Bytes::from("value")))
                .collect(),
        )
        .unwrap();
    store
        .zadd(
            "board",
            (0..1_000).map(|i| (Bytes::from(format!("player:{}", i)), i as f64)).collect(),
        )
        .unwrap();
    for i in 0..1_000 {
        store.set(&format!("user:{:04}", i), Bytes::from("user_data"));
    }
    store
}

/// Benchmark resolve() for each shape
fn bench_resolve(c: &mut Criterion) {
    let rt = runtime();
    let accessor = KeyAccessor::new(populated_store());

    let mut group = c.benchmark_group("resolve");
    group.throughput(Throughput::Elements(1));

    for key in ["small", "large", "queue", "tags", "profile", "board", "missing"] {
        group.bench_with_input(BenchmarkId::from_parameter(key), key, |b, key| {
            b.iter(|| black_box(rt.block_on(accessor.resolve(key)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark page hydration at several fan-out limits
fn bench_list_page(c: &mut Criterion) {
    let rt = runtime();
    let store = populated_store();

    let mut group = c.benchmark_group("list_by_pattern");
    group.throughput(Throughput::Elements(100));

    for fanout in [1usize, 4, 16, 64] {
        let accessor = KeyAccessor::with_config(
            store.clone(),
            AccessorConfig::default().with_fanout_limit(fanout),
        );
        group.bench_with_input(BenchmarkId::new("page_100", fanout), &fanout, |b, _| {
            b.iter(|| black_box(rt.block_on(accessor.list_by_pattern("user:*", 3, 100)).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark the write encoders
fn bench_write(c: &mut Criterion) {
    let rt = runtime();
    let accessor = KeyAccessor::new(Arc::new(MemoryStore::new()));

    let mut group = c.benchmark_group("write");
    group.throughput(Throughput::Elements(1));

    let values = [
        ("text", json!("hello")),
        ("integer", json!(42)),
        ("toggle", json!(true)),
        ("json", json!({ "name": "ann", "tags": ["a", "b"] })),
        ("list_10", json!(["a", "b", "c", "d", "e", "f", "g", "h", "i", "j"])),
    ];

    for (name, value) in values {
        group.bench_function(name, |b| {
            let mut i = 0u64;
            b.iter(|| {
                let request = WriteRequest::infer(format!("key:{}", i % 1_000), value.clone(), None).unwrap();
                black_box(rt.block_on(accessor.write(request)).unwrap());
                i += 1;
            });
        });
    }

    group.finish();
}

/// Benchmark pattern scans on the store itself
fn bench_keys(c: &mut Criterion) {
    let store = populated_store();

    let mut group = c.benchmark_group("keys");

    group.bench_function("keys_pattern", |b| {
        b.iter(|| black_box(store.keys("user:*")));
    });

    group.bench_function("keys_all", |b| {
        b.iter(|| black_box(store.keys("*")));
    });

    group.finish();
}

criterion_group!(benches, bench_resolve, bench_list_page, bench_write, bench_keys);

criterion_main!(benches);
