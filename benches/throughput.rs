//! Throughput benchmarks for the console's hot paths: value decoding, write
//! planning, tree building and keyspace scanning against the embedded store.

use bytes::Bytes;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use keyscope::backend::MemoryClient;
use keyscope::codec::{decode, RawValue, ValueEnvelope, WritePlan};
use keyscope::scanner::{KeyDescriptor, KeyType, ScanCursor};
use keyscope::storage::StorageEngine;
use keyscope::{tree, Console};
use serde_json::json;
use std::sync::Arc;

/// Benchmark decoding of stored values
fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");

    let text: Vec<Bytes> = (0..1_000).map(|i| Bytes::from(format!("member-{}", i))).collect();
    let json_docs: Vec<Bytes> = (0..1_000)
        .map(|i| Bytes::from(format!(r#"{{"id":{},"tags":["a","b"]}}"#, i)))
        .collect();
    let binary: Vec<Bytes> = (0..1_000)
        .map(|i: u32| Bytes::from(i.to_le_bytes().repeat(16)))
        .collect();

    group.throughput(Throughput::Elements(1_000));
    for (name, items) in [("text", text), ("json", json_docs), ("binary", binary)] {
        group.bench_with_input(BenchmarkId::new("list", name), &items, |b, items| {
            b.iter(|| black_box(decode(RawValue::List(items.clone()))));
        });
    }

    group.finish();
}

/// Benchmark turning envelopes into write commands
fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");

    for size in [10usize, 1_000, 10_000] {
        let envelope = ValueEnvelope::Hash(
            (0..size)
                .map(|i| (format!("field:{}", i), json!({ "n": i })))
                .collect(),
        );
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("hash", size), &envelope, |b, envelope| {
            b.iter(|| black_box(WritePlan::for_envelope("bench", envelope, 60)));
        });
    }

    group.finish();
}

/// Benchmark namespace tree construction
fn bench_tree(c: &mut Criterion) {
    let mut group = c.benchmark_group("tree");

    for size in [100usize, 1_000, 10_000] {
        let keys: Vec<KeyDescriptor> = (0..size)
            .map(|i| {
                KeyDescriptor::new(
                    format!("tenant:{}:user:{}:session", i % 7, i),
                    KeyType::String,
                    -1,
                )
            })
            .collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("build", size), &keys, |b, keys| {
            b.iter(|| black_box(tree::build(keys)));
        });
    }

    group.finish();
}

/// Benchmark paging through the embedded store
fn bench_scan(c: &mut Criterion) {
    let storage = Arc::new(StorageEngine::new());
    for i in 0..10_000 {
        storage
            .set(0, Bytes::from(format!("user:{}", i)), Bytes::from("data"), None)
            .unwrap();
        storage
            .set(0, Bytes::from(format!("cache:{}", i)), Bytes::from("data"), None)
            .unwrap();
    }

    let mut group = c.benchmark_group("scan");

    group.bench_function("engine_page_100", |b| {
        b.iter(|| black_box(storage.scan(0, None, 100, None)));
    });

    let runtime = tokio::runtime::Builder::new_current_thread().build().unwrap();
    let console = Console::new();
    console.register("bench", MemoryClient::new(Arc::clone(&storage)));

    group.throughput(Throughput::Elements(100));
    group.bench_function("console_page_100", |b| {
        b.iter(|| {
            runtime.block_on(async {
                black_box(
                    console
                        .list_keys("bench", 0, &ScanCursor::start(), 100, Some("user:*"))
                        .await
                        .unwrap(),
                )
            })
        });
    });

    group.finish();
}

criterion_group!(benches, bench_decode, bench_plan, bench_tree, bench_scan);

criterion_main!(benches);
