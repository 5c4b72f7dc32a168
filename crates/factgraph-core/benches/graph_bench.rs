//! # Graph Benchmarks
//!
//! Performance benchmarks for factgraph-core store and graph operations.
//!
//! Run with: `cargo bench -p factgraph-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use factgraph_core::{
    Clause, Data, FactStore, Filter, Graph, Pattern, StorageBackend, facts_of, sequential_ids,
};
use std::hint::black_box;

/// A list of `size` people, half of them with kind "admin".
fn people(size: usize) -> Data {
    Data::list((0..size).map(|i| {
        Data::map([
            ("name", Data::from(format!("person-{i}"))),
            ("age", Data::from(i as i64 % 90)),
            ("kind", Data::from(if i % 2 == 0 { "admin" } else { "user" })),
        ])
    }))
}

fn memory_graph(size: usize) -> Graph<StorageBackend> {
    let mut graph = Graph::open(None, sequential_ids()).expect("memory graph");
    graph.add(&people(size)).expect("add");
    graph
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_add(c: &mut Criterion) {
    let mut group = c.benchmark_group("add");

    for size in [100, 1000].iter() {
        let data = people(*size);
        group.bench_with_input(BenchmarkId::new("memory", size), &data, |b, data| {
            b.iter(|| {
                let mut graph = Graph::open(None, sequential_ids()).expect("memory graph");
                graph.add(data).expect("add");
                black_box(graph)
            });
        });

        group.bench_with_input(BenchmarkId::new("redb", size), &data, |b, data| {
            b.iter(|| {
                let temp = tempfile::tempdir().expect("temp dir");
                let mut graph =
                    Graph::open(Some(temp.path()), sequential_ids()).expect("redb graph");
                graph.add(data).expect("add");
                black_box(graph.len().expect("len"))
            });
        });
    }

    group.finish();
}

fn bench_matching(c: &mut Criterion) {
    let mut group = c.benchmark_group("matching");

    for size in [100, 1000].iter() {
        let temp = tempfile::tempdir().expect("temp dir");
        let mut redb = facts_of(Some(temp.path()), sequential_ids()).expect("redb store");
        let memory = memory_graph(*size);
        redb.add(&memory.store().facts().expect("facts")).expect("copy");

        let pattern = Pattern::any().attribute("kind").value("admin");
        group.bench_with_input(BenchmarkId::new("memory", size), &pattern, |b, pattern| {
            b.iter(|| black_box(memory.matching(pattern).expect("matching")));
        });
        group.bench_with_input(BenchmarkId::new("redb", size), &pattern, |b, pattern| {
            b.iter(|| black_box(redb.matching(pattern).expect("matching")));
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");

    for size in [100, 500].iter() {
        let graph = memory_graph(*size);
        let clauses = [
            Clause::new("?id", "kind", "admin"),
            Clause::new("?id", "name", "?name"),
        ];

        group.bench_with_input(BenchmarkId::from_parameter(size), &clauses, |b, clauses| {
            b.iter(|| black_box(graph.query(clauses).expect("query")));
        });
    }

    group.finish();
}

fn bench_find(c: &mut Criterion) {
    let mut group = c.benchmark_group("find");

    for size in [100, 500].iter() {
        let graph = memory_graph(*size);
        let filter = Filter::new().eq("kind", "user").has("age");

        group.bench_with_input(BenchmarkId::from_parameter(size), &filter, |b, filter| {
            b.iter(|| black_box(graph.find(filter).expect("find")));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_add, bench_matching, bench_query, bench_find);
criterion_main!(benches);
