//! # Graph Benchmarks
//!
//! Performance benchmarks for toposcrape-core graph operations.
//!
//! Run with: `cargo bench -p toposcrape-core`

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use toposcrape_core::{Entity, Graph, LinkOptions, NodeOptions, Query, Resource, Uid};

fn entity(i: usize) -> Entity {
    let kind = if i % 2 == 0 { "Pod" } else { "Service" };
    let resource = Resource::new(Uid::new(format!("r-{}", kind)), kind, "core", "v1", kind, true);
    let ns = if i % 3 == 0 { "prod" } else { "dev" };
    Entity::new(Uid::new(format!("u{}", i)), format!("e{}", i), ns, resource)
}

fn add_nodes(graph: &mut Graph, size: usize) {
    for i in 0..size {
        let node = graph.new_node(entity(i), NodeOptions::default());
        graph.add_node(node).expect("add");
    }
}

/// Create a graph with N nodes and edges between consecutive nodes.
fn create_linear_graph(size: usize) -> Graph {
    let mut graph = Graph::directed();
    add_nodes(&mut graph, size);
    for i in 1..size {
        let (from, to) = (Uid::new(format!("u{}", i - 1)), Uid::new(format!("u{}", i)));
        graph.link(&from, &to, LinkOptions::new()).expect("link");
    }
    graph
}

/// Create a graph with N nodes linked from a single hub.
fn create_star_graph(size: usize) -> Graph {
    let mut graph = Graph::directed();
    add_nodes(&mut graph, size);
    let hub = Uid::new("u0");
    for i in 1..size {
        graph
            .link(&hub, &Uid::new(format!("u{}", i)), LinkOptions::new())
            .expect("link");
    }
    graph
}

// =============================================================================
// BENCHMARKS
// =============================================================================

fn bench_node_insertion(c: &mut Criterion) {
    let mut group = c.benchmark_group("node_insertion");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let mut graph = Graph::directed();
                add_nodes(&mut graph, size);
                black_box(graph)
            });
        });
    }

    group.finish();
}

fn bench_link(c: &mut Criterion) {
    let mut group = c.benchmark_group("link");

    for size in [100, 1000, 10000].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| black_box(create_linear_graph(size)));
        });
    }

    group.finish();
}

fn bench_sub_graph(c: &mut Criterion) {
    let mut group = c.benchmark_group("sub_graph");
    let linear = create_linear_graph(1000);
    let star = create_star_graph(1000);
    let seed = Uid::new("u0");

    for depth in [1, 5, 10, 50].iter() {
        group.bench_with_input(BenchmarkId::new("linear", depth), depth, |b, &depth| {
            b.iter(|| black_box(linear.sub_graph(&seed, depth).expect("sub")));
        });
        group.bench_with_input(BenchmarkId::new("star", depth), depth, |b, &depth| {
            b.iter(|| black_box(star.sub_graph(&seed, depth).expect("sub")));
        });
    }

    group.finish();
}

fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("query");
    let graph = create_linear_graph(1000);

    group.bench_function("namespace", |b| {
        let q = Query::build().namespace("prod");
        b.iter(|| black_box(graph.query(&q).expect("query")));
    });
    group.bench_function("namespace_kind", |b| {
        let q = Query::build().namespace("prod").kind("Pod");
        b.iter(|| black_box(graph.query(&q).expect("query")));
    });
    group.bench_function("pinned_uid", |b| {
        let q = Query::build().uid("u500");
        b.iter(|| black_box(graph.query(&q).expect("query")));
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_node_insertion,
    bench_link,
    bench_sub_graph,
    bench_query
);
criterion_main!(benches);
