use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode};
use rand::{rngs::StdRng, Rng, SeedableRng};
use serde_json::json;

use vdms::graph::adapter;
use vdms::graph::builder::QueryBuilder;
use vdms::graph::engine::GraphEngine;

fn seed_engine(n: usize, seed: u64) -> GraphEngine {
    let mut rng = StdRng::seed_from_u64(seed);
    let engine = GraphEngine::new();
    let mut builder = QueryBuilder::new();
    for i in 0..n {
        let age: i64 = rng.gen_range(0..100);
        builder.add_node(i as i64, "Person".to_string(), &json!({"Age": age, "Seq": i as i64}), &serde_json::Value::Null).unwrap();
    }
    adapter::run(&engine, builder.into_groups());
    engine
}

fn bench_graph_query(c: &mut Criterion) {
    let ns = [10_000usize, 50_000usize];
    let mut group = c.benchmark_group("graph_query");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &n in &ns {
        let engine = seed_engine(n, 0xC0DE_10FF);

        group.bench_with_input(BenchmarkId::new("find_by_equality", n), &n, |b, _| {
            b.iter(|| {
                let mut builder = QueryBuilder::new();
                builder
                    .query_node(
                        0,
                        Some("Person".to_string()),
                        &serde_json::Value::Null,
                        &json!({"Seq": ["==", (n / 2) as i64]}),
                        &json!({"count": true}),
                        false,
                    )
                    .unwrap();
                let _ = adapter::run(&engine, builder.into_groups());
            });
        });

        group.bench_with_input(BenchmarkId::new("range_scan", n), &n, |b, _| {
            b.iter(|| {
                let mut builder = QueryBuilder::new();
                builder
                    .query_node(0, Some("Person".to_string()), &serde_json::Value::Null, &json!({"Age": [">=", 20, "<", 30]}), &json!({"count": true}), false)
                    .unwrap();
                let _ = adapter::run(&engine, builder.into_groups());
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_graph_query);
criterion_main!(benches);
