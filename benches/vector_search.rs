use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, SamplingMode, Throughput};
use rand::{rngs::StdRng, Rng, SeedableRng};

use vdms::descriptors::{new_engine, DescriptorEngine, DistanceMetric, EngineKind};

fn gen_data(n: usize, dim: usize, seed: u64) -> Vec<f32> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut v = vec![0f32; n * dim];
    for x in v.iter_mut() {
        *x = rng.gen::<f32>();
    }
    v
}

fn bench_descriptor_search(c: &mut Criterion) {
    let ns = [1_000usize, 10_000usize];
    let dims = [64usize, 256usize];
    let k = 10usize;

    let mut group = c.benchmark_group("descriptor_search_l2");
    group.sampling_mode(SamplingMode::Flat);
    group.sample_size(20);

    for &n in &ns {
        for &dim in &dims {
            let data = gen_data(n, dim, 0xDE5C_10FF);
            let query = gen_data(1, dim, 0xDE5C_20FF);

            let mut flat = new_engine(EngineKind::FaissFlat, dim as u32, DistanceMetric::L2).unwrap();
            flat.add(&data, n, None).unwrap();

            group.throughput(Throughput::Elements(k as u64));
            group.bench_with_input(BenchmarkId::new("flat", format!("n{n}_d{dim}_k{k}")), &(), |b, _| {
                b.iter(|| {
                    let _ = flat.search(&query, 1, k).unwrap();
                });
            });

            let mut ivf = new_engine(EngineKind::FaissIvfFlat, dim as u32, DistanceMetric::L2).unwrap();
            ivf.train(Some(&data)).unwrap();
            ivf.add(&data, n, None).unwrap();
            group.bench_with_input(BenchmarkId::new("ivf_flat", format!("n{n}_d{dim}_k{k}")), &(), |b, _| {
                b.iter(|| {
                    let _ = ivf.search(&query, 1, k).unwrap();
                });
            });
        }
    }

    group.finish();
}

criterion_group!(benches, bench_descriptor_search);
criterion_main!(benches);
