use burst_clustering::clustering::{Dbscan, KdTree, Point};
use burst_clustering::engine::ClusteringAlgorithm;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Blobs around a few centres plus a sprinkling of outliers, deterministic
fn create_blobs(count: usize) -> Vec<Point> {
    let centres = [(0.2, 0.2), (0.8, 0.3), (0.5, 0.8)];
    let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
    let mut next = move || {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        (state >> 11) as f64 / (1u64 << 53) as f64
    };

    (0..count)
        .map(|i| {
            if i % 20 == 0 {
                Point::new(vec![next(), next()])
            } else {
                let (cx, cy) = centres[i % centres.len()];
                Point::new(vec![cx + (next() - 0.5) * 0.1, cy + (next() - 0.5) * 0.1])
            }
        })
        .collect()
}

fn bench_kdtree_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("kdtree_build");

    for size in [1_000, 10_000, 50_000].iter() {
        let points = create_blobs(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(KdTree::build(&points).unwrap()));
        });
    }

    group.finish();
}

fn bench_dbscan(c: &mut Criterion) {
    let mut group = c.benchmark_group("dbscan");
    let dbscan = Dbscan::new(0.02, 10).unwrap();

    for size in [1_000, 10_000, 50_000].iter() {
        let points = create_blobs(*size);
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| black_box(dbscan.run(&points).unwrap()));
        });
    }

    group.finish();
}

fn bench_k_distance(c: &mut Criterion) {
    let points = create_blobs(10_000);
    c.bench_function("k_distance_profile_1_to_10", |b| {
        b.iter(|| black_box(Dbscan::k_distance_profile(&points, 1, 10).unwrap()));
    });
}

criterion_group!(benches, bench_kdtree_build, bench_dbscan, bench_k_distance);
criterion_main!(benches);
