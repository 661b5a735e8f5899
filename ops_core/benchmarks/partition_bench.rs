use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ops_core::batcher::partition;
use ops_core::geometry::coalesce_runs;
use ops_core::{BlockPos, Region};

fn bench_partition(c: &mut Criterion) {
    let mut group = c.benchmark_group("partition");
    let region = Region::new(BlockPos::new(0, 0, 0), BlockPos::new(499, 254, 499));

    for size in [4_096u64, 32_768] {
        group.bench_with_input(BenchmarkId::new("region_500x255x500", size), &size, |b, &size| {
            b.iter(|| partition(black_box(region), size).len());
        });
    }

    group.bench_function("coalesce_scattered_positions", |b| {
        let positions: Vec<BlockPos> = (0..64)
            .flat_map(|z| (0..64).filter(move |x| (x + z) % 5 != 0).map(move |x| BlockPos::new(x, 64, z)))
            .collect();
        b.iter(|| coalesce_runs(black_box(&positions)).len());
    });

    group.finish();
}

criterion_group!(partition_benches, bench_partition);
criterion_main!(partition_benches);
