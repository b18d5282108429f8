//! Performance benchmarks for the serial and parallel copy engines

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use pertool::reshape::mapping::kloc_to_pool_index;
use pertool::reshape::{
    copy_parallel, copy_serial, scan_source_directory, ParallelOptions, SilentProgress,
};
use pertool::storage::default_store;
use pertool::testing::SourceFixture;
use std::hint::black_box;
use std::time::Duration;
use tempfile::TempDir;
use tokio::runtime::Runtime;

const NKPT: usize = 2_000;
const SOURCE_POOLS: usize = 8;

fn bench_mapping(c: &mut Criterion) {
    c.bench_function("kloc_to_pool_index", |b| {
        b.iter(|| {
            for i in 0..NKPT {
                black_box(kloc_to_pool_index(black_box(i), 7).unwrap());
            }
        })
    });
}

fn bench_copy(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let store = default_store();
    let src = TempDir::new().unwrap();
    SourceFixture::new("bench", NKPT, SOURCE_POOLS)
        .write(src.path(), store.as_ref())
        .unwrap();
    let source = scan_source_directory(src.path(), store.as_ref()).unwrap();

    let mut group = c.benchmark_group("reshape");
    group
        .warm_up_time(Duration::from_secs(1))
        .measurement_time(Duration::from_secs(5))
        .sample_size(10);

    for target_pools in [4, 16] {
        group.bench_with_input(
            BenchmarkId::new("serial", target_pools),
            &target_pools,
            |b, &pools| {
                b.iter_batched(
                    || TempDir::new().unwrap(),
                    |dst| {
                        copy_serial(&source, store.clone(), dst.path(), pools, &mut SilentProgress)
                            .unwrap();
                    },
                    BatchSize::PerIteration,
                );
            },
        );

        group.bench_with_input(
            BenchmarkId::new("parallel", target_pools),
            &target_pools,
            |b, &pools| {
                b.to_async(&rt).iter_batched(
                    || TempDir::new().unwrap(),
                    |dst| {
                        let source = source.clone();
                        let store = store.clone();
                        async move {
                            copy_parallel(
                                &source,
                                store,
                                dst.path(),
                                pools,
                                &ParallelOptions::default(),
                                &mut SilentProgress,
                            )
                            .await
                            .unwrap();
                        }
                    },
                    BatchSize::PerIteration,
                );
            },
        );
    }
    group.finish();
}

criterion_group!(benches, bench_mapping, bench_copy);
criterion_main!(benches);
