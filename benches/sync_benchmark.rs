/*!
 * Synchronization Benchmarks
 *
 * Lock acquisition cost, registry lookups and worker pool throughput
 */

use ai_os_sync::{
    from_fn, LockConfig, LockError, LockRegistry, Lockable, PoolConfig, ReentrantRwLock,
    WorkerPool,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

fn bench_uncontended_acquire(c: &mut Criterion) {
    let mut group = c.benchmark_group("uncontended_acquire");
    let lock = ReentrantRwLock::with_config(LockConfig::quiet());

    group.bench_function("shared", |b| {
        b.iter(|| {
            let handle = lock.acquire_shared();
            black_box(&handle);
        });
    });

    group.bench_function("exclusive", |b| {
        b.iter(|| {
            let handle = lock.acquire_exclusive().unwrap();
            black_box(&handle);
        });
    });

    group.bench_function("shared_upgradable", |b| {
        b.iter(|| {
            lock.shared_upgradable(
                || Ok::<_, LockError>(black_box(1u64)),
                |v| *v == 0,
                |v| Ok(v + 1),
            )
            .unwrap()
        });
    });

    group.finish();
}

fn bench_registry_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_get");

    group.bench_function("hit", |b| {
        let registry = LockRegistry::<u64, ReentrantRwLock>::with_default();
        let _held = registry.get(&1);
        b.iter(|| black_box(registry.get(&1)));
    });

    group.bench_function("rebuild", |b| {
        let registry = LockRegistry::<u64, ReentrantRwLock>::with_default();
        b.iter(|| black_box(registry.get(&1)));
    });

    group.finish();
}

fn bench_pool_throughput(c: &mut Criterion) {
    let mut group = c.benchmark_group("pool_throughput");
    let items = 10_000u64;
    group.throughput(Throughput::Elements(items));

    for threads in [1usize, 2, 4] {
        group.bench_with_input(BenchmarkId::from_parameter(threads), &threads, |b, &threads| {
            let sum = Arc::new(AtomicU64::new(0));
            let sink = sum.clone();
            let pool = WorkerPool::bounded(
                from_fn(move |item: &u64| {
                    sink.fetch_add(*item, Ordering::Relaxed);
                    Ok(())
                }),
                1024,
            );

            b.iter(|| {
                pool.start(PoolConfig::blocking(threads)).unwrap();
                for i in 0..items {
                    pool.add_work_item(i);
                }
                let report = pool.wait_for_completion();
                black_box(report.stats.processed)
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    bench_uncontended_acquire,
    bench_registry_get,
    bench_pool_throughput
);
criterion_main!(benches);
