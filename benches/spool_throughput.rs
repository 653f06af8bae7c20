//! Benchmarks for submit-to-completion throughput of the bounded-FD store.
//!
//! Two shapes: a hot set that fits the budget (no eviction on the steady
//! path) and a hot set one larger than the budget (worst-case open/close
//! churn).

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use fdspool::{Spool, SpoolConfig};

const OPS_PER_ITER: u64 = 256;

fn bench_hot_set_within_budget(c: &mut Criterion) {
    let mut group = c.benchmark_group("hot_set_within_budget");
    group.throughput(Throughput::Elements(OPS_PER_ITER));

    for workers in [1usize, 4, 8] {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(SpoolConfig::new(dir.path(), 16)).unwrap();
        let handles: Vec<_> = (0..workers)
            .map(|i| spool.storage_for(&format!("hot{i}")).unwrap())
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(workers),
            &handles,
            |b, handles| {
                b.iter(|| {
                    let mut tickets = Vec::with_capacity(OPS_PER_ITER as usize);
                    for i in 0..OPS_PER_ITER {
                        let handle = &handles[(i % handles.len() as u64) as usize];
                        tickets.push(handle.write(i * 8, vec![0u8; 8]).unwrap());
                    }
                    for ticket in tickets {
                        ticket.wait().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

fn bench_thrash_budget_plus_one(c: &mut Criterion) {
    let mut group = c.benchmark_group("thrash_budget_plus_one");
    group.throughput(Throughput::Elements(OPS_PER_ITER));
    group.sample_size(10);

    for budget in [1usize, 2, 4] {
        let dir = tempfile::tempdir().unwrap();
        let spool = Spool::open(SpoolConfig::new(dir.path(), budget)).unwrap();
        let handles: Vec<_> = (0..=budget)
            .map(|i| spool.storage_for(&format!("churn{i}")).unwrap())
            .collect();

        group.bench_with_input(
            BenchmarkId::from_parameter(budget),
            &handles,
            |b, handles| {
                b.iter(|| {
                    for i in 0..OPS_PER_ITER {
                        let handle = &handles[(i % handles.len() as u64) as usize];
                        handle.write(0, vec![0u8; 8]).unwrap().wait().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_hot_set_within_budget,
    bench_thrash_budget_plus_one
);
criterion_main!(benches);
