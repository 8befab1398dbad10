//! Engine operation benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use invdb_bench::{generate_items, generate_tagged};
use invdb_core::predicate::matches;
use invdb_core::{labels, ListOptions, StoreError};
use invdb_testkit::{Item, Tagged, TestStore};

/// Benchmark single-row inserts, each in its own transaction.
fn bench_single_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("single_insert");
    group.throughput(Throughput::Elements(1));
    group.bench_function("item", |b| {
        let store = TestStore::new();
        let mut next = 1i64;
        b.iter(|| {
            let mut item = Item::new(next, "bench");
            store.insert(black_box(&mut item)).unwrap();
            next += 1;
        });
    });
    group.finish();
}

/// Benchmark batch inserts in one transaction.
fn bench_batch_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_insert");

    for batch_size in [10usize, 100, 1000].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let store = TestStore::new();
                let mut first = 1i64;
                b.iter(|| {
                    let items = generate_items(first, batch_size);
                    first += batch_size as i64;
                    store
                        .with(&["bench"], |tx| {
                            for item in items {
                                let mut item = item;
                                tx.insert(&mut item)?;
                            }
                            Ok::<_, StoreError>(())
                        })
                        .unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark listing with label matches.
fn bench_label_match(c: &mut Criterion) {
    let mut group = c.benchmark_group("label_match");

    for rows in [100usize, 1000].iter() {
        let store = TestStore::new();
        store
            .with(&[], |tx| {
                for mut tagged in generate_tagged(*rows) {
                    tx.insert(&mut tagged)?;
                }
                Ok::<_, StoreError>(())
            })
            .unwrap();

        group.bench_with_input(BenchmarkId::new("one_label", rows), rows, |b, _| {
            let options = ListOptions::new().predicate(matches(labels(&[("role", "web")])));
            b.iter(|| {
                let found = store.list::<Tagged>(black_box(&options)).unwrap();
                black_box(found);
            });
        });

        group.bench_with_input(BenchmarkId::new("two_labels", rows), rows, |b, _| {
            let options = ListOptions::new()
                .predicate(matches(labels(&[("role", "db"), ("env", "prod")])));
            b.iter(|| {
                let found = store.list::<Tagged>(black_box(&options)).unwrap();
                black_box(found);
            });
        });
    }
    group.finish();
}

/// Benchmark plain reads by primary key.
fn bench_get(c: &mut Criterion) {
    let store = TestStore::new();
    store
        .with(&[], |tx| {
            for mut item in generate_items(1, 1000) {
                tx.insert(&mut item)?;
            }
            Ok::<_, StoreError>(())
        })
        .unwrap();

    c.bench_function("get_pk", |b| {
        let mut id = 0i64;
        b.iter(|| {
            id = id % 1000 + 1;
            black_box(store.get_pk::<Item>(id).unwrap());
        });
    });
}

criterion_group!(
    benches,
    bench_single_insert,
    bench_batch_insert,
    bench_label_match,
    bench_get
);
criterion_main!(benches);
