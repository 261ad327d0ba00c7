use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use lifeline::{Tracked, WeakKeyMap, WeakSet, WeakValueMap};
use std::collections::HashMap;
use std::sync::Arc;

fn objects(n: usize) -> Vec<Tracked<usize>> {
    (0..n).map(Tracked::new).collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("weak_insert");

    for size in [100, 1_000] {
        group.bench_with_input(BenchmarkId::new("std_hash_map_arc", size), &size, |b, &size| {
            let items: Vec<Arc<usize>> = (0..size).map(Arc::new).collect();
            b.iter(|| {
                let mut map = HashMap::with_capacity(size);
                for item in &items {
                    map.insert(Arc::as_ptr(item) as usize, Arc::downgrade(item));
                }
                black_box(map.len())
            })
        });

        group.bench_with_input(BenchmarkId::new("weak_set", size), &size, |b, &size| {
            let items = objects(size);
            b.iter(|| {
                let mut set = WeakSet::with_capacity(size);
                for item in &items {
                    set.insert(item);
                }
                black_box(set.len())
            })
        });

        group.bench_with_input(BenchmarkId::new("weak_set_extend", size), &size, |b, &size| {
            let items = objects(size);
            b.iter(|| {
                let set: WeakSet<usize> = items.iter().collect();
                black_box(set.len())
            })
        });

        group.bench_with_input(BenchmarkId::new("weak_key_map", size), &size, |b, &size| {
            let items = objects(size);
            b.iter(|| {
                let mut map = WeakKeyMap::with_capacity(size);
                for item in &items {
                    map.insert(item, **item);
                }
                black_box(map.len())
            })
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("weak_lookup");
    let items = objects(1_000);

    let mut set = WeakSet::new();
    set.extend(&items);
    group.bench_function("weak_set_contains", |b| {
        b.iter(|| {
            for item in &items {
                black_box(set.contains(item));
            }
        })
    });

    let mut map = WeakValueMap::new();
    for item in &items {
        map.insert(**item, item);
    }
    group.bench_function("weak_value_map_get", |b| {
        b.iter(|| {
            for i in 0..items.len() {
                black_box(map.get(&i));
            }
        })
    });

    group.finish();
}

fn bench_release(c: &mut Criterion) {
    let mut group = c.benchmark_group("weak_release");

    group.bench_function("weak_set_prune_1000", |b| {
        b.iter_batched(
            || {
                let items = objects(1_000);
                let set: WeakSet<usize> = items.iter().collect();
                (set, items)
            },
            |(set, items)| {
                drop(items);
                black_box(set.len())
            },
            BatchSize::SmallInput,
        )
    });

    group.bench_function("untracked_release_1000", |b| {
        b.iter_batched(|| objects(1_000), drop, BatchSize::SmallInput)
    });

    group.finish();
}

criterion_group!(benches, bench_insert, bench_lookup, bench_release);
criterion_main!(benches);
