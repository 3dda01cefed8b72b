//! Benchmarks for observed collection mutations.
//!
//! Run with: `cargo bench --package ftui-observation --bench collection_bench`
//!
//! # Performance Baselines
//!
//! These benchmarks establish baselines for:
//! - Array push/pop with and without a subscriber attached
//! - Splice in the middle of a large array
//! - Batched mutation merging into one index map
//! - Map set / delete throughput

use std::cell::Cell;
use std::hint::black_box;
use std::rc::Rc;

use criterion::{BenchmarkId, Criterion, Throughput, criterion_group, criterion_main};
use ftui_observation::{ArrayRef, LifecycleFlags, MapRef, ObserverLocator, batch};

const SIZES: [usize; 3] = [100, 1_000, 10_000];

fn filled(len: usize) -> ArrayRef {
    ArrayRef::from_iter((0..len).map(|i| i as f64))
}

// ============================================================================
// Array Benchmarks
// ============================================================================

fn bench_array_push(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_push");

    for size in SIZES {
        group.throughput(Throughput::Elements(size as u64));

        group.bench_with_input(BenchmarkId::new("unobserved", size), &size, |b, &size| {
            b.iter(|| {
                let array = ArrayRef::new();
                for i in 0..size {
                    array.push(i as f64);
                }
                black_box(array.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("observed", size), &size, |b, &size| {
            let locator = ObserverLocator::new();
            b.iter(|| {
                let array = ArrayRef::new();
                let hits = Rc::new(Cell::new(0usize));
                let h = Rc::clone(&hits);
                let _guard = locator
                    .get_array_observer(LifecycleFlags::empty(), &array)
                    .subscribe_fn(move |map, _| h.set(h.get() + map.len()));
                for i in 0..size {
                    array.push(i as f64);
                }
                black_box(hits.get())
            });
        });

        group.bench_with_input(BenchmarkId::new("batched", size), &size, |b, &size| {
            let locator = ObserverLocator::new();
            b.iter(|| {
                let array = ArrayRef::new();
                let _guard = locator
                    .get_array_observer(LifecycleFlags::empty(), &array)
                    .subscribe_fn(|map, _| {
                        black_box(map.inserted().count());
                    });
                batch(|| {
                    for i in 0..size {
                        array.push(i as f64);
                    }
                });
                black_box(array.len())
            });
        });
    }

    group.finish();
}

fn bench_array_splice(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_splice");
    let locator = ObserverLocator::new();

    for size in SIZES {
        group.bench_with_input(BenchmarkId::new("middle", size), &size, |b, &size| {
            let array = filled(size);
            let _guard = locator
                .get_array_observer(LifecycleFlags::empty(), &array)
                .subscribe_fn(|map, _| {
                    black_box(map.deleted().len());
                });
            let middle = (size / 2) as isize;
            b.iter(|| {
                let removed = array.splice(middle, Some(2), [-1.0, -2.0]);
                black_box(removed)
            });
        });
    }

    group.finish();
}

fn bench_array_sort(c: &mut Criterion) {
    let mut group = c.benchmark_group("array_sort");
    let locator = ObserverLocator::new();

    for size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("reverse_then_sort", size), &size, |b, &size| {
            let array = filled(size);
            let _guard = locator
                .get_array_observer(LifecycleFlags::empty(), &array)
                .subscribe_fn(|map, _| {
                    black_box(map.is_identity());
                });
            b.iter(|| {
                array.reverse();
                array.sort_by(|a, b| {
                    a.as_number()
                        .unwrap_or_default()
                        .total_cmp(&b.as_number().unwrap_or_default())
                });
            });
        });
    }

    group.finish();
}

// ============================================================================
// Map Benchmarks
// ============================================================================

fn bench_map_set_delete(c: &mut Criterion) {
    let mut group = c.benchmark_group("map_set_delete");
    let locator = ObserverLocator::new();

    for size in SIZES {
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(BenchmarkId::new("observed", size), &size, |b, &size| {
            let map = MapRef::new();
            let _guard = locator
                .get_map_observer(LifecycleFlags::empty(), &map)
                .subscribe_fn(|index_map, _| {
                    black_box(index_map.keys().len());
                });
            b.iter(|| {
                for i in 0..size {
                    map.set(format!("key-{i}").as_str(), i as f64);
                }
                for i in 0..size {
                    map.delete(format!("key-{i}").as_str());
                }
                black_box(map.len())
            });
        });
    }

    group.finish();
}

// ============================================================================
// Criterion Configuration
// ============================================================================

criterion_group!(
    benches,
    bench_array_push,
    bench_array_splice,
    bench_array_sort,
    bench_map_set_delete,
);

criterion_main!(benches);
