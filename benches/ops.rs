//! Insert, lookup, and erase on both table layers against `std::collections::HashMap`.

use chainmap::{ChainedMap, TinyMap};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::collections::HashMap;

fn generate_keys(n: usize, stride: u16) -> Vec<u16> {
    (0..n).map(|i| (i as u16).wrapping_mul(stride)).collect()
}

fn bench_insert(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert");

    for size in [64, 234] {
        let keys = generate_keys(size, 7);

        group.bench_with_input(BenchmarkId::new("TinyMap", size), &keys, |b, keys| {
            b.iter(|| {
                let mut map: TinyMap<u16, u32> = TinyMap::new();
                for (i, &key) in keys.iter().enumerate() {
                    let _ = map.insert(key, i as u32);
                }
                black_box(map)
            });
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &keys, |b, keys| {
            b.iter(|| {
                let mut map: HashMap<u16, u32> = HashMap::new();
                for (i, &key) in keys.iter().enumerate() {
                    map.insert(key, i as u32);
                }
                black_box(map)
            });
        });
    }

    for size in [1_000, 8_000] {
        let keys = generate_keys(size, 7);

        group.bench_with_input(BenchmarkId::new("ChainedMap", size), &keys, |b, keys| {
            b.iter(|| {
                let mut map: ChainedMap<u16, u32> = ChainedMap::new();
                for (i, &key) in keys.iter().enumerate() {
                    let _ = map.insert(key, i as u32);
                }
                black_box(map)
            });
        });

        group.bench_with_input(BenchmarkId::new("HashMap", size), &keys, |b, keys| {
            b.iter(|| {
                let mut map: HashMap<u16, u32> = HashMap::new();
                for (i, &key) in keys.iter().enumerate() {
                    map.insert(key, i as u32);
                }
                black_box(map)
            });
        });
    }

    group.finish();
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("lookup");

    let keys = generate_keys(234, 7);
    let mut tiny: TinyMap<u16, u32> = TinyMap::new();
    for (i, &key) in keys.iter().enumerate() {
        let _ = tiny.insert(key, i as u32);
    }
    group.bench_function("TinyMap/234", |b| {
        b.iter(|| {
            let mut sum = 0u32;
            for key in keys.iter() {
                if let Some(v) = tiny.get(key) {
                    sum = sum.wrapping_add(*v);
                }
            }
            black_box(sum)
        });
    });

    let keys = generate_keys(8_000, 7);
    let mut chained: ChainedMap<u16, u32> = ChainedMap::new();
    for (i, &key) in keys.iter().enumerate() {
        let _ = chained.insert(key, i as u32);
    }
    group.bench_function("ChainedMap/8000", |b| {
        b.iter(|| {
            let mut sum = 0u32;
            for key in keys.iter() {
                if let Some(v) = chained.get(key) {
                    sum = sum.wrapping_add(*v);
                }
            }
            black_box(sum)
        });
    });

    group.finish();
}

fn bench_erase(c: &mut Criterion) {
    let mut group = c.benchmark_group("erase");

    let keys = generate_keys(8_000, 7);
    let mut base: ChainedMap<u16, u32> = ChainedMap::new();
    for (i, &key) in keys.iter().enumerate() {
        let _ = base.insert(key, i as u32);
    }
    group.bench_function("ChainedMap/8000", |b| {
        b.iter(|| {
            let mut map = base.clone();
            for key in keys.iter() {
                map.erase(key);
            }
            black_box(map.fit())
        });
    });

    group.finish();
}

fn bench_set_fullness(c: &mut Criterion) {
    let keys = generate_keys(4_000, 7);
    let mut base: ChainedMap<u16, u32> = ChainedMap::new();
    for (i, &key) in keys.iter().enumerate() {
        let _ = base.insert(key, i as u32);
    }
    c.bench_function("set_fullness/4000", |b| {
        b.iter(|| {
            let mut map = base.clone();
            black_box(map.set_fullness(60))
        });
    });
}

criterion_group!(
    benches,
    bench_insert,
    bench_lookup,
    bench_erase,
    bench_set_fullness
);
criterion_main!(benches);
