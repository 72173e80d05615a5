#![allow(missing_docs)]
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use sharepool::{Conversion, MigrationMap, PMap, PVector, Persist, Sharepool, TypeCatalog};
use std::hint::black_box;

#[derive(Persist, Clone)]
struct Versions {
    history: PVector<PVector<u64>>,
    index: PMap<u64, u64>,
}

fn build_versions(count: usize) -> Versions {
    let mut current: PVector<u64> = (0..10_000).collect();
    let mut history = PVector::new();
    for i in 0..count {
        current = current.set(i * 97 % 10_000, i as u64).unwrap_or(current);
        history = history.push_back(current.clone());
    }
    Versions {
        history,
        index: (0..10_000u64).map(|i| (i, i * 2)).collect(),
    }
}

fn bench_save_load(c: &mut Criterion) {
    let catalog = TypeCatalog::discover::<Versions>();
    let mut group = c.benchmark_group("Shared Versions");

    for count in [10, 100] {
        let data = build_versions(count);
        let (bytes, _) = Sharepool::save(&data, &catalog).expect("Failed to save versions");

        group.bench_with_input(BenchmarkId::new("save", count), &data, |b, data| {
            b.iter(|| black_box(Sharepool::save(data, &catalog).expect("Failed to save")));
        });
        group.bench_with_input(BenchmarkId::new("load", count), &bytes, |b, bytes| {
            b.iter(|| {
                black_box(Sharepool::load::<Versions>(bytes, &catalog).expect("Failed to load"))
            });
        });
    }

    group.finish();
}

fn bench_convert(c: &mut Criterion) {
    let catalog = TypeCatalog::discover::<PVector<u64>>();
    let source: PVector<u64> = (0..100_000).collect();
    let pools = Sharepool::get_pools(&source, &catalog).expect("Failed to build pools");
    let map = MigrationMap::new().convert::<PVector<u64>, PVector<i64>, _>(|n, _| Ok(*n as i64));

    c.bench_function("convert_100k", |b| {
        b.iter(|| {
            let mut conversion = Conversion::new(&pools, &map);
            let converted: PVector<i64> = conversion
                .convert_container(&source)
                .expect("Failed to convert");
            black_box(converted)
        });
    });
}

criterion_group!(benches, bench_save_load, bench_convert);
criterion_main!(benches);
