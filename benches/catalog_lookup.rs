//! Benchmarks for catalog lookups and relation decoding

use catalog_engine::{
    BomPart, Catalog, CatalogBuilder, Color, Item, ItemType, SnapshotReader, SnapshotWriter,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::Rng;

const COLORS: u32 = 40;

/// `parts` parts and one set per 50 parts, each set holding 50 distinct parts
fn build_catalog(parts: u32) -> Catalog {
    let mut b = CatalogBuilder::new()
        .item_type(ItemType::new('P', "Part").with_colors(true))
        .item_type(ItemType::new('S', "Set").with_inventories(true));
    for c in 0..COLORS {
        b = b.color(Color::new(c + 1, format!("Color {}", c)));
    }
    for n in 0..parts {
        b = b.item(Item::new('P', format!("{}", 3000 + n), format!("Part {}", n)));
    }
    for s in 0..parts / 50 {
        let id = format!("{}-1", s);
        b = b.item(Item::new('S', id.clone(), format!("Set {}", s)));
        let bom = (0..50)
            .map(|k| {
                let part = s * 50 + k;
                BomPart::new(1 + (k as u16 % 8), 'P', format!("{}", 3000 + part), 1 + part % COLORS)
            })
            .collect();
        b = b.consists_of('S', id, bom);
    }
    b.build().unwrap()
}

fn benchmark_item_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("catalog_item_lookup");

    for size in [1_000u32, 10_000, 100_000].iter() {
        let catalog = build_catalog(*size);
        let ids: Vec<String> = {
            let mut rng = rand::thread_rng();
            (0..1000)
                .map(|_| format!("{}", 3000 + rng.gen_range(0..*size)))
                .collect()
        };

        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, _| {
            b.iter(|| {
                for id in &ids {
                    black_box(catalog.item('P', id));
                }
            });
        });
    }

    group.finish();
}

fn benchmark_consists_of(c: &mut Criterion) {
    let catalog = build_catalog(10_000);
    let set = catalog.item('S', "17-1").unwrap();

    c.bench_function("catalog_consists_of", |b| {
        b.iter(|| black_box(catalog.consists_of(black_box(set)).len()));
    });
}

fn benchmark_appears_in(c: &mut Criterion) {
    let catalog = build_catalog(10_000);
    let part = catalog.item('P', "3850").unwrap();
    let color = catalog.default_color_of(part).or_else(|| catalog.color(11));

    let mut group = c.benchmark_group("catalog_appears_in");
    group.bench_function("all_colors", |b| {
        b.iter(|| black_box(catalog.appears_in(black_box(part), None).len()));
    });
    group.bench_function("one_color", |b| {
        b.iter(|| black_box(catalog.appears_in(black_box(part), color).len()));
    });
    group.finish();
}

fn benchmark_snapshot(c: &mut Criterion) {
    let catalog = build_catalog(10_000);
    let mut group = c.benchmark_group("catalog_snapshot");

    for compress in [false, true] {
        let writer = SnapshotWriter::new().compress(compress);
        let bytes = writer.to_bytes(&catalog).unwrap();
        let name = if compress { "lz4" } else { "plain" };

        group.bench_function(format!("write_{}", name), |b| {
            b.iter(|| black_box(writer.to_bytes(&catalog).unwrap().len()));
        });
        group.bench_function(format!("read_{}", name), |b| {
            b.iter(|| black_box(SnapshotReader::from_bytes(&bytes).unwrap().items().len()));
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_item_lookup,
    benchmark_consists_of,
    benchmark_appears_in,
    benchmark_snapshot
);
criterion_main!(benches);
