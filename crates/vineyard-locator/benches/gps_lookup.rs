use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use vineyard_core::AffineTransform;
use vineyard_locator::{CoordinateMapper, CoordinateTable};

fn transform() -> AffineTransform {
    AffineTransform::north_up(2.1734, 41.3851, 2e-6, 2e-6)
}

fn bench_index_build(c: &mut Criterion) {
    let mut group = c.benchmark_group("coordinate_index");
    for side in [128u32, 512] {
        let table = CoordinateTable::from_transform(&transform(), side, side);
        group.bench_with_input(BenchmarkId::from_parameter(side), &table, |b, table| {
            b.iter(|| CoordinateMapper::from_table(black_box(table)))
        });
    }
    group.finish();
}

fn bench_gps_to_pixel(c: &mut Criterion) {
    let transform = transform();
    let table = CoordinateTable::from_transform(&transform, 1024, 1024);
    let Ok(mapper) = CoordinateMapper::from_table(&table) else {
        return;
    };
    let queries: Vec<_> = (0..256)
        .map(|i| transform.pixel_to_gps((i * 37 % 1024) as f64 + 0.3, (i * 91 % 1024) as f64 + 0.6))
        .collect();

    c.bench_function("gps_to_pixel_1024", |b| {
        b.iter(|| {
            for gps in &queries {
                let _ = black_box(mapper.gps_to_pixel(black_box(gps)));
            }
        })
    });
}

criterion_group!(benches, bench_index_build, bench_gps_to_pixel);
criterion_main!(benches);
