//! Benchmarks for binary morphology

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use geoscout_algorithms::morphology::{closing, erode, opening, StructuringElement};
use ndarray::Array2;

fn create_test_mask(size: usize) -> Array2<bool> {
    // Speckled mask with some larger structures
    Array2::from_shape_fn((size, size), |(row, col)| {
        ((row / 37) + (col / 53)) % 3 == 0 || (row * 7 + col * 13) % 29 == 0
    })
}

fn bench_erode(c: &mut Criterion) {
    let mut group = c.benchmark_group("morphology/erode");
    let se = StructuringElement::Disk(3);
    for size in [256, 512, 1024, 2048] {
        let mask = create_test_mask(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| erode(black_box(&mask), &se).unwrap())
        });
    }
    group.finish();
}

fn bench_fire_cleanup(c: &mut Criterion) {
    // opening radius 3 followed by closing radius 5, as run per fire tile
    let mut group = c.benchmark_group("morphology/open3_close5");
    let open_se = StructuringElement::Disk(3);
    let close_se = StructuringElement::Disk(5);
    for size in [512, 1024, 2560] {
        let mask = create_test_mask(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let opened = opening(black_box(&mask), &open_se).unwrap();
                closing(&opened, &close_se).unwrap()
            })
        });
    }
    group.finish();
}

fn bench_radius_scaling(c: &mut Criterion) {
    let mut group = c.benchmark_group("morphology/erode_radius");
    let mask = create_test_mask(1024);
    for radius in [1, 2, 3, 5, 8, 16] {
        let se = StructuringElement::Disk(radius);
        group.bench_with_input(BenchmarkId::from_parameter(radius), &radius, |b, _| {
            b.iter(|| erode(black_box(&mask), &se).unwrap())
        });
    }
    group.finish();
}

fn bench_se_shapes(c: &mut Criterion) {
    let mut group = c.benchmark_group("morphology/erode_shapes");
    let mask = create_test_mask(1024);
    let shapes: Vec<(&str, StructuringElement)> = vec![
        ("square_3", StructuringElement::Square(1)),
        ("disk_3", StructuringElement::Disk(1)),
        ("disk_7", StructuringElement::Disk(3)),
        ("disk_11", StructuringElement::Disk(5)),
    ];
    for (name, se) in &shapes {
        group.bench_with_input(BenchmarkId::new("shape", name), name, |b, _| {
            b.iter(|| erode(black_box(&mask), se).unwrap())
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_erode,
    bench_fire_cleanup,
    bench_radius_scaling,
    bench_se_shapes,
);
criterion_main!(benches);
