use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{DynamicImage, GrayImage, Luma};
use scan_transformer::{LineExtractor, Triangulator};

fn build_pair(width: u32, height: u32) -> (DynamicImage, DynamicImage) {
    let off = GrayImage::from_fn(width, height, |x, y| Luma([((x + y) % 40) as u8]));
    let on = GrayImage::from_fn(width, height, |x, y| {
        let center = width / 3 + y / 4;
        if x.abs_diff(center) <= 2 {
            Luma([230])
        } else {
            *off.get_pixel(x, y)
        }
    });
    (DynamicImage::ImageLuma8(on), DynamicImage::ImageLuma8(off))
}

fn bench_extract(c: &mut Criterion) {
    let (on, off) = build_pair(1280, 720);
    let extractor = LineExtractor::default();

    c.bench_function("line_extract_1280x720", |b| {
        b.iter(|| {
            let line = extractor
                .extract(black_box(&on), black_box(&off))
                .expect("same size");
            black_box(line.points.len());
        });
    });
}

fn bench_triangulate(c: &mut Criterion) {
    let (on, off) = build_pair(1280, 720);
    let points = LineExtractor::default()
        .extract(&on, &off)
        .expect("same size")
        .points;
    let triangulator = Triangulator::new(Default::default()).expect("valid geometry");

    c.bench_function("triangulate_720_rows", |b| {
        b.iter(|| {
            let pts = triangulator
                .project(black_box(&points), 54.0, 1280, 720)
                .expect("valid size");
            black_box(pts.len());
        });
    });
}

criterion_group!(benches, bench_extract, bench_triangulate);
criterion_main!(benches);
