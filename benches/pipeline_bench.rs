use criterion::{criterion_group, criterion_main, Criterion};
use image::{Rgba, RgbaImage};
use pagestitch::capture::Slice;
use pagestitch::overlay::apply_overlay;
use pagestitch::paginate::Paginator;
use pagestitch::stitch::stitch;
use pagestitch::{CaptureConfig, OverlayMetadata};

fn slices(width: u32, heights: &[u32]) -> Vec<Slice> {
    let mut offset = 0;
    heights
        .iter()
        .map(|&h| {
            let img = RgbaImage::from_fn(width, h, |x, y| Rgba([(x % 256) as u8, (y % 256) as u8, 90, 255]));
            let slice = Slice::new(img, offset);
            offset += h;
            slice
        })
        .collect()
}

fn bench_stitch(c: &mut Criterion) {
    let input = slices(800, &[4000, 4000, 1200]);
    c.bench_function("stitch_three_slices", |b| {
        b.iter(|| stitch(input.clone(), 800, 9200, 16384).unwrap())
    });
}

fn bench_overlay_and_paginate(c: &mut Criterion) {
    let stitched = stitch(slices(800, &[4000, 2000]), 800, 6000, 16384).unwrap();
    let meta = OverlayMetadata {
        page_name: Some("Checkout".into()),
        version: Some("v3.12.0".into()),
        url_path: Some("/checkout/review".into()),
        ..Default::default()
    };
    let paginator = Paginator::from_config(&CaptureConfig::default());

    c.bench_function("overlay_header", |b| b.iter(|| apply_overlay(&stitched.surface, &meta).unwrap()));

    let surface = apply_overlay(&stitched.surface, &meta).unwrap();
    c.bench_function("render_pdf", |b| b.iter(|| paginator.render_pdf(&surface, &[]).unwrap()));
}

criterion_group!(benches, bench_stitch, bench_overlay_and_paginate);
criterion_main!(benches);
