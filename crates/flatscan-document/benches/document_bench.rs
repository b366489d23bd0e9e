// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the flatscan-document pipeline: edge detection,
// rectification, and the five filters at preview and export resolution.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use image::{DynamicImage, Rgba, RgbaImage};

use flatscan_core::{Corners, FilterType, Point};
use flatscan_document::{EdgeDetector, FilterEngine, FilterMode, Rectifier};

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

/// A light page on a dark desk, inset by a tenth of each side.
fn desk_photo(width: u32, height: u32) -> DynamicImage {
    let (x0, y0) = (width / 10, height / 10);
    let (x1, y1) = (width - x0, height - y0);
    DynamicImage::ImageRgba8(RgbaImage::from_fn(width, height, |x, y| {
        if (x0..x1).contains(&x) && (y0..y1).contains(&y) {
            Rgba([235, 232, 225, 255])
        } else {
            Rgba([40, 38, 45, 255])
        }
    }))
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

/// Full detection pipeline on a page that has clean borders.
fn bench_edge_detection(c: &mut Criterion) {
    let photo = desk_photo(800, 1000);
    let detector = EdgeDetector::default();

    c.bench_function("edge_detection (800x1000)", |b| {
        b.iter(|| black_box(detector.detect_or_default(black_box(&photo))));
    });
}

/// Homography warp of a skewed quadrilateral.
fn bench_rectify(c: &mut Criterion) {
    let photo = desk_photo(800, 1000);
    let corners = Corners::new(
        Point::new(90.0, 110.0),
        Point::new(700.0, 80.0),
        Point::new(730.0, 920.0),
        Point::new(60.0, 890.0),
    );
    let rectifier = Rectifier::default();

    c.bench_function("rectify_exact (800x1000)", |b| {
        b.iter(|| black_box(rectifier.rectify(black_box(&photo), &corners)));
    });
}

/// Every filter, once downscaled for preview and once at full size.
fn bench_filters(c: &mut Criterion) {
    let photo = desk_photo(1600, 2000);
    let engine = FilterEngine::default();
    let mut group = c.benchmark_group("filters");
    group.sample_size(10);

    for filter in FilterType::ALL {
        for mode in [FilterMode::Preview, FilterMode::Export] {
            group.bench_with_input(
                BenchmarkId::new(filter.as_str(), format!("{:?}", mode)),
                &mode,
                |b, &mode| b.iter(|| black_box(engine.apply(&photo, filter, mode))),
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_edge_detection, bench_rectify, bench_filters);
criterion_main!(benches);
