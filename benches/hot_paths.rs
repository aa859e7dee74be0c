//! Benchmarks for path assembly, spatial index queries and polygon fills.
//!
//! Run with: cargo bench --bench hot_paths

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use shoreline::braille::BrailleCanvas;
use shoreline::data::{DatabaseBuilder, SpatialIndex};
use shoreline::map::{Equirectangular, Orthographic};
use shoreline::render::{assemble, DiscontinuityDetector};
use shoreline::{
    EarthArea, EarthImageTransform, Feature, GeographicLocation, ImageDimensions, PathAssembler,
    PolygonFeature, PolygonLevel, PolygonWindingAssembler, RenderOptions,
};

/// Wavy coastline circling the globe at 40°N, crossing the antimeridian.
fn coastline(points: usize) -> Vec<GeographicLocation> {
    (0..points)
        .map(|i| {
            let t = i as f64 / points as f64;
            let lon = -180.0 + t * 360.0;
            let lat = 40.0 + (t * std::f64::consts::TAU * 24.0).sin() * 3.0;
            GeographicLocation::new(lat, lon)
        })
        .collect()
}

fn world_pipeline() -> Arc<EarthImageTransform> {
    let dims = ImageDimensions::new(720, 360);
    Arc::new(
        EarthImageTransform::centered(
            Arc::new(Equirectangular::world(0.5)),
            dims,
            &GeographicLocation::new(0.0, 0.0),
            1.0,
        )
        .unwrap(),
    )
}

fn globe_pipeline() -> Arc<EarthImageTransform> {
    let dims = ImageDimensions::new(512, 512);
    Arc::new(
        EarthImageTransform::centered(
            Arc::new(Orthographic::new(30.0, -20.0, 256.0)),
            dims,
            &GeographicLocation::new(30.0, -20.0),
            1.0,
        )
        .unwrap(),
    )
}

// =============================================================================
// PATH ASSEMBLY
// =============================================================================

fn bench_assemble(c: &mut Criterion) {
    let mut group = c.benchmark_group("assemble");
    let detector = DiscontinuityDetector::default();

    for (name, pipeline) in [("equirectangular", world_pipeline()), ("orthographic", globe_pipeline())] {
        for points in [1_000usize, 10_000] {
            let line = coastline(points);
            group.throughput(Throughput::Elements(points as u64));
            group.bench_with_input(BenchmarkId::new(name, points), &line, |b, line| {
                b.iter(|| assemble(black_box(line), &pipeline, &detector, false));
            });
            group.bench_with_input(BenchmarkId::new(format!("{name}_fast"), points), &line, |b, line| {
                b.iter(|| assemble(black_box(line), &pipeline, &detector, true));
            });
        }
    }

    group.finish();
}

fn bench_cached_paths(c: &mut Criterion) {
    let pipeline = world_pipeline();
    let features: Vec<Feature> = (0..100).map(|_| Feature::new(coastline(500))).collect();
    let assembler = PathAssembler::new(RenderOptions::default());
    for feature in &features {
        assembler.path_for(feature, &pipeline);
    }

    c.bench_function("path_for_cached_100", |b| {
        b.iter(|| {
            for feature in &features {
                black_box(assembler.path_for(feature, &pipeline));
            }
        })
    });
}

// =============================================================================
// SPATIAL INDEX
// =============================================================================

fn bench_index_query(c: &mut Criterion) {
    let mut builder = DatabaseBuilder::new();
    for lat in (-60..60).step_by(3) {
        for lon in (-180..180).step_by(3) {
            let (lat, lon) = (lat as f64 + 0.5, lon as f64 + 0.5);
            builder.add_line(vec![
                GeographicLocation::new(lat, lon),
                GeographicLocation::new(lat + 1.5, lon + 2.0),
            ]);
        }
    }
    let mut data = Vec::new();
    let offsets = builder.write_data(&mut data).unwrap();
    let mut bytes = Vec::new();
    builder.write_index(&mut bytes, &offsets).unwrap();
    let index = SpatialIndex::from_bytes(&bytes).unwrap();

    let mut group = c.benchmark_group("index_query");
    for (name, area) in [
        ("region_10x10", EarthArea::from_bounds(30.0, -10.0, 40.0, 0.0)),
        ("hemisphere", EarthArea::from_bounds(0.0, -180.0, 90.0, 180.0)),
        ("world", EarthArea::world()),
    ] {
        group.bench_with_input(BenchmarkId::from_parameter(name), &area, |b, area| {
            b.iter(|| index.query(black_box(area)));
        });
    }
    group.finish();
}

// =============================================================================
// POLYGON FILL
// =============================================================================

fn bench_render_filled(c: &mut Criterion) {
    let pipeline = world_pipeline();
    let mut polygons = Vec::new();
    for i in 0..50 {
        let (lat, lon) = (-50.0 + (i / 10) as f64 * 20.0, -170.0 + (i % 10) as f64 * 34.0);
        let ring: Vec<GeographicLocation> = (0..64)
            .map(|k| {
                let a = k as f64 / 64.0 * std::f64::consts::TAU;
                GeographicLocation::new(lat + a.sin() * 8.0, lon + a.cos() * 12.0)
            })
            .collect();
        polygons.push(PolygonFeature::new(Feature::new(ring), PolygonLevel::Land));
        polygons.push(PolygonFeature::sentinel());
    }
    let assembler = PolygonWindingAssembler::new(RenderOptions::default());

    c.bench_function("render_filled_braille_50", |b| {
        let mut canvas = BrailleCanvas::new(360, 90);
        b.iter(|| {
            canvas.clear();
            black_box(assembler.render_filled(&polygons, &pipeline, &mut canvas));
        })
    });
}

criterion_group!(
    benches,
    bench_assemble,
    bench_cached_paths,
    bench_index_query,
    bench_render_filled
);
criterion_main!(benches);
