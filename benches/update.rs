//! Update benchmarks: the skip path and a full shape opening.

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use regionflow::prelude::*;
use std::hint::black_box;
use std::sync::Arc;

/// Squares of growing size on a grid.
fn blobs(side: usize) -> Image<u8> {
    let mut data = vec![0u8; side * side];
    for (n, cell) in (0..side / 8).flat_map(|j| (0..side / 8).map(move |i| (j, i))).enumerate() {
        let extent = n % 7 + 1;
        for y in 0..extent {
            for x in 0..extent {
                data[(cell.0 * 8 + y) * side + cell.1 * 8 + x] = 255;
            }
        }
    }
    Image::from_vec(&[side, side], data).unwrap()
}

fn bench_skipped_update(c: &mut Criterion) {
    let mut graph = PipelineGraph::new();
    let shift = graph.add(ShiftScale::<u8>::new());
    let shrink = graph.add(Shrink::<u8>::new());
    graph.set_input(shift, "input", Arc::new(blobs(256))).unwrap();
    graph.connect(shift, "output", shrink, "input").unwrap();
    graph.update(shrink).unwrap();

    c.bench_function("update_up_to_date", |b| {
        b.iter(|| black_box(graph.update(shrink).unwrap()))
    });
}

fn bench_shape_opening(c: &mut Criterion) {
    let mut group = c.benchmark_group("shape_opening");

    for side in [64usize, 128, 256] {
        let image = Arc::new(blobs(side));
        group.throughput(Throughput::Elements((side * side) as u64));
        group.bench_with_input(BenchmarkId::from_parameter(side), &image, |b, image| {
            b.iter(|| {
                let mut graph = PipelineGraph::new();
                let node = graph.add(BinaryShapeOpening::<u8>::new());
                graph.set_input(node, "input", image.clone()).unwrap();
                graph.set_parameter(node, "lambda", 10.0).unwrap();
                graph.update(node).unwrap();
                black_box(graph.output_image::<u8>(node, "output").unwrap())
            })
        });
    }

    group.finish();
}

fn bench_attributes(c: &mut Criterion) {
    let mut group = c.benchmark_group("attribute");
    let image = Arc::new(blobs(128));

    for attribute in ["number_of_pixels", "roundness", "feret_diameter"] {
        group.bench_with_input(BenchmarkId::from_parameter(attribute), &attribute, |b, &attribute| {
            b.iter(|| {
                let mut graph = PipelineGraph::new();
                let node = graph.add(BinaryShapeOpening::<u8>::new());
                graph.set_input(node, "input", image.clone()).unwrap();
                graph.set_parameter(node, "attribute", attribute).unwrap();
                graph.update(node).unwrap();
                black_box(graph.output_image::<u8>(node, "output").unwrap())
            })
        });
    }

    group.finish();
}

criterion_group!(benches, bench_skipped_update, bench_shape_opening, bench_attributes);
criterion_main!(benches);
