//! Benchmarks for network building and basin location

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use streamnet_segments::prelude::*;

/// Dendritic flow grid: every pixel drains S, SW or SE by a fixed hash
fn create_flow(size: usize) -> FlowGrid {
    let mut codes = Vec::with_capacity(size * size);
    for row in 0..size {
        for col in 0..size {
            let code: u8 = match (row * 7919 + col * 104_729 + row * col) % 5 {
                3 if col > 0 => 6,
                4 if col + 1 < size => 8,
                _ => 7,
            };
            codes.push(code);
        }
    }
    let mut raster = Raster::from_vec(codes, size, size).unwrap();
    raster.set_transform(GeoTransform::new(0.0, size as f64 * 10.0, 10.0, -10.0));
    FlowGrid::from_taudem(&raster).unwrap()
}

fn create_network(size: usize) -> Network {
    let flow = create_flow(size);
    let accumulation = Raster::from_array(catchment_sizes(&flow).mapv(|n| n as f64));
    let params = DelineationParams {
        min_accumulation: 50.0,
        ..Default::default()
    };
    let mask = delineation_mask(&accumulation, None, &params).unwrap();
    build_network(flow, &mask, &NetworkParams::default()).unwrap()
}

fn bench_build_network(c: &mut Criterion) {
    let mut group = c.benchmark_group("segments/build_network");
    for size in [256, 512, 1024] {
        let flow = create_flow(size);
        let accumulation = Raster::from_array(catchment_sizes(&flow).mapv(|n| n as f64));
        let params = DelineationParams {
            min_accumulation: 50.0,
            ..Default::default()
        };
        let mask = delineation_mask(&accumulation, None, &params).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| build_network(black_box(flow.clone()), &mask, &NetworkParams::default()).unwrap())
        });
    }
    group.finish();
}

fn bench_locate_basins(c: &mut Criterion) {
    let mut group = c.benchmark_group("segments/locate_basins");
    for size in [256, 512, 1024] {
        let network = create_network(size);
        group.bench_with_input(BenchmarkId::new("sequential", size), &size, |b, _| {
            b.iter(|| {
                let mut net = network.clone();
                net.locate_basins(ExecutionMode::Sequential).unwrap()
            })
        });
        group.bench_with_input(BenchmarkId::new("parallel", size), &size, |b, _| {
            b.iter(|| {
                let mut net = network.clone();
                net.locate_basins(ExecutionMode::Parallel { threads: 4 }).unwrap()
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_build_network, bench_locate_basins);
criterion_main!(benches);
