// benches/codec_and_kernels.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use grazelle::codec::EdgeVector;
use grazelle::context::{DirectionalSlab, VertexRange};
use grazelle::kernel;

fn build_dense_slab(num_vertices: u64, fanout: u64) -> DirectionalSlab {
    let mut vectors = Vec::new();
    for dst in 0..num_vertices {
        let mut srcs = Vec::with_capacity(fanout as usize);
        for k in 0..fanout {
            srcs.push((dst + k + 1) % num_vertices);
        }
        for chunk in srcs.chunks(4) {
            let mut lanes = [None; 4];
            for (i, &id) in chunk.iter().enumerate() {
                lanes[i] = Some(id);
            }
            vectors.push(EdgeVector::pack(dst, lanes, 0));
        }
    }
    let (index, lowest, highest) = grazelle::partition::build_vertex_index(&vectors, num_vertices);
    DirectionalSlab { vectors: vectors.into(), index, lowest_vertex: lowest, highest_vertex: highest }
}

fn bench_codec_roundtrip(c: &mut Criterion) {
    let vector = EdgeVector::pack(12345, [Some(1), Some(2), Some(3), Some(4)], 0);

    c.bench_function("edge_vector_pack", |b| {
        b.iter(|| {
            black_box(EdgeVector::pack(
                black_box(12345),
                [Some(1), Some(2), Some(3), Some(4)],
                0,
            ));
        });
    });

    c.bench_function("edge_vector_unpack", |b| {
        b.iter(|| {
            let shared = black_box(vector).unpack_shared();
            for lane in 0..4 {
                black_box(vector.unpack_individual(lane));
            }
            black_box(shared);
        });
    });
}

fn bench_pull_phase_unit(c: &mut Criterion) {
    let num_vertices = 4096u64;
    let slab = build_dense_slab(num_vertices, 8);
    let mut accum = vec![0.0f64; num_vertices as usize + 8];
    let props = vec![1.0f64; num_vertices as usize];

    c.bench_function("pull_phase_unit_dense", |b| {
        b.iter(|| {
            let entry = kernel::pull_phase_unit(
                &slab,
                0..slab.vectors.len(),
                0.0,
                |src| props[src as usize],
                |a, b| a + b,
                &mut accum,
            );
            black_box(entry);
        });
    });
}

fn bench_vertex_range_scan(c: &mut Criterion) {
    let range = VertexRange { first: 0, last: 4095 };
    let accum: Vec<f64> = (0..=range.last).map(|v| v as f64).collect();

    c.bench_function("vertex_range_scan", |b| {
        b.iter(|| {
            let mut sum = 0.0;
            for v in range.first..=range.last {
                sum += accum[v as usize];
            }
            black_box(sum);
        });
    });
}

criterion_group!(
    benches,
    bench_codec_roundtrip,
    bench_pull_phase_unit,
    bench_vertex_range_scan
);
criterion_main!(benches);
