// src/kernel.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pull (gather) and push (scatter) edge-phase kernels, and the per-vertex
//! transform applied between phases.
//!
//! The pull kernel's boundary-deferral protocol is transcribed from
//! `phases.c::edge_pull_op_*`: a scheduling unit commits every edge-vector
//! run it completes directly into the shared accumulator, except the run
//! still open when the unit ends, which it defers into a [`MergeEntry`] for
//! [`crate::scheduler::merge_reconcile`] to fold in after the phase barrier.
//! The push kernel resolves the distilled spec's open concurrency question
//! (§9) with per-thread shadow accumulators, reduced into the shared
//! accumulator once every thread's unit range is exhausted — avoiding
//! cross-thread writes to arbitrary destinations without a lock per vertex.

use crate::context::{DirectionalSlab, MergeEntry, VertexRange};
use std::ops::Range;

/// Runs one scheduling unit of a pull-phase edge vector range, folding
/// contributions into `accum` directly for every fully-interior run and
/// returning a deferred [`MergeEntry`] for the run still open at the unit's
/// end (or an empty entry if the unit's range was empty).
pub fn pull_phase_unit(
    slab: &DirectionalSlab,
    unit_range: Range<usize>,
    identity: f64,
    read_source: impl Fn(u64) -> f64,
    reduce: impl Fn(f64, f64) -> f64,
    accum: &mut [f64],
) -> MergeEntry {
    if unit_range.is_empty() {
        return MergeEntry::default();
    }

    let first_shared = slab.vectors[unit_range.start].unpack_shared();
    let mut current_shared = first_shared;
    let mut current_sum = identity;

    for idx in unit_range {
        let vector = &slab.vectors[idx];
        let shared = vector.unpack_shared();

        if shared != current_shared {
            accum[current_shared as usize] = current_sum;
            current_shared = shared;
            current_sum = identity;
        }

        for lane in 0..4 {
            if vector.is_valid(lane) {
                let value = read_source(vector.unpack_individual(lane));
                current_sum = reduce(current_sum, value);
            }
        }
    }

    MergeEntry {
        initial_vertex_id: first_shared,
        final_vertex_id: current_shared,
        final_partial_value: current_sum,
        ..MergeEntry::default()
    }
}

/// Runs one scheduling unit of a push-phase edge vector range, folding each
/// edge's contribution into the calling thread's private `shadow`
/// accumulator (sized to `num_vertices`) rather than the shared one.
pub fn push_phase_unit(
    slab: &DirectionalSlab,
    unit_range: Range<usize>,
    read_source: impl Fn(u64) -> f64,
    reduce: impl Fn(f64, f64) -> f64,
    shadow: &mut [f64],
) {
    for idx in unit_range {
        let vector = &slab.vectors[idx];
        let value = read_source(vector.unpack_shared());

        for lane in 0..4 {
            if vector.is_valid(lane) {
                let dst = vector.unpack_individual(lane) as usize;
                shadow[dst] = reduce(shadow[dst], value);
            }
        }
    }
}

/// Folds every thread's shadow accumulator into the shared one. Run once,
/// single-threaded, after every push-phase worker has finished its units
/// (mirrors the pull engine's post-barrier merge step).
pub fn reduce_shadows(shadows: &[Vec<f64>], accum: &mut [f64], reduce: impl Fn(f64, f64) -> f64) {
    for shadow in shadows {
        for (v, &value) in shadow.iter().enumerate() {
            accum[v] = reduce(accum[v], value);
        }
    }
}

/// Applies an algorithm's per-vertex transform over the vertices a node
/// owns, per §4.9: `transform(vertex_id, old_prop, accum) -> new_prop`.
pub fn apply_vertex_transform(
    range: VertexRange,
    prop: &mut [f64],
    accum: &[f64],
    transform: impl Fn(u64, f64, f64) -> f64,
) {
    for v in range.first..=range.last {
        let idx = v as usize;
        prop[idx] = transform(v, prop[idx], accum[idx]);
    }
}
