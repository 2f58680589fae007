// src/algorithms/mod.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Algorithm drivers: PageRank, BFS, and Connected Components, each composed
//! from [`crate::pool::spawn`], [`crate::scheduler`], and [`crate::kernel`].
//!
//! The three drivers share the same pull-phase/merge/vertex-phase envelope
//! (barrier; claim-and-process units; barrier; thread-0 merge reconcile;
//! barrier; per-vertex transform; barrier), generalized from
//! `execution_pr.c::execution_impl_pr` and
//! `execution_bfs.c::execution_impl_bfs`. Connected Components has no
//! reference driver in the original source tree; its loop follows the BFS
//! shape with a min-reduce and a no-reference-frontier termination test
//! (iterate until no label changes), per the distilled specification.

pub mod bfs;
pub mod connected_components;
pub mod pagerank;

use crate::context::{bitset, GraphContext};
use crate::error::GrazelleError;
use crate::kernel;
use crate::numa::NumaTopology;
use crate::pool::{self, Binding, ThreadContext};
use crate::scheduler;
use std::sync::atomic::Ordering;
use std::sync::Arc;

/// Iteration counters recorded across a run, mirroring the reference's
/// `total_iterations_executed` / `total_iterations_used_gather` /
/// `total_iterations_used_scatter` globals (`execution.c`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RunStats {
    pub total_iterations_executed: u64,
    pub total_iterations_used_gather: u64,
    pub total_iterations_used_scatter: u64,
}

/// Runs one pull-phase unit loop for the calling thread's node, writing
/// directly-committed runs into `accum` and this unit's deferred tail into
/// the shared merge buffer at its globally-unique slot.
pub(crate) fn run_pull_phase(
    ctx: &GraphContext,
    thread: &ThreadContext,
    identity: f64,
    read_source: impl Fn(u64) -> f64,
    reduce: impl Fn(f64, f64) -> f64 + Copy,
) {
    let group = thread.group_id as usize;
    let slab = &ctx.gather[group];
    let accum = unsafe { ctx.accum.get_mut() };
    let merge_buffer = unsafe { ctx.merge_buffer.get_mut() };

    while let Some(unit) = scheduler::claim_unit(ctx, group) {
        let range = scheduler::unit_range(slab.vectors.len(), ctx.units_per_node, unit);
        let entry = kernel::pull_phase_unit(slab, range, identity, &read_source, reduce, accum);
        let slot = ctx.unit_base(group) as usize + unit as usize;
        merge_buffer[slot] = entry;
    }
}

/// Thread-0-only merge reconciliation, run once between the pull-phase and
/// vertex-phase barriers.
pub(crate) fn run_merge_reconcile(ctx: &GraphContext, reduce: impl Fn(f64, f64) -> f64) {
    let merge_buffer = ctx.merge_buffer.get_ref();
    let accum = unsafe { ctx.accum.get_mut() };
    scheduler::merge_reconcile(merge_buffer, accum, reduce);
}

/// Runs one push-phase unit loop for the calling thread, accumulating into
/// a private shadow buffer rather than the shared accumulator.
pub(crate) fn run_push_phase(
    ctx: &GraphContext,
    thread: &ThreadContext,
    read_source: impl Fn(u64) -> f64,
    reduce: impl Fn(f64, f64) -> f64,
    shadow: &mut [f64],
) {
    let group = thread.group_id as usize;
    let slab = &ctx.scatter[group];

    while let Some(unit) = scheduler::claim_unit(ctx, group) {
        let range = scheduler::unit_range(slab.vectors.len(), ctx.units_per_node, unit);
        kernel::push_phase_unit(slab, range, &read_source, &reduce, shadow);
    }
}

/// Applies the per-vertex transform over the calling thread's owned range.
/// Only one thread per node should call this (`group_thread_id == 0`);
/// larger per-node thread counts further subdivide the owned range via
/// rayon in the property-init style the teacher uses elsewhere, but a
/// single owning thread keeps the transform race-free without extra
/// synchronization for the node sizes this engine targets.
pub(crate) fn run_vertex_phase(
    ctx: &GraphContext,
    group: usize,
    transform: impl Fn(u64, f64, f64) -> f64,
) {
    let prop = unsafe { ctx.prop.get_mut() };
    let accum = ctx.accum.get_ref();
    kernel::apply_vertex_transform(ctx.vertex_ranges[group], prop, accum, transform);
}

/// Forced engine override for BFS/CC, mirroring `EXPERIMENT_EDGE_FORCE_PULL`
/// / `EXPERIMENT_EDGE_FORCE_PUSH` in the reference (§4.11's "engine choice
/// override"), exposed here as a runtime driver parameter rather than a
/// compile-time feature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Engine {
    Pull,
    Push,
}

/// Shared driver loop for the two frontier algorithms (BFS and Connected
/// Components): both compose the same pull/push/vertex-phase envelope with
/// a min-reduce edge operator gated by the `HasInfo` frontier, differing
/// only in how a vertex is initialized and what counts as an improvement.
/// Generalizes `execution_bfs.c::execution_impl_bfs`; Connected Components
/// has no reference driver in the retrieved source (see DESIGN.md), so its
/// call into this function supplies the distilled spec's "as BFS but with
/// `prop[v]=v` initially, reduce op min" description directly.
///
/// `IDENTITY` (`f64::INFINITY`) stands in for the reference's bit-frontier:
/// a source vertex not in `HasInfo` contributes `IDENTITY` to the min-reduce
/// instead of being masked out of the gather/scatter, so the existing
/// sum/min-reduce kernels in [`crate::kernel`] serve both PageRank and these
/// two algorithms without a separate bitset-aware kernel path.
pub const FRONTIER_IDENTITY: f64 = f64::INFINITY;

#[allow(clippy::too_many_arguments)]
pub(crate) fn run_frontier_driver(
    ctx: Arc<GraphContext>,
    topology: &NumaTopology,
    thread_count: u32,
    binding: Binding,
    initial_active: impl Fn(u64) -> bool,
    initial_prop: impl Fn(u64) -> f64,
    edge_op: impl Fn(f64) -> f64 + Sync + Send + Copy,
    accepts_update: impl Fn(f64, f64) -> bool + Sync + Send + Copy,
    combine: impl Fn(f64, f64) -> f64 + Sync + Send + Copy,
    initial_converge_vote: u64,
    engine_threshold_denominator: u64,
    forced_engine: Option<Engine>,
) -> Result<RunStats, GrazelleError> {
    let num_vertices = ctx.num_vertices;
    let num_edges = ctx.num_edges.max(1);

    {
        let prop = unsafe { ctx.prop.get_mut() };
        let accum = unsafe { ctx.accum.get_mut() };
        let has_info = unsafe { ctx.has_info.get_mut() };
        let has_info_next = unsafe { ctx.has_info_next.get_mut() };

        for v in 0..num_vertices {
            prop[v as usize] = initial_prop(v);
            accum[v as usize] = FRONTIER_IDENTITY;
            bitset::set(has_info, v, initial_active(v));
        }
        has_info_next.iter_mut().for_each(|w| *w = 0);
    }

    ctx.activation_counter.store(0, Ordering::Relaxed);
    ctx.store_reduce_u64(initial_converge_vote);

    let iterations_executed = std::sync::atomic::AtomicU64::new(0);
    let iterations_gather = std::sync::atomic::AtomicU64::new(0);
    let iterations_scatter = std::sync::atomic::AtomicU64::new(0);

    let numa_nodes = ctx.numa_nodes.clone();

    pool::spawn(thread_count, &numa_nodes, topology, binding, {
        let ctx = Arc::clone(&ctx);
        let iterations_executed = &iterations_executed;
        let iterations_gather = &iterations_gather;
        let iterations_scatter = &iterations_scatter;

        move |thread| {
            let group = thread.group_id as usize;
            // Per-thread push-engine shadow accumulator, covering the full
            // vertex space (see DESIGN.md: destination locality per node is
            // not guaranteed by this engine's partitioning, so shadows are
            // sized conservatively rather than to one node's vertex range).
            let mut shadow: Vec<f64> = Vec::new();

            loop {
                let converge_vote = ctx.load_reduce_u64();

                let use_pull = match forced_engine {
                    Some(Engine::Pull) => true,
                    Some(Engine::Push) => false,
                    None => converge_vote > num_edges / engine_threshold_denominator.max(1),
                };

                if thread.global_id == 0 {
                    scheduler::reset_counters(&ctx);
                    if use_pull {
                        scheduler::reset_merge_buffer(unsafe { ctx.merge_buffer.get_mut() });
                    }
                    iterations_executed.fetch_add(1, Ordering::Relaxed);
                    if use_pull {
                        iterations_gather.fetch_add(1, Ordering::Relaxed);
                    } else {
                        iterations_scatter.fetch_add(1, Ordering::Relaxed);
                    }
                }
                thread.barrier();

                let has_info = ctx.has_info.get_ref();
                let read_source = |s: u64| {
                    if bitset::get(has_info, s) {
                        edge_op(ctx.prop.get_ref()[s as usize])
                    } else {
                        FRONTIER_IDENTITY
                    }
                };

                if use_pull {
                    run_pull_phase(&ctx, thread, FRONTIER_IDENTITY, read_source, f64::min);
                    thread.barrier();
                    if thread.global_id == 0 {
                        run_merge_reconcile(&ctx, f64::min);
                    }
                    thread.barrier();
                } else {
                    if shadow.is_empty() {
                        shadow = vec![FRONTIER_IDENTITY; num_vertices as usize + GraphContext::TAIL_SLACK];
                    } else {
                        shadow.iter_mut().for_each(|s| *s = FRONTIER_IDENTITY);
                    }
                    run_push_phase(&ctx, thread, read_source, f64::min, &mut shadow);
                    thread.barrier();

                    // min is commutative/associative, so every thread folds
                    // its own shadow into the shared accumulator directly,
                    // without a single designated reducer, via a lock-free
                    // compare-exchange on the bit pattern (`atomic_min_f64`).
                    let accum = unsafe { ctx.accum.get_mut() };
                    for (v, &value) in shadow.iter().enumerate() {
                        if value.is_finite() {
                            atomic_min_f64(accum, v, value);
                        }
                    }
                    thread.barrier();
                }

                if thread.global_id == 0 {
                    ctx.activation_counter.store(0, Ordering::Relaxed);
                }
                thread.barrier();

                let prop = unsafe { ctx.prop.get_mut() };
                let accum = ctx.accum.get_ref();
                let has_info_next = unsafe { ctx.has_info_next.get_mut() };
                let range = ctx.vertex_ranges[group];
                let mut local_activations = 0u64;

                for v in range.first..=range.last {
                    let idx = v as usize;
                    let candidate = accum[idx];
                    if candidate.is_finite() && accepts_update(prop[idx], candidate) {
                        prop[idx] = combine(prop[idx], candidate);
                        bitset::set(has_info_next, v, true);
                        local_activations += 1;
                    }
                }
                if local_activations > 0 {
                    ctx.activation_counter.fetch_add(local_activations, Ordering::Relaxed);
                }

                let accum_mut = unsafe { ctx.accum.get_mut() };
                for v in range.first..=range.last {
                    accum_mut[v as usize] = FRONTIER_IDENTITY;
                }
                thread.barrier();

                if thread.global_id == 0 {
                    let converge_vote = ctx.activation_counter.load(Ordering::Relaxed);
                    ctx.store_reduce_u64(converge_vote);

                    let has_info = unsafe { ctx.has_info.get_mut() };
                    let has_info_next = unsafe { ctx.has_info_next.get_mut() };
                    std::mem::swap(has_info, has_info_next);
                    has_info_next.iter_mut().for_each(|w| *w = 0);
                }
                thread.barrier();

                if ctx.load_reduce_u64() == 0 {
                    break;
                }
            }
        }
    })?;

    Ok(RunStats {
        total_iterations_executed: iterations_executed.load(Ordering::Relaxed),
        total_iterations_used_gather: iterations_gather.load(Ordering::Relaxed),
        total_iterations_used_scatter: iterations_scatter.load(Ordering::Relaxed),
    })
}

/// Lock-free `accum[v] = min(accum[v], value)` via compare-exchange on the
/// bit pattern, used by the push engine's cross-thread shadow fold (§4.8's
/// "must ensure concurrent scatter updates... produce the correct reduced
/// value" requirement) without taking a lock per vertex.
fn atomic_min_f64(accum: &mut [f64], idx: usize, value: f64) {
    let cell = &accum[idx] as *const f64 as *const std::sync::atomic::AtomicU64;
    let atomic = unsafe { &*cell };
    let mut current = atomic.load(Ordering::Relaxed);
    loop {
        let current_f = f64::from_bits(current);
        if current_f <= value {
            return;
        }
        match atomic.compare_exchange_weak(
            current,
            value.to_bits(),
            Ordering::Relaxed,
            Ordering::Relaxed,
        ) {
            Ok(_) => return,
            Err(observed) => current = observed,
        }
    }
}
