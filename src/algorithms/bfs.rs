// src/algorithms/bfs.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Breadth-First Search driver: dynamic pull/push engine choice keyed off a
//! per-iteration converge vote, frontier double-buffering via `HasInfo`.
//!
//! Grounded on `execution_bfs.c::execution_impl_bfs`: root is vertex 0
//! (`SEARCH_ROOT`), `prop[root] = 0`/`prop[v != root] = -1`,
//! `converge_vote` initialized to `outdeg[root] + 1`, per-iteration engine
//! choice `converge_vote > num_edges / 5`, termination when the vote reaches
//! zero. The `HasInfo`/accumulator pointer-swap (§9) is implemented by
//! [`crate::algorithms::run_frontier_driver`] as a same-typed bitset
//! double-buffer rather than a raw pointer exchange over reinterpreted
//! `f64` storage.

use crate::algorithms::{run_frontier_driver, Engine, RunStats};
use crate::context::GraphContext;
use crate::error::GrazelleError;
use crate::numa::NumaTopology;
use crate::pool::Binding;
use std::sync::Arc;

const SEARCH_ROOT: u64 = 0;
const ENGINE_THRESHOLD_DENOMINATOR: u64 = 5;

/// Runs single-source BFS from [`SEARCH_ROOT`], leaving `prop[v]` as the
/// shortest unweighted hop distance from the root, or `-1.0` if `v` is
/// unreachable. `forced_engine` bypasses the distilled spec's dynamic
/// threshold, matching the reference's `EXPERIMENT_EDGE_FORCE_PULL`/`_PUSH`
/// compile-time overrides.
pub fn run(
    ctx: Arc<GraphContext>,
    topology: &NumaTopology,
    thread_count: u32,
    binding: Binding,
    forced_engine: Option<Engine>,
) -> Result<RunStats, GrazelleError> {
    let root = SEARCH_ROOT;
    let initial_converge_vote = ctx.outdeg.get(root as usize).copied().unwrap_or(0) + 1;

    run_frontier_driver(
        ctx,
        topology,
        thread_count,
        binding,
        move |v| v == root,
        move |v| if v == root { 0.0 } else { -1.0 },
        |source_prop| source_prop + 1.0,
        |old_prop, _candidate| old_prop < 0.0,
        |_old_prop, candidate| candidate,
        initial_converge_vote,
        ENGINE_THRESHOLD_DENOMINATOR,
        forced_engine,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EdgeVector;
    use crate::context::{DirectionalSlab, MergeEntry, SyncUnsafeCell, VertexRange};
    use crate::numa::{NumaNode, NumaTopology};
    use std::sync::atomic::AtomicU64;

    /// Packs `(shared, [individuals...])` runs into a slab, already
    /// shared-endpoint sorted as the file format requires.
    fn slab_from_runs(num_vertices: u64, runs: &[(u64, &[u64])]) -> DirectionalSlab {
        let mut vectors = Vec::new();
        for &(shared, individuals) in runs {
            for chunk in individuals.chunks(4) {
                let mut lanes = [None; 4];
                for (i, &id) in chunk.iter().enumerate() {
                    lanes[i] = Some(id);
                }
                vectors.push(EdgeVector::pack(shared, lanes, 0));
            }
        }
        let (index, lowest, highest) = crate::partition::build_vertex_index(&vectors, num_vertices);
        DirectionalSlab {
            vectors: vectors.into(),
            index,
            lowest_vertex: lowest,
            highest_vertex: highest,
        }
    }

    /// Builds a single-NUMA-node gather-only context for a small directed
    /// graph given as `(dst, [srcs...])` runs.
    fn gather_context(num_vertices: u64, runs: &[(u64, &[u64])], outdeg: Vec<u64>) -> GraphContext {
        let slab = slab_from_runs(num_vertices, runs);
        let num_edges = slab.vectors.iter().map(|v| v.valid_count() as u64).sum();

        let padded = num_vertices as usize + GraphContext::TAIL_SLACK;
        GraphContext {
            num_vertices,
            num_edges,
            numa_nodes: vec![0],
            gather: vec![slab],
            scatter: vec![DirectionalSlab {
                vectors: vec![].into(),
                index: vec![],
                lowest_vertex: 0,
                highest_vertex: 0,
            }],
            vertex_ranges: vec![VertexRange { first: 0, last: num_vertices - 1 }],
            outdeg,
            prop: SyncUnsafeCell::new(vec![0.0; padded]),
            accum: SyncUnsafeCell::new(vec![0.0; padded]),
            has_info: SyncUnsafeCell::new(vec![0u64; crate::context::bitset::words_for(num_vertices)]),
            has_info_next: SyncUnsafeCell::new(vec![0u64; crate::context::bitset::words_for(num_vertices)]),
            merge_buffer: SyncUnsafeCell::new(vec![MergeEntry::default(); 8]),
            sched_counters: vec![AtomicU64::new(0)],
            units_per_node: 1,
            units_total: 1,
            reduce_scalar: AtomicU64::new(0),
            activation_counter: AtomicU64::new(0),
        }
    }

    fn single_node_topology() -> NumaTopology {
        NumaTopology {
            num_nodes: 1,
            physical_cores: 1,
            logical_cpus: 1,
            nodes: vec![NumaNode { node_id: 0, cpus: vec![0], memory_gb: 0.0 }],
            is_uma: true,
        }
    }

    #[test]
    fn bfs_two_vertex_edge_gives_distances_zero_one() {
        // 0 -> 1, gather file grouped by destination: dst=1 has src=0.
        let ctx = Arc::new(gather_context(2, &[(1, &[0])], vec![1, 0]));
        let topology = single_node_topology();

        run(Arc::clone(&ctx), &topology, 1, Binding::Default, None).unwrap();

        let prop = ctx.prop.get_ref();
        assert_eq!(prop[0], 0.0);
        assert_eq!(prop[1], 1.0);
    }

    #[test]
    fn bfs_triangle_from_vertex_zero_gives_shortest_hops() {
        // Triangle 0->1, 1->2, 2->0; BFS from root 0 (always vertex 0 here).
        // dst=0 has src=2; dst=1 has src=0; dst=2 has src=1.
        let ctx = Arc::new(gather_context(
            3,
            &[(0, &[2]), (1, &[0]), (2, &[1])],
            vec![1, 1, 1],
        ));
        let topology = single_node_topology();

        run(Arc::clone(&ctx), &topology, 1, Binding::Default, None).unwrap();

        let prop = ctx.prop.get_ref();
        assert_eq!(prop[0], 0.0);
        assert_eq!(prop[1], 1.0);
        assert_eq!(prop[2], 2.0);
    }

    #[test]
    fn bfs_leaves_unreachable_vertices_at_negative_one() {
        // 0 -> 1, vertex 2 is disconnected.
        let ctx = Arc::new(gather_context(3, &[(1, &[0])], vec![1, 0, 0]));
        let topology = single_node_topology();

        run(Arc::clone(&ctx), &topology, 1, Binding::Default, None).unwrap();

        let prop = ctx.prop.get_ref();
        assert_eq!(prop[2], -1.0);
    }

    #[test]
    fn bfs_forced_push_matches_forced_pull_bit_exactly() {
        // Triangle 0->1, 1->2, 2->0, expressed both ways.
        let build = |scatter: bool| {
            let gather = slab_from_runs(3, &[(0, &[2]), (1, &[0]), (2, &[1])]);
            let scatter_slab = slab_from_runs(3, &[(0, &[1]), (1, &[2]), (2, &[0])]);
            let num_edges = gather.vectors.iter().map(|v| v.valid_count() as u64).sum();
            let padded = 3 + GraphContext::TAIL_SLACK;
            Arc::new(GraphContext {
                num_vertices: 3,
                num_edges,
                numa_nodes: vec![0],
                gather: vec![gather],
                scatter: vec![if scatter {
                    scatter_slab
                } else {
                    DirectionalSlab { vectors: vec![].into(), index: vec![], lowest_vertex: 0, highest_vertex: 0 }
                }],
                vertex_ranges: vec![VertexRange { first: 0, last: 2 }],
                outdeg: vec![1, 1, 1],
                prop: SyncUnsafeCell::new(vec![0.0; padded]),
                accum: SyncUnsafeCell::new(vec![0.0; padded]),
                has_info: SyncUnsafeCell::new(vec![0u64; crate::context::bitset::words_for(3)]),
                has_info_next: SyncUnsafeCell::new(vec![0u64; crate::context::bitset::words_for(3)]),
                merge_buffer: SyncUnsafeCell::new(vec![MergeEntry::default(); 8]),
                sched_counters: vec![AtomicU64::new(0)],
                units_per_node: 1,
                units_total: 1,
                reduce_scalar: AtomicU64::new(0),
                activation_counter: AtomicU64::new(0),
            })
        };
        let topology = single_node_topology();

        let pull_ctx = build(false);
        run(Arc::clone(&pull_ctx), &topology, 1, Binding::Default, Some(Engine::Pull)).unwrap();

        let push_ctx = build(true);
        run(Arc::clone(&push_ctx), &topology, 1, Binding::Default, Some(Engine::Push)).unwrap();

        assert_eq!(pull_ctx.prop.get_ref().as_slice(), push_ctx.prop.get_ref().as_slice());
    }
}
