// src/algorithms/pagerank.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! PageRank driver: fixed iteration count, sum-reduce pull phase, damping
//! formula with an explicit dangling-mass correction term.
//!
//! Grounded on `execution_pr.c::execution_impl_pr`: per-vertex property is
//! initialized to the per-neighbor rank share `(1/num_vertices) /
//! max(outdeg, num_vertices-if-dangling)` (`execution_initialize_vertex_prop_pr`),
//! the pull phase sums neighbor shares, and vertex phase folds in a
//! dangling-node correction via the shared reduce scalar (the reference's
//! reduce buffer) before dividing back into a share for the next iteration.

use crate::algorithms::{run_merge_reconcile, run_pull_phase, run_vertex_phase, RunStats};
use crate::context::GraphContext;
use crate::error::GrazelleError;
use crate::numa::NumaTopology;
use crate::pool::{self, Binding};
use crate::scheduler;
use std::sync::Arc;

/// Runs PageRank for `iterations` rounds with damping factor `damping`
/// (typically 0.85), returning the recorded iteration counters.
pub fn run(
    ctx: Arc<GraphContext>,
    topology: &NumaTopology,
    thread_count: u32,
    binding: Binding,
    damping: f64,
    iterations: u64,
) -> Result<RunStats, GrazelleError> {
    let num_vertices = ctx.num_vertices;
    initialize_props(&ctx);

    let numa_nodes = ctx.numa_nodes.clone();
    pool::spawn(thread_count, &numa_nodes, topology, binding, {
        let ctx = Arc::clone(&ctx);
        move |thread| {
            let group = thread.group_id as usize;

            for _ in 0..iterations {
                if thread.global_id == 0 {
                    scheduler::reset_counters(&ctx);
                    scheduler::reset_merge_buffer(unsafe { ctx.merge_buffer.get_mut() });
                    ctx.store_reduce_f64(dangling_mass(&ctx));
                }
                thread.barrier();

                run_pull_phase(&ctx, thread, 0.0, |src| ctx.prop.get_ref()[src as usize], |a, b| a + b);
                thread.barrier();

                if thread.global_id == 0 {
                    run_merge_reconcile(&ctx, |a, b| a + b);
                }
                thread.barrier();

                let dangling_correction = damping * ctx.load_reduce_f64() / num_vertices as f64;
                let base_rank = (1.0 - damping) / num_vertices as f64 + dangling_correction;

                run_vertex_phase(&ctx, group, |v, _old, accum| {
                    let new_rank = damping * accum + base_rank;
                    let outdeg = ctx.outdeg[v as usize];
                    let denom = if outdeg == 0 { num_vertices } else { outdeg };
                    new_rank / denom as f64
                });
                thread.barrier();
            }
        }
    })?;

    Ok(RunStats {
        total_iterations_executed: iterations,
        total_iterations_used_gather: iterations,
        total_iterations_used_scatter: 0,
    })
}

fn initialize_props(ctx: &GraphContext) {
    let prop = unsafe { ctx.prop.get_mut() };
    let n = ctx.num_vertices;
    for v in 0..n {
        let outdeg = ctx.outdeg[v as usize];
        let denom = if outdeg == 0 { n } else { outdeg };
        prop[v as usize] = (1.0 / n as f64) / denom as f64;
    }
}

/// Rank mass currently held by vertices with no outgoing edges: since a
/// dangling vertex is never a pull-phase source, its share never reaches
/// any accumulator and must be redistributed uniformly instead.
fn dangling_mass(ctx: &GraphContext) -> f64 {
    let prop = ctx.prop.get_ref();
    let n = ctx.num_vertices as f64;
    (0..ctx.num_vertices)
        .filter(|&v| ctx.outdeg[v as usize] == 0)
        .map(|v| prop[v as usize] * n)
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::EdgeVector;
    use crate::context::{MergeEntry, SyncUnsafeCell, VertexRange};
    use crate::numa::{NumaNode, NumaTopology};
    use std::sync::atomic::AtomicU64;

    fn tiny_cycle_context() -> GraphContext {
        // A 3-cycle 0 -> 1 -> 2 -> 0, single NUMA node, single scheduling unit.
        let gather_vectors = vec![
            EdgeVector::pack(0, [Some(2), None, None, None], 0),
            EdgeVector::pack(1, [Some(0), None, None, None], 0),
            EdgeVector::pack(2, [Some(1), None, None, None], 0),
        ];
        let (index, lowest, highest) =
            crate::partition::build_vertex_index(&gather_vectors, 3);

        let slab = crate::context::DirectionalSlab {
            vectors: gather_vectors.into(),
            index,
            lowest_vertex: lowest,
            highest_vertex: highest,
        };

        GraphContext {
            num_vertices: 3,
            num_edges: 3,
            numa_nodes: vec![0],
            gather: vec![slab],
            scatter: vec![],
            vertex_ranges: vec![VertexRange { first: 0, last: 2 }],
            outdeg: vec![1, 1, 1],
            prop: SyncUnsafeCell::new(vec![0.0; 16]),
            accum: SyncUnsafeCell::new(vec![0.0; 16]),
            has_info: SyncUnsafeCell::new(vec![]),
            has_info_next: SyncUnsafeCell::new(vec![]),
            merge_buffer: SyncUnsafeCell::new(vec![MergeEntry::default(); 8]),
            sched_counters: vec![AtomicU64::new(0)],
            units_per_node: 1,
            units_total: 1,
            reduce_scalar: AtomicU64::new(0),
            activation_counter: AtomicU64::new(0),
        }
    }

    #[test]
    fn pagerank_sum_stays_normalized_on_a_cycle() {
        let ctx = Arc::new(tiny_cycle_context());
        let topology = NumaTopology {
            num_nodes: 1,
            physical_cores: 1,
            logical_cpus: 1,
            nodes: vec![NumaNode { node_id: 0, cpus: vec![0], memory_gb: 0.0 }],
            is_uma: true,
        };

        let stats = run(Arc::clone(&ctx), &topology, 1, Binding::Default, 0.85, 20).unwrap();
        assert_eq!(stats.total_iterations_executed, 20);

        let prop = ctx.prop.get_ref();
        let ranks: Vec<f64> = (0..3).map(|v| prop[v] * ctx.outdeg[v] as f64).collect();
        let sum: f64 = ranks.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6, "ranks should sum to ~1.0, got {sum}");

        // A symmetric cycle converges to equal rank at every vertex.
        for &r in &ranks {
            assert!((r - 1.0 / 3.0).abs() < 1e-3, "expected ~1/3, got {r}");
        }
    }
}
