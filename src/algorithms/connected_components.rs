// src/algorithms/connected_components.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connected Components driver: label-propagation over the BFS frontier
//! envelope with a min-reduce and "no label changed" termination.
//!
//! No reference driver for this algorithm exists in the retrieved source
//! tree (`execution_cc.c` is absent from `original_source/`); this driver
//! is built directly from the distilled spec's §4.11 description — "as BFS
//! but with `prop[v] = v` initially; reduce op is min; terminates when no
//! vertex's label changes in an iteration" — reusing
//! [`crate::algorithms::run_frontier_driver`]'s envelope with every vertex
//! starting active (a vertex's own ID is a candidate label for all of its
//! neighbors from the first round) rather than only the search root.

use crate::algorithms::{run_frontier_driver, Engine, RunStats};
use crate::context::GraphContext;
use crate::error::GrazelleError;
use crate::numa::NumaTopology;
use crate::pool::Binding;
use std::sync::Arc;

const ENGINE_THRESHOLD_DENOMINATOR: u64 = 5;

/// Runs Connected Components, leaving `prop[v]` as the minimum vertex ID in
/// `v`'s weakly connected component.
pub fn run(
    ctx: Arc<GraphContext>,
    topology: &NumaTopology,
    thread_count: u32,
    binding: Binding,
    forced_engine: Option<Engine>,
) -> Result<RunStats, GrazelleError> {
    // Every vertex starts active, so the whole edge set is touched on the
    // first round regardless of the dynamic threshold; using the edge
    // count as the initial converge vote biases that first round to pull,
    // matching the reference BFS driver's pattern of seeding the vote high
    // enough to select pull engine while the frontier is still dense.
    let initial_converge_vote = ctx.num_edges.max(1);

    run_frontier_driver(
        ctx,
        topology,
        thread_count,
        binding,
        |_v| true,
        |v| v as f64,
        |source_prop| source_prop,
        |old_prop, candidate| candidate < old_prop,
        |_old_prop, candidate| candidate,
        initial_converge_vote,
        ENGINE_THRESHOLD_DENOMINATOR,
        forced_engine,
    )
}
