// src/scheduler.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-NUMA-node dynamic work scheduler and merge-buffer reconciliation.
//!
//! Grounded on `scheduler.c` (the `sched_pull_units_per_node` /
//! `sched_pull_units_total` globals, here fields of `GraphContext`) and
//! `phases.c::edge_pull_op_merge_with_merge_buffer` (the merge scan below,
//! transcribed step for step).

use crate::context::{GraphContext, MergeEntry};
use std::sync::atomic::Ordering;

/// Default scheduling granularity when `-s` is not given: 32 units per
/// thread-per-node, per `main.c`'s `(threads/nodes) << 5`.
pub const DEFAULT_UNITS_PER_THREAD_PER_NODE: u64 = 32;

/// Computes `units_per_node` from either the default granularity or an
/// explicit `-s vectors-per-unit` override, per `main.c`'s exact logic.
/// Returns `None` if an explicit override divides the gather slab into zero
/// units (the "graph too small" failure mode).
pub fn compute_units_per_node(
    threads_per_node: u64,
    gather_vector_count: u64,
    num_nodes: u64,
    vectors_per_unit_override: Option<u64>,
) -> Option<u64> {
    match vectors_per_unit_override {
        None => Some(threads_per_node * DEFAULT_UNITS_PER_THREAD_PER_NODE),
        Some(granularity) => {
            let units = gather_vector_count / num_nodes / granularity;
            if units == 0 {
                None
            } else {
                Some(units)
            }
        }
    }
}

/// Resets every node's atomic work counter to zero, for the start of a
/// pull-engine edge phase.
pub fn reset_counters(ctx: &GraphContext) {
    for counter in &ctx.sched_counters {
        counter.store(0, Ordering::Relaxed);
    }
}

/// A worker on node `group` claims its next unit via atomic fetch-add.
/// Returns `None` once every unit on the node has been claimed.
pub fn claim_unit(ctx: &GraphContext, group: usize) -> Option<u64> {
    let claimed = ctx.sched_counters[group].fetch_add(1, Ordering::Relaxed);
    if claimed < ctx.units_per_node {
        Some(claimed)
    } else {
        None
    }
}

/// The `[start, end)` edge-vector range for unit `unit` on a node whose
/// gather slab has `slab_len` vectors.
pub fn unit_range(slab_len: usize, units_per_node: u64, unit: u64) -> std::ops::Range<usize> {
    let unit_len = slab_len as u64 / units_per_node.max(1);
    let start = (unit * unit_len) as usize;
    let end = if unit + 1 == units_per_node {
        slab_len
    } else {
        ((unit + 1) * unit_len) as usize
    };
    start..end
}

/// Resets every merge-buffer entry to empty, for the start of a pull-engine
/// edge phase. Re-running this on an already-merged buffer (every entry
/// already empty) is a no-op, matching the idempotence property §8 requires.
pub fn reset_merge_buffer(entries: &mut [MergeEntry]) {
    for entry in entries.iter_mut() {
        *entry = MergeEntry::default();
    }
}

/// Single-threaded merge reconciliation, run once per pull phase after the
/// phase barrier. Transcribed from
/// `phases.c::edge_pull_op_merge_with_merge_buffer`: `reduce` is `sum` for
/// PageRank, `min` for BFS/CC (the algorithm's `SCALAR_REDUCE_OP`).
pub fn merge_reconcile(
    entries: &[MergeEntry],
    accum: &mut [f64],
    reduce: impl Fn(f64, f64) -> f64,
) {
    let count = entries.len();
    let mut i = 0usize;

    while i < count && !entries[i].is_empty() {
        let mut proposed = entries[i].final_partial_value;

        let mut j = i + 1;
        while j < count && entries[j].final_vertex_id == entries[i].final_vertex_id {
            proposed = reduce(proposed, entries[j].final_partial_value);
            j += 1;
        }

        if j < count && entries[j].initial_vertex_id == entries[i].final_vertex_id {
            proposed = reduce(proposed, accum[entries[i].final_vertex_id as usize]);
        }

        accum[entries[i].final_vertex_id as usize] = proposed;
        i = j;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::MergeEntry;

    fn entry(initial: u64, final_v: u64, value: f64) -> MergeEntry {
        MergeEntry {
            initial_vertex_id: initial,
            final_vertex_id: final_v,
            final_partial_value: value,
            ..MergeEntry::default()
        }
    }

    #[test]
    fn merge_reconcile_is_idempotent_on_empty_buffer() {
        let entries = vec![MergeEntry::default(); 4];
        let mut accum = vec![0.0; 4];
        merge_reconcile(&entries, &mut accum, |a, b| a + b);
        assert_eq!(accum, vec![0.0; 4]);
    }

    #[test]
    fn merge_reconcile_sums_overlapping_tails() {
        // Two threads both touched vertex 2 at their unit boundary: thread A
        // ends on vertex 2 with partial 3.0, thread B starts and ends on
        // vertex 2 with partial 4.0.
        let entries = vec![
            entry(0, 2, 3.0),
            entry(2, 2, 4.0),
            MergeEntry::default(),
        ];
        let mut accum = vec![0.0; 3];
        merge_reconcile(&entries, &mut accum, |a, b| a + b);
        assert_eq!(accum[2], 7.0);
    }

    #[test]
    fn merge_reconcile_folds_in_committed_interior_value() {
        // accum[2] already holds 10.0 from interior (non-boundary) edges
        // committed directly by the kernel; the next unit starts on vertex 2.
        let mut accum = vec![0.0, 0.0, 10.0];
        let entries = vec![entry(0, 2, 5.0), entry(2, 5, 1.0)];
        merge_reconcile(&entries, &mut accum, |a, b| a + b);
        assert_eq!(accum[2], 15.0);
    }

    #[test]
    fn claim_unit_exhausts_after_units_per_node() {
        let ctx_counters = vec![std::sync::atomic::AtomicU64::new(0)];
        let units_per_node = 3u64;

        let mut claimed = vec![];
        loop {
            let c = ctx_counters[0].fetch_add(1, Ordering::Relaxed);
            if c < units_per_node {
                claimed.push(c);
            } else {
                break;
            }
        }
        assert_eq!(claimed, vec![0, 1, 2]);
    }

    #[test]
    fn unit_range_last_unit_absorbs_remainder() {
        let r0 = unit_range(10, 3, 0);
        let r1 = unit_range(10, 3, 1);
        let r2 = unit_range(10, 3, 2);
        assert_eq!(r0, 0..3);
        assert_eq!(r1, 3..6);
        assert_eq!(r2, 6..10);
    }
}
