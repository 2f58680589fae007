// src/context.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `GraphContext`: the single value that owns every array the reference
//! exposes as process-wide globals (`graph_vertex_props`,
//! `graph_vertex_accumulators`, the per-node gather/scatter slabs and
//! indices, the frontiers, the merge buffer, the per-node scheduler
//! counters). Built once by ingress, then shared read-mostly across worker
//! threads for the lifetime of the run, per the design note in §9 and §3a of
//! the full specification.

use crate::codec::EdgeVector;
use std::cell::UnsafeCell;

/// A cell that is `Sync` by fiat: worker threads access disjoint index
/// ranges of the wrapped value (by NUMA-owned vertex range, or by scheduler
/// unit) and the driver enforces that partitioning, so concurrent `&mut`
/// access never actually overlaps. This is the same "prove partition, then
/// share raw pointers" pattern used by `sync_cell_slice::SyncSlice` in the
/// parallel BFS visit this engine draws on (see `other_examples`'
/// `vigna-webgraph-rs` parallel_fair.rs).
pub struct SyncUnsafeCell<T>(UnsafeCell<T>);

unsafe impl<T> Sync for SyncUnsafeCell<T> {}

impl<T> SyncUnsafeCell<T> {
    pub fn new(value: T) -> Self {
        SyncUnsafeCell(UnsafeCell::new(value))
    }

    /// # Safety
    /// The caller must ensure no two threads hold overlapping mutable views
    /// of the same indices at the same time.
    #[allow(clippy::mut_from_ref)]
    pub unsafe fn get_mut(&self) -> &mut T {
        &mut *self.0.get()
    }

    pub fn get_ref(&self) -> &T {
        unsafe { &*self.0.get() }
    }
}

/// One merge-buffer entry, 32 bytes logically (two `u64`s, one `f64`, one
/// `u64` of padding), grounded on the reference's `mergeaccum_t`. The high
/// bit of `initial_vertex_id` marks an empty entry, carried over unchanged
/// per §9's note that a reimplementation "may" use a tagged variant instead
/// — this one keeps the sentinel bit, since the merge-reconciliation scan in
/// `phases.c` depends on testing it as a plain integer comparison.
#[derive(Debug, Clone, Copy)]
pub struct MergeEntry {
    pub initial_vertex_id: u64,
    pub final_vertex_id: u64,
    pub final_partial_value: f64,
    _padding: u64,
}

pub const MERGE_ENTRY_EMPTY_BIT: u64 = 0x8000_0000_0000_0000;

impl Default for MergeEntry {
    fn default() -> Self {
        MergeEntry {
            initial_vertex_id: !0u64,
            final_vertex_id: !0u64,
            final_partial_value: 0.0,
            _padding: 0,
        }
    }
}

impl MergeEntry {
    pub fn is_empty(&self) -> bool {
        self.initial_vertex_id & MERGE_ENTRY_EMPTY_BIT != 0
    }
}

/// Vertex-index sentinel for a vertex that falls in a gap between shared
/// endpoints that do appear in a slab.
pub const INDEX_GAP: u64 = 0x7FFF_FFFF_FFFF_FFFF;

/// Vertex-index sentinel for a vertex ID above the maximum in a slab.
pub const INDEX_ABOVE_RANGE: u64 = 0xFFFF_FFFF_FFFF_FFFF;

/// Per-NUMA-node edge-vector slab plus its vertex index, for one direction
/// (gather or scatter).
pub struct DirectionalSlab {
    /// NUMA-node-bound storage for this slab's edge vectors; see
    /// [`crate::numa::NumaBuffer`].
    pub vectors: crate::numa::NumaBuffer<EdgeVector>,
    /// `index[v]` = offset of the first vector whose shared endpoint is `v`,
    /// or one of the two sentinels above.
    pub index: Vec<u64>,
    pub lowest_vertex: u64,
    pub highest_vertex: u64,
}

/// Per-NUMA-node slice of the vertex-ID range this node owns for
/// properties/accumulators/outdegrees, per §4.5.
#[derive(Debug, Clone, Copy)]
pub struct VertexRange {
    pub first: u64,
    pub last: u64, // inclusive
}

impl VertexRange {
    pub fn count(&self) -> u64 {
        if self.last < self.first {
            0
        } else {
            self.last - self.first + 1
        }
    }
}

/// The full graph state shared by every worker thread for one run.
pub struct GraphContext {
    pub num_vertices: u64,
    pub num_edges: u64,
    pub numa_nodes: Vec<usize>,

    pub gather: Vec<DirectionalSlab>,
    pub scatter: Vec<DirectionalSlab>,

    pub vertex_ranges: Vec<VertexRange>,

    /// Outdegree per vertex, read-only after ingress.
    pub outdeg: Vec<u64>,

    /// Converged value per vertex (PR rank / BFS distance / CC label).
    pub prop: SyncUnsafeCell<Vec<f64>>,
    /// Inter-phase accumulator, algorithm-interpreted per §4.9.
    pub accum: SyncUnsafeCell<Vec<f64>>,

    /// `HasInfo` bit-frontier, 1 bit per vertex (BFS/CC only).
    pub has_info: SyncUnsafeCell<Vec<u64>>,
    /// The double-buffer partner of `has_info`, built up by the vertex phase
    /// as "vertices this iteration just activated" and pointer-swapped with
    /// `has_info` once the phase completes. Generalizes the reference's
    /// `HasInfo`/`accum` pointer-swap (§9) into two same-typed bitset
    /// buffers and a swap, rather than reinterpreting the `f64` accumulator
    /// array as bits.
    pub has_info_next: SyncUnsafeCell<Vec<u64>>,

    pub merge_buffer: SyncUnsafeCell<Vec<MergeEntry>>,
    pub sched_counters: Vec<std::sync::atomic::AtomicU64>,
    pub units_per_node: u64,
    pub units_total: u64,

    /// Single-scalar inter-phase channel, generalizing the reference's
    /// reduce buffer (`phase_op_write_global_accum_to_buf` /
    /// `phase_op_combine_global_var_from_buf`) to the one value PageRank's
    /// dangling-mass correction and BFS/CC's converge-vote each need per
    /// iteration. Written by thread 0 between the merge and vertex-phase
    /// barriers, read by every thread during the vertex phase.
    pub reduce_scalar: std::sync::atomic::AtomicU64,

    /// Fetch-add counter for the number of vertices a vertex-phase pass
    /// newly activates, used by BFS/CC to compute each round's converge
    /// vote without a second reduce-buffer round trip.
    pub activation_counter: std::sync::atomic::AtomicU64,
}

impl GraphContext {
    pub fn num_nodes(&self) -> usize {
        self.numa_nodes.len()
    }

    /// SIMD tail-safety slack appended to every per-vertex array, per §3.
    pub const TAIL_SLACK: usize = 8;

    /// Index of the first scheduling unit owned by node `g`.
    pub fn unit_base(&self, group: usize) -> u64 {
        (group as u64) * self.units_per_node
    }

    pub fn store_reduce_f64(&self, value: f64) {
        self.reduce_scalar.store(value.to_bits(), std::sync::atomic::Ordering::Release);
    }

    pub fn load_reduce_f64(&self) -> f64 {
        f64::from_bits(self.reduce_scalar.load(std::sync::atomic::Ordering::Acquire))
    }

    pub fn store_reduce_u64(&self, value: u64) {
        self.reduce_scalar.store(value, std::sync::atomic::Ordering::Release);
    }

    pub fn load_reduce_u64(&self) -> u64 {
        self.reduce_scalar.load(std::sync::atomic::Ordering::Acquire)
    }

    /// Recomputes scheduling granularity once the final worker-thread count
    /// is known (ingress builds the context before thread count is fixed,
    /// using a placeholder of one thread per node).
    pub fn recompute_scheduling(
        &mut self,
        threads_per_node: u64,
        vectors_per_unit_override: Option<u64>,
    ) -> Result<(), crate::error::GrazelleError> {
        let gather_vector_count: u64 = self.gather.iter().map(|s| s.vectors.len() as u64).sum();
        let units_per_node = crate::scheduler::compute_units_per_node(
            threads_per_node,
            gather_vector_count,
            self.num_nodes() as u64,
            vectors_per_unit_override,
        )
        .ok_or(crate::error::GrazelleError::SchedulingImpossible)?;

        self.units_per_node = units_per_node;
        self.units_total = units_per_node * self.num_nodes() as u64;

        let merge_buffer = unsafe { self.merge_buffer.get_mut() };
        merge_buffer.resize(self.units_total as usize, MergeEntry::default());
        Ok(())
    }
}

/// 1-bit get/set helpers over a `Vec<u64>` bitset, shared by the frontier
/// fields and the BFS/CC drivers.
pub mod bitset {
    #[inline]
    pub fn get(bits: &[u64], v: u64) -> bool {
        let word = (v / 64) as usize;
        let shift = v % 64;
        (bits[word] >> shift) & 1 == 1
    }

    #[inline]
    pub fn set(bits: &mut [u64], v: u64, value: bool) {
        let word = (v / 64) as usize;
        let shift = v % 64;
        if value {
            bits[word] |= 1u64 << shift;
        } else {
            bits[word] &= !(1u64 << shift);
        }
    }

    pub fn words_for(num_vertices: u64) -> usize {
        ((num_vertices + 63) / 64) as usize
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn merge_entry_default_is_empty() {
        let e = MergeEntry::default();
        assert!(e.is_empty());
    }

    #[test]
    fn bitset_roundtrips() {
        let mut bits = vec![0u64; bitset::words_for(200)];
        bitset::set(&mut bits, 5, true);
        bitset::set(&mut bits, 130, true);
        assert!(bitset::get(&bits, 5));
        assert!(bitset::get(&bits, 130));
        assert!(!bitset::get(&bits, 6));

        bitset::set(&mut bits, 5, false);
        assert!(!bitset::get(&bits, 5));
    }

    #[test]
    fn vertex_range_count() {
        let r = VertexRange { first: 10, last: 19 };
        assert_eq!(r.count(), 10);
    }
}
