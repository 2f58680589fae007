// src/partition.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! NUMA partitioning of the edge-vector sequence (§4.5) and per-node vertex
//! index construction (§4.6).
//!
//! Grounded on `graphdata.c::graph_helper_numaize_scatter` /
//! `numaize_gather` (equal-count partition), `graph_helper_numaize_vertices`
//! (vertex-ID range assignment, 512-vertex rounding), and
//! `graph_helper_create_vertex_index` (the sentinel scan).

use crate::codec::EdgeVector;
use crate::context::{DirectionalSlab, VertexRange, INDEX_ABOVE_RANGE, INDEX_GAP};
use crate::error::GrazelleError;

/// Vertex-ID bit-group alignment: frontier bit-groups must not straddle
/// NUMA nodes, per §4.5's rationale.
const FRONTIER_ALIGNMENT: u64 = 512;

/// `node i` of `N` receives the contiguous range `[total*i/N, total*(i+1)/N)`
/// of the global edge-vector sequence, per §4.5's equal-count partition.
pub fn equal_count_range(total: usize, num_nodes: usize, i: usize) -> std::ops::Range<usize> {
    let start = total * i / num_nodes;
    let end = total * (i + 1) / num_nodes;
    start..end
}

/// Splits the global, shared-endpoint-sorted edge-vector sequence into one
/// slab per NUMA node, building each node's vertex index in the same pass.
pub fn partition_and_index(
    global: Vec<EdgeVector>,
    num_nodes: usize,
    num_vertices: u64,
) -> Result<Vec<DirectionalSlab>, GrazelleError> {
    let total = global.len();
    let mut slabs = Vec::with_capacity(num_nodes);

    for i in 0..num_nodes {
        let range = equal_count_range(total, num_nodes, i);
        let vectors =
            crate::numa::NumaBuffer::from_slice_on(&global[range], i).ok_or_else(|| {
                GrazelleError::AllocationFailed {
                    context: format!("edge-vector slab for NUMA node {i}"),
                }
            })?;
        let (index, lowest, highest) = build_vertex_index(&vectors, num_vertices);
        slabs.push(DirectionalSlab {
            vectors,
            index,
            lowest_vertex: lowest,
            highest_vertex: highest,
        });
    }

    Ok(slabs)
}

/// Builds the vertex index for one slab: `index[v]` is the offset of the
/// first vector whose shared endpoint is `v`, `INDEX_GAP` for vertices in a
/// gap within `[lowest, highest]`, `INDEX_ABOVE_RANGE` above `highest`. The
/// slab is assumed sorted by shared endpoint (an ingress precondition).
pub fn build_vertex_index(slab: &[EdgeVector], num_vertices: u64) -> (Vec<u64>, u64, u64) {
    let mut index = vec![INDEX_GAP; num_vertices as usize];

    if slab.is_empty() {
        for slot in index.iter_mut() {
            *slot = INDEX_ABOVE_RANGE;
        }
        return (index, 0, 0);
    }

    let mut lowest = u64::MAX;
    let mut highest = 0u64;
    let mut last_seen: Option<u64> = None;

    for (offset, vector) in slab.iter().enumerate() {
        let shared = vector.unpack_shared();

        if last_seen != Some(shared) {
            index[shared as usize] = offset as u64;
            last_seen = Some(shared);
        }

        lowest = lowest.min(shared);
        highest = highest.max(shared);
    }

    for v in (highest + 1)..num_vertices {
        index[v as usize] = INDEX_ABOVE_RANGE;
    }

    (index, lowest, highest)
}

/// Computes each node's owned vertex-ID range for property/accumulator
/// ownership, per §4.5: node `i`'s last vertex is the shared destination of
/// its last gather vector, rounded up so it is congruent to 511 mod 512;
/// node `i`'s first vertex is one past node `i-1`'s last; the final node
/// absorbs any tail up to `num_vertices - 1`.
pub fn compute_vertex_ranges(gather_slabs: &[DirectionalSlab], num_vertices: u64) -> Vec<VertexRange> {
    let num_nodes = gather_slabs.len();
    let mut ranges = Vec::with_capacity(num_nodes);
    let mut next_first = 0u64;

    for (i, slab) in gather_slabs.iter().enumerate() {
        let first = next_first;

        let last = if let Some(last_vector) = slab.vectors.last() {
            let dest = last_vector.unpack_shared();
            round_up_511_mod_512(dest)
        } else {
            first.saturating_sub(1) // empty range
        };

        let last = if i == num_nodes - 1 {
            num_vertices - 1
        } else {
            last
        };

        ranges.push(VertexRange { first, last });
        next_first = last + 1;
    }

    ranges
}

fn round_up_511_mod_512(value: u64) -> u64 {
    let rem = value % FRONTIER_ALIGNMENT;
    value + (FRONTIER_ALIGNMENT - 1 - rem)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vec_with_shared(shared: u64) -> EdgeVector {
        EdgeVector::pack(shared, [Some(0), None, None, None], 0)
    }

    #[test]
    fn equal_count_range_covers_total_exactly_once() {
        let total = 103;
        let num_nodes = 4;
        let mut covered = 0;
        let mut prev_end = 0;
        for i in 0..num_nodes {
            let r = equal_count_range(total, num_nodes, i);
            assert_eq!(r.start, prev_end);
            covered += r.len();
            prev_end = r.end;
        }
        assert_eq!(covered, total);
        assert_eq!(prev_end, total);
    }

    #[test]
    fn vertex_index_marks_gaps_and_above_range() {
        let slab = vec![vec_with_shared(2), vec_with_shared(2), vec_with_shared(5)];
        let (index, lowest, highest) = build_vertex_index(&slab, 8);

        assert_eq!(lowest, 2);
        assert_eq!(highest, 5);
        assert_eq!(index[2], 0);
        assert_eq!(index[3], INDEX_GAP);
        assert_eq!(index[4], INDEX_GAP);
        assert_eq!(index[5], 2);
        assert_eq!(index[6], INDEX_ABOVE_RANGE);
        assert_eq!(index[7], INDEX_ABOVE_RANGE);
    }

    #[test]
    fn vertex_ranges_round_up_and_final_node_absorbs_tail() {
        let slab0 = DirectionalSlab {
            vectors: vec![vec_with_shared(500)].into(),
            index: vec![],
            lowest_vertex: 500,
            highest_vertex: 500,
        };
        let slab1 = DirectionalSlab {
            vectors: vec![vec_with_shared(900)].into(),
            index: vec![],
            lowest_vertex: 900,
            highest_vertex: 900,
        };

        let ranges = compute_vertex_ranges(&[slab0, slab1], 1024);

        assert_eq!(ranges[0].first, 0);
        assert_eq!(ranges[0].last, 511); // 500 rounds up to 511
        assert_eq!(ranges[1].first, 512);
        assert_eq!(ranges[1].last, 1023); // final node absorbs tail
    }
}
