// src/lib.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Hardware-optimized, NUMA-aware, vectorized graph-processing engine.
//!
//! Runs PageRank, BFS, and Connected Components over edge lists too large
//! for a single cache, using a 256-bit packed edge-vector codec, per-NUMA-node
//! slab partitioning, pinned worker threads, and a dynamic work-stealing
//! scheduler across pull (gather) and push (scatter) phase kernels.

pub mod error;

#[cfg(feature = "numa")]
pub mod numa;

pub mod algorithms;
pub mod codec;
pub mod context;
pub mod ingress;
pub mod kernel;
pub mod partition;
pub mod pool;
pub mod scheduler;

pub mod cli;

pub use context::GraphContext;
pub use error::GrazelleError;

#[cfg(feature = "numa")]
pub use numa::{NumaNode, NumaTopology};
