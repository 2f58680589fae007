// src/pool.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pinned worker-thread pool and the sense-reversing barrier that
//! synchronizes phases of execution.
//!
//! Generalizes the teacher's NUMA-pinning pattern
//! (`generator.rs::build_cpu_affinity_map` / `pin_thread_to_cores`, itself a
//! rayon `spawn_handler` hook) from a work-stealing pool into persistent,
//! 1:1 pinned OS threads — the model the distilled engine's phase kernels
//! require (no task queue beyond the dynamic scheduler's atomic counter).

use crate::error::GrazelleError;
use crate::numa::NumaTopology;
use std::cell::Cell;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Per-thread identity and scratch state, handed to every worker when its
/// phase function runs. Mirrors the reference's `threadinfo_t` plus the
/// "per-thread 64-bit scratch variable" design note (§9): a general-purpose
/// slot reimplementations should expose via thread-local storage or an
/// argument — here, an argument field on this context.
pub struct ThreadContext {
    pub global_id: u32,
    pub group_id: u32,
    pub group_thread_id: u32,
    pub total_threads: u32,
    pub total_groups: u32,
    pub threads_per_group: u32,
    pub scratch: Cell<u64>,
    barrier: Arc<SenseBarrier>,
}

impl ThreadContext {
    pub fn barrier(&self) {
        self.barrier.wait();
    }

    pub fn timed_barrier(&self) -> Duration {
        self.barrier.wait_timed()
    }
}

/// A fast sense-reversing barrier implemented with a fetch-add atomic
/// counter, as the distilled spec's §4.2/§5 call for ("no task queue beyond
/// the dynamic scheduler; suspension only at the global barrier").
struct SenseBarrier {
    count: AtomicUsize,
    generation: AtomicUsize,
    total: usize,
}

impl SenseBarrier {
    fn new(total: usize) -> Self {
        SenseBarrier {
            count: AtomicUsize::new(0),
            generation: AtomicUsize::new(0),
            total,
        }
    }

    fn wait(&self) {
        let gen = self.generation.load(Ordering::Acquire);
        let arrived = self.count.fetch_add(1, Ordering::AcqRel) + 1;

        if arrived == self.total {
            self.count.store(0, Ordering::Release);
            self.generation.fetch_add(1, Ordering::Release);
        } else {
            while self.generation.load(Ordering::Acquire) == gen {
                std::hint::spin_loop();
            }
        }
    }

    fn wait_timed(&self) -> Duration {
        let start = Instant::now();
        self.wait();
        start.elapsed()
    }
}

/// Affinity binding strategy for `ThreadPool::spawn`. Default binding fills
/// the CPUs of each node sequentially; alt-binding interleaves across both
/// hyperthread siblings of each physical core, per §4.2 and
/// `threads.c::threads_spawn`'s two affinity formulas.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Binding {
    Default,
    Alternate,
}

/// Spawns `count` worker threads pinned round-robin across `nodes`, then
/// calls `func(&ThreadContext)` on every thread (including the caller, which
/// becomes global thread 0 per the distilled spec's explicit statement — see
/// DESIGN.md for the reference's differing thread-0 assignment). Each worker
/// runs between two implicit barriers, matching `threads_start_func`'s
/// `barrier(); func(); barrier();` envelope.
pub fn spawn<F>(
    count: u32,
    nodes: &[usize],
    topology: &NumaTopology,
    binding: Binding,
    func: F,
) -> Result<(), GrazelleError>
where
    F: Fn(&ThreadContext) + Send + Sync,
{
    assert!(count > 0, "thread count must be positive");
    let num_groups = nodes.len() as u32;
    let per_group = if count < num_groups { 1 } else { count / num_groups };
    let threads_per_group = count / num_groups.max(1);

    let barrier = Arc::new(SenseBarrier::new(count as usize));
    let func = Arc::new(func);

    let affinity_for = |i: u32| -> Option<usize> {
        let group = i / per_group;
        let node = *nodes.get(group as usize)?;
        let cpus_on_node = topology.num_cpus_on(node);
        if cpus_on_node == 0 || cpus_on_node == crate::numa::INVALID {
            return None;
        }

        let n = match binding {
            Binding::Default => i % per_group,
            Binding::Alternate => {
                ((i & 1) * (cpus_on_node / 2)) + ((i % per_group) / 2)
            }
        };

        let cpu = topology.nth_cpu_on(node, n as usize);
        if cpu == crate::numa::INVALID {
            None
        } else {
            Some(cpu as usize)
        }
    };

    let make_context = |i: u32| ThreadContext {
        global_id: i,
        group_id: i / per_group,
        group_thread_id: i % per_group,
        total_threads: count,
        total_groups: num_groups,
        threads_per_group,
        scratch: Cell::new(0),
        barrier: Arc::clone(&barrier),
    };

    let mut handles = Vec::with_capacity((count - 1) as usize);

    for i in 1..count {
        let ctx = make_context(i);
        let affinity = affinity_for(i);
        let func = Arc::clone(&func);

        let builder = thread::Builder::new().name(format!("grazelle-worker-{i}"));
        let handle = builder
            .spawn(move || {
                if let Some(cpu_id) = affinity {
                    pin_current_thread(cpu_id);
                }
                ctx.barrier();
                func(&ctx);
                ctx.barrier();
            })
            .map_err(GrazelleError::ThreadSpawnFailed)?;
        handles.push(handle);
    }

    // Thread 0 is the calling thread, per the distilled spec's explicit text.
    let ctx0 = make_context(0);
    if let Some(cpu_id) = affinity_for(0) {
        pin_current_thread(cpu_id);
    }
    ctx0.barrier();
    func(&ctx0);
    ctx0.barrier();

    for handle in handles {
        let _ = handle.join();
    }

    Ok(())
}

/// Pins the calling thread to `cpu_id`. Shared with `ingress`, whose
/// producer/consumer threads pin to the destination NUMA node per §4.4.
#[cfg(feature = "thread-pinning")]
pub(crate) fn pin_current_thread(cpu_id: usize) {
    if let Some(core_ids) = core_affinity::get_core_ids() {
        if let Some(core) = core_ids.into_iter().find(|c| c.id == cpu_id) {
            core_affinity::set_for_current(core);
        }
    }
}

#[cfg(not(feature = "thread-pinning"))]
pub(crate) fn pin_current_thread(_cpu_id: usize) {}
