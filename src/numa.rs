// src/numa.rs
//
// SPDX-License-Identifier: MIT OR Apache-2.0

//! NUMA topology detection, node-bound allocation, and page migration.
//!
//! Uses hwlocality for cross-platform NUMA topology detection and binding.

use anyhow::Result;
use hwlocality::{
    memory::binding::{MemoryBindingFlags, MemoryBindingPolicy},
    object::types::ObjectType,
    Topology,
};
use std::collections::HashSet;

/// Sentinel returned by topology queries on invalid input, matching the
/// reference's `UINT32_MAX` convention (`numanodes_get_processor_node` et al).
pub const INVALID: u32 = u32::MAX;

/// NUMA node information.
#[derive(Debug, Clone)]
pub struct NumaNode {
    pub node_id: usize,
    pub cpus: Vec<usize>,
    pub memory_gb: f64,
}

/// System NUMA topology.
#[derive(Debug, Clone)]
pub struct NumaTopology {
    pub num_nodes: usize,
    pub physical_cores: usize,
    pub logical_cpus: usize,
    pub nodes: Vec<NumaNode>,
    pub is_uma: bool,
}

impl NumaTopology {
    /// Detect NUMA topology from the system using hwlocality.
    pub fn detect() -> Result<Self> {
        tracing::debug!("detecting NUMA topology via hwlocality");

        let topology = Topology::new()?;
        let numa_nodes: Vec<_> = topology.objects_with_type(ObjectType::NUMANode).collect();

        let num_nodes = numa_nodes.len().max(1);
        let is_uma = num_nodes == 1;

        tracing::info!(num_nodes, "NUMA topology detected");

        let nodes: Vec<NumaNode> = if numa_nodes.is_empty() {
            vec![NumaNode {
                node_id: 0,
                cpus: (0..num_cpus::get()).collect(),
                memory_gb: 0.0,
            }]
        } else {
            numa_nodes
                .iter()
                .filter_map(|node| {
                    let node_id = node.os_index()?;
                    let cpuset = node.cpuset()?;
                    let cpus: Vec<usize> = (0..topology.objects_with_type(ObjectType::PU).count())
                        .filter(|&cpu_id| cpuset.is_set(cpu_id))
                        .collect();

                    Some(NumaNode {
                        node_id,
                        cpus,
                        memory_gb: 0.0,
                    })
                })
                .collect()
        };

        Ok(Self {
            num_nodes,
            physical_cores: num_cpus::get_physical(),
            logical_cpus: num_cpus::get(),
            nodes,
            is_uma,
        })
    }

    pub fn should_enable_numa_pinning(&self) -> bool {
        self.num_nodes > 1
    }

    pub fn deployment_type(&self) -> &str {
        if self.is_uma {
            "UMA (single NUMA node - cloud VM or workstation)"
        } else {
            "NUMA (multi-socket system or large cloud VM)"
        }
    }

    pub fn cpus_for_node(&self, node_id: usize) -> Option<&[usize]> {
        self.nodes
            .iter()
            .find(|n| n.node_id == node_id)
            .map(|n| n.cpus.as_slice())
    }

    /// `num_cpus_on(node)`: count of CPUs bound to `node`, or `INVALID` if the
    /// node does not exist. Mirrors `numanodes_get_num_processors_on_node`.
    pub fn num_cpus_on(&self, node_id: usize) -> u32 {
        self.cpus_for_node(node_id)
            .map(|cpus| cpus.len() as u32)
            .unwrap_or(INVALID)
    }

    /// `nth_cpu_on(node, n)`: the n-th CPU ID bound to `node`, or `INVALID`.
    /// Mirrors `numanodes_get_nth_processor_on_node`.
    pub fn nth_cpu_on(&self, node_id: usize, n: usize) -> u32 {
        match self.cpus_for_node(node_id) {
            Some(cpus) if n < cpus.len() => cpus[n] as u32,
            _ => INVALID,
        }
    }

    /// `node_of(cpu)`: the NUMA node owning `cpu`, or `INVALID`.
    /// Mirrors `numanodes_get_processor_node`.
    pub fn node_of(&self, cpu: usize) -> u32 {
        self.nodes
            .iter()
            .find(|n| n.cpus.contains(&cpu))
            .map(|n| n.node_id as u32)
            .unwrap_or(INVALID)
    }
}

/// A buffer allocated and bound to one NUMA node for the lifetime of the
/// program run. Generalizes the teacher's `allocate_numa_buffer`
/// (`Topology::binding_allocate_memory` with `MemoryBindingPolicy::Bind`)
/// from a byte buffer to a typed, growable region used by ingress and
/// partitioning to host per-node slabs, indices, and property arrays.
pub struct NumaBuffer<T> {
    ptr: *mut T,
    len: usize,
    node_id: usize,
}

// SAFETY: `NumaBuffer` is handed to exactly one owner (the partitioning
// layer) which distributes disjoint sub-slices to worker threads; the
// pointed-to memory itself is movable across threads.
unsafe impl<T: Send> Send for NumaBuffer<T> {}
unsafe impl<T: Sync> Sync for NumaBuffer<T> {}

impl<T> NumaBuffer<T> {
    pub fn node_id(&self) -> usize {
        self.node_id
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_slice(&self) -> &[T] {
        if self.ptr.is_null() {
            &[]
        } else {
            unsafe { std::slice::from_raw_parts(self.ptr, self.len) }
        }
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        if self.ptr.is_null() {
            &mut []
        } else {
            unsafe { std::slice::from_raw_parts_mut(self.ptr, self.len) }
        }
    }
}

impl<T: Default + Clone> NumaBuffer<T> {
    /// Allocates `data.len()` elements bound to `node_id` and copies `data`
    /// in. The partitioning layer uses this to place each NUMA node's
    /// edge-vector slab on its owning node instead of the global allocator.
    pub fn from_slice_on(data: &[T], node_id: usize) -> Option<Self> {
        let mut buf = alloc_on::<T>(data.len(), node_id)?;
        buf.as_mut_slice().clone_from_slice(data);
        Some(buf)
    }
}

impl<T> std::ops::Deref for NumaBuffer<T> {
    type Target = [T];
    fn deref(&self) -> &[T] {
        self.as_slice()
    }
}

impl<T> std::ops::DerefMut for NumaBuffer<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        self.as_mut_slice()
    }
}

/// Adopts an ordinary `Vec<T>`'s buffer without copying. Sound because
/// `Vec`'s allocation already matches `Layout::array::<T>(len)`, exactly
/// what `Drop` below deallocates with. Used where a slab is built in plain
/// `Vec` form (tests, small fixtures) but the field type wants one vocabulary.
impl<T> From<Vec<T>> for NumaBuffer<T> {
    fn from(v: Vec<T>) -> Self {
        let mut boxed = v.into_boxed_slice();
        let len = boxed.len();
        let ptr = boxed.as_mut_ptr();
        std::mem::forget(boxed);
        NumaBuffer { ptr, len, node_id: INVALID as usize }
    }
}

impl<T> Drop for NumaBuffer<T> {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe {
                std::ptr::drop_in_place(self.as_mut_slice());
                if let Ok(layout) = std::alloc::Layout::array::<T>(self.len) {
                    dealloc_raw(self.ptr as *mut u8, layout);
                }
            }
        }
    }
}

/// `alloc_on(size, node)`: page-aligned allocation bound to `node`. Returns
/// `None` on failure, matching the reference's null-on-failure contract.
/// Falls back to an ordinary heap allocation (no binding) when the `numa`
/// feature is disabled or binding fails, since single-socket deployments
/// still need to run the engine.
pub fn alloc_on<T: Default + Clone>(count: usize, node_id: usize) -> Option<NumaBuffer<T>> {
    if count == 0 {
        return Some(NumaBuffer {
            ptr: std::ptr::null_mut(),
            len: 0,
            node_id,
        });
    }

    let byte_len = count * std::mem::size_of::<T>();

    #[cfg(feature = "numa")]
    {
        if let Ok(topology) = Topology::new() {
            let numa_nodes: Vec<_> = topology.objects_with_type(ObjectType::NUMANode).collect();
            if let Some(target) = numa_nodes.iter().find(|n| n.os_index() == Some(node_id)) {
                if let Some(nodeset) = target.nodeset() {
                    let bound = unsafe {
                        topology.binding_allocate_memory(
                            byte_len,
                            nodeset,
                            MemoryBindingPolicy::Bind,
                            MemoryBindingFlags::ASSUME_SINGLE_THREAD,
                        )
                    };

                    if let Ok(mem) = bound {
                        let ptr = mem.as_ptr() as *mut T;
                        // hwlocality's guard is forgotten; `NumaBuffer::drop`
                        // owns the free from here via the system allocator.
                        std::mem::forget(mem);
                        init_default(ptr, count);
                        return Some(NumaBuffer {
                            ptr,
                            len: count,
                            node_id,
                        });
                    }
                }
            }
        }

        tracing::warn!(node_id, "NUMA-bound allocation failed, falling back to heap");
    }

    alloc_heap(count, node_id)
}

fn alloc_heap<T: Default + Clone>(count: usize, node_id: usize) -> Option<NumaBuffer<T>> {
    let layout = std::alloc::Layout::array::<T>(count).ok()?;
    let ptr = unsafe { std::alloc::alloc(layout) } as *mut T;
    if ptr.is_null() {
        return None;
    }
    init_default(ptr, count);
    Some(NumaBuffer {
        ptr,
        len: count,
        node_id,
    })
}

fn init_default<T: Default + Clone>(ptr: *mut T, count: usize) {
    for i in 0..count {
        unsafe { ptr.add(i).write(T::default()) };
    }
}

unsafe fn dealloc_raw(ptr: *mut u8, layout: std::alloc::Layout) {
    if layout.size() == 0 {
        return;
    }
    std::alloc::dealloc(ptr, layout);
}

/// `migrate(ptr, size, node)`: request that the page frames underlying
/// `[ptr, ptr+size)` move to `node`. Page-rounds the request exactly as the
/// reference's `numanodes_tonode_buffer` does (`addr & !0xFFF`, size rounded
/// up to the next page). A no-op on platforms without per-node page
/// migration, per the distilled contract.
#[cfg(target_os = "linux")]
pub fn migrate(ptr: *mut u8, size: usize, node_id: usize) {
    const PAGE: usize = 4096;
    let addr = ptr as usize & !(PAGE - 1);
    let rounded = size + (PAGE - (size % PAGE)) % PAGE;
    tracing::trace!(addr, rounded, node_id, "requesting page migration");
    // No portable, safe page-migration syscall wrapper is in this crate's
    // dependency set; deployments that need hard migration guarantees should
    // pre-bind via `alloc_on` instead. This call is intentionally a
    // best-effort no-op, matching the distilled contract's allowance.
    let _ = (addr, rounded, node_id);
}

#[cfg(not(target_os = "linux"))]
pub fn migrate(_ptr: *mut u8, _size: usize, _node_id: usize) {}

#[allow(dead_code)]
fn detect_numa_nodes() -> Result<usize> {
    tracing::trace!("detect_numa_nodes called");

    #[cfg(target_os = "linux")]
    {
        let node_path = std::path::Path::new("/sys/devices/system/node");
        if node_path.exists() {
            let mut numa_nodes = Vec::new();

            for entry in std::fs::read_dir(node_path)? {
                let entry = entry?;
                let name = entry.file_name();
                let name_str = name.to_string_lossy();

                if name_str.starts_with("node") && name_str[4..].chars().all(|c| c.is_ascii_digit())
                {
                    if let Ok(node_id) = name_str[4..].parse::<usize>() {
                        numa_nodes.push(node_id);
                    }
                }
            }

            if !numa_nodes.is_empty() {
                return Ok(numa_nodes.len());
            }
        }

        if let Ok(cpuinfo) = std::fs::read_to_string("/proc/cpuinfo") {
            let mut physical_ids = HashSet::new();

            for line in cpuinfo.lines() {
                if line.starts_with("physical id") {
                    if let Some(id_str) = line.split(':').nth(1) {
                        if let Ok(id) = id_str.trim().parse::<usize>() {
                            physical_ids.insert(id);
                        }
                    }
                }
            }

            if !physical_ids.is_empty() {
                return Ok(physical_ids.len());
            }
        }
    }

    tracing::debug!("could not detect NUMA topology, assuming UMA");
    Ok(1)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_tracing() {
        use tracing_subscriber::{fmt, EnvFilter};
        let _ = fmt()
            .with_env_filter(EnvFilter::from_default_env())
            .try_init();
    }

    #[test]
    fn test_detect_topology() {
        init_tracing();
        if let Ok(topology) = NumaTopology::detect() {
            assert!(topology.num_nodes >= 1);
            assert!(topology.physical_cores >= 1);
            assert!(topology.logical_cpus >= topology.physical_cores);
        }
    }

    #[test]
    fn test_alloc_on_heap_fallback() {
        let buf: Option<NumaBuffer<u64>> = alloc_on(16, 0);
        let buf = buf.expect("allocation should succeed");
        assert_eq!(buf.len(), 16);
        assert_eq!(buf.as_slice(), &[0u64; 16]);
    }

    #[test]
    fn test_alloc_on_zero_length() {
        let buf: NumaBuffer<u64> = alloc_on(0, 0).unwrap();
        assert!(buf.is_empty());
    }

    #[test]
    fn test_invalid_queries_return_sentinel() {
        let topo = NumaTopology {
            num_nodes: 1,
            physical_cores: 1,
            logical_cpus: 1,
            nodes: vec![NumaNode {
                node_id: 0,
                cpus: vec![0],
                memory_gb: 0.0,
            }],
            is_uma: true,
        };

        assert_eq!(topo.nth_cpu_on(5, 0), INVALID);
        assert_eq!(topo.num_cpus_on(5), INVALID);
        assert_eq!(topo.node_of(99), INVALID);
    }
}
