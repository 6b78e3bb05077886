//! Executable kernels.
//!
//! An executable owns the JIT module (its code pages live until the last
//! executable referencing them drops), the frozen attribute registry and
//! the bound custom data. It never holds the grids themselves: those
//! arrive at `execute` time, get pre-sized from the registry and are
//! walked leaf by leaf on the rayon pool.
//!
//! Each leaf is processed in full by exactly one worker, so kernel
//! writes never race: attribute pointers handed to a kernel invocation
//! are leaf-local, and the only cross-leaf step — merging point group
//! metadata — runs serially after the parallel pass.

use crate::codegen::jit::Jit;
use crate::error::Diagnostic;
use crate::semantic::{AttributeRegistry, GroupUse};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::debug;
use vexel_grid::{Coord, GridSet, LeafMask, PointDataGrid, Transform, VolumeGrid};
use vexel_runtime::PointLocalData;

/// Why an execution could not start.
#[derive(Debug, Clone, PartialEq)]
pub enum ExecuteError {
    /// A registry attribute exists on the target with a different type,
    /// so it cannot be materialised as requested.
    AttributeTypeMismatch {
        name: String,
        expected: vexel_grid::AttrType,
        found: vexel_grid::AttrType,
    },
}

impl std::fmt::Display for ExecuteError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExecuteError::AttributeTypeMismatch {
                name,
                expected,
                found,
            } => write!(
                f,
                "attribute '{}' is {} on the grid but the kernel needs {}",
                name, found, expected
            ),
        }
    }
}

impl std::error::Error for ExecuteError {}

/// A compiled kernel for either target.
pub enum Executable {
    Volume(VolumeExecutable),
    Point(PointExecutable),
}

type VolumeKernelFn =
    unsafe extern "C" fn(*const i32, *const Transform, *mut *mut u8, *const u64, *const f64);

type PointKernelFn =
    unsafe extern "C" fn(u64, *mut PointLocalData, *mut *mut u8, *mut *mut u64, *const f64);

/// One leaf's marshalled state for a volume kernel pass.
struct VolumeLeafTask {
    origin: Coord,
    mask: LeafMask,
    attr_ptrs: Vec<*mut u8>,
}

// SAFETY: every task points into a distinct leaf of each grid and is
// consumed by exactly one worker; the grid set is not structurally
// modified while tasks are alive.
unsafe impl Send for VolumeLeafTask {}

/// A compiled volume kernel bound to an attribute registry.
pub struct VolumeExecutable {
    /// Keeps the JIT code pages alive for as long as `entry` may run.
    _jit: Arc<Jit>,
    entry: *const u8,
    attributes: AttributeRegistry,
    custom: Vec<f64>,
    warnings: Vec<Diagnostic>,
}

// SAFETY: `entry` points into the immutable code pages owned by `jit`;
// calling it from several threads is the whole point of the leaf pool.
unsafe impl Send for VolumeExecutable {}
unsafe impl Sync for VolumeExecutable {}

impl VolumeExecutable {
    pub(crate) fn new(
        jit: Arc<Jit>,
        entry: *const u8,
        attributes: AttributeRegistry,
        custom: Vec<f64>,
        warnings: Vec<Diagnostic>,
    ) -> Self {
        VolumeExecutable {
            _jit: jit,
            entry,
            attributes,
            custom,
            warnings,
        }
    }

    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Run the kernel over every active voxel of the set.
    ///
    /// Attributes missing from the set are created with the registered
    /// type, zero background and the topology of the grids the kernel
    /// reads; the kernel is then invoked once per active voxel, leaves
    /// in parallel.
    pub fn execute(&self, grids: &mut GridSet) -> Result<(), ExecuteError> {
        let transform = grids
            .grids()
            .first()
            .map(|g| g.transform())
            .unwrap_or_default();

        // Materialise registry attributes on the set.
        for attr in self.attributes.attrs() {
            let expected = attr
                .ty
                .attr_type()
                .expect("registry holds only grid-storable types");
            match grids.find(&attr.name) {
                Some(grid) if grid.attr_type() != expected => {
                    return Err(ExecuteError::AttributeTypeMismatch {
                        name: attr.name.clone(),
                        expected,
                        found: grid.attr_type(),
                    });
                }
                Some(_) => {}
                None => grids.push(VolumeGrid::new(&attr.name, expected, transform)),
            }
        }

        // Dominant topology: the union of the masks of every referenced
        // grid. Freshly created write-only grids contribute nothing; the
        // pre-existing data decides where the kernel runs.
        let mut topology: BTreeMap<(i32, i32, i32), LeafMask> = BTreeMap::new();
        for attr in self.attributes.attrs() {
            let grid = grids.find(&attr.name).expect("materialised above");
            for origin in grid.leaf_origins() {
                let mask = grid.leaf_mask(origin).expect("origin came from the grid");
                topology
                    .entry((origin.x, origin.y, origin.z))
                    .or_default()
                    .or_with(&mask);
            }
        }

        for attr in self.attributes.attrs() {
            let grid = grids.find_mut(&attr.name).expect("materialised above");
            for (&(x, y, z), mask) in &topology {
                grid.ensure_leaf_with_mask(Coord::new(x, y, z), mask);
            }
        }

        // Marshal per-leaf pointer tables.
        let mut tasks = Vec::with_capacity(topology.len());
        for (&(x, y, z), mask) in &topology {
            let origin = Coord::new(x, y, z);
            let mut attr_ptrs = Vec::with_capacity(self.attributes.len());
            for attr in self.attributes.attrs() {
                let grid = grids.find_mut(&attr.name).expect("materialised above");
                attr_ptrs.push(
                    grid.leaf_values_ptr(origin)
                        .expect("leaf ensured for the union topology"),
                );
            }
            tasks.push(VolumeLeafTask {
                origin,
                mask: *mask,
                attr_ptrs,
            });
        }
        debug!(leaves = tasks.len(), "volume execute");

        let kernel: VolumeKernelFn = unsafe { std::mem::transmute(self.entry) };
        let custom = &self.custom;
        tasks.into_par_iter().for_each(|mut task| {
            let custom_ptr = if custom.is_empty() {
                std::ptr::null()
            } else {
                custom.as_ptr()
            };
            let mask_words = *task.mask.words();
            for offset in task.mask.iter_on() {
                let coord = Coord::from_leaf_offset(task.origin, offset).as_array();
                // SAFETY: the pointer table addresses this leaf only and
                // no other worker touches it; see VolumeLeafTask.
                unsafe {
                    kernel(
                        coord.as_ptr(),
                        &transform,
                        task.attr_ptrs.as_mut_ptr(),
                        mask_words.as_ptr(),
                        custom_ptr,
                    );
                }
            }
        });
        Ok(())
    }
}

/// One leaf's marshalled state for a point kernel pass.
struct PointLeafTask {
    leaf_index: usize,
    count: usize,
    attr_ptrs: Vec<*mut u8>,
    group_ptrs: Vec<*mut u64>,
    local: PointLocalData,
}

// SAFETY: as for VolumeLeafTask — one task per leaf, one worker per
// task.
unsafe impl Send for PointLeafTask {}

/// A compiled point kernel bound to an attribute registry and group
/// list.
pub struct PointExecutable {
    /// Keeps the JIT code pages alive for as long as `entry` may run.
    _jit: Arc<Jit>,
    entry: *const u8,
    attributes: AttributeRegistry,
    groups: Vec<GroupUse>,
    custom: Vec<f64>,
    warnings: Vec<Diagnostic>,
}

// SAFETY: as for VolumeExecutable.
unsafe impl Send for PointExecutable {}
unsafe impl Sync for PointExecutable {}

impl PointExecutable {
    pub(crate) fn new(
        jit: Arc<Jit>,
        entry: *const u8,
        attributes: AttributeRegistry,
        groups: Vec<GroupUse>,
        custom: Vec<f64>,
        warnings: Vec<Diagnostic>,
    ) -> Self {
        PointExecutable {
            _jit: jit,
            entry,
            attributes,
            groups,
            custom,
            warnings,
        }
    }

    pub fn attributes(&self) -> &AttributeRegistry {
        &self.attributes
    }

    pub fn warnings(&self) -> &[Diagnostic] {
        &self.warnings
    }

    /// Run the kernel once per point, leaves in parallel, then merge
    /// per-leaf group metadata back into the grid.
    pub fn execute(&self, grid: &mut PointDataGrid) -> Result<(), ExecuteError> {
        // Materialise attributes and referenced groups.
        let mut attr_map = Vec::with_capacity(self.attributes.len());
        for attr in self.attributes.attrs() {
            let expected = attr
                .ty
                .attr_type()
                .expect("registry holds only grid-storable types");
            match grid.attribute_index(&attr.name) {
                Some((_, found)) if found != expected => {
                    return Err(ExecuteError::AttributeTypeMismatch {
                        name: attr.name.clone(),
                        expected,
                        found,
                    });
                }
                Some((index, _)) => attr_map.push(index),
                None => attr_map.push(grid.ensure_attribute(&attr.name, expected)),
            }
        }
        // Groups the kernel reads materialise too: testing a group that
        // never existed is an empty-membership test, not an error.
        let group_map: Vec<usize> = self
            .groups
            .iter()
            .map(|g| grid.ensure_group(&g.name))
            .collect();

        let mut tasks = Vec::with_capacity(grid.leaves().len());
        for (leaf_index, leaf) in grid.leaves_mut().iter_mut().enumerate() {
            let count = leaf.point_count();
            let attr_ptrs = attr_map
                .iter()
                .map(|&i| leaf.attr_mut(i).base_ptr())
                .collect();
            let group_ptrs = group_map
                .iter()
                .map(|&i| leaf.group_mut(i).words_ptr())
                .collect();
            tasks.push(PointLeafTask {
                leaf_index,
                count,
                attr_ptrs,
                group_ptrs,
                local: PointLocalData::default(),
            });
        }
        debug!(leaves = tasks.len(), points = grid.point_count(), "point execute");

        let kernel: PointKernelFn = unsafe { std::mem::transmute(self.entry) };
        let custom = &self.custom;
        tasks.par_iter_mut().for_each(|task| {
            let custom_ptr = if custom.is_empty() {
                std::ptr::null()
            } else {
                custom.as_ptr()
            };
            for point in 0..task.count {
                // SAFETY: handles address this worker's leaf only; see
                // PointLeafTask.
                unsafe {
                    kernel(
                        point as u64,
                        &mut task.local,
                        task.attr_ptrs.as_mut_ptr(),
                        task.group_ptrs.as_mut_ptr(),
                        custom_ptr,
                    );
                }
            }
        });

        // Serial merge: refresh group counts on leaves whose membership
        // changed during the pass.
        for task in &tasks {
            if task.local.groups_dirty != 0 {
                let leaf = &mut grid.leaves_mut()[task.leaf_index];
                for &g in &group_map {
                    leaf.group_mut(g).refresh_count();
                }
            }
        }
        Ok(())
    }
}
