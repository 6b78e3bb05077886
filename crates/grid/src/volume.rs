//! Typed sparse volume grids.
//!
//! A [`Grid`] is a map from leaf origins to 8³ [`LeafNode`]s. Values are
//! dense within a leaf; sparsity lives at the leaf level plus the per-leaf
//! active mask. A [`GridSet`] is the executable-facing collection of named,
//! typed grids that together act as the attribute channels of one volume.

use crate::coord::{Coord, LEAF_VOXELS};
use crate::mask::LeafMask;
use crate::transform::Transform;
use std::collections::BTreeMap;

/// Value types a grid attribute can carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttrType {
    Bool,
    I32,
    I64,
    F32,
    F64,
    Vec3F,
    Mat4F,
}

impl AttrType {
    /// Per-voxel storage size in bytes, as seen by kernel code.
    pub fn size_bytes(self) -> usize {
        match self {
            AttrType::Bool => 1,
            AttrType::I32 | AttrType::F32 => 4,
            AttrType::I64 | AttrType::F64 => 8,
            AttrType::Vec3F => 12,
            AttrType::Mat4F => 64,
        }
    }
}

impl std::fmt::Display for AttrType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            AttrType::Bool => "bool",
            AttrType::I32 => "int32",
            AttrType::I64 => "int64",
            AttrType::F32 => "float",
            AttrType::F64 => "double",
            AttrType::Vec3F => "vec3f",
            AttrType::Mat4F => "mat4f",
        };
        f.write_str(name)
    }
}

/// A dense 8³ block of voxel values with an active mask.
#[derive(Debug, Clone)]
pub struct LeafNode<T> {
    origin: Coord,
    mask: LeafMask,
    values: Box<[T]>,
}

impl<T: Copy + Default> LeafNode<T> {
    pub fn new(origin: Coord) -> Self {
        debug_assert_eq!(origin, origin.leaf_origin());
        LeafNode {
            origin,
            mask: LeafMask::empty(),
            values: vec![T::default(); LEAF_VOXELS].into_boxed_slice(),
        }
    }

    pub fn origin(&self) -> Coord {
        self.origin
    }

    pub fn mask(&self) -> &LeafMask {
        &self.mask
    }

    /// Mark active and store in one step.
    pub fn set_value(&mut self, offset: usize, value: T) {
        self.values[offset] = value;
        self.mask.set(offset, true);
    }

    pub fn value(&self, offset: usize) -> T {
        self.values[offset]
    }

    /// Adopt another leaf's activity pattern without touching values.
    pub fn union_mask(&mut self, mask: &LeafMask) {
        self.mask.or_with(mask);
    }

    /// Base pointer of the value array, for kernel marshalling.
    pub fn values_ptr(&mut self) -> *mut T {
        self.values.as_mut_ptr()
    }
}

/// A sparse grid of `T`-valued voxels.
#[derive(Debug, Clone)]
pub struct Grid<T> {
    name: String,
    transform: Transform,
    leaves: BTreeMap<(i32, i32, i32), LeafNode<T>>,
}

impl<T: Copy + Default> Grid<T> {
    pub fn new(name: impl Into<String>, transform: Transform) -> Self {
        Grid {
            name: name.into(),
            transform,
            leaves: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    pub fn set_value(&mut self, ijk: Coord, value: T) {
        let origin = ijk.leaf_origin();
        self.ensure_leaf(origin).set_value(ijk.leaf_offset(), value);
    }

    /// Value at a coordinate; inactive voxels read as `T::default()`.
    pub fn value(&self, ijk: Coord) -> T {
        let origin = ijk.leaf_origin();
        match self.leaf(origin) {
            Some(leaf) => leaf.value(ijk.leaf_offset()),
            None => T::default(),
        }
    }

    pub fn is_active(&self, ijk: Coord) -> bool {
        self.leaf(ijk.leaf_origin())
            .is_some_and(|leaf| leaf.mask().is_on(ijk.leaf_offset()))
    }

    pub fn leaf(&self, origin: Coord) -> Option<&LeafNode<T>> {
        self.leaves.get(&(origin.x, origin.y, origin.z))
    }

    pub fn leaf_mut(&mut self, origin: Coord) -> Option<&mut LeafNode<T>> {
        self.leaves.get_mut(&(origin.x, origin.y, origin.z))
    }

    pub fn ensure_leaf(&mut self, origin: Coord) -> &mut LeafNode<T> {
        debug_assert_eq!(origin, origin.leaf_origin());
        self.leaves
            .entry((origin.x, origin.y, origin.z))
            .or_insert_with(|| LeafNode::new(origin))
    }

    /// Leaf origins in sorted order.
    pub fn leaf_origins(&self) -> Vec<Coord> {
        self.leaves
            .keys()
            .map(|&(x, y, z)| Coord::new(x, y, z))
            .collect()
    }

    pub fn leaf_count(&self) -> usize {
        self.leaves.len()
    }

    pub fn active_voxel_count(&self) -> usize {
        self.leaves.values().map(|l| l.mask().count_on()).sum()
    }

    /// Iterate `(coordinate, value)` for every active voxel.
    pub fn iter_active(&self) -> impl Iterator<Item = (Coord, T)> + '_ {
        self.leaves.values().flat_map(|leaf| {
            let origin = leaf.origin();
            leaf.mask()
                .iter_on()
                .map(move |off| (Coord::from_leaf_offset(origin, off), leaf.value(off)))
                .collect::<Vec<_>>()
        })
    }
}

/// A named, dynamically-typed volume grid.
///
/// `bool` voxels are stored as `u8` so kernels can address them with plain
/// byte loads and stores.
#[derive(Debug, Clone)]
pub enum VolumeGrid {
    Bool(Grid<u8>),
    I32(Grid<i32>),
    I64(Grid<i64>),
    F32(Grid<f32>),
    F64(Grid<f64>),
    Vec3F(Grid<[f32; 3]>),
    Mat4F(Grid<[f32; 16]>),
}

macro_rules! for_each_grid {
    ($self:expr, $g:ident => $body:expr) => {
        match $self {
            VolumeGrid::Bool($g) => $body,
            VolumeGrid::I32($g) => $body,
            VolumeGrid::I64($g) => $body,
            VolumeGrid::F32($g) => $body,
            VolumeGrid::F64($g) => $body,
            VolumeGrid::Vec3F($g) => $body,
            VolumeGrid::Mat4F($g) => $body,
        }
    };
}

impl VolumeGrid {
    pub fn new(name: &str, attr_type: AttrType, transform: Transform) -> Self {
        match attr_type {
            AttrType::Bool => VolumeGrid::Bool(Grid::new(name, transform)),
            AttrType::I32 => VolumeGrid::I32(Grid::new(name, transform)),
            AttrType::I64 => VolumeGrid::I64(Grid::new(name, transform)),
            AttrType::F32 => VolumeGrid::F32(Grid::new(name, transform)),
            AttrType::F64 => VolumeGrid::F64(Grid::new(name, transform)),
            AttrType::Vec3F => VolumeGrid::Vec3F(Grid::new(name, transform)),
            AttrType::Mat4F => VolumeGrid::Mat4F(Grid::new(name, transform)),
        }
    }

    pub fn name(&self) -> &str {
        for_each_grid!(self, g => g.name())
    }

    pub fn attr_type(&self) -> AttrType {
        match self {
            VolumeGrid::Bool(_) => AttrType::Bool,
            VolumeGrid::I32(_) => AttrType::I32,
            VolumeGrid::I64(_) => AttrType::I64,
            VolumeGrid::F32(_) => AttrType::F32,
            VolumeGrid::F64(_) => AttrType::F64,
            VolumeGrid::Vec3F(_) => AttrType::Vec3F,
            VolumeGrid::Mat4F(_) => AttrType::Mat4F,
        }
    }

    pub fn transform(&self) -> Transform {
        for_each_grid!(self, g => *g.transform())
    }

    pub fn leaf_origins(&self) -> Vec<Coord> {
        for_each_grid!(self, g => g.leaf_origins())
    }

    /// Active mask of the leaf at `origin`, if present.
    pub fn leaf_mask(&self, origin: Coord) -> Option<LeafMask> {
        for_each_grid!(self, g => g.leaf(origin).map(|l| *l.mask()))
    }

    /// Create the leaf at `origin` if missing and union `mask` into it.
    pub fn ensure_leaf_with_mask(&mut self, origin: Coord, mask: &LeafMask) {
        for_each_grid!(self, g => g.ensure_leaf(origin).union_mask(mask));
    }

    /// Raw value-array base pointer of the leaf at `origin`.
    ///
    /// The pointer stays valid while the leaf map is not mutated; the
    /// executable guarantees no structural changes during a kernel pass.
    pub fn leaf_values_ptr(&mut self, origin: Coord) -> Option<*mut u8> {
        for_each_grid!(self, g => g.leaf_mut(origin).map(|l| l.values_ptr() as *mut u8))
    }
}

/// The set of named grids one volume kernel reads and writes.
#[derive(Debug, Default)]
pub struct GridSet {
    grids: Vec<VolumeGrid>,
}

impl GridSet {
    pub fn new() -> Self {
        GridSet::default()
    }

    pub fn push(&mut self, grid: VolumeGrid) {
        debug_assert!(
            self.find(grid.name()).is_none(),
            "duplicate grid name {:?}",
            grid.name()
        );
        self.grids.push(grid);
    }

    pub fn find(&self, name: &str) -> Option<&VolumeGrid> {
        self.grids.iter().find(|g| g.name() == name)
    }

    pub fn find_mut(&mut self, name: &str) -> Option<&mut VolumeGrid> {
        self.grids.iter_mut().find(|g| g.name() == name)
    }

    pub fn grids(&self) -> &[VolumeGrid] {
        &self.grids
    }

    pub fn grids_mut(&mut self) -> &mut [VolumeGrid] {
        &mut self.grids
    }

    pub fn len(&self) -> usize {
        self.grids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.grids.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_read() {
        let mut grid: Grid<f32> = Grid::new("density", Transform::default());
        grid.set_value(Coord::new(0, 0, 0), 2.0);
        grid.set_value(Coord::new(1, 0, 0), 3.5);
        assert_eq!(grid.value(Coord::new(0, 0, 0)), 2.0);
        assert_eq!(grid.value(Coord::new(1, 0, 0)), 3.5);
        assert_eq!(grid.value(Coord::new(2, 2, 2)), 0.0);
        assert!(grid.is_active(Coord::new(1, 0, 0)));
        assert!(!grid.is_active(Coord::new(2, 2, 2)));
        assert_eq!(grid.active_voxel_count(), 2);
        assert_eq!(grid.leaf_count(), 1);
    }

    #[test]
    fn test_leaves_span_origins() {
        let mut grid: Grid<i32> = Grid::new("count", Transform::default());
        grid.set_value(Coord::new(0, 0, 0), 1);
        grid.set_value(Coord::new(8, 0, 0), 2);
        grid.set_value(Coord::new(-1, 0, 0), 3);
        assert_eq!(grid.leaf_count(), 3);
        let origins = grid.leaf_origins();
        assert!(origins.contains(&Coord::new(-8, 0, 0)));
        assert!(origins.contains(&Coord::new(0, 0, 0)));
        assert!(origins.contains(&Coord::new(8, 0, 0)));
    }

    #[test]
    fn test_grid_set_lookup() {
        let mut set = GridSet::new();
        set.push(VolumeGrid::new("density", AttrType::F32, Transform::default()));
        set.push(VolumeGrid::new("count", AttrType::I32, Transform::default()));
        assert_eq!(set.find("count").map(|g| g.attr_type()), Some(AttrType::I32));
        assert!(set.find("missing").is_none());
    }

    #[test]
    fn test_iter_active() {
        let mut grid: Grid<f32> = Grid::new("g", Transform::default());
        grid.set_value(Coord::new(3, 4, 5), 1.5);
        let all: Vec<_> = grid.iter_active().collect();
        assert_eq!(all, vec![(Coord::new(3, 4, 5), 1.5)]);
    }
}
