//! Point-data grids.
//!
//! Points live on the same 8³ leaf lattice as volumes, bucketed by the
//! leaf containing their world position. Each leaf stores one typed
//! attribute array per descriptor entry plus one bitset per named group.
//! The attribute descriptor (names, types, order) is grid-wide; kernels
//! index attributes and groups by their descriptor position.

use crate::coord::Coord;
use crate::transform::Transform;
use crate::volume::AttrType;

/// Name of the mandatory position attribute, always at descriptor index 0.
pub const POSITION_ATTRIBUTE: &str = "P";

/// A typed per-point value array within one leaf.
#[derive(Debug, Clone)]
pub enum AttributeArray {
    Bool(Vec<u8>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
    Vec3F(Vec<[f32; 3]>),
    Mat4F(Vec<[f32; 16]>),
}

impl AttributeArray {
    pub fn new(attr_type: AttrType, count: usize) -> Self {
        match attr_type {
            AttrType::Bool => AttributeArray::Bool(vec![0; count]),
            AttrType::I32 => AttributeArray::I32(vec![0; count]),
            AttrType::I64 => AttributeArray::I64(vec![0; count]),
            AttrType::F32 => AttributeArray::F32(vec![0.0; count]),
            AttrType::F64 => AttributeArray::F64(vec![0.0; count]),
            AttrType::Vec3F => AttributeArray::Vec3F(vec![[0.0; 3]; count]),
            AttrType::Mat4F => AttributeArray::Mat4F(vec![[0.0; 16]; count]),
        }
    }

    pub fn attr_type(&self) -> AttrType {
        match self {
            AttributeArray::Bool(_) => AttrType::Bool,
            AttributeArray::I32(_) => AttrType::I32,
            AttributeArray::I64(_) => AttrType::I64,
            AttributeArray::F32(_) => AttrType::F32,
            AttributeArray::F64(_) => AttrType::F64,
            AttributeArray::Vec3F(_) => AttrType::Vec3F,
            AttributeArray::Mat4F(_) => AttrType::Mat4F,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            AttributeArray::Bool(v) => v.len(),
            AttributeArray::I32(v) => v.len(),
            AttributeArray::I64(v) => v.len(),
            AttributeArray::F32(v) => v.len(),
            AttributeArray::F64(v) => v.len(),
            AttributeArray::Vec3F(v) => v.len(),
            AttributeArray::Mat4F(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw base pointer for kernel handle marshalling.
    pub fn base_ptr(&mut self) -> *mut u8 {
        match self {
            AttributeArray::Bool(v) => v.as_mut_ptr() as *mut u8,
            AttributeArray::I32(v) => v.as_mut_ptr() as *mut u8,
            AttributeArray::I64(v) => v.as_mut_ptr() as *mut u8,
            AttributeArray::F32(v) => v.as_mut_ptr() as *mut u8,
            AttributeArray::F64(v) => v.as_mut_ptr() as *mut u8,
            AttributeArray::Vec3F(v) => v.as_mut_ptr() as *mut u8,
            AttributeArray::Mat4F(v) => v.as_mut_ptr() as *mut u8,
        }
    }
}

/// Membership bitset for one group within one leaf.
#[derive(Debug, Clone, Default)]
pub struct GroupBits {
    words: Vec<u64>,
    /// Cached membership count, refreshed by the executable's merge pass.
    count: usize,
}

impl GroupBits {
    pub fn new(point_count: usize) -> Self {
        GroupBits {
            words: vec![0; point_count.div_ceil(64)],
            count: 0,
        }
    }

    pub fn is_member(&self, index: usize) -> bool {
        self.words[index >> 6] & (1u64 << (index & 63)) != 0
    }

    pub fn set_member(&mut self, index: usize, on: bool) {
        let bit = 1u64 << (index & 63);
        if on {
            self.words[index >> 6] |= bit;
        } else {
            self.words[index >> 6] &= !bit;
        }
    }

    /// Recount members from the raw words and refresh the cache.
    pub fn refresh_count(&mut self) -> usize {
        self.count = self.words.iter().map(|w| w.count_ones() as usize).sum();
        self.count
    }

    pub fn cached_count(&self) -> usize {
        self.count
    }

    pub fn words_ptr(&mut self) -> *mut u64 {
        self.words.as_mut_ptr()
    }
}

/// One leaf's points: typed attribute columns plus group bitsets.
#[derive(Debug, Clone)]
pub struct PointLeaf {
    origin: Coord,
    count: usize,
    attrs: Vec<AttributeArray>,
    groups: Vec<GroupBits>,
}

impl PointLeaf {
    pub fn origin(&self) -> Coord {
        self.origin
    }

    pub fn point_count(&self) -> usize {
        self.count
    }

    pub fn attr(&self, index: usize) -> &AttributeArray {
        &self.attrs[index]
    }

    pub fn attr_mut(&mut self, index: usize) -> &mut AttributeArray {
        &mut self.attrs[index]
    }

    pub fn group(&self, index: usize) -> &GroupBits {
        &self.groups[index]
    }

    pub fn group_mut(&mut self, index: usize) -> &mut GroupBits {
        &mut self.groups[index]
    }
}

/// A sparse grid of points with typed attributes and named groups.
#[derive(Debug, Clone)]
pub struct PointDataGrid {
    transform: Transform,
    attributes: Vec<(String, AttrType)>,
    groups: Vec<String>,
    leaves: Vec<PointLeaf>,
}

impl PointDataGrid {
    pub fn new(transform: Transform) -> Self {
        PointDataGrid {
            transform,
            attributes: vec![(POSITION_ATTRIBUTE.to_string(), AttrType::Vec3F)],
            groups: Vec::new(),
            leaves: Vec::new(),
        }
    }

    /// Build a grid from world-space positions, bucketing them into leaves.
    pub fn from_positions(transform: Transform, positions: &[[f32; 3]]) -> Self {
        let mut grid = PointDataGrid::new(transform);
        let mut buckets: std::collections::BTreeMap<(i32, i32, i32), Vec<[f32; 3]>> =
            std::collections::BTreeMap::new();
        for &p in positions {
            let index = transform.world_to_index([p[0] as f64, p[1] as f64, p[2] as f64]);
            let ijk = Coord::new(
                index[0].floor() as i32,
                index[1].floor() as i32,
                index[2].floor() as i32,
            );
            let origin = ijk.leaf_origin();
            buckets
                .entry((origin.x, origin.y, origin.z))
                .or_default()
                .push(p);
        }
        for ((x, y, z), points) in buckets {
            grid.add_leaf(Coord::new(x, y, z), &points);
        }
        grid
    }

    pub fn transform(&self) -> &Transform {
        &self.transform
    }

    /// Append a leaf whose position attribute is `positions`.
    ///
    /// Any attributes already in the descriptor are default-filled for the
    /// new points; existing group bitsets grow empty.
    pub fn add_leaf(&mut self, origin: Coord, positions: &[[f32; 3]]) {
        let count = positions.len();
        let mut attrs = Vec::with_capacity(self.attributes.len());
        for (i, (_, ty)) in self.attributes.iter().enumerate() {
            if i == 0 {
                attrs.push(AttributeArray::Vec3F(positions.to_vec()));
            } else {
                attrs.push(AttributeArray::new(*ty, count));
            }
        }
        let groups = self.groups.iter().map(|_| GroupBits::new(count)).collect();
        self.leaves.push(PointLeaf {
            origin: origin.leaf_origin(),
            count,
            attrs,
            groups,
        });
    }

    pub fn attribute_index(&self, name: &str) -> Option<(usize, AttrType)> {
        self.attributes
            .iter()
            .position(|(n, _)| n == name)
            .map(|i| (i, self.attributes[i].1))
    }

    /// Add an attribute to the descriptor, default-filling every leaf.
    /// Returns its descriptor index; a no-op if it already exists with the
    /// same type.
    pub fn ensure_attribute(&mut self, name: &str, attr_type: AttrType) -> usize {
        if let Some((index, existing)) = self.attribute_index(name) {
            assert_eq!(
                existing, attr_type,
                "attribute {:?} already exists as {}",
                name, existing
            );
            return index;
        }
        self.attributes.push((name.to_string(), attr_type));
        for leaf in &mut self.leaves {
            leaf.attrs.push(AttributeArray::new(attr_type, leaf.count));
        }
        self.attributes.len() - 1
    }

    pub fn group_index(&self, name: &str) -> Option<usize> {
        self.groups.iter().position(|n| n == name)
    }

    /// Add a group to the descriptor, with empty membership everywhere.
    pub fn ensure_group(&mut self, name: &str) -> usize {
        if let Some(index) = self.group_index(name) {
            return index;
        }
        self.groups.push(name.to_string());
        for leaf in &mut self.leaves {
            leaf.groups.push(GroupBits::new(leaf.count));
        }
        self.groups.len() - 1
    }

    pub fn group_names(&self) -> &[String] {
        &self.groups
    }

    pub fn attributes(&self) -> &[(String, AttrType)] {
        &self.attributes
    }

    pub fn leaves(&self) -> &[PointLeaf] {
        &self.leaves
    }

    pub fn leaves_mut(&mut self) -> &mut [PointLeaf] {
        &mut self.leaves
    }

    pub fn point_count(&self) -> usize {
        self.leaves.iter().map(|l| l.count).sum()
    }

    /// Total membership of a group, from the cached per-leaf counts.
    pub fn group_size(&self, name: &str) -> usize {
        match self.group_index(name) {
            Some(g) => self.leaves.iter().map(|l| l.groups[g].cached_count()).sum(),
            None => 0,
        }
    }

    /// All positions, leaf by leaf (test convenience).
    pub fn positions(&self) -> Vec<[f32; 3]> {
        let mut out = Vec::with_capacity(self.point_count());
        for leaf in &self.leaves {
            if let AttributeArray::Vec3F(p) = &leaf.attrs[0] {
                out.extend_from_slice(p);
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bucketing() {
        let grid = PointDataGrid::from_positions(
            Transform::new(1.0),
            &[[0.5, 0.5, 0.5], [1.5, 0.5, 0.5], [9.0, 0.0, 0.0]],
        );
        // First two land in the leaf at the origin, the third at x=8.
        assert_eq!(grid.leaves().len(), 2);
        assert_eq!(grid.point_count(), 3);
        assert_eq!(grid.leaves()[0].point_count(), 2);
        assert_eq!(grid.leaves()[0].origin(), Coord::new(0, 0, 0));
        assert_eq!(grid.leaves()[1].origin(), Coord::new(8, 0, 0));
    }

    #[test]
    fn test_ensure_attribute_backfills() {
        let mut grid =
            PointDataGrid::from_positions(Transform::new(1.0), &[[0.0; 3], [1.0, 0.0, 0.0]]);
        let index = grid.ensure_attribute("mass", AttrType::F32);
        assert_eq!(index, 1);
        assert_eq!(grid.leaves()[0].attr(index).len(), 2);
        // Idempotent
        assert_eq!(grid.ensure_attribute("mass", AttrType::F32), 1);
    }

    #[test]
    fn test_groups() {
        let mut grid = PointDataGrid::from_positions(Transform::new(1.0), &[[0.0; 3], [0.5; 3]]);
        let g = grid.ensure_group("wet");
        let leaf = &mut grid.leaves_mut()[0];
        leaf.group_mut(g).set_member(1, true);
        leaf.group_mut(g).refresh_count();
        assert!(!grid.leaves()[0].group(g).is_member(0));
        assert!(grid.leaves()[0].group(g).is_member(1));
        assert_eq!(grid.group_size("wet"), 1);
        assert_eq!(grid.group_size("dry"), 0);
    }
}
