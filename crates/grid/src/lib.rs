//! Vexel Grid: sparse volumetric and point-data storage
//!
//! This crate provides the grid substrate that compiled Vexel kernels run
//! against. It is deliberately small: a sparse collection of fixed-size 8³
//! leaf nodes, each with a 512-bit active mask and a contiguous value
//! array, plus a point-data variant where leaves carry typed per-point
//! attribute arrays and named group bitsets.
//!
//! Layout choices here are ABI-relevant. Kernel code produced by the
//! compiler reads leaf value arrays through raw base pointers and reads
//! [`Transform`] fields at fixed offsets, so the `#[repr(C)]` types in
//! this crate must not change layout without a matching compiler change.
//!
//! # Modules
//!
//! - `coord`: voxel coordinates and leaf-local offset arithmetic
//! - `mask`: the 512-bit leaf value mask
//! - `transform`: uniform index↔world transform
//! - `volume`: typed sparse volume grids and named grid sets
//! - `points`: point-data grids with attribute arrays and groups

pub mod coord;
pub mod mask;
pub mod points;
pub mod transform;
pub mod volume;

pub use coord::{Coord, LEAF_DIM, LEAF_VOXELS};
pub use mask::LeafMask;
pub use points::{AttributeArray, GroupBits, PointDataGrid, PointLeaf};
pub use transform::Transform;
pub use volume::{AttrType, Grid, GridSet, LeafNode, VolumeGrid};
