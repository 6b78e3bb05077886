//! Uniform-scale index↔world transform.

use crate::coord::Coord;

/// Maps voxel index space to world space: `world = index * voxel_size + origin`.
///
/// The layout is read directly by JIT-compiled kernels (`voxel_size` at
/// offset 0, `origin` at offsets 8/16/24), so the field order and
/// `#[repr(C)]` are load-bearing.
#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Transform {
    pub voxel_size: f64,
    pub origin: [f64; 3],
}

impl Transform {
    pub fn new(voxel_size: f64) -> Self {
        Transform {
            voxel_size,
            origin: [0.0; 3],
        }
    }

    pub fn with_origin(voxel_size: f64, origin: [f64; 3]) -> Self {
        Transform { voxel_size, origin }
    }

    /// World-space position of a voxel coordinate.
    pub fn index_to_world(&self, ijk: Coord) -> [f64; 3] {
        [
            ijk.x as f64 * self.voxel_size + self.origin[0],
            ijk.y as f64 * self.voxel_size + self.origin[1],
            ijk.z as f64 * self.voxel_size + self.origin[2],
        ]
    }

    /// Continuous index-space position of a world-space point.
    pub fn world_to_index(&self, xyz: [f64; 3]) -> [f64; 3] {
        [
            (xyz[0] - self.origin[0]) / self.voxel_size,
            (xyz[1] - self.origin[1]) / self.voxel_size,
            (xyz[2] - self.origin[2]) / self.voxel_size,
        ]
    }
}

impl Default for Transform {
    fn default() -> Self {
        Transform::new(1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        let xform = Transform::with_origin(0.5, [1.0, -2.0, 0.25]);
        let world = xform.index_to_world(Coord::new(4, -2, 8));
        assert_eq!(world, [3.0, -3.0, 4.25]);
        let index = xform.world_to_index(world);
        assert_eq!(index, [4.0, -2.0, 8.0]);
    }
}
