//! Point attribute handle accessors and group bitset helpers.
//!
//! A point kernel never touches attribute storage directly; the
//! executable hands it one opaque handle per attribute (the base pointer
//! of the owning leaf's typed column) and one per group (the base pointer
//! of the leaf's membership bitset). Generated code calls the typed
//! accessors below with the point's index inside the leaf.
//!
//! All handles are leaf-local and each leaf is processed by exactly one
//! worker, so these helpers need no synchronisation.

/// Per-leaf scratch shared between a kernel invocation and the executable.
///
/// Passed to the kernel as its `leaf_data` argument. Group writes flip
/// `groups_dirty` so the post-pass merge only revisits leaves that
/// actually changed membership.
#[repr(C)]
#[derive(Debug, Default)]
pub struct PointLocalData {
    pub groups_dirty: u8,
}

macro_rules! scalar_accessors {
    ($get:ident, $set:ident, $ty:ty) => {
        /// # Safety
        /// `handle` must point at a live attribute column of this element
        /// type with more than `index` elements.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $get(handle: *const u8, index: u64) -> $ty {
            unsafe { *(handle as *const $ty).add(index as usize) }
        }

        /// # Safety
        /// `handle` must point at a live attribute column of this element
        /// type with more than `index` elements, writable by this thread.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $set(handle: *mut u8, index: u64, value: $ty) {
            unsafe { *(handle as *mut $ty).add(index as usize) = value }
        }
    };
}

scalar_accessors!(vexel_point_get_bool, vexel_point_set_bool, u8);
scalar_accessors!(vexel_point_get_i32, vexel_point_set_i32, i32);
scalar_accessors!(vexel_point_get_i64, vexel_point_set_i64, i64);
scalar_accessors!(vexel_point_get_f32, vexel_point_set_f32, f32);
scalar_accessors!(vexel_point_get_f64, vexel_point_set_f64, f64);

macro_rules! array_accessors {
    ($get:ident, $set:ident, $len:expr) => {
        /// Copy one element (an `f32` array) out of the column into `out`.
        ///
        /// # Safety
        /// `handle` must point at a live column of `f32[$len]` elements
        /// with more than `index` of them; `out` must have room for the
        /// element.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $get(handle: *const u8, index: u64, out: *mut f32) {
            unsafe {
                let src = (handle as *const f32).add(index as usize * $len);
                std::ptr::copy_nonoverlapping(src, out, $len);
            }
        }

        /// # Safety
        /// As for the getter, with the column writable by this thread and
        /// `value` holding a full element.
        #[unsafe(no_mangle)]
        pub unsafe extern "C" fn $set(handle: *mut u8, index: u64, value: *const f32) {
            unsafe {
                let dst = (handle as *mut f32).add(index as usize * $len);
                std::ptr::copy_nonoverlapping(value, dst, $len);
            }
        }
    };
}

array_accessors!(vexel_point_get_vec3f, vexel_point_set_vec3f, 3);
array_accessors!(vexel_point_get_mat4f, vexel_point_set_mat4f, 16);

/// Test group membership. Returns 0 or 1.
///
/// # Safety
/// `handle` must point at a bitset covering `index`.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_group_test(handle: *const u64, index: u64) -> u8 {
    let word = unsafe { *handle.add((index >> 6) as usize) };
    (word >> (index & 63) & 1) as u8
}

/// Set or clear group membership and mark the leaf dirty.
///
/// # Safety
/// `handle` must point at a bitset covering `index`, writable by this
/// thread; `local` must point at the leaf's [`PointLocalData`].
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_group_set(
    handle: *mut u64,
    index: u64,
    on: u8,
    local: *mut PointLocalData,
) {
    unsafe {
        let word = handle.add((index >> 6) as usize);
        let bit = 1u64 << (index & 63);
        if on != 0 {
            *word |= bit;
        } else {
            *word &= !bit;
        }
        (*local).groups_dirty = 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scalar_round_trip() {
        let mut column = [0.0f32, 0.0, 0.0];
        let handle = column.as_mut_ptr() as *mut u8;
        unsafe {
            vexel_point_set_f32(handle, 1, 4.5);
            assert_eq!(vexel_point_get_f32(handle, 1), 4.5);
            assert_eq!(vexel_point_get_f32(handle, 0), 0.0);
        }
        assert_eq!(column, [0.0, 4.5, 0.0]);
    }

    #[test]
    fn test_vec3_round_trip() {
        let mut column = [[0.0f32; 3]; 2];
        let handle = column.as_mut_ptr() as *mut u8;
        let value = [1.0f32, 2.0, 3.0];
        let mut out = [0.0f32; 3];
        unsafe {
            vexel_point_set_vec3f(handle, 1, value.as_ptr());
            vexel_point_get_vec3f(handle, 1, out.as_mut_ptr());
        }
        assert_eq!(out, value);
        assert_eq!(column[0], [0.0; 3]);
    }

    #[test]
    fn test_group_bits() {
        let mut bits = [0u64; 2];
        let mut local = PointLocalData::default();
        unsafe {
            assert_eq!(vexel_group_test(bits.as_ptr(), 70), 0);
            vexel_group_set(bits.as_mut_ptr(), 70, 1, &mut local);
            assert_eq!(vexel_group_test(bits.as_ptr(), 70), 1);
            vexel_group_set(bits.as_mut_ptr(), 70, 0, &mut local);
            assert_eq!(vexel_group_test(bits.as_ptr(), 70), 0);
        }
        assert_eq!(local.groups_dirty, 1);
    }
}
