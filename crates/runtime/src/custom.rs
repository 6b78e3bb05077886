//! Custom-data lookup.
//!
//! The compiler interns custom-data keys at compile time and bakes the
//! resulting slot index into the kernel, so at run time the blob is just
//! an `f64` array passed through the kernel's `custom_data` argument.

/// Read slot `index` of the custom-data blob.
///
/// A null blob reads as `0.0`; the compiler only emits in-range indices
/// for non-null blobs.
///
/// # Safety
/// `custom` is either null or points at an array with more than `index`
/// elements.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_custom_data_f64(custom: *const f64, index: u64) -> f64 {
    if custom.is_null() {
        return 0.0;
    }
    unsafe { *custom.add(index as usize) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup() {
        let blob = [1.5f64, -2.0];
        unsafe {
            assert_eq!(vexel_custom_data_f64(blob.as_ptr(), 0), 1.5);
            assert_eq!(vexel_custom_data_f64(blob.as_ptr(), 1), -2.0);
            assert_eq!(vexel_custom_data_f64(std::ptr::null(), 7), 0.0);
        }
    }
}
