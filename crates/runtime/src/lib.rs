//! Vexel Runtime: the native half of external built-ins
//!
//! Kernels produced by the Vexel compiler are JIT-compiled in-process.
//! Built-ins the code generator cannot (or should not) express inline in
//! IR are declared as imports and resolved against the C-ABI functions in
//! this crate at module-add time. Every export carries the `vexel_`
//! prefix and appears in [`symbols`], which the compiler feeds to the JIT
//! builder's symbol table.
//!
//! # Safety Contract
//!
//! These functions are called ONLY by compiler-generated code. The
//! compiler's type resolution and the executable's binding layer are
//! responsible for:
//!
//! - passing handles that point at live, correctly-typed attribute storage
//! - keeping point indices within the owning leaf's point count
//! - never sharing one leaf's handles across worker threads
//!
//! None of that is re-checked here; the helpers are straight-line memory
//! and math code.
//!
//! # Modules
//!
//! - `math`: transcendental functions and seeded random numbers
//! - `points`: point attribute handle accessors and group bitset helpers
//! - `custom`: custom-data lookup

pub mod custom;
pub mod math;
pub mod points;

pub use points::PointLocalData;

macro_rules! symbol_entry {
    ($name:ident) => {
        (stringify!($name), $name as *const u8)
    };
}

/// Every exported helper, as `(symbol name, address)` pairs for JIT
/// registration.
pub fn symbols() -> Vec<(&'static str, *const u8)> {
    use custom::*;
    use math::*;
    use points::*;
    vec![
        // math
        symbol_entry!(vexel_sin),
        symbol_entry!(vexel_sinf),
        symbol_entry!(vexel_cos),
        symbol_entry!(vexel_cosf),
        symbol_entry!(vexel_tan),
        symbol_entry!(vexel_tanf),
        symbol_entry!(vexel_exp),
        symbol_entry!(vexel_expf),
        symbol_entry!(vexel_log),
        symbol_entry!(vexel_logf),
        symbol_entry!(vexel_pow),
        symbol_entry!(vexel_powf),
        symbol_entry!(vexel_rand),
        symbol_entry!(vexel_rand_seeded),
        // point attributes
        symbol_entry!(vexel_point_get_bool),
        symbol_entry!(vexel_point_set_bool),
        symbol_entry!(vexel_point_get_i32),
        symbol_entry!(vexel_point_set_i32),
        symbol_entry!(vexel_point_get_i64),
        symbol_entry!(vexel_point_set_i64),
        symbol_entry!(vexel_point_get_f32),
        symbol_entry!(vexel_point_set_f32),
        symbol_entry!(vexel_point_get_f64),
        symbol_entry!(vexel_point_set_f64),
        symbol_entry!(vexel_point_get_vec3f),
        symbol_entry!(vexel_point_set_vec3f),
        symbol_entry!(vexel_point_get_mat4f),
        symbol_entry!(vexel_point_set_mat4f),
        // groups
        symbol_entry!(vexel_group_test),
        symbol_entry!(vexel_group_set),
        // custom data
        symbol_entry!(vexel_custom_data_f64),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_names_are_prefixed_and_unique() {
        let syms = symbols();
        let mut names: Vec<&str> = syms.iter().map(|(n, _)| *n).collect();
        assert!(names.iter().all(|n| n.starts_with("vexel_")));
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), syms.len());
    }

    #[test]
    fn test_no_null_addresses() {
        assert!(symbols().iter().all(|(_, addr)| !addr.is_null()));
    }
}
