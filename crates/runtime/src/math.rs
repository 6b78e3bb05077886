//! Transcendental math and random-number helpers.
//!
//! Cranelift has first-class IR for `sqrt`, `fabs`, `floor`, `ceil` and
//! friends, so those lower inline and never reach this module. The
//! functions here are the ones with no IR equivalent. Each comes in an
//! `f64` and an `f32` flavour so overload selection can avoid widening
//! when the kernel works in single precision.

use rand::rngs::StdRng;
use rand::{Rng, RngCore, SeedableRng};
use std::cell::RefCell;

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_sin(x: f64) -> f64 {
    x.sin()
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_sinf(x: f32) -> f32 {
    x.sin()
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_cos(x: f64) -> f64 {
    x.cos()
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_cosf(x: f32) -> f32 {
    x.cos()
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_tan(x: f64) -> f64 {
    x.tan()
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_tanf(x: f32) -> f32 {
    x.tan()
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_exp(x: f64) -> f64 {
    x.exp()
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_expf(x: f32) -> f32 {
    x.exp()
}

/// Natural logarithm.
///
/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_log(x: f64) -> f64 {
    x.ln()
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_logf(x: f32) -> f32 {
    x.ln()
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_pow(base: f64, exp: f64) -> f64 {
    base.powf(exp)
}

/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_powf(base: f32, exp: f32) -> f32 {
    base.powf(exp)
}

thread_local! {
    static THREAD_RNG: RefCell<StdRng> = RefCell::new(StdRng::from_entropy());
}

/// Unseeded random number in `[0, 1)`.
///
/// Draws from a per-thread generator; the sequence is not reproducible
/// across runs. Kernels that need determinism use the seeded overload.
///
/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_rand() -> f64 {
    THREAD_RNG.with(|rng| rng.borrow_mut().r#gen::<f64>())
}

/// Seeded random number in `[0, 1)`.
///
/// Deterministic per call for a given seed: the seed's bit pattern keys a
/// fresh generator and exactly one draw is taken, so `rand(s)` is a pure
/// function of `s`.
///
/// # Safety
/// Always safe to call.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn vexel_rand_seeded(seed: f64) -> f64 {
    let mut rng = StdRng::seed_from_u64(seed.to_bits());
    // Burn one word so adjacent integer seeds decorrelate.
    rng.next_u64();
    rng.r#gen::<f64>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_seeded_rand_is_deterministic() {
        let a = unsafe { vexel_rand_seeded(42.0) };
        let b = unsafe { vexel_rand_seeded(42.0) };
        assert_eq!(a, b);
        assert!((0.0..1.0).contains(&a));
        let c = unsafe { vexel_rand_seeded(43.0) };
        assert_ne!(a, c);
    }

    #[test]
    fn test_rand_in_unit_interval() {
        for _ in 0..64 {
            let x = unsafe { vexel_rand() };
            assert!((0.0..1.0).contains(&x));
        }
    }

    #[test]
    fn test_math_matches_std() {
        unsafe {
            assert_eq!(vexel_sin(0.5), 0.5f64.sin());
            assert_eq!(vexel_powf(2.0, 10.0), 1024.0);
            assert_eq!(vexel_log(1.0), 0.0);
        }
    }
}
