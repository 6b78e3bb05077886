//! JIT module construction and code-page ownership.
//!
//! The backend is consumed through two operations: build a module from
//! emitted IR, and resolve an exported symbol to a function pointer.
//! Every runtime helper is registered on the builder's symbol table up
//! front, so imports declared during lowering link by name when the
//! module is finalized.

use super::CodeGenError;
use crate::compiler::OptLevel;
use cranelift_jit::{JITBuilder, JITModule};
use cranelift_module::{FuncId, default_libcall_names};

/// An owned JIT module whose code pages live until this wrapper drops.
///
/// Executables keep one behind an `Arc`; the kernel function pointer
/// stays valid exactly as long as the wrapper does.
pub struct Jit {
    module: Option<JITModule>,
}

impl Jit {
    /// Build a fresh module with the runtime symbol table installed.
    pub fn build_module(opt_level: OptLevel) -> Result<JITModule, CodeGenError> {
        let opt = match opt_level {
            OptLevel::None => "none",
            OptLevel::O1 | OptLevel::O2 | OptLevel::O3 => "speed",
        };
        let mut builder = JITBuilder::with_flags(
            &[
                ("use_colocated_libcalls", "false"),
                ("is_pic", "false"),
                ("opt_level", opt),
                ("enable_verifier", "true"),
            ],
            default_libcall_names(),
        )?;
        for (name, addr) in vexel_runtime::symbols() {
            builder.symbol(name, addr);
        }
        Ok(JITModule::new(builder))
    }

    /// Take ownership of a finalized module.
    pub fn wrap(module: JITModule) -> Self {
        Jit {
            module: Some(module),
        }
    }

    /// Resolve a defined function to its entry pointer.
    pub fn entry(&self, func_id: FuncId) -> *const u8 {
        self.module
            .as_ref()
            .expect("module present until drop")
            .get_finalized_function(func_id)
    }
}

impl Drop for Jit {
    fn drop(&mut self) {
        if let Some(module) = self.module.take() {
            // SAFETY: dropping the wrapper is the agreed end of life for
            // every function pointer handed out by `entry`; executables
            // hold the wrapper alive for as long as they may run.
            unsafe { module.free_memory() };
        }
    }
}

// SAFETY: the module is immutable after finalization; execution only
// reads the code pages, and the wrapper is never mutated across threads.
unsafe impl Send for Jit {}
unsafe impl Sync for Jit {}
