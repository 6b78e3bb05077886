//! The compiler driver.
//!
//! Orchestrates the pipeline: parse → type resolution → attribute scan →
//! module construction → target-specific IR emission → JIT finalize →
//! executable. All failures surface as [`CompileError`] with the
//! warnings gathered up to that point.

use crate::codegen::jit::Jit;
use crate::codegen::{CodeGenError, point, volume};
use crate::error::{CompileError, Diagnostic, DiagnosticKind};
use crate::executable::{Executable, PointExecutable, VolumeExecutable};
use crate::registry::{FunctionRegistry, Target};
use crate::parser;
use crate::semantic::{self, ResolveOptions};
use std::sync::Arc;
use tracing::debug;

/// Requested optimisation level. Cranelift exposes a single "speed"
/// pipeline, so `O1`–`O3` differ only in intent; `None` disables
/// optimisation entirely.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OptLevel {
    None,
    #[default]
    O1,
    O2,
    O3,
}

/// Options for one compilation.
#[derive(Debug, Clone)]
pub struct CompilerOptions {
    pub opt_level: OptLevel,
    pub warn_as_error: bool,
    pub allow_implicit_float_to_int: bool,
    pub target: Target,
    /// Named values exposed to kernels through `lookupf`.
    pub custom_data: Vec<(String, f64)>,
}

impl Default for CompilerOptions {
    fn default() -> Self {
        CompilerOptions {
            opt_level: OptLevel::default(),
            warn_as_error: false,
            allow_implicit_float_to_int: false,
            target: Target::Volume,
            custom_data: Vec::new(),
        }
    }
}

impl CompilerOptions {
    pub fn new(target: Target) -> Self {
        CompilerOptions {
            target,
            ..Default::default()
        }
    }

    pub fn with_opt_level(mut self, opt_level: OptLevel) -> Self {
        self.opt_level = opt_level;
        self
    }

    pub fn with_warn_as_error(mut self, on: bool) -> Self {
        self.warn_as_error = on;
        self
    }

    pub fn with_implicit_float_to_int(mut self, on: bool) -> Self {
        self.allow_implicit_float_to_int = on;
        self
    }

    pub fn with_custom_data(mut self, data: Vec<(String, f64)>) -> Self {
        self.custom_data = data;
        self
    }
}

/// The compiler: a shared handle to the built-in registry plus the
/// pipeline entry points. The registry is built once and read-only
/// thereafter, so one `Compiler` serves any number of compilations.
#[derive(Clone)]
pub struct Compiler {
    registry: Arc<FunctionRegistry>,
}

impl Default for Compiler {
    fn default() -> Self {
        Compiler::new()
    }
}

impl Compiler {
    pub fn new() -> Self {
        Compiler {
            registry: Arc::new(FunctionRegistry::with_builtins()),
        }
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    /// Compile a kernel for the target named in `options`.
    pub fn compile(
        &self,
        source: &str,
        options: &CompilerOptions,
    ) -> Result<Executable, CompileError> {
        let ast = parser::parse(source)?;
        debug!(exprs = ast.expr_count(), "parsed kernel");

        let resolve_options = ResolveOptions {
            allow_implicit_float_to_int: options.allow_implicit_float_to_int,
            custom_keys: options.custom_data.iter().map(|(k, _)| k.clone()).collect(),
        };
        let resolution = semantic::resolve(
            &ast,
            &self.registry,
            options.target,
            &resolve_options,
            source,
        )?;
        debug!(
            attributes = resolution.attributes.len(),
            warnings = resolution.warnings.len(),
            "resolved types"
        );

        let mut warnings = resolution.warnings.clone();
        if options.warn_as_error {
            if let Some(first) = warnings.first().cloned() {
                warnings.remove(0);
                return Err(CompileError::new(first.promoted(), warnings));
            }
        }

        let fail = |diagnostic: Diagnostic, warnings: &[Diagnostic]| {
            CompileError::new(diagnostic, warnings.to_vec())
        };

        let mut module =
            Jit::build_module(options.opt_level).map_err(|e| fail(codegen_diagnostic(e), &warnings))?;
        let custom_keys = resolve_options.custom_keys;
        let func_id = match options.target {
            Target::Volume => {
                volume::build_kernel(&mut module, &ast, &resolution, &self.registry, &custom_keys)
            }
            Target::Point => {
                point::build_kernel(&mut module, &ast, &resolution, &self.registry, &custom_keys)
            }
        }
        .map_err(|e| fail(codegen_diagnostic(e), &warnings))?;

        module
            .finalize_definitions()
            .map_err(|e| fail(codegen_diagnostic(CodeGenError::Module(e)), &warnings))?;
        debug!("kernel finalized");

        let jit = Arc::new(Jit::wrap(module));
        let entry = jit.entry(func_id);
        let custom_values: Vec<f64> = options.custom_data.iter().map(|(_, v)| *v).collect();

        Ok(match options.target {
            Target::Volume => Executable::Volume(VolumeExecutable::new(
                jit,
                entry,
                resolution.attributes,
                custom_values,
                warnings,
            )),
            Target::Point => Executable::Point(PointExecutable::new(
                jit,
                entry,
                resolution.attributes,
                resolution.groups,
                custom_values,
                warnings,
            )),
        })
    }

    /// Compile a volume kernel.
    pub fn compile_volume(
        &self,
        source: &str,
        options: &CompilerOptions,
    ) -> Result<VolumeExecutable, CompileError> {
        let mut options = options.clone();
        options.target = Target::Volume;
        match self.compile(source, &options)? {
            Executable::Volume(exe) => Ok(exe),
            Executable::Point(_) => unreachable!("volume target produced a point executable"),
        }
    }

    /// Compile a point kernel.
    pub fn compile_point(
        &self,
        source: &str,
        options: &CompilerOptions,
    ) -> Result<PointExecutable, CompileError> {
        let mut options = options.clone();
        options.target = Target::Point;
        match self.compile(source, &options)? {
            Executable::Point(exe) => Ok(exe),
            Executable::Volume(_) => unreachable!("point target produced a volume executable"),
        }
    }
}

/// Backend and invariant failures surface under the JIT error kind.
fn codegen_diagnostic(e: CodeGenError) -> Diagnostic {
    Diagnostic::unlocated(DiagnosticKind::JitError, e.to_string())
}
