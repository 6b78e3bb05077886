//! Vexel Compiler
//!
//! Compiles Vexel kernels — short, statically-typed, C-like snippets such
//! as `@density = @density * 2.0f;` — to native code and binds them to
//! sparse grids for parallel per-voxel or per-point execution.
//!
//! The pipeline: source text → AST (`parser`) → type annotations,
//! attribute registry and warnings (`semantic`) → Cranelift IR for the
//! chosen target (`codegen`) → in-process JIT module → an
//! [`Executable`] that walks grid leaves on the rayon pool.
//!
//! ```no_run
//! use vexelc::{Compiler, CompilerOptions};
//! use vexel_grid::{Coord, Grid, GridSet, Transform, VolumeGrid};
//!
//! let compiler = Compiler::new();
//! let exe = compiler
//!     .compile_volume("@density = @density * 2.0f;", &CompilerOptions::default())
//!     .unwrap();
//!
//! let mut density = Grid::<f32>::new("density", Transform::default());
//! density.set_value(Coord::new(0, 0, 0), 2.0);
//! let mut grids = GridSet::new();
//! grids.push(VolumeGrid::F32(density));
//! exe.execute(&mut grids).unwrap();
//! ```

pub mod ast;
pub mod codegen;
pub mod compiler;
pub mod error;
pub mod executable;
pub mod parser;
pub mod registry;
pub mod semantic;
pub mod types;

pub use compiler::{Compiler, CompilerOptions, OptLevel};
pub use error::{CompileError, Diagnostic, DiagnosticKind, Span};
pub use executable::{Executable, ExecuteError, PointExecutable, VolumeExecutable};
pub use registry::{FunctionRegistry, Target};
pub use semantic::{Access, AttributeRegistry, Resolution};
pub use types::{AxType, Scalar};
