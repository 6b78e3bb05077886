//! The volume kernel entry function.
//!
//! Signature (all platform pointers):
//!
//! ```text
//! void kernel(const i32* coord, const Transform* xform,
//!             u8** attr_ptrs, const u64* active_mask, const f64* custom)
//! ```
//!
//! `attr_ptrs` carries one leaf-local base pointer per registry
//! attribute, in registration order. The prologue loads the voxel
//! coordinate, folds it to the leaf-linear offset
//! `((x&7)<<6)|((y&7)<<3)|(z&7)` and precomputes one voxel address per
//! attribute; `@name` loads and stores then resolve to plain memory
//! operations on those addresses.

use super::{CodeGen, CodeGenError, TargetCtx};
use crate::ast::Ast;
use crate::registry::FunctionRegistry;
use crate::semantic::Resolution;
use cranelift_codegen::ir::{AbiParam, InstBuilder, MemFlags, types};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Linkage, Module};

/// Exported name of the generated entry function.
pub const VOLUME_KERNEL_NAME: &str = "vexel_volume_kernel";

/// Emit and define the volume kernel for a resolved AST.
pub fn build_kernel(
    module: &mut JITModule,
    ast: &Ast,
    resolution: &Resolution,
    registry: &FunctionRegistry,
    custom_keys: &[String],
) -> Result<FuncId, CodeGenError> {
    let ptr_type = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    for _ in 0..5 {
        sig.params.push(AbiParam::new(ptr_type));
    }
    let func_id = module.declare_function(VOLUME_KERNEL_NAME, Linkage::Export, &sig)?;

    let mut ctx = module.make_context();
    ctx.func.signature = sig;
    let mut fb_ctx = FunctionBuilderContext::new();
    {
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut fb_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let params = builder.block_params(entry).to_vec();
        let (coord_ptr, xform, attr_ptrs, _active_mask, custom) =
            (params[0], params[1], params[2], params[3], params[4]);

        let x = builder
            .ins()
            .load(types::I32, MemFlags::trusted(), coord_ptr, 0);
        let y = builder
            .ins()
            .load(types::I32, MemFlags::trusted(), coord_ptr, 4);
        let z = builder
            .ins()
            .load(types::I32, MemFlags::trusted(), coord_ptr, 8);

        // Leaf-linear offset, x-major.
        let xm = builder.ins().band_imm(x, 7);
        let xs = builder.ins().ishl_imm(xm, 6);
        let ym = builder.ins().band_imm(y, 7);
        let ys = builder.ins().ishl_imm(ym, 3);
        let zm = builder.ins().band_imm(z, 7);
        let xy = builder.ins().bor(xs, ys);
        let offset = builder.ins().bor(xy, zm);
        let offset = builder.ins().uextend(types::I64, offset);

        let mut attr_addrs = Vec::with_capacity(resolution.attributes.len());
        for (i, attr) in resolution.attributes.attrs().iter().enumerate() {
            let base = builder.ins().load(
                ptr_type,
                MemFlags::trusted(),
                attr_ptrs,
                (8 * i) as i32,
            );
            let stride = attr
                .ty
                .attr_type()
                .expect("registry holds only grid-storable types")
                .size_bytes();
            let byte_offset = builder.ins().imul_imm(offset, stride as i64);
            let addr = builder.ins().iadd(base, byte_offset);
            attr_addrs.push(addr);
        }

        let epilogue = builder.create_block();
        let target = TargetCtx::Volume {
            coord: [x, y, z],
            xform,
            custom,
            attr_addrs,
        };
        let mut cg = CodeGen::new(
            &mut *module,
            builder,
            ast,
            resolution,
            registry,
            custom_keys,
            ptr_type,
            target,
            epilogue,
        );
        let terminated = cg.lower_stmts(ast.root())?;
        let mut builder = cg.finish();
        if !terminated {
            builder.ins().jump(epilogue, &[]);
        }
        builder.switch_to_block(epilogue);
        builder.ins().return_(&[]);
        builder.seal_all_blocks();
        builder.finalize();
    }

    module.define_function(func_id, &mut ctx)?;
    module.clear_context(&mut ctx);
    Ok(func_id)
}
