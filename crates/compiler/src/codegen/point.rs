//! The point kernel entry function and handle-based attribute access.
//!
//! Signature:
//!
//! ```text
//! void kernel(u64 point_index, PointLocalData* leaf_data,
//!             u8** attr_handles, u64** group_handles, const f64* custom)
//! ```
//!
//! Unlike the volume target, point attributes are never addressed
//! directly: every read and write goes through a typed `vexel_point_*`
//! runtime helper on an opaque handle whose layout matches the grid's
//! native attribute storage. Group membership tests and edits call the
//! `vexel_group_*` helpers, which mark `leaf_data` dirty so the
//! executable can merge group metadata after the parallel pass.

use super::values::ir_type;
use super::{CgValue, CodeGen, CodeGenError, TargetCtx};
use crate::ast::Ast;
use crate::registry::FunctionRegistry;
use crate::semantic::Resolution;
use crate::types::{AxType, Scalar};
use cranelift_codegen::ir::{AbiParam, InstBuilder, MemFlags, types};
use cranelift_frontend::{FunctionBuilder, FunctionBuilderContext};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Linkage, Module};

/// Exported name of the generated entry function.
pub const POINT_KERNEL_NAME: &str = "vexel_point_kernel";

/// Emit and define the point kernel for a resolved AST.
pub fn build_kernel(
    module: &mut JITModule,
    ast: &Ast,
    resolution: &Resolution,
    registry: &FunctionRegistry,
    custom_keys: &[String],
) -> Result<FuncId, CodeGenError> {
    let ptr_type = module.target_config().pointer_type();
    let mut sig = module.make_signature();
    sig.params.push(AbiParam::new(types::I64));
    for _ in 0..4 {
        sig.params.push(AbiParam::new(ptr_type));
    }
    let func_id = module.declare_function(POINT_KERNEL_NAME, Linkage::Export, &sig)?;

    let mut ctx = module.make_context();
    ctx.func.signature = sig;
    let mut fb_ctx = FunctionBuilderContext::new();
    {
        let mut builder = FunctionBuilder::new(&mut ctx.func, &mut fb_ctx);
        let entry = builder.create_block();
        builder.append_block_params_for_function_params(entry);
        builder.switch_to_block(entry);
        let params = builder.block_params(entry).to_vec();
        let (index, leaf_data, attr_handle_table, group_handle_table, custom) =
            (params[0], params[1], params[2], params[3], params[4]);

        let mut attr_handles = Vec::with_capacity(resolution.attributes.len());
        for i in 0..resolution.attributes.len() {
            attr_handles.push(builder.ins().load(
                ptr_type,
                MemFlags::trusted(),
                attr_handle_table,
                (8 * i) as i32,
            ));
        }
        let mut group_handles = Vec::with_capacity(resolution.groups.len());
        for i in 0..resolution.groups.len() {
            group_handles.push(builder.ins().load(
                ptr_type,
                MemFlags::trusted(),
                group_handle_table,
                (8 * i) as i32,
            ));
        }

        let epilogue = builder.create_block();
        let target = TargetCtx::Point {
            index,
            leaf_data,
            custom,
            attr_handles,
            group_handles,
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

/// Runtime accessor symbols for a scalar attribute element type.
fn scalar_accessors(s: Scalar) -> Result<(&'static str, &'static str), CodeGenError> {
    match s {
        Scalar::Bool => Ok(("vexel_point_get_bool", "vexel_point_set_bool")),
        Scalar::Int32 => Ok(("vexel_point_get_i32", "vexel_point_set_i32")),
        Scalar::Int64 => Ok(("vexel_point_get_i64", "vexel_point_set_i64")),
        Scalar::Float => Ok(("vexel_point_get_f32", "vexel_point_set_f32")),
        Scalar::Double => Ok(("vexel_point_get_f64", "vexel_point_set_f64")),
        Scalar::Int16 => Err(CodeGenError::Logic(
            "short attributes have no storage type".to_string(),
        )),
    }
}

/// Runtime accessor symbols for an array attribute shape.
fn array_accessors(len: usize) -> Result<(&'static str, &'static str), CodeGenError> {
    match len {
        3 => Ok(("vexel_point_get_vec3f", "vexel_point_set_vec3f")),
        16 => Ok(("vexel_point_get_mat4f", "vexel_point_set_mat4f")),
        other => Err(CodeGenError::Logic(format!(
            "no point accessor for arrays of length {}",
            other
        ))),
    }
}

impl CodeGen<'_, '_> {
    fn point_operands(&self, index: usize) -> Result<(cranelift_codegen::ir::Value, cranelift_codegen::ir::Value), CodeGenError> {
        let TargetCtx::Point {
            index: point,
            attr_handles,
            ..
        } = &self.target
        else {
            return Err(CodeGenError::Logic(
                "point attribute access in a volume kernel".to_string(),
            ));
        };
        Ok((attr_handles[index], *point))
    }

    pub(crate) fn read_point_attribute(
        &mut self,
        index: usize,
        ty: AxType,
    ) -> Result<CgValue, CodeGenError> {
        let (handle, point) = self.point_operands(index)?;
        match ty {
            AxType::Scalar(s) => {
                let (get, _) = scalar_accessors(s)?;
                let value = self
                    .call_import(
                        get,
                        &[self.ptr_type, types::I64],
                        Some(ir_type(s)),
                        &[handle, point],
                    )?
                    .expect("point getter returns a value");
                Ok(CgValue::Scalar { ty: s, value })
            }
            _ => {
                let (elem, len) = ty
                    .array_parts()
                    .ok_or_else(|| CodeGenError::Logic("string attribute".to_string()))?;
                let (get, _) = array_accessors(len)?;
                let out = self.alloc_array(elem, len);
                self.call_import(
                    get,
                    &[self.ptr_type, types::I64, self.ptr_type],
                    None,
                    &[handle, point, out],
                )?;
                Ok(CgValue::Array {
                    elem,
                    len,
                    ptr: out,
                })
            }
        }
    }

    pub(crate) fn write_point_attribute(
        &mut self,
        index: usize,
        ty: AxType,
        value: CgValue,
    ) -> Result<(), CodeGenError> {
        let (handle, point) = self.point_operands(index)?;
        match ty {
            AxType::Scalar(s) => {
                let (_, set) = scalar_accessors(s)?;
                let (_, v) = value.expect_scalar()?;
                self.call_import(
                    set,
                    &[self.ptr_type, types::I64, ir_type(s)],
                    None,
                    &[handle, point, v],
                )?;
                Ok(())
            }
            _ => {
                let (_, len) = ty
                    .array_parts()
                    .ok_or_else(|| CodeGenError::Logic("string attribute".to_string()))?;
                let (_, set) = array_accessors(len)?;
                let CgValue::Array { ptr, .. } = value else {
                    return Err(CodeGenError::Logic(
                        "vector attribute store needs an array".to_string(),
                    ));
                };
                self.call_import(
                    set,
                    &[self.ptr_type, types::I64, self.ptr_type],
                    None,
                    &[handle, point, ptr],
                )?;
                Ok(())
            }
        }
    }
}
