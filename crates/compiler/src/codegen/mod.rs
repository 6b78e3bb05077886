//! IR generation.
//!
//! The shared [`CodeGen`] lowers the type-annotated AST into Cranelift IR
//! inside the kernel entry function; `volume` and `point` build the
//! target-specific entry signatures and prologues around it, `values`
//! holds the typed value layer and `jit` wraps module construction and
//! code-page ownership.
//!
//! Lowering walks statements in source order. Locals live in Cranelift
//! variables (scalars) or explicit stack slots (vectors and matrices);
//! attribute references resolve through the frozen attribute registry to
//! either a precomputed voxel address (volume) or a typed handle call
//! (points). Control flow uses the conventional block patterns: two
//! blocks plus merge for `if`, three for `while`/`do-while`, four for
//! `for`. `return` jumps to the function's single epilogue.

pub mod jit;
pub mod point;
pub mod values;
pub mod volume;

mod expr;

pub use values::CgValue;

use crate::ast::{AssignOp, Ast, Expr, ExprId, Keyword, LoopKind, Stmt, StmtId};
use crate::registry::FunctionRegistry;
use crate::semantic::Resolution;
use crate::types::{AxType, Scalar};
use cranelift_codegen::ir::{AbiParam, Block, InstBuilder, Type, Value};
use cranelift_frontend::{FunctionBuilder, Variable};
use cranelift_jit::JITModule;
use cranelift_module::{FuncId, Linkage, Module};
use std::collections::HashMap;
use values::{elem_size, ir_type};

/// Error type for code generation.
///
/// `Logic` covers invariant violations and unsupported constructs that
/// slipped past resolution; `Module` wraps backend failures (declaration,
/// definition, verification).
#[derive(Debug)]
pub enum CodeGenError {
    Logic(String),
    Module(cranelift_module::ModuleError),
}

impl std::fmt::Display for CodeGenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CodeGenError::Logic(s) => write!(f, "{}", s),
            CodeGenError::Module(e) => write!(f, "backend error: {}", e),
        }
    }
}

impl std::error::Error for CodeGenError {}

impl From<String> for CodeGenError {
    fn from(s: String) -> Self {
        CodeGenError::Logic(s)
    }
}

impl From<cranelift_module::ModuleError> for CodeGenError {
    fn from(e: cranelift_module::ModuleError) -> Self {
        CodeGenError::Module(e)
    }
}

/// Storage for one local.
#[derive(Debug, Clone, Copy)]
enum Slot {
    Var { ty: Scalar, var: Variable },
    Array { elem: Scalar, len: usize, ptr: Value },
}

/// A resolved assignment target.
#[derive(Debug, Clone, Copy)]
pub(crate) enum LValue {
    Var(Variable, Scalar),
    /// Directly addressable memory: volume attributes, local arrays and
    /// their components.
    Mem { addr: Value, ty: AxType },
    /// A point attribute behind a typed handle.
    PointAttr { index: usize, ty: AxType },
    /// One component of a handle-backed point attribute.
    PointAttrElem {
        index: usize,
        elem: Scalar,
        len: usize,
        component: usize,
    },
}

impl LValue {
    fn ax_type(&self) -> AxType {
        match self {
            LValue::Var(_, s) => AxType::Scalar(*s),
            LValue::Mem { ty, .. } => *ty,
            LValue::PointAttr { ty, .. } => *ty,
            LValue::PointAttrElem { elem, .. } => AxType::Scalar(*elem),
        }
    }
}

/// Target-specific state the shared lowerer consults.
pub(crate) enum TargetCtx {
    Volume {
        /// The current voxel coordinate, loaded once in the prologue.
        coord: [Value; 3],
        xform: Value,
        custom: Value,
        /// Per-attribute voxel addresses, in registry order.
        attr_addrs: Vec<Value>,
    },
    Point {
        /// Index of the current point within its leaf.
        index: Value,
        leaf_data: Value,
        custom: Value,
        /// Per-attribute handles, in registry order.
        attr_handles: Vec<Value>,
        /// Per-group bitset handles, in group-use order.
        group_handles: Vec<Value>,
    },
}

struct LoopCtx {
    continue_block: Block,
    break_block: Block,
}

/// The shared compute generator: owns the builder insertion point, the
/// scope stack and the import cache while one kernel is being emitted.
pub struct CodeGen<'a, 'b> {
    pub(crate) module: &'a mut JITModule,
    pub(crate) builder: FunctionBuilder<'b>,
    pub(crate) ast: &'a Ast,
    pub(crate) resolution: &'a Resolution,
    pub(crate) registry: &'a FunctionRegistry,
    pub(crate) custom_keys: &'a [String],
    pub(crate) ptr_type: Type,
    pub(crate) target: TargetCtx,
    epilogue: Block,
    scopes: Vec<HashMap<String, Slot>>,
    loops: Vec<LoopCtx>,
    imports: HashMap<&'static str, FuncId>,
}

impl<'a, 'b> CodeGen<'a, 'b> {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        module: &'a mut JITModule,
        builder: FunctionBuilder<'b>,
        ast: &'a Ast,
        resolution: &'a Resolution,
        registry: &'a FunctionRegistry,
        custom_keys: &'a [String],
        ptr_type: Type,
        target: TargetCtx,
        epilogue: Block,
    ) -> Self {
        CodeGen {
            module,
            builder,
            ast,
            resolution,
            registry,
            custom_keys,
            ptr_type,
            target,
            epilogue,
            scopes: vec![HashMap::new()],
            loops: Vec::new(),
            imports: HashMap::new(),
        }
    }

    /// Consume the generator, handing the builder back for sealing.
    pub(crate) fn finish(self) -> FunctionBuilder<'b> {
        self.builder
    }

    fn lookup(&self, name: &str) -> Option<Slot> {
        for scope in self.scopes.iter().rev() {
            if let Some(slot) = scope.get(name) {
                return Some(*slot);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Lower a statement list; true when control flow ended (return,
    /// break or continue) and nothing further may be emitted here.
    pub(crate) fn lower_stmts(&mut self, stmts: &[StmtId]) -> Result<bool, CodeGenError> {
        for &stmt in stmts {
            if self.lower_stmt(stmt)? {
                return Ok(true);
            }
        }
        Ok(false)
    }

    fn lower_stmt(&mut self, id: StmtId) -> Result<bool, CodeGenError> {
        match self.ast.stmt(id) {
            Stmt::Block(body) => {
                self.scopes.push(HashMap::new());
                let terminated = self.lower_stmts(body);
                self.scopes.pop();
                terminated
            }
            Stmt::Declare { ty, name, init } => {
                let (ty, name, init) = (*ty, name.clone(), *init);
                let value = match init {
                    Some(init) => {
                        let raw = self.lower_value_expr(init)?;
                        self.convert(raw, ty)?
                    }
                    None => self.zero_value(ty)?,
                };
                let slot = match value {
                    CgValue::Scalar { ty: s, value } => {
                        let var = self.builder.declare_var(ir_type(s));
                        self.builder.def_var(var, value);
                        Slot::Var { ty: s, var }
                    }
                    CgValue::Array { elem, len, ptr } => {
                        // Locals own their storage; copy out of the
                        // initialiser so later writes cannot alias it.
                        let own = self.alloc_array(elem, len);
                        for i in 0..len {
                            let v = self.load_elem(elem, ptr, i);
                            self.store_elem(elem, own, i, v);
                        }
                        Slot::Array {
                            elem,
                            len,
                            ptr: own,
                        }
                    }
                    CgValue::Str(_) => {
                        return Err(CodeGenError::Logic(
                            "string local reached code generation".to_string(),
                        ));
                    }
                };
                self.scopes
                    .last_mut()
                    .expect("scope stack is never empty")
                    .insert(name, slot);
                Ok(false)
            }
            Stmt::Assign { op, target, value } => {
                let (op, target, value) = (*op, *target, *value);
                self.lower_assign(op, target, value)?;
                Ok(false)
            }
            Stmt::Expr(e) => {
                self.lower_expr(*e)?;
                Ok(false)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let (cond, then_body, else_body) = (*cond, *then_body, *else_body);
                self.lower_if(cond, then_body, else_body)
            }
            Stmt::Loop {
                kind,
                init,
                cond,
                step,
                body,
            } => {
                let (kind, init, cond, step, body) = (*kind, *init, *cond, *step, *body);
                self.lower_loop(kind, init, cond, step, body)?;
                Ok(false)
            }
            Stmt::Keyword(kw) => {
                match kw {
                    Keyword::Return => {
                        let epilogue = self.epilogue;
                        self.builder.ins().jump(epilogue, &[]);
                    }
                    Keyword::Break => {
                        let block = self
                            .loops
                            .last()
                            .ok_or_else(|| {
                                CodeGenError::Logic("'break' outside a loop".to_string())
                            })?
                            .break_block;
                        self.builder.ins().jump(block, &[]);
                    }
                    Keyword::Continue => {
                        let block = self
                            .loops
                            .last()
                            .ok_or_else(|| {
                                CodeGenError::Logic("'continue' outside a loop".to_string())
                            })?
                            .continue_block;
                        self.builder.ins().jump(block, &[]);
                    }
                }
                Ok(true)
            }
        }
    }

    fn lower_assign(
        &mut self,
        op: AssignOp,
        target: ExprId,
        value: ExprId,
    ) -> Result<(), CodeGenError> {
        // The target address is computed exactly once, also for compound
        // operators.
        let lv = self.lvalue(target)?;
        let target_ty = lv.ax_type();
        let rhs = self.lower_value_expr(value)?;
        let converted = match op.binary_op() {
            None => self.convert(rhs, target_ty)?,
            Some(bin) => {
                let operand_ty = binary_operand_type(target_ty, rhs.ax_type())?;
                let current = self.read_lvalue(lv)?;
                let l = self.convert(current, operand_ty)?;
                let r = self.convert(rhs, operand_ty)?;
                let combined = self.binary_values(bin, operand_ty, l, r)?;
                self.convert(combined, target_ty)?
            }
        };
        self.write_lvalue(lv, converted)
    }

    fn lower_if(
        &mut self,
        cond: ExprId,
        then_body: StmtId,
        else_body: Option<StmtId>,
    ) -> Result<bool, CodeGenError> {
        let cond = self.lower_condition(cond)?;
        let then_block = self.builder.create_block();
        let merge_block = self.builder.create_block();
        let else_block = match else_body {
            Some(_) => self.builder.create_block(),
            None => merge_block,
        };
        self.builder
            .ins()
            .brif(cond, then_block, &[], else_block, &[]);

        self.builder.switch_to_block(then_block);
        let then_terminated = self.lower_stmt(then_body)?;
        if !then_terminated {
            self.builder.ins().jump(merge_block, &[]);
        }

        let else_terminated = match else_body {
            Some(else_body) => {
                self.builder.switch_to_block(else_block);
                let terminated = self.lower_stmt(else_body)?;
                if !terminated {
                    self.builder.ins().jump(merge_block, &[]);
                }
                terminated
            }
            None => false,
        };

        self.builder.switch_to_block(merge_block);
        let terminated = then_terminated && else_terminated;
        if terminated {
            // Both arms left the function or loop, so the merge block is
            // unreachable; it still needs a terminator to stay well
            // formed.
            let epilogue = self.epilogue;
            self.builder.ins().jump(epilogue, &[]);
        }
        Ok(terminated)
    }

    fn lower_loop(
        &mut self,
        kind: LoopKind,
        init: Option<StmtId>,
        cond: ExprId,
        step: Option<StmtId>,
        body: StmtId,
    ) -> Result<(), CodeGenError> {
        self.scopes.push(HashMap::new());
        let result = self.lower_loop_inner(kind, init, cond, step, body);
        self.scopes.pop();
        result
    }

    fn lower_loop_inner(
        &mut self,
        kind: LoopKind,
        init: Option<StmtId>,
        cond: ExprId,
        step: Option<StmtId>,
        body: StmtId,
    ) -> Result<(), CodeGenError> {
        match kind {
            LoopKind::While => {
                let header = self.builder.create_block();
                let body_block = self.builder.create_block();
                let exit = self.builder.create_block();

                self.builder.ins().jump(header, &[]);
                self.builder.switch_to_block(header);
                let c = self.lower_condition(cond)?;
                self.builder.ins().brif(c, body_block, &[], exit, &[]);

                self.loops.push(LoopCtx {
                    continue_block: header,
                    break_block: exit,
                });
                self.builder.switch_to_block(body_block);
                let terminated = self.lower_stmt(body)?;
                if !terminated {
                    self.builder.ins().jump(header, &[]);
                }
                self.loops.pop();

                self.builder.switch_to_block(exit);
            }
            LoopKind::DoWhile => {
                let body_block = self.builder.create_block();
                let cond_block = self.builder.create_block();
                let exit = self.builder.create_block();

                self.builder.ins().jump(body_block, &[]);
                self.loops.push(LoopCtx {
                    continue_block: cond_block,
                    break_block: exit,
                });
                self.builder.switch_to_block(body_block);
                let terminated = self.lower_stmt(body)?;
                if !terminated {
                    self.builder.ins().jump(cond_block, &[]);
                }
                self.loops.pop();

                self.builder.switch_to_block(cond_block);
                let c = self.lower_condition(cond)?;
                self.builder.ins().brif(c, body_block, &[], exit, &[]);

                self.builder.switch_to_block(exit);
            }
            LoopKind::For => {
                if let Some(init) = init {
                    self.lower_stmt(init)?;
                }
                let header = self.builder.create_block();
                let body_block = self.builder.create_block();
                let step_block = self.builder.create_block();
                let exit = self.builder.create_block();

                self.builder.ins().jump(header, &[]);
                self.builder.switch_to_block(header);
                let c = self.lower_condition(cond)?;
                self.builder.ins().brif(c, body_block, &[], exit, &[]);

                self.loops.push(LoopCtx {
                    continue_block: step_block,
                    break_block: exit,
                });
                self.builder.switch_to_block(body_block);
                let terminated = self.lower_stmt(body)?;
                if !terminated {
                    self.builder.ins().jump(step_block, &[]);
                }
                self.loops.pop();

                self.builder.switch_to_block(step_block);
                if let Some(step) = step {
                    self.lower_stmt(step)?;
                }
                self.builder.ins().jump(header, &[]);

                self.builder.switch_to_block(exit);
            }
        }
        Ok(())
    }

    fn lower_condition(&mut self, cond: ExprId) -> Result<Value, CodeGenError> {
        let value = self.lower_value_expr(cond)?;
        let (ty, v) = value.expect_scalar()?;
        Ok(self.bool_coerce(v, ty))
    }

    // ------------------------------------------------------------------
    // Lvalues
    // ------------------------------------------------------------------

    pub(crate) fn lvalue(&mut self, id: ExprId) -> Result<LValue, CodeGenError> {
        match self.ast.expr(id) {
            Expr::Local(name) => {
                let slot = self.lookup(name).ok_or_else(|| {
                    CodeGenError::Logic(format!("undeclared local '{}' reached codegen", name))
                })?;
                Ok(match slot {
                    Slot::Var { ty, var } => LValue::Var(var, ty),
                    Slot::Array { elem, len, ptr } => LValue::Mem {
                        addr: ptr,
                        ty: array_type(elem, len),
                    },
                })
            }
            Expr::Attribute { name, ty, .. } => {
                let index = self.resolution.attributes.index_of(name).ok_or_else(|| {
                    CodeGenError::Logic(format!("attribute '{}' missing from registry", name))
                })?;
                Ok(self.attribute_lvalue(index, *ty))
            }
            Expr::Unpack { value, index } => {
                let (value, component) = (*value, *index as usize);
                let base = self.lvalue(value)?;
                match base {
                    LValue::Mem { addr, ty } => {
                        let (elem, len) = ty.array_parts().ok_or_else(|| {
                            CodeGenError::Logic(format!("cannot index into {}", ty))
                        })?;
                        if component >= len {
                            return Err(CodeGenError::Logic("component out of bounds".into()));
                        }
                        let offset = (elem_size(elem) * component) as i64;
                        let addr = self.builder.ins().iadd_imm(addr, offset);
                        Ok(LValue::Mem {
                            addr,
                            ty: AxType::Scalar(elem),
                        })
                    }
                    LValue::PointAttr { index, ty } => {
                        let (elem, len) = ty.array_parts().ok_or_else(|| {
                            CodeGenError::Logic(format!("cannot index into {}", ty))
                        })?;
                        if component >= len {
                            return Err(CodeGenError::Logic("component out of bounds".into()));
                        }
                        Ok(LValue::PointAttrElem {
                            index,
                            elem,
                            len,
                            component,
                        })
                    }
                    _ => Err(CodeGenError::Logic(
                        "cannot index into a scalar target".to_string(),
                    )),
                }
            }
            _ => Err(CodeGenError::Logic(
                "expression is not assignable".to_string(),
            )),
        }
    }

    fn attribute_lvalue(&self, index: usize, ty: AxType) -> LValue {
        match &self.target {
            TargetCtx::Volume { attr_addrs, .. } => LValue::Mem {
                addr: attr_addrs[index],
                ty,
            },
            TargetCtx::Point { .. } => LValue::PointAttr { index, ty },
        }
    }

    pub(crate) fn read_lvalue(&mut self, lv: LValue) -> Result<CgValue, CodeGenError> {
        match lv {
            LValue::Var(var, ty) => {
                let value = self.builder.use_var(var);
                Ok(CgValue::Scalar { ty, value })
            }
            LValue::Mem { addr, ty } => match ty {
                AxType::Scalar(s) => {
                    let value = self.load_elem(s, addr, 0);
                    Ok(CgValue::Scalar { ty: s, value })
                }
                _ => {
                    let (elem, len) = ty
                        .array_parts()
                        .ok_or_else(|| CodeGenError::Logic("string lvalue".to_string()))?;
                    Ok(CgValue::Array {
                        elem,
                        len,
                        ptr: addr,
                    })
                }
            },
            LValue::PointAttr { index, ty } => self.read_point_attribute(index, ty),
            LValue::PointAttrElem {
                index,
                elem,
                len,
                component,
            } => {
                let whole = self.read_point_attribute(index, array_type(elem, len))?;
                self.array_unpack(&whole, component)
            }
        }
    }

    pub(crate) fn write_lvalue(&mut self, lv: LValue, value: CgValue) -> Result<(), CodeGenError> {
        match lv {
            LValue::Var(var, _) => {
                let (_, v) = value.expect_scalar()?;
                self.builder.def_var(var, v);
                Ok(())
            }
            LValue::Mem { addr, ty } => match ty {
                AxType::Scalar(s) => {
                    let (_, v) = value.expect_scalar()?;
                    self.store_elem(s, addr, 0, v);
                    Ok(())
                }
                _ => {
                    let (elem, len) = ty
                        .array_parts()
                        .ok_or_else(|| CodeGenError::Logic("string lvalue".to_string()))?;
                    let CgValue::Array { ptr, .. } = value else {
                        return Err(CodeGenError::Logic("array store needs an array".into()));
                    };
                    for i in 0..len {
                        let v = self.load_elem(elem, ptr, i);
                        self.store_elem(elem, addr, i, v);
                    }
                    Ok(())
                }
            },
            LValue::PointAttr { index, ty } => self.write_point_attribute(index, ty, value),
            LValue::PointAttrElem {
                index,
                elem,
                len,
                component,
            } => {
                // Read-modify-write of the whole element through the
                // handle; leaf-exclusive execution makes this safe.
                let ty = array_type(elem, len);
                let whole = self.read_point_attribute(index, ty)?;
                let CgValue::Array { ptr, .. } = whole else {
                    return Err(CodeGenError::Logic("vector attribute expected".into()));
                };
                let (_, v) = value.expect_scalar()?;
                self.store_elem(elem, ptr, component, v);
                self.write_point_attribute(
                    index,
                    ty,
                    CgValue::Array {
                        elem,
                        len,
                        ptr,
                    },
                )
            }
        }
    }

    // ------------------------------------------------------------------
    // Imports
    // ------------------------------------------------------------------

    /// Call an external runtime helper, declaring the import on first
    /// use.
    pub(crate) fn call_import(
        &mut self,
        symbol: &'static str,
        params: &[Type],
        ret: Option<Type>,
        args: &[Value],
    ) -> Result<Option<Value>, CodeGenError> {
        let func_id = match self.imports.get(symbol) {
            Some(&id) => id,
            None => {
                let mut sig = self.module.make_signature();
                for &p in params {
                    sig.params.push(AbiParam::new(p));
                }
                if let Some(r) = ret {
                    sig.returns.push(AbiParam::new(r));
                }
                let id = self.module.declare_function(symbol, Linkage::Import, &sig)?;
                self.imports.insert(symbol, id);
                id
            }
        };
        let func_ref = self.module.declare_func_in_func(func_id, self.builder.func);
        let call = self.builder.ins().call(func_ref, args);
        Ok(self.builder.inst_results(call).first().copied())
    }
}

/// The array type of `len` elements of `elem`.
fn array_type(elem: Scalar, len: usize) -> AxType {
    if len == 16 && elem == Scalar::Float {
        AxType::Mat4
    } else {
        AxType::Vec {
            elem,
            len: len as u8,
        }
    }
}

/// The promoted operand type of a binary operation, mirroring the
/// resolver's typing (matrices stay single-precision).
pub(super) fn binary_operand_type(target: AxType, rhs: AxType) -> Result<AxType, CodeGenError> {
    if target == AxType::Mat4 || rhs == AxType::Mat4 {
        return Ok(AxType::Mat4);
    }
    AxType::promote(target, rhs).ok_or_else(|| {
        CodeGenError::Logic(format!("cannot combine {} with {}", target, rhs))
    })
}
