//! Expression lowering and inline built-in dispatch.

use super::values::ir_type;
use super::{CgValue, CodeGen, CodeGenError, TargetCtx};
use crate::ast::{BinOp, CrementKind, Expr, ExprId, Literal, UnaryOp};
use crate::registry::{FnImpl, FunctionSignature, InlineOp};
use crate::types::{AxType, Scalar};
use cranelift_codegen::ir::condcodes::IntCC;
use cranelift_codegen::ir::{InstBuilder, MemFlags, Value, types};

impl CodeGen<'_, '_> {
    /// Lower an expression that must produce a value.
    pub(crate) fn lower_value_expr(&mut self, id: ExprId) -> Result<CgValue, CodeGenError> {
        self.lower_expr(id)?.ok_or_else(|| {
            CodeGenError::Logic("void call used as a value reached codegen".to_string())
        })
    }

    /// Lower one expression; `None` marks a void built-in call.
    pub(crate) fn lower_expr(&mut self, id: ExprId) -> Result<Option<CgValue>, CodeGenError> {
        let value = match self.ast.expr(id) {
            Expr::Literal(lit) => Some(self.lower_literal(lit.clone())),
            Expr::Local(_) | Expr::Attribute { .. } => {
                let lv = self.lvalue(id)?;
                Some(self.read_lvalue(lv)?)
            }
            Expr::Cast { target, value } => {
                let (target, value) = (*target, *value);
                let raw = self.lower_value_expr(value)?;
                Some(self.convert(raw, target)?)
            }
            Expr::Unary { op, value } => {
                let (op, value) = (*op, *value);
                let result_ty = self.resolution.types.expect(id);
                let operand = self.lower_value_expr(value)?;
                Some(self.lower_unary(op, operand, result_ty)?)
            }
            Expr::Binary { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                Some(self.lower_binary(id, op, lhs, rhs)?)
            }
            Expr::Crement { kind, post, target } => {
                let (kind, post, target) = (*kind, *post, *target);
                Some(self.lower_crement(kind, post, target)?)
            }
            Expr::Call { name, args } => {
                let (name, args) = (name.clone(), args.clone());
                self.lower_call(id, &name, &args)?
            }
            Expr::Pack(items) => {
                let items = items.clone();
                let ty = self.resolution.types.expect(id);
                let (elem, _) = ty
                    .array_parts()
                    .ok_or_else(|| CodeGenError::Logic("pack without array type".into()))?;
                let mut components = Vec::with_capacity(items.len());
                for item in items {
                    components.push(self.lower_value_expr(item)?);
                }
                Some(self.array_pack_cast(&components, elem)?)
            }
            Expr::Unpack { value, index } => {
                let (value, index) = (*value, *index as usize);
                let base = self.lower_value_expr(value)?;
                Some(self.array_unpack(&base, index)?)
            }
        };
        Ok(value)
    }

    fn lower_literal(&mut self, lit: Literal) -> CgValue {
        let (ty, value) = match lit {
            Literal::Bool(b) => (
                Scalar::Bool,
                self.builder.ins().iconst(types::I8, b as i64),
            ),
            Literal::Int16(v) => (
                Scalar::Int16,
                self.builder.ins().iconst(types::I16, v as i64),
            ),
            Literal::Int32(v) => (
                Scalar::Int32,
                self.builder.ins().iconst(types::I32, v as i64),
            ),
            Literal::Int64(v) => (Scalar::Int64, self.builder.ins().iconst(types::I64, v)),
            Literal::Float(v) => (Scalar::Float, self.builder.ins().f32const(v)),
            Literal::Double(v) => (Scalar::Double, self.builder.ins().f64const(v)),
            Literal::Str(s) => return CgValue::Str(s),
        };
        CgValue::Scalar { ty, value }
    }

    fn lower_unary(
        &mut self,
        op: UnaryOp,
        operand: CgValue,
        result_ty: AxType,
    ) -> Result<CgValue, CodeGenError> {
        match op {
            UnaryOp::Not => {
                let (ty, v) = operand.expect_scalar()?;
                let truth = self.bool_coerce(v, ty);
                let value = self.builder.ins().bxor_imm(truth, 1);
                Ok(CgValue::Scalar {
                    ty: Scalar::Bool,
                    value,
                })
            }
            UnaryOp::Neg => {
                let converted = self.convert(operand, result_ty)?;
                match converted {
                    CgValue::Scalar { ty, value } => {
                        let value = if ty.is_float() {
                            self.builder.ins().fneg(value)
                        } else {
                            self.builder.ins().ineg(value)
                        };
                        Ok(CgValue::Scalar { ty, value })
                    }
                    CgValue::Array { elem, len, ptr } => {
                        let out = self.alloc_array(elem, len);
                        for i in 0..len {
                            let v = self.load_elem(elem, ptr, i);
                            let n = if elem.is_float() {
                                self.builder.ins().fneg(v)
                            } else {
                                self.builder.ins().ineg(v)
                            };
                            self.store_elem(elem, out, i, n);
                        }
                        Ok(CgValue::Array {
                            elem,
                            len,
                            ptr: out,
                        })
                    }
                    CgValue::Str(_) => Err(CodeGenError::Logic("cannot negate a string".into())),
                }
            }
            UnaryOp::BitNot => {
                let converted = self.convert(operand, result_ty)?;
                let (ty, v) = converted.expect_scalar()?;
                let value = self.builder.ins().bnot(v);
                Ok(CgValue::Scalar { ty, value })
            }
        }
    }

    fn lower_binary(
        &mut self,
        id: ExprId,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Result<CgValue, CodeGenError> {
        if op.is_logical() {
            return self.lower_short_circuit(op, lhs, rhs);
        }

        let result_ty = self.resolution.types.expect(id);
        let operand_ty = if op.is_comparison() {
            let l = self.resolution.types.expect(lhs);
            let r = self.resolution.types.expect(rhs);
            super::binary_operand_type(l, r)?
        } else {
            result_ty
        };

        let l = self.lower_value_expr(lhs)?;
        let r = self.lower_value_expr(rhs)?;
        let l = self.convert(l, operand_ty)?;
        let r = self.convert(r, operand_ty)?;
        self.binary_values(op, operand_ty, l, r)
    }

    /// `&&` and `||` evaluate the right operand only when the left has
    /// not already decided the result.
    fn lower_short_circuit(
        &mut self,
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    ) -> Result<CgValue, CodeGenError> {
        let result = self.builder.declare_var(types::I8);

        let l = self.lower_value_expr(lhs)?;
        let (lty, lval) = l.expect_scalar()?;
        let ltruth = self.bool_coerce(lval, lty);
        self.builder.def_var(result, ltruth);

        let rhs_block = self.builder.create_block();
        let merge_block = self.builder.create_block();
        match op {
            BinOp::And => {
                self.builder
                    .ins()
                    .brif(ltruth, rhs_block, &[], merge_block, &[]);
            }
            BinOp::Or => {
                self.builder
                    .ins()
                    .brif(ltruth, merge_block, &[], rhs_block, &[]);
            }
            _ => unreachable!("caller checked for a logical operator"),
        }

        self.builder.switch_to_block(rhs_block);
        let r = self.lower_value_expr(rhs)?;
        let (rty, rval) = r.expect_scalar()?;
        let rtruth = self.bool_coerce(rval, rty);
        self.builder.def_var(result, rtruth);
        self.builder.ins().jump(merge_block, &[]);

        self.builder.switch_to_block(merge_block);
        let value = self.builder.use_var(result);
        Ok(CgValue::Scalar {
            ty: Scalar::Bool,
            value,
        })
    }

    fn lower_crement(
        &mut self,
        kind: CrementKind,
        post: bool,
        target: ExprId,
    ) -> Result<CgValue, CodeGenError> {
        let lv = self.lvalue(target)?;
        let current = self.read_lvalue(lv)?;
        let (ty, old) = current.expect_scalar()?;
        let one = self.one_scalar(ty);
        let new = match (kind, ty.is_float()) {
            (CrementKind::Increment, true) => self.builder.ins().fadd(old, one),
            (CrementKind::Increment, false) => self.builder.ins().iadd(old, one),
            (CrementKind::Decrement, true) => self.builder.ins().fsub(old, one),
            (CrementKind::Decrement, false) => self.builder.ins().isub(old, one),
        };
        self.write_lvalue(lv, CgValue::Scalar { ty, value: new })?;
        Ok(CgValue::Scalar {
            ty,
            value: if post { old } else { new },
        })
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn lower_call(
        &mut self,
        id: ExprId,
        name: &str,
        args: &[ExprId],
    ) -> Result<Option<CgValue>, CodeGenError> {
        let index = *self
            .resolution
            .call_overloads
            .get(&id.0)
            .ok_or_else(|| CodeGenError::Logic(format!("unresolved call to '{}'", name)))?;
        let group = self
            .registry
            .group(name)
            .ok_or_else(|| CodeGenError::Logic(format!("unknown function '{}'", name)))?;
        let signature = group.signatures[index].clone();

        let mut lowered = Vec::with_capacity(args.len());
        for (&arg, &param) in args.iter().zip(signature.params.iter()) {
            let raw = self.lower_value_expr(arg)?;
            lowered.push(self.convert(raw, param)?);
        }

        match signature.implementation {
            FnImpl::External(symbol) => self.lower_external_call(symbol, &signature, &lowered),
            FnImpl::Inline(op) => self.lower_inline_op(op, &lowered),
        }
    }

    /// Call an external built-in. External signatures are scalar-only;
    /// vector math is always inline.
    fn lower_external_call(
        &mut self,
        symbol: &'static str,
        signature: &FunctionSignature,
        args: &[CgValue],
    ) -> Result<Option<CgValue>, CodeGenError> {
        let mut param_types = Vec::with_capacity(args.len());
        let mut arg_values = Vec::with_capacity(args.len());
        for arg in args {
            let (ty, value) = arg.expect_scalar()?;
            param_types.push(ir_type(ty));
            arg_values.push(value);
        }
        let ret_scalar = match signature.ret {
            Some(AxType::Scalar(s)) => Some(s),
            None => None,
            Some(other) => {
                return Err(CodeGenError::Logic(format!(
                    "external '{}' cannot return {}",
                    symbol, other
                )));
            }
        };
        let result = self.call_import(
            symbol,
            &param_types,
            ret_scalar.map(ir_type),
            &arg_values,
        )?;
        Ok(match (ret_scalar, result) {
            (Some(ty), Some(value)) => Some(CgValue::Scalar { ty, value }),
            _ => None,
        })
    }

    // ------------------------------------------------------------------
    // Inline built-ins
    // ------------------------------------------------------------------

    fn lower_inline_op(
        &mut self,
        op: InlineOp,
        args: &[CgValue],
    ) -> Result<Option<CgValue>, CodeGenError> {
        match op {
            InlineOp::Abs => {
                let (ty, v) = args[0].expect_scalar()?;
                let value = if ty.is_float() {
                    self.builder.ins().fabs(v)
                } else {
                    self.builder.ins().iabs(v)
                };
                Ok(Some(CgValue::Scalar { ty, value }))
            }
            InlineOp::Sqrt => {
                let (ty, v) = args[0].expect_scalar()?;
                let value = self.builder.ins().sqrt(v);
                Ok(Some(CgValue::Scalar { ty, value }))
            }
            InlineOp::Floor => {
                let (ty, v) = args[0].expect_scalar()?;
                let value = self.builder.ins().floor(v);
                Ok(Some(CgValue::Scalar { ty, value }))
            }
            InlineOp::Ceil => {
                let (ty, v) = args[0].expect_scalar()?;
                let value = self.builder.ins().ceil(v);
                Ok(Some(CgValue::Scalar { ty, value }))
            }
            InlineOp::Round => {
                let (ty, v) = args[0].expect_scalar()?;
                let value = self.builder.ins().nearest(v);
                Ok(Some(CgValue::Scalar { ty, value }))
            }
            InlineOp::Min | InlineOp::Max => {
                let (ty, a) = args[0].expect_scalar()?;
                let (_, b) = args[1].expect_scalar()?;
                let value = self.min_max(op == InlineOp::Min, ty, a, b);
                Ok(Some(CgValue::Scalar { ty, value }))
            }
            InlineOp::Clamp => {
                let (ty, x) = args[0].expect_scalar()?;
                let (_, lo) = args[1].expect_scalar()?;
                let (_, hi) = args[2].expect_scalar()?;
                let upper = self.min_max(true, ty, x, hi);
                let value = self.min_max(false, ty, upper, lo);
                Ok(Some(CgValue::Scalar { ty, value }))
            }
            InlineOp::Dot => {
                let value = self.dot3(&args[0], &args[1])?;
                Ok(Some(CgValue::Scalar {
                    ty: Scalar::Float,
                    value,
                }))
            }
            InlineOp::LengthSq => {
                let value = self.dot3(&args[0], &args[0])?;
                Ok(Some(CgValue::Scalar {
                    ty: Scalar::Float,
                    value,
                }))
            }
            InlineOp::Length => {
                let sq = self.dot3(&args[0], &args[0])?;
                let value = self.builder.ins().sqrt(sq);
                Ok(Some(CgValue::Scalar {
                    ty: Scalar::Float,
                    value,
                }))
            }
            InlineOp::Cross => {
                let a = self.vec3_elems(&args[0])?;
                let b = self.vec3_elems(&args[1])?;
                let out = self.alloc_array(Scalar::Float, 3);
                // (a1*b2 - a2*b1, a2*b0 - a0*b2, a0*b1 - a1*b0)
                for (i, (j, k)) in [(1, 2), (2, 0), (0, 1)].iter().enumerate() {
                    let p = self.builder.ins().fmul(a[*j], b[*k]);
                    let q = self.builder.ins().fmul(a[*k], b[*j]);
                    let d = self.builder.ins().fsub(p, q);
                    self.store_elem(Scalar::Float, out, i, d);
                }
                Ok(Some(CgValue::Array {
                    elem: Scalar::Float,
                    len: 3,
                    ptr: out,
                }))
            }
            InlineOp::Normalize => {
                let elems = self.vec3_elems(&args[0])?;
                let sq = self.dot3(&args[0], &args[0])?;
                let len = self.builder.ins().sqrt(sq);
                let out = self.alloc_array(Scalar::Float, 3);
                for (i, &e) in elems.iter().enumerate() {
                    let d = self.builder.ins().fdiv(e, len);
                    self.store_elem(Scalar::Float, out, i, d);
                }
                Ok(Some(CgValue::Array {
                    elem: Scalar::Float,
                    len: 3,
                    ptr: out,
                }))
            }
            InlineOp::Identity4 => {
                let out = self.alloc_array(Scalar::Float, 16);
                let zero = self.zero_scalar(Scalar::Float);
                let one = self.one_scalar(Scalar::Float);
                for i in 0..16 {
                    let v = if i % 5 == 0 { one } else { zero };
                    self.store_elem(Scalar::Float, out, i, v);
                }
                Ok(Some(CgValue::Array {
                    elem: Scalar::Float,
                    len: 16,
                    ptr: out,
                }))
            }
            InlineOp::MatMul => {
                let (CgValue::Array { ptr: a, .. }, CgValue::Array { ptr: b, .. }) =
                    (&args[0], &args[1])
                else {
                    return Err(CodeGenError::Logic("mmult needs matrices".into()));
                };
                let (a, b) = (*a, *b);
                let out = self.alloc_array(Scalar::Float, 16);
                for row in 0..4 {
                    for col in 0..4 {
                        let mut acc = None;
                        for k in 0..4 {
                            let x = self.load_elem(Scalar::Float, a, row * 4 + k);
                            let y = self.load_elem(Scalar::Float, b, k * 4 + col);
                            let p = self.builder.ins().fmul(x, y);
                            acc = Some(match acc {
                                None => p,
                                Some(s) => self.builder.ins().fadd(s, p),
                            });
                        }
                        self.store_elem(
                            Scalar::Float,
                            out,
                            row * 4 + col,
                            acc.expect("4-wide accumulator"),
                        );
                    }
                }
                Ok(Some(CgValue::Array {
                    elem: Scalar::Float,
                    len: 16,
                    ptr: out,
                }))
            }
            InlineOp::TransformV => {
                // Row-vector convention: out = v * M with implicit w = 1.
                let v = self.vec3_elems(&args[0])?;
                let CgValue::Array { ptr: m, .. } = &args[1] else {
                    return Err(CodeGenError::Logic("transformv needs a matrix".into()));
                };
                let m = *m;
                let out = self.alloc_array(Scalar::Float, 3);
                for col in 0..3 {
                    let mut acc = self.load_elem(Scalar::Float, m, 12 + col);
                    for (row, &e) in v.iter().enumerate() {
                        let cell = self.load_elem(Scalar::Float, m, row * 4 + col);
                        let p = self.builder.ins().fmul(e, cell);
                        acc = self.builder.ins().fadd(acc, p);
                    }
                    self.store_elem(Scalar::Float, out, col, acc);
                }
                Ok(Some(CgValue::Array {
                    elem: Scalar::Float,
                    len: 3,
                    ptr: out,
                }))
            }
            InlineOp::Lookupf => self.lower_lookupf(&args[0]),
            InlineOp::CoordX | InlineOp::CoordY | InlineOp::CoordZ => {
                let axis = match op {
                    InlineOp::CoordX => 0,
                    InlineOp::CoordY => 1,
                    _ => 2,
                };
                let TargetCtx::Volume { coord, .. } = &self.target else {
                    return Err(CodeGenError::Logic(
                        "coordinate built-ins need a volume kernel".into(),
                    ));
                };
                Ok(Some(CgValue::Scalar {
                    ty: Scalar::Int32,
                    value: coord[axis],
                }))
            }
            InlineOp::VoxelWorldPos => {
                let TargetCtx::Volume { coord, xform, .. } = &self.target else {
                    return Err(CodeGenError::Logic(
                        "getvoxelpws needs a volume kernel".into(),
                    ));
                };
                let (coord, xform) = (*coord, *xform);
                let out = self.alloc_array(Scalar::Float, 3);
                for axis in 0..3 {
                    let idx = self
                        .builder
                        .ins()
                        .fcvt_from_sint(types::F64, coord[axis]);
                    let world = self.apply_transform(xform, idx, axis, true);
                    let single = self.builder.ins().fdemote(types::F32, world);
                    self.store_elem(Scalar::Float, out, axis, single);
                }
                Ok(Some(CgValue::Array {
                    elem: Scalar::Float,
                    len: 3,
                    ptr: out,
                }))
            }
            InlineOp::IndexToWorld | InlineOp::WorldToIndex => {
                let to_world = op == InlineOp::IndexToWorld;
                let TargetCtx::Volume { xform, .. } = &self.target else {
                    return Err(CodeGenError::Logic(
                        "transform built-ins need a volume kernel".into(),
                    ));
                };
                let xform = *xform;
                let v = self.vec3_elems(&args[0])?;
                let out = self.alloc_array(Scalar::Float, 3);
                for (axis, &e) in v.iter().enumerate() {
                    let wide = self.builder.ins().fpromote(types::F64, e);
                    let mapped = self.apply_transform(xform, wide, axis, to_world);
                    let single = self.builder.ins().fdemote(types::F32, mapped);
                    self.store_elem(Scalar::Float, out, axis, single);
                }
                Ok(Some(CgValue::Array {
                    elem: Scalar::Float,
                    len: 3,
                    ptr: out,
                }))
            }
            InlineOp::InGroup => {
                let (handle, index, _) = self.group_call_operands(&args[0])?;
                let value = self
                    .call_import(
                        "vexel_group_test",
                        &[self.ptr_type, types::I64],
                        Some(types::I8),
                        &[handle, index],
                    )?
                    .expect("vexel_group_test returns a value");
                // The helper returns 0/1 already.
                let truth = self.builder.ins().icmp_imm(IntCC::NotEqual, value, 0);
                Ok(Some(CgValue::Scalar {
                    ty: Scalar::Bool,
                    value: truth,
                }))
            }
            InlineOp::AddToGroup | InlineOp::RemoveFromGroup => {
                let (handle, index, leaf_data) = self.group_call_operands(&args[0])?;
                let on = self
                    .builder
                    .ins()
                    .iconst(types::I8, (op == InlineOp::AddToGroup) as i64);
                self.call_import(
                    "vexel_group_set",
                    &[self.ptr_type, types::I64, types::I8, self.ptr_type],
                    None,
                    &[handle, index, on, leaf_data],
                )?;
                Ok(None)
            }
        }
    }

    fn min_max(&mut self, is_min: bool, ty: Scalar, a: Value, b: Value) -> Value {
        if ty.is_float() {
            if is_min {
                self.builder.ins().fmin(a, b)
            } else {
                self.builder.ins().fmax(a, b)
            }
        } else {
            let cc = if is_min {
                IntCC::SignedLessThan
            } else {
                IntCC::SignedGreaterThan
            };
            let cmp = self.builder.ins().icmp(cc, a, b);
            self.builder.ins().select(cmp, a, b)
        }
    }

    fn vec3_elems(&mut self, value: &CgValue) -> Result<[Value; 3], CodeGenError> {
        let CgValue::Array { elem, len, ptr } = value else {
            return Err(CodeGenError::Logic("expected a vec3".into()));
        };
        if *len != 3 {
            return Err(CodeGenError::Logic("expected a vec3".into()));
        }
        let (elem, ptr) = (*elem, *ptr);
        Ok([
            self.load_elem(elem, ptr, 0),
            self.load_elem(elem, ptr, 1),
            self.load_elem(elem, ptr, 2),
        ])
    }

    fn dot3(&mut self, a: &CgValue, b: &CgValue) -> Result<Value, CodeGenError> {
        let av = self.vec3_elems(a)?;
        let bv = self.vec3_elems(b)?;
        let mut acc = self.builder.ins().fmul(av[0], bv[0]);
        for i in 1..3 {
            let p = self.builder.ins().fmul(av[i], bv[i]);
            acc = self.builder.ins().fadd(acc, p);
        }
        Ok(acc)
    }

    /// `world = index * voxel_size + origin[axis]`, or the inverse.
    /// `xform` points at a `vexel_grid::Transform`.
    fn apply_transform(&mut self, xform: Value, v: Value, axis: usize, to_world: bool) -> Value {
        let scale = self
            .builder
            .ins()
            .load(types::F64, MemFlags::trusted(), xform, 0);
        let origin = self.builder.ins().load(
            types::F64,
            MemFlags::trusted(),
            xform,
            (8 + 8 * axis) as i32,
        );
        if to_world {
            let scaled = self.builder.ins().fmul(v, scale);
            self.builder.ins().fadd(scaled, origin)
        } else {
            let shifted = self.builder.ins().fsub(v, origin);
            self.builder.ins().fdiv(shifted, scale)
        }
    }

    /// Resolve a custom-data key to its slot and emit the lookup call; an
    /// unbound key folds to the constant 0 (the resolver warned).
    fn lower_lookupf(&mut self, key: &CgValue) -> Result<Option<CgValue>, CodeGenError> {
        let CgValue::Str(key) = key else {
            return Err(CodeGenError::Logic("lookupf needs a literal key".into()));
        };
        let Some(slot) = self.custom_keys.iter().position(|k| k == key) else {
            let value = self.zero_scalar(Scalar::Float);
            return Ok(Some(CgValue::Scalar {
                ty: Scalar::Float,
                value,
            }));
        };
        let custom = match &self.target {
            TargetCtx::Volume { custom, .. } => *custom,
            TargetCtx::Point { custom, .. } => *custom,
        };
        let index = self.builder.ins().iconst(types::I64, slot as i64);
        let wide = self
            .call_import(
                "vexel_custom_data_f64",
                &[self.ptr_type, types::I64],
                Some(types::F64),
                &[custom, index],
            )?
            .expect("vexel_custom_data_f64 returns a value");
        let value = self.builder.ins().fdemote(types::F32, wide);
        Ok(Some(CgValue::Scalar {
            ty: Scalar::Float,
            value,
        }))
    }

    /// Common operands of the group built-ins: the group's bitset handle,
    /// the point index and the leaf-local data pointer.
    fn group_call_operands(
        &mut self,
        name: &CgValue,
    ) -> Result<(Value, Value, Value), CodeGenError> {
        let CgValue::Str(name) = name else {
            return Err(CodeGenError::Logic("group name must be a literal".into()));
        };
        let TargetCtx::Point {
            index,
            leaf_data,
            group_handles,
            ..
        } = &self.target
        else {
            return Err(CodeGenError::Logic(
                "group built-ins need a point kernel".into(),
            ));
        };
        let slot = self
            .resolution
            .groups
            .iter()
            .position(|g| g.name == *name)
            .ok_or_else(|| {
                CodeGenError::Logic(format!("group '{}' missing from resolution", name))
            })?;
        Ok((group_handles[slot], *index, *leaf_data))
    }
}
