//! Typed value utilities over Cranelift IR.
//!
//! This is the value layer both compute generators share: scalar
//! conversion, boolean coercion, array packing/unpacking and the binary
//! operator table. Scalars are SSA values; vectors and matrices are
//! pointers to stack- or grid-backed element arrays and all array
//! arithmetic is emitted elementwise against those pointers.

use super::{CodeGen, CodeGenError};
use crate::ast::BinOp;
use crate::types::{AxType, Scalar};
use cranelift_codegen::ir::condcodes::{FloatCC, IntCC};
use cranelift_codegen::ir::{
    InstBuilder, MemFlags, StackSlotData, StackSlotKind, Type, Value, types,
};

/// A lowered expression value.
#[derive(Debug, Clone)]
pub enum CgValue {
    Scalar {
        ty: Scalar,
        value: Value,
    },
    /// A pointer to `len` contiguous elements.
    Array {
        elem: Scalar,
        len: usize,
        ptr: Value,
    },
    /// A compile-time string literal; consumed by inline built-ins and
    /// never materialised in IR.
    Str(String),
}

impl CgValue {
    pub fn ax_type(&self) -> AxType {
        match self {
            CgValue::Scalar { ty, .. } => AxType::Scalar(*ty),
            CgValue::Array { elem, len, .. } => {
                if *len == 16 && *elem == Scalar::Float {
                    AxType::Mat4
                } else {
                    AxType::Vec {
                        elem: *elem,
                        len: *len as u8,
                    }
                }
            }
            CgValue::Str(_) => AxType::Str,
        }
    }

    pub fn expect_scalar(&self) -> Result<(Scalar, Value), CodeGenError> {
        match self {
            CgValue::Scalar { ty, value } => Ok((*ty, *value)),
            other => Err(CodeGenError::Logic(format!(
                "expected a scalar value, found {}",
                other.ax_type()
            ))),
        }
    }
}

/// The Cranelift type of a scalar. Booleans are `i8` (0 or 1).
pub fn ir_type(s: Scalar) -> Type {
    match s {
        Scalar::Bool => types::I8,
        Scalar::Int16 => types::I16,
        Scalar::Int32 => types::I32,
        Scalar::Int64 => types::I64,
        Scalar::Float => types::F32,
        Scalar::Double => types::F64,
    }
}

/// Per-element storage size in bytes.
pub fn elem_size(s: Scalar) -> usize {
    ir_type(s).bytes() as usize
}

impl CodeGen<'_, '_> {
    /// Allocate a fresh stack array of `len` elements of `elem`.
    pub(super) fn alloc_array(&mut self, elem: Scalar, len: usize) -> Value {
        let size = (elem_size(elem) * len) as u32;
        let slot = self
            .builder
            .func
            .create_sized_stack_slot(StackSlotData::new(StackSlotKind::ExplicitSlot, size, 3));
        self.builder.ins().stack_addr(self.ptr_type, slot, 0)
    }

    pub(super) fn load_elem(&mut self, elem: Scalar, ptr: Value, index: usize) -> Value {
        let offset = (elem_size(elem) * index) as i32;
        self.builder
            .ins()
            .load(ir_type(elem), MemFlags::trusted(), ptr, offset)
    }

    pub(super) fn store_elem(&mut self, elem: Scalar, ptr: Value, index: usize, value: Value) {
        let offset = (elem_size(elem) * index) as i32;
        self.builder
            .ins()
            .store(MemFlags::trusted(), value, ptr, offset);
    }

    /// A zero constant of a scalar type.
    pub(super) fn zero_scalar(&mut self, ty: Scalar) -> Value {
        match ty {
            Scalar::Float => self.builder.ins().f32const(0.0f32),
            Scalar::Double => self.builder.ins().f64const(0.0),
            _ => self.builder.ins().iconst(ir_type(ty), 0),
        }
    }

    pub(super) fn one_scalar(&mut self, ty: Scalar) -> Value {
        match ty {
            Scalar::Float => self.builder.ins().f32const(1.0f32),
            Scalar::Double => self.builder.ins().f64const(1.0),
            _ => self.builder.ins().iconst(ir_type(ty), 1),
        }
    }

    /// The default value of a declared local: zero of its type.
    pub(super) fn zero_value(&mut self, ty: AxType) -> Result<CgValue, CodeGenError> {
        match ty {
            AxType::Scalar(s) => {
                let value = self.zero_scalar(s);
                Ok(CgValue::Scalar { ty: s, value })
            }
            _ => {
                let (elem, len) = ty
                    .array_parts()
                    .ok_or_else(|| CodeGenError::Logic("cannot zero a string".to_string()))?;
                let ptr = self.alloc_array(elem, len);
                let zero = self.zero_scalar(elem);
                for i in 0..len {
                    self.store_elem(elem, ptr, i, zero);
                }
                Ok(CgValue::Array { elem, len, ptr })
            }
        }
    }

    /// Arithmetic conversion between scalar representations.
    ///
    /// Float→integer saturates instead of trapping; everything else
    /// follows C conversion semantics. Narrowing is silent here — the
    /// resolver owns the warnings.
    pub(super) fn cast_scalar(&mut self, value: Value, from: Scalar, to: Scalar) -> Value {
        if from == to {
            return value;
        }
        // Everything coerces to bool through a compare-nonzero.
        if to == Scalar::Bool {
            return self.bool_coerce(value, from);
        }
        match (from.is_float(), to.is_float()) {
            (true, true) => {
                if to > from {
                    self.builder.ins().fpromote(ir_type(to), value)
                } else {
                    self.builder.ins().fdemote(ir_type(to), value)
                }
            }
            (false, false) => {
                let (fb, tb) = (ir_type(from).bytes(), ir_type(to).bytes());
                if tb > fb {
                    if from == Scalar::Bool {
                        // Bool is 0/1; zero-extension preserves it.
                        self.builder.ins().uextend(ir_type(to), value)
                    } else {
                        self.builder.ins().sextend(ir_type(to), value)
                    }
                } else {
                    self.builder.ins().ireduce(ir_type(to), value)
                }
            }
            (false, true) => {
                // Sub-word integers widen before the int→float convert.
                let widened = match from {
                    Scalar::Bool => self.builder.ins().uextend(types::I32, value),
                    Scalar::Int16 => self.builder.ins().sextend(types::I32, value),
                    _ => value,
                };
                self.builder.ins().fcvt_from_sint(ir_type(to), widened)
            }
            (true, false) => {
                let wide = if to == Scalar::Int16 { types::I32 } else { ir_type(to) };
                let converted = self.builder.ins().fcvt_to_sint_sat(wide, value);
                if to == Scalar::Int16 {
                    self.builder.ins().ireduce(types::I16, converted)
                } else {
                    converted
                }
            }
        }
    }

    /// Coerce a scalar to a 0/1 `i8` truth value. Floats compare
    /// ordered-not-equal against zero, so NaN coerces to false.
    pub(super) fn bool_coerce(&mut self, value: Value, from: Scalar) -> Value {
        match from {
            Scalar::Bool => value,
            Scalar::Float | Scalar::Double => {
                let zero = self.zero_scalar(from);
                self.builder
                    .ins()
                    .fcmp(FloatCC::OrderedNotEqual, value, zero)
            }
            _ => self.builder.ins().icmp_imm(IntCC::NotEqual, value, 0),
        }
    }

    /// Cast every element of an array to a new element type, returning
    /// the original pointer untouched when no conversion is needed.
    pub(super) fn array_cast(
        &mut self,
        ptr: Value,
        elem: Scalar,
        len: usize,
        target: Scalar,
    ) -> Value {
        if elem == target {
            return ptr;
        }
        let out = self.alloc_array(target, len);
        for i in 0..len {
            let v = self.load_elem(elem, ptr, i);
            let cast = self.cast_scalar(v, elem, target);
            self.store_elem(target, out, i, cast);
        }
        out
    }

    /// Broadcast a scalar into a fresh array.
    pub(super) fn splat(&mut self, value: Value, from: Scalar, elem: Scalar, len: usize) -> Value {
        let cast = self.cast_scalar(value, from, elem);
        let ptr = self.alloc_array(elem, len);
        for i in 0..len {
            self.store_elem(elem, ptr, i, cast);
        }
        ptr
    }

    /// Convert a value to a target type, inserting scalar casts, array
    /// element casts or a scalar→array broadcast as needed.
    pub(super) fn convert(&mut self, value: CgValue, to: AxType) -> Result<CgValue, CodeGenError> {
        if value.ax_type() == to {
            return Ok(value);
        }
        match (value, to) {
            (CgValue::Scalar { ty, value }, AxType::Scalar(target)) => {
                let cast = self.cast_scalar(value, ty, target);
                Ok(CgValue::Scalar {
                    ty: target,
                    value: cast,
                })
            }
            (CgValue::Scalar { ty, value }, to) => {
                let (elem, len) = to.array_parts().ok_or_else(|| {
                    CodeGenError::Logic(format!("cannot convert scalar to {}", to))
                })?;
                let ptr = self.splat(value, ty, elem, len);
                Ok(CgValue::Array { elem, len, ptr })
            }
            (CgValue::Array { elem, len, ptr }, to) => {
                let (target_elem, target_len) = to.array_parts().ok_or_else(|| {
                    CodeGenError::Logic(format!("cannot convert array to {}", to))
                })?;
                if len != target_len {
                    return Err(CodeGenError::Logic(format!(
                        "array length mismatch: {} vs {}",
                        len, target_len
                    )));
                }
                let cast = self.array_cast(ptr, elem, len, target_elem);
                Ok(CgValue::Array {
                    elem: target_elem,
                    len,
                    ptr: cast,
                })
            }
            (CgValue::Str(_), to) => Err(CodeGenError::Logic(format!(
                "a string cannot convert to {}",
                to
            ))),
        }
    }

    /// Pack scalar components into a fresh array, promoting each to the
    /// common element type.
    pub(super) fn array_pack_cast(
        &mut self,
        components: &[CgValue],
        elem: Scalar,
    ) -> Result<CgValue, CodeGenError> {
        let len = components.len();
        let ptr = self.alloc_array(elem, len);
        for (i, component) in components.iter().enumerate() {
            let (ty, value) = component.expect_scalar()?;
            let cast = self.cast_scalar(value, ty, elem);
            self.store_elem(elem, ptr, i, cast);
        }
        Ok(CgValue::Array { elem, len, ptr })
    }

    /// Extract one element of an array value.
    pub(super) fn array_unpack(
        &mut self,
        value: &CgValue,
        index: usize,
    ) -> Result<CgValue, CodeGenError> {
        match value {
            CgValue::Array { elem, len, ptr } => {
                if index >= *len {
                    return Err(CodeGenError::Logic(format!(
                        "component {} out of bounds for length {}",
                        index, len
                    )));
                }
                let loaded = self.load_elem(*elem, *ptr, index);
                Ok(CgValue::Scalar {
                    ty: *elem,
                    value: loaded,
                })
            }
            other => Err(CodeGenError::Logic(format!(
                "cannot unpack {}",
                other.ax_type()
            ))),
        }
    }

    /// One scalar binary operation on operands already of type `ty`.
    ///
    /// Floating-point comparison uses ordered predicates throughout, so
    /// any NaN operand makes `<`, `>`, `==` and `!=` all false. Integer
    /// division and remainder are signed and trap on a zero divisor.
    pub(super) fn binary_scalar(
        &mut self,
        op: BinOp,
        ty: Scalar,
        lhs: Value,
        rhs: Value,
    ) -> Result<Value, CodeGenError> {
        let b = &mut self.builder;
        let v = if ty.is_float() {
            match op {
                BinOp::Add => b.ins().fadd(lhs, rhs),
                BinOp::Sub => b.ins().fsub(lhs, rhs),
                BinOp::Mul => b.ins().fmul(lhs, rhs),
                BinOp::Div => b.ins().fdiv(lhs, rhs),
                BinOp::Eq => b.ins().fcmp(FloatCC::Equal, lhs, rhs),
                BinOp::Ne => b.ins().fcmp(FloatCC::OrderedNotEqual, lhs, rhs),
                BinOp::Lt => b.ins().fcmp(FloatCC::LessThan, lhs, rhs),
                BinOp::Gt => b.ins().fcmp(FloatCC::GreaterThan, lhs, rhs),
                BinOp::Le => b.ins().fcmp(FloatCC::LessThanOrEqual, lhs, rhs),
                BinOp::Ge => b.ins().fcmp(FloatCC::GreaterThanOrEqual, lhs, rhs),
                other => {
                    return Err(CodeGenError::Logic(format!(
                        "'{}' is not defined on floating point",
                        other.symbol()
                    )));
                }
            }
        } else {
            match op {
                BinOp::Add => b.ins().iadd(lhs, rhs),
                BinOp::Sub => b.ins().isub(lhs, rhs),
                BinOp::Mul => b.ins().imul(lhs, rhs),
                BinOp::Div => b.ins().sdiv(lhs, rhs),
                BinOp::Mod => b.ins().srem(lhs, rhs),
                BinOp::Shl => b.ins().ishl(lhs, rhs),
                BinOp::Shr => b.ins().sshr(lhs, rhs),
                BinOp::BitAnd => b.ins().band(lhs, rhs),
                BinOp::BitOr => b.ins().bor(lhs, rhs),
                BinOp::BitXor => b.ins().bxor(lhs, rhs),
                BinOp::Eq => b.ins().icmp(IntCC::Equal, lhs, rhs),
                BinOp::Ne => b.ins().icmp(IntCC::NotEqual, lhs, rhs),
                BinOp::Lt => b.ins().icmp(IntCC::SignedLessThan, lhs, rhs),
                BinOp::Gt => b.ins().icmp(IntCC::SignedGreaterThan, lhs, rhs),
                BinOp::Le => b.ins().icmp(IntCC::SignedLessThanOrEqual, lhs, rhs),
                BinOp::Ge => b.ins().icmp(IntCC::SignedGreaterThanOrEqual, lhs, rhs),
                other => {
                    return Err(CodeGenError::Logic(format!(
                        "'{}' cannot lower as a plain binary op",
                        other.symbol()
                    )));
                }
            }
        };
        Ok(v)
    }

    /// A non-logical binary operation on converted operands.
    ///
    /// Both operands must already share `operand_ty` (the caller promotes
    /// via [`CodeGen::convert`]). Array operands lower elementwise into a
    /// fresh result array; array equality folds elementwise comparisons
    /// with `and`/`or`.
    pub(super) fn binary_values(
        &mut self,
        op: BinOp,
        operand_ty: AxType,
        lhs: CgValue,
        rhs: CgValue,
    ) -> Result<CgValue, CodeGenError> {
        match operand_ty {
            AxType::Scalar(s) => {
                let (_, l) = lhs.expect_scalar()?;
                let (_, r) = rhs.expect_scalar()?;
                let value = self.binary_scalar(op, s, l, r)?;
                let ty = if op.is_comparison() { Scalar::Bool } else { s };
                Ok(CgValue::Scalar { ty, value })
            }
            _ => {
                let (elem, len) = operand_ty
                    .array_parts()
                    .ok_or_else(|| CodeGenError::Logic("string operands".to_string()))?;
                let (CgValue::Array { ptr: lp, .. }, CgValue::Array { ptr: rp, .. }) =
                    (&lhs, &rhs)
                else {
                    return Err(CodeGenError::Logic(
                        "array operation on non-array operands".to_string(),
                    ));
                };
                let (lp, rp) = (*lp, *rp);
                if op.is_comparison() {
                    // Elementwise compare folded to a single bool:
                    // `==` is all-equal, `!=` is any-ordered-not-equal.
                    let mut acc = None;
                    for i in 0..len {
                        let l = self.load_elem(elem, lp, i);
                        let r = self.load_elem(elem, rp, i);
                        let c = self.binary_scalar(op, elem, l, r)?;
                        acc = Some(match acc {
                            None => c,
                            Some(prev) => {
                                if op == BinOp::Eq {
                                    self.builder.ins().band(prev, c)
                                } else {
                                    self.builder.ins().bor(prev, c)
                                }
                            }
                        });
                    }
                    let value =
                        acc.ok_or_else(|| CodeGenError::Logic("empty array".to_string()))?;
                    Ok(CgValue::Scalar {
                        ty: Scalar::Bool,
                        value,
                    })
                } else {
                    let out = self.alloc_array(elem, len);
                    for i in 0..len {
                        let l = self.load_elem(elem, lp, i);
                        let r = self.load_elem(elem, rp, i);
                        let v = self.binary_scalar(op, elem, l, r)?;
                        self.store_elem(elem, out, i, v);
                    }
                    Ok(CgValue::Array {
                        elem,
                        len,
                        ptr: out,
                    })
                }
            }
        }
    }
}
