//! The Vexel type system.
//!
//! Scalars, fixed-length vectors of scalars, 4×4 float matrices and the
//! (kernel-reserved) string type. Implicit arithmetic conversion follows
//! a single total precedence order; mixed-type binary operations promote
//! to the higher-precedence operand type, vectors elementwise.

use vexel_grid::AttrType;

/// Scalar types, declared in precedence order.
///
/// `derive(Ord)` on this declaration order *is* the promotion lattice:
/// `bool < i16 < i32 < i64 < f32 < f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scalar {
    Bool,
    Int16,
    Int32,
    Int64,
    Float,
    Double,
}

impl Scalar {
    pub fn is_integer(self) -> bool {
        matches!(self, Scalar::Int16 | Scalar::Int32 | Scalar::Int64)
    }

    pub fn is_float(self) -> bool {
        matches!(self, Scalar::Float | Scalar::Double)
    }

    /// Position in the precedence order, with a slot left for `i8`
    /// (not source-declarable) so the lattice matches the documented
    /// `bool < i8 < i16 < i32 < i64 < f32 < f64`.
    pub fn rank(self) -> u8 {
        match self {
            Scalar::Bool => 0,
            Scalar::Int16 => 2,
            Scalar::Int32 => 3,
            Scalar::Int64 => 4,
            Scalar::Float => 5,
            Scalar::Double => 6,
        }
    }

    /// The promoted type of a mixed binary operation: `max(a, b)`.
    pub fn precedence(a: Scalar, b: Scalar) -> Scalar {
        a.max(b)
    }

    pub fn name(self) -> &'static str {
        match self {
            Scalar::Bool => "bool",
            Scalar::Int16 => "short",
            Scalar::Int32 => "int",
            Scalar::Int64 => "long",
            Scalar::Float => "float",
            Scalar::Double => "double",
        }
    }
}

impl std::fmt::Display for Scalar {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// A complete Vexel value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AxType {
    Scalar(Scalar),
    /// Fixed-length vector; `len` is 3 or 4.
    Vec { elem: Scalar, len: u8 },
    /// 4×4 matrix of `f32`, stored row-major as 16 contiguous floats.
    Mat4,
    /// Strings parse and resolve but never cross the kernel ABI.
    Str,
}

pub const BOOL: AxType = AxType::Scalar(Scalar::Bool);
pub const INT16: AxType = AxType::Scalar(Scalar::Int16);
pub const INT32: AxType = AxType::Scalar(Scalar::Int32);
pub const INT64: AxType = AxType::Scalar(Scalar::Int64);
pub const FLOAT: AxType = AxType::Scalar(Scalar::Float);
pub const DOUBLE: AxType = AxType::Scalar(Scalar::Double);
pub const VEC3F: AxType = AxType::Vec {
    elem: Scalar::Float,
    len: 3,
};
pub const MAT4F: AxType = AxType::Mat4;
pub const STRING: AxType = AxType::Str;

impl AxType {
    pub fn scalar(self) -> Option<Scalar> {
        match self {
            AxType::Scalar(s) => Some(s),
            _ => None,
        }
    }

    pub fn is_scalar(self) -> bool {
        matches!(self, AxType::Scalar(_))
    }

    /// Element type and length when this is array-shaped (vector or
    /// matrix).
    pub fn array_parts(self) -> Option<(Scalar, usize)> {
        match self {
            AxType::Vec { elem, len } => Some((elem, len as usize)),
            AxType::Mat4 => Some((Scalar::Float, 16)),
            _ => None,
        }
    }

    /// The grid attribute type this maps to, if attributes of this type
    /// are supported.
    pub fn attr_type(self) -> Option<AttrType> {
        match self {
            AxType::Scalar(Scalar::Bool) => Some(AttrType::Bool),
            AxType::Scalar(Scalar::Int32) => Some(AttrType::I32),
            AxType::Scalar(Scalar::Int64) => Some(AttrType::I64),
            AxType::Scalar(Scalar::Float) => Some(AttrType::F32),
            AxType::Scalar(Scalar::Double) => Some(AttrType::F64),
            AxType::Vec {
                elem: Scalar::Float,
                len: 3,
            } => Some(AttrType::Vec3F),
            AxType::Mat4 => Some(AttrType::Mat4F),
            _ => None,
        }
    }

    pub fn name(self) -> String {
        match self {
            AxType::Scalar(s) => s.name().to_string(),
            AxType::Vec { elem, len } => {
                let suffix = match elem {
                    Scalar::Bool => "b",
                    Scalar::Int16 => "s",
                    Scalar::Int32 => "i",
                    Scalar::Int64 => "l",
                    Scalar::Float => "f",
                    Scalar::Double => "d",
                };
                format!("vec{}{}", len, suffix)
            }
            AxType::Mat4 => "mat4f".to_string(),
            AxType::Str => "string".to_string(),
        }
    }

    /// The promoted type of a binary operation over `a` and `b`, or
    /// `None` when the shapes are incompatible. Scalars broadcast over
    /// arrays; two arrays must agree on shape.
    pub fn promote(a: AxType, b: AxType) -> Option<AxType> {
        match (a, b) {
            (AxType::Scalar(x), AxType::Scalar(y)) => {
                Some(AxType::Scalar(Scalar::precedence(x, y)))
            }
            (AxType::Scalar(s), arr) | (arr, AxType::Scalar(s)) => {
                let (elem, len) = arr.array_parts()?;
                let elem = Scalar::precedence(elem, s);
                Some(if len == 16 && elem == Scalar::Float {
                    AxType::Mat4
                } else {
                    AxType::Vec {
                        elem,
                        len: len as u8,
                    }
                })
            }
            (x, y) => {
                let (ex, lx) = x.array_parts()?;
                let (ey, ly) = y.array_parts()?;
                if lx != ly {
                    return None;
                }
                let elem = Scalar::precedence(ex, ey);
                Some(if lx == 16 && elem == Scalar::Float {
                    AxType::Mat4
                } else {
                    AxType::Vec {
                        elem,
                        len: lx as u8,
                    }
                })
            }
        }
    }
}

impl std::fmt::Display for AxType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_is_total_and_commutative() {
        let all = [
            Scalar::Bool,
            Scalar::Int16,
            Scalar::Int32,
            Scalar::Int64,
            Scalar::Float,
            Scalar::Double,
        ];
        for &a in &all {
            for &b in &all {
                let p = Scalar::precedence(a, b);
                assert_eq!(p, Scalar::precedence(b, a));
                assert!(p == a || p == b);
            }
        }
    }

    #[test]
    fn test_int_promotes_to_float() {
        assert_eq!(Scalar::precedence(Scalar::Int64, Scalar::Float), Scalar::Float);
        assert_eq!(
            Scalar::precedence(Scalar::Int32, Scalar::Double),
            Scalar::Double
        );
    }

    #[test]
    fn test_vector_promotion_elementwise() {
        let v3i = AxType::Vec {
            elem: Scalar::Int32,
            len: 3,
        };
        assert_eq!(AxType::promote(v3i, VEC3F), Some(VEC3F));
        // Scalar broadcast
        assert_eq!(AxType::promote(VEC3F, INT32), Some(VEC3F));
        // Shape mismatch
        let v4f = AxType::Vec {
            elem: Scalar::Float,
            len: 4,
        };
        assert_eq!(AxType::promote(v4f, VEC3F), None);
    }

    #[test]
    fn test_attr_mapping() {
        assert_eq!(FLOAT.attr_type(), Some(AttrType::F32));
        assert_eq!(VEC3F.attr_type(), Some(AttrType::Vec3F));
        assert_eq!(INT16.attr_type(), None);
        assert_eq!(STRING.attr_type(), None);
    }
}
