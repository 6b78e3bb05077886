//! Built-in function registry and overload selection.
//!
//! Each built-in is a [`FunctionGroup`]: a name plus an ordered list of
//! typed signatures. A signature is implemented either **inline** (the
//! code generator emits IR for it directly, keyed by [`InlineOp`]) or as
//! an **external** (a declared import that resolves to a `vexel_*`
//! runtime symbol when the module is added to the JIT).
//!
//! Overload selection scores every candidate with a per-argument cost
//! vector and picks the lexicographically smallest one; see
//! [`FunctionRegistry::select`]. The scoring is a pure function of the
//! argument types and the signature list, so a call site always resolves
//! to the same overload.

use crate::types::{AxType, Scalar};
use std::collections::HashMap;

/// Which kernel targets may call a signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Any,
    VolumeOnly,
    PointOnly,
}

/// The compilation target of a kernel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Target {
    Volume,
    Point,
}

impl Availability {
    pub fn allows(self, target: Target) -> bool {
        match self {
            Availability::Any => true,
            Availability::VolumeOnly => target == Target::Volume,
            Availability::PointOnly => target == Target::Point,
        }
    }
}

/// Operations the code generator expands in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InlineOp {
    Abs,
    Sqrt,
    Floor,
    Ceil,
    Round,
    Min,
    Max,
    Clamp,
    Dot,
    Length,
    LengthSq,
    Cross,
    Normalize,
    Identity4,
    MatMul,
    TransformV,
    Lookupf,
    CoordX,
    CoordY,
    CoordZ,
    VoxelWorldPos,
    IndexToWorld,
    WorldToIndex,
    InGroup,
    AddToGroup,
    RemoveFromGroup,
}

/// How a signature is realised in generated code.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FnImpl {
    /// Expanded in place by the code generator.
    Inline(InlineOp),
    /// Declared as an import and resolved against this runtime symbol at
    /// JIT link time.
    External(&'static str),
}

/// One overload of a built-in.
///
/// Scalar parameters pass by value; vector, matrix and string parameters
/// pass by pointer (strings only ever reach inline implementations,
/// which consume them at compile time).
#[derive(Debug, Clone)]
pub struct FunctionSignature {
    pub params: Vec<AxType>,
    /// `None` for void.
    pub ret: Option<AxType>,
    pub implementation: FnImpl,
    /// True when the call has no side effects on grid or group state.
    pub readonly: bool,
    pub availability: Availability,
}

/// A named overload set.
#[derive(Debug, Clone)]
pub struct FunctionGroup {
    pub name: String,
    pub signatures: Vec<FunctionSignature>,
}

/// Why overload selection failed.
#[derive(Debug, Clone, PartialEq)]
pub enum SelectError {
    /// No group of that name exists.
    UnknownFunction,
    /// The group exists but no signature accepts the arguments (or none
    /// is available on this target).
    NoMatch,
    /// Two signatures fit the arguments equally well.
    Ambiguous(usize, usize),
}

/// Conversion cost of passing `from` where `to` is expected.
///
/// `0` exact, `1` lossless widening within a family, `2` integer→float,
/// `3` narrowing or float→integer, `None` no implicit conversion.
/// Vectors and matrices convert elementwise and must agree on shape.
pub fn conversion_cost(from: AxType, to: AxType) -> Option<u32> {
    if from == to {
        return Some(0);
    }
    match (from, to) {
        (AxType::Scalar(f), AxType::Scalar(t)) => Some(scalar_cost(f, t)),
        (AxType::Str, _) | (_, AxType::Str) => None,
        (f, t) => {
            let (fe, fl) = f.array_parts()?;
            let (te, tl) = t.array_parts()?;
            if fl != tl {
                return None;
            }
            Some(scalar_cost(fe, te))
        }
    }
}

fn scalar_cost(from: Scalar, to: Scalar) -> u32 {
    if from == to {
        0
    } else if to.rank() < from.rank() {
        3
    } else if from.is_float() == to.is_float() {
        1
    } else {
        2
    }
}

/// Precedence-rank distance, the secondary key that prefers the nearest
/// target type among equal-cost candidates (so `foo(int)` resolves to a
/// `float` overload over a `double` one).
fn rank_distance(from: AxType, to: AxType) -> u32 {
    let scalar_pair = match (from, to) {
        (AxType::Scalar(f), AxType::Scalar(t)) => Some((f, t)),
        (f, t) => match (f.array_parts(), t.array_parts()) {
            (Some((fe, _)), Some((te, _))) => Some((fe, te)),
            _ => None,
        },
    };
    match scalar_pair {
        Some((f, t)) => (f.rank() as i32 - t.rank() as i32).unsigned_abs(),
        None => 0,
    }
}

/// The process-wide table of built-ins. Built once, then read-only.
#[derive(Debug)]
pub struct FunctionRegistry {
    groups: HashMap<String, FunctionGroup>,
}

impl FunctionRegistry {
    /// An empty registry, for tests that assemble their own groups.
    pub fn empty() -> Self {
        FunctionRegistry {
            groups: HashMap::new(),
        }
    }

    pub fn insert(&mut self, group: FunctionGroup) {
        debug_assert!(!group.signatures.is_empty(), "group without signatures");
        self.groups.insert(group.name.clone(), group);
    }

    pub fn group(&self, name: &str) -> Option<&FunctionGroup> {
        self.groups.get(name)
    }

    /// Resolve a call site to the index of the winning signature within
    /// the group.
    ///
    /// 1. keep signatures of matching arity that the target may call;
    /// 2. score each with a per-argument cost vector, dropping any with
    ///    an impossible conversion;
    /// 3. order by cost vector, then cost sum, then precedence distance;
    /// 4. equal best candidates with different parameter lists are
    ///    ambiguous.
    pub fn select(
        &self,
        name: &str,
        args: &[AxType],
        target: Target,
    ) -> Result<usize, SelectError> {
        let group = self.groups.get(name).ok_or(SelectError::UnknownFunction)?;

        struct Candidate {
            index: usize,
            costs: Vec<u32>,
            sum: u32,
            distance: u32,
        }

        let mut candidates = Vec::new();
        for (index, sig) in group.signatures.iter().enumerate() {
            if sig.params.len() != args.len() || !sig.availability.allows(target) {
                continue;
            }
            let mut costs = Vec::with_capacity(args.len());
            let mut distance = 0;
            let mut feasible = true;
            for (&arg, &param) in args.iter().zip(sig.params.iter()) {
                match conversion_cost(arg, param) {
                    Some(c) => {
                        costs.push(c);
                        distance += rank_distance(arg, param);
                    }
                    None => {
                        feasible = false;
                        break;
                    }
                }
            }
            if feasible {
                let sum = costs.iter().sum();
                candidates.push(Candidate {
                    index,
                    costs,
                    sum,
                    distance,
                });
            }
        }

        if candidates.is_empty() {
            return Err(SelectError::NoMatch);
        }

        candidates.sort_by(|a, b| {
            a.costs
                .cmp(&b.costs)
                .then(a.sum.cmp(&b.sum))
                .then(a.distance.cmp(&b.distance))
                .then(a.index.cmp(&b.index))
        });

        if candidates.len() > 1 {
            let (best, second) = (&candidates[0], &candidates[1]);
            let tied = best.costs == second.costs
                && best.sum == second.sum
                && best.distance == second.distance;
            if tied && group.signatures[best.index].params != group.signatures[second.index].params
            {
                return Err(SelectError::Ambiguous(best.index, second.index));
            }
        }

        Ok(candidates[0].index)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.groups.keys().map(String::as_str)
    }
}

// ----------------------------------------------------------------------
// The built-in catalogue
// ----------------------------------------------------------------------

fn sig(
    params: &[AxType],
    ret: Option<AxType>,
    implementation: FnImpl,
) -> FunctionSignature {
    FunctionSignature {
        params: params.to_vec(),
        ret,
        implementation,
        readonly: true,
        availability: Availability::Any,
    }
}

fn sig_on(
    params: &[AxType],
    ret: Option<AxType>,
    implementation: FnImpl,
    availability: Availability,
    readonly: bool,
) -> FunctionSignature {
    FunctionSignature {
        params: params.to_vec(),
        ret,
        implementation,
        readonly,
        availability,
    }
}

impl Default for FunctionRegistry {
    fn default() -> Self {
        Self::with_builtins()
    }
}

impl FunctionRegistry {
    /// The standard built-in catalogue.
    pub fn with_builtins() -> Self {
        use crate::types::{BOOL, DOUBLE, FLOAT, INT32, INT64, MAT4F, STRING, VEC3F};
        use FnImpl::{External, Inline};

        let mut registry = FunctionRegistry::empty();
        let mut add = |name: &str, signatures: Vec<FunctionSignature>| {
            registry.insert(FunctionGroup {
                name: name.to_string(),
                signatures,
            });
        };

        // Elementary math, expanded inline where Cranelift has the op.
        add(
            "abs",
            vec![
                sig(&[INT32], Some(INT32), Inline(InlineOp::Abs)),
                sig(&[INT64], Some(INT64), Inline(InlineOp::Abs)),
                sig(&[FLOAT], Some(FLOAT), Inline(InlineOp::Abs)),
                sig(&[DOUBLE], Some(DOUBLE), Inline(InlineOp::Abs)),
            ],
        );
        add(
            "sqrt",
            vec![
                sig(&[FLOAT], Some(FLOAT), Inline(InlineOp::Sqrt)),
                sig(&[DOUBLE], Some(DOUBLE), Inline(InlineOp::Sqrt)),
            ],
        );
        add(
            "floor",
            vec![
                sig(&[FLOAT], Some(FLOAT), Inline(InlineOp::Floor)),
                sig(&[DOUBLE], Some(DOUBLE), Inline(InlineOp::Floor)),
            ],
        );
        add(
            "ceil",
            vec![
                sig(&[FLOAT], Some(FLOAT), Inline(InlineOp::Ceil)),
                sig(&[DOUBLE], Some(DOUBLE), Inline(InlineOp::Ceil)),
            ],
        );
        add(
            "round",
            vec![
                sig(&[FLOAT], Some(FLOAT), Inline(InlineOp::Round)),
                sig(&[DOUBLE], Some(DOUBLE), Inline(InlineOp::Round)),
            ],
        );
        add(
            "min",
            vec![
                sig(&[INT32, INT32], Some(INT32), Inline(InlineOp::Min)),
                sig(&[INT64, INT64], Some(INT64), Inline(InlineOp::Min)),
                sig(&[FLOAT, FLOAT], Some(FLOAT), Inline(InlineOp::Min)),
                sig(&[DOUBLE, DOUBLE], Some(DOUBLE), Inline(InlineOp::Min)),
            ],
        );
        add(
            "max",
            vec![
                sig(&[INT32, INT32], Some(INT32), Inline(InlineOp::Max)),
                sig(&[INT64, INT64], Some(INT64), Inline(InlineOp::Max)),
                sig(&[FLOAT, FLOAT], Some(FLOAT), Inline(InlineOp::Max)),
                sig(&[DOUBLE, DOUBLE], Some(DOUBLE), Inline(InlineOp::Max)),
            ],
        );
        add(
            "clamp",
            vec![
                sig(&[INT32, INT32, INT32], Some(INT32), Inline(InlineOp::Clamp)),
                sig(&[FLOAT, FLOAT, FLOAT], Some(FLOAT), Inline(InlineOp::Clamp)),
                sig(
                    &[DOUBLE, DOUBLE, DOUBLE],
                    Some(DOUBLE),
                    Inline(InlineOp::Clamp),
                ),
            ],
        );

        // Transcendentals resolve to runtime symbols.
        for (name, f64_sym, f32_sym) in [
            ("sin", "vexel_sin", "vexel_sinf"),
            ("cos", "vexel_cos", "vexel_cosf"),
            ("tan", "vexel_tan", "vexel_tanf"),
            ("exp", "vexel_exp", "vexel_expf"),
            ("log", "vexel_log", "vexel_logf"),
        ] {
            add(
                name,
                vec![
                    sig(&[DOUBLE], Some(DOUBLE), External(f64_sym)),
                    sig(&[FLOAT], Some(FLOAT), External(f32_sym)),
                ],
            );
        }
        add(
            "pow",
            vec![
                sig(&[DOUBLE, DOUBLE], Some(DOUBLE), External("vexel_pow")),
                sig(&[FLOAT, FLOAT], Some(FLOAT), External("vexel_powf")),
            ],
        );
        add(
            "rand",
            vec![
                sig_on(&[], Some(DOUBLE), External("vexel_rand"), Availability::Any, false),
                sig(&[DOUBLE], Some(DOUBLE), External("vexel_rand_seeded")),
            ],
        );

        // Vector operations.
        add(
            "dot",
            vec![sig(&[VEC3F, VEC3F], Some(FLOAT), Inline(InlineOp::Dot))],
        );
        add(
            "length",
            vec![sig(&[VEC3F], Some(FLOAT), Inline(InlineOp::Length))],
        );
        add(
            "lengthsq",
            vec![sig(&[VEC3F], Some(FLOAT), Inline(InlineOp::LengthSq))],
        );
        add(
            "cross",
            vec![sig(&[VEC3F, VEC3F], Some(VEC3F), Inline(InlineOp::Cross))],
        );
        add(
            "normalize",
            vec![sig(&[VEC3F], Some(VEC3F), Inline(InlineOp::Normalize))],
        );

        // Matrix construction and multiply.
        add(
            "identity4",
            vec![sig(&[], Some(MAT4F), Inline(InlineOp::Identity4))],
        );
        add(
            "mmult",
            vec![sig(&[MAT4F, MAT4F], Some(MAT4F), Inline(InlineOp::MatMul))],
        );
        add(
            "transformv",
            vec![sig(&[VEC3F, MAT4F], Some(VEC3F), Inline(InlineOp::TransformV))],
        );

        // Custom-data lookup; the key must be a string literal.
        add(
            "lookupf",
            vec![sig(&[STRING], Some(FLOAT), Inline(InlineOp::Lookupf))],
        );

        // Volume-only coordinate helpers.
        add(
            "getcoordx",
            vec![sig_on(&[], Some(INT32), Inline(InlineOp::CoordX), Availability::VolumeOnly, true)],
        );
        add(
            "getcoordy",
            vec![sig_on(&[], Some(INT32), Inline(InlineOp::CoordY), Availability::VolumeOnly, true)],
        );
        add(
            "getcoordz",
            vec![sig_on(&[], Some(INT32), Inline(InlineOp::CoordZ), Availability::VolumeOnly, true)],
        );
        add(
            "getvoxelpws",
            vec![sig_on(
                &[],
                Some(VEC3F),
                Inline(InlineOp::VoxelWorldPos),
                Availability::VolumeOnly,
                true,
            )],
        );
        add(
            "indextoworld",
            vec![sig_on(
                &[VEC3F],
                Some(VEC3F),
                Inline(InlineOp::IndexToWorld),
                Availability::VolumeOnly,
                true,
            )],
        );
        add(
            "worldtoindex",
            vec![sig_on(
                &[VEC3F],
                Some(VEC3F),
                Inline(InlineOp::WorldToIndex),
                Availability::VolumeOnly,
                true,
            )],
        );

        // Point-only group membership.
        add(
            "ingroup",
            vec![sig_on(
                &[STRING],
                Some(BOOL),
                Inline(InlineOp::InGroup),
                Availability::PointOnly,
                true,
            )],
        );
        add(
            "addtogroup",
            vec![sig_on(
                &[STRING],
                None,
                Inline(InlineOp::AddToGroup),
                Availability::PointOnly,
                false,
            )],
        );
        add(
            "removefromgroup",
            vec![sig_on(
                &[STRING],
                None,
                Inline(InlineOp::RemoveFromGroup),
                Availability::PointOnly,
                false,
            )],
        );

        registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{DOUBLE, FLOAT, INT32, INT64, STRING, VEC3F};

    fn foo_registry() -> FunctionRegistry {
        let mut registry = FunctionRegistry::empty();
        registry.insert(FunctionGroup {
            name: "foo".to_string(),
            signatures: vec![
                sig(&[FLOAT, INT32], Some(FLOAT), FnImpl::External("vexel_a")),
                sig(&[DOUBLE, INT32], Some(DOUBLE), FnImpl::External("vexel_b")),
            ],
        });
        registry
    }

    #[test]
    fn test_exact_match_wins() {
        let registry = FunctionRegistry::with_builtins();
        let index = registry
            .select("min", &[FLOAT, FLOAT], Target::Volume)
            .unwrap();
        assert_eq!(registry.group("min").unwrap().signatures[index].params, vec![FLOAT, FLOAT]);
    }

    #[test]
    fn test_int_args_prefer_float_over_double() {
        // foo(1, 2): both candidates cost (2, 0); the float overload is
        // nearer in precedence and wins.
        let registry = foo_registry();
        assert_eq!(registry.select("foo", &[INT32, INT32], Target::Volume), Ok(0));
    }

    #[test]
    fn test_selection_is_deterministic() {
        let registry = FunctionRegistry::with_builtins();
        let first = registry.select("pow", &[INT32, FLOAT], Target::Volume);
        for _ in 0..8 {
            assert_eq!(registry.select("pow", &[INT32, FLOAT], Target::Volume), first);
        }
    }

    #[test]
    fn test_arity_filter() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(
            registry.select("sqrt", &[FLOAT, FLOAT], Target::Volume),
            Err(SelectError::NoMatch)
        );
    }

    #[test]
    fn test_unknown_function() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(
            registry.select("nope", &[], Target::Volume),
            Err(SelectError::UnknownFunction)
        );
    }

    #[test]
    fn test_no_implicit_conversion_from_string() {
        let registry = FunctionRegistry::with_builtins();
        assert_eq!(
            registry.select("sqrt", &[STRING], Target::Volume),
            Err(SelectError::NoMatch)
        );
    }

    #[test]
    fn test_target_availability() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.select("ingroup", &[STRING], Target::Point).is_ok());
        assert_eq!(
            registry.select("ingroup", &[STRING], Target::Volume),
            Err(SelectError::NoMatch)
        );
        assert!(registry.select("getcoordx", &[], Target::Volume).is_ok());
        assert_eq!(
            registry.select("getcoordx", &[], Target::Point),
            Err(SelectError::NoMatch)
        );
    }

    #[test]
    fn test_ambiguous_overload() {
        let mut registry = FunctionRegistry::empty();
        registry.insert(FunctionGroup {
            name: "amb".to_string(),
            signatures: vec![
                sig(&[FLOAT, DOUBLE], Some(FLOAT), FnImpl::External("vexel_a")),
                sig(&[DOUBLE, FLOAT], Some(FLOAT), FnImpl::External("vexel_b")),
            ],
        });
        // (int, int) costs (2, 2) against both with equal distance.
        assert!(matches!(
            registry.select("amb", &[INT32, INT32], Target::Volume),
            Err(SelectError::Ambiguous(_, _))
        ));
    }

    #[test]
    fn test_widening_beats_narrowing() {
        let registry = FunctionRegistry::with_builtins();
        // abs(int) exact; abs(long) would be widening; abs(short) absent
        // so a short argument widens to int.
        let index = registry
            .select("abs", &[crate::types::INT16], Target::Volume)
            .unwrap();
        assert_eq!(
            registry.group("abs").unwrap().signatures[index].params,
            vec![INT32]
        );
        let index = registry.select("abs", &[INT64], Target::Volume).unwrap();
        assert_eq!(
            registry.group("abs").unwrap().signatures[index].params,
            vec![INT64]
        );
    }

    #[test]
    fn test_vector_params_match_exactly() {
        let registry = FunctionRegistry::with_builtins();
        assert!(registry.select("dot", &[VEC3F, VEC3F], Target::Volume).is_ok());
        let v3i = AxType::Vec {
            elem: Scalar::Int32,
            len: 3,
        };
        // vec3i converts elementwise upward into vec3f.
        assert!(registry.select("dot", &[v3i, VEC3F], Target::Volume).is_ok());
        assert_eq!(
            registry.select("dot", &[FLOAT, VEC3F], Target::Volume),
            Err(SelectError::NoMatch)
        );
    }
}
