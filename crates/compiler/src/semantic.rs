//! Type resolution and attribute scanning.
//!
//! One pass over the AST annotates every expression with its resolved
//! type, builds the frozen attribute registry and the group-use list,
//! records the overload each call site selected, and gathers warnings
//! (narrowing, bitwise-on-float, dead code, unused locals). The pass is
//! deterministic: resolving the same tree twice produces identical
//! annotations.

use crate::ast::{Ast, BinOp, Expr, ExprId, Keyword, Literal, Stmt, StmtId, UnaryOp};
use crate::error::{Diagnostic, DiagnosticKind, Span};
use crate::registry::{FnImpl, FunctionRegistry, InlineOp, SelectError, Target};
use crate::types::{self, AxType, Scalar};
use std::collections::HashMap;

/// Per-expression type annotations, indexed by [`ExprId`].
///
/// Every expression resolves to `Some` type except calls to void
/// built-ins, which may only appear as expression statements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TypeTable {
    types: Vec<Option<AxType>>,
}

impl TypeTable {
    fn with_capacity(len: usize) -> Self {
        TypeTable {
            types: vec![None; len],
        }
    }

    fn set(&mut self, id: ExprId, ty: Option<AxType>) {
        self.types[id.0 as usize] = ty;
    }

    pub fn get(&self, id: ExprId) -> Option<AxType> {
        self.types[id.0 as usize]
    }

    /// The annotation of an expression that earlier passes guaranteed to
    /// have one.
    pub fn expect(&self, id: ExprId) -> AxType {
        self.get(id)
            .expect("expression left unannotated by type resolution")
    }
}

/// How a kernel touches an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    Read,
    Write,
    ReadWrite,
}

impl Access {
    fn merged(self, other: Access) -> Access {
        if self == other { self } else { Access::ReadWrite }
    }

    pub fn reads(self) -> bool {
        matches!(self, Access::Read | Access::ReadWrite)
    }

    pub fn writes(self) -> bool {
        matches!(self, Access::Write | Access::ReadWrite)
    }
}

/// One attribute the kernel references.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeInfo {
    pub name: String,
    pub ty: AxType,
    pub access: Access,
}

/// The per-compilation attribute list, in first-reference order.
///
/// Built during type resolution and frozen before code generation; the
/// executables use it to pre-size grids and to order the kernel's
/// attribute pointer table.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AttributeRegistry {
    attrs: Vec<AttributeInfo>,
}

impl AttributeRegistry {
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.attrs.iter().position(|a| a.name == name)
    }

    pub fn attrs(&self) -> &[AttributeInfo] {
        &self.attrs
    }

    pub fn len(&self) -> usize {
        self.attrs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.attrs.is_empty()
    }

    fn reference(
        &mut self,
        name: &str,
        ty: AxType,
        access: Access,
        span: Span,
        source: &str,
    ) -> Result<usize, Diagnostic> {
        if let Some(index) = self.index_of(name) {
            let existing = &mut self.attrs[index];
            if existing.ty != ty {
                return Err(Diagnostic::new(
                    DiagnosticKind::TypeError,
                    format!(
                        "attribute '{}' referenced as {} but previously as {}",
                        name, ty, existing.ty
                    ),
                    span,
                    source,
                ));
            }
            existing.access = existing.access.merged(access);
            Ok(index)
        } else {
            self.attrs.push(AttributeInfo {
                name: name.to_string(),
                ty,
                access,
            });
            Ok(self.attrs.len() - 1)
        }
    }
}

/// A point group the kernel references, with whether it writes
/// membership.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupUse {
    pub name: String,
    pub write: bool,
}

/// Everything type resolution produces for the code generator and the
/// executables.
#[derive(Debug, Clone)]
pub struct Resolution {
    pub types: TypeTable,
    pub attributes: AttributeRegistry,
    pub groups: Vec<GroupUse>,
    /// Call-site expression id → selected signature index.
    pub call_overloads: HashMap<u32, usize>,
    pub warnings: Vec<Diagnostic>,
}

/// Options the resolver needs; a subset of the driver's options.
#[derive(Debug, Clone, Default)]
pub struct ResolveOptions {
    pub allow_implicit_float_to_int: bool,
    /// Custom-data keys, in blob order, for `lookupf` validation.
    pub custom_keys: Vec<String>,
}

struct LocalInfo {
    ty: AxType,
    read: bool,
    span: Span,
}

/// Run type resolution over a parsed kernel.
pub fn resolve(
    ast: &Ast,
    registry: &FunctionRegistry,
    target: Target,
    options: &ResolveOptions,
    source: &str,
) -> Result<Resolution, Diagnostic> {
    let mut resolver = Resolver {
        ast,
        registry,
        target,
        options,
        source,
        types: TypeTable::with_capacity(ast.expr_count()),
        attributes: AttributeRegistry::default(),
        groups: Vec::new(),
        call_overloads: HashMap::new(),
        warnings: Vec::new(),
        scopes: vec![HashMap::new()],
        loop_depth: 0,
    };
    let mut terminated = false;
    for &stmt in ast.root() {
        if terminated {
            resolver.warn(
                DiagnosticKind::DeadCodeWarning,
                "statement is unreachable",
                ast.stmt_span(stmt),
            );
            break;
        }
        terminated = resolver.check_stmt(stmt)?;
    }
    resolver.pop_scope();
    Ok(Resolution {
        types: resolver.types,
        attributes: resolver.attributes,
        groups: resolver.groups,
        call_overloads: resolver.call_overloads,
        warnings: resolver.warnings,
    })
}

struct Resolver<'a> {
    ast: &'a Ast,
    registry: &'a FunctionRegistry,
    target: Target,
    options: &'a ResolveOptions,
    source: &'a str,
    types: TypeTable,
    attributes: AttributeRegistry,
    groups: Vec<GroupUse>,
    call_overloads: HashMap<u32, usize>,
    warnings: Vec<Diagnostic>,
    scopes: Vec<HashMap<String, LocalInfo>>,
    loop_depth: usize,
}

impl Resolver<'_> {
    fn error(
        &self,
        kind: DiagnosticKind,
        message: impl Into<String>,
        span: Span,
    ) -> Diagnostic {
        Diagnostic::new(kind, message, span, self.source)
    }

    fn warn(&mut self, kind: DiagnosticKind, message: impl Into<String>, span: Span) {
        self.warnings
            .push(Diagnostic::new(kind, message, span, self.source));
    }

    fn push_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn pop_scope(&mut self) {
        let scope = self.scopes.pop().expect("scope stack underflow");
        let mut unused: Vec<_> = scope
            .into_iter()
            .filter(|(_, info)| !info.read)
            .collect();
        // Report in declaration order, not hash order.
        unused.sort_by_key(|(_, info)| (info.span.line, info.span.column));
        for (name, info) in unused {
            self.warn(
                DiagnosticKind::UnusedLocalWarning,
                format!("local '{}' is never read", name),
                info.span,
            );
        }
    }

    fn lookup_local(&mut self, name: &str) -> Option<AxType> {
        for scope in self.scopes.iter_mut().rev() {
            if let Some(info) = scope.get_mut(name) {
                info.read = true;
                return Some(info.ty);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    /// Check one statement; returns true when control cannot continue
    /// past it.
    fn check_stmt(&mut self, id: StmtId) -> Result<bool, Diagnostic> {
        let span = self.ast.stmt_span(id);
        match self.ast.stmt(id) {
            Stmt::Block(body) => {
                self.push_scope();
                let mut terminated = false;
                for &stmt in body {
                    if terminated {
                        self.warn(
                            DiagnosticKind::DeadCodeWarning,
                            "statement is unreachable",
                            self.ast.stmt_span(stmt),
                        );
                        break;
                    }
                    terminated = self.check_stmt(stmt)?;
                }
                self.pop_scope();
                Ok(terminated)
            }
            Stmt::Declare { ty, name, init } => {
                if *ty == types::STRING {
                    return Err(self.error(
                        DiagnosticKind::TypeError,
                        "string locals are not supported in kernels",
                        span,
                    ));
                }
                if let Some(init) = init {
                    let init_ty = self.resolve_value_expr(*init)?;
                    self.check_assignable(init_ty, *ty, self.ast.expr_span(*init))?;
                }
                let scope = self.scopes.last_mut().expect("at least one scope");
                if scope.contains_key(name) {
                    return Err(self.error(
                        DiagnosticKind::TypeError,
                        format!("'{}' is already declared in this scope", name),
                        span,
                    ));
                }
                scope.insert(
                    name.clone(),
                    LocalInfo {
                        ty: *ty,
                        read: false,
                        span,
                    },
                );
                Ok(false)
            }
            Stmt::Assign { op, target, value } => {
                let target_ty = self.resolve_lvalue(*target, op.binary_op().is_some())?;
                let value_ty = self.resolve_value_expr(*value)?;
                let effective = match op.binary_op() {
                    // `a op= b` behaves as `a = a op b`.
                    Some(bin) => self.binary_result(bin, target_ty, value_ty, span)?,
                    None => value_ty,
                };
                self.check_assignable(effective, target_ty, span)?;
                Ok(false)
            }
            Stmt::Expr(e) => {
                self.resolve_expr(*e)?;
                Ok(false)
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                self.check_condition(*cond)?;
                let then_term = self.check_stmt(*then_body)?;
                let else_term = match else_body {
                    Some(else_body) => self.check_stmt(*else_body)?,
                    None => false,
                };
                Ok(then_term && else_term)
            }
            Stmt::Loop {
                init, cond, step, body, ..
            } => {
                self.push_scope();
                if let Some(init) = init {
                    self.check_stmt(*init)?;
                }
                self.check_condition(*cond)?;
                self.loop_depth += 1;
                let result = self.check_stmt(*body);
                self.loop_depth -= 1;
                result?;
                if let Some(step) = step {
                    self.check_stmt(*step)?;
                }
                self.pop_scope();
                // A loop may iterate zero times; it never terminates the
                // enclosing block.
                Ok(false)
            }
            Stmt::Keyword(kw) => {
                if matches!(kw, Keyword::Break | Keyword::Continue) && self.loop_depth == 0 {
                    return Err(self.error(
                        DiagnosticKind::ParseError,
                        format!(
                            "'{}' outside of a loop",
                            if *kw == Keyword::Break { "break" } else { "continue" }
                        ),
                        span,
                    ));
                }
                Ok(true)
            }
        }
    }

    fn check_condition(&mut self, cond: ExprId) -> Result<(), Diagnostic> {
        let ty = self.resolve_value_expr(cond)?;
        if !ty.is_scalar() {
            return Err(self.error(
                DiagnosticKind::TypeError,
                format!("condition must be scalar, found {}", ty),
                self.ast.expr_span(cond),
            ));
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Resolve an expression that must produce a value.
    fn resolve_value_expr(&mut self, id: ExprId) -> Result<AxType, Diagnostic> {
        match self.resolve_expr(id)? {
            Some(ty) => Ok(ty),
            None => Err(self.error(
                DiagnosticKind::TypeError,
                "void function call used as a value",
                self.ast.expr_span(id),
            )),
        }
    }

    /// Resolve an expression and record its annotation. `None` marks a
    /// void call.
    fn resolve_expr(&mut self, id: ExprId) -> Result<Option<AxType>, Diagnostic> {
        let span = self.ast.expr_span(id);
        let ty: Option<AxType> = match self.ast.expr(id) {
            Expr::Literal(lit) => Some(lit.ax_type()),
            Expr::Local(name) => {
                let name = name.clone();
                match self.lookup_local(&name) {
                    Some(ty) => Some(ty),
                    None => {
                        return Err(self.error(
                            DiagnosticKind::TypeError,
                            format!("use of undeclared variable '{}'", name),
                            span,
                        ));
                    }
                }
            }
            Expr::Attribute { name, ty, .. } => {
                let (name, ty) = (name.clone(), *ty);
                Some(self.reference_attribute(&name, ty, Access::Read, span)?)
            }
            Expr::Cast { target, value } => {
                let (target, value) = (*target, *value);
                let from = self.resolve_value_expr(value)?;
                if from.scalar().is_none() {
                    return Err(self.error(
                        DiagnosticKind::TypeError,
                        format!("cannot cast {} to {}", from, target),
                        span,
                    ));
                }
                Some(target)
            }
            Expr::Unary { op, value } => {
                let (op, value) = (*op, *value);
                let operand = self.resolve_value_expr(value)?;
                Some(self.unary_result(op, operand, span)?)
            }
            Expr::Binary { op, lhs, rhs } => {
                let (op, lhs, rhs) = (*op, *lhs, *rhs);
                let l = self.resolve_value_expr(lhs)?;
                let r = self.resolve_value_expr(rhs)?;
                Some(self.binary_result(op, l, r, span)?)
            }
            Expr::Crement { target, .. } => {
                let target = *target;
                let ty = self.resolve_lvalue(target, true)?;
                match ty.scalar() {
                    Some(s) if s != Scalar::Bool => Some(ty),
                    _ => {
                        return Err(self.error(
                            DiagnosticKind::TypeError,
                            format!("'++'/'--' needs a numeric scalar, found {}", ty),
                            span,
                        ));
                    }
                }
            }
            Expr::Call { name, args } => {
                let name = name.clone();
                let args = args.clone();
                self.resolve_call(id, &name, &args, span)?
            }
            Expr::Pack(items) => {
                let items = items.clone();
                let mut elem = Scalar::Bool;
                for &item in &items {
                    let ty = self.resolve_value_expr(item)?;
                    match ty.scalar() {
                        Some(s) => elem = Scalar::precedence(elem, s),
                        None => {
                            return Err(self.error(
                                DiagnosticKind::TypeError,
                                format!("vector components must be scalar, found {}", ty),
                                self.ast.expr_span(item),
                            ));
                        }
                    }
                }
                Some(AxType::Vec {
                    elem,
                    len: items.len() as u8,
                })
            }
            Expr::Unpack { value, index } => {
                let (value, index) = (*value, *index);
                let base = self.resolve_value_expr(value)?;
                let Some((elem, len)) = base.array_parts() else {
                    return Err(self.error(
                        DiagnosticKind::TypeError,
                        format!("cannot index into {}", base),
                        span,
                    ));
                };
                if index as usize >= len {
                    return Err(self.error(
                        DiagnosticKind::TypeError,
                        format!("component {} out of bounds for {}", index, base),
                        span,
                    ));
                }
                Some(AxType::Scalar(elem))
            }
        };
        self.types.set(id, ty);
        Ok(ty)
    }

    /// Resolve an assignment or crement target, marking attribute access.
    fn resolve_lvalue(&mut self, id: ExprId, reads: bool) -> Result<AxType, Diagnostic> {
        let span = self.ast.expr_span(id);
        let ty = match self.ast.expr(id) {
            Expr::Local(name) => {
                let name = name.clone();
                match self.lookup_local(&name) {
                    Some(ty) => ty,
                    None => {
                        return Err(self.error(
                            DiagnosticKind::TypeError,
                            format!("use of undeclared variable '{}'", name),
                            span,
                        ));
                    }
                }
            }
            Expr::Attribute { name, ty, .. } => {
                let (name, ty) = (name.clone(), *ty);
                let access = if reads { Access::ReadWrite } else { Access::Write };
                self.reference_attribute(&name, ty, access, span)?
            }
            Expr::Unpack { value, index } => {
                let (value, index) = (*value, *index);
                // Writing one component still needs the base substrate,
                // so the base resolves as a read-write lvalue.
                let base = self.resolve_lvalue(value, true)?;
                let Some((elem, len)) = base.array_parts() else {
                    return Err(self.error(
                        DiagnosticKind::TypeError,
                        format!("cannot index into {}", base),
                        span,
                    ));
                };
                if index as usize >= len {
                    return Err(self.error(
                        DiagnosticKind::TypeError,
                        format!("component {} out of bounds for {}", index, base),
                        span,
                    ));
                }
                AxType::Scalar(elem)
            }
            _ => {
                return Err(self.error(
                    DiagnosticKind::TypeError,
                    "expression is not assignable",
                    span,
                ));
            }
        };
        self.types.set(id, Some(ty));
        Ok(ty)
    }

    fn reference_attribute(
        &mut self,
        name: &str,
        ty: AxType,
        access: Access,
        span: Span,
    ) -> Result<AxType, Diagnostic> {
        if ty == types::STRING {
            return Err(self.error(
                DiagnosticKind::TypeError,
                format!(
                    "string attribute '{}' cannot be used in a kernel (reserved)",
                    name
                ),
                span,
            ));
        }
        if ty.attr_type().is_none() {
            return Err(self.error(
                DiagnosticKind::TypeError,
                format!("attributes of type {} are not supported", ty),
                span,
            ));
        }
        self.attributes
            .reference(name, ty, access, span, self.source)?;
        Ok(ty)
    }

    fn unary_result(
        &mut self,
        op: UnaryOp,
        operand: AxType,
        span: Span,
    ) -> Result<AxType, Diagnostic> {
        match op {
            UnaryOp::Neg => match operand {
                AxType::Scalar(Scalar::Bool) => Ok(types::INT32),
                AxType::Scalar(_) | AxType::Vec { .. } | AxType::Mat4 => Ok(operand),
                AxType::Str => Err(self.error(
                    DiagnosticKind::TypeError,
                    "cannot negate a string",
                    span,
                )),
            },
            UnaryOp::Not => match operand {
                AxType::Scalar(_) => Ok(types::BOOL),
                _ => Err(self.error(
                    DiagnosticKind::TypeError,
                    format!("'!' needs a scalar, found {}", operand),
                    span,
                )),
            },
            UnaryOp::BitNot => match operand.scalar() {
                Some(Scalar::Bool) => Ok(types::INT32),
                Some(s) if s.is_integer() => Ok(operand),
                _ => Err(self.error(
                    DiagnosticKind::BinaryOperationError,
                    format!("'~' needs an integer, found {}", operand),
                    span,
                )),
            },
        }
    }

    fn binary_result(
        &mut self,
        op: BinOp,
        lhs: AxType,
        rhs: AxType,
        span: Span,
    ) -> Result<AxType, Diagnostic> {
        if lhs == types::STRING || rhs == types::STRING {
            return Err(self.error(
                DiagnosticKind::TypeError,
                format!("operator '{}' cannot apply to strings", op.symbol()),
                span,
            ));
        }

        if op.is_logical() {
            if !lhs.is_scalar() || !rhs.is_scalar() {
                return Err(self.error(
                    DiagnosticKind::BinaryOperationError,
                    format!("'{}' needs scalar operands", op.symbol()),
                    span,
                ));
            }
            return Ok(types::BOOL);
        }

        if op.is_comparison() {
            let same_shape = AxType::promote(lhs, rhs).is_some();
            let ordered = matches!(op, BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge);
            if ordered && !(lhs.is_scalar() && rhs.is_scalar()) {
                return Err(self.error(
                    DiagnosticKind::BinaryOperationError,
                    format!("'{}' needs scalar operands", op.symbol()),
                    span,
                ));
            }
            if !same_shape {
                return Err(self.error(
                    DiagnosticKind::TypeError,
                    format!("cannot compare {} with {}", lhs, rhs),
                    span,
                ));
            }
            return Ok(types::BOOL);
        }

        if op.is_bitwise() {
            let (ls, rs) = match (lhs.scalar(), rhs.scalar()) {
                (Some(l), Some(r)) => (l, r),
                _ => {
                    return Err(self.error(
                        DiagnosticKind::BinaryOperationError,
                        format!("'{}' needs scalar operands", op.symbol()),
                        span,
                    ));
                }
            };
            if ls.is_float() || rs.is_float() {
                // Floats have no bit operations; both operands convert
                // to long first.
                self.warn(
                    DiagnosticKind::BitwiseFloatWarning,
                    format!(
                        "'{}' on floating-point operands implicitly casts both to long",
                        op.symbol()
                    ),
                    span,
                );
                return Ok(types::INT64);
            }
            return Ok(AxType::Scalar(Scalar::precedence(ls, rs)));
        }

        // Arithmetic.
        if op == BinOp::Mod {
            let float_elem = [lhs, rhs].iter().any(|t| {
                t.scalar().map(Scalar::is_float).unwrap_or(false)
                    || t.array_parts().map(|(e, _)| e.is_float()).unwrap_or(false)
            });
            if float_elem {
                return Err(self.error(
                    DiagnosticKind::BinaryOperationError,
                    "'%' requires integer operands",
                    span,
                ));
            }
        }

        // Matrices stay single-precision; the other operand must be a
        // matrix or a scalar.
        if lhs == AxType::Mat4 || rhs == AxType::Mat4 {
            let other = if lhs == AxType::Mat4 { rhs } else { lhs };
            if other == AxType::Mat4 || other.is_scalar() {
                return Ok(AxType::Mat4);
            }
            return Err(self.error(
                DiagnosticKind::TypeError,
                format!("cannot combine mat4f with {}", other),
                span,
            ));
        }

        match AxType::promote(lhs, rhs) {
            Some(ty) => Ok(ty),
            None => Err(self.error(
                DiagnosticKind::TypeError,
                format!(
                    "operands of '{}' have incompatible types {} and {}",
                    op.symbol(),
                    lhs,
                    rhs
                ),
                span,
            )),
        }
    }

    fn resolve_call(
        &mut self,
        id: ExprId,
        name: &str,
        args: &[ExprId],
        span: Span,
    ) -> Result<Option<AxType>, Diagnostic> {
        let mut arg_types = Vec::with_capacity(args.len());
        for &arg in args {
            arg_types.push(self.resolve_value_expr(arg)?);
        }

        let index = match self.registry.select(name, &arg_types, self.target) {
            Ok(index) => index,
            Err(SelectError::UnknownFunction) => {
                return Err(self.error(
                    DiagnosticKind::FunctionLookupError,
                    format!("unknown function '{}'", name),
                    span,
                ));
            }
            Err(SelectError::NoMatch) => {
                let types: Vec<String> = arg_types.iter().map(|t| t.to_string()).collect();
                return Err(self.error(
                    DiagnosticKind::FunctionLookupError,
                    format!("no overload of '{}' accepts ({})", name, types.join(", ")),
                    span,
                ));
            }
            Err(SelectError::Ambiguous(a, b)) => {
                return Err(self.error(
                    DiagnosticKind::AmbiguousOverloadError,
                    format!(
                        "call to '{}' is ambiguous between overloads {} and {}",
                        name, a, b
                    ),
                    span,
                ));
            }
        };
        self.call_overloads.insert(id.0, index);

        let group = self.registry.group(name).expect("selected group exists");
        let signature = &group.signatures[index];

        // String-typed parameters are compile-time literals: group names
        // and custom-data keys.
        if let FnImpl::Inline(op) = signature.implementation {
            match op {
                InlineOp::InGroup | InlineOp::AddToGroup | InlineOp::RemoveFromGroup => {
                    let group_name = self.literal_string_arg(args[0], "group name")?;
                    let write = op != InlineOp::InGroup;
                    match self.groups.iter_mut().find(|g| g.name == group_name) {
                        Some(existing) => existing.write |= write,
                        None => self.groups.push(GroupUse {
                            name: group_name,
                            write,
                        }),
                    }
                }
                InlineOp::Lookupf => {
                    let key = self.literal_string_arg(args[0], "custom-data key")?;
                    if !self.options.custom_keys.iter().any(|k| *k == key) {
                        self.warn(
                            DiagnosticKind::CustomDataWarning,
                            format!("custom-data key '{}' is not bound; reads as 0", key),
                            span,
                        );
                    }
                }
                _ => {}
            }
        }

        Ok(signature.ret)
    }

    fn literal_string_arg(&self, arg: ExprId, what: &str) -> Result<String, Diagnostic> {
        match self.ast.expr(arg) {
            Expr::Literal(Literal::Str(s)) => Ok(s.clone()),
            _ => Err(self.error(
                DiagnosticKind::TypeError,
                format!("{} must be a string literal", what),
                self.ast.expr_span(arg),
            )),
        }
    }

    /// Validate an implicit conversion for assignment or initialisation.
    fn check_assignable(
        &mut self,
        from: AxType,
        to: AxType,
        span: Span,
    ) -> Result<(), Diagnostic> {
        if from == to {
            return Ok(());
        }
        let pair = match (from, to) {
            (AxType::Scalar(f), AxType::Scalar(t)) => Some((f, t)),
            _ => match (from.array_parts(), to.array_parts()) {
                (Some((fe, fl)), Some((te, tl))) if fl == tl => Some((fe, te)),
                _ => None,
            },
        };
        let Some((f, t)) = pair else {
            return Err(self.error(
                DiagnosticKind::TypeError,
                format!("cannot assign {} to {}", from, to),
                span,
            ));
        };

        if f.is_float() && t.is_integer() {
            if !self.options.allow_implicit_float_to_int {
                return Err(self.error(
                    DiagnosticKind::TypeError,
                    format!(
                        "implicit {} to {} conversion loses the fraction; use an explicit cast",
                        f, t
                    ),
                    span,
                ));
            }
            self.warn(
                DiagnosticKind::NarrowingWarning,
                format!("implicit conversion from {} to {} truncates", f, t),
                span,
            );
        } else if t.rank() < f.rank() {
            self.warn(
                DiagnosticKind::NarrowingWarning,
                format!("implicit conversion from {} to {} may lose precision", f, t),
                span,
            );
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use crate::types::{BOOL, FLOAT, INT32, VEC3F};

    fn run(source: &str) -> Result<(Ast, Resolution), Diagnostic> {
        run_with(source, Target::Volume, ResolveOptions::default())
    }

    fn run_with(
        source: &str,
        target: Target,
        options: ResolveOptions,
    ) -> Result<(Ast, Resolution), Diagnostic> {
        let ast = parse(source)?;
        let registry = FunctionRegistry::with_builtins();
        let resolution = resolve(&ast, &registry, target, &options, source)?;
        Ok((ast, resolution))
    }

    fn root_expr_type(ast: &Ast, resolution: &Resolution, stmt_index: usize) -> AxType {
        match ast.stmt(ast.root()[stmt_index]) {
            Stmt::Assign { value, .. } => resolution.types.expect(*value),
            Stmt::Expr(e) => resolution.types.expect(*e),
            Stmt::Declare { init, .. } => resolution.types.expect(init.unwrap()),
            _ => panic!("statement has no top expression"),
        }
    }

    #[test]
    fn test_mixed_attribute_promotion() {
        // f32 + i64 promotes to f32 under the precedence order.
        let (ast, resolution) = run("float x = f@a + l@b; @out = x;").unwrap();
        assert_eq!(root_expr_type(&ast, &resolution, 0), FLOAT);
    }

    #[test]
    fn test_resolution_is_idempotent() {
        let source = "int i = 0; for (; i < 8; ++i) { @d += float(i) * 0.5f; }";
        let ast = parse(source).unwrap();
        let registry = FunctionRegistry::with_builtins();
        let options = ResolveOptions::default();
        let first = resolve(&ast, &registry, Target::Volume, &options, source).unwrap();
        let second = resolve(&ast, &registry, Target::Volume, &options, source).unwrap();
        assert_eq!(first.types, second.types);
        assert_eq!(first.attributes, second.attributes);
    }

    #[test]
    fn test_attribute_registry_order_and_access() {
        let (_, resolution) =
            run("@b = @a; i@c = 1;").unwrap();
        let names: Vec<&str> = resolution
            .attributes
            .attrs()
            .iter()
            .map(|a| a.name.as_str())
            .collect();
        assert_eq!(names, vec!["b", "a", "c"]);
        assert_eq!(resolution.attributes.attrs()[0].access, Access::Write);
        assert_eq!(resolution.attributes.attrs()[1].access, Access::Read);
        let compound = run("@a += 1.0f;").unwrap().1;
        assert_eq!(compound.attributes.attrs()[0].access, Access::ReadWrite);
    }

    #[test]
    fn test_attribute_type_conflict() {
        let err = run("@a = 1.0f; i@a = 2;").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TypeError);
        assert!(err.message.contains("conflicting") || err.message.contains("previously"));
    }

    #[test]
    fn test_comparison_yields_bool() {
        let (ast, resolution) = run("bool b = @d > 5.0f; @out = float(b);").unwrap();
        assert_eq!(root_expr_type(&ast, &resolution, 0), BOOL);
    }

    #[test]
    fn test_pack_takes_common_element_type() {
        let (ast, resolution) = run("v@P += {0, 1.0f, 0};").unwrap();
        match ast.stmt(ast.root()[0]) {
            Stmt::Assign { value, .. } => {
                assert_eq!(resolution.types.expect(*value), VEC3F);
            }
            _ => unreachable!(),
        }
    }

    #[test]
    fn test_float_to_int_requires_cast() {
        let err = run("i@count = 1.5f;").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TypeError);
        // With the option enabled it downgrades to a warning.
        let options = ResolveOptions {
            allow_implicit_float_to_int: true,
            ..Default::default()
        };
        let (_, resolution) = run_with("i@count = 1.5f;", Target::Volume, options).unwrap();
        assert!(resolution
            .warnings
            .iter()
            .any(|w| w.kind == DiagnosticKind::NarrowingWarning));
    }

    #[test]
    fn test_narrowing_warning_on_int_demotion() {
        let (_, resolution) = run("i@a = 1l;").unwrap();
        assert!(resolution
            .warnings
            .iter()
            .any(|w| w.kind == DiagnosticKind::NarrowingWarning));
    }

    #[test]
    fn test_bitwise_on_float_warns_and_widens() {
        let (ast, resolution) = run("l@bits = f@a & 3;").unwrap();
        assert!(resolution
            .warnings
            .iter()
            .any(|w| w.kind == DiagnosticKind::BitwiseFloatWarning));
        assert_eq!(root_expr_type(&ast, &resolution, 0), crate::types::INT64);
    }

    #[test]
    fn test_modulo_rejects_floats() {
        let err = run("@a = @a % 2.0f;").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::BinaryOperationError);
    }

    #[test]
    fn test_undeclared_variable() {
        let err = run("@a = x;").unwrap_err();
        assert!(err.message.contains("undeclared"));
    }

    #[test]
    fn test_component_bounds_checked() {
        let err = run("v@P = {1.0f, 2.0f, 3.0f}; float w = v@P[3]; @o = w;").unwrap_err();
        assert!(err.message.contains("out of bounds"));
    }

    #[test]
    fn test_dead_code_and_unused_warnings() {
        let (_, resolution) = run("{ float unused = 1.0f; return; @a = 1.0f; }").unwrap();
        assert!(resolution
            .warnings
            .iter()
            .any(|w| w.kind == DiagnosticKind::DeadCodeWarning));
        assert!(resolution
            .warnings
            .iter()
            .any(|w| w.kind == DiagnosticKind::UnusedLocalWarning));
    }

    #[test]
    fn test_break_outside_loop() {
        assert!(run("break;").is_err());
    }

    #[test]
    fn test_group_functions_point_only() {
        let err = run(r#"if (ingroup("wet")) @a = 1.0f;"#).unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::FunctionLookupError);

        let (_, resolution) = run_with(
            r#"if (ingroup("wet")) { addtogroup("seen"); }"#,
            Target::Point,
            ResolveOptions::default(),
        )
        .unwrap();
        assert_eq!(
            resolution.groups,
            vec![
                GroupUse {
                    name: "wet".to_string(),
                    write: false
                },
                GroupUse {
                    name: "seen".to_string(),
                    write: true
                },
            ]
        );
    }

    #[test]
    fn test_string_locals_rejected() {
        let err = run_with(
            "string s; addtogroup(s);",
            Target::Point,
            ResolveOptions::default(),
        )
        .unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::TypeError);
        assert!(err.message.contains("string locals"));
    }

    #[test]
    fn test_lookupf_unknown_key_warns() {
        let (_, resolution) = run(r#"@a = lookupf("gain");"#).unwrap();
        assert!(resolution
            .warnings
            .iter()
            .any(|w| w.kind == DiagnosticKind::CustomDataWarning));

        let options = ResolveOptions {
            custom_keys: vec!["gain".to_string()],
            ..Default::default()
        };
        let (_, resolution) =
            run_with(r#"@a = lookupf("gain");"#, Target::Volume, options).unwrap();
        assert!(resolution.warnings.is_empty());
    }

    #[test]
    fn test_string_attribute_reserved() {
        let err = run(r#"s@name = "x";"#).unwrap_err();
        assert!(err.message.contains("reserved"));
    }

    #[test]
    fn test_crement_needs_numeric_lvalue() {
        assert!(run("i@c = 0; i@c++;").is_ok());
        assert!(run("++5;").is_err());
        let err = run("bool b; ++b; @o = float(b);").unwrap_err();
        assert!(err.message.contains("numeric"));
    }
}
