//! Abstract syntax tree for Vexel kernels.
//!
//! Nodes live in `Vec`-backed arenas owned by the [`Ast`]; child links
//! are plain index ids. Expression ids double as keys into the side
//! tables later passes build (resolved types, selected overloads), so
//! the arena is append-only and ids are stable for the life of the
//! compilation unit.

use crate::error::Span;
use crate::types::AxType;

/// Index of an expression node in [`Ast::exprs`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ExprId(pub u32);

/// Index of a statement node in [`Ast::stmts`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StmtId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// `-`
    Neg,
    /// `!`
    Not,
    /// `~`
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Shl,
    Shr,
    BitAnd,
    BitOr,
    BitXor,
    And,
    Or,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
}

impl BinOp {
    pub fn is_arithmetic(self) -> bool {
        matches!(
            self,
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div | BinOp::Mod
        )
    }

    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge
        )
    }

    pub fn is_logical(self) -> bool {
        matches!(self, BinOp::And | BinOp::Or)
    }

    pub fn is_bitwise(self) -> bool {
        matches!(
            self,
            BinOp::Shl | BinOp::Shr | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor
        )
    }

    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::And => "&&",
            BinOp::Or => "||",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Gt => ">",
            BinOp::Le => "<=",
            BinOp::Ge => ">=",
        }
    }
}

/// Compound assignment operators rewrite to `lhs = lhs op rhs` during
/// lowering, with a single evaluation of the target address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssignOp {
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
}

impl AssignOp {
    /// The underlying binary operator of a compound assignment.
    pub fn binary_op(self) -> Option<BinOp> {
        match self {
            AssignOp::Assign => None,
            AssignOp::AddAssign => Some(BinOp::Add),
            AssignOp::SubAssign => Some(BinOp::Sub),
            AssignOp::MulAssign => Some(BinOp::Mul),
            AssignOp::DivAssign => Some(BinOp::Div),
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            AssignOp::Assign => "=",
            AssignOp::AddAssign => "+=",
            AssignOp::SubAssign => "-=",
            AssignOp::MulAssign => "*=",
            AssignOp::DivAssign => "/=",
        }
    }
}

/// A literal with its lexical type already decided by the lexer.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Int16(i16),
    Int32(i32),
    Int64(i64),
    Float(f32),
    Double(f64),
    Str(String),
}

impl Literal {
    pub fn ax_type(&self) -> AxType {
        match self {
            Literal::Bool(_) => crate::types::BOOL,
            Literal::Int16(_) => crate::types::INT16,
            Literal::Int32(_) => crate::types::INT32,
            Literal::Int64(_) => crate::types::INT64,
            Literal::Float(_) => crate::types::FLOAT,
            Literal::Double(_) => crate::types::DOUBLE,
            Literal::Str(_) => crate::types::STRING,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrementKind {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopKind {
    While,
    DoWhile,
    For,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Keyword {
    Return,
    Break,
    Continue,
}

/// Expression node payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// A reference to a declared local.
    Local(String),
    /// An `@name` attribute reference. `ty` comes from the prefix token,
    /// or defaults to `float` for a bare `@`; `explicit` records whether
    /// a prefix was written, for conflict reporting.
    Attribute {
        name: String,
        ty: AxType,
        explicit: bool,
    },
    Cast {
        target: AxType,
        value: ExprId,
    },
    Unary {
        op: UnaryOp,
        value: ExprId,
    },
    Binary {
        op: BinOp,
        lhs: ExprId,
        rhs: ExprId,
    },
    /// `++`/`--`, prefix or postfix.
    Crement {
        kind: CrementKind,
        post: bool,
        target: ExprId,
    },
    Call {
        name: String,
        args: Vec<ExprId>,
    },
    /// `{a, b, c}` — three or four components.
    Pack(Vec<ExprId>),
    /// Component access: `v.x`, `v[2]`. The index is a literal, so
    /// bounds are checked during type resolution.
    Unpack {
        value: ExprId,
        index: u8,
    },
}

/// Statement node payloads.
#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    Block(Vec<StmtId>),
    Declare {
        ty: AxType,
        name: String,
        init: Option<ExprId>,
    },
    Assign {
        op: AssignOp,
        target: ExprId,
        value: ExprId,
    },
    /// An expression evaluated for its effect (a call or crement).
    Expr(ExprId),
    If {
        cond: ExprId,
        then_body: StmtId,
        else_body: Option<StmtId>,
    },
    Loop {
        kind: LoopKind,
        init: Option<StmtId>,
        cond: ExprId,
        step: Option<StmtId>,
        body: StmtId,
    },
    Keyword(Keyword),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExprNode {
    pub expr: Expr,
    pub span: Span,
}

#[derive(Debug, Clone, PartialEq)]
pub struct StmtNode {
    pub stmt: Stmt,
    pub span: Span,
}

/// The arena-backed tree for one kernel.
#[derive(Debug, Clone, Default)]
pub struct Ast {
    exprs: Vec<ExprNode>,
    stmts: Vec<StmtNode>,
    /// Top-level statements, in source order.
    root: Vec<StmtId>,
}

impl Ast {
    pub fn new() -> Self {
        Ast::default()
    }

    pub fn push_expr(&mut self, expr: Expr, span: Span) -> ExprId {
        self.exprs.push(ExprNode { expr, span });
        ExprId(self.exprs.len() as u32 - 1)
    }

    pub fn push_stmt(&mut self, stmt: Stmt, span: Span) -> StmtId {
        self.stmts.push(StmtNode { stmt, span });
        StmtId(self.stmts.len() as u32 - 1)
    }

    pub fn set_root(&mut self, root: Vec<StmtId>) {
        self.root = root;
    }

    pub fn expr(&self, id: ExprId) -> &Expr {
        &self.exprs[id.0 as usize].expr
    }

    pub fn expr_span(&self, id: ExprId) -> Span {
        self.exprs[id.0 as usize].span
    }

    pub fn stmt(&self, id: StmtId) -> &Stmt {
        &self.stmts[id.0 as usize].stmt
    }

    pub fn stmt_span(&self, id: StmtId) -> Span {
        self.stmts[id.0 as usize].span
    }

    pub fn root(&self) -> &[StmtId] {
        &self.root
    }

    pub fn expr_count(&self) -> usize {
        self.exprs.len()
    }
}

/// Generic read-only visitor. Override the variants you care about; the
/// default methods recurse through the `walk_*` functions, so unhandled
/// variants fall through to their children.
pub trait Visitor {
    fn visit_expr(&mut self, ast: &Ast, id: ExprId) {
        walk_expr(self, ast, id);
    }

    fn visit_stmt(&mut self, ast: &Ast, id: StmtId) {
        walk_stmt(self, ast, id);
    }
}

/// Recurse into an expression's children.
pub fn walk_expr<V: Visitor + ?Sized>(v: &mut V, ast: &Ast, id: ExprId) {
    match ast.expr(id) {
        Expr::Literal(_) | Expr::Local(_) | Expr::Attribute { .. } => {}
        Expr::Cast { value, .. } | Expr::Unary { value, .. } | Expr::Unpack { value, .. } => {
            v.visit_expr(ast, *value);
        }
        Expr::Binary { lhs, rhs, .. } => {
            v.visit_expr(ast, *lhs);
            v.visit_expr(ast, *rhs);
        }
        Expr::Crement { target, .. } => v.visit_expr(ast, *target),
        Expr::Call { args, .. } => {
            for &arg in args {
                v.visit_expr(ast, arg);
            }
        }
        Expr::Pack(items) => {
            for &item in items {
                v.visit_expr(ast, item);
            }
        }
    }
}

/// Recurse into a statement's children.
pub fn walk_stmt<V: Visitor + ?Sized>(v: &mut V, ast: &Ast, id: StmtId) {
    match ast.stmt(id) {
        Stmt::Block(body) => {
            for &s in body {
                v.visit_stmt(ast, s);
            }
        }
        Stmt::Declare { init, .. } => {
            if let Some(init) = init {
                v.visit_expr(ast, *init);
            }
        }
        Stmt::Assign { target, value, .. } => {
            v.visit_expr(ast, *target);
            v.visit_expr(ast, *value);
        }
        Stmt::Expr(e) => v.visit_expr(ast, *e),
        Stmt::If {
            cond,
            then_body,
            else_body,
        } => {
            v.visit_expr(ast, *cond);
            v.visit_stmt(ast, *then_body);
            if let Some(else_body) = else_body {
                v.visit_stmt(ast, *else_body);
            }
        }
        Stmt::Loop {
            init,
            cond,
            step,
            body,
            ..
        } => {
            if let Some(init) = init {
                v.visit_stmt(ast, *init);
            }
            v.visit_expr(ast, *cond);
            if let Some(step) = step {
                v.visit_stmt(ast, *step);
            }
            v.visit_stmt(ast, *body);
        }
        Stmt::Keyword(_) => {}
    }
}

/// Canonical parenthesised dump of the tree, used by parser tests.
pub fn dump(ast: &Ast) -> String {
    let mut printer = Printer {
        out: String::new(),
    };
    for &s in ast.root() {
        printer.visit_stmt(ast, s);
        printer.out.push('\n');
    }
    printer.out
}

struct Printer {
    out: String,
}

impl Printer {
    fn expr_string(&mut self, ast: &Ast, id: ExprId) -> String {
        match ast.expr(id) {
            Expr::Literal(lit) => match lit {
                Literal::Bool(b) => format!("(bool {})", b),
                Literal::Int16(v) => format!("(short {})", v),
                Literal::Int32(v) => format!("(int {})", v),
                Literal::Int64(v) => format!("(long {})", v),
                Literal::Float(v) => format!("(float {})", v),
                Literal::Double(v) => format!("(double {})", v),
                Literal::Str(s) => format!("(string {:?})", s),
            },
            Expr::Local(name) => format!("(local {})", name),
            Expr::Attribute { name, ty, .. } => format!("(attribute {} {})", ty, name),
            Expr::Cast { target, value } => {
                format!("(cast {} {})", target, self.expr_string(ast, *value))
            }
            Expr::Unary { op, value } => {
                let sym = match op {
                    UnaryOp::Neg => "-",
                    UnaryOp::Not => "!",
                    UnaryOp::BitNot => "~",
                };
                format!("(unary {} {})", sym, self.expr_string(ast, *value))
            }
            Expr::Binary { op, lhs, rhs } => format!(
                "(binary {} {} {})",
                op.symbol(),
                self.expr_string(ast, *lhs),
                self.expr_string(ast, *rhs)
            ),
            Expr::Crement { kind, post, target } => {
                let sym = match kind {
                    CrementKind::Increment => "++",
                    CrementKind::Decrement => "--",
                };
                let position = if *post { "post" } else { "pre" };
                format!(
                    "(crement {} {} {})",
                    sym,
                    position,
                    self.expr_string(ast, *target)
                )
            }
            Expr::Call { name, args } => {
                let mut s = format!("(call {}", name);
                for &arg in args {
                    s.push(' ');
                    s.push_str(&self.expr_string(ast, arg));
                }
                s.push(')');
                s
            }
            Expr::Pack(items) => {
                let mut s = "(pack".to_string();
                for &item in items {
                    s.push(' ');
                    s.push_str(&self.expr_string(ast, item));
                }
                s.push(')');
                s
            }
            Expr::Unpack { value, index } => {
                format!("(unpack {} {})", index, self.expr_string(ast, *value))
            }
        }
    }
}

impl Visitor for Printer {
    fn visit_stmt(&mut self, ast: &Ast, id: StmtId) {
        match ast.stmt(id) {
            Stmt::Block(body) => {
                self.out.push_str("(block");
                for &s in body {
                    self.out.push(' ');
                    self.visit_stmt(ast, s);
                }
                self.out.push(')');
            }
            Stmt::Declare { ty, name, init } => {
                self.out.push_str(&format!("(declare {} {}", ty, name));
                if let Some(init) = init {
                    let s = self.expr_string(ast, *init);
                    self.out.push(' ');
                    self.out.push_str(&s);
                }
                self.out.push(')');
            }
            Stmt::Assign { op, target, value } => {
                let t = self.expr_string(ast, *target);
                let r = self.expr_string(ast, *value);
                self.out
                    .push_str(&format!("(assign {} {} {})", op.symbol(), t, r));
            }
            Stmt::Expr(e) => {
                let s = self.expr_string(ast, *e);
                self.out.push_str(&s);
            }
            Stmt::If {
                cond,
                then_body,
                else_body,
            } => {
                let c = self.expr_string(ast, *cond);
                self.out.push_str(&format!("(if {} ", c));
                self.visit_stmt(ast, *then_body);
                if let Some(else_body) = else_body {
                    self.out.push(' ');
                    self.visit_stmt(ast, *else_body);
                }
                self.out.push(')');
            }
            Stmt::Loop {
                kind,
                init,
                cond,
                step,
                body,
            } => {
                let name = match kind {
                    LoopKind::While => "while",
                    LoopKind::DoWhile => "do-while",
                    LoopKind::For => "for",
                };
                self.out.push_str(&format!("({}", name));
                if let Some(init) = init {
                    self.out.push(' ');
                    self.visit_stmt(ast, *init);
                }
                let c = self.expr_string(ast, *cond);
                self.out.push(' ');
                self.out.push_str(&c);
                if let Some(step) = step {
                    self.out.push(' ');
                    self.visit_stmt(ast, *step);
                }
                self.out.push(' ');
                self.visit_stmt(ast, *body);
                self.out.push(')');
            }
            Stmt::Keyword(kw) => {
                let name = match kw {
                    Keyword::Return => "return",
                    Keyword::Break => "break",
                    Keyword::Continue => "continue",
                };
                self.out.push_str(&format!("({})", name));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{FLOAT, INT32};

    fn span() -> Span {
        Span::new(1, 1)
    }

    #[test]
    fn test_arena_ids_are_stable() {
        let mut ast = Ast::new();
        let a = ast.push_expr(Expr::Literal(Literal::Int32(1)), span());
        let b = ast.push_expr(Expr::Literal(Literal::Int32(2)), span());
        let sum = ast.push_expr(
            Expr::Binary {
                op: BinOp::Add,
                lhs: a,
                rhs: b,
            },
            span(),
        );
        assert_eq!(a.0, 0);
        assert_eq!(b.0, 1);
        assert!(matches!(ast.expr(sum), Expr::Binary { .. }));
    }

    #[test]
    fn test_walker_reaches_all_expressions() {
        struct Counter {
            count: usize,
        }
        impl Visitor for Counter {
            fn visit_expr(&mut self, ast: &Ast, id: ExprId) {
                self.count += 1;
                walk_expr(self, ast, id);
            }
        }

        let mut ast = Ast::new();
        let one = ast.push_expr(Expr::Literal(Literal::Int32(1)), span());
        let x = ast.push_expr(Expr::Local("x".to_string()), span());
        let add = ast.push_expr(
            Expr::Binary {
                op: BinOp::Add,
                lhs: one,
                rhs: x,
            },
            span(),
        );
        let decl = ast.push_stmt(
            Stmt::Declare {
                ty: INT32,
                name: "y".to_string(),
                init: Some(add),
            },
            span(),
        );
        ast.set_root(vec![decl]);

        let mut counter = Counter { count: 0 };
        counter.visit_stmt(&ast, decl);
        assert_eq!(counter.count, 3);
    }

    #[test]
    fn test_dump_shape() {
        let mut ast = Ast::new();
        let attr = ast.push_expr(
            Expr::Attribute {
                name: "density".to_string(),
                ty: FLOAT,
                explicit: false,
            },
            span(),
        );
        let two = ast.push_expr(Expr::Literal(Literal::Float(2.0)), span());
        let mul = ast.push_expr(
            Expr::Binary {
                op: BinOp::Mul,
                lhs: attr,
                rhs: two,
            },
            span(),
        );
        let target = ast.push_expr(
            Expr::Attribute {
                name: "density".to_string(),
                ty: FLOAT,
                explicit: false,
            },
            span(),
        );
        let assign = ast.push_stmt(
            Stmt::Assign {
                op: AssignOp::Assign,
                target,
                value: mul,
            },
            span(),
        );
        ast.set_root(vec![assign]);
        assert_eq!(
            dump(&ast),
            "(assign = (attribute float density) (binary * (attribute float density) (float 2)))\n"
        );
    }
}
