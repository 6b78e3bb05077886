//! Lexer and recursive-descent parser for Vexel source.
//!
//! The grammar is a small C expression language: statements are blocks,
//! declarations, assignments, `if`/`while`/`do`/`for`, and the
//! `return`/`break`/`continue` keywords; expressions use the usual C
//! precedence ladder. Attribute references are `@name` with an optional
//! type prefix (`i@count`, `v@P`, `float@density`).
//!
//! Parsing stops at the first error and reports it as a
//! [`Diagnostic`] with the offending line.

use crate::ast::{
    AssignOp, Ast, BinOp, CrementKind, Expr, ExprId, Keyword, Literal, LoopKind, Stmt, StmtId,
    UnaryOp,
};
use crate::error::{Diagnostic, DiagnosticKind, Span};
use crate::types::{self, AxType, Scalar};

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Int(i64, IntWidth),
    Float(f64, bool),
    Str(String),
    At,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Dot,
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Amp,
    Pipe,
    Caret,
    Tilde,
    Bang,
    AmpAmp,
    PipePipe,
    PlusPlus,
    MinusMinus,
    Assign,
    PlusEq,
    MinusEq,
    StarEq,
    SlashEq,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,
    Shl,
    Shr,
    Eof,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IntWidth {
    Short,
    Int,
    Long,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    span: Span,
}

/// Map a type keyword to its type, if the identifier is one.
fn type_keyword(name: &str) -> Option<AxType> {
    let ty = match name {
        "bool" => types::BOOL,
        "short" => types::INT16,
        "int" => types::INT32,
        "long" => types::INT64,
        "float" => types::FLOAT,
        "double" => types::DOUBLE,
        "vec3f" => types::VEC3F,
        "vec3i" => AxType::Vec {
            elem: Scalar::Int32,
            len: 3,
        },
        "vec3d" => AxType::Vec {
            elem: Scalar::Double,
            len: 3,
        },
        "vec4f" => AxType::Vec {
            elem: Scalar::Float,
            len: 4,
        },
        "mat4f" => types::MAT4F,
        "string" => types::STRING,
        _ => return None,
    };
    Some(ty)
}

/// Map an attribute prefix (the part before `@`) to a type. Both the
/// short forms and the full type keywords are accepted.
fn attribute_prefix(name: &str) -> Option<AxType> {
    let ty = match name {
        "b" => types::BOOL,
        "i" => types::INT32,
        "l" => types::INT64,
        "f" => types::FLOAT,
        "d" => types::DOUBLE,
        "v" => types::VEC3F,
        "s" => types::STRING,
        "m4" | "mat4" => types::MAT4F,
        _ => return type_keyword(name),
    };
    Some(ty)
}

struct Lexer<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Lexer<'a> {
    fn new(source: &'a str) -> Self {
        Lexer {
            chars: source.chars().peekable(),
            line: 1,
            column: 1,
        }
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 1;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic {
            kind: DiagnosticKind::ParseError,
            message: message.into(),
            line: self.line,
            column: self.column,
            snippet: String::new(),
        }
    }

    fn tokenize(mut self, source: &str) -> Result<Vec<Token>, Diagnostic> {
        let mut tokens = Vec::new();
        loop {
            // Skip whitespace and comments.
            loop {
                match self.peek() {
                    Some(c) if c.is_whitespace() => {
                        self.bump();
                    }
                    Some('/') => {
                        let mut lookahead = self.chars.clone();
                        lookahead.next();
                        match lookahead.peek() {
                            Some('/') => {
                                while let Some(c) = self.bump() {
                                    if c == '\n' {
                                        break;
                                    }
                                }
                            }
                            Some('*') => {
                                self.bump();
                                self.bump();
                                let mut closed = false;
                                while let Some(c) = self.bump() {
                                    if c == '*' && self.peek() == Some('/') {
                                        self.bump();
                                        closed = true;
                                        break;
                                    }
                                }
                                if !closed {
                                    return Err(with_snippet(
                                        self.error("unterminated block comment"),
                                        source,
                                    ));
                                }
                            }
                            _ => break,
                        }
                    }
                    _ => break,
                }
            }

            let span = Span::new(self.line, self.column);
            let Some(c) = self.peek() else {
                tokens.push(Token {
                    tok: Tok::Eof,
                    span,
                });
                return Ok(tokens);
            };

            let tok = if c.is_ascii_digit() {
                self.number(source)?
            } else if c == '"' {
                self.string(source)?
            } else if c.is_alphabetic() || c == '_' {
                let mut ident = String::new();
                while let Some(c) = self.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        self.bump();
                    } else {
                        break;
                    }
                }
                Tok::Ident(ident)
            } else {
                self.bump();
                let next = self.peek();
                match (c, next) {
                    ('@', _) => Tok::At,
                    ('(', _) => Tok::LParen,
                    (')', _) => Tok::RParen,
                    ('{', _) => Tok::LBrace,
                    ('}', _) => Tok::RBrace,
                    ('[', _) => Tok::LBracket,
                    (']', _) => Tok::RBracket,
                    (',', _) => Tok::Comma,
                    (';', _) => Tok::Semi,
                    ('.', _) => Tok::Dot,
                    ('~', _) => Tok::Tilde,
                    ('^', _) => Tok::Caret,
                    ('%', _) => Tok::Percent,
                    ('+', Some('+')) => self.two(Tok::PlusPlus),
                    ('+', Some('=')) => self.two(Tok::PlusEq),
                    ('+', _) => Tok::Plus,
                    ('-', Some('-')) => self.two(Tok::MinusMinus),
                    ('-', Some('=')) => self.two(Tok::MinusEq),
                    ('-', _) => Tok::Minus,
                    ('*', Some('=')) => self.two(Tok::StarEq),
                    ('*', _) => Tok::Star,
                    ('/', Some('=')) => self.two(Tok::SlashEq),
                    ('/', _) => Tok::Slash,
                    ('&', Some('&')) => self.two(Tok::AmpAmp),
                    ('&', _) => Tok::Amp,
                    ('|', Some('|')) => self.two(Tok::PipePipe),
                    ('|', _) => Tok::Pipe,
                    ('=', Some('=')) => self.two(Tok::EqEq),
                    ('=', _) => Tok::Assign,
                    ('!', Some('=')) => self.two(Tok::NotEq),
                    ('!', _) => Tok::Bang,
                    ('<', Some('<')) => self.two(Tok::Shl),
                    ('<', Some('=')) => self.two(Tok::Le),
                    ('<', _) => Tok::Lt,
                    ('>', Some('>')) => self.two(Tok::Shr),
                    ('>', Some('=')) => self.two(Tok::Ge),
                    ('>', _) => Tok::Gt,
                    _ => {
                        return Err(with_snippet(
                            Diagnostic {
                                kind: DiagnosticKind::ParseError,
                                message: format!("unexpected character '{}'", c),
                                line: span.line,
                                column: span.column,
                                snippet: String::new(),
                            },
                            source,
                        ));
                    }
                }
            };
            tokens.push(Token { tok, span });
        }
    }

    fn two(&mut self, tok: Tok) -> Tok {
        self.bump();
        tok
    }

    fn number(&mut self, source: &str) -> Result<Tok, Diagnostic> {
        let mut text = String::new();
        let mut is_float = false;
        while let Some(c) = self.peek() {
            if c.is_ascii_digit() {
                text.push(c);
                self.bump();
            } else if c == '.' {
                // A digit must follow; `1.x` is component access on `1`.
                let mut lookahead = self.chars.clone();
                lookahead.next();
                match lookahead.peek() {
                    Some(d) if d.is_ascii_digit() => {
                        is_float = true;
                        text.push(c);
                        self.bump();
                    }
                    _ => break,
                }
            } else if c == 'e' || c == 'E' {
                let mut lookahead = self.chars.clone();
                lookahead.next();
                let mut exp_ok = matches!(lookahead.peek(), Some(d) if d.is_ascii_digit());
                if matches!(lookahead.peek(), Some('+') | Some('-')) {
                    lookahead.next();
                    exp_ok = matches!(lookahead.peek(), Some(d) if d.is_ascii_digit());
                }
                if !exp_ok {
                    break;
                }
                is_float = true;
                text.push(c);
                self.bump();
                if matches!(self.peek(), Some('+') | Some('-')) {
                    text.push(self.bump().unwrap());
                }
            } else {
                break;
            }
        }

        if is_float {
            let single = self.peek() == Some('f');
            if single {
                self.bump();
            }
            let value: f64 = text
                .parse()
                .map_err(|_| with_snippet(self.error("malformed float literal"), source))?;
            return Ok(Tok::Float(value, single));
        }

        let width = match self.peek() {
            Some('f') => {
                self.bump();
                let value: f64 = text
                    .parse()
                    .map_err(|_| with_snippet(self.error("malformed float literal"), source))?;
                return Ok(Tok::Float(value, true));
            }
            Some('s') => {
                self.bump();
                IntWidth::Short
            }
            Some('l') => {
                self.bump();
                IntWidth::Long
            }
            _ => IntWidth::Int,
        };
        let value: i64 = text
            .parse()
            .map_err(|_| with_snippet(self.error("integer literal out of range"), source))?;
        Ok(Tok::Int(value, width))
    }

    fn string(&mut self, source: &str) -> Result<Tok, Diagnostic> {
        self.bump(); // opening quote
        let mut text = String::new();
        loop {
            match self.bump() {
                None | Some('\n') => {
                    return Err(with_snippet(
                        self.error("unterminated string literal"),
                        source,
                    ));
                }
                Some('"') => return Ok(Tok::Str(text)),
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some('\\') => text.push('\\'),
                    Some('"') => text.push('"'),
                    _ => {
                        return Err(with_snippet(
                            self.error("unknown escape in string literal"),
                            source,
                        ));
                    }
                },
                Some(c) => text.push(c),
            }
        }
    }
}

fn with_snippet(mut d: Diagnostic, source: &str) -> Diagnostic {
    d.snippet = source
        .lines()
        .nth(d.line.saturating_sub(1) as usize)
        .unwrap_or("")
        .to_string();
    d
}

/// Parse a kernel body into its AST.
pub fn parse(source: &str) -> Result<Ast, Diagnostic> {
    let tokens = Lexer::new(source).tokenize(source)?;
    let mut parser = Parser {
        tokens,
        pos: 0,
        source,
        ast: Ast::new(),
    };
    let mut root = Vec::new();
    while parser.peek() != &Tok::Eof {
        root.push(parser.statement()?);
    }
    parser.ast.set_root(root);
    Ok(parser.ast)
}

struct Parser<'a> {
    tokens: Vec<Token>,
    pos: usize,
    source: &'a str,
    ast: Ast,
}

impl Parser<'_> {
    fn peek(&self) -> &Tok {
        &self.tokens[self.pos].tok
    }

    fn peek_ahead(&self, n: usize) -> &Tok {
        let i = (self.pos + n).min(self.tokens.len() - 1);
        &self.tokens[i].tok
    }

    fn span(&self) -> Span {
        self.tokens[self.pos].span
    }

    fn advance(&mut self) -> Tok {
        let t = self.tokens[self.pos].tok.clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        t
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == tok {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: Tok, what: &str) -> Result<(), Diagnostic> {
        if self.peek() == &tok {
            self.advance();
            Ok(())
        } else {
            Err(self.error(format!("expected {}", what)))
        }
    }

    fn error(&self, message: impl Into<String>) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::ParseError,
            message,
            self.span(),
            self.source,
        )
    }

    fn ident_is(&self, name: &str) -> bool {
        matches!(self.peek(), Tok::Ident(s) if s == name)
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn statement(&mut self) -> Result<StmtId, Diagnostic> {
        let span = self.span();
        if self.peek() == &Tok::LBrace {
            return self.block();
        }
        if let Tok::Ident(name) = self.peek() {
            match name.as_str() {
                "if" => return self.if_statement(),
                "while" => return self.while_statement(),
                "do" => return self.do_while_statement(),
                "for" => return self.for_statement(),
                "return" => return self.keyword_statement(Keyword::Return),
                "break" => return self.keyword_statement(Keyword::Break),
                "continue" => return self.keyword_statement(Keyword::Continue),
                _ => {
                    // A type keyword followed by an identifier opens a
                    // declaration; otherwise (cast, typed attribute) it
                    // is an expression.
                    if type_keyword(name).is_some()
                        && matches!(self.peek_ahead(1), Tok::Ident(next) if type_keyword(next).is_none())
                    {
                        let stmt = self.declaration()?;
                        self.expect(Tok::Semi, "';' after declaration")?;
                        return Ok(stmt);
                    }
                }
            }
        }
        let stmt = self.expr_or_assign(span)?;
        self.expect(Tok::Semi, "';' after statement")?;
        Ok(stmt)
    }

    fn block(&mut self) -> Result<StmtId, Diagnostic> {
        let span = self.span();
        self.expect(Tok::LBrace, "'{'")?;
        let mut body = Vec::new();
        while self.peek() != &Tok::RBrace {
            if self.peek() == &Tok::Eof {
                return Err(self.error("unterminated block"));
            }
            body.push(self.statement()?);
        }
        self.advance();
        Ok(self.ast.push_stmt(Stmt::Block(body), span))
    }

    fn declaration(&mut self) -> Result<StmtId, Diagnostic> {
        let span = self.span();
        let Tok::Ident(type_name) = self.advance() else {
            return Err(self.error("expected type name"));
        };
        let ty = type_keyword(&type_name).expect("caller checked the type keyword");
        let Tok::Ident(name) = self.advance() else {
            return Err(self.error("expected variable name"));
        };
        let init = if self.eat(&Tok::Assign) {
            Some(self.expression()?)
        } else {
            None
        };
        Ok(self.ast.push_stmt(Stmt::Declare { ty, name, init }, span))
    }

    fn if_statement(&mut self) -> Result<StmtId, Diagnostic> {
        let span = self.span();
        self.advance(); // if
        self.expect(Tok::LParen, "'(' after 'if'")?;
        let cond = self.expression()?;
        self.expect(Tok::RParen, "')' after condition")?;
        let then_body = self.statement()?;
        let else_body = if self.ident_is("else") {
            self.advance();
            Some(self.statement()?)
        } else {
            None
        };
        Ok(self.ast.push_stmt(
            Stmt::If {
                cond,
                then_body,
                else_body,
            },
            span,
        ))
    }

    fn while_statement(&mut self) -> Result<StmtId, Diagnostic> {
        let span = self.span();
        self.advance(); // while
        self.expect(Tok::LParen, "'(' after 'while'")?;
        let cond = self.expression()?;
        self.expect(Tok::RParen, "')' after condition")?;
        let body = self.statement()?;
        Ok(self.ast.push_stmt(
            Stmt::Loop {
                kind: LoopKind::While,
                init: None,
                cond,
                step: None,
                body,
            },
            span,
        ))
    }

    fn do_while_statement(&mut self) -> Result<StmtId, Diagnostic> {
        let span = self.span();
        self.advance(); // do
        let body = self.statement()?;
        if !self.ident_is("while") {
            return Err(self.error("expected 'while' after do-loop body"));
        }
        self.advance();
        self.expect(Tok::LParen, "'(' after 'while'")?;
        let cond = self.expression()?;
        self.expect(Tok::RParen, "')' after condition")?;
        self.expect(Tok::Semi, "';' after do-while")?;
        Ok(self.ast.push_stmt(
            Stmt::Loop {
                kind: LoopKind::DoWhile,
                init: None,
                cond,
                step: None,
                body,
            },
            span,
        ))
    }

    fn for_statement(&mut self) -> Result<StmtId, Diagnostic> {
        let span = self.span();
        self.advance(); // for
        self.expect(Tok::LParen, "'(' after 'for'")?;

        let init = if self.peek() == &Tok::Semi {
            None
        } else if matches!(self.peek(), Tok::Ident(name) if type_keyword(name).is_some())
            && matches!(self.peek_ahead(1), Tok::Ident(next) if type_keyword(next).is_none())
        {
            Some(self.declaration()?)
        } else {
            let s = self.span();
            Some(self.expr_or_assign(s)?)
        };
        self.expect(Tok::Semi, "';' after for-initialiser")?;

        let cond = if self.peek() == &Tok::Semi {
            // An omitted condition is an unconditional `true`.
            self.ast
                .push_expr(Expr::Literal(Literal::Bool(true)), self.span())
        } else {
            self.expression()?
        };
        self.expect(Tok::Semi, "';' after for-condition")?;

        let step = if self.peek() == &Tok::RParen {
            None
        } else {
            let s = self.span();
            Some(self.expr_or_assign(s)?)
        };
        self.expect(Tok::RParen, "')' after for-step")?;

        let body = self.statement()?;
        Ok(self.ast.push_stmt(
            Stmt::Loop {
                kind: LoopKind::For,
                init,
                cond,
                step,
                body,
            },
            span,
        ))
    }

    fn keyword_statement(&mut self, kw: Keyword) -> Result<StmtId, Diagnostic> {
        let span = self.span();
        self.advance();
        self.expect(Tok::Semi, "';' after keyword")?;
        Ok(self.ast.push_stmt(Stmt::Keyword(kw), span))
    }

    /// An assignment or a bare expression, without the trailing `;` so
    /// for-clauses can reuse it.
    fn expr_or_assign(&mut self, span: Span) -> Result<StmtId, Diagnostic> {
        let target = self.expression()?;
        let op = match self.peek() {
            Tok::Assign => Some(AssignOp::Assign),
            Tok::PlusEq => Some(AssignOp::AddAssign),
            Tok::MinusEq => Some(AssignOp::SubAssign),
            Tok::StarEq => Some(AssignOp::MulAssign),
            Tok::SlashEq => Some(AssignOp::DivAssign),
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let value = self.expression()?;
                Ok(self.ast.push_stmt(Stmt::Assign { op, target, value }, span))
            }
            None => Ok(self.ast.push_stmt(Stmt::Expr(target), span)),
        }
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    fn expression(&mut self) -> Result<ExprId, Diagnostic> {
        self.binary_expr(0)
    }

    fn binary_op(&self) -> Option<(BinOp, u8)> {
        let entry = match self.peek() {
            Tok::PipePipe => (BinOp::Or, 1),
            Tok::AmpAmp => (BinOp::And, 2),
            Tok::Pipe => (BinOp::BitOr, 3),
            Tok::Caret => (BinOp::BitXor, 4),
            Tok::Amp => (BinOp::BitAnd, 5),
            Tok::EqEq => (BinOp::Eq, 6),
            Tok::NotEq => (BinOp::Ne, 6),
            Tok::Lt => (BinOp::Lt, 7),
            Tok::Gt => (BinOp::Gt, 7),
            Tok::Le => (BinOp::Le, 7),
            Tok::Ge => (BinOp::Ge, 7),
            Tok::Shl => (BinOp::Shl, 8),
            Tok::Shr => (BinOp::Shr, 8),
            Tok::Plus => (BinOp::Add, 9),
            Tok::Minus => (BinOp::Sub, 9),
            Tok::Star => (BinOp::Mul, 10),
            Tok::Slash => (BinOp::Div, 10),
            Tok::Percent => (BinOp::Mod, 10),
            _ => return None,
        };
        Some(entry)
    }

    fn binary_expr(&mut self, min_bp: u8) -> Result<ExprId, Diagnostic> {
        let mut lhs = self.unary_expr()?;
        while let Some((op, bp)) = self.binary_op() {
            if bp < min_bp {
                break;
            }
            let span = self.span();
            self.advance();
            let rhs = self.binary_expr(bp + 1)?;
            lhs = self.ast.push_expr(Expr::Binary { op, lhs, rhs }, span);
        }
        Ok(lhs)
    }

    fn unary_expr(&mut self) -> Result<ExprId, Diagnostic> {
        let span = self.span();
        let op = match self.peek() {
            Tok::Minus => Some(UnaryOp::Neg),
            Tok::Bang => Some(UnaryOp::Not),
            Tok::Tilde => Some(UnaryOp::BitNot),
            Tok::PlusPlus | Tok::MinusMinus => {
                let kind = if self.peek() == &Tok::PlusPlus {
                    CrementKind::Increment
                } else {
                    CrementKind::Decrement
                };
                self.advance();
                let target = self.unary_expr()?;
                return Ok(self.ast.push_expr(
                    Expr::Crement {
                        kind,
                        post: false,
                        target,
                    },
                    span,
                ));
            }
            _ => None,
        };
        match op {
            Some(op) => {
                self.advance();
                let value = self.unary_expr()?;
                Ok(self.ast.push_expr(Expr::Unary { op, value }, span))
            }
            None => self.postfix_expr(),
        }
    }

    fn postfix_expr(&mut self) -> Result<ExprId, Diagnostic> {
        let mut value = self.primary_expr()?;
        loop {
            let span = self.span();
            match self.peek() {
                Tok::PlusPlus | Tok::MinusMinus => {
                    let kind = if self.peek() == &Tok::PlusPlus {
                        CrementKind::Increment
                    } else {
                        CrementKind::Decrement
                    };
                    self.advance();
                    value = self.ast.push_expr(
                        Expr::Crement {
                            kind,
                            post: true,
                            target: value,
                        },
                        span,
                    );
                }
                Tok::Dot => {
                    self.advance();
                    let Tok::Ident(component) = self.advance() else {
                        return Err(self.error("expected component after '.'"));
                    };
                    let index = match component.as_str() {
                        "x" => 0,
                        "y" => 1,
                        "z" => 2,
                        "w" => 3,
                        _ => {
                            return Err(self.error(format!(
                                "unknown component '.{}'; expected x, y, z or w",
                                component
                            )));
                        }
                    };
                    value = self.ast.push_expr(Expr::Unpack { value, index }, span);
                }
                Tok::LBracket => {
                    self.advance();
                    let Tok::Int(index, IntWidth::Int) = self.advance() else {
                        return Err(self.error("array index must be an integer literal"));
                    };
                    if !(0..=255).contains(&index) {
                        return Err(self.error("array index out of range"));
                    }
                    self.expect(Tok::RBracket, "']' after index")?;
                    value = self.ast.push_expr(
                        Expr::Unpack {
                            value,
                            index: index as u8,
                        },
                        span,
                    );
                }
                _ => return Ok(value),
            }
        }
    }

    fn primary_expr(&mut self) -> Result<ExprId, Diagnostic> {
        let span = self.span();
        match self.peek().clone() {
            Tok::LParen => {
                self.advance();
                let e = self.expression()?;
                self.expect(Tok::RParen, "')'")?;
                Ok(e)
            }
            Tok::LBrace => self.pack_expr(),
            Tok::Int(value, width) => {
                self.advance();
                let lit = match width {
                    IntWidth::Short => Literal::Int16(value as i16),
                    IntWidth::Long => Literal::Int64(value),
                    IntWidth::Int => {
                        if i32::try_from(value).is_ok() {
                            Literal::Int32(value as i32)
                        } else {
                            Literal::Int64(value)
                        }
                    }
                };
                Ok(self.ast.push_expr(Expr::Literal(lit), span))
            }
            Tok::Float(value, single) => {
                self.advance();
                let lit = if single {
                    Literal::Float(value as f32)
                } else {
                    Literal::Double(value)
                };
                Ok(self.ast.push_expr(Expr::Literal(lit), span))
            }
            Tok::Str(text) => {
                self.advance();
                Ok(self.ast.push_expr(Expr::Literal(Literal::Str(text)), span))
            }
            Tok::At => {
                self.advance();
                self.attribute(types::FLOAT, false, span)
            }
            Tok::Ident(name) => {
                match name.as_str() {
                    "true" | "false" => {
                        self.advance();
                        let lit = Literal::Bool(name == "true");
                        return Ok(self.ast.push_expr(Expr::Literal(lit), span));
                    }
                    _ => {}
                }
                // Typed attribute reference: prefix followed by '@'.
                if self.peek_ahead(1) == &Tok::At {
                    if let Some(ty) = attribute_prefix(&name) {
                        self.advance();
                        self.advance();
                        return self.attribute(ty, true, span);
                    }
                }
                // Cast: scalar type keyword followed by '('.
                if let Some(ty) = type_keyword(&name) {
                    if self.peek_ahead(1) == &Tok::LParen {
                        if !ty.is_scalar() {
                            return Err(
                                self.error(format!("cannot cast to non-scalar type '{}'", ty))
                            );
                        }
                        self.advance();
                        self.advance();
                        let value = self.expression()?;
                        self.expect(Tok::RParen, "')' after cast operand")?;
                        return Ok(self.ast.push_expr(Expr::Cast { target: ty, value }, span));
                    }
                    return Err(self.error(format!("unexpected type name '{}'", name)));
                }
                self.advance();
                if self.eat(&Tok::LParen) {
                    let mut args = Vec::new();
                    if self.peek() != &Tok::RParen {
                        loop {
                            args.push(self.expression()?);
                            if !self.eat(&Tok::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(Tok::RParen, "')' after call arguments")?;
                    Ok(self.ast.push_expr(Expr::Call { name, args }, span))
                } else {
                    Ok(self.ast.push_expr(Expr::Local(name), span))
                }
            }
            _ => Err(self.error("expected expression")),
        }
    }

    fn attribute(
        &mut self,
        ty: AxType,
        explicit: bool,
        span: Span,
    ) -> Result<ExprId, Diagnostic> {
        let Tok::Ident(name) = self.advance() else {
            return Err(self.error("expected attribute name after '@'"));
        };
        Ok(self
            .ast
            .push_expr(Expr::Attribute { name, ty, explicit }, span))
    }

    fn pack_expr(&mut self) -> Result<ExprId, Diagnostic> {
        let span = self.span();
        self.expect(Tok::LBrace, "'{'")?;
        let mut items = Vec::new();
        loop {
            items.push(self.expression()?);
            if !self.eat(&Tok::Comma) {
                break;
            }
        }
        self.expect(Tok::RBrace, "'}' after vector components")?;
        if items.len() != 3 && items.len() != 4 {
            return Err(Diagnostic::new(
                DiagnosticKind::ParseError,
                format!("vector literal needs 3 or 4 components, found {}", items.len()),
                span,
                self.source,
            ));
        }
        Ok(self.ast.push_expr(Expr::Pack(items), span))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::dump;

    #[test]
    fn test_scenario_one_shape() {
        let ast = parse("@density = @density + 1.0f;").unwrap();
        assert_eq!(
            dump(&ast),
            "(assign = (attribute float density) (binary + (attribute float density) (float 1)))\n"
        );
    }

    #[test]
    fn test_typed_attributes() {
        let ast = parse("i@count = 0; v@P += {0.0f, 1.0f, 0.0f};").unwrap();
        let text = dump(&ast);
        assert!(text.contains("(attribute int count)"));
        assert!(text.contains("(assign += (attribute vec3f P) (pack (float 0) (float 1) (float 0)))"));
    }

    #[test]
    fn test_full_prefix_attribute() {
        let ast = parse("float@density = 1.0f;").unwrap();
        assert!(dump(&ast).contains("(attribute float density)"));
    }

    #[test]
    fn test_precedence() {
        let ast = parse("int a = 1 + 2 * 3;").unwrap();
        assert_eq!(
            dump(&ast),
            "(declare int a (binary + (int 1) (binary * (int 2) (int 3))))\n"
        );
    }

    #[test]
    fn test_comparison_binds_tighter_than_logical() {
        let ast = parse("bool b = 1 < 2 && 3 == 3;").unwrap();
        assert_eq!(
            dump(&ast),
            "(declare bool b (binary && (binary < (int 1) (int 2)) (binary == (int 3) (int 3))))\n"
        );
    }

    #[test]
    fn test_for_loop() {
        let ast = parse("for (int i = 0; i < 10; ++i) { @a += 1.0f; }").unwrap();
        let text = dump(&ast);
        assert!(text.starts_with("(for (declare int i (int 0))"));
        assert!(text.contains("(crement ++ pre (local i))"));
    }

    #[test]
    fn test_do_while_and_keywords() {
        let ast = parse("do { break; } while (true); while (false) continue;").unwrap();
        let text = dump(&ast);
        assert!(text.contains("(do-while"));
        assert!(text.contains("(break)"));
        assert!(text.contains("(continue)"));
    }

    #[test]
    fn test_cast_versus_declaration() {
        let ast = parse("int x = int(2.5); float y = 1.0;").unwrap();
        let text = dump(&ast);
        assert!(text.contains("(cast int (double 2.5))"));
        assert!(text.contains("(declare float y (double 1))"));
    }

    #[test]
    fn test_component_access() {
        let ast = parse("float x = v.x + v[2];").unwrap();
        let text = dump(&ast);
        assert!(text.contains("(unpack 0 (local v))"));
        assert!(text.contains("(unpack 2 (local v))"));
    }

    #[test]
    fn test_literal_suffixes() {
        let ast = parse("@a = 1; @b = 2l; @c = 3s; @d = 4.0; @e = 5.0f;").unwrap();
        let text = dump(&ast);
        assert!(text.contains("(int 1)"));
        assert!(text.contains("(long 2)"));
        assert!(text.contains("(short 3)"));
        assert!(text.contains("(double 4)"));
        assert!(text.contains("(float 5)"));
    }

    #[test]
    fn test_error_reports_line_and_snippet() {
        let err = parse("int x = 1;\n@a = $;\n").unwrap_err();
        assert_eq!(err.kind, DiagnosticKind::ParseError);
        assert_eq!(err.line, 2);
        assert_eq!(err.snippet, "@a = $;");
    }

    #[test]
    fn test_vector_literal_arity() {
        let err = parse("v@P = {1.0f, 2.0f};").unwrap_err();
        assert!(err.message.contains("3 or 4 components"));
    }

    #[test]
    fn test_unterminated_block() {
        assert!(parse("{ @a = 1.0f;").is_err());
    }
}
