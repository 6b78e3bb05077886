//! Compiler diagnostics.
//!
//! Every failure and warning the compiler reports is a [`Diagnostic`]:
//! a kind, a message, a 1-based source position and the offending source
//! line. Warnings use the same shape as errors so `warn_as_error` can
//! promote them without translation.

/// Classification of a diagnostic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    /// Malformed source text.
    ParseError,
    /// Invalid conversion, undeclared identifier, non-scalar where a
    /// scalar is required, reserved feature.
    TypeError,
    /// An operator applied to operand types it does not support.
    BinaryOperationError,
    /// No function of that name, or no overload accepts the arguments.
    FunctionLookupError,
    /// Two overloads fit the arguments equally well.
    AmbiguousOverloadError,
    /// An attribute reference that cannot be materialised on the target.
    UnknownAttributeError,
    /// Verification or code generation failure in the JIT backend.
    JitError,
    /// Non-fatal: value-changing implicit conversion.
    NarrowingWarning,
    /// Non-fatal: bitwise operator forced float operands to `i64`.
    BitwiseFloatWarning,
    /// Non-fatal: statements that can never execute.
    DeadCodeWarning,
    /// Non-fatal: a local declared but never read.
    UnusedLocalWarning,
    /// Non-fatal: custom-data key not present in the bound data.
    CustomDataWarning,
}

impl DiagnosticKind {
    pub fn is_warning(self) -> bool {
        matches!(
            self,
            DiagnosticKind::NarrowingWarning
                | DiagnosticKind::BitwiseFloatWarning
                | DiagnosticKind::DeadCodeWarning
                | DiagnosticKind::UnusedLocalWarning
                | DiagnosticKind::CustomDataWarning
        )
    }
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            DiagnosticKind::ParseError => "parse error",
            DiagnosticKind::TypeError => "type error",
            DiagnosticKind::BinaryOperationError => "binary operation error",
            DiagnosticKind::FunctionLookupError => "function lookup error",
            DiagnosticKind::AmbiguousOverloadError => "ambiguous overload",
            DiagnosticKind::UnknownAttributeError => "unknown attribute",
            DiagnosticKind::JitError => "jit error",
            DiagnosticKind::NarrowingWarning => "narrowing warning",
            DiagnosticKind::BitwiseFloatWarning => "bitwise-on-float warning",
            DiagnosticKind::DeadCodeWarning => "dead code warning",
            DiagnosticKind::UnusedLocalWarning => "unused local warning",
            DiagnosticKind::CustomDataWarning => "custom data warning",
        };
        f.write_str(name)
    }
}

/// A 1-based source position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Span {
    pub line: u32,
    pub column: u32,
}

impl Span {
    pub fn new(line: u32, column: u32) -> Self {
        Span { line, column }
    }
}

/// One error or warning, with enough context to print a caret-style
/// report.
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub line: u32,
    pub column: u32,
    /// The full source line the position refers to, empty when the
    /// failure has no location (e.g. module verification).
    pub snippet: String,
}

impl Diagnostic {
    pub fn new(kind: DiagnosticKind, message: impl Into<String>, span: Span, source: &str) -> Self {
        let snippet = source
            .lines()
            .nth(span.line.saturating_sub(1) as usize)
            .unwrap_or("")
            .to_string();
        Diagnostic {
            kind,
            message: message.into(),
            line: span.line,
            column: span.column,
            snippet,
        }
    }

    /// A diagnostic with no source position (JIT-side failures).
    pub fn unlocated(kind: DiagnosticKind, message: impl Into<String>) -> Self {
        Diagnostic {
            kind,
            message: message.into(),
            line: 0,
            column: 0,
            snippet: String::new(),
        }
    }

    pub fn is_warning(&self) -> bool {
        self.kind.is_warning()
    }

    /// Rewrap a warning as a hard error of the same text, for
    /// `warn_as_error`.
    pub fn promoted(mut self) -> Self {
        if self.is_warning() {
            self.kind = DiagnosticKind::TypeError;
        }
        self
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.line == 0 {
            write!(f, "{}: {}", self.kind, self.message)
        } else {
            write!(
                f,
                "{} at {}:{}: {}",
                self.kind, self.line, self.column, self.message
            )
        }
    }
}

impl std::error::Error for Diagnostic {}

/// The failure side of a compilation: the fatal diagnostic plus every
/// warning gathered before the failure.
#[derive(Debug, Clone)]
pub struct CompileError {
    pub diagnostic: Diagnostic,
    pub warnings: Vec<Diagnostic>,
}

impl CompileError {
    pub fn new(diagnostic: Diagnostic, warnings: Vec<Diagnostic>) -> Self {
        CompileError {
            diagnostic,
            warnings,
        }
    }
}

impl From<Diagnostic> for CompileError {
    fn from(diagnostic: Diagnostic) -> Self {
        CompileError {
            diagnostic,
            warnings: Vec::new(),
        }
    }
}

impl std::fmt::Display for CompileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.diagnostic.fmt(f)
    }
}

impl std::error::Error for CompileError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snippet_extraction() {
        let source = "int x = 1;\n@a = $bad;\n";
        let d = Diagnostic::new(
            DiagnosticKind::ParseError,
            "unexpected character",
            Span::new(2, 6),
            source,
        );
        assert_eq!(d.snippet, "@a = $bad;");
        assert_eq!(d.line, 2);
    }

    #[test]
    fn test_warning_promotion() {
        let w = Diagnostic::unlocated(DiagnosticKind::NarrowingWarning, "truncates");
        assert!(w.is_warning());
        let e = w.promoted();
        assert!(!e.is_warning());
        assert_eq!(e.kind, DiagnosticKind::TypeError);
    }
}
