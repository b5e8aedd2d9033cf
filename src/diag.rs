use crate::token::Pos;

/// Which phase produced a compile-time diagnostic. The three kinds are kept
/// separate from runtime faults and from internal errors; no phase ever
/// rewrites another phase's reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticKind {
    Lex,
    Syntax,
    Semantic,
}

impl std::fmt::Display for DiagnosticKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DiagnosticKind::Lex => write!(f, "lex error"),
            DiagnosticKind::Syntax => write!(f, "syntax error"),
            DiagnosticKind::Semantic => write!(f, "semantic error"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{pos}: {kind}: {message}")]
pub struct Diagnostic {
    pub kind: DiagnosticKind,
    pub message: String,
    pub pos: Pos,
}

impl Diagnostic {
    pub fn lex(message: impl Into<String>, pos: Pos) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Lex,
            message: message.into(),
            pos,
        }
    }

    pub fn syntax(message: impl Into<String>, pos: Pos) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Syntax,
            message: message.into(),
            pos,
        }
    }

    pub fn semantic(message: impl Into<String>, pos: Pos) -> Self {
        Diagnostic {
            kind: DiagnosticKind::Semantic,
            message: message.into(),
            pos,
        }
    }
}

/// Why `compile` failed. User diagnostics and internal invariant violations
/// never share a variant: an embedding host can always tell "your program
/// has an error" from "the compiler has a bug".
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CompileError {
    #[error("compilation failed with {} diagnostic(s)", .0.len())]
    Diagnostics(Vec<Diagnostic>),
    #[error("internal compiler error: {0}")]
    Internal(String),
}

impl CompileError {
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            CompileError::Diagnostics(list) => list,
            CompileError::Internal(_) => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diagnostic_display() {
        let d = Diagnostic::syntax(
            "expected `;`, found `)`",
            Pos {
                line: 2,
                col: 7,
                offset: 20,
            },
        );
        assert_eq!(d.to_string(), "2:7: syntax error: expected `;`, found `)`");
    }

    #[test]
    fn test_kind_display() {
        assert_eq!(DiagnosticKind::Lex.to_string(), "lex error");
        assert_eq!(DiagnosticKind::Semantic.to_string(), "semantic error");
    }

    #[test]
    fn test_compile_error_diagnostics_accessor() {
        let d = Diagnostic::lex("bad", Pos::start());
        let err = CompileError::Diagnostics(vec![d.clone()]);
        assert_eq!(err.diagnostics(), &[d]);
        assert!(CompileError::Internal("x".to_string()).diagnostics().is_empty());
    }
}
