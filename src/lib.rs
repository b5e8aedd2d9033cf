//! Cinder: a small C-like language compiled to stack bytecode and run
//! in a sandboxed virtual machine.
//!
//! The crate is meant to be embedded. [`compile`] turns source text
//! into a [`Program`]; a [`Vm`] then executes one entry call over it:
//!
//! ```
//! use cinder::{compile, Value, Vm};
//!
//! let program = compile("int add(int a, int b) { return a + b; }").unwrap();
//! let outcome = Vm::new(&program)
//!     .run("add", &[Value::Int(2), Value::Int(3)])
//!     .unwrap();
//! assert_eq!(outcome.value, Value::Int(5));
//! ```
//!
//! Errors come in three disjoint layers: [`CompileError`] batches the
//! source diagnostics, [`RunError`] covers host-side misuse of `run`,
//! and [`RuntimeFault`] is the guest program trapping at a source
//! position.

pub mod ast;
pub mod bytecode;
pub mod diag;
pub mod lexer;
pub mod parser;
pub mod runtime;
pub mod sema;
pub mod token;
pub mod types;

pub use bytecode::{disasm::disassemble, Program};
pub use diag::{CompileError, Diagnostic, DiagnosticKind};
pub use runtime::{FaultKind, Outcome, RunError, RuntimeFault, Value, Vm, VmConfig};
pub use token::Pos;

/// Compile a translation unit. Lexical and syntax diagnostics are
/// collected together in one pass; if the unit parses, semantic
/// analysis runs over the whole of it before code generation, so a
/// single call reports every diagnostic the source deserves at that
/// stage.
pub fn compile(source: &str) -> Result<Program, CompileError> {
    let tokens = lexer::Lexer::new(source).tokenize();
    let mut unit = parser::Parser::new(tokens)
        .parse()
        .map_err(CompileError::Diagnostics)?;
    let analysis = sema::analyze(&mut unit).map_err(CompileError::Diagnostics)?;
    bytecode::compile_unit(&unit, &analysis)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_compile_ok() {
        let program = compile("int main() { return 2 + 3 * 4; }").unwrap();
        assert_eq!(program.funcs.len(), 1);
        assert_eq!(program.funcs[0].name, "main");
    }

    #[test]
    fn test_compile_batches_all_syntax_errors() {
        let err = compile("int main() { int x @; int y #; return 0; }").unwrap_err();
        let CompileError::Diagnostics(diags) = err else {
            panic!("expected diagnostics")
        };
        assert!(diags.len() >= 2);
    }

    #[test]
    fn test_semantic_errors_only_after_clean_parse() {
        let err = compile("int main() { return x; }").unwrap_err();
        let CompileError::Diagnostics(diags) = err else {
            panic!("expected diagnostics")
        };
        assert_eq!(diags.len(), 1);
        assert_eq!(diags[0].kind, DiagnosticKind::Semantic);
        assert!(diags[0].message.contains("x"));
    }
}
