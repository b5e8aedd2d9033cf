use std::fmt::Write;

use crate::bytecode::program::{Const, Program};
use crate::bytecode::Op;

/// Render a human-readable listing of a compiled program: one section per
/// function, jump targets marked, jump operands annotated with their
/// absolute target.
pub fn disassemble(program: &Program) -> String {
    let mut out = String::new();

    for (index, func) in program.funcs.iter().enumerate() {
        let start = func.entry as usize;
        let end = program
            .funcs
            .get(index + 1)
            .map(|f| f.entry as usize)
            .unwrap_or(program.ops.len());

        let _ = writeln!(out, "════════════════════════════════════════");
        let _ = writeln!(
            out,
            " {} ({} instructions, frame {} bytes)",
            func.name,
            end - start,
            func.frame_size
        );
        let _ = writeln!(out, "════════════════════════════════════════");

        let targets = jump_targets(&program.ops[start..end]);
        for (ip, op) in program.ops[start..end].iter().enumerate() {
            let marker = if targets.contains(&ip) { "► " } else { "  " };
            let _ = write!(out, "{:04} {}{}", ip, marker, op);
            match op {
                Op::Jump(offset) | Op::JumpIfZero(offset) | Op::JumpIfNotZero(offset) => {
                    let _ = write!(out, "  ; -> {:04}", ip as i32 + 1 + offset);
                }
                Op::Const(n) => match program.pool.get(*n as usize) {
                    Some(Const::Float(value)) => {
                        let _ = write!(out, "  ; {}", value);
                    }
                    Some(Const::Str(addr)) => {
                        let _ = write!(out, "  ; {}", string_at(program, *addr));
                    }
                    None => {}
                },
                Op::Call(n) => {
                    if let Some(callee) = program.funcs.get(*n as usize) {
                        let _ = write!(out, "  ; {}", callee.name);
                    }
                }
                _ => {}
            }
            let _ = writeln!(out);
        }
        let _ = writeln!(out);
    }

    if !program.pool.is_empty() {
        let _ = writeln!(out, "constants:");
        for (n, value) in program.pool.iter().enumerate() {
            match value {
                Const::Float(f) => {
                    let _ = writeln!(out, "  [{}] float {}", n, f);
                }
                Const::Str(addr) => {
                    let _ = writeln!(
                        out,
                        "  [{}] str @{:#x} {}",
                        n,
                        addr,
                        string_at(program, *addr)
                    );
                }
            }
        }
    }

    out
}

/// Instruction indices (relative to the slice) that some jump lands on.
fn jump_targets(ops: &[Op]) -> Vec<usize> {
    let mut targets = Vec::new();
    for (ip, op) in ops.iter().enumerate() {
        if let Op::Jump(offset) | Op::JumpIfZero(offset) | Op::JumpIfNotZero(offset) = op {
            let target = ip as i32 + 1 + offset;
            if target >= 0 && (target as usize) < ops.len() {
                targets.push(target as usize);
            }
        }
    }
    targets
}

/// Best-effort readback of a NUL-terminated string from the data image.
fn string_at(program: &Program, addr: u32) -> String {
    use crate::bytecode::program::DATA_BASE;
    let start = addr.wrapping_sub(DATA_BASE) as usize;
    let bytes = match program.data.get(start..) {
        Some(tail) => tail,
        None => return "\"?\"".to_string(),
    };
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    format!("{:?}", String::from_utf8_lossy(&bytes[..end]))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;
    use crate::sema::analyze;

    fn compile_src(source: &str) -> Program {
        let tokens = Lexer::new(source).tokenize();
        let mut unit = Parser::new(tokens).parse().expect("parse");
        let analysis = analyze(&mut unit).expect("analyze");
        crate::bytecode::compile_unit(&unit, &analysis).expect("codegen")
    }

    #[test]
    fn test_listing_contains_functions_and_targets() {
        let program = compile_src(
            "int main() { int i; i = 0; while (i < 3) i = i + 1; return i; }",
        );
        let listing = disassemble(&program);
        assert!(listing.contains(" main "));
        assert!(listing.contains("►"));
        assert!(listing.contains("jz"));
    }

    #[test]
    fn test_listing_annotates_strings() {
        let program = compile_src(r#"int main() { puts("hello"); return 0; }"#);
        let listing = disassemble(&program);
        assert!(listing.contains("\"hello\""), "{}", listing);
    }
}
