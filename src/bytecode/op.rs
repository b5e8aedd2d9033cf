use serde::{Deserialize, Serialize};

use crate::types::{FuncType, ScalarKind, Type};

// =============================================================================
// OP - Bytecode instructions
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Op {
    // constants
    /// Push an immediate integer.
    PushInt(i64),
    /// Push constant-pool entry `pool[n]`.
    Const(u32),

    // stack ops
    Dup,
    Drop,
    Swap,
    Over,

    // addressing
    /// Push the address of a local slot: frame base + byte offset.
    LocalAddr(u32),
    /// Push the address of a global: data base + byte offset.
    GlobalAddr(u32),
    /// Pop an address, push the scalar stored there.
    Load(ScalarKind),
    /// Pop a value, pop an address, store the value there at the given
    /// width, push the stored value back (assignment is an expression).
    Store(ScalarKind),
    /// Pop a source address, pop a destination address, copy `n` bytes,
    /// push the destination address.
    MemCopy(u32),

    // arithmetic (operate on the tagged operand values; `Add`/`Sub` also
    // accept a pointer on either side for scaled pointer arithmetic)
    Add,
    Sub,
    Mul,
    Div,
    DivU,
    Mod,
    ModU,
    Neg,

    // bitwise / logical
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    ShrU,
    BitNot,
    /// Logical not: push 1 if the popped value is zero or null, else 0.
    Not,

    // comparisons, push Int(1) or Int(0)
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    LtU,
    GtU,
    LeU,
    GeU,

    /// Adjust the top of stack to the value set of a scalar kind: integer
    /// widths wrap and re-extend, float/int convert, pointer/int reinterpret.
    Cast(ScalarKind),

    // control flow
    /// Unconditional relative jump. Offset is added to current ip.
    /// Jump(1) skips next instruction, Jump(0) is a no-op, Jump(-1) loops forever.
    Jump(i32),
    /// Pop a value, jump if it is zero or null.
    JumpIfZero(i32),
    /// Pop a value, jump if it is non-zero.
    JumpIfNotZero(i32),

    // calls
    /// Call `funcs[n]`: pop its arguments, open a frame, jump to its entry.
    Call(u32),
    CallBuiltin(Builtin),
    /// Close the current frame. The return value is on the operand stack.
    Ret,
}

// =============================================================================
// BUILTIN - Host functions exposed to guest programs
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Builtin {
    Malloc,
    Free,
    Memcpy,
    Putchar,
    Puts,
    PrintInt,
}

impl Builtin {
    pub fn lookup(name: &str) -> Option<Builtin> {
        match name {
            "malloc" => Some(Builtin::Malloc),
            "free" => Some(Builtin::Free),
            "memcpy" => Some(Builtin::Memcpy),
            "putchar" => Some(Builtin::Putchar),
            "puts" => Some(Builtin::Puts),
            "print_int" => Some(Builtin::PrintInt),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Builtin::Malloc => "malloc",
            Builtin::Free => "free",
            Builtin::Memcpy => "memcpy",
            Builtin::Putchar => "putchar",
            Builtin::Puts => "puts",
            Builtin::PrintInt => "print_int",
        }
    }

    /// The C-level signature the analyzer checks calls against. `void *`
    /// parameters accept any pointer argument.
    pub fn signature(self) -> FuncType {
        let void_ptr = Type::ptr(Type::Void);
        match self {
            Builtin::Malloc => FuncType {
                ret: void_ptr,
                params: vec![Type::long_()],
            },
            Builtin::Free => FuncType {
                ret: Type::Void,
                params: vec![void_ptr],
            },
            Builtin::Memcpy => FuncType {
                ret: void_ptr.clone(),
                params: vec![void_ptr.clone(), void_ptr, Type::long_()],
            },
            Builtin::Putchar => FuncType {
                ret: Type::int_(),
                params: vec![Type::int_()],
            },
            Builtin::Puts => FuncType {
                ret: Type::int_(),
                params: vec![Type::ptr(Type::char_())],
            },
            Builtin::PrintInt => FuncType {
                ret: Type::Void,
                params: vec![Type::long_()],
            },
        }
    }

    pub fn arity(self) -> usize {
        match self {
            Builtin::Malloc | Builtin::Free | Builtin::Putchar | Builtin::Puts => 1,
            Builtin::PrintInt => 1,
            Builtin::Memcpy => 3,
        }
    }
}

impl std::fmt::Display for Builtin {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::fmt::Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Op::PushInt(n) => write!(f, "push.i {}", n),
            Op::Const(n) => write!(f, "const {}", n),
            Op::Dup => write!(f, "dup"),
            Op::Drop => write!(f, "drop"),
            Op::Swap => write!(f, "swap"),
            Op::Over => write!(f, "over"),
            Op::LocalAddr(off) => write!(f, "local.addr {}", off),
            Op::GlobalAddr(off) => write!(f, "global.addr {}", off),
            Op::Load(kind) => write!(f, "load.{:?}", kind),
            Op::Store(kind) => write!(f, "store.{:?}", kind),
            Op::MemCopy(n) => write!(f, "memcopy {}", n),
            Op::Add => write!(f, "add"),
            Op::Sub => write!(f, "sub"),
            Op::Mul => write!(f, "mul"),
            Op::Div => write!(f, "div"),
            Op::DivU => write!(f, "div.u"),
            Op::Mod => write!(f, "mod"),
            Op::ModU => write!(f, "mod.u"),
            Op::Neg => write!(f, "neg"),
            Op::BitAnd => write!(f, "and"),
            Op::BitOr => write!(f, "or"),
            Op::BitXor => write!(f, "xor"),
            Op::Shl => write!(f, "shl"),
            Op::Shr => write!(f, "shr"),
            Op::ShrU => write!(f, "shr.u"),
            Op::BitNot => write!(f, "bnot"),
            Op::Not => write!(f, "not"),
            Op::Eq => write!(f, "eq"),
            Op::Ne => write!(f, "ne"),
            Op::Lt => write!(f, "lt"),
            Op::Gt => write!(f, "gt"),
            Op::Le => write!(f, "le"),
            Op::Ge => write!(f, "ge"),
            Op::LtU => write!(f, "lt.u"),
            Op::GtU => write!(f, "gt.u"),
            Op::LeU => write!(f, "le.u"),
            Op::GeU => write!(f, "ge.u"),
            Op::Cast(kind) => write!(f, "cast.{:?}", kind),
            Op::Jump(off) => write!(f, "jump {:+}", off),
            Op::JumpIfZero(off) => write!(f, "jz {:+}", off),
            Op::JumpIfNotZero(off) => write!(f, "jnz {:+}", off),
            Op::Call(n) => write!(f, "call {}", n),
            Op::CallBuiltin(b) => write!(f, "call.builtin {}", b),
            Op::Ret => write!(f, "ret"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_lookup_roundtrip() {
        for b in [
            Builtin::Malloc,
            Builtin::Free,
            Builtin::Memcpy,
            Builtin::Putchar,
            Builtin::Puts,
            Builtin::PrintInt,
        ] {
            assert_eq!(Builtin::lookup(b.name()), Some(b));
            assert_eq!(b.signature().params.len(), b.arity());
        }
        assert_eq!(Builtin::lookup("printf"), None);
    }

    #[test]
    fn test_op_display() {
        assert_eq!(Op::PushInt(42).to_string(), "push.i 42");
        assert_eq!(Op::Jump(-3).to_string(), "jump -3");
        assert_eq!(Op::JumpIfZero(2).to_string(), "jz +2");
        assert_eq!(Op::Load(ScalarKind::I32).to_string(), "load.I32");
    }
}
