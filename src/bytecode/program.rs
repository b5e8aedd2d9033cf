use serde::{Deserialize, Serialize};

use crate::bytecode::Op;
use crate::token::Pos;
use crate::types::ScalarKind;

/// Format tag written ahead of the postcard payload so a stale or foreign
/// file is rejected instead of misdecoded.
const MAGIC: &[u8; 4] = b"CNDR";
const VERSION: u8 = 1;

// Guest address-space layout, shared by the code generator and the VM.
// Addresses below DATA_BASE act as a null guard page: any access there
// faults as a null dereference.
pub const DATA_BASE: u32 = 0x1000;
pub const HEAP_BASE: u32 = 0x1000_0000;
pub const STACK_TOP: u32 = 0x7fff_0000;

/// A constant-pool entry. Integer immediates are inlined in `Op::PushInt`;
/// the pool holds what does not fit an instruction operand.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Const {
    Float(f64),
    /// Address of an interned string literal inside the data image.
    Str(u32),
}

/// Everything the VM needs to call one compiled function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FuncInfo {
    pub name: String,
    /// Index of the first instruction.
    pub entry: u32,
    /// Frame size in bytes (parameters and locals), 8-byte aligned.
    pub frame_size: u32,
    /// Byte offset of each parameter slot within the frame.
    pub param_offsets: Vec<u32>,
    /// Memory access class of each parameter, in declaration order.
    pub param_kinds: Vec<ScalarKind>,
    /// Return access class; `None` for void.
    pub ret_kind: Option<ScalarKind>,
}

/// A compiled program: read-only once built. The same program can back any
/// number of VM invocations, concurrently or in sequence, because all
/// mutable state lives in the VM.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub ops: Vec<Op>,
    /// Source position of each instruction, parallel to `ops`. Faults
    /// report through this table.
    pub spans: Vec<Pos>,
    pub pool: Vec<Const>,
    /// Function table, in declaration order.
    pub funcs: Vec<FuncInfo>,
    /// Initial contents of the data segment: globals first, then interned
    /// string literals.
    pub data: Vec<u8>,
    /// Bytes of the data segment occupied by globals.
    pub globals_size: u32,
}

impl Program {
    pub fn func_index(&self, name: &str) -> Option<usize> {
        self.funcs.iter().position(|f| f.name == name)
    }

    pub fn func(&self, name: &str) -> Option<&FuncInfo> {
        self.funcs.iter().find(|f| f.name == name)
    }

    /// Serialize to a self-describing byte image.
    pub fn to_bytes(&self) -> Result<Vec<u8>, postcard::Error> {
        let mut out = Vec::with_capacity(self.ops.len() * 4 + self.data.len());
        out.extend_from_slice(MAGIC);
        out.push(VERSION);
        let payload = postcard::to_allocvec(self)?;
        out.extend_from_slice(&payload);
        Ok(out)
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Program, ProgramImageError> {
        if bytes.len() < 5 || &bytes[0..4] != MAGIC {
            return Err(ProgramImageError::BadMagic);
        }
        if bytes[4] != VERSION {
            return Err(ProgramImageError::BadVersion(bytes[4]));
        }
        postcard::from_bytes(&bytes[5..]).map_err(ProgramImageError::Decode)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ProgramImageError {
    #[error("not a compiled program image")]
    BadMagic,
    #[error("unsupported program image version {0}")]
    BadVersion(u8),
    #[error("malformed program image: {0}")]
    Decode(postcard::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_program() -> Program {
        Program {
            ops: vec![Op::PushInt(1), Op::PushInt(2), Op::Add, Op::Ret],
            spans: vec![Pos::start(); 4],
            pool: vec![Const::Float(1.5), Const::Str(64)],
            funcs: vec![FuncInfo {
                name: "main".to_string(),
                entry: 0,
                frame_size: 0,
                param_offsets: vec![],
                param_kinds: vec![],
                ret_kind: Some(ScalarKind::I32),
            }],
            data: vec![0; 68],
            globals_size: 64,
        }
    }

    #[test]
    fn test_serialize_roundtrip() {
        let program = sample_program();
        let bytes = program.to_bytes().unwrap();
        let back = Program::from_bytes(&bytes).unwrap();
        assert_eq!(back, program);
    }

    #[test]
    fn test_rejects_foreign_bytes() {
        assert!(matches!(
            Program::from_bytes(b"ELF\x7f....."),
            Err(ProgramImageError::BadMagic)
        ));
        let mut bytes = sample_program().to_bytes().unwrap();
        bytes[4] = 99;
        assert!(matches!(
            Program::from_bytes(&bytes),
            Err(ProgramImageError::BadVersion(99))
        ));
    }

    #[test]
    fn test_func_lookup() {
        let program = sample_program();
        assert_eq!(program.func_index("main"), Some(0));
        assert!(program.func("start").is_none());
    }
}
