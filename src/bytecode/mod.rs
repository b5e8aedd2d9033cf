pub mod compile;
pub mod disasm;
pub mod op;
pub mod program;

pub use compile::compile_unit;
pub use op::{Builtin, Op};
pub use program::{Const, FuncInfo, Program, ProgramImageError};
