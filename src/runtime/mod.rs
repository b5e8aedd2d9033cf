//! Execution of compiled programs: the value model, guest memory, and
//! the stack machine itself.

pub mod fault;
pub mod memory;
pub mod value;
pub mod vm;

pub use fault::{FaultKind, RunError, RuntimeFault};
pub use value::Value;
pub use vm::{Outcome, Vm, VmConfig};
