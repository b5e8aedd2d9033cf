use crate::token::Pos;

/// What went wrong inside a running guest program.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultKind {
    DivideByZero,
    OutOfBounds,
    NullDereference,
    StackOverflow,
    BudgetExceeded,
}

impl std::fmt::Display for FaultKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let text = match self {
            FaultKind::DivideByZero => "division by zero",
            FaultKind::OutOfBounds => "out-of-bounds memory access",
            FaultKind::NullDereference => "null pointer dereference",
            FaultKind::StackOverflow => "stack overflow",
            FaultKind::BudgetExceeded => "step budget exceeded",
        };
        write!(f, "{}", text)
    }
}

/// A guest-level fault, carrying the source position of the instruction
/// that trapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("{pos}: {kind}")]
pub struct RuntimeFault {
    pub kind: FaultKind,
    pub pos: Pos,
}

/// Errors from one `run` invocation. Guest faults are one variant; the
/// others are host-boundary problems that never reach guest execution.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum RunError {
    #[error("no function named '{0}'")]
    UnknownEntry(String),
    #[error("'{name}' expects {expected} arguments, got {got}")]
    ArityMismatch {
        name: String,
        expected: usize,
        got: usize,
    },
    #[error("argument {index} of '{name}': expected {expected}, got {got}")]
    ArgType {
        name: String,
        index: usize,
        expected: &'static str,
        got: &'static str,
    },
    #[error(transparent)]
    Fault(#[from] RuntimeFault),
    /// The instruction stream itself is inconsistent. Unreachable for
    /// programs produced by this compiler; loaded images can trip it.
    #[error("malformed program: {0}")]
    BadProgram(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fault_message_carries_position() {
        let fault = RuntimeFault {
            kind: FaultKind::DivideByZero,
            pos: Pos {
                line: 3,
                col: 14,
                offset: 40,
            },
        };
        assert_eq!(fault.to_string(), "3:14: division by zero");
        let err: RunError = fault.into();
        assert_eq!(err.to_string(), "3:14: division by zero");
    }
}
