use crate::bytecode::program::{Const, DATA_BASE};
use crate::bytecode::{Builtin, Op, Program};
use crate::runtime::fault::{FaultKind, RunError, RuntimeFault};
use crate::runtime::memory::{MemError, Memory};
use crate::runtime::Value;
use crate::token::Pos;
use crate::types::ScalarKind;

/// Safety limits for one VM invocation.
#[derive(Debug, Clone)]
pub struct VmConfig {
    /// Instructions the invocation may execute; `None` is unlimited.
    pub step_budget: Option<u64>,
    /// Guest call-stack segment in bytes.
    pub stack_size: u32,
    /// Guest heap arena in bytes.
    pub heap_size: u32,
    pub max_call_depth: usize,
    /// Operand stack depth limit.
    pub max_operand_depth: usize,
}

impl Default for VmConfig {
    fn default() -> Self {
        VmConfig {
            step_budget: None,
            stack_size: 1 << 20,
            heap_size: 16 << 20,
            max_call_depth: 1000,
            max_operand_depth: 65_536,
        }
    }
}

/// What a completed invocation produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Outcome {
    /// The entry function's return value (zero for void entries).
    pub value: Value,
    /// Everything the guest wrote through the output builtins.
    pub output: String,
    /// Instructions executed.
    pub steps: u64,
}

struct Frame {
    ret_ip: usize,
    /// Lowest address of this frame's locals.
    bp: u32,
}

/// One invocation of a compiled program. The program itself stays
/// read-only; all mutable state lives here, so independent VMs over the
/// same program cannot observe each other. `run` consumes the VM: a
/// finished or faulted invocation cannot be resumed.
pub struct Vm<'a> {
    program: &'a Program,
    config: VmConfig,
    stack: Vec<Value>,
    frames: Vec<Frame>,
    memory: Memory,
    output: String,
    steps: u64,
    ip: usize,
}

impl<'a> Vm<'a> {
    pub fn new(program: &'a Program) -> Self {
        Self::with_config(program, VmConfig::default())
    }

    pub fn with_config(program: &'a Program, config: VmConfig) -> Self {
        let memory = Memory::new(&program.data, config.stack_size, config.heap_size);
        Vm {
            program,
            config,
            stack: Vec::new(),
            frames: Vec::new(),
            memory,
            output: String::new(),
            steps: 0,
            ip: 0,
        }
    }

    /// Call `entry` with `args` and run to completion, a fault, or the
    /// step budget.
    pub fn run(mut self, entry: &str, args: &[Value]) -> Result<Outcome, RunError> {
        let index = self
            .program
            .func_index(entry)
            .ok_or_else(|| RunError::UnknownEntry(entry.to_string()))?;
        let func = &self.program.funcs[index];

        if args.len() != func.param_kinds.len() {
            return Err(RunError::ArityMismatch {
                name: entry.to_string(),
                expected: func.param_kinds.len(),
                got: args.len(),
            });
        }
        for (i, (arg, kind)) in args.iter().zip(&func.param_kinds).enumerate() {
            if !marshals(*arg, *kind) {
                return Err(RunError::ArgType {
                    name: entry.to_string(),
                    index: i,
                    expected: kind_class(*kind),
                    got: arg.type_name(),
                });
            }
        }

        self.ip = func.entry as usize;
        let entry_pos = self.current_pos();

        // the entry frame sits at the very top of the stack segment
        let bp = align_down(crate::bytecode::program::STACK_TOP - func.frame_size, 8);
        if bp < self.memory.stack_base() {
            return Err(self.fault_at(FaultKind::StackOverflow, entry_pos));
        }
        for ((offset, kind), arg) in func
            .param_offsets
            .iter()
            .zip(&func.param_kinds)
            .zip(args)
        {
            self.memory
                .store(bp + offset, *kind, *arg)
                .map_err(|e| self.mem_fault(e, entry_pos))?;
        }
        self.frames.push(Frame {
            ret_ip: usize::MAX,
            bp,
        });

        self.exec()
    }

    // ------------------------------------------------------------------
    // Fetch loop
    // ------------------------------------------------------------------

    fn exec(mut self) -> Result<Outcome, RunError> {
        loop {
            let pos = self.current_pos();
            self.steps += 1;
            if let Some(budget) = self.config.step_budget {
                if self.steps > budget {
                    return Err(self.fault_at(FaultKind::BudgetExceeded, pos));
                }
            }
            if self.stack.len() > self.config.max_operand_depth {
                return Err(self.fault_at(FaultKind::StackOverflow, pos));
            }

            let Some(op) = self.program.ops.get(self.ip).copied() else {
                return Err(RunError::BadProgram(format!(
                    "instruction pointer {} out of range",
                    self.ip
                )));
            };
            self.ip += 1;

            match op {
                Op::PushInt(n) => self.stack.push(Value::Int(n)),
                Op::Const(n) => {
                    let value = match self.program.pool.get(n as usize) {
                        Some(Const::Float(f)) => Value::Float(*f),
                        Some(Const::Str(addr)) => Value::Ptr(*addr),
                        None => {
                            return Err(RunError::BadProgram(format!(
                                "constant index {} out of range",
                                n
                            )));
                        }
                    };
                    self.stack.push(value);
                }

                Op::Dup => {
                    let a = self.pop()?;
                    self.stack.push(a);
                    self.stack.push(a);
                }
                Op::Drop => {
                    self.pop()?;
                }
                Op::Swap => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.stack.push(b);
                    self.stack.push(a);
                }
                Op::Over => {
                    let b = self.pop()?;
                    let a = self.pop()?;
                    self.stack.push(a);
                    self.stack.push(b);
                    self.stack.push(a);
                }

                Op::LocalAddr(offset) => {
                    let bp = self.frame()?.bp;
                    self.stack.push(Value::Ptr(bp + offset));
                }
                Op::GlobalAddr(offset) => {
                    self.stack.push(Value::Ptr(DATA_BASE + offset));
                }
                Op::Load(kind) => {
                    let addr = self.pop_addr()?;
                    let value = self
                        .memory
                        .load(addr, kind)
                        .map_err(|e| self.mem_fault(e, pos))?;
                    self.stack.push(value);
                }
                Op::Store(kind) => {
                    let value = self.pop()?;
                    let addr = self.pop_addr()?;
                    self.memory
                        .store(addr, kind, value)
                        .map_err(|e| self.mem_fault(e, pos))?;
                    // the assignment's value is the stored (width-adjusted)
                    // scalar
                    let stored = self
                        .memory
                        .load(addr, kind)
                        .map_err(|e| self.mem_fault(e, pos))?;
                    self.stack.push(stored);
                }
                Op::MemCopy(len) => {
                    let src = self.pop_addr()?;
                    let dst = self.pop_addr()?;
                    self.memory
                        .copy(dst, src, len)
                        .map_err(|e| self.mem_fault(e, pos))?;
                    self.stack.push(Value::Ptr(dst));
                }

                Op::Add => self.binary(pos, BinKind::Add)?,
                Op::Sub => self.binary(pos, BinKind::Sub)?,
                Op::Mul => self.binary(pos, BinKind::Mul)?,
                Op::Div => self.binary(pos, BinKind::Div)?,
                Op::DivU => self.binary(pos, BinKind::DivU)?,
                Op::Mod => self.binary(pos, BinKind::Mod)?,
                Op::ModU => self.binary(pos, BinKind::ModU)?,
                Op::BitAnd => self.int_binary(|a, b| a & b)?,
                Op::BitOr => self.int_binary(|a, b| a | b)?,
                Op::BitXor => self.int_binary(|a, b| a ^ b)?,
                Op::Shl => self.int_binary(|a, b| a.wrapping_shl(b as u32 & 63))?,
                Op::Shr => self.int_binary(|a, b| a.wrapping_shr(b as u32 & 63))?,
                Op::ShrU => {
                    self.int_binary(|a, b| ((a as u64).wrapping_shr(b as u32 & 63)) as i64)?
                }

                Op::Neg => {
                    let v = self.pop()?;
                    let out = match v {
                        Value::Int(n) => Value::Int(n.wrapping_neg()),
                        Value::Float(f) => Value::Float(-f),
                        Value::Ptr(_) => {
                            return Err(RunError::BadProgram(
                                "negation of a pointer".to_string(),
                            ));
                        }
                    };
                    self.stack.push(out);
                }
                Op::BitNot => {
                    let n = self.pop_int()?;
                    self.stack.push(Value::Int(!n));
                }
                Op::Not => {
                    let v = self.pop()?;
                    self.stack.push(Value::Int(if v.is_truthy() { 0 } else { 1 }));
                }

                Op::Eq => self.compare(|o| o == std::cmp::Ordering::Equal)?,
                Op::Ne => self.compare(|o| o != std::cmp::Ordering::Equal)?,
                Op::Lt => self.compare(|o| o == std::cmp::Ordering::Less)?,
                Op::Gt => self.compare(|o| o == std::cmp::Ordering::Greater)?,
                Op::Le => self.compare(|o| o != std::cmp::Ordering::Greater)?,
                Op::Ge => self.compare(|o| o != std::cmp::Ordering::Less)?,
                Op::LtU => self.compare_u(|a, b| a < b)?,
                Op::GtU => self.compare_u(|a, b| a > b)?,
                Op::LeU => self.compare_u(|a, b| a <= b)?,
                Op::GeU => self.compare_u(|a, b| a >= b)?,

                Op::Cast(kind) => {
                    let v = self.pop()?;
                    let out = cast_value(v, kind)
                        .ok_or_else(|| {
                            RunError::BadProgram(format!(
                                "cannot cast {} to {:?}",
                                v.type_name(),
                                kind
                            ))
                        })?;
                    self.stack.push(out);
                }

                Op::Jump(offset) => self.jump(offset)?,
                Op::JumpIfZero(offset) => {
                    let v = self.pop()?;
                    if !v.is_truthy() {
                        self.jump(offset)?;
                    }
                }
                Op::JumpIfNotZero(offset) => {
                    let v = self.pop()?;
                    if v.is_truthy() {
                        self.jump(offset)?;
                    }
                }

                Op::Call(n) => self.call(n, pos)?,
                Op::CallBuiltin(builtin) => self.call_builtin(builtin, pos)?,
                Op::Ret => {
                    let frame = self.frames.pop().ok_or_else(|| {
                        RunError::BadProgram("return with no open frame".to_string())
                    })?;
                    if self.frames.is_empty() {
                        let value = self.pop()?;
                        return Ok(Outcome {
                            value,
                            output: self.output,
                            steps: self.steps,
                        });
                    }
                    self.ip = frame.ret_ip;
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Calls
    // ------------------------------------------------------------------

    fn call(&mut self, index: u32, pos: Pos) -> Result<(), RunError> {
        let func = self.program.funcs.get(index as usize).ok_or_else(|| {
            RunError::BadProgram(format!("call to unknown function {}", index))
        })?;
        if self.frames.len() >= self.config.max_call_depth {
            return Err(self.fault_at(FaultKind::StackOverflow, pos));
        }

        let argc = func.param_kinds.len();
        if self.stack.len() < argc {
            return Err(RunError::BadProgram("call with missing arguments".to_string()));
        }
        let args = self.stack.split_off(self.stack.len() - argc);

        let caller_bp = self.frame()?.bp;
        let new_bp = caller_bp
            .checked_sub(func.frame_size)
            .map(|a| align_down(a, 8))
            .ok_or_else(|| self.fault_at(FaultKind::StackOverflow, pos))?;
        if new_bp < self.memory.stack_base() {
            return Err(self.fault_at(FaultKind::StackOverflow, pos));
        }

        for ((offset, kind), arg) in func
            .param_offsets
            .iter()
            .zip(&func.param_kinds)
            .zip(&args)
        {
            self.memory
                .store(new_bp + offset, *kind, *arg)
                .map_err(|e| self.mem_fault(e, pos))?;
        }

        self.frames.push(Frame {
            ret_ip: self.ip,
            bp: new_bp,
        });
        self.ip = func.entry as usize;
        Ok(())
    }

    fn call_builtin(&mut self, builtin: Builtin, pos: Pos) -> Result<(), RunError> {
        match builtin {
            Builtin::Malloc => {
                let size = self.pop_int()?;
                let addr = if (0..=u32::MAX as i64).contains(&size) {
                    self.memory.malloc(size as u32)
                } else {
                    0
                };
                self.stack.push(Value::Ptr(addr));
            }
            Builtin::Free => {
                let addr = self.pop_addr()?;
                self.memory.free(addr).map_err(|e| self.mem_fault(e, pos))?;
                self.stack.push(Value::Int(0));
            }
            Builtin::Memcpy => {
                let len = self.pop_int()?;
                let src = self.pop_addr()?;
                let dst = self.pop_addr()?;
                if !(0..=u32::MAX as i64).contains(&len) {
                    return Err(self.fault_at(FaultKind::OutOfBounds, pos));
                }
                self.memory
                    .copy(dst, src, len as u32)
                    .map_err(|e| self.mem_fault(e, pos))?;
                self.stack.push(Value::Ptr(dst));
            }
            Builtin::Putchar => {
                let n = self.pop_int()?;
                self.output.push((n as u8) as char);
                self.stack.push(Value::Int(n));
            }
            Builtin::Puts => {
                let addr = self.pop_addr()?;
                let bytes = self
                    .memory
                    .read_cstr(addr)
                    .map_err(|e| self.mem_fault(e, pos))?;
                self.output.push_str(&String::from_utf8_lossy(&bytes));
                self.output.push('\n');
                self.stack.push(Value::Int(0));
            }
            Builtin::PrintInt => {
                let n = self.pop_int()?;
                self.output.push_str(&n.to_string());
                self.stack.push(Value::Int(0));
            }
        }
        Ok(())
    }

    // ------------------------------------------------------------------
    // Arithmetic
    // ------------------------------------------------------------------

    fn binary(&mut self, pos: Pos, kind: BinKind) -> Result<(), RunError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let out = match (a, b) {
            (Value::Int(x), Value::Int(y)) => match kind {
                BinKind::Add => Value::Int(x.wrapping_add(y)),
                BinKind::Sub => Value::Int(x.wrapping_sub(y)),
                BinKind::Mul => Value::Int(x.wrapping_mul(y)),
                BinKind::Div => {
                    if y == 0 {
                        return Err(self.fault_at(FaultKind::DivideByZero, pos));
                    }
                    Value::Int(x.wrapping_div(y))
                }
                BinKind::Mod => {
                    if y == 0 {
                        return Err(self.fault_at(FaultKind::DivideByZero, pos));
                    }
                    Value::Int(x.wrapping_rem(y))
                }
                BinKind::DivU => {
                    if y == 0 {
                        return Err(self.fault_at(FaultKind::DivideByZero, pos));
                    }
                    Value::Int(((x as u64) / (y as u64)) as i64)
                }
                BinKind::ModU => {
                    if y == 0 {
                        return Err(self.fault_at(FaultKind::DivideByZero, pos));
                    }
                    Value::Int(((x as u64) % (y as u64)) as i64)
                }
            },
            // IEEE semantics for floats: dividing by zero yields an
            // infinity or NaN, never a fault
            (Value::Float(x), Value::Float(y)) => float_binary(x, y, kind)
                .ok_or_else(|| RunError::BadProgram("float modulo".to_string()))?,
            (Value::Int(x), Value::Float(y)) => float_binary(x as f64, y, kind)
                .ok_or_else(|| RunError::BadProgram("float modulo".to_string()))?,
            (Value::Float(x), Value::Int(y)) => float_binary(x, y as f64, kind)
                .ok_or_else(|| RunError::BadProgram("float modulo".to_string()))?,

            (Value::Ptr(p), Value::Int(n)) if kind == BinKind::Add => {
                Value::Ptr(p.wrapping_add(n as u32))
            }
            (Value::Ptr(p), Value::Int(n)) if kind == BinKind::Sub => {
                Value::Ptr(p.wrapping_sub(n as u32))
            }
            (Value::Int(n), Value::Ptr(p)) if kind == BinKind::Add => {
                Value::Ptr(p.wrapping_add(n as u32))
            }
            (Value::Ptr(p), Value::Ptr(q)) if kind == BinKind::Sub => {
                Value::Int(p as i64 - q as i64)
            }
            (a, b) => {
                return Err(RunError::BadProgram(format!(
                    "invalid operands {} and {}",
                    a.type_name(),
                    b.type_name()
                )));
            }
        };
        self.stack.push(out);
        Ok(())
    }

    fn int_binary(&mut self, f: impl Fn(i64, i64) -> i64) -> Result<(), RunError> {
        let b = self.pop_int()?;
        let a = self.pop_int()?;
        self.stack.push(Value::Int(f(a, b)));
        Ok(())
    }

    fn compare(&mut self, f: impl Fn(std::cmp::Ordering) -> bool) -> Result<(), RunError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let ordering = match (a, b) {
            (Value::Int(x), Value::Int(y)) => x.cmp(&y),
            (Value::Ptr(x), Value::Ptr(y)) => x.cmp(&y),
            (Value::Ptr(x), Value::Int(y)) => (x as u64).cmp(&(y as u64)),
            (Value::Int(x), Value::Ptr(y)) => (x as u64).cmp(&(y as u64)),
            (x, y) => {
                // mixed float comparison; NaN compares unequal and
                // unordered comparisons come out false, as IEEE requires
                let xf = as_f64(x);
                let yf = as_f64(y);
                match xf.partial_cmp(&yf) {
                    Some(o) => o,
                    None => {
                        self.stack.push(Value::Int(0));
                        return Ok(());
                    }
                }
            }
        };
        self.stack.push(Value::Int(if f(ordering) { 1 } else { 0 }));
        Ok(())
    }

    fn compare_u(&mut self, f: impl Fn(u64, u64) -> bool) -> Result<(), RunError> {
        let b = self.pop()?;
        let a = self.pop()?;
        let to_u = |v: Value| match v {
            Value::Int(n) => n as u64,
            Value::Ptr(p) => p as u64,
            Value::Float(f) => f as u64,
        };
        let result = f(to_u(a), to_u(b));
        self.stack.push(Value::Int(if result { 1 } else { 0 }));
        Ok(())
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    fn jump(&mut self, offset: i32) -> Result<(), RunError> {
        // self.ip was already advanced past the jump
        let target = self.ip as i64 + offset as i64;
        if target < 0 || target as usize > self.program.ops.len() {
            return Err(RunError::BadProgram(format!(
                "jump target {} out of range",
                target
            )));
        }
        self.ip = target as usize;
        Ok(())
    }

    fn frame(&self) -> Result<&Frame, RunError> {
        self.frames
            .last()
            .ok_or_else(|| RunError::BadProgram("no open frame".to_string()))
    }

    fn pop(&mut self) -> Result<Value, RunError> {
        self.stack
            .pop()
            .ok_or_else(|| RunError::BadProgram("operand stack underflow".to_string()))
    }

    fn pop_int(&mut self) -> Result<i64, RunError> {
        match self.pop()? {
            Value::Int(n) => Ok(n),
            Value::Ptr(p) => Ok(p as i64),
            Value::Float(_) => Err(RunError::BadProgram(
                "expected an integer operand, got float".to_string(),
            )),
        }
    }

    fn pop_addr(&mut self) -> Result<u32, RunError> {
        match self.pop()? {
            Value::Ptr(p) => Ok(p),
            Value::Int(n) => Ok(n as u32),
            Value::Float(_) => Err(RunError::BadProgram(
                "expected an address operand, got float".to_string(),
            )),
        }
    }

    fn current_pos(&self) -> Pos {
        self.program
            .spans
            .get(self.ip)
            .copied()
            .unwrap_or(Pos::start())
    }

    fn fault_at(&self, kind: FaultKind, pos: Pos) -> RunError {
        RunError::Fault(RuntimeFault { kind, pos })
    }

    fn mem_fault(&self, err: MemError, pos: Pos) -> RunError {
        let kind = match err {
            MemError::Null => FaultKind::NullDereference,
            MemError::OutOfBounds => FaultKind::OutOfBounds,
        };
        self.fault_at(kind, pos)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinKind {
    Add,
    Sub,
    Mul,
    Div,
    DivU,
    Mod,
    ModU,
}

fn float_binary(x: f64, y: f64, kind: BinKind) -> Option<Value> {
    let out = match kind {
        BinKind::Add => x + y,
        BinKind::Sub => x - y,
        BinKind::Mul => x * y,
        BinKind::Div | BinKind::DivU => x / y,
        BinKind::Mod | BinKind::ModU => return None,
    };
    Some(Value::Float(out))
}

fn as_f64(v: Value) -> f64 {
    match v {
        Value::Int(n) => n as f64,
        Value::Float(f) => f,
        Value::Ptr(p) => p as f64,
    }
}

/// Adjust a value to the representable set of a scalar kind. Float to
/// int truncates toward zero and saturates, as `as` does.
fn cast_value(v: Value, kind: ScalarKind) -> Option<Value> {
    let out = match kind {
        ScalarKind::F64 => Value::Float(as_f64(v)),
        ScalarKind::F32 => Value::Float(as_f64(v) as f32 as f64),
        ScalarKind::Ptr => match v {
            Value::Ptr(p) => Value::Ptr(p),
            Value::Int(n) => Value::Ptr(n as u32),
            Value::Float(_) => return None,
        },
        _ => {
            let n = match v {
                Value::Int(n) => n,
                Value::Ptr(p) => p as i64,
                Value::Float(f) => f as i64,
            };
            Value::Int(wrap_int(n, kind))
        }
    };
    Some(out)
}

fn wrap_int(n: i64, kind: ScalarKind) -> i64 {
    match kind {
        ScalarKind::I8 => n as i8 as i64,
        ScalarKind::U8 => n as u8 as i64,
        ScalarKind::I16 => n as i16 as i64,
        ScalarKind::U16 => n as u16 as i64,
        ScalarKind::I32 => n as i32 as i64,
        ScalarKind::U32 => n as u32 as i64,
        _ => n,
    }
}

fn align_down(n: u32, align: u32) -> u32 {
    n & !(align - 1)
}

/// Whether a host value can initialize a parameter of the given width.
fn marshals(v: Value, kind: ScalarKind) -> bool {
    match kind {
        ScalarKind::F32 | ScalarKind::F64 => matches!(v, Value::Float(_)),
        ScalarKind::Ptr => matches!(v, Value::Ptr(_) | Value::Int(0)),
        _ => matches!(v, Value::Int(_)),
    }
}

fn kind_class(kind: ScalarKind) -> &'static str {
    match kind {
        ScalarKind::F32 | ScalarKind::F64 => "float",
        ScalarKind::Ptr => "pointer",
        _ => "int",
    }
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

    fn run_main(source: &str) -> Result<Outcome, RunError> {
        let program = compile_src(source);
        Vm::new(&program).run("main", &[])
    }

    fn main_value(source: &str) -> Value {
        run_main(source).expect("run succeeds").value
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(main_value("int main() { return 2 + 3 * 4; }"), Value::Int(14));
        assert_eq!(main_value("int main() { return (2 + 3) * 4; }"), Value::Int(20));
        assert_eq!(main_value("int main() { return 7 % 3 - 10 / 4; }"), Value::Int(-1));
    }

    #[test]
    fn test_divide_by_zero_faults_with_position() {
        let err = run_main("int main() { return 1 / 0; }").unwrap_err();
        let RunError::Fault(fault) = err else {
            panic!("expected fault, got {:?}", err)
        };
        assert_eq!(fault.kind, FaultKind::DivideByZero);
        assert_eq!(fault.pos.line, 1);
        assert_eq!(fault.pos.col, 23);
    }

    #[test]
    fn test_float_division_never_faults() {
        let program = compile_src("double main() { return 1.0 / 0.0; }");
        let outcome = Vm::new(&program).run("main", &[]).expect("no fault");
        assert_eq!(outcome.value, Value::Float(f64::INFINITY));
    }

    #[test]
    fn test_locals_and_control_flow() {
        let source = "int main() {
            int total;
            int i;
            total = 0;
            for (i = 1; i <= 10; i++) total += i;
            return total;
        }";
        assert_eq!(main_value(source), Value::Int(55));
    }

    #[test]
    fn test_recursion() {
        let source = "int fib(int n) { if (n < 2) return n; return fib(n - 1) + fib(n - 2); }
                      int main() { return fib(15); }";
        assert_eq!(main_value(source), Value::Int(610));
    }

    #[test]
    fn test_entry_with_arguments() {
        let program = compile_src("int add(int a, int b) { return a + b; }");
        let outcome = Vm::new(&program)
            .run("add", &[Value::Int(30), Value::Int(12)])
            .expect("runs");
        assert_eq!(outcome.value, Value::Int(42));
    }

    #[test]
    fn test_unknown_entry() {
        let program = compile_src("int main() { return 0; }");
        let err = Vm::new(&program).run("start", &[]).unwrap_err();
        assert!(matches!(err, RunError::UnknownEntry(name) if name == "start"));
    }

    #[test]
    fn test_arity_and_type_mismatch() {
        let program = compile_src("int add(int a, int b) { return a + b; }");
        assert!(matches!(
            Vm::new(&program).run("add", &[Value::Int(1)]).unwrap_err(),
            RunError::ArityMismatch { expected: 2, got: 1, .. }
        ));
        assert!(matches!(
            Vm::new(&program)
                .run("add", &[Value::Int(1), Value::Float(2.0)])
                .unwrap_err(),
            RunError::ArgType { index: 1, .. }
        ));
    }

    #[test]
    fn test_budget_exceeded() {
        let program = compile_src("int main() { while (1) {} return 0; }");
        let config = VmConfig {
            step_budget: Some(10_000),
            ..VmConfig::default()
        };
        let err = Vm::with_config(&program, config).run("main", &[]).unwrap_err();
        let RunError::Fault(fault) = err else { panic!("expected fault") };
        assert_eq!(fault.kind, FaultKind::BudgetExceeded);
    }

    #[test]
    fn test_infinite_recursion_overflows() {
        let program = compile_src("int f() { return f(); } int main() { return f(); }");
        let err = Vm::new(&program).run("main", &[]).unwrap_err();
        let RunError::Fault(fault) = err else { panic!("expected fault") };
        assert_eq!(fault.kind, FaultKind::StackOverflow);
    }

    #[test]
    fn test_null_dereference() {
        let program = compile_src("int main() { int *p; p = 0; return *p; }");
        let err = Vm::new(&program).run("main", &[]).unwrap_err();
        let RunError::Fault(fault) = err else { panic!("expected fault") };
        assert_eq!(fault.kind, FaultKind::NullDereference);
    }

    #[test]
    fn test_wild_pointer_is_out_of_bounds() {
        let program = compile_src(
            "int main() { long n; int *p; n = 99999999; p = (int *)n; return *p; }",
        );
        let err = Vm::new(&program).run("main", &[]).unwrap_err();
        let RunError::Fault(fault) = err else { panic!("expected fault") };
        assert_eq!(fault.kind, FaultKind::OutOfBounds);
    }

    #[test]
    fn test_output_captured() {
        let outcome = run_main(
            r#"int main() { puts("hello"); putchar(33); print_int(7); return 0; }"#,
        )
        .expect("runs");
        assert_eq!(outcome.output, "hello\n!7");
    }

    #[test]
    fn test_same_program_two_vms() {
        let program = compile_src("int g; int main() { g = g + 1; return g; }");
        let a = Vm::new(&program).run("main", &[]).expect("first run");
        let b = Vm::new(&program).run("main", &[]).expect("second run");
        // globals reset per invocation; the program stays read-only
        assert_eq!(a.value, Value::Int(1));
        assert_eq!(b.value, Value::Int(1));
        assert_eq!(a.steps, b.steps);
    }

    #[test]
    fn test_heap_roundtrip() {
        let source = "int main() {
            int *p;
            p = (int *)malloc(4 * sizeof(int));
            if (p == 0) return -1;
            p[0] = 10; p[1] = 20; p[2] = 30; p[3] = 40;
            int total;
            total = p[0] + p[1] + p[2] + p[3];
            free(p);
            return total;
        }";
        assert_eq!(main_value(source), Value::Int(100));
    }

    #[test]
    fn test_strings_and_pointers() {
        let source = r#"
            int length(char *s) {
                int n;
                n = 0;
                while (*s) { n++; s++; }
                return n;
            }
            int main() { return length("bytecode"); }
        "#;
        assert_eq!(main_value(source), Value::Int(8));
    }

    #[test]
    fn test_struct_field_access() {
        let source = "
            struct Point { int x; int y; };
            int main() {
                struct Point p;
                p.x = 3;
                p.y = 4;
                return p.x * p.x + p.y * p.y;
            }";
        assert_eq!(main_value(source), Value::Int(25));
    }

    #[test]
    fn test_float_arithmetic() {
        let source = "double main() { double a; a = 1.5; return a * 4.0 + 0.25; }";
        assert_eq!(main_value(source), Value::Float(6.25));
    }

    #[test]
    fn test_narrow_store_wraps() {
        let source = "int main() { char c; c = (char)300; return c; }";
        assert_eq!(main_value(source), Value::Int(44));
    }

    #[test]
    fn test_incdec_semantics() {
        let source = "int main() { int i; int a; i = 5; a = i++ * 10 + i; return a; }";
        // 5 * 10 + 6
        assert_eq!(main_value(source), Value::Int(56));
    }

    #[test]
    fn test_global_initializers() {
        let source = "long g = 1000000007; int main() { return (int)(g % 97); }";
        let program = compile_src(source);
        let outcome = Vm::new(&program).run("main", &[]).expect("runs");
        assert_eq!(outcome.value, Value::Int(1000000007 % 97));
    }
}
