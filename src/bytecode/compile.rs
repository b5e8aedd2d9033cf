use std::collections::HashMap;

use crate::ast::*;
use crate::bytecode::program::{Const, FuncInfo, Program, DATA_BASE};
use crate::bytecode::{Builtin, Op};
use crate::diag::CompileError;
use crate::sema::{Analysis, GlobalInit};
use crate::token::Pos;
use crate::types::{ScalarKind, StructTable, Type};

/// Lowers an analyzed unit to bytecode. Deterministic by construction:
/// declarations are walked in source order and every table is a vector, so
/// the same input always yields the identical instruction stream.
pub struct Compiler<'a> {
    analysis: &'a Analysis,
    ops: Vec<Op>,
    spans: Vec<Pos>,
    pool: Vec<Const>,
    funcs: Vec<FuncInfo>,
    data: Vec<u8>,
    globals_size: u32,
    /// Data-segment byte offset of each global, by table index.
    global_offsets: Vec<u32>,
    /// Frame byte offset of each local slot of the current function.
    local_offsets: Vec<u32>,
    /// First-insertion interning; addresses depend only on emission order.
    strings: HashMap<String, u32>,
    loops: Vec<LoopCtx>,
}

#[derive(Default)]
struct LoopCtx {
    breaks: Vec<usize>,
    continues: Vec<usize>,
}

pub fn compile_unit(unit: &Unit, analysis: &Analysis) -> Result<Program, CompileError> {
    let mut compiler = Compiler {
        analysis,
        ops: Vec::new(),
        spans: Vec::new(),
        pool: Vec::new(),
        funcs: Vec::new(),
        data: Vec::new(),
        globals_size: 0,
        global_offsets: Vec::new(),
        local_offsets: Vec::new(),
        strings: HashMap::new(),
        loops: Vec::new(),
    };
    compiler.layout_globals()?;
    compiler.write_global_inits()?;

    for decl in &unit.decls {
        if let Decl::Func(func) = decl {
            compiler.compile_func(func)?;
        }
    }

    Ok(Program {
        ops: compiler.ops,
        spans: compiler.spans,
        pool: compiler.pool,
        funcs: compiler.funcs,
        data: compiler.data,
        globals_size: compiler.globals_size,
    })
}

impl<'a> Compiler<'a> {
    fn structs(&self) -> &StructTable {
        &self.analysis.structs
    }

    fn internal(message: impl Into<String>) -> CompileError {
        CompileError::Internal(message.into())
    }

    fn scalar_kind(ty: &Type) -> Result<ScalarKind, CompileError> {
        ty.decay()
            .scalar_kind()
            .ok_or_else(|| Self::internal(format!("no scalar access class for '{}'", ty)))
    }

    fn expr_ty(expr: &Expr) -> Result<&Type, CompileError> {
        expr.ty
            .as_ref()
            .ok_or_else(|| Self::internal("expression left untyped by analysis"))
    }

    // ------------------------------------------------------------------
    // Data segment
    // ------------------------------------------------------------------

    fn layout_globals(&mut self) -> Result<(), CompileError> {
        let mut offset = 0u32;
        for global in &self.analysis.globals {
            let align = global.ty.align(self.structs());
            offset = align_to(offset, align);
            self.global_offsets.push(offset);
            offset += global.ty.size(self.structs());
        }
        self.globals_size = align_to(offset, 8);
        self.data = vec![0u8; self.globals_size as usize];
        Ok(())
    }

    fn write_global_inits(&mut self) -> Result<(), CompileError> {
        for index in 0..self.analysis.globals.len() {
            let global = &self.analysis.globals[index];
            let Some(init) = global.init.clone() else {
                continue;
            };
            let offset = self.global_offsets[index] as usize;
            let size = global.ty.size(self.structs()) as usize;
            match init {
                GlobalInit::Int(value) => {
                    let bytes = value.to_le_bytes();
                    self.data[offset..offset + size].copy_from_slice(&bytes[..size]);
                }
                GlobalInit::Float(value) => match size {
                    4 => self.data[offset..offset + 4]
                        .copy_from_slice(&(value as f32).to_le_bytes()),
                    _ => self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes()),
                },
                GlobalInit::Str(text) => {
                    let addr = self.intern_string(&text);
                    self.data[offset..offset + 8].copy_from_slice(&(addr as u64).to_le_bytes());
                }
            }
        }
        Ok(())
    }

    /// Intern a string literal in the data segment, NUL-terminated, and
    /// return its absolute address.
    fn intern_string(&mut self, text: &str) -> u32 {
        if let Some(&addr) = self.strings.get(text) {
            return addr;
        }
        let addr = DATA_BASE + self.data.len() as u32;
        self.data.extend_from_slice(text.as_bytes());
        self.data.push(0);
        self.strings.insert(text.to_string(), addr);
        addr
    }

    // ------------------------------------------------------------------
    // Emission
    // ------------------------------------------------------------------

    fn emit(&mut self, op: Op, pos: Pos) -> usize {
        self.ops.push(op);
        self.spans.push(pos);
        self.ops.len() - 1
    }

    fn here(&self) -> usize {
        self.ops.len()
    }

    /// Back-patch a jump emitted earlier to land on `target`.
    fn patch_jump(&mut self, at: usize, target: usize) {
        let offset = target as i32 - (at as i32 + 1);
        match &mut self.ops[at] {
            Op::Jump(slot) | Op::JumpIfZero(slot) | Op::JumpIfNotZero(slot) => *slot = offset,
            other => unreachable!("patching non-jump {:?}", other),
        }
    }

    fn pool_const(&mut self, value: Const) -> u32 {
        if let Some(found) = self.pool.iter().position(|c| c == &value) {
            return found as u32;
        }
        self.pool.push(value);
        (self.pool.len() - 1) as u32
    }

    // ------------------------------------------------------------------
    // Functions
    // ------------------------------------------------------------------

    fn compile_func(&mut self, decl: &FuncDecl) -> Result<(), CompileError> {
        let index = self
            .analysis
            .funcs
            .iter()
            .position(|f| f.name == decl.name)
            .ok_or_else(|| Self::internal(format!("unknown function '{}'", decl.name)))?;
        let sig = &self.analysis.funcs[index];

        // Frame layout: every slot in declaration order, aligned for its
        // type, parameters first.
        self.local_offsets.clear();
        let mut offset = 0u32;
        for ty in &sig.locals {
            let align = ty.align(self.structs());
            offset = align_to(offset, align);
            self.local_offsets.push(offset);
            offset += ty.size(self.structs());
        }
        let frame_size = align_to(offset, 8);

        let param_count = sig.ty.params.len();
        let mut param_kinds = Vec::with_capacity(param_count);
        for ty in &sig.ty.params {
            param_kinds.push(Self::scalar_kind(ty)?);
        }
        let ret_kind = match &sig.ty.ret {
            Type::Void => None,
            ty => Some(Self::scalar_kind(ty)?),
        };

        self.funcs.push(FuncInfo {
            name: decl.name.clone(),
            entry: self.here() as u32,
            frame_size,
            param_offsets: self.local_offsets[..param_count].to_vec(),
            param_kinds,
            ret_kind,
        });

        self.compile_stmt(&decl.body)?;

        // Falling off the end returns zero.
        self.emit(Op::PushInt(0), decl.pos);
        self.emit(Op::Ret, decl.pos);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn compile_stmt(&mut self, stmt: &Stmt) -> Result<(), CompileError> {
        match &stmt.kind {
            StmtKind::Expr(expr) => {
                let pushes = self.rvalue(expr)?;
                if pushes {
                    self.emit(Op::Drop, expr.pos);
                }
            }
            StmtKind::Decl(decl) => self.compile_local_init(decl)?,
            StmtKind::StructDecl(_) | StmtKind::Empty => {}
            StmtKind::Block(stmts) => {
                for s in stmts {
                    self.compile_stmt(s)?;
                }
            }
            StmtKind::If { cond, then, els } => {
                self.rvalue(cond)?;
                let to_else = self.emit(Op::JumpIfZero(0), cond.pos);
                self.compile_stmt(then)?;
                match els {
                    Some(els) => {
                        let to_end = self.emit(Op::Jump(0), stmt.pos);
                        let else_start = self.here();
                        self.patch_jump(to_else, else_start);
                        self.compile_stmt(els)?;
                        let end = self.here();
                        self.patch_jump(to_end, end);
                    }
                    None => {
                        let end = self.here();
                        self.patch_jump(to_else, end);
                    }
                }
            }
            StmtKind::While { cond, body } => {
                let cond_start = self.here();
                self.rvalue(cond)?;
                let to_end = self.emit(Op::JumpIfZero(0), cond.pos);
                self.loops.push(LoopCtx::default());
                self.compile_stmt(body)?;
                let back = self.emit(Op::Jump(0), stmt.pos);
                self.patch_jump(back, cond_start);
                let end = self.here();
                self.patch_jump(to_end, end);
                self.close_loop(cond_start, end);
            }
            StmtKind::DoWhile { body, cond } => {
                let body_start = self.here();
                self.loops.push(LoopCtx::default());
                self.compile_stmt(body)?;
                let cond_start = self.here();
                self.rvalue(cond)?;
                let back = self.emit(Op::JumpIfNotZero(0), cond.pos);
                self.patch_jump(back, body_start);
                let end = self.here();
                self.close_loop(cond_start, end);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                if let Some(init) = init {
                    self.compile_stmt(init)?;
                }
                let cond_start = self.here();
                let to_end = match cond {
                    Some(cond) => {
                        self.rvalue(cond)?;
                        Some(self.emit(Op::JumpIfZero(0), cond.pos))
                    }
                    None => None,
                };
                self.loops.push(LoopCtx::default());
                self.compile_stmt(body)?;
                let step_start = self.here();
                if let Some(step) = step {
                    let pushes = self.rvalue(step)?;
                    if pushes {
                        self.emit(Op::Drop, step.pos);
                    }
                }
                let back = self.emit(Op::Jump(0), stmt.pos);
                self.patch_jump(back, cond_start);
                let end = self.here();
                if let Some(to_end) = to_end {
                    self.patch_jump(to_end, end);
                }
                self.close_loop(step_start, end);
            }
            StmtKind::Break => {
                let jump = self.emit(Op::Jump(0), stmt.pos);
                self.loops
                    .last_mut()
                    .ok_or_else(|| Self::internal("break outside loop survived analysis"))?
                    .breaks
                    .push(jump);
            }
            StmtKind::Continue => {
                let jump = self.emit(Op::Jump(0), stmt.pos);
                self.loops
                    .last_mut()
                    .ok_or_else(|| Self::internal("continue outside loop survived analysis"))?
                    .continues
                    .push(jump);
            }
            StmtKind::Return(value) => {
                match value {
                    Some(expr) => {
                        self.rvalue(expr)?;
                    }
                    None => {
                        self.emit(Op::PushInt(0), stmt.pos);
                    }
                }
                self.emit(Op::Ret, stmt.pos);
            }
        }
        Ok(())
    }

    fn close_loop(&mut self, continue_target: usize, break_target: usize) {
        let ctx = self.loops.pop().unwrap_or_default();
        for jump in ctx.continues {
            self.patch_jump(jump, continue_target);
        }
        for jump in ctx.breaks {
            self.patch_jump(jump, break_target);
        }
    }

    fn compile_local_init(&mut self, decl: &VarDecl) -> Result<(), CompileError> {
        let Some(init) = &decl.init else { return Ok(()) };
        let slot = decl
            .slot
            .ok_or_else(|| Self::internal("local without a slot survived analysis"))?;
        let offset = self.local_offsets[slot];
        self.emit(Op::LocalAddr(offset), decl.pos);

        let ty = Self::expr_ty(init)?.clone();
        if ty.is_aggregate() {
            let size = ty.size(self.structs());
            self.lvalue(init)?;
            self.emit(Op::MemCopy(size), decl.pos);
        } else {
            self.rvalue(init)?;
            let kind = Self::scalar_kind(Self::expr_ty(init)?)?;
            self.emit(Op::Store(kind), decl.pos);
        }
        self.emit(Op::Drop, decl.pos);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Emit code leaving the expression's value on the operand stack.
    /// Returns false for the two cases that push nothing: calls to void
    /// functions and casts to void.
    fn rvalue(&mut self, expr: &Expr) -> Result<bool, CompileError> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::IntLit(value) => {
                self.emit(Op::PushInt(*value), pos);
            }
            ExprKind::FloatLit(value) => {
                let index = self.pool_const(Const::Float(*value));
                self.emit(Op::Const(index), pos);
            }
            ExprKind::StrLit(text) => {
                let addr = self.intern_string(text);
                let index = self.pool_const(Const::Str(addr));
                self.emit(Op::Const(index), pos);
            }
            ExprKind::Ident { .. } | ExprKind::Member { .. } | ExprKind::Index { .. } => {
                let ty = Self::expr_ty(expr)?.clone();
                self.lvalue(expr)?;
                // arrays and structs are handled by address
                if !ty.is_aggregate() {
                    let kind = Self::scalar_kind(&ty)?;
                    self.emit(Op::Load(kind), pos);
                }
            }
            ExprKind::Deref(inner) => {
                let ty = Self::expr_ty(expr)?.clone();
                self.rvalue(inner)?;
                if !ty.is_aggregate() {
                    let kind = Self::scalar_kind(&ty)?;
                    self.emit(Op::Load(kind), pos);
                }
            }
            ExprKind::AddrOf(inner) => {
                self.lvalue(inner)?;
            }
            ExprKind::Unary { op, operand } => {
                self.rvalue(operand)?;
                let op = match op {
                    UnaryOp::Neg => Op::Neg,
                    UnaryOp::Not => Op::Not,
                    UnaryOp::BitNot => Op::BitNot,
                };
                self.emit(op, pos);
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.compile_binary(*op, lhs, rhs, pos)?;
            }
            ExprKind::Assign { op, target, value } => {
                self.compile_assign(op.as_ref().copied(), target, value, pos)?;
            }
            ExprKind::Cond { cond, then, els } => {
                self.rvalue(cond)?;
                let to_else = self.emit(Op::JumpIfZero(0), cond.pos);
                self.rvalue(then)?;
                let to_end = self.emit(Op::Jump(0), pos);
                let else_start = self.here();
                self.patch_jump(to_else, else_start);
                self.rvalue(els)?;
                let end = self.here();
                self.patch_jump(to_end, end);
            }
            ExprKind::Cast { expr: inner, .. } | ExprKind::ImplicitCast { expr: inner, .. } => {
                let to = Self::expr_ty(expr)?.clone();
                if to == Type::Void {
                    let pushes = self.rvalue(inner)?;
                    if pushes {
                        self.emit(Op::Drop, pos);
                    }
                    return Ok(false);
                }
                self.rvalue(inner)?;
                let from = Self::expr_ty(inner)?.decay();
                let from_kind = Self::scalar_kind(&from)?;
                let to_kind = Self::scalar_kind(&to)?;
                if from_kind != to_kind {
                    self.emit(Op::Cast(to_kind), pos);
                }
            }
            ExprKind::Call { name, target, args } => {
                for arg in args {
                    self.rvalue(arg)?;
                }
                let target = target
                    .ok_or_else(|| Self::internal(format!("unresolved call to '{}'", name)))?;
                let returns_value = match target {
                    CallTarget::Func(index) => {
                        self.emit(Op::Call(index as u32), pos);
                        self.analysis.funcs[index].ty.ret != Type::Void
                    }
                    CallTarget::Builtin(builtin) => {
                        self.emit(Op::CallBuiltin(builtin), pos);
                        builtin.signature().ret != Type::Void
                    }
                };
                if !returns_value {
                    self.emit(Op::Drop, pos);
                    return Ok(false);
                }
            }
            ExprKind::IncDec { op, target } => {
                self.compile_incdec(*op, target, pos)?;
            }
            ExprKind::SizeofType(_) | ExprKind::SizeofExpr(_) => {
                return Err(Self::internal("sizeof survived analysis unfolded"));
            }
        }
        Ok(true)
    }

    /// Emit code leaving the expression's address on the operand stack.
    fn lvalue(&mut self, expr: &Expr) -> Result<(), CompileError> {
        let pos = expr.pos;
        match &expr.kind {
            ExprKind::Ident { name, resolved } => match resolved {
                Some(Resolved::Local(slot)) => {
                    self.emit(Op::LocalAddr(self.local_offsets[*slot]), pos);
                    Ok(())
                }
                Some(Resolved::Global(index)) => {
                    self.emit(Op::GlobalAddr(self.global_offsets[*index]), pos);
                    Ok(())
                }
                _ => Err(Self::internal(format!("unresolved identifier '{}'", name))),
            },
            ExprKind::Deref(inner) => {
                self.rvalue(inner)?;
                Ok(())
            }
            ExprKind::Index { base, index } => {
                let elem = Self::expr_ty(expr)?.clone();
                self.rvalue(base)?;
                self.rvalue(index)?;
                let size = elem.size(self.structs());
                if size != 1 {
                    self.emit(Op::PushInt(size as i64), pos);
                    self.emit(Op::Mul, pos);
                }
                self.emit(Op::Add, pos);
                Ok(())
            }
            ExprKind::Member {
                base,
                arrow,
                offset,
                field,
            } => {
                if *arrow {
                    self.rvalue(base)?;
                } else {
                    self.lvalue(base)?;
                }
                let offset = offset
                    .ok_or_else(|| Self::internal(format!("unresolved field '{}'", field)))?;
                if offset != 0 {
                    self.emit(Op::PushInt(offset as i64), pos);
                    self.emit(Op::Add, pos);
                }
                Ok(())
            }
            // parenthesised and cast-free lvalues only; anything else was
            // rejected by the lvalue check in analysis
            other => Err(Self::internal(format!(
                "expression used as lvalue: {:?}",
                std::mem::discriminant(other)
            ))),
        }
    }

    fn compile_binary(
        &mut self,
        op: BinOp,
        lhs: &Expr,
        rhs: &Expr,
        pos: Pos,
    ) -> Result<(), CompileError> {
        match op {
            BinOp::LogAnd => {
                self.rvalue(lhs)?;
                let lhs_false = self.emit(Op::JumpIfZero(0), pos);
                self.rvalue(rhs)?;
                let rhs_false = self.emit(Op::JumpIfZero(0), pos);
                self.emit(Op::PushInt(1), pos);
                let to_end = self.emit(Op::Jump(0), pos);
                let false_at = self.here();
                self.patch_jump(lhs_false, false_at);
                self.patch_jump(rhs_false, false_at);
                self.emit(Op::PushInt(0), pos);
                let end = self.here();
                self.patch_jump(to_end, end);
                return Ok(());
            }
            BinOp::LogOr => {
                self.rvalue(lhs)?;
                let lhs_true = self.emit(Op::JumpIfNotZero(0), pos);
                self.rvalue(rhs)?;
                let rhs_true = self.emit(Op::JumpIfNotZero(0), pos);
                self.emit(Op::PushInt(0), pos);
                let to_end = self.emit(Op::Jump(0), pos);
                let true_at = self.here();
                self.patch_jump(lhs_true, true_at);
                self.patch_jump(rhs_true, true_at);
                self.emit(Op::PushInt(1), pos);
                let end = self.here();
                self.patch_jump(to_end, end);
                return Ok(());
            }
            _ => {}
        }

        let lty = Self::expr_ty(lhs)?.decay();
        let rty = Self::expr_ty(rhs)?.decay();

        // scaled pointer arithmetic
        if op == BinOp::Add || op == BinOp::Sub {
            match (lty.base(), rty.base()) {
                (Some(elem), None) => {
                    let size = elem.size(self.structs());
                    self.rvalue(lhs)?;
                    self.rvalue(rhs)?;
                    if size != 1 {
                        self.emit(Op::PushInt(size as i64), pos);
                        self.emit(Op::Mul, pos);
                    }
                    self.emit(if op == BinOp::Add { Op::Add } else { Op::Sub }, pos);
                    return Ok(());
                }
                (None, Some(elem)) => {
                    let size = elem.size(self.structs());
                    self.rvalue(lhs)?;
                    if size != 1 {
                        self.emit(Op::PushInt(size as i64), pos);
                        self.emit(Op::Mul, pos);
                    }
                    self.rvalue(rhs)?;
                    self.emit(Op::Add, pos);
                    return Ok(());
                }
                (Some(elem), Some(_)) => {
                    // pointer difference, in elements
                    let size = elem.size(self.structs());
                    self.rvalue(lhs)?;
                    self.rvalue(rhs)?;
                    self.emit(Op::Sub, pos);
                    if size != 1 {
                        self.emit(Op::PushInt(size as i64), pos);
                        self.emit(Op::Div, pos);
                    }
                    return Ok(());
                }
                (None, None) => {}
            }
        }

        self.rvalue(lhs)?;
        self.rvalue(rhs)?;
        let unsigned = matches!(lty, Type::Int { unsigned: true, .. });
        self.emit(select_binop(op, unsigned), pos);
        Ok(())
    }

    fn compile_assign(
        &mut self,
        op: Option<BinOp>,
        target: &Expr,
        value: &Expr,
        pos: Pos,
    ) -> Result<(), CompileError> {
        let tty = Self::expr_ty(target)?.clone();

        if tty.is_aggregate() {
            let size = tty.size(self.structs());
            self.lvalue(target)?;
            self.lvalue(value)?;
            self.emit(Op::MemCopy(size), pos);
            return Ok(());
        }

        let kind = Self::scalar_kind(&tty)?;

        let Some(op) = op else {
            self.lvalue(target)?;
            self.rvalue(value)?;
            self.emit(Op::Store(kind), pos);
            return Ok(());
        };

        // compound assignment: evaluate the target address once
        self.lvalue(target)?;
        self.emit(Op::Dup, pos);
        self.emit(Op::Load(kind), pos);

        if tty.is_pointer() && matches!(op, BinOp::Add | BinOp::Sub) {
            let size = tty
                .base()
                .map(|elem| elem.size(self.structs()))
                .unwrap_or(1);
            self.rvalue(value)?;
            if size != 1 {
                self.emit(Op::PushInt(size as i64), pos);
                self.emit(Op::Mul, pos);
            }
            self.emit(if op == BinOp::Add { Op::Add } else { Op::Sub }, pos);
        } else {
            // arithmetic happens at the common type, then the store
            // narrows back to the target
            let vty = Self::expr_ty(value)?.decay();
            let common = crate::types::common_type(&tty, &vty);
            let common_kind = Self::scalar_kind(&common)?;
            if common_kind != kind {
                self.emit(Op::Cast(common_kind), pos);
            }
            self.rvalue(value)?;
            let unsigned = matches!(common, Type::Int { unsigned: true, .. });
            self.emit(select_binop(op, unsigned), pos);
            if common_kind != kind {
                self.emit(Op::Cast(kind), pos);
            }
        }
        self.emit(Op::Store(kind), pos);
        Ok(())
    }

    fn compile_incdec(&mut self, op: IncDecOp, target: &Expr, pos: Pos) -> Result<(), CompileError> {
        let tty = Self::expr_ty(target)?.clone();
        let kind = Self::scalar_kind(&tty)?;
        let delta = match tty.base() {
            Some(elem) => elem.size(self.structs()) as i64,
            None => 1,
        };
        let arith = match op {
            IncDecOp::PreInc | IncDecOp::PostInc => Op::Add,
            IncDecOp::PreDec | IncDecOp::PostDec => Op::Sub,
        };

        self.lvalue(target)?;
        self.emit(Op::Dup, pos);
        self.emit(Op::Load(kind), pos);
        match op {
            IncDecOp::PreInc | IncDecOp::PreDec => {
                // [addr old] -> new stored, new on stack
                self.emit(Op::PushInt(delta), pos);
                self.emit(arith, pos);
                self.emit(Op::Store(kind), pos);
            }
            IncDecOp::PostInc | IncDecOp::PostDec => {
                // [addr old] -> new stored, old on stack
                self.emit(Op::Swap, pos);
                self.emit(Op::Over, pos);
                self.emit(Op::PushInt(delta), pos);
                self.emit(arith, pos);
                self.emit(Op::Store(kind), pos);
                self.emit(Op::Drop, pos);
            }
        }
        Ok(())
    }
}

fn align_to(n: u32, align: u32) -> u32 {
    (n + align - 1) / align * align
}

fn select_binop(op: BinOp, unsigned: bool) -> Op {
    match op {
        BinOp::Add => Op::Add,
        BinOp::Sub => Op::Sub,
        BinOp::Mul => Op::Mul,
        BinOp::Div => {
            if unsigned {
                Op::DivU
            } else {
                Op::Div
            }
        }
        BinOp::Mod => {
            if unsigned {
                Op::ModU
            } else {
                Op::Mod
            }
        }
        BinOp::BitAnd => Op::BitAnd,
        BinOp::BitOr => Op::BitOr,
        BinOp::BitXor => Op::BitXor,
        BinOp::Shl => Op::Shl,
        BinOp::Shr => {
            if unsigned {
                Op::ShrU
            } else {
                Op::Shr
            }
        }
        BinOp::Eq => Op::Eq,
        BinOp::Ne => Op::Ne,
        BinOp::Lt => {
            if unsigned {
                Op::LtU
            } else {
                Op::Lt
            }
        }
        BinOp::Gt => {
            if unsigned {
                Op::GtU
            } else {
                Op::Gt
            }
        }
        BinOp::Le => {
            if unsigned {
                Op::LeU
            } else {
                Op::Le
            }
        }
        BinOp::Ge => {
            if unsigned {
                Op::GeU
            } else {
                Op::Ge
            }
        }
        BinOp::LogAnd | BinOp::LogOr => unreachable!("short-circuit ops lower to jumps"),
    }
}
