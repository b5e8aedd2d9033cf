use std::collections::HashMap;

use crate::ast::*;
use crate::bytecode::Builtin;
use crate::diag::Diagnostic;
use crate::token::Pos;
use crate::types::{
    common_type, integer_promotion, Field, FuncType, StructDef, StructId, StructTable, Type,
};

/// Sentinel size marking a struct whose definition is still being
/// processed, so `struct List { struct List x; }` is caught while
/// `struct List { struct List *next; }` is allowed.
const INCOMPLETE: u32 = u32::MAX;

/// A global variable after analysis: resolved type plus folded initializer.
#[derive(Debug, Clone)]
pub struct GlobalInfo {
    pub name: String,
    pub ty: Type,
    pub init: Option<GlobalInit>,
    pub pos: Pos,
}

/// Folded global initializer. Anything else is rejected; globals must be
/// initialized with compile-time constants.
#[derive(Debug, Clone)]
pub enum GlobalInit {
    Int(i64),
    Float(f64),
    Str(String),
}

/// A function signature plus the slot layout of its frame. `locals` lists
/// the type of every slot in declaration order; parameters occupy the
/// first `ty.params.len()` slots.
#[derive(Debug, Clone)]
pub struct FuncSig {
    pub name: String,
    pub ty: FuncType,
    pub locals: Vec<Type>,
    pub pos: Pos,
}

/// Analyzer output consumed by the code generator. The AST itself is
/// annotated in place: every expression carries a type, every name a
/// resolved index, every member access an offset.
#[derive(Debug, Clone, Default)]
pub struct Analysis {
    pub structs: StructTable,
    pub globals: Vec<GlobalInfo>,
    pub funcs: Vec<FuncSig>,
}

struct Scope {
    /// name -> (resolved index, declared type)
    vars: HashMap<String, (Resolved, Type)>,
    /// struct/union tag -> id
    tags: HashMap<String, StructId>,
}

impl Scope {
    fn new() -> Self {
        Scope {
            vars: HashMap::new(),
            tags: HashMap::new(),
        }
    }
}

struct Analyzer {
    structs: StructTable,
    globals: Vec<GlobalInfo>,
    funcs: Vec<FuncSig>,
    scopes: Vec<Scope>,
    /// Slot types of the function currently being checked.
    locals: Vec<Type>,
    current_ret: Type,
    loop_depth: u32,
    diags: Vec<Diagnostic>,
}

/// Type-check and annotate a parsed unit. Errors are batched; the walk
/// keeps going after each one, using `Type::Error` to suppress follow-on
/// complaints about already-reported subexpressions.
pub fn analyze(unit: &mut Unit) -> Result<Analysis, Vec<Diagnostic>> {
    let mut a = Analyzer {
        structs: StructTable::default(),
        globals: Vec::new(),
        funcs: Vec::new(),
        scopes: vec![Scope::new()],
        locals: Vec::new(),
        current_ret: Type::Void,
        loop_depth: 0,
        diags: Vec::new(),
    };
    a.run(unit);

    if a.diags.is_empty() {
        Ok(Analysis {
            structs: a.structs,
            globals: a.globals,
            funcs: a.funcs,
        })
    } else {
        Err(a.diags)
    }
}

impl Analyzer {
    fn run(&mut self, unit: &mut Unit) {
        // Pass 1: bind every top-level name first so functions can call
        // forward and mutually recurse without prototypes.
        for decl in unit.decls.iter_mut() {
            match decl {
                Decl::Struct(s) => self.define_struct(s),
                Decl::Global(g) => self.declare_global(g),
                Decl::Func(f) => self.declare_func(f),
            }
        }

        // Pass 2: check bodies and fold global initializers.
        for decl in unit.decls.iter_mut() {
            match decl {
                Decl::Struct(_) => {}
                Decl::Global(g) => self.check_global_init(g),
                Decl::Func(f) => {
                    // a rejected redefinition never made it into the table;
                    // only the defining declaration's body is checked, so
                    // its parameter list always matches the stored signature
                    let index = self
                        .funcs
                        .iter()
                        .position(|s| s.name == f.name && s.pos == f.pos);
                    if let Some(index) = index {
                        self.check_func(f, index);
                    }
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Diagnostics and scope plumbing
    // ------------------------------------------------------------------

    fn error(&mut self, message: impl Into<String>, pos: Pos) {
        self.diags.push(Diagnostic::semantic(message, pos));
    }

    fn scope(&mut self) -> &mut Scope {
        self.scopes.last_mut().unwrap()
    }

    fn push_scope(&mut self) {
        self.scopes.push(Scope::new());
    }

    fn pop_scope(&mut self) {
        self.scopes.pop();
    }

    fn lookup_var(&self, name: &str) -> Option<(Resolved, Type)> {
        for scope in self.scopes.iter().rev() {
            if let Some(found) = scope.vars.get(name) {
                return Some(found.clone());
            }
        }
        None
    }

    fn lookup_tag(&self, name: &str) -> Option<StructId> {
        for scope in self.scopes.iter().rev() {
            if let Some(&id) = scope.tags.get(name) {
                return Some(id);
            }
        }
        None
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn define_struct(&mut self, decl: &StructDecl) {
        if self.scope().tags.contains_key(&decl.name) {
            self.error(
                format!("redefinition of '{} {}'", tag_word(decl.is_union), decl.name),
                decl.pos,
            );
            return;
        }

        // Register the tag before resolving fields so self-referential
        // pointer fields find it.
        let id = self.structs.defs.len();
        self.structs.defs.push(StructDef {
            name: decl.name.clone(),
            is_union: decl.is_union,
            fields: Vec::new(),
            size: INCOMPLETE,
            align: 1,
        });
        self.scope().tags.insert(decl.name.clone(), id);

        let mut fields: Vec<Field> = Vec::new();
        let mut offset = 0u32;
        let mut size = 0u32;
        let mut align = 1u32;

        for field in &decl.fields {
            let ty = self.resolve_type(&field.ty);
            if let Type::Struct(inner) = &ty {
                if self.structs.get(*inner).size == INCOMPLETE {
                    self.error(
                        format!("field '{}' has incomplete type", field.name),
                        field.pos,
                    );
                    continue;
                }
            }
            if ty == Type::Void {
                self.error(format!("field '{}' has type void", field.name), field.pos);
                continue;
            }
            if fields.iter().any(|f| f.name == field.name) {
                self.error(format!("duplicate field '{}'", field.name), field.pos);
                continue;
            }

            let fsize = ty.size(&self.structs);
            let falign = ty.align(&self.structs);
            align = align.max(falign);

            let foffset = if decl.is_union {
                size = size.max(fsize);
                0
            } else {
                offset = align_to(offset, falign);
                let at = offset;
                offset += fsize;
                size = offset;
                at
            };

            fields.push(Field {
                name: field.name.clone(),
                ty,
                offset: foffset,
            });
        }

        let def = &mut self.structs.defs[id];
        def.fields = fields;
        def.align = align;
        def.size = align_to(size.max(1), align);
    }

    fn declare_global(&mut self, decl: &mut VarDecl) {
        let ty = self.resolve_type(&decl.ty);
        if ty == Type::Void {
            self.error(format!("variable '{}' has type void", decl.name), decl.pos);
            return;
        }
        if self.scope().vars.contains_key(&decl.name) {
            self.error(format!("redefinition of '{}'", decl.name), decl.pos);
            return;
        }

        let index = self.globals.len();
        decl.slot = Some(index);
        self.scope()
            .vars
            .insert(decl.name.clone(), (Resolved::Global(index), ty.clone()));
        self.globals.push(GlobalInfo {
            name: decl.name.clone(),
            ty,
            init: None,
            pos: decl.pos,
        });
    }

    fn declare_func(&mut self, decl: &FuncDecl) {
        let ret = self.resolve_type(&decl.ret);
        if ret.is_aggregate() {
            self.error(
                format!(
                    "function '{}' returns a struct by value; return a pointer instead",
                    decl.name
                ),
                decl.pos,
            );
        }

        let mut params = Vec::new();
        for param in &decl.params {
            let ty = self.resolve_type(&param.ty);
            if ty.is_aggregate() {
                self.error(
                    format!(
                        "parameter '{}' is a struct passed by value; pass a pointer instead",
                        param.name
                    ),
                    param.pos,
                );
                params.push(Type::Error);
                continue;
            }
            if ty == Type::Void {
                self.error(
                    format!("parameter '{}' has type void", param.name),
                    param.pos,
                );
                params.push(Type::Error);
                continue;
            }
            params.push(ty);
        }

        if self.scope().vars.contains_key(&decl.name) {
            self.error(format!("redefinition of '{}'", decl.name), decl.pos);
            return;
        }

        let ty = FuncType {
            ret,
            params,
        };
        let index = self.funcs.len();
        self.scope().vars.insert(
            decl.name.clone(),
            (Resolved::Func(index), Type::Func(Box::new(ty.clone()))),
        );
        self.funcs.push(FuncSig {
            name: decl.name.clone(),
            ty,
            locals: Vec::new(),
            pos: decl.pos,
        });
    }

    fn check_global_init(&mut self, decl: &mut VarDecl) {
        let Some(index) = decl.slot else { return };
        let ty = self.globals[index].ty.clone();
        let Some(init) = &mut decl.init else { return };

        self.check_expr(init);
        let init_ty = init.ty.clone().unwrap_or(Type::Error);
        if init_ty.is_error() {
            return;
        }

        let folded = match (&ty, &init.kind) {
            (_, ExprKind::StrLit(text)) if ty.is_pointer() => {
                Some(GlobalInit::Str(text.clone()))
            }
            _ => match fold_int_const(init) {
                Some(value) => {
                    if ty.is_float() {
                        Some(GlobalInit::Float(value as f64))
                    } else if ty.is_integer() {
                        if !int_fits(value, &ty) {
                            self.error(
                                format!("initializer {} does not fit '{}'", value, ty),
                                init.pos,
                            );
                        }
                        Some(GlobalInit::Int(value))
                    } else if ty.is_pointer() && value == 0 {
                        Some(GlobalInit::Int(0))
                    } else {
                        None
                    }
                }
                None => match fold_float_const(init) {
                    Some(value) if ty.is_float() => Some(GlobalInit::Float(value)),
                    _ => None,
                },
            },
        };

        match folded {
            Some(init) => self.globals[index].init = Some(init),
            None => self.error(
                format!("initializer of '{}' is not a constant", decl.name),
                init.pos,
            ),
        }
    }

    fn check_func(&mut self, decl: &mut FuncDecl, index: usize) {
        let sig = self.funcs[index].ty.clone();
        self.current_ret = sig.ret.clone();
        self.locals = sig.params.clone();

        self.push_scope();
        for (slot, param) in decl.params.iter().enumerate() {
            let ty = self.locals[slot].clone();
            if self.scope().vars.contains_key(&param.name) {
                self.error(format!("duplicate parameter '{}'", param.name), param.pos);
                continue;
            }
            self.scope()
                .vars
                .insert(param.name.clone(), (Resolved::Local(slot), ty));
        }

        self.check_stmt(&mut decl.body);
        self.pop_scope();

        self.funcs[index].locals = std::mem::take(&mut self.locals);
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn check_stmt(&mut self, stmt: &mut Stmt) {
        match &mut stmt.kind {
            StmtKind::Expr(expr) => {
                self.check_expr(expr);
            }
            StmtKind::Decl(decl) => self.check_local_decl(decl),
            StmtKind::StructDecl(decl) => self.define_struct(decl),
            StmtKind::Block(stmts) => {
                self.push_scope();
                for s in stmts {
                    self.check_stmt(s);
                }
                self.pop_scope();
            }
            StmtKind::If { cond, then, els } => {
                self.check_cond(cond);
                self.check_stmt(then);
                if let Some(els) = els {
                    self.check_stmt(els);
                }
            }
            StmtKind::While { cond, body } => {
                self.check_cond(cond);
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
            }
            StmtKind::DoWhile { body, cond } => {
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
                self.check_cond(cond);
            }
            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                // The init declaration scopes over cond, step, and body.
                self.push_scope();
                if let Some(init) = init {
                    self.check_stmt(init);
                }
                if let Some(cond) = cond {
                    self.check_cond(cond);
                }
                if let Some(step) = step {
                    self.check_expr(step);
                }
                self.loop_depth += 1;
                self.check_stmt(body);
                self.loop_depth -= 1;
                self.pop_scope();
            }
            StmtKind::Break => {
                if self.loop_depth == 0 {
                    self.error("'break' outside of a loop", stmt.pos);
                }
            }
            StmtKind::Continue => {
                if self.loop_depth == 0 {
                    self.error("'continue' outside of a loop", stmt.pos);
                }
            }
            StmtKind::Return(value) => {
                let ret = self.current_ret.clone();
                match value {
                    Some(expr) => {
                        self.check_expr(expr);
                        if ret == Type::Void {
                            self.error("returning a value from a void function", expr.pos);
                        } else {
                            self.coerce_assign(expr, &ret, "return value");
                        }
                    }
                    None => {
                        if ret != Type::Void && !ret.is_error() {
                            self.error(
                                format!("return without a value in a function returning '{}'", ret),
                                stmt.pos,
                            );
                        }
                    }
                }
            }
            StmtKind::Empty => {}
        }
    }

    fn check_local_decl(&mut self, decl: &mut VarDecl) {
        let ty = self.resolve_type(&decl.ty);
        if ty == Type::Void {
            self.error(format!("variable '{}' has type void", decl.name), decl.pos);
            return;
        }

        if self.scope().vars.contains_key(&decl.name) {
            self.error(format!("redefinition of '{}'", decl.name), decl.pos);
            return;
        }

        let slot = self.locals.len();
        self.locals.push(ty.clone());
        decl.slot = Some(slot);
        self.scope()
            .vars
            .insert(decl.name.clone(), (Resolved::Local(slot), ty.clone()));

        if let Some(init) = &mut decl.init {
            self.check_expr(init);
            if ty.is_aggregate() {
                let init_ty = init.ty.clone().unwrap_or(Type::Error);
                if !init_ty.is_error() && init_ty != ty {
                    self.error(
                        format!("cannot initialize '{}' from '{}'", ty, init_ty),
                        init.pos,
                    );
                }
            } else if let Type::Array(_, _) = ty {
                self.error("array initializers are not supported", init.pos);
            } else {
                self.coerce_assign(init, &ty, "initializer");
            }
        }
    }

    fn check_cond(&mut self, cond: &mut Expr) {
        self.check_expr(cond);
        let ty = self.decayed(cond);
        if !ty.is_error() && !ty.is_scalar() {
            self.error(format!("condition has non-scalar type '{}'", ty), cond.pos);
        }
    }

    // ------------------------------------------------------------------
    // Types
    // ------------------------------------------------------------------

    fn resolve_type(&mut self, expr: &TypeExpr) -> Type {
        match &expr.kind {
            TypeExprKind::Prim(ty) => ty.clone(),
            TypeExprKind::Named { name, is_union } => match self.lookup_tag(name) {
                Some(id) => {
                    let def = self.structs.get(id);
                    if def.is_union != *is_union {
                        self.error(
                            format!(
                                "'{}' is a {}, not a {}",
                                name,
                                tag_word(def.is_union),
                                tag_word(*is_union)
                            ),
                            expr.pos,
                        );
                        return Type::Error;
                    }
                    Type::Struct(id)
                }
                None => {
                    self.error(
                        format!("undeclared {} '{}'", tag_word(*is_union), name),
                        expr.pos,
                    );
                    Type::Error
                }
            },
            TypeExprKind::Ptr(inner) => Type::ptr(self.resolve_type(inner)),
            TypeExprKind::Array(inner, len) => {
                let elem = self.resolve_type(inner);
                if *len == 0 {
                    self.error("array length must be positive", expr.pos);
                    return Type::Error;
                }
                Type::Array(Box::new(elem), *len)
            }
        }
    }

    /// The expression's type with arrays decayed to pointers, as every
    /// value context sees it.
    fn decayed(&self, expr: &Expr) -> Type {
        expr.ty.as_ref().map(Type::decay).unwrap_or(Type::Error)
    }

    /// Wrap `expr` in an implicit conversion to `to` if the representation
    /// changes. Arrays decay first.
    fn insert_cast(&mut self, expr: &mut Expr, to: &Type) {
        let from = self.decayed(expr);
        if from == *to || from.is_error() || to.is_error() {
            expr.ty = Some(to.clone());
            return;
        }
        let pos = expr.pos;
        let inner = std::mem::replace(expr, Expr::new(ExprKind::IntLit(0), pos));
        *expr = Expr::new(
            ExprKind::ImplicitCast {
                to: to.clone(),
                expr: Box::new(inner),
            },
            pos,
        );
        expr.ty = Some(to.clone());
    }

    /// Assignment compatibility: coerce `src` to `dst` or report. Implicit
    /// integer narrowing is rejected unless `src` is a constant that fits.
    fn coerce_assign(&mut self, src: &mut Expr, dst: &Type, what: &str) {
        let from = self.decayed(src);
        if from.is_error() || dst.is_error() {
            return;
        }

        if from == *dst {
            return;
        }

        if dst.is_numeric() && from.is_numeric() {
            if is_narrowing(&from, dst) {
                if let Some(value) = fold_int_const(src) {
                    if dst.is_integer() && int_fits(value, dst) {
                        self.insert_cast(src, dst);
                        return;
                    }
                }
                // a float constant narrows when single precision holds it
                // exactly, the same exception fitting integer constants get
                if *dst == Type::float_() {
                    if let Some(value) = fold_float_const(src) {
                        if (value as f32) as f64 == value {
                            self.insert_cast(src, dst);
                            return;
                        }
                    }
                }
                self.error(
                    format!(
                        "implicit conversion from '{}' to '{}' in {} may lose data; use a cast",
                        from, dst, what
                    ),
                    src.pos,
                );
                return;
            }
            self.insert_cast(src, dst);
            return;
        }

        if dst.is_pointer() && from.is_pointer() {
            if ptr_compatible(dst, &from) {
                self.insert_cast(src, dst);
                return;
            }
            self.error(
                format!("incompatible pointer types: '{}' from '{}'", dst, from),
                src.pos,
            );
            return;
        }

        if dst.is_pointer() && from.is_integer() {
            if fold_int_const(src) == Some(0) {
                self.insert_cast(src, dst);
                return;
            }
            self.error(
                format!("cannot assign '{}' to pointer '{}' (only 0 converts)", from, dst),
                src.pos,
            );
            return;
        }

        self.error(
            format!("cannot convert '{}' to '{}' in {}", from, dst, what),
            src.pos,
        );
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    /// Annotate `expr.ty`, resolving names and inserting implicit casts.
    /// Ill-typed subtrees end up as `Type::Error`, already reported.
    fn check_expr(&mut self, expr: &mut Expr) {
        let pos = expr.pos;
        let ty: Type = match &mut expr.kind {
            ExprKind::IntLit(value) => {
                if *value >= i32::MIN as i64 && *value <= i32::MAX as i64 {
                    Type::int_()
                } else {
                    Type::long_()
                }
            }
            ExprKind::FloatLit(_) => Type::double_(),
            ExprKind::StrLit(_) => Type::ptr(Type::char_()),
            ExprKind::Ident { name, resolved } => match self.lookup_var(name) {
                Some((res, ty)) => {
                    if matches!(res, Resolved::Func(_)) {
                        self.error(
                            format!("function '{}' used as a value", name),
                            pos,
                        );
                        Type::Error
                    } else {
                        *resolved = Some(res);
                        ty
                    }
                }
                None => {
                    self.error(format!("undeclared identifier '{}'", name), pos);
                    Type::Error
                }
            },
            ExprKind::Unary { op, operand } => {
                self.check_expr(operand);
                let oty = self.decayed(operand);
                match op {
                    UnaryOp::Neg => {
                        if oty.is_error() {
                            Type::Error
                        } else if !oty.is_numeric() {
                            self.error(
                                format!("invalid operand to unary '-' ('{}')", oty),
                                pos,
                            );
                            Type::Error
                        } else {
                            let promoted = integer_promotion(&oty);
                            self.insert_cast(operand, &promoted);
                            promoted
                        }
                    }
                    UnaryOp::BitNot => {
                        if oty.is_error() {
                            Type::Error
                        } else if !oty.is_integer() {
                            self.error(
                                format!("invalid operand to unary '~' ('{}')", oty),
                                pos,
                            );
                            Type::Error
                        } else {
                            let promoted = integer_promotion(&oty);
                            self.insert_cast(operand, &promoted);
                            promoted
                        }
                    }
                    UnaryOp::Not => {
                        if oty.is_error() {
                            Type::Error
                        } else if !oty.is_scalar() {
                            self.error(
                                format!("invalid operand to unary '!' ('{}')", oty),
                                pos,
                            );
                            Type::Error
                        } else {
                            Type::int_()
                        }
                    }
                }
            }
            ExprKind::Binary { op, lhs, rhs } => {
                self.check_expr(lhs);
                self.check_expr(rhs);
                let op = *op;
                self.check_binary(op, lhs, rhs, pos)
            }
            ExprKind::Assign { op, target, value } => {
                self.check_expr(target);
                self.check_expr(value);
                self.require_lvalue(target);
                let tty = target.ty.clone().unwrap_or(Type::Error);

                if tty.is_error() {
                    Type::Error
                } else if matches!(tty, Type::Array(_, _)) {
                    self.error("cannot assign to an array", pos);
                    Type::Error
                } else if let Some(binop) = op {
                    // target op= value checks like target op value, then
                    // stores back at the target's type; the store narrows
                    // back by definition, as in C. Only the value operand
                    // gets a conversion cast: the target must keep its
                    // lvalue shape for the store.
                    let binop = *binop;
                    self.check_compound(binop, &tty, value, pos)
                } else if tty.is_aggregate() {
                    let vty = self.decayed(value);
                    if !vty.is_error() && vty != tty {
                        self.error(
                            format!("cannot assign '{}' from '{}'", tty, vty),
                            pos,
                        );
                        Type::Error
                    } else {
                        tty
                    }
                } else {
                    self.coerce_assign(value, &tty, "assignment");
                    tty
                }
            }
            ExprKind::Cond { cond, then, els } => {
                self.check_cond(cond);
                self.check_expr(then);
                self.check_expr(els);
                let lty = self.decayed(then);
                let rty = self.decayed(els);
                if lty.is_error() || rty.is_error() {
                    Type::Error
                } else if lty.is_numeric() && rty.is_numeric() {
                    let result = common_type(&lty, &rty);
                    self.insert_cast(then, &result);
                    self.insert_cast(els, &result);
                    result
                } else if lty.is_pointer() && rty.is_pointer() && ptr_compatible(&lty, &rty) {
                    lty
                } else if lty == Type::Void || rty == Type::Void {
                    // every '?:' arm must leave a value on the stack
                    self.error("'?:' arm of type 'void' has no value", pos);
                    Type::Error
                } else if lty.is_aggregate() || rty.is_aggregate() {
                    self.error(
                        format!("'?:' arms must be scalar ('{}' and '{}')", lty, rty),
                        pos,
                    );
                    Type::Error
                } else {
                    self.error(
                        format!("mismatched '?:' arms ('{}' and '{}')", lty, rty),
                        pos,
                    );
                    Type::Error
                }
            }
            ExprKind::Cast { to, expr: inner } => {
                self.check_expr(inner);
                let to = {
                    let to = to.clone();
                    self.resolve_type(&to)
                };
                let from = self.decayed(inner);
                if from.is_error() || to.is_error() {
                    Type::Error
                } else if to == Type::Void {
                    Type::Void
                } else if !to.is_scalar() {
                    self.error(format!("cannot cast to '{}'", to), pos);
                    Type::Error
                } else if !from.is_scalar() {
                    self.error(format!("cannot cast from '{}'", from), pos);
                    Type::Error
                } else if (to.is_float() && from.is_pointer())
                    || (to.is_pointer() && from.is_float())
                {
                    self.error(
                        format!("cannot cast between '{}' and '{}'", from, to),
                        pos,
                    );
                    Type::Error
                } else {
                    to
                }
            }
            ExprKind::ImplicitCast { to, .. } => to.clone(),
            ExprKind::Call { name, target, args } => {
                let name = name.clone();
                match self.lookup_var(&name) {
                    Some((Resolved::Func(index), Type::Func(sig))) => {
                        *target = Some(CallTarget::Func(index));
                        let sig = (*sig).clone();
                        self.check_call_args(&name, &sig, args, pos)
                    }
                    Some(_) => {
                        self.error(format!("'{}' is not a function", name), pos);
                        for arg in args {
                            self.check_expr(arg);
                        }
                        Type::Error
                    }
                    None => match Builtin::lookup(&name) {
                        Some(builtin) => {
                            *target = Some(CallTarget::Builtin(builtin));
                            let sig = builtin.signature();
                            self.check_call_args(&name, &sig, args, pos)
                        }
                        None => {
                            self.error(format!("undeclared function '{}'", name), pos);
                            for arg in args {
                                self.check_expr(arg);
                            }
                            Type::Error
                        }
                    },
                }
            }
            ExprKind::Index { base, index } => {
                self.check_expr(base);
                self.check_expr(index);
                let bty = self.decayed(base);
                let ity = self.decayed(index);
                if bty.is_error() || ity.is_error() {
                    Type::Error
                } else if !bty.is_pointer() {
                    self.error(format!("cannot index into '{}'", bty), pos);
                    Type::Error
                } else if !ity.is_integer() {
                    self.error(format!("array index has type '{}'", ity), pos);
                    Type::Error
                } else {
                    bty.base().cloned().unwrap_or(Type::Error)
                }
            }
            ExprKind::Member {
                base,
                field,
                arrow,
                offset,
            } => {
                self.check_expr(base);
                let bty = base.ty.clone().unwrap_or(Type::Error);
                let struct_ty = if *arrow {
                    match bty.decay() {
                        Type::Ptr(inner) => *inner,
                        Type::Error => Type::Error,
                        other => {
                            self.error(
                                format!("'->' on non-pointer type '{}'", other),
                                pos,
                            );
                            Type::Error
                        }
                    }
                } else {
                    bty
                };

                match struct_ty {
                    Type::Struct(id) => {
                        let def = self.structs.get(id);
                        match def.field(field) {
                            Some(f) => {
                                *offset = Some(f.offset);
                                f.ty.clone()
                            }
                            None => {
                                let msg = format!(
                                    "no field '{}' in '{} {}'",
                                    field,
                                    tag_word(def.is_union),
                                    def.name
                                );
                                self.error(msg, pos);
                                Type::Error
                            }
                        }
                    }
                    Type::Error => Type::Error,
                    other => {
                        self.error(
                            format!("member access on non-struct type '{}'", other),
                            pos,
                        );
                        Type::Error
                    }
                }
            }
            ExprKind::Deref(inner) => {
                self.check_expr(inner);
                let ity = self.decayed(inner);
                match ity {
                    Type::Ptr(base) => {
                        if *base == Type::Void {
                            self.error("cannot dereference 'void *'", pos);
                            Type::Error
                        } else {
                            *base
                        }
                    }
                    Type::Error => Type::Error,
                    other => {
                        self.error(format!("cannot dereference '{}'", other), pos);
                        Type::Error
                    }
                }
            }
            ExprKind::AddrOf(inner) => {
                self.check_expr(inner);
                let ity = inner.ty.clone().unwrap_or(Type::Error);
                if ity.is_error() {
                    Type::Error
                } else if !is_lvalue(inner) {
                    self.error("cannot take the address of this expression", pos);
                    Type::Error
                } else {
                    // &array yields a pointer to the first element in this
                    // subset; the distinction from T(*)[N] is not modeled.
                    match &ity {
                        Type::Array(elem, _) => Type::ptr((**elem).clone()),
                        other => Type::ptr(other.clone()),
                    }
                }
            }
            ExprKind::SizeofType(texpr) => {
                let texpr = texpr.clone();
                let ty = self.resolve_type(&texpr);
                if ty.is_error() {
                    Type::Error
                } else {
                    let size = ty.size(&self.structs);
                    expr.kind = ExprKind::IntLit(size as i64);
                    expr.ty = Some(Type::Int { size: 8, unsigned: true });
                    return;
                }
            }
            ExprKind::SizeofExpr(inner) => {
                self.check_expr(inner);
                let ity = inner.ty.clone().unwrap_or(Type::Error);
                if ity.is_error() {
                    Type::Error
                } else {
                    let size = ity.size(&self.structs);
                    expr.kind = ExprKind::IntLit(size as i64);
                    expr.ty = Some(Type::Int { size: 8, unsigned: true });
                    return;
                }
            }
            ExprKind::IncDec { op: _, target } => {
                self.check_expr(target);
                self.require_lvalue(target);
                let tty = target.ty.clone().unwrap_or(Type::Error);
                if tty.is_error() {
                    Type::Error
                } else if tty.is_integer() || tty.is_float() {
                    tty
                } else if let Type::Ptr(_) = tty {
                    tty
                } else {
                    self.error(
                        format!("invalid operand to '++'/'--' ('{}')", tty),
                        pos,
                    );
                    Type::Error
                }
            }
        };
        expr.ty = Some(ty);
    }

    /// Shared by `Binary` and compound assignment. Operands are already
    /// checked; inserts promotion casts and returns the result type.
    fn check_binary(&mut self, op: BinOp, lhs: &mut Expr, rhs: &mut Expr, pos: Pos) -> Type {
        let lty = self.decayed(lhs);
        let rty = self.decayed(rhs);
        if lty.is_error() || rty.is_error() {
            return Type::Error;
        }

        let invalid = |a: &mut Analyzer| {
            a.error(
                format!(
                    "invalid operands to binary '{}' ('{}' and '{}')",
                    op.symbol(),
                    lty,
                    rty
                ),
                pos,
            );
            Type::Error
        };

        match op {
            BinOp::Add | BinOp::Sub => {
                match (lty.is_pointer(), rty.is_pointer()) {
                    (true, true) => {
                        if op == BinOp::Sub && ptr_compatible(&lty, &rty) {
                            Type::long_()
                        } else {
                            invalid(self)
                        }
                    }
                    (true, false) => {
                        if rty.is_integer() {
                            self.insert_cast(rhs, &Type::long_());
                            lty
                        } else {
                            invalid(self)
                        }
                    }
                    (false, true) => {
                        if op == BinOp::Add && lty.is_integer() {
                            self.insert_cast(lhs, &Type::long_());
                            rty
                        } else {
                            invalid(self)
                        }
                    }
                    (false, false) => {
                        if lty.is_numeric() && rty.is_numeric() {
                            let result = common_type(&lty, &rty);
                            self.insert_cast(lhs, &result);
                            self.insert_cast(rhs, &result);
                            result
                        } else {
                            invalid(self)
                        }
                    }
                }
            }
            BinOp::Mul | BinOp::Div => {
                if lty.is_numeric() && rty.is_numeric() {
                    let result = common_type(&lty, &rty);
                    self.insert_cast(lhs, &result);
                    self.insert_cast(rhs, &result);
                    result
                } else {
                    invalid(self)
                }
            }
            BinOp::Mod
            | BinOp::BitAnd
            | BinOp::BitOr
            | BinOp::BitXor => {
                if lty.is_integer() && rty.is_integer() {
                    let result = common_type(&lty, &rty);
                    self.insert_cast(lhs, &result);
                    self.insert_cast(rhs, &result);
                    result
                } else {
                    invalid(self)
                }
            }
            BinOp::Shl | BinOp::Shr => {
                if lty.is_integer() && rty.is_integer() {
                    // the left operand's promoted type is the result; the
                    // shift amount is not converted to it
                    let result = integer_promotion(&lty);
                    self.insert_cast(lhs, &result);
                    self.insert_cast(rhs, &integer_promotion(&rty));
                    result
                } else {
                    invalid(self)
                }
            }
            BinOp::Eq | BinOp::Ne | BinOp::Lt | BinOp::Gt | BinOp::Le | BinOp::Ge => {
                if lty.is_numeric() && rty.is_numeric() {
                    let common = common_type(&lty, &rty);
                    self.insert_cast(lhs, &common);
                    self.insert_cast(rhs, &common);
                    Type::int_()
                } else if lty.is_pointer() && rty.is_pointer() {
                    if ptr_compatible(&lty, &rty) {
                        Type::int_()
                    } else {
                        invalid(self)
                    }
                } else if lty.is_pointer() && fold_int_const(rhs) == Some(0) {
                    self.insert_cast(rhs, &lty);
                    Type::int_()
                } else if rty.is_pointer() && fold_int_const(lhs) == Some(0) {
                    self.insert_cast(lhs, &rty);
                    Type::int_()
                } else {
                    invalid(self)
                }
            }
            BinOp::LogAnd | BinOp::LogOr => {
                if lty.is_scalar() && rty.is_scalar() {
                    Type::int_()
                } else {
                    invalid(self)
                }
            }
        }
    }

    /// Type-check `target op= value` against the target's type without
    /// touching the target expression. Mirrors `check_binary` for the
    /// operators the parser accepts in compound form.
    fn check_compound(&mut self, op: BinOp, tty: &Type, value: &mut Expr, pos: Pos) -> Type {
        let vty = self.decayed(value);
        if vty.is_error() {
            return Type::Error;
        }

        let invalid = |a: &mut Analyzer| {
            a.error(
                format!(
                    "invalid operands to binary '{}' ('{}' and '{}')",
                    op.symbol(),
                    tty,
                    vty
                ),
                pos,
            );
            Type::Error
        };

        match op {
            BinOp::Add | BinOp::Sub if tty.is_pointer() => {
                if vty.is_integer() {
                    self.insert_cast(value, &Type::long_());
                    tty.clone()
                } else {
                    invalid(self)
                }
            }
            BinOp::Add | BinOp::Sub | BinOp::Mul | BinOp::Div => {
                if tty.is_numeric() && vty.is_numeric() {
                    let common = common_type(tty, &vty);
                    self.insert_cast(value, &common);
                    tty.clone()
                } else {
                    invalid(self)
                }
            }
            BinOp::Mod | BinOp::BitAnd | BinOp::BitOr | BinOp::BitXor => {
                if tty.is_integer() && vty.is_integer() {
                    let common = common_type(tty, &vty);
                    self.insert_cast(value, &common);
                    tty.clone()
                } else {
                    invalid(self)
                }
            }
            BinOp::Shl | BinOp::Shr => {
                if tty.is_integer() && vty.is_integer() {
                    self.insert_cast(value, &integer_promotion(&vty));
                    tty.clone()
                } else {
                    invalid(self)
                }
            }
            // the parser never builds compound comparisons or logicals
            _ => invalid(self),
        }
    }

    fn check_call_args(
        &mut self,
        name: &str,
        sig: &FuncType,
        args: &mut [Expr],
        pos: Pos,
    ) -> Type {
        if args.len() != sig.params.len() {
            self.error(
                format!(
                    "'{}' expects {} argument{}, got {}",
                    name,
                    sig.params.len(),
                    if sig.params.len() == 1 { "" } else { "s" },
                    args.len()
                ),
                pos,
            );
            for arg in args {
                self.check_expr(arg);
            }
            return sig.ret.clone();
        }

        for (arg, param) in args.iter_mut().zip(&sig.params) {
            self.check_expr(arg);
            let aty = self.decayed(arg);
            if aty.is_aggregate() {
                self.error(
                    "cannot pass a struct by value; pass a pointer instead",
                    arg.pos,
                );
                continue;
            }
            if param.is_error() || aty.is_error() {
                continue;
            }
            self.coerce_assign(arg, param, "argument");
        }
        sig.ret.clone()
    }

    fn require_lvalue(&mut self, expr: &Expr) {
        let ty = expr.ty.clone().unwrap_or(Type::Error);
        if !ty.is_error() && !is_lvalue(expr) {
            self.error("expression is not assignable", expr.pos);
        }
    }
}

// ----------------------------------------------------------------------
// Helpers
// ----------------------------------------------------------------------

fn tag_word(is_union: bool) -> &'static str {
    if is_union { "union" } else { "struct" }
}

fn align_to(n: u32, align: u32) -> u32 {
    (n + align - 1) / align * align
}

fn is_lvalue(expr: &Expr) -> bool {
    match &expr.kind {
        ExprKind::Ident { resolved, .. } => {
            matches!(resolved, Some(Resolved::Local(_)) | Some(Resolved::Global(_)))
        }
        ExprKind::Deref(_) | ExprKind::Index { .. } => true,
        ExprKind::Member { base, arrow, .. } => *arrow || is_lvalue(base),
        _ => false,
    }
}

/// True when assigning `from` to `to` can lose information.
fn is_narrowing(from: &Type, to: &Type) -> bool {
    match (from, to) {
        (Type::Int { size: fs, .. }, Type::Int { size: ts, .. }) => fs > ts,
        (Type::Float { size: fs }, Type::Float { size: ts }) => fs > ts,
        (Type::Float { .. }, Type::Int { .. }) => true,
        // int -> float is accepted as in C, though large 64-bit values
        // round; an explicit cast is available when that matters
        _ => false,
    }
}

/// `void *` converts to and from any object pointer; otherwise the base
/// types must match.
fn ptr_compatible(a: &Type, b: &Type) -> bool {
    match (a.base(), b.base()) {
        (Some(Type::Void), Some(_)) | (Some(_), Some(Type::Void)) => true,
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

fn int_fits(value: i64, ty: &Type) -> bool {
    match ty {
        Type::Int { size: 8, .. } => true,
        Type::Int { size, unsigned: false } => {
            let bits = *size as u32 * 8;
            let min = -(1i64 << (bits - 1));
            let max = (1i64 << (bits - 1)) - 1;
            value >= min && value <= max
        }
        Type::Int { size, unsigned: true } => {
            let bits = *size as u32 * 8;
            value >= 0 && value < (1i64 << bits)
        }
        _ => false,
    }
}

/// Fold an integer constant expression, looking through implicit casts.
/// `sizeof` is already folded to a literal by the time this runs.
fn fold_int_const(expr: &Expr) -> Option<i64> {
    match &expr.kind {
        ExprKind::IntLit(value) => Some(*value),
        ExprKind::Unary { op: UnaryOp::Neg, operand } => {
            fold_int_const(operand).map(i64::wrapping_neg)
        }
        ExprKind::Unary { op: UnaryOp::BitNot, operand } => {
            fold_int_const(operand).map(|v| !v)
        }
        ExprKind::Binary { op, lhs, rhs } => {
            let l = fold_int_const(lhs)?;
            let r = fold_int_const(rhs)?;
            match op {
                BinOp::Add => Some(l.wrapping_add(r)),
                BinOp::Sub => Some(l.wrapping_sub(r)),
                BinOp::Mul => Some(l.wrapping_mul(r)),
                BinOp::Div if r != 0 => Some(l.wrapping_div(r)),
                BinOp::Mod if r != 0 => Some(l.wrapping_rem(r)),
                BinOp::Shl => Some(l.wrapping_shl(r as u32)),
                BinOp::Shr => Some(l.wrapping_shr(r as u32)),
                BinOp::BitAnd => Some(l & r),
                BinOp::BitOr => Some(l | r),
                BinOp::BitXor => Some(l ^ r),
                _ => None,
            }
        }
        ExprKind::ImplicitCast { expr, .. } => fold_int_const(expr),
        ExprKind::Cast { expr, .. } => fold_int_const(expr),
        _ => None,
    }
}

fn fold_float_const(expr: &Expr) -> Option<f64> {
    match &expr.kind {
        ExprKind::FloatLit(value) => Some(*value),
        ExprKind::IntLit(value) => Some(*value as f64),
        ExprKind::Unary { op: UnaryOp::Neg, operand } => fold_float_const(operand).map(|v| -v),
        ExprKind::ImplicitCast { expr, .. } => fold_float_const(expr),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;
    use crate::parser::Parser;

    fn analyze_src(source: &str) -> Result<(Unit, Analysis), Vec<Diagnostic>> {
        let tokens = Lexer::new(source).tokenize();
        let mut unit = Parser::new(tokens).parse()?;
        let analysis = analyze(&mut unit)?;
        Ok((unit, analysis))
    }

    fn errors_of(source: &str) -> Vec<String> {
        match analyze_src(source) {
            Ok(_) => panic!("expected semantic errors"),
            Err(diags) => diags.iter().map(|d| d.to_string()).collect(),
        }
    }

    #[test]
    fn test_undeclared_identifier() {
        let errors = errors_of("int main() { return x; }");
        assert!(errors[0].contains("undeclared identifier 'x'"), "{:?}", errors);
    }

    #[test]
    fn test_errors_are_batched() {
        let errors = errors_of("int main() { int a; a = b; a = c; return a; }");
        assert_eq!(errors.len(), 2, "{:?}", errors);
    }

    #[test]
    fn test_error_type_suppresses_cascades() {
        // `x` is undeclared; the additions on top of it must not produce
        // further complaints.
        let errors = errors_of("int main() { return x + 1 + 2; }");
        assert_eq!(errors.len(), 1, "{:?}", errors);
    }

    #[test]
    fn test_forward_call_is_allowed() {
        analyze_src("int main() { return helper(); } int helper() { return 3; }")
            .expect("forward calls should resolve");
    }

    #[test]
    fn test_arity_mismatch() {
        let errors = errors_of("int f(int a) { return a; } int main() { return f(1, 2); }");
        assert!(errors[0].contains("expects 1 argument, got 2"), "{:?}", errors);
    }

    #[test]
    fn test_implicit_narrowing_rejected() {
        let errors = errors_of("int main() { long l; int i; l = 5; i = l; return i; }");
        assert!(errors[0].contains("may lose data"), "{:?}", errors);
    }

    #[test]
    fn test_constant_that_fits_narrows() {
        analyze_src("int main() { char c; c = 100; return c; }")
            .expect("a fitting constant may narrow");
        let errors = errors_of("int main() { char c; c = 300; return c; }");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_compound_assign_keeps_target_lvalue_shape() {
        // conversions in `target op= value` wrap only the value operand;
        // the target must stay a bare lvalue for the store
        let (unit, _) = analyze_src(
            "int main() { char c; double d; int i; c = 1; i = 1; c += 1; d += i; return 0; }",
        )
        .expect("clean program");
        let Decl::Func(func) = &unit.decls[0] else { panic!() };
        let StmtKind::Block(stmts) = &func.body.kind else { panic!() };

        let StmtKind::Expr(compound) = &stmts[5].kind else { panic!() };
        let ExprKind::Assign { op, target, .. } = &compound.kind else { panic!() };
        assert_eq!(*op, Some(BinOp::Add));
        assert!(matches!(target.kind, ExprKind::Ident { .. }));
        assert_eq!(compound.ty, Some(Type::char_()));

        // `d += i` converts the int operand up to double
        let StmtKind::Expr(compound) = &stmts[6].kind else { panic!() };
        let ExprKind::Assign { target, value, .. } = &compound.kind else { panic!() };
        assert!(matches!(target.kind, ExprKind::Ident { .. }));
        assert!(matches!(value.kind, ExprKind::ImplicitCast { .. }));
        assert_eq!(compound.ty, Some(Type::double_()));
    }

    #[test]
    fn test_compound_assign_narrow_targets_accepted() {
        analyze_src(
            "int main() {
                short s;
                float f;
                char buf[4];
                s = 1; s *= 3;
                f = 1.5; f += 1.25;
                buf[0] = 1; buf[0] <<= 4;
                return s;
            }",
        )
        .expect("narrow compound targets are well typed");
    }

    #[test]
    fn test_exact_float_constant_narrows() {
        analyze_src("int main() { float f; f = 1.5; return 0; }")
            .expect("1.5 is exact in single precision");
        let errors = errors_of("int main() { float f; f = 0.1; return 0; }");
        assert!(errors[0].contains("may lose data"), "{:?}", errors);
    }

    #[test]
    fn test_redefined_function_with_wider_arity() {
        let errors = errors_of(
            "int f() { return 0; }
             int f(int a, int b) { return a; }
             int main() { return 0; }",
        );
        assert!(errors[0].contains("redefinition of 'f'"), "{:?}", errors);
    }

    #[test]
    fn test_void_conditional_arm_rejected() {
        let errors = errors_of(
            "void f() { return; }
             int main() { 1 ? f() : f(); return 0; }",
        );
        assert!(errors[0].contains("'void' has no value"), "{:?}", errors);
    }

    #[test]
    fn test_struct_conditional_arm_rejected() {
        let errors = errors_of(
            "struct S { int x; };
             int main() { struct S a; struct S b; 1 ? a : b; return 0; }",
        );
        assert!(errors[0].contains("must be scalar"), "{:?}", errors);
    }

    #[test]
    fn test_promotion_inserts_casts() {
        let (unit, _) = analyze_src("int main() { int i; double d; d = i + 1.5; return 0; }")
            .expect("clean program");
        // the int operand of `+` must be wrapped in a conversion to double
        let Decl::Func(func) = &unit.decls[0] else { panic!() };
        let StmtKind::Block(stmts) = &func.body.kind else { panic!() };
        let StmtKind::Expr(assign) = &stmts[2].kind else { panic!() };
        let ExprKind::Assign { value, .. } = &assign.kind else { panic!() };
        let ExprKind::Binary { lhs, .. } = &value.kind else {
            panic!("expected binary under assignment, got {:?}", value.kind)
        };
        assert!(matches!(lhs.kind, ExprKind::ImplicitCast { .. }));
        assert_eq!(value.ty, Some(Type::double_()));
    }

    #[test]
    fn test_sizeof_folds_to_constant() {
        let (unit, _) = analyze_src("int main() { return sizeof(long); }").expect("clean");
        let Decl::Func(func) = &unit.decls[0] else { panic!() };
        let StmtKind::Block(stmts) = &func.body.kind else { panic!() };
        let StmtKind::Return(Some(expr)) = &stmts[0].kind else { panic!() };
        fn unwrap_casts(e: &Expr) -> &Expr {
            match &e.kind {
                ExprKind::ImplicitCast { expr, .. } => unwrap_casts(expr),
                _ => e,
            }
        }
        assert!(matches!(unwrap_casts(expr).kind, ExprKind::IntLit(8)));
    }

    #[test]
    fn test_struct_layout() {
        let (_, analysis) = analyze_src(
            "struct S { char c; int i; char d; long l; };
             int main() { struct S s; return sizeof(struct S); }",
        )
        .expect("clean");
        let def = analysis.structs.get(0);
        assert_eq!(def.fields[0].offset, 0);
        assert_eq!(def.fields[1].offset, 4);
        assert_eq!(def.fields[2].offset, 8);
        assert_eq!(def.fields[3].offset, 16);
        assert_eq!(def.size, 24);
        assert_eq!(def.align, 8);
    }

    #[test]
    fn test_union_layout() {
        let (_, analysis) = analyze_src(
            "union U { char c; int i; double d; };
             int main() { union U u; u.i = 1; return u.i; }",
        )
        .expect("clean");
        let def = analysis.structs.get(0);
        assert!(def.fields.iter().all(|f| f.offset == 0));
        assert_eq!(def.size, 8);
    }

    #[test]
    fn test_self_referential_struct() {
        analyze_src(
            "struct Node { int value; struct Node *next; };
             int main() { struct Node n; n.next = 0; return n.value; }",
        )
        .expect("pointer to own struct is fine");
        let errors = errors_of("struct Bad { struct Bad inner; }; int main() { return 0; }");
        assert!(errors[0].contains("incomplete type"), "{:?}", errors);
    }

    #[test]
    fn test_unknown_field() {
        let errors = errors_of(
            "struct P { int x; }; int main() { struct P p; return p.y; }",
        );
        assert!(errors[0].contains("no field 'y'"), "{:?}", errors);
    }

    #[test]
    fn test_arrow_requires_pointer() {
        let errors = errors_of(
            "struct P { int x; }; int main() { struct P p; return p->x; }",
        );
        assert!(errors[0].contains("'->' on non-pointer"), "{:?}", errors);
    }

    #[test]
    fn test_break_outside_loop() {
        let errors = errors_of("int main() { break; return 0; }");
        assert!(errors[0].contains("'break' outside"), "{:?}", errors);
    }

    #[test]
    fn test_void_return_mismatch() {
        let errors = errors_of("void f() { return 1; } int main() { return 0; }");
        assert!(errors[0].contains("void function"), "{:?}", errors);
    }

    #[test]
    fn test_assignment_needs_lvalue() {
        let errors = errors_of("int main() { 1 = 2; return 0; }");
        assert!(errors[0].contains("not assignable"), "{:?}", errors);
    }

    #[test]
    fn test_pointer_arithmetic_types() {
        analyze_src(
            "int main() { int a[4]; int *p; long d; p = a + 1; d = p - a; return 0; }",
        )
        .expect("pointer arithmetic is well-typed");
        let errors = errors_of("int main() { int *p; double d; p = p + d; return 0; }");
        assert!(!errors.is_empty());
    }

    #[test]
    fn test_shadowing_resolves_innermost() {
        let (_, analysis) = analyze_src(
            "int main() { int x; x = 1; { long x; x = 2; } return x; }",
        )
        .expect("shadowing is legal");
        // both declarations get distinct slots, in declaration order
        assert_eq!(analysis.funcs[0].locals.len(), 2);
        assert_eq!(analysis.funcs[0].locals[0], Type::int_());
        assert_eq!(analysis.funcs[0].locals[1], Type::long_());
    }

    #[test]
    fn test_redefinition_in_same_scope() {
        let errors = errors_of("int main() { int x; int x; return 0; }");
        assert!(errors[0].contains("redefinition of 'x'"), "{:?}", errors);
    }

    #[test]
    fn test_builtin_calls_resolve() {
        let (unit, _) = analyze_src(
            "int main() { int *p; p = (int *)malloc(8); free(p); return 0; }",
        )
        .expect("builtins resolve");
        let Decl::Func(func) = &unit.decls[0] else { panic!() };
        let StmtKind::Block(stmts) = &func.body.kind else { panic!() };
        let StmtKind::Expr(assign) = &stmts[1].kind else { panic!() };
        let ExprKind::Assign { value, .. } = &assign.kind else { panic!() };
        let ExprKind::Cast { expr, .. } = &value.kind else { panic!() };
        assert!(matches!(
            expr.kind,
            ExprKind::Call { target: Some(CallTarget::Builtin(Builtin::Malloc)), .. }
        ));
    }

    #[test]
    fn test_struct_by_value_param_rejected() {
        let errors = errors_of(
            "struct S { int x; }; int f(struct S s) { return s.x; } int main() { return 0; }",
        );
        assert!(errors[0].contains("pass a pointer"), "{:?}", errors);
    }

    #[test]
    fn test_global_init_folds_constant_expressions() {
        let (_, analysis) =
            analyze_src("int g = 40 + 2; int main() { return g; }").expect("constant fold");
        assert!(matches!(analysis.globals[0].init, Some(GlobalInit::Int(42))));
    }

    #[test]
    fn test_global_init_non_constant_rejected() {
        let errors = errors_of("int helper() { return 1; } int g2 = helper(); int main() { return g2; }");
        assert!(errors[0].contains("not a constant"), "{:?}", errors);
    }
}
