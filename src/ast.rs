use crate::token::Pos;
use crate::types::Type;

//
// The AST is a single-rooted owned tree: every node owns its children
// exclusively (Box/Vec), carries the source position it originated from,
// and holds annotation slots (`ty`, resolution indices) that start empty
// and are filled in by semantic analysis. No child points back at its
// parent; diagnostics travel on copied positions.
//

/// Where a name resolved to. Past the analyzer, nothing looks anything up
/// by name again: these are plain indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolved {
    /// Index into the enclosing function's locals (parameters first).
    Local(usize),
    /// Index into the global table.
    Global(usize),
    /// Index into the function table.
    Func(usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    /// Logical `!`, yields 0/1.
    Not,
    /// Bitwise `~`.
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    LogAnd,
    LogOr,
}

impl BinOp {
    pub fn symbol(self) -> &'static str {
        match self {
            BinOp::Add => "+",
            BinOp::Sub => "-",
            BinOp::Mul => "*",
            BinOp::Div => "/",
            BinOp::Mod => "%",
            BinOp::BitAnd => "&",
            BinOp::BitOr => "|",
            BinOp::BitXor => "^",
            BinOp::Shl => "<<",
            BinOp::Shr => ">>",
            BinOp::Eq => "==",
            BinOp::Ne => "!=",
            BinOp::Lt => "<",
            BinOp::Le => "<=",
            BinOp::Gt => ">",
            BinOp::Ge => ">=",
            BinOp::LogAnd => "&&",
            BinOp::LogOr => "||",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncDecOp {
    PreInc,
    PreDec,
    PostInc,
    PostDec,
}

/// Syntactic reference to a type, before resolution. Scalar bases are
/// already concrete; struct/union names need the analyzer's tag scope.
#[derive(Debug, Clone, PartialEq)]
pub struct TypeExpr {
    pub kind: TypeExprKind,
    pub pos: Pos,
}

#[derive(Debug, Clone, PartialEq)]
pub enum TypeExprKind {
    /// A fully-known scalar base (`int`, `unsigned char`, ...).
    Prim(Type),
    /// `struct Name` or `union Name`, resolved by tag lookup.
    Named { name: String, is_union: bool },
    Ptr(Box<TypeExpr>),
    /// Fixed-length array; the length is a constant in the subset.
    Array(Box<TypeExpr>, u32),
}

#[derive(Debug, Clone)]
pub struct Expr {
    pub kind: ExprKind,
    pub pos: Pos,
    /// Resolved type. `None` until analysis; exactly one type afterwards.
    pub ty: Option<Type>,
}

impl Expr {
    pub fn new(kind: ExprKind, pos: Pos) -> Self {
        Expr { kind, pos, ty: None }
    }
}

#[derive(Debug, Clone)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    StrLit(String),
    Ident {
        name: String,
        resolved: Option<Resolved>,
    },
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
    },
    Binary {
        op: BinOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    /// `target = value`, or `target op= value` when `op` is set.
    Assign {
        op: Option<BinOp>,
        target: Box<Expr>,
        value: Box<Expr>,
    },
    /// `cond ? then : els`
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        els: Box<Expr>,
    },
    /// Explicit source-level cast `(type)expr`.
    Cast {
        to: TypeExpr,
        expr: Box<Expr>,
    },
    /// Conversion inserted by the analyzer (promotion ladder, decay).
    ImplicitCast {
        to: Type,
        expr: Box<Expr>,
    },
    /// Direct call; the subset has no function pointers.
    Call {
        name: String,
        target: Option<CallTarget>,
        args: Vec<Expr>,
    },
    Index {
        base: Box<Expr>,
        index: Box<Expr>,
    },
    /// `base.field` or `base->field`; `offset` filled by the analyzer.
    Member {
        base: Box<Expr>,
        field: String,
        arrow: bool,
        offset: Option<u32>,
    },
    Deref(Box<Expr>),
    AddrOf(Box<Expr>),
    /// `sizeof(type)` / `sizeof expr`; folded to an `IntLit` by analysis.
    SizeofType(TypeExpr),
    SizeofExpr(Box<Expr>),
    IncDec {
        op: IncDecOp,
        target: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallTarget {
    /// Index into the function table.
    Func(usize),
    Builtin(crate::bytecode::Builtin),
}

#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub enum StmtKind {
    Expr(Expr),
    Decl(VarDecl),
    StructDecl(StructDecl),
    Block(Vec<Stmt>),
    If {
        cond: Expr,
        then: Box<Stmt>,
        els: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    DoWhile {
        body: Box<Stmt>,
        cond: Expr,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Break,
    Continue,
    Return(Option<Expr>),
    Empty,
}

#[derive(Debug, Clone)]
pub struct VarDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub init: Option<Expr>,
    pub pos: Pos,
    /// Local slot index (declaration order within the function), or global
    /// table index. Filled by the analyzer.
    pub slot: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct FieldDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct StructDecl {
    pub name: String,
    pub is_union: bool,
    pub fields: Vec<FieldDecl>,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct ParamDecl {
    pub name: String,
    pub ty: TypeExpr,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub struct FuncDecl {
    pub name: String,
    pub ret: TypeExpr,
    pub params: Vec<ParamDecl>,
    pub body: Stmt,
    pub pos: Pos,
}

#[derive(Debug, Clone)]
pub enum Decl {
    Struct(StructDecl),
    Global(VarDecl),
    Func(FuncDecl),
}

/// One translation unit: the single root of the tree, one per compile call.
#[derive(Debug, Clone, Default)]
pub struct Unit {
    pub decls: Vec<Decl>,
}
