use crate::ast::*;
use crate::diag::Diagnostic;
use crate::token::{Pos, Token, TokenKind};
use crate::types::Type;

/// Binary operator precedence, highest binds tightest. A fixed, explicit
/// table keyed by token kind; all binary operators are left-associative.
/// Assignment and `?:` sit above the climber and are handled separately.
fn binary_prec(kind: &TokenKind) -> Option<(u8, BinOp)> {
    let entry = match kind {
        TokenKind::Star => (10, BinOp::Mul),
        TokenKind::Slash => (10, BinOp::Div),
        TokenKind::Percent => (10, BinOp::Mod),
        TokenKind::Plus => (9, BinOp::Add),
        TokenKind::Minus => (9, BinOp::Sub),
        TokenKind::Shl => (8, BinOp::Shl),
        TokenKind::Shr => (8, BinOp::Shr),
        TokenKind::Lt => (7, BinOp::Lt),
        TokenKind::Gt => (7, BinOp::Gt),
        TokenKind::Le => (7, BinOp::Le),
        TokenKind::Ge => (7, BinOp::Ge),
        TokenKind::Eq => (6, BinOp::Eq),
        TokenKind::Ne => (6, BinOp::Ne),
        TokenKind::Amp => (5, BinOp::BitAnd),
        TokenKind::Caret => (4, BinOp::BitXor),
        TokenKind::Pipe => (3, BinOp::BitOr),
        TokenKind::AmpAmp => (2, BinOp::LogAnd),
        TokenKind::PipePipe => (1, BinOp::LogOr),
        _ => return None,
    };
    Some(entry)
}

fn compound_assign_op(kind: &TokenKind) -> Option<BinOp> {
    match kind {
        TokenKind::PlusAssign => Some(BinOp::Add),
        TokenKind::MinusAssign => Some(BinOp::Sub),
        TokenKind::StarAssign => Some(BinOp::Mul),
        TokenKind::SlashAssign => Some(BinOp::Div),
        TokenKind::PercentAssign => Some(BinOp::Mod),
        _ => None,
    }
}

/// Recursive-descent parser with one token of lookahead. On a statement- or
/// declaration-level error it records a diagnostic, skips to the next `;`
/// or block delimiter, and keeps going, so a single compile call can report
/// several syntax errors.
pub struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    diags: Vec<Diagnostic>,
}

/// Marker for "a diagnostic was recorded, unwind to the recovery point".
struct Abort;

type PResult<T> = Result<T, Abort>;

impl Parser {
    pub fn new(tokens: Vec<Token>) -> Self {
        // Error tokens become lex diagnostics up front; the grammar never
        // sees them.
        let mut diags = Vec::new();
        let tokens = tokens
            .into_iter()
            .filter(|t| {
                if let TokenKind::Error(msg) = &t.kind {
                    diags.push(Diagnostic::lex(msg.clone(), t.pos));
                    false
                } else {
                    true
                }
            })
            .collect();

        Parser {
            tokens,
            pos: 0,
            diags,
        }
    }

    pub fn parse(mut self) -> Result<Unit, Vec<Diagnostic>> {
        let mut unit = Unit::default();

        while !self.at(&TokenKind::Eof) {
            match self.parse_top_decl() {
                Ok(decl) => unit.decls.push(decl),
                Err(Abort) => self.synchronize_top(),
            }
        }

        if self.diags.is_empty() {
            Ok(unit)
        } else {
            Err(self.diags)
        }
    }

    // ------------------------------------------------------------------
    // Token plumbing
    // ------------------------------------------------------------------

    fn current(&self) -> &Token {
        &self.tokens[self.pos.min(self.tokens.len() - 1)]
    }

    fn peek(&self) -> &Token {
        &self.tokens[(self.pos + 1).min(self.tokens.len() - 1)]
    }

    fn at(&self, kind: &TokenKind) -> bool {
        &self.current().kind == kind
    }

    fn advance(&mut self) -> Token {
        let token = self.current().clone();
        if self.pos < self.tokens.len() - 1 {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.at(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn error_here(&mut self, message: impl Into<String>) -> Abort {
        let pos = self.current().pos;
        self.diags.push(Diagnostic::syntax(message, pos));
        Abort
    }

    fn expect(&mut self, kind: &TokenKind) -> PResult<Token> {
        if self.at(kind) {
            Ok(self.advance())
        } else {
            let found = self.current().kind.describe();
            Err(self.error_here(format!("expected {}, found {}", kind.describe(), found)))
        }
    }

    fn expect_ident(&mut self, what: &str) -> PResult<(String, Pos)> {
        match &self.current().kind {
            TokenKind::Ident(name) => {
                let name = name.clone();
                let pos = self.advance().pos;
                Ok((name, pos))
            }
            other => {
                let found = other.describe();
                Err(self.error_here(format!("expected {} name, found {}", what, found)))
            }
        }
    }

    /// Statement-level recovery: skip to just past the next `;`, or stop
    /// before a block delimiter.
    fn synchronize(&mut self) {
        loop {
            match &self.current().kind {
                TokenKind::Eof | TokenKind::RBrace => return,
                TokenKind::Semi => {
                    self.advance();
                    return;
                }
                TokenKind::LBrace => {
                    self.skip_balanced_braces();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    /// Top-level recovery: same idea, but a stray `}` is consumed so a
    /// malformed function body does not wedge the loop.
    fn synchronize_top(&mut self) {
        loop {
            match &self.current().kind {
                TokenKind::Eof => return,
                TokenKind::Semi | TokenKind::RBrace => {
                    self.advance();
                    return;
                }
                TokenKind::LBrace => {
                    self.skip_balanced_braces();
                    return;
                }
                _ => {
                    self.advance();
                }
            }
        }
    }

    fn skip_balanced_braces(&mut self) {
        debug_assert!(self.at(&TokenKind::LBrace));
        let mut depth = 0usize;
        loop {
            match &self.current().kind {
                TokenKind::LBrace => {
                    depth += 1;
                    self.advance();
                }
                TokenKind::RBrace => {
                    self.advance();
                    depth -= 1;
                    if depth == 0 {
                        return;
                    }
                }
                TokenKind::Eof => return,
                _ => {
                    self.advance();
                }
            }
        }
    }

    // ------------------------------------------------------------------
    // Declarations
    // ------------------------------------------------------------------

    fn parse_top_decl(&mut self) -> PResult<Decl> {
        if self.at_struct_definition() {
            return Ok(Decl::Struct(self.parse_struct_decl()?));
        }

        if !self.current().kind.is_type_keyword() {
            let found = self.current().kind.describe();
            return Err(self.error_here(format!("expected a declaration, found {}", found)));
        }

        let base = self.parse_declspec()?;
        let (ty, name, name_pos) = self.parse_declarator(base)?;

        if self.at(&TokenKind::LParen) {
            let func = self.parse_func_rest(ty, name, name_pos)?;
            Ok(Decl::Func(func))
        } else {
            let decl = self.parse_global_rest(ty, name, name_pos)?;
            Ok(Decl::Global(decl))
        }
    }

    /// `struct Name { ... }` introduces a definition; `struct Name ident`
    /// is a variable declaration using the tag.
    fn at_struct_definition(&self) -> bool {
        matches!(
            self.current().kind,
            TokenKind::KwStruct | TokenKind::KwUnion
        ) && matches!(self.peek().kind, TokenKind::Ident(_))
            && {
                let after = self.tokens.get(self.pos + 2);
                matches!(after.map(|t| &t.kind), Some(TokenKind::LBrace))
            }
    }

    fn parse_struct_decl(&mut self) -> PResult<StructDecl> {
        let kw = self.advance();
        let is_union = kw.kind == TokenKind::KwUnion;
        let (name, _) = self.expect_ident(if is_union { "union" } else { "struct" })?;
        self.expect(&TokenKind::LBrace)?;

        let mut fields = Vec::new();
        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            let base = self.parse_declspec()?;
            let (ty, fname, fpos) = self.parse_declarator(base)?;
            let ty = self.parse_array_suffix(ty)?;
            self.expect(&TokenKind::Semi)?;
            fields.push(FieldDecl {
                name: fname,
                ty,
                pos: fpos,
            });
        }
        self.expect(&TokenKind::RBrace)?;
        self.expect(&TokenKind::Semi)?;

        Ok(StructDecl {
            name,
            is_union,
            fields,
            pos: kw.pos,
        })
    }

    /// Base type: the keyword soup before any `*` or declarator name.
    fn parse_declspec(&mut self) -> PResult<TypeExpr> {
        let pos = self.current().pos;

        match self.current().kind.clone() {
            TokenKind::KwStruct | TokenKind::KwUnion => {
                let is_union = self.advance().kind == TokenKind::KwUnion;
                let (name, _) = self.expect_ident(if is_union { "union" } else { "struct" })?;
                Ok(TypeExpr {
                    kind: TypeExprKind::Named { name, is_union },
                    pos,
                })
            }
            TokenKind::KwUnsigned => {
                self.advance();
                let ty = match self.current().kind.clone() {
                    TokenKind::KwChar => {
                        self.advance();
                        Type::Int { size: 1, unsigned: true }
                    }
                    TokenKind::KwShort => {
                        self.advance();
                        Type::Int { size: 2, unsigned: true }
                    }
                    TokenKind::KwInt => {
                        self.advance();
                        Type::Int { size: 4, unsigned: true }
                    }
                    TokenKind::KwLong => {
                        self.advance();
                        Type::Int { size: 8, unsigned: true }
                    }
                    // bare `unsigned`
                    _ => Type::Int { size: 4, unsigned: true },
                };
                Ok(TypeExpr {
                    kind: TypeExprKind::Prim(ty),
                    pos,
                })
            }
            TokenKind::KwVoid => {
                self.advance();
                Ok(TypeExpr { kind: TypeExprKind::Prim(Type::Void), pos })
            }
            TokenKind::KwChar => {
                self.advance();
                Ok(TypeExpr { kind: TypeExprKind::Prim(Type::char_()), pos })
            }
            TokenKind::KwShort => {
                self.advance();
                Ok(TypeExpr { kind: TypeExprKind::Prim(Type::short_()), pos })
            }
            TokenKind::KwInt => {
                self.advance();
                Ok(TypeExpr { kind: TypeExprKind::Prim(Type::int_()), pos })
            }
            TokenKind::KwLong => {
                self.advance();
                Ok(TypeExpr { kind: TypeExprKind::Prim(Type::long_()), pos })
            }
            TokenKind::KwFloat => {
                self.advance();
                Ok(TypeExpr { kind: TypeExprKind::Prim(Type::float_()), pos })
            }
            TokenKind::KwDouble => {
                self.advance();
                Ok(TypeExpr { kind: TypeExprKind::Prim(Type::double_()), pos })
            }
            other => {
                let found = other.describe();
                Err(self.error_here(format!("expected a type, found {}", found)))
            }
        }
    }

    /// `*`* name. The subset has no parenthesised declarators or function
    /// pointers.
    fn parse_declarator(&mut self, mut ty: TypeExpr) -> PResult<(TypeExpr, String, Pos)> {
        while self.at(&TokenKind::Star) {
            let pos = self.advance().pos;
            ty = TypeExpr {
                kind: TypeExprKind::Ptr(Box::new(ty)),
                pos,
            };
        }
        let (name, pos) = self.expect_ident("declarator")?;
        Ok((ty, name, pos))
    }

    /// Trailing `[N]` suffixes. Innermost dimension is written last in C,
    /// so suffixes wrap from the right.
    fn parse_array_suffix(&mut self, ty: TypeExpr) -> PResult<TypeExpr> {
        if !self.at(&TokenKind::LBracket) {
            return Ok(ty);
        }
        let pos = self.advance().pos;
        let len = match self.current().kind.clone() {
            TokenKind::Int(n) if n >= 0 => {
                self.advance();
                n as u32
            }
            other => {
                let found = other.describe();
                return Err(self.error_here(format!(
                    "array length must be a non-negative integer constant, found {}",
                    found
                )));
            }
        };
        self.expect(&TokenKind::RBracket)?;
        let inner = self.parse_array_suffix(ty)?;
        Ok(TypeExpr {
            kind: TypeExprKind::Array(Box::new(inner), len),
            pos,
        })
    }

    fn parse_global_rest(
        &mut self,
        ty: TypeExpr,
        name: String,
        pos: Pos,
    ) -> PResult<VarDecl> {
        let ty = self.parse_array_suffix(ty)?;
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semi)?;
        Ok(VarDecl {
            name,
            ty,
            init,
            pos,
            slot: None,
        })
    }

    fn parse_func_rest(
        &mut self,
        ret: TypeExpr,
        name: String,
        pos: Pos,
    ) -> PResult<FuncDecl> {
        self.expect(&TokenKind::LParen)?;

        let mut params = Vec::new();
        if self.at(&TokenKind::KwVoid) && self.peek().kind == TokenKind::RParen {
            self.advance();
        }
        if !self.at(&TokenKind::RParen) {
            loop {
                let base = self.parse_declspec()?;
                let (pty, pname, ppos) = self.parse_declarator(base)?;
                params.push(ParamDecl {
                    name: pname,
                    ty: pty,
                    pos: ppos,
                });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
        }
        self.expect(&TokenKind::RParen)?;

        let body = self.parse_block()?;
        Ok(FuncDecl {
            name,
            ret,
            params,
            body,
            pos,
        })
    }

    // ------------------------------------------------------------------
    // Statements
    // ------------------------------------------------------------------

    fn parse_block(&mut self) -> PResult<Stmt> {
        let open = self.expect(&TokenKind::LBrace)?;
        let mut stmts = Vec::new();

        while !self.at(&TokenKind::RBrace) && !self.at(&TokenKind::Eof) {
            match self.parse_stmt() {
                Ok(stmt) => stmts.push(stmt),
                Err(Abort) => self.synchronize(),
            }
        }
        self.expect(&TokenKind::RBrace)?;

        Ok(Stmt {
            kind: StmtKind::Block(stmts),
            pos: open.pos,
        })
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        let pos = self.current().pos;

        match self.current().kind.clone() {
            TokenKind::LBrace => self.parse_block(),
            TokenKind::Semi => {
                self.advance();
                Ok(Stmt {
                    kind: StmtKind::Empty,
                    pos,
                })
            }
            TokenKind::KwIf => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                let then = Box::new(self.parse_stmt()?);
                let els = if self.eat(&TokenKind::KwElse) {
                    Some(Box::new(self.parse_stmt()?))
                } else {
                    None
                };
                Ok(Stmt {
                    kind: StmtKind::If { cond, then, els },
                    pos,
                })
            }
            TokenKind::KwWhile => {
                self.advance();
                self.expect(&TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt {
                    kind: StmtKind::While { cond, body },
                    pos,
                })
            }
            TokenKind::KwDo => {
                self.advance();
                let body = Box::new(self.parse_stmt()?);
                self.expect(&TokenKind::KwWhile)?;
                self.expect(&TokenKind::LParen)?;
                let cond = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt {
                    kind: StmtKind::DoWhile { body, cond },
                    pos,
                })
            }
            TokenKind::KwFor => {
                self.advance();
                self.expect(&TokenKind::LParen)?;

                let init = if self.eat(&TokenKind::Semi) {
                    None
                } else if self.current().kind.is_type_keyword() {
                    Some(Box::new(self.parse_local_decl()?))
                } else {
                    let e = self.parse_expr()?;
                    self.expect(&TokenKind::Semi)?;
                    Some(Box::new(Stmt {
                        pos: e.pos,
                        kind: StmtKind::Expr(e),
                    }))
                };

                let cond = if self.at(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semi)?;

                let step = if self.at(&TokenKind::RParen) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::RParen)?;

                let body = Box::new(self.parse_stmt()?);
                Ok(Stmt {
                    kind: StmtKind::For {
                        init,
                        cond,
                        step,
                        body,
                    },
                    pos,
                })
            }
            TokenKind::KwReturn => {
                self.advance();
                let value = if self.at(&TokenKind::Semi) {
                    None
                } else {
                    Some(self.parse_expr()?)
                };
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt {
                    kind: StmtKind::Return(value),
                    pos,
                })
            }
            TokenKind::KwBreak => {
                self.advance();
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt {
                    kind: StmtKind::Break,
                    pos,
                })
            }
            TokenKind::KwContinue => {
                self.advance();
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt {
                    kind: StmtKind::Continue,
                    pos,
                })
            }
            _ if self.at_struct_definition() => {
                let decl = self.parse_struct_decl()?;
                Ok(Stmt {
                    kind: StmtKind::StructDecl(decl),
                    pos,
                })
            }
            kind if kind.is_type_keyword() => self.parse_local_decl(),
            _ => {
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::Semi)?;
                Ok(Stmt {
                    kind: StmtKind::Expr(expr),
                    pos,
                })
            }
        }
    }

    fn parse_local_decl(&mut self) -> PResult<Stmt> {
        let base = self.parse_declspec()?;
        let (ty, name, pos) = self.parse_declarator(base)?;
        let ty = self.parse_array_suffix(ty)?;
        let init = if self.eat(&TokenKind::Assign) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        self.expect(&TokenKind::Semi)?;
        Ok(Stmt {
            kind: StmtKind::Decl(VarDecl {
                name,
                ty,
                init,
                pos,
                slot: None,
            }),
            pos,
        })
    }

    // ------------------------------------------------------------------
    // Expressions
    // ------------------------------------------------------------------

    pub fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_assignment()
    }

    fn parse_assignment(&mut self) -> PResult<Expr> {
        let lhs = self.parse_conditional()?;

        if self.at(&TokenKind::Assign) {
            let pos = self.advance().pos;
            let value = self.parse_assignment()?;
            return Ok(Expr::new(
                ExprKind::Assign {
                    op: None,
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                pos,
            ));
        }

        if let Some(op) = compound_assign_op(&self.current().kind) {
            let pos = self.advance().pos;
            let value = self.parse_assignment()?;
            return Ok(Expr::new(
                ExprKind::Assign {
                    op: Some(op),
                    target: Box::new(lhs),
                    value: Box::new(value),
                },
                pos,
            ));
        }

        Ok(lhs)
    }

    fn parse_conditional(&mut self) -> PResult<Expr> {
        let cond = self.parse_binary(0)?;
        if !self.at(&TokenKind::Question) {
            return Ok(cond);
        }
        let pos = self.advance().pos;
        let then = self.parse_expr()?;
        self.expect(&TokenKind::Colon)?;
        let els = self.parse_conditional()?;
        Ok(Expr::new(
            ExprKind::Cond {
                cond: Box::new(cond),
                then: Box::new(then),
                els: Box::new(els),
            },
            pos,
        ))
    }

    /// Precedence climbing over the explicit table above.
    fn parse_binary(&mut self, min_prec: u8) -> PResult<Expr> {
        let mut lhs = self.parse_unary()?;

        while let Some((prec, op)) = binary_prec(&self.current().kind) {
            if prec < min_prec {
                break;
            }
            let pos = self.advance().pos;
            let rhs = self.parse_binary(prec + 1)?;
            lhs = Expr::new(
                ExprKind::Binary {
                    op,
                    lhs: Box::new(lhs),
                    rhs: Box::new(rhs),
                },
                pos,
            );
        }

        Ok(lhs)
    }

    /// True when `(` starts a cast rather than a parenthesised expression.
    /// With no typedefs in the subset this is a single-token decision.
    fn at_cast(&self) -> bool {
        self.at(&TokenKind::LParen) && self.peek().kind.is_type_keyword()
    }

    fn parse_type_name(&mut self) -> PResult<TypeExpr> {
        let mut ty = self.parse_declspec()?;
        while self.at(&TokenKind::Star) {
            let pos = self.advance().pos;
            ty = TypeExpr {
                kind: TypeExprKind::Ptr(Box::new(ty)),
                pos,
            };
        }
        Ok(ty)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        let pos = self.current().pos;

        match self.current().kind.clone() {
            TokenKind::Plus => {
                self.advance();
                self.parse_unary()
            }
            TokenKind::Minus => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Neg,
                        operand: Box::new(operand),
                    },
                    pos,
                ))
            }
            TokenKind::Bang => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::Not,
                        operand: Box::new(operand),
                    },
                    pos,
                ))
            }
            TokenKind::Tilde => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Unary {
                        op: UnaryOp::BitNot,
                        operand: Box::new(operand),
                    },
                    pos,
                ))
            }
            TokenKind::Star => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(ExprKind::Deref(Box::new(operand)), pos))
            }
            TokenKind::Amp => {
                self.advance();
                let operand = self.parse_unary()?;
                Ok(Expr::new(ExprKind::AddrOf(Box::new(operand)), pos))
            }
            TokenKind::PlusPlus => {
                self.advance();
                let target = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::IncDec {
                        op: IncDecOp::PreInc,
                        target: Box::new(target),
                    },
                    pos,
                ))
            }
            TokenKind::MinusMinus => {
                self.advance();
                let target = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::IncDec {
                        op: IncDecOp::PreDec,
                        target: Box::new(target),
                    },
                    pos,
                ))
            }
            TokenKind::KwSizeof => {
                self.advance();
                if self.at_cast() {
                    self.expect(&TokenKind::LParen)?;
                    let ty = self.parse_type_name()?;
                    let ty = self.parse_array_suffix(ty)?;
                    self.expect(&TokenKind::RParen)?;
                    Ok(Expr::new(ExprKind::SizeofType(ty), pos))
                } else {
                    let operand = self.parse_unary()?;
                    Ok(Expr::new(ExprKind::SizeofExpr(Box::new(operand)), pos))
                }
            }
            TokenKind::LParen if self.at_cast() => {
                self.advance();
                let ty = self.parse_type_name()?;
                self.expect(&TokenKind::RParen)?;
                let expr = self.parse_unary()?;
                Ok(Expr::new(
                    ExprKind::Cast {
                        to: ty,
                        expr: Box::new(expr),
                    },
                    pos,
                ))
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;

        loop {
            let pos = self.current().pos;
            match self.current().kind.clone() {
                TokenKind::LParen => {
                    let name = match &expr.kind {
                        ExprKind::Ident { name, .. } => name.clone(),
                        _ => {
                            return Err(self.error_here(
                                "called object is not a function name \
                                 (function pointers are not supported)",
                            ));
                        }
                    };
                    self.advance();
                    let mut args = Vec::new();
                    if !self.at(&TokenKind::RParen) {
                        loop {
                            args.push(self.parse_expr()?);
                            if !self.eat(&TokenKind::Comma) {
                                break;
                            }
                        }
                    }
                    self.expect(&TokenKind::RParen)?;
                    expr = Expr::new(
                        ExprKind::Call {
                            name,
                            target: None,
                            args,
                        },
                        expr.pos,
                    );
                }
                TokenKind::LBracket => {
                    self.advance();
                    let index = self.parse_expr()?;
                    self.expect(&TokenKind::RBracket)?;
                    expr = Expr::new(
                        ExprKind::Index {
                            base: Box::new(expr),
                            index: Box::new(index),
                        },
                        pos,
                    );
                }
                TokenKind::Dot | TokenKind::Arrow => {
                    let arrow = self.advance().kind == TokenKind::Arrow;
                    let (field, _) = self.expect_ident("member")?;
                    expr = Expr::new(
                        ExprKind::Member {
                            base: Box::new(expr),
                            field,
                            arrow,
                            offset: None,
                        },
                        pos,
                    );
                }
                TokenKind::PlusPlus => {
                    self.advance();
                    expr = Expr::new(
                        ExprKind::IncDec {
                            op: IncDecOp::PostInc,
                            target: Box::new(expr),
                        },
                        pos,
                    );
                }
                TokenKind::MinusMinus => {
                    self.advance();
                    expr = Expr::new(
                        ExprKind::IncDec {
                            op: IncDecOp::PostDec,
                            target: Box::new(expr),
                        },
                        pos,
                    );
                }
                _ => break,
            }
        }

        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let pos = self.current().pos;

        match self.current().kind.clone() {
            TokenKind::Int(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::IntLit(value), pos))
            }
            TokenKind::Float(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::FloatLit(value), pos))
            }
            TokenKind::Str(text) => {
                self.advance();
                Ok(Expr::new(ExprKind::StrLit(text), pos))
            }
            TokenKind::Ident(name) => {
                self.advance();
                Ok(Expr::new(
                    ExprKind::Ident {
                        name,
                        resolved: None,
                    },
                    pos,
                ))
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            other => {
                let found = other.describe();
                Err(self.error_here(format!("expected an expression, found {}", found)))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lexer::Lexer;

    fn parse_ok(source: &str) -> Unit {
        let tokens = Lexer::new(source).tokenize();
        Parser::new(tokens).parse().expect("expected a clean parse")
    }

    fn parse_err(source: &str) -> Vec<Diagnostic> {
        let tokens = Lexer::new(source).tokenize();
        Parser::new(tokens).parse().expect_err("expected diagnostics")
    }

    fn parse_expr_str(source: &str) -> Expr {
        let wrapped = format!("int main() {{ return {}; }}", source);
        let unit = parse_ok(&wrapped);
        let Decl::Func(func) = &unit.decls[0] else {
            panic!("expected a function");
        };
        let StmtKind::Block(stmts) = &func.body.kind else {
            panic!("expected a block");
        };
        let StmtKind::Return(Some(expr)) = &stmts[0].kind else {
            panic!("expected a return");
        };
        expr.clone()
    }

    #[test]
    fn test_precedence_mul_over_add() {
        let expr = parse_expr_str("2+3*4");
        let ExprKind::Binary { op: BinOp::Add, rhs, .. } = &expr.kind else {
            panic!("expected + at the root, got {:?}", expr.kind);
        };
        assert!(matches!(
            rhs.kind,
            ExprKind::Binary { op: BinOp::Mul, .. }
        ));
    }

    #[test]
    fn test_left_associativity() {
        // (10 - 4) - 3
        let expr = parse_expr_str("10-4-3");
        let ExprKind::Binary { op: BinOp::Sub, lhs, .. } = &expr.kind else {
            panic!("expected - at the root");
        };
        assert!(matches!(
            lhs.kind,
            ExprKind::Binary { op: BinOp::Sub, .. }
        ));
    }

    #[test]
    fn test_comparison_binds_looser_than_shift() {
        let expr = parse_expr_str("1 << 2 < 3");
        assert!(matches!(
            expr.kind,
            ExprKind::Binary { op: BinOp::Lt, .. }
        ));
    }

    #[test]
    fn test_assignment_is_right_associative() {
        let expr = parse_expr_str("a = b = 1");
        let ExprKind::Assign { op: None, value, .. } = &expr.kind else {
            panic!("expected assignment at the root");
        };
        assert!(matches!(value.kind, ExprKind::Assign { .. }));
    }

    #[test]
    fn test_conditional_expression() {
        let expr = parse_expr_str("a ? 1 : 2");
        assert!(matches!(expr.kind, ExprKind::Cond { .. }));
    }

    #[test]
    fn test_unary_and_postfix() {
        let expr = parse_expr_str("-x[1]++");
        let ExprKind::Unary { op: UnaryOp::Neg, operand } = &expr.kind else {
            panic!("expected unary minus at the root");
        };
        assert!(matches!(
            operand.kind,
            ExprKind::IncDec { op: IncDecOp::PostInc, .. }
        ));
    }

    #[test]
    fn test_member_chain() {
        let expr = parse_expr_str("p->next.value");
        let ExprKind::Member { base, field, arrow, .. } = &expr.kind else {
            panic!("expected member access at the root");
        };
        assert_eq!(field, "value");
        assert!(!arrow);
        assert!(matches!(base.kind, ExprKind::Member { arrow: true, .. }));
    }

    #[test]
    fn test_cast_vs_paren() {
        let cast = parse_expr_str("(int)x");
        assert!(matches!(cast.kind, ExprKind::Cast { .. }));

        let paren = parse_expr_str("(x)");
        assert!(matches!(paren.kind, ExprKind::Ident { .. }));
    }

    #[test]
    fn test_sizeof_forms() {
        assert!(matches!(
            parse_expr_str("sizeof(int)").kind,
            ExprKind::SizeofType(_)
        ));
        assert!(matches!(
            parse_expr_str("sizeof x").kind,
            ExprKind::SizeofExpr(_)
        ));
    }

    #[test]
    fn test_call_with_args() {
        let expr = parse_expr_str("f(1, 2+3)");
        let ExprKind::Call { name, args, .. } = &expr.kind else {
            panic!("expected a call");
        };
        assert_eq!(name, "f");
        assert_eq!(args.len(), 2);
    }

    #[test]
    fn test_struct_definition() {
        let unit = parse_ok("struct Point { int x; int y; }; struct Point origin;");
        assert_eq!(unit.decls.len(), 2);
        let Decl::Struct(s) = &unit.decls[0] else {
            panic!("expected a struct decl");
        };
        assert_eq!(s.name, "Point");
        assert_eq!(s.fields.len(), 2);
        assert!(matches!(unit.decls[1], Decl::Global(_)));
    }

    #[test]
    fn test_function_with_params_and_locals() {
        let unit = parse_ok("int add(int a, int b) { int c = a + b; return c; }");
        let Decl::Func(func) = &unit.decls[0] else {
            panic!("expected function");
        };
        assert_eq!(func.params.len(), 2);
    }

    #[test]
    fn test_array_declaration() {
        let unit = parse_ok("int grid[2][3];");
        let Decl::Global(g) = &unit.decls[0] else {
            panic!("expected global");
        };
        // outer dimension first: int[2] of int[3]
        let TypeExprKind::Array(inner, 2) = &g.ty.kind else {
            panic!("expected outer [2], got {:?}", g.ty.kind);
        };
        assert!(matches!(inner.kind, TypeExprKind::Array(_, 3)));
    }

    #[test]
    fn test_control_flow_statements() {
        parse_ok(
            "int main() {
                int i;
                for (i = 0; i < 10; i++) { if (i == 5) break; else continue; }
                while (i > 0) { i--; }
                do { i++; } while (i < 3);
                return i;
            }",
        );
    }

    #[test]
    fn test_for_with_declaration_init() {
        parse_ok("int main() { for (int i = 0; i < 3; i++) {} return 0; }");
    }

    #[test]
    fn test_missing_semicolon_reports_and_recovers() {
        let diags = parse_err("int main() { int x = 1 return x; }");
        assert!(!diags.is_empty());
        assert!(diags[0].to_string().contains("expected `;`"));
    }

    #[test]
    fn test_multiple_syntax_errors_batched() {
        let diags = parse_err(
            "int main() {
                int x = ;
                int y = ;
                return 0;
            }",
        );
        assert!(diags.len() >= 2, "got {:?}", diags);
    }

    #[test]
    fn test_lex_errors_surface_as_diagnostics() {
        let diags = parse_err("int main() { return 1 @ 2; }");
        assert!(diags
            .iter()
            .any(|d| d.kind == crate::diag::DiagnosticKind::Lex));
    }

    #[test]
    fn test_error_carries_position() {
        let diags = parse_err("int main() {\n  v +; \n}");
        assert!(diags.iter().any(|d| d.pos.line == 2));
    }
}
