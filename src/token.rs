use serde::{Deserialize, Serialize};

/// A byte-exact source position. `line` and `col` are 1-based, `offset` is
/// the byte offset into the source buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pos {
    pub line: u32,
    pub col: u32,
    pub offset: u32,
}

impl Pos {
    pub fn start() -> Self {
        Pos {
            line: 1,
            col: 1,
            offset: 0,
        }
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}:{}", self.line, self.col)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    // Literals
    Int(i64),
    Float(f64),
    Str(String),

    // Identifier
    Ident(String),

    // Keywords
    KwVoid,
    KwChar,
    KwShort,
    KwInt,
    KwLong,
    KwFloat,
    KwDouble,
    KwUnsigned,
    KwStruct,
    KwUnion,
    KwIf,
    KwElse,
    KwWhile,
    KwDo,
    KwFor,
    KwReturn,
    KwBreak,
    KwContinue,
    KwSizeof,

    // Arithmetic
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    PlusPlus,
    MinusMinus,

    // Bitwise
    Amp,
    Pipe,
    Caret,
    Tilde,
    Shl,
    Shr,

    // Logic
    AmpAmp,
    PipePipe,
    Bang,

    // Assignment
    Assign,
    PlusAssign,
    MinusAssign,
    StarAssign,
    SlashAssign,
    PercentAssign,

    // Comparison
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,

    // Punctuation
    Question,
    Colon,
    LParen,
    RParen,
    LBrace,
    RBrace,
    LBracket,
    RBracket,
    Comma,
    Semi,
    Dot,
    Arrow,

    /// A lexical error turned into a token, so later phases can batch
    /// diagnostics instead of aborting on the first bad character.
    Error(String),

    Eof,
}

impl TokenKind {
    /// Short human-readable name, used in "expected X, found Y" messages.
    pub fn describe(&self) -> String {
        match self {
            TokenKind::Int(_) => "integer literal".to_string(),
            TokenKind::Float(_) => "float literal".to_string(),
            TokenKind::Str(_) => "string literal".to_string(),
            TokenKind::Ident(name) => format!("identifier `{}`", name),
            TokenKind::Error(_) => "invalid token".to_string(),
            TokenKind::Eof => "end of input".to_string(),
            other => format!("`{}`", other),
        }
    }

    pub fn is_type_keyword(&self) -> bool {
        matches!(
            self,
            TokenKind::KwVoid
                | TokenKind::KwChar
                | TokenKind::KwShort
                | TokenKind::KwInt
                | TokenKind::KwLong
                | TokenKind::KwFloat
                | TokenKind::KwDouble
                | TokenKind::KwUnsigned
                | TokenKind::KwStruct
                | TokenKind::KwUnion
        )
    }
}

impl std::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Int(n) => write!(f, "{}", n),
            TokenKind::Float(n) => write!(f, "{}", n),
            TokenKind::Str(s) => write!(f, "{:?}", s),
            TokenKind::Ident(s) => write!(f, "{}", s),
            TokenKind::KwVoid => write!(f, "void"),
            TokenKind::KwChar => write!(f, "char"),
            TokenKind::KwShort => write!(f, "short"),
            TokenKind::KwInt => write!(f, "int"),
            TokenKind::KwLong => write!(f, "long"),
            TokenKind::KwFloat => write!(f, "float"),
            TokenKind::KwDouble => write!(f, "double"),
            TokenKind::KwUnsigned => write!(f, "unsigned"),
            TokenKind::KwStruct => write!(f, "struct"),
            TokenKind::KwUnion => write!(f, "union"),
            TokenKind::KwIf => write!(f, "if"),
            TokenKind::KwElse => write!(f, "else"),
            TokenKind::KwWhile => write!(f, "while"),
            TokenKind::KwDo => write!(f, "do"),
            TokenKind::KwFor => write!(f, "for"),
            TokenKind::KwReturn => write!(f, "return"),
            TokenKind::KwBreak => write!(f, "break"),
            TokenKind::KwContinue => write!(f, "continue"),
            TokenKind::KwSizeof => write!(f, "sizeof"),
            TokenKind::Plus => write!(f, "+"),
            TokenKind::Minus => write!(f, "-"),
            TokenKind::Star => write!(f, "*"),
            TokenKind::Slash => write!(f, "/"),
            TokenKind::Percent => write!(f, "%"),
            TokenKind::PlusPlus => write!(f, "++"),
            TokenKind::MinusMinus => write!(f, "--"),
            TokenKind::Amp => write!(f, "&"),
            TokenKind::Pipe => write!(f, "|"),
            TokenKind::Caret => write!(f, "^"),
            TokenKind::Tilde => write!(f, "~"),
            TokenKind::Shl => write!(f, "<<"),
            TokenKind::Shr => write!(f, ">>"),
            TokenKind::AmpAmp => write!(f, "&&"),
            TokenKind::PipePipe => write!(f, "||"),
            TokenKind::Bang => write!(f, "!"),
            TokenKind::Assign => write!(f, "="),
            TokenKind::PlusAssign => write!(f, "+="),
            TokenKind::MinusAssign => write!(f, "-="),
            TokenKind::StarAssign => write!(f, "*="),
            TokenKind::SlashAssign => write!(f, "/="),
            TokenKind::PercentAssign => write!(f, "%="),
            TokenKind::Eq => write!(f, "=="),
            TokenKind::Ne => write!(f, "!="),
            TokenKind::Lt => write!(f, "<"),
            TokenKind::Gt => write!(f, ">"),
            TokenKind::Le => write!(f, "<="),
            TokenKind::Ge => write!(f, ">="),
            TokenKind::Question => write!(f, "?"),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::LParen => write!(f, "("),
            TokenKind::RParen => write!(f, ")"),
            TokenKind::LBrace => write!(f, "{{"),
            TokenKind::RBrace => write!(f, "}}"),
            TokenKind::LBracket => write!(f, "["),
            TokenKind::RBracket => write!(f, "]"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Semi => write!(f, ";"),
            TokenKind::Dot => write!(f, "."),
            TokenKind::Arrow => write!(f, "->"),
            TokenKind::Error(msg) => write!(f, "<error: {}>", msg),
            TokenKind::Eof => write!(f, "EOF"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub pos: Pos,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pos_display() {
        let pos = Pos {
            line: 3,
            col: 14,
            offset: 40,
        };
        assert_eq!(pos.to_string(), "3:14");
    }

    #[test]
    fn test_describe_punctuator() {
        assert_eq!(TokenKind::Semi.describe(), "`;`");
        assert_eq!(TokenKind::Arrow.describe(), "`->`");
    }

    #[test]
    fn test_describe_ident_and_eof() {
        assert_eq!(
            TokenKind::Ident("main".to_string()).describe(),
            "identifier `main`"
        );
        assert_eq!(TokenKind::Eof.describe(), "end of input");
    }

    #[test]
    fn test_type_keywords() {
        assert!(TokenKind::KwInt.is_type_keyword());
        assert!(TokenKind::KwStruct.is_type_keyword());
        assert!(!TokenKind::KwReturn.is_type_keyword());
        assert!(!TokenKind::Ident("int32".to_string()).is_type_keyword());
    }
}
