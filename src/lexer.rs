use crate::token::{Pos, Token, TokenKind};

/// Hand-rolled scanner for the C subset. Tokenization is maximal-munch:
/// the longest valid lexeme wins (`>=` over `>` then `=`). Lexical errors
/// never abort the scan; they are emitted as `TokenKind::Error` tokens so
/// the parser can batch them with its own diagnostics.
pub struct Lexer {
    source: Vec<char>,
    pos: usize,
    line: u32,
    col: u32,
    offset: u32,
}

impl Lexer {
    pub fn new(source: &str) -> Self {
        Lexer {
            source: source.chars().collect(),
            pos: 0,
            line: 1,
            col: 1,
            offset: 0,
        }
    }

    fn current(&self) -> Option<char> {
        self.source.get(self.pos).copied()
    }

    fn peek(&self) -> Option<char> {
        self.source.get(self.pos + 1).copied()
    }

    fn advance(&mut self) -> Option<char> {
        let ch = self.current();
        if let Some(c) = ch {
            if c == '\n' {
                self.line += 1;
                self.col = 1;
            } else {
                self.col += 1;
            }
            self.offset += c.len_utf8() as u32;
            self.pos += 1;
        }
        ch
    }

    fn here(&self) -> Pos {
        Pos {
            line: self.line,
            col: self.col,
            offset: self.offset,
        }
    }

    /// Skips whitespace and both comment forms. `//` runs to end of line,
    /// `/* */` may span lines; an unterminated block comment is reported at
    /// its opening position.
    fn skip_trivia(&mut self) -> Option<Token> {
        loop {
            match self.current() {
                Some(c) if c.is_whitespace() => {
                    self.advance();
                }
                Some('/') if self.peek() == Some('/') => {
                    while let Some(c) = self.current() {
                        if c == '\n' {
                            break;
                        }
                        self.advance();
                    }
                }
                Some('/') if self.peek() == Some('*') => {
                    let start = self.here();
                    self.advance();
                    self.advance();
                    let mut closed = false;
                    while let Some(c) = self.current() {
                        if c == '*' && self.peek() == Some('/') {
                            self.advance();
                            self.advance();
                            closed = true;
                            break;
                        }
                        self.advance();
                    }
                    if !closed {
                        return Some(Token {
                            kind: TokenKind::Error("unterminated block comment".to_string()),
                            pos: start,
                        });
                    }
                }
                _ => return None,
            }
        }
    }

    fn read_escape(&mut self) -> Result<char, String> {
        // caller consumed the backslash
        match self.advance() {
            Some('n') => Ok('\n'),
            Some('t') => Ok('\t'),
            Some('r') => Ok('\r'),
            Some('0') => Ok('\0'),
            Some('\\') => Ok('\\'),
            Some('\'') => Ok('\''),
            Some('"') => Ok('"'),
            Some(c) => Err(format!("unknown escape sequence: \\{}", c)),
            None => Err("unexpected end of input in escape sequence".to_string()),
        }
    }

    /// After a bad escape, drop the rest of the literal so the scan
    /// resumes at real input instead of re-lexing its tail.
    fn skip_to_quote(&mut self, quote: char) {
        while let Some(c) = self.current() {
            if c == '\n' {
                break;
            }
            self.advance();
            if c == quote {
                break;
            }
            if c == '\\' {
                self.advance();
            }
        }
    }

    fn read_string(&mut self, start: Pos) -> Token {
        self.advance(); // opening quote

        let mut text = String::new();
        loop {
            match self.current() {
                Some('"') => {
                    self.advance();
                    return Token {
                        kind: TokenKind::Str(text),
                        pos: start,
                    };
                }
                Some('\\') => {
                    self.advance();
                    match self.read_escape() {
                        Ok(c) => text.push(c),
                        Err(msg) => {
                            self.skip_to_quote('"');
                            return Token {
                                kind: TokenKind::Error(msg),
                                pos: start,
                            };
                        }
                    }
                }
                Some('\n') | None => {
                    return Token {
                        kind: TokenKind::Error("unterminated string literal".to_string()),
                        pos: start,
                    };
                }
                Some(c) => {
                    text.push(c);
                    self.advance();
                }
            }
        }
    }

    /// Character constants have type `int` in C, so `'a'` lexes straight to
    /// an integer token.
    fn read_char(&mut self, start: Pos) -> Token {
        self.advance(); // opening quote

        let value = match self.current() {
            Some('\'') => {
                self.advance();
                return Token {
                    kind: TokenKind::Error("empty character constant".to_string()),
                    pos: start,
                };
            }
            Some('\\') => {
                self.advance();
                match self.read_escape() {
                    Ok(c) => c as i64,
                    Err(msg) => {
                        self.skip_to_quote('\'');
                        return Token {
                            kind: TokenKind::Error(msg),
                            pos: start,
                        };
                    }
                }
            }
            Some('\n') | None => {
                return Token {
                    kind: TokenKind::Error("unterminated character constant".to_string()),
                    pos: start,
                };
            }
            Some(c) => {
                self.advance();
                c as i64
            }
        };

        if self.current() == Some('\'') {
            self.advance();
            Token {
                kind: TokenKind::Int(value),
                pos: start,
            }
        } else {
            Token {
                kind: TokenKind::Error("unterminated character constant".to_string()),
                pos: start,
            }
        }
    }

    fn read_number(&mut self, start: Pos) -> Token {
        // Hex: 0x... or 0X...
        if self.current() == Some('0') && matches!(self.peek(), Some('x') | Some('X')) {
            self.advance();
            self.advance();

            let mut hex = String::new();
            while let Some(c) = self.current() {
                if c.is_ascii_hexdigit() {
                    hex.push(c);
                    self.advance();
                } else {
                    break;
                }
            }

            if hex.is_empty() {
                return Token {
                    kind: TokenKind::Error("expected hex digits after 0x".to_string()),
                    pos: start,
                };
            }

            return match i64::from_str_radix(&hex, 16) {
                Ok(value) => Token {
                    kind: TokenKind::Int(value),
                    pos: start,
                },
                Err(_) => Token {
                    kind: TokenKind::Error(format!("integer constant out of range: 0x{}", hex)),
                    pos: start,
                },
            };
        }

        let mut digits = String::new();
        let mut is_float = false;

        while let Some(c) = self.current() {
            if c.is_ascii_digit() {
                digits.push(c);
                self.advance();
            } else if c == '.' && !is_float {
                // A `.` only belongs to the number when a digit follows;
                // otherwise it is the member-access punctuator.
                if self.peek().map(|c| c.is_ascii_digit()).unwrap_or(false) {
                    is_float = true;
                    digits.push('.');
                    self.advance();
                } else {
                    break;
                }
            } else if (c == 'e' || c == 'E') && !digits.is_empty() {
                let mut look = self.pos + 1;
                if matches!(self.source.get(look), Some('+') | Some('-')) {
                    look += 1;
                }
                if self
                    .source
                    .get(look)
                    .map(|c| c.is_ascii_digit())
                    .unwrap_or(false)
                {
                    is_float = true;
                    digits.push('e');
                    self.advance();
                    if matches!(self.current(), Some('+') | Some('-')) {
                        digits.push(self.current().unwrap());
                        self.advance();
                    }
                    while let Some(d) = self.current() {
                        if d.is_ascii_digit() {
                            digits.push(d);
                            self.advance();
                        } else {
                            break;
                        }
                    }
                    break;
                } else {
                    break;
                }
            } else {
                break;
            }
        }

        if is_float {
            match digits.parse::<f64>() {
                Ok(value) => Token {
                    kind: TokenKind::Float(value),
                    pos: start,
                },
                Err(_) => Token {
                    kind: TokenKind::Error(format!("invalid float constant: {}", digits)),
                    pos: start,
                },
            }
        } else {
            match digits.parse::<i64>() {
                Ok(value) => Token {
                    kind: TokenKind::Int(value),
                    pos: start,
                },
                Err(_) => Token {
                    kind: TokenKind::Error(format!("integer constant out of range: {}", digits)),
                    pos: start,
                },
            }
        }
    }

    fn read_identifier(&mut self, start: Pos) -> Token {
        let mut ident = String::new();
        while let Some(c) = self.current() {
            if c.is_ascii_alphanumeric() || c == '_' {
                ident.push(c);
                self.advance();
            } else {
                break;
            }
        }

        let kind = match ident.as_str() {
            "void" => TokenKind::KwVoid,
            "char" => TokenKind::KwChar,
            "short" => TokenKind::KwShort,
            "int" => TokenKind::KwInt,
            "long" => TokenKind::KwLong,
            "float" => TokenKind::KwFloat,
            "double" => TokenKind::KwDouble,
            "unsigned" => TokenKind::KwUnsigned,
            "struct" => TokenKind::KwStruct,
            "union" => TokenKind::KwUnion,
            "if" => TokenKind::KwIf,
            "else" => TokenKind::KwElse,
            "while" => TokenKind::KwWhile,
            "do" => TokenKind::KwDo,
            "for" => TokenKind::KwFor,
            "return" => TokenKind::KwReturn,
            "break" => TokenKind::KwBreak,
            "continue" => TokenKind::KwContinue,
            "sizeof" => TokenKind::KwSizeof,
            _ => TokenKind::Ident(ident),
        };

        Token { kind, pos: start }
    }

    fn read_punctuator(&mut self, start: Pos) -> Token {
        let ch = self.current().unwrap_or('\0');
        let next = self.peek();

        // Two-character forms first: maximal munch.
        let two = match (ch, next) {
            ('+', Some('+')) => Some(TokenKind::PlusPlus),
            ('-', Some('-')) => Some(TokenKind::MinusMinus),
            ('-', Some('>')) => Some(TokenKind::Arrow),
            ('<', Some('<')) => Some(TokenKind::Shl),
            ('>', Some('>')) => Some(TokenKind::Shr),
            ('<', Some('=')) => Some(TokenKind::Le),
            ('>', Some('=')) => Some(TokenKind::Ge),
            ('=', Some('=')) => Some(TokenKind::Eq),
            ('!', Some('=')) => Some(TokenKind::Ne),
            ('&', Some('&')) => Some(TokenKind::AmpAmp),
            ('|', Some('|')) => Some(TokenKind::PipePipe),
            ('+', Some('=')) => Some(TokenKind::PlusAssign),
            ('-', Some('=')) => Some(TokenKind::MinusAssign),
            ('*', Some('=')) => Some(TokenKind::StarAssign),
            ('/', Some('=')) => Some(TokenKind::SlashAssign),
            ('%', Some('=')) => Some(TokenKind::PercentAssign),
            _ => None,
        };

        if let Some(kind) = two {
            self.advance();
            self.advance();
            return Token { kind, pos: start };
        }

        let kind = match ch {
            '+' => TokenKind::Plus,
            '-' => TokenKind::Minus,
            '*' => TokenKind::Star,
            '/' => TokenKind::Slash,
            '%' => TokenKind::Percent,
            '&' => TokenKind::Amp,
            '|' => TokenKind::Pipe,
            '^' => TokenKind::Caret,
            '~' => TokenKind::Tilde,
            '!' => TokenKind::Bang,
            '=' => TokenKind::Assign,
            '<' => TokenKind::Lt,
            '>' => TokenKind::Gt,
            '?' => TokenKind::Question,
            ':' => TokenKind::Colon,
            '(' => TokenKind::LParen,
            ')' => TokenKind::RParen,
            '{' => TokenKind::LBrace,
            '}' => TokenKind::RBrace,
            '[' => TokenKind::LBracket,
            ']' => TokenKind::RBracket,
            ',' => TokenKind::Comma,
            ';' => TokenKind::Semi,
            '.' => TokenKind::Dot,
            other => TokenKind::Error(format!("unexpected character: '{}'", other)),
        };

        self.advance();
        Token { kind, pos: start }
    }

    /// Produces the next token. Always returns something; after the end of
    /// input it keeps returning `Eof`.
    pub fn next_token(&mut self) -> Token {
        if let Some(err) = self.skip_trivia() {
            return err;
        }
        let start = self.here();

        match self.current() {
            None => Token {
                kind: TokenKind::Eof,
                pos: start,
            },
            Some('"') => self.read_string(start),
            Some('\'') => self.read_char(start),
            Some(c) if c.is_ascii_digit() => self.read_number(start),
            Some(c) if c.is_ascii_alphabetic() || c == '_' => self.read_identifier(start),
            Some(_) => self.read_punctuator(start),
        }
    }

    /// Scans the whole source, ending with an `Eof` token.
    pub fn tokenize(&mut self) -> Vec<Token> {
        let mut tokens = Vec::new();
        loop {
            let token = self.next_token();
            let done = token.kind == TokenKind::Eof;
            tokens.push(token);
            if done {
                break;
            }
        }
        tokens
    }
}
