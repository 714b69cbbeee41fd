use std::fmt;

use thiserror::Error;

#[derive(Error, Debug, Eq, PartialEq)]
pub enum LexerError {
    #[error("invalid token '{0}'")]
    UnknownCharacter(char, Loc),
    #[error("unclosed string literal")]
    UnterminatedString(Loc),
    #[error("invalid hex escape sequence")]
    InvalidHexEscape(Loc),
    #[error("could not convert the number \"{0}\" to a number")]
    InvalidNumber(String, Loc),
    #[error("identifiers can not start with numbers")]
    IdentifierStartedWithNumber(Loc),
}

impl LexerError {
    pub fn loc(&self) -> Loc {
        match self {
            LexerError::UnknownCharacter(_, loc)
            | LexerError::UnterminatedString(loc)
            | LexerError::InvalidHexEscape(loc)
            | LexerError::InvalidNumber(_, loc)
            | LexerError::IdentifierStartedWithNumber(loc) => *loc,
        }
    }
}

/// Position of the first byte of a token. `line` and `column` are 1-based.
#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct Loc {
    pub offset: usize,
    pub line: usize,
    pub column: usize,
}

#[derive(Eq, PartialEq, Debug, Clone)]
pub enum TokenKind {
    Eof,
    Identifier(String),
    Constant(i64),
    /// Decoded bytes, without the terminating NUL.
    StringLiteral(Vec<u8>),
    OpenParen,
    CloseParen,
    OpenBrace,
    CloseBrace,
    OpenBracket,
    CloseBracket,
    Semicolon,
    Comma,

    // Operator
    Minus,          // -
    Plus,           // +
    Asterisk,       // *
    Slash,          // /
    Ampersand,      // &
    Assign,         // =
    Equal,          // ==
    NotEqual,       // !=
    LessThan,       // <
    GreaterThan,    // >
    LessOrEqual,    // <=
    GreaterOrEqual, // >=

    // Keywords
    KWReturn,
    KWIf,
    KWElse,
    KWFor,
    KWWhile,
    KWInt,
    KWChar,
    KWSizeof,
}

impl TokenKind {
    pub fn from_string(string: &str) -> Self {
        match string {
            "return" => Self::KWReturn,
            "if" => Self::KWIf,
            "else" => Self::KWElse,
            "for" => Self::KWFor,
            "while" => Self::KWWhile,
            "int" => Self::KWInt,
            "char" => Self::KWChar,
            "sizeof" => Self::KWSizeof,
            _ => Self::Identifier(string.to_owned()),
        }
    }
}

impl fmt::Display for TokenKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            TokenKind::Eof => "end of file",
            TokenKind::Identifier(name) => return write!(f, "{name}"),
            TokenKind::Constant(val) => return write!(f, "{val}"),
            TokenKind::StringLiteral(bytes) => {
                return write!(f, "\"{}\"", String::from_utf8_lossy(bytes).escape_debug())
            }
            TokenKind::OpenParen => "(",
            TokenKind::CloseParen => ")",
            TokenKind::OpenBrace => "{",
            TokenKind::CloseBrace => "}",
            TokenKind::OpenBracket => "[",
            TokenKind::CloseBracket => "]",
            TokenKind::Semicolon => ";",
            TokenKind::Comma => ",",
            TokenKind::Minus => "-",
            TokenKind::Plus => "+",
            TokenKind::Asterisk => "*",
            TokenKind::Slash => "/",
            TokenKind::Ampersand => "&",
            TokenKind::Assign => "=",
            TokenKind::Equal => "==",
            TokenKind::NotEqual => "!=",
            TokenKind::LessThan => "<",
            TokenKind::GreaterThan => ">",
            TokenKind::LessOrEqual => "<=",
            TokenKind::GreaterOrEqual => ">=",
            TokenKind::KWReturn => "return",
            TokenKind::KWIf => "if",
            TokenKind::KWElse => "else",
            TokenKind::KWFor => "for",
            TokenKind::KWWhile => "while",
            TokenKind::KWInt => "int",
            TokenKind::KWChar => "char",
            TokenKind::KWSizeof => "sizeof",
        };
        f.write_str(text)
    }
}

#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub loc: Loc,
    /// Length of the token in source bytes.
    pub len: usize,
}

#[derive(Debug)]
pub struct Lexer {
    input: Vec<u8>,
    pos: usize,
    loc: Loc,
}

impl Lexer {
    pub fn new(input: &str) -> Self {
        Self {
            input: input.as_bytes().to_vec(),
            pos: 0,
            loc: Loc {
                offset: 0,
                line: 1,
                column: 1,
            },
        }
    }

    fn ch(&self) -> Option<u8> {
        self.input.get(self.pos).copied()
    }

    fn peek_char(&self) -> Option<u8> {
        self.input.get(self.pos + 1).copied()
    }

    fn read_char(&mut self) -> Option<u8> {
        let ch = self.ch()?;
        self.pos += 1;
        if ch == b'\n' {
            self.loc.line += 1;
            self.loc.column = 1;
        } else {
            self.loc.column += 1;
        }
        self.loc.offset = self.pos;
        Some(ch)
    }

    fn is_digit(&self) -> bool {
        matches!(self.ch(), Some(b'0'..=b'9'))
    }

    fn is_valid_identifier_char(&self) -> bool {
        matches!(self.ch(), Some(b'a'..=b'z' | b'A'..=b'Z' | b'_')) || self.is_digit()
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.ch(), Some(ch) if ch.is_ascii_whitespace()) {
            self.read_char();
        }
    }

    fn read_constant(&mut self) -> Result<TokenKind, LexerError> {
        let old_loc = self.loc;
        let mut string = String::new();

        while let Some(ch @ b'0'..=b'9') = self.ch() {
            string.push(ch as char);
            self.read_char();
        }

        if self.is_valid_identifier_char() {
            return Err(LexerError::IdentifierStartedWithNumber(old_loc));
        }

        let num: i64 = string
            .parse()
            .map_err(|_| LexerError::InvalidNumber(string.clone(), old_loc))?;

        Ok(TokenKind::Constant(num))
    }

    fn read_identifier(&mut self) -> TokenKind {
        let mut string = String::new();

        while self.is_valid_identifier_char() {
            if let Some(ch) = self.read_char() {
                string.push(ch as char);
            }
        }

        TokenKind::from_string(&string)
    }

    fn read_string_literal(&mut self) -> Result<TokenKind, LexerError> {
        let start = self.loc;
        self.read_char(); // opening quote

        let mut bytes = vec![];
        loop {
            match self.ch() {
                None | Some(b'\n') => return Err(LexerError::UnterminatedString(start)),
                Some(b'"') => {
                    self.read_char();
                    break;
                }
                Some(b'\\') => {
                    let escape_loc = self.loc;
                    self.read_char();
                    bytes.push(self.read_escaped_char(escape_loc)?);
                }
                Some(ch) => {
                    bytes.push(ch);
                    self.read_char();
                }
            }
        }

        Ok(TokenKind::StringLiteral(bytes))
    }

    // Expects to be on the character following the backslash.
    fn read_escaped_char(&mut self, escape_loc: Loc) -> Result<u8, LexerError> {
        let Some(ch) = self.ch() else {
            return Err(LexerError::UnterminatedString(escape_loc));
        };

        if matches!(ch, b'0'..=b'7') {
            let mut value: u32 = 0;
            for _ in 0..3 {
                match self.ch() {
                    Some(digit @ b'0'..=b'7') => {
                        value = value * 8 + u32::from(digit - b'0');
                        self.read_char();
                    }
                    _ => break,
                }
            }
            return Ok(value as u8);
        }

        if ch == b'x' {
            self.read_char();
            let mut value: u32 = 0;
            let mut digits = 0;
            while let Some(digit) = self.ch().and_then(|c| (c as char).to_digit(16)) {
                value = value.wrapping_mul(16).wrapping_add(digit);
                digits += 1;
                self.read_char();
            }
            if digits == 0 {
                return Err(LexerError::InvalidHexEscape(escape_loc));
            }
            return Ok(value as u8);
        }

        self.read_char();
        Ok(match ch {
            b'a' => 0x07,
            b'b' => 0x08,
            b't' => b'\t',
            b'n' => b'\n',
            b'v' => 0x0b,
            b'f' => 0x0c,
            b'r' => b'\r',
            // GNU extension
            b'e' => 0x1b,
            other => other,
        })
    }

    fn read_punctuator(&mut self, loc: Loc) -> Result<TokenKind, LexerError> {
        let two = match (self.ch(), self.peek_char()) {
            (Some(b'='), Some(b'=')) => Some(TokenKind::Equal),
            (Some(b'!'), Some(b'=')) => Some(TokenKind::NotEqual),
            (Some(b'<'), Some(b'=')) => Some(TokenKind::LessOrEqual),
            (Some(b'>'), Some(b'=')) => Some(TokenKind::GreaterOrEqual),
            _ => None,
        };
        if let Some(kind) = two {
            self.read_char();
            self.read_char();
            return Ok(kind);
        }

        let kind = match self.ch() {
            Some(b'(') => TokenKind::OpenParen,
            Some(b')') => TokenKind::CloseParen,
            Some(b'{') => TokenKind::OpenBrace,
            Some(b'}') => TokenKind::CloseBrace,
            Some(b'[') => TokenKind::OpenBracket,
            Some(b']') => TokenKind::CloseBracket,
            Some(b';') => TokenKind::Semicolon,
            Some(b',') => TokenKind::Comma,
            Some(b'-') => TokenKind::Minus,
            Some(b'+') => TokenKind::Plus,
            Some(b'*') => TokenKind::Asterisk,
            Some(b'/') => TokenKind::Slash,
            Some(b'&') => TokenKind::Ampersand,
            Some(b'=') => TokenKind::Assign,
            Some(b'<') => TokenKind::LessThan,
            Some(b'>') => TokenKind::GreaterThan,
            _ => {
                let rest = String::from_utf8_lossy(&self.input[self.pos..]);
                let ch = rest.chars().next().unwrap_or('\0');
                return Err(LexerError::UnknownCharacter(ch, loc));
            }
        };
        self.read_char();
        Ok(kind)
    }

    pub fn next_token(&mut self) -> Result<Token, LexerError> {
        self.skip_whitespace();

        let loc = self.loc;
        let kind = match self.ch() {
            None => TokenKind::Eof,
            Some(b'0'..=b'9') => self.read_constant()?,
            Some(b'a'..=b'z' | b'A'..=b'Z' | b'_') => self.read_identifier(),
            Some(b'"') => self.read_string_literal()?,
            Some(_) => self.read_punctuator(loc)?,
        };

        Ok(Token {
            kind,
            loc,
            len: self.pos - loc.offset,
        })
    }
}

/// Lexes the whole input. The returned vector always ends with an `Eof` token.
pub fn tokenize(input: &str) -> Result<Vec<Token>, LexerError> {
    let mut lexer = Lexer::new(input);
    let mut tokens = vec![];

    loop {
        let token = lexer.next_token()?;
        let is_eof = token.kind == TokenKind::Eof;
        tokens.push(token);
        if is_eof {
            break;
        }
    }

    log::trace!("lexed {} tokens", tokens.len());
    Ok(tokens)
}
