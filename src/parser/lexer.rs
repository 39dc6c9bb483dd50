//! PDF Tokenizer
//!
//! Turns a byte cursor into a stream of typed tokens. Bare words are
//! classified by exact match into the `obj`/`endobj`/`stream`/`endstream`
//! keywords; everything else non-delimited stays a [`Token::Word`] and is
//! interpreted later by the value parser.

use super::{ParseError, ParseResult};

/// PDF token kinds
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Dictionary start `<<`
    DictStart,
    /// Dictionary end `>>`
    DictEnd,
    /// List start `[`
    ListStart,
    /// List end `]`
    ListEnd,
    /// Name without the leading slash, e.g. `Type` for `/Type`
    Name(String),
    /// Literal string body without the surrounding parentheses
    LiteralString(String),
    /// Hex string body without the surrounding angle brackets
    HexString(String),
    /// Bare word: numbers, booleans, `null`, `R`, anything non-delimited
    Word(String),
    /// `obj` keyword
    Obj,
    /// `endobj` keyword
    EndObj,
    /// `stream` keyword
    Stream,
    /// `endstream` keyword
    EndStream,
    /// End of input
    Eof,
}

impl Token {
    /// True for tokens that the value parser folds into a `Simple` run.
    pub fn is_word_like(&self) -> bool {
        matches!(
            self,
            Token::Word(_) | Token::Obj | Token::EndObj | Token::Stream | Token::EndStream
        )
    }

    /// The raw text this token was lexed from.
    pub fn text(&self) -> &str {
        match self {
            Token::DictStart => "<<",
            Token::DictEnd => ">>",
            Token::ListStart => "[",
            Token::ListEnd => "]",
            Token::Name(s) | Token::LiteralString(s) | Token::HexString(s) | Token::Word(s) => s,
            Token::Obj => "obj",
            Token::EndObj => "endobj",
            Token::Stream => "stream",
            Token::EndStream => "endstream",
            Token::Eof => "",
        }
    }
}

/// Tokenizer over an in-memory byte buffer.
pub struct Lexer<'a> {
    data: &'a [u8],
    pos: usize,
    pushed: Vec<Token>,
}

fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\r' | b'\n' | b'\x0c' | b'\0')
}

fn is_delimiter(b: u8) -> bool {
    matches!(b, b'<' | b'>' | b'(' | b')' | b'[' | b']' | b'/' | b'%')
}

impl<'a> Lexer<'a> {
    /// Create a lexer over the whole buffer.
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            data,
            pos: 0,
            pushed: Vec::new(),
        }
    }

    /// Create a lexer starting at a byte offset.
    pub fn at(data: &'a [u8], pos: usize) -> Self {
        Self {
            data,
            pos,
            pushed: Vec::new(),
        }
    }

    /// Current byte position (undefined while tokens are pushed back).
    pub fn position(&self) -> usize {
        self.pos
    }

    fn peek_byte(&self) -> Option<u8> {
        self.data.get(self.pos).copied()
    }

    /// Skip whitespace and `%` comments (up to end of line).
    pub fn skip_whitespace(&mut self) {
        while let Some(b) = self.peek_byte() {
            if is_whitespace(b) {
                self.pos += 1;
            } else if b == b'%' {
                while let Some(b) = self.peek_byte() {
                    self.pos += 1;
                    if b == b'\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    /// Push a token back; it is returned by the next `next_token` call.
    pub fn push_token(&mut self, token: Token) {
        self.pushed.push(token);
    }

    /// Look at the next token without consuming it.
    pub fn peek_token(&mut self) -> ParseResult<Token> {
        let token = self.next_token()?;
        self.pushed.push(token.clone());
        Ok(token)
    }

    /// Get the next token.
    pub fn next_token(&mut self) -> ParseResult<Token> {
        if let Some(token) = self.pushed.pop() {
            return Ok(token);
        }

        self.skip_whitespace();

        let b = match self.peek_byte() {
            Some(b) => b,
            None => return Ok(Token::Eof),
        };

        match b {
            b'<' => {
                if self.data.get(self.pos + 1) == Some(&b'<') {
                    self.pos += 2;
                    Ok(Token::DictStart)
                } else {
                    self.read_hex_string()
                }
            }
            b'>' => {
                if self.data.get(self.pos + 1) == Some(&b'>') {
                    self.pos += 2;
                    Ok(Token::DictEnd)
                } else {
                    Err(ParseError::SyntaxError {
                        position: self.pos,
                        message: "expected '>>' but found single '>'".to_string(),
                    })
                }
            }
            b'[' => {
                self.pos += 1;
                Ok(Token::ListStart)
            }
            b']' => {
                self.pos += 1;
                Ok(Token::ListEnd)
            }
            b'/' => self.read_name(),
            b'(' => self.read_literal_string(),
            b')' => Err(ParseError::SyntaxError {
                position: self.pos,
                message: "unexpected ')'".to_string(),
            }),
            _ => self.read_word(),
        }
    }

    fn read_name(&mut self) -> ParseResult<Token> {
        // Skip the leading slash
        self.pos += 1;
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        let text = String::from_utf8_lossy(&self.data[start..self.pos]).into_owned();
        Ok(Token::Name(text))
    }

    fn read_literal_string(&mut self) -> ParseResult<Token> {
        let start_pos = self.pos;
        // Skip the opening parenthesis
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek_byte() {
                // Only the `\)` escape is recognized; the escape is kept
                // verbatim so re-serialization reproduces the input bytes.
                Some(b'\\') if self.data.get(self.pos + 1) == Some(&b')') => {
                    text.push('\\');
                    text.push(')');
                    self.pos += 2;
                }
                Some(b')') => {
                    self.pos += 1;
                    return Ok(Token::LiteralString(text));
                }
                Some(b) => {
                    text.push(b as char);
                    self.pos += 1;
                }
                None => {
                    return Err(ParseError::SyntaxError {
                        position: start_pos,
                        message: "unterminated literal string".to_string(),
                    })
                }
            }
        }
    }

    fn read_hex_string(&mut self) -> ParseResult<Token> {
        let start_pos = self.pos;
        // Skip the opening angle bracket
        self.pos += 1;
        let mut text = String::new();
        loop {
            match self.peek_byte() {
                Some(b'>') => {
                    self.pos += 1;
                    return Ok(Token::HexString(text));
                }
                Some(b) if b.is_ascii_hexdigit() || is_whitespace(b) => {
                    text.push(b as char);
                    self.pos += 1;
                }
                Some(b) => {
                    return Err(ParseError::SyntaxError {
                        position: self.pos,
                        message: format!("invalid character in hex string: 0x{b:02x}"),
                    })
                }
                None => {
                    return Err(ParseError::SyntaxError {
                        position: start_pos,
                        message: "unterminated hex string".to_string(),
                    })
                }
            }
        }
    }

    fn read_word(&mut self) -> ParseResult<Token> {
        let start = self.pos;
        while let Some(b) = self.peek_byte() {
            if is_whitespace(b) || is_delimiter(b) {
                break;
            }
            self.pos += 1;
        }
        if self.pos == start {
            return Err(ParseError::SyntaxError {
                position: start,
                message: format!("unexpected byte 0x{:02x}", self.data[start]),
            });
        }
        let text = String::from_utf8_lossy(&self.data[start..self.pos]).into_owned();
        Ok(match text.as_str() {
            "obj" => Token::Obj,
            "endobj" => Token::EndObj,
            "stream" => Token::Stream,
            "endstream" => Token::EndStream,
            _ => Token::Word(text),
        })
    }

    /// Skip the end-of-line marker after the `stream` keyword.
    ///
    /// PDF mandates `\r\n` or `\n`; lone `\r` is tolerated.
    pub fn skip_stream_eol(&mut self) {
        if self.peek_byte() == Some(b'\r') {
            self.pos += 1;
        }
        if self.peek_byte() == Some(b'\n') {
            self.pos += 1;
        }
    }

    /// Read exactly `len` raw bytes at the current position.
    pub fn read_bytes(&mut self, len: usize) -> ParseResult<Vec<u8>> {
        if self.pos + len > self.data.len() {
            return Err(ParseError::SyntaxError {
                position: self.pos,
                message: format!("stream of {len} bytes runs past end of input"),
            });
        }
        let bytes = self.data[self.pos..self.pos + len].to_vec();
        self.pos += len;
        Ok(bytes)
    }
}
