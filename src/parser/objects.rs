//! PDF Value model and recursive-descent parser
//!
//! Values are a closed tagged union. Multi-token bare sequences inside a
//! dictionary value slot (e.g. `3 0 R`) are concatenated into a single
//! [`Value::Simple`] string; indirect references are recognized *after*
//! parsing by pattern-matching that string. List elements are never merged,
//! so `[3 0 R]` holds three `Simple`s and [`Value::list_references`] puts
//! the triples back together for consumers.

use super::lexer::{Lexer, Token};
use super::{ParseError, ParseResult};
use indexmap::IndexMap;
use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref REFERENCE_RE: Regex = Regex::new(r"^\s*(\d+)\s+(\d+)\s+R\s*$").unwrap();
}

/// A parsed PDF value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Numbers, booleans, null, raw bare words and concatenated runs such
    /// as `"3 0 R"`.
    Simple(String),
    /// `(...)` string, stored without the parentheses, escapes verbatim.
    LiteralString(String),
    /// `<...>` string, stored without the angle brackets.
    HexString(String),
    /// `/Name`, stored without the leading slash.
    Name(String),
    /// `[ ... ]`
    List(Vec<Value>),
    /// `<< ... >>`, insertion order preserved.
    Dictionary(IndexMap<String, Value>),
}

/// What ended an indirect object body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminator {
    /// `endobj` followed the value.
    EndObj,
    /// The `stream` keyword followed the value; raw bytes come next.
    StreamBegin,
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", String::from_utf8_lossy(&self.to_pdf_bytes()))
    }
}

impl Value {
    /// Serialize to PDF syntax bytes.
    ///
    /// Literal strings re-emit one byte per char, undoing the byte-to-char
    /// widening the lexer applies, so binary string content survives a
    /// parse/serialize round trip unchanged.
    pub fn to_pdf_bytes(&self) -> Vec<u8> {
        let mut out = Vec::new();
        self.write_syntax(&mut out);
        out
    }

    fn write_syntax(&self, out: &mut Vec<u8>) {
        match self {
            Value::Simple(s) => out.extend_from_slice(s.as_bytes()),
            Value::LiteralString(s) => {
                out.push(b'(');
                for c in s.chars() {
                    if (c as u32) < 0x100 {
                        out.push(c as u8);
                    } else {
                        out.extend_from_slice(c.to_string().as_bytes());
                    }
                }
                out.push(b')');
            }
            Value::HexString(s) => {
                out.push(b'<');
                out.extend_from_slice(s.as_bytes());
                out.push(b'>');
            }
            Value::Name(s) => {
                out.push(b'/');
                out.extend_from_slice(s.as_bytes());
            }
            Value::List(items) => {
                out.push(b'[');
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        out.push(b' ');
                    }
                    item.write_syntax(out);
                }
                out.push(b']');
            }
            Value::Dictionary(dict) => {
                out.extend_from_slice(b"<<");
                for (key, value) in dict {
                    out.push(b' ');
                    out.push(b'/');
                    out.extend_from_slice(key.as_bytes());
                    out.push(b' ');
                    value.write_syntax(out);
                }
                out.extend_from_slice(b" >>");
            }
        }
    }

    /// Parse one value from the token stream.
    pub fn parse(lexer: &mut Lexer) -> ParseResult<Self> {
        let token = lexer.next_token()?;
        Self::parse_from_token(lexer, token)
    }

    fn parse_from_token(lexer: &mut Lexer, token: Token) -> ParseResult<Self> {
        match token {
            Token::Name(n) => Ok(Value::Name(n)),
            Token::LiteralString(s) => Ok(Value::LiteralString(s)),
            Token::HexString(s) => Ok(Value::HexString(s)),
            Token::ListStart => Self::parse_list(lexer),
            Token::DictStart => Self::parse_dictionary(lexer),
            ref t if t.is_word_like() => Ok(Value::Simple(t.text().to_string())),
            Token::Eof => Err(ParseError::SyntaxError {
                position: lexer.position(),
                message: "unexpected end of input".to_string(),
            }),
            other => Err(ParseError::UnexpectedToken {
                expected: "value".to_string(),
                found: format!("{other:?}"),
            }),
        }
    }

    /// Parse a list. Elements are taken one token at a time; consecutive
    /// bare words each become their own `Simple`.
    fn parse_list(lexer: &mut Lexer) -> ParseResult<Self> {
        let mut items = Vec::new();
        loop {
            let token = lexer.next_token()?;
            match token {
                Token::ListEnd => break,
                Token::Eof => {
                    return Err(ParseError::SyntaxError {
                        position: lexer.position(),
                        message: "unterminated list".to_string(),
                    })
                }
                other => items.push(Self::parse_from_token(lexer, other)?),
            }
        }
        Ok(Value::List(items))
    }

    /// Parse a dictionary of `Name` / value pairs. Each value slot consumes
    /// a **simple-run**: any bare words following the first value are
    /// concatenated onto it, which is how `3 0 R` survives as one string.
    fn parse_dictionary(lexer: &mut Lexer) -> ParseResult<Self> {
        let mut dict = IndexMap::new();
        loop {
            let token = lexer.next_token()?;
            match token {
                Token::DictEnd => break,
                Token::Name(key) => {
                    let mut value = Self::parse(lexer)?;
                    loop {
                        let next = lexer.peek_token()?;
                        if next.is_word_like() {
                            lexer.next_token()?;
                            value.push(Value::Simple(next.text().to_string()))?;
                        } else {
                            break;
                        }
                    }
                    dict.insert(key, value);
                }
                Token::Eof => {
                    return Err(ParseError::SyntaxError {
                        position: lexer.position(),
                        message: "unterminated dictionary".to_string(),
                    })
                }
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "dictionary key or >>".to_string(),
                        found: format!("{other:?}"),
                    })
                }
            }
        }
        Ok(Value::Dictionary(dict))
    }

    /// Parse an indirect object body, reporting what terminated it.
    ///
    /// Bare words after the value are folded into it the same way as in a
    /// dictionary slot, so a body of `12 0 R` comes back as one `Simple`.
    pub fn parse_object_body(lexer: &mut Lexer) -> ParseResult<(Self, Terminator)> {
        let mut value = Self::parse(lexer)?;
        loop {
            let token = lexer.next_token()?;
            match token {
                Token::EndObj => return Ok((value, Terminator::EndObj)),
                Token::Stream => return Ok((value, Terminator::StreamBegin)),
                Token::Word(w) => value.push(Value::Simple(w))?,
                other => {
                    return Err(ParseError::UnexpectedToken {
                        expected: "endobj or stream".to_string(),
                        found: format!("{other:?}"),
                    })
                }
            }
        }
    }

    /// Integer view of a `Simple` value.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Simple(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Float view of a `Simple` value (integers coerce).
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Simple(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    /// Indirect-reference view: matches `"N G R"` on a `Simple` string.
    pub fn as_reference(&self) -> Option<(u32, u16)> {
        match self {
            Value::Simple(s) => REFERENCE_RE.captures(s).and_then(|caps| {
                let oid = caps[1].parse().ok()?;
                let generation = caps[2].parse().ok()?;
                Some((oid, generation))
            }),
            _ => None,
        }
    }

    /// Name view.
    pub fn as_name(&self) -> Option<&str> {
        match self {
            Value::Name(n) => Some(n),
            _ => None,
        }
    }

    /// List view.
    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Dictionary view.
    pub fn as_dict(&self) -> Option<&IndexMap<String, Value>> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Mutable dictionary view.
    pub fn as_dict_mut(&mut self) -> Option<&mut IndexMap<String, Value>> {
        match self {
            Value::Dictionary(d) => Some(d),
            _ => None,
        }
    }

    /// Dictionary key lookup, `None` for non-dictionaries.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_dict().and_then(|d| d.get(key))
    }

    /// Append to a `List`, or concatenate onto a `Simple` with a space.
    pub fn push(&mut self, value: Value) -> ParseResult<()> {
        match self {
            Value::List(items) => {
                items.push(value);
                Ok(())
            }
            Value::Simple(s) => match value {
                Value::Simple(tail) => {
                    s.push(' ');
                    s.push_str(&tail);
                    Ok(())
                }
                other => Err(ParseError::UnexpectedToken {
                    expected: "bare word to concatenate".to_string(),
                    found: format!("{other:?}"),
                }),
            },
            other => Err(ParseError::UnexpectedToken {
                expected: "List or Simple".to_string(),
                found: format!("{other:?}"),
            }),
        }
    }

    /// Reassemble `INT INT R` triples scattered across list elements.
    ///
    /// Elements that are already complete references (built
    /// programmatically) are passed through.
    pub fn list_references(&self) -> Vec<(u32, u16)> {
        let mut refs = Vec::new();
        let items = match self {
            Value::List(items) => items,
            _ => return refs,
        };
        let mut pending: Vec<i64> = Vec::new();
        for item in items {
            if let Some(r) = item.as_reference() {
                pending.clear();
                refs.push(r);
            } else if let Value::Simple(s) = item {
                if s.trim() == "R" && pending.len() >= 2 {
                    let generation = pending.pop().unwrap();
                    let oid = pending.pop().unwrap();
                    refs.push((oid as u32, generation as u16));
                    pending.clear();
                } else if let Some(n) = item.as_int() {
                    pending.push(n);
                    if pending.len() > 2 {
                        pending.remove(0);
                    }
                } else {
                    pending.clear();
                }
            } else {
                pending.clear();
            }
        }
        refs
    }

    /// Describe the first difference to another value, `None` if equal.
    pub fn diff(&self, other: &Value) -> Option<String> {
        match (self, other) {
            (Value::Simple(a), Value::Simple(b))
            | (Value::LiteralString(a), Value::LiteralString(b))
            | (Value::HexString(a), Value::HexString(b))
            | (Value::Name(a), Value::Name(b)) => {
                if a == b {
                    None
                } else {
                    Some(format!("{a:?} != {b:?}"))
                }
            }
            (Value::List(a), Value::List(b)) => {
                if a.len() != b.len() {
                    return Some(format!("list length {} != {}", a.len(), b.len()));
                }
                for (i, (x, y)) in a.iter().zip(b).enumerate() {
                    if let Some(d) = x.diff(y) {
                        return Some(format!("[{i}]: {d}"));
                    }
                }
                None
            }
            (Value::Dictionary(a), Value::Dictionary(b)) => {
                for key in a.keys() {
                    if !b.contains_key(key) {
                        return Some(format!("/{key} missing on right"));
                    }
                }
                for key in b.keys() {
                    if !a.contains_key(key) {
                        return Some(format!("/{key} missing on left"));
                    }
                }
                for (key, x) in a {
                    if let Some(d) = x.diff(&b[key]) {
                        return Some(format!("/{key}: {d}"));
                    }
                }
                None
            }
            (a, b) => Some(format!(
                "kind mismatch: {} vs {}",
                a.kind_name(),
                b.kind_name()
            )),
        }
    }

    fn kind_name(&self) -> &'static str {
        match self {
            Value::Simple(_) => "Simple",
            Value::LiteralString(_) => "LiteralString",
            Value::HexString(_) => "HexString",
            Value::Name(_) => "Name",
            Value::List(_) => "List",
            Value::Dictionary(_) => "Dictionary",
        }
    }

    /// Build a reference value in its canonical `"N G R"` spelling.
    pub fn reference(oid: u32, generation: u16) -> Value {
        Value::Simple(format!("{oid} {generation} R"))
    }

    /// Build an integer value.
    pub fn integer(n: i64) -> Value {
        Value::Simple(n.to_string())
    }
}

/// An indirect object: value plus optional raw stream bytes.
#[derive(Debug, Clone, PartialEq)]
pub struct PdfObject {
    pub oid: u32,
    /// Only generation 0 is supported; anything else is warned about at
    /// parse time and treated as 0.
    pub generation: u16,
    pub value: Value,
    pub stream: Option<Vec<u8>>,
}

impl PdfObject {
    pub fn new(oid: u32, value: Value) -> Self {
        Self {
            oid,
            generation: 0,
            value,
            stream: None,
        }
    }

    pub fn with_stream(oid: u32, value: Value, stream: Vec<u8>) -> Self {
        Self {
            oid,
            generation: 0,
            value,
            stream: Some(stream),
        }
    }

    /// True when the object's dictionary carries `/Type /{name}`.
    pub fn is_type(&self, name: &str) -> bool {
        self.value.get("Type").and_then(Value::as_name) == Some(name)
    }
}
