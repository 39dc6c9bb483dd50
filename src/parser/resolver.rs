//! Lazy object resolver
//!
//! Locates and parses a single indirect object from the original buffer,
//! either at a direct byte offset or inside an object stream. Resolution is
//! stateless; callers wanting caching keep their own overlay.

use super::lexer::{Lexer, Token};
use super::objects::{PdfObject, Terminator, Value};
use super::xref::{XrefEntry, XrefTable};
use super::{object_stream, ParseError, ParseResult};
use tracing::warn;

/// Look up and parse object `oid`. `Ok(None)` when the oid never existed
/// or was last freed.
pub fn find_object(data: &[u8], table: &XrefTable, oid: u32) -> ParseResult<Option<PdfObject>> {
    if oid == 0 {
        return Ok(None);
    }
    match table.get(oid) {
        None | Some(XrefEntry::Free) => Ok(None),
        Some(XrefEntry::Offset(pos)) => {
            parse_object_at(data, pos, Some(oid), Some(table)).map(Some)
        }
        Some(XrefEntry::InObjectStream { stream_oid, index }) => {
            object_stream::extract(data, table, stream_oid, index, oid)
        }
    }
}

/// Parse the `"<oid> <gen> obj ... endobj"` structure at a byte offset.
///
/// When `table` is `None`, an indirect `/Length` cannot be resolved and the
/// stream is an error; this also bounds the recursion depth for Length
/// lookups to one hop.
pub fn parse_object_at(
    data: &[u8],
    pos: u64,
    expected_oid: Option<u32>,
    table: Option<&XrefTable>,
) -> ParseResult<PdfObject> {
    if pos as usize >= data.len() {
        return Err(ParseError::SyntaxError {
            position: pos as usize,
            message: "object offset beyond end of file".to_string(),
        });
    }

    let mut lexer = Lexer::at(data, pos as usize);
    let oid = read_header_int(&mut lexer, "object id")? as u32;
    let generation = read_header_int(&mut lexer, "generation")? as u16;
    match lexer.next_token()? {
        Token::Obj => {}
        other => {
            return Err(ParseError::UnexpectedToken {
                expected: "obj".to_string(),
                found: format!("{other:?}"),
            })
        }
    }

    if let Some(expected) = expected_oid {
        if oid != expected {
            return Err(ParseError::ObjectIdMismatch {
                expected,
                found: oid,
            });
        }
    }
    if generation != 0 {
        warn!(oid, generation, "non-zero generation is unsupported");
    }

    let (value, term) = Value::parse_object_body(&mut lexer)?;
    let stream = match term {
        Terminator::EndObj => None,
        Terminator::StreamBegin => {
            let length = resolve_length(&value, data, table, oid)?;
            lexer.skip_stream_eol();
            let bytes = lexer.read_bytes(length)?;
            expect_token(&mut lexer, Token::EndStream)?;
            expect_token(&mut lexer, Token::EndObj)?;
            Some(bytes)
        }
    };

    Ok(PdfObject {
        oid,
        generation,
        value,
        stream,
    })
}

/// Resolve the stream `/Length`, following one indirect reference through
/// the xref table when needed.
fn resolve_length(
    dict: &Value,
    data: &[u8],
    table: Option<&XrefTable>,
    oid: u32,
) -> ParseResult<usize> {
    let length = dict
        .get("Length")
        .ok_or(ParseError::StreamLengthUnresolvable(oid))?;

    if let Some(n) = length.as_int() {
        return usize::try_from(n).map_err(|_| ParseError::StreamLengthUnresolvable(oid));
    }

    if let Some((len_oid, _)) = length.as_reference() {
        let table = table.ok_or(ParseError::StreamLengthUnresolvable(oid))?;
        // Only an offset-addressed Length object can be chased; the nested
        // parse gets no table, so further indirection fails cleanly.
        if let Some(XrefEntry::Offset(pos)) = table.get(len_oid) {
            let obj = parse_object_at(data, pos, Some(len_oid), None)?;
            if let Some(n) = obj.value.as_int() {
                return usize::try_from(n).map_err(|_| ParseError::StreamLengthUnresolvable(oid));
            }
        }
    }

    Err(ParseError::StreamLengthUnresolvable(oid))
}

fn read_header_int(lexer: &mut Lexer, what: &str) -> ParseResult<u64> {
    match lexer.next_token()? {
        Token::Word(w) => w.parse().map_err(|_| ParseError::SyntaxError {
            position: lexer.position(),
            message: format!("{what} is not an integer: {w:?}"),
        }),
        other => Err(ParseError::UnexpectedToken {
            expected: what.to_string(),
            found: format!("{other:?}"),
        }),
    }
}

fn expect_token(lexer: &mut Lexer, expected: Token) -> ParseResult<()> {
    let token = lexer.next_token()?;
    if token == expected {
        Ok(())
    } else {
        Err(ParseError::UnexpectedToken {
            expected: format!("{expected:?}"),
            found: format!("{token:?}"),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_offset_addressed_object() {
        let data = b"junk 7 0 obj\n<< /Type /Catalog /Pages 2 0 R >>\nendobj\n";
        let obj = parse_object_at(data, 5, Some(7), None).unwrap();
        assert_eq!(obj.oid, 7);
        assert!(obj.is_type("Catalog"));
        assert_eq!(obj.value.get("Pages").unwrap().as_reference(), Some((2, 0)));
    }

    #[test]
    fn test_oid_mismatch() {
        let data = b"3 0 obj\n42\nendobj\n";
        let err = parse_object_at(data, 0, Some(4), None).unwrap_err();
        assert!(matches!(
            err,
            ParseError::ObjectIdMismatch {
                expected: 4,
                found: 3
            }
        ));
    }

    #[test]
    fn test_stream_with_direct_length() {
        let data = b"8 0 obj\n<< /Length 5 >>\nstream\r\nABCDE\nendstream\nendobj\n";
        let obj = parse_object_at(data, 0, Some(8), None).unwrap();
        assert_eq!(obj.stream.as_deref(), Some(b"ABCDE".as_slice()));
    }

    #[test]
    fn test_stream_with_indirect_length() {
        let mut data = Vec::new();
        data.extend_from_slice(b"8 0 obj\n<< /Length 9 0 R >>\nstream\nHELLO\nendstream\nendobj\n");
        let len_pos = data.len() as u64;
        data.extend_from_slice(b"9 0 obj\n5\nendobj\n");

        let mut table = XrefTable::new();
        table.insert(8, XrefEntry::Offset(0));
        table.insert(9, XrefEntry::Offset(len_pos));

        let obj = find_object(&data, &table, 8).unwrap().unwrap();
        assert_eq!(obj.stream.as_deref(), Some(b"HELLO".as_slice()));

        // Without a table the indirect Length must fail.
        let err = parse_object_at(&data, 0, Some(8), None).unwrap_err();
        assert!(matches!(err, ParseError::StreamLengthUnresolvable(8)));
    }

    #[test]
    fn test_free_and_missing_objects() {
        let mut table = XrefTable::new();
        table.insert(2, XrefEntry::Free);
        assert!(find_object(b"", &table, 0).unwrap().is_none());
        assert!(find_object(b"", &table, 2).unwrap().is_none());
        assert!(find_object(b"", &table, 3).unwrap().is_none());
    }
}
