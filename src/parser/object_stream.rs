//! Object streams (`/Type /ObjStm`)
//!
//! Compressed containers packing several indirect objects without their
//! `obj`/`endobj` wrappers. The stream starts with a `First`-byte index of
//! `N` whitespace-separated `oid offset` pairs, followed by the
//! concatenated object bodies.

use super::filters::decode_stream;
use super::lexer::{Lexer, Token};
use super::objects::{PdfObject, Value};
use super::resolver;
use super::xref::{XrefEntry, XrefTable};
use super::{ParseError, ParseResult};

/// Extract the object at `index` inside object stream `stream_oid`.
pub fn extract(
    data: &[u8],
    table: &XrefTable,
    stream_oid: u32,
    index: u32,
    expected_oid: u32,
) -> ParseResult<Option<PdfObject>> {
    // The container itself must be offset-addressed; nesting object
    // streams requires /Extends, which is unsupported.
    let container_pos = match table.get(stream_oid) {
        Some(XrefEntry::Offset(pos)) => pos,
        Some(_) => {
            return Err(ParseError::ObjectStreamInvalid(format!(
                "object stream {stream_oid} is not offset-addressed"
            )))
        }
        None => return Ok(None),
    };

    let container = resolver::parse_object_at(data, container_pos, Some(stream_oid), Some(table))?;
    if !container.is_type("ObjStm") {
        return Err(ParseError::ObjectStreamInvalid(format!(
            "object {stream_oid} is not /Type /ObjStm"
        )));
    }
    if container.value.get("Extends").is_some() {
        return Err(ParseError::ObjectStreamInvalid(
            "extended object streams (/Extends) are unsupported".to_string(),
        ));
    }

    let n = container
        .value
        .get("N")
        .and_then(Value::as_int)
        .ok_or_else(|| ParseError::ObjectStreamInvalid("missing /N".to_string()))?
        as usize;
    let first = container
        .value
        .get("First")
        .and_then(Value::as_int)
        .ok_or_else(|| ParseError::ObjectStreamInvalid("missing /First".to_string()))?
        as usize;
    let raw = container
        .stream
        .as_deref()
        .ok_or_else(|| ParseError::ObjectStreamInvalid("object stream has no body".to_string()))?;

    let decoded = decode_stream(&container.value, raw)?;
    if first > decoded.len() {
        return Err(ParseError::ObjectStreamInvalid(
            "/First beyond end of stream".to_string(),
        ));
    }

    // Index prefix: N pairs of "oid offset".
    let mut pairs = Vec::with_capacity(n);
    let mut lexer = Lexer::new(&decoded[..first]);
    for _ in 0..n {
        let oid = read_int(&mut lexer)?;
        let offset = read_int(&mut lexer)?;
        pairs.push((oid as u32, offset as usize));
    }

    let &(found_oid, offset) = pairs.get(index as usize).ok_or_else(|| {
        ParseError::ObjectStreamInvalid(format!(
            "index {index} out of range for object stream {stream_oid} (N={n})"
        ))
    })?;
    if found_oid != expected_oid {
        return Err(ParseError::ObjectIdMismatch {
            expected: expected_oid,
            found: found_oid,
        });
    }

    // The body span runs to the next-larger offset, or to the end.
    let start = first + offset;
    let end = pairs
        .iter()
        .map(|&(_, o)| o)
        .filter(|&o| o > offset)
        .min()
        .map(|o| first + o)
        .unwrap_or(decoded.len());
    if start > end || end > decoded.len() {
        return Err(ParseError::ObjectStreamInvalid(format!(
            "body span {start}..{end} out of bounds"
        )));
    }

    // Re-wrap the span as a standalone object so the ordinary object
    // parser handles it.
    let mut synthetic = format!("{found_oid} 0 obj\n").into_bytes();
    synthetic.extend_from_slice(&decoded[start..end]);
    synthetic.extend_from_slice(b"\nendobj\n");

    let object = resolver::parse_object_at(&synthetic, 0, Some(expected_oid), None)?;
    Ok(Some(object))
}

fn read_int(lexer: &mut Lexer) -> ParseResult<i64> {
    match lexer.next_token()? {
        Token::Word(w) => w.parse().map_err(|_| {
            ParseError::ObjectStreamInvalid(format!("non-integer in index prefix: {w:?}"))
        }),
        other => Err(ParseError::ObjectStreamInvalid(format!(
            "unexpected token in index prefix: {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Build a file holding one uncompressed ObjStm with three objects.
    fn fixture() -> (Vec<u8>, XrefTable) {
        let bodies = ["<< /A 1 >>", "(text)", "<< /Kids [9 0 R] >>"];
        let mut payload = String::new();
        let mut index = String::new();
        let oids = [11u32, 12, 13];
        for (oid, body) in oids.iter().zip(bodies) {
            if !index.is_empty() {
                index.push(' ');
            }
            index.push_str(&format!("{oid} {}", payload.len()));
            payload.push_str(body);
        }
        let first = index.len() + 1;
        let stream = format!("{index}\n{payload}");

        let mut data = Vec::new();
        data.extend_from_slice(b"%PDF-1.5\n");
        let container_pos = data.len() as u64;
        data.extend_from_slice(
            format!(
                "5 0 obj\n<< /Type /ObjStm /N 3 /First {first} /Length {} >>\nstream\n{stream}\nendstream\nendobj\n",
                stream.len()
            )
            .as_bytes(),
        );

        let mut table = XrefTable::new();
        table.insert(5, XrefEntry::Offset(container_pos));
        for (i, &oid) in oids.iter().enumerate() {
            table.insert(
                oid,
                XrefEntry::InObjectStream {
                    stream_oid: 5,
                    index: i as u32,
                },
            );
        }
        (data, table)
    }

    #[test]
    fn test_extract_middle_and_last() {
        let (data, table) = fixture();
        let obj = extract(&data, &table, 5, 1, 12).unwrap().unwrap();
        assert_eq!(obj.value, Value::LiteralString("text".to_string()));
        assert!(obj.stream.is_none());

        let obj = extract(&data, &table, 5, 2, 13).unwrap().unwrap();
        assert_eq!(obj.value.get("Kids").unwrap().list_references(), vec![(9, 0)]);

        // Same content stored offset-addressed parses to an equal object.
        let direct =
            resolver::parse_object_at(b"13 0 obj\n<< /Kids [9 0 R] >>\nendobj\n", 0, Some(13), None)
                .unwrap();
        assert_eq!(obj, direct);
    }

    #[test]
    fn test_oid_mismatch_detected() {
        let (data, table) = fixture();
        let err = extract(&data, &table, 5, 0, 99).unwrap_err();
        assert!(matches!(err, ParseError::ObjectIdMismatch { .. }));
    }

    #[test]
    fn test_index_out_of_range() {
        let (data, table) = fixture();
        let err = extract(&data, &table, 5, 7, 11).unwrap_err();
        assert!(matches!(err, ParseError::ObjectStreamInvalid(_)));
    }
}
