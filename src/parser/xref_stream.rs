//! Cross-reference streams (PDF 1.5+)
//!
//! The binary alternative to the classic text xref table: fixed-width
//! big-endian records described by the `W` array, grouped into oid ranges
//! by the `Index` array.

use super::filters::decode_stream;
use super::lexer::{Lexer, Token};
use super::objects::{Terminator, Value};
use super::xref::XrefEntry;
use super::{ParseError, ParseResult};
use tracing::warn;

/// Parse the xref stream object at `offset` and decode its records.
///
/// Returns the entries in declaration order together with the stream
/// dictionary, which doubles as the trailer for this revision.
pub fn parse_at(data: &[u8], offset: u64) -> ParseResult<(Vec<(u32, XrefEntry)>, Value)> {
    let malformed = |message: String| ParseError::XrefMalformed { offset, message };

    let mut lexer = Lexer::at(data, offset as usize);
    let _oid: u32 = expect_int_word(&mut lexer)
        .ok_or_else(|| malformed("expected xref stream object header".to_string()))?;
    let _generation: u32 = expect_int_word(&mut lexer)
        .ok_or_else(|| malformed("expected generation in object header".to_string()))?;
    if lexer.next_token()? != Token::Obj {
        return Err(malformed("expected obj keyword".to_string()));
    }

    let (dict, term) = Value::parse_object_body(&mut lexer)?;
    if term != Terminator::StreamBegin {
        return Err(malformed("xref object has no stream body".to_string()));
    }
    if dict.get("Type").and_then(Value::as_name) != Some("XRef") {
        return Err(malformed("object at xref offset is not /Type /XRef".to_string()));
    }

    // All keys of an xref stream dictionary must be direct values; in
    // particular Length cannot be an indirect reference here.
    let length = dict
        .get("Length")
        .and_then(Value::as_int)
        .ok_or_else(|| malformed("xref stream Length missing or indirect".to_string()))?;

    lexer.skip_stream_eol();
    let raw = lexer.read_bytes(length as usize)?;
    let decoded = decode_stream(&dict, &raw)?;

    let entries = decode_entries(&dict, &decoded, offset)?;
    Ok((entries, dict))
}

fn expect_int_word(lexer: &mut Lexer) -> Option<u32> {
    match lexer.next_token().ok()? {
        Token::Word(w) => w.parse().ok(),
        _ => None,
    }
}

/// Decode fixed-width records into xref entries.
pub fn decode_entries(
    dict: &Value,
    data: &[u8],
    offset: u64,
) -> ParseResult<Vec<(u32, XrefEntry)>> {
    let malformed = |message: String| ParseError::XrefMalformed { offset, message };

    let widths: Vec<usize> = dict
        .get("W")
        .and_then(Value::as_list)
        .map(|items| items.iter().filter_map(|v| v.as_int()).collect::<Vec<_>>())
        .filter(|w: &Vec<i64>| w.len() == 3 && w.iter().all(|&n| (0..=8).contains(&n)))
        .map(|w| w.into_iter().map(|n| n as usize).collect())
        .ok_or_else(|| malformed("W must be three small integers".to_string()))?;

    let size = dict
        .get("Size")
        .and_then(Value::as_int)
        .ok_or_else(|| malformed("Size missing from xref stream".to_string()))?
        as u32;

    let index: Vec<(u32, u32)> = match dict.get("Index").and_then(Value::as_list) {
        Some(items) => {
            let ints: Vec<i64> = items.iter().filter_map(|v| v.as_int()).collect();
            if ints.len() != items.len() || ints.len() % 2 != 0 {
                return Err(malformed("Index must be pairs of integers".to_string()));
            }
            ints.chunks(2).map(|p| (p[0] as u32, p[1] as u32)).collect()
        }
        None => vec![(0, size)],
    };

    let record_len: usize = widths.iter().sum();
    if record_len == 0 {
        return Err(malformed("zero-width xref records".to_string()));
    }

    let mut entries = Vec::new();
    let mut pos = 0usize;
    for &(start, count) in &index {
        for i in 0..count {
            if pos + record_len > data.len() {
                return Err(malformed("xref stream data truncated".to_string()));
            }
            let mut fields = [0u64; 3];
            for (f, &width) in widths.iter().enumerate() {
                fields[f] = if width == 0 {
                    // A zero-width type field defaults to 1 (in use).
                    if f == 0 {
                        1
                    } else {
                        0
                    }
                } else {
                    read_field(&data[pos..pos + width])
                };
                pos += width;
            }

            let oid = start + i;
            let entry = match fields[0] {
                0 => XrefEntry::Free,
                1 => {
                    if fields[2] != 0 {
                        warn!(oid, generation = fields[2], "non-zero generation is unsupported");
                    }
                    XrefEntry::Offset(fields[1])
                }
                2 => {
                    let stream_oid = u32::try_from(fields[1]).map_err(|_| {
                        malformed(format!("stream oid {} overflows u32", fields[1]))
                    })?;
                    let index = u32::try_from(fields[2]).map_err(|_| {
                        malformed(format!("stream index {} overflows u32", fields[2]))
                    })?;
                    XrefEntry::InObjectStream { stream_oid, index }
                }
                other => {
                    return Err(malformed(format!("invalid xref record type {other}")));
                }
            };
            if !(oid == 0 && entry == XrefEntry::Free) {
                entries.push((oid, entry));
            }
        }
    }

    Ok(entries)
}

/// Big-endian unsigned read of up to 8 bytes.
fn read_field(bytes: &[u8]) -> u64 {
    let mut value = 0u64;
    for &b in bytes {
        value = (value << 8) | b as u64;
    }
    value
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dict(text: &[u8]) -> Value {
        let mut lexer = Lexer::new(text);
        Value::parse(&mut lexer).unwrap()
    }

    #[test]
    fn test_read_field() {
        assert_eq!(read_field(&[0x00]), 0);
        assert_eq!(read_field(&[0x01, 0x23]), 0x0123);
        assert_eq!(read_field(&[0x12, 0x34, 0x56]), 0x123456);
    }

    #[test]
    fn test_in_object_stream_record() {
        // W=[1,2,1], record 02 0005 03 => object inside stream 5, index 3
        let d = dict(b"<< /W [1 2 1] /Size 11 /Index [10 1] >>");
        let entries = decode_entries(&d, &[0x02, 0x00, 0x05, 0x03], 0).unwrap();
        assert_eq!(
            entries,
            vec![(
                10,
                XrefEntry::InObjectStream {
                    stream_oid: 5,
                    index: 3
                }
            )]
        );
    }

    #[test]
    fn test_default_index_covers_size() {
        let d = dict(b"<< /W [1 2 1] /Size 2 >>");
        let data = [
            0x00, 0x00, 0x00, 0xFF, // free head, dropped
            0x01, 0x00, 0x0A, 0x00, // oid 1 at offset 10
        ];
        let entries = decode_entries(&d, &data, 0).unwrap();
        assert_eq!(entries, vec![(1, XrefEntry::Offset(10))]);
    }

    #[test]
    fn test_zero_width_type_defaults_to_in_use() {
        let d = dict(b"<< /W [0 2 0] /Size 1 /Index [7 1] >>");
        let entries = decode_entries(&d, &[0x00, 0x2A], 0).unwrap();
        assert_eq!(entries, vec![(7, XrefEntry::Offset(42))]);
    }

    #[test]
    fn test_wide_stream_oid_overflow_rejected() {
        let d = dict(b"<< /W [1 8 1] /Size 1 /Index [3 1] >>");
        let mut data = vec![0x02];
        data.extend_from_slice(&(u32::MAX as u64 + 1).to_be_bytes());
        data.push(0x00);
        let err = decode_entries(&d, &data, 0).unwrap_err();
        assert!(matches!(err, ParseError::XrefMalformed { .. }));
    }

    #[test]
    fn test_truncated_data_fails() {
        let d = dict(b"<< /W [1 2 1] /Size 2 >>");
        assert!(decode_entries(&d, &[0x01, 0x00], 0).is_err());
    }

    #[test]
    fn test_bad_w_rejected() {
        let d = dict(b"<< /W [1 2] /Size 1 >>");
        assert!(decode_entries(&d, &[0x01, 0x00, 0x00], 0).is_err());
    }
}
