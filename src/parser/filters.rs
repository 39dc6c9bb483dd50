//! Stream filters
//!
//! Only FlateDecode is needed by the structure engine (xref streams and
//! object streams); anything else is reported, not guessed at.

use super::objects::Value;
use super::{ParseError, ParseResult};
use flate2::read::ZlibDecoder;
use std::io::Read;

/// Decode a stream body according to the dictionary's `/Filter`.
///
/// No filter means the data is already raw. `/DecodeParms` (predictors)
/// are not supported by this engine and fail loudly.
pub fn decode_stream(dict: &Value, data: &[u8]) -> ParseResult<Vec<u8>> {
    if dict.get("DecodeParms").is_some() {
        return Err(ParseError::StreamDecodeError(
            "DecodeParms (predictors) are not supported".to_string(),
        ));
    }
    match dict.get("Filter") {
        None => Ok(data.to_vec()),
        Some(Value::Name(name)) if name == "FlateDecode" => inflate(data),
        Some(Value::List(filters)) if filters.is_empty() => Ok(data.to_vec()),
        Some(Value::List(filters))
            if filters.len() == 1 && filters[0].as_name() == Some("FlateDecode") =>
        {
            inflate(data)
        }
        Some(other) => Err(ParseError::StreamDecodeError(format!(
            "unsupported filter: {other}"
        ))),
    }
}

fn inflate(data: &[u8]) -> ParseResult<Vec<u8>> {
    let mut decoder = ZlibDecoder::new(data);
    let mut out = Vec::new();
    decoder
        .read_to_end(&mut out)
        .map_err(|e| ParseError::StreamDecodeError(format!("flate decode failed: {e}")))?;
    Ok(out)
}

/// Compress data with flate, used when writing compressed streams.
pub fn encode_flate(data: &[u8]) -> ParseResult<Vec<u8>> {
    use flate2::write::ZlibEncoder;
    use flate2::Compression;
    use std::io::Write;

    let mut encoder = ZlibEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| ParseError::StreamDecodeError(format!("flate encode failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| ParseError::StreamDecodeError(format!("flate encode failed: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flate_round_trip() {
        let data = b"0 12 1 45 2 99 repeated repeated repeated";
        let packed = encode_flate(data).unwrap();
        let mut lexer = crate::parser::Lexer::new(b"<< /Filter /FlateDecode >>");
        let dict = Value::parse(&mut lexer).unwrap();
        assert_eq!(decode_stream(&dict, &packed).unwrap(), data);
    }

    #[test]
    fn test_no_filter_passthrough() {
        let mut lexer = crate::parser::Lexer::new(b"<< /Length 3 >>");
        let dict = Value::parse(&mut lexer).unwrap();
        assert_eq!(decode_stream(&dict, b"abc").unwrap(), b"abc");
    }

    #[test]
    fn test_unknown_filter_rejected() {
        let mut lexer = crate::parser::Lexer::new(b"<< /Filter /LZWDecode >>");
        let dict = Value::parse(&mut lexer).unwrap();
        assert!(decode_stream(&dict, b"abc").is_err());
    }
}
