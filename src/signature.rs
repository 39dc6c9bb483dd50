//! Signature slot reservation and byte-range patching
//!
//! The signature object is emitted with fixed-width placeholders for
//! `/ByteRange` and `/Contents`, so the real values can be substituted
//! later without moving a single byte. Total file length never changes
//! after substitution; that is what keeps the xref offsets and the byte
//! ranges valid.
//!
//! The cryptographic work lives behind the [`Signer`] collaborator, which
//! maps the two signed spans to a raw PKCS7 (CMS) blob.

use crate::document::Document;
use crate::error::{PdfError, Result};
use crate::parser::objects::PdfObject;
use crate::parser::Value;
use crate::writer::{self, WriteMode};
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use thiserror::Error;

/// Width of the `/Contents` hex placeholder: the maximum anticipated
/// signature size, in hex digits.
pub const MAX_SIGNATURE_HEX_LEN: usize = 19742;

/// Serialized width of the `/Contents` field including the `<` `>`
/// delimiters.
pub const CONTENTS_FIELD_LEN: usize = MAX_SIGNATURE_HEX_LEN + 2;

/// Fixed serialized width of the `/ByteRange` value.
pub const BYTE_RANGE_WIDTH: usize = 68;

/// Signing failures.
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("signature of {len} hex digits exceeds the reserved {max}")]
    TooLarge { len: usize, max: usize },

    #[error("signature collaborator failed: {0}")]
    Collaborator(String),

    #[error("serialized signature object is missing its {0} placeholder")]
    PlaceholderNotFound(&'static str),

    #[error("byte range {0} does not fit the fixed-width placeholder")]
    RangeOverflow(String),
}

/// External signing collaborator.
///
/// `prefix` and `suffix` are the two signed spans of the output file (all
/// bytes except the `/Contents` field). The implementation returns the raw
/// detached PKCS7 blob; hex encoding and padding stay in the engine.
pub trait Signer {
    fn sign(&self, prefix: &[u8], suffix: &[u8]) -> std::result::Result<Vec<u8>, SignatureError>;
}

/// Build the placeholder signature object.
pub fn build_signature_object(oid: u32, signed_at: DateTime<Utc>) -> PdfObject {
    let mut dict = IndexMap::new();
    dict.insert("Filter".to_string(), Value::Name("Adobe.PPKLite".to_string()));
    dict.insert("Type".to_string(), Value::Name("Sig".to_string()));
    dict.insert(
        "SubFilter".to_string(),
        Value::Name("adbe.pkcs7.detached".to_string()),
    );
    dict.insert(
        "ByteRange".to_string(),
        Value::Simple(pad_byte_range("[0 0 0 0]")),
    );
    dict.insert(
        "Contents".to_string(),
        Value::HexString("0".repeat(MAX_SIGNATURE_HEX_LEN)),
    );
    dict.insert(
        "M".to_string(),
        Value::LiteralString(format_pdf_date(signed_at)),
    );
    PdfObject::new(oid, Value::Dictionary(dict))
}

/// `D:YYYYMMDDHHmmSS+00'00` for a UTC timestamp.
pub fn format_pdf_date(date: DateTime<Utc>) -> String {
    date.format("D:%Y%m%d%H%M%S+00'00").to_string()
}

/// The four `/ByteRange` offsets for the final layout.
///
/// `marker_offset` is the position of the `<` of `/Contents` within the
/// signature object's own serialization.
pub fn byte_ranges(
    prefix_len: usize,
    marker_offset: usize,
    suffix_len: usize,
    sig_object_len: usize,
) -> [usize; 4] {
    [
        0,
        prefix_len + marker_offset,
        prefix_len + marker_offset + CONTENTS_FIELD_LEN,
        suffix_len + (sig_object_len - CONTENTS_FIELD_LEN - marker_offset),
    ]
}

/// Reserve a signature slot, serialize, and have `signer` fill it in.
///
/// The signature object is added to the overlay, the document is written in
/// the given mode, the byte range is patched into the fixed-width
/// placeholder, and the collaborator's blob is substituted into
/// `/Contents` at constant length.
pub fn sign_document<S: Signer>(
    doc: &mut Document,
    signer: &S,
    mode: WriteMode,
    signed_at: DateTime<Utc>,
) -> Result<Vec<u8>> {
    let sig_oid = doc.next_oid();
    let sig_object = build_signature_object(sig_oid, signed_at);
    doc.add_object(sig_object.clone());

    let emitted = writer::emit(doc, mode)?;
    let &(start, end) = emitted
        .spans
        .get(&sig_oid)
        .ok_or_else(|| PdfError::Write("signature object was not emitted".to_string()))?;

    let prefix = &emitted.bytes[..start];
    let mut sig_bytes = emitted.bytes[start..end].to_vec();
    let suffix = &emitted.bytes[end..];

    // Measure the /Contents position on the object's own serialization;
    // it is identical to the emitted bytes by construction.
    let alone = writer::serialize_object(&sig_object);
    let marker_offset = find(&alone, b"/Contents <")
        .map(|pos| pos + b"/Contents ".len())
        .ok_or(SignatureError::PlaceholderNotFound("/Contents"))?;

    let ranges = byte_ranges(prefix.len(), marker_offset, suffix.len(), sig_bytes.len());
    patch_byte_range(&mut sig_bytes, ranges)?;

    // Signed spans: everything except the /Contents field itself.
    let mut signed_prefix = prefix.to_vec();
    signed_prefix.extend_from_slice(&sig_bytes[..marker_offset]);
    let mut signed_suffix = sig_bytes[marker_offset + CONTENTS_FIELD_LEN..].to_vec();
    signed_suffix.extend_from_slice(suffix);

    let blob = signer.sign(&signed_prefix, &signed_suffix)?;
    let encoded = hex::encode(blob);
    if encoded.len() > MAX_SIGNATURE_HEX_LEN {
        return Err(SignatureError::TooLarge {
            len: encoded.len(),
            max: MAX_SIGNATURE_HEX_LEN,
        }
        .into());
    }
    let padded = format!("{encoded:0>width$}", width = MAX_SIGNATURE_HEX_LEN);
    sig_bytes[marker_offset + 1..marker_offset + 1 + MAX_SIGNATURE_HEX_LEN]
        .copy_from_slice(padded.as_bytes());

    let mut out = Vec::with_capacity(emitted.bytes.len());
    out.extend_from_slice(prefix);
    out.extend_from_slice(&sig_bytes);
    out.extend_from_slice(suffix);
    debug_assert_eq!(out.len(), emitted.bytes.len());
    Ok(out)
}

fn patch_byte_range(
    sig_bytes: &mut [u8],
    ranges: [usize; 4],
) -> std::result::Result<(), SignatureError> {
    let field_pos = find(sig_bytes, b"/ByteRange ")
        .map(|pos| pos + b"/ByteRange ".len())
        .ok_or(SignatureError::PlaceholderNotFound("/ByteRange"))?;
    let text = format!(
        "[{} {} {} {}]",
        ranges[0], ranges[1], ranges[2], ranges[3]
    );
    if text.len() > BYTE_RANGE_WIDTH {
        return Err(SignatureError::RangeOverflow(text));
    }
    let padded = pad_byte_range(&text);
    sig_bytes[field_pos..field_pos + BYTE_RANGE_WIDTH].copy_from_slice(padded.as_bytes());
    Ok(())
}

fn pad_byte_range(text: &str) -> String {
    format!("{text:<width$}", width = BYTE_RANGE_WIDTH)
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    haystack.windows(needle.len()).position(|w| w == needle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_byte_range_arithmetic() {
        // prefix 1000, marker 20, suffix 500, and some object length
        let sig_object_len = 20 + CONTENTS_FIELD_LEN + 30;
        let ranges = byte_ranges(1000, 20, 500, sig_object_len);
        assert_eq!(ranges[1], 1020);
        assert_eq!(ranges[2], 1000 + 20 + 19742 + 2);
        assert_eq!(ranges[2], 20764);
        assert_eq!(ranges[3], 500 + 30);
    }

    #[test]
    fn test_placeholder_widths() {
        let date = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        let object = build_signature_object(4, date);
        let bytes = writer::serialize_object(&object);

        let br = find(&bytes, b"/ByteRange ").unwrap() + b"/ByteRange ".len();
        assert_eq!(bytes[br], b'[');
        assert_eq!(&bytes[br + BYTE_RANGE_WIDTH - 1..br + BYTE_RANGE_WIDTH], b" ");

        let marker = find(&bytes, b"/Contents <").unwrap() + b"/Contents ".len();
        assert_eq!(bytes[marker], b'<');
        assert_eq!(bytes[marker + CONTENTS_FIELD_LEN - 1], b'>');
        assert!(bytes[marker + 1..marker + 1 + MAX_SIGNATURE_HEX_LEN]
            .iter()
            .all(|&b| b == b'0'));
    }

    #[test]
    fn test_pdf_date_format() {
        let date = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 5).unwrap();
        assert_eq!(format_pdf_date(date), "D:20240517093005+00'00");
    }

    #[test]
    fn test_patch_byte_range_keeps_width() {
        let date = Utc.with_ymd_and_hms(2024, 5, 17, 9, 30, 0).unwrap();
        let object = build_signature_object(4, date);
        let mut bytes = writer::serialize_object(&object);
        let before = bytes.len();
        patch_byte_range(&mut bytes, [0, 1020, 20764, 530]).unwrap();
        assert_eq!(bytes.len(), before);
        assert!(find(&bytes, b"[0 1020 20764 530]").is_some());
    }
}
