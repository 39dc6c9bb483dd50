//! Rebuild / serialization
//!
//! Emits a new byte stream for a document: either a **full rebuild** (every
//! resolvable object re-emitted at fresh offsets) or an **incremental
//! update** (original bytes untouched, overlay objects appended, `Prev`
//! chained to the previous xref). The xref format follows the chain being
//! extended: a stream-based chain is extended with a stream xref, a classic
//! chain with a classic table.

mod xref_stream_writer;

pub use xref_stream_writer::build_xref_stream_object;

use crate::document::Document;
use crate::error::Result;
use crate::parser::objects::PdfObject;
use crate::parser::xref::XrefEntry;
use crate::parser::{PdfVersion, Value};
use std::collections::BTreeMap;

/// Serialization mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Re-emit every object at fresh offsets behind a new header.
    Full,
    /// Keep the original bytes and append only the overlay.
    Incremental,
}

/// A serialized document with per-object byte spans, used by the signing
/// flow to split the output around the signature object.
#[derive(Debug)]
pub(crate) struct Emitted {
    pub bytes: Vec<u8>,
    pub spans: BTreeMap<u32, (usize, usize)>,
}

/// Serialize a full rebuild of the document.
pub fn write_full(doc: &Document) -> Result<Vec<u8>> {
    emit(doc, WriteMode::Full).map(|e| e.bytes)
}

/// Serialize an incremental update appended to the original bytes.
pub fn write_incremental(doc: &Document) -> Result<Vec<u8>> {
    emit(doc, WriteMode::Incremental).map(|e| e.bytes)
}

pub(crate) fn emit(doc: &Document, mode: WriteMode) -> Result<Emitted> {
    let stream_xref = doc.min_version() >= PdfVersion::V1_5;
    let mut buf = Vec::new();
    let mut offsets: BTreeMap<u32, u64> = BTreeMap::new();
    let mut spans = BTreeMap::new();

    match mode {
        WriteMode::Full => {
            let version = doc.version().max(doc.min_version());
            buf.extend_from_slice(format!("%PDF-{version}\n").as_bytes());
            // Binary marker so transports treat the file as binary.
            buf.extend_from_slice(&[b'%', 0xE2, 0xE3, 0xCF, 0xD3, b'\n']);

            for oid in 1..=doc.max_oid() {
                let Some(object) = doc.get_object(oid, false)? else {
                    continue;
                };
                let start = buf.len();
                offsets.insert(oid, start as u64);
                buf.extend_from_slice(&serialize_object(&object));
                spans.insert(oid, (start, buf.len()));
            }
        }
        WriteMode::Incremental => {
            buf.extend_from_slice(doc.original_bytes());
            if buf.last() != Some(&b'\n') {
                buf.push(b'\n');
            }
            for object in doc.overlay() {
                let start = buf.len();
                offsets.insert(object.oid, start as u64);
                buf.extend_from_slice(&serialize_object(object));
                spans.insert(object.oid, (start, buf.len()));
            }
        }
    }

    let mut trailer = match doc.trailer() {
        Some(Value::Dictionary(d)) => d.clone(),
        _ => indexmap::IndexMap::new(),
    };
    trailer.shift_remove("Prev");
    if mode == WriteMode::Incremental {
        trailer.insert("Prev".to_string(), Value::integer(doc.start_xref() as i64));
    }

    let xref_pos = buf.len() as u64;
    if stream_xref {
        let xref_oid = doc.max_oid() + 1;
        let mut entries: BTreeMap<u32, XrefEntry> = offsets
            .iter()
            .map(|(&oid, &off)| (oid, XrefEntry::Offset(off)))
            .collect();
        if mode == WriteMode::Full {
            entries.insert(0, XrefEntry::Free);
        }
        entries.insert(xref_oid, XrefEntry::Offset(xref_pos));
        trailer.insert("Size".to_string(), Value::integer(xref_oid as i64 + 1));

        let xref_object = build_xref_stream_object(xref_oid, &entries, trailer);
        buf.extend_from_slice(&serialize_object(&xref_object));
    } else {
        let mut table = offsets.clone();
        if mode == WriteMode::Full {
            // Slot 0 becomes the fixed free-list sentinel.
            table.insert(0, 0);
        }
        trailer.insert("Size".to_string(), Value::integer(doc.max_oid() as i64 + 1));

        buf.extend_from_slice(build_classic_xref(&table).as_bytes());
        buf.extend_from_slice(b"trailer\n");
        buf.extend_from_slice(&Value::Dictionary(trailer).to_pdf_bytes());
        buf.push(b'\n');
    }
    buf.extend_from_slice(format!("startxref\n{xref_pos}\n%%EOF\n").as_bytes());

    Ok(Emitted { bytes: buf, spans })
}

/// Serialize one indirect object, generation always 0.
pub fn serialize_object(object: &PdfObject) -> Vec<u8> {
    let mut out = Vec::new();
    out.extend_from_slice(format!("{} 0 obj\n", object.oid).as_bytes());
    out.extend_from_slice(&object.value.to_pdf_bytes());
    out.push(b'\n');
    if let Some(stream) = &object.stream {
        out.extend_from_slice(b"stream\n");
        out.extend_from_slice(stream);
        out.extend_from_slice(b"\nendstream\n");
    }
    out.extend_from_slice(b"endobj\n");
    out
}

/// Build the classic text xref section for a set of offsets.
///
/// Offsets are grouped into maximal runs of consecutive oids. An entry for
/// oid 0, whatever its value, is written as the fixed free-list sentinel.
pub fn build_classic_xref(offsets: &BTreeMap<u32, u64>) -> String {
    let mut out = String::from("xref\n");
    let oids: Vec<u32> = offsets.keys().copied().collect();

    let mut i = 0;
    while i < oids.len() {
        let mut j = i;
        while j + 1 < oids.len() && oids[j + 1] == oids[j] + 1 {
            j += 1;
        }
        out.push_str(&format!("{} {}\n", oids[i], j - i + 1));
        for &oid in &oids[i..=j] {
            if oid == 0 {
                out.push_str("0000000000 65535 f \n");
            } else {
                out.push_str(&format!("{:010} {:05} n \n", offsets[&oid], 0));
            }
        }
        i = j + 1;
    }
    out
}
