//! Cross-reference resolution
//!
//! Locates the `startxref` revision markers, walks the `Prev` chain over
//! classic tables or xref streams, and merges all revisions into one
//! logical table. Newer revisions always shadow older ones; a chain may not
//! mix the two xref formats.

use super::header::PdfVersion;
use super::lexer::{Lexer, Token};
use super::objects::Value;
use super::{ParseError, ParseOptions, ParseResult};
use lazy_static::lazy_static;
use regex::bytes::Regex;
use std::collections::HashMap;
use tracing::{debug, warn};

lazy_static! {
    static ref STARTXREF_RE: Regex = Regex::new(r"startxref\s*(\d+)\s*%%EOF").unwrap();
}

/// Location of one indirect object.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum XrefEntry {
    /// Freed object; kept so a newer revision can shadow an older offset.
    Free,
    /// Byte offset of an offset-addressed object.
    Offset(u64),
    /// Object packed inside an object stream.
    InObjectStream { stream_oid: u32, index: u32 },
}

/// One `startxref ... %%EOF` revision marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Revision {
    /// Byte position of the `startxref` keyword.
    pub marker_offset: usize,
    /// The xref position the marker points at.
    pub xref_offset: u64,
}

/// Merged cross-reference table.
#[derive(Debug, Clone, Default)]
pub struct XrefTable {
    entries: HashMap<u32, XrefEntry>,
}

impl XrefTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, oid: u32) -> Option<XrefEntry> {
        self.entries.get(&oid).copied()
    }

    /// Insert an entry unless a newer revision already claimed the oid.
    pub fn insert_if_absent(&mut self, oid: u32, entry: XrefEntry) {
        self.entries.entry(oid).or_insert(entry);
    }

    /// Unconditional insert, used when building tables for writing.
    pub fn insert(&mut self, oid: u32, entry: XrefEntry) {
        self.entries.insert(oid, entry);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_oid(&self) -> u32 {
        self.entries.keys().copied().max().unwrap_or(0)
    }

    pub fn iter(&self) -> impl Iterator<Item = (u32, XrefEntry)> + '_ {
        self.entries.iter().map(|(&oid, &entry)| (oid, entry))
    }
}

/// Which xref format a revision used.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum XrefFormat {
    Classic,
    Stream,
}

/// Outcome of resolving the whole revision chain.
#[derive(Debug, Clone)]
pub struct ResolvedXref {
    pub table: XrefTable,
    pub trailer: Option<Value>,
    /// `1.5` once a stream-form xref participated, else `1.0`.
    pub min_version: PdfVersion,
    /// The entry `startxref` position (0 for placeholder documents).
    pub start_offset: u64,
    pub revisions: Vec<Revision>,
}

/// Scan the buffer for every `startxref ... %%EOF` marker, in order.
pub fn scan_revisions(data: &[u8]) -> Vec<Revision> {
    STARTXREF_RE
        .captures_iter(data)
        .filter_map(|caps| {
            let m = caps.get(0)?;
            let value = std::str::from_utf8(caps.get(1)?.as_bytes()).ok()?;
            Some(Revision {
                marker_offset: m.start(),
                xref_offset: value.parse().ok()?,
            })
        })
        .collect()
}

/// Resolve the trailer/xref chain starting from the last revision marker.
pub fn resolve(data: &[u8], options: &ParseOptions) -> ParseResult<ResolvedXref> {
    let revisions = scan_revisions(data);
    let entry = revisions.last().ok_or(ParseError::TrailerNotFound)?;

    // A startxref of 0 marks a dummy/linearized placeholder: no table.
    if entry.xref_offset == 0 {
        return Ok(ResolvedXref {
            table: XrefTable::new(),
            trailer: None,
            min_version: PdfVersion::V1_0,
            start_offset: 0,
            revisions,
        });
    }

    let mut table = XrefTable::new();
    let mut trailer = None;
    let mut format = None;
    let mut next = Some(entry.xref_offset);
    let mut hops = 0usize;

    while let Some(offset) = next {
        if hops >= options.max_chain_len {
            return Err(ParseError::ChainTooLong(options.max_chain_len));
        }
        hops += 1;

        let (section_format, entries, dict) = parse_section(data, offset)?;
        match format {
            None => format = Some(section_format),
            Some(f) if f != section_format => return Err(ParseError::XrefMixedFormats),
            Some(_) => {}
        }

        debug!(offset, entries = entries.len(), "merged xref section");
        for (oid, entry) in entries {
            table.insert_if_absent(oid, entry);
        }

        next = dict.get("Prev").and_then(Value::as_int).map(|n| n as u64);
        if trailer.is_none() {
            trailer = Some(dict);
        }
    }

    let min_version = match format {
        Some(XrefFormat::Stream) => PdfVersion::V1_5,
        _ => PdfVersion::V1_0,
    };

    Ok(ResolvedXref {
        table,
        trailer,
        min_version,
        start_offset: entry.xref_offset,
        revisions,
    })
}

/// Parse one xref section (classic or stream form) at `offset`.
fn parse_section(
    data: &[u8],
    offset: u64,
) -> ParseResult<(XrefFormat, Vec<(u32, XrefEntry)>, Value)> {
    if offset as usize >= data.len() {
        return Err(ParseError::XrefMalformed {
            offset,
            message: "xref offset beyond end of file".to_string(),
        });
    }

    let mut lexer = Lexer::at(data, offset as usize);
    let first = lexer.peek_token()?;
    if first == Token::Word("xref".to_string()) {
        let (entries, trailer) = parse_classic(&mut lexer, offset)?;
        Ok((XrefFormat::Classic, entries, trailer))
    } else {
        let (entries, dict) = super::xref_stream::parse_at(data, offset)?;
        Ok((XrefFormat::Stream, entries, dict))
    }
}

/// Parse a classic text xref table plus its trailer dictionary.
///
/// Runs are `"<first> <count>"` headers followed by `count` entries of
/// `"<10-digit offset> <5-digit gen> <n|f>"`. The oid 0 / generation 65535
/// free-list head is ignored; the free linked list is not reconstructed.
fn parse_classic(lexer: &mut Lexer, offset: u64) -> ParseResult<(Vec<(u32, XrefEntry)>, Value)> {
    let malformed = |message: &str| ParseError::XrefMalformed {
        offset,
        message: message.to_string(),
    };

    // Consume the `xref` keyword.
    lexer.next_token()?;

    let mut entries = Vec::new();
    loop {
        let token = lexer.next_token()?;
        let first_word = match &token {
            Token::Word(w) if w == "trailer" => break,
            Token::Word(w) => w.clone(),
            _ => return Err(malformed("expected run header or trailer keyword")),
        };
        let first: u32 = first_word
            .parse()
            .map_err(|_| malformed("run header first-oid is not an integer"))?;
        let count: u32 = match lexer.next_token()? {
            Token::Word(w) => w
                .parse()
                .map_err(|_| malformed("run header count is not an integer"))?,
            _ => return Err(malformed("run header missing count")),
        };

        for i in 0..count {
            let oid = first + i;
            let entry_offset: u64 = match lexer.next_token()? {
                Token::Word(w) => w
                    .parse()
                    .map_err(|_| malformed("entry offset is not an integer"))?,
                _ => return Err(malformed("truncated xref entry")),
            };
            let generation: u32 = match lexer.next_token()? {
                Token::Word(w) => w
                    .parse()
                    .map_err(|_| malformed("entry generation is not an integer"))?,
                _ => return Err(malformed("truncated xref entry")),
            };
            let flag = match lexer.next_token()? {
                Token::Word(w) => w,
                _ => return Err(malformed("truncated xref entry")),
            };

            match flag.as_str() {
                "f" => {
                    // oid 0 / 65535 is the canonical free-list head.
                    if oid != 0 {
                        entries.push((oid, XrefEntry::Free));
                    }
                }
                "n" => {
                    if generation != 0 {
                        warn!(oid, generation, "non-zero generation is unsupported");
                    }
                    entries.push((oid, XrefEntry::Offset(entry_offset)));
                }
                other => {
                    return Err(malformed(&format!("invalid entry flag {other:?}")));
                }
            }
        }
    }

    let trailer = Value::parse(lexer)?;
    if trailer.as_dict().is_none() {
        return Err(ParseError::TrailerNotFound);
    }
    Ok((entries, trailer))
}

#[cfg(test)]
mod tests {
    use super::*;

    const CLASSIC: &[u8] = b"xref\n0 4\n0000000000 65535 f \n0000000010 00000 n \n0000000068 00000 n \n0000000125 00000 n \ntrailer\n<< /Size 4 /Root 1 0 R >>\nstartxref\n0\n%%EOF\n";

    #[test]
    fn test_classic_parse_fixture() {
        let mut lexer = Lexer::new(CLASSIC);
        let (entries, trailer) = parse_classic(&mut lexer, 0).unwrap();
        let map: HashMap<u32, XrefEntry> = entries.into_iter().collect();
        assert_eq!(map.len(), 3);
        assert_eq!(map[&1], XrefEntry::Offset(10));
        assert_eq!(map[&2], XrefEntry::Offset(68));
        assert_eq!(map[&3], XrefEntry::Offset(125));
        assert_eq!(trailer.get("Root").unwrap().as_reference(), Some((1, 0)));
        assert_eq!(trailer.get("Size").unwrap().as_int(), Some(4));
    }

    #[test]
    fn test_scan_revisions() {
        let data = b"%PDF-1.4\n...startxref\n100\n%%EOF\nmore\nstartxref\n2200\n%%EOF\n";
        let revisions = scan_revisions(data);
        assert_eq!(revisions.len(), 2);
        assert_eq!(revisions[0].xref_offset, 100);
        assert_eq!(revisions[1].xref_offset, 2200);
    }

    #[test]
    fn test_placeholder_startxref_zero() {
        let data = b"%PDF-1.4\nstartxref\n0\n%%EOF\n";
        let resolved = resolve(data, &ParseOptions::default()).unwrap();
        assert!(resolved.table.is_empty());
        assert!(resolved.trailer.is_none());
    }

    #[test]
    fn test_missing_startxref_is_trailer_not_found() {
        let err = resolve(b"%PDF-1.4\njunk", &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::TrailerNotFound));
    }

    #[test]
    fn test_newer_revision_shadows_older() {
        // Older revision at offset 9 maps oid 1 to 10; the newer one
        // remaps it to 99 and chains back with Prev.
        let mut data = Vec::new();
        data.extend_from_slice(b"%PDF-1.4\n");
        let old_pos = data.len();
        data.extend_from_slice(
            b"xref\n0 2\n0000000000 65535 f \n0000000010 00000 n \ntrailer\n<< /Size 2 /Root 1 0 R >>\n",
        );
        let new_pos = data.len();
        data.extend_from_slice(
            format!(
                "xref\n1 1\n0000000099 00000 n \ntrailer\n<< /Size 2 /Root 1 0 R /Prev {old_pos} >>\n"
            )
            .as_bytes(),
        );
        data.extend_from_slice(format!("startxref\n{new_pos}\n%%EOF\n").as_bytes());

        let resolved = resolve(&data, &ParseOptions::default()).unwrap();
        assert_eq!(resolved.table.get(1), Some(XrefEntry::Offset(99)));
        assert_eq!(resolved.min_version, PdfVersion::V1_0);
        assert_eq!(resolved.start_offset, new_pos as u64);
    }

    #[test]
    fn test_prev_cycle_is_bounded() {
        let mut data = Vec::new();
        data.extend_from_slice(b"%PDF-1.4\n");
        let pos = data.len();
        data.extend_from_slice(
            format!("xref\n0 1\n0000000000 65535 f \ntrailer\n<< /Size 1 /Prev {pos} >>\n")
                .as_bytes(),
        );
        data.extend_from_slice(format!("startxref\n{pos}\n%%EOF\n").as_bytes());

        let err = resolve(&data, &ParseOptions::default()).unwrap_err();
        assert!(matches!(err, ParseError::ChainTooLong(_)));
    }
}
