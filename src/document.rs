//! Document model
//!
//! Owns the immutable original byte buffer plus an overlay of added or
//! replaced objects. The original bytes are never patched; every mutation
//! lives in the overlay, which is also what decides between a full rebuild
//! and an incremental update when writing.

use crate::parser::objects::PdfObject;
use crate::parser::page_tree::{self, PageInfo};
use crate::parser::xref::{self, Revision, XrefTable};
use crate::parser::{find_object, ParseError, ParseOptions, ParseResult, PdfVersion, Value};
use indexmap::IndexMap;
use tracing::{debug, warn};

/// A parsed PDF document with a mutation overlay.
#[derive(Debug, Clone)]
pub struct Document {
    original: Vec<u8>,
    version: PdfVersion,
    xref: XrefTable,
    trailer: Option<Value>,
    overlay: IndexMap<u32, PdfObject>,
    max_oid: u32,
    min_version: PdfVersion,
    start_xref: u64,
    revisions: Vec<Revision>,
    pages: Vec<PageInfo>,
    options: ParseOptions,
}

impl Document {
    /// Parse a document with default options.
    pub fn parse(bytes: Vec<u8>) -> ParseResult<Self> {
        Self::parse_with_options(bytes, ParseOptions::default())
    }

    /// Parse a document: header, xref chain, trailer and page tree.
    pub fn parse_with_options(bytes: Vec<u8>, options: ParseOptions) -> ParseResult<Self> {
        let version = PdfVersion::parse(&bytes)?;
        let resolved = xref::resolve(&bytes, &options)?;

        if let Some(trailer) = &resolved.trailer {
            if trailer.get("Encrypt").is_some() {
                warn!("document is encrypted; decryption is unsupported");
            }
        }

        let mut doc = Self {
            max_oid: resolved.table.max_oid(),
            original: bytes,
            version,
            xref: resolved.table,
            trailer: resolved.trailer,
            overlay: IndexMap::new(),
            min_version: resolved.min_version,
            start_xref: resolved.start_offset,
            revisions: resolved.revisions,
            pages: Vec::new(),
            options,
        };
        doc.pages = doc.walk_page_tree()?;
        debug!(
            version = %doc.version,
            objects = doc.xref.len(),
            pages = doc.pages.len(),
            "parsed document"
        );
        Ok(doc)
    }

    fn walk_page_tree(&self) -> ParseResult<Vec<PageInfo>> {
        let root_ref = self
            .trailer
            .as_ref()
            .and_then(|t| t.get("Root"))
            .and_then(Value::as_reference);
        let Some((root_oid, _)) = root_ref else {
            return Ok(Vec::new());
        };
        let root = self
            .get_object(root_oid, false)?
            .ok_or_else(|| ParseError::PageTreeInvalid("missing /Root object".to_string()))?;
        let Some((pages_oid, _)) = root.value.get("Pages").and_then(Value::as_reference) else {
            return Ok(Vec::new());
        };
        page_tree::collect_pages(pages_oid, &mut |oid| self.get_object(oid, false))
    }

    /// Fetch an object. The overlay wins unless `prefer_original`, in which
    /// case the original buffer is tried first and the overlay is the
    /// fallback.
    pub fn get_object(&self, oid: u32, prefer_original: bool) -> ParseResult<Option<PdfObject>> {
        if prefer_original {
            if let Some(obj) = find_object(&self.original, &self.xref, oid)? {
                return Ok(Some(obj));
            }
            return Ok(self.overlay.get(&oid).cloned());
        }
        if let Some(obj) = self.overlay.get(&oid) {
            return Ok(Some(obj.clone()));
        }
        find_object(&self.original, &self.xref, oid)
    }

    /// Insert or replace an object in the overlay.
    pub fn add_object(&mut self, object: PdfObject) {
        if object.oid > self.max_oid {
            self.max_oid = object.oid;
        }
        self.overlay.insert(object.oid, object);
    }

    /// Allocate the next unused oid.
    pub fn next_oid(&mut self) -> u32 {
        self.max_oid += 1;
        self.max_oid
    }

    /// Materialize every original object into the overlay.
    ///
    /// Before each object the budget check compares bytes already
    /// materialized plus the largest single-object delta seen so far
    /// against the configured limit; this is a heuristic guard against
    /// exhaustion, not a hard bound.
    pub fn load_all(&mut self) -> ParseResult<()> {
        let limit = self.options.memory_limit;
        let mut used = 0usize;
        let mut worst_delta = 0usize;

        let mut oids: Vec<u32> = self.xref.iter().map(|(oid, _)| oid).collect();
        oids.sort_unstable();

        for oid in oids {
            if self.overlay.contains_key(&oid) {
                continue;
            }
            if let Some(limit) = limit {
                if used + worst_delta > limit {
                    return Err(ParseError::MemoryLimitExceeded { limit });
                }
            }
            let Some(obj) = find_object(&self.original, &self.xref, oid)? else {
                continue;
            };
            let delta = object_size_estimate(&obj);
            used += delta;
            worst_delta = worst_delta.max(delta);
            self.overlay.insert(oid, obj);
        }
        Ok(())
    }

    pub fn version(&self) -> PdfVersion {
        self.version
    }

    /// Minimum PDF version implied by the xref format of the chain.
    pub fn min_version(&self) -> PdfVersion {
        self.min_version
    }

    pub fn trailer(&self) -> Option<&Value> {
        self.trailer.as_ref()
    }

    pub fn pages(&self) -> &[PageInfo] {
        &self.pages
    }

    /// All `startxref ... %%EOF` markers found in the file, in order.
    pub fn revisions(&self) -> &[Revision] {
        &self.revisions
    }

    pub fn xref(&self) -> &XrefTable {
        &self.xref
    }

    pub fn original_bytes(&self) -> &[u8] {
        &self.original
    }

    /// Byte position of the entry xref, the `Prev` target for incremental
    /// updates.
    pub fn start_xref(&self) -> u64 {
        self.start_xref
    }

    pub fn max_oid(&self) -> u32 {
        self.max_oid
    }

    /// Overlay objects in insertion order.
    pub fn overlay(&self) -> impl Iterator<Item = &PdfObject> {
        self.overlay.values()
    }

    pub fn overlay_len(&self) -> usize {
        self.overlay.len()
    }
}

fn object_size_estimate(obj: &PdfObject) -> usize {
    let stream_len = obj.stream.as_ref().map(Vec::len).unwrap_or(0);
    // Display length approximates the in-memory tree weight well enough
    // for a budget heuristic.
    stream_len + obj.value.to_string().len() + 64
}
