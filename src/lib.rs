//! PDF document structure engine
//!
//! Parses the structural skeleton of a PDF file (header, cross-reference
//! chain, trailer, indirect objects, page tree), exposes it through a
//! [`Document`] with a mutation overlay, and writes it back out either as a
//! full rebuild or an incremental update. A fixed-size digital signature
//! slot can be reserved and patched in place without shifting any offsets.
//!
//! Content streams, fonts, rendering and encryption are out of scope; this
//! crate is about file structure, not page content.
//!
//! # Example
//!
//! ```no_run
//! use sigil_pdf::{Document, write_incremental, PdfObject, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let bytes = std::fs::read("input.pdf")?;
//! let mut doc = Document::parse(bytes)?;
//!
//! let oid = doc.next_oid();
//! doc.add_object(PdfObject::new(oid, Value::integer(42)));
//!
//! std::fs::write("output.pdf", write_incremental(&doc)?)?;
//! # Ok(())
//! # }
//! ```

pub mod document;
pub mod error;
pub mod parser;
pub mod signature;
pub mod writer;

pub use document::Document;
pub use error::{PdfError, Result};
pub use parser::objects::{PdfObject, Value};
pub use parser::xref::{Revision, XrefEntry, XrefTable};
pub use parser::{ParseError, ParseOptions, PdfVersion};
pub use signature::{sign_document, SignatureError, Signer, MAX_SIGNATURE_HEX_LEN};
pub use writer::{write_full, write_incremental, WriteMode};
