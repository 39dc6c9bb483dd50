//! PDF structure parser
//!
//! Implements the read side of the engine: tokenizer, value parser,
//! header/version detection, cross-reference resolution (classic tables and
//! xref streams), object streams and the lazy object resolver.

pub mod filters;
pub mod header;
pub mod lexer;
pub mod object_stream;
pub mod objects;
pub mod page_tree;
pub mod resolver;
pub mod xref;
pub mod xref_stream;

pub use self::header::PdfVersion;
pub use self::lexer::{Lexer, Token};
pub use self::objects::{PdfObject, Value};
pub use self::page_tree::PageInfo;
pub use self::resolver::find_object;
pub use self::xref::{Revision, XrefEntry, XrefTable};

/// Result type for parser operations
pub type ParseResult<T> = Result<T, ParseError>;

/// PDF structure parsing errors
#[derive(Debug, thiserror::Error)]
pub enum ParseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("PDF version header not found")]
    VersionNotFound,

    #[error("Trailer not found")]
    TrailerNotFound,

    #[error("Malformed xref at offset {offset}: {message}")]
    XrefMalformed { offset: u64, message: String },

    #[error("Cannot mix classic and stream xref formats in one chain")]
    XrefMixedFormats,

    #[error("Xref chain longer than {0} revisions (possible Prev cycle)")]
    ChainTooLong(usize),

    #[error("Object id mismatch: expected {expected}, found {found}")]
    ObjectIdMismatch { expected: u32, found: u32 },

    #[error("Cannot resolve stream Length for object {0}")]
    StreamLengthUnresolvable(u32),

    #[error("Invalid object stream: {0}")]
    ObjectStreamInvalid(String),

    #[error("Syntax error at position {position}: {message}")]
    SyntaxError { position: usize, message: String },

    #[error("Unexpected token: expected {expected}, found {found}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Memory limit of {limit} bytes would be exceeded while loading objects")]
    MemoryLimitExceeded { limit: usize },

    #[error("Stream decode error: {0}")]
    StreamDecodeError(String),

    #[error("Invalid page tree: {0}")]
    PageTreeInvalid(String),
}

/// Options controlling parsing and eager loading.
#[derive(Debug, Clone)]
pub struct ParseOptions {
    /// Maximum number of revisions a `Prev` chain may span.
    pub max_chain_len: usize,
    /// Memory budget for [`crate::document::Document::load_all`]; `None`
    /// disables the check.
    pub memory_limit: Option<usize>,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self {
            max_chain_len: 64,
            memory_limit: Some(512 * 1024 * 1024),
        }
    }
}
