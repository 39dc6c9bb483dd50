use thiserror::Error;

/// Top-level error type for the crate.
///
/// The parser keeps its own, more detailed [`crate::parser::ParseError`];
/// this enum is what callers of the document/writer surface see.
#[derive(Error, Debug)]
pub enum PdfError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] crate::parser::ParseError),

    #[error("Write error: {0}")]
    Write(String),

    #[error("Signature error: {0}")]
    Signature(#[from] crate::signature::SignatureError),

    #[error("Invalid PDF structure: {0}")]
    InvalidStructure(String),
}

pub type Result<T> = std::result::Result<T, PdfError>;
