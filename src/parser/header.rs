//! PDF Header parsing
//!
//! The first line of a PDF must read `%PDF-<major>.<minor>`.

use super::{ParseError, ParseResult};

/// PDF version number.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PdfVersion {
    pub major: u8,
    pub minor: u8,
}

impl PdfVersion {
    pub const V1_0: PdfVersion = PdfVersion { major: 1, minor: 0 };
    /// First version with xref streams and object streams.
    pub const V1_5: PdfVersion = PdfVersion { major: 1, minor: 5 };

    pub fn new(major: u8, minor: u8) -> Self {
        Self { major, minor }
    }

    /// Parse the `%PDF-x.y` header line at the start of the buffer.
    pub fn parse(data: &[u8]) -> ParseResult<Self> {
        let line_end = data
            .iter()
            .position(|&b| b == b'\r' || b == b'\n')
            .unwrap_or(data.len());
        let line = &data[..line_end.min(16)];
        let line = std::str::from_utf8(line).map_err(|_| ParseError::VersionNotFound)?;
        let rest = line.strip_prefix("%PDF-").ok_or(ParseError::VersionNotFound)?;
        let mut parts = rest.splitn(2, '.');
        let major = parts
            .next()
            .and_then(|s| s.parse().ok())
            .ok_or(ParseError::VersionNotFound)?;
        let minor = parts
            .next()
            .and_then(|s| s.trim_end().parse().ok())
            .ok_or(ParseError::VersionNotFound)?;
        Ok(Self { major, minor })
    }
}

impl std::fmt::Display for PdfVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version() {
        assert_eq!(
            PdfVersion::parse(b"%PDF-1.4\n...").unwrap(),
            PdfVersion::new(1, 4)
        );
        assert_eq!(
            PdfVersion::parse(b"%PDF-2.0\r\n").unwrap(),
            PdfVersion::new(2, 0)
        );
    }

    #[test]
    fn test_missing_header() {
        assert!(matches!(
            PdfVersion::parse(b"not a pdf"),
            Err(ParseError::VersionNotFound)
        ));
    }

    #[test]
    fn test_version_ordering() {
        assert!(PdfVersion::new(1, 4) < PdfVersion::V1_5);
        assert!(PdfVersion::new(1, 7) > PdfVersion::V1_5);
    }
}
