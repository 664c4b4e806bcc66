//! Claim-export format detection
//!
//! Classification is by extension. Content sniffing only refines the EMS
//! case: an `.ems` file whose bytes look like XML is tried as XML first.

use crate::models::FileFormat;
use std::path::Path;

/// Classify a file by its extension (case-insensitive). Never fails.
pub fn classify(file_name: &str) -> FileFormat {
    let ext = Path::new(file_name)
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase());

    match ext.as_deref() {
        Some("xml") => FileFormat::Xml,
        Some("ems") => FileFormat::Ems,
        Some("awf") => FileFormat::Awf,
        _ => FileFormat::Unknown,
    }
}

/// True when the bytes look like an XML document
///
/// Uses `infer` magic detection for a declared `<?xml` prolog, and falls back
/// to "first non-whitespace character is `<`" for exports that omit it.
pub fn looks_like_xml(bytes: &[u8]) -> bool {
    if infer::text::is_xml(bytes) {
        return true;
    }

    let body = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF][..]).unwrap_or(bytes);
    body.iter()
        .find(|b| !b.is_ascii_whitespace())
        .map(|b| *b == b'<')
        .unwrap_or(false)
}

/// True when the bytes carry a zip local-file header
pub fn looks_like_zip(bytes: &[u8]) -> bool {
    infer::archive::is_zip(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_by_extension() {
        assert_eq!(classify("estimate.xml"), FileFormat::Xml);
        assert_eq!(classify("ESTIMATE.XML"), FileFormat::Xml);
        assert_eq!(classify("job42.ems"), FileFormat::Ems);
        assert_eq!(classify("bundle.AWF"), FileFormat::Awf);
        assert_eq!(classify("notes.txt"), FileFormat::Unknown);
        assert_eq!(classify("no_extension"), FileFormat::Unknown);
        assert_eq!(classify(""), FileFormat::Unknown);
    }

    #[test]
    fn test_looks_like_xml() {
        assert!(looks_like_xml(b"<?xml version=\"1.0\"?><Claim/>"));
        assert!(looks_like_xml(b"\n   <Estimate></Estimate>"));
        assert!(looks_like_xml(b"\xEF\xBB\xBF<Claim/>"));
        assert!(!looks_like_xml(b"CLM|A|CLM9001"));
        assert!(!looks_like_xml(b""));
    }

    #[test]
    fn test_looks_like_zip() {
        assert!(looks_like_zip(b"PK\x03\x04rest-of-header"));
        assert!(!looks_like_zip(b"<xml/>"));
    }
}
