//! Claim metadata extractors
//!
//! One heuristic parser per export family. Extractors never fail: malformed
//! or unrecognizable input yields a partial (possibly all-null) record plus a
//! degradation note that the pipeline records as a non-fatal event.

pub mod awf;
pub mod ems;
pub mod xml;

use crate::models::{Extraction, FileFormat};
use crate::services::format_sniffer::looks_like_xml;
use once_cell::sync::Lazy;
use regex::Regex;

/// 17-character VIN alphabet (no I, O or Q)
static VIN_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b([A-HJ-NPR-Z0-9]{17})\b").expect("VIN pattern is valid"));

/// Extract claim metadata from a file's bytes according to its sniffed format
pub fn extract(format: FileFormat, bytes: &[u8]) -> Extraction {
    match format {
        FileFormat::Xml => xml::extract(bytes),
        FileFormat::Ems => extract_ems_family(bytes),
        FileFormat::Awf => awf::extract(bytes),
        FileFormat::Unknown => Extraction::default(),
    }
}

/// EMS exports that are really XML are tried as XML first and fall back to
/// the line grammar when the XML does not parse
fn extract_ems_family(bytes: &[u8]) -> Extraction {
    if looks_like_xml(bytes) {
        let text = String::from_utf8_lossy(bytes);
        match xml::parse_metadata(&text) {
            Ok(metadata) => return Extraction::complete(metadata),
            Err(e) => {
                tracing::debug!(error = %e, "XML-looking EMS export did not parse, using EMS grammar");
            }
        }
    }
    ems::extract(bytes)
}

/// First VIN-shaped token in free text
///
/// A token must contain at least one digit so that 17-letter words are not
/// mistaken for VINs.
pub(crate) fn find_vin(text: &str) -> Option<String> {
    VIN_TOKEN
        .captures_iter(text)
        .filter_map(|c| c.get(1))
        .map(|m| m.as_str())
        .find(|candidate| is_vin_shaped(candidate))
        .map(str::to_string)
}

/// True for a 17-character token over the VIN alphabet with at least one digit
pub(crate) fn is_vin_shaped(candidate: &str) -> bool {
    candidate.len() == 17
        && candidate
            .chars()
            .all(|c| c.is_ascii_digit() || (c.is_ascii_uppercase() && !matches!(c, 'I' | 'O' | 'Q')))
        && candidate.chars().any(|c| c.is_ascii_digit())
}

/// Normalize a money value by keeping only digits and `.`
///
/// Returns `None` when nothing parseable (or nothing finite) remains.
pub(crate) fn normalize_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .chars()
        .filter(|c| c.is_ascii_digit() || *c == '.')
        .collect();
    if !cleaned.chars().any(|c| c.is_ascii_digit()) {
        return None;
    }
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite())
}

/// Trimmed, non-empty text
pub(crate) fn non_empty(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_vin_requires_digit() {
        assert_eq!(
            find_vin("vehicle 1HGCM82633A004352 on lot"),
            Some("1HGCM82633A004352".to_string())
        );
        assert_eq!(find_vin("ABCDEFGHJKLMNPRST"), None);
        assert_eq!(find_vin("1HGCM82633A00435"), None);
    }

    #[test]
    fn test_normalize_amount() {
        assert_eq!(normalize_amount("$1,234.50"), Some(1234.5));
        assert_eq!(normalize_amount(" 999.99 "), Some(999.99));
        assert_eq!(normalize_amount("USD"), None);
        assert_eq!(normalize_amount(""), None);
        assert_eq!(normalize_amount("1.2.3"), None);
    }

    #[test]
    fn test_unknown_format_extracts_nothing() {
        let extraction = extract(FileFormat::Unknown, b"CLM|A|CLM9001");
        assert!(extraction.metadata.is_empty());
        assert!(extraction.degraded.is_none());
    }

    #[test]
    fn test_xml_looking_ems_parsed_as_xml() {
        let bytes = br#"<Claim><ClaimNumber>CLM7</ClaimNumber></Claim>"#;
        let extraction = extract(FileFormat::Ems, bytes);
        assert_eq!(extraction.metadata.claim_number.as_deref(), Some("CLM7"));
        assert!(extraction.degraded.is_none());
    }

    #[test]
    fn test_broken_xml_in_ems_falls_back_to_line_grammar() {
        let bytes = b"<Claim\nCLM|A|CLM8\nVEH|1HGCM82633A004352";
        let extraction = extract(FileFormat::Ems, bytes);
        assert_eq!(extraction.metadata.claim_number.as_deref(), Some("CLM8"));
        assert_eq!(extraction.metadata.vin.as_deref(), Some("1HGCM82633A004352"));
    }
}
