//! XML claim exports
//!
//! Vendor XML varies by estimating system, so every field is resolved by
//! probing an ordered list of candidate locations: explicit element paths
//! first, then a descendant search by tag name. The first non-empty match
//! wins. Tag names compare case-insensitively.

use super::{non_empty, normalize_amount};
use crate::models::{ClaimMetadata, Extraction};
use roxmltree::{Document, Node, ParsingOptions};
use serde_json::{Map, Value};
use thiserror::Error;

/// XML that could not be parsed
#[derive(Debug, Error)]
#[error("malformed XML: {0}")]
pub struct XmlError(String);

/// Where to look for a field
#[derive(Debug, Clone, Copy)]
enum Probe {
    /// Slash-separated element path from the document root; `*` matches any
    /// element at that level
    Path(&'static str),
    /// Any descendant element (or attribute) with one of these names
    Descendant(&'static [&'static str]),
    /// First + last name under an owner/customer/insured element
    PersonName,
}

const CLAIM_NUMBER: &[Probe] = &[
    Probe::Path("RepairOrder/Claim/ClaimNumber"),
    Probe::Path("Estimate/ClaimInfo/ClaimNumber"),
    Probe::Path("Workfile/Claim/Number"),
    Probe::Path("Claim/ClaimNumber"),
    Probe::Path("*/ClaimInfo/ClaimNum"),
    Probe::Descendant(&["ClaimNumber", "ClaimNum", "ClaimNo"]),
];

const VIN: &[Probe] = &[
    Probe::Path("Claim/Vehicle/VIN"),
    Probe::Path("*/Vehicle/VIN"),
    Probe::Path("*/VehicleInfo/VIN"),
    Probe::Descendant(&["VIN", "VINNum", "VINNumber", "VehicleVIN"]),
];

const RO_NUMBER: &[Probe] = &[
    Probe::Path("Claim/RepairOrderNumber"),
    Probe::Path("RepairOrder/RONumber"),
    Probe::Descendant(&["RONumber", "RepairOrderNumber", "RONum", "RO"]),
];

const CUSTOMER_NAME: &[Probe] = &[
    Probe::Path("Claim/Customer/Name"),
    Probe::PersonName,
    Probe::Descendant(&["CustomerName", "OwnerName", "InsuredName"]),
];

const TOTAL_AMOUNT: &[Probe] = &[
    Probe::Path("Claim/TotalAmount"),
    Probe::Path("Estimate/Totals/GrandTotal"),
    Probe::Path("*/Totals/GrandTotal"),
    Probe::Path("*/Summary/GrandTotal"),
    Probe::Path("*/EstimateTotals/GrandTotal"),
    Probe::Descendant(&["GrandTotal", "TotalAmount", "EstimateTotal"]),
];

const PERSON_CONTAINERS: &[&str] = &["Owner", "Customer", "Insured"];

/// Extract metadata from an XML export
///
/// Malformed XML yields an all-null record, the parser error in
/// `raw_payload`, and a degradation note.
pub fn extract(bytes: &[u8]) -> Extraction {
    let text = String::from_utf8_lossy(bytes);
    match parse_metadata(&text) {
        Ok(metadata) => Extraction::complete(metadata),
        Err(e) => {
            let metadata = ClaimMetadata {
                raw_payload: Some(serde_json::json!({ "xml_parse_error": e.to_string() })),
                ..Default::default()
            };
            Extraction::degraded(metadata, e.to_string())
        }
    }
}

/// Parse XML text and probe it for claim fields
pub fn parse_metadata(text: &str) -> Result<ClaimMetadata, XmlError> {
    let text = text.trim_start_matches('\u{feff}');
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(text, options).map_err(|e| XmlError(e.to_string()))?;
    let root = doc.root_element();

    Ok(ClaimMetadata {
        claim_number: resolve(root, CLAIM_NUMBER),
        vin: resolve(root, VIN).map(|v| v.to_uppercase()),
        ro_number: resolve(root, RO_NUMBER),
        customer_name: resolve(root, CUSTOMER_NAME),
        total_amount: resolve(root, TOTAL_AMOUNT).and_then(|raw| normalize_amount(&raw)),
        raw_payload: Some(document_to_json(root)),
    })
}

fn resolve(root: Node, probes: &[Probe]) -> Option<String> {
    probes.iter().find_map(|probe| match probe {
        Probe::Path(path) => probe_path(root, path),
        Probe::Descendant(names) => probe_descendants(root, names),
        Probe::PersonName => probe_person_name(root),
    })
}

fn name_matches(node: &Node, name: &str) -> bool {
    name == "*" || node.tag_name().name().eq_ignore_ascii_case(name)
}

fn probe_path(root: Node, path: &str) -> Option<String> {
    let mut segments = path.split('/');
    let first = segments.next()?;
    if !name_matches(&root, first) {
        return None;
    }

    let mut frontier = vec![root];
    for segment in segments {
        frontier = frontier
            .into_iter()
            .flat_map(|node| node.children().filter(|c| c.is_element()))
            .filter(|child| name_matches(child, segment))
            .collect();
        if frontier.is_empty() {
            return None;
        }
    }

    frontier.into_iter().find_map(element_text)
}

fn probe_descendants(root: Node, names: &[&str]) -> Option<String> {
    names.iter().find_map(|name| {
        root.descendants().find_map(|node| {
            if !node.is_element() {
                return None;
            }
            if name_matches(&node, name) {
                if let Some(text) = element_text(node) {
                    return Some(text);
                }
            }
            node.attributes()
                .find(|attr| attr.name().eq_ignore_ascii_case(name))
                .and_then(|attr| non_empty(attr.value()))
        })
    })
}

fn probe_person_name(root: Node) -> Option<String> {
    root.descendants()
        .filter(|n| n.is_element())
        .filter(|n| PERSON_CONTAINERS.iter().any(|name| name_matches(n, name)))
        .find_map(|container| {
            let first = probe_descendants(container, &["FirstName", "First"]);
            let last = probe_descendants(container, &["LastName", "Last"]);
            let parts: Vec<String> = [first, last].into_iter().flatten().collect();
            if parts.is_empty() {
                None
            } else {
                Some(parts.join(" "))
            }
        })
}

/// Concatenated direct text of an element, trimmed
fn element_text(node: Node) -> Option<String> {
    let text: String = node
        .children()
        .filter(|c| c.is_text())
        .filter_map(|c| c.text())
        .collect();
    non_empty(&text)
}

/// Generic JSON rendition of the document for `raw_payload`
fn document_to_json(root: Node) -> Value {
    let mut object = Map::new();
    object.insert(root.tag_name().name().to_string(), element_to_json(root));
    Value::Object(object)
}

fn element_to_json(node: Node) -> Value {
    let children: Vec<Node> = node.children().filter(|c| c.is_element()).collect();
    let has_attributes = node.attributes().next().is_some();

    if children.is_empty() && !has_attributes {
        return element_text(node).map(Value::String).unwrap_or(Value::Null);
    }

    let mut object = Map::new();
    for attr in node.attributes() {
        object.insert(format!("@{}", attr.name()), Value::String(attr.value().to_string()));
    }
    for child in children {
        let key = child.tag_name().name().to_string();
        let value = element_to_json(child);
        match object.get_mut(&key) {
            Some(Value::Array(items)) => items.push(value),
            Some(existing) => {
                let first = existing.take();
                *existing = Value::Array(vec![first, value]);
            }
            None => {
                object.insert(key, value);
            }
        }
    }
    if let Some(text) = element_text(node) {
        object.insert("#text".to_string(), Value::String(text));
    }
    Value::Object(object)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_and_vin_from_nested_claim() {
        let xml = r#"<?xml version="1.0"?>
            <Claim>
                <ClaimNumber>CLM9001</ClaimNumber>
                <Vehicle><VIN>1HGCM82633A004352</VIN></Vehicle>
                <RepairOrderNumber>RO-77</RepairOrderNumber>
                <Customer><Name>Jane Doe</Name></Customer>
                <TotalAmount>$4,210.55</TotalAmount>
            </Claim>"#;

        let meta = parse_metadata(xml).unwrap();
        assert_eq!(meta.claim_number.as_deref(), Some("CLM9001"));
        assert_eq!(meta.vin.as_deref(), Some("1HGCM82633A004352"));
        assert_eq!(meta.ro_number.as_deref(), Some("RO-77"));
        assert_eq!(meta.customer_name.as_deref(), Some("Jane Doe"));
        assert_eq!(meta.total_amount, Some(4210.55));
    }

    #[test]
    fn test_estimate_layout_with_owner_person_info() {
        let xml = r#"
            <Estimate>
                <ClaimInfo><ClaimNumber>EST-1</ClaimNumber></ClaimInfo>
                <VehicleInfo><VIN>2T1BURHE0JC043821</VIN></VehicleInfo>
                <Owner><PersonInfo><FirstName>Ana</FirstName><LastName>Silva</LastName></PersonInfo></Owner>
                <Totals><GrandTotal>1500.00</GrandTotal></Totals>
            </Estimate>"#;

        let meta = parse_metadata(xml).unwrap();
        assert_eq!(meta.claim_number.as_deref(), Some("EST-1"));
        assert_eq!(meta.vin.as_deref(), Some("2T1BURHE0JC043821"));
        assert_eq!(meta.customer_name.as_deref(), Some("Ana Silva"));
        assert_eq!(meta.total_amount, Some(1500.0));
        assert!(meta.ro_number.is_none());
    }

    #[test]
    fn test_descendant_fallback_and_case_insensitive_tags() {
        let xml = r#"<workfile><deep><nested><claimno>W-5</claimno></nested></deep>
            <vehicle vin="1hgcm82633a004352"/></workfile>"#;

        let meta = parse_metadata(xml).unwrap();
        assert_eq!(meta.claim_number.as_deref(), Some("W-5"));
        assert_eq!(meta.vin.as_deref(), Some("1HGCM82633A004352"));
    }

    #[test]
    fn test_empty_elements_fall_through_to_later_probes() {
        let xml = r#"<Claim><ClaimNumber>  </ClaimNumber><Info><ClaimNum>CN-2</ClaimNum></Info></Claim>"#;
        let meta = parse_metadata(xml).unwrap();
        assert_eq!(meta.claim_number.as_deref(), Some("CN-2"));
    }

    #[test]
    fn test_unparseable_total_is_absent() {
        let xml = r#"<Claim><TotalAmount>TBD</TotalAmount></Claim>"#;
        let meta = parse_metadata(xml).unwrap();
        assert!(meta.total_amount.is_none());
    }

    #[test]
    fn test_truncated_xml_degrades_to_null_record() {
        let extraction = extract(b"<Claim><ClaimNumber>CLM9001</Claim");
        assert!(extraction.degraded.is_some());
        assert!(extraction.metadata.is_empty());
        let payload = extraction.metadata.raw_payload.unwrap();
        assert!(payload.get("xml_parse_error").is_some());
    }

    #[test]
    fn test_raw_payload_tree_shape() {
        let xml = r#"<Claim id="9"><Line>a</Line><Line>b</Line><Empty/></Claim>"#;
        let meta = parse_metadata(xml).unwrap();
        let payload = meta.raw_payload.unwrap();
        assert_eq!(payload["Claim"]["@id"], "9");
        assert_eq!(payload["Claim"]["Line"], serde_json::json!(["a", "b"]));
        assert_eq!(payload["Claim"]["Empty"], Value::Null);
    }
}
