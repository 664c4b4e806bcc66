//! EMS text exports
//!
//! EMS files are loosely structured text: one segment per line, either
//! pipe-delimited (`CLM|qualifier|number`) or `KEY=value`. Segment tags and
//! keys are normalized to uppercase alphanumerics before matching.
//!
//! Totals are a heuristic: every labeled total is collected and the largest
//! wins, and without any labeled total the largest currency-looking amount in
//! the whole document is used. Subtotals larger than the grand total will be
//! picked over it.

use super::{find_vin, is_vin_shaped, non_empty, normalize_amount};
use crate::models::{ClaimMetadata, Extraction};
use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::json;

static CURRENCY_AMOUNT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?:\$\s*)?(\d{1,3}(?:,\d{3})+|\d+)\.\d{2}\b").expect("amount pattern is valid")
});

const CLAIM_TAGS: &[&str] = &["CLM", "CLA", "CL", "CLAIM"];
const VIN_TAGS: &[&str] = &["VEH", "VIN", "VHC"];
const RO_TAGS: &[&str] = &["RO", "RON", "REPAIRORDER"];
const NAME_TAGS: &[&str] = &["NAM", "CUST", "OWN"];

const CLAIM_KEYS: &[&str] = &["CLAIM", "CLAIMNUMBER", "CLAIMNO", "CLAIMNUM"];
const VIN_KEYS: &[&str] = &["VIN", "VEHICLEVIN", "VINNUMBER"];
const RO_KEYS: &[&str] = &["RO", "RONUMBER", "RONO", "REPAIRORDER", "REPAIRORDERNUMBER"];
const NAME_KEYS: &[&str] = &["CUSTOMER", "CUSTOMERNAME", "OWNER", "OWNERNAME", "INSURED"];

/// One recognized line of an EMS export
#[derive(Debug)]
enum Segment<'a> {
    /// `TAG|v1|v2|...`
    Delimited { tag: String, values: Vec<&'a str> },
    /// `KEY=value`
    KeyValue { key: String, value: &'a str },
}

impl<'a> Segment<'a> {
    fn parse(line: &'a str) -> Option<Self> {
        let line = line.trim();
        if line.is_empty() {
            return None;
        }
        if let Some((tag, rest)) = line.split_once('|') {
            let tag = normalize_label(tag);
            if tag.is_empty() {
                return None;
            }
            let values = rest.split('|').map(str::trim).collect();
            return Some(Segment::Delimited { tag, values });
        }
        if let Some((key, value)) = line.split_once('=') {
            let key = normalize_label(key);
            if key.is_empty() {
                return None;
            }
            return Some(Segment::KeyValue {
                key,
                value: value.trim(),
            });
        }
        None
    }

    fn label(&self) -> &str {
        match self {
            Segment::Delimited { tag, .. } => tag,
            Segment::KeyValue { key, .. } => key,
        }
    }
}

fn normalize_label(raw: &str) -> String {
    raw.chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

/// Extract metadata from an EMS export
pub fn extract(bytes: &[u8]) -> Extraction {
    let text = String::from_utf8_lossy(bytes);
    let segments: Vec<Segment> = text.lines().filter_map(Segment::parse).collect();

    let mut metadata = ClaimMetadata::default();
    let mut totals: Vec<f64> = Vec::new();

    for segment in &segments {
        match segment {
            Segment::Delimited { tag, values } => {
                apply_delimited(&mut metadata, &mut totals, tag, values)
            }
            Segment::KeyValue { key, value } => {
                apply_key_value(&mut metadata, &mut totals, key, value)
            }
        }
    }

    if metadata.vin.is_none() {
        metadata.vin = find_vin(&text);
    }

    metadata.total_amount = max_amount(totals).or_else(|| {
        max_amount(
            CURRENCY_AMOUNT
                .find_iter(&text)
                .filter_map(|m| normalize_amount(m.as_str()))
                .collect(),
        )
    });

    let mut tags: Vec<&str> = Vec::new();
    for segment in &segments {
        if !tags.contains(&segment.label()) {
            tags.push(segment.label());
        }
    }
    metadata.raw_payload = Some(json!({
        "lines": text.lines().count(),
        "segments": tags,
    }));

    if metadata.is_empty() {
        Extraction::degraded(metadata, "no recognizable EMS segments")
    } else {
        Extraction::complete(metadata)
    }
}

fn apply_delimited(meta: &mut ClaimMetadata, totals: &mut Vec<f64>, tag: &str, values: &[&str]) {
    if CLAIM_TAGS.contains(&tag) {
        if meta.claim_number.is_none() {
            meta.claim_number = values
                .get(1)
                .and_then(|v| non_empty(v))
                .or_else(|| values.first().and_then(|v| non_empty(v)));
        }
    } else if VIN_TAGS.contains(&tag) {
        if meta.vin.is_none() {
            meta.vin = values
                .iter()
                .map(|v| v.to_uppercase())
                .find(|v| is_vin_shaped(v));
        }
    } else if RO_TAGS.contains(&tag) {
        if meta.ro_number.is_none() {
            meta.ro_number = values.iter().find_map(|v| non_empty(v));
        }
    } else if NAME_TAGS.contains(&tag) {
        if meta.customer_name.is_none() {
            meta.customer_name = person_name(values);
        }
    } else if tag.contains("TOT") {
        totals.extend(values.iter().filter_map(|v| parse_labeled_amount(v)));
    }
}

fn apply_key_value(meta: &mut ClaimMetadata, totals: &mut Vec<f64>, key: &str, value: &str) {
    if CLAIM_KEYS.contains(&key) {
        if meta.claim_number.is_none() {
            meta.claim_number = non_empty(value);
        }
    } else if VIN_KEYS.contains(&key) {
        if meta.vin.is_none() {
            let candidate = value.trim().to_uppercase();
            if is_vin_shaped(&candidate) {
                meta.vin = Some(candidate);
            }
        }
    } else if RO_KEYS.contains(&key) {
        if meta.ro_number.is_none() {
            meta.ro_number = non_empty(value);
        }
    } else if NAME_KEYS.contains(&key) {
        if meta.customer_name.is_none() {
            meta.customer_name = non_empty(value);
        }
    } else if key.contains("TOT") {
        totals.extend(parse_labeled_amount(value));
    }
}

/// `NAM|Last|First` becomes "First Last"; a single value is used as-is
fn person_name(values: &[&str]) -> Option<String> {
    let parts: Vec<String> = values.iter().filter_map(|v| non_empty(v)).collect();
    match parts.as_slice() {
        [] => None,
        [single] => Some(single.clone()),
        [last, first, ..] => Some(format!("{} {}", first, last)),
    }
}

/// A labeled total value: must look numeric once `$` and `,` are removed
fn parse_labeled_amount(raw: &str) -> Option<f64> {
    let cleaned: String = raw
        .trim()
        .chars()
        .filter(|c| !matches!(c, '$' | ',') && !c.is_whitespace())
        .collect();
    if cleaned.is_empty() || !cleaned.chars().all(|c| c.is_ascii_digit() || c == '.') {
        return None;
    }
    normalize_amount(&cleaned)
}

fn max_amount(amounts: Vec<f64>) -> Option<f64> {
    amounts.into_iter().reduce(f64::max)
}
