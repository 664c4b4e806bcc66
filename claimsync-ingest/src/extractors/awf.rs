//! AWF containers
//!
//! An AWF export is a zip archive. The first `.xml` entry goes through the
//! XML extractor; when that yields no VIN, the plain-text vehicle sidecars
//! (`.veh`, `.ven`, `.txt`) are scanned for a VIN-shaped token. The entry
//! listing always lands in `raw_payload` for diagnostics.

use super::{find_vin, xml};
use crate::models::{ClaimMetadata, Extraction};
use crate::services::format_sniffer::looks_like_zip;
use serde_json::{json, Map, Value};
use std::io::{Cursor, Read};
use zip::ZipArchive;

/// Entries larger than this are not read into memory
const MAX_ENTRY_BYTES: u64 = 32 * 1024 * 1024;

const SIDECAR_EXTENSIONS: &[&str] = &[".veh", ".ven", ".txt"];

/// Extract metadata from an AWF container
pub fn extract(bytes: &[u8]) -> Extraction {
    if !looks_like_zip(bytes) {
        return unreadable("no zip signature".to_string());
    }

    let mut archive = match ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => return unreadable(e.to_string()),
    };

    let entries = entry_names(&mut archive);
    let mut payload = Map::new();
    payload.insert("entries".to_string(), json!(entries));

    let mut metadata = ClaimMetadata::default();
    let mut degraded: Option<String> = None;

    if let Some(xml_entry) = entries.iter().find(|name| has_extension(name, &[".xml"])) {
        payload.insert("xml_entry".to_string(), json!(xml_entry));
        match read_entry(&mut archive, xml_entry) {
            Some(text) => match xml::parse_metadata(&text) {
                Ok(parsed) => {
                    if let Some(tree) = parsed.raw_payload.clone() {
                        payload.insert("xml".to_string(), tree);
                    }
                    metadata = parsed;
                }
                Err(e) => {
                    payload.insert("xml_parse_error".to_string(), json!(e.to_string()));
                    degraded = Some(format!("{} in entry {}", e, xml_entry));
                }
            },
            None => {
                degraded = Some(format!("unreadable entry {}", xml_entry));
            }
        }
    }

    if metadata.vin.is_none() {
        let sidecar_vin = entries
            .iter()
            .filter(|name| has_extension(name, SIDECAR_EXTENSIONS))
            .find_map(|name| {
                read_entry(&mut archive, name)
                    .and_then(|text| find_vin(&text).map(|vin| (name.clone(), vin)))
            });
        if let Some((entry, vin)) = sidecar_vin {
            payload.insert("vin_source".to_string(), json!(entry));
            metadata.vin = Some(vin);
        }
    }

    metadata.raw_payload = Some(Value::Object(payload));

    if metadata.is_empty() && degraded.is_none() {
        degraded = Some("no parseable content in AWF container".to_string());
    }

    Extraction {
        metadata,
        degraded,
    }
}

fn unreadable(reason: String) -> Extraction {
    let note = format!("unreadable AWF container: {}", reason);
    let metadata = ClaimMetadata {
        raw_payload: Some(json!({ "entries": [], "container_error": reason })),
        ..Default::default()
    };
    Extraction::degraded(metadata, note)
}

fn entry_names<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>) -> Vec<String> {
    (0..archive.len())
        .filter_map(|i| {
            let entry = archive.by_index(i).ok()?;
            if entry.is_dir() {
                None
            } else {
                Some(entry.name().to_string())
            }
        })
        .collect()
}

fn has_extension(name: &str, extensions: &[&str]) -> bool {
    let lower = name.to_lowercase();
    extensions.iter().any(|ext| lower.ends_with(ext))
}

fn read_entry<R: Read + std::io::Seek>(archive: &mut ZipArchive<R>, name: &str) -> Option<String> {
    let entry = archive.by_name(name).ok()?;
    if entry.size() > MAX_ENTRY_BYTES {
        tracing::warn!(entry = name, size = entry.size(), "AWF entry too large, skipped");
        return None;
    }
    let mut buffer = Vec::new();
    entry.take(MAX_ENTRY_BYTES).read_to_end(&mut buffer).ok()?;
    Some(String::from_utf8_lossy(&buffer).into_owned())
}
