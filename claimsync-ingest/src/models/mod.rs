//! Domain types shared across the ingest pipeline

use serde::{Deserialize, Serialize};
use std::fmt;

/// Claim-export format, resolved once by the sniffer and used as the
/// extractor dispatch key (persisted as `ingested_files.format`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileFormat {
    Xml,
    Ems,
    Awf,
    Unknown,
}

impl FileFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileFormat::Xml => "xml",
            FileFormat::Ems => "ems",
            FileFormat::Awf => "awf",
            FileFormat::Unknown => "unknown",
        }
    }

    /// Parse the database representation; anything unrecognized is `Unknown`
    pub fn from_db(value: &str) -> Self {
        match value {
            "xml" => FileFormat::Xml,
            "ems" => FileFormat::Ems,
            "awf" => FileFormat::Awf,
            _ => FileFormat::Unknown,
        }
    }

    /// Whether files of this format go through extraction
    pub fn is_extractable(&self) -> bool {
        !matches!(self, FileFormat::Unknown)
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Normalized claim fields pulled out of an export
///
/// Every field is optional; a record with all fields `None` is still a valid
/// extraction result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimMetadata {
    pub claim_number: Option<String>,
    pub vin: Option<String>,
    pub ro_number: Option<String>,
    pub customer_name: Option<String>,
    pub total_amount: Option<f64>,
    /// Diagnostic payload, never interpreted by the pipeline
    pub raw_payload: Option<serde_json::Value>,
}

impl ClaimMetadata {
    /// True when there is something to link a claim by
    pub fn has_link_key(&self) -> bool {
        self.claim_number.is_some() || self.vin.is_some()
    }

    /// True when no normalized field was found
    pub fn is_empty(&self) -> bool {
        self.claim_number.is_none()
            && self.vin.is_none()
            && self.ro_number.is_none()
            && self.customer_name.is_none()
            && self.total_amount.is_none()
    }
}

/// Result of running an extractor over one file
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub metadata: ClaimMetadata,
    /// Non-fatal degradation note (malformed input, nothing recognizable)
    pub degraded: Option<String>,
}

impl Extraction {
    pub fn complete(metadata: ClaimMetadata) -> Self {
        Self {
            metadata,
            degraded: None,
        }
    }

    pub fn degraded(metadata: ClaimMetadata, note: impl Into<String>) -> Self {
        Self {
            metadata,
            degraded: Some(note.into()),
        }
    }
}
