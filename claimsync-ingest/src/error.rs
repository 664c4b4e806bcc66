//! Error types for claimsync-ingest
//!
//! Component errors keep their own enums; [`PipelineError`] gathers them for
//! per-file processing so a single failure can be reported as an `error`
//! event without stopping the tick.

use crate::services::archiver::ArchiveError;
use crate::services::inbox_scanner::ScanError;
use thiserror::Error;

/// Per-file pipeline failure
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Inbox scan failed: {0}")]
    Scan(#[from] ScanError),

    #[error("Archive failed: {0}")]
    Archive(#[from] ArchiveError),

    #[error("Store error: {0}")]
    Store(#[from] claimsync_common::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PipelineError {
    /// Short machine-readable kind recorded in `error` event meta
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Scan(_) => "scan",
            PipelineError::Archive(_) => "archive",
            PipelineError::Store(_) => "store",
            PipelineError::Io(_) => "io",
        }
    }
}

pub type PipelineResult<T> = std::result::Result<T, PipelineError>;
