//! Inbox scanner
//!
//! Lists the regular files waiting in the inbox (non-recursive) in lexical
//! name order. Files that are still being written are left for a later tick:
//! dot-prefixed names, `.part`/`.tmp` partial uploads and zero-byte files.

use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

/// Inbox scanning errors
#[derive(Debug, Error)]
pub enum ScanError {
    /// Inbox path does not exist
    #[error("Path not found: {0}")]
    PathNotFound(PathBuf),

    /// Inbox path exists but is not a directory
    #[error("Not a directory: {0}")]
    NotADirectory(PathBuf),

    /// Directory listing failed
    #[error("I/O error listing {0}: {1}")]
    IoError(PathBuf, String),
}

/// A file ready for processing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEntry {
    pub path: PathBuf,
    pub file_name: String,
    pub size_bytes: u64,
}

/// Inbox scanner
#[derive(Debug, Clone)]
pub struct InboxScanner {
    ignore_names: Vec<String>,
    ignore_suffixes: Vec<String>,
}

impl InboxScanner {
    /// Create a scanner with the default ignore rules
    pub fn new() -> Self {
        Self {
            ignore_names: vec!["Thumbs.db".to_string(), "desktop.ini".to_string()],
            ignore_suffixes: vec![".part".to_string(), ".tmp".to_string()],
        }
    }

    /// List files ready for processing, sorted by name
    pub fn scan(&self, inbox: &Path) -> Result<Vec<InboxEntry>, ScanError> {
        if !inbox.exists() {
            return Err(ScanError::PathNotFound(inbox.to_path_buf()));
        }
        if !inbox.is_dir() {
            return Err(ScanError::NotADirectory(inbox.to_path_buf()));
        }

        let mut entries = Vec::new();

        let walker = WalkDir::new(inbox)
            .min_depth(1)
            .max_depth(1)
            .follow_links(false)
            .sort_by_file_name();

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    // A file vanishing mid-listing is expected with concurrent producers
                    tracing::warn!(inbox = %inbox.display(), error = %e, "Error accessing inbox entry");
                    continue;
                }
            };

            if !entry.file_type().is_file() {
                continue;
            }

            let file_name = entry.file_name().to_string_lossy().to_string();
            if !self.is_ready_name(&file_name) {
                tracing::trace!(file = %file_name, "Skipping in-progress or hidden file");
                continue;
            }

            let size_bytes = match entry.metadata() {
                Ok(metadata) => metadata.len(),
                Err(e) => {
                    tracing::warn!(file = %file_name, error = %e, "Cannot stat inbox file");
                    continue;
                }
            };
            if size_bytes == 0 {
                tracing::debug!(file = %file_name, "Skipping zero-byte file");
                continue;
            }

            entries.push(InboxEntry {
                path: entry.path().to_path_buf(),
                file_name,
                size_bytes,
            });
        }

        Ok(entries)
    }

    /// Count of files currently ready in the inbox
    pub fn count(&self, inbox: &Path) -> Result<usize, ScanError> {
        self.scan(inbox).map(|entries| entries.len())
    }

    fn is_ready_name(&self, file_name: &str) -> bool {
        if file_name.starts_with('.') {
            return false;
        }
        if self.ignore_names.iter().any(|n| n == file_name) {
            return false;
        }
        let lower = file_name.to_lowercase();
        !self.ignore_suffixes.iter().any(|s| lower.ends_with(s.as_str()))
    }
}

impl Default for InboxScanner {
    fn default() -> Self {
        Self::new()
    }
}
