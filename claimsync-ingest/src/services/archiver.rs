//! Archive relocation
//!
//! Moves an inbox file into the archive under a collision-proof name. A
//! plain rename is tried first; when that fails (other than the source having
//! vanished) the file is copied to a hidden temporary name inside the archive,
//! size-checked, renamed into place, and only then removed from the inbox.
//!
//! Invariant: on success the source is gone and the destination exists; on
//! failure the source is untouched and no partial destination remains.

use chrono::Utc;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

const MAX_STEM_CHARS: usize = 60;
const MAX_EXT_CHARS: usize = 10;
const MAX_SUFFIX_ATTEMPTS: u32 = 1000;

/// Archive relocation errors
#[derive(Debug, Error)]
pub enum ArchiveError {
    /// Source disappeared before it could be moved (another instance took it)
    #[error("Source file missing: {0}")]
    SourceMissing(PathBuf),

    #[error("Archive directory unavailable {0}: {1}")]
    ArchiveDirUnavailable(PathBuf, String),

    #[error("Copy into archive failed for {0}: {1}")]
    CopyFailed(PathBuf, String),

    /// Copied size differs from the source size
    #[error("Incomplete copy of {path}: expected {expected} bytes, wrote {actual}")]
    Incomplete {
        path: PathBuf,
        expected: u64,
        actual: u64,
    },

    #[error("Could not remove source {0} after copy: {1}")]
    SourceRemoveFailed(PathBuf, String),

    #[error("No free archive name for {0}")]
    NameExhausted(String),
}

/// Where a file landed in the archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedFile {
    pub archived_name: String,
    pub path: PathBuf,
}

/// Relocates inbox files into the archive directory
#[derive(Debug, Clone)]
pub struct Archiver {
    archive_dir: PathBuf,
}

impl Archiver {
    pub fn new(archive_dir: impl Into<PathBuf>) -> Self {
        Self {
            archive_dir: archive_dir.into(),
        }
    }

    pub fn archive_dir(&self) -> &Path {
        &self.archive_dir
    }

    /// Absolute path of an archived file
    ///
    /// Returns `None` for names that would escape the archive directory.
    pub fn archived_path(&self, archived_name: &str) -> Option<PathBuf> {
        let is_plain = !archived_name.is_empty()
            && !archived_name.contains(['/', '\\'])
            && archived_name != "."
            && archived_name != "..";
        is_plain.then(|| self.archive_dir.join(archived_name))
    }

    /// Move `source` into the archive
    pub async fn archive(
        &self,
        source: &Path,
        original_name: &str,
        content_hash: &str,
    ) -> Result<ArchivedFile, ArchiveError> {
        match tokio::fs::metadata(&self.archive_dir).await {
            Ok(meta) if meta.is_dir() => {}
            Ok(_) => {
                return Err(ArchiveError::ArchiveDirUnavailable(
                    self.archive_dir.clone(),
                    "not a directory".to_string(),
                ))
            }
            Err(e) => {
                return Err(ArchiveError::ArchiveDirUnavailable(
                    self.archive_dir.clone(),
                    e.to_string(),
                ))
            }
        }

        let base_name = archive_name(original_name, content_hash);
        let (archived_name, destination) = self.free_destination(&base_name).await?;

        match tokio::fs::rename(source, &destination).await {
            Ok(()) => {
                tracing::debug!(
                    file = original_name,
                    archived_name = %archived_name,
                    "Archived by rename"
                );
            }
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(ArchiveError::SourceMissing(source.to_path_buf()));
            }
            Err(e) => {
                tracing::info!(
                    file = original_name,
                    error = %e,
                    "Rename into archive failed, falling back to copy"
                );
                copy_then_remove(source, &self.archive_dir, &destination).await?;
            }
        }

        Ok(ArchivedFile {
            archived_name,
            path: destination,
        })
    }

    /// First name derived from `base_name` that is not taken in the archive
    async fn free_destination(&self, base_name: &str) -> Result<(String, PathBuf), ArchiveError> {
        let (stem, ext) = split_extension(base_name);
        for attempt in 0..MAX_SUFFIX_ATTEMPTS {
            let candidate = if attempt == 0 {
                base_name.to_string()
            } else {
                format!("{}-{}{}", stem, attempt, ext)
            };
            let path = self.archive_dir.join(&candidate);
            if !path_exists(&path).await {
                return Ok((candidate, path));
            }
        }
        Err(ArchiveError::NameExhausted(base_name.to_string()))
    }
}

/// Copy fallback for renames that cannot be done atomically (cross-device
/// moves, locked handles)
pub(crate) async fn copy_then_remove(
    source: &Path,
    archive_dir: &Path,
    destination: &Path,
) -> Result<(), ArchiveError> {
    let expected = match tokio::fs::metadata(source).await {
        Ok(meta) => meta.len(),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(ArchiveError::SourceMissing(source.to_path_buf()))
        }
        Err(e) => return Err(ArchiveError::CopyFailed(source.to_path_buf(), e.to_string())),
    };

    let file_name = destination
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let partial = archive_dir.join(format!(".{}.partial", file_name));

    let actual = match tokio::fs::copy(source, &partial).await {
        Ok(bytes) => bytes,
        Err(e) => {
            discard(&partial).await;
            return Err(ArchiveError::CopyFailed(source.to_path_buf(), e.to_string()));
        }
    };

    if actual != expected {
        discard(&partial).await;
        return Err(ArchiveError::Incomplete {
            path: source.to_path_buf(),
            expected,
            actual,
        });
    }

    if let Err(e) = tokio::fs::rename(&partial, destination).await {
        discard(&partial).await;
        return Err(ArchiveError::CopyFailed(source.to_path_buf(), e.to_string()));
    }

    if let Err(e) = tokio::fs::remove_file(source).await {
        // Roll back so the file is archived exactly once on a later tick
        discard(destination).await;
        return Err(ArchiveError::SourceRemoveFailed(
            source.to_path_buf(),
            e.to_string(),
        ));
    }

    Ok(())
}

async fn discard(path: &Path) {
    if let Err(e) = tokio::fs::remove_file(path).await {
        if e.kind() != ErrorKind::NotFound {
            tracing::warn!(path = %path.display(), error = %e, "Failed to clean up archive file");
        }
    }
}

async fn path_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

/// `{UTC timestamp}_{16 hex of hash}_{sanitized original name}`
pub fn archive_name(original_name: &str, content_hash: &str) -> String {
    let timestamp = Utc::now().format("%Y%m%dT%H%M%SZ");
    let prefix: String = content_hash.chars().take(16).collect();

    let base = original_name
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(original_name);
    let (stem, ext) = split_extension(base);
    let mut safe_stem: String = sanitize(stem).chars().take(MAX_STEM_CHARS).collect();
    safe_stem = safe_stem.trim_start_matches('.').to_string();
    if safe_stem.is_empty() {
        safe_stem = "file".to_string();
    }
    let safe_ext: String = sanitize(ext).chars().take(MAX_EXT_CHARS + 1).collect();

    format!("{}_{}_{}{}", timestamp, prefix, safe_stem, safe_ext)
}

fn sanitize(raw: &str) -> String {
    raw.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect()
}

/// Split `name.ext` into (`name`, `.ext`)
///
/// Only a short alphanumeric suffix counts as an extension.
fn split_extension(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx)
            if idx > 0
                && name.len() - idx - 1 <= MAX_EXT_CHARS
                && name[idx + 1..].chars().all(|c| c.is_ascii_alphanumeric())
                && idx + 1 < name.len() =>
        {
            name.split_at(idx)
        }
        _ => (name, ""),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    const HASH: &str = "0123456789abcdef0123456789abcdef0123456789abcdef0123456789abcdef";

    #[test]
    fn test_archive_name_shape() {
        let name = archive_name("Estimate #42 (final).xml", HASH);
        let parts: Vec<&str> = name.splitn(3, '_').collect();

        assert_eq!(parts[0].len(), 16);
        assert!(parts[0].ends_with('Z'));
        assert_eq!(parts[1], "0123456789abcdef");
        assert_eq!(parts[2], "Estimate__42__final_.xml");
    }

    #[test]
    fn test_archive_name_degenerate_inputs() {
        assert!(archive_name("", HASH).ends_with("_0123456789abcdef_file"));
        assert!(archive_name("../../etc/passwd", HASH).ends_with("_0123456789abcdef_passwd"));
        assert!(archive_name("...", HASH).ends_with("_0123456789abcdef_file"));
        let long = "x".repeat(300) + ".ems";
        let name = archive_name(&long, HASH);
        assert!(name.ends_with(".ems"));
        assert!(name.len() < 120);
    }

    #[test]
    fn test_archived_path_rejects_traversal() {
        let archiver = Archiver::new("/srv/archive");
        assert_eq!(
            archiver.archived_path("a.xml"),
            Some(PathBuf::from("/srv/archive/a.xml"))
        );
        assert!(archiver.archived_path("../a.xml").is_none());
        assert!(archiver.archived_path("..").is_none());
        assert!(archiver.archived_path("").is_none());
    }

    #[tokio::test]
    async fn test_archive_moves_file() {
        let inbox = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let source = inbox.path().join("claim.xml");
        std::fs::write(&source, "<Claim/>").unwrap();

        let archiver = Archiver::new(archive.path());
        let archived = archiver.archive(&source, "claim.xml", HASH).await.unwrap();

        assert!(!source.exists());
        assert!(archived.path.exists());
        assert!(archived.archived_name.contains("_0123456789abcdef_claim.xml"));
        assert_eq!(std::fs::read_to_string(&archived.path).unwrap(), "<Claim/>");
    }

    #[tokio::test]
    async fn test_existing_destination_never_overwritten() {
        let inbox = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let archiver = Archiver::new(archive.path());

        let first = inbox.path().join("a.ems");
        std::fs::write(&first, "one").unwrap();
        let a = archiver.archive(&first, "a.ems", HASH).await.unwrap();

        // Same name, same hash, same second: must get a suffixed slot
        std::fs::write(&first, "two").unwrap();
        let b = archiver.archive(&first, "a.ems", HASH).await.unwrap();

        assert_ne!(a.archived_name, b.archived_name);
        assert_eq!(std::fs::read_to_string(&a.path).unwrap(), "one");
        assert_eq!(std::fs::read_to_string(&b.path).unwrap(), "two");
    }

    #[tokio::test]
    async fn test_missing_source() {
        let archive = TempDir::new().unwrap();
        let archiver = Archiver::new(archive.path());

        let result = archiver
            .archive(&archive.path().join("gone.xml"), "gone.xml", HASH)
            .await;
        assert!(matches!(result, Err(ArchiveError::SourceMissing(_))));
        assert_eq!(std::fs::read_dir(archive.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_missing_archive_dir() {
        let inbox = TempDir::new().unwrap();
        let source = inbox.path().join("claim.xml");
        std::fs::write(&source, "<Claim/>").unwrap();

        let archiver = Archiver::new(inbox.path().join("no-such-archive"));
        let result = archiver.archive(&source, "claim.xml", HASH).await;

        assert!(matches!(result, Err(ArchiveError::ArchiveDirUnavailable(..))));
        assert!(source.exists());
    }

    #[tokio::test]
    async fn test_copy_fallback_moves_and_cleans_up() {
        let inbox = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let source = inbox.path().join("claim.awf");
        std::fs::write(&source, vec![1u8; 4096]).unwrap();
        let destination = archive.path().join("archived.awf");

        copy_then_remove(&source, archive.path(), &destination)
            .await
            .unwrap();

        assert!(!source.exists());
        assert_eq!(std::fs::metadata(&destination).unwrap().len(), 4096);
        let leftovers: Vec<_> = std::fs::read_dir(archive.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(leftovers, vec!["archived.awf".to_string()]);
    }

    #[tokio::test]
    async fn test_copy_fallback_failure_leaves_source() {
        let inbox = TempDir::new().unwrap();
        let archive = TempDir::new().unwrap();
        let source = inbox.path().join("claim.xml");
        std::fs::write(&source, "<Claim/>").unwrap();

        // Destination inside a directory that does not exist: final rename fails
        let destination = archive.path().join("missing").join("claim.xml");
        let result = copy_then_remove(&source, archive.path(), &destination).await;

        assert!(matches!(result, Err(ArchiveError::CopyFailed(..))));
        assert!(source.exists());
        assert_eq!(std::fs::read_dir(archive.path()).unwrap().count(), 0);
    }
}
