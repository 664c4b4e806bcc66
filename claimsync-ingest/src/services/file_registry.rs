//! File registry
//!
//! One record per distinct content plus its extracted metadata. Both writes
//! are idempotent under retry and go through [`retry_on_lock`] so a busy
//! database delays the pipeline instead of failing the file.

use crate::db;
use crate::db::files::NewIngestedFile;
use crate::models::{ClaimMetadata, FileFormat};
use crate::utils::{begin_monitored, retry_on_lock};
use claimsync_common::{Error, Result};
use sqlx::SqlitePool;

/// Result of registering a file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Registration {
    pub file_id: i64,
    /// False when the content hash was already registered
    pub created: bool,
    /// Format stored on the registered row; for a duplicate this is the
    /// format of the first registration, not of the newly arrived name
    pub format: FileFormat,
}

#[derive(Clone)]
pub struct FileRegistry {
    pool: SqlitePool,
    max_lock_wait_ms: u64,
}

impl FileRegistry {
    pub fn new(pool: SqlitePool, max_lock_wait_ms: u64) -> Self {
        Self {
            pool,
            max_lock_wait_ms,
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Register a file by content hash; an existing hash returns the existing id
    pub async fn register(
        &self,
        original_name: &str,
        archived_name: &str,
        size_bytes: u64,
        content_hash: &str,
        format: FileFormat,
    ) -> Result<Registration> {
        let new_file = NewIngestedFile {
            original_name,
            archived_name,
            size_bytes,
            content_hash,
            format,
        };

        let (file_id, created) = retry_on_lock("file_registry::register", self.max_lock_wait_ms, || {
            db::files::insert_or_get(&self.pool, &new_file)
        })
        .await?;

        if created {
            return Ok(Registration {
                file_id,
                created,
                format,
            });
        }

        let existing = retry_on_lock("file_registry::load_registered", self.max_lock_wait_ms, || {
            db::files::load_file_by_hash(&self.pool, content_hash)
        })
        .await?
        .ok_or_else(|| Error::Internal(format!("Registered file {} vanished", file_id)))?;

        Ok(Registration {
            file_id: existing.id,
            created,
            format: existing.format,
        })
    }

    /// Store extraction results as a full replace, mark the file processed and
    /// record or clear its error annotation, all in one transaction
    pub async fn upsert_metadata(
        &self,
        file_id: i64,
        metadata: &ClaimMetadata,
        annotation: Option<&str>,
    ) -> Result<()> {
        retry_on_lock("file_registry::upsert_metadata", self.max_lock_wait_ms, || async move {
            let mut tx = begin_monitored(&self.pool, "file_registry::upsert_metadata").await?;
            db::metadata::upsert(tx.conn(), file_id, metadata).await?;
            db::files::mark_processed(tx.conn(), file_id, annotation).await?;
            tx.commit().await
        })
        .await
    }

    /// Annotate a file with a non-fatal error (link failure)
    pub async fn annotate(&self, file_id: i64, annotation: &str) -> Result<()> {
        retry_on_lock("file_registry::annotate", self.max_lock_wait_ms, || {
            db::files::set_error(&self.pool, file_id, annotation)
        })
        .await
    }
}
