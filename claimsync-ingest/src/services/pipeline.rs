//! Per-file ingest pipeline
//!
//! Drives one inbox file through hashing, archiving, registration,
//! extraction and claim linking. Every step is annotated in the event log.
//! A failure is scoped to the file it happened on: it becomes an `error`
//! event and the caller moves on to the next file.
//!
//! The same extraction path serves [`IngestPipeline::reextract`], which also
//! hosts the read-side queries over what the pipeline produced.

use crate::db;
use crate::db::files::{FilePage, FileQuery, IngestedFile};
use crate::db::metadata::ExtractedMetadataRecord;
use crate::error::{PipelineError, PipelineResult};
use crate::extractors;
use crate::models::{Extraction, FileFormat};
use crate::services::archiver::{ArchiveError, ArchivedFile, Archiver};
use crate::services::claim_linker::{ClaimLink, ClaimLinker, ClaimRepository};
use crate::services::event_log::EventLog;
use crate::services::file_registry::FileRegistry;
use crate::services::format_sniffer;
use crate::services::hash_store;
use crate::services::inbox_scanner::InboxEntry;
use claimsync_common::db::init::{read_u64_setting, DEFAULT_MAX_LOCK_WAIT_MS, MAX_LOCK_WAIT_SETTING};
use claimsync_common::events::{EventBus, IngestEvent, IngestStage};
use claimsync_common::Error;
use serde_json::json;
use sqlx::SqlitePool;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// What happened to one inbox file
#[derive(Debug, Clone, PartialEq)]
pub enum FileOutcome {
    /// Archived, registered and extracted
    Ingested {
        file_id: i64,
        duplicate: bool,
        extraction: ExtractionOutcome,
    },
    /// Unknown format: archived and registered without extraction
    UnknownArchived { file_id: i64, duplicate: bool },
    /// Processing stopped; the error was recorded as an event
    Failed { kind: &'static str, message: String },
    /// Source vanished before it could be processed
    Skipped,
}

/// Result of running extraction and linking for a registered file
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractionOutcome {
    /// Degradation note when the extractor could not fully parse the file
    pub degraded: Option<String>,
    pub link: Option<ClaimLink>,
    /// Error from the claim linker; registration and metadata are kept
    pub link_error: Option<String>,
}

/// Progress markers used to scope an `error` event to its file
#[derive(Debug, Default)]
struct FileProgress {
    content_hash: Option<String>,
    file_id: Option<i64>,
    archived_name: Option<String>,
}

#[derive(Clone)]
pub struct IngestPipeline {
    pool: SqlitePool,
    archiver: Archiver,
    registry: FileRegistry,
    linker: ClaimLinker,
    event_log: EventLog,
}

impl IngestPipeline {
    pub fn new(
        pool: SqlitePool,
        archive_dir: impl Into<PathBuf>,
        bus: EventBus,
        claims: Arc<dyn ClaimRepository>,
        claim_autocreate: bool,
        max_lock_wait_ms: u64,
    ) -> Self {
        Self {
            archiver: Archiver::new(archive_dir),
            registry: FileRegistry::new(pool.clone(), max_lock_wait_ms),
            linker: ClaimLinker::new(pool.clone(), claims, claim_autocreate),
            event_log: EventLog::new(pool.clone(), bus),
            pool,
        }
    }

    /// Build a pipeline over the SQLite claims table, reading the lock-retry
    /// budget from the settings table
    pub async fn with_sqlite_claims(
        pool: SqlitePool,
        archive_dir: impl Into<PathBuf>,
        bus: EventBus,
        claim_autocreate: bool,
    ) -> claimsync_common::Result<Self> {
        let max_lock_wait_ms =
            read_u64_setting(&pool, MAX_LOCK_WAIT_SETTING, DEFAULT_MAX_LOCK_WAIT_MS).await?;
        let claims = Arc::new(db::claims::SqliteClaimRepository::new(pool.clone()));
        Ok(Self::new(
            pool,
            archive_dir,
            bus,
            claims,
            claim_autocreate,
            max_lock_wait_ms,
        ))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn archiver(&self) -> &Archiver {
        &self.archiver
    }

    pub fn event_log(&self) -> &EventLog {
        &self.event_log
    }

    pub fn event_bus(&self) -> &EventBus {
        self.event_log.bus()
    }

    /// Process one inbox file; never returns an error
    pub async fn process_entry(&self, entry: &InboxEntry) -> FileOutcome {
        let mut progress = FileProgress::default();

        let result = self.try_process(entry, &mut progress).await;
        match result {
            Ok(outcome) => outcome,
            Err(e) if source_gone(&e) => {
                tracing::debug!(
                    file = %entry.file_name,
                    "Inbox file disappeared before processing, skipping"
                );
                FileOutcome::Skipped
            }
            Err(e) => {
                let kind = e.kind();
                let message = e.to_string();
                tracing::warn!(
                    file = %entry.file_name,
                    content_hash = progress.content_hash.as_deref().unwrap_or(""),
                    file_id = ?progress.file_id,
                    error = %message,
                    "Failed to ingest file"
                );
                self.event_log
                    .record(
                        IngestStage::Error,
                        format!("{}: {}", entry.file_name, message),
                        Some(json!({
                            "kind": kind,
                            "original_name": entry.file_name,
                            "content_hash": progress.content_hash,
                            "archived_name": progress.archived_name,
                        })),
                        progress.file_id,
                    )
                    .await;
                FileOutcome::Failed { kind, message }
            }
        }
    }

    async fn try_process(
        &self,
        entry: &InboxEntry,
        progress: &mut FileProgress,
    ) -> PipelineResult<FileOutcome> {
        let content_hash = hash_store::fingerprint_file(&entry.path).await?;
        progress.content_hash = Some(content_hash.clone());

        self.event_log
            .record(
                IngestStage::Received,
                format!("Received {}", entry.file_name),
                Some(json!({
                    "original_name": entry.file_name,
                    "size_bytes": entry.size_bytes,
                    "content_hash": content_hash,
                })),
                None,
            )
            .await;
        self.event_log
            .record(
                IngestStage::Hashed,
                format!("SHA-256 {}", content_hash),
                Some(json!({
                    "original_name": entry.file_name,
                    "content_hash": content_hash,
                })),
                None,
            )
            .await;

        let format = format_sniffer::classify(&entry.file_name);
        let archived = self
            .archiver
            .archive(&entry.path, &entry.file_name, &content_hash)
            .await?;
        progress.archived_name = Some(archived.archived_name.clone());

        let registration = match self
            .registry
            .register(
                &entry.file_name,
                &archived.archived_name,
                entry.size_bytes,
                &content_hash,
                format,
            )
            .await
        {
            Ok(registration) => registration,
            Err(e) => {
                self.restore_to_inbox(&archived, &entry.path).await;
                progress.archived_name = None;
                return Err(e.into());
            }
        };
        progress.file_id = Some(registration.file_id);
        let duplicate = !registration.created;
        let format = registration.format;

        tracing::info!(
            file = %entry.file_name,
            content_hash = %content_hash,
            file_id = registration.file_id,
            format = %format,
            duplicate,
            "Archived {}",
            archived.archived_name
        );
        self.event_log
            .record(
                IngestStage::Archived,
                format!("Archived as {}", archived.archived_name),
                Some(json!({
                    "archived_name": archived.archived_name,
                    "content_hash": content_hash,
                    "format": format.as_str(),
                    "duplicate": duplicate,
                })),
                Some(registration.file_id),
            )
            .await;

        if !format.is_extractable() {
            return Ok(FileOutcome::UnknownArchived {
                file_id: registration.file_id,
                duplicate,
            });
        }

        let bytes = tokio::fs::read(&archived.path).await?;
        let extraction = self
            .extract_and_link(registration.file_id, format, bytes)
            .await?;

        Ok(FileOutcome::Ingested {
            file_id: registration.file_id,
            duplicate,
            extraction,
        })
    }

    /// Put an archived file back where it came from so the next tick retries it
    async fn restore_to_inbox(&self, archived: &ArchivedFile, inbox_path: &Path) {
        if let Err(e) = tokio::fs::rename(&archived.path, inbox_path).await {
            tracing::error!(
                archived_name = %archived.archived_name,
                error = %e,
                "Registration failed and archived file could not be returned to the inbox"
            );
        }
    }

    /// Extract, store and link; shared by first-time ingest and re-extraction
    async fn extract_and_link(
        &self,
        file_id: i64,
        format: FileFormat,
        bytes: Vec<u8>,
    ) -> PipelineResult<ExtractionOutcome> {
        let Extraction { metadata, degraded } =
            tokio::task::spawn_blocking(move || extractors::extract(format, &bytes))
                .await
                .map_err(|e| Error::Internal(format!("Extractor task failed: {}", e)))?;

        self.event_log
            .record(
                IngestStage::Parsed,
                format!("Parsed {} export", format),
                Some(json!({
                    "format": format.as_str(),
                    "claim_number": metadata.claim_number,
                    "vin": metadata.vin,
                    "degraded": degraded.is_some(),
                })),
                Some(file_id),
            )
            .await;

        if let Some(note) = &degraded {
            tracing::warn!(file_id, format = %format, note = %note, "Extraction degraded");
            self.event_log
                .record(
                    IngestStage::Error,
                    format!("Extraction degraded: {}", note),
                    Some(json!({ "kind": "parse_degraded", "note": note })),
                    Some(file_id),
                )
                .await;
        }

        self.registry
            .upsert_metadata(file_id, &metadata, degraded.as_deref())
            .await?;

        let mut outcome = ExtractionOutcome {
            degraded,
            link: None,
            link_error: None,
        };

        if !metadata.has_link_key() {
            return Ok(outcome);
        }

        match self.linker.link(file_id, &metadata).await {
            Ok(Some(link)) => {
                self.event_log
                    .record(
                        IngestStage::Linked,
                        format!("Linked to claim {}", link.claim_id),
                        Some(json!({ "claim_id": link.claim_id, "created": link.created })),
                        Some(file_id),
                    )
                    .await;
                outcome.link = Some(link);
            }
            Ok(None) => {
                tracing::debug!(file_id, "No matching claim and auto-create disabled");
            }
            Err(e) => {
                let annotation = format!("Claim link failed: {}", e);
                tracing::warn!(file_id, error = %e, "Claim link failed");
                self.event_log
                    .record(
                        IngestStage::Error,
                        annotation.clone(),
                        Some(json!({ "kind": "link_failed" })),
                        Some(file_id),
                    )
                    .await;
                if let Err(annotate_err) = self.registry.annotate(file_id, &annotation).await {
                    tracing::warn!(file_id, error = %annotate_err, "Failed to annotate file");
                }
                outcome.link_error = Some(annotation);
            }
        }

        Ok(outcome)
    }

    /// Re-run extraction and linking for a registered file from its archived copy
    pub async fn reextract(&self, file_id: i64) -> PipelineResult<ExtractionOutcome> {
        let file = self.require_file(file_id).await?;
        if !file.format.is_extractable() {
            return Err(Error::InvalidInput(format!(
                "File {} has format {} and cannot be extracted",
                file_id, file.format
            ))
            .into());
        }

        let bytes = self.read_archived(&file).await?;
        tracing::info!(file_id, format = %file.format, "Re-extracting");
        self.extract_and_link(file_id, file.format, bytes).await
    }

    pub async fn list_files(&self, query: &FileQuery) -> claimsync_common::Result<FilePage> {
        db::files::list_files(&self.pool, query).await
    }

    pub async fn load_file(&self, file_id: i64) -> claimsync_common::Result<Option<IngestedFile>> {
        db::files::load_file(&self.pool, file_id).await
    }

    pub async fn load_metadata(
        &self,
        file_id: i64,
    ) -> claimsync_common::Result<Option<ExtractedMetadataRecord>> {
        db::metadata::load(&self.pool, file_id).await
    }

    /// Location of a file's archived copy
    pub async fn archived_path(&self, file_id: i64) -> claimsync_common::Result<PathBuf> {
        let file = self.require_file(file_id).await?;
        self.path_in_archive(&file)
    }

    /// Raw bytes of a file's archived copy
    pub async fn read_archived_bytes(&self, file_id: i64) -> PipelineResult<Vec<u8>> {
        let file = self.require_file(file_id).await?;
        self.read_archived(&file).await
    }

    /// Full event trail for one file, including its pre-registration events
    pub async fn events_for_file(&self, file_id: i64) -> claimsync_common::Result<Vec<IngestEvent>> {
        let file = self.require_file(file_id).await?;
        db::events::events_for_file(&self.pool, file.id, &file.content_hash).await
    }

    pub async fn recent_events(&self, limit: Option<i64>) -> claimsync_common::Result<Vec<IngestEvent>> {
        db::events::recent_events(&self.pool, limit).await
    }

    async fn require_file(&self, file_id: i64) -> claimsync_common::Result<IngestedFile> {
        self.load_file(file_id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("Ingested file {}", file_id)))
    }

    fn path_in_archive(&self, file: &IngestedFile) -> claimsync_common::Result<PathBuf> {
        self.archiver.archived_path(&file.archived_name).ok_or_else(|| {
            Error::InvalidInput(format!("Archived name {:?} is not a plain file name", file.archived_name))
        })
    }

    async fn read_archived(&self, file: &IngestedFile) -> PipelineResult<Vec<u8>> {
        let path = self.path_in_archive(file)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(Error::NotFound(format!(
                "Archived copy {} of file {}",
                file.archived_name, file.id
            ))
            .into()),
            Err(e) => Err(e.into()),
        }
    }
}

/// True when the inbox file was taken away mid-processing (e.g. by another instance)
fn source_gone(err: &PipelineError) -> bool {
    match err {
        PipelineError::Archive(ArchiveError::SourceMissing(_)) => true,
        PipelineError::Store(Error::Io(e)) => e.kind() == ErrorKind::NotFound,
        _ => false,
    }
}
