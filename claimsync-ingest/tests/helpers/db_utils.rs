//! Database and directory test utilities

use anyhow::Result;
use claimsync_common::events::EventBus;
use claimsync_ingest::{IngestPipeline, Poller};
use sqlx::SqlitePool;
use std::path::PathBuf;
use std::time::Duration;
use tempfile::TempDir;

/// Inbox, archive and database in one temporary root
///
/// The TempDir must be kept alive for the duration of the test.
pub struct TestEnv {
    pub temp_dir: TempDir,
    pub inbox: PathBuf,
    pub archive: PathBuf,
    pub pool: SqlitePool,
    pub pipeline: IngestPipeline,
    pub poller: Poller,
}

impl TestEnv {
    /// Sorted file names currently in the archive
    pub fn archived_names(&self) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(&self.archive)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
            .collect();
        names.sort();
        names
    }

    pub fn inbox_is_empty(&self) -> bool {
        std::fs::read_dir(&self.inbox).unwrap().next().is_none()
    }
}

/// Create a fresh environment with a long poll interval (tests drive ticks)
pub async fn create_test_env(claim_autocreate: bool) -> Result<TestEnv> {
    let temp_dir = TempDir::new()?;
    let inbox = temp_dir.path().join("incoming");
    let archive = temp_dir.path().join("archive");
    std::fs::create_dir_all(&inbox)?;
    std::fs::create_dir_all(&archive)?;

    let pool = claimsync_common::db::init_database(&temp_dir.path().join("test_claimsync.db")).await?;
    let pipeline = IngestPipeline::with_sqlite_claims(
        pool.clone(),
        archive.clone(),
        EventBus::new(256),
        claim_autocreate,
    )
    .await?;
    let poller = Poller::new(pipeline.clone(), inbox.clone(), Duration::from_secs(3600));

    Ok(TestEnv {
        temp_dir,
        inbox,
        archive,
        pool,
        pipeline,
        poller,
    })
}

/// Row count of a table
pub async fn count_rows(pool: &SqlitePool, table: &str) -> i64 {
    let query = format!("SELECT COUNT(*) FROM {}", table);
    sqlx::query_scalar(&query).fetch_one(pool).await.unwrap()
}

/// Stage names recorded with `file_id`, in order
pub async fn stages_for_file(pool: &SqlitePool, file_id: i64) -> Vec<String> {
    sqlx::query_scalar("SELECT stage FROM ingest_events WHERE file_id = ? ORDER BY id")
        .bind(file_id)
        .fetch_all(pool)
        .await
        .unwrap()
}
