//! Database initialization
//!
//! Creates the SQLite database on first run and brings the schema up to date.
//! Every statement is idempotent so the service can open an existing store
//! (or one shared with the claims collaborator) without migrations.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::path::Path;
use std::time::Duration;
use tracing::{info, warn};

/// Default lock-retry budget in milliseconds
pub const DEFAULT_MAX_LOCK_WAIT_MS: u64 = 5000;

/// Settings key holding the lock-retry budget
pub const MAX_LOCK_WAIT_SETTING: &str = "ingest_database_max_lock_wait_ms";

/// Initialize database connection and create tables if needed
pub async fn init_database(db_path: &Path) -> Result<SqlitePool> {
    let newly_created = !db_path.exists();

    if let Some(parent) = db_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let options = SqliteConnectOptions::new()
        .filename(db_path)
        .create_if_missing(true)
        .foreign_keys(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_millis(250));

    let pool = SqlitePoolOptions::new()
        .max_connections(8)
        .min_connections(1)
        .connect_with(options)
        .await?;

    if newly_created {
        info!("Initialized new database: {}", db_path.display());
    } else {
        info!("Opened existing database: {}", db_path.display());
    }

    create_schema(&pool).await?;
    init_default_settings(&pool).await?;

    Ok(pool)
}

/// Create every table and index used by the pipeline
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_settings_table(pool).await?;
    create_claims_table(pool).await?;
    create_ingested_files_table(pool).await?;
    create_extracted_metadata_table(pool).await?;
    create_ingest_events_table(pool).await?;
    Ok(())
}

/// Create the settings table
///
/// Stores application configuration key-value pairs.
pub async fn create_settings_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS settings (
            key TEXT PRIMARY KEY,
            value TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the claims table
///
/// Owned by the claims collaborator; the pipeline only looks claims up and
/// creates minimal rows when auto-creation is enabled.
pub async fn create_claims_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS claims (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            claim_number TEXT UNIQUE,
            vin TEXT,
            customer_name TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_claims_vin ON claims(vin)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the ingested_files table
///
/// One row per distinct content. `content_hash` is the dedup key and
/// `archived_name` is unique so two instances can never claim the same
/// archive slot.
pub async fn create_ingested_files_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingested_files (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            original_name TEXT NOT NULL,
            archived_name TEXT NOT NULL UNIQUE,
            size_bytes INTEGER NOT NULL CHECK (size_bytes >= 0),
            content_hash TEXT NOT NULL UNIQUE,
            format TEXT NOT NULL CHECK (format IN ('xml', 'ems', 'awf', 'unknown')),
            claim_id INTEGER REFERENCES claims(id) ON DELETE SET NULL,
            error TEXT,
            received_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
            processed_at TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ingested_files_claim ON ingested_files(claim_id)")
        .execute(pool)
        .await?;
    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_ingested_files_processed ON ingested_files(processed_at)",
    )
    .execute(pool)
    .await?;

    Ok(())
}

/// Create the extracted_metadata table (1:1 with ingested_files)
pub async fn create_extracted_metadata_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS extracted_metadata (
            file_id INTEGER PRIMARY KEY REFERENCES ingested_files(id) ON DELETE CASCADE,
            claim_number TEXT,
            vin TEXT,
            ro_number TEXT,
            customer_name TEXT,
            total_amount REAL,
            raw_payload TEXT,
            updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query(
        "CREATE INDEX IF NOT EXISTS idx_extracted_metadata_claim ON extracted_metadata(claim_number)",
    )
    .execute(pool)
    .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_extracted_metadata_vin ON extracted_metadata(vin)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Create the append-only ingest_events table
pub async fn create_ingest_events_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS ingest_events (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            file_id INTEGER REFERENCES ingested_files(id) ON DELETE CASCADE,
            stage TEXT NOT NULL CHECK (stage IN ('received', 'hashed', 'parsed', 'linked', 'archived', 'error')),
            message TEXT NOT NULL,
            meta TEXT,
            created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_ingest_events_file ON ingest_events(file_id)")
        .execute(pool)
        .await?;

    Ok(())
}

/// Initialize or repair default settings
async fn init_default_settings(pool: &SqlitePool) -> Result<()> {
    ensure_setting(
        pool,
        MAX_LOCK_WAIT_SETTING,
        &DEFAULT_MAX_LOCK_WAIT_MS.to_string(),
    )
    .await?;

    Ok(())
}

/// Ensure a setting exists with the specified default value
///
/// A missing setting is created; a NULL value is reset to the default.
async fn ensure_setting(pool: &SqlitePool, key: &str, default_value: &str) -> Result<()> {
    let existing: Option<Option<String>> =
        sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
            .bind(key)
            .fetch_optional(pool)
            .await?;

    match existing {
        None => {
            // INSERT OR IGNORE: concurrent initializers may race past the lookup
            sqlx::query("INSERT OR IGNORE INTO settings (key, value) VALUES (?, ?)")
                .bind(key)
                .bind(default_value)
                .execute(pool)
                .await?;
            info!("Initialized setting '{}' with default value: {}", key, default_value);
        }
        Some(None) => {
            sqlx::query("UPDATE settings SET value = ?, updated_at = CURRENT_TIMESTAMP WHERE key = ?")
                .bind(default_value)
                .bind(key)
                .execute(pool)
                .await?;
            warn!("Setting '{}' was NULL, reset to default: {}", key, default_value);
        }
        Some(Some(_)) => {}
    }

    Ok(())
}

/// Read an integer setting, falling back to `default` when absent or unparseable
pub async fn read_u64_setting(pool: &SqlitePool, key: &str, default: u64) -> Result<u64> {
    let value: Option<String> = sqlx::query_scalar("SELECT value FROM settings WHERE key = ?")
        .bind(key)
        .fetch_optional(pool)
        .await?
        .flatten();

    Ok(value
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(default))
}
