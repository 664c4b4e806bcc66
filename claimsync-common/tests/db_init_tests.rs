//! Tests for database initialization
//!
//! Covers first-run creation, reopening an existing store, default settings
//! and the constraints the ingest pipeline relies on.

use claimsync_common::db::init::{init_database, read_u64_setting, DEFAULT_MAX_LOCK_WAIT_MS};
use tempfile::TempDir;

#[tokio::test]
async fn test_database_creation_when_missing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("nested").join("claimsync.db");

    let result = init_database(&db_path).await;
    assert!(result.is_ok(), "Database initialization failed: {:?}", result.err());
    assert!(db_path.exists(), "Database file was not created");
}

#[tokio::test]
async fn test_database_opens_existing() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("claimsync.db");

    let pool1 = init_database(&db_path).await.unwrap();
    pool1.close().await;

    let pool2 = init_database(&db_path).await;
    assert!(pool2.is_ok(), "Failed to open existing database: {:?}", pool2.err());
}

#[tokio::test]
async fn test_all_tables_created() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("claimsync.db")).await.unwrap();

    for table in [
        "settings",
        "claims",
        "ingested_files",
        "extracted_metadata",
        "ingest_events",
    ] {
        let exists: bool = sqlx::query_scalar(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
        )
        .bind(table)
        .fetch_one(&pool)
        .await
        .unwrap();
        assert!(exists, "table {} missing", table);
    }
}

#[tokio::test]
async fn test_default_lock_wait_setting() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("claimsync.db")).await.unwrap();

    let value = read_u64_setting(&pool, "ingest_database_max_lock_wait_ms", 1)
        .await
        .unwrap();
    assert_eq!(value, DEFAULT_MAX_LOCK_WAIT_MS);
}

#[tokio::test]
async fn test_null_setting_reset_on_reopen() {
    let temp_dir = TempDir::new().unwrap();
    let db_path = temp_dir.path().join("claimsync.db");

    let pool = init_database(&db_path).await.unwrap();
    sqlx::query("UPDATE settings SET value = NULL WHERE key = 'ingest_database_max_lock_wait_ms'")
        .execute(&pool)
        .await
        .unwrap();
    pool.close().await;

    let pool = init_database(&db_path).await.unwrap();
    let value: Option<String> = sqlx::query_scalar(
        "SELECT value FROM settings WHERE key = 'ingest_database_max_lock_wait_ms'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(value.as_deref(), Some("5000"));
}

#[tokio::test]
async fn test_event_stage_check_constraint() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("claimsync.db")).await.unwrap();

    let ok = sqlx::query("INSERT INTO ingest_events (stage, message) VALUES ('received', 'x')")
        .execute(&pool)
        .await;
    assert!(ok.is_ok());

    let rejected = sqlx::query("INSERT INTO ingest_events (stage, message) VALUES ('deleted', 'x')")
        .execute(&pool)
        .await;
    assert!(rejected.is_err(), "unknown stage must violate CHECK constraint");
}

#[tokio::test]
async fn test_content_hash_unique() {
    let temp_dir = TempDir::new().unwrap();
    let pool = init_database(&temp_dir.path().join("claimsync.db")).await.unwrap();

    let insert = |archived: &'static str| {
        sqlx::query(
            "INSERT INTO ingested_files (original_name, archived_name, size_bytes, content_hash, format)
             VALUES ('a.xml', ?, 10, 'deadbeef', 'xml')",
        )
        .bind(archived)
    };

    assert!(insert("one").execute(&pool).await.is_ok());
    assert!(insert("two").execute(&pool).await.is_err());
}
