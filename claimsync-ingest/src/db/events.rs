//! Append-only ingest event rows

use chrono::{DateTime, Utc};
use claimsync_common::events::{IngestEvent, IngestStage};
use claimsync_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub const DEFAULT_RECENT_LIMIT: i64 = 100;
pub const MAX_RECENT_LIMIT: i64 = 500;

/// Insert one event, returning its id
pub async fn insert_event(
    pool: &SqlitePool,
    file_id: Option<i64>,
    stage: IngestStage,
    message: &str,
    meta: Option<&serde_json::Value>,
    created_at: DateTime<Utc>,
) -> Result<i64> {
    let result = sqlx::query(
        r#"
        INSERT INTO ingest_events (file_id, stage, message, meta, created_at)
        VALUES (?, ?, ?, ?, ?)
        "#,
    )
    .bind(file_id)
    .bind(stage.as_str())
    .bind(message)
    .bind(meta.map(|m| m.to_string()))
    .bind(created_at)
    .execute(pool)
    .await?;

    Ok(result.last_insert_rowid())
}

fn event_from_row(row: &SqliteRow) -> Result<IngestEvent> {
    let stage: String = row.try_get("stage")?;
    let meta: Option<String> = row.try_get("meta")?;
    Ok(IngestEvent {
        id: Some(row.try_get("id")?),
        file_id: row.try_get("file_id")?,
        stage: stage.parse()?,
        message: row.try_get("message")?,
        meta: meta.and_then(|m| serde_json::from_str(&m).ok()),
        created_at: row.try_get("created_at")?,
    })
}

/// Full trail for one file in insertion order
///
/// Includes events recorded before the file had an id (`received`,
/// `hashed`) by matching the content hash carried in their meta.
pub async fn events_for_file(
    pool: &SqlitePool,
    file_id: i64,
    content_hash: &str,
) -> Result<Vec<IngestEvent>> {
    let rows = sqlx::query(
        r#"
        SELECT id, file_id, stage, message, meta, created_at
        FROM ingest_events
        WHERE file_id = ?
           OR (file_id IS NULL AND json_extract(meta, '$.content_hash') = ?)
        ORDER BY id ASC
        "#,
    )
    .bind(file_id)
    .bind(content_hash)
    .fetch_all(pool)
    .await?;

    rows.iter().map(event_from_row).collect()
}

/// Most recent events across all files, newest first (limit 1..=500, default 100)
pub async fn recent_events(pool: &SqlitePool, limit: Option<i64>) -> Result<Vec<IngestEvent>> {
    let limit = limit
        .unwrap_or(DEFAULT_RECENT_LIMIT)
        .clamp(1, MAX_RECENT_LIMIT);

    let rows = sqlx::query(
        r#"
        SELECT id, file_id, stage, message, meta, created_at
        FROM ingest_events
        ORDER BY id DESC
        LIMIT ?
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await?;

    rows.iter().map(event_from_row).collect()
}
