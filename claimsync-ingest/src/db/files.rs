//! Ingested file records
//!
//! One row per distinct content. `content_hash` is the dedup key; the row is
//! never deleted and only `processed_at` (once), `claim_id` and `error` change
//! after insert.

use crate::models::FileFormat;
use chrono::{DateTime, Utc};
use claimsync_common::Result;
use serde::Serialize;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqliteConnection, SqlitePool};

pub const DEFAULT_PAGE_LIMIT: i64 = 50;
pub const MAX_PAGE_LIMIT: i64 = 200;

/// Ingested file record
#[derive(Debug, Clone, Serialize)]
pub struct IngestedFile {
    pub id: i64,
    pub original_name: String,
    pub archived_name: String,
    pub size_bytes: i64,
    pub content_hash: String,
    pub format: FileFormat,
    pub claim_id: Option<i64>,
    /// Last non-fatal annotation (extraction degradation, link failure)
    pub error: Option<String>,
    pub received_at: DateTime<Utc>,
    pub processed_at: Option<DateTime<Utc>>,
}

/// Values for a first-time registration
#[derive(Debug, Clone)]
pub struct NewIngestedFile<'a> {
    pub original_name: &'a str,
    pub archived_name: &'a str,
    pub size_bytes: u64,
    pub content_hash: &'a str,
    pub format: FileFormat,
}

/// Free-text search and paging for [`list_files`]
#[derive(Debug, Clone, Default)]
pub struct FileQuery {
    pub q: Option<String>,
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl FileQuery {
    /// Limit clamped to 1..=200 (default 50)
    pub fn effective_limit(&self) -> i64 {
        self.limit
            .unwrap_or(DEFAULT_PAGE_LIMIT)
            .clamp(1, MAX_PAGE_LIMIT)
    }

    pub fn effective_offset(&self) -> i64 {
        self.offset.unwrap_or(0).max(0)
    }

    fn search_pattern(&self) -> Option<String> {
        let q = self.q.as_deref()?.trim();
        if q.is_empty() {
            return None;
        }
        let escaped = q
            .replace('\\', "\\\\")
            .replace('%', "\\%")
            .replace('_', "\\_");
        Some(format!("%{}%", escaped))
    }
}

/// One row of the file listing: the file plus its extracted fields
#[derive(Debug, Clone, Serialize)]
pub struct FileSummary {
    #[serde(flatten)]
    pub file: IngestedFile,
    pub claim_number: Option<String>,
    pub vin: Option<String>,
    pub ro_number: Option<String>,
    pub customer_name: Option<String>,
    pub total_amount: Option<f64>,
}

/// A page of [`FileSummary`] rows
#[derive(Debug, Clone, Serialize)]
pub struct FilePage {
    pub total: i64,
    pub limit: i64,
    pub offset: i64,
    pub items: Vec<FileSummary>,
}

const FILE_COLUMNS: &str = "f.id, f.original_name, f.archived_name, f.size_bytes, f.content_hash, \
     f.format, f.claim_id, f.error, f.received_at, f.processed_at";

fn file_from_row(row: &SqliteRow) -> Result<IngestedFile> {
    let format: String = row.try_get("format")?;
    Ok(IngestedFile {
        id: row.try_get("id")?,
        original_name: row.try_get("original_name")?,
        archived_name: row.try_get("archived_name")?,
        size_bytes: row.try_get("size_bytes")?,
        content_hash: row.try_get("content_hash")?,
        format: FileFormat::from_db(&format),
        claim_id: row.try_get("claim_id")?,
        error: row.try_get("error")?,
        received_at: row.try_get("received_at")?,
        processed_at: row.try_get("processed_at")?,
    })
}

/// Insert a file unless its content hash is already registered
///
/// Returns `(file_id, created)`. Concurrent inserts of the same content
/// collapse on the unique constraint and both callers get the same id.
pub async fn insert_or_get(pool: &SqlitePool, file: &NewIngestedFile<'_>) -> Result<(i64, bool)> {
    let result = sqlx::query(
        r#"
        INSERT INTO ingested_files (original_name, archived_name, size_bytes, content_hash, format, received_at)
        VALUES (?, ?, ?, ?, ?, ?)
        ON CONFLICT(content_hash) DO NOTHING
        "#,
    )
    .bind(file.original_name)
    .bind(file.archived_name)
    .bind(file.size_bytes as i64)
    .bind(file.content_hash)
    .bind(file.format.as_str())
    .bind(Utc::now())
    .execute(pool)
    .await?;

    if result.rows_affected() == 1 {
        return Ok((result.last_insert_rowid(), true));
    }

    let id: i64 = sqlx::query_scalar("SELECT id FROM ingested_files WHERE content_hash = ?")
        .bind(file.content_hash)
        .fetch_one(pool)
        .await?;
    Ok((id, false))
}

/// Load a file by id
pub async fn load_file(pool: &SqlitePool, id: i64) -> Result<Option<IngestedFile>> {
    let sql = format!("SELECT {} FROM ingested_files f WHERE f.id = ?", FILE_COLUMNS);
    let row = sqlx::query(&sql).bind(id).fetch_optional(pool).await?;
    row.as_ref().map(file_from_row).transpose()
}

/// Load a file by content hash (for deduplication)
pub async fn load_file_by_hash(pool: &SqlitePool, content_hash: &str) -> Result<Option<IngestedFile>> {
    let sql = format!(
        "SELECT {} FROM ingested_files f WHERE f.content_hash = ?",
        FILE_COLUMNS
    );
    let row = sqlx::query(&sql)
        .bind(content_hash)
        .fetch_optional(pool)
        .await?;
    row.as_ref().map(file_from_row).transpose()
}

/// Most recently processed file, if any
pub async fn last_processed(pool: &SqlitePool) -> Result<Option<IngestedFile>> {
    let sql = format!(
        "SELECT {} FROM ingested_files f WHERE f.processed_at IS NOT NULL \
         ORDER BY f.processed_at DESC, f.id DESC LIMIT 1",
        FILE_COLUMNS
    );
    let row = sqlx::query(&sql).fetch_optional(pool).await?;
    row.as_ref().map(file_from_row).transpose()
}

/// Mark extraction complete and record (or clear) the error annotation
///
/// `processed_at` is only set the first time.
pub async fn mark_processed(conn: &mut SqliteConnection, id: i64, error: Option<&str>) -> Result<()> {
    sqlx::query(
        r#"
        UPDATE ingested_files
        SET processed_at = COALESCE(processed_at, ?),
            error = ?
        WHERE id = ?
        "#,
    )
    .bind(Utc::now())
    .bind(error)
    .bind(id)
    .execute(conn)
    .await?;

    Ok(())
}

/// Record an error annotation without touching `processed_at`
pub async fn set_error(pool: &SqlitePool, id: i64, error: &str) -> Result<()> {
    sqlx::query("UPDATE ingested_files SET error = ? WHERE id = ?")
        .bind(error)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Point the file at a claim
pub async fn set_claim_id(pool: &SqlitePool, id: i64, claim_id: i64) -> Result<()> {
    sqlx::query("UPDATE ingested_files SET claim_id = ? WHERE id = ?")
        .bind(claim_id)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

/// Case-insensitive search over name, claim number, VIN, RO number and
/// customer name, newest processed first
pub async fn list_files(pool: &SqlitePool, query: &FileQuery) -> Result<FilePage> {
    let limit = query.effective_limit();
    let offset = query.effective_offset();
    let pattern = query.search_pattern();

    let filter = if pattern.is_some() {
        r#"WHERE f.original_name LIKE ?1 ESCAPE '\'
              OR m.claim_number LIKE ?1 ESCAPE '\'
              OR m.vin LIKE ?1 ESCAPE '\'
              OR m.ro_number LIKE ?1 ESCAPE '\'
              OR m.customer_name LIKE ?1 ESCAPE '\'"#
    } else {
        ""
    };

    let count_sql = format!(
        "SELECT COUNT(*) FROM ingested_files f \
         LEFT JOIN extracted_metadata m ON m.file_id = f.id {}",
        filter
    );
    let mut count_query = sqlx::query_scalar::<_, i64>(&count_sql);
    if let Some(p) = &pattern {
        count_query = count_query.bind(p);
    }
    let total = count_query.fetch_one(pool).await?;

    let list_sql = format!(
        "SELECT {}, m.claim_number, m.vin, m.ro_number, m.customer_name, m.total_amount \
         FROM ingested_files f \
         LEFT JOIN extracted_metadata m ON m.file_id = f.id {} \
         ORDER BY f.processed_at DESC, f.id DESC \
         LIMIT {} OFFSET {}",
        FILE_COLUMNS, filter, limit, offset
    );
    let mut list_query = sqlx::query(&list_sql);
    if let Some(p) = &pattern {
        list_query = list_query.bind(p);
    }
    let rows = list_query.fetch_all(pool).await?;

    let items = rows
        .iter()
        .map(|row| {
            Ok(FileSummary {
                file: file_from_row(row)?,
                claim_number: row.try_get("claim_number")?,
                vin: row.try_get("vin")?,
                ro_number: row.try_get("ro_number")?,
                customer_name: row.try_get("customer_name")?,
                total_amount: row.try_get("total_amount")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    Ok(FilePage {
        total,
        limit,
        offset,
        items,
    })
}
