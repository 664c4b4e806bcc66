//! Extracted metadata (1:1 with ingested_files)

use crate::models::ClaimMetadata;
use chrono::{DateTime, Utc};
use claimsync_common::Result;
use serde::Serialize;
use sqlx::{Row, SqliteConnection, SqlitePool};

/// Stored extraction result for one file
#[derive(Debug, Clone, Serialize)]
pub struct ExtractedMetadataRecord {
    pub file_id: i64,
    pub claim_number: Option<String>,
    pub vin: Option<String>,
    pub ro_number: Option<String>,
    pub customer_name: Option<String>,
    pub total_amount: Option<f64>,
    pub raw_payload: Option<serde_json::Value>,
    pub updated_at: DateTime<Utc>,
}

/// Insert or fully replace the metadata row for `file_id`
pub async fn upsert(conn: &mut SqliteConnection, file_id: i64, meta: &ClaimMetadata) -> Result<()> {
    let raw_payload = meta.raw_payload.as_ref().map(|v| v.to_string());

    sqlx::query(
        r#"
        INSERT INTO extracted_metadata
            (file_id, claim_number, vin, ro_number, customer_name, total_amount, raw_payload, updated_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT(file_id) DO UPDATE SET
            claim_number = excluded.claim_number,
            vin = excluded.vin,
            ro_number = excluded.ro_number,
            customer_name = excluded.customer_name,
            total_amount = excluded.total_amount,
            raw_payload = excluded.raw_payload,
            updated_at = excluded.updated_at
        "#,
    )
    .bind(file_id)
    .bind(&meta.claim_number)
    .bind(&meta.vin)
    .bind(&meta.ro_number)
    .bind(&meta.customer_name)
    .bind(meta.total_amount)
    .bind(raw_payload)
    .bind(Utc::now())
    .execute(conn)
    .await?;

    Ok(())
}

/// Load the metadata row for a file
pub async fn load(pool: &SqlitePool, file_id: i64) -> Result<Option<ExtractedMetadataRecord>> {
    let row = sqlx::query(
        r#"
        SELECT file_id, claim_number, vin, ro_number, customer_name, total_amount, raw_payload, updated_at
        FROM extracted_metadata
        WHERE file_id = ?
        "#,
    )
    .bind(file_id)
    .fetch_optional(pool)
    .await?;

    let Some(row) = row else {
        return Ok(None);
    };

    let raw_payload: Option<String> = row.try_get("raw_payload")?;
    Ok(Some(ExtractedMetadataRecord {
        file_id: row.try_get("file_id")?,
        claim_number: row.try_get("claim_number")?,
        vin: row.try_get("vin")?,
        ro_number: row.try_get("ro_number")?,
        customer_name: row.try_get("customer_name")?,
        total_amount: row.try_get("total_amount")?,
        raw_payload: raw_payload.and_then(|s| serde_json::from_str(&s).ok()),
        updated_at: row.try_get("updated_at")?,
    }))
}
