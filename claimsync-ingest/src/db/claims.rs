//! SQLite-backed claim repository
//!
//! The `claims` table belongs to the claims collaborator; the pipeline only
//! looks claims up and creates minimal rows.

use crate::services::claim_linker::{ClaimRecord, ClaimRepository, NewClaim};
use async_trait::async_trait;
use chrono::Utc;
use claimsync_common::Result;
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};

pub struct SqliteClaimRepository {
    pool: SqlitePool,
}

impl SqliteClaimRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn claim_from_row(row: &SqliteRow) -> Result<ClaimRecord> {
    Ok(ClaimRecord {
        id: row.try_get("id")?,
        claim_number: row.try_get("claim_number")?,
        vin: row.try_get("vin")?,
        customer_name: row.try_get("customer_name")?,
    })
}

#[async_trait]
impl ClaimRepository for SqliteClaimRepository {
    async fn find_by_number(&self, claim_number: &str) -> Result<Option<ClaimRecord>> {
        let row = sqlx::query(
            "SELECT id, claim_number, vin, customer_name FROM claims WHERE claim_number = ? LIMIT 1",
        )
        .bind(claim_number)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(claim_from_row).transpose()
    }

    async fn find_by_vin(&self, vin: &str) -> Result<Option<ClaimRecord>> {
        let row = sqlx::query(
            "SELECT id, claim_number, vin, customer_name FROM claims WHERE vin = ? ORDER BY id LIMIT 1",
        )
        .bind(vin)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(claim_from_row).transpose()
    }

    async fn create(&self, claim: NewClaim) -> Result<ClaimRecord> {
        let result = sqlx::query(
            r#"
            INSERT INTO claims (claim_number, vin, customer_name, created_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT(claim_number) DO NOTHING
            "#,
        )
        .bind(&claim.claim_number)
        .bind(&claim.vin)
        .bind(&claim.customer_name)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 1 {
            return Ok(ClaimRecord {
                id: result.last_insert_rowid(),
                claim_number: claim.claim_number,
                vin: claim.vin,
                customer_name: claim.customer_name,
            });
        }

        // Another writer created the same claim number first
        let number = claim.claim_number.as_deref().unwrap_or_default();
        self.find_by_number(number).await?.ok_or_else(|| {
            claimsync_common::Error::Internal(format!(
                "Claim {} conflicted on insert but could not be loaded",
                number
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimsync_common::db::init::create_schema;

    async fn setup_repo() -> SqliteClaimRepository {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        create_schema(&pool).await.unwrap();
        SqliteClaimRepository::new(pool)
    }

    #[tokio::test]
    async fn test_create_and_find() {
        let repo = setup_repo().await;
        let created = repo
            .create(NewClaim {
                claim_number: Some("CLM4002".to_string()),
                vin: Some("1HGCM82633A004352".to_string()),
                customer_name: None,
            })
            .await
            .unwrap();

        let by_number = repo.find_by_number("CLM4002").await.unwrap().unwrap();
        let by_vin = repo.find_by_vin("1HGCM82633A004352").await.unwrap().unwrap();
        assert_eq!(by_number.id, created.id);
        assert_eq!(by_vin.id, created.id);
        assert!(repo.find_by_number("CLM0000").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_number_returns_existing() {
        let repo = setup_repo().await;
        let new_claim = || NewClaim {
            claim_number: Some("CLM1".to_string()),
            vin: None,
            customer_name: None,
        };

        let first = repo.create(new_claim()).await.unwrap();
        let second = repo.create(new_claim()).await.unwrap();
        assert_eq!(first.id, second.id);
    }

    #[tokio::test]
    async fn test_claims_without_number_are_distinct() {
        let repo = setup_repo().await;
        let vin_only = || NewClaim {
            claim_number: None,
            vin: Some("2T1BURHE0JC043821".to_string()),
            customer_name: None,
        };

        let a = repo.create(vin_only()).await.unwrap();
        let b = repo.create(vin_only()).await.unwrap();
        assert_ne!(a.id, b.id);
    }
}
