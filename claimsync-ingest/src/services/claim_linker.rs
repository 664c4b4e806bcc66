//! Claim linking
//!
//! Resolves the claim a file belongs to: by claim number first, then by VIN.
//! When nothing matches and auto-creation is enabled, a minimal claim is
//! created from the extracted fields. A resolved claim is written to
//! `ingested_files.claim_id`.

use crate::db;
use crate::models::ClaimMetadata;
use async_trait::async_trait;
use claimsync_common::Result;
use serde::Serialize;
use sqlx::SqlitePool;
use std::sync::Arc;

/// Claim as seen by the pipeline
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ClaimRecord {
    pub id: i64,
    pub claim_number: Option<String>,
    pub vin: Option<String>,
    pub customer_name: Option<String>,
}

/// Fields for an auto-created claim
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewClaim {
    pub claim_number: Option<String>,
    pub vin: Option<String>,
    pub customer_name: Option<String>,
}

/// Claim lookup and creation primitives owned by the claims collaborator
#[async_trait]
pub trait ClaimRepository: Send + Sync {
    async fn find_by_number(&self, claim_number: &str) -> Result<Option<ClaimRecord>>;
    async fn find_by_vin(&self, vin: &str) -> Result<Option<ClaimRecord>>;
    async fn create(&self, claim: NewClaim) -> Result<ClaimRecord>;
}

/// Outcome of a successful link
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimLink {
    pub claim_id: i64,
    /// True when the claim was auto-created for this file
    pub created: bool,
}

#[derive(Clone)]
pub struct ClaimLinker {
    pool: SqlitePool,
    claims: Arc<dyn ClaimRepository>,
    autocreate: bool,
}

impl ClaimLinker {
    pub fn new(pool: SqlitePool, claims: Arc<dyn ClaimRepository>, autocreate: bool) -> Self {
        Self {
            pool,
            claims,
            autocreate,
        }
    }

    /// Link `file_id` to the claim its metadata points at
    ///
    /// Returns `Ok(None)` when there is nothing to link by, or no claim
    /// matched and auto-creation is disabled.
    pub async fn link(&self, file_id: i64, meta: &ClaimMetadata) -> Result<Option<ClaimLink>> {
        let Some(claim) = self.resolve(meta).await? else {
            return Ok(None);
        };

        db::files::set_claim_id(&self.pool, file_id, claim.0.id).await?;

        tracing::debug!(file_id, claim_id = claim.0.id, created = claim.1, "Linked file to claim");

        Ok(Some(ClaimLink {
            claim_id: claim.0.id,
            created: claim.1,
        }))
    }

    async fn resolve(&self, meta: &ClaimMetadata) -> Result<Option<(ClaimRecord, bool)>> {
        if let Some(number) = &meta.claim_number {
            if let Some(found) = self.claims.find_by_number(number).await? {
                return Ok(Some((found, false)));
            }
        }

        if let Some(vin) = &meta.vin {
            if let Some(found) = self.claims.find_by_vin(vin).await? {
                return Ok(Some((found, false)));
            }
        }

        if !self.autocreate || !meta.has_link_key() {
            return Ok(None);
        }

        let created = self
            .claims
            .create(NewClaim {
                claim_number: meta.claim_number.clone(),
                vin: meta.vin.clone(),
                customer_name: meta.customer_name.clone(),
            })
            .await?;
        Ok(Some((created, true)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use claimsync_common::Error;
    use std::sync::Mutex;

    /// In-memory repository recording calls
    #[derive(Default)]
    struct FakeClaims {
        claims: Mutex<Vec<ClaimRecord>>,
        fail_lookups: bool,
    }

    #[async_trait]
    impl ClaimRepository for FakeClaims {
        async fn find_by_number(&self, claim_number: &str) -> Result<Option<ClaimRecord>> {
            if self.fail_lookups {
                return Err(Error::Internal("claims store offline".to_string()));
            }
            let claims = self.claims.lock().unwrap();
            Ok(claims
                .iter()
                .find(|c| c.claim_number.as_deref() == Some(claim_number))
                .cloned())
        }

        async fn find_by_vin(&self, vin: &str) -> Result<Option<ClaimRecord>> {
            let claims = self.claims.lock().unwrap();
            Ok(claims.iter().find(|c| c.vin.as_deref() == Some(vin)).cloned())
        }

        async fn create(&self, claim: NewClaim) -> Result<ClaimRecord> {
            let mut claims = self.claims.lock().unwrap();
            let record = ClaimRecord {
                id: claims.len() as i64 + 1,
                claim_number: claim.claim_number,
                vin: claim.vin,
                customer_name: claim.customer_name,
            };
            claims.push(record.clone());
            Ok(record)
        }
    }

    async fn pool_with_file() -> SqlitePool {
        let pool = sqlx::sqlite::SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        claimsync_common::db::init::create_schema(&pool).await.unwrap();
        sqlx::query(
            "INSERT INTO claims (id, claim_number) VALUES (1, 'CLM-A'), (2, 'CLM-B')",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "INSERT INTO ingested_files (id, original_name, archived_name, size_bytes, content_hash, format)
             VALUES (10, 'a.xml', 'x_a.xml', 1, 'h', 'xml')",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn meta(number: Option<&str>, vin: Option<&str>) -> ClaimMetadata {
        ClaimMetadata {
            claim_number: number.map(str::to_string),
            vin: vin.map(str::to_string),
            customer_name: Some("Jo Park".to_string()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_number_match_preferred_over_vin() {
        let fake = FakeClaims::default();
        fake.claims.lock().unwrap().extend([
            ClaimRecord {
                id: 1,
                claim_number: Some("CLM-A".to_string()),
                vin: None,
                customer_name: None,
            },
            ClaimRecord {
                id: 2,
                claim_number: Some("CLM-B".to_string()),
                vin: Some("1HGCM82633A004352".to_string()),
                customer_name: None,
            },
        ]);
        let linker = ClaimLinker::new(pool_with_file().await, Arc::new(fake), true);

        let link = linker
            .link(10, &meta(Some("CLM-A"), Some("1HGCM82633A004352")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(link, ClaimLink { claim_id: 1, created: false });
    }

    #[tokio::test]
    async fn test_vin_fallback() {
        let fake = FakeClaims::default();
        fake.claims.lock().unwrap().push(ClaimRecord {
            id: 2,
            claim_number: Some("CLM-B".to_string()),
            vin: Some("1HGCM82633A004352".to_string()),
            customer_name: None,
        });
        let pool = pool_with_file().await;
        let linker = ClaimLinker::new(pool.clone(), Arc::new(fake), false);

        let link = linker
            .link(10, &meta(Some("UNKNOWN"), Some("1HGCM82633A004352")))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(link.claim_id, 2);

        let claim_id: Option<i64> = sqlx::query_scalar("SELECT claim_id FROM ingested_files WHERE id = 10")
            .fetch_one(&pool)
            .await
            .unwrap();
        assert_eq!(claim_id, Some(2));
    }

    #[tokio::test]
    async fn test_autocreate_toggle() {
        let pool = pool_with_file().await;

        let disabled = ClaimLinker::new(pool.clone(), Arc::new(FakeClaims::default()), false);
        assert!(disabled.link(10, &meta(Some("NEW-1"), None)).await.unwrap().is_none());

        let fake = Arc::new(FakeClaims::default());
        let enabled = ClaimLinker::new(pool, fake.clone(), true);
        let link = enabled.link(10, &meta(Some("NEW-1"), None)).await.unwrap().unwrap();
        assert!(link.created);

        let stored = fake.claims.lock().unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].customer_name.as_deref(), Some("Jo Park"));
    }

    #[tokio::test]
    async fn test_nothing_to_link_by() {
        let linker = ClaimLinker::new(pool_with_file().await, Arc::new(FakeClaims::default()), true);
        assert!(linker.link(10, &meta(None, None)).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_repository_failure_surfaces() {
        let fake = FakeClaims {
            fail_lookups: true,
            ..Default::default()
        };
        let linker = ClaimLinker::new(pool_with_file().await, Arc::new(fake), true);
        assert!(linker.link(10, &meta(Some("CLM-A"), None)).await.is_err());
    }
}
