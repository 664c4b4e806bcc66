//! Connection pool monitoring utilities
//!
//! Instrumented transactions that log how long a connection took to acquire
//! and how long it was held, for diagnosing lock contention between the
//! pipeline and other writers sharing the database.

use claimsync_common::Result;
use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use std::time::Instant;

/// Transaction wrapper that logs acquisition and release timing
pub struct MonitoredTransaction {
    tx: Transaction<'static, Sqlite>,
    caller: &'static str,
    acquired_at: Instant,
}

impl MonitoredTransaction {
    /// Connection to run statements against
    pub fn conn(&mut self) -> &mut SqliteConnection {
        &mut self.tx
    }

    /// Commit the transaction and log release timing
    pub async fn commit(self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        self.tx.commit().await?;

        if held_ms > 2000 {
            tracing::warn!(
                caller = self.caller,
                held_ms,
                "LONG TRANSACTION - connection held for extended period"
            );
        } else {
            tracing::debug!(caller = self.caller, held_ms, "Connection released (commit)");
        }

        Ok(())
    }

    /// Roll the transaction back and log release timing
    pub async fn rollback(self) -> Result<()> {
        let held_ms = self.acquired_at.elapsed().as_millis();
        self.tx.rollback().await?;
        tracing::debug!(caller = self.caller, held_ms, "Connection released (rollback)");
        Ok(())
    }
}

/// Begin a monitored transaction
///
/// Logs a warning when acquiring the connection takes longer than a second,
/// which usually means another writer holds the database.
pub async fn begin_monitored(pool: &SqlitePool, caller: &'static str) -> Result<MonitoredTransaction> {
    let start = Instant::now();
    let tx = pool.begin().await?;
    let wait_ms = start.elapsed().as_millis();

    if wait_ms > 1000 {
        tracing::warn!(caller, wait_ms, "SLOW CONNECTION ACQUISITION - pool may be saturated");
    } else {
        tracing::debug!(caller, wait_ms, "Connection acquired");
    }

    Ok(MonitoredTransaction {
        tx,
        caller,
        acquired_at: Instant::now(),
    })
}
