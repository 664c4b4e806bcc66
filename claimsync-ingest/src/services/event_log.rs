//! Best-effort audit trail
//!
//! `record` never fails: a write that cannot be persisted is logged through
//! `tracing` and the pipeline carries on. Every event, persisted or not, is
//! broadcast on the [`EventBus`] for live observers.

use crate::db;
use chrono::Utc;
use claimsync_common::events::{EventBus, IngestEvent, IngestStage};
use sqlx::SqlitePool;

#[derive(Clone)]
pub struct EventLog {
    pool: SqlitePool,
    bus: EventBus,
}

impl EventLog {
    pub fn new(pool: SqlitePool, bus: EventBus) -> Self {
        Self { pool, bus }
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }

    /// Append an event for `file_id` (or for a not-yet-registered file)
    pub async fn record(
        &self,
        stage: IngestStage,
        message: impl Into<String>,
        meta: Option<serde_json::Value>,
        file_id: Option<i64>,
    ) {
        let message = message.into();
        let created_at = Utc::now();

        let id = match db::events::insert_event(
            &self.pool,
            file_id,
            stage,
            &message,
            meta.as_ref(),
            created_at,
        )
        .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                tracing::warn!(
                    stage = %stage,
                    file_id = ?file_id,
                    error = %e,
                    "Failed to record ingest event"
                );
                None
            }
        };

        self.bus.emit_lossy(IngestEvent {
            id,
            file_id,
            stage,
            message,
            meta,
            created_at,
        });
    }
}
