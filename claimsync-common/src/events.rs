//! Ingest event types and the in-process EventBus
//!
//! Every stage the pipeline records in `ingest_events` is also broadcast here
//! so live observers can follow a file through the pipeline without polling
//! the database.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tokio::sync::broadcast;

/// Pipeline stage recorded for a file
///
/// Matches the CHECK constraint on `ingest_events.stage`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IngestStage {
    Received,
    Hashed,
    Parsed,
    Linked,
    Archived,
    Error,
}

impl IngestStage {
    /// Database representation
    pub fn as_str(&self) -> &'static str {
        match self {
            IngestStage::Received => "received",
            IngestStage::Hashed => "hashed",
            IngestStage::Parsed => "parsed",
            IngestStage::Linked => "linked",
            IngestStage::Archived => "archived",
            IngestStage::Error => "error",
        }
    }
}

impl fmt::Display for IngestStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IngestStage {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "received" => Ok(IngestStage::Received),
            "hashed" => Ok(IngestStage::Hashed),
            "parsed" => Ok(IngestStage::Parsed),
            "linked" => Ok(IngestStage::Linked),
            "archived" => Ok(IngestStage::Archived),
            "error" => Ok(IngestStage::Error),
            other => Err(crate::Error::InvalidInput(format!(
                "Unknown ingest stage: {}",
                other
            ))),
        }
    }
}

/// One entry of a file's audit trail
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestEvent {
    /// Row id in `ingest_events` (None when the insert itself failed)
    pub id: Option<i64>,
    /// Owning file, absent for events recorded before registration
    pub file_id: Option<i64>,
    pub stage: IngestStage,
    pub message: String,
    /// Free-form JSON context (content hash, archived name, degradation note...)
    pub meta: Option<serde_json::Value>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Default per-subscriber buffer
pub const DEFAULT_EVENT_CAPACITY: usize = 1000;

/// Central distribution bus for ingest events
///
/// Uses `tokio::broadcast` internally:
/// - Non-blocking publish (slow subscribers never stall the pipeline)
/// - Multiple concurrent subscribers
/// - Lagged subscribers lose the oldest events
///
/// # Examples
///
/// ```
/// use claimsync_common::events::EventBus;
///
/// let event_bus = EventBus::new(256);
/// let _rx = event_bus.subscribe();
/// assert_eq!(event_bus.subscriber_count(), 1);
/// ```
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<IngestEvent>,
}

impl EventBus {
    /// Creates a new EventBus buffering up to `capacity` events per subscriber
    /// (at least one)
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    /// Subscribe to all future events
    pub fn subscribe(&self) -> broadcast::Receiver<IngestEvent> {
        self.tx.subscribe()
    }

    /// Emit an event to all subscribers
    ///
    /// Returns `Err` if no subscribers are listening.
    #[allow(clippy::result_large_err)]
    pub fn emit(
        &self,
        event: IngestEvent,
    ) -> Result<usize, broadcast::error::SendError<IngestEvent>> {
        self.tx.send(event)
    }

    /// Emit an event, ignoring if no subscribers are listening
    pub fn emit_lossy(&self, event: IngestEvent) {
        let _ = self.tx.send(event);
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(DEFAULT_EVENT_CAPACITY)
    }
}
