//! Inbox poller
//!
//! Lists the inbox on a fixed interval and feeds each file through the
//! [`IngestPipeline`] one at a time. Ticks run as spawned tasks so a slow
//! tick never delays the timer; an atomic guard makes an overlapping tick a
//! no-op that reports `skipped`.

use crate::db;
use crate::db::files::IngestedFile;
use crate::error::PipelineResult;
use crate::services::inbox_scanner::InboxScanner;
use crate::services::pipeline::{FileOutcome, IngestPipeline};
use claimsync_common::events::IngestStage;
use serde::Serialize;
use serde_json::json;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Summary of one tick
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub tick_id: Uuid,
    /// Another tick was already running; nothing was done
    pub skipped: bool,
    pub discovered: usize,
    pub ingested: usize,
    pub unknown_archived: usize,
    pub failed: usize,
    /// Files that disappeared from the inbox mid-tick
    pub vanished: usize,
    pub scan_error: Option<String>,
}

/// Snapshot for operators
#[derive(Debug, Clone, Serialize)]
pub struct IngestStatus {
    pub inbox_count: usize,
    pub poll_interval_ms: u64,
    pub tick_in_progress: bool,
    pub last_processed: Option<IngestedFile>,
}

/// Clears the running flag when a tick ends, including on panic
struct TickGuard<'a> {
    running: &'a AtomicBool,
}

impl<'a> TickGuard<'a> {
    fn acquire(running: &'a AtomicBool) -> Option<Self> {
        running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { running })
    }
}

impl Drop for TickGuard<'_> {
    fn drop(&mut self) {
        self.running.store(false, Ordering::Release);
    }
}

struct PollerInner {
    pipeline: IngestPipeline,
    scanner: InboxScanner,
    inbox_dir: PathBuf,
    interval: Duration,
    running: AtomicBool,
}

/// `tokio::time::interval` panics on a zero period
pub const MIN_POLL_INTERVAL: Duration = Duration::from_millis(1);

#[derive(Clone)]
pub struct Poller {
    inner: Arc<PollerInner>,
}

impl Poller {
    /// Intervals below [`MIN_POLL_INTERVAL`] are raised to it
    pub fn new(pipeline: IngestPipeline, inbox_dir: impl Into<PathBuf>, interval: Duration) -> Self {
        let interval = interval.max(MIN_POLL_INTERVAL);
        Self {
            inner: Arc::new(PollerInner {
                pipeline,
                scanner: InboxScanner::new(),
                inbox_dir: inbox_dir.into(),
                interval,
                running: AtomicBool::new(false),
            }),
        }
    }

    pub fn pipeline(&self) -> &IngestPipeline {
        &self.inner.pipeline
    }

    pub fn inbox_dir(&self) -> &Path {
        &self.inner.inbox_dir
    }

    pub fn poll_interval(&self) -> Duration {
        self.inner.interval
    }

    pub fn is_ticking(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Process everything currently in the inbox, in name order
    pub async fn tick(&self) -> TickReport {
        let mut report = TickReport {
            tick_id: Uuid::new_v4(),
            ..Default::default()
        };

        let Some(_guard) = TickGuard::acquire(&self.inner.running) else {
            tracing::debug!(tick_id = %report.tick_id, "Previous tick still running, skipping");
            report.skipped = true;
            return report;
        };

        let entries = match self.inner.scanner.scan(&self.inner.inbox_dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(tick_id = %report.tick_id, error = %e, "Inbox scan failed");
                self.inner
                    .pipeline
                    .event_log()
                    .record(
                        IngestStage::Error,
                        format!("Inbox scan failed: {}", e),
                        Some(json!({ "kind": "scan", "tick_id": report.tick_id })),
                        None,
                    )
                    .await;
                report.scan_error = Some(e.to_string());
                return report;
            }
        };

        report.discovered = entries.len();
        if !entries.is_empty() {
            tracing::info!(tick_id = %report.tick_id, files = entries.len(), "Processing inbox");
        }

        for entry in &entries {
            match self.inner.pipeline.process_entry(entry).await {
                FileOutcome::Ingested { .. } => report.ingested += 1,
                FileOutcome::UnknownArchived { .. } => report.unknown_archived += 1,
                FileOutcome::Failed { .. } => report.failed += 1,
                FileOutcome::Skipped => report.vanished += 1,
            }
        }

        if report.discovered > 0 {
            tracing::info!(
                tick_id = %report.tick_id,
                ingested = report.ingested,
                unknown_archived = report.unknown_archived,
                failed = report.failed,
                vanished = report.vanished,
                "Tick complete"
            );
        }

        report
    }

    /// Start polling: the first tick runs immediately, then every interval
    pub fn start(&self) -> PollerHandle {
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let poller = self.clone();

        let task = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(poller.inner.interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight: JoinSet<TickReport> = JoinSet::new();

            tracing::info!(
                inbox = %poller.inner.inbox_dir.display(),
                poll_interval_ms = poller.inner.interval.as_millis() as u64,
                "Poller started"
            );

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        let tick_poller = poller.clone();
                        in_flight.spawn(async move { tick_poller.tick().await });
                    }
                    Some(joined) = in_flight.join_next(), if !in_flight.is_empty() => {
                        if let Err(e) = joined {
                            tracing::error!(error = %e, "Tick task failed");
                        }
                    }
                }
            }

            while let Some(joined) = in_flight.join_next().await {
                if let Err(e) = joined {
                    tracing::error!(error = %e, "Tick task failed during shutdown");
                }
            }

            tracing::info!("Poller stopped");
        });

        PollerHandle { cancel, task }
    }

    /// Inbox count, poll interval and the most recently processed file
    pub async fn status(&self) -> PipelineResult<IngestStatus> {
        let inbox_count = self.inner.scanner.count(&self.inner.inbox_dir)?;
        let last_processed = db::files::last_processed(self.inner.pipeline.pool()).await?;

        Ok(IngestStatus {
            inbox_count,
            poll_interval_ms: self.inner.interval.as_millis() as u64,
            tick_in_progress: self.is_ticking(),
            last_processed,
        })
    }
}

/// Owned handle to a running poller
pub struct PollerHandle {
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl PollerHandle {
    /// Stop scheduling ticks and wait for in-flight ticks to finish
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.task.await {
            tracing::error!(error = %e, "Poller task ended abnormally");
        }
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}
