//! Ingest services
//!
//! Leaf services (hashing, sniffing, scanning, archiving) are plain functions
//! or small structs; the [`IngestPipeline`] composes them per file and the
//! [`Poller`] drives the pipeline on a timer.

pub mod archiver;
pub mod claim_linker;
pub mod event_log;
pub mod file_registry;
pub mod format_sniffer;
pub mod hash_store;
pub mod inbox_scanner;
pub mod pipeline;
pub mod poller;

pub use archiver::{ArchiveError, ArchivedFile, Archiver};
pub use claim_linker::{ClaimLink, ClaimLinker, ClaimRecord, ClaimRepository, NewClaim};
pub use event_log::EventLog;
pub use file_registry::{FileRegistry, Registration};
pub use inbox_scanner::{InboxEntry, InboxScanner, ScanError};
pub use pipeline::{ExtractionOutcome, FileOutcome, IngestPipeline};
pub use poller::{IngestStatus, Poller, PollerHandle, TickReport};
