//! claimsync-ingest library interface
//!
//! The inbox pipeline (poller, dedup, multi-format extraction, archiving,
//! metadata upsert and claim linking) plus the read-side queries over what it
//! produced. The binary in `main.rs` wires these together.

pub mod config;
pub mod db;
pub mod error;
pub mod extractors;
pub mod models;
pub mod services;
pub mod utils;

pub use crate::error::{PipelineError, PipelineResult};
pub use crate::services::{IngestPipeline, Poller, PollerHandle, TickReport};
