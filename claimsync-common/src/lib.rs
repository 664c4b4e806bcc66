//! # claimsync common library
//!
//! Shared code for the claimsync services:
//! - Database initialization and schema
//! - Ingest event types and the EventBus
//! - Bootstrap configuration loading
//! - Common error type

pub mod config;
pub mod db;
pub mod error;
pub mod events;

pub use error::{Error, Result};
