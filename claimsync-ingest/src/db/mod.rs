//! Database access for claimsync-ingest
//!
//! Schema lives in `claimsync_common::db::init`; these modules hold the
//! queries the pipeline and its read side run against it.

pub mod claims;
pub mod events;
pub mod files;
pub mod metadata;
