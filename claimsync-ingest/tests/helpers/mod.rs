//! Test Helper Utilities
//!
//! Shared utilities for testing claimsync-ingest

#![allow(dead_code)]

pub mod db_utils;
pub mod fixtures;

pub use db_utils::{count_rows, create_test_env, stages_for_file, TestEnv};
pub use fixtures::{build_awf, claim_xml, drop_file, EMS_WITH_TOTALS, TRUNCATED_XML};
