//! Configuration resolution for claimsync-ingest
//!
//! Priority, highest first: CLI flag → environment variable (both arrive
//! through clap) → TOML `[ingest]` section → default under the root folder.

use claimsync_common::config::TomlConfig;
use claimsync_common::{Error, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;
use uuid::Uuid;

pub const DEFAULT_POLL_INTERVAL_MS: u64 = 5000;
pub const DEFAULT_INBOX_DIR: &str = "incoming";
pub const DEFAULT_ARCHIVE_DIR: &str = "archive";
pub const DEFAULT_DATABASE_FILE: &str = "claimsync.db";

/// Values supplied on the command line or through the environment
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub inbox_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub disable_ingest: bool,
    pub claim_autocreate: Option<bool>,
}

/// Resolved runtime configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    pub inbox_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub database_path: PathBuf,
    pub poll_interval: Duration,
    pub enabled: bool,
    pub claim_autocreate: bool,
}

impl IngestConfig {
    pub fn resolve(overrides: &ConfigOverrides, toml: &TomlConfig, root_folder: &Path) -> Result<Self> {
        let section = &toml.ingest;

        let inbox_dir = pick(&overrides.inbox_dir, &section.inbox_dir)
            .unwrap_or_else(|| root_folder.join(DEFAULT_INBOX_DIR));
        let archive_dir = pick(&overrides.archive_dir, &section.archive_dir)
            .unwrap_or_else(|| root_folder.join(DEFAULT_ARCHIVE_DIR));
        let database_path = pick(&overrides.database_path, &section.database_path)
            .unwrap_or_else(|| root_folder.join(DEFAULT_DATABASE_FILE));

        let poll_interval_ms = overrides
            .poll_interval_ms
            .or(section.poll_interval_ms)
            .unwrap_or(DEFAULT_POLL_INTERVAL_MS);
        if poll_interval_ms == 0 {
            return Err(Error::Config("poll interval must be greater than zero".to_string()));
        }

        if inbox_dir == archive_dir {
            return Err(Error::Config(format!(
                "inbox and archive must be different directories (both {})",
                inbox_dir.display()
            )));
        }

        let enabled = !overrides.disable_ingest && section.enabled.unwrap_or(true);
        let claim_autocreate = overrides
            .claim_autocreate
            .or(section.claim_autocreate)
            .unwrap_or(true);

        Ok(Self {
            inbox_dir,
            archive_dir,
            database_path,
            poll_interval: Duration::from_millis(poll_interval_ms),
            enabled,
            claim_autocreate,
        })
    }

    /// Create the inbox and archive directories and check they are writable
    pub fn prepare_directories(&self) -> Result<()> {
        ensure_writable_dir("inbox", &self.inbox_dir)?;
        ensure_writable_dir("archive", &self.archive_dir)?;
        info!(
            inbox = %self.inbox_dir.display(),
            archive = %self.archive_dir.display(),
            "Ingest directories ready"
        );
        Ok(())
    }
}

fn pick(cli: &Option<PathBuf>, toml: &Option<PathBuf>) -> Option<PathBuf> {
    cli.clone().or_else(|| toml.clone())
}

fn ensure_writable_dir(label: &str, dir: &Path) -> Result<()> {
    std::fs::create_dir_all(dir).map_err(|e| {
        Error::Config(format!("{} directory {} cannot be created: {}", label, dir.display(), e))
    })?;

    // Dot-prefixed so a probe left behind in the inbox is never ingested
    let probe = dir.join(format!(".claimsync-probe-{}", Uuid::new_v4()));
    std::fs::write(&probe, b"probe").map_err(|e| {
        Error::Config(format!("{} directory {} is not writable: {}", label, dir.display(), e))
    })?;
    let _ = std::fs::remove_file(&probe);

    Ok(())
}
