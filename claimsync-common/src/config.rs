//! Bootstrap configuration and root folder resolution
//!
//! Root folder priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. OS-dependent compiled default (fallback)

use crate::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "CLAIMSYNC_ROOT_FOLDER";

/// Bootstrap configuration loaded from TOML file
///
/// Every field is optional; anything missing falls through to environment
/// variables or built-in defaults.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TomlConfig {
    /// Root folder holding inbox, archive and database by default
    #[serde(default)]
    pub root_folder: Option<PathBuf>,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,

    /// Ingest pipeline settings
    #[serde(default)]
    pub ingest: IngestSection,
}

/// Logging configuration
#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    /// Log level or filter directive (trace, debug, info, warn, error)
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// `[ingest]` table of the TOML file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IngestSection {
    pub inbox_dir: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub database_path: Option<PathBuf>,
    pub poll_interval_ms: Option<u64>,
    pub enabled: Option<bool>,
    pub claim_autocreate: Option<bool>,
}

/// Load a TOML configuration file
pub fn load_toml_config(path: &Path) -> Result<TomlConfig> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::Config(format!("Read TOML {} failed: {}", path.display(), e)))?;
    toml::from_str(&content)
        .map_err(|e| Error::Config(format!("Parse TOML {} failed: {}", path.display(), e)))
}

/// Load the TOML file at `explicit`, or the platform default path if it exists
///
/// A missing default file yields an empty configuration. A missing explicit
/// file is an error.
pub fn load_toml_config_or_default(explicit: Option<&Path>) -> Result<TomlConfig> {
    match explicit {
        Some(path) => load_toml_config(path),
        None => match default_config_path() {
            Some(path) if path.exists() => load_toml_config(&path),
            _ => Ok(TomlConfig::default()),
        },
    }
}

/// Platform config file location (`~/.config/claimsync/claimsync.toml` on Linux)
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("claimsync").join("claimsync.toml"))
}

/// Resolve the root folder following CLI → ENV → TOML → default priority
pub fn resolve_root_folder(
    cli_arg: Option<&Path>,
    env_var_name: &str,
    toml_config: &TomlConfig,
) -> PathBuf {
    if let Some(path) = cli_arg {
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(env_var_name) {
        if !path.trim().is_empty() {
            return PathBuf::from(path);
        }
    }

    if let Some(path) = &toml_config.root_folder {
        return path.clone();
    }

    default_root_folder()
}

/// OS-dependent default root folder
fn default_root_folder() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("claimsync"))
        .unwrap_or_else(|| PathBuf::from("./claimsync_data"))
}
