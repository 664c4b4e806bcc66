//! Tests for bootstrap configuration and root folder resolution
//!
//! Tests that manipulate CLAIMSYNC_ROOT_FOLDER are marked with #[serial]
//! so they never race on the process environment.

use claimsync_common::config::{
    load_toml_config, load_toml_config_or_default, resolve_root_folder, TomlConfig,
    ROOT_FOLDER_ENV,
};
use claimsync_common::Error;
use serial_test::serial;
use std::env;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

#[test]
#[serial]
fn test_env_var_beats_toml() {
    env::set_var(ROOT_FOLDER_ENV, "/tmp/claimsync-env-root");

    let toml_config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/claimsync-toml-root")),
        ..Default::default()
    };
    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, &toml_config);
    assert_eq!(resolved, PathBuf::from("/tmp/claimsync-env-root"));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_toml_used_when_env_absent() {
    env::remove_var(ROOT_FOLDER_ENV);

    let toml_config = TomlConfig {
        root_folder: Some(PathBuf::from("/tmp/claimsync-toml-root")),
        ..Default::default()
    };
    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, &toml_config);
    assert_eq!(resolved, PathBuf::from("/tmp/claimsync-toml-root"));
}

#[test]
#[serial]
fn test_blank_env_var_ignored() {
    env::set_var(ROOT_FOLDER_ENV, "   ");

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, &TomlConfig::default());
    assert!(!resolved.as_os_str().is_empty());
    assert_ne!(resolved, PathBuf::from("   "));

    env::remove_var(ROOT_FOLDER_ENV);
}

#[test]
#[serial]
fn test_default_root_folder_named_claimsync() {
    env::remove_var(ROOT_FOLDER_ENV);

    let resolved = resolve_root_folder(None, ROOT_FOLDER_ENV, &TomlConfig::default());
    let name = resolved.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("claimsync"), "unexpected default root {:?}", resolved);
}

#[test]
fn test_load_toml_config_from_file() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("claimsync.toml");
    std::fs::write(
        &path,
        r#"
        root_folder = "/data/claims"

        [ingest]
        poll_interval_ms = 750
        "#,
    )
    .unwrap();

    let config = load_toml_config(&path).unwrap();
    assert_eq!(config.root_folder, Some(PathBuf::from("/data/claims")));
    assert_eq!(config.ingest.poll_interval_ms, Some(750));
    assert_eq!(config.logging.level, "info");
}

#[test]
fn test_malformed_toml_is_config_error() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("broken.toml");
    std::fs::write(&path, "root_folder = [unterminated").unwrap();

    let result = load_toml_config(&path);
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn test_missing_explicit_config_is_error() {
    let result = load_toml_config_or_default(Some(Path::new("/nonexistent/claimsync.toml")));
    assert!(matches!(result, Err(Error::Config(_))));
}
