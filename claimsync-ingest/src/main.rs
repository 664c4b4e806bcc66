//! claimsync-ingest - claim export inbox pipeline
//!
//! Watches the inbox directory, archives every file exactly once, extracts
//! claim metadata from XML, EMS and AWF exports and links files to claims.

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use claimsync_common::config::{load_toml_config_or_default, resolve_root_folder, ROOT_FOLDER_ENV};
use claimsync_common::events::EventBus;
use claimsync_ingest::config::{ConfigOverrides, IngestConfig};
use claimsync_ingest::{IngestPipeline, Poller};

const DEFAULT_LOG_FILTER: &str = "claimsync_ingest=info,claimsync_common=info";

/// Command-line arguments for claimsync-ingest
#[derive(Parser, Debug)]
#[command(name = "claimsync-ingest")]
#[command(about = "Claim export ingest pipeline")]
#[command(version)]
struct Args {
    /// Root folder holding inbox, archive and database by default
    /// (also read from CLAIMSYNC_ROOT_FOLDER)
    #[arg(long)]
    root_folder: Option<PathBuf>,

    /// Inbox directory to watch
    #[arg(long, env = "CLAIMSYNC_INBOX_DIR")]
    inbox: Option<PathBuf>,

    /// Archive directory
    #[arg(long, env = "CLAIMSYNC_ARCHIVE_DIR")]
    archive: Option<PathBuf>,

    /// SQLite database file
    #[arg(long, env = "CLAIMSYNC_DATABASE")]
    database: Option<PathBuf>,

    /// Poll interval in milliseconds
    #[arg(long, env = "CLAIMSYNC_POLL_INTERVAL_MS")]
    poll_interval_ms: Option<u64>,

    /// Initialize the database but do not run the pipeline
    #[arg(long, env = "CLAIMSYNC_DISABLE_INGEST")]
    disable_ingest: bool,

    /// Create a claim when no existing claim matches (true/false, 1/0, yes/no, on/off)
    #[arg(
        long,
        env = "CLAIMSYNC_CLAIM_AUTOCREATE",
        value_parser = clap::builder::BoolishValueParser::new()
    )]
    claim_autocreate: Option<bool>,

    /// TOML configuration file
    #[arg(long, env = "CLAIMSYNC_CONFIG")]
    config: Option<PathBuf>,

    /// Run a single tick and exit
    #[arg(long)]
    once: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // The TOML file may carry the log level, so load it before tracing starts
    let toml_config = load_toml_config_or_default(args.config.as_deref());
    let toml_level = toml_config.as_ref().ok().map(|c| c.logging.level.clone());

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| match &toml_level {
                    Some(level) => tracing_subscriber::EnvFilter::try_new(level),
                    None => tracing_subscriber::EnvFilter::try_new(DEFAULT_LOG_FILTER),
                })
                .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let toml_config = toml_config.context("Failed to load configuration")?;

    info!("Starting claimsync-ingest {}", env!("CARGO_PKG_VERSION"));

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), ROOT_FOLDER_ENV, &toml_config);
    info!("Root folder: {}", root_folder.display());

    let overrides = ConfigOverrides {
        inbox_dir: args.inbox,
        archive_dir: args.archive,
        database_path: args.database,
        poll_interval_ms: args.poll_interval_ms,
        disable_ingest: args.disable_ingest,
        claim_autocreate: args.claim_autocreate,
    };
    let config = IngestConfig::resolve(&overrides, &toml_config, &root_folder)
        .context("Invalid ingest configuration")?;

    info!("Database: {}", config.database_path.display());
    let pool = claimsync_common::db::init_database(&config.database_path)
        .await
        .context("Failed to open database")?;

    if !config.enabled {
        info!("Ingest pipeline disabled by configuration; exiting");
        pool.close().await;
        return Ok(());
    }

    config
        .prepare_directories()
        .context("Inbox or archive directory unusable")?;

    let pipeline = IngestPipeline::with_sqlite_claims(
        pool.clone(),
        config.archive_dir.clone(),
        EventBus::new(claimsync_common::events::DEFAULT_EVENT_CAPACITY),
        config.claim_autocreate,
    )
    .await
    .context("Failed to build ingest pipeline")?;

    let poller = Poller::new(pipeline, config.inbox_dir.clone(), config.poll_interval);

    if args.once {
        let report = poller.tick().await;
        info!(
            tick_id = %report.tick_id,
            discovered = report.discovered,
            ingested = report.ingested,
            unknown_archived = report.unknown_archived,
            failed = report.failed,
            "Single tick finished"
        );
        pool.close().await;
        return Ok(());
    }

    info!(
        "Watching {} every {}",
        config.inbox_dir.display(),
        humanize(config.poll_interval)
    );
    let handle = poller.start();

    shutdown_signal().await;

    handle.shutdown().await;
    pool.close().await;
    info!("Shutdown complete");
    Ok(())
}

fn humanize(interval: Duration) -> String {
    let ms = interval.as_millis();
    if ms % 1000 == 0 {
        format!("{}s", ms / 1000)
    } else {
        format!("{}ms", ms)
    }
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_claim_autocreate_accepts_numeric_flags() {
        let off = Args::try_parse_from(["claimsync-ingest", "--claim-autocreate", "0"]).unwrap();
        assert_eq!(off.claim_autocreate, Some(false));

        let on = Args::try_parse_from(["claimsync-ingest", "--claim-autocreate", "yes"]).unwrap();
        assert_eq!(on.claim_autocreate, Some(true));

        assert!(Args::try_parse_from(["claimsync-ingest", "--claim-autocreate", "maybe"]).is_err());
    }

    #[test]
    fn test_humanize_interval() {
        assert_eq!(humanize(Duration::from_millis(5000)), "5s");
        assert_eq!(humanize(Duration::from_millis(250)), "250ms");
    }
}
