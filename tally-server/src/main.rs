// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
//  Tally: authenticated log collection endpoint
//
//  HTTP:     axum on a multi-thread tokio runtime
//  Storage:  none / memory / file / etcd, selected by config
//  Config:   YAML file + TALLY_* env overrides
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tally_collector::{CollectorServer, CollectorState};
use tally_core::config::{CollectorConfig, LogFormat, StorageBackend};
use tally_store::{FileStore, LogStore, MemoryStore};
use tracing::{info, warn};

#[derive(Parser, Debug)]
#[command(name = "tally", version, about = "Tally: authenticated log collection endpoint")]
struct Cli {
    /// Path to configuration file
    #[arg(short, long, default_value = "/etc/tally/tally.yaml")]
    config: PathBuf,

    /// Log level
    #[arg(long, default_value = "info")]
    log_level: String,

    /// Override the configured log format
    #[arg(long, value_parser = parse_log_format)]
    log_format: Option<LogFormat>,
}

fn parse_log_format(s: &str) -> Result<LogFormat, String> {
    match s {
        "text" => Ok(LogFormat::Text),
        "json" => Ok(LogFormat::Json),
        other => Err(format!("unknown log format: {other} (expected text or json)")),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // ── Config ──
    let config_found = cli.config.exists();
    let config = if config_found {
        CollectorConfig::load(&cli.config)?
    } else {
        CollectorConfig::from_env()?
    };
    config.validate()?;

    // ── Tracing ──
    let format = cli.log_format.unwrap_or(config.observability.log_format);
    tally_observability::logger::init(&cli.log_level, format)?;

    info!(version = env!("CARGO_PKG_VERSION"), "Tally starting");
    if config_found {
        info!(path = %cli.config.display(), "Loaded config file");
    } else {
        info!("No config file found, using defaults and environment");
    }
    if config.auth.expected_token().is_none() {
        warn!("No auth token configured; every POST will answer 500 Configuration error");
    }

    // ── Store ──
    let store = open_store(&config).await?;
    match &store {
        Some(s) => info!(backend = s.kind(), "Storage backend ready"),
        None => info!("No storage backend configured; entries are validated but not persisted"),
    }

    // ── Serve ──
    let state = CollectorState::new(&config, store)?;
    CollectorServer::new(config, state)
        .serve(shutdown_signal())
        .await?;

    info!("Tally stopped");
    Ok(())
}

async fn open_store(config: &CollectorConfig) -> anyhow::Result<Option<Arc<dyn LogStore>>> {
    let store: Arc<dyn LogStore> = match config.storage.backend {
        StorageBackend::None => return Ok(None),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::File => Arc::new(FileStore::open(&config.storage.file.dir).await?),
        #[cfg(feature = "etcd")]
        StorageBackend::Etcd => {
            Arc::new(tally_store::etcd::EtcdStore::connect(&config.storage.etcd).await?)
        }
        #[cfg(not(feature = "etcd"))]
        StorageBackend::Etcd => {
            anyhow::bail!("storage backend 'etcd' requires building with the `etcd` feature")
        }
    };
    Ok(Some(store))
}

/// Resolves on SIGINT, or SIGTERM on unix (docker stop).
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received, draining in-flight requests");
}
