//! Dopa Tracker - Main entry point
//!
//! Loads configuration, restores the last checkpoint and serves the HTTP
//! control surface until Ctrl+C / SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use dopa_common::config::default_config_path;
use dopa_common::db::init_database;
use dopa_tracker::analyzer::{HttpAnalyzer, SemanticAnalyzer};
use dopa_tracker::api::{self, AppContext};
use dopa_tracker::broadcaster::StateBroadcaster;
use dopa_tracker::config::{Config, ConfigOverrides, RuntimeSettings};
use dopa_tracker::db::{CheckpointStore, MemoryCheckpointStore, SqliteCheckpointStore};
use dopa_tracker::settlement::HttpLedger;
use dopa_tracker::Tracker;

/// Command-line arguments for dopa-tracker
#[derive(Parser, Debug)]
#[command(name = "dopa-tracker")]
#[command(about = "Engagement tracking and settlement service")]
#[command(version)]
struct Args {
    /// Path to TOML configuration file
    #[arg(short, long, env = "DOPA_CONFIG")]
    config: Option<PathBuf>,

    /// Port to listen on
    #[arg(short, long, env = "DOPA_PORT")]
    port: Option<u16>,

    /// Path to SQLite database
    #[arg(short, long, env = "DOPA_DATABASE")]
    database: Option<PathBuf>,

    /// Ledger service base URL
    #[arg(long, env = "DOPA_LEDGER_URL")]
    ledger_url: Option<String>,

    /// Semantic analyzer base URL (analyzer disabled when unset)
    #[arg(long, env = "DOPA_ANALYZER_URL")]
    analyzer_url: Option<String>,

    /// Keep all state in memory (nothing is checkpointed to disk)
    #[arg(long)]
    ephemeral: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let config_path = args.config.clone().unwrap_or_else(default_config_path);
    let config = Config::load(
        &config_path,
        ConfigOverrides {
            port: args.port,
            database_path: args.database.clone(),
            ledger_url: args.ledger_url.clone(),
            analyzer_url: args.analyzer_url.clone(),
        },
    )
    .context("Failed to load configuration")?;

    // Initialize tracing
    let default_filter = format!(
        "dopa_tracker={level},dopa_common={level},tower_http=info",
        level = config.log_level
    );
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Dopa Tracker on port {}", config.port);
    info!("Ledger: {}", config.ledger_url);
    match &config.analyzer_url {
        Some(url) => info!("Semantic analyzer: {}", url),
        None => info!("Semantic analyzer disabled"),
    }

    let (store, settings): (Arc<dyn CheckpointStore>, RuntimeSettings) = if args.ephemeral {
        info!("Ephemeral mode: state kept in memory only");
        (
            Arc::new(MemoryCheckpointStore::new()) as Arc<dyn CheckpointStore>,
            RuntimeSettings::default(),
        )
    } else {
        info!("Database: {}", config.database_path.display());
        let db_pool = init_database(&config.database_path)
            .await
            .context("Failed to initialize database")?;
        let settings = RuntimeSettings::load(&db_pool)
            .await
            .context("Failed to load runtime settings")?;
        (
            Arc::new(SqliteCheckpointStore::new(db_pool)) as Arc<dyn CheckpointStore>,
            settings,
        )
    };

    let ledger = Arc::new(
        HttpLedger::new(config.ledger_url.clone(), settings.ledger_timeout())
            .context("Failed to create ledger client")?,
    );

    let analyzer: Option<Arc<dyn SemanticAnalyzer>> = match &config.analyzer_url {
        Some(url) => Some(Arc::new(
            HttpAnalyzer::new(url, settings.ledger_timeout())
                .context("Failed to create analyzer client")?,
        ) as Arc<dyn SemanticAnalyzer>),
        None => None,
    };

    let tracker = Arc::new(
        Tracker::restore(
            store,
            ledger,
            analyzer,
            StateBroadcaster::default(),
            settings,
        )
        .await,
    );

    let ctx = AppContext {
        tracker: Arc::clone(&tracker),
    };
    api::run(config.port, ctx, shutdown_signal())
        .await
        .context("Server error")?;

    tracker.shutdown().await;
    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!("Failed to install signal handler: {}", e);
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
