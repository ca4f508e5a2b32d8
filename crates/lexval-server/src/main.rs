//! lexval command-line entry point.
//!
//! # Usage
//!
//! ```bash
//! # Health report against the configured store
//! lexval --config config.yaml health
//!
//! # Effective validation settings
//! LEXVAL_VALIDATION__MAX_BATCH_SIZE=200 lexval config
//!
//! # Check that entities exist
//! lexval validate --matter 7d0c... --document 91ab... --document 44f2...
//!
//! # Also dump the Prometheus metrics recorded by the run to stderr
//! lexval --emit-metrics validate --matter 7d0c...
//! ```

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use lexval_server::handlers::validation::EntityValidationRequest;
use lexval_server::observability::{init_logging, init_metrics, LoggingConfig, MetricsState};
use lexval_server::{ServerConfig, StoreEntityReader, ValidationHandler, ValidationOptions};
use lexval_storage::{MemoryRecordStore, PostgresConfig, PostgresRecordStore, RecordStore};

/// lexval - batch validation of matters, documents and revisions
#[derive(Parser, Debug)]
#[command(name = "lexval")]
#[command(version, about, long_about = None)]
struct Args {
    /// Path to configuration file (YAML)
    #[arg(short, long)]
    config: Option<String>,

    /// Print the Prometheus exposition to stderr after the command
    #[arg(long)]
    emit_metrics: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Score engine health, including store connectivity
    Health,
    /// Print the effective validation settings and any issues
    Config,
    /// Check that the given entities exist
    Validate {
        /// Matter id (repeatable)
        #[arg(long = "matter")]
        matters: Vec<String>,
        /// Document id (repeatable)
        #[arg(long = "document")]
        documents: Vec<String>,
        /// Revision id (repeatable)
        #[arg(long = "revision")]
        revisions: Vec<String>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = if let Some(config_path) = args.config.as_deref() {
        ServerConfig::load(config_path)?
    } else {
        ServerConfig::from_env()?
    };

    init_logging(LoggingConfig::from(&config.logging));
    info!(version = env!("CARGO_PKG_VERSION"), "starting lexval");

    let metrics = if config.metrics.enabled {
        Some(init_metrics()?)
    } else {
        None
    };
    if args.emit_metrics && metrics.is_none() {
        warn!("--emit-metrics ignored: metrics.enabled is false");
    }
    let metrics = metrics.filter(|_| args.emit_metrics);

    let options = ValidationOptions::try_from(&config.validation)?;

    match config.storage.backend.as_str() {
        "memory" => {
            info!("using in-memory storage backend");
            run(MemoryRecordStore::new_shared(), options, args.command, metrics).await
        }
        "postgres" => {
            let database_url = config.storage.database_url.as_ref().ok_or_else(|| {
                anyhow::anyhow!("storage.database_url is required for the postgres backend")
            })?;

            info!("connecting to PostgreSQL");
            let pg_config = PostgresConfig {
                database_url: database_url.clone(),
                max_connections: config.storage.pool_size,
                min_connections: 1,
                connect_timeout_secs: config.storage.connection_timeout_secs,
                query_timeout_secs: config.storage.query_timeout_secs,
                ..Default::default()
            };

            let storage = PostgresRecordStore::from_config(&pg_config).await?;
            storage.run_migrations().await?;
            info!("database migrations complete");

            run(Arc::new(storage), options, args.command, metrics).await
        }
        other => {
            error!(backend = other, "unknown storage backend");
            anyhow::bail!("unknown storage backend: {other}");
        }
    }
}

/// Runs `command` against `storage` and prints the JSON result.
///
/// When `metrics` is given, the Prometheus exposition follows on stderr.
async fn run<S: RecordStore>(
    storage: Arc<S>,
    options: ValidationOptions,
    command: Command,
    metrics: Option<MetricsState>,
) -> anyhow::Result<()> {
    let reader = Arc::new(StoreEntityReader::new(storage));
    let handler = ValidationHandler::from_options(reader, options);
    let cancel = CancellationToken::new();

    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            ctrl_c.cancel();
        }
    });

    let output = match command {
        Command::Health => {
            let report = handler.check_health(&cancel).await;
            serde_json::to_string_pretty(&report)?
        }
        Command::Config => serde_json::to_string_pretty(&handler.configuration())?,
        Command::Validate {
            matters,
            documents,
            revisions,
        } => {
            let request = EntityValidationRequest::new()
                .with_matters(matters)
                .with_documents(documents)
                .with_revisions(revisions);
            let result = handler.validate_entities_exist(&request, &cancel).await?;
            serde_json::to_string_pretty(&*result)?
        }
    };

    println!("{output}");
    if let Some(metrics) = metrics {
        eprintln!("{}", metrics.render());
    }
    Ok(())
}
