//! RateSync Daemon Binary
//!
//! Synchronizes exchange rates from external providers into the store,
//! once or on a daily schedule.

use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use ratesync_provider::{NbpProvider, ProviderConfig, ProviderRegistry};
use ratesync_scheduler::{
    HistoryOutcome, HistoryUpdater, Metrics, SchedulerConfig, SchedulerError, SharedMetrics,
    SyncScheduler,
};
use ratesync_store::{PgRateStore, ReconciliationEngine};

#[derive(Parser)]
#[command(name = "ratesync")]
#[command(about = "Exchange rate synchronization daemon", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the scheduling loop until Ctrl-C.
    Daemon,

    /// Run one synchronization cycle and exit.
    SyncOnce,

    /// Backfill the full provider history and exit.
    Backfill,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Load configuration
    let config = SchedulerConfig::from_env();

    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(
            std::env::var("RUST_LOG").unwrap_or_else(|_| config.log_level.clone()),
        ))
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!("Starting RateSync");

    if let Err(e) = config.validate() {
        error!(error = %e, "Invalid configuration");
        return Err(SchedulerError::Config(e).into());
    }

    // Connect and migrate the store
    let pool = sqlx::PgPool::connect(&config.database_url).await?;
    info!("Database connection established");

    let store = Arc::new(PgRateStore::new(pool.clone()));
    store.migrate().await?;

    let registry = build_registry(&config);
    let engine =
        Arc::new(ReconciliationEngine::new(store).with_base_currency(config.base_currency));
    let metrics: SharedMetrics = Arc::new(Metrics::new());

    match cli.command {
        Commands::Daemon => {
            let scheduler =
                SyncScheduler::new(registry, engine, config.sync.clone(), metrics.clone());

            // Set up graceful shutdown
            let shutdown = scheduler.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown signal received");
                    shutdown.stop().await;
                }
            });

            scheduler.run().await?;
        }
        Commands::SyncOnce => {
            let scheduler =
                SyncScheduler::new(registry, engine, config.sync.clone(), metrics.clone());
            let report = scheduler.run_cycle().await?;
            info!(%report, "Synchronization finished");
        }
        Commands::Backfill => {
            let updater = HistoryUpdater::new(registry, engine, metrics.clone());
            match updater.update_history().await? {
                HistoryOutcome::Completed(outcome) => info!(%outcome, "Backfill finished"),
                HistoryOutcome::AlreadyRunning => info!("Backfill already in progress"),
            }
        }
    }

    if config.metrics_enabled {
        info!(metrics = ?metrics.snapshot(), "Final metrics");
    }

    pool.close().await;
    info!("RateSync shutdown complete");
    Ok(())
}

/// Register the configured providers. NBP quotes against PLN regardless of
/// the engine's base currency, so only the history start year is overridden.
fn build_registry(config: &SchedulerConfig) -> Arc<ProviderRegistry> {
    let nbp = NbpProvider::with_base_url(&config.nbp_base_url)
        .with_timeout(config.http_timeout)
        .with_config(ProviderConfig {
            history_from_year: config.history_from_year,
            ..ProviderConfig::default()
        });

    let mut registry = ProviderRegistry::new();
    registry.register(Arc::new(nbp));
    if let Some(name) = &config.default_provider {
        registry.set_default(name);
    }
    Arc::new(registry)
}
