//! Flowcast API Server
//!
//! Run with: cargo run --bin flowcast
//!
//! # Configuration
//!
//! Reads `--config` or the first of `~/.config/flowcast/config.toml`,
//! `/etc/flowcast/config.toml`, `./config.toml`; environment overrides
//! (`API_KEY`, `FLOWCAST_*`) apply on top. `RUST_LOG` overrides the log level.

use anyhow::Context;
use clap::Parser;
use flowcast::api::{serve, AppState};
use flowcast::config::{init_logging, Config};
use flowcast::pipeline::{IncrementalWriter, Pipeline};
use flowcast::scheduler::TrainingScheduler;
use flowcast::storage::{SeriesReader, SqliteDocumentStore, SqliteResultsStore, StoreProbe};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flowcast")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Serve rolling flow forecasts over HTTP")]
struct Args {
    /// Config file (default: search the standard locations)
    #[arg(short, long)]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let config = match &args.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);
    config.validate()?;

    tracing::info!("Starting Flowcast v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!(
        entity = %config.history.entity_id,
        history = ?config.history.path,
        results = ?config.results.path,
        "Opening stores"
    );

    let history = Arc::new(
        SqliteDocumentStore::open(&config.history.path, config.history.schema())
            .with_context(|| format!("opening history store {:?}", config.history.path))?,
    );
    let results = Arc::new(
        SqliteResultsStore::open(&config.results.path, &config.results.table)
            .with_context(|| format!("opening results store {:?}", config.results.path))?,
    );

    let reader: Arc<dyn SeriesReader> = history.clone();
    let pipeline = Arc::new(Pipeline::from_config(&config, reader)?);

    let history_probe: Arc<dyn StoreProbe> = history;
    let results_probe: Arc<dyn StoreProbe> = results.clone();
    let mut state = AppState::new(Arc::clone(&pipeline), config.api.clone())
        .with_probe(history_probe)
        .with_probe(results_probe);

    let scheduler_task = if config.schedule.enabled {
        let scheduler = Arc::new(TrainingScheduler::new(
            Arc::clone(&pipeline),
            Arc::new(IncrementalWriter::new(results)),
            config.schedule.interval_minutes,
        ));
        state = state.with_scheduler(Arc::clone(&scheduler));
        Some((Arc::clone(&scheduler), scheduler.start()))
    } else {
        tracing::info!("Scheduled training disabled");
        None
    };

    serve(state, &config.api).await?;

    if let Some((scheduler, handle)) = scheduler_task {
        scheduler.stop().await;
        handle.abort();
    }

    tracing::info!("Flowcast stopped");
    Ok(())
}
