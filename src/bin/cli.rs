//! Flowcast CLI
//!
//! Command-line interface for offline Flowcast operations:
//! - Train and append new forecast rows
//! - Print a forecast
//! - Import a CSV export into the history store
//! - Generate a default config file

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use flowcast::api::dto::{parse_instant, ForecastPointDto};
use flowcast::config::{generate_default_config, init_logging, Config};
use flowcast::pipeline::{IncrementalWriter, Pipeline};
use flowcast::storage::{CsvObservationSource, SeriesReader, SqliteDocumentStore, SqliteResultsStore};
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "flowcast-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Offline tools for the Flowcast forecast pipeline")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config file (default: search the standard locations)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Read history from a CSV export instead of the document store
    #[arg(long, global = true)]
    pub csv: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the pipeline and append new forecast rows to the results store
    Train {
        /// Instant to treat as now (epoch seconds or RFC 3339, default: now)
        #[arg(long)]
        now: Option<String>,
    },

    /// Run the pipeline and print the future part of the forecast
    Predict {
        /// Instant to treat as now (epoch seconds or RFC 3339, default: now)
        #[arg(long)]
        now: Option<String>,
        /// Only print points after this instant (default and minimum: now)
        #[arg(long)]
        after: Option<String>,
        /// Include backfill points for the training window
        #[arg(long)]
        all: bool,
        /// Output format (table, json, csv)
        #[arg(short, long, default_value = "table")]
        format: String,
    },

    /// Import a CSV export into the history store
    Import {
        /// Path to CSV file
        path: PathBuf,
        /// Timestamp column name
        #[arg(long, default_value = "timestamp")]
        timestamp_col: String,
        /// Value column name
        #[arg(long, default_value = "data.raw_cur_flow")]
        value_col: String,
        /// Entity column name; rows without one get the configured entity
        #[arg(long)]
        entity_col: Option<String>,
        /// Dry run (don't actually import)
        #[arg(long)]
        dry_run: bool,
    },

    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    if let Commands::Config { output } = &cli.command {
        let content = generate_default_config();
        match output {
            Some(path) => {
                std::fs::write(path, content)?;
                println!("Config written to {}", path.display());
            }
            None => print!("{}", content),
        }
        return Ok(());
    }

    let config = match &cli.config {
        Some(path) => Config::load_with_env(path)?,
        None => Config::load_default(),
    };
    init_logging(&config.logging);
    config.validate_pipeline()?;

    match cli.command {
        Commands::Train { now } => {
            let now = parse_now(now.as_deref())?;
            let pipeline = Pipeline::from_config(&config, open_reader(&config, cli.csv.as_ref())?)?;
            let results = Arc::new(
                SqliteResultsStore::open(&config.results.path, &config.results.table)
                    .with_context(|| format!("opening results store {:?}", config.results.path))?,
            );

            let outcome = pipeline.train(now, &IncrementalWriter::new(results.clone()))?;
            println!(
                "Trained on {} points, forecast {} points, wrote {} new rows ({} total)",
                outcome.history_len,
                outcome.forecast_len,
                outcome.written,
                results.row_count()?
            );
        }

        Commands::Predict {
            now,
            after,
            all,
            format,
        } => {
            let now = parse_now(now.as_deref())?;
            let cutoff = match after.as_deref() {
                Some(raw) => parse_instant(raw).map_err(anyhow::Error::msg)?.max(now),
                None => now,
            };
            let pipeline = Pipeline::from_config(&config, open_reader(&config, cli.csv.as_ref())?)?;
            let forecast = pipeline.run(now)?;

            let points: Vec<ForecastPointDto> = if all {
                forecast.points.iter().map(ForecastPointDto::from).collect()
            } else {
                forecast.future_after(cutoff).iter().map(ForecastPointDto::from).collect()
            };

            match format.as_str() {
                "json" => println!("{}", serde_json::to_string_pretty(&points)?),
                "csv" => print_csv(&points)?,
                _ => print_table(&points),
            }
        }

        Commands::Import {
            path,
            timestamp_col,
            value_col,
            entity_col,
            dry_run,
        } => {
            let source = CsvObservationSource::new(&path)
                .with_timestamp_column(&timestamp_col)
                .with_value_column(&value_col)
                .with_entity_column(entity_col.as_deref());
            let observations = source
                .read_all(&config.history.entity_id)
                .with_context(|| format!("reading {}", path.display()))?;

            let complete = observations
                .iter()
                .filter(|o| o.value.is_some() && o.timestamp.is_some())
                .count();
            println!(
                "Read {} rows ({} complete, {} with missing fields)",
                observations.len(),
                complete,
                observations.len() - complete
            );

            if dry_run {
                println!("Dry run, nothing imported");
            } else {
                let store = SqliteDocumentStore::open(&config.history.path, config.history.schema())?;
                let inserted = store.insert_observations(&observations)?;
                println!(
                    "Imported {} rows into {} ({} stored for {})",
                    inserted,
                    config.history.path.display(),
                    store.count(&config.history.entity_id)?,
                    config.history.entity_id
                );
            }
        }

        Commands::Config { .. } => {}
    }

    Ok(())
}

fn open_reader(config: &Config, csv: Option<&PathBuf>) -> anyhow::Result<Arc<dyn SeriesReader>> {
    match csv {
        Some(path) => Ok(Arc::new(CsvObservationSource::new(path))),
        None => {
            let store = SqliteDocumentStore::open(&config.history.path, config.history.schema())
                .with_context(|| format!("opening history store {:?}", config.history.path))?;
            Ok(Arc::new(store))
        }
    }
}

fn parse_now(raw: Option<&str>) -> anyhow::Result<DateTime<Utc>> {
    match raw {
        Some(raw) => parse_instant(raw).map_err(anyhow::Error::msg),
        None => Ok(Utc::now()),
    }
}

fn print_table(points: &[ForecastPointDto]) {
    if points.is_empty() {
        println!("No forecast points");
        return;
    }

    println!(
        "{:<20} {:>12} {:>12} {:>12}",
        "ds", "yhat", "yhat_lower", "yhat_upper"
    );
    println!("{}", "-".repeat(59));
    for p in points {
        println!(
            "{:<20} {:>12.3} {:>12.3} {:>12.3}",
            p.ds, p.yhat, p.yhat_lower, p.yhat_upper
        );
    }
    println!("\n{} points", points.len());
}

fn print_csv(points: &[ForecastPointDto]) -> anyhow::Result<()> {
    let mut writer = csv::Writer::from_writer(std::io::stdout());
    for p in points {
        writer.serialize(p)?;
    }
    writer.flush()?;
    Ok(())
}
