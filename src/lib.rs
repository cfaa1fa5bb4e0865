//! # Flowcast
//!
//! Rolling short-horizon forecasts of a single sensor's flow, computed from
//! historical readings and served over HTTP.
//!
//! ## Features
//!
//! - **Windowed training**: trailing or year-shifted windows that always end now
//! - **Additive model**: piecewise-linear trend with Fourier seasonality and
//!   uncertainty bands, fitted in closed form
//! - **Incremental persistence**: append only forecast points newer than the
//!   stored maximum, atomically
//! - **HTTP gateway**: authenticated `GET /api/predict` returning the future slice
//!
//! ## Modules
//!
//! - [`storage`]: History readers and the results store
//! - [`pipeline`]: Window preparation, run orchestration and the incremental writer
//! - [`forecast`]: Forecasting interface and the additive model
//! - [`scheduler`]: Periodic train-and-write job
//! - [`api`]: REST API server with Axum
//! - [`config`]: TOML + environment configuration and logging setup
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use chrono::Utc;
//! use flowcast::config::Config;
//! use flowcast::pipeline::{IncrementalWriter, Pipeline};
//! use flowcast::storage::{DocumentSchema, SqliteDocumentStore, SqliteResultsStore};
//! use std::sync::Arc;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load_default();
//!
//!     let history = Arc::new(SqliteDocumentStore::open(&config.history.path, DocumentSchema::default())?);
//!     let results = Arc::new(SqliteResultsStore::open(&config.results.path, &config.results.table)?);
//!
//!     let pipeline = Pipeline::from_config(&config, history)?;
//!     let outcome = pipeline.train(Utc::now(), &IncrementalWriter::new(results))?;
//!
//!     println!("Wrote {} new forecast rows", outcome.written);
//!     Ok(())
//! }
//! ```

pub mod api;
pub mod config;
pub mod forecast;
pub mod pipeline;
pub mod scheduler;
pub mod storage;

// Re-export top-level types for convenience
pub use storage::{
    CsvObservationSource, DocumentSchema, Observation, ResultRow, ResultsStore, SeriesReader,
    SqliteDocumentStore, SqliteResultsStore, StoreError, StoreProbe, StoreResult,
};

pub use forecast::{
    fit_and_predict, AdditiveConfig, AdditiveModel, FittedModel, ForecastError, ForecastPoint,
    Forecaster, SeriesPoint, TrainingSeries,
};

pub use pipeline::{
    Forecast, IncrementalWriter, Pipeline, PipelineError, PipelineResult, PipelineSettings,
    PipelineStage, TrainOutcome, WindowPolicy, WindowPreparer,
};

pub use api::{build_router, serve, ApiError, AppState};

pub use config::{init_logging, Config, ConfigError, LoggingConfig};

pub use scheduler::{RunStatus, ScheduleStatus, SchedulerError, TrainingScheduler};
