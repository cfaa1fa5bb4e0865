//! Forecast pipeline
//!
//! One run goes Reader → Preparer → Engine and yields a [`Forecast`]; the
//! caller either filters it to the future (gateway) or hands it to the
//! [`IncrementalWriter`] (scheduled training).
//!
//! ```text
//! Idle → Reading → Preparing → Fitting → Predicting → [Writing] → Done
//!                                                         ↘ Failed(stage)
//! ```
//!
//! Runs are synchronous and share nothing but the stores, so any number can
//! execute concurrently on blocking worker threads.

pub mod error;
pub mod window;
pub mod writer;

pub use error::{PipelineError, PipelineResult};
pub use window::{WindowPolicy, WindowPreparer};
pub use writer::{select_new_rows, IncrementalWriter};

use crate::config::Config;
use crate::forecast::{
    check_sampling_interval, forecast_timestamps, AdditiveModel, ForecastPoint, ForecastResult,
    Forecaster,
};
use crate::storage::SeriesReader;
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Where a run is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Idle,
    Reading,
    Preparing,
    Fitting,
    Predicting,
    Writing,
    Done,
    Failed,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PipelineStage::Idle => "idle",
            PipelineStage::Reading => "reading",
            PipelineStage::Preparing => "preparing",
            PipelineStage::Fitting => "fitting",
            PipelineStage::Predicting => "predicting",
            PipelineStage::Writing => "writing",
            PipelineStage::Done => "done",
            PipelineStage::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Stage bookkeeping for one run
struct StageTracker {
    entity_id: String,
    stage: PipelineStage,
}

impl StageTracker {
    fn new(entity_id: &str) -> Self {
        Self {
            entity_id: entity_id.to_string(),
            stage: PipelineStage::Idle,
        }
    }

    fn enter(&mut self, next: PipelineStage) {
        tracing::debug!(entity = %self.entity_id, from = %self.stage, to = %next, "Pipeline stage");
        self.stage = next;
    }

    fn finish<T>(mut self, result: PipelineResult<T>) -> PipelineResult<T> {
        match &result {
            Ok(_) => self.enter(PipelineStage::Done),
            Err(e) => {
                tracing::debug!(
                    entity = %self.entity_id,
                    stage = %self.stage,
                    error = %e,
                    "Pipeline run failed"
                );
                self.stage = PipelineStage::Failed;
            }
        }
        result
    }
}

/// Run parameters that are not part of windowing or the model
#[derive(Debug, Clone)]
pub struct PipelineSettings {
    entity_id: String,
    horizon_points: usize,
    sampling_interval: Duration,
}

impl PipelineSettings {
    /// Fails when `sampling_interval` is not positive
    pub fn new(
        entity_id: impl Into<String>,
        horizon_points: usize,
        sampling_interval: Duration,
    ) -> ForecastResult<Self> {
        check_sampling_interval(sampling_interval)?;
        Ok(Self {
            entity_id: entity_id.into(),
            horizon_points,
            sampling_interval,
        })
    }
}

/// Output of one run
#[derive(Debug, Clone, PartialEq)]
pub struct Forecast {
    /// Instant the run treated as now
    pub generated_at: DateTime<Utc>,
    /// Number of training points, equal to the number of backfill points
    pub history_len: usize,
    /// Backfill followed by the horizon, ascending by `ds`
    pub points: Vec<ForecastPoint>,
}

impl Forecast {
    /// Points strictly after `cutoff`
    pub fn future_after(&self, cutoff: DateTime<Utc>) -> &[ForecastPoint] {
        let start = self.points.partition_point(|p| p.ds <= cutoff);
        &self.points[start..]
    }

    /// Points at training timestamps
    pub fn backfill(&self) -> &[ForecastPoint] {
        &self.points[..self.history_len.min(self.points.len())]
    }

    /// Points after the last training timestamp
    pub fn horizon(&self) -> &[ForecastPoint] {
        &self.points[self.history_len.min(self.points.len())..]
    }
}

/// Summary of a run that also persisted its horizon
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TrainOutcome {
    pub history_len: usize,
    pub forecast_len: usize,
    pub written: usize,
}

/// Reader → Preparer → Engine
pub struct Pipeline {
    reader: Arc<dyn SeriesReader>,
    preparer: WindowPreparer,
    forecaster: Arc<dyn Forecaster>,
    settings: PipelineSettings,
}

impl Pipeline {
    pub fn new(
        reader: Arc<dyn SeriesReader>,
        preparer: WindowPreparer,
        forecaster: Arc<dyn Forecaster>,
        settings: PipelineSettings,
    ) -> Self {
        Self {
            reader,
            preparer,
            forecaster,
            settings,
        }
    }

    /// Pipeline with the additive model, configured from `config`
    pub fn from_config(config: &Config, reader: Arc<dyn SeriesReader>) -> ForecastResult<Self> {
        let preparer = WindowPreparer::new(config.window.policy, config.window.min_points);
        let model = AdditiveModel::new(config.forecast.model_config(config.window.min_points));
        let settings = PipelineSettings::new(
            config.history.entity_id.clone(),
            config.forecast.horizon_points,
            config.forecast.sampling_interval(),
        )?;
        Ok(Self::new(reader, preparer, Arc::new(model), settings))
    }

    /// Produce a forecast treating `now` as the current instant
    pub fn run(&self, now: DateTime<Utc>) -> PipelineResult<Forecast> {
        let mut tracker = StageTracker::new(&self.settings.entity_id);
        let result = self.run_stages(now, &mut tracker);
        tracker.finish(result)
    }

    /// Run, then append the new part of the forecast to the results store
    pub fn train(&self, now: DateTime<Utc>, writer: &IncrementalWriter) -> PipelineResult<TrainOutcome> {
        let mut tracker = StageTracker::new(&self.settings.entity_id);
        let result = self.run_stages(now, &mut tracker).and_then(|forecast| {
            tracker.enter(PipelineStage::Writing);
            let written = writer.write_new(&forecast.points)?;
            Ok(TrainOutcome {
                history_len: forecast.history_len,
                forecast_len: forecast.points.len(),
                written,
            })
        });
        tracker.finish(result)
    }

    fn run_stages(&self, now: DateTime<Utc>, tracker: &mut StageTracker) -> PipelineResult<Forecast> {
        let entity = &self.settings.entity_id;

        tracker.enter(PipelineStage::Reading);
        let bound = self.preparer.policy().read_lower_bound(now);
        let observations = self
            .reader
            .read(entity, bound)
            .map_err(PipelineError::StoreUnavailable)?;

        tracker.enter(PipelineStage::Preparing);
        let series = self.preparer.prepare(&observations, now)?;

        tracker.enter(PipelineStage::Fitting);
        let fitted = self
            .forecaster
            .fit(&series)
            .map_err(|e| PipelineError::fit(PipelineStage::Fitting, e))?;

        tracker.enter(PipelineStage::Predicting);
        let timestamps = forecast_timestamps(
            &series,
            self.settings.horizon_points,
            self.settings.sampling_interval,
        );
        let points = fitted
            .predict(&timestamps)
            .map_err(|e| PipelineError::fit(PipelineStage::Predicting, e))?;

        tracing::info!(
            entity = %entity,
            model = self.forecaster.name(),
            observations = observations.len(),
            history = series.len(),
            forecast = points.len(),
            "Forecast produced"
        );

        Ok(Forecast {
            generated_at: now,
            history_len: series.len(),
            points,
        })
    }
}
