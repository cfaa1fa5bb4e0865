//! Forecast engine
//!
//! A [`Forecaster`] fits a [`TrainingSeries`] into a [`FittedModel`], which
//! evaluates the model at arbitrary timestamps. [`fit_and_predict`] is the
//! engine's main entry point: one fit, then predictions for every training
//! timestamp followed by `horizon_points` future steps.

pub mod additive;
pub mod error;
pub mod linalg;
pub mod seasonality;
pub mod types;

pub use additive::{AdditiveConfig, AdditiveModel, FittedAdditive};
pub use error::{ForecastError, ForecastResult};
pub use seasonality::{Seasonality, SeasonalityToggle};
pub use types::{ForecastPoint, SeriesPoint, TrainingSeries};

use chrono::{DateTime, Duration, Utc};

/// Fits a model to a training series
pub trait Forecaster: Send + Sync {
    /// Short model name for logs
    fn name(&self) -> &str;

    fn fit(&self, series: &TrainingSeries) -> ForecastResult<Box<dyn FittedModel>>;
}

/// A fitted model, evaluated at arbitrary instants
pub trait FittedModel: Send + Sync {
    fn predict(&self, timestamps: &[DateTime<Utc>]) -> ForecastResult<Vec<ForecastPoint>>;
}

/// Training timestamps followed by `horizon_points` steps of
/// `sampling_interval` after the last one
pub fn forecast_timestamps(
    series: &TrainingSeries,
    horizon_points: usize,
    sampling_interval: Duration,
) -> Vec<DateTime<Utc>> {
    let mut timestamps = series.timestamps();
    if let Some(last) = series.last().map(|p| p.ds) {
        timestamps.reserve(horizon_points);
        let mut next = last;
        for _ in 0..horizon_points {
            next = next + sampling_interval;
            timestamps.push(next);
        }
    }
    timestamps
}

/// Reject a grid step that would repeat or reverse timestamps
pub fn check_sampling_interval(sampling_interval: Duration) -> ForecastResult<()> {
    if sampling_interval <= Duration::zero() {
        return Err(ForecastError::InvalidParameter(format!(
            "sampling interval must be positive, got {}s",
            sampling_interval.num_seconds()
        )));
    }
    Ok(())
}

/// Fit once and predict over the full timestamp grid
pub fn fit_and_predict(
    forecaster: &dyn Forecaster,
    series: &TrainingSeries,
    horizon_points: usize,
    sampling_interval: Duration,
) -> ForecastResult<Vec<ForecastPoint>> {
    check_sampling_interval(sampling_interval)?;
    if series.is_empty() {
        return Err(ForecastError::InsufficientData { needed: 2, got: 0 });
    }

    let fitted = forecaster.fit(series)?;
    let timestamps = forecast_timestamps(series, horizon_points, sampling_interval);
    fitted.predict(&timestamps)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    /// Predicts the training mean everywhere with a unit band
    struct MeanModel;

    struct FittedMean(f64);

    impl Forecaster for MeanModel {
        fn name(&self) -> &str {
            "mean"
        }

        fn fit(&self, series: &TrainingSeries) -> ForecastResult<Box<dyn FittedModel>> {
            let mean = series.values().iter().sum::<f64>() / series.len() as f64;
            Ok(Box::new(FittedMean(mean)))
        }
    }

    impl FittedModel for FittedMean {
        fn predict(&self, timestamps: &[DateTime<Utc>]) -> ForecastResult<Vec<ForecastPoint>> {
            Ok(timestamps
                .iter()
                .map(|&ds| ForecastPoint::with_band(ds, self.0, 1.0))
                .collect())
        }
    }

    fn series(n: i64) -> TrainingSeries {
        TrainingSeries::new((0..n).map(|i| SeriesPoint::new(at(i * 60), i as f64)).collect()).unwrap()
    }

    #[test]
    fn test_timestamp_grid() {
        let grid = forecast_timestamps(&series(3), 2, Duration::minutes(5));
        assert_eq!(grid, vec![at(0), at(60), at(120), at(420), at(720)]);
    }

    #[test]
    fn test_fit_and_predict_length_and_order() {
        let out = fit_and_predict(&MeanModel, &series(10), 4, Duration::minutes(5)).unwrap();
        assert_eq!(out.len(), 14);
        assert!(out.windows(2).all(|w| w[0].ds < w[1].ds));
        assert!(out.iter().all(|p| p.yhat == 4.5));
    }

    #[test]
    fn test_rejects_non_positive_interval() {
        let result = fit_and_predict(&MeanModel, &series(10), 4, Duration::zero());
        assert!(matches!(result, Err(ForecastError::InvalidParameter(_))));
        assert!(check_sampling_interval(Duration::seconds(-300)).is_err());
        assert!(check_sampling_interval(Duration::seconds(1)).is_ok());
    }

    #[test]
    fn test_empty_series() {
        let empty = TrainingSeries::default();
        assert!(matches!(
            fit_and_predict(&MeanModel, &empty, 4, Duration::minutes(5)),
            Err(ForecastError::InsufficientData { .. })
        ));
    }
}
