//! Additive trend + seasonality model
//!
//! `y(t) = (k + a(t)ᵀδ) t + (m - a(t)ᵀ(s ∘ δ)) + Σ fourier(t)ᵀβ`
//!
//! The trend is piecewise linear with changepoints `s` spread over the first
//! `changepoint_range` of the history. Every coefficient is fitted jointly by
//! penalised least squares; the penalty on each slope change `δ` is the
//! Gaussian prior `N(0, changepoint_prior_scale²)`, so a small scale keeps
//! the trend close to a single straight line.
//!
//! Time is rescaled to `[0, 1]` over the history and `y` is divided by
//! `max |y|`, which keeps prior scales comparable across series.
//!
//! Uncertainty combines the in-sample residual variance with trend
//! uncertainty beyond the history: future slope changes arrive at the
//! historical changepoint rate with Laplace magnitudes of mean `|δ|`, whose
//! variance at `t > 1` integrates to `rate · 2λ² · (t - 1)³ / 3`. The result
//! is a closed form, so fits are fully deterministic.

use crate::forecast::error::{ForecastError, ForecastResult};
use crate::forecast::linalg::NormalEquations;
use crate::forecast::seasonality::{resolve_components, Seasonality, SeasonalityToggle};
use crate::forecast::types::{ForecastPoint, TrainingSeries};
use crate::forecast::{FittedModel, Forecaster};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal};

/// Prior scale on the base slope and offset
const TREND_PRIOR_SCALE: f64 = 5.0;
/// Floor on the noise variance used to weight priors
const MIN_NOISE_VARIANCE: f64 = 1e-10;

/// Model configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AdditiveConfig {
    /// Prior scale on slope changes; lower = smoother trend
    pub changepoint_prior_scale: f64,
    /// Maximum number of potential changepoints
    pub n_changepoints: usize,
    /// Fraction of the history in which changepoints may sit
    pub changepoint_range: f64,
    /// Prior scale on Fourier coefficients
    pub seasonality_prior_scale: f64,
    /// Coverage of the uncertainty band, in (0, 1)
    pub interval_width: f64,
    pub daily_seasonality: SeasonalityToggle,
    pub weekly_seasonality: SeasonalityToggle,
    pub yearly_seasonality: SeasonalityToggle,
    /// Smallest series the model will fit
    pub min_points: usize,
}

impl Default for AdditiveConfig {
    fn default() -> Self {
        Self {
            changepoint_prior_scale: 0.05,
            n_changepoints: 25,
            changepoint_range: 0.8,
            seasonality_prior_scale: 10.0,
            interval_width: 0.80,
            daily_seasonality: SeasonalityToggle::Auto,
            weekly_seasonality: SeasonalityToggle::Auto,
            yearly_seasonality: SeasonalityToggle::Auto,
            min_points: 2,
        }
    }
}

impl AdditiveConfig {
    pub fn with_changepoint_prior_scale(mut self, scale: f64) -> Self {
        self.changepoint_prior_scale = scale;
        self
    }

    pub fn with_interval_width(mut self, width: f64) -> Self {
        self.interval_width = width;
        self
    }

    pub fn with_min_points(mut self, min_points: usize) -> Self {
        self.min_points = min_points;
        self
    }

    pub fn validate(&self) -> ForecastResult<()> {
        if !(self.changepoint_prior_scale > 0.0 && self.changepoint_prior_scale.is_finite()) {
            return Err(ForecastError::InvalidParameter(format!(
                "changepoint_prior_scale must be positive, got {}",
                self.changepoint_prior_scale
            )));
        }
        if !(self.seasonality_prior_scale > 0.0 && self.seasonality_prior_scale.is_finite()) {
            return Err(ForecastError::InvalidParameter(format!(
                "seasonality_prior_scale must be positive, got {}",
                self.seasonality_prior_scale
            )));
        }
        if !(self.changepoint_range > 0.0 && self.changepoint_range <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "changepoint_range must be in (0, 1], got {}",
                self.changepoint_range
            )));
        }
        if !(self.interval_width > 0.0 && self.interval_width < 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "interval_width must be in (0, 1), got {}",
                self.interval_width
            )));
        }
        Ok(())
    }
}

/// Additive model factory
#[derive(Debug, Clone, Default)]
pub struct AdditiveModel {
    config: AdditiveConfig,
}

impl AdditiveModel {
    pub fn new(config: AdditiveConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &AdditiveConfig {
        &self.config
    }
}

/// Layout of one design-matrix row: `[m, k, δ_1..δ_c, fourier…]`
#[derive(Debug, Clone)]
struct Design {
    t0: DateTime<Utc>,
    span_secs: f64,
    changepoints: Vec<f64>,
    seasonalities: Vec<Seasonality>,
}

impl Design {
    fn cols(&self) -> usize {
        2 + self.changepoints.len() + self.seasonalities.iter().map(Seasonality::columns).sum::<usize>()
    }

    fn scaled_time(&self, ds: DateTime<Utc>) -> f64 {
        (ds - self.t0).num_milliseconds() as f64 / 1000.0 / self.span_secs
    }

    fn row(&self, ds: DateTime<Utc>, out: &mut Vec<f64>) -> f64 {
        out.clear();
        let t = self.scaled_time(ds);
        out.push(1.0);
        out.push(t);
        for &s in &self.changepoints {
            out.push(if t >= s { t - s } else { 0.0 });
        }
        for season in &self.seasonalities {
            season.push_features(ds, out);
        }
        t
    }

    fn penalty(&self, noise_variance: f64, config: &AdditiveConfig) -> Vec<f64> {
        let trend = noise_variance / (TREND_PRIOR_SCALE * TREND_PRIOR_SCALE);
        let delta = noise_variance / (config.changepoint_prior_scale * config.changepoint_prior_scale);
        let season = noise_variance / (config.seasonality_prior_scale * config.seasonality_prior_scale);

        let mut penalty = vec![trend, trend];
        penalty.extend(std::iter::repeat(delta).take(self.changepoints.len()));
        penalty.resize(self.cols(), season);
        penalty
    }
}

impl Forecaster for AdditiveModel {
    fn name(&self) -> &str {
        "additive"
    }

    fn fit(&self, series: &TrainingSeries) -> ForecastResult<Box<dyn FittedModel>> {
        self.config.validate()?;
        let fitted = FittedAdditive::fit(&self.config, series)?;
        Ok(Box::new(fitted))
    }
}

/// Fitted parameters
#[derive(Debug, Clone)]
pub struct FittedAdditive {
    design: Design,
    beta: Vec<f64>,
    y_scale: f64,
    /// Residual standard deviation in scaled units
    sigma: f64,
    /// Expected slope changes per unit of scaled time
    changepoint_rate: f64,
    /// Mean |δ|, the Laplace scale for future slope changes
    delta_scale: f64,
    z: f64,
}

impl FittedAdditive {
    fn fit(config: &AdditiveConfig, series: &TrainingSeries) -> ForecastResult<Self> {
        let needed = config.min_points.max(2);
        if series.len() < needed {
            return Err(ForecastError::InsufficientData {
                needed,
                got: series.len(),
            });
        }

        let points = series.points();
        let t0 = points[0].ds;
        let span_secs = (points[points.len() - 1].ds - t0).num_milliseconds() as f64 / 1000.0;
        if span_secs <= 0.0 {
            return Err(ForecastError::Degenerate("zero time span".to_string()));
        }

        let (y_min, y_max) = points
            .iter()
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), p| (lo.min(p.y), hi.max(p.y)));
        let y_scale = y_min.abs().max(y_max.abs());
        if y_max - y_min <= y_scale * 1e-12 {
            return Err(ForecastError::Degenerate("constant series".to_string()));
        }

        let changepoints = select_changepoints(series, t0, span_secs, config);
        let min_spacing_days = points
            .windows(2)
            .map(|w| (w[1].ds - w[0].ds).num_seconds() as f64 / 86_400.0)
            .fold(f64::INFINITY, f64::min);
        let seasonalities = resolve_components(
            config.daily_seasonality,
            config.weekly_seasonality,
            config.yearly_seasonality,
            span_secs / 86_400.0,
            min_spacing_days,
        );

        let design = Design {
            t0,
            span_secs,
            changepoints,
            seasonalities,
        };

        let mut ne = NormalEquations::new(design.cols());
        let mut row = Vec::with_capacity(design.cols());
        for p in points {
            design.row(p.ds, &mut row);
            ne.add_row(&row, p.y / y_scale);
        }

        // Pass 1 weights the priors by the raw variance, pass 2 by the
        // residual variance of pass 1.
        let mean = points.iter().map(|p| p.y / y_scale).sum::<f64>() / points.len() as f64;
        let raw_variance = points
            .iter()
            .map(|p| (p.y / y_scale - mean).powi(2))
            .sum::<f64>()
            / points.len() as f64;

        let beta = ne.solve(&design.penalty(raw_variance.max(MIN_NOISE_VARIANCE), config))?;
        let first_pass_variance = residual_variance(&design, &beta, series, y_scale);

        let beta = ne.solve(&design.penalty(first_pass_variance.max(MIN_NOISE_VARIANCE), config))?;
        let variance = residual_variance(&design, &beta, series, y_scale);
        if !variance.is_finite() {
            return Err(ForecastError::Numerical("non-finite residual variance".to_string()));
        }

        let n_delta = design.changepoints.len();
        let delta_scale = if n_delta > 0 {
            beta[2..2 + n_delta].iter().map(|d| d.abs()).sum::<f64>() / n_delta as f64
        } else {
            0.0
        };

        let normal = Normal::new(0.0, 1.0)
            .map_err(|e| ForecastError::Numerical(format!("standard normal: {}", e)))?;
        let z = normal.inverse_cdf(0.5 + config.interval_width / 2.0);

        tracing::debug!(
            points = series.len(),
            columns = design.cols(),
            changepoints = n_delta,
            seasonalities = ?design.seasonalities.iter().map(|s| s.name).collect::<Vec<_>>(),
            sigma = variance.sqrt() * y_scale,
            "Fitted additive model"
        );

        Ok(Self {
            design,
            beta,
            y_scale,
            sigma: variance.sqrt(),
            changepoint_rate: n_delta as f64,
            delta_scale,
            z,
        })
    }

    /// Residual standard deviation in original units
    pub fn residual_std(&self) -> f64 {
        self.sigma * self.y_scale
    }

    /// Names of the fitted seasonal components
    pub fn seasonalities(&self) -> Vec<&'static str> {
        self.design.seasonalities.iter().map(|s| s.name).collect()
    }

    /// Number of trend changepoints
    pub fn changepoint_count(&self) -> usize {
        self.design.changepoints.len()
    }
}

impl FittedModel for FittedAdditive {
    fn predict(&self, timestamps: &[DateTime<Utc>]) -> ForecastResult<Vec<ForecastPoint>> {
        let mut row = Vec::with_capacity(self.design.cols());
        let noise = self.sigma * self.sigma;
        let trend_var_coeff = self.changepoint_rate * 2.0 * self.delta_scale * self.delta_scale / 3.0;

        timestamps
            .iter()
            .map(|&ds| {
                let t = self.design.row(ds, &mut row);
                let yhat = dot(&row, &self.beta);
                let ahead = (t - 1.0).max(0.0);
                let variance = noise + trend_var_coeff * ahead.powi(3);
                let point = ForecastPoint::with_band(
                    ds,
                    yhat * self.y_scale,
                    self.z * variance.sqrt() * self.y_scale,
                );
                if point.is_well_ordered() {
                    Ok(point)
                } else {
                    Err(ForecastError::Numerical(format!(
                        "non-finite prediction at {}",
                        ds
                    )))
                }
            })
            .collect()
    }
}

/// Evenly spaced changepoint candidates over the first
/// `changepoint_range` of the history, in scaled time
fn select_changepoints(
    series: &TrainingSeries,
    t0: DateTime<Utc>,
    span_secs: f64,
    config: &AdditiveConfig,
) -> Vec<f64> {
    let n = series.len();
    let hist_size = (n as f64 * config.changepoint_range).floor() as usize;
    let count = config.n_changepoints.min(hist_size.saturating_sub(1));
    if count == 0 {
        return Vec::new();
    }

    let points = series.points();
    let last_idx = (hist_size - 1) as f64;
    let mut changepoints: Vec<f64> = (1..=count)
        .map(|i| {
            let idx = (i as f64 * last_idx / count as f64).round() as usize;
            (points[idx].ds - t0).num_milliseconds() as f64 / 1000.0 / span_secs
        })
        .collect();
    changepoints.dedup();
    changepoints
}

fn residual_variance(design: &Design, beta: &[f64], series: &TrainingSeries, y_scale: f64) -> f64 {
    let mut row = Vec::with_capacity(design.cols());
    let sum_sq: f64 = series
        .points()
        .iter()
        .map(|p| {
            design.row(p.ds, &mut row);
            (p.y / y_scale - dot(&row, beta)).powi(2)
        })
        .sum();
    sum_sq / series.len() as f64
}

fn dot(a: &[f64], b: &[f64]) -> f64 {
    a.iter().zip(b).map(|(x, y)| x * y).sum()
}
