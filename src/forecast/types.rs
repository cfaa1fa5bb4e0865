//! Series and forecast data types
//!
//! - `TrainingSeries`: strictly increasing `(ds, y)` pairs fed to a model
//! - `ForecastPoint`: central estimate plus uncertainty band at one instant

use crate::forecast::error::{ForecastError, ForecastResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One training sample in canonical schema
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub ds: DateTime<Utc>,
    pub y: f64,
}

impl SeriesPoint {
    pub fn new(ds: DateTime<Utc>, y: f64) -> Self {
        Self { ds, y }
    }
}

/// Ordered training window
///
/// Invariants (checked on construction): `ds` strictly increasing and every
/// `y` finite.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TrainingSeries {
    points: Vec<SeriesPoint>,
}

impl TrainingSeries {
    /// Build a series, rejecting unordered, duplicate or non-finite points
    pub fn new(points: Vec<SeriesPoint>) -> ForecastResult<Self> {
        if let Some(bad) = points.iter().find(|p| !p.y.is_finite()) {
            return Err(ForecastError::Degenerate(format!(
                "non-finite value at {}",
                bad.ds
            )));
        }
        if let Some(pair) = points.windows(2).find(|w| w[0].ds >= w[1].ds) {
            return Err(ForecastError::Degenerate(format!(
                "timestamps not strictly increasing at {}",
                pair[1].ds
            )));
        }
        Ok(Self { points })
    }

    pub fn points(&self) -> &[SeriesPoint] {
        &self.points
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn first(&self) -> Option<&SeriesPoint> {
        self.points.first()
    }

    pub fn last(&self) -> Option<&SeriesPoint> {
        self.points.last()
    }

    pub fn timestamps(&self) -> Vec<DateTime<Utc>> {
        self.points.iter().map(|p| p.ds).collect()
    }

    pub fn values(&self) -> Vec<f64> {
        self.points.iter().map(|p| p.y).collect()
    }
}

/// Model output at one instant
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub ds: DateTime<Utc>,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

impl ForecastPoint {
    /// Point with a symmetric band of `half_width` around `yhat`
    pub fn with_band(ds: DateTime<Utc>, yhat: f64, half_width: f64) -> Self {
        let half_width = half_width.abs();
        Self {
            ds,
            yhat,
            yhat_lower: yhat - half_width,
            yhat_upper: yhat + half_width,
        }
    }

    /// `yhat_lower <= yhat <= yhat_upper` with finite values
    pub fn is_well_ordered(&self) -> bool {
        self.yhat.is_finite()
            && self.yhat_lower.is_finite()
            && self.yhat_upper.is_finite()
            && self.yhat_lower <= self.yhat
            && self.yhat <= self.yhat_upper
    }
}
