//! Data Transfer Objects
//!
//! Request and response types for the API.

use crate::forecast::ForecastPoint;
use crate::scheduler::ScheduleStatus;
use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Wire format for `ds`, UTC
pub const DS_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// ============================================
// Predict DTOs
// ============================================

/// Query parameters for GET /api/predict
#[derive(Debug, Default, Deserialize)]
pub struct PredictParams {
    /// Only return points after this instant (epoch seconds or RFC 3339)
    pub after: Option<String>,
}

impl PredictParams {
    /// Cutoff for the returned slice. `after` can only move it later than
    /// `now`; an earlier value is clamped so backfill never leaks out.
    pub fn cutoff(&self, now: DateTime<Utc>) -> Result<DateTime<Utc>, String> {
        match self.after.as_deref().map(str::trim) {
            None | Some("") => Ok(now),
            Some(raw) => parse_instant(raw).map(|after| after.max(now)),
        }
    }
}

/// Epoch seconds (fractional allowed) or RFC 3339
pub fn parse_instant(raw: &str) -> Result<DateTime<Utc>, String> {
    if let Ok(secs) = raw.parse::<i64>() {
        return Utc
            .timestamp_opt(secs, 0)
            .single()
            .ok_or_else(|| format!("timestamp out of range: {}", raw));
    }
    if let Ok(secs) = raw.parse::<f64>() {
        if secs.is_finite() {
            let millis = (secs * 1000.0).round() as i64;
            return Utc
                .timestamp_millis_opt(millis)
                .single()
                .ok_or_else(|| format!("timestamp out of range: {}", raw));
        }
    }
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| format!("'after' must be epoch seconds or RFC 3339, got '{}'", raw))
}

/// One forecast point as the consumer expects it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPointDto {
    pub ds: String,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

impl From<&ForecastPoint> for ForecastPointDto {
    fn from(p: &ForecastPoint) -> Self {
        Self {
            ds: p.ds.format(DS_FORMAT).to_string(),
            yhat: p.yhat,
            yhat_lower: p.yhat_lower,
            yhat_upper: p.yhat_upper,
        }
    }
}

// ============================================
// Health DTOs
// ============================================

/// Status of one store in the health report. Failure detail stays in the
/// server log.
#[derive(Debug, Serialize, Deserialize)]
pub struct StoreHealth {
    pub store: String,
    /// "ok" or "error"
    pub status: String,
}

impl StoreHealth {
    pub fn ok(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            status: "ok".to_string(),
        }
    }

    pub fn error(store: impl Into<String>) -> Self {
        Self {
            store: store.into(),
            status: "error".to_string(),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == "ok"
    }
}

/// Response for GET /health
#[derive(Debug, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall status: healthy, degraded, unhealthy
    pub status: String,
    pub stores: Vec<StoreHealth>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scheduler: Option<ScheduleStatus>,
    /// Server uptime in seconds
    pub uptime_seconds: u64,
    /// Application version
    pub version: String,
}
