//! Window preparation
//!
//! Turns raw observations into a clean training series: drop incomplete
//! readings, select the window the policy describes, re-anchor it so it ends
//! at `now`, deduplicate and sort.

use crate::forecast::{SeriesPoint, TrainingSeries};
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::pipeline::PipelineStage;
use crate::storage::Observation;
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

/// Which slice of history to train on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum WindowPolicy {
    /// The last `days` before now
    Trailing { days: u32 },
    /// `days` of history starting `offset_days` ago, shifted forward so the
    /// window ends at now
    ShiftedHistorical { days: u32, offset_days: u32 },
}

impl Default for WindowPolicy {
    fn default() -> Self {
        WindowPolicy::Trailing { days: 14 }
    }
}

impl WindowPolicy {
    /// `[start, end)` of the selected history, before shifting. The end
    /// never passes `now`, whatever the policy.
    pub fn source_range(&self, now: DateTime<Utc>) -> (DateTime<Utc>, DateTime<Utc>) {
        match *self {
            WindowPolicy::Trailing { days } => (now - Duration::days(days as i64), now),
            WindowPolicy::ShiftedHistorical { days, offset_days } => {
                let start = now - Duration::days(offset_days as i64);
                (start, (start + Duration::days(days as i64)).min(now))
            }
        }
    }

    /// Amount added to every kept timestamp
    pub fn shift(&self) -> Duration {
        match *self {
            WindowPolicy::Trailing { .. } => Duration::zero(),
            WindowPolicy::ShiftedHistorical { days, offset_days } => {
                Duration::days(offset_days as i64 - days as i64)
            }
        }
    }

    /// Inclusive epoch-second bound for the series reader
    pub fn read_lower_bound(&self, now: DateTime<Utc>) -> i64 {
        self.source_range(now).0.timestamp()
    }

    pub fn validate(&self) -> Result<(), String> {
        match *self {
            WindowPolicy::Trailing { days } if days == 0 => {
                Err("trailing window needs at least one day".to_string())
            }
            WindowPolicy::ShiftedHistorical { days, .. } if days == 0 => {
                Err("shifted window needs at least one day".to_string())
            }
            WindowPolicy::ShiftedHistorical { days, offset_days } if offset_days < days => Err(format!(
                "offset_days ({}) must be at least days ({})",
                offset_days, days
            )),
            _ => Ok(()),
        }
    }
}

/// Applies a [`WindowPolicy`] and a minimum size to raw observations
#[derive(Debug, Clone)]
pub struct WindowPreparer {
    policy: WindowPolicy,
    min_points: usize,
}

impl WindowPreparer {
    pub fn new(policy: WindowPolicy, min_points: usize) -> Self {
        Self { policy, min_points }
    }

    pub fn policy(&self) -> &WindowPolicy {
        &self.policy
    }

    /// Build the training series for a run at `now`.
    ///
    /// The result never contains a point at or after `now` and never two
    /// points with the same `ds`.
    pub fn prepare(
        &self,
        observations: &[Observation],
        now: DateTime<Utc>,
    ) -> PipelineResult<TrainingSeries> {
        let (start, end) = self.policy.source_range(now);
        let shift = self.policy.shift();

        let mut seen = HashSet::with_capacity(observations.len());
        let mut points = Vec::with_capacity(observations.len());
        let mut incomplete = 0usize;

        for obs in observations {
            let (value, ts) = match (obs.value, obs.timestamp.and_then(epoch_to_instant)) {
                (Some(v), Some(ts)) if v.is_finite() => (v, ts),
                _ => {
                    incomplete += 1;
                    continue;
                }
            };

            if ts < start || ts >= end {
                continue;
            }
            let ds = ts + shift;
            if ds >= now {
                continue;
            }
            if seen.insert(ds) {
                points.push(SeriesPoint::new(ds, value));
            }
        }

        points.sort_by_key(|p| p.ds);

        tracing::debug!(
            observations = observations.len(),
            incomplete = incomplete,
            kept = points.len(),
            window_start = %start,
            window_end = %end,
            "Prepared training window"
        );

        if points.len() < self.min_points {
            return Err(PipelineError::InsufficientData {
                count: points.len(),
                minimum: self.min_points,
            });
        }

        TrainingSeries::new(points).map_err(|e| PipelineError::fit(PipelineStage::Preparing, e))
    }
}

/// Fractional epoch seconds to an instant, `None` when out of range
fn epoch_to_instant(secs: f64) -> Option<DateTime<Utc>> {
    if !secs.is_finite() {
        return None;
    }
    let whole = secs.floor();
    let nanos = (((secs - whole) * 1e9).round() as u32).min(999_999_999);
    if whole < i64::MIN as f64 || whole > i64::MAX as f64 {
        return None;
    }
    Utc.timestamp_opt(whole as i64, nanos).single()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn now() -> DateTime<Utc> {
        Utc.timestamp_opt(1_700_000_000, 0).unwrap()
    }

    fn obs(value: Option<f64>, ts: Option<f64>) -> Observation {
        Observation::new("DMC012", value, ts)
    }

    fn reading(value: f64, ts: i64) -> Observation {
        Observation::reading("DMC012", value, ts)
    }

    /// Deterministic scatter of timestamps around the window edges
    fn scattered(now: i64, count: usize) -> Vec<Observation> {
        let mut state: u64 = 0x9E37_79B9_7F4A_7C15;
        (0..count)
            .map(|i| {
                state ^= state << 13;
                state ^= state >> 7;
                state ^= state << 17;
                // ±20 days around now, with frequent exact collisions
                let offset = (state % (40 * 86_400)) as i64 - 20 * 86_400;
                let ts = if i % 5 == 0 { now - 3_600 } else { now + offset };
                reading(i as f64, ts)
            })
            .collect()
    }

    #[test]
    fn test_never_returns_future_or_duplicates() {
        let policies = [
            WindowPolicy::Trailing { days: 14 },
            WindowPolicy::Trailing { days: 1 },
            WindowPolicy::ShiftedHistorical { days: 14, offset_days: 14 },
            WindowPolicy::ShiftedHistorical { days: 7, offset_days: 10 },
        ];

        for policy in policies {
            let preparer = WindowPreparer::new(policy, 0);
            let series = preparer.prepare(&scattered(now().timestamp(), 2_000), now()).unwrap();

            assert!(series.points().iter().all(|p| p.ds < now()), "{:?}", policy);
            assert!(series.points().windows(2).all(|w| w[0].ds < w[1].ds), "{:?}", policy);
        }
    }

    #[test]
    fn test_drops_incomplete_observations() {
        let t = now().timestamp();
        let observations = vec![
            obs(None, Some((t - 60) as f64)),
            obs(Some(1.0), None),
            obs(Some(f64::NAN), Some((t - 120) as f64)),
            obs(Some(2.0), Some(f64::INFINITY)),
            reading(3.0, t - 180),
        ];

        let series = WindowPreparer::new(WindowPolicy::default(), 1)
            .prepare(&observations, now())
            .unwrap();
        assert_eq!(series.values(), vec![3.0]);
    }

    #[test]
    fn test_trailing_window_bounds() {
        let t = now().timestamp();
        let day = 86_400;
        let observations = vec![
            reading(1.0, t - 14 * day - 1), // just outside
            reading(2.0, t - 14 * day),     // inclusive lower bound
            reading(3.0, t - 1),
            reading(4.0, t), // ds == now is excluded
        ];

        let series = WindowPreparer::new(WindowPolicy::Trailing { days: 14 }, 1)
            .prepare(&observations, now())
            .unwrap();
        assert_eq!(series.values(), vec![2.0, 3.0]);
    }

    #[test]
    fn test_shifted_window_ends_at_now() {
        let t = now().timestamp();
        let day = 86_400;
        let policy = WindowPolicy::ShiftedHistorical { days: 14, offset_days: 365 };
        let observations = vec![
            reading(1.0, t - 365 * day),          // window start
            reading(2.0, t - 351 * day - 60),     // last minute of the window
            reading(3.0, t - 351 * day),          // window end, excluded
            reading(4.0, t - 60),                 // recent, outside the historical slice
        ];

        let series = WindowPreparer::new(policy, 1).prepare(&observations, now()).unwrap();
        assert_eq!(series.values(), vec![1.0, 2.0]);
        assert_eq!(series.first().unwrap().ds, now() - Duration::days(14));
        assert_eq!(series.last().unwrap().ds, now() - Duration::seconds(60));
        assert_eq!(policy.read_lower_bound(now()), t - 365 * day);
    }

    #[test]
    fn test_short_offset_never_reads_past_now() {
        let t = now().timestamp();
        let hour = 3_600;
        let policy = WindowPolicy::ShiftedHistorical { days: 14, offset_days: 7 };
        let mut observations: Vec<_> = (1..=20).map(|i| reading(i as f64, t + i * hour)).collect();

        assert_eq!(policy.source_range(now()).1, now());
        let err = WindowPreparer::new(policy, 1)
            .prepare(&observations, now())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { count: 0, .. }));

        // Past readings inside the capped range are still used
        observations.push(reading(100.0, t - 3 * 86_400));
        let series = WindowPreparer::new(policy, 1).prepare(&observations, now()).unwrap();
        assert_eq!(series.values(), vec![100.0]);
        assert!(series.points().iter().all(|p| p.ds < now()));
    }

    #[test]
    fn test_first_duplicate_wins_then_sorted() {
        let t = now().timestamp();
        let observations = vec![
            reading(10.0, t - 60),
            reading(20.0, t - 120),
            reading(11.0, t - 60),
        ];

        let series = WindowPreparer::new(WindowPolicy::default(), 1)
            .prepare(&observations, now())
            .unwrap();
        assert_eq!(series.values(), vec![20.0, 10.0]);
    }

    #[test]
    fn test_min_points_boundary() {
        let t = now().timestamp();
        let observations: Vec<_> = (1..=5).map(|i| reading(i as f64, t - i * 60)).collect();

        assert!(WindowPreparer::new(WindowPolicy::default(), 5)
            .prepare(&observations, now())
            .is_ok());

        let err = WindowPreparer::new(WindowPolicy::default(), 6)
            .prepare(&observations, now())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { count: 5, minimum: 6 }));
    }

    #[test]
    fn test_empty_input_cites_zero() {
        let err = WindowPreparer::new(WindowPolicy::default(), 2)
            .prepare(&[], now())
            .unwrap_err();
        assert!(matches!(err, PipelineError::InsufficientData { count: 0, minimum: 2 }));
    }

    #[test]
    fn test_fractional_timestamps() {
        let ts = epoch_to_instant(1_700_000_000.25).unwrap();
        assert_eq!(ts.timestamp(), 1_700_000_000);
        assert_eq!(ts.timestamp_subsec_millis(), 250);
        assert!(epoch_to_instant(f64::NAN).is_none());
        assert!(epoch_to_instant(1e300).is_none());
    }

    #[test]
    fn test_policy_validation_and_serde() {
        assert!(WindowPolicy::Trailing { days: 0 }.validate().is_err());
        assert!(WindowPolicy::ShiftedHistorical { days: 14, offset_days: 7 }.validate().is_err());
        assert!(WindowPolicy::ShiftedHistorical { days: 14, offset_days: 365 }.validate().is_ok());

        let policy: WindowPolicy =
            serde_json::from_str(r#"{"kind":"shifted_historical","days":14,"offset_days":365}"#).unwrap();
        assert_eq!(policy, WindowPolicy::ShiftedHistorical { days: 14, offset_days: 365 });
    }
}
