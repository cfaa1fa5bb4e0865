//! Incremental persistence of forecast values

use crate::forecast::ForecastPoint;
use crate::pipeline::error::{PipelineError, PipelineResult};
use crate::storage::{ResultRow, ResultsStore};
use std::sync::Arc;

/// Appends forecast points newer than anything already stored
pub struct IncrementalWriter {
    store: Arc<dyn ResultsStore>,
}

impl IncrementalWriter {
    pub fn new(store: Arc<dyn ResultsStore>) -> Self {
        Self { store }
    }

    /// Persist the points whose epoch-second `ds` is strictly greater than
    /// the stored maximum. Returns the number of rows inserted, which is 0
    /// when the same forecast is written twice.
    pub fn write_new(&self, points: &[ForecastPoint]) -> PipelineResult<usize> {
        let written = self
            .store
            .append_after_max(&|max: Option<i64>| select_new_rows(points, max))
            .map_err(PipelineError::WriteError)?;

        tracing::info!(
            candidates = points.len(),
            written = written,
            "Wrote forecast rows"
        );
        Ok(written)
    }
}

/// Rows for points strictly after `max` (every point when `max` is `None`).
///
/// Timestamps truncate to whole seconds; when two points land in the same
/// second only the first is kept.
pub fn select_new_rows(points: &[ForecastPoint], max: Option<i64>) -> Vec<ResultRow> {
    let mut last = max;
    let mut rows = Vec::new();
    for point in points {
        let ts = point.ds.timestamp();
        if last.map_or(true, |m| ts > m) {
            rows.push(ResultRow::new(ts, point.yhat));
            last = Some(ts);
        }
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SqliteResultsStore, StoreError, StoreResult};
    use chrono::{DateTime, TimeZone, Utc};

    fn at(secs: i64) -> DateTime<Utc> {
        Utc.timestamp_opt(secs, 0).unwrap()
    }

    fn forecast(range: std::ops::RangeInclusive<i64>) -> Vec<ForecastPoint> {
        range
            .map(|i| ForecastPoint::with_band(at(i * 300), i as f64, 1.0))
            .collect()
    }

    fn store() -> Arc<SqliteResultsStore> {
        Arc::new(SqliteResultsStore::in_memory("forecasting").unwrap())
    }

    #[test]
    fn test_select_strictly_after_max() {
        let points = forecast(1..=10);
        assert_eq!(select_new_rows(&points, None).len(), 10);

        let rows = select_new_rows(&points, Some(5 * 300));
        assert_eq!(rows.first().unwrap().timestamp, 6 * 300);
        assert_eq!(rows.len(), 5);
        assert_eq!(rows[0].value, 6.0);
    }

    #[test]
    fn test_sub_second_points_collapse() {
        let base = at(1_000);
        let points = vec![
            ForecastPoint::with_band(base, 1.0, 0.0),
            ForecastPoint::with_band(base + chrono::Duration::milliseconds(500), 2.0, 0.0),
            ForecastPoint::with_band(base + chrono::Duration::seconds(1), 3.0, 0.0),
        ];
        let rows = select_new_rows(&points, None);
        assert_eq!(rows, vec![ResultRow::new(1_000, 1.0), ResultRow::new(1_001, 3.0)]);
    }

    #[test]
    fn test_write_twice_is_idempotent() {
        let store = store();
        let writer = IncrementalWriter::new(store.clone());
        let points = forecast(1..=20);

        assert_eq!(writer.write_new(&points).unwrap(), 20);
        assert_eq!(writer.write_new(&points).unwrap(), 0);
        assert_eq!(store.row_count().unwrap(), 20);
    }

    #[test]
    fn test_store_at_forecast_max_writes_nothing() {
        let store = store();
        store
            .append_after_max(&|_: Option<i64>| -> Vec<ResultRow> { vec![ResultRow::new(10 * 300, 0.0)] })
            .unwrap();

        let writer = IncrementalWriter::new(store.clone());
        assert_eq!(writer.write_new(&forecast(1..=10)).unwrap(), 0);
        assert_eq!(store.max_timestamp().unwrap(), Some(10 * 300));
    }

    #[test]
    fn test_store_failure_is_write_error() {
        struct Broken;

        impl ResultsStore for Broken {
            fn max_timestamp(&self) -> StoreResult<Option<i64>> {
                Err(StoreError::Unavailable("locked".into()))
            }

            fn append_after_max(
                &self,
                _select: &dyn Fn(Option<i64>) -> Vec<ResultRow>,
            ) -> StoreResult<usize> {
                Err(StoreError::Unavailable("locked".into()))
            }
        }

        let err = IncrementalWriter::new(Arc::new(Broken))
            .write_new(&forecast(1..=3))
            .unwrap_err();
        assert!(matches!(err, PipelineError::WriteError(_)));
        assert!(err.is_retriable());
    }
}
