//! CSV Observation Source
//!
//! Reads a flattened export of sensor messages, one message per row, with
//! dotted column names (`timestamp`, `data.raw_cur_flow`, `info.id_node`).
//! Rows with empty or unparseable cells are kept as observations with the
//! missing field set to `None`.

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::Observation;
use crate::storage::SeriesReader;
use std::path::{Path, PathBuf};

/// CSV file reader with configurable column names
#[derive(Debug, Clone)]
pub struct CsvObservationSource {
    path: PathBuf,
    timestamp_column: String,
    value_column: String,
    /// When absent every row belongs to the requested entity
    entity_column: Option<String>,
}

impl CsvObservationSource {
    /// Create a source using the default column names
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            timestamp_column: "timestamp".to_string(),
            value_column: "data.raw_cur_flow".to_string(),
            entity_column: Some("info.id_node".to_string()),
        }
    }

    pub fn with_timestamp_column(mut self, column: &str) -> Self {
        self.timestamp_column = column.to_string();
        self
    }

    pub fn with_value_column(mut self, column: &str) -> Self {
        self.value_column = column.to_string();
        self
    }

    pub fn with_entity_column(mut self, column: Option<&str>) -> Self {
        self.entity_column = column.map(str::to_string);
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every row of the file
    ///
    /// `default_entity` is used for rows when the file has no entity column.
    pub fn read_all(&self, default_entity: &str) -> StoreResult<Vec<Observation>> {
        let mut reader = csv::Reader::from_path(&self.path).map_err(|e| {
            if matches!(e.kind(), csv::ErrorKind::Io(_)) {
                StoreError::Unavailable(format!("cannot open {}: {}", self.path.display(), e))
            } else {
                StoreError::Csv(e)
            }
        })?;

        let headers = reader.headers()?.clone();
        let find = |name: &str| headers.iter().position(|h| h.trim() == name);

        let ts_idx = find(&self.timestamp_column).ok_or_else(|| {
            StoreError::InvalidData(format!("missing column '{}'", self.timestamp_column))
        })?;
        let value_idx = find(&self.value_column).ok_or_else(|| {
            StoreError::InvalidData(format!("missing column '{}'", self.value_column))
        })?;
        let entity_idx = self.entity_column.as_deref().and_then(find);

        let mut observations = Vec::new();
        for record in reader.records() {
            let record = record?;
            let entity = entity_idx
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .unwrap_or(default_entity);

            observations.push(Observation {
                entity_id: entity.to_string(),
                value: record.get(value_idx).and_then(parse_number),
                timestamp: record.get(ts_idx).and_then(parse_number),
            });
        }

        tracing::debug!(
            path = %self.path.display(),
            rows = observations.len(),
            "Read CSV observations"
        );

        Ok(observations)
    }
}

impl SeriesReader for CsvObservationSource {
    fn read(&self, entity_id: &str, min_timestamp: i64) -> StoreResult<Vec<Observation>> {
        let bound = min_timestamp as f64;
        Ok(self
            .read_all(entity_id)?
            .into_iter()
            .filter(|obs| obs.entity_id == entity_id)
            .filter(|obs| obs.timestamp.map(|ts| ts >= bound).unwrap_or(false))
            .collect())
    }
}

/// Parse a numeric cell; empty, `nan` and `null` cells are missing values
fn parse_number(cell: &str) -> Option<f64> {
    let cell = cell.trim();
    if cell.is_empty() || cell.eq_ignore_ascii_case("null") {
        return None;
    }
    cell.parse::<f64>().ok().filter(|v| v.is_finite())
}
