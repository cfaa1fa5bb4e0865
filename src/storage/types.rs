//! Core data types shared by the stores
//!
//! - `Observation`: a raw sensor reading as it comes out of the history store
//! - `ResultRow`: a persisted forecast value
//! - `FieldPath`: dotted path into a JSON sensor document

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single raw reading for one entity
///
/// Both `value` and `timestamp` may be absent; cleaning them out is the
/// window preparer's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    /// Sensor/node identifier
    pub entity_id: String,
    /// Measured flow, if the document carried one
    pub value: Option<f64>,
    /// Unix timestamp in seconds (fractional allowed)
    pub timestamp: Option<f64>,
}

impl Observation {
    pub fn new(entity_id: impl Into<String>, value: Option<f64>, timestamp: Option<f64>) -> Self {
        Self {
            entity_id: entity_id.into(),
            value,
            timestamp,
        }
    }

    /// Shorthand for a fully populated reading
    pub fn reading(entity_id: impl Into<String>, value: f64, timestamp: i64) -> Self {
        Self::new(entity_id, Some(value), Some(timestamp as f64))
    }
}

/// One row of the results table
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Unix timestamp in seconds
    pub timestamp: i64,
    /// Forecast central estimate
    pub value: f64,
}

impl ResultRow {
    pub fn new(timestamp: i64, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Dotted path into a JSON document, e.g. `data.raw_cur_flow`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldPath {
    raw: String,
    segments: Vec<String>,
}

impl FieldPath {
    pub fn new(path: &str) -> Self {
        Self {
            raw: path.to_string(),
            segments: path
                .split('.')
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect(),
        }
    }

    /// The path as written in configuration
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// Walk the document; `None` when any segment is missing
    pub fn lookup<'a>(&self, doc: &'a Value) -> Option<&'a Value> {
        if self.segments.is_empty() {
            return None;
        }
        // Flattened exports keep the dotted key at top level
        if let Some(v) = doc.get(&self.raw) {
            return Some(v);
        }
        self.segments
            .iter()
            .try_fold(doc, |current, segment| current.get(segment))
    }

    /// Numeric value at the path. Numeric strings are accepted; null,
    /// missing and non-finite values yield `None`.
    pub fn number(&self, doc: &Value) -> Option<f64> {
        let n = match self.lookup(doc)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse::<f64>().ok(),
            _ => None,
        }?;
        n.is_finite().then_some(n)
    }

    /// String value at the path (numbers are rendered)
    pub fn string(&self, doc: &Value) -> Option<String> {
        match self.lookup(doc)? {
            Value::String(s) => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_nested_lookup() {
        let doc = json!({"data": {"raw_cur_flow": 12.5}, "timestamp": 1_700_000_000});
        assert_eq!(FieldPath::new("data.raw_cur_flow").number(&doc), Some(12.5));
        assert_eq!(FieldPath::new("timestamp").number(&doc), Some(1_700_000_000.0));
    }

    #[test]
    fn test_missing_and_null_fields() {
        let doc = json!({"data": {"raw_cur_flow": null}});
        assert_eq!(FieldPath::new("data.raw_cur_flow").number(&doc), None);
        assert_eq!(FieldPath::new("data.other").number(&doc), None);
        assert_eq!(FieldPath::new("timestamp").number(&doc), None);
    }

    #[test]
    fn test_flattened_key() {
        let doc = json!({"data.raw_cur_flow": "3.25"});
        assert_eq!(FieldPath::new("data.raw_cur_flow").number(&doc), Some(3.25));
    }

    #[test]
    fn test_string_lookup() {
        let doc = json!({"info": {"id_node": "DMC012"}});
        assert_eq!(
            FieldPath::new("info.id_node").string(&doc).as_deref(),
            Some("DMC012")
        );
    }
}
