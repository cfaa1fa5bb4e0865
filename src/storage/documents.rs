//! Document Store - SQLite-backed history of raw sensor messages
//!
//! Each message is kept verbatim as JSON next to the two columns the reader
//! filters on. Values are pulled out of the document at read time, so
//! messages with missing or malformed fields are stored and later surface as
//! observations with `value: None`.
//!
//! # Layout
//! ```text
//! observations(id, entity_id, timestamp, document)
//!   idx_observations_entity_ts ON (entity_id, timestamp)
//! ```

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::{FieldPath, Observation};
use crate::storage::SeriesReader;
use rusqlite::{params, Connection, OpenFlags};
use serde_json::Value;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Where the reader finds entity, timestamp and value inside a document
#[derive(Debug, Clone)]
pub struct DocumentSchema {
    pub entity_field: FieldPath,
    pub timestamp_field: FieldPath,
    pub value_field: FieldPath,
}

impl Default for DocumentSchema {
    fn default() -> Self {
        Self {
            entity_field: FieldPath::new("info.id_node"),
            timestamp_field: FieldPath::new("timestamp"),
            value_field: FieldPath::new("data.raw_cur_flow"),
        }
    }
}

impl DocumentSchema {
    pub fn new(entity_field: &str, timestamp_field: &str, value_field: &str) -> Self {
        Self {
            entity_field: FieldPath::new(entity_field),
            timestamp_field: FieldPath::new(timestamp_field),
            value_field: FieldPath::new(value_field),
        }
    }
}

/// SQLite document store for raw sensor messages
pub struct SqliteDocumentStore {
    conn: Mutex<Connection>,
    schema: DocumentSchema,
    path: PathBuf,
}

impl SqliteDocumentStore {
    /// Create or open a document store
    pub fn open(path: impl AsRef<Path>, schema: DocumentSchema) -> StoreResult<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open_with_flags(
            &path,
            OpenFlags::SQLITE_OPEN_READ_WRITE
                | OpenFlags::SQLITE_OPEN_CREATE
                | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;

        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            CREATE TABLE IF NOT EXISTS observations (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                entity_id TEXT NOT NULL,
                timestamp REAL,
                document TEXT NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_observations_entity_ts
                ON observations(entity_id, timestamp);
            ",
        )?;

        tracing::debug!(path = %path.display(), "Opened document store");

        Ok(Self {
            conn: Mutex::new(conn),
            schema,
            path,
        })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("document store lock poisoned".to_string()))
    }

    /// Store one raw message. The entity field is required; a document
    /// without it cannot be found again and is rejected.
    pub fn insert_document(&self, document: &Value) -> StoreResult<()> {
        self.insert_documents(std::slice::from_ref(document))
            .map(|_| ())
    }

    /// Store many raw messages in one transaction
    pub fn insert_documents(&self, documents: &[Value]) -> StoreResult<usize> {
        if documents.is_empty() {
            return Ok(0);
        }

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT INTO observations (entity_id, timestamp, document) VALUES (?1, ?2, ?3)",
            )?;

            for (idx, doc) in documents.iter().enumerate() {
                let entity = self.schema.entity_field.string(doc).ok_or_else(|| {
                    StoreError::InvalidData(format!(
                        "document {} has no '{}' field",
                        idx,
                        self.schema.entity_field.as_str()
                    ))
                })?;
                let timestamp = self.schema.timestamp_field.number(doc);
                stmt.execute(params![entity, timestamp, serde_json::to_string(doc)?])?;
            }
        }
        tx.commit()?;

        Ok(documents.len())
    }

    /// Store already-decoded observations (CSV import path)
    pub fn insert_observations(&self, observations: &[Observation]) -> StoreResult<usize> {
        let documents: Vec<Value> = observations
            .iter()
            .map(|obs| self.to_document(obs))
            .collect();
        self.insert_documents(&documents)
    }

    /// Build a document in this store's schema from an observation
    fn to_document(&self, obs: &Observation) -> Value {
        let mut doc = Value::Object(Default::default());
        set_path(&mut doc, &self.schema.entity_field, Value::from(obs.entity_id.clone()));
        set_path(
            &mut doc,
            &self.schema.timestamp_field,
            obs.timestamp.map(Value::from).unwrap_or(Value::Null),
        );
        set_path(
            &mut doc,
            &self.schema.value_field,
            obs.value.map(Value::from).unwrap_or(Value::Null),
        );
        doc
    }

    /// Number of stored documents for an entity
    pub fn count(&self, entity_id: &str) -> StoreResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM observations WHERE entity_id = ?1",
            params![entity_id],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Cheap round-trip used by the readiness probe
    pub fn ping(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl SeriesReader for SqliteDocumentStore {
    fn read(&self, entity_id: &str, min_timestamp: i64) -> StoreResult<Vec<Observation>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare_cached(
            "SELECT document FROM observations
             WHERE entity_id = ?1 AND timestamp >= ?2",
        )?;

        let rows = stmt.query_map(params![entity_id, min_timestamp as f64], |row| {
            row.get::<_, String>(0)
        })?;

        let mut observations = Vec::new();
        let mut malformed = 0usize;
        for row in rows {
            let raw = row?;
            match serde_json::from_str::<Value>(&raw) {
                Ok(doc) => observations.push(Observation {
                    entity_id: entity_id.to_string(),
                    value: self.schema.value_field.number(&doc),
                    timestamp: self.schema.timestamp_field.number(&doc),
                }),
                Err(_) => malformed += 1,
            }
        }

        if malformed > 0 {
            tracing::warn!(entity_id, malformed, "Skipped unparseable documents");
        }
        tracing::debug!(entity_id, min_timestamp, count = observations.len(), "Read observations");

        Ok(observations)
    }
}

/// Write `value` at `path`, creating intermediate objects
fn set_path(doc: &mut Value, path: &FieldPath, value: Value) {
    let segments: Vec<&str> = path.as_str().split('.').filter(|s| !s.is_empty()).collect();
    let Some((last, parents)) = segments.split_last() else {
        return;
    };

    let mut current = doc;
    for segment in parents {
        if !current.get(*segment).map(Value::is_object).unwrap_or(false) {
            current[*segment] = Value::Object(Default::default());
        }
        current = &mut current[*segment];
    }
    current[*last] = value;
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn message(node: &str, ts: i64, flow: Value) -> Value {
        json!({
            "info": {"id_node": node},
            "timestamp": ts,
            "data": {"raw_cur_flow": flow}
        })
    }

    #[test]
    fn test_insert_and_read_by_entity_and_bound() {
        let dir = tempdir().unwrap();
        let store =
            SqliteDocumentStore::open(dir.path().join("history.db"), DocumentSchema::default())
                .unwrap();

        store
            .insert_documents(&[
                message("DMC012", 1000, json!(1.5)),
                message("DMC012", 2000, json!(2.5)),
                message("DMC012", 3000, json!(3.5)),
                message("OTHER", 2500, json!(9.0)),
            ])
            .unwrap();

        let mut obs = store.read("DMC012", 2000).unwrap();
        obs.sort_by(|a, b| a.timestamp.partial_cmp(&b.timestamp).unwrap());

        assert_eq!(obs.len(), 2);
        assert_eq!(obs[0].value, Some(2.5));
        assert_eq!(obs[1].timestamp, Some(3000.0));
        assert!(obs.iter().all(|o| o.entity_id == "DMC012"));
    }

    #[test]
    fn test_missing_value_surfaces_as_none() {
        let dir = tempdir().unwrap();
        let store =
            SqliteDocumentStore::open(dir.path().join("history.db"), DocumentSchema::default())
                .unwrap();

        store.insert_document(&message("DMC012", 1000, Value::Null)).unwrap();
        store
            .insert_document(&json!({"info": {"id_node": "DMC012"}, "timestamp": 1100}))
            .unwrap();

        let obs = store.read("DMC012", 0).unwrap();
        assert_eq!(obs.len(), 2);
        assert!(obs.iter().all(|o| o.value.is_none()));
    }

    #[test]
    fn test_empty_read_is_ok() {
        let dir = tempdir().unwrap();
        let store =
            SqliteDocumentStore::open(dir.path().join("history.db"), DocumentSchema::default())
                .unwrap();

        assert!(store.read("DMC012", 0).unwrap().is_empty());
    }

    #[test]
    fn test_document_without_entity_rejected() {
        let dir = tempdir().unwrap();
        let store =
            SqliteDocumentStore::open(dir.path().join("history.db"), DocumentSchema::default())
                .unwrap();

        let result = store.insert_documents(&[
            message("DMC012", 1000, json!(1.0)),
            json!({"timestamp": 1000}),
        ]);
        assert!(matches!(result, Err(StoreError::InvalidData(_))));
        // The whole batch rolled back
        assert_eq!(store.count("DMC012").unwrap(), 0);
    }

    #[test]
    fn test_insert_observations_round_trip() {
        let dir = tempdir().unwrap();
        let store =
            SqliteDocumentStore::open(dir.path().join("history.db"), DocumentSchema::default())
                .unwrap();

        store
            .insert_observations(&[
                Observation::reading("DMC012", 4.0, 1000),
                Observation::new("DMC012", None, Some(1300.0)),
            ])
            .unwrap();

        let obs = store.read("DMC012", 0).unwrap();
        assert_eq!(obs.len(), 2);
        assert!(obs.contains(&Observation::reading("DMC012", 4.0, 1000)));
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("history.db");

        {
            let store = SqliteDocumentStore::open(&path, DocumentSchema::default()).unwrap();
            store.insert_document(&message("DMC012", 1000, json!(1.0))).unwrap();
        }

        let store = SqliteDocumentStore::open(&path, DocumentSchema::default()).unwrap();
        assert_eq!(store.count("DMC012").unwrap(), 1);
        store.ping().unwrap();
    }
}
