//! Results Store - SQLite table of persisted forecast values
//!
//! Append-only. `timestamp` carries a UNIQUE constraint, and the
//! read-max-then-insert sequence runs inside a single `BEGIN IMMEDIATE`
//! transaction so two concurrent writers cannot both insert past the same
//! maximum.

use crate::storage::error::{StoreError, StoreResult};
use crate::storage::types::ResultRow;
use crate::storage::ResultsStore;
use rusqlite::{params, Connection, ErrorCode, OpenFlags, OptionalExtension, TransactionBehavior};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// SQLite-backed results table
pub struct SqliteResultsStore {
    conn: Mutex<Connection>,
    table: String,
    path: PathBuf,
}

impl SqliteResultsStore {
    /// Create or open a results store
    pub fn open(path: impl AsRef<Path>, table: &str) -> StoreResult<Self> {
        validate_table_name(table)?;
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

        Self::init(conn, table, path)
    }

    /// In-memory store for tests and dry runs
    pub fn in_memory(table: &str) -> StoreResult<Self> {
        validate_table_name(table)?;
        let conn = Connection::open_in_memory()?;
        Self::init(conn, table, PathBuf::from(":memory:"))
    }

    fn init(conn: Connection, table: &str, path: PathBuf) -> StoreResult<Self> {
        conn.busy_timeout(Duration::from_secs(5))?;
        conn.execute_batch(&format!(
            "
            PRAGMA synchronous = NORMAL;
            CREATE TABLE IF NOT EXISTS {table} (
                timestamp INTEGER NOT NULL UNIQUE,
                value REAL NOT NULL
            );
            "
        ))?;

        tracing::debug!(path = %path.display(), table, "Opened results store");

        Ok(Self {
            conn: Mutex::new(conn),
            table: table.to_string(),
            path,
        })
    }

    fn lock(&self) -> StoreResult<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| StoreError::Unavailable("results store lock poisoned".to_string()))
    }

    /// Number of persisted rows
    pub fn row_count(&self) -> StoreResult<u64> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", self.table),
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// All rows in timestamp order
    pub fn rows(&self) -> StoreResult<Vec<ResultRow>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(&format!(
            "SELECT timestamp, value FROM {} ORDER BY timestamp",
            self.table
        ))?;
        let rows = stmt.query_map([], |row| Ok(ResultRow::new(row.get(0)?, row.get(1)?)))?;
        rows.collect::<Result<Vec<_>, _>>().map_err(StoreError::from)
    }

    /// Cheap round-trip used by the readiness probe
    pub fn ping(&self) -> StoreResult<()> {
        let conn = self.lock()?;
        conn.query_row("SELECT 1", [], |_| Ok(()))?;
        Ok(())
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl ResultsStore for SqliteResultsStore {
    fn max_timestamp(&self) -> StoreResult<Option<i64>> {
        let conn = self.lock()?;
        query_max(&conn, &self.table)
    }

    fn append_after_max(
        &self,
        select: &dyn Fn(Option<i64>) -> Vec<ResultRow>,
    ) -> StoreResult<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;

        let max = query_max(&tx, &self.table)?;
        let rows = select(max);
        if rows.is_empty() {
            tx.commit()?;
            return Ok(0);
        }

        {
            let mut stmt = tx.prepare_cached(&format!(
                "INSERT INTO {} (timestamp, value) VALUES (?1, ?2)",
                self.table
            ))?;

            for row in &rows {
                stmt.execute(params![row.timestamp, row.value])
                    .map_err(|e| map_insert_error(e, row.timestamp))?;
            }
        }

        // Dropping `tx` on any error above rolls the whole batch back
        tx.commit()?;

        tracing::debug!(
            table = %self.table,
            previous_max = ?max,
            inserted = rows.len(),
            "Appended forecast rows"
        );

        Ok(rows.len())
    }
}

fn query_max(conn: &Connection, table: &str) -> StoreResult<Option<i64>> {
    let max: Option<i64> = conn
        .query_row(&format!("SELECT MAX(timestamp) FROM {table}"), [], |row| {
            row.get(0)
        })
        .optional()?
        .flatten();
    Ok(max)
}

fn map_insert_error(err: rusqlite::Error, timestamp: i64) -> StoreError {
    match &err {
        rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict { timestamp }
        }
        _ => StoreError::from(err),
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass
pub fn validate_table_name(table: &str) -> StoreResult<()> {
    let mut chars = table.chars();
    let valid = match chars.next() {
        Some(first) => {
            (first.is_ascii_alphabetic() || first == '_')
                && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
        }
        None => false,
    };

    if valid {
        Ok(())
    } else {
        Err(StoreError::Config(format!("invalid table name '{}'", table)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn rows(timestamps: &[i64]) -> Vec<ResultRow> {
        timestamps.iter().map(|&ts| ResultRow::new(ts, ts as f64 / 100.0)).collect()
    }

    fn newer_than(candidates: Vec<ResultRow>) -> impl Fn(Option<i64>) -> Vec<ResultRow> {
        move |max| {
            candidates
                .iter()
                .copied()
                .filter(|r| max.map(|m| r.timestamp > m).unwrap_or(true))
                .collect()
        }
    }

    #[test]
    fn test_empty_store_has_no_max() {
        let store = SqliteResultsStore::in_memory("forecasting").unwrap();
        assert_eq!(store.max_timestamp().unwrap(), None);
        assert_eq!(store.row_count().unwrap(), 0);
    }

    #[test]
    fn test_append_and_max() {
        let store = SqliteResultsStore::in_memory("forecasting").unwrap();

        let inserted = store.append_after_max(&newer_than(rows(&[100, 200, 300]))).unwrap();
        assert_eq!(inserted, 3);
        assert_eq!(store.max_timestamp().unwrap(), Some(300));

        let inserted = store
            .append_after_max(&newer_than(rows(&[200, 300, 400, 500])))
            .unwrap();
        assert_eq!(inserted, 2);
        assert_eq!(store.row_count().unwrap(), 5);
    }

    #[test]
    fn test_selector_sees_current_max() {
        let store = SqliteResultsStore::in_memory("forecasting").unwrap();
        store.append_after_max(&newer_than(rows(&[100]))).unwrap();

        let seen = std::cell::Cell::new(None);
        store
            .append_after_max(&|max: Option<i64>| -> Vec<ResultRow> {
                seen.set(max);
                Vec::new()
            })
            .unwrap();
        assert_eq!(seen.get(), Some(100));
    }

    #[test]
    fn test_conflict_rolls_back_whole_batch() {
        let store = SqliteResultsStore::in_memory("forecasting").unwrap();
        store.append_after_max(&newer_than(rows(&[100, 200]))).unwrap();

        // A selector that ignores the max collides on 200
        let result = store.append_after_max(&|_: Option<i64>| rows(&[150, 200, 250]));
        assert!(matches!(result, Err(StoreError::Conflict { timestamp: 200 })));

        let persisted: Vec<i64> = store.rows().unwrap().iter().map(|r| r.timestamp).collect();
        assert_eq!(persisted, vec![100, 200]);
    }

    #[test]
    fn test_concurrent_writers_keep_rows_unique() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.db");
        let first = SqliteResultsStore::open(&path, "forecasting").unwrap();
        let second = SqliteResultsStore::open(&path, "forecasting").unwrap();

        // Each writer replays the same sequence of overlapping forecasts:
        // run k covers [k*100, k*100 + 500)
        let run = |store: &SqliteResultsStore| -> usize {
            (0..10)
                .map(|k| {
                    let window: Vec<i64> = (k * 100..k * 100 + 500).collect();
                    store.append_after_max(&newer_than(rows(&window))).unwrap()
                })
                .sum()
        };

        let (a, b) = std::thread::scope(|s| {
            let a = s.spawn(|| run(&first));
            let b = s.spawn(|| run(&second));
            (a.join().unwrap(), b.join().unwrap())
        });

        let persisted: Vec<i64> = first.rows().unwrap().iter().map(|r| r.timestamp).collect();
        assert_eq!(persisted, (0..1_400).collect::<Vec<_>>());
        assert_eq!(a + b, 1_400);
        assert_eq!(second.row_count().unwrap(), 1_400);
    }

    #[test]
    fn test_invalid_table_name() {
        assert!(matches!(
            SqliteResultsStore::in_memory("forecasting; DROP TABLE x"),
            Err(StoreError::Config(_))
        ));
        assert!(validate_table_name("").is_err());
        assert!(validate_table_name("1abc").is_err());
        assert!(validate_table_name("flow_forecast_2").is_ok());
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("results.db");

        {
            let store = SqliteResultsStore::open(&path, "forecasting").unwrap();
            store.append_after_max(&newer_than(rows(&[100, 200]))).unwrap();
        }

        let store = SqliteResultsStore::open(&path, "forecasting").unwrap();
        assert_eq!(store.max_timestamp().unwrap(), Some(200));
        store.ping().unwrap();
    }
}
