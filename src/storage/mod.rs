//! Flowcast Storage
//!
//! Persistence for both ends of the forecast pipeline:
//!
//! - **types**: Core data structures (Observation, ResultRow, FieldPath)
//! - **documents**: SQLite document store holding raw sensor messages
//! - **csv_source**: Flattened CSV export read as a history source
//! - **results**: Append-only SQLite results table
//! - **error**: Error types
//!
//! # Architecture
//!
//! ```text
//! Read Path:
//!   SeriesReader::read(entity, min_ts) → Vec<Observation>
//!
//! Write Path:
//!   ResultsStore::append_after_max(select) → BEGIN IMMEDIATE → MAX → INSERT … → COMMIT
//! ```
//!
//! # Example
//!
//! ```rust,no_run
//! use flowcast::storage::{DocumentSchema, SeriesReader, SqliteDocumentStore};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let store = SqliteDocumentStore::open("./data/history.db", DocumentSchema::default())?;
//!     let observations = store.read("DMC012", 1_672_542_000)?;
//!     println!("Read {} observations", observations.len());
//!     Ok(())
//! }
//! ```

pub mod csv_source;
pub mod documents;
pub mod error;
pub mod results;
pub mod types;

// Re-export commonly used types
pub use csv_source::CsvObservationSource;
pub use documents::{DocumentSchema, SqliteDocumentStore};
pub use error::{StoreError, StoreResult};
pub use results::{validate_table_name, SqliteResultsStore};
pub use types::{FieldPath, Observation, ResultRow};

/// Source of historical observations
pub trait SeriesReader: Send + Sync {
    /// All observations for `entity_id` with `timestamp >= min_timestamp`
    /// (epoch seconds), in no particular order.
    ///
    /// An empty vector means the store answered with nothing; any failure to
    /// reach the store is an error.
    fn read(&self, entity_id: &str, min_timestamp: i64) -> StoreResult<Vec<Observation>>;
}

/// Append-only store of forecast values
pub trait ResultsStore: Send + Sync {
    /// Largest persisted timestamp, `None` when the store is empty
    fn max_timestamp(&self) -> StoreResult<Option<i64>>;

    /// Read the current maximum, let `select` choose rows from it, and insert
    /// them, all as one atomic operation. Either every selected row lands or
    /// none does. Returns the number of rows inserted.
    fn append_after_max(
        &self,
        select: &dyn Fn(Option<i64>) -> Vec<ResultRow>,
    ) -> StoreResult<usize>;
}

/// Cheap round-trip used by readiness checks
pub trait StoreProbe: Send + Sync {
    /// Short label for health reports
    fn label(&self) -> &str;

    fn ping(&self) -> StoreResult<()>;
}

impl StoreProbe for SqliteDocumentStore {
    fn label(&self) -> &str {
        "sqlite-documents"
    }

    fn ping(&self) -> StoreResult<()> {
        SqliteDocumentStore::ping(self)
    }
}

impl StoreProbe for SqliteResultsStore {
    fn label(&self) -> &str {
        "sqlite-results"
    }

    fn ping(&self) -> StoreResult<()> {
        SqliteResultsStore::ping(self)
    }
}

impl StoreProbe for CsvObservationSource {
    fn label(&self) -> &str {
        "csv"
    }

    fn ping(&self) -> StoreResult<()> {
        if self.path().is_file() {
            Ok(())
        } else {
            Err(StoreError::Unavailable(format!(
                "{} is not a readable file",
                self.path().display()
            )))
        }
    }
}
