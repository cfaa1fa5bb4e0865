//! Store error types
//!
//! Defines all errors that can occur while talking to the observation
//! and results stores.

use thiserror::Error;

/// Errors that can occur in the storage layer
#[derive(Error, Debug)]
pub enum StoreError {
    /// The backing store could not be opened, locked or reached
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A row with this timestamp is already persisted
    #[error("Timestamp {timestamp} already persisted")]
    Conflict { timestamp: i64 },

    /// Query failed for a reason other than connectivity
    #[error("Query error: {0}")]
    Query(String),

    /// Stored or imported data could not be interpreted
    #[error("Invalid data: {0}")]
    InvalidData(String),

    /// Configuration error (bad table name, missing path)
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// CSV source could not be parsed
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        use rusqlite::ErrorCode;

        match &err {
            rusqlite::Error::SqliteFailure(e, _) => match e.code {
                ErrorCode::DatabaseBusy
                | ErrorCode::DatabaseLocked
                | ErrorCode::CannotOpen
                | ErrorCode::NotADatabase
                | ErrorCode::PermissionDenied
                | ErrorCode::SystemIoFailure
                | ErrorCode::DiskFull => StoreError::Unavailable(err.to_string()),
                _ => StoreError::Query(err.to_string()),
            },
            _ => StoreError::Query(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::InvalidData(err.to_string())
    }
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = StoreError::Conflict { timestamp: 1_715_943_600 };
        assert_eq!(err.to_string(), "Timestamp 1715943600 already persisted");

        let err = StoreError::Unavailable("connection refused".to_string());
        assert_eq!(err.to_string(), "Store unavailable: connection refused");
    }

    #[test]
    fn test_busy_maps_to_unavailable() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_BUSY),
            None,
        );
        let store_err: StoreError = err.into();
        assert!(matches!(store_err, StoreError::Unavailable(_)));
    }

    #[test]
    fn test_constraint_maps_to_query() {
        let err = rusqlite::Error::SqliteFailure(
            rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_CONSTRAINT),
            None,
        );
        let store_err: StoreError = err.into();
        assert!(matches!(store_err, StoreError::Query(_)));
    }
}
