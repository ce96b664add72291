//! # Storage Error Types
//!
//! Error types for both storage backends and the tiered adapter.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite error (sqlx::Error) / key-value I/O error                      │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  StoreError (this module) ← categorized for degrade decisions          │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  TieredStore absorbs it: reads fall back, writes report a reduced      │
//! │  guarantee. Nothing past the adapter boundary panics or propagates.    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for storage operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Storage operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The structured store cannot be provided on this platform or path.
    ///
    /// The adapter treats this as a signal to degrade to the fallback
    /// store, not as a failure.
    #[error("Structured store unavailable: {0}")]
    Unsupported(String),

    /// Opening the structured store's connection pool failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Schema migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// A single query failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A bulk replace transaction failed; the transaction was rolled back
    /// and no collection was left partially cleared.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// A persisted value exists but cannot be parsed.
    ///
    /// The corrupt value is left in place for forensic recovery; callers
    /// treat the key as absent.
    #[error("Corrupt data under key '{key}': {reason}")]
    CorruptData { key: String, reason: String },

    /// The key-value backend refused a write because it is out of space.
    #[error("Quota exceeded writing key '{key}'")]
    QuotaExceeded { key: String },

    /// Key-value backend I/O failure.
    #[error("Key-value I/O error for key '{key}': {reason}")]
    KvIo { key: String, reason: String },

    /// Serializing the data set failed.
    #[error("Serialization failed: {0}")]
    SerializationFailed(String),

    /// Housekeeping was requested before the fallback-to-structured
    /// migration completed.
    #[error("Migration has not completed; refusing to clear the fallback store")]
    MigrationIncomplete,
}

impl StoreError {
    /// Builds a [`StoreError::CorruptData`] for the given key.
    pub fn corrupt(key: impl Into<String>, reason: impl Into<String>) -> Self {
        StoreError::CorruptData {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Returns true when the failure is a one-off I/O problem rather than
    /// a structural one: the current operation may fall back, but the
    /// backend assignment stays as it is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            StoreError::QueryFailed(_)
                | StoreError::TransactionFailed(_)
                | StoreError::KvIo { .. }
        )
    }
}

// =============================================================================
// Error Conversions
// =============================================================================

/// Convert sqlx errors to StoreError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::PoolTimedOut      → QueryFailed (transient)
/// sqlx::Error::PoolClosed        → ConnectionFailed
/// sqlx::Error::Database          → QueryFailed with driver message
/// Other                          → QueryFailed
/// ```
impl From<sqlx::Error> for StoreError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolClosed => {
                StoreError::ConnectionFailed("connection pool is closed".to_string())
            }
            sqlx::Error::PoolTimedOut => {
                StoreError::QueryFailed("connection pool timed out".to_string())
            }
            sqlx::Error::Database(db_err) => StoreError::QueryFailed(db_err.message().to_string()),
            other => StoreError::QueryFailed(other.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for StoreError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        StoreError::MigrationFailed(err.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::SerializationFailed(err.to_string())
    }
}
