//! # Error Types
//!
//! Domain-specific error types for camarim-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  camarim-core errors (this file)                                       │
//! │  ├── CoreError        - General domain errors                          │
//! │  └── ValidationError  - Data-set validation failures                   │
//! │                                                                         │
//! │  camarim-store errors (separate crate)                                 │
//! │  └── StoreError       - Storage backend failures                       │
//! │                                                                         │
//! │  camarim-backup errors (separate crate)                                │
//! │  └── BackupError      - Cloud file API failures                        │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Core domain errors.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Product cannot be found in the data set.
    #[error("Product not found: {0}")]
    ProductNotFound(i64),

    /// Sale cannot be found in the data set.
    #[error("Sale not found: {0}")]
    SaleNotFound(i64),

    /// A settings value exists but holds the wrong JSON type.
    #[error("Setting '{key}' is not a {expected}")]
    SettingWrongType { key: String, expected: &'static str },

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Data-set validation errors.
///
/// Raised when a SystemData instance violates one of its documented
/// invariants. Used before accepting externally-sourced data, e.g. a
/// restored cloud backup.
#[derive(Debug, Error)]
pub enum ValidationError {
    /// Two entries in the same collection share an id.
    #[error("Duplicate {collection} id: {id}")]
    DuplicateId { collection: &'static str, id: i64 },

    /// A required field is missing or empty.
    #[error("{field} is required")]
    Required { field: String },

    /// A quantity or count that must not be negative is negative.
    #[error("{field} must not be negative (got {value})")]
    Negative { field: String, value: i64 },

    /// An id counter is behind the highest id it is supposed to cover.
    #[error("Settings counter '{key}' is {counter}, but highest {collection} id is {highest}")]
    CounterBehind {
        key: &'static str,
        collection: &'static str,
        counter: i64,
        highest: i64,
    },
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;
