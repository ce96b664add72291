//! # Backup Error Types
//!
//! Error types for cloud backup operations.
//!
//! ## Error Categories
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Configuration      Transport          Operation                        │
//! │                                                                         │
//! │  InvalidConfig      Connection         Upload                           │
//! │  ConfigLoadFailed   Timeout            Download                         │
//! │  ConfigSaveFailed   AuthFailed         Delete                           │
//! │                     RateLimited        NotFound                         │
//! │                                        InvalidBackup                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

/// Result type alias for backup operations.
pub type BackupResult<T> = Result<T, BackupError>;

/// Backup error type covering configuration, transport, and cloud
/// operation failures.
#[derive(Debug, Error)]
pub enum BackupError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Invalid backup configuration.
    #[error("Invalid backup configuration: {0}")]
    InvalidConfig(String),

    /// Failed to load the config file.
    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    /// Failed to save the config file.
    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Transport Errors
    // =========================================================================
    /// Could not reach the file-storage API.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A request exceeded its bounded timeout.
    #[error("Request timed out: {0}")]
    Timeout(String),

    /// Token exchange or an authenticated call was rejected.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// The service asked us to slow down.
    #[error("Rate limited by the file-storage API")]
    RateLimited,

    // =========================================================================
    // Operation Errors
    // =========================================================================
    /// Upload failed.
    #[error("Upload failed: {0}")]
    Upload(String),

    /// Download failed.
    #[error("Download failed: {0}")]
    Download(String),

    /// Delete failed.
    #[error("Delete failed: {0}")]
    Delete(String),

    /// The named backup does not exist remotely.
    #[error("Backup not found: {0}")]
    NotFound(String),

    /// The service answered with something unexpected.
    #[error("Invalid response from file-storage API: {0}")]
    InvalidResponse(String),

    /// A downloaded backup cannot be used.
    #[error("Invalid backup content: {0}")]
    InvalidBackup(String),

    /// A restored data set could not be written to local storage.
    #[error("Local save failed after restore: {0}")]
    LocalSaveFailed(String),

    /// Serialization failure while packing or unpacking a backup.
    #[error("Serialization failed: {0}")]
    Serialization(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<reqwest::Error> for BackupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            BackupError::Timeout(err.to_string())
        } else if err.is_connect() {
            BackupError::Connection(err.to_string())
        } else {
            BackupError::InvalidResponse(err.to_string())
        }
    }
}

impl From<serde_json::Error> for BackupError {
    fn from(err: serde_json::Error) -> Self {
        BackupError::Serialization(err.to_string())
    }
}

impl From<url::ParseError> for BackupError {
    fn from(err: url::ParseError) -> Self {
        BackupError::InvalidConfig(format!("invalid URL: {err}"))
    }
}

impl From<std::io::Error> for BackupError {
    fn from(err: std::io::Error) -> Self {
        BackupError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::de::Error> for BackupError {
    fn from(err: toml::de::Error) -> Self {
        BackupError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for BackupError {
    fn from(err: toml::ser::Error) -> Self {
        BackupError::ConfigSaveFailed(err.to_string())
    }
}

impl From<camarim_core::ValidationError> for BackupError {
    fn from(err: camarim_core::ValidationError) -> Self {
        BackupError::InvalidBackup(err.to_string())
    }
}

// =============================================================================
// Error Categorization (for retry logic)
// =============================================================================

impl BackupError {
    /// Returns true if the operation can be retried.
    ///
    /// Network hiccups and throttling are retryable; configuration,
    /// authentication, and content problems are not.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            BackupError::Connection(_) | BackupError::Timeout(_) | BackupError::RateLimited
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retryable_errors() {
        assert!(BackupError::Connection("reset by peer".into()).is_retryable());
        assert!(BackupError::Timeout("30s elapsed".into()).is_retryable());
        assert!(BackupError::RateLimited.is_retryable());

        assert!(!BackupError::AuthFailed("bad refresh token".into()).is_retryable());
        assert!(!BackupError::NotFound("camarim-backup-x.json".into()).is_retryable());
        assert!(!BackupError::InvalidBackup("duplicate id".into()).is_retryable());
    }

    #[test]
    fn test_validation_error_converts() {
        let err = camarim_core::ValidationError::DuplicateId {
            collection: "products",
            id: 2,
        };
        let backup_err: BackupError = err.into();
        assert!(matches!(backup_err, BackupError::InvalidBackup(_)));
    }
}
