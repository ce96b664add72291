//! # Backup Configuration
//!
//! TOML configuration for the cloud backup feature.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (secrets only)                               │
//! │     CAMARIM_APP_KEY / CAMARIM_APP_SECRET / CAMARIM_REFRESH_TOKEN       │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/camarim-pos/backup.toml (Linux)                          │
//! │     ~/Library/Application Support/com.camarim.pos/backup.toml (macOS)  │
//! │                                                                         │
//! │  3. Default Values                                                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! # backup.toml
//! [account]
//! app_key = "abc123"
//! app_secret = "shh"
//! refresh_token = "long-lived-token"
//!
//! [remote]
//! api_url = "https://api.filestore.example"
//! folder = "/camarim"
//!
//! [backup]
//! prefix = "camarim-backup"
//! keep_last = 10
//! request_timeout_secs = 30
//! ```

use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{BackupError, BackupResult};

// =============================================================================
// Account Configuration
// =============================================================================

/// Credentials for the file-storage account.
///
/// Secrets may be left empty in the file and supplied via environment
/// variables instead; see [`BackupConfig::apply_env_overrides`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Application key registered with the file-storage service.
    #[serde(default)]
    pub app_key: String,

    /// Application secret.
    #[serde(default)]
    pub app_secret: String,

    /// Long-lived OAuth2 refresh token for the user's account.
    #[serde(default)]
    pub refresh_token: String,
}

// =============================================================================
// Remote Configuration
// =============================================================================

/// Where backups live remotely.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteConfig {
    /// Base URL of the file-storage HTTP API.
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Remote folder backups are stored under.
    #[serde(default = "default_folder")]
    pub folder: String,
}

fn default_api_url() -> String {
    "https://api.filestore.example".to_string()
}

fn default_folder() -> String {
    "/camarim".to_string()
}

impl Default for RemoteConfig {
    fn default() -> Self {
        RemoteConfig {
            api_url: default_api_url(),
            folder: default_folder(),
        }
    }
}

// =============================================================================
// Backup Settings
// =============================================================================

/// Backup behavior settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    /// File name prefix; listings are filtered to this prefix.
    #[serde(default = "default_prefix")]
    pub prefix: String,

    /// How many backups to keep remotely; older ones are pruned after a
    /// successful upload. Zero disables pruning.
    #[serde(default = "default_keep_last")]
    pub keep_last: usize,

    /// Connection timeout (seconds).
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: u64,

    /// Per-request timeout (seconds).
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    /// Initial backoff (milliseconds) for retrying transient failures.
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum total time (seconds) spent retrying one upload.
    #[serde(default = "default_max_retry_secs")]
    pub max_retry_secs: u64,
}

fn default_prefix() -> String {
    "camarim-backup".to_string()
}

fn default_keep_last() -> usize {
    10
}

fn default_connect_timeout() -> u64 {
    10
}

fn default_request_timeout() -> u64 {
    30
}

fn default_initial_backoff() -> u64 {
    500
}

fn default_max_retry_secs() -> u64 {
    60
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings {
            prefix: default_prefix(),
            keep_last: default_keep_last(),
            connect_timeout_secs: default_connect_timeout(),
            request_timeout_secs: default_request_timeout(),
            initial_backoff_ms: default_initial_backoff(),
            max_retry_secs: default_max_retry_secs(),
        }
    }
}

// =============================================================================
// Top-Level Configuration
// =============================================================================

/// Complete backup configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BackupConfig {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub remote: RemoteConfig,

    #[serde(default)]
    pub backup: BackupSettings,
}

impl BackupConfig {
    /// Default config file location for this platform.
    pub fn default_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "camarim", "camarim-pos")
            .map(|dirs| dirs.config_dir().join("backup.toml"))
    }

    /// Loads configuration from a TOML file, then applies environment
    /// overrides for secrets.
    pub fn load(path: &Path) -> BackupResult<Self> {
        debug!(path = %path.display(), "Loading backup config");
        let raw = std::fs::read_to_string(path)?;
        let mut config: BackupConfig = toml::from_str(&raw)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Loads the config file if it exists, otherwise returns defaults
    /// (with environment overrides applied either way).
    pub fn load_or_default(path: &Path) -> Self {
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                debug!(path = %path.display(), error = %e, "No usable config file, using defaults");
                let mut config = BackupConfig::default();
                config.apply_env_overrides();
                config
            }
        }
    }

    /// Writes the configuration to a TOML file, creating parent
    /// directories as needed.
    pub fn save(&self, path: &Path) -> BackupResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| BackupError::ConfigSaveFailed(e.to_string()))?;
        }
        let raw = toml::to_string_pretty(self)?;
        std::fs::write(path, raw).map_err(|e| BackupError::ConfigSaveFailed(e.to_string()))?;
        info!(path = %path.display(), "Backup config saved");
        Ok(())
    }

    /// Overrides secrets from the environment when present:
    /// `CAMARIM_APP_KEY`, `CAMARIM_APP_SECRET`, `CAMARIM_REFRESH_TOKEN`.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(key) = std::env::var("CAMARIM_APP_KEY") {
            self.account.app_key = key;
        }
        if let Ok(secret) = std::env::var("CAMARIM_APP_SECRET") {
            self.account.app_secret = secret;
        }
        if let Ok(token) = std::env::var("CAMARIM_REFRESH_TOKEN") {
            self.account.refresh_token = token;
        }
    }

    /// Checks that the configuration is usable for cloud calls.
    pub fn validate(&self) -> BackupResult<()> {
        if self.account.app_key.is_empty() {
            return Err(BackupError::InvalidConfig("app_key is not set".into()));
        }
        if self.account.refresh_token.is_empty() {
            return Err(BackupError::InvalidConfig("refresh_token is not set".into()));
        }
        if self.backup.prefix.is_empty() {
            return Err(BackupError::InvalidConfig("prefix must not be empty".into()));
        }
        url::Url::parse(&self.remote.api_url)?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
