//! # Backup Client
//!
//! The one cloud-backup client in the workspace. Every consumer talks to
//! the [`BackupClient`] interface; [`HttpBackupClient`] is its single
//! implementation, speaking the file-storage HTTP API.
//!
//! ## Endpoints
//! ```text
//! POST {api}/files/list      {"folder"}            → {"entries": [...]}
//! POST {api}/files/upload    ?folder=&name= + body → {"name","size","created"}
//! GET  {api}/files/content   ?folder=&name=        → raw blob
//! POST {api}/files/delete    {"folder","name"}     → {}
//! ```
//!
//! All calls carry a bearer token from [`CloudAuth`](crate::CloudAuth);
//! transient upload failures are retried with exponential backoff.

use async_trait::async_trait;
use backoff::ExponentialBackoff;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

use crate::auth::CloudAuth;
use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};

// =============================================================================
// Public Types
// =============================================================================

/// A backup file as listed remotely.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFile {
    /// Remote file name, e.g. `camarim-backup-20260806-101500.json`.
    pub name: String,
    /// Size in bytes.
    pub size: u64,
    /// Remote creation time.
    pub created_at: DateTime<Utc>,
}

/// The backup client interface.
///
/// Listings contain only this application's backups (name prefix +
/// `.json`), newest first.
#[async_trait]
pub trait BackupClient: Send + Sync {
    /// Enumerates existing backups, sorted by creation time descending.
    async fn list_backups(&self) -> BackupResult<Vec<BackupFile>>;

    /// Uploads a backup blob under the given name.
    async fn upload_backup(&self, name: &str, content: &str) -> BackupResult<BackupFile>;

    /// Downloads a backup blob by name.
    async fn download_backup(&self, name: &str) -> BackupResult<String>;

    /// Deletes a backup by name.
    async fn delete_backup(&self, name: &str) -> BackupResult<()>;
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Serialize)]
struct ListRequest<'a> {
    folder: &'a str,
}

#[derive(Debug, Deserialize)]
struct ListResponse {
    #[serde(default)]
    entries: Vec<FileEntry>,
}

#[derive(Debug, Deserialize)]
struct FileEntry {
    name: String,
    #[serde(default)]
    size: u64,
    created: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct DeleteRequest<'a> {
    folder: &'a str,
    name: &'a str,
}

// =============================================================================
// HTTP Client
// =============================================================================

/// HTTP implementation of [`BackupClient`].
pub struct HttpBackupClient {
    base_url: Url,
    folder: String,
    prefix: String,
    client: reqwest::Client,
    auth: Arc<CloudAuth>,
    initial_backoff: Duration,
    max_retry_time: Duration,
}

impl HttpBackupClient {
    /// Creates a client from the backup configuration.
    ///
    /// Validates the configuration first: a client without credentials
    /// cannot make a single successful call.
    pub fn new(config: &BackupConfig) -> BackupResult<Self> {
        config.validate()?;

        let base_url = Url::parse(&config.remote.api_url)?;

        let mut default_headers = HeaderMap::new();
        default_headers.insert("Accept", HeaderValue::from_static("application/json"));

        let client = reqwest::Client::builder()
            .default_headers(default_headers)
            .user_agent(concat!("camarim-pos/", env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(config.backup.connect_timeout_secs))
            .timeout(Duration::from_secs(config.backup.request_timeout_secs))
            .build()
            .map_err(|e| BackupError::Connection(e.to_string()))?;

        let auth = Arc::new(CloudAuth::new(config, client.clone())?);

        Ok(HttpBackupClient {
            base_url,
            folder: config.remote.folder.clone(),
            prefix: config.backup.prefix.clone(),
            client,
            auth,
            initial_backoff: Duration::from_millis(config.backup.initial_backoff_ms),
            max_retry_time: Duration::from_secs(config.backup.max_retry_secs),
        })
    }

    fn endpoint(&self, path: &str) -> BackupResult<Url> {
        Ok(self.base_url.join(path)?)
    }

    fn retry_policy(&self) -> ExponentialBackoff {
        ExponentialBackoff {
            initial_interval: self.initial_backoff,
            multiplier: 2.0,
            max_elapsed_time: Some(self.max_retry_time),
            ..Default::default()
        }
    }

    /// Maps a non-success response to an error, invalidating the cached
    /// token on auth rejections so the next call re-exchanges.
    async fn reject(&self, status: StatusCode, context: &str) -> BackupError {
        match status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => {
                self.auth.invalidate().await;
                BackupError::AuthFailed(format!("{context}: HTTP {status}"))
            }
            StatusCode::NOT_FOUND => BackupError::NotFound(context.to_string()),
            StatusCode::TOO_MANY_REQUESTS => BackupError::RateLimited,
            s if s.is_server_error() => BackupError::Connection(format!("{context}: HTTP {s}")),
            s => BackupError::InvalidResponse(format!("{context}: HTTP {s}")),
        }
    }

    async fn upload_once(&self, name: &str, content: &str) -> BackupResult<BackupFile> {
        let token = self.auth.get_token().await?;
        let mut url = self.endpoint("files/upload")?;
        url.query_pairs_mut()
            .append_pair("folder", &self.folder)
            .append_pair("name", name);

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .header("Content-Type", "application/octet-stream")
            .body(content.to_string())
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.reject(status, name).await);
        }

        let entry: FileEntry = response
            .json()
            .await
            .map_err(|e| BackupError::InvalidResponse(e.to_string()))?;

        Ok(BackupFile {
            name: entry.name,
            size: entry.size,
            created_at: entry.created,
        })
    }
}

#[async_trait]
impl BackupClient for HttpBackupClient {
    async fn list_backups(&self) -> BackupResult<Vec<BackupFile>> {
        let token = self.auth.get_token().await?;
        let url = self.endpoint("files/list")?;

        debug!(folder = %self.folder, "Listing remote backups");

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&ListRequest {
                folder: &self.folder,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.reject(status, &self.folder).await);
        }

        let body: ListResponse = response
            .json()
            .await
            .map_err(|e| BackupError::InvalidResponse(e.to_string()))?;

        let files = filter_and_sort(
            body.entries.into_iter().map(|e| BackupFile {
                name: e.name,
                size: e.size,
                created_at: e.created,
            }),
            &self.prefix,
        );

        debug!(count = files.len(), "Remote backups listed");
        Ok(files)
    }

    async fn upload_backup(&self, name: &str, content: &str) -> BackupResult<BackupFile> {
        info!(name = %name, bytes = content.len(), "Uploading backup");

        let uploaded = backoff::future::retry(self.retry_policy(), || async {
            match self.upload_once(name, content).await {
                Ok(file) => Ok(file),
                Err(e) if e.is_retryable() => {
                    warn!(name = %name, error = %e, "Transient upload failure, will retry");
                    Err(backoff::Error::transient(e))
                }
                Err(e) => Err(backoff::Error::permanent(e)),
            }
        })
        .await?;

        info!(name = %uploaded.name, size = uploaded.size, "Backup uploaded");
        Ok(uploaded)
    }

    async fn download_backup(&self, name: &str) -> BackupResult<String> {
        let token = self.auth.get_token().await?;
        let mut url = self.endpoint("files/content")?;
        url.query_pairs_mut()
            .append_pair("folder", &self.folder)
            .append_pair("name", name);

        debug!(name = %name, "Downloading backup");

        let response = self.client.get(url).bearer_auth(token).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.reject(status, name).await);
        }

        let blob = response
            .text()
            .await
            .map_err(|e| BackupError::Download(e.to_string()))?;

        debug!(name = %name, bytes = blob.len(), "Backup downloaded");
        Ok(blob)
    }

    async fn delete_backup(&self, name: &str) -> BackupResult<()> {
        let token = self.auth.get_token().await?;
        let url = self.endpoint("files/delete")?;

        let response = self
            .client
            .post(url)
            .bearer_auth(token)
            .json(&DeleteRequest {
                folder: &self.folder,
                name,
            })
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(self.reject(status, name).await);
        }

        info!(name = %name, "Backup deleted");
        Ok(())
    }
}

// =============================================================================
// Listing Helpers
// =============================================================================

/// Keeps this application's backups (prefix + `.json`) and sorts them
/// newest first.
fn filter_and_sort(entries: impl Iterator<Item = BackupFile>, prefix: &str) -> Vec<BackupFile> {
    let mut files: Vec<BackupFile> = entries
        .filter(|f| f.name.starts_with(prefix) && f.name.ends_with(".json"))
        .collect();
    files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    files
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn file(name: &str, day: u32) -> BackupFile {
        BackupFile {
            name: name.to_string(),
            size: 100,
            created_at: Utc.with_ymd_and_hms(2026, 8, day, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn test_filter_keeps_only_matching_backups() {
        let entries = vec![
            file("camarim-backup-20260801-120000.json", 1),
            file("unrelated.txt", 2),
            file("other-app-backup.json", 3),
            file("camarim-backup-20260804-120000.json", 4),
        ];

        let files = filter_and_sort(entries.into_iter(), "camarim-backup");
        assert_eq!(files.len(), 2);
        assert!(files.iter().all(|f| f.name.starts_with("camarim-backup")));
    }

    #[test]
    fn test_listing_sorted_newest_first() {
        let entries = vec![
            file("camarim-backup-a.json", 2),
            file("camarim-backup-b.json", 5),
            file("camarim-backup-c.json", 3),
        ];

        let files = filter_and_sort(entries.into_iter(), "camarim-backup");
        assert_eq!(files[0].name, "camarim-backup-b.json");
        assert_eq!(files[1].name, "camarim-backup-c.json");
        assert_eq!(files[2].name, "camarim-backup-a.json");
    }

    #[test]
    fn test_client_requires_credentials() {
        let config = BackupConfig::default();
        assert!(matches!(
            HttpBackupClient::new(&config),
            Err(BackupError::InvalidConfig(_))
        ));
    }

    #[test]
    fn test_client_builds_with_complete_config() {
        let mut config = BackupConfig::default();
        config.account.app_key = "k".into();
        config.account.refresh_token = "t".into();
        assert!(HttpBackupClient::new(&config).is_ok());
    }
}
