//! # Cloud Authentication Manager
//!
//! OAuth2 token management for the file-storage API. The account holds a
//! long-lived refresh token; this module exchanges it for short-lived
//! bearer tokens and refreshes them ahead of expiry.
//!
//! ## Token Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                     OAuth2 Refresh-Token Flow                           │
//! │                                                                         │
//! │  ┌────────────────┐                      ┌─────────────────────┐       │
//! │  │ camarim-backup │                      │  File-Storage API   │       │
//! │  └───────┬────────┘                      └──────────┬──────────┘       │
//! │          │  POST /oauth2/token                      │                  │
//! │          │  grant_type=refresh_token                │                  │
//! │          │─────────────────────────────────────────►│                  │
//! │          │  access_token + expires_in               │                  │
//! │          │◄─────────────────────────────────────────│                  │
//! │          │                                          │                  │
//! │          │  [cached until 5 min before expiry]      │                  │
//! │          │                                          │                  │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use url::Url;

use crate::config::BackupConfig;
use crate::error::{BackupError, BackupResult};

/// Margin before token expiration to trigger refresh (5 minutes).
const REFRESH_MARGIN_SECS: u64 = 300;

// =============================================================================
// Token Info
// =============================================================================

/// A cached bearer token and its expiry.
#[derive(Debug, Clone)]
pub struct TokenInfo {
    /// The bearer access token.
    pub access_token: String,
    /// When the access token expires (local monotonic time).
    pub expires_at: Instant,
}

impl TokenInfo {
    /// True when the token is expired or about to expire.
    pub fn needs_refresh(&self) -> bool {
        Instant::now() + Duration::from_secs(REFRESH_MARGIN_SECS) >= self.expires_at
    }

    /// True when the token is completely expired (no grace period).
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Remaining valid time in seconds.
    pub fn remaining_secs(&self) -> u64 {
        let now = Instant::now();
        if now >= self.expires_at {
            0
        } else {
            (self.expires_at - now).as_secs()
        }
    }
}

// =============================================================================
// Wire Types
// =============================================================================

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    expires_in: u64,
}

#[derive(Debug, Deserialize)]
struct TokenErrorResponse {
    #[serde(default)]
    error: String,
    #[serde(default)]
    error_description: String,
}

// =============================================================================
// Cloud Auth
// =============================================================================

/// OAuth2 token manager for the file-storage account.
pub struct CloudAuth {
    token_url: Url,
    app_key: String,
    app_secret: String,
    refresh_token: String,
    client: reqwest::Client,
    token: Arc<RwLock<Option<TokenInfo>>>,
}

impl CloudAuth {
    /// Creates an auth manager from the backup configuration.
    pub fn new(config: &BackupConfig, client: reqwest::Client) -> BackupResult<Self> {
        let base = Url::parse(&config.remote.api_url)?;
        let token_url = base.join("oauth2/token")?;

        Ok(CloudAuth {
            token_url,
            app_key: config.account.app_key.clone(),
            app_secret: config.account.app_secret.clone(),
            refresh_token: config.account.refresh_token.clone(),
            client,
            token: Arc::new(RwLock::new(None)),
        })
    }

    /// Returns a valid bearer token, exchanging or refreshing as needed.
    ///
    /// ## Flow
    /// 1. A cached token outside its refresh margin is returned as-is
    /// 2. Otherwise the refresh token is exchanged for a new one
    /// 3. Concurrent callers are serialized by a double-checked write lock
    pub async fn get_token(&self) -> BackupResult<String> {
        {
            let guard = self.token.read().await;
            if let Some(token) = guard.as_ref() {
                if !token.needs_refresh() {
                    debug!(remaining_secs = token.remaining_secs(), "Using cached token");
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut guard = self.token.write().await;

        // Another caller may have refreshed while we waited for the lock
        if let Some(token) = guard.as_ref() {
            if !token.needs_refresh() {
                return Ok(token.access_token.clone());
            }
        }

        let new_token = self.exchange_refresh_token().await?;
        info!(
            expires_in_secs = new_token.remaining_secs(),
            "Access token refreshed"
        );
        let access_token = new_token.access_token.clone();
        *guard = Some(new_token);

        Ok(access_token)
    }

    /// True when a non-expired token is cached.
    pub async fn is_authenticated(&self) -> bool {
        match self.token.read().await.as_ref() {
            Some(token) => !token.is_expired(),
            None => false,
        }
    }

    /// Drops the cached token; the next call re-exchanges.
    pub async fn invalidate(&self) {
        *self.token.write().await = None;
        debug!("Cached access token dropped");
    }

    async fn exchange_refresh_token(&self) -> BackupResult<TokenInfo> {
        debug!(url = %self.token_url, "Exchanging refresh token");

        let params = [
            ("grant_type", "refresh_token"),
            ("refresh_token", self.refresh_token.as_str()),
            ("client_id", self.app_key.as_str()),
            ("client_secret", self.app_secret.as_str()),
        ];

        let response = self
            .client
            .post(self.token_url.clone())
            .form(&params)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let detail = match response.json::<TokenErrorResponse>().await {
                Ok(body) if !body.error.is_empty() => {
                    format!("{} ({})", body.error, body.error_description)
                }
                _ => format!("HTTP {status}"),
            };
            warn!(%status, "Token exchange rejected");
            return Err(BackupError::AuthFailed(detail));
        }

        let body: TokenResponse = response
            .json()
            .await
            .map_err(|e| BackupError::InvalidResponse(e.to_string()))?;

        Ok(TokenInfo {
            access_token: body.access_token,
            expires_at: Instant::now() + Duration::from_secs(body.expires_in),
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
