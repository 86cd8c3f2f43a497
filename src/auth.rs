//! Credential provider shared by the socket client and every REST call.
//!
//! The store is the only place the bearer token changes. Callers ask for a
//! token through [`CredentialStore::bearer`], which refreshes it first when it
//! is within the configured offset of expiry.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

/// Credentials issued to the signed-in user.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Auth {
    pub access_token: String,
    pub refresh_token: String,
    /// Access token expiry, epoch milliseconds
    pub token_expiration_timestamp: i64,
}

impl Auth {
    /// Reads `auth.json` written by the host application.
    ///
    /// A missing or blank file means the user is signed out.
    pub fn load(path: &Path) -> Result<Option<Self>> {
        if !path.exists() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read auth file: {}", path.display()))?;
        if content.trim().is_empty() {
            return Ok(None);
        }
        let auth = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse auth file: {}", path.display()))?;
        Ok(Some(auth))
    }
}

/// Result of a token refresh call.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RefreshedToken {
    pub access_token: String,
    /// Lifetime of the new token in seconds
    pub expires_in: i64,
}

/// Performs the refresh exchange against the REST surface.
#[async_trait]
pub trait TokenRefresher: Send + Sync {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken>;
}

pub struct CredentialStore {
    auth: RwLock<Option<Auth>>,
    refresh_offset: Duration,
    /// Serializes refreshes so concurrent callers trigger one exchange.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl CredentialStore {
    pub fn new(auth: Option<Auth>, refresh_offset: Duration) -> Self {
        Self {
            auth: RwLock::new(auth),
            refresh_offset,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current credentials, if signed in.
    pub fn current(&self) -> Option<Auth> {
        self.auth.read().ok().and_then(|guard| guard.clone())
    }

    pub fn has_credentials(&self) -> bool {
        self.current().is_some()
    }

    pub fn replace(&self, auth: Option<Auth>) {
        if let Ok(mut guard) = self.auth.write() {
            *guard = auth;
        }
    }

    /// True when the token expires within the refresh offset of `now_ms`.
    pub fn needs_refresh(&self, auth: &Auth, now_ms: i64) -> bool {
        let offset_ms = i64::try_from(self.refresh_offset.as_millis()).unwrap_or(i64::MAX);
        auth.token_expiration_timestamp < now_ms.saturating_add(offset_ms)
    }

    /// Returns a usable access token, refreshing it first when near expiry.
    ///
    /// `Ok(None)` means there are no credentials at all.
    pub async fn bearer(&self, refresher: &dyn TokenRefresher) -> Result<Option<String>> {
        let Some(auth) = self.current() else {
            return Ok(None);
        };
        if !self.needs_refresh(&auth, chrono::Utc::now().timestamp_millis()) {
            return Ok(Some(auth.access_token));
        }

        let _refreshing = self.refresh_lock.lock().await;

        // Another caller may have refreshed while this one waited.
        let Some(auth) = self.current() else {
            return Ok(None);
        };
        let now_ms = chrono::Utc::now().timestamp_millis();
        if !self.needs_refresh(&auth, now_ms) {
            return Ok(Some(auth.access_token));
        }

        tracing::debug!("access token near expiry, refreshing");
        let refreshed = refresher
            .refresh(&auth.refresh_token)
            .await
            .context("Failed to refresh access token")?;

        let updated = Auth {
            access_token: refreshed.access_token.clone(),
            refresh_token: auth.refresh_token,
            token_expiration_timestamp: now_ms
                .saturating_add(refreshed.expires_in.saturating_mul(1000)),
        };
        self.replace(Some(updated));
        Ok(Some(refreshed.access_token))
    }
}
