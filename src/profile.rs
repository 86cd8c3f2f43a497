//! Cached profile of the signed-in user.

use crate::api::{HydraApi, User};
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::RwLock;

#[derive(Default)]
pub struct ProfileStore {
    user: RwLock<Option<User>>,
}

impl ProfileStore {
    #[cfg(test)]
    pub fn new(user: Option<User>) -> Self {
        Self {
            user: RwLock::new(user),
        }
    }

    pub fn current(&self) -> Option<User> {
        self.user.read().ok().and_then(|guard| guard.clone())
    }

    pub fn set(&self, user: Option<User>) {
        if let Ok(mut guard) = self.user.write() {
            *guard = user;
        }
    }

    /// Whether the cached user holds a subscription that is still running.
    pub fn has_active_subscription(&self, now: DateTime<Utc>) -> bool {
        self.current()
            .is_some_and(|user| user.has_active_subscription(now))
    }

    /// Fetches `GET /profile/me` and caches the result.
    pub async fn refresh(&self, api: &dyn HydraApi) -> Result<User> {
        let user = api.profile_me().await.context("Failed to fetch profile")?;
        tracing::info!(user_id = %user.id, username = %user.username, "profile loaded");
        self.set(Some(user.clone()));
        Ok(user)
    }
}
