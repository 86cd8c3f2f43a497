//! Payloads exchanged with the REST surface.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Short-lived token for the realtime socket (`POST /auth/ws`).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
pub struct WsToken {
    pub token: String,
}

/// Public profile of another user (`GET /users/{id}`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub id: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct Subscription {
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// The signed-in user (`GET /profile/me`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub display_name: String,
    #[serde(default)]
    pub profile_image_url: Option<String>,
    #[serde(default)]
    pub subscription: Option<Subscription>,
}

impl User {
    /// Whether the subscription is still running at `now`.
    pub fn has_active_subscription(&self, now: DateTime<Utc>) -> bool {
        self.subscription
            .as_ref()
            .and_then(|s| s.expires_at)
            .is_some_and(|expires_at| expires_at > now)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct GameAssets {
    pub title: String,
    #[serde(default)]
    pub cover_image_url: Option<String>,
    #[serde(default)]
    pub icon_url: Option<String>,
}

/// Display metadata for a catalogue game (`GET /games/stats`).
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GameStats {
    #[serde(default)]
    pub assets: Option<GameAssets>,
}

/// Body of `PUT /profile/games/{remoteId}`.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaytimeUpdate {
    pub play_time_delta_in_seconds: u64,
    pub last_time_played: DateTime<Utc>,
}
