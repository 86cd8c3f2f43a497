//! REST surface consumed by the companion.
//!
//! - **Trait (`HydraApi`)**: the calls the connection client, event handlers
//!   and session tracker make. Everything above this module depends on the
//!   trait only, so tests substitute in-memory fakes.
//! - **HTTP (`http.rs`)**: `ureq`-backed implementation with transparent
//!   bearer refresh through the shared [`CredentialStore`](crate::auth::CredentialStore).
//! - **Types (`types.rs`)**: request and response payloads.

#[cfg(test)]
pub mod fake;
pub mod http;
pub mod types;

use anyhow::Result;
use async_trait::async_trait;

pub use http::HttpApi;
pub use types::{GameStats, PlaytimeUpdate, User, UserProfile};

/// Shop every library entry belongs to.
pub const DEFAULT_SHOP: &str = "steam";

#[async_trait]
pub trait HydraApi: Send + Sync {
    /// Exchanges the current credential for a realtime socket token.
    async fn ws_token(&self) -> Result<String>;

    /// Fetches the signed-in user.
    async fn profile_me(&self) -> Result<User>;

    /// Fetches another user's public profile.
    async fn user(&self, user_id: &str) -> Result<UserProfile>;

    /// Fetches display metadata for a catalogue game.
    async fn game_stats(&self, object_id: &str, shop: &str) -> Result<GameStats>;

    /// Reports a playtime delta for a library game.
    async fn update_playtime(&self, remote_id: &str, update: &PlaytimeUpdate) -> Result<()>;

    /// A fresh access token for collaborators that authenticate on their own
    /// (the backup tool). `None` when signed out.
    async fn access_token(&self) -> Result<Option<String>>;
}
