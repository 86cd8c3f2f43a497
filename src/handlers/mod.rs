//! Reactions to decoded realtime events.

mod friend_game_session;
mod friend_request;

use crate::api::HydraApi;
use crate::envelope::Envelope;
use crate::notify::Notifier;
use crate::ws::EnvelopeHandler;
use async_trait::async_trait;
use std::sync::Arc;

pub use friend_game_session::handle_friend_game_session;
pub use friend_request::handle_friend_request;

/// Routes each envelope to the handler for its payload kind.
pub struct Dispatcher {
    api: Arc<dyn HydraApi>,
    notifier: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(api: Arc<dyn HydraApi>, notifier: Arc<dyn Notifier>) -> Self {
        Self { api, notifier }
    }
}

#[async_trait]
impl EnvelopeHandler for Dispatcher {
    async fn handle(&self, envelope: Envelope) {
        let kind = envelope.kind();
        let result = match envelope {
            Envelope::FriendRequest(payload) => {
                handle_friend_request(self.api.as_ref(), self.notifier.as_ref(), &payload).await
            }
            Envelope::FriendGameSession(payload) => {
                handle_friend_game_session(self.api.as_ref(), self.notifier.as_ref(), &payload)
                    .await
            }
            Envelope::Unknown => Ok(()),
        };

        if let Err(e) = result {
            tracing::warn!(kind, error = %format!("{:#}", e), "event handler failed");
        }
    }
}
