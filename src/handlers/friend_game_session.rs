use crate::api::{HydraApi, DEFAULT_SHOP};
use crate::envelope::FriendGameSession;
use crate::notify::{Notification, Notifier};
use anyhow::{Context, Result};

/// Announces that a friend started a game.
///
/// The profile and the game metadata are fetched concurrently; either
/// failing drops the notification.
pub async fn handle_friend_game_session(
    api: &dyn HydraApi,
    notifier: &dyn Notifier,
    payload: &FriendGameSession,
) -> Result<()> {
    let (friend, stats) = tokio::join!(
        api.user(&payload.friend_id),
        api.game_stats(&payload.object_id, DEFAULT_SHOP),
    );
    let friend = friend.with_context(|| format!("Failed to look up friend {}", payload.friend_id))?;
    let stats =
        stats.with_context(|| format!("Failed to fetch game stats for {}", payload.object_id))?;

    let title = stats
        .assets
        .map(|assets| assets.title)
        .with_context(|| format!("Game {} has no display assets", payload.object_id))?;

    notifier.notify(
        Notification::new(format!("{} started playing", friend.display_name), title)
            .with_image(friend.profile_image_url),
    );
    Ok(())
}
