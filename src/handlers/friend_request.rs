use crate::api::HydraApi;
use crate::envelope::FriendRequest;
use crate::notify::{Notification, Notifier};
use anyhow::{Context, Result};

/// Looks up the sender and announces the request.
pub async fn handle_friend_request(
    api: &dyn HydraApi,
    notifier: &dyn Notifier,
    payload: &FriendRequest,
) -> Result<()> {
    let sender = api
        .user(&payload.sender_id)
        .await
        .with_context(|| format!("Failed to look up friend request sender {}", payload.sender_id))?;

    notifier.notify(
        Notification::new(
            "Friend request",
            format!("{} wants to be your friend", sender.display_name),
        )
        .with_image(sender.profile_image_url),
    );
    Ok(())
}
