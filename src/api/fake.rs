//! In-memory [`HydraApi`] for tests.

use super::types::{GameAssets, GameStats, PlaytimeUpdate, User, UserProfile};
use super::HydraApi;
use anyhow::Result;
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;
use std::time::Instant;

#[derive(Default)]
pub struct FakeApi {
    /// Scripted socket token results; once drained every call succeeds.
    ws_tokens: Mutex<VecDeque<Result<String, String>>>,
    ws_token_calls: Mutex<Vec<Instant>>,
    users: Mutex<HashMap<String, UserProfile>>,
    games: Mutex<HashMap<String, GameStats>>,
    profile: Mutex<Option<User>>,
    access_token: Mutex<Option<String>>,
    fail_playtime: Mutex<bool>,
    playtime_updates: Mutex<Vec<(String, PlaytimeUpdate)>>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            access_token: Mutex::new(Some("access-1".to_string())),
            ..Self::default()
        }
    }

    pub fn script_ws_tokens(&self, results: Vec<Result<&str, &str>>) {
        let mut tokens = self.ws_tokens.lock().unwrap();
        tokens.extend(
            results
                .into_iter()
                .map(|r| r.map(String::from).map_err(String::from)),
        );
    }

    pub fn ws_token_calls(&self) -> Vec<Instant> {
        self.ws_token_calls.lock().unwrap().clone()
    }

    pub fn add_user(&self, id: &str, display_name: &str, image: Option<&str>) {
        self.users.lock().unwrap().insert(
            id.to_string(),
            UserProfile {
                id: id.to_string(),
                display_name: display_name.to_string(),
                profile_image_url: image.map(String::from),
            },
        );
    }

    pub fn add_game(&self, object_id: &str, title: &str) {
        self.games.lock().unwrap().insert(
            object_id.to_string(),
            GameStats {
                assets: Some(GameAssets {
                    title: title.to_string(),
                    cover_image_url: None,
                    icon_url: None,
                }),
            },
        );
    }

    pub fn set_profile(&self, user: Option<User>) {
        *self.profile.lock().unwrap() = user;
    }

    pub fn set_access_token(&self, token: Option<&str>) {
        *self.access_token.lock().unwrap() = token.map(String::from);
    }

    pub fn fail_playtime(&self) {
        *self.fail_playtime.lock().unwrap() = true;
    }

    pub fn playtime_updates(&self) -> Vec<(String, PlaytimeUpdate)> {
        self.playtime_updates.lock().unwrap().clone()
    }
}

#[async_trait]
impl HydraApi for FakeApi {
    async fn ws_token(&self) -> Result<String> {
        self.ws_token_calls.lock().unwrap().push(Instant::now());
        let next = self.ws_tokens.lock().unwrap().pop_front();
        match next {
            Some(Ok(token)) => Ok(token),
            Some(Err(message)) => Err(anyhow::anyhow!(message)),
            None => Ok("ws-token".to_string()),
        }
    }

    async fn profile_me(&self) -> Result<User> {
        self.profile
            .lock()
            .unwrap()
            .clone()
            .ok_or_else(|| anyhow::anyhow!("signed out"))
    }

    async fn user(&self, user_id: &str) -> Result<UserProfile> {
        self.users
            .lock()
            .unwrap()
            .get(user_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("GET /users/{} failed: http status: 404", user_id))
    }

    async fn game_stats(&self, object_id: &str, _shop: &str) -> Result<GameStats> {
        self.games
            .lock()
            .unwrap()
            .get(object_id)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("GET /games/stats failed: http status: 404"))
    }

    async fn update_playtime(&self, remote_id: &str, update: &PlaytimeUpdate) -> Result<()> {
        self.playtime_updates
            .lock()
            .unwrap()
            .push((remote_id.to_string(), update.clone()));
        if *self.fail_playtime.lock().unwrap() {
            anyhow::bail!("PUT /profile/games/{} failed: http status: 503", remote_id);
        }
        Ok(())
    }

    async fn access_token(&self) -> Result<Option<String>> {
        Ok(self.access_token.lock().unwrap().clone())
    }
}
