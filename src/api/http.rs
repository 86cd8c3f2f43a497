//! HTTP implementation of [`HydraApi`].
//!
//! `ureq` is blocking, so every call runs on tokio's blocking pool and the
//! async callers only await the join handle.

use super::types::{GameStats, PlaytimeUpdate, User, UserProfile, WsToken};
use super::HydraApi;
use crate::auth::{CredentialStore, RefreshedToken, TokenRefresher};
use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

const USER_AGENT: &str = "Hydra-Decky-Plugin";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Method {
    Get,
    Post,
    Put,
}

impl Method {
    fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
        }
    }
}

pub struct HttpApi {
    base_url: Url,
    agent: ureq::Agent,
    credentials: Arc<CredentialStore>,
}

impl HttpApi {
    pub fn new(base_url: &str, timeout: Duration, credentials: Arc<CredentialStore>) -> Result<Self> {
        let base_url =
            Url::parse(base_url).with_context(|| format!("Invalid API base URL: {}", base_url))?;
        if base_url.cannot_be_a_base() {
            anyhow::bail!("API base URL cannot carry paths: {}", base_url);
        }
        let agent: ureq::Agent = ureq::Agent::config_builder()
            .timeout_global(Some(timeout))
            .build()
            .into();

        Ok(Self {
            base_url,
            agent,
            credentials,
        })
    }

    /// Builds `<base>/<segments...>`, escaping each segment.
    fn endpoint(&self, segments: &[&str]) -> Result<Url> {
        let mut url = self.base_url.clone();
        url.path_segments_mut()
            .map_err(|_| anyhow::anyhow!("API base URL cannot carry paths: {}", self.base_url))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Sends an authenticated request, refreshing the bearer first if needed.
    async fn send_authorized(&self, method: Method, url: Url, body: Option<String>) -> Result<String> {
        let bearer = self.credentials.bearer(self).await?;
        self.send(method, url, body, bearer).await
    }

    async fn send(
        &self,
        method: Method,
        url: Url,
        body: Option<String>,
        bearer: Option<String>,
    ) -> Result<String> {
        let agent = self.agent.clone();
        let label = format!("{} {}", method.as_str(), url.path());

        tokio::task::spawn_blocking(move || execute(&agent, method, url.as_str(), body, bearer))
            .await
            .context("HTTP worker task failed")?
            .with_context(|| format!("{} failed", label))
    }
}

fn execute(
    agent: &ureq::Agent,
    method: Method,
    url: &str,
    body: Option<String>,
    bearer: Option<String>,
) -> Result<String> {
    let bearer = bearer.as_deref();
    let mut response = match (method, body) {
        (Method::Get, _) => with_headers(agent.get(url), bearer).call()?,
        (Method::Post, None) => with_headers(agent.post(url), bearer).send_empty()?,
        (Method::Post, Some(body)) => with_headers(agent.post(url), bearer)
            .header("Content-Type", "application/json")
            .send(&body)?,
        (Method::Put, body) => with_headers(agent.put(url), bearer)
            .header("Content-Type", "application/json")
            .send(&body.unwrap_or_default())?,
    };

    let text = response
        .body_mut()
        .read_to_string()
        .context("Failed to read response body")?;
    Ok(text)
}

fn with_headers<B>(request: ureq::RequestBuilder<B>, bearer: Option<&str>) -> ureq::RequestBuilder<B> {
    let request = request.header("User-Agent", USER_AGENT);
    match bearer {
        Some(token) => request.header("Authorization", &format!("Bearer {}", token)),
        None => request,
    }
}

fn parse_json<T: DeserializeOwned>(body: &str, what: &str) -> Result<T> {
    serde_json::from_str(body).with_context(|| format!("Failed to parse {} response", what))
}

#[async_trait]
impl TokenRefresher for HttpApi {
    async fn refresh(&self, refresh_token: &str) -> Result<RefreshedToken> {
        let url = self.endpoint(&["auth", "refresh"])?;
        let body = serde_json::to_string(&serde_json::json!({ "refreshToken": refresh_token }))?;
        let text = self.send(Method::Post, url, Some(body), None).await?;
        parse_json(&text, "token refresh")
    }
}

#[async_trait]
impl HydraApi for HttpApi {
    async fn ws_token(&self) -> Result<String> {
        let url = self.endpoint(&["auth", "ws"])?;
        let text = self.send_authorized(Method::Post, url, None).await?;
        let token: WsToken = parse_json(&text, "socket token")?;
        Ok(token.token)
    }

    async fn profile_me(&self) -> Result<User> {
        let url = self.endpoint(&["profile", "me"])?;
        let text = self.send_authorized(Method::Get, url, None).await?;
        parse_json(&text, "profile")
    }

    async fn user(&self, user_id: &str) -> Result<UserProfile> {
        let url = self.endpoint(&["users", user_id])?;
        let text = self.send_authorized(Method::Get, url, None).await?;
        parse_json(&text, "user profile")
    }

    async fn game_stats(&self, object_id: &str, shop: &str) -> Result<GameStats> {
        let mut url = self.endpoint(&["games", "stats"])?;
        url.query_pairs_mut()
            .append_pair("objectId", object_id)
            .append_pair("shop", shop);
        let text = self.send_authorized(Method::Get, url, None).await?;
        parse_json(&text, "game stats")
    }

    async fn update_playtime(&self, remote_id: &str, update: &PlaytimeUpdate) -> Result<()> {
        let url = self.endpoint(&["profile", "games", remote_id])?;
        let body = serde_json::to_string(update).context("Failed to serialize playtime update")?;
        self.send_authorized(Method::Put, url, Some(body)).await?;
        Ok(())
    }

    async fn access_token(&self) -> Result<Option<String>> {
        self.credentials.bearer(self).await
    }
}

#[cfg(test)]
#[path = "tests/http_tests.rs"]
mod tests;
