use crate::paths;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_API_URL: &str = "https://hydra-api-us-east-1.losbroxas.org";
pub const DEFAULT_WS_URL: &str = "wss://ws.hydralauncher.gg";

/// Runtime configuration for the companion.
///
/// Every field has a default, so an empty or partial `config.yaml` is valid.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct CompanionConfig {
    /// Base URL of the REST surface
    pub api_url: String,
    /// Realtime socket endpoint (the token is appended as a query parameter)
    pub ws_url: String,
    /// Interval between `PING` frames while the socket is open
    pub heartbeat_interval_ms: u64,
    /// First reconnect delay, and the value the delay resets to on open
    pub reconnect_base_ms: u64,
    /// Ceiling for the reconnect delay
    pub reconnect_max_ms: u64,
    /// Session tracker tick interval
    pub tick_interval_ms: u64,
    /// Seconds of playtime accumulated before a delta is reported
    pub sync_threshold_secs: u64,
    /// Refresh the access token when it expires within this many seconds
    pub token_refresh_offset_secs: u64,
    /// Per-request timeout for REST calls
    pub request_timeout_secs: u64,
    /// Backup tool binary (defaults to `~/.hydra-companion/bin/backend`)
    pub backend_path: Option<PathBuf>,
    /// Lock file held by the desktop launcher (defaults to `<tmp>/hydra-launcher.lock`)
    pub launcher_lock_path: Option<PathBuf>,
    /// Directory holding `auth.json` and `library.json`
    pub data_dir: Option<PathBuf>,
}

impl Default for CompanionConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            ws_url: DEFAULT_WS_URL.to_string(),
            heartbeat_interval_ms: 15_000,
            reconnect_base_ms: 1_000,
            reconnect_max_ms: 30_000,
            tick_interval_ms: 1_000,
            sync_threshold_secs: 10,
            token_refresh_offset_secs: 5 * 60,
            request_timeout_secs: 15,
            backend_path: None,
            launcher_lock_path: None,
            data_dir: None,
        }
    }
}

impl CompanionConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&content)
            .with_context(|| format!("Failed to parse config file as YAML: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Loads `~/.hydra-companion/config.yaml` if present, then applies env overrides.
    pub fn resolve() -> Result<Self> {
        let path = paths::config_path()?;
        let mut config = if path.exists() {
            Self::load(&path)?
        } else {
            Self::default()
        };
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Applies `HYDRA_*` environment overrides on top of the file values.
    pub fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("HYDRA_API_URL") {
            self.api_url = url;
        }
        if let Ok(url) = std::env::var("HYDRA_WS_URL") {
            self.ws_url = url;
        }
        if let Some(path) = std::env::var_os("HYDRA_BACKEND_PATH") {
            self.backend_path = Some(PathBuf::from(path));
        }
        if let Some(path) = std::env::var_os("HYDRA_DATA_DIR") {
            self.data_dir = Some(PathBuf::from(path));
        }
    }

    pub fn validate(&self) -> Result<()> {
        let intervals = [
            ("heartbeat_interval_ms", self.heartbeat_interval_ms),
            ("reconnect_base_ms", self.reconnect_base_ms),
            ("reconnect_max_ms", self.reconnect_max_ms),
            ("tick_interval_ms", self.tick_interval_ms),
            ("sync_threshold_secs", self.sync_threshold_secs),
            ("request_timeout_secs", self.request_timeout_secs),
        ];
        for (name, value) in intervals {
            if value == 0 {
                anyhow::bail!("{} must be greater than zero", name);
            }
        }

        if self.reconnect_base_ms > self.reconnect_max_ms {
            anyhow::bail!(
                "reconnect_base_ms ({}) must not exceed reconnect_max_ms ({})",
                self.reconnect_base_ms,
                self.reconnect_max_ms
            );
        }

        url::Url::parse(&self.api_url)
            .with_context(|| format!("Invalid api_url: {}", self.api_url))?;
        url::Url::parse(&self.ws_url).with_context(|| format!("Invalid ws_url: {}", self.ws_url))?;

        Ok(())
    }

    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn resolved_backend_path(&self) -> Result<PathBuf> {
        match &self.backend_path {
            Some(path) => Ok(path.clone()),
            None => Ok(paths::companion_home_dir()?.join("bin").join("backend")),
        }
    }

    pub fn resolved_launcher_lock_path(&self) -> PathBuf {
        self.launcher_lock_path
            .clone()
            .unwrap_or_else(paths::default_launcher_lock_path)
    }

    pub fn resolved_data_dir(&self) -> Result<PathBuf> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => paths::default_data_dir(),
        }
    }
}

#[cfg(test)]
#[path = "tests/config_tests.rs"]
mod tests;
