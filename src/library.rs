//! Library entries exported by the host application.
//!
//! The host writes `library.json` into the data directory; the companion
//! reads it on every lifecycle signal so newly added games are picked up
//! without a restart.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Static metadata for a game eligible for tracking and backup.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LibraryEntry {
    pub remote_id: String,
    pub title: String,
    #[serde(default)]
    pub icon_url: Option<String>,
    pub object_id: String,
    #[serde(default = "default_shop")]
    pub shop: String,
    #[serde(default)]
    pub wine_prefix_path: Option<String>,
    #[serde(default)]
    pub automatic_cloud_sync: bool,
}

fn default_shop() -> String {
    crate::api::DEFAULT_SHOP.to_string()
}

impl LibraryEntry {
    /// Whether a host process identifier refers to this entry.
    ///
    /// Matches the object id exactly, or any wine prefix path containing it
    /// (non-Steam shortcuts run inside a prefix named after their app id).
    pub fn matches_process(&self, process_id: &str) -> bool {
        self.object_id == process_id
            || self
                .wine_prefix_path
                .as_deref()
                .is_some_and(|path| path.contains(process_id))
    }
}

/// Finds the entry a process identifier refers to.
pub fn find_entry<'a>(library: &'a [LibraryEntry], process_id: &str) -> Option<&'a LibraryEntry> {
    library.iter().find(|entry| entry.matches_process(process_id))
}

/// Sorts entries by title for display.
pub fn sort_by_title(library: &mut [LibraryEntry]) {
    library.sort_by(|a, b| a.title.to_lowercase().cmp(&b.title.to_lowercase()));
}

#[async_trait]
pub trait LibrarySource: Send + Sync {
    async fn load(&self) -> Result<Vec<LibraryEntry>>;
}

/// Reads `library.json` from disk.
pub struct JsonFileLibrary {
    path: PathBuf,
}

impl JsonFileLibrary {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }
}

#[async_trait]
impl LibrarySource for JsonFileLibrary {
    async fn load(&self) -> Result<Vec<LibraryEntry>> {
        if !tokio::fs::try_exists(&self.path).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        let content = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("Failed to read library file: {}", self.path.display()))?;
        let mut library: Vec<LibraryEntry> = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse library file: {}", self.path.display()))?;
        sort_by_title(&mut library);
        Ok(library)
    }
}
