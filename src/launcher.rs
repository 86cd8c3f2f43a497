//! Detection of the desktop launcher.
//!
//! The desktop launcher reports playtime and raises its own social
//! notifications while it runs; the companion stays quiet during that time.

use async_trait::async_trait;
use std::path::PathBuf;

#[async_trait]
pub trait LauncherProbe: Send + Sync {
    /// Whether the competing launcher process is currently active.
    async fn is_running(&self) -> bool;
}

/// Probe backed by the lock file the launcher holds while running.
pub struct LockFileProbe {
    lock_path: PathBuf,
}

impl LockFileProbe {
    pub fn new(lock_path: PathBuf) -> Self {
        Self { lock_path }
    }
}

#[async_trait]
impl LauncherProbe for LockFileProbe {
    async fn is_running(&self) -> bool {
        tokio::fs::try_exists(&self.lock_path).await.unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_lock_file_presence_drives_probe() {
        let temp = tempfile::TempDir::new().unwrap();
        let lock = temp.path().join("hydra-launcher.lock");
        let probe = LockFileProbe::new(lock.clone());

        assert!(!probe.is_running().await);
        std::fs::write(&lock, "").unwrap();
        assert!(probe.is_running().await);
        std::fs::remove_file(&lock).unwrap();
        assert!(!probe.is_running().await);
    }
}
