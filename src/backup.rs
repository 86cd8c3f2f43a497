//! Backup-and-upload through the external backend tool.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashSet;
use std::path::PathBuf;
use std::process::Stdio;
use std::sync::{Arc, Mutex};

/// One backup request handed to the uploader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub object_id: String,
    pub wine_prefix: Option<String>,
    pub access_token: String,
    pub label: String,
}

#[async_trait]
pub trait BackupUploader: Send + Sync {
    /// Runs one backup to completion. `Ok` only when the tool reports success.
    async fn backup_and_upload(&self, request: &BackupRequest) -> Result<()>;
}

/// Invokes `<backend> backup-and-upload <objectId> <winePrefix> <accessToken> <label>`.
pub struct CommandUploader {
    backend_path: PathBuf,
}

impl CommandUploader {
    pub fn new(backend_path: PathBuf) -> Self {
        Self { backend_path }
    }
}

#[async_trait]
impl BackupUploader for CommandUploader {
    async fn backup_and_upload(&self, request: &BackupRequest) -> Result<()> {
        tracing::info!(object_id = %request.object_id, label = %request.label, "starting backup");

        let output = tokio::process::Command::new(&self.backend_path)
            .arg("backup-and-upload")
            .arg(&request.object_id)
            .arg(request.wine_prefix.as_deref().unwrap_or_default())
            .arg(&request.access_token)
            .arg(&request.label)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .with_context(|| format!("Failed to launch backup tool: {}", self.backend_path.display()))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            anyhow::bail!(
                "backup tool exited with {}: {}",
                output.status,
                stderr.trim()
            );
        }
        Ok(())
    }
}

/// Allows at most one running backup per object id.
#[derive(Default)]
pub struct BackupGate {
    running: Mutex<HashSet<String>>,
}

impl BackupGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Claims the slot for `object_id`, or `None` when a backup is already running.
    /// The slot is released when the returned permit drops.
    pub fn try_begin(self: &Arc<Self>, object_id: &str) -> Option<BackupPermit> {
        let mut running = self.running.lock().ok()?;
        if !running.insert(object_id.to_string()) {
            return None;
        }
        Some(BackupPermit {
            gate: Arc::clone(self),
            object_id: object_id.to_string(),
        })
    }

    #[cfg(test)]
    pub fn is_running(&self, object_id: &str) -> bool {
        self.running
            .lock()
            .map(|running| running.contains(object_id))
            .unwrap_or(false)
    }
}

pub struct BackupPermit {
    gate: Arc<BackupGate>,
    object_id: String,
}

impl Drop for BackupPermit {
    fn drop(&mut self) {
        if let Ok(mut running) = self.gate.running.lock() {
            running.remove(&self.object_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request() -> BackupRequest {
        BackupRequest {
            object_id: "1245620".to_string(),
            wine_prefix: Some("/pfx/1245620".to_string()),
            access_token: "access-1".to_string(),
            label: "Automatic backup".to_string(),
        }
    }

    #[test]
    fn test_gate_is_single_flight_per_object() {
        let gate = BackupGate::new();
        let first = gate.try_begin("a").unwrap();
        assert!(gate.try_begin("a").is_none());
        assert!(gate.try_begin("b").is_some());
        assert!(gate.is_running("a"));

        drop(first);
        assert!(!gate.is_running("a"));
        assert!(gate.try_begin("a").is_some());
    }

    #[cfg(unix)]
    fn write_script(dir: &std::path::Path, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join("backend");
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_receives_arguments_in_order() {
        let temp = tempfile::TempDir::new().unwrap();
        let args_file = temp.path().join("args.txt");
        let script = write_script(
            temp.path(),
            &format!("printf '%s\\n' \"$@\" > {}", args_file.display()),
        );

        CommandUploader::new(script)
            .backup_and_upload(&request())
            .await
            .unwrap();

        let args = std::fs::read_to_string(args_file).unwrap();
        let args: Vec<&str> = args.lines().collect();
        assert_eq!(
            args,
            vec![
                "backup-and-upload",
                "1245620",
                "/pfx/1245620",
                "access-1",
                "Automatic backup"
            ]
        );
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_nonzero_exit_is_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let script = write_script(temp.path(), "echo 'quota exceeded' >&2; exit 3");

        let err = CommandUploader::new(script)
            .backup_and_upload(&request())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_missing_tool_is_failure() {
        let temp = tempfile::TempDir::new().unwrap();
        let result = CommandUploader::new(temp.path().join("nope"))
            .backup_and_upload(&request())
            .await;
        assert!(result.is_err());
    }
}
