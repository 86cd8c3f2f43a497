//! Host channel: one JSON object per line on stdin.
//!
//! ```text
//! {"processId": 1245620, "running": true}
//! {"backupObjectId": "1245620"}
//! ```

use crate::session::{LifecycleSignal, SessionTracker};
use anyhow::{Context, Result};
use serde::Deserialize;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt};

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum HostMessage {
    Lifecycle(LifecycleSignal),
    #[serde(rename_all = "camelCase")]
    ManualBackup { backup_object_id: String },
}

/// Parses one line. Blank lines yield `None`.
pub fn parse_line(line: &str) -> Result<Option<HostMessage>> {
    let line = line.trim();
    if line.is_empty() {
        return Ok(None);
    }
    let message = serde_json::from_str(line)
        .with_context(|| format!("Unrecognized host message: {}", line))?;
    Ok(Some(message))
}

/// Feeds host messages to the tracker in arrival order until EOF.
pub async fn run_host_loop<R>(reader: R, tracker: Arc<SessionTracker>) -> Result<()>
where
    R: AsyncBufRead + Unpin,
{
    let mut lines = reader.lines();
    while let Some(line) = lines
        .next_line()
        .await
        .context("Failed to read from host")?
    {
        let message = match parse_line(&line) {
            Ok(Some(message)) => message,
            Ok(None) => continue,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "ignoring host message");
                continue;
            }
        };

        match message {
            HostMessage::Lifecycle(signal) => {
                tracing::debug!(
                    process_id = signal.process_id,
                    running = signal.running,
                    "lifecycle signal"
                );
                tracker.handle_signal(signal).await;
            }
            HostMessage::ManualBackup { backup_object_id } => {
                match tracker.request_backup(&backup_object_id).await {
                    Ok(_running) => {
                        tracing::info!(object_id = %backup_object_id, "manual backup started")
                    }
                    Err(e) => tracing::warn!(
                        object_id = %backup_object_id,
                        error = %format!("{:#}", e),
                        "manual backup rejected"
                    ),
                }
            }
        }
    }
    tracing::info!("host closed stdin");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parses_lifecycle_signal() {
        let message = parse_line(r#"{"processId": 1245620, "running": true}"#)
            .unwrap()
            .unwrap();
        assert_eq!(
            message,
            HostMessage::Lifecycle(LifecycleSignal {
                process_id: 1_245_620,
                running: true,
            })
        );
    }

    #[test]
    fn test_parses_manual_backup() {
        let message = parse_line(r#" {"backupObjectId":"1245620"} "#)
            .unwrap()
            .unwrap();
        assert_eq!(
            message,
            HostMessage::ManualBackup {
                backup_object_id: "1245620".to_string()
            }
        );
    }

    #[test]
    fn test_blank_line_is_skipped() {
        assert!(parse_line("   ").unwrap().is_none());
    }

    #[test]
    fn test_garbage_is_an_error() {
        assert!(parse_line("hello").is_err());
        assert!(parse_line(r#"{"processId": -1, "running": true}"#).is_err());
        assert!(parse_line(r#"{"running": true}"#).is_err());
    }
}
