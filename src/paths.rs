//! Home-based storage paths for companion state.
//!
//! Everything lives under `~/.hydra-companion/` unless `HYDRA_COMPANION_HOME`
//! points elsewhere:
//! - `config.yaml` - Optional configuration overrides
//! - `logs/companion.log` - Tracing output
//! - `data/` - `auth.json` and `library.json` written by the host application

use anyhow::{Context, Result};
use std::fs;
use std::path::PathBuf;

/// The name of the companion directory.
const COMPANION_DIR: &str = ".hydra-companion";

/// Environment variable overriding the home directory (used by tests and packaging).
pub const HOME_ENV_VAR: &str = "HYDRA_COMPANION_HOME";

/// Returns the companion home directory: `~/.hydra-companion/`
///
/// Creates the directory if it doesn't exist.
///
/// # Errors
///
/// Returns an error if:
/// - Home directory cannot be determined
/// - Directory creation fails
pub fn companion_home_dir() -> Result<PathBuf> {
    let dir = match std::env::var_os(HOME_ENV_VAR) {
        Some(custom) => PathBuf::from(custom),
        None => dirs::home_dir()
            .context("Could not determine home directory for companion storage")?
            .join(COMPANION_DIR),
    };
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create companion directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the config file path: `~/.hydra-companion/config.yaml`
///
/// The file itself is optional; only the parent directory is created.
pub fn config_path() -> Result<PathBuf> {
    Ok(companion_home_dir()?.join("config.yaml"))
}

/// Returns the logs directory: `~/.hydra-companion/logs/`
///
/// Creates the directory if it doesn't exist.
pub fn logs_dir() -> Result<PathBuf> {
    let dir = companion_home_dir()?.join("logs");
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create logs directory: {}", dir.display()))?;
    Ok(dir)
}

/// Returns the default data directory: `~/.hydra-companion/data/`
pub fn default_data_dir() -> Result<PathBuf> {
    Ok(companion_home_dir()?.join("data"))
}

/// Returns the lock file the desktop launcher holds while it is running.
pub fn default_launcher_lock_path() -> PathBuf {
    std::env::temp_dir().join("hydra-launcher.lock")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_home_override_creates_directories() {
        let temp = tempfile::TempDir::new().expect("temp dir");
        let home = temp.path().join("companion-home");
        std::env::set_var(HOME_ENV_VAR, &home);

        let logs = logs_dir().expect("logs dir");
        assert_eq!(logs, home.join("logs"));
        assert!(logs.is_dir());
        assert_eq!(config_path().expect("config path"), home.join("config.yaml"));
        assert_eq!(default_data_dir().expect("data dir"), home.join("data"));

        std::env::remove_var(HOME_ENV_VAR);
    }

    #[test]
    fn test_launcher_lock_lives_in_temp_dir() {
        let path = default_launcher_lock_path();
        assert_eq!(path.parent(), Some(std::env::temp_dir().as_path()));
        assert_eq!(
            path.file_name().and_then(|n| n.to_str()),
            Some("hydra-launcher.lock")
        );
    }
}
