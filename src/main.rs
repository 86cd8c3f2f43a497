mod api;
mod auth;
mod backup;
mod config;
mod envelope;
mod handlers;
mod host;
mod launcher;
mod library;
mod logging;
mod notify;
mod paths;
mod profile;
mod session;
mod ws;

use anyhow::{Context, Result};
use api::{HttpApi, HydraApi};
use auth::{Auth, CredentialStore};
use backup::CommandUploader;
use clap::{Parser, Subcommand};
use config::CompanionConfig;
use handlers::Dispatcher;
use launcher::{LauncherProbe, LockFileProbe};
use library::JsonFileLibrary;
use notify::Notifier;
use profile::ProfileStore;
use session::{SessionTracker, SystemClock, TrackerDeps, TrackerSettings};
use std::sync::Arc;
use std::time::Duration;
use ws::{WsClient, WsSettings};

#[derive(Parser)]
#[command(name = "hydra-companion")]
#[command(about = "Realtime notifications, playtime tracking and cloud backups for Hydra")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect, track sessions and read host messages from stdin (default)
    Run,
    /// Print the resolved configuration as YAML
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    match cli.command.unwrap_or(Commands::Run) {
        Commands::Run => run().await,
        Commands::CheckConfig => check_config(),
    }
}

fn check_config() -> Result<()> {
    let config = CompanionConfig::resolve()?;
    let yaml = serde_yaml::to_string(&config).context("Failed to serialize config")?;
    print!("{}", yaml);
    Ok(())
}

async fn run() -> Result<()> {
    let _log_guard = logging::init();
    tracing::info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = env!("HYDRA_COMPANION_GIT_SHA"),
        built_at = env!("HYDRA_COMPANION_BUILD_TIMESTAMP"),
        "hydra-companion starting"
    );

    let config = CompanionConfig::resolve()?;
    let data_dir = config.resolved_data_dir()?;

    let auth = Auth::load(&data_dir.join("auth.json")).unwrap_or_else(|e| {
        tracing::warn!(error = %format!("{:#}", e), "ignoring unreadable credentials");
        None
    });
    let credentials = Arc::new(CredentialStore::new(
        auth,
        Duration::from_secs(config.token_refresh_offset_secs),
    ));
    let api: Arc<dyn HydraApi> = Arc::new(HttpApi::new(
        &config.api_url,
        config.request_timeout(),
        Arc::clone(&credentials),
    )?);
    let profile = Arc::new(ProfileStore::default());
    let probe: Arc<dyn LauncherProbe> =
        Arc::new(LockFileProbe::new(config.resolved_launcher_lock_path()));
    let notifier: Arc<dyn Notifier> = Arc::from(notify::default_notifier());

    let client = if credentials.has_credentials() {
        if let Err(e) = profile.refresh(api.as_ref()).await {
            tracing::warn!(error = %format!("{:#}", e), "profile unavailable, automatic backups disabled");
        }
        let client = WsClient::spawn(
            WsSettings::from_config(&config)?,
            Arc::clone(&api),
            Arc::clone(&probe),
            Arc::new(Dispatcher::new(Arc::clone(&api), Arc::clone(&notifier))),
        );
        client.connect();
        Some(client)
    } else {
        tracing::info!("signed out, realtime connection disabled");
        None
    };

    let tracker = SessionTracker::new(
        TrackerDeps {
            api: Arc::clone(&api),
            library: Arc::new(JsonFileLibrary::new(data_dir.join("library.json"))),
            probe,
            uploader: Arc::new(CommandUploader::new(config.resolved_backend_path()?)),
            notifier,
            credentials,
            profile,
            clock: Arc::new(SystemClock),
        },
        TrackerSettings::from_config(&config),
    );

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    tokio::select! {
        result = host::run_host_loop(stdin, Arc::clone(&tracker)) => {
            if let Err(e) = result {
                tracing::warn!(error = %format!("{:#}", e), "host channel failed");
            }
        }
        _ = tokio::signal::ctrl_c() => tracing::info!("interrupted"),
    }

    if let Some(record) = tracker.snapshot() {
        tracing::info!(
            object_id = %record.object_id,
            playtime = %session::format_playtime(record.elapsed_time_in_millis),
            "closing session still open at exit"
        );
    }
    tracker.stop_tracking();
    if let Some(client) = client {
        tracing::debug!(
            state = ?client.state(),
            attempts = client.attempts(),
            "stopping realtime connection"
        );
        client.stop().await;
    }
    tracing::info!("hydra-companion stopped");
    Ok(())
}
