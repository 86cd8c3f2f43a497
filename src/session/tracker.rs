use super::record::{format_playtime, SessionRecord};
use super::{Clock, LifecycleSignal};
use crate::api::HydraApi;
use crate::auth::CredentialStore;
use crate::backup::{BackupGate, BackupRequest, BackupUploader};
use crate::config::CompanionConfig;
use crate::launcher::LauncherProbe;
use crate::library::{find_entry, LibraryEntry, LibrarySource};
use crate::notify::{Notification, Notifier};
use crate::profile::ProfileStore;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

const LABEL_TIME_FORMAT: &str = "%Y-%m-%d %H:%M";

const BACKUP_SUCCESS_TITLE: &str = "Backup and upload successful";
const BACKUP_SUCCESS_BODY: &str = "The game has been backed up and uploaded to the cloud";
const BACKUP_FAILURE_TITLE: &str = "Backup failed";

#[derive(Debug, Clone)]
pub struct TrackerSettings {
    pub tick_interval: Duration,
    /// Whole seconds of play between playtime reports
    pub sync_threshold_secs: u64,
}

impl TrackerSettings {
    pub fn from_config(config: &CompanionConfig) -> Self {
        Self {
            tick_interval: config.tick_interval(),
            sync_threshold_secs: config.sync_threshold_secs,
        }
    }
}

/// Collaborators the tracker reads from or reports to.
pub struct TrackerDeps {
    pub api: Arc<dyn HydraApi>,
    pub library: Arc<dyn LibrarySource>,
    pub probe: Arc<dyn LauncherProbe>,
    pub uploader: Arc<dyn BackupUploader>,
    pub notifier: Arc<dyn Notifier>,
    pub credentials: Arc<CredentialStore>,
    pub profile: Arc<ProfileStore>,
    pub clock: Arc<dyn Clock>,
}

/// What a single tick did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickOutcome {
    /// No session, or the session it was scheduled for is gone.
    Idle,
    Advanced,
    /// A report was due but the launcher is running.
    LauncherActive,
    /// A playtime report was dispatched.
    SyncSent,
}

#[derive(Default)]
struct TrackerState {
    record: Option<SessionRecord>,
    /// Bumped on every clear so work started for an older session can tell.
    generation: u64,
    ticker: Option<JoinHandle<()>>,
}

pub struct SessionTracker {
    deps: TrackerDeps,
    settings: TrackerSettings,
    state: Mutex<TrackerState>,
    backups: Arc<BackupGate>,
}

impl SessionTracker {
    pub fn new(deps: TrackerDeps, settings: TrackerSettings) -> Arc<Self> {
        Arc::new(Self {
            deps,
            settings,
            state: Mutex::new(TrackerState::default()),
            backups: BackupGate::new(),
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, TrackerState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// The running session, if any.
    pub fn snapshot(&self) -> Option<SessionRecord> {
        self.lock_state().record.clone()
    }

    /// Applies a lifecycle signal from the host.
    ///
    /// Any signal ends the current session first. A start for a library game
    /// opens a fresh session; a stop for one goes through the backup policy.
    pub async fn handle_signal(self: &Arc<Self>, signal: LifecycleSignal) {
        let generation = self.clear();

        let library = match self.deps.library.load().await {
            Ok(library) => library,
            Err(e) => {
                tracing::warn!(error = %format!("{:#}", e), "could not load library");
                Vec::new()
            }
        };
        if self.lock_state().generation != generation {
            tracing::debug!(process_id = signal.process_id, "signal superseded");
            return;
        }

        let process_id = signal.process_id.to_string();
        let Some(entry) = find_entry(&library, &process_id) else {
            tracing::debug!(
                process_id = signal.process_id,
                running = signal.running,
                "process is not a library game"
            );
            return;
        };

        if signal.running {
            self.start(generation, entry);
        } else {
            self.stopped(entry).await;
        }
    }

    /// Ends the current session without a signal (shutdown).
    pub fn stop_tracking(&self) {
        self.clear();
    }

    fn clear(&self) -> u64 {
        let mut state = self.lock_state();
        state.generation = state.generation.wrapping_add(1);
        if let Some(ticker) = state.ticker.take() {
            ticker.abort();
        }
        if let Some(record) = state.record.take() {
            tracing::info!(
                object_id = %record.object_id,
                playtime = %format_playtime(record.elapsed_time_in_millis),
                "session ended"
            );
        }
        state.generation
    }

    fn start(self: &Arc<Self>, generation: u64, entry: &LibraryEntry) {
        let now = self.deps.clock.now();
        let mut state = self.lock_state();
        if state.generation != generation {
            return;
        }
        tracing::info!(object_id = %entry.object_id, title = %entry.title, "session started");
        state.record = Some(SessionRecord::start(entry, now));
        state.ticker = Some(self.spawn_ticker(generation));
    }

    fn spawn_ticker(self: &Arc<Self>, generation: u64) -> JoinHandle<()> {
        let tracker = Arc::downgrade(self);
        let period = self.settings.tick_interval;
        tokio::spawn(async move {
            let mut interval = tokio::time::interval_at(Instant::now() + period, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                interval.tick().await;
                let Some(tracker) = tracker.upgrade() else {
                    break;
                };
                let now = tracker.deps.clock.now();
                if tracker.tick_generation(generation, now).await == TickOutcome::Idle {
                    break;
                }
            }
        })
    }

    /// Runs one tick for the current session at `now`.
    #[cfg(test)]
    pub async fn tick_at(&self, now: DateTime<Utc>) -> TickOutcome {
        let generation = self.lock_state().generation;
        self.tick_generation(generation, now).await
    }

    async fn tick_generation(&self, generation: u64, now: DateTime<Utc>) -> TickOutcome {
        let due = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return TickOutcome::Idle;
            }
            let Some(record) = state.record.as_mut() else {
                return TickOutcome::Idle;
            };
            record.advance(now);
            record.seconds_since_last_sync(now) >= self.settings.sync_threshold_secs
        };
        if !due {
            return TickOutcome::Advanced;
        }

        if self.deps.probe.is_running().await {
            tracing::debug!("launcher active, skipping playtime report");
            return TickOutcome::LauncherActive;
        }

        let (remote_id, update) = {
            let mut state = self.lock_state();
            if state.generation != generation {
                return TickOutcome::Idle;
            }
            let Some(record) = state.record.as_mut() else {
                return TickOutcome::Idle;
            };
            let delta = record.seconds_since_last_sync(now);
            record.last_sync_tick = now;
            (record.remote_id.clone(), record.playtime_update(delta))
        };

        // At most once: the tick has advanced and a failed report is not resent.
        let api = Arc::clone(&self.deps.api);
        tokio::spawn(async move {
            match api.update_playtime(&remote_id, &update).await {
                Ok(()) => tracing::debug!(
                    remote_id = %remote_id,
                    delta = update.play_time_delta_in_seconds,
                    "playtime reported"
                ),
                Err(e) => tracing::warn!(
                    remote_id = %remote_id,
                    error = %format!("{:#}", e),
                    "playtime report failed"
                ),
            }
        });
        TickOutcome::SyncSent
    }

    async fn stopped(&self, entry: &LibraryEntry) {
        if !entry.automatic_cloud_sync {
            tracing::debug!(object_id = %entry.object_id, "automatic cloud sync disabled");
            return;
        }
        if !self.deps.credentials.has_credentials() {
            tracing::debug!("signed out, skipping automatic backup");
            return;
        }
        let now = self.deps.clock.now();
        if !self.deps.profile.has_active_subscription(now) {
            tracing::debug!("no active subscription, skipping automatic backup");
            return;
        }
        if self.deps.probe.is_running().await {
            tracing::debug!("launcher active, skipping automatic backup");
            return;
        }

        let label = format!("Automatic backup {}", now.format(LABEL_TIME_FORMAT));
        if self.spawn_backup(entry.clone(), label).is_none() {
            tracing::info!(object_id = %entry.object_id, "backup already running");
        }
    }

    /// Starts a backup the user asked for. Fails when the game is unknown,
    /// the user cannot back up, or a backup of it is already running.
    pub async fn request_backup(&self, object_id: &str) -> Result<JoinHandle<()>> {
        let library = self
            .deps
            .library
            .load()
            .await
            .context("Failed to load library")?;
        let entry = library
            .into_iter()
            .find(|entry| entry.object_id == object_id)
            .with_context(|| format!("{} is not in the library", object_id))?;

        if !self.deps.credentials.has_credentials() {
            anyhow::bail!("Cannot back up {} while signed out", object_id);
        }
        let now = self.deps.clock.now();
        if !self.deps.profile.has_active_subscription(now) {
            anyhow::bail!("Cannot back up {} without an active subscription", object_id);
        }

        let label = format!("Manual backup {}", now.format(LABEL_TIME_FORMAT));
        self.spawn_backup(entry, label)
            .with_context(|| format!("A backup of {} is already running", object_id))
    }

    fn spawn_backup(&self, entry: LibraryEntry, label: String) -> Option<JoinHandle<()>> {
        let permit = self.backups.try_begin(&entry.object_id)?;
        let api = Arc::clone(&self.deps.api);
        let uploader = Arc::clone(&self.deps.uploader);
        let notifier = Arc::clone(&self.deps.notifier);

        Some(tokio::spawn(async move {
            let _permit = permit;
            let result = run_backup(api.as_ref(), uploader.as_ref(), &entry, label).await;
            let notification = match result {
                Ok(()) => {
                    tracing::info!(object_id = %entry.object_id, "backup uploaded");
                    Notification::new(BACKUP_SUCCESS_TITLE, BACKUP_SUCCESS_BODY)
                }
                Err(e) => {
                    tracing::warn!(
                        object_id = %entry.object_id,
                        error = %format!("{:#}", e),
                        "backup failed"
                    );
                    Notification::new(
                        BACKUP_FAILURE_TITLE,
                        format!("{} could not be backed up to the cloud", entry.title),
                    )
                }
            };
            notifier.notify(notification.with_image(entry.icon_url.clone()));
        }))
    }
}

async fn run_backup(
    api: &dyn HydraApi,
    uploader: &dyn BackupUploader,
    entry: &LibraryEntry,
    label: String,
) -> Result<()> {
    let access_token = api
        .access_token()
        .await
        .context("Failed to obtain access token")?
        .context("Signed out")?;
    uploader
        .backup_and_upload(&BackupRequest {
            object_id: entry.object_id.clone(),
            wine_prefix: entry.wine_prefix_path.clone(),
            access_token,
            label,
        })
        .await
}

#[cfg(test)]
#[path = "tests/tracker_tests.rs"]
mod tests;
