use crate::api::PlaytimeUpdate;
use crate::library::LibraryEntry;
use chrono::{DateTime, Utc};

/// The tracked run of one library game.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    pub object_id: String,
    pub remote_id: String,
    pub title: String,
    pub started_at: DateTime<Utc>,
    pub elapsed_time_in_millis: u64,
    /// When playtime was last reported (the start time until the first report)
    pub last_sync_tick: DateTime<Utc>,
}

impl SessionRecord {
    pub fn start(entry: &LibraryEntry, now: DateTime<Utc>) -> Self {
        Self {
            object_id: entry.object_id.clone(),
            remote_id: entry.remote_id.clone(),
            title: entry.title.clone(),
            started_at: now,
            elapsed_time_in_millis: 0,
            last_sync_tick: now,
        }
    }

    /// Recomputes elapsed time from the start. A clock stepping backwards
    /// leaves the value where it was.
    pub fn advance(&mut self, now: DateTime<Utc>) {
        let elapsed = millis_between(self.started_at, now);
        self.elapsed_time_in_millis = self.elapsed_time_in_millis.max(elapsed);
    }

    /// Whole seconds since the last report.
    pub fn seconds_since_last_sync(&self, now: DateTime<Utc>) -> u64 {
        millis_between(self.last_sync_tick, now) / 1000
    }

    pub fn playtime_update(&self, delta_seconds: u64) -> PlaytimeUpdate {
        PlaytimeUpdate {
            play_time_delta_in_seconds: delta_seconds,
            last_time_played: self.started_at,
        }
    }
}

fn millis_between(from: DateTime<Utc>, to: DateTime<Utc>) -> u64 {
    u64::try_from((to - from).num_milliseconds()).unwrap_or(0)
}

/// Formats milliseconds as `HH:MM:SS`. Hours are not wrapped at 24.
pub fn format_playtime(millis: u64) -> String {
    let total = millis / 1000;
    format!(
        "{:02}:{:02}:{:02}",
        total / 3600,
        (total % 3600) / 60,
        total % 60
    )
}
