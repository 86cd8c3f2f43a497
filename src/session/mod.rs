//! Game session lifecycle.
//!
//! The host reports tracked processes starting and stopping. A matched start
//! opens a [`record::SessionRecord`] that a 1 s ticker advances; every 10 s of play is
//! reported as a playtime delta unless the desktop launcher is running (it
//! reports playtime itself). A matched stop may trigger a cloud backup.

mod record;
mod tracker;

use chrono::{DateTime, Utc};
use serde::Deserialize;

pub use record::format_playtime;
pub use tracker::{SessionTracker, TrackerDeps, TrackerSettings};

/// A process lifecycle notification from the host.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleSignal {
    pub process_id: u32,
    pub running: bool,
}

pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}
