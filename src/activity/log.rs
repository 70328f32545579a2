//! Activity counters with optional persistence.
//!
//! Counters live in a fixed array indexed by [`Counter`]. When a log is
//! backed by a file, the file holds the last [`ActivityStats`] snapshot and
//! a new run continues from its totals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// What the monitor counts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Counter {
    /// Files accepted and labeled
    UploadsAccepted,
    /// Files rejected before or during ingestion
    UploadsRejected,
    /// Readings passed through the classifier
    Predictions,
    /// Ticks that rendered a frame
    TicksRendered,
    /// Ticks skipped while waiting for input
    TicksIdle,
}

const COUNTERS: usize = 5;

impl Counter {
    pub const ALL: [Counter; COUNTERS] = [
        Counter::UploadsAccepted,
        Counter::UploadsRejected,
        Counter::Predictions,
        Counter::TicksRendered,
        Counter::TicksIdle,
    ];

    fn slot(self) -> usize {
        self as usize
    }

    /// Label used by [`ActivityLog::summary`].
    pub fn label(self) -> &'static str {
        match self {
            Counter::UploadsAccepted => "Uploads accepted",
            Counter::UploadsRejected => "Uploads rejected",
            Counter::Predictions => "Predictions",
            Counter::TicksRendered => "Frames rendered",
            Counter::TicksIdle => "Idle ticks",
        }
    }
}

/// Activity counters for one process.
#[derive(Debug)]
pub struct ActivityLog {
    counters: [AtomicU64; COUNTERS],
    started_at: DateTime<Utc>,
    persist_path: Option<PathBuf>,
}

/// Thread-safe shared activity log.
pub type SharedActivityLog = Arc<ActivityLog>;

impl ActivityLog {
    /// In-memory log starting at zero.
    pub fn new() -> Self {
        Self {
            counters: Default::default(),
            started_at: Utc::now(),
            persist_path: None,
        }
    }

    /// In-memory log behind an `Arc`.
    pub fn shared() -> SharedActivityLog {
        Arc::new(Self::new())
    }

    /// Log backed by `path`, continuing the totals saved there. An unreadable
    /// file is logged and the counters start at zero.
    pub fn persistent(path: PathBuf) -> Self {
        let mut log = Self::new();
        match read_snapshot(&path) {
            Ok(Some(previous)) => log.restore(&previous),
            Ok(None) => {}
            Err(e) => tracing::warn!("Ignoring activity file {}: {e}", path.display()),
        }
        log.persist_path = Some(path);
        log
    }

    pub fn add(&self, counter: Counter, n: u64) {
        self.counters[counter.slot()].fetch_add(n, Ordering::Relaxed);
    }

    pub fn get(&self, counter: Counter) -> u64 {
        self.counters[counter.slot()].load(Ordering::Relaxed)
    }

    /// An accepted upload and the predictions it took.
    pub fn record_upload(&self, predictions: u64) {
        self.add(Counter::UploadsAccepted, 1);
        self.add(Counter::Predictions, predictions);
    }

    pub fn record_rejected_upload(&self) {
        self.add(Counter::UploadsRejected, 1);
    }

    /// A single prediction outside of an upload.
    pub fn record_prediction(&self) {
        self.add(Counter::Predictions, 1);
    }

    pub fn record_tick(&self) {
        self.add(Counter::TicksRendered, 1);
    }

    pub fn record_idle_tick(&self) {
        self.add(Counter::TicksIdle, 1);
    }

    pub fn stats(&self) -> ActivityStats {
        ActivityStats {
            uploads_accepted: self.get(Counter::UploadsAccepted),
            uploads_rejected: self.get(Counter::UploadsRejected),
            predictions: self.get(Counter::Predictions),
            ticks_rendered: self.get(Counter::TicksRendered),
            ticks_idle: self.get(Counter::TicksIdle),
            session_start: self.started_at,
            session_duration_secs: (Utc::now() - self.started_at).num_seconds().max(0) as u64,
        }
    }

    pub fn summary(&self) -> String {
        let mut lines = vec!["Activity:".to_string()];
        for counter in Counter::ALL {
            lines.push(format!("- {}: {}", counter.label(), self.get(counter)));
        }
        lines.push(format!(
            "- Running for: {} seconds",
            self.stats().session_duration_secs
        ));
        lines.join("\n")
    }

    /// Write the current snapshot to the backing file, if any.
    pub fn save(&self) -> std::io::Result<()> {
        let Some(path) = &self.persist_path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(&self.stats()).map_err(std::io::Error::other)?;
        std::fs::write(path, json)
    }

    /// Zero every counter. The backing file changes on the next save.
    pub fn reset(&self) {
        for counter in &self.counters {
            counter.store(0, Ordering::Relaxed);
        }
    }

    fn restore(&mut self, previous: &ActivityStats) {
        let totals = [
            previous.uploads_accepted,
            previous.uploads_rejected,
            previous.predictions,
            previous.ticks_rendered,
            previous.ticks_idle,
        ];
        for (counter, total) in Counter::ALL.into_iter().zip(totals) {
            self.counters[counter.slot()].store(total, Ordering::Relaxed);
        }
    }
}

impl Default for ActivityLog {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of the counters; also the on-disk format.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityStats {
    pub uploads_accepted: u64,
    pub uploads_rejected: u64,
    pub predictions: u64,
    pub ticks_rendered: u64,
    pub ticks_idle: u64,
    pub session_start: DateTime<Utc>,
    pub session_duration_secs: u64,
}

/// Read a saved snapshot. `Ok(None)` when nothing has been saved yet.
pub fn read_snapshot(path: &Path) -> std::io::Result<Option<ActivityStats>> {
    if !path.exists() {
        return Ok(None);
    }
    let content = std::fs::read_to_string(path)?;
    serde_json::from_str(&content)
        .map(Some)
        .map_err(std::io::Error::other)
}
