// src/core/persistence/mod.rs

//! Snapshot persistence: the on-disk format, loading at startup, and inline or
//! background saves.

pub mod saver;
pub mod snapshot;

pub use saver::{load_snapshot, save_blocking, spawn_background_save};
pub use snapshot::Snapshot;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{info, warn};

/// Holds the persistence bookkeeping shared with background save workers.
#[derive(Debug, Clone)]
pub struct PersistenceState {
    pub path: String,
    /// Set while a background save is running. Only one may run at a time.
    pub is_saving: Arc<AtomicBool>,
    /// Number of state changes since the last successful save.
    pub dirty: Arc<AtomicU64>,
    /// Unix time, in seconds, of the last successful save. 0 if none.
    pub last_save: Arc<AtomicU64>,
    /// Set when the most recent save attempt failed.
    pub last_save_failed: Arc<AtomicBool>,
}

impl PersistenceState {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            is_saving: Arc::new(AtomicBool::new(false)),
            dirty: Arc::new(AtomicU64::new(0)),
            last_save: Arc::new(AtomicU64::new(0)),
            last_save_failed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn mark_dirty(&self) {
        self.dirty.fetch_add(1, Ordering::Relaxed);
    }

    pub fn dirty(&self) -> u64 {
        self.dirty.load(Ordering::Relaxed)
    }

    pub fn is_saving(&self) -> bool {
        self.is_saving.load(Ordering::SeqCst)
    }

    pub fn last_save(&self) -> u64 {
        self.last_save.load(Ordering::Relaxed)
    }

    pub fn last_save_failed(&self) -> bool {
        self.last_save_failed.load(Ordering::Relaxed)
    }

    /// Records a successful save that captured `dirty_at_start` changes.
    pub(crate) fn record_success(&self, dirty_at_start: u64) {
        // Changes made while the save ran stay counted.
        self.dirty.fetch_sub(dirty_at_start, Ordering::Relaxed);
        self.last_save.store(unix_now_secs(), Ordering::Relaxed);
        if self.last_save_failed.swap(false, Ordering::Relaxed) {
            info!("Snapshot saves to {} are succeeding again.", self.path);
        }
    }

    pub(crate) fn record_failure(&self) {
        if !self.last_save_failed.swap(true, Ordering::Relaxed) {
            warn!("Changes are no longer being persisted until a save to {} succeeds.", self.path);
        }
    }
}

pub(crate) fn unix_now_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}
