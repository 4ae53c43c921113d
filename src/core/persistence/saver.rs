// src/core/persistence/saver.rs

//! Writing snapshots to disk, inline or on a blocking worker, and loading them at startup.

use super::PersistenceState;
use super::snapshot::Snapshot;
use crate::core::BrokerError;
use crate::core::broker::Broker;
use crate::core::metrics;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;
use std::sync::atomic::Ordering;
use tokio::time::Instant;
use tracing::{debug, error, info};

/// Saves the broker state inline. Refused while a background save is running.
pub fn save_blocking(broker: &Broker) -> Result<(), BrokerError> {
    if broker.persistence.is_saving() {
        return Err(BrokerError::Persistence(
            "a background save is already in progress".into(),
        ));
    }
    let dirty_at_start = broker.persistence.dirty();
    let snapshot = Snapshot::capture(broker, Instant::now());
    write_snapshot(&broker.persistence, &snapshot, dirty_at_start)
}

/// Hands a copy of the broker state to a blocking worker that writes it to disk.
///
/// Returns `false` without doing anything if a background save is already running.
pub fn spawn_background_save(broker: &Broker) -> bool {
    let state = broker.persistence.clone();
    if state
        .is_saving
        .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
        .is_err()
    {
        debug!("Snapshot save already in progress. Skipping this trigger.");
        return false;
    }

    let dirty_at_start = state.dirty();
    let snapshot = Snapshot::capture(broker, Instant::now());
    metrics::SNAPSHOT_SAVE_IN_PROGRESS.set(1.0);
    info!("Spawning background snapshot save.");

    tokio::task::spawn_blocking(move || {
        if let Err(e) = write_snapshot(&state, &snapshot, dirty_at_start) {
            error!("Background snapshot save failed: {}", e);
        }
        state.is_saving.store(false, Ordering::SeqCst);
        metrics::SNAPSHOT_SAVE_IN_PROGRESS.set(0.0);
    });
    true
}

/// Reads the snapshot at `path`. A missing or empty file yields `None`.
pub fn load_snapshot(path: &str) -> Result<Option<Snapshot>, BrokerError> {
    let data = match fs::read(path) {
        Ok(data) => data,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            info!("Snapshot file not found at {}. Starting empty.", path);
            return Ok(None);
        }
        Err(e) => return Err(e.into()),
    };
    if data.is_empty() {
        info!("Snapshot file at {} is empty. Starting empty.", path);
        return Ok(None);
    }
    info!("Snapshot file found ({} bytes). Parsing...", data.len());
    Snapshot::decode(&data).map(Some)
}

/// Writes `snapshot` to a temporary file next to the target, then renames it into place.
fn write_snapshot(
    state: &PersistenceState,
    snapshot: &Snapshot,
    dirty_at_start: u64,
) -> Result<(), BrokerError> {
    let timer = metrics::SNAPSHOT_SAVE_SECONDS.start_timer();
    let result = write_atomically(&state.path, snapshot);
    timer.observe_duration();

    match result {
        Ok(()) => {
            info!("Snapshot saved to {}", state.path);
            state.record_success(dirty_at_start);
            Ok(())
        }
        Err(e) => {
            error!("Failed to save snapshot to {}: {}", state.path, e);
            state.record_failure();
            Err(BrokerError::Persistence(e.to_string()))
        }
    }
}

fn write_atomically(path: &str, snapshot: &Snapshot) -> std::io::Result<()> {
    let temp_path = format!("{}.tmp.{}", path, rand::random::<u32>());
    let bytes = snapshot.encode();
    if let Err(e) = fs::write(&temp_path, &bytes) {
        let _ = fs::remove_file(&temp_path);
        return Err(e);
    }
    if let Err(e) = fs::rename(&temp_path, Path::new(path)) {
        if let Err(remove_err) = fs::remove_file(&temp_path) {
            error!(
                "Additionally failed to remove temporary snapshot file '{}': {}",
                temp_path, remove_err
            );
        }
        return Err(e);
    }
    Ok(())
}
