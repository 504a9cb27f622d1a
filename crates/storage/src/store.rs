// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The store handle: one mutex over state + WAL.

use crate::error::StorageError;
use crate::snapshot::{Snapshot, CURRENT_SNAPSHOT_VERSION};
use crate::state::{MaterializedState, RowEvent};
use crate::wal::Wal;
use chrono::Utc;
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const WAL_FILE: &str = "rows.wal";
const SNAPSHOT_FILE: &str = "snapshot.json.zst";

/// WAL entries accumulated since the last checkpoint before the store
/// writes a fresh snapshot on commit.
const CHECKPOINT_EVERY: u64 = 512;

struct StoreInner {
    state: MaterializedState,
    wal: Wal,
    snapshot_path: PathBuf,
    last_checkpoint_seq: u64,
}

/// Cheap-clone handle to the row store.
///
/// Every repository call locks, appends to the WAL, applies, and unlocks.
/// One lock span per call is the row-level atomicity the rest of the system
/// relies on.
#[derive(Clone)]
pub struct Store {
    inner: Arc<Mutex<StoreInner>>,
}

impl Store {
    /// Open a store rooted at `dir`, creating it on first use. Loads the
    /// snapshot, then replays any WAL entries past its sequence.
    pub fn open(dir: &Path) -> Result<Store, StorageError> {
        std::fs::create_dir_all(dir)?;
        let snapshot_path = dir.join(SNAPSHOT_FILE);
        let wal_path = dir.join(WAL_FILE);

        let (mut state, snapshot_seq) = match Snapshot::load(&snapshot_path)? {
            Some(snapshot) => (snapshot.state, snapshot.seq),
            None => (MaterializedState::default(), 0),
        };

        let replayed = Wal::read_entries(&wal_path, snapshot_seq)?;
        let replay_count = replayed.len();
        for entry in &replayed {
            state.apply(&entry.event);
        }

        let mut wal = Wal::open(&wal_path)?;
        wal.ensure_seq_at_least(snapshot_seq);

        tracing::info!(
            dir = %dir.display(),
            snapshot_seq,
            replayed = replay_count,
            jobs = state.jobs.len(),
            schedules = state.schedules.len(),
            "store opened"
        );

        Ok(Store {
            inner: Arc::new(Mutex::new(StoreInner {
                state,
                wal,
                snapshot_path,
                last_checkpoint_seq: snapshot_seq,
            })),
        })
    }

    /// Append `event` to the WAL and apply it to the state, atomically with
    /// respect to every other store call.
    pub(crate) fn commit(&self, event: RowEvent) -> Result<(), StorageError> {
        let mut inner = self.inner.lock();
        let seq = inner.wal.append(&event)?;
        inner.state.apply(&event);
        if seq - inner.last_checkpoint_seq >= CHECKPOINT_EVERY {
            if let Err(e) = checkpoint_locked(&mut inner) {
                tracing::warn!(error = %e, "periodic checkpoint failed");
            }
        }
        Ok(())
    }

    /// Read a view of the state under the lock.
    pub(crate) fn read<R>(&self, f: impl FnOnce(&MaterializedState) -> R) -> R {
        f(&self.inner.lock().state)
    }

    /// Commit `event` only if `check` passes against the current state,
    /// holding the lock across both: the compare-and-swap the terminal
    /// status guard needs.
    pub(crate) fn commit_if(
        &self,
        check: impl FnOnce(&MaterializedState) -> bool,
        event: RowEvent,
    ) -> Result<bool, StorageError> {
        let mut inner = self.inner.lock();
        if !check(&inner.state) {
            return Ok(false);
        }
        inner.wal.append(&event)?;
        inner.state.apply(&event);
        Ok(true)
    }

    /// Write a snapshot and truncate the WAL.
    pub fn checkpoint(&self) -> Result<(), StorageError> {
        checkpoint_locked(&mut self.inner.lock())
    }
}

fn checkpoint_locked(inner: &mut StoreInner) -> Result<(), StorageError> {
    let snapshot = Snapshot {
        version: CURRENT_SNAPSHOT_VERSION,
        seq: inner.wal.write_seq(),
        state: inner.state.clone(),
        created_at: Utc::now(),
    };
    snapshot.save(&inner.snapshot_path)?;
    inner.wal.truncate()?;
    inner.last_checkpoint_seq = snapshot.seq;
    tracing::debug!(seq = snapshot.seq, "checkpoint written");
    Ok(())
}

#[cfg(test)]
#[path = "store_tests.rs"]
mod tests;
