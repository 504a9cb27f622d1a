// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery.
//!
//! Snapshots store the complete materialized state at a point in time,
//! identified by the WAL sequence number. Recovery loads the snapshot and
//! replays WAL entries after that sequence.

use crate::error::StorageError;
use crate::state::MaterializedState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Current snapshot schema version
pub const CURRENT_SNAPSHOT_VERSION: u32 = 1;

const ZSTD_LEVEL: i32 = 3;
const MAX_BAK_FILES: u32 = 3;

/// A snapshot of the materialized state at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Schema version for migrations
    #[serde(rename = "v")]
    pub version: u32,
    /// WAL sequence number at the time of snapshot
    pub seq: u64,
    /// The complete materialized state
    pub state: MaterializedState,
    /// When this snapshot was created
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    /// Load the snapshot at `path`, or `None` when there is none yet.
    pub fn load(path: &Path) -> Result<Option<Snapshot>, StorageError> {
        if !path.exists() {
            return Ok(None);
        }
        let compressed = fs::read(path)?;
        let raw = zstd::stream::decode_all(compressed.as_slice())?;
        let snapshot: Snapshot = serde_json::from_slice(&raw)?;
        Ok(Some(snapshot))
    }

    /// Write atomically: temp file + rename, rotating older snapshots into
    /// `.bak` files.
    pub fn save(&self, path: &Path) -> Result<(), StorageError> {
        let raw = serde_json::to_vec(self)?;
        let compressed = zstd::stream::encode_all(raw.as_slice(), ZSTD_LEVEL)?;

        let tmp = path.with_extension("tmp");
        fs::write(&tmp, compressed)?;

        if path.exists() {
            let bak = rotate_bak_path(path);
            let _ = fs::rename(path, bak);
        }
        fs::rename(&tmp, path)?;
        Ok(())
    }
}

/// Pick the next `.bak` / `.bak.N` path, rotating older backups out.
///
/// Keeps up to [`MAX_BAK_FILES`] backups: `.bak`, `.bak.2`, `.bak.3`.
/// The oldest backup is removed when the limit is reached.
fn rotate_bak_path(path: &Path) -> PathBuf {
    let bak = |n: u32| {
        if n == 1 {
            path.with_extension("bak")
        } else {
            path.with_extension(format!("bak.{n}"))
        }
    };

    let oldest = bak(MAX_BAK_FILES);
    if oldest.exists() {
        let _ = fs::remove_file(&oldest);
    }

    for n in (1..MAX_BAK_FILES).rev() {
        let src = bak(n);
        if src.exists() {
            let _ = fs::rename(&src, bak(n + 1));
        }
    }

    bak(1)
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
