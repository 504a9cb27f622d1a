// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only write-ahead log of row events.
//!
//! One JSON object per line, `{"seq": N, "event": {...}}`. Appends are
//! flushed and synced before the in-memory state is mutated, so a crash can
//! lose at most an unacknowledged write, never ordering.

use crate::error::StorageError;
use crate::state::RowEvent;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

/// One logged mutation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalEntry {
    pub seq: u64,
    pub event: RowEvent,
}

/// Writer handle over the log file.
pub struct Wal {
    path: PathBuf,
    writer: BufWriter<File>,
    write_seq: u64,
}

impl Wal {
    /// Open (creating if absent) and position after the last valid entry.
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let write_seq = match Self::read_entries(path, 0) {
            Ok(entries) => entries.last().map(|e| e.seq).unwrap_or(0),
            Err(_) => 0,
        };
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            write_seq,
        })
    }

    /// Highest sequence number written so far (0 when empty).
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// Raise the sequence counter to at least `seq`. Called after loading a
    /// snapshot so sequence numbers stay monotonic across checkpoints.
    pub fn ensure_seq_at_least(&mut self, seq: u64) {
        self.write_seq = self.write_seq.max(seq);
    }

    /// Append an event, returning its sequence number. Synced to disk
    /// before returning.
    pub fn append(&mut self, event: &RowEvent) -> Result<u64, StorageError> {
        let seq = self.write_seq + 1;
        let entry = WalEntry { seq, event: event.clone() };
        let line = serde_json::to_string(&entry)?;
        self.writer.write_all(line.as_bytes())?;
        self.writer.write_all(b"\n")?;
        self.writer.flush()?;
        self.writer.get_ref().sync_data()?;
        self.write_seq = seq;
        Ok(seq)
    }

    /// Read all entries with `seq > after_seq`.
    ///
    /// A torn final line (crash mid-append) is tolerated and dropped; any
    /// earlier corruption is an error.
    pub fn read_entries(path: &Path, after_seq: u64) -> Result<Vec<WalEntry>, StorageError> {
        if !path.exists() {
            return Ok(Vec::new());
        }
        let reader = BufReader::new(File::open(path)?);
        let mut entries = Vec::new();
        let mut lines = reader.lines().enumerate().peekable();
        while let Some((idx, line)) = lines.next() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<WalEntry>(&line) {
                Ok(entry) => {
                    if entry.seq > after_seq {
                        entries.push(entry);
                    }
                }
                Err(e) if lines.peek().is_none() => {
                    tracing::warn!(line = idx + 1, error = %e, "dropping torn WAL tail");
                }
                Err(e) => {
                    return Err(StorageError::CorruptWal {
                        line: idx + 1,
                        reason: e.to_string(),
                    });
                }
            }
        }
        Ok(entries)
    }

    /// Discard all logged entries after a checkpoint. The sequence counter
    /// keeps counting so snapshot seqs stay monotonic.
    pub fn truncate(&mut self) -> Result<(), StorageError> {
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&self.path)?;
        self.writer = BufWriter::new(file);
        Ok(())
    }
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
