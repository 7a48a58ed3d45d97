// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Snapshot persistence for crash recovery.
//!
//! A snapshot stores the complete table state at a WAL sequence number;
//! recovery loads it and replays WAL entries past that sequence.

use crate::StoreState;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::warn;

/// Errors that can occur in snapshot operations
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// The complete store state at a point in time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// WAL sequence number covered by this snapshot
    pub seq: u64,
    pub state: StoreState,
    pub created_at: DateTime<Utc>,
}

impl Snapshot {
    pub fn new(seq: u64, state: StoreState) -> Self {
        Self {
            seq,
            state,
            created_at: Utc::now(),
        }
    }

    /// Save atomically: write to `.tmp`, fsync, rename.
    pub fn save(&self, path: &Path) -> Result<(), SnapshotError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        let tmp_path = path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer(&mut writer, self)?;
            let file = writer.into_inner().map_err(|e| e.into_error())?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, path)?;
        Ok(())
    }

    /// Load if present. A corrupt snapshot rotates to `.bak` and recovery
    /// proceeds from WAL replay alone.
    pub fn load(path: &Path) -> Result<Option<Self>, SnapshotError> {
        if !path.exists() {
            return Ok(None);
        }
        let file = File::open(path)?;
        match serde_json::from_reader(BufReader::new(file)) {
            Ok(snapshot) => Ok(Some(snapshot)),
            Err(e) => {
                let bak = bak_path(path);
                warn!(
                    error = %e,
                    path = %path.display(),
                    bak = %bak.display(),
                    "corrupt snapshot, moving to .bak and starting from WAL",
                );
                fs::rename(path, &bak)?;
                Ok(None)
            }
        }
    }
}

/// The `.bak` sibling of a state file; an existing backup is overwritten —
/// the newest failure is the interesting one.
pub(crate) fn bak_path(path: &Path) -> PathBuf {
    path.with_extension("bak")
}

#[cfg(test)]
#[path = "snapshot_tests.rs"]
mod tests;
