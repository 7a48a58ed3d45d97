// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! JSONL write-ahead log with group commit.
//!
//! Every store mutation is appended here before it is considered durable.
//! Unlike a consumer queue, the WAL is read only during recovery (snapshot +
//! replay) and truncation; live state is maintained by the store itself.
//!
//! Each entry is one line of JSON: `{"seq":N,"event":{...}}\n`

use dotclaw_core::StoreEvent;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{self, BufRead, BufReader, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::warn;

/// Flush interval for group commit (~10ms batches)
const FLUSH_INTERVAL: Duration = Duration::from_millis(10);

/// Maximum entries to buffer before forcing flush
const FLUSH_THRESHOLD: usize = 100;

/// Errors that can occur in WAL operations
#[derive(Debug, Error)]
pub enum WalError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Serialize)]
struct RecordRef<'a> {
    seq: u64,
    event: &'a StoreEvent,
}

#[derive(Deserialize)]
struct Record {
    seq: u64,
    event: StoreEvent,
}

/// A single WAL entry with sequence number
#[derive(Debug, Clone)]
pub struct WalEntry {
    pub seq: u64,
    pub event: StoreEvent,
}

/// Append-only event log. Buffered writes are made durable by `flush()`
/// (single fsync per batch).
pub struct Wal {
    file: File,
    path: PathBuf,
    /// Next sequence number to assign is `write_seq + 1`
    write_seq: u64,
    /// Buffered JSON lines waiting to be flushed (without trailing newline)
    write_buffer: Vec<Vec<u8>>,
    last_flush: Instant,
}

impl Wal {
    /// Open or create a WAL at the given path.
    ///
    /// `base_seq` is the snapshot's sequence number (0 without one); after a
    /// checkpoint truncation the file may be empty, so sequence numbering
    /// must resume from the snapshot, never below it.
    ///
    /// A corrupt tail (torn write from a crash) is healed in place: the file
    /// is rotated to `.bak` and rewritten with only the parseable prefix.
    pub fn open(path: &Path, base_seq: u64) -> Result<Self, WalError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let file = open_append(path)?;
        let scan = scan(&file)?;
        let mut write_seq = scan.max_seq.max(base_seq);

        if scan.corrupt {
            let bak_path = crate::snapshot::bak_path(path);
            warn!(
                path = %path.display(),
                bak = %bak_path.display(),
                valid_entries = scan.valid_lines.len(),
                "corrupt WAL tail, rotating to .bak and keeping valid prefix",
            );
            drop(file);
            std::fs::rename(path, &bak_path)?;
            {
                let mut healed = File::create(path)?;
                for line in &scan.valid_lines {
                    healed.write_all(line.as_bytes())?;
                    healed.write_all(b"\n")?;
                }
                healed.sync_all()?;
            }
            let file = open_append(path)?;
            write_seq = scan
                .valid_lines
                .last()
                .and_then(|l| serde_json::from_str::<Record>(l).ok())
                .map(|r| r.seq)
                .unwrap_or(0)
                .max(base_seq);
            return Ok(Self {
                file,
                path: path.to_owned(),
                write_seq,
                write_buffer: Vec::new(),
                last_flush: Instant::now(),
            });
        }

        Ok(Self {
            file,
            path: path.to_owned(),
            write_seq,
            write_buffer: Vec::new(),
            last_flush: Instant::now(),
        })
    }

    /// Append an event to the write buffer.
    ///
    /// Returns the assigned sequence number. The event is NOT durable until
    /// `flush()` runs.
    pub fn append(&mut self, event: &StoreEvent) -> Result<u64, WalError> {
        self.write_seq += 1;
        let seq = self.write_seq;
        let json = serde_json::to_vec(&RecordRef { seq, event })?;
        self.write_buffer.push(json);
        Ok(seq)
    }

    /// Check if flush is needed (interval elapsed or buffer full).
    pub fn needs_flush(&self) -> bool {
        !self.write_buffer.is_empty()
            && (self.last_flush.elapsed() >= FLUSH_INTERVAL
                || self.write_buffer.len() >= FLUSH_THRESHOLD)
    }

    /// Flush all buffered entries with a single fsync. The durability point.
    pub fn flush(&mut self) -> Result<(), WalError> {
        if self.write_buffer.is_empty() {
            return Ok(());
        }
        for mut line in self.write_buffer.drain(..) {
            line.push(b'\n');
            self.file.write_all(&line)?;
        }
        self.file.sync_all()?;
        self.last_flush = Instant::now();
        Ok(())
    }

    /// Highest sequence number assigned so far.
    pub fn write_seq(&self) -> u64 {
        self.write_seq
    }

    /// All entries with `seq > after`, for snapshot + replay recovery.
    pub fn entries_after(&mut self, after: u64) -> Result<Vec<WalEntry>, WalError> {
        self.flush()?;
        let mut reader = BufReader::new(self.file.try_clone()?);
        reader.seek(SeekFrom::Start(0))?;

        let mut entries = Vec::new();
        let mut line = String::new();
        loop {
            line.clear();
            match reader.read_line(&mut line) {
                Ok(0) => break,
                Ok(_) => {}
                Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                Err(e) => return Err(e.into()),
            }
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }
            let record: Record = match serde_json::from_str(trimmed) {
                Ok(r) => r,
                Err(e) => {
                    warn!(error = %e, "corrupt WAL entry during replay, stopping");
                    break;
                }
            };
            if record.seq > after {
                entries.push(WalEntry {
                    seq: record.seq,
                    event: record.event,
                });
            }
        }
        Ok(entries)
    }

    /// Drop entries with `seq < keep_from`, called after a durable snapshot.
    pub fn truncate_before(&mut self, keep_from: u64) -> Result<(), WalError> {
        self.flush()?;

        let kept: Vec<String> = {
            let mut reader = BufReader::new(self.file.try_clone()?);
            reader.seek(SeekFrom::Start(0))?;
            let mut kept = Vec::new();
            let mut line = String::new();
            loop {
                line.clear();
                match reader.read_line(&mut line) {
                    Ok(0) => break,
                    Ok(_) => {}
                    Err(e) if e.kind() == io::ErrorKind::InvalidData => break,
                    Err(e) => return Err(e.into()),
                }
                let trimmed = line.trim();
                if trimmed.is_empty() {
                    continue;
                }
                let record: Record = match serde_json::from_str(trimmed) {
                    Ok(r) => r,
                    Err(_) => break,
                };
                if record.seq >= keep_from {
                    kept.push(trimmed.to_string());
                }
            }
            kept
        };

        let tmp_path = self.path.with_extension("tmp");
        {
            let mut tmp = File::create(&tmp_path)?;
            for line in &kept {
                tmp.write_all(line.as_bytes())?;
                tmp.write_all(b"\n")?;
            }
            tmp.sync_all()?;
        }
        std::fs::rename(&tmp_path, &self.path)?;
        self.file = open_append(&self.path)?;
        Ok(())
    }
}

fn open_append(path: &Path) -> Result<File, io::Error> {
    OpenOptions::new()
        .create(true)
        .read(true)
        .append(true)
        .open(path)
}

struct ScanResult {
    max_seq: u64,
    corrupt: bool,
    valid_lines: Vec<String>,
}

/// Scan the whole file, collecting parseable lines until the first corrupt
/// entry (or EOF).
fn scan(file: &File) -> Result<ScanResult, WalError> {
    let mut reader = BufReader::new(file.try_clone()?);
    reader.seek(SeekFrom::Start(0))?;

    let mut max_seq = 0u64;
    let mut corrupt = false;
    let mut valid_lines = Vec::new();
    let mut line = String::new();

    loop {
        line.clear();
        match reader.read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) if e.kind() == io::ErrorKind::InvalidData => {
                corrupt = true;
                break;
            }
            Err(e) => return Err(e.into()),
        }
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        match serde_json::from_str::<Record>(trimmed) {
            Ok(record) => {
                max_seq = max_seq.max(record.seq);
                valid_lines.push(trimmed.to_string());
            }
            Err(_) => {
                corrupt = true;
                break;
            }
        }
    }

    Ok(ScanResult {
        max_seq,
        corrupt,
        valid_lines,
    })
}

#[cfg(test)]
#[path = "wal_tests.rs"]
mod tests;
