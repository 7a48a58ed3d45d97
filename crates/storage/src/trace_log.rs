// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Append-only daily trace files: `trace-YYYY-MM-DD.jsonl`.

use dotclaw_core::TraceRecord;
use std::io::Write;
use std::path::PathBuf;
use tracing::warn;

/// Writer for the append-only trace directory. Cloneable; each append opens
/// the day's file, writes one line, and closes it — trace volume is low and
/// this keeps the writer restart-safe.
#[derive(Debug, Clone)]
pub struct TraceWriter {
    dir: PathBuf,
}

impl TraceWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Append one record to today's file. Failures are logged, never fatal —
    /// a run must not fail because its trace could not be written.
    pub fn append(&self, record: &TraceRecord) {
        if let Err(e) = self.try_append(record) {
            warn!(trace_id = %record.trace_id, error = %e, "failed to append trace record");
        }
    }

    fn try_append(&self, record: &TraceRecord) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let day = record
            .created_at
            .get(..10)
            .unwrap_or("undated")
            .to_string();
        let path = self.dir.join(format!("trace-{day}.jsonl"));
        let line = serde_json::to_string(record)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)?;
        writeln!(file, "{line}")?;
        Ok(())
    }
}

#[cfg(test)]
#[path = "trace_log_tests.rs"]
mod tests;
