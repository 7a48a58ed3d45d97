// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dotclaw-storage: the durable state plane.
//!
//! Mutations are [`dotclaw_core::StoreEvent`]s appended to a JSONL
//! write-ahead log and applied to in-memory tables under one single-writer
//! lock; recovery is snapshot + replay. All claim operations are atomic by
//! construction — they happen inside the writer lock.

mod snapshot;
mod state;
mod store;
mod trace_log;
mod wal;

pub use snapshot::{Snapshot, SnapshotError};
pub use state::StoreState;
pub use store::{QueuePosition, Store, StoreError};
pub use trace_log::TraceWriter;
pub use wal::{Wal, WalEntry, WalError};

/// Format an epoch-milliseconds instant as an ISO-8601 UTC string.
pub fn iso_from_ms(ms: u64) -> String {
    chrono::DateTime::from_timestamp_millis(ms as i64)
        .unwrap_or_default()
        .to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}

/// Parse an ISO-8601 timestamp into epoch milliseconds. Unparseable input
/// yields 0 so malformed provider timestamps sort first instead of erroring.
pub fn ms_from_iso(ts: &str) -> u64 {
    chrono::DateTime::parse_from_rfc3339(ts)
        .map(|dt| dt.timestamp_millis().max(0) as u64)
        .unwrap_or(0)
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn iso_roundtrip() {
        let ms = 1_767_225_600_000; // 2026-01-01T00:00:00Z
        let iso = iso_from_ms(ms);
        assert!(iso.starts_with("2026-01-01T00:00:00"));
        assert_eq!(ms_from_iso(&iso), ms);
    }

    #[yare::parameterized(
        garbage = { "not a time" },
        empty = { "" },
        date_only = { "2026-01-01" },
    )]
    fn unparseable_iso_sorts_first(input: &str) {
        assert_eq!(ms_from_iso(input), 0);
    }

    #[test]
    fn offset_timestamps_normalize_to_utc() {
        assert_eq!(
            ms_from_iso("2026-01-01T01:00:00+01:00"),
            ms_from_iso("2026-01-01T00:00:00Z")
        );
    }
}
