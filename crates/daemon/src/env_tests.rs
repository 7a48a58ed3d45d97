// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::path::Path;

#[test]
fn groups_and_trace_default_under_data_dir() {
    // Only exercise the fallback arithmetic; env-var overrides are covered
    // by running the daemon with them set.
    if std::env::var("DOTCLAW_GROUPS_DIR").is_err() {
        assert_eq!(
            groups_dir(Path::new("/data")),
            Path::new("/data/groups")
        );
    }
    if std::env::var("DOTCLAW_TRACE_DIR").is_err() {
        assert_eq!(trace_dir(Path::new("/data")), Path::new("/data/traces"));
    }
}

#[test]
fn ipc_poll_interval_has_default() {
    if std::env::var("DOTCLAW_IPC_POLL_INTERVAL_MS").is_err() {
        assert_eq!(ipc_poll_interval_ms(), 2_000);
    }
}
