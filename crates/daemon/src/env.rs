// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon environment variables.

use std::path::PathBuf;

/// Root state directory: `DOTCLAW_DATA_DIR`, falling back to
/// `$XDG_STATE_HOME/dotclaw` or `~/.local/state/dotclaw`.
pub fn data_dir() -> Option<PathBuf> {
    if let Ok(dir) = std::env::var("DOTCLAW_DATA_DIR") {
        return Some(PathBuf::from(dir));
    }
    if let Ok(xdg) = std::env::var("XDG_STATE_HOME") {
        return Some(PathBuf::from(xdg).join("dotclaw"));
    }
    std::env::var("HOME")
        .ok()
        .map(|home| PathBuf::from(home).join(".local/state/dotclaw"))
}

/// Group workspace root: `DOTCLAW_GROUPS_DIR`, default `<data>/groups`.
pub fn groups_dir(data_dir: &std::path::Path) -> PathBuf {
    std::env::var("DOTCLAW_GROUPS_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("groups"))
}

/// Trace directory: `DOTCLAW_TRACE_DIR`, default `<data>/traces`.
pub fn trace_dir(data_dir: &std::path::Path) -> PathBuf {
    std::env::var("DOTCLAW_TRACE_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| data_dir.join("traces"))
}

/// The agent container entrypoint. Required.
pub fn agent_cmd() -> Option<PathBuf> {
    std::env::var("DOTCLAW_AGENT_CMD").ok().map(PathBuf::from)
}

/// Extra arguments for the agent command, whitespace-separated.
pub fn agent_args() -> Vec<String> {
    std::env::var("DOTCLAW_AGENT_ARGS")
        .map(|v| v.split_whitespace().map(String::from).collect())
        .unwrap_or_default()
}

/// IPC polling fallback interval in ms (`DOTCLAW_IPC_POLL_INTERVAL_MS`,
/// default 2000).
pub fn ipc_poll_interval_ms() -> u64 {
    std::env::var("DOTCLAW_IPC_POLL_INTERVAL_MS")
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(2_000)
}

#[cfg(test)]
#[path = "env_tests.rs"]
mod tests;
