// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Hook bus: user-defined subprocess hooks for a fixed event set.
//!
//! Async hooks are fire-and-forget under a global concurrency cap (skipped
//! with a warning above it). Blocking hooks run sequentially and may cancel
//! further processing by printing `{"cancel": true}`.

use dotclaw_adapters::subprocess::{run_script_with_stdin, HOOK_TIMEOUT};
use dotclaw_core::HookEvent;
use serde::Deserialize;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// One configured hook script.
#[derive(Debug, Clone, Deserialize)]
pub struct HookScript {
    pub event: HookEvent,
    /// Shell command line, run through `/bin/sh -c`.
    pub command: String,
    #[serde(default)]
    pub blocking: bool,
    #[serde(default)]
    pub timeout_ms: Option<u64>,
}

/// Hook configuration, loaded from `hooks.json` in the data dir.
#[derive(Debug, Clone, Deserialize)]
pub struct HookConfig {
    #[serde(default)]
    pub scripts: Vec<HookScript>,
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
    #[serde(default = "default_timeout_ms")]
    pub default_timeout_ms: u64,
}

fn default_max_concurrent() -> usize {
    8
}

fn default_timeout_ms() -> u64 {
    HOOK_TIMEOUT.as_millis() as u64
}

impl Default for HookConfig {
    fn default() -> Self {
        Self {
            scripts: Vec::new(),
            max_concurrent: default_max_concurrent(),
            default_timeout_ms: default_timeout_ms(),
        }
    }
}

impl HookConfig {
    /// Load from a JSON file; a missing file means no hooks, a malformed
    /// file is a warning, never a startup failure.
    pub fn load(path: &Path) -> Self {
        let body = match std::fs::read_to_string(path) {
            Ok(body) => body,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read hook config");
                return Self::default();
            }
        };
        match serde_json::from_str(&body) {
            Ok(config) => config,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "malformed hook config ignored");
                Self::default()
            }
        }
    }
}

#[derive(Deserialize)]
struct CancelDoc {
    #[serde(default)]
    cancel: bool,
}

/// Dispatches hook events to configured scripts.
pub struct HookBus {
    config: HookConfig,
    async_running: Arc<AtomicUsize>,
}

impl HookBus {
    pub fn new(config: HookConfig) -> Self {
        Self {
            config,
            async_running: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Emit an event. Returns `true` when a blocking hook requested
    /// cancellation of further processing.
    pub async fn emit(&self, event: HookEvent, payload: &serde_json::Value) -> bool {
        let scripts: Vec<&HookScript> = self
            .config
            .scripts
            .iter()
            .filter(|s| s.event == event)
            .collect();
        if scripts.is_empty() {
            return false;
        }

        let body = serde_json::to_vec(payload).unwrap_or_default();
        let envs = vec![(
            "DOTCLAW_HOOK_EVENT".to_string(),
            event.as_str().to_string(),
        )];
        let mut cancel_requested = false;

        for script in scripts {
            let timeout =
                Duration::from_millis(script.timeout_ms.unwrap_or(self.config.default_timeout_ms));
            if script.blocking {
                match run_script_with_stdin(&script.command, &body, &envs, timeout).await {
                    Ok(output) => {
                        if !output.status.success() {
                            warn!(
                                event = event.as_str(),
                                command = script.command,
                                code = output.status.code(),
                                "blocking hook exited non-zero"
                            );
                        }
                        let stdout = String::from_utf8_lossy(&output.stdout);
                        if let Ok(doc) = serde_json::from_str::<CancelDoc>(stdout.trim()) {
                            if doc.cancel {
                                debug!(
                                    event = event.as_str(),
                                    command = script.command,
                                    "blocking hook requested cancellation"
                                );
                                cancel_requested = true;
                            }
                        }
                    }
                    Err(e) => {
                        warn!(event = event.as_str(), command = script.command, error = %e, "blocking hook failed");
                    }
                }
            } else {
                let running = self.async_running.load(Ordering::SeqCst);
                if running >= self.config.max_concurrent {
                    warn!(
                        event = event.as_str(),
                        command = script.command,
                        running,
                        cap = self.config.max_concurrent,
                        "async hook skipped, concurrency cap reached"
                    );
                    continue;
                }
                self.async_running.fetch_add(1, Ordering::SeqCst);
                let counter = Arc::clone(&self.async_running);
                let command = script.command.clone();
                let body = body.clone();
                let envs = envs.clone();
                let event_name = event.as_str();
                tokio::spawn(async move {
                    match run_script_with_stdin(&command, &body, &envs, timeout).await {
                        Ok(output) if !output.status.success() => {
                            warn!(
                                event = event_name,
                                command,
                                code = output.status.code(),
                                "async hook exited non-zero"
                            );
                        }
                        Ok(_) => {}
                        Err(e) => {
                            warn!(event = event_name, command, error = %e, "async hook failed");
                        }
                    }
                    counter.fetch_sub(1, Ordering::SeqCst);
                });
            }
        }

        cancel_requested
    }
}

#[cfg(test)]
#[path = "hooks_tests.rs"]
mod tests;
