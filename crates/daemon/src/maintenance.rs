// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Maintenance, heartbeat, and health loops.

use dotclaw_adapters::CancelToken;
use dotclaw_core::Clock;
use dotclaw_engine::{MessagePipeline, ProviderRegistry};
use dotclaw_storage::Store;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Checkpoint + sweep cadence.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(60);

/// Heartbeat cadence.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(10);

/// Health check cadence.
const HEALTH_INTERVAL: Duration = Duration::from_secs(30);

/// Shared suppression window: health checks take no action while the clock
/// is before this instant (set after a wake).
#[derive(Clone, Default)]
pub struct HealthSuppression {
    until_ms: Arc<AtomicU64>,
}

impl HealthSuppression {
    /// Suppress health actions until `now + grace`.
    pub fn suppress_for(&self, now_ms: u64, grace_ms: u64) {
        self.until_ms.store(now_ms + grace_ms, Ordering::SeqCst);
    }

    pub fn is_suppressed(&self, now_ms: u64) -> bool {
        now_ms < self.until_ms.load(Ordering::SeqCst)
    }
}

/// Periodic housekeeping: WAL checkpoint, queue pruning, limiter/callback
/// sweeps, stalled-lease recovery, and the advisory per-group task
/// snapshots consumed by agent containers.
pub async fn maintenance_loop<C: Clock>(
    store: Store,
    pipeline: MessagePipeline<C>,
    clock: C,
    groups_dir: PathBuf,
    stalled_threshold_ms: u64,
    shutdown: CancelToken,
) {
    let mut tick = tokio::time::interval(MAINTENANCE_INTERVAL);
    tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.canceled() => break,
        }
        let now = clock.now_ms();

        if let Err(e) = store.checkpoint() {
            warn!(error = %e, "checkpoint failed");
        }
        match store.prune_terminal_queued() {
            Ok(0) => {}
            Ok(n) => debug!(pruned = n, "pruned terminal queue rows"),
            Err(e) => warn!(error = %e, "queue prune failed"),
        }
        pipeline.rate_limiter().sweep(now);
        pipeline.callbacks().sweep(now);
        match store.reset_stalled_messages(now, stalled_threshold_ms) {
            Ok(0) => {}
            Ok(n) => {
                info!(reset = n, "reset stalled message claims");
                pipeline.resume_pending();
            }
            Err(e) => warn!(error = %e, "stalled message reset failed"),
        }
        match store.reset_stalled_background_jobs(now) {
            Ok(0) => {}
            Ok(n) => info!(reset = n, "reset stalled background jobs"),
            Err(e) => warn!(error = %e, "stalled job reset failed"),
        }
        write_task_snapshots(&store, &groups_dir);
    }
    info!("maintenance loop stopped");
}

/// Advisory snapshots: each group gets a `tasks.json` its container can
/// read for context. Authorization never consults these files.
fn write_task_snapshots(store: &Store, groups_dir: &std::path::Path) {
    for group in store.list_groups() {
        let tasks = store.list_tasks(Some(&group.folder));
        let path = groups_dir.join(group.folder.as_str()).join("tasks.json");
        if let Some(parent) = path.parent() {
            let _ = std::fs::create_dir_all(parent);
        }
        match serde_json::to_vec_pretty(&tasks) {
            Ok(body) => {
                if let Err(e) = std::fs::write(&path, body) {
                    debug!(path = %path.display(), error = %e, "task snapshot write failed");
                }
            }
            Err(e) => debug!(error = %e, "task snapshot serialization failed"),
        }
    }
}

/// Touch the heartbeat file so external watchdogs can spot a hung process.
pub async fn heartbeat_loop<C: Clock>(path: PathBuf, clock: C, shutdown: CancelToken) {
    let mut tick = tokio::time::interval(HEARTBEAT_INTERVAL);
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.canceled() => break,
        }
        if let Err(e) = std::fs::write(&path, format!("{}\n", clock.now_ms())) {
            warn!(path = %path.display(), error = %e, "heartbeat write failed");
        }
    }
    let _ = std::fs::remove_file(&path);
}

/// Log provider connectivity; takes no action while the wake suppression
/// window is open.
pub async fn health_loop<C: Clock>(
    registry: Arc<ProviderRegistry>,
    suppression: HealthSuppression,
    clock: C,
    shutdown: CancelToken,
) {
    let mut tick = tokio::time::interval(HEALTH_INTERVAL);
    loop {
        tokio::select! {
            _ = tick.tick() => {}
            _ = shutdown.canceled() => break,
        }
        let now = clock.now_ms();
        if suppression.is_suppressed(now) {
            debug!("health check suppressed during wake grace window");
            continue;
        }
        for provider in registry.all() {
            if !provider.is_connected() {
                warn!(provider = provider.name(), "provider disconnected");
            }
        }
    }
}

#[cfg(test)]
#[path = "maintenance_tests.rs"]
mod tests;
