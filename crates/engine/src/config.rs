// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Engine tuning knobs, overridable through `DOTCLAW_*` environment
//! variables.

use std::time::Duration;

/// Which signals may convert a foreground run into a background job.
#[derive(Debug, Clone, Copy)]
pub struct AutoSpawnToggles {
    pub on_timeout: bool,
    pub on_tool_limit: bool,
    pub on_router: bool,
    pub on_classifier: bool,
    pub on_planner: bool,
}

impl Default for AutoSpawnToggles {
    fn default() -> Self {
        Self {
            on_timeout: true,
            on_tool_limit: true,
            on_router: true,
            on_classifier: true,
            on_planner: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    // message pipeline
    pub batch_window_ms: u64,
    pub max_batch_size: usize,
    pub drain_iteration_cap: u32,
    pub max_retries: u32,
    pub retry_base_ms: u64,
    pub retry_cap_ms: u64,
    pub auto_spawn_foreground_timeout_ms: u64,
    pub auto_spawn: AutoSpawnToggles,
    /// A planner estimate above this many minutes converts the request into
    /// a background job before the foreground run starts.
    pub planner_background_min_minutes: u32,

    // rate limiting
    pub rate_limit_max: u32,
    pub rate_limit_window_ms: u64,

    // scheduler
    pub scheduler_poll_interval_ms: u64,
    pub task_timeout_ms: u64,
    pub task_max_retries: u32,
    pub task_retry_base_ms: u64,
    pub task_retry_max_ms: u64,

    // background jobs
    pub job_workers: usize,
    pub job_poll_interval_ms: u64,
    pub job_lease_ttl_ms: u64,
    pub job_default_timeout_ms: u64,
    pub default_estimated_minutes: u32,

    // notifications
    pub notify_max_attempts: u32,
    pub notify_base_ms: u64,
    pub notify_cap_ms: u64,

    // housekeeping
    pub stalled_claim_threshold_ms: u64,
    pub callback_ttl_ms: u64,
    pub wake_check_interval_ms: u64,
    pub wake_threshold_ms: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_window_ms: 5_000,
            max_batch_size: 10,
            drain_iteration_cap: 20,
            max_retries: 4,
            retry_base_ms: 3_000,
            retry_cap_ms: 60_000,
            auto_spawn_foreground_timeout_ms: 120_000,
            auto_spawn: AutoSpawnToggles::default(),
            planner_background_min_minutes: 15,

            rate_limit_max: 20,
            rate_limit_window_ms: 60_000,

            scheduler_poll_interval_ms: 1_000,
            task_timeout_ms: 300_000,
            task_max_retries: 3,
            task_retry_base_ms: 60_000,
            task_retry_max_ms: 3_600_000,

            job_workers: 2,
            job_poll_interval_ms: 2_000,
            job_lease_ttl_ms: 60_000,
            job_default_timeout_ms: 1_800_000,
            default_estimated_minutes: 8,

            notify_max_attempts: 3,
            notify_base_ms: 2_000,
            notify_cap_ms: 30_000,

            stalled_claim_threshold_ms: 300_000,
            callback_ttl_ms: 300_000,
            wake_check_interval_ms: 30_000,
            wake_threshold_ms: 60_000,
        }
    }
}

fn env_u64(name: &str) -> Option<u64> {
    std::env::var(name).ok()?.trim().parse().ok()
}

impl EngineConfig {
    /// Defaults layered with `DOTCLAW_*` environment overrides.
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        if let Some(v) = env_u64("DOTCLAW_BATCH_WINDOW_MS") {
            cfg.batch_window_ms = v;
        }
        if let Some(v) = env_u64("DOTCLAW_MAX_BATCH_SIZE") {
            cfg.max_batch_size = v as usize;
        }
        if let Some(v) = env_u64("DOTCLAW_MAX_RETRIES") {
            cfg.max_retries = v as u32;
        }
        if let Some(v) = env_u64("DOTCLAW_RATE_LIMIT_MAX") {
            cfg.rate_limit_max = v as u32;
        }
        if let Some(v) = env_u64("DOTCLAW_RATE_LIMIT_WINDOW_MS") {
            cfg.rate_limit_window_ms = v;
        }
        if let Some(v) = env_u64("DOTCLAW_SCHEDULER_POLL_INTERVAL_MS") {
            cfg.scheduler_poll_interval_ms = v;
        }
        if let Some(v) = env_u64("DOTCLAW_TASK_TIMEOUT_MS") {
            cfg.task_timeout_ms = v;
        }
        if let Some(v) = env_u64("DOTCLAW_TASK_MAX_RETRIES") {
            cfg.task_max_retries = v as u32;
        }
        if let Some(v) = env_u64("DOTCLAW_JOB_WORKERS") {
            cfg.job_workers = v as usize;
        }
        if let Some(v) = env_u64("DOTCLAW_JOB_LEASE_TTL_MS") {
            cfg.job_lease_ttl_ms = v;
        }
        if let Some(v) = env_u64("DOTCLAW_AUTO_SPAWN_FOREGROUND_TIMEOUT_MS") {
            cfg.auto_spawn_foreground_timeout_ms = v;
        }
        if let Some(v) = env_u64("DOTCLAW_WAKE_CHECK_INTERVAL_MS") {
            cfg.wake_check_interval_ms = v;
            cfg.wake_threshold_ms = v * 2;
        }
        if let Some(v) = env_u64("DOTCLAW_WAKE_THRESHOLD_MS") {
            cfg.wake_threshold_ms = v;
        }
        cfg
    }

    pub fn scheduler_poll_interval(&self) -> Duration {
        Duration::from_millis(self.scheduler_poll_interval_ms)
    }

    pub fn job_poll_interval(&self) -> Duration {
        Duration::from_millis(self.job_poll_interval_ms)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
