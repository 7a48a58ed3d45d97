// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn defaults_match_documented_limits() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.rate_limit_max, 20);
    assert_eq!(cfg.rate_limit_window_ms, 60_000);
    assert_eq!(cfg.retry_base_ms, 3_000);
    assert_eq!(cfg.retry_cap_ms, 60_000);
    assert_eq!(cfg.auto_spawn_foreground_timeout_ms, 120_000);
    assert_eq!(cfg.task_max_retries, 3);
    assert!(cfg.auto_spawn.on_timeout);
}

#[test]
fn wake_threshold_is_twice_the_interval_by_default() {
    let cfg = EngineConfig::default();
    assert_eq!(cfg.wake_threshold_ms, cfg.wake_check_interval_ms * 2);
}
