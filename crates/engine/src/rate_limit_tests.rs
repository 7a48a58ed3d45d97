// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn twenty_first_message_in_window_is_denied() {
    let limiter = RateLimiter::new(20, 60_000);
    for n in 0..20 {
        let d = limiter.check("telegram:u1", 1_000 + n);
        assert!(d.allowed, "message {n} should pass");
    }
    let denied = limiter.check("telegram:u1", 1_500);
    assert!(!denied.allowed);
    let hint = denied.retry_after_ms.unwrap();
    assert!(hint <= 60_000 && hint >= 59_000, "{hint}");
}

#[test]
fn window_expiry_resets_the_count() {
    let limiter = RateLimiter::new(2, 1_000);
    assert!(limiter.check("k", 0).allowed);
    assert!(limiter.check("k", 1).allowed);
    assert!(!limiter.check("k", 2).allowed);
    // 61s later a new window opens
    assert!(limiter.check("k", 1_001).allowed);
}

#[test]
fn keys_are_independent() {
    let limiter = RateLimiter::new(1, 60_000);
    assert!(limiter.check("telegram:u1", 0).allowed);
    assert!(limiter.check("discord:u1", 0).allowed);
    assert!(!limiter.check("telegram:u1", 1).allowed);
}

#[test]
fn sweep_evicts_only_expired_windows() {
    let limiter = RateLimiter::new(5, 1_000);
    limiter.check("old", 0);
    limiter.check("fresh", 900);
    limiter.sweep(1_500);
    assert_eq!(limiter.entry_count(), 1);
    // Sweeping an empty map is harmless
    limiter.sweep(10_000);
    limiter.sweep(20_000);
    assert_eq!(limiter.entry_count(), 0);
}
