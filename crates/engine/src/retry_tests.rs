// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use std::sync::atomic::{AtomicU32, Ordering};

#[yare::parameterized(
    first = { 1, 3_000 },
    second = { 2, 6_000 },
    third = { 3, 12_000 },
    fourth = { 4, 24_000 },
    capped = { 6, 60_000 },
    deep_cap = { 30, 60_000 },
)]
fn exponential_with_cap(attempt: u32, expected: u64) {
    assert_eq!(exp_backoff_ms(3_000, 60_000, attempt), expected);
}

#[test]
fn scheduler_backoff_progression() {
    // interval task failure ladder: ≈60s, 120s, 240s before the breaker
    assert_eq!(exp_backoff_ms(60_000, 3_600_000, 1), 60_000);
    assert_eq!(exp_backoff_ms(60_000, 3_600_000, 2), 120_000);
    assert_eq!(exp_backoff_ms(60_000, 3_600_000, 3), 240_000);
}

#[test]
fn full_jitter_stays_in_range() {
    for _ in 0..200 {
        let v = full_jitter_ms(10_000);
        assert!(v <= 10_000);
    }
    assert_eq!(full_jitter_ms(0), 0);
}

#[test]
fn band_jitter_stays_in_band() {
    for _ in 0..200 {
        let v = band_jitter_ms(10_000);
        assert!((7_000..=13_000).contains(&v), "{v}");
    }
}

#[tokio::test]
async fn retry_succeeds_on_later_attempt() {
    let calls = AtomicU32::new(0);
    let result: Result<u32, &str> = retry_with_backoff(3, 1, 2, || {
        let n = calls.fetch_add(1, Ordering::SeqCst) + 1;
        async move {
            if n < 3 {
                Err("not yet")
            } else {
                Ok(n)
            }
        }
    })
    .await;
    assert_eq!(result, Ok(3));
}

#[tokio::test]
async fn retry_gives_up_after_max_attempts() {
    let calls = AtomicU32::new(0);
    let result: Result<(), &str> = retry_with_backoff(3, 1, 2, || {
        calls.fetch_add(1, Ordering::SeqCst);
        async { Err("always") }
    })
    .await;
    assert_eq!(result, Err("always"));
    assert_eq!(calls.load(Ordering::SeqCst), 3);
}
