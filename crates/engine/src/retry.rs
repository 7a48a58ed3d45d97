// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Retry/backoff arithmetic.
//!
//! Two jitter shapes are used: full jitter (uniform in `0..=delay`) for the
//! pipeline's batch retries, and a 0.7–1.3 band for scheduler and
//! notification backoff where runs should stay roughly spaced.

use rand::Rng;
use std::future::Future;
use std::time::Duration;

/// `min(cap, base · 2^(attempt−1))` for a 1-based attempt number.
pub fn exp_backoff_ms(base_ms: u64, cap_ms: u64, attempt: u32) -> u64 {
    let shift = attempt.saturating_sub(1).min(32);
    base_ms
        .saturating_mul(1u64 << shift)
        .min(cap_ms)
}

/// Full jitter: uniform in `0..=delay_ms`.
pub fn full_jitter_ms(delay_ms: u64) -> u64 {
    if delay_ms == 0 {
        return 0;
    }
    rand::rng().random_range(0..=delay_ms)
}

/// Band jitter: uniform in `0.7·delay ..= 1.3·delay`.
pub fn band_jitter_ms(delay_ms: u64) -> u64 {
    if delay_ms == 0 {
        return 0;
    }
    let lo = delay_ms.saturating_mul(7) / 10;
    let hi = delay_ms.saturating_mul(13) / 10;
    rand::rng().random_range(lo..=hi)
}

/// Retry `op` up to `max_attempts` times with band-jittered exponential
/// backoff between attempts. Returns the last error when all attempts fail.
pub async fn retry_with_backoff<T, E, F, Fut>(
    max_attempts: u32,
    base_ms: u64,
    cap_ms: u64,
    mut op: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    let mut attempt = 1u32;
    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if attempt >= max_attempts => return Err(err),
            Err(_) => {
                let delay = band_jitter_ms(exp_backoff_ms(base_ms, cap_ms, attempt));
                tokio::time::sleep(Duration::from_millis(delay)).await;
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
#[path = "retry_tests.rs"]
mod tests;
