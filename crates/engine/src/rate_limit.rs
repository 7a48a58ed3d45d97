// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-user sliding-window rate limiter.

use parking_lot::Mutex;
use std::collections::HashMap;

/// Admit/deny decision with a retry hint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateDecision {
    pub allowed: bool,
    pub retry_after_ms: Option<u64>,
}

struct Window {
    count: u32,
    reset_at_ms: u64,
}

/// `user_key → (count, reset_at)`. Keys are provider-prefixed sender ids so
/// the same numeric id on two providers never collides.
pub struct RateLimiter {
    max: u32,
    window_ms: u64,
    entries: Mutex<HashMap<String, Window>>,
}

impl RateLimiter {
    pub fn new(max: u32, window_ms: u64) -> Self {
        Self {
            max,
            window_ms,
            entries: Mutex::new(HashMap::new()),
        }
    }

    pub fn window_ms(&self) -> u64 {
        self.window_ms
    }

    /// Check and count one message from `key`.
    pub fn check(&self, key: &str, now_ms: u64) -> RateDecision {
        let mut entries = self.entries.lock();
        match entries.get_mut(key) {
            Some(window) if now_ms <= window.reset_at_ms => {
                if window.count >= self.max {
                    return RateDecision {
                        allowed: false,
                        retry_after_ms: Some(window.reset_at_ms.saturating_sub(now_ms)),
                    };
                }
                window.count += 1;
                RateDecision {
                    allowed: true,
                    retry_after_ms: None,
                }
            }
            _ => {
                entries.insert(
                    key.to_string(),
                    Window {
                        count: 1,
                        reset_at_ms: now_ms + self.window_ms,
                    },
                );
                RateDecision {
                    allowed: true,
                    retry_after_ms: None,
                }
            }
        }
    }

    /// Evict expired windows. Runs from the maintenance loop every window.
    pub fn sweep(&self, now_ms: u64) {
        self.entries
            .lock()
            .retain(|_, window| now_ms <= window.reset_at_ms);
    }

    #[cfg(test)]
    fn entry_count(&self) -> usize {
        self.entries.lock().len()
    }
}

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;
