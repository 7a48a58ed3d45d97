// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Short-lived callback-data store for inline buttons.
//!
//! Providers cap callback payload sizes, so buttons carry an opaque token
//! and the real data lives here for a few minutes. The sweeper must run on
//! schedule even when the map is empty.

use parking_lot::Mutex;
use std::collections::HashMap;

struct Entry {
    data: String,
    expires_at_ms: u64,
}

pub struct CallbackStore {
    ttl_ms: u64,
    entries: Mutex<HashMap<String, Entry>>,
    counter: std::sync::atomic::AtomicU64,
}

impl CallbackStore {
    pub fn new(ttl_ms: u64) -> Self {
        Self {
            ttl_ms,
            entries: Mutex::new(HashMap::new()),
            counter: std::sync::atomic::AtomicU64::new(0),
        }
    }

    /// Store button data; returns the token to embed in the button.
    pub fn put(&self, data: impl Into<String>, now_ms: u64) -> String {
        let n = self
            .counter
            .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
        let token = format!("cb-{n}");
        self.entries.lock().insert(
            token.clone(),
            Entry {
                data: data.into(),
                expires_at_ms: now_ms + self.ttl_ms,
            },
        );
        token
    }

    /// Resolve and consume a token. Expired or unknown tokens yield `None`.
    pub fn take(&self, token: &str, now_ms: u64) -> Option<String> {
        let entry = self.entries.lock().remove(token)?;
        if now_ms > entry.expires_at_ms {
            return None;
        }
        Some(entry.data)
    }

    /// Evict expired entries.
    pub fn sweep(&self, now_ms: u64) {
        self.entries
            .lock()
            .retain(|_, e| now_ms <= e.expires_at_ms);
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

#[cfg(test)]
#[path = "callbacks_tests.rs"]
mod tests;
