// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Memory-store boundary.
//!
//! The actual memory system (embeddings, recall ranking) lives outside the
//! host; the IPC bus and admin commands only need this narrow interface.

use async_trait::async_trait;
use dotclaw_core::GroupFolder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("memory store unavailable: {0}")]
    Unavailable(String),
    #[error("memory entry not found: {0}")]
    NotFound(String),
}

/// One recall result.
#[derive(Debug, Clone, serde::Serialize)]
pub struct MemoryHit {
    pub key: String,
    pub content: String,
    pub score: f32,
}

#[async_trait]
pub trait MemoryStore: Send + Sync {
    /// Insert or update an entry; returns its key.
    async fn upsert(
        &self,
        group: &GroupFolder,
        key: Option<String>,
        content: String,
        tags: Vec<String>,
    ) -> Result<String, MemoryError>;

    async fn search(
        &self,
        group: &GroupFolder,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError>;

    /// Returns whether the entry existed.
    async fn delete(&self, group: &GroupFolder, key: &str) -> Result<bool, MemoryError>;
}

/// Default store used when no memory system is wired up: writes vanish,
/// searches come back empty.
#[derive(Debug, Clone, Default)]
pub struct NoopMemoryStore;

#[async_trait]
impl MemoryStore for NoopMemoryStore {
    async fn upsert(
        &self,
        group: &GroupFolder,
        key: Option<String>,
        _content: String,
        _tags: Vec<String>,
    ) -> Result<String, MemoryError> {
        let key = key.unwrap_or_else(|| format!("{group}-unsaved"));
        tracing::debug!(%group, key, "noop memory store dropped upsert");
        Ok(key)
    }

    async fn search(
        &self,
        _group: &GroupFolder,
        _query: &str,
        _max_results: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        Ok(Vec::new())
    }

    async fn delete(&self, _group: &GroupFolder, _key: &str) -> Result<bool, MemoryError> {
        Ok(false)
    }
}

/// In-memory store for tests.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Clone, Default)]
pub struct FakeMemoryStore {
    entries: std::sync::Arc<parking_lot::Mutex<Vec<(String, String, String)>>>, // (group, key, content)
}

#[cfg(any(test, feature = "test-support"))]
#[async_trait]
impl MemoryStore for FakeMemoryStore {
    async fn upsert(
        &self,
        group: &GroupFolder,
        key: Option<String>,
        content: String,
        _tags: Vec<String>,
    ) -> Result<String, MemoryError> {
        let mut entries = self.entries.lock();
        let key = key.unwrap_or_else(|| format!("mem-{}", entries.len() + 1));
        entries.retain(|(g, k, _)| !(g == group.as_str() && *k == key));
        entries.push((group.as_str().to_string(), key.clone(), content));
        Ok(key)
    }

    async fn search(
        &self,
        group: &GroupFolder,
        query: &str,
        max_results: usize,
    ) -> Result<Vec<MemoryHit>, MemoryError> {
        Ok(self
            .entries
            .lock()
            .iter()
            .filter(|(g, _, content)| g == group.as_str() && content.contains(query))
            .take(max_results)
            .map(|(_, key, content)| MemoryHit {
                key: key.clone(),
                content: content.clone(),
                score: 1.0,
            })
            .collect())
    }

    async fn delete(&self, group: &GroupFolder, key: &str) -> Result<bool, MemoryError> {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|(g, k, _)| !(g == group.as_str() && k == key));
        Ok(entries.len() < before)
    }
}

#[cfg(test)]
#[path = "memory_tests.rs"]
mod tests;
