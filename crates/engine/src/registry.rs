// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Provider registry: resolves chat identifiers to their owning provider
//! and routes outbound calls.

use dotclaw_adapters::{Provider, ProviderError, ProviderHandlers, SendOptions, SendReceipt};
use dotclaw_core::ChatId;
use parking_lot::Mutex;
use std::sync::Arc;
use tracing::{info, warn};

/// Holds the active providers. Registration happens during startup;
/// afterwards the set is read-only (wake recovery restarts entries in
/// place, it never swaps them).
#[derive(Default)]
pub struct ProviderRegistry {
    providers: Mutex<Vec<Arc<dyn Provider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, provider: Arc<dyn Provider>) {
        self.providers.lock().push(provider);
    }

    pub fn all(&self) -> Vec<Arc<dyn Provider>> {
        self.providers.lock().clone()
    }

    /// The provider owning this chat, by id prefix.
    pub fn resolve(&self, chat_id: &ChatId) -> Option<Arc<dyn Provider>> {
        let prefix = chat_id.provider();
        self.providers
            .lock()
            .iter()
            .find(|p| p.name() == prefix)
            .cloned()
    }

    /// Start every provider with the given handlers.
    pub async fn start_all(
        &self,
        handlers: Arc<dyn ProviderHandlers>,
    ) -> Result<(), ProviderError> {
        for provider in self.all() {
            provider.start(Arc::clone(&handlers)).await?;
            info!(provider = provider.name(), "provider started");
        }
        Ok(())
    }

    /// Stop every provider; failures are logged, not propagated.
    pub async fn stop_all(&self) {
        for provider in self.all() {
            if let Err(e) = provider.stop().await {
                warn!(provider = provider.name(), error = %e, "provider stop failed");
            }
        }
    }

    /// Stop and restart each connected provider (wake recovery).
    pub async fn restart_connected(&self, handlers: Arc<dyn ProviderHandlers>) {
        for provider in self.all() {
            if !provider.is_connected() {
                continue;
            }
            if let Err(e) = provider.stop().await {
                warn!(provider = provider.name(), error = %e, "stop during restart failed");
            }
            tokio::time::sleep(std::time::Duration::from_millis(200)).await;
            match provider.start(Arc::clone(&handlers)).await {
                Ok(()) => info!(provider = provider.name(), "provider restarted"),
                Err(e) => {
                    warn!(provider = provider.name(), error = %e, "restart failed");
                }
            }
        }
    }

    /// Resolve and send in one step.
    pub async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        let provider = self.resolve(chat_id).ok_or_else(|| ProviderError::Rejected {
            provider: chat_id.provider().to_string(),
            message: format!("no provider registered for {chat_id}"),
        })?;
        provider.send_message(chat_id, text, opts).await
    }
}

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;
