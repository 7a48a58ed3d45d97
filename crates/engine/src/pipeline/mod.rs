// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-chat message pipeline.
//!
//! Each chat is a tiny state machine: `idle → draining → idle`. Enqueue
//! appends to the store and starts a drain unless one is already active for
//! that chat; the drain claims debounced batches and runs them through the
//! agent. Exclusivity comes from the `active_drains` set — never more than
//! one drain per chat, drains for different chats run concurrently.

mod attachments;
mod process;

#[cfg(test)]
pub(crate) mod test_support;

use crate::callbacks::CallbackStore;
use crate::config::EngineConfig;
use crate::rate_limit::RateLimiter;
use crate::registry::ProviderRegistry;
use crate::router::RouterConfig;
use crate::HookBus;
use async_trait::async_trait;
use dotclaw_adapters::{AgentRunner, ButtonClick, CancelToken, ProviderHandlers};
use dotclaw_core::{
    Chat, ChatId, Clock, FeedbackEntry, IdGen, IncomingMessage, MessageId, QueuedMessage,
    QueuedStatus, RegisteredGroup, StoredMessage,
};
use dotclaw_storage::{iso_from_ms, Store, TraceWriter};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Intercepts messages before routing (the admin command surface).
/// `Some(reply)` consumes the message.
#[async_trait]
pub trait CommandHandler: Send + Sync {
    async fn try_handle(&self, group: &RegisteredGroup, message: &QueuedMessage)
        -> Option<String>;
}

/// Voice-note transcription boundary.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, path: &std::path::Path) -> Result<String, String>;
}

/// Everything the pipeline needs from the outside.
pub struct PipelineDeps<C: Clock> {
    pub store: Store,
    pub runner: Arc<dyn AgentRunner>,
    pub registry: Arc<ProviderRegistry>,
    pub hooks: Arc<HookBus>,
    pub router: RouterConfig,
    pub config: EngineConfig,
    pub clock: C,
    pub ids: Arc<dyn IdGen>,
    pub traces: TraceWriter,
    /// Root of per-group workspaces (`<groups>/<folder>/inbox` holds
    /// downloaded attachments).
    pub groups_dir: PathBuf,
    pub transcriber: Option<Arc<dyn Transcriber>>,
}

pub(crate) struct PipelineInner<C: Clock> {
    pub(crate) deps: PipelineDeps<C>,
    pub(crate) rate: RateLimiter,
    pub(crate) callbacks: CallbackStore,
    pub(crate) active_drains: Mutex<HashSet<String>>,
    pub(crate) active_runs: Mutex<HashMap<String, CancelToken>>,
    pub(crate) command_handler: Mutex<Option<Arc<dyn CommandHandler>>>,
    pub(crate) shutdown: CancelToken,
}

/// Handle to the per-chat pipeline. Clones share all state.
pub struct MessagePipeline<C: Clock> {
    inner: Arc<PipelineInner<C>>,
}

impl<C: Clock> Clone for MessagePipeline<C> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<C: Clock> MessagePipeline<C> {
    pub fn new(deps: PipelineDeps<C>) -> Self {
        let rate = RateLimiter::new(deps.config.rate_limit_max, deps.config.rate_limit_window_ms);
        let callbacks = CallbackStore::new(deps.config.callback_ttl_ms);
        Self {
            inner: Arc::new(PipelineInner {
                deps,
                rate,
                callbacks,
                active_drains: Mutex::new(HashSet::new()),
                active_runs: Mutex::new(HashMap::new()),
                command_handler: Mutex::new(None),
                shutdown: CancelToken::new(),
            }),
        }
    }

    /// Install the admin command surface. Done once during startup.
    pub fn set_command_handler(&self, handler: Arc<dyn CommandHandler>) {
        *self.inner.command_handler.lock() = Some(handler);
    }

    pub fn rate_limiter(&self) -> &RateLimiter {
        &self.inner.rate
    }

    pub fn callbacks(&self) -> &CallbackStore {
        &self.inner.callbacks
    }

    pub(crate) fn clock_now(&self) -> u64 {
        self.inner.deps.clock.now_ms()
    }

    /// Ingest one observed message: record it, queue it if it should
    /// trigger processing, and make sure a drain is running.
    pub async fn handle_incoming(&self, message: IncomingMessage) {
        let store = &self.inner.deps.store;
        let chat_id = message.chat_id.clone();

        if let Err(e) = store.upsert_chat(Chat {
            chat_id: chat_id.clone(),
            name: message.sender_name.clone(),
            last_message_time: message.timestamp.clone(),
        }) {
            warn!(chat_id = %chat_id, error = %e, "chat upsert failed");
            return;
        }

        let attachments_json = if message.attachments.is_empty() {
            None
        } else {
            serde_json::to_string(&message.attachments).ok()
        };
        if let Err(e) = store.log_message(StoredMessage {
            id: message.message_id.clone().into(),
            chat_id: chat_id.clone(),
            sender_id: message.sender_id.clone(),
            sender_name: message.sender_name.clone(),
            content: message.content.clone(),
            timestamp: message.timestamp.clone(),
            is_outbound: false,
            attachments_json: attachments_json.clone(),
        }) {
            warn!(chat_id = %chat_id, error = %e, "message log append failed");
            return;
        }

        let Some(group) = store.group_by_chat(&chat_id) else {
            debug!(chat_id = %chat_id, "message logged for unregistered chat");
            return;
        };

        if message.is_group && !self.should_trigger(&group, &message) {
            debug!(chat_id = %chat_id, "group message without trigger, logged only");
            return;
        }

        // A cancel phrase aborts the in-flight run immediately; it never
        // waits behind the batch it is trying to stop.
        if process::is_cancel_phrase(&message.content) && self.cancel_active_run(&chat_id) {
            self.clear_pending(&chat_id);
            let _ = store.advance_cursor(dotclaw_core::ChatCursor {
                chat_id: chat_id.clone(),
                last_agent_timestamp: message.timestamp.clone(),
                last_agent_message_id: MessageId::new(&message.message_id),
            });
            let opts = dotclaw_adapters::SendOptions {
                thread_id: message.thread_id.clone(),
                ..Default::default()
            };
            if let Err(e) = self
                .inner
                .deps
                .registry
                .send_message(&chat_id, "Canceled the current request.", &opts)
                .await
            {
                warn!(chat_id = %chat_id, error = %e, "cancel acknowledgement failed");
            }
            return;
        }

        self.enqueue_row(QueuedMessage {
            auto_id: 0,
            chat_id: chat_id.clone(),
            message_id: MessageId::new(&message.message_id),
            sender_id: message.sender_id,
            sender_name: message.sender_name,
            content: message.content,
            timestamp: message.timestamp,
            is_group: message.is_group,
            chat_type: message.chat_type,
            thread_id: message.thread_id,
            status: QueuedStatus::Pending,
            attempt_count: 0,
            created_at: iso_from_ms(self.clock_now()),
            claimed_at_ms: None,
        });
    }

    fn enqueue_row(&self, row: QueuedMessage) {
        let chat_id = row.chat_id.clone();
        match self.inner.deps.store.enqueue_message(row) {
            Ok(Some(_)) | Ok(None) => self.begin_drain(&chat_id),
            Err(e) => warn!(chat_id = %chat_id, error = %e, "enqueue failed"),
        }
    }

    /// Whether a group message addresses the agent: bot mention, reply to
    /// the bot, or the group's trigger regex.
    fn should_trigger(&self, group: &RegisteredGroup, message: &IncomingMessage) -> bool {
        if let Some(provider) = self.inner.deps.registry.resolve(&message.chat_id) {
            if provider.is_bot_mentioned(message) || provider.is_bot_replied(message) {
                return true;
            }
        }
        match &group.trigger {
            Some(pattern) => regex::Regex::new(pattern)
                .map(|re| re.is_match(&message.content))
                .unwrap_or_else(|e| {
                    warn!(group = %group.folder, error = %e, "invalid trigger regex");
                    false
                }),
            None => false,
        }
    }

    /// Start a drain for this chat unless one is already active.
    pub fn begin_drain(&self, chat_id: &ChatId) {
        if self.inner.shutdown.is_canceled() {
            return;
        }
        {
            let mut drains = self.inner.active_drains.lock();
            if !drains.insert(chat_id.as_str().to_string()) {
                return;
            }
        }
        let pipeline = self.clone();
        let chat_id = chat_id.clone();
        tokio::spawn(async move {
            pipeline.drain(chat_id).await;
        });
    }

    /// Restart drains for every chat with pending rows (startup and wake
    /// recovery), skipping unregistered chats.
    pub fn resume_pending(&self) {
        for chat_id in self.inner.deps.store.chats_with_pending() {
            if self.inner.deps.store.group_by_chat(&chat_id).is_some() {
                self.begin_drain(&chat_id);
            }
        }
    }

    async fn drain(&self, chat_id: ChatId) {
        let cap = self.inner.deps.config.drain_iteration_cap;
        let mut iterations = 0u32;

        loop {
            if self.inner.shutdown.is_canceled() {
                break;
            }
            iterations += 1;
            if iterations > cap {
                warn!(chat_id = %chat_id, cap, "drain hit iteration cap, yielding");
                break;
            }
            let batch = match self.inner.deps.store.claim_batch_for_chat(
                &chat_id,
                self.clock_now(),
                self.inner.deps.config.batch_window_ms,
                self.inner.deps.config.max_batch_size,
            ) {
                Ok(batch) => batch,
                Err(e) => {
                    warn!(chat_id = %chat_id, error = %e, "batch claim failed");
                    break;
                }
            };
            if batch.is_empty() {
                break;
            }
            self.process_batch(&chat_id, batch).await;
        }

        self.inner.active_drains.lock().remove(chat_id.as_str());

        // Re-check after dropping the flag: a capped drain reschedules, and
        // a message enqueued while we were finishing must not be stranded.
        if !self.inner.shutdown.is_canceled()
            && self.inner.deps.store.pending_count(&chat_id) > 0
        {
            self.begin_drain(&chat_id);
        }
    }

    /// Absorb any still-pending rows for a chat (cancel path: the queued
    /// trigger must not fire after the abort).
    fn clear_pending(&self, chat_id: &ChatId) {
        let store = &self.inner.deps.store;
        if let Ok(rows) =
            store.claim_batch_for_chat(chat_id, self.clock_now(), u64::MAX / 2, usize::MAX)
        {
            let _ = store.complete_queued_messages(rows.iter().map(|r| r.auto_id).collect());
        }
    }

    /// Abort the in-flight agent run for a chat, if any.
    pub fn cancel_active_run(&self, chat_id: &ChatId) -> bool {
        if let Some(token) = self.inner.active_runs.lock().get(chat_id.as_str()) {
            token.cancel();
            true
        } else {
            false
        }
    }

    pub fn active_drain_count(&self) -> usize {
        self.inner.active_drains.lock().len()
    }

    /// Graceful shutdown: stop accepting drains, abort active runs, wait
    /// for in-flight drains up to `max_wait`.
    pub async fn shutdown(&self, max_wait: Duration) {
        self.inner.shutdown.cancel();
        for token in self.inner.active_runs.lock().values() {
            token.cancel();
        }
        let deadline = tokio::time::Instant::now() + max_wait;
        while self.active_drain_count() > 0 {
            if tokio::time::Instant::now() >= deadline {
                warn!(
                    remaining = self.active_drain_count(),
                    "drains still active at shutdown deadline, force-closing"
                );
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }
        info!("message pipeline stopped");
    }
}

#[async_trait]
impl<C: Clock> ProviderHandlers for MessagePipeline<C> {
    async fn on_message(&self, message: IncomingMessage) {
        self.handle_incoming(message).await;
    }

    async fn on_reaction(
        &self,
        chat_id: ChatId,
        message_id: String,
        user_id: Option<String>,
        emoji: String,
    ) {
        let store = &self.inner.deps.store;
        let Some(link) = store.trace_for_message(&chat_id, &message_id) else {
            debug!(chat_id = %chat_id, message_id, "reaction on unlinked message");
            return;
        };
        let entry = FeedbackEntry {
            trace_id: link.trace_id,
            chat_id,
            message_id,
            user_id,
            emoji,
            created_at: iso_from_ms(self.clock_now()),
        };
        if let Err(e) = store.record_feedback(entry) {
            warn!(error = %e, "failed to record reaction feedback");
        }
    }

    async fn on_button_click(&self, click: ButtonClick) {
        let now = self.clock_now();
        let Some(data) = self.inner.callbacks.take(&click.data, now) else {
            let _ = self
                .inner
                .deps
                .registry
                .send_message(
                    &click.chat_id,
                    "That button has expired.",
                    &Default::default(),
                )
                .await;
            return;
        };
        // Synthetic message; bypasses the group-trigger check on purpose —
        // a button click is always addressed to the agent.
        let message_id = format!("btn-{}", self.inner.deps.ids.next());
        let now_iso = iso_from_ms(now);
        let _ = self.inner.deps.store.log_message(StoredMessage {
            id: MessageId::new(&message_id),
            chat_id: click.chat_id.clone(),
            sender_id: click.sender_id.clone(),
            sender_name: click.sender_name.clone(),
            content: data.clone(),
            timestamp: now_iso.clone(),
            is_outbound: false,
            attachments_json: None,
        });
        self.enqueue_row(QueuedMessage {
            auto_id: 0,
            chat_id: click.chat_id,
            message_id: MessageId::new(&message_id),
            sender_id: click.sender_id,
            sender_name: click.sender_name,
            content: data,
            timestamp: now_iso.clone(),
            is_group: false,
            chat_type: dotclaw_core::ChatType::Private,
            thread_id: click.thread_id,
            status: QueuedStatus::Pending,
            attempt_count: 0,
            created_at: now_iso,
            claimed_at_ms: None,
        });
    }
}

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;
