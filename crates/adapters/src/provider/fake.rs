// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory provider for tests: records outbound calls, lets tests inject
//! inbound traffic and scripted failures.

use super::*;
use dotclaw_core::IncomingMessage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

/// One outbound message recorded by the fake.
#[derive(Debug, Clone)]
pub struct SentMessage {
    pub chat_id: ChatId,
    pub text: String,
    pub thread_id: Option<String>,
}

#[derive(Default)]
struct FakeState {
    handlers: Option<Arc<dyn ProviderHandlers>>,
    sent: Vec<SentMessage>,
    edits: Vec<(ChatId, String, String)>,
    deletions: Vec<(ChatId, String)>,
    send_failures: VecDeque<ProviderError>,
    downloads: HashMap<String, Result<Vec<u8>, (DownloadErrorKind, String)>>,
    starts: u32,
    stops: u32,
}

/// Scriptable fake messaging backend.
#[derive(Clone)]
pub struct FakeProvider {
    name: String,
    capabilities: ProviderCapabilities,
    connected: Arc<AtomicBool>,
    next_message_id: Arc<AtomicU64>,
    state: Arc<Mutex<FakeState>>,
}

impl FakeProvider {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            capabilities: ProviderCapabilities::default(),
            connected: Arc::new(AtomicBool::new(false)),
            next_message_id: Arc::new(AtomicU64::new(0)),
            state: Arc::new(Mutex::new(FakeState::default())),
        }
    }

    pub fn with_capabilities(mut self, capabilities: ProviderCapabilities) -> Self {
        self.capabilities = capabilities;
        self
    }

    /// Queue an error for the next `send_message` call.
    pub fn push_send_failure(&self, error: ProviderError) {
        self.state.lock().send_failures.push_back(error);
    }

    /// Script the result of downloading `provider_ref`.
    pub fn set_download(&self, provider_ref: impl Into<String>, result: Result<Vec<u8>, (DownloadErrorKind, String)>) {
        self.state.lock().downloads.insert(provider_ref.into(), result);
    }

    /// Deliver an inbound message as if the backend received it.
    pub async fn deliver(&self, message: IncomingMessage) {
        let handlers = self.state.lock().handlers.clone();
        if let Some(handlers) = handlers {
            handlers.on_message(message).await;
        }
    }

    /// Deliver a reaction event.
    pub async fn deliver_reaction(
        &self,
        chat_id: ChatId,
        message_id: String,
        user_id: Option<String>,
        emoji: String,
    ) {
        let handlers = self.state.lock().handlers.clone();
        if let Some(handlers) = handlers {
            handlers.on_reaction(chat_id, message_id, user_id, emoji).await;
        }
    }

    /// Deliver a button click.
    pub async fn deliver_button_click(&self, click: ButtonClick) {
        let handlers = self.state.lock().handlers.clone();
        if let Some(handlers) = handlers {
            handlers.on_button_click(click).await;
        }
    }

    pub fn sent(&self) -> Vec<SentMessage> {
        self.state.lock().sent.clone()
    }

    pub fn last_sent(&self) -> Option<SentMessage> {
        self.state.lock().sent.last().cloned()
    }

    pub fn edits(&self) -> Vec<(ChatId, String, String)> {
        self.state.lock().edits.clone()
    }

    pub fn deletions(&self) -> Vec<(ChatId, String)> {
        self.state.lock().deletions.clone()
    }

    pub fn start_count(&self) -> u32 {
        self.state.lock().starts
    }

    pub fn stop_count(&self) -> u32 {
        self.state.lock().stops
    }
}

#[async_trait]
impl Provider for FakeProvider {
    fn name(&self) -> &str {
        &self.name
    }

    fn capabilities(&self) -> ProviderCapabilities {
        self.capabilities
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    async fn start(&self, handlers: Arc<dyn ProviderHandlers>) -> Result<(), ProviderError> {
        let mut state = self.state.lock();
        state.handlers = Some(handlers);
        state.starts += 1;
        self.connected.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn stop(&self) -> Result<(), ProviderError> {
        self.state.lock().stops += 1;
        self.connected.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        let mut state = self.state.lock();
        if let Some(err) = state.send_failures.pop_front() {
            return Err(err);
        }
        state.sent.push(SentMessage {
            chat_id: chat_id.clone(),
            text: text.to_string(),
            thread_id: opts.thread_id.clone(),
        });
        let n = self.next_message_id.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(SendReceipt {
            message_id: Some(format!("out-{n}")),
        })
    }

    async fn send_document(
        &self,
        chat_id: &ChatId,
        path: &std::path::Path,
        caption: Option<&str>,
        opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        let text = format!(
            "[document {}]{}",
            path.display(),
            caption.map(|c| format!(" {c}")).unwrap_or_default()
        );
        self.send_message(chat_id, &text, opts).await
    }

    async fn send_inline_keyboard(
        &self,
        chat_id: &ChatId,
        text: &str,
        buttons: &[InlineButton],
        opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        let labels: Vec<&str> = buttons.iter().map(|b| b.label.as_str()).collect();
        let text = format!("{text} [{}]", labels.join("|"));
        self.send_message(chat_id, &text, opts).await
    }

    async fn edit_message(
        &self,
        chat_id: &ChatId,
        message_id: &str,
        text: &str,
    ) -> Result<(), ProviderError> {
        self.state
            .lock()
            .edits
            .push((chat_id.clone(), message_id.to_string(), text.to_string()));
        Ok(())
    }

    async fn delete_message(
        &self,
        chat_id: &ChatId,
        message_id: &str,
    ) -> Result<(), ProviderError> {
        self.state
            .lock()
            .deletions
            .push((chat_id.clone(), message_id.to_string()));
        Ok(())
    }

    async fn download_file(
        &self,
        provider_ref: &str,
        group_inbox: &std::path::Path,
        filename: &str,
    ) -> Result<PathBuf, DownloadError> {
        let scripted = self.state.lock().downloads.get(provider_ref).cloned();
        match scripted {
            Some(Ok(bytes)) => {
                std::fs::create_dir_all(group_inbox).map_err(|e| DownloadError {
                    kind: DownloadErrorKind::Transient,
                    message: e.to_string(),
                })?;
                let path = group_inbox.join(filename);
                std::fs::write(&path, bytes).map_err(|e| DownloadError {
                    kind: DownloadErrorKind::Transient,
                    message: e.to_string(),
                })?;
                Ok(path)
            }
            Some(Err((kind, message))) => Err(DownloadError { kind, message }),
            None => Err(DownloadError {
                kind: DownloadErrorKind::Other,
                message: format!("no scripted download for {provider_ref}"),
            }),
        }
    }

    fn is_bot_mentioned(&self, message: &IncomingMessage) -> bool {
        message.content.contains(&format!("@{}", self.name))
    }

    fn is_bot_replied(&self, message: &IncomingMessage) -> bool {
        message
            .raw_provider_data
            .as_ref()
            .and_then(|v| v.get("reply_to_bot"))
            .and_then(|v| v.as_bool())
            .unwrap_or(false)
    }

    fn bot_username(&self) -> Option<String> {
        Some(self.name.clone())
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
