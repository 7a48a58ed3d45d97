// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Messaging provider abstraction.
//!
//! A `Provider` is a capability-bearing handle to one messaging backend
//! (Telegram, Discord, …). The core holds them as `Arc<dyn Provider>` in the
//! registry and never sees SDK types; incoming traffic flows through the
//! three [`ProviderHandlers`] methods implemented by the pipeline.

use async_trait::async_trait;
use dotclaw_core::{ChatId, IncomingMessage};
use std::path::PathBuf;
use std::sync::Arc;
use thiserror::Error;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeProvider, SentMessage};

/// Errors from provider operations
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{provider} rate limited, retry after {retry_after_ms:?}ms")]
    RateLimited {
        provider: String,
        retry_after_ms: Option<u64>,
    },
    #[error("{provider} transport error ({code:?}): {message}")]
    Transport {
        provider: String,
        code: Option<u16>,
        message: String,
        retryable: bool,
    },
    #[error("{provider} is not connected")]
    NotConnected { provider: String },
    #[error("{provider} rejected the call: {message}")]
    Rejected { provider: String, message: String },
}

/// Transient network error fragments worth retrying, mirroring the usual
/// libc/DNS failure strings.
const TRANSIENT_FRAGMENTS: &[&str] = &[
    "timed out",
    "connection reset",
    "connection refused",
    "temporarily unavailable",
    "dns error",
    "name not known",
];

impl ProviderError {
    /// Build a transport error, classifying retryability from the status
    /// code (429/5xx) and transient network error text.
    pub fn transport(provider: impl Into<String>, code: Option<u16>, message: impl Into<String>) -> Self {
        let message = message.into();
        let lower = message.to_lowercase();
        let retryable = matches!(code, Some(429) | Some(500..=599))
            || TRANSIENT_FRAGMENTS.iter().any(|f| lower.contains(f));
        Self::Transport {
            provider: provider.into(),
            code,
            message,
            retryable,
        }
    }

    pub fn is_retryable(&self) -> bool {
        match self {
            ProviderError::RateLimited { .. } => true,
            ProviderError::Transport { retryable, .. } => *retryable,
            ProviderError::NotConnected { .. } => true,
            ProviderError::Rejected { .. } => false,
        }
    }

    /// Server-provided retry hint, if any.
    pub fn retry_after_ms(&self) -> Option<u64> {
        match self {
            ProviderError::RateLimited { retry_after_ms, .. } => *retry_after_ms,
            _ => None,
        }
    }
}

/// Why a download failed; drives the user-visible failure listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DownloadErrorKind {
    TooLarge,
    Transient,
    Other,
}

#[derive(Debug, Error)]
#[error("download failed ({kind:?}): {message}")]
pub struct DownloadError {
    pub kind: DownloadErrorKind,
    pub message: String,
}

/// What a provider can do; consulted before attempting optional surface.
#[derive(Debug, Clone, Copy)]
pub struct ProviderCapabilities {
    pub max_attachment_bytes: u64,
    pub supports_reactions: bool,
    pub supports_threads: bool,
    pub supports_buttons: bool,
    pub supports_editing: bool,
}

impl Default for ProviderCapabilities {
    fn default() -> Self {
        Self {
            max_attachment_bytes: 20 * 1024 * 1024,
            supports_reactions: true,
            supports_threads: true,
            supports_buttons: true,
            supports_editing: true,
        }
    }
}

/// Options for outbound sends.
#[derive(Debug, Clone, Default)]
pub struct SendOptions {
    pub thread_id: Option<String>,
    pub reply_to_id: Option<String>,
    pub parse_mode: Option<String>,
}

/// Receipt for a successful send.
#[derive(Debug, Clone, Default)]
pub struct SendReceipt {
    pub message_id: Option<String>,
}

/// One inline keyboard button.
#[derive(Debug, Clone)]
pub struct InlineButton {
    pub label: String,
    /// Opaque callback data echoed back on click.
    pub data: String,
}

/// A button click surfaced by a provider.
#[derive(Debug, Clone)]
pub struct ButtonClick {
    pub chat_id: ChatId,
    pub sender_id: String,
    pub sender_name: String,
    pub label: String,
    pub data: String,
    pub thread_id: Option<String>,
}

/// Inbound callbacks implemented by the pipeline.
#[async_trait]
pub trait ProviderHandlers: Send + Sync {
    async fn on_message(&self, message: IncomingMessage);
    async fn on_reaction(
        &self,
        chat_id: ChatId,
        message_id: String,
        user_id: Option<String>,
        emoji: String,
    );
    async fn on_button_click(&self, click: ButtonClick);
}

fn unsupported(provider: &str, what: &str) -> ProviderError {
    ProviderError::Rejected {
        provider: provider.to_string(),
        message: format!("{what} not supported"),
    }
}

/// One messaging backend.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Stable provider name; also the chat-id prefix (`telegram`, `discord`).
    fn name(&self) -> &str;

    fn capabilities(&self) -> ProviderCapabilities;

    fn is_connected(&self) -> bool;

    /// Start the receive loop, delivering traffic to `handlers`.
    async fn start(&self, handlers: Arc<dyn ProviderHandlers>) -> Result<(), ProviderError>;

    async fn stop(&self) -> Result<(), ProviderError>;

    async fn send_message(
        &self,
        chat_id: &ChatId,
        text: &str,
        opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError>;

    async fn send_document(
        &self,
        chat_id: &ChatId,
        path: &std::path::Path,
        caption: Option<&str>,
        opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError>;

    async fn send_photo(
        &self,
        _chat_id: &ChatId,
        _path: &std::path::Path,
        _caption: Option<&str>,
        _opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        Err(unsupported(self.name(), "photos"))
    }

    async fn send_voice(
        &self,
        _chat_id: &ChatId,
        _path: &std::path::Path,
        _opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        Err(unsupported(self.name(), "voice notes"))
    }

    async fn send_audio(
        &self,
        _chat_id: &ChatId,
        _path: &std::path::Path,
        _opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        Err(unsupported(self.name(), "audio"))
    }

    async fn send_location(
        &self,
        _chat_id: &ChatId,
        _latitude: f64,
        _longitude: f64,
        _opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        Err(unsupported(self.name(), "locations"))
    }

    async fn send_contact(
        &self,
        _chat_id: &ChatId,
        _phone: &str,
        _name: &str,
        _opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        Err(unsupported(self.name(), "contacts"))
    }

    async fn send_poll(
        &self,
        _chat_id: &ChatId,
        _question: &str,
        _options: &[String],
        _opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        Err(unsupported(self.name(), "polls"))
    }

    async fn send_inline_keyboard(
        &self,
        _chat_id: &ChatId,
        _text: &str,
        _buttons: &[InlineButton],
        _opts: &SendOptions,
    ) -> Result<SendReceipt, ProviderError> {
        Err(unsupported(self.name(), "inline keyboards"))
    }

    async fn edit_message(
        &self,
        _chat_id: &ChatId,
        _message_id: &str,
        _text: &str,
    ) -> Result<(), ProviderError> {
        Err(unsupported(self.name(), "message edits"))
    }

    async fn delete_message(
        &self,
        _chat_id: &ChatId,
        _message_id: &str,
    ) -> Result<(), ProviderError> {
        Err(unsupported(self.name(), "message deletion"))
    }

    /// Download provider-held media into the group's inbox.
    async fn download_file(
        &self,
        provider_ref: &str,
        group_inbox: &std::path::Path,
        filename: &str,
    ) -> Result<PathBuf, DownloadError>;

    /// Whether the bot is @-mentioned in the message.
    fn is_bot_mentioned(&self, message: &IncomingMessage) -> bool;

    /// Whether the message replies to one of the bot's own messages.
    fn is_bot_replied(&self, message: &IncomingMessage) -> bool;

    fn bot_username(&self) -> Option<String> {
        None
    }
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
