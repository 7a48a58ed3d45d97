// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Chats and inbound provider messages.
//!
//! Chat identifiers are provider-prefixed strings (`telegram:-100123`,
//! `discord:99887`). The prefix routes outbound calls back to the owning
//! provider and namespaces per-user rate-limit keys.

use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Provider-prefixed chat identifier, e.g. `telegram:-100123`.
    pub struct ChatId;
}

impl ChatId {
    /// Provider prefix before the first `:`, or the whole id if unprefixed.
    pub fn provider(&self) -> &str {
        self.0.split(':').next().unwrap_or(&self.0)
    }

    /// Compose a per-user rate-limit key scoped to this chat's provider.
    pub fn rate_key(&self, sender_id: &str) -> String {
        format!("{}:{}", self.provider(), sender_id)
    }
}

/// A conversation observed from a provider. Created on first message,
/// never deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chat {
    pub chat_id: ChatId,
    pub name: String,
    /// ISO-8601 UTC timestamp of the most recent message.
    pub last_message_time: String,
}

/// Kind of conversation a message arrived in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatType {
    Private,
    Dm,
    Group,
    Supergroup,
}

impl ChatType {
    pub fn is_group(&self) -> bool {
        matches!(self, ChatType::Group | ChatType::Supergroup)
    }
}

/// Kind of attachment carried by an incoming message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AttachmentKind {
    Photo,
    Document,
    Voice,
    Audio,
    Video,
    Other,
}

/// Reference to provider-held media. `provider_ref` is opaque to the core;
/// the owning provider resolves it during download.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Attachment {
    pub kind: AttachmentKind,
    pub provider_ref: String,
    pub filename: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// A message as delivered by a provider's receive loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncomingMessage {
    pub chat_id: ChatId,
    pub message_id: String,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    /// ISO-8601 UTC
    pub timestamp: String,
    #[serde(default)]
    pub attachments: Vec<Attachment>,
    pub is_group: bool,
    pub chat_type: ChatType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_provider_data: Option<serde_json::Value>,
}

#[cfg(test)]
#[path = "chat_tests.rs"]
mod tests;
