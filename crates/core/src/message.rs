// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The append-only message log, per-chat cursors, and the processing queue.

use crate::chat::{ChatId, ChatType};
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Provider-assigned message identifier (unique within a chat).
    pub struct MessageId;
}

/// One row of the append-only message log. Ordered per chat by
/// `(timestamp, id)` lexicographically — ISO-8601 timestamps make string
/// order chronological order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredMessage {
    pub id: MessageId,
    pub chat_id: ChatId,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    /// ISO-8601 UTC
    pub timestamp: String,
    pub is_outbound: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attachments_json: Option<String>,
}

impl StoredMessage {
    /// Sort key implementing the per-chat log order.
    pub fn log_key(&self) -> (&str, &str) {
        (&self.timestamp, self.id.as_str())
    }
}

/// Watermark of messages already folded into an agent run. Advanced
/// atomically after a successful batch; strictly monotonic per chat.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatCursor {
    pub chat_id: ChatId,
    pub last_agent_timestamp: String,
    pub last_agent_message_id: MessageId,
}

impl ChatCursor {
    /// True when `(timestamp, id)` is past this cursor.
    pub fn is_after(&self, timestamp: &str, message_id: &str) -> bool {
        (timestamp, message_id)
            > (
                self.last_agent_timestamp.as_str(),
                self.last_agent_message_id.as_str(),
            )
    }
}

/// Status of a queued message through its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueuedStatus {
    Pending,
    Claimed,
    Completed,
    Failed,
}

impl fmt::Display for QueuedStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueuedStatus::Pending => write!(f, "pending"),
            QueuedStatus::Claimed => write!(f, "claimed"),
            QueuedStatus::Completed => write!(f, "completed"),
            QueuedStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One observed message that may trigger processing. FIFO by `auto_id`
/// within `(chat_id, pending)`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedMessage {
    pub auto_id: u64,
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender_id: String,
    pub sender_name: String,
    pub content: String,
    /// ISO-8601 UTC
    pub timestamp: String,
    pub is_group: bool,
    pub chat_type: ChatType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread_id: Option<String>,
    pub status: QueuedStatus,
    pub attempt_count: u32,
    /// ISO-8601 UTC
    pub created_at: String,
    /// Epoch ms when the row was claimed; used for stalled-claim detection.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub claimed_at_ms: Option<u64>,
}

#[cfg(test)]
#[path = "message_tests.rs"]
mod tests;
