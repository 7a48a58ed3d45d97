// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Trace records, trace links, and reaction feedback.

use crate::chat::ChatId;
use crate::group::GroupFolder;
use serde::{Deserialize, Serialize};

crate::define_id! {
    /// Identifier of one agent run's trace.
    pub struct TraceId;
}

/// One appended line of the daily trace file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceRecord {
    pub trace_id: TraceId,
    pub group_folder: GroupFolder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub chat_id: Option<ChatId>,
    /// What produced this run: `"message"`, `"task"`, or `"job"`.
    pub kind: String,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_prompt: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_completion: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub latency_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    /// ISO-8601 UTC
    pub created_at: String,
}

/// Links an outbound message to the trace that produced it, so reactions on
/// that message can be attributed back to the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraceLink {
    pub sent_message_id: String,
    pub chat_id: ChatId,
    pub trace_id: TraceId,
}

/// A user reaction recorded against a trace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedbackEntry {
    pub trace_id: TraceId,
    pub chat_id: ChatId,
    pub message_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    pub emoji: String,
    /// ISO-8601 UTC
    pub created_at: String,
}
