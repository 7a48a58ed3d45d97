// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Store mutation events.
//!
//! Every durable mutation is expressed as one of these events: the store
//! applies it to the in-memory tables and appends it to the WAL in the same
//! critical section. Recovery is snapshot + replay, so every event must be
//! deterministic — claim events carry the chosen row ids, never "whatever is
//! due now".
//!
//! Serializes as `{"type": "table:verb", ...fields}`.

use crate::chat::{Chat, ChatId};
use crate::group::{GroupFolder, RegisteredGroup};
use crate::job::{BackgroundJob, BackgroundJobEvent, JobId, JobOutcome};
use crate::message::{ChatCursor, QueuedMessage, StoredMessage};
use crate::task::{ScheduledTask, TaskId, TaskStatus};
use crate::trace::{FeedbackEntry, TraceLink};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StoreEvent {
    // -- chats & message log --
    #[serde(rename = "chat:upserted")]
    ChatUpserted { chat: Chat },

    #[serde(rename = "message:logged")]
    MessageLogged { message: StoredMessage },

    #[serde(rename = "cursor:advanced")]
    CursorAdvanced { cursor: ChatCursor },

    // -- processing queue --
    #[serde(rename = "queue:enqueued")]
    QueueEnqueued { message: QueuedMessage },

    #[serde(rename = "queue:claimed")]
    QueueClaimed {
        chat_id: ChatId,
        auto_ids: Vec<u64>,
        at_ms: u64,
    },

    #[serde(rename = "queue:completed")]
    QueueCompleted { auto_ids: Vec<u64> },

    #[serde(rename = "queue:failed")]
    QueueFailed { auto_ids: Vec<u64>, error: String },

    #[serde(rename = "queue:requeued")]
    QueueRequeued { auto_ids: Vec<u64>, error: String },

    #[serde(rename = "queue:stalled_reset")]
    QueueStalledReset { auto_ids: Vec<u64> },

    #[serde(rename = "queue:pruned")]
    QueuePruned { auto_ids: Vec<u64> },

    // -- groups & sessions --
    #[serde(rename = "group:registered")]
    GroupRegistered { group: RegisteredGroup },

    #[serde(rename = "group:removed")]
    GroupRemoved { chat_id: ChatId },

    #[serde(rename = "group:model_set")]
    GroupModelSet {
        folder: GroupFolder,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        model: Option<String>,
    },

    #[serde(rename = "session:set")]
    SessionSet {
        folder: GroupFolder,
        session_id: String,
    },

    // -- scheduled tasks --
    #[serde(rename = "task:created")]
    TaskCreated { task: ScheduledTask },

    #[serde(rename = "task:updated")]
    TaskUpdated { task: ScheduledTask },

    #[serde(rename = "task:claimed")]
    TasksClaimed { ids: Vec<TaskId>, at_ms: u64 },

    #[serde(rename = "task:run_finished")]
    TaskRunFinished {
        id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_run_at_ms: Option<u64>,
        last_run_at_ms: u64,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        retry_count: u32,
        status: TaskStatus,
    },

    #[serde(rename = "task:paused")]
    TaskPaused { id: TaskId, reason: String },

    #[serde(rename = "task:resumed")]
    TaskResumed {
        id: TaskId,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        next_run_at_ms: Option<u64>,
    },

    #[serde(rename = "task:canceled")]
    TaskCanceled { id: TaskId },

    // -- background jobs --
    #[serde(rename = "job:spawned")]
    JobSpawned { job: BackgroundJob },

    #[serde(rename = "job:claimed")]
    JobClaimed {
        id: JobId,
        at_ms: u64,
        lease_expires_at_ms: u64,
    },

    #[serde(rename = "job:lease_renewed")]
    JobLeaseRenewed {
        id: JobId,
        lease_expires_at_ms: u64,
    },

    #[serde(rename = "job:finished")]
    JobFinished {
        id: JobId,
        outcome: JobOutcome,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        summary: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<String>,
        at_ms: u64,
    },

    #[serde(rename = "job:stalled_reset")]
    JobsStalledReset { ids: Vec<JobId> },

    #[serde(rename = "job:event")]
    JobEventAppended { event: BackgroundJobEvent },

    // -- traces & feedback --
    #[serde(rename = "trace:linked")]
    TraceLinked { link: TraceLink },

    #[serde(rename = "feedback:recorded")]
    FeedbackRecorded { feedback: FeedbackEntry },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
