// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Materialized tables built from event replay.
//!
//! `apply_event` must stay deterministic and total: every event either
//! mutates the tables or is a no-op (row already gone). It never reads the
//! clock — claim events carry their own timestamps.

use dotclaw_core::{
    BackgroundJob, BackgroundJobEvent, Chat, ChatCursor, FeedbackEntry, JobStatus, QueuedMessage,
    QueuedStatus, RegisteredGroup, ScheduledTask, StoreEvent, StoredMessage, TaskStatus, TraceLink,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};

/// Key of the queue idempotency index: `<chat_id>|<message_id>`.
fn dedupe_key(chat_id: &str, message_id: &str) -> String {
    format!("{chat_id}|{message_id}")
}

/// Key of the trace-link index: `<chat_id>|<sent_message_id>`.
fn link_key(chat_id: &str, sent_message_id: &str) -> String {
    format!("{chat_id}|{sent_message_id}")
}

/// All durable tables.
#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct StoreState {
    /// chat_id → chat
    pub chats: HashMap<String, Chat>,
    /// chat_id → append-only message log (arrival order)
    pub messages: HashMap<String, Vec<StoredMessage>>,
    /// chat_id → cursor
    pub cursors: HashMap<String, ChatCursor>,
    /// auto_id → queued message (BTreeMap iteration = FIFO)
    pub queued: BTreeMap<u64, QueuedMessage>,
    /// `<chat>|<message>` → auto_id, for redelivery absorption
    pub queue_dedupe: HashMap<String, u64>,
    /// Highest auto_id ever assigned
    pub last_queue_id: u64,
    /// chat_id → registered group
    pub groups: HashMap<String, RegisteredGroup>,
    /// group folder → session id
    pub sessions: HashMap<String, String>,
    /// task id → task
    pub tasks: HashMap<String, ScheduledTask>,
    /// job id → job
    pub jobs: HashMap<String, BackgroundJob>,
    pub job_events: Vec<BackgroundJobEvent>,
    /// `<chat>|<sent_message>` → trace link
    pub trace_links: HashMap<String, TraceLink>,
    pub feedback: Vec<FeedbackEntry>,
}

impl StoreState {
    pub fn apply_event(&mut self, event: &StoreEvent) {
        match event {
            StoreEvent::ChatUpserted { chat } => {
                self.chats.insert(chat.chat_id.as_str().to_string(), chat.clone());
            }

            StoreEvent::MessageLogged { message } => {
                self.messages
                    .entry(message.chat_id.as_str().to_string())
                    .or_default()
                    .push(message.clone());
            }

            StoreEvent::CursorAdvanced { cursor } => {
                let key = cursor.chat_id.as_str().to_string();
                // Cursor is strictly monotonic; a stale advance is dropped.
                let stale = self.cursors.get(&key).is_some_and(|existing| {
                    !existing.is_after(
                        &cursor.last_agent_timestamp,
                        cursor.last_agent_message_id.as_str(),
                    )
                });
                if !stale {
                    self.cursors.insert(key, cursor.clone());
                }
            }

            StoreEvent::QueueEnqueued { message } => {
                let key = dedupe_key(message.chat_id.as_str(), message.message_id.as_str());
                if self.queue_dedupe.contains_key(&key) {
                    return;
                }
                self.last_queue_id = self.last_queue_id.max(message.auto_id);
                self.queue_dedupe.insert(key, message.auto_id);
                self.queued.insert(message.auto_id, message.clone());
            }

            StoreEvent::QueueClaimed { auto_ids, at_ms, .. } => {
                for id in auto_ids {
                    if let Some(row) = self.queued.get_mut(id) {
                        row.status = QueuedStatus::Claimed;
                        row.claimed_at_ms = Some(*at_ms);
                    }
                }
            }

            StoreEvent::QueueCompleted { auto_ids } => {
                self.set_queue_status(auto_ids, QueuedStatus::Completed, false);
            }

            StoreEvent::QueueFailed { auto_ids, .. } => {
                self.set_queue_status(auto_ids, QueuedStatus::Failed, false);
            }

            StoreEvent::QueueRequeued { auto_ids, .. } => {
                self.set_queue_status(auto_ids, QueuedStatus::Pending, true);
            }

            StoreEvent::QueueStalledReset { auto_ids } => {
                self.set_queue_status(auto_ids, QueuedStatus::Pending, false);
            }

            StoreEvent::QueuePruned { auto_ids } => {
                for id in auto_ids {
                    if let Some(row) = self.queued.remove(id) {
                        self.queue_dedupe
                            .remove(&dedupe_key(row.chat_id.as_str(), row.message_id.as_str()));
                    }
                }
            }

            StoreEvent::GroupRegistered { group } => {
                self.groups
                    .insert(group.chat_id.as_str().to_string(), group.clone());
            }

            StoreEvent::GroupRemoved { chat_id } => {
                self.groups.remove(chat_id.as_str());
            }

            StoreEvent::GroupModelSet { folder, model } => {
                if let Some(group) = self
                    .groups
                    .values_mut()
                    .find(|g| g.folder.as_str() == folder.as_str())
                {
                    group.model_override = model.clone();
                }
            }

            StoreEvent::SessionSet { folder, session_id } => {
                self.sessions
                    .insert(folder.as_str().to_string(), session_id.clone());
            }

            StoreEvent::TaskCreated { task } | StoreEvent::TaskUpdated { task } => {
                self.tasks.insert(task.id.as_str().to_string(), task.clone());
            }

            StoreEvent::TasksClaimed { ids, at_ms } => {
                for id in ids {
                    if let Some(task) = self.tasks.get_mut(id.as_str()) {
                        task.running_since_ms = Some(*at_ms);
                    }
                }
            }

            StoreEvent::TaskRunFinished {
                id,
                next_run_at_ms,
                last_run_at_ms,
                result,
                error,
                retry_count,
                status,
            } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    task.running_since_ms = None;
                    task.next_run_at_ms = *next_run_at_ms;
                    task.last_run_at_ms = Some(*last_run_at_ms);
                    task.last_result = result.clone();
                    task.last_error = error.clone();
                    task.retry_count = *retry_count;
                    task.status = *status;
                }
            }

            StoreEvent::TaskPaused { id, reason } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    task.status = TaskStatus::Paused;
                    task.next_run_at_ms = None;
                    task.last_error = Some(reason.clone());
                }
            }

            StoreEvent::TaskResumed { id, next_run_at_ms } => {
                if let Some(task) = self.tasks.get_mut(id.as_str()) {
                    task.status = TaskStatus::Active;
                    task.next_run_at_ms = *next_run_at_ms;
                    task.retry_count = 0;
                    task.last_error = None;
                }
            }

            StoreEvent::TaskCanceled { id } => {
                self.tasks.remove(id.as_str());
            }

            StoreEvent::JobSpawned { job } => {
                self.jobs.insert(job.id.as_str().to_string(), job.clone());
            }

            StoreEvent::JobClaimed {
                id,
                at_ms,
                lease_expires_at_ms,
            } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.status = JobStatus::Running;
                    job.started_at_ms = Some(*at_ms);
                    job.lease_expires_at_ms = Some(*lease_expires_at_ms);
                    job.attempt_count += 1;
                    job.updated_at = crate::iso_from_ms(*at_ms);
                }
            }

            StoreEvent::JobLeaseRenewed {
                id,
                lease_expires_at_ms,
            } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.lease_expires_at_ms = Some(*lease_expires_at_ms);
                }
            }

            StoreEvent::JobFinished {
                id,
                outcome,
                summary,
                error,
                at_ms,
            } => {
                if let Some(job) = self.jobs.get_mut(id.as_str()) {
                    job.status = outcome.status();
                    job.finished_at_ms = Some(*at_ms);
                    job.result_summary = summary.clone();
                    job.last_error = error.clone();
                    job.lease_expires_at_ms = None;
                    job.updated_at = crate::iso_from_ms(*at_ms);
                }
            }

            StoreEvent::JobsStalledReset { ids } => {
                for id in ids {
                    if let Some(job) = self.jobs.get_mut(id.as_str()) {
                        job.status = JobStatus::Queued;
                        job.started_at_ms = None;
                        job.lease_expires_at_ms = None;
                    }
                }
            }

            StoreEvent::JobEventAppended { event } => {
                self.job_events.push(event.clone());
            }

            StoreEvent::TraceLinked { link } => {
                self.trace_links.insert(
                    link_key(link.chat_id.as_str(), &link.sent_message_id),
                    link.clone(),
                );
            }

            StoreEvent::FeedbackRecorded { feedback } => {
                self.feedback.push(feedback.clone());
            }
        }
    }

    fn set_queue_status(&mut self, auto_ids: &[u64], status: QueuedStatus, bump_attempt: bool) {
        for id in auto_ids {
            if let Some(row) = self.queued.get_mut(id) {
                row.status = status;
                row.claimed_at_ms = None;
                if bump_attempt {
                    row.attempt_count += 1;
                }
            }
        }
    }

    /// Trace link recorded for an outbound message, if any.
    pub fn trace_link(&self, chat_id: &str, sent_message_id: &str) -> Option<&TraceLink> {
        self.trace_links.get(&link_key(chat_id, sent_message_id))
    }

    /// Whether a queued row already exists for `(chat_id, message_id)`.
    pub fn queue_contains(&self, chat_id: &str, message_id: &str) -> bool {
        self.queue_dedupe
            .contains_key(&dedupe_key(chat_id, message_id))
    }
}

#[cfg(test)]
#[path = "state_tests.rs"]
mod tests;
