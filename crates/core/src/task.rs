// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled tasks: cron, interval, and one-shot agent runs.

use crate::chat::ChatId;
use crate::group::GroupFolder;
use serde::{Deserialize, Serialize};
use std::fmt;

crate::define_id! {
    /// Unique identifier for a scheduled task.
    pub struct TaskId;
}

/// How `schedule_value` is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduleKind {
    /// `schedule_value` is a cron expression evaluated in `timezone`.
    Cron,
    /// `schedule_value` is a duration (`"30000"` ms or `"5m"`-style).
    Interval,
    /// `schedule_value` is an ISO-8601 instant; the task runs once.
    Once,
}

impl ScheduleKind {
    /// Recurring tasks always run in a fresh session to bound history growth.
    pub fn is_recurring(&self) -> bool {
        matches!(self, ScheduleKind::Cron | ScheduleKind::Interval)
    }
}

impl fmt::Display for ScheduleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScheduleKind::Cron => write!(f, "cron"),
            ScheduleKind::Interval => write!(f, "interval"),
            ScheduleKind::Once => write!(f, "once"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Active,
    Paused,
    Completed,
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TaskStatus::Active => write!(f, "active"),
            TaskStatus::Paused => write!(f, "paused"),
            TaskStatus::Completed => write!(f, "completed"),
        }
    }
}

/// Whether a run attaches to the group's ongoing session or runs isolated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextMode {
    Group,
    Isolated,
}

/// A scheduled agent run.
///
/// Invariants: `next_run_at_ms` is `None` only when the task is not active
/// (or a completed `once`); `running_since_ms` is set exactly while a claim
/// is held.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: TaskId,
    pub group_folder: GroupFolder,
    pub chat_id: ChatId,
    pub prompt: String,
    pub schedule_kind: ScheduleKind,
    pub schedule_value: String,
    /// IANA timezone name for cron evaluation, e.g. `"Europe/Berlin"`.
    pub timezone: String,
    pub context_mode: ContextMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub next_run_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_run_at_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_json: Option<String>,
    pub retry_count: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub running_since_ms: Option<u64>,
    pub status: TaskStatus,
    /// ISO-8601 UTC
    pub created_at: String,
}

impl ScheduledTask {
    /// Whether a tick at `now_ms` should claim this task.
    pub fn is_due(&self, now_ms: u64) -> bool {
        self.status == TaskStatus::Active
            && self.running_since_ms.is_none()
            && self.next_run_at_ms.is_some_and(|next| next <= now_ms)
    }
}

#[cfg(test)]
#[path = "task_tests.rs"]
mod tests;
