// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! IPC wire types: envelopes dropped by container agents and their typed
//! decodings.
//!
//! Files arrive as free-form JSON objects; each is validated into a closed
//! variant type keyed on the `type` discriminator. Unknown types surface as
//! [`IpcParseError::UnknownType`] so the bus can log-and-drop without
//! touching any state.

use crate::chat::ChatId;
use crate::group::GroupFolder;
use crate::job::{JobEventLevel, JobId, JobSpec, JobStatus};
use crate::task::{ContextMode, ScheduleKind, TaskId};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Raw envelope shared by all IPC files: `{id?, type, payload?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcEnvelope {
    #[serde(default)]
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl IpcEnvelope {
    /// Parse one newline-terminated JSON file body.
    pub fn parse(body: &str) -> Result<Self, IpcParseError> {
        serde_json::from_str(body.trim()).map_err(|e| IpcParseError::BadEnvelope(e.to_string()))
    }
}

/// Response written to `responses/<request id>.json`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IpcResponse {
    pub id: String,
    pub ok: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    pub fn ok(id: impl Into<String>, result: serde_json::Value) -> Self {
        Self {
            id: id.into(),
            ok: true,
            result: Some(result),
            error: None,
        }
    }

    pub fn err(id: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ok: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Errors from envelope decoding
#[derive(Debug, Error)]
pub enum IpcParseError {
    #[error("bad envelope: {0}")]
    BadEnvelope(String),
    #[error("unknown type: {0}")]
    UnknownType(String),
    #[error("bad payload for {kind}: {message}")]
    BadPayload { kind: String, message: String },
}

fn payload<T: DeserializeOwned>(kind: &str, value: serde_json::Value) -> Result<T, IpcParseError> {
    serde_json::from_value(value).map_err(|e| IpcParseError::BadPayload {
        kind: kind.to_string(),
        message: e.to_string(),
    })
}

// ---- requests (synchronous, expect a response file) ----

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemoryUpsertPayload {
    #[serde(default)]
    pub key: Option<String>,
    pub content: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MemorySearchPayload {
    pub query: String,
    #[serde(default)]
    pub max_results: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct JobUpdatePayload {
    pub job_id: JobId,
    #[serde(default = "default_level")]
    pub level: JobEventLevel,
    pub message: String,
    #[serde(default)]
    pub data: Option<serde_json::Value>,
    #[serde(default)]
    pub notify: bool,
}

fn default_level() -> JobEventLevel {
    JobEventLevel::Info
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct JobFilter {
    #[serde(default)]
    pub group_folder: Option<GroupFolder>,
    #[serde(default)]
    pub status: Option<JobStatus>,
    #[serde(default)]
    pub limit: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct EditMessagePayload {
    pub chat_id: ChatId,
    pub message_id: String,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct DeleteMessagePayload {
    pub chat_id: ChatId,
    pub message_id: String,
}

/// A request dropped in `requests/` that needs a response.
#[derive(Debug, Clone, PartialEq)]
pub enum IpcRequest {
    MemoryUpsert(MemoryUpsertPayload),
    MemorySearch(MemorySearchPayload),
    MemoryDelete { key: String },
    ListGroups,
    RunTask { task_id: TaskId },
    SpawnJob(Box<JobSpec>),
    JobStatus { job_id: JobId },
    ListJobs(JobFilter),
    CancelJob { job_id: JobId },
    JobUpdate(JobUpdatePayload),
    EditMessage(EditMessagePayload),
    DeleteMessage(DeleteMessagePayload),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct KeyPayload {
    key: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct TaskIdPayload {
    task_id: TaskId,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct JobIdPayload {
    job_id: JobId,
}

impl IpcRequest {
    pub fn from_envelope(env: &IpcEnvelope) -> Result<Self, IpcParseError> {
        let p = env.payload.clone();
        match env.kind.as_str() {
            "memory_upsert" => Ok(Self::MemoryUpsert(payload(&env.kind, p)?)),
            "memory_search" => Ok(Self::MemorySearch(payload(&env.kind, p)?)),
            "memory_delete" => {
                let kp: KeyPayload = payload(&env.kind, p)?;
                Ok(Self::MemoryDelete { key: kp.key })
            }
            "list_groups" => Ok(Self::ListGroups),
            "run_task" => {
                let tp: TaskIdPayload = payload(&env.kind, p)?;
                Ok(Self::RunTask { task_id: tp.task_id })
            }
            "spawn_job" => Ok(Self::SpawnJob(Box::new(payload(&env.kind, p)?))),
            "job_status" => {
                let jp: JobIdPayload = payload(&env.kind, p)?;
                Ok(Self::JobStatus { job_id: jp.job_id })
            }
            "list_jobs" => Ok(Self::ListJobs(payload(&env.kind, p)?)),
            "cancel_job" => {
                let jp: JobIdPayload = payload(&env.kind, p)?;
                Ok(Self::CancelJob { job_id: jp.job_id })
            }
            "job_update" => Ok(Self::JobUpdate(payload(&env.kind, p)?)),
            "edit_message" => Ok(Self::EditMessage(payload(&env.kind, p)?)),
            "delete_message" => Ok(Self::DeleteMessage(payload(&env.kind, p)?)),
            other => Err(IpcParseError::UnknownType(other.to_string())),
        }
    }
}

// ---- task ops (fire-and-forget, dropped in tasks/) ----

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ScheduleTaskPayload {
    #[serde(default)]
    pub task_id: Option<TaskId>,
    #[serde(default)]
    pub group_folder: Option<GroupFolder>,
    #[serde(default)]
    pub chat_id: Option<ChatId>,
    pub prompt: String,
    #[serde(alias = "schedule_type")]
    pub schedule_kind: ScheduleKind,
    pub schedule_value: String,
    #[serde(default)]
    pub timezone: Option<String>,
    #[serde(default)]
    pub context_mode: Option<ContextMode>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RegisterGroupPayload {
    pub chat_id: ChatId,
    pub name: String,
    pub folder: GroupFolder,
    #[serde(default)]
    pub trigger: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SetModelPayload {
    #[serde(default)]
    pub group_folder: Option<GroupFolder>,
    #[serde(default)]
    pub model: Option<String>,
}

/// A fire-and-forget op dropped in `tasks/`.
#[derive(Debug, Clone, PartialEq)]
pub enum IpcTaskOp {
    ScheduleTask(ScheduleTaskPayload),
    PauseTask { task_id: TaskId },
    ResumeTask { task_id: TaskId },
    CancelTask { task_id: TaskId },
    UpdateTask(ScheduleTaskPayload),
    RegisterGroup(RegisterGroupPayload),
    RemoveGroup { chat_id: ChatId },
    SetModel(SetModelPayload),
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct ChatIdPayload {
    chat_id: ChatId,
}

impl IpcTaskOp {
    pub fn from_envelope(env: &IpcEnvelope) -> Result<Self, IpcParseError> {
        let p = env.payload.clone();
        match env.kind.as_str() {
            "schedule_task" => Ok(Self::ScheduleTask(payload(&env.kind, p)?)),
            "pause_task" => {
                let tp: TaskIdPayload = payload(&env.kind, p)?;
                Ok(Self::PauseTask { task_id: tp.task_id })
            }
            "resume_task" => {
                let tp: TaskIdPayload = payload(&env.kind, p)?;
                Ok(Self::ResumeTask { task_id: tp.task_id })
            }
            "cancel_task" => {
                let tp: TaskIdPayload = payload(&env.kind, p)?;
                Ok(Self::CancelTask { task_id: tp.task_id })
            }
            "update_task" => Ok(Self::UpdateTask(payload(&env.kind, p)?)),
            "register_group" => Ok(Self::RegisterGroup(payload(&env.kind, p)?)),
            "remove_group" => {
                let cp: ChatIdPayload = payload(&env.kind, p)?;
                Ok(Self::RemoveGroup { chat_id: cp.chat_id })
            }
            "set_model" => Ok(Self::SetModel(payload(&env.kind, p)?)),
            other => Err(IpcParseError::UnknownType(other.to_string())),
        }
    }
}

// ---- message ops (fire-and-forget, dropped in messages/) ----

/// An outbound message or media op dropped in `messages/`.
#[derive(Debug, Clone, PartialEq)]
pub enum IpcMessageOp {
    SendMessage {
        chat_id: Option<ChatId>,
        text: String,
        thread_id: Option<String>,
    },
    SendDocument {
        chat_id: Option<ChatId>,
        path: String,
        caption: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SendMessagePayload {
    #[serde(default)]
    chat_id: Option<ChatId>,
    text: String,
    #[serde(default)]
    thread_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
struct SendDocumentPayload {
    #[serde(default)]
    chat_id: Option<ChatId>,
    path: String,
    #[serde(default)]
    caption: Option<String>,
}

impl IpcMessageOp {
    pub fn from_envelope(env: &IpcEnvelope) -> Result<Self, IpcParseError> {
        let p = env.payload.clone();
        match env.kind.as_str() {
            "send_message" => {
                let mp: SendMessagePayload = payload(&env.kind, p)?;
                Ok(Self::SendMessage {
                    chat_id: mp.chat_id,
                    text: mp.text,
                    thread_id: mp.thread_id,
                })
            }
            "send_document" => {
                let dp: SendDocumentPayload = payload(&env.kind, p)?;
                Ok(Self::SendDocument {
                    chat_id: dp.chat_id,
                    path: dp.path,
                    caption: dp.caption,
                })
            }
            other => Err(IpcParseError::UnknownType(other.to_string())),
        }
    }
}

#[cfg(test)]
#[path = "ipc_tests.rs"]
mod tests;
