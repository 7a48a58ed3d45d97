// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runner abstraction.
//!
//! Agent execution is opaque to the host: a run goes in as an
//! [`AgentRunSpec`], a [`ContainerOutput`] comes back. The production
//! implementation hands the spec to a containerized agent process; the fake
//! replays scripted outcomes.

mod process;
pub use process::ProcessAgentRunner;

#[cfg(any(test, feature = "test-support"))]
mod fake;
#[cfg(any(test, feature = "test-support"))]
pub use fake::{FakeAgentRunner, FakeRun};

use crate::cancel::CancelToken;
use async_trait::async_trait;
use dotclaw_core::{AttachmentKind, ChatId, GroupFolder};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Host-side failure of an agent run. Container-side failures come back as
/// `ContainerOutput { status: Error, .. }` instead.
#[derive(Debug, Error)]
pub enum AgentExecutionError {
    #[error("agent run timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("agent run canceled")]
    Canceled,
    #[error("agent spawn failed: {0}")]
    Spawn(String),
    #[error("agent io error: {0}")]
    Io(String),
    #[error("agent produced unparseable output: {0}")]
    BadOutput(String),
}

impl AgentExecutionError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, AgentExecutionError::Timeout { .. })
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, AgentExecutionError::Canceled)
    }
}

/// A downloaded attachment handed to the agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocalAttachment {
    pub kind: AttachmentKind,
    pub path: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
}

/// Everything one run needs. `cancel` is host-side only and not serialized
/// onto the wire.
#[derive(Debug, Clone)]
pub struct AgentRunSpec {
    pub run_id: String,
    pub group_folder: GroupFolder,
    pub chat_id: Option<ChatId>,
    pub prompt: String,
    /// Existing session to continue, or `None` for a fresh one.
    pub session_id: Option<String>,
    pub model_override: Option<String>,
    pub max_tool_steps: Option<u32>,
    pub max_output_tokens: Option<u32>,
    pub tool_allow: Vec<String>,
    pub tool_deny: Vec<String>,
    pub enable_memory_recall: bool,
    pub recall_max_results: Option<u32>,
    pub recall_max_tokens: Option<u32>,
    pub attachments: Vec<LocalAttachment>,
    pub timeout_ms: u64,
    pub timezone: String,
    pub cancel: CancelToken,
}

impl AgentRunSpec {
    /// Minimal spec for a prompt in a group; callers layer overrides on top.
    pub fn new(run_id: impl Into<String>, group_folder: GroupFolder, prompt: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            group_folder,
            chat_id: None,
            prompt: prompt.into(),
            session_id: None,
            model_override: None,
            max_tool_steps: None,
            max_output_tokens: None,
            tool_allow: Vec::new(),
            tool_deny: Vec::new(),
            enable_memory_recall: false,
            recall_max_results: None,
            recall_max_tokens: None,
            attachments: Vec::new(),
            timeout_ms: 120_000,
            timezone: "UTC".to_string(),
            cancel: CancelToken::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputStatus {
    Ok,
    Error,
}

/// Structured result produced by the agent container.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerOutput {
    pub status: OutputStatus,
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
    pub memory_recalled: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_extracted: Option<u32>,
    /// Session handed back by the runner; passed in on the next run to
    /// continue conversational state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub new_session_id: Option<String>,
}

impl ContainerOutput {
    pub fn ok(result: impl Into<String>) -> Self {
        Self {
            status: OutputStatus::Ok,
            result: Some(result.into()),
            error: None,
            tool_calls: None,
            model: None,
            tokens_prompt: None,
            tokens_completion: None,
            latency_ms: None,
            memory_recalled: None,
            memory_extracted: None,
            new_session_id: None,
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: OutputStatus::Error,
            result: None,
            error: Some(message.into()),
            tool_calls: None,
            model: None,
            tokens_prompt: None,
            tokens_completion: None,
            latency_ms: None,
            memory_recalled: None,
            memory_extracted: None,
            new_session_id: None,
        }
    }

    /// Whether the run stopped because it hit its tool-step ceiling.
    pub fn hit_tool_limit(&self, max_tool_steps: Option<u32>) -> bool {
        match (self.tool_calls, max_tool_steps) {
            (Some(calls), Some(max)) => calls >= max,
            _ => false,
        }
    }
}

/// Host-side execution metadata accompanying the output.
#[derive(Debug, Clone)]
pub struct AgentContext {
    pub run_id: String,
    pub elapsed_ms: u64,
}

/// A completed run.
#[derive(Debug, Clone)]
pub struct AgentRunResult {
    pub output: ContainerOutput,
    pub context: AgentContext,
}

/// Executes agent runs. Implementations must honor `spec.cancel` and
/// `spec.timeout_ms`.
#[async_trait]
pub trait AgentRunner: Send + Sync {
    async fn execute(&self, spec: AgentRunSpec) -> Result<AgentRunResult, AgentExecutionError>;
}

#[cfg(test)]
#[path = "mod_tests.rs"]
mod tests;
