// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The closed set of hook events user scripts can subscribe to.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum HookEvent {
    #[serde(rename = "message:received")]
    MessageReceived,
    #[serde(rename = "message:processing")]
    MessageProcessing,
    #[serde(rename = "message:responded")]
    MessageResponded,
    #[serde(rename = "agent:start")]
    AgentStart,
    #[serde(rename = "agent:complete")]
    AgentComplete,
    #[serde(rename = "job:spawned")]
    JobSpawned,
    #[serde(rename = "job:completed")]
    JobCompleted,
    #[serde(rename = "task:fired")]
    TaskFired,
    #[serde(rename = "task:completed")]
    TaskCompleted,
    #[serde(rename = "memory:upserted")]
    MemoryUpserted,
}

impl HookEvent {
    pub fn as_str(&self) -> &'static str {
        match self {
            HookEvent::MessageReceived => "message:received",
            HookEvent::MessageProcessing => "message:processing",
            HookEvent::MessageResponded => "message:responded",
            HookEvent::AgentStart => "agent:start",
            HookEvent::AgentComplete => "agent:complete",
            HookEvent::JobSpawned => "job:spawned",
            HookEvent::JobCompleted => "job:completed",
            HookEvent::TaskFired => "task:fired",
            HookEvent::TaskCompleted => "task:completed",
            HookEvent::MemoryUpserted => "memory:upserted",
        }
    }
}

impl fmt::Display for HookEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for HookEvent {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "message:received" => Ok(HookEvent::MessageReceived),
            "message:processing" => Ok(HookEvent::MessageProcessing),
            "message:responded" => Ok(HookEvent::MessageResponded),
            "agent:start" => Ok(HookEvent::AgentStart),
            "agent:complete" => Ok(HookEvent::AgentComplete),
            "job:spawned" => Ok(HookEvent::JobSpawned),
            "job:completed" => Ok(HookEvent::JobCompleted),
            "task:fired" => Ok(HookEvent::TaskFired),
            "task:completed" => Ok(HookEvent::TaskCompleted),
            "memory:upserted" => Ok(HookEvent::MemoryUpserted),
            other => Err(format!("unknown hook event: {other}")),
        }
    }
}
