// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Agent runner that shells out to the configured container entrypoint.
//!
//! Protocol: the run spec is written to the child's stdin as one JSON line;
//! the child prints exactly one [`ContainerOutput`] JSON line on stdout and
//! exits. Timeout and cancellation kill the child.

use super::{
    AgentContext, AgentExecutionError, AgentRunResult, AgentRunSpec, AgentRunner, ContainerOutput,
    LocalAttachment,
};
use async_trait::async_trait;
use serde::Serialize;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// Wire view of the spec (everything except the host-side cancel token).
#[derive(Serialize)]
struct WireSpec<'a> {
    run_id: &'a str,
    group_folder: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    chat_id: Option<&'a str>,
    prompt: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    session_id: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    model_override: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tool_steps: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    tool_allow: &'a [String],
    tool_deny: &'a [String],
    enable_memory_recall: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    recall_max_results: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    recall_max_tokens: Option<u32>,
    attachments: &'a [LocalAttachment],
    timeout_ms: u64,
    timezone: &'a str,
}

/// Runs each agent in a child process of the configured command.
#[derive(Debug, Clone)]
pub struct ProcessAgentRunner {
    command: PathBuf,
    args: Vec<String>,
}

impl ProcessAgentRunner {
    pub fn new(command: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            args: Vec::new(),
        }
    }

    pub fn with_args(mut self, args: Vec<String>) -> Self {
        self.args = args;
        self
    }

    /// Verify the agent command exists before accepting any work.
    pub fn preflight(&self) -> Result<(), AgentExecutionError> {
        if self.command.is_absolute() || self.command.components().count() > 1 {
            if !self.command.exists() {
                return Err(AgentExecutionError::Spawn(format!(
                    "agent command not found: {}",
                    self.command.display()
                )));
            }
            return Ok(());
        }
        // Bare command name: resolve through PATH
        let found = std::env::var_os("PATH").is_some_and(|paths| {
            std::env::split_paths(&paths).any(|dir| dir.join(&self.command).exists())
        });
        if found {
            Ok(())
        } else {
            Err(AgentExecutionError::Spawn(format!(
                "agent command not found on PATH: {}",
                self.command.display()
            )))
        }
    }
}

#[async_trait]
impl AgentRunner for ProcessAgentRunner {
    async fn execute(&self, spec: AgentRunSpec) -> Result<AgentRunResult, AgentExecutionError> {
        let started = Instant::now();
        let wire = WireSpec {
            run_id: &spec.run_id,
            group_folder: spec.group_folder.as_str(),
            chat_id: spec.chat_id.as_ref().map(|c| c.as_str()),
            prompt: &spec.prompt,
            session_id: spec.session_id.as_deref(),
            model_override: spec.model_override.as_deref(),
            max_tool_steps: spec.max_tool_steps,
            max_output_tokens: spec.max_output_tokens,
            tool_allow: &spec.tool_allow,
            tool_deny: &spec.tool_deny,
            enable_memory_recall: spec.enable_memory_recall,
            recall_max_results: spec.recall_max_results,
            recall_max_tokens: spec.recall_max_tokens,
            attachments: &spec.attachments,
            timeout_ms: spec.timeout_ms,
            timezone: &spec.timezone,
        };
        let mut input =
            serde_json::to_vec(&wire).map_err(|e| AgentExecutionError::Io(e.to_string()))?;
        input.push(b'\n');

        let mut child = Command::new(&self.command)
            .args(&self.args)
            .env("DOTCLAW_RUN_ID", &spec.run_id)
            .env("DOTCLAW_GROUP", spec.group_folder.as_str())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| AgentExecutionError::Spawn(e.to_string()))?;

        if let Some(mut stdin) = child.stdin.take() {
            stdin
                .write_all(&input)
                .await
                .map_err(|e| AgentExecutionError::Io(e.to_string()))?;
            drop(stdin);
        }

        debug!(run_id = %spec.run_id, group = %spec.group_folder, "agent process started");

        let wait = child.wait_with_output();
        tokio::pin!(wait);
        let output = tokio::select! {
            result = &mut wait => {
                result.map_err(|e| AgentExecutionError::Io(e.to_string()))?
            }
            _ = spec.cancel.canceled() => {
                // Dropping the pinned future kills the child (kill_on_drop).
                return Err(AgentExecutionError::Canceled);
            }
            _ = tokio::time::sleep(Duration::from_millis(spec.timeout_ms)) => {
                return Err(AgentExecutionError::Timeout { timeout_ms: spec.timeout_ms });
            }
        };

        let stdout = String::from_utf8_lossy(&output.stdout);
        let line = stdout
            .lines()
            .rev()
            .find(|l| !l.trim().is_empty())
            .ok_or_else(|| AgentExecutionError::BadOutput("empty stdout".to_string()))?;
        let parsed: ContainerOutput = serde_json::from_str(line.trim())
            .map_err(|e| AgentExecutionError::BadOutput(e.to_string()))?;

        Ok(AgentRunResult {
            output: parsed,
            context: AgentContext {
                run_id: spec.run_id,
                elapsed_ms: started.elapsed().as_millis() as u64,
            },
        })
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
