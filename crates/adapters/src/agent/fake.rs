// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scripted agent runner for tests.

use super::{
    AgentContext, AgentExecutionError, AgentRunResult, AgentRunSpec, AgentRunner, ContainerOutput,
};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// One scripted outcome.
pub enum FakeRun {
    /// Return this output after an optional simulated latency.
    Output(ContainerOutput),
    /// Fail host-side.
    HostError(AgentExecutionError),
    /// Never finish; resolves only through the spec's cancel token or
    /// timeout. Models a run that blows the foreground budget.
    Hang,
}

#[derive(Default)]
struct FakeState {
    script: VecDeque<FakeRun>,
    calls: Vec<AgentRunSpec>,
}

/// Agent runner that replays scripted outcomes and records received specs.
/// An exhausted script echoes the prompt back as a successful run.
#[derive(Clone, Default)]
pub struct FakeAgentRunner {
    state: Arc<Mutex<FakeState>>,
    /// Simulated latency applied to every scripted output.
    latency: Option<Duration>,
}

impl FakeAgentRunner {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    pub fn push(&self, run: FakeRun) {
        self.state.lock().script.push_back(run);
    }

    pub fn push_output(&self, output: ContainerOutput) {
        self.push(FakeRun::Output(output));
    }

    /// Specs received so far, in call order.
    pub fn calls(&self) -> Vec<AgentRunSpec> {
        self.state.lock().calls.clone()
    }

    pub fn call_count(&self) -> usize {
        self.state.lock().calls.len()
    }
}

#[async_trait]
impl AgentRunner for FakeAgentRunner {
    async fn execute(&self, spec: AgentRunSpec) -> Result<AgentRunResult, AgentExecutionError> {
        let run = {
            let mut state = self.state.lock();
            state.calls.push(spec.clone());
            state.script.pop_front()
        };
        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }
        match run {
            Some(FakeRun::Output(output)) => Ok(AgentRunResult {
                output,
                context: AgentContext {
                    run_id: spec.run_id,
                    elapsed_ms: self.latency.map(|l| l.as_millis() as u64).unwrap_or(1),
                },
            }),
            Some(FakeRun::HostError(err)) => Err(err),
            Some(FakeRun::Hang) => {
                let timeout = Duration::from_millis(spec.timeout_ms);
                tokio::select! {
                    _ = spec.cancel.canceled() => Err(AgentExecutionError::Canceled),
                    _ = tokio::time::sleep(timeout) => {
                        Err(AgentExecutionError::Timeout { timeout_ms: spec.timeout_ms })
                    }
                }
            }
            None => Ok(AgentRunResult {
                output: ContainerOutput::ok(format!("echo: {}", spec.prompt)),
                context: AgentContext {
                    run_id: spec.run_id,
                    elapsed_ms: 1,
                },
            }),
        }
    }
}

#[cfg(test)]
#[path = "fake_tests.rs"]
mod tests;
