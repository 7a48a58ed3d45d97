// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Traced adapter wrappers for consistent observability

use crate::agent::{AgentExecutionError, AgentRunResult, AgentRunSpec, AgentRunner};
use async_trait::async_trait;
use tracing::Instrument;

/// Wrapper that adds tracing to any AgentRunner
pub struct TracedRunner<R> {
    inner: R,
}

impl<R> TracedRunner<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }
}

#[async_trait]
impl<R: AgentRunner> AgentRunner for TracedRunner<R> {
    async fn execute(&self, spec: AgentRunSpec) -> Result<AgentRunResult, AgentExecutionError> {
        let span = tracing::info_span!(
            "agent.execute",
            run_id = %spec.run_id,
            group = %spec.group_folder,
            timeout_ms = spec.timeout_ms,
        );
        async {
            tracing::info!(prompt_len = spec.prompt.len(), "starting");
            let start = std::time::Instant::now();
            let result = self.inner.execute(spec).await;
            let elapsed_ms = start.elapsed().as_millis() as u64;
            match &result {
                Ok(run) => tracing::info!(
                    elapsed_ms,
                    status = ?run.output.status,
                    tool_calls = run.output.tool_calls,
                    "finished"
                ),
                Err(e) => tracing::warn!(elapsed_ms, error = %e, "failed"),
            }
            result
        }
        .instrument(span)
        .await
    }
}

#[cfg(test)]
#[path = "traced_tests.rs"]
mod tests;
