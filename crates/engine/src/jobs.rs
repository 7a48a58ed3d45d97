// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Background-job worker pool.
//!
//! Workers claim the highest-priority queued job with a lease, renew the
//! lease at half its TTL while the agent runs, and report the outcome. A
//! worker that dies mid-run simply stops renewing; the stalled-job sweep
//! returns the row to the queue for another worker.

use crate::config::EngineConfig;
use crate::registry::ProviderRegistry;
use crate::retry::retry_with_backoff;
use crate::HookBus;
use dotclaw_adapters::{
    AgentExecutionError, AgentRunSpec, AgentRunner, CancelToken, OutputStatus, SendOptions,
};
use dotclaw_core::{
    BackgroundJob, BackgroundJobEvent, Clock, HookEvent, IdGen, JobEventLevel, JobId, JobOutcome,
    JobSpec, TraceId, TraceRecord,
};
use dotclaw_storage::{iso_from_ms, QueuePosition, Store, StoreError, TraceWriter};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info, warn};

/// Failure modes of `record_update`.
#[derive(Debug, Error)]
pub enum JobUpdateError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("job {0} not found")]
    NotFound(String),
    #[error("notification failed: {0}")]
    NotifyFailed(String),
}

/// Validate and enqueue a new background job. Returns the stored row and
/// its queue position.
pub fn spawn_background_job(
    store: &Store,
    ids: &dyn IdGen,
    spec: JobSpec,
    now_ms: u64,
) -> Result<(BackgroundJob, QueuePosition), StoreError> {
    let raw = ids.next();
    let short: String = raw.chars().filter(|c| *c != '-').take(8).collect();
    let id = JobId::new(format!("job-{short}"));
    store.spawn_background_job(id, spec, now_ms)
}

/// The worker pool and its job-facing API.
pub struct JobWorkers<C: Clock> {
    store: Store,
    runner: Arc<dyn AgentRunner>,
    registry: Arc<ProviderRegistry>,
    hooks: Arc<HookBus>,
    config: EngineConfig,
    clock: C,
    traces: TraceWriter,
    shutdown: CancelToken,
    active: Arc<Mutex<HashMap<String, CancelToken>>>,
}

impl<C: Clock> Clone for JobWorkers<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            runner: Arc::clone(&self.runner),
            registry: Arc::clone(&self.registry),
            hooks: Arc::clone(&self.hooks),
            config: self.config.clone(),
            clock: self.clock.clone(),
            traces: self.traces.clone(),
            shutdown: self.shutdown.clone(),
            active: Arc::clone(&self.active),
        }
    }
}

impl<C: Clock> JobWorkers<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        runner: Arc<dyn AgentRunner>,
        registry: Arc<ProviderRegistry>,
        hooks: Arc<HookBus>,
        config: EngineConfig,
        clock: C,
        traces: TraceWriter,
        shutdown: CancelToken,
    ) -> Self {
        Self {
            store,
            runner,
            registry,
            hooks,
            config,
            clock,
            traces,
            shutdown,
            active: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Spawn the configured number of worker loops.
    pub fn start(&self) -> Vec<tokio::task::JoinHandle<()>> {
        (0..self.config.job_workers)
            .map(|n| {
                let pool = self.clone();
                tokio::spawn(async move { pool.worker_loop(n).await })
            })
            .collect()
    }

    async fn worker_loop(&self, worker: usize) {
        info!(worker, "job worker started");
        loop {
            if self.shutdown.is_canceled() {
                break;
            }
            let claimed = match self
                .store
                .claim_background_job(self.clock.now_ms(), self.config.job_lease_ttl_ms)
            {
                Ok(job) => job,
                Err(e) => {
                    error!(worker, error = %e, "job claim failed");
                    None
                }
            };
            match claimed {
                Some(job) => self.run_job(job).await,
                None => {
                    tokio::select! {
                        _ = tokio::time::sleep(self.config.job_poll_interval()) => {}
                        _ = self.shutdown.canceled() => break,
                    }
                }
            }
        }
        info!(worker, "job worker stopped");
    }

    /// Run one claimed job to completion. Public for deterministic tests.
    pub async fn run_job(&self, job: BackgroundJob) {
        let cancel = CancelToken::new();
        self.active
            .lock()
            .insert(job.id.as_str().to_string(), cancel.clone());

        // Lease renewal at TTL/2 until the run settles.
        let renewal_stop = CancelToken::new();
        {
            let store = self.store.clone();
            let clock = self.clock.clone();
            let job_id = job.id.clone();
            let ttl = self.config.job_lease_ttl_ms;
            let stop = renewal_stop.clone();
            tokio::spawn(async move {
                let period = std::time::Duration::from_millis((ttl / 2).max(1));
                loop {
                    tokio::select! {
                        _ = tokio::time::sleep(period) => {
                            if let Err(e) = store.renew_background_job_lease(&job_id, clock.now_ms(), ttl) {
                                warn!(job_id = %job_id, error = %e, "lease renewal failed");
                            }
                        }
                        _ = stop.canceled() => break,
                    }
                }
            });
        }

        let timeout_ms = job.timeout_ms.unwrap_or(self.config.job_default_timeout_ms);
        let mut spec = AgentRunSpec::new(
            job.id.as_str(),
            job.group_folder.clone(),
            job.prompt.clone(),
        );
        spec.chat_id = job.chat_id.clone();
        spec.model_override = job.model_override.clone();
        spec.max_tool_steps = job.max_tool_steps;
        spec.timeout_ms = timeout_ms;
        spec.cancel = cancel.clone();
        if let Some(policy) = job.tool_policy_json.as_deref() {
            if let Ok(value) = serde_json::from_str::<serde_json::Value>(policy) {
                if let Some(allow) = value.get("allow").and_then(|v| v.as_array()) {
                    spec.tool_allow = allow
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect();
                }
                if let Some(deny) = value.get("deny").and_then(|v| v.as_array()) {
                    spec.tool_deny = deny
                        .iter()
                        .filter_map(|v| v.as_str().map(String::from))
                        .collect();
                }
            }
        }

        let result = self.runner.execute(spec).await;
        renewal_stop.cancel();
        self.active.lock().remove(job.id.as_str());

        let now = self.clock.now_ms();
        let (outcome, summary, error) = match &result {
            Ok(run) => match run.output.status {
                OutputStatus::Ok => (
                    JobOutcome::Success,
                    run.output.result.clone(),
                    None,
                ),
                OutputStatus::Error => (
                    JobOutcome::Failure,
                    None,
                    Some(
                        run.output
                            .error
                            .clone()
                            .unwrap_or_else(|| "agent error".to_string()),
                    ),
                ),
            },
            Err(AgentExecutionError::Timeout { timeout_ms }) => (
                JobOutcome::Timeout,
                None,
                Some(format!("timed out after {timeout_ms}ms")),
            ),
            Err(AgentExecutionError::Canceled) => (JobOutcome::Canceled, None, None),
            Err(e) => (JobOutcome::Failure, None, Some(e.to_string())),
        };

        self.traces.append(&TraceRecord {
            trace_id: TraceId::new(job.id.as_str()),
            group_folder: job.group_folder.clone(),
            chat_id: job.chat_id.clone(),
            kind: "job".into(),
            prompt: job.prompt.clone(),
            result: summary.clone(),
            error: error.clone(),
            tool_calls: result.as_ref().ok().and_then(|r| r.output.tool_calls),
            model: result.as_ref().ok().and_then(|r| r.output.model.clone()),
            tokens_prompt: result.as_ref().ok().and_then(|r| r.output.tokens_prompt),
            tokens_completion: result
                .as_ref()
                .ok()
                .and_then(|r| r.output.tokens_completion),
            latency_ms: result.as_ref().ok().map(|r| r.context.elapsed_ms),
            session_id: None,
            created_at: iso_from_ms(now),
        });

        if let Err(e) =
            self.store
                .finish_background_job(&job.id, outcome, summary.clone(), error.clone(), now)
        {
            error!(job_id = %job.id, error = %e, "failed to record job outcome");
        }

        self.hooks
            .emit(
                HookEvent::JobCompleted,
                &serde_json::json!({
                    "job_id": job.id.as_str(),
                    "outcome": outcome,
                }),
            )
            .await;

        if let Some(chat_id) = &job.chat_id {
            let text = match outcome {
                JobOutcome::Success => format!(
                    "Background job `{}` finished: {}",
                    job.id,
                    summary.as_deref().unwrap_or("(no output)")
                ),
                JobOutcome::Failure => format!(
                    "Background job `{}` failed: {}",
                    job.id,
                    error.as_deref().unwrap_or("unknown error")
                ),
                JobOutcome::Timeout => {
                    format!("Background job `{}` timed out.", job.id)
                }
                JobOutcome::Canceled => {
                    format!("Background job `{}` was canceled.", job.id)
                }
            };
            let registry = &self.registry;
            let sent = retry_with_backoff(
                self.config.notify_max_attempts,
                self.config.notify_base_ms,
                self.config.notify_cap_ms,
                || {
                    let text = text.clone();
                    async move {
                        registry
                            .send_message(chat_id, &text, &SendOptions::default())
                            .await
                            .map(|_| ())
                    }
                },
            )
            .await;
            if let Err(e) = sent {
                error!(job_id = %job.id, error = %e, "job completion notification failed");
            }
        }
    }

    /// Cancel a job. Queued jobs transition directly; running jobs get
    /// their abort token fired and settle through the worker.
    pub fn cancel(&self, job_id: &JobId) -> Result<bool, StoreError> {
        if self.store.cancel_queued_job(job_id, self.clock.now_ms())? {
            return Ok(true);
        }
        if let Some(token) = self.active.lock().get(job_id.as_str()) {
            token.cancel();
            return Ok(true);
        }
        Ok(false)
    }

    /// Append a job event; with `notify` also message the job's chat. A
    /// failed requested notification is an error to the caller.
    pub async fn record_update(
        &self,
        job_id: &JobId,
        level: JobEventLevel,
        message: String,
        data: Option<serde_json::Value>,
        notify: bool,
    ) -> Result<(), JobUpdateError> {
        let Some(job) = self.store.background_job(job_id) else {
            return Err(JobUpdateError::NotFound(job_id.as_str().to_string()));
        };
        self.store.append_job_event(BackgroundJobEvent {
            job_id: job_id.clone(),
            created_at: iso_from_ms(self.clock.now_ms()),
            level,
            message: message.clone(),
            data_json: data.map(|v| v.to_string()),
        })?;
        if notify {
            let chat_id = job
                .chat_id
                .ok_or_else(|| JobUpdateError::NotifyFailed("job has no chat".into()))?;
            self.registry
                .send_message(
                    &chat_id,
                    &format!("[{}] {}", job_id, message),
                    &SendOptions::default(),
                )
                .await
                .map_err(|e| JobUpdateError::NotifyFailed(e.to_string()))?;
        }
        Ok(())
    }

    /// Signal every active run; used at shutdown.
    pub fn abort_all(&self) {
        for token in self.active.lock().values() {
            token.cancel();
        }
    }
}

#[cfg(test)]
#[path = "jobs_tests.rs"]
mod tests;
