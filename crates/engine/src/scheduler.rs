// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Scheduled-task engine: claims due tasks, runs them, applies the
//! retry/backoff policy and the circuit breaker.

use crate::config::EngineConfig;
use crate::registry::ProviderRegistry;
use crate::retry::{band_jitter_ms, exp_backoff_ms, retry_with_backoff};
use crate::router::{route_request, RouteContext, RouterConfig};
use crate::schedule::{next_run_after_success, ScheduleError};
use crate::HookBus;
use dotclaw_adapters::{AgentRunSpec, AgentRunner, CancelToken, OutputStatus, SendOptions};
use dotclaw_core::{
    format_relative_ms, ChatId, Clock, ContextMode, HookEvent, IdGen, ScheduledTask, TaskId,
    TaskStatus, TraceId, TraceRecord,
};
use dotclaw_storage::{iso_from_ms, Store, StoreError, TraceWriter};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{error, info, warn};

/// Shared dependencies of the task engine.
pub struct TaskEngine<C: Clock> {
    store: Store,
    runner: Arc<dyn AgentRunner>,
    registry: Arc<ProviderRegistry>,
    hooks: Arc<HookBus>,
    router: RouterConfig,
    config: EngineConfig,
    clock: C,
    ids: Arc<dyn IdGen>,
    traces: TraceWriter,
    shutdown: CancelToken,
}

impl<C: Clock> Clone for TaskEngine<C> {
    fn clone(&self) -> Self {
        Self {
            store: self.store.clone(),
            runner: Arc::clone(&self.runner),
            registry: Arc::clone(&self.registry),
            hooks: Arc::clone(&self.hooks),
            router: self.router.clone(),
            config: self.config.clone(),
            clock: self.clock.clone(),
            ids: Arc::clone(&self.ids),
            traces: self.traces.clone(),
            shutdown: self.shutdown.clone(),
        }
    }
}

enum RunOutcome {
    Success { summary: String },
    Failure { error: String },
}

impl<C: Clock> TaskEngine<C> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Store,
        runner: Arc<dyn AgentRunner>,
        registry: Arc<ProviderRegistry>,
        hooks: Arc<HookBus>,
        router: RouterConfig,
        config: EngineConfig,
        clock: C,
        ids: Arc<dyn IdGen>,
        traces: TraceWriter,
        shutdown: CancelToken,
    ) -> Self {
        Self {
            store,
            runner,
            registry,
            hooks,
            router,
            config,
            clock,
            ids,
            traces,
            shutdown,
        }
    }

    /// Poll loop. Runs until the shutdown token fires.
    pub async fn run(self) {
        let mut tick = tokio::time::interval(self.config.scheduler_poll_interval());
        tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = tick.tick() => {}
                _ = self.shutdown.canceled() => break,
            }
            self.tick().await;
        }
        info!("task engine stopped");
    }

    /// One poll: claim everything due and dispatch concurrently. Failures of
    /// individual tasks never abort the batch.
    pub async fn tick(&self) {
        let now = self.clock.now_ms();
        let claimed = match self.store.claim_due_tasks(now) {
            Ok(claimed) => claimed,
            Err(e) => {
                error!(error = %e, "claim_due_tasks failed");
                return;
            }
        };
        if claimed.is_empty() {
            return;
        }
        let mut runs = JoinSet::new();
        for task in claimed {
            let engine = self.clone();
            runs.spawn(async move { engine.run_claimed(task, true).await });
        }
        while let Some(result) = runs.join_next().await {
            if let Err(e) = result {
                error!(error = %e, "task run panicked");
            }
        }
    }

    /// Out-of-band immediate execution. Rejects when the task is already
    /// running; does not reschedule.
    pub async fn run_task_now(&self, task_id: &TaskId) -> Result<(), StoreError> {
        let task = self.store.claim_task(task_id, self.clock.now_ms())?;
        self.run_claimed(task, false).await;
        Ok(())
    }

    async fn run_claimed(&self, task: ScheduledTask, reschedule: bool) {
        // Status re-check: the task may have been paused or canceled between
        // the claim and this dispatch.
        let Some(current) = self.store.task(&task.id) else {
            return;
        };
        if current.status != TaskStatus::Active {
            let _ = self.store.update_task_after_run(
                &task.id,
                None,
                current.last_result.clone(),
                current.last_error.clone(),
                current.retry_count,
                current.status,
                self.clock.now_ms(),
            );
            return;
        }

        self.hooks
            .emit(
                HookEvent::TaskFired,
                &serde_json::json!({
                    "task_id": task.id.as_str(),
                    "group": task.group_folder.as_str(),
                    "schedule_kind": task.schedule_kind.to_string(),
                }),
            )
            .await;

        let outcome = self.execute(&task).await;
        let now = self.clock.now_ms();

        match outcome {
            RunOutcome::Success { summary } => {
                if reschedule {
                    self.finish_success(&task, summary, now).await;
                } else {
                    let _ = self.store.update_task_after_run(
                        &task.id,
                        task.next_run_at_ms,
                        Some(summary.clone()),
                        None,
                        task.retry_count,
                        task.status,
                        now,
                    );
                    self.notify(&task.chat_id, format!("Done: {summary}")).await;
                }
            }
            RunOutcome::Failure { error } => {
                if reschedule {
                    self.finish_failure(&task, error, now).await;
                } else {
                    let _ = self.store.update_task_after_run(
                        &task.id,
                        task.next_run_at_ms,
                        None,
                        Some(error.clone()),
                        task.retry_count,
                        task.status,
                        now,
                    );
                    self.notify(&task.chat_id, format!("Task failed: {error}"))
                        .await;
                }
            }
        }

        self.hooks
            .emit(
                HookEvent::TaskCompleted,
                &serde_json::json!({ "task_id": task.id.as_str() }),
            )
            .await;
    }

    async fn finish_success(&self, task: &ScheduledTask, summary: String, now: u64) {
        match next_run_after_success(
            task.schedule_kind,
            &task.schedule_value,
            &task.timezone,
            now,
        ) {
            Ok(Some(next)) => {
                let _ = self.store.update_task_after_run(
                    &task.id,
                    Some(next),
                    Some(summary.clone()),
                    None,
                    0,
                    TaskStatus::Active,
                    now,
                );
                let phrase = format_relative_ms(next.saturating_sub(now));
                self.notify(&task.chat_id, format!("Done: {summary} Next run {phrase}."))
                    .await;
            }
            Ok(None) => {
                let _ = self.store.update_task_after_run(
                    &task.id,
                    None,
                    Some(summary.clone()),
                    None,
                    0,
                    TaskStatus::Completed,
                    now,
                );
                self.notify(&task.chat_id, format!("Done: {summary}")).await;
            }
            Err(e) => {
                self.pause_with_reason(task, schedule_reason(&e), now).await;
            }
        }
    }

    async fn finish_failure(&self, task: &ScheduledTask, error: String, now: u64) {
        let retry_count = task.retry_count + 1;
        if retry_count > self.config.task_max_retries {
            let reason = format!(
                "it failed {} times in a row",
                self.config.task_max_retries
            );
            let _ = self.store.update_task_after_run(
                &task.id,
                None,
                None,
                Some(error.clone()),
                retry_count,
                TaskStatus::Paused,
                now,
            );
            warn!(task_id = %task.id, error, "task paused by circuit breaker");
            self.notify(
                &task.chat_id,
                format!("Your scheduled task has been paused because {reason}"),
            )
            .await;
            return;
        }

        let delay = band_jitter_ms(exp_backoff_ms(
            self.config.task_retry_base_ms,
            self.config.task_retry_max_ms,
            retry_count,
        ));
        let next = now + delay;
        let _ = self.store.update_task_after_run(
            &task.id,
            Some(next),
            None,
            Some(error.clone()),
            retry_count,
            TaskStatus::Active,
            now,
        );
        let phrase = format_relative_ms(delay);
        self.notify(
            &task.chat_id,
            format!("Scheduled task failed: {error} Retrying {phrase}."),
        )
        .await;
    }

    async fn pause_with_reason(&self, task: &ScheduledTask, reason: String, now: u64) {
        let _ = self.store.update_task_after_run(
            &task.id,
            None,
            None,
            Some(reason.clone()),
            task.retry_count,
            TaskStatus::Paused,
            now,
        );
        self.notify(
            &task.chat_id,
            format!("Your scheduled task has been paused because {reason}"),
        )
        .await;
    }

    async fn execute(&self, task: &ScheduledTask) -> RunOutcome {
        let group = self.store.group_by_folder(&task.group_folder);
        let model_override = group.as_ref().and_then(|g| g.model_override.as_deref());
        let decision = route_request(
            &task.prompt,
            None,
            RouteContext {
                is_scheduled_task: true,
                model_override,
            },
            &self.router,
        );

        // Recurring tasks always run in a fresh session; only one-shot
        // tasks may attach to the group session.
        let fresh = task.schedule_kind.is_recurring() || task.context_mode == ContextMode::Isolated;
        let session_id = if fresh {
            None
        } else {
            self.store.session(&task.group_folder)
        };

        let run_id = self.ids.next();
        let mut spec = AgentRunSpec::new(run_id.clone(), task.group_folder.clone(), &task.prompt);
        spec.chat_id = Some(task.chat_id.clone());
        spec.session_id = session_id;
        spec.model_override = decision.model_override.clone();
        spec.max_tool_steps = decision.max_tool_steps;
        spec.max_output_tokens = decision.max_output_tokens;
        spec.tool_allow = decision.tool_allow.clone();
        spec.tool_deny = decision.tool_deny.clone();
        spec.enable_memory_recall = decision.enable_memory_recall;
        spec.recall_max_results = decision.recall_max_results;
        spec.recall_max_tokens = decision.recall_max_tokens;
        spec.timeout_ms = self.config.task_timeout_ms;
        spec.timezone = task.timezone.clone();
        spec.cancel = self.shutdown.clone();

        let result = self.runner.execute(spec).await;
        let now = self.clock.now_ms();
        let mut record = TraceRecord {
            trace_id: TraceId::new(&run_id),
            group_folder: task.group_folder.clone(),
            chat_id: Some(task.chat_id.clone()),
            kind: "task".into(),
            prompt: task.prompt.clone(),
            result: None,
            error: None,
            tool_calls: None,
            model: None,
            tokens_prompt: None,
            tokens_completion: None,
            latency_ms: None,
            session_id: None,
            created_at: iso_from_ms(now),
        };

        let outcome = match result {
            Ok(run) => {
                record.tool_calls = run.output.tool_calls;
                record.model = run.output.model.clone();
                record.tokens_prompt = run.output.tokens_prompt;
                record.tokens_completion = run.output.tokens_completion;
                record.latency_ms = Some(run.context.elapsed_ms);
                match run.output.status {
                    OutputStatus::Ok => {
                        if !fresh {
                            if let Some(session) = run.output.new_session_id.clone() {
                                let _ = self.store.set_session(&task.group_folder, session);
                            }
                        }
                        let summary = truncate(
                            run.output.result.as_deref().unwrap_or("(no output)"),
                            300,
                        );
                        record.result = Some(summary.clone());
                        RunOutcome::Success { summary }
                    }
                    OutputStatus::Error => {
                        let error =
                            truncate(run.output.error.as_deref().unwrap_or("agent error"), 300);
                        record.error = Some(error.clone());
                        RunOutcome::Failure { error }
                    }
                }
            }
            Err(e) => {
                let error = e.to_string();
                record.error = Some(error.clone());
                RunOutcome::Failure { error }
            }
        };
        self.traces.append(&record);
        outcome
    }

    /// Deliver a notification with its own retry policy; exhausted retries
    /// log an error without touching task state.
    async fn notify(&self, chat_id: &ChatId, text: String) {
        let registry = &self.registry;
        let result = retry_with_backoff(
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
        if let Err(e) = result {
            error!(chat_id = %chat_id, error = %e, "task notification failed after retries");
        }
    }
}

fn schedule_reason(e: &ScheduleError) -> String {
    format!("its schedule is invalid: {e}")
}

fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        s.to_string()
    } else {
        let mut cut = max;
        while !s.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}…", &s[..cut])
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
