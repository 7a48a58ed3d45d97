// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Batch processing: the path from a claimed batch to an outbound reply.

use super::MessagePipeline;
use crate::jobs::spawn_background_job;
use crate::retry::{exp_backoff_ms, full_jitter_ms};
use crate::router::{route_request, RouteContext};
use dotclaw_adapters::{
    AgentExecutionError, AgentRunSpec, CancelToken, OutputStatus, SendOptions,
};
use dotclaw_core::{
    format_eta_minutes, ChatCursor, ChatId, Clock, ContextMode, HookEvent, IncomingMessage,
    JobSpec, MessageId, QueuedMessage, RegisteredGroup, RoutingDecision, StoredMessage, TraceId,
    TraceLink, TraceRecord,
};
use dotclaw_storage::iso_from_ms;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Phrases that abort the in-flight run for a chat.
const CANCEL_PHRASES: &[&str] = &["cancel", "stop", "abort", "cancel request", "stop request"];

pub(super) fn is_cancel_phrase(content: &str) -> bool {
    let normalized = content
        .trim()
        .trim_end_matches(['.', '!', '?'])
        .to_lowercase();
    CANCEL_PHRASES.contains(&normalized.as_str())
}

/// Turn an internal failure into something a chat user can read.
fn humanize_error(error: &str) -> String {
    let lower = error.to_lowercase();
    if lower.contains("timed out") || lower.contains("timeout") {
        "That took too long and was stopped. Try a smaller request, or ask me to run it in the background.".to_string()
    } else if lower.contains("rate limit") {
        "The upstream service is rate limiting right now. Give it a minute and try again.".to_string()
    } else {
        format!("Something went wrong while processing your message: {error}")
    }
}

enum Disposition {
    Done,
    Retry { error: String, delay_ms: u64 },
}

impl<C: Clock> MessagePipeline<C> {
    pub(super) async fn process_batch(&self, chat_id: &ChatId, batch: Vec<QueuedMessage>) {
        let auto_ids: Vec<u64> = batch.iter().map(|m| m.auto_id).collect();
        let Some(trigger) = batch.last().cloned() else {
            return;
        };
        let store = &self.inner.deps.store;
        let config = &self.inner.deps.config;

        let Some(group) = store.group_by_chat(chat_id) else {
            // Unregistered mid-flight; absorb the rows.
            let _ = store.complete_queued_messages(auto_ids);
            return;
        };

        // -- cancellation phrases --
        if is_cancel_phrase(&trigger.content) {
            let had_run = self.cancel_active_run(chat_id);
            let _ = store.complete_queued_messages(auto_ids);
            self.advance_cursor_to(chat_id, &trigger);
            let ack = if had_run {
                "Canceled the current request."
            } else {
                "Nothing is running right now."
            };
            self.send_best_effort(chat_id, ack, &trigger).await;
            return;
        }

        // -- admin command surface --
        let handler = self.inner.command_handler.lock().clone();
        if let Some(handler) = handler {
            if let Some(reply) = handler.try_handle(&group, &trigger).await {
                let _ = store.complete_queued_messages(auto_ids);
                self.advance_cursor_to(chat_id, &trigger);
                self.send_best_effort(chat_id, &reply, &trigger).await;
                return;
            }
        }

        // -- local rate limit: every observed message counts --
        let now = self.clock_now();
        let mut allowed: Vec<QueuedMessage> = Vec::new();
        let mut denied_ids: Vec<u64> = Vec::new();
        for row in &batch {
            let decision = self
                .inner
                .rate
                .check(&chat_id.rate_key(&row.sender_id), now);
            if decision.allowed {
                allowed.push(row.clone());
            } else {
                denied_ids.push(row.auto_id);
            }
        }
        if !denied_ids.is_empty() {
            let wait_secs = config.rate_limit_window_ms / 1_000;
            let _ = store.fail_queued_messages(denied_ids, "rate limited".into());
            self.send_best_effort(
                chat_id,
                &format!(
                    "You're sending messages too quickly. Please wait {wait_secs} seconds and try again."
                ),
                &trigger,
            )
            .await;
            if allowed.is_empty() {
                self.advance_cursor_to(chat_id, &trigger);
                return;
            }
        }
        let batch = allowed;
        let auto_ids: Vec<u64> = batch.iter().map(|m| m.auto_id).collect();
        let Some(trigger) = batch.last().cloned() else {
            return;
        };

        // -- hooks: a blocking message:received hook may cancel processing --
        let canceled = self
            .inner
            .deps
            .hooks
            .emit(
                HookEvent::MessageReceived,
                &serde_json::json!({
                    "chat_id": chat_id.as_str(),
                    "group": group.folder.as_str(),
                    "sender_id": trigger.sender_id,
                    "content": trigger.content,
                }),
            )
            .await;
        if canceled {
            info!(chat_id = %chat_id, "processing canceled by hook");
            let _ = store.complete_queued_messages(auto_ids);
            self.advance_cursor_to(chat_id, &trigger);
            return;
        }

        // -- attachments --
        let fetched = self.fetch_attachments(chat_id, &group, &batch).await;
        if !fetched.failures.is_empty() {
            let listing = format!(
                "Some attachments could not be processed:\n{}",
                fetched.failures.join("\n")
            );
            self.send_best_effort(chat_id, &listing, &trigger).await;
        }

        // -- prompt assembly from the message log since the cursor --
        let cursor = store.cursor(chat_id);
        let history = store.messages_for_run(
            chat_id,
            cursor.as_ref(),
            &trigger.timestamp,
            trigger.message_id.as_str(),
        );
        let prompt = if history.is_empty() {
            batch
                .iter()
                .map(|m| format!("[{}] {}", m.sender_name, m.content))
                .collect::<Vec<_>>()
                .join("\n")
        } else {
            history
                .iter()
                .map(|m| format!("[{}] {}", m.sender_name, m.content))
                .collect::<Vec<_>>()
                .join("\n")
        };

        let last_message = incoming_view(&trigger);
        let routing = route_request(
            &prompt,
            Some(&last_message),
            RouteContext {
                is_scheduled_task: false,
                model_override: group.model_override.as_deref(),
            },
            &self.inner.deps.router,
        );

        self.inner
            .deps
            .hooks
            .emit(
                HookEvent::MessageProcessing,
                &serde_json::json!({
                    "chat_id": chat_id.as_str(),
                    "profile": routing.profile.to_string(),
                }),
            )
            .await;

        // -- pre-run background candidacy: router, classifier, planner --
        let mut routing = routing;
        let pre_run_reason = if routing.should_background && config.auto_spawn.on_router {
            Some("router")
        } else if routing.should_run_classifier && config.auto_spawn.on_classifier {
            match crate::router::classify_long_form(&prompt, &self.inner.deps.router) {
                Some(estimated) => {
                    routing.estimated_minutes = Some(estimated);
                    Some("classifier")
                }
                None => None,
            }
        } else if routing.enable_planner
            && config.auto_spawn.on_planner
            && routing
                .estimated_minutes
                .is_some_and(|est| est > config.planner_background_min_minutes)
        {
            Some("planner")
        } else {
            None
        };
        if let Some(reason) = pre_run_reason {
            self.auto_spawn(chat_id, &group, &prompt, &routing, auto_ids, &trigger, reason)
                .await;
            return;
        }

        match self
            .run_agent(
                chat_id,
                &group,
                &prompt,
                &routing,
                &auto_ids,
                &trigger,
                fetched.local,
            )
            .await
        {
            Disposition::Done => {}
            Disposition::Retry { error, delay_ms } => {
                let attempts = trigger.attempt_count + 1;
                if attempts >= config.max_retries {
                    warn!(chat_id = %chat_id, attempts, error, "batch failed after retries");
                    let _ = store.fail_queued_messages(auto_ids, error.clone());
                    self.advance_cursor_to(chat_id, &trigger);
                    self.send_best_effort(chat_id, &humanize_error(&error), &trigger)
                        .await;
                } else {
                    debug!(chat_id = %chat_id, attempts, delay_ms, error, "requeueing batch");
                    let _ = store.requeue_queued_messages(auto_ids, error);
                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                }
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    async fn run_agent(
        &self,
        chat_id: &ChatId,
        group: &RegisteredGroup,
        prompt: &str,
        routing: &RoutingDecision,
        auto_ids: &[u64],
        trigger: &QueuedMessage,
        attachments: Vec<dotclaw_adapters::LocalAttachment>,
    ) -> Disposition {
        let store = &self.inner.deps.store;
        let config = &self.inner.deps.config;

        self.inner
            .deps
            .hooks
            .emit(
                HookEvent::AgentStart,
                &serde_json::json!({ "chat_id": chat_id.as_str(), "group": group.folder.as_str() }),
            )
            .await;

        let run_id = self.inner.deps.ids.next();
        let token = CancelToken::new();
        self.inner
            .active_runs
            .lock()
            .insert(chat_id.as_str().to_string(), token.clone());

        let mut spec = AgentRunSpec::new(&run_id, group.folder.clone(), prompt);
        spec.chat_id = Some(chat_id.clone());
        spec.session_id = store.session(&group.folder);
        spec.model_override = routing.model_override.clone();
        spec.max_tool_steps = routing.max_tool_steps;
        spec.max_output_tokens = routing.max_output_tokens;
        spec.tool_allow = routing.tool_allow.clone();
        spec.tool_deny = routing.tool_deny.clone();
        spec.enable_memory_recall = routing.enable_memory_recall;
        spec.recall_max_results = routing.recall_max_results;
        spec.recall_max_tokens = routing.recall_max_tokens;
        spec.attachments = attachments;
        spec.timeout_ms = config.auto_spawn_foreground_timeout_ms;
        spec.cancel = token;

        let progress_stop = self.start_progress_updates(chat_id, routing, trigger);
        let result = self.inner.deps.runner.execute(spec).await;
        progress_stop.cancel();
        self.inner.active_runs.lock().remove(chat_id.as_str());

        let now = self.clock_now();
        match result {
            Ok(run) => {
                if let Some(session) = run.output.new_session_id.clone() {
                    let _ = store.set_session(&group.folder, session);
                }
                self.inner.deps.traces.append(&TraceRecord {
                    trace_id: TraceId::new(&run_id),
                    group_folder: group.folder.clone(),
                    chat_id: Some(chat_id.clone()),
                    kind: "message".into(),
                    prompt: prompt.to_string(),
                    result: run.output.result.clone(),
                    error: run.output.error.clone(),
                    tool_calls: run.output.tool_calls,
                    model: run.output.model.clone(),
                    tokens_prompt: run.output.tokens_prompt,
                    tokens_completion: run.output.tokens_completion,
                    latency_ms: Some(run.context.elapsed_ms),
                    session_id: run.output.new_session_id.clone(),
                    created_at: iso_from_ms(now),
                });

                match run.output.status {
                    OutputStatus::Ok => {
                        if run.output.hit_tool_limit(routing.max_tool_steps)
                            && config.auto_spawn.on_tool_limit
                        {
                            self.auto_spawn(
                                chat_id,
                                group,
                                prompt,
                                routing,
                                auto_ids.to_vec(),
                                trigger,
                                "tool_limit",
                            )
                            .await;
                            return Disposition::Done;
                        }
                        let reply = run
                            .output
                            .result
                            .clone()
                            .unwrap_or_else(|| "(no output)".to_string());
                        self.deliver_reply(chat_id, group, &reply, &run_id, auto_ids, trigger)
                            .await
                    }
                    OutputStatus::Error => {
                        let error = run
                            .output
                            .error
                            .clone()
                            .unwrap_or_else(|| "agent error".to_string());
                        let _ = store.complete_queued_messages(auto_ids.to_vec());
                        self.advance_cursor_to(chat_id, trigger);
                        self.send_best_effort(chat_id, &humanize_error(&error), trigger)
                            .await;
                        self.emit_complete(chat_id, false).await;
                        Disposition::Done
                    }
                }
            }
            Err(e) if e.is_timeout() && config.auto_spawn.on_timeout => {
                self.auto_spawn(
                    chat_id,
                    group,
                    prompt,
                    routing,
                    auto_ids.to_vec(),
                    trigger,
                    "timeout",
                )
                .await;
                Disposition::Done
            }
            Err(AgentExecutionError::Canceled) => {
                let _ = store.complete_queued_messages(auto_ids.to_vec());
                self.advance_cursor_to(chat_id, trigger);
                self.emit_complete(chat_id, false).await;
                Disposition::Done
            }
            Err(e) => Disposition::Retry {
                error: e.to_string(),
                delay_ms: full_jitter_ms(exp_backoff_ms(
                    config.retry_base_ms,
                    config.retry_cap_ms,
                    trigger.attempt_count + 1,
                )),
            },
        }
    }

    /// Send the agent's reply. A retryable transport failure requeues the
    /// whole batch so no duplicate reply is ever sent.
    async fn deliver_reply(
        &self,
        chat_id: &ChatId,
        group: &RegisteredGroup,
        reply: &str,
        run_id: &str,
        auto_ids: &[u64],
        trigger: &QueuedMessage,
    ) -> Disposition {
        let store = &self.inner.deps.store;
        let config = &self.inner.deps.config;
        let opts = SendOptions {
            thread_id: trigger.thread_id.clone(),
            ..Default::default()
        };
        match self.inner.deps.registry.send_message(chat_id, reply, &opts).await {
            Ok(receipt) => {
                let now_iso = iso_from_ms(self.clock_now());
                if let Some(sent_id) = receipt.message_id {
                    let _ = store.link_trace(TraceLink {
                        sent_message_id: sent_id.clone(),
                        chat_id: chat_id.clone(),
                        trace_id: TraceId::new(run_id),
                    });
                    let _ = store.log_message(StoredMessage {
                        id: MessageId::new(&sent_id),
                        chat_id: chat_id.clone(),
                        sender_id: "dotclaw".into(),
                        sender_name: "dotclaw".into(),
                        content: reply.to_string(),
                        timestamp: now_iso,
                        is_outbound: true,
                        attachments_json: None,
                    });
                }
                let _ = store.complete_queued_messages(auto_ids.to_vec());
                self.advance_cursor_to(chat_id, trigger);
                self.inner
                    .deps
                    .hooks
                    .emit(
                        HookEvent::MessageResponded,
                        &serde_json::json!({
                            "chat_id": chat_id.as_str(),
                            "group": group.folder.as_str(),
                        }),
                    )
                    .await;
                self.emit_complete(chat_id, true).await;
                Disposition::Done
            }
            Err(e) if e.is_retryable() => {
                let delay_ms = e.retry_after_ms().unwrap_or_else(|| {
                    full_jitter_ms(exp_backoff_ms(
                        config.retry_base_ms,
                        config.retry_cap_ms,
                        trigger.attempt_count + 1,
                    ))
                });
                Disposition::Retry {
                    error: e.to_string(),
                    delay_ms,
                }
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "reply rejected by provider");
                let _ = store.fail_queued_messages(auto_ids.to_vec(), e.to_string());
                self.advance_cursor_to(chat_id, trigger);
                Disposition::Done
            }
        }
    }

    /// Convert the in-flight request into a background job and tell the
    /// user where it landed in the queue.
    #[allow(clippy::too_many_arguments)]
    async fn auto_spawn(
        &self,
        chat_id: &ChatId,
        group: &RegisteredGroup,
        prompt: &str,
        routing: &RoutingDecision,
        auto_ids: Vec<u64>,
        trigger: &QueuedMessage,
        reason: &str,
    ) {
        let store = &self.inner.deps.store;
        let config = &self.inner.deps.config;
        let estimated = routing
            .estimated_minutes
            .unwrap_or(config.default_estimated_minutes);
        let spec = JobSpec {
            group_folder: group.folder.clone(),
            chat_id: Some(chat_id.clone()),
            prompt: prompt.to_string(),
            context_mode: ContextMode::Isolated,
            timeout_ms: None,
            max_tool_steps: routing.max_tool_steps,
            tool_policy_json: None,
            model_override: routing.model_override.clone(),
            priority: 0,
            tags: vec![format!("auto:{reason}")],
            parent_trace_id: None,
            parent_message_id: Some(trigger.message_id.as_str().to_string()),
            estimated_minutes: Some(estimated),
        };
        let spawned = spawn_background_job(
            store,
            self.inner.deps.ids.as_ref(),
            spec,
            self.clock_now(),
        );
        match spawned {
            Ok((job, position)) => {
                info!(chat_id = %chat_id, job_id = %job.id, reason, "auto-spawned background job");
                self.inner
                    .deps
                    .hooks
                    .emit(
                        HookEvent::JobSpawned,
                        &serde_json::json!({
                            "job_id": job.id.as_str(),
                            "reason": reason,
                        }),
                    )
                    .await;
                let text = format!(
                    "Queued this as background job `{}`. I'll report back when it's done. Queue position: {} of {}. Estimated time: {}.",
                    job.id,
                    position.position,
                    position.total,
                    format_eta_minutes(estimated),
                );
                let _ = store.complete_queued_messages(auto_ids);
                self.advance_cursor_to(chat_id, trigger);
                self.send_best_effort(chat_id, &text, trigger).await;
            }
            Err(e) => {
                warn!(chat_id = %chat_id, error = %e, "auto-spawn failed");
                let _ = store.fail_queued_messages(auto_ids, e.to_string());
                self.advance_cursor_to(chat_id, trigger);
                self.send_best_effort(
                    chat_id,
                    "I couldn't queue that as a background job. Please try again.",
                    trigger,
                )
                .await;
            }
        }
    }

    /// Spawn the interim-progress sender for a run. The returned token
    /// stops it the moment the run settles.
    fn start_progress_updates(
        &self,
        chat_id: &ChatId,
        routing: &RoutingDecision,
        trigger: &QueuedMessage,
    ) -> CancelToken {
        let stop = CancelToken::new();
        let plan = routing.progress.clone();
        if !plan.enabled || plan.messages.is_empty() {
            return stop;
        }
        let registry = std::sync::Arc::clone(&self.inner.deps.registry);
        let chat_id = chat_id.clone();
        let opts = SendOptions {
            thread_id: trigger.thread_id.clone(),
            ..Default::default()
        };
        let token = stop.clone();
        tokio::spawn(async move {
            let mut sent = 0u32;
            let mut delay = Duration::from_millis(plan.initial_ms);
            while sent < plan.max_updates {
                tokio::select! {
                    _ = tokio::time::sleep(delay) => {}
                    _ = token.canceled() => return,
                }
                let index = sent as usize % plan.messages.len();
                let _ = registry
                    .send_message(&chat_id, &plan.messages[index], &opts)
                    .await;
                sent += 1;
                delay = Duration::from_millis(plan.interval_ms);
            }
        });
        stop
    }

    async fn emit_complete(&self, chat_id: &ChatId, success: bool) {
        self.inner
            .deps
            .hooks
            .emit(
                HookEvent::AgentComplete,
                &serde_json::json!({ "chat_id": chat_id.as_str(), "success": success }),
            )
            .await;
    }

    fn advance_cursor_to(&self, chat_id: &ChatId, trigger: &QueuedMessage) {
        let cursor = ChatCursor {
            chat_id: chat_id.clone(),
            last_agent_timestamp: trigger.timestamp.clone(),
            last_agent_message_id: trigger.message_id.clone(),
        };
        if let Err(e) = self.inner.deps.store.advance_cursor(cursor) {
            warn!(chat_id = %chat_id, error = %e, "cursor advance failed");
        }
    }

    async fn send_best_effort(&self, chat_id: &ChatId, text: &str, trigger: &QueuedMessage) {
        let opts = SendOptions {
            thread_id: trigger.thread_id.clone(),
            ..Default::default()
        };
        if let Err(e) = self
            .inner
            .deps
            .registry
            .send_message(chat_id, text, &opts)
            .await
        {
            warn!(chat_id = %chat_id, error = %e, "best-effort send failed");
        }
    }
}

/// Rebuild an [`IncomingMessage`] view of a queued row for the router.
fn incoming_view(row: &QueuedMessage) -> IncomingMessage {
    IncomingMessage {
        chat_id: row.chat_id.clone(),
        message_id: row.message_id.as_str().to_string(),
        sender_id: row.sender_id.clone(),
        sender_name: row.sender_name.clone(),
        content: row.content.clone(),
        timestamp: row.timestamp.clone(),
        attachments: Vec::new(),
        is_group: row.is_group,
        chat_type: row.chat_type,
        thread_id: row.thread_id.clone(),
        raw_provider_data: None,
    }
}

#[cfg(test)]
#[path = "process_tests.rs"]
mod tests;
