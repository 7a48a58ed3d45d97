// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

pub(crate) fn sample_job(id: &str, priority: i32, created_at: &str) -> BackgroundJob {
    BackgroundJob {
        id: JobId::new(id),
        group_folder: GroupFolder::main(),
        chat_id: Some(ChatId::new("telegram:1")),
        prompt: "index the repo".into(),
        context_mode: ContextMode::Isolated,
        status: JobStatus::Queued,
        created_at: created_at.into(),
        updated_at: created_at.into(),
        started_at_ms: None,
        finished_at_ms: None,
        timeout_ms: None,
        max_tool_steps: None,
        tool_policy_json: None,
        model_override: None,
        priority,
        tags: vec![],
        parent_trace_id: None,
        parent_message_id: None,
        estimated_minutes: None,
        result_summary: None,
        output_path: None,
        output_truncated: false,
        last_error: None,
        lease_expires_at_ms: None,
        attempt_count: 0,
    }
}

#[test]
fn queue_key_orders_priority_desc_then_fifo() {
    let low_old = sample_job("a", 0, "2026-01-01T00:00:00Z");
    let low_new = sample_job("b", 0, "2026-01-01T00:01:00Z");
    let high_new = sample_job("c", 5, "2026-01-01T00:02:00Z");

    let mut jobs = vec![&low_new, &high_new, &low_old];
    jobs.sort_by_key(|j| j.queue_key());
    let order: Vec<&str> = jobs.iter().map(|j| j.id.as_str()).collect();
    assert_eq!(order, vec!["c", "a", "b"]);
}

#[test]
fn terminal_statuses() {
    assert!(!JobStatus::Queued.is_terminal());
    assert!(!JobStatus::Running.is_terminal());
    assert!(JobStatus::Succeeded.is_terminal());
    assert!(JobStatus::Canceled.is_terminal());
    assert!(JobStatus::TimedOut.is_terminal());
}

#[test]
fn outcome_maps_to_status() {
    assert_eq!(JobOutcome::Success.status(), JobStatus::Succeeded);
    assert_eq!(JobOutcome::Timeout.status(), JobStatus::TimedOut);
    assert_eq!(JobOutcome::Canceled.status(), JobStatus::Canceled);
    assert_eq!(JobOutcome::Failure.status(), JobStatus::Failed);
}

#[test]
fn status_serializes_snake_case() {
    assert_eq!(
        serde_json::to_string(&JobStatus::TimedOut).unwrap(),
        "\"timed_out\""
    );
}
