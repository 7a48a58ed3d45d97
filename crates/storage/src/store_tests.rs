// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dotclaw_core::{ChatType, ContextMode, MessageId, ScheduleKind, ScheduledTask};
use tempfile::TempDir;

fn open_store() -> (TempDir, Store) {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("store")).unwrap();
    (dir, store)
}

fn queued(chat: &str, msg: &str, ts: &str) -> QueuedMessage {
    QueuedMessage {
        auto_id: 0,
        chat_id: ChatId::new(chat),
        message_id: MessageId::new(msg),
        sender_id: "u1".into(),
        sender_name: "User".into(),
        content: "hello".into(),
        timestamp: ts.into(),
        is_group: false,
        chat_type: ChatType::Private,
        thread_id: None,
        status: QueuedStatus::Pending,
        attempt_count: 0,
        created_at: ts.into(),
        claimed_at_ms: None,
    }
}

fn interval_task(id: &str, next_run_at_ms: Option<u64>) -> ScheduledTask {
    ScheduledTask {
        id: TaskId::new(id),
        group_folder: GroupFolder::main(),
        chat_id: ChatId::new("telegram:1"),
        prompt: "do the rounds".into(),
        schedule_kind: ScheduleKind::Interval,
        schedule_value: "30000".into(),
        timezone: "UTC".into(),
        context_mode: ContextMode::Isolated,
        next_run_at_ms,
        last_run_at_ms: None,
        last_result: None,
        state_json: None,
        retry_count: 0,
        last_error: None,
        running_since_ms: None,
        status: TaskStatus::Active,
        created_at: "2026-01-01T00:00:00Z".into(),
    }
}

fn spec(group: &str) -> JobSpec {
    JobSpec {
        group_folder: GroupFolder::parse(group).unwrap(),
        chat_id: Some(ChatId::new("telegram:1")),
        prompt: "long work".into(),
        context_mode: ContextMode::Isolated,
        timeout_ms: None,
        max_tool_steps: None,
        tool_policy_json: None,
        model_override: None,
        priority: 0,
        tags: vec![],
        parent_trace_id: None,
        parent_message_id: None,
        estimated_minutes: None,
    }
}

fn group(chat: &str, folder: &str) -> RegisteredGroup {
    RegisteredGroup {
        chat_id: ChatId::new(chat),
        name: folder.to_string(),
        folder: GroupFolder::parse(folder).unwrap(),
        trigger: None,
        added_at: "2026-01-01T00:00:00Z".into(),
        container_config: None,
        model_override: None,
    }
}

// ---- queue ----

#[test]
fn enqueue_assigns_monotonic_ids_and_dedupes() {
    let (_dir, store) = open_store();
    let a = store
        .enqueue_message(queued("telegram:1", "m1", "2026-01-01T00:00:00Z"))
        .unwrap();
    let dup = store
        .enqueue_message(queued("telegram:1", "m1", "2026-01-01T00:00:00Z"))
        .unwrap();
    let b = store
        .enqueue_message(queued("telegram:1", "m2", "2026-01-01T00:00:01Z"))
        .unwrap();

    assert_eq!(a, Some(1));
    assert_eq!(dup, None);
    assert_eq!(b, Some(2));
}

#[test]
fn batch_claim_respects_window_and_boundary() {
    let (_dir, store) = open_store();
    // window is 5s; deltas 0s, 5s (boundary, inside), 6s (outside)
    store
        .enqueue_message(queued("telegram:1", "m1", "2026-01-01T00:00:00Z"))
        .unwrap();
    store
        .enqueue_message(queued("telegram:1", "m2", "2026-01-01T00:00:05Z"))
        .unwrap();
    store
        .enqueue_message(queued("telegram:1", "m3", "2026-01-01T00:00:06Z"))
        .unwrap();

    let batch = store
        .claim_batch_for_chat(&ChatId::new("telegram:1"), 1_000, 5_000, 10)
        .unwrap();
    let ids: Vec<&str> = batch.iter().map(|m| m.message_id.as_str()).collect();
    assert_eq!(ids, vec!["m1", "m2"]);

    // second claim picks up the remainder
    let rest = store
        .claim_batch_for_chat(&ChatId::new("telegram:1"), 2_000, 5_000, 10)
        .unwrap();
    assert_eq!(rest.len(), 1);
    assert_eq!(rest[0].message_id, "m3");

    // nothing left
    let empty = store
        .claim_batch_for_chat(&ChatId::new("telegram:1"), 3_000, 5_000, 10)
        .unwrap();
    assert!(empty.is_empty());
}

#[test]
fn claim_caps_batch_size() {
    let (_dir, store) = open_store();
    for n in 0..5 {
        store
            .enqueue_message(queued(
                "telegram:1",
                &format!("m{n}"),
                "2026-01-01T00:00:00Z",
            ))
            .unwrap();
    }
    let batch = store
        .claim_batch_for_chat(&ChatId::new("telegram:1"), 0, 60_000, 3)
        .unwrap();
    assert_eq!(batch.len(), 3);
}

#[test]
fn completed_rows_are_not_reclaimable() {
    let (_dir, store) = open_store();
    store
        .enqueue_message(queued("telegram:1", "m1", "2026-01-01T00:00:00Z"))
        .unwrap();
    let batch = store
        .claim_batch_for_chat(&ChatId::new("telegram:1"), 0, 1_000, 10)
        .unwrap();
    store
        .complete_queued_messages(batch.iter().map(|m| m.auto_id).collect())
        .unwrap();

    let again = store
        .claim_batch_for_chat(&ChatId::new("telegram:1"), 0, 1_000, 10)
        .unwrap();
    assert!(again.is_empty());
}

#[test]
fn stalled_claims_reset_to_pending() {
    let (_dir, store) = open_store();
    store
        .enqueue_message(queued("telegram:1", "m1", "2026-01-01T00:00:00Z"))
        .unwrap();
    store
        .claim_batch_for_chat(&ChatId::new("telegram:1"), 1_000, 1_000, 10)
        .unwrap();

    // Not yet past the threshold
    assert_eq!(store.reset_stalled_messages(2_000, 5_000).unwrap(), 0);
    // Past it
    assert_eq!(store.reset_stalled_messages(7_000, 5_000).unwrap(), 1);
    assert_eq!(store.pending_count(&ChatId::new("telegram:1")), 1);
}

#[test]
fn chats_with_pending_lists_each_chat_once() {
    let (_dir, store) = open_store();
    store
        .enqueue_message(queued("telegram:1", "m1", "2026-01-01T00:00:00Z"))
        .unwrap();
    store
        .enqueue_message(queued("telegram:1", "m2", "2026-01-01T00:00:01Z"))
        .unwrap();
    store
        .enqueue_message(queued("discord:7", "m1", "2026-01-01T00:00:00Z"))
        .unwrap();

    let chats = store.chats_with_pending();
    assert_eq!(chats.len(), 2);
}

// ---- recovery ----

#[test]
fn state_survives_reopen_via_wal_replay() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store");
    {
        let store = Store::open(&path).unwrap();
        store
            .enqueue_message(queued("telegram:1", "m1", "2026-01-01T00:00:00Z"))
            .unwrap();
        store
            .claim_batch_for_chat(&ChatId::new("telegram:1"), 0, 1_000, 10)
            .unwrap();
        store.flush().unwrap();
    }
    let store = Store::open(&path).unwrap();
    // The claim survived the restart; startup recovery resets it.
    assert_eq!(store.pending_count(&ChatId::new("telegram:1")), 0);
    assert_eq!(store.reset_stalled_messages(u64::MAX, 0).unwrap(), 1);
    assert_eq!(store.pending_count(&ChatId::new("telegram:1")), 1);
}

#[test]
fn checkpoint_then_reopen_does_not_duplicate_state() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("store");
    {
        let store = Store::open(&path).unwrap();
        store
            .enqueue_message(queued("telegram:1", "m1", "2026-01-01T00:00:00Z"))
            .unwrap();
        store.checkpoint().unwrap();
        store
            .enqueue_message(queued("telegram:1", "m2", "2026-01-01T00:00:01Z"))
            .unwrap();
        store.flush().unwrap();
    }
    let store = Store::open(&path).unwrap();
    assert_eq!(store.pending_count(&ChatId::new("telegram:1")), 2);
    // New writes after recovery still work
    assert_eq!(
        store
            .enqueue_message(queued("telegram:1", "m3", "2026-01-01T00:00:02Z"))
            .unwrap(),
        Some(3)
    );
}

// ---- groups ----

#[test]
fn register_unregister_register_roundtrip() {
    let (_dir, store) = open_store();
    store.register_group(group("telegram:-100", "research")).unwrap();
    store.unregister_group(&ChatId::new("telegram:-100")).unwrap();
    store.register_group(group("telegram:-100", "research")).unwrap();
    assert_eq!(store.list_groups().len(), 1);
}

#[test]
fn folder_uniqueness_enforced() {
    let (_dir, store) = open_store();
    store.register_group(group("telegram:-100", "research")).unwrap();
    let err = store
        .register_group(group("telegram:-200", "research"))
        .unwrap_err();
    assert!(matches!(err, StoreError::FolderInUse(_)));
}

#[test]
fn main_group_cannot_be_removed() {
    let (_dir, store) = open_store();
    store.register_group(group("telegram:-1", "main")).unwrap();
    let err = store.unregister_group(&ChatId::new("telegram:-1")).unwrap_err();
    assert!(matches!(err, StoreError::MainGroupProtected));
}

// ---- tasks ----

#[test]
fn claim_due_tasks_takes_each_task_once() {
    let (_dir, store) = open_store();
    store.create_task(interval_task("task-1", Some(100))).unwrap();
    store.create_task(interval_task("task-2", Some(200))).unwrap();
    store.create_task(interval_task("task-3", Some(9_999))).unwrap();

    let first = store.claim_due_tasks(500).unwrap();
    assert_eq!(first.len(), 2);
    // Already claimed → a second tick claims nothing
    let second = store.claim_due_tasks(600).unwrap();
    assert!(second.is_empty());
}

#[test]
fn claim_task_rejects_concurrent_run() {
    let (_dir, store) = open_store();
    store.create_task(interval_task("task-1", Some(100))).unwrap();
    store.claim_task(&TaskId::new("task-1"), 500).unwrap();
    let err = store.claim_task(&TaskId::new("task-1"), 600).unwrap_err();
    assert!(matches!(err, StoreError::TaskRunning(_)));
}

#[test]
fn update_after_run_clears_claim_and_advances() {
    let (_dir, store) = open_store();
    store.create_task(interval_task("task-1", Some(100))).unwrap();
    store.claim_due_tasks(500).unwrap();
    store
        .update_task_after_run(
            &TaskId::new("task-1"),
            Some(30_500),
            Some("ok".into()),
            None,
            0,
            TaskStatus::Active,
            500,
        )
        .unwrap();
    let task = store.task(&TaskId::new("task-1")).unwrap();
    assert_eq!(task.running_since_ms, None);
    assert_eq!(task.next_run_at_ms, Some(30_500));
    // Due again at the new time
    assert_eq!(store.claim_due_tasks(31_000).unwrap().len(), 1);
}

// ---- jobs ----

#[test]
fn job_claim_orders_priority_then_fifo() {
    let (_dir, store) = open_store();
    store
        .spawn_background_job(JobId::new("job-a"), spec("main"), 1_000)
        .unwrap();
    store
        .spawn_background_job(JobId::new("job-b"), spec("main"), 2_000)
        .unwrap();
    let mut urgent = spec("main");
    urgent.priority = 5;
    store
        .spawn_background_job(JobId::new("job-c"), urgent, 3_000)
        .unwrap();

    let order: Vec<String> = std::iter::from_fn(|| {
        store
            .claim_background_job(10_000, 60_000)
            .unwrap()
            .map(|j| j.id.as_str().to_string())
    })
    .collect();
    assert_eq!(order, vec!["job-c", "job-a", "job-b"]);
}

#[test]
fn spawn_reports_queue_position() {
    let (_dir, store) = open_store();
    let (_, pos) = store
        .spawn_background_job(JobId::new("job-a"), spec("main"), 1_000)
        .unwrap();
    assert_eq!(pos, QueuePosition { position: 1, total: 1 });
    let (_, pos) = store
        .spawn_background_job(JobId::new("job-b"), spec("main"), 2_000)
        .unwrap();
    assert_eq!(pos, QueuePosition { position: 2, total: 2 });
}

#[test]
fn expired_lease_is_recovered() {
    let (_dir, store) = open_store();
    store
        .spawn_background_job(JobId::new("job-a"), spec("main"), 1_000)
        .unwrap();
    let job = store.claim_background_job(1_000, 60_000).unwrap().unwrap();
    assert_eq!(job.lease_expires_at_ms, Some(61_000));

    // Lease still valid → nothing to reset
    assert_eq!(store.reset_stalled_background_jobs(30_000).unwrap(), 0);
    // Renewal pushes expiry out
    store
        .renew_background_job_lease(&job.id, 50_000, 60_000)
        .unwrap();
    assert_eq!(store.reset_stalled_background_jobs(100_000).unwrap(), 0);
    // Expired → back to queued, attempt preserved
    assert_eq!(store.reset_stalled_background_jobs(200_000).unwrap(), 1);
    let recovered = store.claim_background_job(200_000, 60_000).unwrap().unwrap();
    assert_eq!(recovered.id, "job-a");
    assert_eq!(recovered.attempt_count, 2);
}

#[test]
fn cancel_queued_job_before_claim() {
    let (_dir, store) = open_store();
    store
        .spawn_background_job(JobId::new("job-a"), spec("main"), 1_000)
        .unwrap();
    assert!(store.cancel_queued_job(&JobId::new("job-a"), 2_000).unwrap());
    assert_eq!(
        store.background_job(&JobId::new("job-a")).unwrap().status,
        JobStatus::Canceled
    );
    // Canceling again is a no-op (already terminal)
    assert!(!store.cancel_queued_job(&JobId::new("job-a"), 3_000).unwrap());
    assert!(store.claim_background_job(3_000, 60_000).unwrap().is_none());
}

#[test]
fn job_events_append_and_filter() {
    let (_dir, store) = open_store();
    store
        .spawn_background_job(JobId::new("job-a"), spec("main"), 1_000)
        .unwrap();
    store
        .append_job_event(BackgroundJobEvent {
            job_id: JobId::new("job-a"),
            created_at: iso_from_ms(2_000),
            level: dotclaw_core::JobEventLevel::Progress,
            message: "halfway".into(),
            data_json: None,
        })
        .unwrap();
    store
        .append_job_event(BackgroundJobEvent {
            job_id: JobId::new("job-b"),
            created_at: iso_from_ms(2_000),
            level: dotclaw_core::JobEventLevel::Info,
            message: "other".into(),
            data_json: None,
        })
        .unwrap();

    let events = store.job_events(&JobId::new("job-a"));
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].message, "halfway");
}

// ---- messages & cursors ----

#[test]
fn messages_for_run_respects_cursor_and_bound() {
    let (_dir, store) = open_store();
    let chat = ChatId::new("telegram:1");
    for (id, ts) in [
        ("m1", "2026-01-01T00:00:01Z"),
        ("m2", "2026-01-01T00:00:02Z"),
        ("m3", "2026-01-01T00:00:03Z"),
        ("m4", "2026-01-01T00:00:04Z"),
    ] {
        store
            .log_message(StoredMessage {
                id: MessageId::new(id),
                chat_id: chat.clone(),
                sender_id: "u1".into(),
                sender_name: "User".into(),
                content: format!("msg {id}"),
                timestamp: ts.into(),
                is_outbound: false,
                attachments_json: None,
            })
            .unwrap();
    }
    let cursor = ChatCursor {
        chat_id: chat.clone(),
        last_agent_timestamp: "2026-01-01T00:00:01Z".into(),
        last_agent_message_id: MessageId::new("m1"),
    };
    store.advance_cursor(cursor.clone()).unwrap();

    let rows = store.messages_for_run(&chat, Some(&cursor), "2026-01-01T00:00:03Z", "m3");
    let ids: Vec<&str> = rows.iter().map(|m| m.id.as_str()).collect();
    assert_eq!(ids, vec!["m2", "m3"]);
}

#[test]
fn trace_links_resolve_by_chat_and_message() {
    let (_dir, store) = open_store();
    store
        .link_trace(TraceLink {
            sent_message_id: "out-1".into(),
            chat_id: ChatId::new("telegram:1"),
            trace_id: dotclaw_core::TraceId::new("trace-1"),
        })
        .unwrap();

    let link = store
        .trace_for_message(&ChatId::new("telegram:1"), "out-1")
        .unwrap();
    assert_eq!(link.trace_id, "trace-1");
    assert!(store
        .trace_for_message(&ChatId::new("telegram:2"), "out-1")
        .is_none());
}
