// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::chat::ChatType;
use crate::message::{MessageId, QueuedStatus};

fn queued(auto_id: u64) -> QueuedMessage {
    QueuedMessage {
        auto_id,
        chat_id: ChatId::new("telegram:1"),
        message_id: MessageId::new(format!("m{auto_id}")),
        sender_id: "u1".into(),
        sender_name: "User".into(),
        content: "hello".into(),
        timestamp: "2026-01-01T00:00:00Z".into(),
        is_group: false,
        chat_type: ChatType::Private,
        thread_id: None,
        status: QueuedStatus::Pending,
        attempt_count: 0,
        created_at: "2026-01-01T00:00:00Z".into(),
        claimed_at_ms: None,
    }
}

#[test]
fn tagged_serialization_uses_table_verb() {
    let event = StoreEvent::QueueEnqueued { message: queued(1) };
    let json = serde_json::to_value(&event).unwrap();
    assert_eq!(json["type"], "queue:enqueued");
    assert_eq!(json["message"]["auto_id"], 1);
}

#[test]
fn roundtrip_claim_event() {
    let event = StoreEvent::QueueClaimed {
        chat_id: ChatId::new("telegram:1"),
        auto_ids: vec![1, 2, 3],
        at_ms: 42,
    };
    let json = serde_json::to_string(&event).unwrap();
    let back: StoreEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn roundtrip_task_run_finished() {
    let event = StoreEvent::TaskRunFinished {
        id: crate::task::TaskId::new("task-1"),
        next_run_at_ms: Some(1_000),
        last_run_at_ms: 500,
        result: Some("done".into()),
        error: None,
        retry_count: 0,
        status: TaskStatus::Active,
    };
    let json = serde_json::to_string(&event).unwrap();
    assert!(json.contains("task:run_finished"));
    let back: StoreEvent = serde_json::from_str(&json).unwrap();
    assert_eq!(back, event);
}

#[test]
fn unknown_type_fails_to_parse() {
    let err = serde_json::from_str::<StoreEvent>(r#"{"type":"bogus:event"}"#);
    assert!(err.is_err());
}
