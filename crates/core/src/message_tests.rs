// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn cursor(ts: &str, id: &str) -> ChatCursor {
    ChatCursor {
        chat_id: ChatId::new("telegram:1"),
        last_agent_timestamp: ts.to_string(),
        last_agent_message_id: MessageId::new(id),
    }
}

#[test]
fn cursor_orders_by_timestamp_then_id() {
    let c = cursor("2026-01-01T00:00:05Z", "m10");
    assert!(c.is_after("2026-01-01T00:00:06Z", "m01"));
    assert!(c.is_after("2026-01-01T00:00:05Z", "m11"));
    assert!(!c.is_after("2026-01-01T00:00:05Z", "m10"));
    assert!(!c.is_after("2026-01-01T00:00:04Z", "m99"));
}

#[test]
fn iso_timestamps_sort_lexicographically() {
    let earlier = "2026-01-31T23:59:59Z";
    let later = "2026-02-01T00:00:00Z";
    assert!(earlier < later);
}

#[test]
fn queued_status_serializes_lowercase() {
    assert_eq!(
        serde_json::to_string(&QueuedStatus::Pending).unwrap(),
        "\"pending\""
    );
    assert_eq!(QueuedStatus::Claimed.to_string(), "claimed");
}
