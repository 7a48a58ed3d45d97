// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

fn envelope(kind: &str, payload: serde_json::Value) -> IpcEnvelope {
    IpcEnvelope {
        id: "req-1".into(),
        kind: kind.into(),
        payload,
    }
}

#[test]
fn parses_envelope_with_trailing_newline() {
    let env =
        IpcEnvelope::parse("{\"id\":\"r1\",\"type\":\"list_groups\",\"payload\":{}}\n").unwrap();
    assert_eq!(env.id, "r1");
    assert_eq!(env.kind, "list_groups");
}

#[test]
fn unknown_request_type_is_reported() {
    let env = envelope("drop_tables", serde_json::json!({}));
    match IpcRequest::from_envelope(&env) {
        Err(IpcParseError::UnknownType(t)) => assert_eq!(t, "drop_tables"),
        other => panic!("expected UnknownType, got {other:?}"),
    }
}

#[test]
fn spawn_job_payload_decodes() {
    let env = envelope(
        "spawn_job",
        serde_json::json!({
            "group_folder": "research",
            "chat_id": "telegram:1",
            "prompt": "index everything",
            "priority": 2,
            "tags": ["indexing"],
        }),
    );
    match IpcRequest::from_envelope(&env).unwrap() {
        IpcRequest::SpawnJob(spec) => {
            assert_eq!(spec.group_folder.as_str(), "research");
            assert_eq!(spec.priority, 2);
            assert_eq!(spec.context_mode, crate::task::ContextMode::Isolated);
        }
        other => panic!("expected SpawnJob, got {other:?}"),
    }
}

#[test]
fn bad_payload_names_the_kind() {
    let env = envelope("run_task", serde_json::json!({"nope": true}));
    match IpcRequest::from_envelope(&env) {
        Err(IpcParseError::BadPayload { kind, .. }) => assert_eq!(kind, "run_task"),
        other => panic!("expected BadPayload, got {other:?}"),
    }
}

#[test]
fn register_group_task_op_decodes() {
    let env = envelope(
        "register_group",
        serde_json::json!({
            "chat_id": "telegram:-100",
            "name": "Research",
            "folder": "research",
        }),
    );
    match IpcTaskOp::from_envelope(&env).unwrap() {
        IpcTaskOp::RegisterGroup(p) => {
            assert_eq!(p.folder.as_str(), "research");
            assert!(p.trigger.is_none());
        }
        other => panic!("expected RegisterGroup, got {other:?}"),
    }
}

#[test]
fn register_group_rejects_traversal_folder() {
    let env = envelope(
        "register_group",
        serde_json::json!({
            "chat_id": "telegram:-100",
            "name": "Evil",
            "folder": "../../etc",
        }),
    );
    assert!(IpcTaskOp::from_envelope(&env).is_err());
}

#[test]
fn send_message_op_decodes() {
    let env = envelope("send_message", serde_json::json!({"text": "hello"}));
    match IpcMessageOp::from_envelope(&env).unwrap() {
        IpcMessageOp::SendMessage { chat_id, text, .. } => {
            assert!(chat_id.is_none());
            assert_eq!(text, "hello");
        }
        other => panic!("expected SendMessage, got {other:?}"),
    }
}

#[test]
fn response_constructors() {
    let ok = IpcResponse::ok("r1", serde_json::json!({"n": 1}));
    assert!(ok.ok);
    assert!(ok.error.is_none());
    let err = IpcResponse::err("r1", "denied");
    assert!(!err.ok);
    assert_eq!(err.error.as_deref(), Some("denied"));
}
