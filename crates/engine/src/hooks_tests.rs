// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dotclaw_core::HookEvent;

fn script(event: HookEvent, command: &str, blocking: bool) -> HookScript {
    HookScript {
        event,
        command: command.to_string(),
        blocking,
        timeout_ms: None,
    }
}

#[tokio::test]
async fn no_scripts_means_no_cancel() {
    let bus = HookBus::new(HookConfig::default());
    let canceled = bus
        .emit(HookEvent::MessageReceived, &serde_json::json!({}))
        .await;
    assert!(!canceled);
}

#[tokio::test]
async fn blocking_hook_can_cancel() {
    let bus = HookBus::new(HookConfig {
        scripts: vec![script(
            HookEvent::MessageReceived,
            r#"echo '{"cancel": true}'"#,
            true,
        )],
        ..HookConfig::default()
    });
    let canceled = bus
        .emit(HookEvent::MessageReceived, &serde_json::json!({"chat": "x"}))
        .await;
    assert!(canceled);
}

#[tokio::test]
async fn blocking_hook_without_cancel_doc_continues() {
    let bus = HookBus::new(HookConfig {
        scripts: vec![script(HookEvent::MessageReceived, "cat > /dev/null", true)],
        ..HookConfig::default()
    });
    let canceled = bus
        .emit(HookEvent::MessageReceived, &serde_json::json!({}))
        .await;
    assert!(!canceled);
}

#[tokio::test]
async fn nonzero_exit_warns_but_does_not_cancel() {
    let bus = HookBus::new(HookConfig {
        scripts: vec![script(HookEvent::AgentComplete, "exit 7", true)],
        ..HookConfig::default()
    });
    let canceled = bus
        .emit(HookEvent::AgentComplete, &serde_json::json!({}))
        .await;
    assert!(!canceled);
}

#[tokio::test]
async fn events_only_trigger_matching_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let marker = dir.path().join("fired");
    let bus = HookBus::new(HookConfig {
        scripts: vec![script(
            HookEvent::JobCompleted,
            &format!("touch {}", marker.display()),
            true,
        )],
        ..HookConfig::default()
    });

    bus.emit(HookEvent::MessageReceived, &serde_json::json!({}))
        .await;
    assert!(!marker.exists());

    bus.emit(HookEvent::JobCompleted, &serde_json::json!({}))
        .await;
    assert!(marker.exists());
}

#[test]
fn missing_config_file_loads_empty() {
    let dir = tempfile::tempdir().unwrap();
    let config = HookConfig::load(&dir.path().join("hooks.json"));
    assert!(config.scripts.is_empty());
}

#[test]
fn config_file_parses_scripts() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hooks.json");
    std::fs::write(
        &path,
        r#"{
            "scripts": [
                {"event": "message:received", "command": "echo hi", "blocking": true},
                {"event": "job:completed", "command": "notify-send done"}
            ],
            "max_concurrent": 2
        }"#,
    )
    .unwrap();
    let config = HookConfig::load(&path);
    assert_eq!(config.scripts.len(), 2);
    assert_eq!(config.max_concurrent, 2);
    assert!(config.scripts[0].blocking);
    assert!(!config.scripts[1].blocking);
}

#[test]
fn malformed_config_is_ignored() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hooks.json");
    std::fs::write(&path, "{ nope").unwrap();
    let config = HookConfig::load(&path);
    assert!(config.scripts.is_empty());
}
