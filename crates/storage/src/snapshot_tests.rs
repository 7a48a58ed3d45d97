// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dotclaw_core::{Chat, ChatId, StoreEvent};

#[test]
fn save_and_load_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");

    let mut state = StoreState::default();
    state.apply_event(&StoreEvent::ChatUpserted {
        chat: Chat {
            chat_id: ChatId::new("telegram:1"),
            name: "Chat".into(),
            last_message_time: "2026-01-01T00:00:00Z".into(),
        },
    });

    Snapshot::new(7, state).save(&path).unwrap();
    let loaded = Snapshot::load(&path).unwrap().unwrap();
    assert_eq!(loaded.seq, 7);
    assert_eq!(loaded.state.chats.len(), 1);
}

#[test]
fn missing_snapshot_is_none() {
    let dir = tempfile::tempdir().unwrap();
    assert!(Snapshot::load(&dir.path().join("nope.json"))
        .unwrap()
        .is_none());
}

#[test]
fn corrupt_snapshot_rotates_to_bak() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    std::fs::write(&path, b"{definitely not json").unwrap();

    assert!(Snapshot::load(&path).unwrap().is_none());
    assert!(!path.exists());
    assert!(bak_path(&path).exists());
}

#[test]
fn save_is_atomic_no_tmp_left_behind() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapshot.json");
    Snapshot::new(1, StoreState::default()).save(&path).unwrap();
    assert!(path.exists());
    assert!(!path.with_extension("tmp").exists());
}
