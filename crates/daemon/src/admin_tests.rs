// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dotclaw_adapters::FakeMemoryStore;
use dotclaw_core::{ChatType, FakeClock, MessageId, QueuedStatus};
use dotclaw_engine::{CommandHandler, HookConfig};
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    store: Store,
    memory: Arc<FakeMemoryStore>,
    admin: AdminCommands<FakeClock>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("store")).unwrap();
    let memory = Arc::new(FakeMemoryStore::default());
    let admin = AdminCommands::new(
        store.clone(),
        memory.clone(),
        Arc::new(HookBus::new(HookConfig::default())),
        dir.path().join("groups"),
        FakeClock::at(1_700_000_000_000),
    );
    Fixture {
        dir,
        store,
        memory,
        admin,
    }
}

fn group(folder: &str, chat: &str) -> RegisteredGroup {
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

fn message(content: &str) -> QueuedMessage {
    QueuedMessage {
        auto_id: 1,
        chat_id: ChatId::new("telegram:1"),
        message_id: MessageId::new("m1"),
        sender_id: "u1".into(),
        sender_name: "Admin".into(),
        content: content.into(),
        timestamp: "2026-01-01T00:00:00Z".into(),
        is_group: false,
        chat_type: ChatType::Private,
        thread_id: None,
        status: QueuedStatus::Claimed,
        attempt_count: 0,
        created_at: "2026-01-01T00:00:00Z".into(),
        claimed_at_ms: None,
    }
}

#[tokio::test]
async fn non_commands_pass_through() {
    let f = fixture();
    let main = group("main", "telegram:1");
    assert!(f.admin.try_handle(&main, &message("hello")).await.is_none());
    assert!(f
        .admin
        .try_handle(&main, &message("/other thing"))
        .await
        .is_none());
}

#[tokio::test]
async fn help_is_available_everywhere() {
    let f = fixture();
    let side = group("research", "telegram:2");
    let reply = f
        .admin
        .try_handle(&side, &message("/dotclaw help"))
        .await
        .unwrap();
    assert!(reply.contains("add-group"));
}

#[tokio::test]
async fn main_only_commands_reject_elsewhere_with_fixed_string() {
    let f = fixture();
    let side = group("research", "telegram:2");
    for cmd in [
        "/dotclaw groups",
        "/dotclaw add-group telegram:9 nine",
        "/dotclaw remove-group telegram:9",
        "/dotclaw set-model research fancy",
        "/dotclaw skill list",
    ] {
        let reply = f.admin.try_handle(&side, &message(cmd)).await.unwrap();
        assert_eq!(reply, MAIN_ONLY_ERROR, "{cmd}");
    }
}

#[tokio::test]
async fn add_group_registers_and_creates_workspace() {
    let f = fixture();
    let main = group("main", "telegram:1");
    let reply = f
        .admin
        .try_handle(&main, &message("/dotclaw add-group telegram:-200 research Team Research"))
        .await
        .unwrap();
    assert!(reply.contains("Registered"), "{reply}");

    let registered = f.store.group_by_chat(&ChatId::new("telegram:-200")).unwrap();
    assert_eq!(registered.folder.as_str(), "research");
    assert_eq!(registered.name, "Team Research");
    assert!(f.dir.path().join("groups/research/inbox").is_dir());
    assert!(f.dir.path().join("groups/research/logs").is_dir());
}

#[tokio::test]
async fn add_group_rejects_bad_folder() {
    let f = fixture();
    let main = group("main", "telegram:1");
    let reply = f
        .admin
        .try_handle(&main, &message("/dotclaw add-group telegram:-200 ../escape"))
        .await
        .unwrap();
    assert!(reply.contains("Invalid folder"), "{reply}");
}

#[tokio::test]
async fn set_model_roundtrip() {
    let f = fixture();
    let main = group("main", "telegram:1");
    f.store.register_group(group("research", "telegram:-200")).unwrap();

    let reply = f
        .admin
        .try_handle(&main, &message("/dotclaw set-model research fancy-model"))
        .await
        .unwrap();
    assert!(reply.contains("set to fancy-model"), "{reply}");
    assert_eq!(
        f.store
            .group_by_folder(&GroupFolder::parse("research").unwrap())
            .unwrap()
            .model_override
            .as_deref(),
        Some("fancy-model")
    );

    f.admin
        .try_handle(&main, &message("/dotclaw set-model research default"))
        .await
        .unwrap();
    assert!(f
        .store
        .group_by_folder(&GroupFolder::parse("research").unwrap())
        .unwrap()
        .model_override
        .is_none());
}

#[tokio::test]
async fn remember_and_memory_search() {
    let f = fixture();
    let side = group("research", "telegram:2");
    let reply = f
        .admin
        .try_handle(&side, &message("/dotclaw remember the deploy key lives in vault"))
        .await
        .unwrap();
    assert_eq!(reply, "Saved.");

    let hits = f
        .admin
        .try_handle(&side, &message("/dotclaw memory deploy key"))
        .await
        .unwrap();
    assert!(hits.contains("vault"), "{hits}");
    let _ = &f.memory;
}

#[tokio::test]
async fn style_file_write_and_readback() {
    let f = fixture();
    let side = group("research", "telegram:2");
    f.admin
        .try_handle(&side, &message("/dotclaw style keep answers short"))
        .await
        .unwrap();
    let shown = f
        .admin
        .try_handle(&side, &message("/dotclaw style"))
        .await
        .unwrap();
    assert!(shown.contains("keep answers short"));
}

#[tokio::test]
async fn skill_install_list_remove() {
    let f = fixture();
    let main = group("main", "telegram:1");
    let source = f.dir.path().join("skill-src");
    std::fs::create_dir_all(&source).unwrap();
    std::fs::write(source.join("SKILL.md"), "do the thing").unwrap();

    let reply = f
        .admin
        .try_handle(
            &main,
            &message(&format!("/dotclaw skill install deploys {}", source.display())),
        )
        .await
        .unwrap();
    assert!(reply.contains("Installed"), "{reply}");
    assert!(f
        .dir
        .path()
        .join("groups/main/skills/deploys/SKILL.md")
        .is_file());

    let listing = f
        .admin
        .try_handle(&main, &message("/dotclaw skill list"))
        .await
        .unwrap();
    assert!(listing.contains("deploys"));

    let removed = f
        .admin
        .try_handle(&main, &message("/dotclaw skill remove deploys"))
        .await
        .unwrap();
    assert!(removed.contains("Removed"), "{removed}");
}

#[tokio::test]
async fn skill_remove_rejects_unsafe_names() {
    let f = fixture();
    let main = group("main", "telegram:1");
    // A file a traversal out of the skills tree would hit
    let outside = f.dir.path().join("groups/main/precious.txt");
    std::fs::create_dir_all(outside.parent().unwrap()).unwrap();
    std::fs::write(&outside, "keep me").unwrap();

    for name in ["../precious.txt", "/etc", "a/b", ".."] {
        let reply = f
            .admin
            .try_handle(&main, &message(&format!("/dotclaw skill remove {name}")))
            .await
            .unwrap();
        assert!(reply.contains("Invalid skill name"), "{name}: {reply}");
    }
    assert!(outside.exists());
}
