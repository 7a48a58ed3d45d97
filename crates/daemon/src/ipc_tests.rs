// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dotclaw_adapters::{CancelToken, FakeAgentRunner, FakeMemoryStore, FakeProvider};
use dotclaw_core::{FakeClock, JobStatus, SeqIdGen};
use dotclaw_engine::{EngineConfig, HookBus, HookConfig, RouterConfig};
use dotclaw_storage::TraceWriter;
use tempfile::TempDir;

struct Fixture {
    dir: TempDir,
    store: Store,
    provider: Arc<FakeProvider>,
    bus: IpcBus<FakeClock>,
}

fn fixture() -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("store")).unwrap();
    let runner = FakeAgentRunner::new();
    let provider = Arc::new(FakeProvider::new("telegram"));
    let registry = Arc::new(ProviderRegistry::new());
    registry.register(provider.clone());
    let clock = FakeClock::at(1_700_000_000_000);
    let hooks = Arc::new(HookBus::new(HookConfig::default()));
    let traces = TraceWriter::new(dir.path().join("traces"));
    let mut config = EngineConfig::default();
    config.notify_base_ms = 1;
    config.notify_cap_ms = 2;
    let ids: Arc<dyn IdGen> = Arc::new(SeqIdGen::new("aaaaaaaaaa"));
    let shutdown = CancelToken::new();
    let jobs = JobWorkers::new(
        store.clone(),
        Arc::new(runner.clone()),
        Arc::clone(&registry),
        Arc::clone(&hooks),
        config.clone(),
        clock.clone(),
        traces.clone(),
        shutdown.clone(),
    );
    let scheduler = TaskEngine::new(
        store.clone(),
        Arc::new(runner.clone()),
        Arc::clone(&registry),
        Arc::clone(&hooks),
        RouterConfig::default(),
        config,
        clock.clone(),
        Arc::clone(&ids),
        traces,
        shutdown.clone(),
    );
    let bus = IpcBus::new(
        IpcDeps {
            store: store.clone(),
            jobs,
            scheduler,
            registry,
            memory: Arc::new(FakeMemoryStore::default()),
            clock,
            ids,
        },
        dir.path().join("ipc"),
        1_000,
        shutdown,
    );

    let f = Fixture {
        dir,
        store,
        provider,
        bus,
    };
    register(&f, "main", "telegram:1");
    register(&f, "research", "telegram:2");
    f
}

fn register(f: &Fixture, folder: &str, chat: &str) {
    f.store
        .register_group(RegisteredGroup {
            chat_id: ChatId::new(chat),
            name: folder.to_string(),
            folder: GroupFolder::parse(folder).unwrap(),
            trigger: None,
            added_at: "2026-01-01T00:00:00Z".into(),
            container_config: None,
            model_override: None,
        })
        .unwrap();
}

fn drop_file(f: &Fixture, group: &str, sub: &str, name: &str, body: serde_json::Value) -> PathBuf {
    let dir = f.dir.path().join("ipc").join(group).join(sub);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(name);
    std::fs::write(&path, format!("{body}\n")).unwrap();
    path
}

fn read_response(f: &Fixture, group: &str, id: &str) -> IpcResponse {
    let path = f
        .dir
        .path()
        .join("ipc")
        .join(group)
        .join("responses")
        .join(format!("{id}.json"));
    serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap()
}

#[tokio::test]
async fn non_main_register_group_is_blocked_and_file_deleted() {
    let f = fixture();
    let path = drop_file(
        &f,
        "research",
        "tasks",
        "001.json",
        serde_json::json!({
            "type": "register_group",
            "payload": {"chat_id": "telegram:66", "name": "Sneaky", "folder": "sneaky"},
        }),
    );

    f.bus.scan().await;

    assert!(!path.exists());
    assert!(f.store.group_by_chat(&ChatId::new("telegram:66")).is_none());
    // Not quarantined either — it was processed (and blocked), not malformed
    let errors: Vec<_> = std::fs::read_dir(f.dir.path().join("ipc/errors"))
        .map(|d| d.filter_map(|e| e.ok()).collect())
        .unwrap_or_default();
    assert!(errors.is_empty());
}

#[tokio::test]
async fn main_register_group_succeeds() {
    let f = fixture();
    drop_file(
        &f,
        "main",
        "tasks",
        "001.json",
        serde_json::json!({
            "type": "register_group",
            "payload": {"chat_id": "telegram:77", "name": "New", "folder": "new-group"},
        }),
    );

    f.bus.scan().await;

    let group = f.store.group_by_chat(&ChatId::new("telegram:77")).unwrap();
    assert_eq!(group.folder.as_str(), "new-group");
}

#[tokio::test]
async fn send_message_defaults_to_own_chat() {
    let f = fixture();
    drop_file(
        &f,
        "research",
        "messages",
        "001.json",
        serde_json::json!({"type": "send_message", "payload": {"text": "hi from the container"}}),
    );

    f.bus.scan().await;

    let sent = f.provider.last_sent().unwrap();
    assert_eq!(sent.chat_id.as_str(), "telegram:2");
    assert_eq!(sent.text, "hi from the container");
}

#[tokio::test]
async fn send_message_to_foreign_chat_is_blocked_for_non_main() {
    let f = fixture();
    drop_file(
        &f,
        "research",
        "messages",
        "001.json",
        serde_json::json!({
            "type": "send_message",
            "payload": {"chat_id": "telegram:1", "text": "impersonation"},
        }),
    );

    f.bus.scan().await;
    assert!(f.provider.sent().is_empty());

    // The main group may target any chat
    drop_file(
        &f,
        "main",
        "messages",
        "001.json",
        serde_json::json!({
            "type": "send_message",
            "payload": {"chat_id": "telegram:2", "text": "announcement"},
        }),
    );
    f.bus.scan().await;
    assert_eq!(f.provider.last_sent().unwrap().chat_id.as_str(), "telegram:2");
}

#[tokio::test]
async fn malformed_file_is_quarantined() {
    let f = fixture();
    let dir = f.dir.path().join("ipc/research/tasks");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(dir.join("bad.json"), "{ not json").unwrap();

    f.bus.scan().await;

    assert!(!dir.join("bad.json").exists());
    let errors: Vec<String> = std::fs::read_dir(f.dir.path().join("ipc/errors"))
        .unwrap()
        .filter_map(|e| e.ok())
        .map(|e| e.file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(errors, vec!["research-bad.json".to_string()]);
}

#[tokio::test]
async fn unknown_type_is_quarantined() {
    let f = fixture();
    drop_file(
        &f,
        "research",
        "tasks",
        "weird.json",
        serde_json::json!({"type": "reboot_host", "payload": {}}),
    );

    f.bus.scan().await;

    let errors = std::fs::read_dir(f.dir.path().join("ipc/errors"))
        .unwrap()
        .count();
    assert_eq!(errors, 1);
}

#[tokio::test]
async fn schedule_task_creates_an_active_task() {
    let f = fixture();
    drop_file(
        &f,
        "research",
        "tasks",
        "001.json",
        serde_json::json!({
            "type": "schedule_task",
            "payload": {
                "prompt": "summarize the channel",
                "schedule_kind": "interval",
                "schedule_value": "5m",
            },
        }),
    );

    f.bus.scan().await;

    let tasks = f
        .store
        .list_tasks(Some(&GroupFolder::parse("research").unwrap()));
    assert_eq!(tasks.len(), 1);
    assert_eq!(tasks[0].status, dotclaw_core::TaskStatus::Active);
    assert_eq!(
        tasks[0].next_run_at_ms,
        Some(1_700_000_000_000 + 300_000)
    );
    assert_eq!(tasks[0].chat_id.as_str(), "telegram:2");
}

#[tokio::test]
async fn foreign_task_op_is_dropped_without_quarantine() {
    let f = fixture();
    f.store
        .create_task(ScheduledTask {
            id: TaskId::new("task-m"),
            group_folder: GroupFolder::main(),
            chat_id: ChatId::new("telegram:1"),
            prompt: "main's own task".into(),
            schedule_kind: dotclaw_core::ScheduleKind::Interval,
            schedule_value: "30000".into(),
            timezone: "UTC".into(),
            context_mode: ContextMode::Isolated,
            next_run_at_ms: Some(9_999_999),
            last_run_at_ms: None,
            last_result: None,
            state_json: None,
            retry_count: 0,
            last_error: None,
            running_since_ms: None,
            status: TaskStatus::Active,
            created_at: "2026-01-01T00:00:00Z".into(),
        })
        .unwrap();

    let path = drop_file(
        &f,
        "research",
        "tasks",
        "001.json",
        serde_json::json!({"type": "pause_task", "payload": {"task_id": "task-m"}}),
    );

    f.bus.scan().await;

    // Blocked attempt: file consumed, nothing quarantined, task untouched.
    assert!(!path.exists());
    let errors = std::fs::read_dir(f.dir.path().join("ipc/errors"))
        .map(|d| d.count())
        .unwrap_or(0);
    assert_eq!(errors, 0);
    let task = f.store.task(&TaskId::new("task-m")).unwrap();
    assert_eq!(task.status, TaskStatus::Active);

    // The owner may pause it.
    drop_file(
        &f,
        "main",
        "tasks",
        "001.json",
        serde_json::json!({"type": "pause_task", "payload": {"task_id": "task-m"}}),
    );
    f.bus.scan().await;
    assert_eq!(
        f.store.task(&TaskId::new("task-m")).unwrap().status,
        TaskStatus::Paused
    );
}

#[tokio::test]
async fn spawn_job_request_writes_response() {
    let f = fixture();
    drop_file(
        &f,
        "research",
        "requests",
        "001.json",
        serde_json::json!({
            "id": "req-1",
            "type": "spawn_job",
            "payload": {"group_folder": "research", "prompt": "index the docs"},
        }),
    );

    f.bus.scan().await;

    let response = read_response(&f, "research", "req-1");
    assert!(response.ok);
    let job_id = response.result.unwrap()["job_id"].as_str().unwrap().to_string();
    assert!(job_id.starts_with("job-"));
    let job = f
        .store
        .background_job(&dotclaw_core::JobId::new(&job_id))
        .unwrap();
    assert_eq!(job.status, JobStatus::Queued);
    assert_eq!(job.chat_id.as_ref().unwrap().as_str(), "telegram:2");
}

#[tokio::test]
async fn spawn_job_for_other_group_requires_main() {
    let f = fixture();
    drop_file(
        &f,
        "research",
        "requests",
        "001.json",
        serde_json::json!({
            "id": "req-1",
            "type": "spawn_job",
            "payload": {"group_folder": "main", "prompt": "cross-group work"},
        }),
    );

    f.bus.scan().await;

    let response = read_response(&f, "research", "req-1");
    assert!(!response.ok);
    assert_eq!(response.error.as_deref(), Some("not authorized"));

    drop_file(
        &f,
        "main",
        "requests",
        "001.json",
        serde_json::json!({
            "id": "req-2",
            "type": "spawn_job",
            "payload": {"group_folder": "research", "prompt": "cross-group work"},
        }),
    );
    f.bus.scan().await;
    assert!(read_response(&f, "main", "req-2").ok);
}

#[tokio::test]
async fn memory_roundtrip_through_requests() {
    let f = fixture();
    drop_file(
        &f,
        "research",
        "requests",
        "001.json",
        serde_json::json!({
            "id": "req-1",
            "type": "memory_upsert",
            "payload": {"content": "the build is green on fridays"},
        }),
    );
    f.bus.scan().await;
    assert!(read_response(&f, "research", "req-1").ok);

    drop_file(
        &f,
        "research",
        "requests",
        "002.json",
        serde_json::json!({
            "id": "req-2",
            "type": "memory_search",
            "payload": {"query": "build"},
        }),
    );
    f.bus.scan().await;
    let response = read_response(&f, "research", "req-2");
    assert!(response.ok);
    let hits = response.result.unwrap()["hits"].as_array().unwrap().len();
    assert_eq!(hits, 1);
}

#[tokio::test]
async fn list_jobs_is_scoped_for_non_main() {
    let f = fixture();
    for (group, id) in [("main", "job-m"), ("research", "job-r")] {
        f.store
            .spawn_background_job(
                dotclaw_core::JobId::new(id),
                dotclaw_core::JobSpec {
                    group_folder: GroupFolder::parse(group).unwrap(),
                    chat_id: None,
                    prompt: "p".into(),
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
                },
                1_000,
            )
            .unwrap();
    }

    drop_file(
        &f,
        "research",
        "requests",
        "001.json",
        serde_json::json!({"id": "req-1", "type": "list_jobs", "payload": {}}),
    );
    f.bus.scan().await;
    let response = read_response(&f, "research", "req-1");
    let jobs = response.result.unwrap()["jobs"].as_array().unwrap().clone();
    assert_eq!(jobs.len(), 1);
    assert_eq!(jobs[0]["job_id"], "job-r");
}

#[tokio::test]
async fn request_without_id_is_quarantined() {
    let f = fixture();
    drop_file(
        &f,
        "research",
        "requests",
        "anon.json",
        serde_json::json!({"type": "list_groups", "payload": {}}),
    );
    f.bus.scan().await;
    assert_eq!(
        std::fs::read_dir(f.dir.path().join("ipc/errors")).unwrap().count(),
        1
    );
}

#[tokio::test]
async fn files_process_in_filename_order() {
    let f = fixture();
    drop_file(
        &f,
        "research",
        "messages",
        "002.json",
        serde_json::json!({"type": "send_message", "payload": {"text": "second"}}),
    );
    drop_file(
        &f,
        "research",
        "messages",
        "001.json",
        serde_json::json!({"type": "send_message", "payload": {"text": "first"}}),
    );

    f.bus.scan().await;

    let texts: Vec<String> = f.provider.sent().into_iter().map(|m| m.text).collect();
    assert_eq!(texts, vec!["first".to_string(), "second".to_string()]);
}
