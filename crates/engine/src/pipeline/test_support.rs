// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared pipeline test fixture.

use super::{MessagePipeline, PipelineDeps};
use crate::hooks::{HookBus, HookConfig};
use crate::registry::ProviderRegistry;
use crate::router::RouterConfig;
use crate::EngineConfig;
use dotclaw_adapters::FakeAgentRunner;
use dotclaw_adapters::FakeProvider;
use dotclaw_core::{
    ChatId, ChatType, Clock, FakeClock, GroupFolder, IncomingMessage, RegisteredGroup, SeqIdGen,
};
use dotclaw_storage::{Store, TraceWriter};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

pub(crate) struct Fixture {
    pub dir: TempDir,
    pub store: Store,
    pub runner: FakeAgentRunner,
    pub provider: Arc<FakeProvider>,
    pub clock: FakeClock,
    pub pipeline: MessagePipeline<FakeClock>,
}

pub(crate) fn fixture_with(config: EngineConfig, hooks: HookConfig) -> Fixture {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::open(&dir.path().join("store")).unwrap();
    let runner = FakeAgentRunner::new();
    let provider = Arc::new(FakeProvider::new("telegram"));
    let registry = Arc::new(ProviderRegistry::new());
    registry.register(provider.clone());
    let clock = FakeClock::at(1_700_000_000_000);
    let pipeline = MessagePipeline::new(PipelineDeps {
        store: store.clone(),
        runner: Arc::new(runner.clone()),
        registry,
        hooks: Arc::new(HookBus::new(hooks)),
        router: RouterConfig::default(),
        config,
        clock: clock.clone(),
        ids: Arc::new(SeqIdGen::new("run")),
        traces: TraceWriter::new(dir.path().join("traces")),
        groups_dir: dir.path().join("groups"),
        transcriber: None,
    });
    Fixture {
        dir,
        store,
        runner,
        provider,
        clock,
        pipeline,
    }
}

pub(crate) fn fixture() -> Fixture {
    let mut config = EngineConfig::default();
    // Fast retries so tests never sleep for real backoff periods
    config.retry_base_ms = 1;
    config.retry_cap_ms = 2;
    config.notify_base_ms = 1;
    config.notify_cap_ms = 2;
    fixture_with(config, HookConfig::default())
}

impl Fixture {
    pub fn register_main(&self, chat: &str) -> RegisteredGroup {
        let group = RegisteredGroup {
            chat_id: ChatId::new(chat),
            name: "Main".into(),
            folder: GroupFolder::main(),
            trigger: None,
            added_at: "2026-01-01T00:00:00Z".into(),
            container_config: None,
            model_override: None,
        };
        self.store.register_group(group.clone()).unwrap();
        group
    }

    pub fn incoming(&self, chat: &str, id: &str, content: &str) -> IncomingMessage {
        IncomingMessage {
            chat_id: ChatId::new(chat),
            message_id: id.into(),
            sender_id: "u1".into(),
            sender_name: "User".into(),
            content: content.into(),
            timestamp: dotclaw_storage::iso_from_ms(self.clock.now_ms()),
            attachments: vec![],
            is_group: false,
            chat_type: ChatType::Private,
            thread_id: None,
            raw_provider_data: None,
        }
    }
}

/// Poll until `cond` holds; panics after ~2s.
pub(crate) async fn wait_until(mut cond: impl FnMut() -> bool) {
    for _ in 0..400 {
        if cond() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("condition not met within 2s");
}
