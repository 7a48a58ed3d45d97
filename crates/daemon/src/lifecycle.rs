// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Daemon lifecycle: startup ordering, wake recovery, graceful shutdown.

use crate::admin::{ensure_group_workspace, AdminCommands};
use crate::ipc::{IpcBus, IpcDeps};
use crate::maintenance::{
    health_loop, heartbeat_loop, maintenance_loop, HealthSuppression,
};
use dotclaw_adapters::{
    AgentRunner, CancelToken, MemoryStore, Provider, ProviderHandlers,
};
use dotclaw_core::{Clock, IdGen, SystemClock, UuidIdGen};
use dotclaw_engine::{
    EngineConfig, HookBus, HookConfig, JobWorkers, MessagePipeline, PipelineDeps,
    ProviderRegistry, RouterConfig, TaskEngine, WakeDetector, WakeEvent,
};
use dotclaw_storage::{Store, StoreError, TraceWriter};
use fs2::FileExt;
use std::fs::File;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

/// Grace window after a wake during which health checks take no action.
const WAKE_GRACE_MS: u64 = 60_000;

/// How long shutdown waits for per-chat drains before force-closing.
const DRAIN_SHUTDOWN_WAIT: Duration = Duration::from_secs(30);

/// Daemon filesystem layout.
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub store_dir: PathBuf,
    pub ipc_dir: PathBuf,
    pub groups_dir: PathBuf,
    pub trace_dir: PathBuf,
    pub log_path: PathBuf,
    pub lock_path: PathBuf,
    pub heartbeat_path: PathBuf,
    pub hooks_path: PathBuf,
    pub ipc_poll_interval_ms: u64,
}

impl Config {
    /// Layout rooted at the environment's data dir.
    pub fn load() -> Result<Self, LifecycleError> {
        let data_dir = crate::env::data_dir().ok_or(LifecycleError::NoStateDir)?;
        Ok(Self::rooted_at(data_dir))
    }

    /// Layout rooted at an explicit directory (tests, embedding).
    pub fn rooted_at(data_dir: PathBuf) -> Self {
        Self {
            store_dir: data_dir.join("store"),
            ipc_dir: data_dir.join("ipc"),
            groups_dir: crate::env::groups_dir(&data_dir),
            trace_dir: crate::env::trace_dir(&data_dir),
            log_path: data_dir.join("daemon.log"),
            lock_path: data_dir.join("daemon.pid"),
            heartbeat_path: data_dir.join("heartbeat"),
            hooks_path: data_dir.join("hooks.json"),
            ipc_poll_interval_ms: crate::env::ipc_poll_interval_ms(),
            data_dir,
        }
    }
}

/// External collaborators handed to the daemon.
pub struct DaemonDeps {
    pub providers: Vec<Arc<dyn Provider>>,
    pub runner: Arc<dyn AgentRunner>,
    pub memory: Arc<dyn MemoryStore>,
}

/// Lifecycle errors
#[derive(Debug, Error)]
pub enum LifecycleError {
    #[error("Could not determine state directory (set DOTCLAW_DATA_DIR)")]
    NoStateDir,
    #[error("Missing required environment variable {0}")]
    MissingEnv(String),
    #[error("Failed to acquire lock: daemon already running?")]
    LockFailed(#[source] std::io::Error),
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
    #[error("Agent runner preflight failed: {0}")]
    AgentPreflight(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// A running daemon and everything needed to stop it.
pub struct Daemon<C: Clock = SystemClock> {
    pub config: Config,
    // NOTE(lifetime): held to maintain the exclusive pid-file lock
    #[allow(dead_code)]
    lock_file: File,
    pub store: Store,
    pub registry: Arc<ProviderRegistry>,
    pub pipeline: MessagePipeline<C>,
    pub jobs: JobWorkers<C>,
    pub scheduler: TaskEngine<C>,
    pub suppression: HealthSuppression,
    shutdown: CancelToken,
    handles: Vec<JoinHandle<()>>,
}

impl Daemon<SystemClock> {
    /// Production startup: system clock, env-tuned engine config.
    pub async fn start(config: Config, deps: DaemonDeps) -> Result<Self, LifecycleError> {
        Self::start_with_clock(config, deps, SystemClock, EngineConfig::from_env()).await
    }
}

impl<C: Clock> Daemon<C> {
    /// Full startup sequence: directories → lock → store → reset-stalled →
    /// groups → providers → resume drains → loops.
    pub async fn start_with_clock(
        config: Config,
        deps: DaemonDeps,
        clock: C,
        engine_config: EngineConfig,
    ) -> Result<Self, LifecycleError> {
        // 1. Directories
        for dir in [
            &config.data_dir,
            &config.store_dir,
            &config.ipc_dir,
            &config.groups_dir,
            &config.trace_dir,
        ] {
            std::fs::create_dir_all(dir)?;
        }

        // 2. Single-instance lock, before any state is touched
        let lock_file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(false)
            .open(&config.lock_path)?;
        lock_file
            .try_lock_exclusive()
            .map_err(LifecycleError::LockFailed)?;
        {
            use std::io::Write;
            let mut file = &lock_file;
            file.set_len(0)?;
            writeln!(file, "{}", std::process::id())?;
        }

        // 3. Persistence
        let store = Store::open(&config.store_dir)?;

        // 4. Reclaim anything a previous process died holding
        let now = clock.now_ms();
        let reset_messages = store.reset_stalled_messages(now, 0)?;
        let reset_jobs = store.reset_stalled_background_jobs(u64::MAX)?;
        if reset_messages > 0 || reset_jobs > 0 {
            info!(reset_messages, reset_jobs, "reset stalled claims from previous run");
        }

        // 5. Group workspaces
        for group in store.list_groups() {
            ensure_group_workspace(&config.groups_dir, &group.folder);
        }

        let hooks = Arc::new(HookBus::new(HookConfig::load(&config.hooks_path)));
        let traces = TraceWriter::new(&config.trace_dir);
        let ids: Arc<dyn IdGen> = Arc::new(UuidIdGen);
        let shutdown = CancelToken::new();
        let suppression = HealthSuppression::default();

        // 6. Providers via the registry
        let registry = Arc::new(ProviderRegistry::new());
        for provider in deps.providers {
            registry.register(provider);
        }

        // 7. Pipeline + admin surface
        let pipeline = MessagePipeline::new(PipelineDeps {
            store: store.clone(),
            runner: Arc::clone(&deps.runner),
            registry: Arc::clone(&registry),
            hooks: Arc::clone(&hooks),
            router: RouterConfig::default(),
            config: engine_config.clone(),
            clock: clock.clone(),
            ids: Arc::clone(&ids),
            traces: traces.clone(),
            groups_dir: config.groups_dir.clone(),
            transcriber: None,
        });
        pipeline.set_command_handler(Arc::new(AdminCommands::new(
            store.clone(),
            Arc::clone(&deps.memory),
            Arc::clone(&hooks),
            config.groups_dir.clone(),
            clock.clone(),
        )));

        // 8. Provider receivers with pipeline handlers
        let handlers: Arc<dyn ProviderHandlers> = Arc::new(pipeline.clone());
        if let Err(e) = registry.start_all(Arc::clone(&handlers)).await {
            warn!(error = %e, "provider failed to start");
        }

        // 9. Resume pending drains
        pipeline.resume_pending();

        // 10. Engine loops
        let scheduler = TaskEngine::new(
            store.clone(),
            Arc::clone(&deps.runner),
            Arc::clone(&registry),
            Arc::clone(&hooks),
            RouterConfig::default(),
            engine_config.clone(),
            clock.clone(),
            Arc::clone(&ids),
            traces.clone(),
            shutdown.clone(),
        );
        let jobs = JobWorkers::new(
            store.clone(),
            Arc::clone(&deps.runner),
            Arc::clone(&registry),
            Arc::clone(&hooks),
            engine_config.clone(),
            clock.clone(),
            traces.clone(),
            shutdown.clone(),
        );

        let mut handles = Vec::new();
        handles.push(tokio::spawn(scheduler.clone().run()));
        handles.extend(jobs.start());

        let ipc = IpcBus::new(
            IpcDeps {
                store: store.clone(),
                jobs: jobs.clone(),
                scheduler: scheduler.clone(),
                registry: Arc::clone(&registry),
                memory: deps.memory,
                clock: clock.clone(),
                ids,
            },
            config.ipc_dir.clone(),
            config.ipc_poll_interval_ms,
            shutdown.clone(),
        );
        handles.push(tokio::spawn(ipc.run()));

        handles.push(tokio::spawn(maintenance_loop(
            store.clone(),
            pipeline.clone(),
            clock.clone(),
            config.groups_dir.clone(),
            engine_config.stalled_claim_threshold_ms,
            shutdown.clone(),
        )));
        handles.push(tokio::spawn(heartbeat_loop(
            config.heartbeat_path.clone(),
            clock.clone(),
            shutdown.clone(),
        )));
        handles.push(tokio::spawn(health_loop(
            Arc::clone(&registry),
            suppression.clone(),
            clock.clone(),
            shutdown.clone(),
        )));

        // 11. Wake detection + recovery
        let (wake_tx, wake_rx) = mpsc::channel(4);
        let detector = WakeDetector::new(
            clock.clone(),
            engine_config.wake_check_interval_ms,
            engine_config.wake_threshold_ms,
            shutdown.clone(),
        );
        handles.push(tokio::spawn(detector.run(wake_tx)));
        handles.push(tokio::spawn(wake_recovery_loop(
            wake_rx,
            store.clone(),
            Arc::clone(&registry),
            pipeline.clone(),
            handlers,
            suppression.clone(),
            clock.clone(),
            engine_config.stalled_claim_threshold_ms,
        )));

        info!("daemon started");
        Ok(Self {
            config,
            lock_file,
            store,
            registry,
            pipeline,
            jobs,
            scheduler,
            suppression,
            shutdown,
            handles,
        })
    }

    /// Graceful shutdown. Consumes the daemon, so it can only run once.
    pub async fn shutdown(self) {
        info!("shutting down daemon");

        // 1. Stop inbound traffic
        self.registry.stop_all().await;

        // 2. Stop all loops
        self.shutdown.cancel();

        // 3. Abort active agent runs
        self.jobs.abort_all();

        // 4. Wait for per-chat drains
        self.pipeline.shutdown(DRAIN_SHUTDOWN_WAIT).await;

        for handle in self.handles {
            if tokio::time::timeout(Duration::from_secs(5), handle)
                .await
                .is_err()
            {
                warn!("loop did not stop within 5s");
            }
        }

        // 5. Final flush + snapshot, then release the lock on drop
        if let Err(e) = self.store.flush() {
            warn!(error = %e, "final flush failed");
        }
        if let Err(e) = self.store.checkpoint() {
            warn!(error = %e, "final checkpoint failed");
        }
        let _ = std::fs::remove_file(&self.config.lock_path);
        info!("daemon stopped");
    }
}

/// Recovery after a detected host sleep: suppress health kills, restart
/// connected providers, reclaim stalled leases, re-drain pending chats.
#[allow(clippy::too_many_arguments)]
async fn wake_recovery_loop<C: Clock>(
    mut wake_rx: mpsc::Receiver<WakeEvent>,
    store: Store,
    registry: Arc<ProviderRegistry>,
    pipeline: MessagePipeline<C>,
    handlers: Arc<dyn ProviderHandlers>,
    suppression: HealthSuppression,
    clock: C,
    stalled_threshold_ms: u64,
) {
    while let Some(event) = wake_rx.recv().await {
        let now = clock.now_ms();
        info!(slept_ms = event.slept_ms, "running wake recovery");

        suppression.suppress_for(now, WAKE_GRACE_MS);
        registry.restart_connected(Arc::clone(&handlers)).await;

        match store.reset_stalled_messages(now, stalled_threshold_ms) {
            Ok(n) if n > 0 => info!(reset = n, "reset stalled message claims after wake"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "stalled message reset failed after wake"),
        }
        match store.reset_stalled_background_jobs(now) {
            Ok(n) if n > 0 => info!(reset = n, "reset stalled background jobs after wake"),
            Ok(_) => {}
            Err(e) => warn!(error = %e, "stalled job reset failed after wake"),
        }

        pipeline.resume_pending();
    }
}

#[cfg(test)]
#[path = "lifecycle_tests.rs"]
mod tests;
