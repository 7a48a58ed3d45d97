// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! DotClaw daemon (dotclawd)
//!
//! Multi-chat agent host: ingests provider messages, schedules agent runs,
//! and supervises background work. Providers are registered by embedding
//! applications; the bare binary still runs the scheduler, job workers,
//! and IPC bus.

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

use dotclaw_adapters::{NoopMemoryStore, ProcessAgentRunner, TracedRunner};
use dotclaw_daemon::{Config, Daemon, DaemonDeps, LifecycleError};
use std::sync::Arc;
use tokio::signal::unix::{signal, SignalKind};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    std::process::exit(run().await);
}

async fn run() -> i32 {
    if let Some(arg) = std::env::args().nth(1) {
        match arg.as_str() {
            "--version" | "-V" | "-v" => {
                println!("dotclawd {}", env!("CARGO_PKG_VERSION"));
                return 0;
            }
            "--help" | "-h" | "help" => {
                print_help();
                return 0;
            }
            _ => {
                eprintln!("error: unexpected argument '{arg}'");
                eprintln!("Usage: dotclawd [--help | --version]");
                return 1;
            }
        }
    }

    let config = match Config::load() {
        Ok(config) => config,
        Err(e) => {
            eprintln!("dotclawd: {e}");
            return 1;
        }
    };

    rotate_log_if_needed(&config.log_path);
    let _log_guard = match setup_logging(&config) {
        Ok(guard) => guard,
        Err(e) => {
            eprintln!("dotclawd: failed to set up logging: {e}");
            return 1;
        }
    };

    // The agent container entrypoint is the one hard requirement.
    let Some(agent_cmd) = dotclaw_daemon::env::agent_cmd() else {
        let e = LifecycleError::MissingEnv("DOTCLAW_AGENT_CMD".into());
        eprintln!("dotclawd: {e}");
        error!("{e}");
        return 1;
    };
    let runner = ProcessAgentRunner::new(agent_cmd).with_args(dotclaw_daemon::env::agent_args());
    if let Err(e) = runner.preflight() {
        eprintln!("dotclawd: {e}");
        error!("{e}");
        return 1;
    }

    let deps = DaemonDeps {
        // Provider SDKs are wired by embedding applications; the bare
        // binary runs headless.
        providers: Vec::new(),
        runner: Arc::new(TracedRunner::new(runner)),
        memory: Arc::new(NoopMemoryStore),
    };

    let daemon = match Daemon::start(config, deps).await {
        Ok(daemon) => daemon,
        Err(LifecycleError::LockFailed(_)) => {
            eprintln!("dotclawd is already running");
            return 1;
        }
        Err(e) => {
            eprintln!("dotclawd: failed to start: {e}");
            error!("failed to start: {e}");
            return 1;
        }
    };

    if daemon.registry.all().is_empty() {
        warn!("no providers registered; running headless (scheduler, jobs, ipc only)");
    }

    info!("dotclawd ready");
    println!("READY");

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGTERM handler: {e}");
            daemon.shutdown().await;
            return 1;
        }
    };
    let mut sigint = match signal(SignalKind::interrupt()) {
        Ok(s) => s,
        Err(e) => {
            error!("failed to install SIGINT handler: {e}");
            daemon.shutdown().await;
            return 1;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => info!("received SIGTERM, shutting down"),
        _ = sigint.recv() => info!("received SIGINT, shutting down"),
    }

    daemon.shutdown().await;
    0
}

fn print_help() {
    println!("dotclawd {}", env!("CARGO_PKG_VERSION"));
    println!("DotClaw daemon - multi-chat conversational agent host");
    println!();
    println!("USAGE:");
    println!("    dotclawd");
    println!();
    println!("ENVIRONMENT:");
    println!("    DOTCLAW_DATA_DIR     state directory (default ~/.local/state/dotclaw)");
    println!("    DOTCLAW_AGENT_CMD    agent container entrypoint (required)");
    println!("    DOTCLAW_AGENT_ARGS   extra arguments for the agent command");
    println!("    DOTCLAW_GROUPS_DIR   group workspace root (default <data>/groups)");
    println!("    DOTCLAW_TRACE_DIR    trace directory (default <data>/traces)");
    println!();
    println!("OPTIONS:");
    println!("    -h, --help       Print help information");
    println!("    -v, --version    Print version information");
}

/// Maximum log file size before rotation (10 MB).
const MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Number of rotated log files to keep.
const MAX_ROTATED_LOGS: u32 = 3;

/// Rotate the daemon log at startup when it has grown too large.
/// Best-effort: rotation failures never block startup.
fn rotate_log_if_needed(log_path: &std::path::Path) {
    let size = match std::fs::metadata(log_path) {
        Ok(m) => m.len(),
        Err(_) => return,
    };
    if size < MAX_LOG_SIZE {
        return;
    }
    let log_str = log_path.display().to_string();
    for i in (1..MAX_ROTATED_LOGS).rev() {
        let _ = std::fs::rename(format!("{log_str}.{i}"), format!("{log_str}.{}", i + 1));
    }
    let _ = std::fs::rename(log_path, format!("{log_str}.1"));
}

fn setup_logging(
    config: &Config,
) -> Result<tracing_appender::non_blocking::WorkerGuard, std::io::Error> {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    if let Some(parent) = config.log_path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let dir = config
        .log_path
        .parent()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no log directory"))?;
    let file = config
        .log_path
        .file_name()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::NotFound, "no log file name"))?;
    let file_appender = tracing_appender::rolling::never(dir, file);
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking))
        .init();

    Ok(guard)
}
