// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dotclaw-engine: the host orchestration plane.
//!
//! Everything that decides when an agent runs, which context it runs in,
//! and how its lifecycle is managed: the per-chat message pipeline, the
//! scheduled-task engine, the background-job worker pool, the router, rate
//! limiter, hook bus, and wake detection.

mod callbacks;
mod config;
mod hooks;
mod jobs;
mod pipeline;
mod rate_limit;
mod registry;
mod retry;
mod router;
mod schedule;
mod scheduler;
mod wake;

pub use callbacks::CallbackStore;
pub use config::{AutoSpawnToggles, EngineConfig};
pub use hooks::{HookBus, HookConfig, HookScript};
pub use jobs::{spawn_background_job, JobUpdateError, JobWorkers};
pub use pipeline::{CommandHandler, MessagePipeline, PipelineDeps, Transcriber};
pub use rate_limit::{RateDecision, RateLimiter};
pub use registry::ProviderRegistry;
pub use retry::{band_jitter_ms, exp_backoff_ms, full_jitter_ms, retry_with_backoff};
pub use router::{classify_long_form, route_request, RouteContext, RouterConfig};
pub use schedule::{initial_next_run, next_run_after_success, parse_interval_ms, ScheduleError};
pub use scheduler::TaskEngine;
pub use wake::{WakeDetector, WakeEvent};
