// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dotclaw-core: domain types for the DotClaw agent host

pub mod chat;
pub mod clock;
pub mod event;
pub mod group;
pub mod hook;
pub mod id;
pub mod ipc;
pub mod job;
pub mod message;
pub mod routing;
pub mod task;
pub mod time_fmt;
pub mod trace;

pub use chat::{Attachment, AttachmentKind, Chat, ChatId, ChatType, IncomingMessage};
pub use clock::{Clock, SystemClock};
pub use event::StoreEvent;
pub use group::{GroupFolder, GroupFolderError, RegisteredGroup, MAIN_GROUP_FOLDER};
pub use hook::HookEvent;
pub use id::{IdGen, UuidIdGen};
pub use ipc::{
    IpcEnvelope, IpcMessageOp, IpcParseError, IpcRequest, IpcResponse, IpcTaskOp, JobFilter,
    JobUpdatePayload, MemorySearchPayload, MemoryUpsertPayload, RegisterGroupPayload,
    ScheduleTaskPayload, SetModelPayload,
};
pub use job::{
    BackgroundJob, BackgroundJobEvent, JobEventLevel, JobId, JobOutcome, JobSpec, JobStatus,
};
pub use message::{ChatCursor, MessageId, QueuedMessage, QueuedStatus, StoredMessage};
pub use routing::{Profile, ProgressPlan, RoutingDecision};
pub use task::{ContextMode, ScheduleKind, ScheduledTask, TaskId, TaskStatus};
pub use time_fmt::{format_elapsed, format_eta_minutes, format_relative_ms};
pub use trace::{FeedbackEntry, TraceId, TraceLink, TraceRecord};

#[cfg(any(test, feature = "test-support"))]
pub use clock::FakeClock;
#[cfg(any(test, feature = "test-support"))]
pub use id::SeqIdGen;
