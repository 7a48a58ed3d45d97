// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

// Allow panic!/unwrap/expect in test code
#![cfg_attr(test, allow(clippy::panic))]
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! dotclaw-adapters: boundary traits and their implementations.
//!
//! The core never talks to a messaging SDK or an agent container directly —
//! it goes through the [`provider::Provider`] and [`agent::AgentRunner`]
//! traits defined here. Fake implementations (behind the `test-support`
//! feature) drive the engine in tests.

pub mod agent;
pub mod cancel;
pub mod memory;
pub mod provider;
pub mod subprocess;
mod traced;

pub use agent::{
    AgentContext, AgentExecutionError, AgentRunResult, AgentRunSpec, AgentRunner, ContainerOutput,
    LocalAttachment, OutputStatus, ProcessAgentRunner,
};
pub use cancel::CancelToken;
pub use memory::{MemoryError, MemoryHit, MemoryStore, NoopMemoryStore};
pub use provider::{
    ButtonClick, DownloadError, DownloadErrorKind, InlineButton, Provider, ProviderCapabilities,
    ProviderError, ProviderHandlers, SendOptions, SendReceipt,
};
pub use traced::TracedRunner;

#[cfg(any(test, feature = "test-support"))]
pub use agent::{FakeAgentRunner, FakeRun};
#[cfg(any(test, feature = "test-support"))]
pub use memory::FakeMemoryStore;
#[cfg(any(test, feature = "test-support"))]
pub use provider::{FakeProvider, SentMessage};
