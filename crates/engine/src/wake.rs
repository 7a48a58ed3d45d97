// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Wake detection: notices when the host slept through its own timer.
//!
//! Each tick sleeps a fixed interval and compares wall-clock elapsed time
//! against it. A large overshoot means the machine was suspended; the
//! detector reports it and the lifecycle supervisor runs recovery (provider
//! restarts, stalled-claim resets, re-drains).

use dotclaw_adapters::CancelToken;
use dotclaw_core::Clock;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{info, warn};

/// One detected sleep.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeEvent {
    /// How long the host was gone beyond the expected interval.
    pub slept_ms: u64,
}

pub struct WakeDetector<C: Clock> {
    clock: C,
    check_interval_ms: u64,
    threshold_ms: u64,
    shutdown: CancelToken,
}

impl<C: Clock> WakeDetector<C> {
    pub fn new(clock: C, check_interval_ms: u64, threshold_ms: u64, shutdown: CancelToken) -> Self {
        Self {
            clock,
            check_interval_ms,
            threshold_ms,
            shutdown,
        }
    }

    /// Run until shutdown, reporting sleeps on `wake_tx`.
    pub async fn run(self, wake_tx: mpsc::Sender<WakeEvent>) {
        loop {
            let before = self.clock.now_ms();
            tokio::select! {
                _ = tokio::time::sleep(Duration::from_millis(self.check_interval_ms)) => {}
                _ = self.shutdown.canceled() => break,
            }
            let elapsed = self.clock.now_ms().saturating_sub(before);
            let overshoot = elapsed.saturating_sub(self.check_interval_ms);
            if overshoot > self.threshold_ms {
                warn!(slept_ms = overshoot, "host slept through wake check");
                if wake_tx.send(WakeEvent { slept_ms: overshoot }).await.is_err() {
                    break;
                }
            }
        }
        info!("wake detector stopped");
    }
}

#[cfg(test)]
#[path = "wake_tests.rs"]
mod tests;
