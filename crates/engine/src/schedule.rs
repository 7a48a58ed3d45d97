// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Next-run computation for scheduled tasks.
//!
//! Cron expressions are evaluated by the `cron` crate in the task's IANA
//! timezone; intervals accept plain milliseconds or `30s`/`5m`/`2h`/`1d`
//! suffixes; `once` values are ISO-8601 instants.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule;
use dotclaw_core::ScheduleKind;
use std::str::FromStr;
use thiserror::Error;

/// Structurally invalid schedules; these pause the task rather than retry.
#[derive(Debug, Error)]
pub enum ScheduleError {
    #[error("invalid cron expression {0:?}: {1}")]
    InvalidCron(String, String),
    #[error("invalid interval {0:?}")]
    InvalidInterval(String),
    #[error("invalid timezone {0:?}")]
    InvalidTimezone(String),
    #[error("invalid instant {0:?}")]
    InvalidInstant(String),
}

/// Parse an interval value into milliseconds.
///
/// Bare digits are milliseconds (`"30000"`); otherwise a number with an
/// `s`/`m`/`h`/`d` suffix. Zero is invalid — a zero-period timer is a
/// busy-loop.
pub fn parse_interval_ms(value: &str) -> Result<u64, ScheduleError> {
    let v = value.trim();
    let invalid = || ScheduleError::InvalidInterval(value.to_string());

    let ms = if let Ok(ms) = v.parse::<u64>() {
        ms
    } else {
        let unit = v.chars().last().ok_or_else(invalid)?;
        let digits = &v[..v.len() - unit.len_utf8()];
        let n: u64 = digits.trim().parse().map_err(|_| invalid())?;
        match unit {
            's' => n.saturating_mul(1_000),
            'm' => n.saturating_mul(60_000),
            'h' => n.saturating_mul(3_600_000),
            'd' => n.saturating_mul(86_400_000),
            _ => return Err(invalid()),
        }
    };
    if ms == 0 {
        return Err(invalid());
    }
    Ok(ms)
}

/// Cron next-occurrence after `now_ms` in `timezone`.
///
/// Five-field expressions get a seconds column prepended (the `cron` crate
/// wants six or seven fields).
fn next_cron_ms(value: &str, timezone: &str, now_ms: u64) -> Result<u64, ScheduleError> {
    let tz: Tz = timezone
        .parse()
        .map_err(|_| ScheduleError::InvalidTimezone(timezone.to_string()))?;
    let normalized = if value.split_whitespace().count() == 5 {
        format!("0 {value}")
    } else {
        value.to_string()
    };
    let schedule = Schedule::from_str(&normalized)
        .map_err(|e| ScheduleError::InvalidCron(value.to_string(), e.to_string()))?;
    let now = DateTime::from_timestamp_millis(now_ms as i64)
        .ok_or_else(|| ScheduleError::InvalidInstant(format!("epoch {now_ms}")))?
        .with_timezone(&tz);
    let next = schedule
        .after(&now)
        .next()
        .ok_or_else(|| ScheduleError::InvalidCron(value.to_string(), "no future run".into()))?;
    Ok(next.with_timezone(&Utc).timestamp_millis().max(0) as u64)
}

/// Initial `next_run` when a task is created or resumed.
///
/// A `once` instant in the past runs immediately.
pub fn initial_next_run(
    kind: ScheduleKind,
    value: &str,
    timezone: &str,
    now_ms: u64,
) -> Result<u64, ScheduleError> {
    match kind {
        ScheduleKind::Cron => next_cron_ms(value, timezone, now_ms),
        ScheduleKind::Interval => Ok(now_ms + parse_interval_ms(value)?),
        ScheduleKind::Once => {
            let at = DateTime::parse_from_rfc3339(value)
                .map_err(|_| ScheduleError::InvalidInstant(value.to_string()))?
                .timestamp_millis()
                .max(0) as u64;
            Ok(at.max(now_ms))
        }
    }
}

/// Next run after a successful execution. `None` means the task is done.
pub fn next_run_after_success(
    kind: ScheduleKind,
    value: &str,
    timezone: &str,
    now_ms: u64,
) -> Result<Option<u64>, ScheduleError> {
    match kind {
        ScheduleKind::Cron => Ok(Some(next_cron_ms(value, timezone, now_ms)?)),
        ScheduleKind::Interval => Ok(Some(now_ms + parse_interval_ms(value)?)),
        ScheduleKind::Once => Ok(None),
    }
}

#[cfg(test)]
#[path = "schedule_tests.rs"]
mod tests;
