// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Routing decision types. The routing function itself lives in the engine;
//! these types travel across crate boundaries (pipeline, scheduler, jobs).

use serde::{Deserialize, Serialize};
use std::fmt;

/// Abstract performance/quality tier for a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Profile {
    Fast,
    Standard,
    Deep,
}

impl fmt::Display for Profile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Profile::Fast => write!(f, "fast"),
            Profile::Standard => write!(f, "standard"),
            Profile::Deep => write!(f, "deep"),
        }
    }
}

/// Plan for interim progress messages while a run is in flight.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgressPlan {
    pub enabled: bool,
    pub initial_ms: u64,
    pub interval_ms: u64,
    pub max_updates: u32,
    pub messages: Vec<String>,
}

impl Default for ProgressPlan {
    fn default() -> Self {
        Self {
            enabled: false,
            initial_ms: 15_000,
            interval_ms: 30_000,
            max_updates: 3,
            messages: Vec::new(),
        }
    }
}

/// Output of the router: everything the pipeline needs to shape a run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoutingDecision {
    pub profile: Profile,
    /// Human-readable explanation of why this profile was chosen.
    pub reason: String,
    pub should_background: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub estimated_minutes: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model_override: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tool_steps: Option<u32>,
    #[serde(default)]
    pub tool_allow: Vec<String>,
    #[serde(default)]
    pub tool_deny: Vec<String>,
    pub enable_planner: bool,
    pub enable_response_validation: bool,
    pub response_validation_max_retries: u32,
    pub enable_memory_recall: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_max_results: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recall_max_tokens: Option<u32>,
    pub enable_memory_extraction: bool,
    pub progress: ProgressPlan,
    pub should_run_classifier: bool,
}
