// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The router: prompt + metadata → run-shaping decision.
//!
//! `route_request` is a pure function of its inputs and the static
//! [`RouterConfig`]; it performs no I/O. Threshold values are tuning, the
//! decision contract is fixed.

use dotclaw_core::{IncomingMessage, Profile, ProgressPlan, RoutingDecision};

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// At or below this prompt length, simple acknowledgements stay fast.
    pub fast_max_chars: usize,
    /// At or above this prompt length the request routes deep.
    pub deep_min_chars: usize,
    /// Phrases that force the deep profile regardless of length.
    pub deep_markers: Vec<String>,
    /// Phrases that mark the request as an explicit background candidate.
    pub background_markers: Vec<String>,
    /// Phrases that keep a short message on the fast path.
    pub fast_markers: Vec<String>,
    /// Phrases that make a standard request worth a second classifier pass.
    pub classifier_markers: Vec<String>,
    pub fast_max_tool_steps: u32,
    pub standard_max_tool_steps: u32,
    pub deep_max_tool_steps: u32,
    pub deep_estimated_minutes: u32,
    pub recall_max_results: u32,
    pub recall_max_tokens: u32,
    /// Tools denied on every profile (e.g. destructive host access).
    pub tool_deny: Vec<String>,
    /// Distinct work items before the classifier calls a request long-form.
    pub classifier_min_steps: usize,
    /// Minutes the classifier charges per detected work item.
    pub classifier_minutes_per_step: u32,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            fast_max_chars: 80,
            deep_min_chars: 400,
            deep_markers: vec![
                "rewrite".into(),
                "entire".into(),
                "all files".into(),
                "migrate".into(),
                "refactor".into(),
                "audit".into(),
                "comprehensive".into(),
                "deep dive".into(),
            ],
            background_markers: vec![
                "in the background".into(),
                "overnight".into(),
                "when you get a chance".into(),
            ],
            fast_markers: vec![
                "thanks".into(),
                "thank you".into(),
                "ok".into(),
                "okay".into(),
                "yes".into(),
                "no".into(),
                "lol".into(),
            ],
            classifier_markers: vec![
                "how long".into(),
                "plan".into(),
                "step by step".into(),
            ],
            fast_max_tool_steps: 5,
            standard_max_tool_steps: 25,
            deep_max_tool_steps: 80,
            deep_estimated_minutes: 8,
            recall_max_results: 6,
            recall_max_tokens: 2_000,
            tool_deny: vec![],
            classifier_min_steps: 4,
            classifier_minutes_per_step: 3,
        }
    }
}

/// Deterministic long-form classifier: counts distinct work items in a
/// prompt (list entries and chained clauses) and estimates minutes from
/// them. `None` means the request looks single-step.
///
/// Runs only when the router asked for a second pass
/// (`should_run_classifier`), so ordinary traffic never pays for it.
pub fn classify_long_form(prompt: &str, cfg: &RouterConfig) -> Option<u32> {
    let list_items = prompt
        .lines()
        .map(str::trim)
        .filter(|line| {
            line.starts_with('-')
                || line.starts_with('*')
                || line
                    .split_once('.')
                    .is_some_and(|(n, _)| !n.is_empty() && n.chars().all(|c| c.is_ascii_digit()))
        })
        .count();
    let chained = prompt
        .to_lowercase()
        .split([',', ';'])
        .chain(prompt.to_lowercase().split(" and then "))
        .count()
        .saturating_sub(1);
    let steps = list_items.max(chained);
    if steps >= cfg.classifier_min_steps {
        Some((steps as u32).saturating_mul(cfg.classifier_minutes_per_step))
    } else {
        None
    }
}

/// Caller-provided context for a routing decision.
#[derive(Debug, Clone, Copy, Default)]
pub struct RouteContext<'a> {
    /// Scheduled tasks get a fixed standard profile.
    pub is_scheduled_task: bool,
    /// Group-level model override, forwarded into the decision.
    pub model_override: Option<&'a str>,
}

fn contains_any<'a>(haystack: &str, needles: &'a [String]) -> Option<&'a str> {
    needles
        .iter()
        .find(|n| haystack.contains(n.as_str()))
        .map(|s| s.as_str())
}

fn progress_for(profile: Profile) -> ProgressPlan {
    match profile {
        Profile::Fast => ProgressPlan::default(),
        Profile::Standard => ProgressPlan {
            enabled: true,
            initial_ms: 20_000,
            interval_ms: 40_000,
            max_updates: 2,
            messages: vec!["Still working on it…".into()],
        },
        Profile::Deep => ProgressPlan {
            enabled: true,
            initial_ms: 15_000,
            interval_ms: 30_000,
            max_updates: 4,
            messages: vec![
                "Digging in…".into(),
                "Still at it, this one is chunky.".into(),
            ],
        },
    }
}

/// Route a candidate prompt. Pure; no I/O.
pub fn route_request(
    prompt: &str,
    last_message: Option<&IncomingMessage>,
    ctx: RouteContext<'_>,
    cfg: &RouterConfig,
) -> RoutingDecision {
    let normalized = prompt.trim().to_lowercase();
    let model_override = ctx.model_override.map(str::to_string);

    let mut decision = RoutingDecision {
        profile: Profile::Standard,
        reason: "default standard profile".into(),
        should_background: false,
        estimated_minutes: None,
        model_override,
        max_output_tokens: None,
        max_tool_steps: Some(cfg.standard_max_tool_steps),
        tool_allow: vec![],
        tool_deny: cfg.tool_deny.clone(),
        enable_planner: false,
        enable_response_validation: false,
        response_validation_max_retries: 0,
        enable_memory_recall: true,
        recall_max_results: Some(cfg.recall_max_results),
        recall_max_tokens: Some(cfg.recall_max_tokens),
        enable_memory_extraction: true,
        progress: progress_for(Profile::Standard),
        should_run_classifier: false,
    };

    if ctx.is_scheduled_task {
        decision.reason = "scheduled tasks run the fixed standard profile".into();
        decision.enable_memory_extraction = false;
        decision.progress = ProgressPlan::default();
        return decision;
    }

    let deep_marker = contains_any(&normalized, &cfg.deep_markers);
    let is_deep = deep_marker.is_some() || normalized.len() >= cfg.deep_min_chars;
    let is_fast = !is_deep
        && normalized.len() <= cfg.fast_max_chars
        && (contains_any(&normalized, &cfg.fast_markers).is_some() || !normalized.contains('?'));

    if is_deep {
        decision.profile = Profile::Deep;
        decision.reason = match deep_marker {
            Some(marker) => format!("deep marker {marker:?}"),
            None => format!("long prompt ({} chars)", normalized.len()),
        };
        // Very large prompts get a proportionally larger estimate, which
        // the pipeline's planner gate may turn into a background job.
        let estimate = if normalized.len() >= cfg.deep_min_chars * 4 {
            cfg.deep_estimated_minutes * 3
        } else {
            cfg.deep_estimated_minutes
        };
        decision.estimated_minutes = Some(estimate);
        decision.max_tool_steps = Some(cfg.deep_max_tool_steps);
        decision.enable_planner = true;
        decision.enable_response_validation = true;
        decision.response_validation_max_retries = 1;
        decision.progress = progress_for(Profile::Deep);
    } else if is_fast {
        decision.profile = Profile::Fast;
        decision.reason = format!("short message ({} chars)", normalized.len());
        decision.max_tool_steps = Some(cfg.fast_max_tool_steps);
        decision.enable_memory_recall = false;
        decision.recall_max_results = None;
        decision.recall_max_tokens = None;
        decision.enable_memory_extraction = false;
        decision.progress = progress_for(Profile::Fast);
    }

    if let Some(marker) = contains_any(&normalized, &cfg.background_markers) {
        decision.should_background = true;
        decision.reason = format!("background marker {marker:?}");
        decision
            .estimated_minutes
            .get_or_insert(cfg.deep_estimated_minutes);
    }

    if decision.profile == Profile::Standard
        && contains_any(&normalized, &cfg.classifier_markers).is_some()
    {
        decision.should_run_classifier = true;
    }

    // Thread replies inherit the thread's pace: never fast in a thread.
    if decision.profile == Profile::Fast
        && last_message.is_some_and(|m| m.thread_id.is_some())
    {
        decision.profile = Profile::Standard;
        decision.reason = "thread reply promoted to standard".into();
        decision.max_tool_steps = Some(cfg.standard_max_tool_steps);
        decision.progress = progress_for(Profile::Standard);
    }

    decision
}

#[cfg(test)]
#[path = "router_tests.rs"]
mod tests;
