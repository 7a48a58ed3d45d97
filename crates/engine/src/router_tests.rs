// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use dotclaw_core::{ChatId, ChatType};

fn cfg() -> RouterConfig {
    RouterConfig::default()
}

#[test]
fn deep_marker_routes_deep() {
    let d = route_request(
        "Rewrite the entire docs site.",
        None,
        RouteContext::default(),
        &cfg(),
    );
    assert_eq!(d.profile, Profile::Deep);
    assert!(d.enable_planner);
    assert_eq!(d.estimated_minutes, Some(8));
    assert!(!d.should_background);
    assert!(d.progress.enabled);
}

#[test]
fn long_prompt_routes_deep_without_markers() {
    let long = "please summarize this ".repeat(30);
    let d = route_request(&long, None, RouteContext::default(), &cfg());
    assert_eq!(d.profile, Profile::Deep);
}

#[test]
fn short_ack_routes_fast() {
    let d = route_request("thanks!", None, RouteContext::default(), &cfg());
    assert_eq!(d.profile, Profile::Fast);
    assert!(!d.enable_memory_recall);
    assert!(!d.progress.enabled);
}

#[test]
fn question_of_medium_length_routes_standard() {
    let d = route_request(
        "what changed in the deploy pipeline since last week? anything risky in there for us?",
        None,
        RouteContext::default(),
        &cfg(),
    );
    assert_eq!(d.profile, Profile::Standard);
    assert!(d.enable_memory_recall);
}

#[test]
fn background_marker_sets_candidacy() {
    let d = route_request(
        "index all the repos in the background please",
        None,
        RouteContext::default(),
        &cfg(),
    );
    assert!(d.should_background);
    assert!(d.estimated_minutes.is_some());
}

#[test]
fn scheduled_tasks_get_fixed_profile() {
    let d = route_request(
        "Rewrite the entire docs site.",
        None,
        RouteContext {
            is_scheduled_task: true,
            model_override: None,
        },
        &cfg(),
    );
    assert_eq!(d.profile, Profile::Standard);
    assert!(!d.should_background);
    assert!(!d.progress.enabled);
}

#[test]
fn model_override_is_forwarded() {
    let d = route_request(
        "hello there",
        None,
        RouteContext {
            is_scheduled_task: false,
            model_override: Some("fancy-model"),
        },
        &cfg(),
    );
    assert_eq!(d.model_override.as_deref(), Some("fancy-model"));
}

#[test]
fn classifier_runs_on_ambiguous_standard_prompts() {
    let d = route_request(
        "can you plan what it would take to move us off the old queue?",
        None,
        RouteContext::default(),
        &cfg(),
    );
    assert_eq!(d.profile, Profile::Standard);
    assert!(d.should_run_classifier);
}

#[test]
fn thread_replies_are_never_fast() {
    let msg = IncomingMessage {
        chat_id: ChatId::new("discord:1"),
        message_id: "m1".into(),
        sender_id: "u1".into(),
        sender_name: "User".into(),
        content: "ok".into(),
        timestamp: "2026-01-01T00:00:00Z".into(),
        attachments: vec![],
        is_group: true,
        chat_type: ChatType::Group,
        thread_id: Some("t1".into()),
        raw_provider_data: None,
    };
    let d = route_request("ok", Some(&msg), RouteContext::default(), &cfg());
    assert_eq!(d.profile, Profile::Standard);
}

#[test]
fn classifier_counts_numbered_work_items() {
    let prompt = "please plan this out:\n1. fetch the repos\n2. index them\n3. build embeddings\n4. publish a report";
    assert_eq!(classify_long_form(prompt, &cfg()), Some(12));
}

#[test]
fn classifier_counts_bulleted_work_items() {
    let prompt = "- audit auth\n- audit billing\n- audit storage\n- audit deploys\n- write it up";
    assert_eq!(classify_long_form(prompt, &cfg()), Some(15));
}

#[test]
fn classifier_passes_on_single_step_requests() {
    assert_eq!(classify_long_form("what time is the standup?", &cfg()), None);
    assert_eq!(
        classify_long_form("fix the login bug and then tell me", &cfg()),
        None
    );
}

#[test]
fn huge_deep_prompts_get_a_larger_estimate() {
    let small = route_request(
        "rewrite the readme",
        None,
        RouteContext::default(),
        &cfg(),
    );
    assert_eq!(small.estimated_minutes, Some(8));

    let huge = "rewrite this section carefully. ".repeat(60);
    let big = route_request(&huge, None, RouteContext::default(), &cfg());
    assert_eq!(big.profile, Profile::Deep);
    assert_eq!(big.estimated_minutes, Some(24));
}

#[test]
fn routing_is_deterministic() {
    let a = route_request("audit the billing code", None, RouteContext::default(), &cfg());
    let b = route_request("audit the billing code", None, RouteContext::default(), &cfg());
    assert_eq!(a, b);
}
