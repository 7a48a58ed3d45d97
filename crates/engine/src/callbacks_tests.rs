// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[test]
fn put_take_roundtrip() {
    let store = CallbackStore::new(300_000);
    let token = store.put("approve deploy", 1_000);
    assert_eq!(store.take(&token, 2_000).as_deref(), Some("approve deploy"));
    // consumed
    assert!(store.take(&token, 2_000).is_none());
}

#[test]
fn expired_tokens_resolve_to_none() {
    let store = CallbackStore::new(300_000);
    let token = store.put("stale", 0);
    assert!(store.take(&token, 300_001).is_none());
}

#[test]
fn sweep_runs_even_when_empty() {
    let store = CallbackStore::new(300_000);
    store.sweep(0);
    store.sweep(1_000_000);
    assert!(store.is_empty());

    let _keep = store.put("fresh", 1_000_000);
    let _drop = store.put("old", 0);
    store.sweep(600_000);
    assert_eq!(store.len(), 1);
}

#[test]
fn tokens_are_unique() {
    let store = CallbackStore::new(300_000);
    let a = store.put("x", 0);
    let b = store.put("x", 0);
    assert_ne!(a, b);
}
