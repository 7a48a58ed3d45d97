// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

crate::define_id! {
    /// Test-only ID type.
    pub struct TestId;
}

#[test]
fn display_matches_inner_string() {
    let id = TestId::new("abc-123");
    assert_eq!(id.to_string(), "abc-123");
    assert_eq!(id.as_str(), "abc-123");
}

#[test]
fn short_truncates_long_ids() {
    let id = TestId::new("abcdefghij");
    assert_eq!(id.short(4), "abcd");
    assert_eq!(id.short(20), "abcdefghij");
}

#[test]
fn eq_against_str() {
    let id = TestId::new("x");
    assert_eq!(id, *"x");
    assert_eq!(id, "x");
}

#[test]
fn uuid_gen_produces_unique_ids() {
    let gen = UuidIdGen;
    assert_ne!(gen.next(), gen.next());
}

#[test]
fn seq_gen_is_deterministic() {
    let gen = SeqIdGen::new("job");
    assert_eq!(gen.next(), "job-1");
    assert_eq!(gen.next(), "job-2");
    let clone = gen.clone();
    assert_eq!(clone.next(), "job-3");
}
