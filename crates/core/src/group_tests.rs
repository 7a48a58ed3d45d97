// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    simple = { "research" },
    with_digits = { "team42" },
    with_dash = { "ops-eu" },
    with_underscore = { "dev_tools" },
    single_char = { "a" },
    digit_first = { "9lives" },
)]
fn accepts_safe_slugs(s: &str) {
    assert_eq!(GroupFolder::parse(s).unwrap().as_str(), s);
}

#[yare::parameterized(
    empty = { "" },
    uppercase = { "Research" },
    leading_dash = { "-bad" },
    leading_underscore = { "_bad" },
    dotdot = { ".." },
    embedded_dotdot = { "a..b" },
    absolute = { "/etc" },
    space = { "two words" },
    slash = { "a/b" },
)]
fn rejects_unsafe_slugs(s: &str) {
    assert!(GroupFolder::parse(s).is_err());
}

#[test]
fn main_folder_is_fixed() {
    let main = GroupFolder::main();
    assert!(main.is_main());
    assert_eq!(main.as_str(), MAIN_GROUP_FOLDER);
    assert!(!GroupFolder::parse("other").unwrap().is_main());
}

#[test]
fn deserialization_validates() {
    let ok: Result<GroupFolder, _> = serde_json::from_str("\"good-slug\"");
    assert!(ok.is_ok());
    let bad: Result<GroupFolder, _> = serde_json::from_str("\"../escape\"");
    assert!(bad.is_err());
}
