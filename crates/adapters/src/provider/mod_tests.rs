// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;

#[yare::parameterized(
    too_many_requests = { Some(429), "Too Many Requests", true },
    server_error = { Some(500), "Internal Server Error", true },
    bad_gateway = { Some(502), "Bad Gateway", true },
    bad_request = { Some(400), "Bad Request", false },
    forbidden = { Some(403), "Forbidden", false },
    reset_no_code = { None, "connection reset by peer", true },
    timeout_no_code = { None, "operation timed out", true },
    dns_no_code = { None, "dns error: name not known", true },
    other_no_code = { None, "chat not found", false },
)]
fn transport_retryability(code: Option<u16>, message: &str, retryable: bool) {
    let err = ProviderError::transport("telegram", code, message);
    assert_eq!(err.is_retryable(), retryable, "{message}");
}

#[test]
fn rate_limited_carries_retry_hint() {
    let err = ProviderError::RateLimited {
        provider: "telegram".into(),
        retry_after_ms: Some(2_000),
    };
    assert!(err.is_retryable());
    assert_eq!(err.retry_after_ms(), Some(2_000));

    let other = ProviderError::transport("telegram", Some(500), "boom");
    assert_eq!(other.retry_after_ms(), None);
}

#[test]
fn rejected_is_terminal() {
    let err = ProviderError::Rejected {
        provider: "discord".into(),
        message: "unknown channel".into(),
    };
    assert!(!err.is_retryable());
}
