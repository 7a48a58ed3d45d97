// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use super::*;
use crate::agent::AgentRunSpec;
use dotclaw_core::GroupFolder;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;

fn write_script(dir: &Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("agent.sh");
    std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
    let mut perms = std::fs::metadata(&path).unwrap().permissions();
    perms.set_mode(0o755);
    std::fs::set_permissions(&path, perms).unwrap();
    path
}

fn spec(prompt: &str) -> AgentRunSpec {
    AgentRunSpec::new("run-1", GroupFolder::main(), prompt)
}

#[tokio::test]
async fn runs_command_and_parses_last_json_line() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(
        dir.path(),
        r#"cat >/dev/null
echo "log noise"
echo '{"status":"ok","result":"from child","new_session_id":"sess-9"}'"#,
    );
    let runner = ProcessAgentRunner::new(script);
    let result = runner.execute(spec("hello")).await.unwrap();
    assert_eq!(result.output.result.as_deref(), Some("from child"));
    assert_eq!(result.output.new_session_id.as_deref(), Some("sess-9"));
}

#[tokio::test]
async fn times_out_slow_child() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "cat >/dev/null\nsleep 30");
    let runner = ProcessAgentRunner::new(script);
    let mut s = spec("slow");
    s.timeout_ms = 50;
    let err = runner.execute(s).await.unwrap_err();
    assert!(err.is_timeout());
}

#[tokio::test]
async fn cancel_kills_child() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "cat >/dev/null\nsleep 30");
    let runner = ProcessAgentRunner::new(script);
    let mut s = spec("doomed");
    s.timeout_ms = 60_000;
    let cancel = s.cancel.clone();
    let handle = tokio::spawn(async move { runner.execute(s).await });
    tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    cancel.cancel();
    let err = handle.await.unwrap().unwrap_err();
    assert!(err.is_canceled());
}

#[tokio::test]
async fn garbage_output_is_bad_output() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "cat >/dev/null\necho 'not json'");
    let runner = ProcessAgentRunner::new(script);
    let err = runner.execute(spec("x")).await.unwrap_err();
    assert!(matches!(err, AgentExecutionError::BadOutput(_)));
}

#[test]
fn preflight_checks_existence() {
    let dir = tempfile::tempdir().unwrap();
    let script = write_script(dir.path(), "true");
    assert!(ProcessAgentRunner::new(&script).preflight().is_ok());
    assert!(ProcessAgentRunner::new(dir.path().join("missing.sh"))
        .preflight()
        .is_err());
}
