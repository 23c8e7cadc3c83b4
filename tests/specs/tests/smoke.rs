// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! End-to-end smoke tests that spawn the real `drover` binary and drive
//! it over stdio JSON-RPC. All processes run in fast mode so the
//! verification, settle, and stop waits are sub-second.

use std::time::Duration;

use serde_json::{json, Value};

use drover_specs::{snapshot_of, DroverProcess};

fn sh(label: &str, script: &str) -> Value {
    json!({
        "command": "sh",
        "args": ["-c", script],
        "workingDirectory": std::env::temp_dir(),
        "label": label,
    })
}

// -- protocol ---------------------------------------------------------------

#[tokio::test]
async fn handshake_lists_the_tool_surface() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;

    let response = drover.request("tools/list", json!({})).await?;
    let names: Vec<&str> = response["result"]["tools"]
        .as_array()
        .map(|tools| tools.iter().filter_map(|t| t["name"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(
        names,
        vec!["start_shell", "check_shell", "send_input", "stop_shell", "list_shells"]
    );

    let pong = drover.request("ping", json!({})).await?;
    assert_eq!(pong["result"], json!({}));

    drover.shutdown().await
}

#[tokio::test]
async fn unknown_method_is_a_transport_error() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;
    let response = drover.request("shells/stream", json!({})).await?;
    assert_eq!(response["error"]["code"], -32601);
    drover.shutdown().await
}

// -- lifecycle --------------------------------------------------------------

#[tokio::test]
async fn verification_then_quiet_finish() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;

    let mut args = sh("server", "echo Start; sleep 1");
    args["verification_pattern"] = json!("Start");
    let snap = drover.call_snapshot("start_shell", args).await?;
    assert_eq!(snap["label"], "server");
    assert!(snap["status"] == "verifying" || snap["status"] == "running");

    // The poll that observes the verification carries the matched output.
    let snap = drover
        .poll_until("server", |s| {
            s["message"].as_str().unwrap_or_default().starts_with("verification matched")
        })
        .await?;
    assert_eq!(snap["status"], "running");
    assert!(snap["logs"].as_array().is_some_and(|logs| {
        logs.iter().any(|l| l.as_str().unwrap_or_default().contains("Start"))
    }));

    // A clean finish with nothing notable in between is a quiet poll.
    let snap = drover.poll_until("server", |s| s["status"] == "stopped").await?;
    assert_eq!(snap["message"], "no notable events");
    assert_eq!(snap["logs"], json!([]));
    assert_eq!(snap["exit_code"], 0);

    drover.shutdown().await
}

#[tokio::test]
async fn consecutive_quiet_polls_return_the_sentinel() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;
    drover.call_snapshot("start_shell", sh("idle", "sleep 5")).await?;

    drover.call_snapshot("check_shell", json!({ "label": "idle" })).await?;
    let snap = drover.call_snapshot("check_shell", json!({ "label": "idle" })).await?;
    assert_eq!(snap["message"], "no notable events");
    assert_eq!(snap["logs"], json!([]));

    drover.call_snapshot("stop_shell", json!({ "label": "idle", "force": true })).await?;
    drover.shutdown().await
}

#[tokio::test]
async fn bounded_buffer_keeps_the_newest_lines() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start_with(&[("MCP_MAX_LOG_LINES", "50")]).await?;

    let mut args = sh("floody", "for i in $(seq 0 119); do echo log-$i; done");
    args["notable_pattern"] = json!("log-");
    drover.call_snapshot("start_shell", args).await?;

    tokio::time::sleep(Duration::from_secs(2)).await;

    let snap = drover
        .call_snapshot("check_shell", json!({ "label": "floody", "log_lines": 200 }))
        .await?;
    assert_eq!(snap["status"], "stopped");
    let logs = snap["logs"].as_array().cloned().unwrap_or_default();
    assert_eq!(logs.len(), 50);
    assert!(logs[0].as_str().unwrap_or_default().contains("log-70"));
    assert!(logs[49].as_str().unwrap_or_default().contains("log-119"));

    drover.shutdown().await
}

#[tokio::test]
async fn duplicate_label_start_fails_cleanly() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;
    drover.call_snapshot("start_shell", sh("dup", "sleep 5")).await?;

    let envelope = drover.call_tool("start_shell", sh("dup", "sleep 5")).await?;
    assert_eq!(envelope["isError"], json!(true));
    let body = snapshot_of(&envelope)?;
    assert_eq!(body["error"], "DUPLICATE_LABEL");

    // The original shell is untouched.
    let snap = drover.call_snapshot("check_shell", json!({ "label": "dup" })).await?;
    assert_eq!(snap["status"], "running");

    drover.call_snapshot("stop_shell", json!({ "label": "dup", "force": true })).await?;
    drover.shutdown().await
}

// -- notable events ---------------------------------------------------------

#[tokio::test]
async fn notable_events_are_summarized_on_the_next_poll() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;

    let script = r#"echo "Process Started"; sleep 0.7; \
echo "Major Error Occurred! Code: 500"; \
echo "Minor Warning: config outdated"; \
echo "Found resource at http://localhost:8080/data"; \
echo "Enter password:"; sleep 0.4; \
echo "Process finished""#;
    drover.call_snapshot("start_shell", sh("noisy", script)).await?;

    // First poll lands before anything notable happened.
    let snap = drover.call_snapshot("check_shell", json!({ "label": "noisy" })).await?;
    assert_eq!(snap["message"], "no notable events");

    tokio::time::sleep(Duration::from_millis(2500)).await;

    let snap = drover.call_snapshot("check_shell", json!({ "label": "noisy" })).await?;
    assert_eq!(snap["status"], "stopped");
    let message = snap["message"].as_str().unwrap_or_default();
    assert!(message.contains("error(s)"), "{message}");
    assert!(message.contains("warning(s)"), "{message}");
    assert!(message.contains("url(s)"), "{message}");
    assert!(message.contains("prompt(s)"), "{message}");

    drover.shutdown().await
}

#[tokio::test]
async fn send_input_returns_the_output_it_triggered() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;

    let script = r#"echo "Initial log"; read line; \
echo "Error after input"; echo "URL: http://localhost:1234/after"; sleep 0.3"#;
    drover.call_snapshot("start_shell", sh("interactive", script)).await?;

    let snap = drover.call_snapshot("check_shell", json!({ "label": "interactive" })).await?;
    assert_eq!(snap["message"], "no notable events");

    let snap = drover
        .call_snapshot("send_input", json!({ "label": "interactive", "input": "trigger" }))
        .await?;
    let logs: Vec<&str> = snap["logs"]
        .as_array()
        .map(|l| l.iter().filter_map(Value::as_str).collect())
        .unwrap_or_default();
    assert!(logs.iter().any(|l| l.contains("Error after input")), "{logs:?}");
    assert!(
        logs.iter().any(|l| l.contains("http://localhost:1234/after")),
        "{logs:?}"
    );

    drover.shutdown().await
}

#[tokio::test]
async fn send_input_to_a_stopped_shell_is_wrong_state() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;
    drover.call_snapshot("start_shell", sh("gone", "true")).await?;
    drover.poll_until("gone", |s| s["status"] == "stopped").await?;

    let envelope = drover
        .call_tool("send_input", json!({ "label": "gone", "input": "hello" }))
        .await?;
    assert_eq!(envelope["isError"], json!(true));
    assert_eq!(snapshot_of(&envelope)?["error"], "WRONG_STATE");

    drover.shutdown().await
}

// -- stopping ---------------------------------------------------------------

#[tokio::test]
async fn sigint_immune_shell_is_escalated_to_sigkill() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;

    let script = "trap '' INT TERM; while :; do sleep 0.1; done";
    drover.call_snapshot("start_shell", sh("stubborn", script)).await?;

    let snap = drover
        .call_snapshot("stop_shell", json!({ "label": "stubborn" }))
        .await?;
    assert_eq!(snap["status"], "stopping");

    let snap = drover.poll_until("stubborn", |s| s["status"] == "stopped").await?;
    let killed = snap["exit_signal"] == 9;
    let reaped = snap["exit_signal"].is_null() && snap["exit_code"].is_null();
    assert!(killed || reaped, "unexpected terminal snapshot: {snap}");

    // Stopping a terminal shell is idempotent.
    let first = drover.call_snapshot("stop_shell", json!({ "label": "stubborn" })).await?;
    let second = drover.call_snapshot("stop_shell", json!({ "label": "stubborn" })).await?;
    assert_eq!(first["status"], "stopped");
    assert_eq!(first["status"], second["status"]);
    assert_eq!(first["exit_code"], second["exit_code"]);
    assert_eq!(first["exit_signal"], second["exit_signal"]);
    assert_eq!(first["message"], second["message"]);

    drover.shutdown().await
}

#[tokio::test]
async fn unknown_label_reports_not_found() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;
    let envelope = drover.call_tool("check_shell", json!({ "label": "nobody" })).await?;
    assert_eq!(envelope["isError"], json!(true));
    assert_eq!(snapshot_of(&envelope)?["error"], "NOT_FOUND");
    drover.shutdown().await
}

#[tokio::test]
async fn spawn_failure_yields_an_addressable_crashed_shell() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;

    let snap = drover
        .call_snapshot(
            "start_shell",
            json!({
                "command": "/nonexistent/not-a-real-binary",
                "workingDirectory": std::env::temp_dir(),
                "label": "broken",
            }),
        )
        .await?;
    assert_eq!(snap["label"], "broken");

    let snap = drover.poll_until("broken", |s| s["status"] == "crashed").await?;
    assert!(snap["message"].as_str().unwrap_or_default().starts_with("shell crashed"));

    drover.shutdown().await
}

#[tokio::test]
async fn list_shells_tracks_every_label() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;
    drover.call_snapshot("start_shell", sh("alpha", "sleep 5")).await?;
    drover.call_snapshot("start_shell", sh("beta", "sleep 5")).await?;

    let listed = drover.call_snapshot("list_shells", json!({})).await?;
    let labels: Vec<&str> = listed
        .as_array()
        .map(|rows| rows.iter().filter_map(|r| r["label"].as_str()).collect())
        .unwrap_or_default();
    assert_eq!(labels, vec!["alpha", "beta"]);

    for label in ["alpha", "beta"] {
        drover
            .call_snapshot("stop_shell", json!({ "label": label, "force": true }))
            .await?;
    }
    drover.shutdown().await
}

#[tokio::test]
async fn shutdown_terminates_running_shells() -> anyhow::Result<()> {
    let mut drover = DroverProcess::start().await?;
    drover.call_snapshot("start_shell", sh("survivor", "sleep 60")).await?;
    // Closing stdin must not hang on the still-running shell.
    drover.shutdown().await
}
