// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Test harness for end-to-end binary smoke tests.
//!
//! Spawns the real `drover` binary as a subprocess and drives it over
//! its stdio JSON-RPC transport. Build the workspace before running
//! these tests so the binary exists in `target/debug`.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use anyhow::Context;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::process::{Child, ChildStdin, ChildStdout, Command};

/// Per-request timeout; generous so slow CI machines do not flake.
pub const TIMEOUT: Duration = Duration::from_secs(10);

/// Resolve the path to the compiled `drover` binary.
pub fn drover_binary() -> PathBuf {
    let manifest = Path::new(env!("CARGO_MANIFEST_DIR"));
    // tests/specs → tests → workspace root
    let workspace = manifest.parent().and_then(|p| p.parent()).unwrap_or(manifest);
    workspace.join("target").join("debug").join("drover")
}

/// A running `drover` process driven over stdio. Killed on drop.
pub struct DroverProcess {
    child: Child,
    stdin: ChildStdin,
    stdout: Lines<BufReader<ChildStdout>>,
    next_id: i64,
}

impl DroverProcess {
    /// Spawn in fast mode and complete the initialize handshake.
    pub async fn start() -> anyhow::Result<Self> {
        Self::start_with(&[]).await
    }

    /// Spawn with extra environment variables, wait for the ready
    /// marker, and initialize.
    pub async fn start_with(envs: &[(&str, &str)]) -> anyhow::Result<Self> {
        let binary = drover_binary();
        anyhow::ensure!(
            binary.exists(),
            "drover binary not found at {} (run cargo build first)",
            binary.display()
        );

        let mut command = Command::new(&binary);
        command
            .env("MCP_PM_FAST", "1")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        for (key, value) in envs {
            command.env(key, value);
        }

        let mut child = command.spawn().context("spawn drover")?;
        let stdin = child.stdin.take().context("no stdin pipe")?;
        let stdout = child.stdout.take().context("no stdout pipe")?;
        let mut process = Self {
            child,
            stdin,
            stdout: BufReader::new(stdout).lines(),
            next_id: 0,
        };

        let ready = process.read_line().await?;
        anyhow::ensure!(
            ready["method"].as_str().unwrap_or_default().contains("ready"),
            "expected ready marker, got: {ready}"
        );

        let init = process.request("initialize", json!({})).await?;
        anyhow::ensure!(
            init["result"]["serverInfo"]["name"] == drover::rpc::SERVER_NAME,
            "unexpected initialize response: {init}"
        );
        process.notify("notifications/initialized").await?;

        Ok(process)
    }

    /// Send a request and read its response.
    pub async fn request(&mut self, method: &str, params: Value) -> anyhow::Result<Value> {
        self.next_id += 1;
        let id = self.next_id;
        self.write_line(&json!({
            "jsonrpc": "2.0",
            "id": id,
            "method": method,
            "params": params,
        }))
        .await?;
        let response = self.read_line().await?;
        anyhow::ensure!(response["id"] == id, "response out of order: {response}");
        Ok(response)
    }

    /// Send a notification (no response expected).
    pub async fn notify(&mut self, method: &str) -> anyhow::Result<()> {
        self.write_line(&json!({ "jsonrpc": "2.0", "method": method })).await
    }

    /// Call a tool and return the MCP result envelope.
    pub async fn call_tool(&mut self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        let response = self
            .request("tools/call", json!({ "name": name, "arguments": arguments }))
            .await?;
        anyhow::ensure!(
            response.get("error").is_none(),
            "transport error from {name}: {response}"
        );
        Ok(response["result"].clone())
    }

    /// Call a tool and decode the JSON body of its text payload.
    pub async fn call_snapshot(&mut self, name: &str, arguments: Value) -> anyhow::Result<Value> {
        let envelope = self.call_tool(name, arguments).await?;
        anyhow::ensure!(
            envelope.get("isError").is_none(),
            "{name} reported isError: {envelope}"
        );
        snapshot_of(&envelope)
    }

    /// Poll `check_shell` until the predicate holds or the timeout hits.
    /// Returns the snapshot that satisfied it.
    pub async fn poll_until(
        &mut self,
        label: &str,
        mut predicate: impl FnMut(&Value) -> bool,
    ) -> anyhow::Result<Value> {
        let deadline = tokio::time::Instant::now() + TIMEOUT;
        loop {
            let snapshot = self
                .call_snapshot("check_shell", json!({ "label": label }))
                .await?;
            if predicate(&snapshot) {
                return Ok(snapshot);
            }
            anyhow::ensure!(
                tokio::time::Instant::now() < deadline,
                "condition never held; last snapshot: {snapshot}"
            );
            tokio::time::sleep(Duration::from_millis(100)).await;
        }
    }

    /// Close stdin and wait for a clean exit.
    pub async fn shutdown(mut self) -> anyhow::Result<()> {
        drop(self.stdin);
        let status = tokio::time::timeout(TIMEOUT, self.child.wait())
            .await
            .context("drover did not exit after stdin close")??;
        anyhow::ensure!(status.success(), "drover exited with {status}");
        Ok(())
    }

    async fn write_line(&mut self, value: &Value) -> anyhow::Result<()> {
        let mut line = value.to_string();
        line.push('\n');
        self.stdin.write_all(line.as_bytes()).await?;
        self.stdin.flush().await?;
        Ok(())
    }

    async fn read_line(&mut self) -> anyhow::Result<Value> {
        let line = tokio::time::timeout(TIMEOUT, self.stdout.next_line())
            .await
            .context("timed out waiting for a response line")??
            .context("drover closed stdout")?;
        Ok(serde_json::from_str(&line)?)
    }
}

/// Decode the JSON body from a tool result envelope.
pub fn snapshot_of(envelope: &Value) -> anyhow::Result<Value> {
    let text = envelope["content"][0]["text"]
        .as_str()
        .context("envelope has no text payload")?;
    Ok(serde_json::from_str(text)?)
}
