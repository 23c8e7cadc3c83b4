// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! The supervisor: registry plus the five shell operations the tool
//! surface exposes.
//!
//! Each started shell gets two tasks: the backend task pumping the pty,
//! and a reader task feeding captured bytes into the shell under its
//! lock and observing the exit. Handlers never hold a shell lock across
//! an await.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use bytes::Bytes;
use nix::sys::signal::Signal;
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::classify::Classifier;
use crate::config::Timings;
use crate::error::ToolError;
use crate::pty::{Backend, BackendInput, Boxed, ExitStatus, NativePty};
use crate::pty::spawn::SpawnSpec;
use crate::registry::{Registry, SharedShell};
use crate::scheduler;
use crate::shell::{
    Shell, ShellBrief, ShellSpec, Snapshot, StopSignal, DEFAULT_LOG_LINES,
};

/// Arguments for `start_shell`, already shape-validated by the dispatcher.
#[derive(Debug, Clone)]
pub struct StartRequest {
    pub label: String,
    pub command: String,
    pub args: Vec<String>,
    pub working_directory: PathBuf,
    pub verification_pattern: Option<String>,
    pub verification_timeout_ms: Option<u64>,
    pub notable_pattern: Option<String>,
    pub env: Vec<(String, String)>,
}

pub struct Supervisor {
    registry: Arc<Registry>,
    timings: Timings,
    max_log_lines: usize,
    cols: u16,
    rows: u16,
}

impl Supervisor {
    pub fn new(timings: Timings, max_log_lines: usize, cols: u16, rows: u16) -> Self {
        Self {
            registry: Arc::new(Registry::new()),
            timings,
            max_log_lines,
            cols,
            rows,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn timings(&self) -> &Timings {
        &self.timings
    }

    /// Register and launch a new shell. A pty that cannot be spawned still
    /// yields a successful, label-addressable record in `crashed` state.
    pub fn start_shell(&self, request: StartRequest) -> Result<Snapshot, ToolError> {
        if request.label.is_empty() {
            return Err(ToolError::bad_arguments("label must not be empty"));
        }
        if request.command.is_empty() {
            return Err(ToolError::bad_arguments("command must not be empty"));
        }

        let classifier = Classifier::new(
            request.verification_pattern.as_deref(),
            request.notable_pattern.as_deref(),
        )
        .map_err(|e| ToolError::bad_arguments(format!("invalid pattern: {e}")))?;

        let verification_timeout = request
            .verification_timeout_ms
            .map(Duration::from_millis)
            .unwrap_or(self.timings.verify_timeout);

        let spec = ShellSpec {
            label: request.label.clone(),
            command: request.command.clone(),
            args: request.args.clone(),
            cwd: request.working_directory.clone(),
            verification_timeout,
        };
        let shell: SharedShell = Arc::new(Mutex::new(Shell::new(
            spec,
            classifier,
            self.timings,
            self.max_log_lines,
            Instant::now(),
        )));

        // Reserves the label; exactly one of two racing starts wins.
        self.registry.insert(Arc::clone(&shell))?;

        let spawn_spec = SpawnSpec {
            command: request.command,
            args: request.args,
            cwd: request.working_directory,
            env: request.env,
            cols: self.cols,
            rows: self.rows,
        };
        match NativePty::spawn(&spawn_spec) {
            Ok(pty) => {
                info!(label = %request.label, pid = ?pty.child_pid(), "shell started");
                self.adopt_backend(&shell, pty.boxed());
            }
            Err(e) => {
                warn!(label = %request.label, error = %e, "shell spawn failed");
                shell.lock().mark_spawn_failed(&format!("{e:#}"), Instant::now());
            }
        }

        let peek = shell.lock().peek();
        Ok(peek)
    }

    /// Wire a backend into a registered shell: record the pid, pump its
    /// output into the buffer, and observe the exit. Public so tests can
    /// run fake backends.
    pub fn adopt_backend(&self, shell: &SharedShell, mut backend: Box<dyn Backend>) {
        let (output_tx, mut output_rx) = mpsc::channel::<Bytes>(256);
        let (input_tx, input_rx) = mpsc::channel::<BackendInput>(64);

        // Set the initial terminal size before the pump starts.
        let _ = backend.resize(self.cols, self.rows);

        let pid = backend.child_pid();
        shell.lock().mark_spawned(pid, input_tx, Instant::now());

        let backend_handle =
            tokio::spawn(async move { backend.run(output_tx, input_rx).await });

        let reader_shell = Arc::clone(shell);
        tokio::spawn(async move {
            while let Some(bytes) = output_rx.recv().await {
                reader_shell.lock().on_output(&bytes, Instant::now());
            }
            let status = match backend_handle.await {
                Ok(Ok(status)) => status,
                Ok(Err(e)) => {
                    warn!(error = %e, "backend error");
                    ExitStatus { code: Some(1), signal: None }
                }
                Err(e) => {
                    warn!(error = %e, "backend task panicked");
                    ExitStatus { code: Some(1), signal: None }
                }
            };
            reader_shell.lock().on_exit(status, Instant::now());
        });
    }

    /// Poll one shell, consuming everything accumulated since the last
    /// poll.
    pub fn check_shell(
        &self,
        label: &str,
        log_lines: Option<usize>,
    ) -> Result<Snapshot, ToolError> {
        let shell = self.registry.get(label)?;
        let snapshot = shell.lock().check(log_lines.unwrap_or(DEFAULT_LOG_LINES));
        Ok(snapshot)
    }

    /// Write keystrokes to the shell, wait for the output they trigger to
    /// settle, and return a poll that includes those lines.
    pub async fn send_input(
        &self,
        label: &str,
        input: &str,
        append_newline: bool,
    ) -> Result<Snapshot, ToolError> {
        let shell = self.registry.get(label)?;
        let (sender, pre_total) = {
            let guard = shell.lock();
            if !guard.state().accepts_input() {
                return Err(ToolError::wrong_state(label, guard.state().as_str()));
            }
            let sender = guard
                .input_sender()
                .ok_or_else(|| ToolError::pty_closed(label))?;
            (sender, guard.total_captured())
        };

        let mut bytes = input.as_bytes().to_vec();
        if append_newline {
            bytes.push(b'\n');
        }
        if sender.send(BackendInput::Write(Bytes::from(bytes))).await.is_err() {
            shell.lock().mark_pty_closed(Instant::now());
            return Err(ToolError::pty_closed(label));
        }

        // Drain marker: once answered, the write has reached the pty and
        // the settle clock measures the child, not our queue.
        let (ack_tx, ack_rx) = oneshot::channel();
        if sender.send(BackendInput::Drain(ack_tx)).await.is_ok() {
            let _ = tokio::time::timeout(self.timings.input_settle, ack_rx).await;
        }

        self.wait_settle(&shell, pre_total).await;

        let snapshot = shell.lock().check_delivering(DEFAULT_LOG_LINES);
        Ok(snapshot)
    }

    /// Wait until at least one new line has arrived and the pty has gone
    /// quiet, bounded by the configured settle budget.
    async fn wait_settle(&self, shell: &SharedShell, pre_total: u64) {
        let settle = self.timings.quiet_window.min(Duration::from_millis(200));
        let deadline = Instant::now() + self.timings.input_settle;
        loop {
            tokio::time::sleep(Duration::from_millis(25)).await;
            let now = Instant::now();
            let (total, quiet, terminal) = {
                let guard = shell.lock();
                (
                    guard.total_captured(),
                    guard.quiet_for(now),
                    guard.state().is_terminal(),
                )
            };
            if terminal {
                break;
            }
            if total > pre_total && quiet >= settle {
                break;
            }
            if now >= deadline {
                break;
            }
        }
    }

    /// Signal a shell to stop. Idempotent: terminal shells just report
    /// their snapshot again.
    pub fn stop_shell(&self, label: &str, force: bool) -> Result<Snapshot, ToolError> {
        let shell = self.registry.get(label)?;
        let (signal, pid) = {
            let mut guard = shell.lock();
            let signal = guard.request_stop(force, Instant::now());
            (signal, guard.pid())
        };
        if let (Some(signal), Some(pid)) = (signal, pid) {
            let sig = match signal {
                StopSignal::Interrupt => Signal::SIGINT,
                StopSignal::Kill => Signal::SIGKILL,
            };
            debug!(label, pid, signal = ?sig, "stopping shell");
            if let Err(e) = scheduler::kill_group(pid, sig) {
                shell
                    .lock()
                    .mark_failed(&format!("cannot signal pid {pid}: {e}"), Instant::now());
            }
        }
        let snapshot = shell.lock().peek();
        Ok(snapshot)
    }

    /// Minimal rows for every registered shell.
    pub fn list_shells(&self) -> Vec<ShellBrief> {
        self.registry.list().iter().map(|shell| shell.lock().brief()).collect()
    }

    /// Force-stop everything and wait briefly for the exits. Called once
    /// at supervisor shutdown.
    pub async fn shutdown(&self) {
        let shells = self.registry.list();
        for shell in &shells {
            let (signal, pid, label) = {
                let mut guard = shell.lock();
                let signal = guard.request_stop(true, Instant::now());
                (signal, guard.pid(), guard.label.clone())
            };
            if let (Some(_), Some(pid)) = (signal, pid) {
                if let Err(e) = scheduler::kill_group(pid, Signal::SIGKILL) {
                    warn!(label = %label, pid, error = %e, "shutdown kill failed");
                }
            }
        }

        let deadline = Instant::now() + self.timings.kill + Duration::from_millis(500);
        loop {
            let all_done = self
                .registry
                .list()
                .iter()
                .all(|shell| shell.lock().state().is_terminal());
            if all_done || Instant::now() >= deadline {
                break;
            }
            tokio::time::sleep(Duration::from_millis(25)).await;
        }

        for label in self.registry.labels() {
            self.registry.remove(&label);
        }
        debug!("supervisor shut down");
    }
}

#[cfg(test)]
#[path = "supervisor_tests.rs"]
mod tests;
