// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Per-shell state machine: lifecycle, captured output, notable-event
//! accounting, and timer deadlines.
//!
//! All mutation happens under the owning mutex, from exactly three
//! sources: the PTY reader task (`on_output`, `on_exit`), the scheduler
//! (`tick`), and tool handlers. Time-driven checks take an explicit `now`
//! and signal delivery is returned as actions, so every transition is
//! testable without a pty.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

use crate::buffer::LineBuffer;
use crate::classify::{Classifier, EventKind, NotableCounts, VERIFY_TAIL_LINES};
use crate::config::Timings;
use crate::pty::{BackendInput, ExitStatus};
use crate::summary::{self, SummaryInput, TransitionNotes};

/// Log lines returned by a poll when the caller does not say otherwise.
pub const DEFAULT_LOG_LINES: usize = 50;

/// Lifecycle states. `Stopped` and `Crashed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellState {
    Starting,
    Verifying,
    Active,
    Stopping,
    Stopped,
    Crashed,
}

impl ShellState {
    /// Wire status string. `Active` reports as `running`.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Starting => "starting",
            Self::Verifying => "verifying",
            Self::Active => "running",
            Self::Stopping => "stopping",
            Self::Stopped => "stopped",
            Self::Crashed => "crashed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Stopped | Self::Crashed)
    }

    pub fn accepts_input(&self) -> bool {
        matches!(self, Self::Verifying | Self::Active)
    }
}

/// Status snapshot returned by every tool call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub label: String,
    pub status: String,
    pub pid: Option<i32>,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub message: String,
    pub logs: Vec<String>,
}

/// Minimal row for `list_shells`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShellBrief {
    pub label: String,
    pub status: String,
    pub pid: Option<i32>,
}

/// Signal the supervisor must deliver after a stop request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopSignal {
    /// SIGINT to the process group.
    Interrupt,
    /// SIGKILL to the process group.
    Kill,
}

/// Side effects owed after a tick. The scheduler performs them outside
/// the shell lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TickAction {
    /// Stop grace elapsed: SIGKILL the process group.
    Kill { pid: i32 },
}

/// Launch parameters fixed at `start_shell` time.
#[derive(Debug, Clone)]
pub struct ShellSpec {
    pub label: String,
    pub command: String,
    pub args: Vec<String>,
    pub cwd: PathBuf,
    pub verification_timeout: Duration,
}

pub struct Shell {
    pub label: String,
    command: String,
    args: Vec<String>,
    cwd: PathBuf,
    state: ShellState,
    pid: Option<i32>,
    exit_code: Option<i32>,
    exit_signal: Option<i32>,
    buffer: LineBuffer,
    classifier: Classifier,
    counts: NotableCounts,
    notes: TransitionNotes,
    /// Global line index up to which the caller has already polled.
    poll_cursor: u64,
    timings: Timings,
    verification_timeout: Duration,
    verify_deadline: Option<Instant>,
    last_output_at: Instant,
    /// A `:`/`?` tail waiting for its quiet window before counting as a
    /// prompt.
    pending_prompt: Option<(String, Instant)>,
    started_at: Instant,
    updated_at: Instant,
    stop_requested_at: Option<Instant>,
    grace_deadline: Option<Instant>,
    kill_deadline: Option<Instant>,
    input_tx: Option<mpsc::Sender<BackendInput>>,
}

impl Shell {
    pub fn new(
        spec: ShellSpec,
        classifier: Classifier,
        timings: Timings,
        max_log_lines: usize,
        now: Instant,
    ) -> Self {
        Self {
            label: spec.label,
            command: spec.command,
            args: spec.args,
            cwd: spec.cwd,
            state: ShellState::Starting,
            pid: None,
            exit_code: None,
            exit_signal: None,
            buffer: LineBuffer::new(max_log_lines),
            classifier,
            counts: NotableCounts::default(),
            notes: TransitionNotes::default(),
            poll_cursor: 0,
            timings,
            verification_timeout: spec.verification_timeout,
            verify_deadline: None,
            last_output_at: now,
            pending_prompt: None,
            started_at: now,
            updated_at: now,
            stop_requested_at: None,
            grace_deadline: None,
            kill_deadline: None,
            input_tx: None,
        }
    }

    pub fn state(&self) -> ShellState {
        self.state
    }

    pub fn pid(&self) -> Option<i32> {
        self.pid
    }

    pub fn command(&self) -> &str {
        &self.command
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn cwd(&self) -> &PathBuf {
        &self.cwd
    }

    pub fn started_at(&self) -> Instant {
        self.started_at
    }

    pub fn updated_at(&self) -> Instant {
        self.updated_at
    }

    pub fn input_sender(&self) -> Option<mpsc::Sender<BackendInput>> {
        self.input_tx.clone()
    }

    /// Total lines ever captured, for settle detection across polls.
    pub fn total_captured(&self) -> u64 {
        self.buffer.total_appended()
    }

    /// How long the pty has been quiet.
    pub fn quiet_for(&self, now: Instant) -> Duration {
        now.saturating_duration_since(self.last_output_at)
    }

    // -- transitions driven by the supervisor ------------------------------

    /// The pty spawned: record the pid and enter `verifying` (pattern
    /// supplied) or go straight to `active`.
    pub fn mark_spawned(
        &mut self,
        pid: Option<i32>,
        input_tx: mpsc::Sender<BackendInput>,
        now: Instant,
    ) {
        self.pid = pid;
        self.input_tx = Some(input_tx);
        // A stop can arrive while the spawn is still in flight; record the
        // pid but keep the stopping state so escalation can find it.
        if self.state == ShellState::Starting {
            if self.classifier.has_verification() {
                self.state = ShellState::Verifying;
                self.verify_deadline = Some(now + self.verification_timeout);
            } else {
                self.state = ShellState::Active;
            }
        }
        self.updated_at = now;
        debug!(label = %self.label, pid = ?pid, status = self.state.as_str(), "shell spawned");
    }

    /// The pty could not be allocated or the fork failed: terminal crash
    /// with a synthesized diagnostic so the record stays addressable.
    pub fn mark_spawn_failed(&mut self, error: &str, now: Instant) {
        let line = format!("Error: failed to spawn {}: {error}", self.command);
        self.crash_with_line(&line, now);
    }

    /// A write failed because the pty is gone.
    pub fn mark_pty_closed(&mut self, now: Instant) {
        if self.state.is_terminal() {
            return;
        }
        self.crash_with_line("Error: pty closed unexpectedly", now);
    }

    /// Supervisor-side failure while driving this shell. Other shells are
    /// unaffected.
    pub fn mark_failed(&mut self, detail: &str, now: Instant) {
        if self.state.is_terminal() {
            return;
        }
        let line = format!("Error: {detail}");
        self.crash_with_line(&line, now);
    }

    fn crash_with_line(&mut self, line: &str, now: Instant) {
        self.record_line(line);
        self.state = ShellState::Crashed;
        self.notes.crashed = true;
        self.pid = None;
        self.input_tx = None;
        self.clear_deadlines();
        self.updated_at = now;
    }

    // -- transitions driven by the pty reader ------------------------------

    /// Capture a chunk of pty output: buffer, classify, track settle, and
    /// advance verification.
    pub fn on_output(&mut self, data: &[u8], now: Instant) {
        let completed = self.buffer.extend_from_bytes(data);
        for line in &completed {
            for kind in self.classifier.kinds(line) {
                self.counts.record(kind, line);
            }
        }

        if self.state == ShellState::Verifying {
            let matched = completed.iter().any(|line| self.classifier.verifies(line))
                || self.classifier.verifies_tail(&self.buffer.recent(VERIFY_TAIL_LINES));
            if matched {
                self.state = ShellState::Active;
                self.notes.verified = true;
                self.verify_deadline = None;
                debug!(label = %self.label, "verification matched");
            }
        }

        // The newest tail (an un-terminated fragment, or the last full
        // line) restarts the prompt quiet window; anything else cancels a
        // pending candidate.
        let tail = self.buffer.partial_tail().or_else(|| completed.last().cloned());
        self.pending_prompt = match tail {
            Some(tail) if Classifier::is_prompt_candidate(&tail) => Some((tail, now)),
            _ => None,
        };

        self.last_output_at = now;
        self.updated_at = now;
    }

    /// The child exited. Clean stop if it was asked to stop or exited
    /// zero; otherwise a crash. Ignored after a zombie reap already made
    /// the state terminal.
    pub fn on_exit(&mut self, status: ExitStatus, now: Instant) {
        if self.state.is_terminal() {
            return;
        }
        for line in self.buffer.flush_partial() {
            for kind in self.classifier.kinds(&line) {
                self.counts.record(kind, &line);
            }
        }
        self.finalize_prompt(now);
        self.pending_prompt = None;

        self.exit_code = status.code;
        self.exit_signal = status.signal;
        let clean = self.stop_requested_at.is_some() || status.code == Some(0);
        self.state = if clean {
            ShellState::Stopped
        } else {
            ShellState::Crashed
        };
        if !clean {
            self.notes.crashed = true;
        }
        self.pid = None;
        self.input_tx = None;
        self.clear_deadlines();
        self.updated_at = now;
        debug!(
            label = %self.label,
            status = self.state.as_str(),
            code = ?status.code,
            signal = ?status.signal,
            "shell exited"
        );
    }

    // -- transitions driven by the scheduler -------------------------------

    /// Advance every armed timer. Returns the signals the scheduler must
    /// deliver outside the lock.
    pub fn tick(&mut self, now: Instant) -> Vec<TickAction> {
        let mut actions = Vec::new();
        match self.state {
            ShellState::Verifying => {
                if self.verify_deadline.is_some_and(|d| now >= d) {
                    self.state = ShellState::Active;
                    self.notes.verify_timed_out = true;
                    self.verify_deadline = None;
                    self.updated_at = now;
                    debug!(label = %self.label, "verification timed out; shell left running");
                }
                self.finalize_prompt(now);
            }
            ShellState::Active => {
                self.finalize_prompt(now);
            }
            ShellState::Stopping => {
                if self.grace_deadline.is_some_and(|d| now >= d) {
                    self.grace_deadline = None;
                    self.kill_deadline = Some(now + self.timings.kill);
                    if let Some(pid) = self.pid {
                        actions.push(TickAction::Kill { pid });
                    }
                    debug!(label = %self.label, "stop grace elapsed; escalating to SIGKILL");
                } else if self.kill_deadline.is_some_and(|d| now >= d) {
                    self.reap_zombie(now);
                }
            }
            ShellState::Starting | ShellState::Stopped | ShellState::Crashed => {}
        }
        actions
    }

    fn reap_zombie(&mut self, now: Instant) {
        self.record_line("warning: reaped zombie; exit status unobserved");
        self.state = ShellState::Stopped;
        self.exit_code = None;
        self.exit_signal = None;
        self.pid = None;
        self.input_tx = None;
        self.clear_deadlines();
        self.updated_at = now;
    }

    /// Confirm a pending prompt candidate once the pty has stayed quiet.
    fn finalize_prompt(&mut self, now: Instant) {
        let confirmed = self
            .pending_prompt
            .as_ref()
            .is_some_and(|(_, at)| now.saturating_duration_since(*at) >= self.timings.prompt_quiet);
        if confirmed {
            if let Some((line, _)) = self.pending_prompt.take() {
                self.counts.record(EventKind::Prompt, &line);
            }
        }
    }

    // -- transitions driven by tool calls ----------------------------------

    /// Begin or escalate a stop. Returns the signal to deliver, or `None`
    /// when nothing should be sent (terminal, or a repeated graceful
    /// request).
    pub fn request_stop(&mut self, force: bool, now: Instant) -> Option<StopSignal> {
        if self.state.is_terminal() {
            return None;
        }
        if self.stop_requested_at.is_none() {
            self.stop_requested_at = Some(now);
        }
        let already_stopping = self.state == ShellState::Stopping;
        if already_stopping && !force {
            return None;
        }
        self.state = ShellState::Stopping;
        self.updated_at = now;
        if force {
            self.grace_deadline = None;
            self.kill_deadline = Some(now + self.timings.kill);
            Some(StopSignal::Kill)
        } else {
            self.grace_deadline = Some(now + self.timings.grace);
            Some(StopSignal::Interrupt)
        }
    }

    // -- polling -----------------------------------------------------------

    /// Consuming poll: report and reset everything accumulated since the
    /// previous poll. New lines are delivered only when something notable
    /// happened; a quiet interval yields the sentinel with empty logs.
    pub fn check(&mut self, log_lines: usize) -> Snapshot {
        let message = summary::compose(&self.summary_input());
        let logs = if message.is_some() {
            self.buffer.lines_from(self.poll_cursor, log_lines)
        } else {
            Vec::new()
        };
        let snapshot = self.snapshot_with(
            message.unwrap_or_else(|| summary::NO_NOTABLE_EVENTS.to_owned()),
            logs,
        );
        self.consume_poll();
        snapshot
    }

    /// Consuming poll that always delivers the unseen lines. Used by
    /// `send_input`, whose caller just caused the output it wants to see.
    pub fn check_delivering(&mut self, log_lines: usize) -> Snapshot {
        let message = summary::compose_or_sentinel(&self.summary_input());
        let logs = self.buffer.lines_from(self.poll_cursor, log_lines);
        let snapshot = self.snapshot_with(message, logs);
        self.consume_poll();
        snapshot
    }

    /// Non-consuming snapshot for `start_shell`/`stop_shell` responses.
    /// Leaves the cursor and counters untouched so the next poll still
    /// sees everything; repeated calls return identical snapshots.
    pub fn peek(&self) -> Snapshot {
        let message = summary::compose(&self.summary_input());
        let logs = if message.is_some() {
            self.buffer.lines_from(self.poll_cursor, DEFAULT_LOG_LINES)
        } else {
            Vec::new()
        };
        self.snapshot_with(
            message.unwrap_or_else(|| summary::NO_NOTABLE_EVENTS.to_owned()),
            logs,
        )
    }

    pub fn brief(&self) -> ShellBrief {
        ShellBrief {
            label: self.label.clone(),
            status: self.state.as_str().to_owned(),
            pid: self.pid,
        }
    }

    fn consume_poll(&mut self) {
        self.poll_cursor = self.buffer.total_appended();
        self.counts.reset();
        self.notes.reset();
    }

    fn summary_input(&self) -> SummaryInput<'_> {
        SummaryInput {
            notes: &self.notes,
            counts: &self.counts,
            exit_code: self.exit_code,
            exit_signal: self.exit_signal,
            verification_pattern: self.classifier.verification_pattern(),
            verification_timeout_ms: self.verification_timeout.as_millis() as u64,
        }
    }

    fn snapshot_with(&self, message: String, logs: Vec<String>) -> Snapshot {
        Snapshot {
            label: self.label.clone(),
            status: self.state.as_str().to_owned(),
            pid: self.pid,
            exit_code: self.exit_code,
            exit_signal: self.exit_signal,
            message,
            logs,
        }
    }

    fn record_line(&mut self, line: &str) {
        for appended in self.buffer.push_line(line) {
            for kind in self.classifier.kinds(&appended) {
                self.counts.record(kind, &appended);
            }
        }
    }

    fn clear_deadlines(&mut self) {
        self.verify_deadline = None;
        self.grace_deadline = None;
        self.kill_deadline = None;
    }
}

impl std::fmt::Debug for Shell {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Shell")
            .field("label", &self.label)
            .field("state", &self.state)
            .field("pid", &self.pid)
            .field("captured", &self.buffer.total_appended())
            .field("poll_cursor", &self.poll_cursor)
            .finish()
    }
}

#[cfg(test)]
#[path = "shell_tests.rs"]
mod tests;
