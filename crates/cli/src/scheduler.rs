// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Coarse tick loop driving every time-based transition.
//!
//! One interval serves all shells: verification deadlines, stop
//! grace/kill escalation, zombie reaping, and prompt quiet-window
//! confirmation. The scheduler is the only source of time-driven
//! mutation, which keeps per-shell ordering deterministic. A failure on
//! one shell crashes that shell only; the loop carries on.

use std::sync::Arc;
use std::time::{Duration, Instant};

use nix::errno::Errno;
use nix::sys::signal::{kill, Signal};
use nix::unistd::Pid;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::registry::{Registry, SharedShell};
use crate::shell::TickAction;

/// Run the scheduler until shutdown.
pub fn spawn(
    registry: Arc<Registry>,
    tick: Duration,
    shutdown: CancellationToken,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(tick);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    for shell in registry.list() {
                        tick_one(&shell);
                    }
                }
            }
        }
        debug!("scheduler stopped");
    })
}

/// Tick a single shell and apply whatever signals it owes.
pub fn tick_one(shell: &SharedShell) {
    let actions = shell.lock().tick(Instant::now());
    for action in actions {
        apply(shell, action);
    }
}

fn apply(shell: &SharedShell, action: TickAction) {
    match action {
        TickAction::Kill { pid } => {
            if let Err(e) = kill_group(pid, Signal::SIGKILL) {
                let mut guard = shell.lock();
                warn!(label = %guard.label, pid, error = %e, "SIGKILL delivery failed");
                guard.mark_failed(&format!("cannot signal pid {pid}: {e}"), Instant::now());
            }
        }
    }
}

/// Signal the child's process group so grandchildren die too. ESRCH means
/// the child already exited, which is success for our purposes.
pub fn kill_group(pid: i32, signal: Signal) -> Result<(), Errno> {
    match kill(Pid::from_raw(-pid), signal) {
        Ok(()) | Err(Errno::ESRCH) => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
#[path = "scheduler_tests.rs"]
mod tests;
