// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use std::time::Duration;

use clap::Parser;

/// Shell supervisor speaking MCP over stdio.
#[derive(Debug, Parser)]
#[command(name = "drover", version, about)]
pub struct Config {
    /// Maximum captured log lines retained per shell.
    #[arg(long, env = "MCP_MAX_LOG_LINES", default_value = "500")]
    pub max_log_lines: usize,

    /// Test mode: shorten the default verification, settle, and stop
    /// waits to sub-second values. Explicit overrides still win.
    #[arg(long, env = "MCP_PM_FAST", value_parser = parse_switch, action = clap::ArgAction::Set, default_value = "false")]
    pub fast: bool,

    /// Scheduler tick interval in milliseconds.
    #[arg(long, env = "DROVER_TICK_MS")]
    pub tick_ms: Option<u64>,

    /// Default verification timeout in milliseconds when `start_shell`
    /// does not supply one.
    #[arg(long, env = "DROVER_VERIFY_TIMEOUT_MS")]
    pub verify_timeout_ms: Option<u64>,

    /// Grace period after SIGINT before escalating to SIGKILL, in
    /// milliseconds.
    #[arg(long, env = "DROVER_GRACE_MS")]
    pub grace_ms: Option<u64>,

    /// Wait after SIGKILL before a missing exit is reaped as a zombie, in
    /// milliseconds.
    #[arg(long, env = "DROVER_KILL_MS")]
    pub kill_ms: Option<u64>,

    /// How long `send_input` waits for post-write output to settle, in
    /// milliseconds.
    #[arg(long, env = "DROVER_INPUT_SETTLE_MS")]
    pub input_settle_ms: Option<u64>,

    /// Quiet window after which output counts as settled, in milliseconds.
    #[arg(long, env = "DROVER_QUIET_WINDOW_MS")]
    pub quiet_window_ms: Option<u64>,

    /// Terminal columns for spawned ptys.
    #[arg(long, env = "DROVER_COLS", default_value = "200")]
    pub cols: u16,

    /// Terminal rows for spawned ptys.
    #[arg(long, env = "DROVER_ROWS", default_value = "50")]
    pub rows: u16,

    /// Log format (json or text). Logs go to stderr; stdout carries the
    /// protocol.
    #[arg(long, env = "DROVER_LOG_FORMAT", default_value = "text")]
    pub log_format: String,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "DROVER_LOG_LEVEL", default_value = "info")]
    pub log_level: String,
}

/// Resolved wait durations shared by the supervisor and scheduler.
#[derive(Debug, Clone, Copy)]
pub struct Timings {
    pub tick: Duration,
    pub verify_timeout: Duration,
    pub grace: Duration,
    pub kill: Duration,
    pub input_settle: Duration,
    pub quiet_window: Duration,
    /// Quiet time after a `:`/`?` line before it counts as a prompt.
    pub prompt_quiet: Duration,
}

impl Config {
    /// Validate the configuration after parsing.
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.max_log_lines == 0 {
            anyhow::bail!("--max-log-lines must be at least 1");
        }
        if self.cols == 0 || self.rows == 0 {
            anyhow::bail!("terminal size must be non-zero");
        }
        match self.log_format.as_str() {
            "json" | "text" => Ok(()),
            other => anyhow::bail!("invalid log format: {other}"),
        }
    }

    /// Resolve effective durations: explicit flag/env wins, otherwise the
    /// normal default, shortened when fast mode is on.
    pub fn timings(&self) -> Timings {
        let pick = |explicit: Option<u64>, normal: u64, fast: u64| {
            Duration::from_millis(explicit.unwrap_or(if self.fast { fast } else { normal }))
        };
        Timings {
            tick: pick(self.tick_ms, 250, 25),
            verify_timeout: pick(self.verify_timeout_ms, 30_000, 800),
            grace: pick(self.grace_ms, 3_000, 500),
            kill: pick(self.kill_ms, 2_000, 500),
            input_settle: pick(self.input_settle_ms, 1_500, 400),
            quiet_window: pick(self.quiet_window_ms, 500, 100),
            prompt_quiet: Duration::from_millis(100),
        }
    }
}

/// Parse the permissive on/off values accepted from the environment.
fn parse_switch(value: &str) -> Result<bool, String> {
    match value.to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" | "" => Ok(false),
        other => Err(format!("expected a boolean switch, got: {other}")),
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
