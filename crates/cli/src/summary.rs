// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Builds the one-sentence `message` reported by each poll.
//!
//! Rules are checked in priority order: crash, verification outcome, then
//! notable-event counters. When none applies the sentinel is returned and
//! the caller suppresses the log slice entirely.

use crate::classify::NotableCounts;

/// Sentinel message for a poll with nothing to report.
pub const NO_NOTABLE_EVENTS: &str = "no notable events";

/// One-shot state-transition notes, set when the transition happens and
/// consumed by the next poll.
#[derive(Debug, Default, Clone)]
pub struct TransitionNotes {
    pub crashed: bool,
    pub verified: bool,
    pub verify_timed_out: bool,
}

impl TransitionNotes {
    pub fn any(&self) -> bool {
        self.crashed || self.verified || self.verify_timed_out
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Everything the summarizer looks at for one poll.
pub struct SummaryInput<'a> {
    pub notes: &'a TransitionNotes,
    pub counts: &'a NotableCounts,
    pub exit_code: Option<i32>,
    pub exit_signal: Option<i32>,
    pub verification_pattern: Option<&'a str>,
    pub verification_timeout_ms: u64,
}

/// Compose the poll message, or `None` when the sentinel applies.
pub fn compose(input: &SummaryInput<'_>) -> Option<String> {
    if input.notes.crashed {
        return Some(format!(
            "shell crashed: exit={}",
            exit_label(input.exit_code, input.exit_signal)
        ));
    }
    if input.notes.verified {
        let pattern = input.verification_pattern.unwrap_or_default();
        return Some(format!("verification matched: {pattern}"));
    }
    if input.notes.verify_timed_out {
        return Some(format!(
            "verification timed out after {}ms; continuing",
            input.verification_timeout_ms
        ));
    }
    if input.counts.any() {
        return Some(counter_sentence(input.counts));
    }
    None
}

/// Compose the poll message, falling back to the sentinel.
pub fn compose_or_sentinel(input: &SummaryInput<'_>) -> String {
    compose(input).unwrap_or_else(|| NO_NOTABLE_EVENTS.to_owned())
}

fn exit_label(code: Option<i32>, signal: Option<i32>) -> String {
    match (code, signal) {
        (Some(code), _) => code.to_string(),
        (None, Some(signal)) => format!("signal {signal}"),
        (None, None) => "null".to_owned(),
    }
}

fn counter_sentence(counts: &NotableCounts) -> String {
    let mut parts = Vec::new();
    if counts.error > 0 {
        parts.push(format!("{} error(s)", counts.error));
    }
    if counts.warning > 0 {
        parts.push(format!("{} warning(s)", counts.warning));
    }
    if counts.url > 0 {
        parts.push(format!("{} url(s)", counts.url));
    }
    if counts.prompt > 0 {
        parts.push(format!("{} prompt(s)", counts.prompt));
    }
    if counts.custom > 0 {
        parts.push(format!("{} pattern match(es)", counts.custom));
    }
    format!("{} since last check", parts.join(", "))
}

#[cfg(test)]
#[path = "summary_tests.rs"]
mod tests;
