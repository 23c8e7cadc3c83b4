// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Pure classification of captured output lines.
//!
//! Two jobs: tag lines with notable-event kinds for the between-poll
//! summary, and test lines against the caller's verification pattern.
//! All regexes are compiled once per shell at start.

use regex::Regex;
use serde::{Deserialize, Serialize};

/// How many trailing lines are concatenated when testing the verification
/// pattern, so patterns spanning output fragments still match.
pub const VERIFY_TAIL_LINES: usize = 20;

/// Kinds of notable events surfaced between polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Error,
    Warning,
    Url,
    Prompt,
    Custom,
}

/// Compiled per-shell patterns.
pub struct Classifier {
    error: Regex,
    warning: Regex,
    url: Regex,
    custom: Option<Regex>,
    verification: Option<Regex>,
}

impl std::fmt::Debug for Classifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Classifier")
            .field("custom", &self.custom.as_ref().map(|r| r.as_str()))
            .field("verification", &self.verification.as_ref().map(|r| r.as_str()))
            .finish()
    }
}

impl Classifier {
    /// Compile the built-in patterns plus the caller's optional
    /// verification and notable patterns.
    pub fn new(
        verification: Option<&str>,
        notable: Option<&str>,
    ) -> Result<Self, regex::Error> {
        Ok(Self {
            error: Regex::new(r"(?i)error|exception|fatal|panic")?,
            warning: Regex::new(r"(?i)warn(ing)?")?,
            url: Regex::new(r"https?://[^\s]+")?,
            custom: notable.map(Regex::new).transpose()?,
            verification: verification.map(Regex::new).transpose()?,
        })
    }

    /// Kinds matched by a single line. Prompt is excluded: it needs a
    /// quiet-window confirmation the caller owns.
    pub fn kinds(&self, line: &str) -> Vec<EventKind> {
        let mut kinds = Vec::new();
        if self.error.is_match(line) || line.starts_with("Error:") {
            kinds.push(EventKind::Error);
        }
        if self.warning.is_match(line) {
            kinds.push(EventKind::Warning);
        }
        if self.url.is_match(line) {
            kinds.push(EventKind::Url);
        }
        if let Some(ref custom) = self.custom {
            if custom.is_match(line) {
                kinds.push(EventKind::Custom);
            }
        }
        kinds
    }

    /// Whether a verification pattern was supplied at start.
    pub fn has_verification(&self) -> bool {
        self.verification.is_some()
    }

    /// The verification pattern source, for the summary message.
    pub fn verification_pattern(&self) -> Option<&str> {
        self.verification.as_ref().map(|r| r.as_str())
    }

    /// Test one line against the verification pattern.
    pub fn verifies(&self, line: &str) -> bool {
        self.verification.as_ref().is_some_and(|re| re.is_match(line))
    }

    /// Test the concatenation of the most recent lines, newline-joined, so
    /// patterns that span fragments still match.
    pub fn verifies_tail(&self, recent: &[&str]) -> bool {
        let Some(ref re) = self.verification else {
            return false;
        };
        re.is_match(&recent.join("\n"))
    }

    /// A line that looks like it is waiting for the user: ends with `:` or
    /// `?`. Confirmed as a prompt only after the pty stays quiet.
    pub fn is_prompt_candidate(line: &str) -> bool {
        let trimmed = line.trim_end();
        trimmed.ends_with(':') || trimmed.ends_with('?')
    }
}

/// Notable-event counters accumulated since the previous poll, with the
/// first matching line per kind retained for diagnostics.
#[derive(Debug, Default, Clone)]
pub struct NotableCounts {
    pub error: u32,
    pub warning: u32,
    pub url: u32,
    pub prompt: u32,
    pub custom: u32,
    pub first_error: Option<String>,
    pub first_warning: Option<String>,
    pub first_url: Option<String>,
    pub first_prompt: Option<String>,
    pub first_custom: Option<String>,
}

impl NotableCounts {
    pub fn record(&mut self, kind: EventKind, line: &str) {
        let (count, first) = match kind {
            EventKind::Error => (&mut self.error, &mut self.first_error),
            EventKind::Warning => (&mut self.warning, &mut self.first_warning),
            EventKind::Url => (&mut self.url, &mut self.first_url),
            EventKind::Prompt => (&mut self.prompt, &mut self.first_prompt),
            EventKind::Custom => (&mut self.custom, &mut self.first_custom),
        };
        *count += 1;
        if first.is_none() {
            *first = Some(line.to_owned());
        }
    }

    pub fn any(&self) -> bool {
        self.error + self.warning + self.url + self.prompt + self.custom > 0
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

#[cfg(test)]
#[path = "classify_tests.rs"]
mod tests;
