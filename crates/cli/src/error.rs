// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dispatcher-level error vocabulary surfaced to JSON-RPC callers.
///
/// Shell lifecycle outcomes (a crashed child, a reaped zombie) are never
/// errors; they are normal snapshots. These codes cover only misuse of
/// the tool surface and supervisor-internal failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorCode {
    BadArguments,
    DuplicateLabel,
    NotFound,
    WrongState,
    PtyClosed,
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::BadArguments => "BAD_ARGUMENTS",
            Self::DuplicateLabel => "DUPLICATE_LABEL",
            Self::NotFound => "NOT_FOUND",
            Self::WrongState => "WRONG_STATE",
            Self::PtyClosed => "PTY_CLOSED",
            Self::Internal => "INTERNAL",
        }
    }

    /// JSON-RPC error code. `BadArguments` maps to the standard invalid
    /// params code; the rest use the implementation-defined server range.
    pub fn jsonrpc_code(&self) -> i64 {
        match self {
            Self::BadArguments => -32602,
            Self::DuplicateLabel => -32001,
            Self::NotFound => -32002,
            Self::WrongState => -32003,
            Self::PtyClosed => -32004,
            Self::Internal => -32000,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// An error from a tool call: a code plus a short human-readable detail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ToolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self { code, message: message.into() }
    }

    pub fn bad_arguments(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::BadArguments, message)
    }

    pub fn duplicate_label(label: &str) -> Self {
        Self::new(ErrorCode::DuplicateLabel, format!("label already in use: {label}"))
    }

    pub fn not_found(label: &str) -> Self {
        Self::new(ErrorCode::NotFound, format!("no shell with label: {label}"))
    }

    pub fn wrong_state(label: &str, status: &str) -> Self {
        Self::new(
            ErrorCode::WrongState,
            format!("shell {label} does not accept input in state {status}"),
        )
    }

    pub fn pty_closed(label: &str) -> Self {
        Self::new(ErrorCode::PtyClosed, format!("pty for shell {label} is closed"))
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::Internal, message)
    }
}

impl fmt::Display for ToolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code, self.message)
    }
}

impl std::error::Error for ToolError {}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
