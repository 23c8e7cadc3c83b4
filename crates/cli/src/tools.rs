// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Tool surface: names, argument shapes, and dispatch into the
//! supervisor.
//!
//! The table is static data; handlers are one match away. Tool failures
//! (bad arguments, unknown label, wrong state) come back as `isError`
//! envelopes, never as transport errors. Terminal shell states are
//! plain successful results.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::debug;

use crate::error::ToolError;
use crate::supervisor::{StartRequest, Supervisor};

/// A named tool and its argument schema, described once as data.
pub struct ToolDef {
    pub name: &'static str,
    pub description: &'static str,
}

pub const TOOLS: &[ToolDef] = &[
    ToolDef {
        name: "start_shell",
        description: "Start a command in a supervised interactive shell under a pty. \
                      Returns a status snapshot; a command that cannot be spawned \
                      yields a crashed shell, not an error.",
    },
    ToolDef {
        name: "check_shell",
        description: "Poll a shell: status, a one-sentence summary of notable events \
                      since the previous poll, and the new output lines.",
    },
    ToolDef {
        name: "send_input",
        description: "Write keystrokes to a running shell, wait briefly for the \
                      output they trigger, and return it.",
    },
    ToolDef {
        name: "stop_shell",
        description: "Stop a shell: SIGINT with a grace period, or SIGKILL when \
                      forced. Idempotent.",
    },
    ToolDef {
        name: "list_shells",
        description: "List every supervised shell with label, status, and pid.",
    },
];

/// The `tools/list` payload.
pub fn listing() -> Value {
    let tools: Vec<Value> = TOOLS
        .iter()
        .map(|tool| {
            json!({
                "name": tool.name,
                "description": tool.description,
                "inputSchema": input_schema(tool.name),
            })
        })
        .collect();
    json!({ "tools": tools })
}

fn input_schema(name: &str) -> Value {
    let label = json!({ "type": "string", "description": "Unique shell label." });
    match name {
        "start_shell" => json!({
            "type": "object",
            "properties": {
                "command": { "type": "string", "description": "Program to run." },
                "args": {
                    "type": "array",
                    "items": { "type": "string" },
                    "description": "Arguments passed to the program."
                },
                "workingDirectory": { "type": "string" },
                "label": label,
                "verification_pattern": {
                    "type": "string",
                    "description": "Regex that marks the shell ready; matched against new output."
                },
                "verification_timeout_ms": { "type": "integer", "minimum": 1 },
                "notable_pattern": {
                    "type": "string",
                    "description": "Extra regex counted as a notable event."
                },
                "env": {
                    "type": "object",
                    "additionalProperties": { "type": "string" }
                }
            },
            "required": ["command", "workingDirectory", "label"]
        }),
        "check_shell" => json!({
            "type": "object",
            "properties": {
                "label": label,
                "log_lines": {
                    "type": "integer",
                    "minimum": 0,
                    "description": "Maximum new lines to return (default 50, 0 for none)."
                }
            },
            "required": ["label"]
        }),
        "send_input" => json!({
            "type": "object",
            "properties": {
                "label": label,
                "input": { "type": "string" },
                "append_newline": { "type": "boolean", "default": true }
            },
            "required": ["label", "input"]
        }),
        "stop_shell" => json!({
            "type": "object",
            "properties": {
                "label": label,
                "force": { "type": "boolean", "default": false }
            },
            "required": ["label"]
        }),
        _ => json!({ "type": "object", "properties": {} }),
    }
}

#[derive(Debug, Deserialize)]
struct StartShellArgs {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(rename = "workingDirectory")]
    working_directory: PathBuf,
    label: String,
    #[serde(default)]
    verification_pattern: Option<String>,
    #[serde(default)]
    verification_timeout_ms: Option<u64>,
    #[serde(default)]
    notable_pattern: Option<String>,
    #[serde(default)]
    env: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct CheckShellArgs {
    label: String,
    #[serde(default)]
    log_lines: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct SendInputArgs {
    label: String,
    input: String,
    #[serde(default)]
    append_newline: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StopShellArgs {
    label: String,
    #[serde(default)]
    force: Option<bool>,
}

/// Run a named tool and shape the MCP result envelope.
pub async fn call(supervisor: &Supervisor, name: &str, arguments: Value) -> Value {
    match run(supervisor, name, arguments).await {
        Ok(body) => ok_envelope(&body),
        Err(e) => {
            debug!(tool = name, error = %e, "tool call failed");
            error_envelope(&e)
        }
    }
}

async fn run(
    supervisor: &Supervisor,
    name: &str,
    arguments: Value,
) -> Result<Value, ToolError> {
    match name {
        "start_shell" => {
            let args: StartShellArgs = parse(arguments)?;
            let snapshot = supervisor.start_shell(StartRequest {
                label: args.label,
                command: args.command,
                args: args.args,
                working_directory: args.working_directory,
                verification_pattern: args.verification_pattern,
                verification_timeout_ms: args.verification_timeout_ms,
                notable_pattern: args.notable_pattern,
                env: args.env.into_iter().collect(),
            })?;
            to_body(&snapshot)
        }
        "check_shell" => {
            let args: CheckShellArgs = parse(arguments)?;
            let snapshot = supervisor.check_shell(&args.label, args.log_lines)?;
            to_body(&snapshot)
        }
        "send_input" => {
            let args: SendInputArgs = parse(arguments)?;
            let snapshot = supervisor
                .send_input(&args.label, &args.input, args.append_newline.unwrap_or(true))
                .await?;
            to_body(&snapshot)
        }
        "stop_shell" => {
            let args: StopShellArgs = parse(arguments)?;
            let snapshot =
                supervisor.stop_shell(&args.label, args.force.unwrap_or(false))?;
            to_body(&snapshot)
        }
        "list_shells" => to_body(&supervisor.list_shells()),
        other => Err(ToolError::bad_arguments(format!("unknown tool: {other}"))),
    }
}

fn parse<T: DeserializeOwned>(arguments: Value) -> Result<T, ToolError> {
    serde_json::from_value(arguments).map_err(|e| ToolError::bad_arguments(e.to_string()))
}

fn to_body<T: Serialize>(body: &T) -> Result<Value, ToolError> {
    serde_json::to_value(body).map_err(|e| ToolError::internal(e.to_string()))
}

/// Successful MCP envelope: the body JSON-encoded into a single text
/// payload.
pub fn ok_envelope(body: &Value) -> Value {
    json!({
        "content": [{ "type": "text", "text": body.to_string() }]
    })
}

/// Error envelope: `isError` marks dispatcher-level failures only.
pub fn error_envelope(error: &ToolError) -> Value {
    let body = json!({ "error": error.code.as_str(), "message": error.message });
    json!({
        "content": [{ "type": "text", "text": body.to_string() }],
        "isError": true
    })
}

#[cfg(test)]
#[path = "tools_tests.rs"]
mod tests;
