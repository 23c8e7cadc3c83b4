// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Line-delimited JSON-RPC 2.0 over stdio.
//!
//! One request per line in, one response per line out. Notifications
//! (no `id`) are consumed silently. A single ready-marker notification
//! is written before the request loop so harnesses know when to start
//! talking. Stdin EOF ends the loop; logging stays on stderr because
//! stdout belongs to the protocol.

use std::sync::Arc;

use serde::Deserialize;
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::supervisor::Supervisor;
use crate::tools;

pub const PROTOCOL_VERSION: &str = "2024-11-05";
pub const SERVER_NAME: &str = "drover";

const PARSE_ERROR: i64 = -32700;
const INVALID_PARAMS: i64 = -32602;
const METHOD_NOT_FOUND: i64 = -32601;

#[derive(Debug, Deserialize)]
struct Request {
    #[serde(default)]
    id: Option<Value>,
    method: String,
    #[serde(default)]
    params: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CallParams {
    name: String,
    #[serde(default)]
    arguments: Value,
}

/// Serve requests from stdin until EOF or shutdown.
pub async fn serve(
    supervisor: Arc<Supervisor>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let stdin = tokio::io::stdin();
    let mut stdout = tokio::io::stdout();
    let mut lines = BufReader::new(stdin).lines();

    write_line(&mut stdout, &ready_marker()).await?;
    debug!("ready marker emitted; accepting requests");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!("shutdown requested; leaving request loop");
                break;
            }
            line = lines.next_line() => {
                match line? {
                    None => {
                        debug!("stdin closed; leaving request loop");
                        break;
                    }
                    Some(line) => {
                        let line = line.trim();
                        if line.is_empty() {
                            continue;
                        }
                        if let Some(response) = handle_line(&supervisor, line).await {
                            write_line(&mut stdout, &response).await?;
                        }
                    }
                }
            }
        }
    }

    Ok(())
}

/// The single line written before the request loop starts.
pub fn ready_marker() -> Value {
    json!({ "jsonrpc": "2.0", "method": "notifications/ready" })
}

/// Parse and answer one request line. `None` means nothing is written
/// back (notifications, including unparseable ones without an id).
pub async fn handle_line(supervisor: &Supervisor, line: &str) -> Option<Value> {
    let request: Request = match serde_json::from_str(line) {
        Ok(request) => request,
        Err(e) => {
            warn!(error = %e, "unparseable request line");
            return Some(error_response(Value::Null, PARSE_ERROR, format!("parse error: {e}")));
        }
    };
    handle_request(supervisor, request).await
}

async fn handle_request(supervisor: &Supervisor, request: Request) -> Option<Value> {
    let Some(id) = request.id else {
        debug!(method = %request.method, "notification");
        return None;
    };

    let response = match request.method.as_str() {
        "initialize" => ok_response(
            id,
            json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": { "tools": {} },
                "serverInfo": {
                    "name": SERVER_NAME,
                    "version": env!("CARGO_PKG_VERSION"),
                },
            }),
        ),
        "ping" => ok_response(id, json!({})),
        "tools/list" => ok_response(id, tools::listing()),
        "tools/call" => {
            let params = request.params.unwrap_or_else(|| json!({}));
            match serde_json::from_value::<CallParams>(params) {
                Ok(call) => {
                    let arguments = if call.arguments.is_null() {
                        json!({})
                    } else {
                        call.arguments
                    };
                    let envelope = tools::call(supervisor, &call.name, arguments).await;
                    ok_response(id, envelope)
                }
                Err(e) => error_response(id, INVALID_PARAMS, format!("invalid params: {e}")),
            }
        }
        other => error_response(id, METHOD_NOT_FOUND, format!("unknown method: {other}")),
    };
    Some(response)
}

fn ok_response(id: Value, result: Value) -> Value {
    json!({ "jsonrpc": "2.0", "id": id, "result": result })
}

fn error_response(id: Value, code: i64, message: String) -> Value {
    json!({
        "jsonrpc": "2.0",
        "id": id,
        "error": { "code": code, "message": message },
    })
}

async fn write_line<W>(writer: &mut W, value: &Value) -> anyhow::Result<()>
where
    W: tokio::io::AsyncWrite + Unpin,
{
    let mut line = value.to_string();
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod tests;
