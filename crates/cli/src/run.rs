// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Top-level runner: wires the supervisor, scheduler, and stdio
//! transport together, and tears everything down on exit.

use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio_util::sync::CancellationToken;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::rpc;
use crate::scheduler;
use crate::supervisor::Supervisor;

/// Run the supervisor until stdin closes or a termination signal
/// arrives, then force-stop every managed shell.
pub async fn run(config: Config) -> anyhow::Result<()> {
    init_logging(&config);
    info!(
        max_log_lines = config.max_log_lines,
        fast = config.fast,
        "drover starting"
    );

    let timings = config.timings();
    let supervisor = Arc::new(Supervisor::new(
        timings,
        config.max_log_lines,
        config.cols,
        config.rows,
    ));
    let shutdown = CancellationToken::new();

    let scheduler = scheduler::spawn(
        Arc::clone(supervisor.registry()),
        timings.tick,
        shutdown.clone(),
    );
    spawn_signal_listener(shutdown.clone());

    let served = rpc::serve(Arc::clone(&supervisor), shutdown.clone()).await;

    shutdown.cancel();
    supervisor.shutdown().await;
    let _ = scheduler.await;
    info!("drover stopped");
    served
}

/// Logs go to stderr; stdout is the JSON-RPC channel.
fn init_logging(config: &Config) {
    let filter = EnvFilter::try_new(&config.log_level)
        .unwrap_or_else(|_| EnvFilter::new("info"));
    if config.log_format == "json" {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .json()
            .try_init();
    } else {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init();
    }
}

/// SIGTERM/SIGINT end the supervisor the same way stdin EOF does.
fn spawn_signal_listener(shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut term = match signal(SignalKind::terminate()) {
            Ok(stream) => stream,
            Err(_) => return,
        };
        let mut int = match signal(SignalKind::interrupt()) {
            Ok(stream) => stream,
            Err(_) => return,
        };
        tokio::select! {
            _ = term.recv() => {}
            _ = int.recv() => {}
        }
        info!("termination signal received; shutting down");
        shutdown.cancel();
    });
}
