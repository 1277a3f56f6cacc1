//! Headless exercising harness for the core engine: connects to a host:port
//! given on the command line, relays stdin lines as outbound commands, and
//! logs every observable state transition to stdout via `tracing`.
//!
//! This binary has no UI of its own -- it exists to drive [`mudcore::Pipeline`]
//! the way a terminal or GUI frontend eventually would, so the engine can be
//! exercised end to end without one.

use std::sync::Arc;

use mudcore::status::{StatusHub, TabSnapshot};
use mudcore::Pipeline;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{mpsc, watch};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let mut args = std::env::args().skip(1);
    let (host, port) = match (args.next(), args.next()) {
        (Some(host), Some(port_str)) => match port_str.parse::<u16>() {
            Ok(port) => (host, port),
            Err(_) => {
                eprintln!("mudcore-headless: invalid port {port_str:?}");
                std::process::exit(1);
            }
        },
        _ => {
            eprintln!("usage: mudcore-headless <host> <port>");
            std::process::exit(1);
        }
    };

    let status = Arc::new(StatusHub::new());
    spawn_state_loggers(&status);

    let mut pipeline = Pipeline::new("utf-8", Arc::clone(&status));
    if let Err(e) = pipeline.connect(&host, port).await {
        tracing::error!(error = %e, %host, port, "connect failed");
        std::process::exit(1);
    }

    let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<String>();
    let stdin_task = tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if cmd_tx.send(line).is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            result = pipeline.pump() => {
                let more = match result {
                    Ok(more) => more,
                    Err(e) => {
                        tracing::error!(error = %e, "connection error");
                        false
                    }
                };
                if !more {
                    break;
                }
            }
            Some(cmd) = cmd_rx.recv() => {
                if let Err(e) = pipeline.send_command(&cmd).await {
                    tracing::warn!(error = %e, "failed to send command");
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("received interrupt, disconnecting");
                break;
            }
        }
    }

    stdin_task.abort();
    pipeline.disconnect();
}

/// Spawn one background task per observable facet that logs every change
/// via `tracing` until the corresponding `watch::Sender` is dropped.
fn spawn_state_loggers(status: &Arc<StatusHub>) {
    watch_and_log(status.subscribe_connection_state(), |state| {
        tracing::info!(?state, "connection state changed");
    });

    watch_and_log(status.subscribe_msdp(), |snapshot| {
        tracing::info!(vars = snapshot.len(), "msdp snapshot updated");
    });

    watch_and_log(status.subscribe_gmcp(), |snapshot| {
        tracing::info!(packages = snapshot.len(), "gmcp snapshot updated");
    });

    watch_and_log(status.subscribe_tabs(), |tabs: &Vec<TabSnapshot>| {
        for tab in tabs {
            if let Some(last) = tab.lines.last() {
                tracing::info!(tab = %tab.id, unread = tab.unread, line = %last.clean, "tab updated");
            }
        }
    });

    watch_and_log(status.subscribe_variables(), |vars| {
        tracing::info!(count = vars.len(), "variable set updated");
    });

    watch_and_log(status.subscribe_triggers(), |triggers| {
        tracing::info!(count = triggers.len(), "trigger set updated");
    });

    watch_and_log(status.subscribe_aliases(), |aliases| {
        tracing::info!(count = aliases.len(), "alias set updated");
    });

    watch_and_log(status.subscribe_context_queue(), |queue| {
        tracing::info!(depth = queue.len(), "context queue updated");
    });

    watch_and_log(status.subscribe_sound(), |sound| {
        if let Some(id) = sound {
            tracing::info!(sound = %id, "sound raised");
        }
    });
}

fn watch_and_log<T>(mut rx: watch::Receiver<T>, log: impl Fn(&T) + Send + 'static)
where
    T: Clone + Send + Sync + 'static,
{
    tokio::spawn(async move {
        while rx.changed().await.is_ok() {
            log(&rx.borrow_and_update());
        }
    });
}
