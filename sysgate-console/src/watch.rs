//! `watch`: one gatekeeper session driven by stdin commands.

use anyhow::{Context, Result};
use std::io::BufRead;
use std::sync::Arc;
use std::time::Duration;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use sysgate_common::SysgateConfig;
use sysgate_gatekeeper::{
    drive, spawn_monitor, ConnectivityProbe, DecisionError, GateSession, Intent, SessionConfig,
    SessionError, SessionHandle, SessionStatus, TokioScheduler, WsTransport,
};
use sysgate_logstore::{ActivityLog, BackgroundLogger, LogStore, NewLogEntry};

use crate::notifier::{render_case, ConsoleNotifier};

const CLOSE_WAIT: Duration = Duration::from_secs(3);

pub async fn run(cfg: SysgateConfig) -> Result<()> {
    let store = LogStore::open(&cfg.logs.path)
        .with_context(|| format!("open log store {}", cfg.logs.path.display()))?;
    let (logger, writer) = BackgroundLogger::spawn(store);
    let logger = Arc::new(logger);

    let (tx, rx) = mpsc::unbounded_channel();
    let transport = WsTransport::new(tx.clone());
    let shutdown = transport.shutdown_handle();
    let mut session = GateSession::new(
        SessionConfig::from_config(&cfg),
        Box::new(transport),
        Box::new(TokioScheduler::new(tx.clone())),
        Arc::new(ConsoleNotifier),
        logger.clone(),
    );
    match session.open() {
        Ok(()) => {}
        Err(SessionError::Transport(err)) => warn!("First connection attempt failed: {}", err),
        Err(err) => return Err(err).context("start gatekeeper session"),
    }

    let handle = SessionHandle::new(tx);
    let mut driver = tokio::spawn(drive(session, rx));

    let (mut network, monitor) = spawn_monitor(
        ConnectivityProbe::from_config(&cfg.network),
        cfg.network.monitor_interval(),
    );
    let network_log = logger.clone();
    let network_task = tokio::spawn(async move {
        while network.changed().await.is_ok() {
            let status = *network.borrow_and_update();
            match status {
                Some(true) => network_log.record(NewLogEntry::info("network.status", "Network online")),
                Some(false) => network_log.record(NewLogEntry::warn("network.status", "Network offline")),
                None => {}
            }
        }
    });

    info!("Watching gatekeeper as {}; type approve, reject, dismiss, status or quit", cfg.operator.username);
    let lines = spawn_stdin_reader();

    let session = tokio::select! {
        joined = &mut driver => joined.context("session task failed")?,
        _ = operator_loop(handle.clone(), lines) => {
            handle.teardown();
            driver.await.context("session task failed")?
        }
    };
    info!("Session ended ({})", session.state());

    monitor.abort();
    network_task.abort();
    let _ = network_task.await;
    drop(session);
    if !shutdown.wait(CLOSE_WAIT).await {
        warn!("Gatekeeper did not acknowledge the close in time");
    }
    drop(logger);
    writer.await.context("log writer failed")?;
    Ok(())
}

async fn operator_loop(handle: SessionHandle, lines: mpsc::UnboundedReceiver<String>) {
    tokio::select! {
        result = signal::ctrl_c() => match result {
            Ok(()) => info!("Interrupted; closing session"),
            Err(err) => warn!("Failed to listen for Ctrl-C: {}", err),
        },
        _ = read_commands(&handle, lines) => {}
    }
}

// Blocking reads stay off the runtime so shutdown never waits on stdin.
fn spawn_stdin_reader() -> mpsc::UnboundedReceiver<String> {
    let (tx, rx) = mpsc::unbounded_channel();
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            match line {
                Ok(line) => {
                    if tx.send(line).is_err() {
                        break;
                    }
                }
                Err(err) => {
                    warn!("Failed to read stdin: {}", err);
                    break;
                }
            }
        }
    });
    rx
}

/// Returns on `quit`, end of input, or once the session is gone.
async fn read_commands(handle: &SessionHandle, mut lines: mpsc::UnboundedReceiver<String>) {
    while let Some(line) = lines.recv().await {
        match line.trim() {
            "" => {}
            "quit" | "exit" => return,
            "status" => match handle.status().await {
                Some(status) => println!("{}", format_status(&status)),
                None => return,
            },
            "dismiss" => {
                if !handle.dismiss() {
                    return;
                }
            }
            other => match other.parse::<Intent>() {
                Ok(intent) => match handle.decide(intent).await {
                    Ok(outcome) => debug!("Decision {} sent", outcome.decision_id),
                    Err(DecisionError::SessionEnded) => return,
                    // already surfaced through the notifier
                    Err(err) => debug!("Decision not sent: {}", err),
                },
                Err(err) => println!("{err}; commands: approve, reject, dismiss, status, quit"),
            },
        }
    }
}

fn format_status(status: &SessionStatus) -> String {
    let mut out = format!("state: {}", status.state);
    if status.reconnect_pending {
        out.push_str(" (reconnect scheduled)");
    }
    match &status.pending {
        Some(decision) => {
            out.push('\n');
            out.push_str(&render_case(decision));
        }
        None => out.push_str("\nno pending decision"),
    }
    out
}
