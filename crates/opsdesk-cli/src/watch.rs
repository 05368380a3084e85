//! `opsdesk watch`: a live session driven from stdin.
//!
//! Every line typed counts as a key press for the alert gate, then is
//! parsed as a command.

use std::sync::Arc;

use anyhow::{Context, Result};
use opsdesk_core::models::SecurityNotice;
use opsdesk_core::notifications::NotificationCenter;
use opsdesk_core::views::{catalog, LiveView, NoticeSink};
use opsdesk_core::{GestureBus, GestureKind, Identity, SyncSession};
use serde_json::{json, Value};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};

use crate::output::print_json;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchCommand {
    ReadAll,
    Clear,
    Read(String),
    List,
    Status,
    Quit,
    Unknown(String),
}

impl WatchCommand {
    /// `None` for blank lines
    pub fn parse(line: &str) -> Option<Self> {
        let mut parts = line.split_whitespace();
        let command = match (parts.next()?, parts.next()) {
            ("read-all", None) => Self::ReadAll,
            ("clear", None) => Self::Clear,
            ("read", Some(id)) => Self::Read(id.to_string()),
            ("list" | "ls", None) => Self::List,
            ("status", None) => Self::Status,
            ("quit" | "exit" | "q", None) => Self::Quit,
            _ => Self::Unknown(line.trim().to_string()),
        };
        Some(command)
    }
}

/// Security alerts go to stderr, set apart from regular output.
struct TerminalNotices;

impl NoticeSink for TerminalNotices {
    fn show_blocking(&self, notice: SecurityNotice) {
        eprintln!();
        eprintln!("!! SECURITY ALERT: {}", notice.message);
        eprintln!();
    }
}

pub fn status_json(
    session: &SyncSession,
    center: &NotificationCenter,
    views: &[LiveView<Value>],
) -> Value {
    let connection = session.connection().map(|c| {
        json!({
            "handle": c.handle().to_string(),
            "identity": c.identity().as_str(),
            "connected": c.is_connected(),
        })
    });
    let stats = session.stats();
    let delivered: serde_json::Map<String, Value> = stats
        .topics_by_count()
        .into_iter()
        .map(|(topic, count)| (topic.to_string(), json!(count)))
        .collect();
    let views: Vec<Value> = views
        .iter()
        .map(|view| {
            let status = view.status();
            json!({
                "name": view.spec().name,
                "loaded": view.data().is_some(),
                "loading": status.loading,
                "error": status.error.map(|e| e.to_string()),
            })
        })
        .collect();

    json!({
        "connection": connection,
        "alerts": format!("{:?}", session.alert_gate().state()),
        "unread": center.unread_count(),
        "notifications": center.notifications().len(),
        "delivered": delivered,
        "unknownTopics": stats.unknown_topics,
        "views": views,
    })
}

/// Run one command. Returns false when the loop should stop.
pub async fn execute(
    session: &SyncSession,
    center: &NotificationCenter,
    views: &[LiveView<Value>],
    command: WatchCommand,
    pretty: bool,
) -> Result<bool> {
    let outcome = match command {
        WatchCommand::Quit => return Ok(false),
        WatchCommand::ReadAll => center.mark_all_read().await,
        WatchCommand::Clear => center.clear_all().await,
        WatchCommand::Read(id) => center.mark_read(&id).await,
        WatchCommand::List => {
            print_json(&center.notifications(), pretty)?;
            Ok(())
        }
        WatchCommand::Status => {
            print_json(&status_json(session, center, views), pretty)?;
            Ok(())
        }
        WatchCommand::Unknown(line) => {
            eprintln!("Unknown command: {} (read-all, clear, read <id>, list, status, quit)", line);
            Ok(())
        }
    };
    if let Err(e) = outcome {
        warn!("command failed: {}", e);
    }
    Ok(true)
}

pub async fn run_watch(session: &SyncSession, identity: Identity, pretty: bool) -> Result<()> {
    let gestures = GestureBus::new();
    session.arm_alerts(&gestures);

    if let Some(connection) = session.start(identity).await {
        info!(handle = %connection.handle(), "watching push channel");
    }

    let center = session.mount_notifications();
    let audit = session.mount_audit(Arc::new(TerminalNotices));
    let views: Vec<LiveView<Value>> = catalog::ALL
        .iter()
        .map(|spec| session.mount_view(*spec))
        .collect();

    if let Err(e) = audit.refresh().await {
        warn!("initial audit log load failed: {}", e);
    }
    for view in &views {
        if let Err(e) = view.refresh().await {
            warn!(view = view.spec().name, "initial load failed: {}", e);
        }
    }

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("Failed to read stdin")? else {
                    break;
                };
                gestures.emit(GestureKind::KeyPress);
                let Some(command) = WatchCommand::parse(&line) else {
                    continue;
                };
                if !execute(session, &center, &views, command, pretty).await? {
                    break;
                }
            }
            _ = tokio::signal::ctrl_c() => break,
        }
    }

    session.close();
    Ok(())
}
