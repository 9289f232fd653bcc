// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `switchboard status` command implementation.
//!
//! Reads durable session records and queued sends straight from SQLite, so
//! it works whether or not a gateway process is running.

use std::collections::HashMap;
use std::io::IsTerminal;

use serde::Serialize;
use switchboard_config::model::SwitchboardConfig;
use switchboard_core::types::{SessionRecord, SessionStatus};
use switchboard_core::{StorageAdapter, SwitchboardError};
use switchboard_storage::SqliteStorage;

/// One session row in `--json` output.
#[derive(Debug, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub name: Option<String>,
    pub status: SessionStatus,
    pub phone_number: Option<String>,
    pub active: bool,
    pub auto_reply: bool,
    pub queued_messages: usize,
    pub last_connected_at: Option<String>,
}

/// Structured status output for `--json` mode.
#[derive(Debug, Serialize)]
pub struct StatusResponse {
    pub database_path: String,
    pub sessions: Vec<SessionSummary>,
    pub queued_total: usize,
}

/// Run the `switchboard status` command.
///
/// If `--json` is passed, outputs structured JSON for scripting.
/// If `--plain` is passed or stdout is not a TTY, disables colors.
pub async fn run_status(
    config: &SwitchboardConfig,
    json: bool,
    plain: bool,
) -> Result<(), SwitchboardError> {
    let storage = SqliteStorage::new(config.storage.clone());
    storage.initialize().await?;
    let response = collect(&storage, &config.storage.database_path).await;
    storage.close().await?;
    let response = response?;

    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(&response).unwrap_or_else(|_| "{}".to_string())
        );
    } else {
        let use_color = !plain && std::io::stdout().is_terminal();
        print_status(&response, use_color);
    }
    Ok(())
}

async fn collect(
    storage: &dyn StorageAdapter,
    database_path: &str,
) -> Result<StatusResponse, SwitchboardError> {
    let sessions = storage.list_sessions(false).await?;
    let queued = storage.list_queued().await?;

    let mut per_session: HashMap<&str, usize> = HashMap::new();
    for message in &queued {
        *per_session.entry(message.session_id.as_str()).or_default() += 1;
    }

    let sessions = sessions
        .into_iter()
        .map(|record| {
            let queued_messages = per_session
                .get(record.session_id.as_str())
                .copied()
                .unwrap_or(0);
            summarize(record, queued_messages)
        })
        .collect();

    Ok(StatusResponse {
        database_path: database_path.to_string(),
        sessions,
        queued_total: queued.len(),
    })
}

fn summarize(record: SessionRecord, queued_messages: usize) -> SessionSummary {
    SessionSummary {
        session_id: record.session_id,
        name: record.name,
        status: record.status,
        phone_number: record.phone_number,
        active: record.is_active,
        auto_reply: record.auto_reply.enabled,
        queued_messages,
        last_connected_at: record.last_connected_at,
    }
}

/// Status marker in plain mode.
fn status_marker(status: SessionStatus) -> &'static str {
    match status {
        SessionStatus::Connected => "[OK]",
        SessionStatus::Pending => "[..]",
        SessionStatus::Disconnected => "[--]",
        SessionStatus::Error => "[FAIL]",
    }
}

fn print_status(response: &StatusResponse, use_color: bool) {
    println!();
    println!("  switchboard status");
    println!("  {}", "-".repeat(35));
    println!("    Database: {}", response.database_path);
    println!(
        "    Sessions: {}   Queued: {}",
        response.sessions.len(),
        response.queued_total
    );
    println!();

    if response.sessions.is_empty() {
        println!("    No sessions yet.");
        println!();
        return;
    }

    for session in &response.sessions {
        let label = session.status.to_string();
        if use_color {
            use colored::Colorize;
            let state = match session.status {
                SessionStatus::Connected => format!("{} {}", "✓".green(), label.green()),
                SessionStatus::Pending => format!("{} {}", "…".yellow(), label.yellow()),
                SessionStatus::Disconnected => format!("{} {}", "-".dimmed(), label.dimmed()),
                SessionStatus::Error => format!("{} {}", "✗".red(), label.red()),
            };
            println!("    {:<20} {}", session.session_id.bold(), state);
        } else {
            println!(
                "    {:<20} {} {}",
                session.session_id,
                status_marker(session.status),
                label
            );
        }

        if let Some(phone) = &session.phone_number {
            println!("      phone:          {phone}");
        }
        if let Some(at) = &session.last_connected_at {
            println!("      last connected: {at}");
        }
        if session.queued_messages > 0 {
            println!("      queued:         {}", session.queued_messages);
        }
        if !session.active {
            println!("      deleted");
        }
    }
    println!();
}
