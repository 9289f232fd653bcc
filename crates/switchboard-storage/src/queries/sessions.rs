// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session record operations.

use std::str::FromStr;

use rusqlite::{Row, params};
use switchboard_core::SwitchboardError;
use switchboard_core::types::{AutoReplyConfig, SessionRecord, SessionStatus};

use crate::database::Database;

const SESSION_COLUMNS: &str = "id, session_id, name, status, phone_number, qr_code,
     auto_reply_enabled, auto_reply_message, is_active, last_connected_at,
     created_at, updated_at";

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<SessionRecord> {
    let status: String = row.get(3)?;
    let status = SessionStatus::from_str(&status).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(SessionRecord {
        id: row.get(0)?,
        session_id: row.get(1)?,
        name: row.get(2)?,
        status,
        phone_number: row.get(4)?,
        qr_code: row.get(5)?,
        auto_reply: AutoReplyConfig {
            enabled: row.get(6)?,
            message: row.get(7)?,
        },
        is_active: row.get(8)?,
        last_connected_at: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

/// Insert a new session record.
pub async fn create_session(db: &Database, session: &SessionRecord) -> Result<(), SwitchboardError> {
    let session = session.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO sessions (id, session_id, name, status, phone_number, qr_code,
                     auto_reply_enabled, auto_reply_message, is_active, last_connected_at,
                     created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
                params![
                    session.id,
                    session.session_id,
                    session.name,
                    session.status.to_string(),
                    session.phone_number,
                    session.qr_code,
                    session.auto_reply.enabled,
                    session.auto_reply.message,
                    session.is_active,
                    session.last_connected_at,
                    session.created_at,
                    session.updated_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

async fn get_one(
    db: &Database,
    column: &'static str,
    value: &str,
) -> Result<Option<SessionRecord>, SwitchboardError> {
    let value = value.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!("SELECT {SESSION_COLUMNS} FROM sessions WHERE {column} = ?1");
            match conn.query_row(&sql, params![value], row_to_session) {
                Ok(session) => Ok(Some(session)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a session by durable id.
pub async fn get_session(db: &Database, id: &str) -> Result<Option<SessionRecord>, SwitchboardError> {
    get_one(db, "id", id).await
}

/// Get a session by its tenant-assigned id.
pub async fn find_session(
    db: &Database,
    session_id: &str,
) -> Result<Option<SessionRecord>, SwitchboardError> {
    get_one(db, "session_id", session_id).await
}

/// List sessions, oldest first.
pub async fn list_sessions(
    db: &Database,
    active_only: bool,
) -> Result<Vec<SessionRecord>, SwitchboardError> {
    db.connection()
        .call(move |conn| {
            let filter = if active_only { "WHERE is_active = 1" } else { "" };
            let mut stmt = conn.prepare(&format!(
                "SELECT {SESSION_COLUMNS} FROM sessions {filter} ORDER BY created_at ASC"
            ))?;
            let rows = stmt.query_map([], row_to_session)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Run an UPDATE against one session row, bumping `updated_at`.
async fn update(
    db: &Database,
    id: &str,
    assignments: &'static str,
    values: Vec<rusqlite::types::Value>,
) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = format!(
                "UPDATE sessions SET {assignments},
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?{}",
                values.len() + 1
            );
            let mut params: Vec<rusqlite::types::Value> = values;
            params.push(id.into());
            conn.execute(&sql, rusqlite::params_from_iter(params))?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Update the lifecycle status.
pub async fn update_status(
    db: &Database,
    id: &str,
    status: SessionStatus,
) -> Result<(), SwitchboardError> {
    update(db, id, "status = ?1", vec![status.to_string().into()]).await
}

/// Store or clear the current QR challenge.
pub async fn set_qr_code(
    db: &Database,
    id: &str,
    qr_code: Option<&str>,
) -> Result<(), SwitchboardError> {
    let value = match qr_code {
        Some(qr) => qr.to_string().into(),
        None => rusqlite::types::Value::Null,
    };
    update(db, id, "qr_code = ?1", vec![value]).await
}

/// Record a successful open.
pub async fn mark_connected(
    db: &Database,
    id: &str,
    phone_number: &str,
) -> Result<(), SwitchboardError> {
    update(
        db,
        id,
        "status = 'connected', phone_number = ?1, qr_code = NULL,
         last_connected_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        vec![phone_number.to_string().into()],
    )
    .await
}

/// Replace the auto-reply policy.
pub async fn set_auto_reply(
    db: &Database,
    id: &str,
    auto_reply: &AutoReplyConfig,
) -> Result<(), SwitchboardError> {
    update(
        db,
        id,
        "auto_reply_enabled = ?1, auto_reply_message = ?2",
        vec![
            i64::from(auto_reply.enabled).into(),
            auto_reply.message.clone().into(),
        ],
    )
    .await
}

/// Deactivate a session and mark it disconnected.
pub async fn deactivate(db: &Database, id: &str) -> Result<(), SwitchboardError> {
    update(
        db,
        id,
        "is_active = 0, status = 'disconnected', qr_code = NULL",
        Vec::new(),
    )
    .await
}
