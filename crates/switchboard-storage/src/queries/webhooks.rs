// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook registration operations.

use rusqlite::{OptionalExtension, Row, params};
use switchboard_core::SwitchboardError;
use switchboard_core::types::WebhookRegistration;

use crate::database::Database;

const WEBHOOK_COLUMNS: &str = "id, session_id, url, secret, events, is_active,
     failed_attempts, last_success_at, last_failure_at, created_at";

fn row_to_webhook(row: &Row<'_>) -> rusqlite::Result<WebhookRegistration> {
    let events: String = row.get(4)?;
    let events: Vec<String> = serde_json::from_str(&events).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(WebhookRegistration {
        id: row.get(0)?,
        session_id: row.get(1)?,
        url: row.get(2)?,
        secret: row.get(3)?,
        events,
        is_active: row.get(5)?,
        failed_attempts: row.get(6)?,
        last_success_at: row.get(7)?,
        last_failure_at: row.get(8)?,
        created_at: row.get(9)?,
    })
}

/// Insert a registration or refresh the existing one for (session, url).
///
/// An existing row keeps its id and secret; its event set is replaced and
/// it is reactivated. Runs in one transaction.
pub async fn upsert(
    db: &Database,
    id: &str,
    session_id: &str,
    url: &str,
    events: &[String],
    secret: &str,
) -> Result<WebhookRegistration, SwitchboardError> {
    let id = id.to_string();
    let session_id = session_id.to_string();
    let url = url.to_string();
    let secret = secret.to_string();
    let events = serde_json::to_string(events).map_err(|e| SwitchboardError::Storage {
        source: Box::new(e),
    })?;
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let existing: Option<String> = tx
                .query_row(
                    "SELECT id FROM webhooks WHERE session_id = ?1 AND url = ?2",
                    params![session_id, url],
                    |row| row.get(0),
                )
                .optional()?;
            let webhook_id = match existing {
                Some(existing_id) => {
                    tx.execute(
                        "UPDATE webhooks SET events = ?1, is_active = 1,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?2",
                        params![events, existing_id],
                    )?;
                    existing_id
                }
                None => {
                    tx.execute(
                        "INSERT INTO webhooks (id, session_id, url, secret, events)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                        params![id, session_id, url, secret, events],
                    )?;
                    id
                }
            };
            let registration = tx.query_row(
                &format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = ?1"),
                params![webhook_id],
                row_to_webhook,
            )?;
            tx.commit()?;
            Ok(registration)
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Get a registration by id.
pub async fn get(db: &Database, id: &str) -> Result<Option<WebhookRegistration>, SwitchboardError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                &format!("SELECT {WEBHOOK_COLUMNS} FROM webhooks WHERE id = ?1"),
                params![id],
                row_to_webhook,
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// List the registrations of one session, oldest first.
pub async fn list_for_session(
    db: &Database,
    session_id: &str,
    active_only: bool,
) -> Result<Vec<WebhookRegistration>, SwitchboardError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let filter = if active_only { "AND is_active = 1" } else { "" };
            let mut stmt = conn.prepare(&format!(
                "SELECT {WEBHOOK_COLUMNS} FROM webhooks
                 WHERE session_id = ?1 {filter} ORDER BY created_at ASC, id ASC"
            ))?;
            let rows = stmt.query_map(params![session_id], row_to_webhook)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Enable or disable a registration.
pub async fn set_active(db: &Database, id: &str, active: bool) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE webhooks SET is_active = ?1,
                 updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?2",
                params![active, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Record a delivery outcome on the failure counters.
///
/// Success resets `failed_attempts`; failure increments it.
pub async fn record_result(db: &Database, id: &str, success: bool) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            let sql = if success {
                "UPDATE webhooks SET failed_attempts = 0,
                 last_success_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1"
            } else {
                "UPDATE webhooks SET failed_attempts = failed_attempts + 1,
                 last_failure_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1"
            };
            conn.execute(sql, params![id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}
