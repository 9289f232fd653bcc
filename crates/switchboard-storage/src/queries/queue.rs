// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Persisted outbound queue.
//!
//! Rows mirror the in-memory queue so buffered sends survive a restart.
//! Binary attachments go in the `data` BLOB column.

use std::str::FromStr;

use rusqlite::{Row, params};
use switchboard_core::SwitchboardError;
use switchboard_core::types::{OutboundPayload, PayloadKind, QueuedMessage};

use crate::database::Database;

/// Column values for one payload: (body, caption, filename, mimetype, data).
type PayloadColumns = (
    Option<String>,
    Option<String>,
    Option<String>,
    Option<String>,
    Option<Vec<u8>>,
);

fn payload_columns(payload: &OutboundPayload) -> PayloadColumns {
    match payload {
        OutboundPayload::Text { text } => (Some(text.clone()), None, None, None, None),
        OutboundPayload::Image { data, caption } | OutboundPayload::Video { data, caption } => {
            (None, caption.clone(), None, None, Some(data.clone()))
        }
        OutboundPayload::Document {
            data,
            filename,
            mimetype,
            caption,
        } => (
            None,
            caption.clone(),
            Some(filename.clone()),
            mimetype.clone(),
            Some(data.clone()),
        ),
    }
}

fn row_to_queued(row: &Row<'_>) -> rusqlite::Result<QueuedMessage> {
    let kind: String = row.get(3)?;
    let kind = PayloadKind::from_str(&kind).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(3, rusqlite::types::Type::Text, Box::new(e))
    })?;
    let body: Option<String> = row.get(4)?;
    let caption: Option<String> = row.get(5)?;
    let data: Option<Vec<u8>> = row.get(8)?;
    let payload = match kind {
        PayloadKind::Text => OutboundPayload::Text {
            text: body.unwrap_or_default(),
        },
        PayloadKind::Image => OutboundPayload::Image {
            data: data.unwrap_or_default(),
            caption,
        },
        PayloadKind::Video => OutboundPayload::Video {
            data: data.unwrap_or_default(),
            caption,
        },
        PayloadKind::Document => OutboundPayload::Document {
            data: data.unwrap_or_default(),
            filename: row.get::<_, Option<String>>(6)?.unwrap_or_default(),
            mimetype: row.get(7)?,
            caption,
        },
    };
    Ok(QueuedMessage {
        id: row.get(0)?,
        session_id: row.get(1)?,
        recipient: row.get(2)?,
        payload,
        retries: row.get(9)?,
        created_at: row.get(10)?,
    })
}

/// Persist a queued message.
pub async fn insert(db: &Database, message: &QueuedMessage) -> Result<(), SwitchboardError> {
    let (body, caption, filename, mimetype, data) = payload_columns(&message.payload);
    let kind = message.payload.kind().to_string();
    let id = message.id.clone();
    let session_id = message.session_id.clone();
    let recipient = message.recipient.clone();
    let retries = message.retries;
    let created_at = message.created_at.clone();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO outbound_queue (id, session_id, recipient, kind, body, caption,
                     filename, mimetype, data, retries, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id, session_id, recipient, kind, body, caption, filename, mimetype, data,
                    retries, created_at,
                ],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Set the retry counter of a queued message.
pub async fn update_retries(db: &Database, id: &str, retries: u32) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE outbound_queue SET retries = ?1 WHERE id = ?2",
                params![retries, id],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove a delivered or dropped message.
pub async fn delete(db: &Database, id: &str) -> Result<(), SwitchboardError> {
    let id = id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute("DELETE FROM outbound_queue WHERE id = ?1", params![id])?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Remove every queued message of one tenant session.
pub async fn delete_for_session(db: &Database, session_id: &str) -> Result<usize, SwitchboardError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM outbound_queue WHERE session_id = ?1",
                params![session_id],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// All queued messages in enqueue order.
pub async fn list(db: &Database) -> Result<Vec<QueuedMessage>, SwitchboardError> {
    db.connection()
        .call(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_id, recipient, kind, body, caption, filename, mimetype,
                     data, retries, created_at
                 FROM outbound_queue ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt.query_map([], row_to_queued)?;
            rows.collect::<Result<Vec<_>, _>>()
        })
        .await
        .map_err(crate::database::map_tr_err)
}
