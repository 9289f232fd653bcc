// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential record operations.
//!
//! Values are stored as BLOBs so protocol key material round-trips byte
//! for byte.

use rusqlite::{OptionalExtension, params};
use switchboard_core::SwitchboardError;
use switchboard_core::types::CredentialState;

use crate::database::Database;

/// Read one credential value.
pub async fn read(
    db: &Database,
    session_id: &str,
    key: &str,
) -> Result<Option<Vec<u8>>, SwitchboardError> {
    let session_id = session_id.to_string();
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.query_row(
                "SELECT value FROM credentials WHERE session_id = ?1 AND key = ?2",
                params![session_id, key],
                |row| row.get::<_, Vec<u8>>(0),
            )
            .optional()
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Upsert one credential value; the last write wins.
pub async fn write(
    db: &Database,
    session_id: &str,
    key: &str,
    value: &[u8],
) -> Result<(), SwitchboardError> {
    let session_id = session_id.to_string();
    let key = key.to_string();
    let value = value.to_vec();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO credentials (session_id, key, value) VALUES (?1, ?2, ?3)
                 ON CONFLICT (session_id, key) DO UPDATE SET
                     value = excluded.value,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![session_id, key, value],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete one credential key. Deleting a missing key is not an error.
pub async fn delete(db: &Database, session_id: &str, key: &str) -> Result<(), SwitchboardError> {
    let session_id = session_id.to_string();
    let key = key.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM credentials WHERE session_id = ?1 AND key = ?2",
                params![session_id, key],
            )?;
            Ok(())
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Delete every key of a session in a single statement.
pub async fn clear_all(db: &Database, session_id: &str) -> Result<usize, SwitchboardError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM credentials WHERE session_id = ?1",
                params![session_id],
            )
        })
        .await
        .map_err(crate::database::map_tr_err)
}

/// Load every key of a session.
pub async fn load_state(db: &Database, session_id: &str) -> Result<CredentialState, SwitchboardError> {
    let session_id = session_id.to_string();
    db.connection()
        .call(move |conn| {
            let mut stmt =
                conn.prepare("SELECT key, value FROM credentials WHERE session_id = ?1")?;
            let rows = stmt.query_map(params![session_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Vec<u8>>(1)?))
            })?;
            let entries = rows.collect::<Result<_, _>>()?;
            Ok(CredentialState { entries })
        })
        .await
        .map_err(crate::database::map_tr_err)
}
