// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Credential Store Adapter.
//!
//! Persists the opaque key/value credential material a connection emits
//! and restores it before the next open. Keys are scoped by the durable
//! session id.

use std::sync::Arc;

use switchboard_core::types::{CredentialChange, CredentialCheck, CredentialState};
use switchboard_core::{StorageAdapter, SwitchboardError};
use tracing::{debug, warn};

/// Credential state ready to hand to a connector.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedCredentials {
    pub state: CredentialState,
    /// Incomplete state was found and purged; `state` is empty.
    pub purged: bool,
}

pub struct CredentialStore {
    storage: Arc<dyn StorageAdapter>,
}

impl CredentialStore {
    pub fn new(storage: Arc<dyn StorageAdapter>) -> Self {
        Self { storage }
    }

    pub async fn read(&self, session_id: &str, key: &str) -> Result<Option<Vec<u8>>, SwitchboardError> {
        self.storage.read_credential(session_id, key).await
    }

    pub async fn write(&self, session_id: &str, key: &str, value: &[u8]) -> Result<(), SwitchboardError> {
        self.storage.write_credential(session_id, key, value).await
    }

    pub async fn delete(&self, session_id: &str, key: &str) -> Result<(), SwitchboardError> {
        self.storage.delete_credential(session_id, key).await
    }

    /// Removes every key of a session in a single statement.
    pub async fn clear_all(&self, session_id: &str) -> Result<usize, SwitchboardError> {
        let removed = self.storage.clear_credentials(session_id).await?;
        debug!(session_id, removed, "credentials cleared");
        Ok(removed)
    }

    /// Applies a batch of updates emitted by a live connection.
    pub async fn apply(&self, session_id: &str, changes: &[CredentialChange]) -> Result<(), SwitchboardError> {
        for change in changes {
            match &change.value {
                Some(value) => self.write(session_id, &change.key, value).await?,
                None => self.delete(session_id, &change.key).await?,
            }
        }
        Ok(())
    }

    /// Loads persisted state, purging it when structurally incomplete.
    ///
    /// Complete state is returned as-is; empty or purged state makes the
    /// connector start a fresh pairing.
    pub async fn prepare(&self, session_id: &str) -> Result<PreparedCredentials, SwitchboardError> {
        let state = self.storage.load_credentials(session_id).await?;
        match state.check() {
            CredentialCheck::Complete | CredentialCheck::Empty => Ok(PreparedCredentials {
                state,
                purged: false,
            }),
            CredentialCheck::Incomplete => {
                warn!(
                    session_id,
                    keys = state.entries.len(),
                    "persisted credentials incomplete, purging for fresh pairing"
                );
                self.clear_all(session_id).await?;
                Ok(PreparedCredentials {
                    state: CredentialState::default(),
                    purged: true,
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_config::model::StorageConfig;
    use switchboard_core::types::{AutoReplyConfig, CREDS_KEY, SessionRecord, SessionStatus};
    use switchboard_storage::SqliteStorage;
    use tempfile::TempDir;

    async fn setup() -> (CredentialStore, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("creds.db").to_str().unwrap().to_string(),
            wal_mode: true,
        });
        storage.initialize().await.unwrap();
        storage
            .create_session(&SessionRecord {
                id: "d-1".to_string(),
                session_id: "tenant-a".to_string(),
                name: None,
                status: SessionStatus::Pending,
                phone_number: None,
                qr_code: None,
                auto_reply: AutoReplyConfig::default(),
                is_active: true,
                last_connected_at: None,
                created_at: "2026-01-01T00:00:00.000Z".to_string(),
                updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            })
            .await
            .unwrap();
        (CredentialStore::new(Arc::new(storage)), dir)
    }

    #[tokio::test]
    async fn apply_writes_and_deletes() {
        let (store, _dir) = setup().await;
        store
            .apply(
                "d-1",
                &[
                    CredentialChange {
                        key: "pre-key-1".to_string(),
                        value: Some(vec![0, 1, 2, 255]),
                    },
                    CredentialChange {
                        key: "pre-key-2".to_string(),
                        value: Some(vec![9]),
                    },
                ],
            )
            .await
            .unwrap();
        store
            .apply(
                "d-1",
                &[CredentialChange {
                    key: "pre-key-2".to_string(),
                    value: None,
                }],
            )
            .await
            .unwrap();

        assert_eq!(store.read("d-1", "pre-key-1").await.unwrap(), Some(vec![0, 1, 2, 255]));
        assert_eq!(store.read("d-1", "pre-key-2").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prepare_keeps_complete_state() {
        let (store, _dir) = setup().await;
        store
            .write("d-1", CREDS_KEY, br#"{"identity":{"id":"x"}}"#)
            .await
            .unwrap();
        let prepared = store.prepare("d-1").await.unwrap();
        assert!(!prepared.purged);
        assert_eq!(prepared.state.check(), CredentialCheck::Complete);
    }

    #[tokio::test]
    async fn prepare_purges_incomplete_state() {
        let (store, _dir) = setup().await;
        store.write("d-1", CREDS_KEY, br#"{"registered":true}"#).await.unwrap();
        store.write("d-1", "session-abc", b"opaque").await.unwrap();

        let prepared = store.prepare("d-1").await.unwrap();
        assert!(prepared.purged);
        assert!(prepared.state.is_empty());
        assert_eq!(store.read("d-1", "session-abc").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prepare_on_empty_state_is_fresh() {
        let (store, _dir) = setup().await;
        let prepared = store.prepare("d-1").await.unwrap();
        assert!(!prepared.purged);
        assert!(prepared.state.is_empty());
    }
}
