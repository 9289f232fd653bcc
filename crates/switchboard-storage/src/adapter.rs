// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite implementation of the StorageAdapter trait.

use async_trait::async_trait;
use tokio::sync::OnceCell;
use tracing::debug;

use switchboard_config::model::StorageConfig;
use switchboard_core::types::{
    AutoReplyConfig, CredentialState, QueuedMessage, SessionRecord, SessionStatus,
    WebhookRegistration,
};
use switchboard_core::{AdapterType, HealthStatus, PluginAdapter, StorageAdapter, SwitchboardError};

use crate::database::Database;
use crate::queries;

/// SQLite-backed storage adapter.
///
/// The database is opened by [`StorageAdapter::initialize`]; every other
/// call fails until then.
pub struct SqliteStorage {
    config: StorageConfig,
    db: OnceCell<Database>,
}

impl SqliteStorage {
    pub fn new(config: StorageConfig) -> Self {
        Self {
            config,
            db: OnceCell::new(),
        }
    }

    fn db(&self) -> Result<&Database, SwitchboardError> {
        self.db.get().ok_or_else(|| SwitchboardError::Storage {
            source: "storage not initialized -- call initialize() first".into(),
        })
    }

    async fn checkpoint(db: &Database) -> Result<(), SwitchboardError> {
        db.connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("PRAGMA wal_checkpoint(TRUNCATE);")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)
    }
}

#[async_trait]
impl PluginAdapter for SqliteStorage {
    fn name(&self) -> &str {
        "sqlite"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Storage
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        self.db()?
            .connection()
            .call(|conn| -> Result<(), rusqlite::Error> {
                conn.execute_batch("SELECT 1;")?;
                Ok(())
            })
            .await
            .map_err(crate::database::map_tr_err)?;
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        if let Some(db) = self.db.get() {
            Self::checkpoint(db).await?;
            debug!("shutdown: WAL checkpoint complete");
        }
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for SqliteStorage {
    async fn initialize(&self) -> Result<(), SwitchboardError> {
        let db = Database::open_with(&self.config.database_path, self.config.wal_mode).await?;
        self.db.set(db).map_err(|_| SwitchboardError::Storage {
            source: "storage already initialized".into(),
        })?;
        debug!(path = %self.config.database_path, "SQLite storage initialized");
        Ok(())
    }

    async fn close(&self) -> Result<(), SwitchboardError> {
        Self::checkpoint(self.db()?).await?;
        debug!("WAL checkpoint complete");
        Ok(())
    }

    // --- Sessions ---

    async fn create_session(&self, session: &SessionRecord) -> Result<(), SwitchboardError> {
        queries::sessions::create_session(self.db()?, session).await
    }

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, SwitchboardError> {
        queries::sessions::get_session(self.db()?, id).await
    }

    async fn find_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, SwitchboardError> {
        queries::sessions::find_session(self.db()?, session_id).await
    }

    async fn list_sessions(
        &self,
        active_only: bool,
    ) -> Result<Vec<SessionRecord>, SwitchboardError> {
        queries::sessions::list_sessions(self.db()?, active_only).await
    }

    async fn update_session_status(
        &self,
        id: &str,
        status: SessionStatus,
    ) -> Result<(), SwitchboardError> {
        queries::sessions::update_status(self.db()?, id, status).await
    }

    async fn set_qr_code(&self, id: &str, qr_code: Option<&str>) -> Result<(), SwitchboardError> {
        queries::sessions::set_qr_code(self.db()?, id, qr_code).await
    }

    async fn mark_connected(&self, id: &str, phone_number: &str) -> Result<(), SwitchboardError> {
        queries::sessions::mark_connected(self.db()?, id, phone_number).await
    }

    async fn set_auto_reply(
        &self,
        id: &str,
        auto_reply: &AutoReplyConfig,
    ) -> Result<(), SwitchboardError> {
        queries::sessions::set_auto_reply(self.db()?, id, auto_reply).await
    }

    async fn deactivate_session(&self, id: &str) -> Result<(), SwitchboardError> {
        queries::sessions::deactivate(self.db()?, id).await
    }

    // --- Credentials ---

    async fn read_credential(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, SwitchboardError> {
        queries::credentials::read(self.db()?, session_id, key).await
    }

    async fn write_credential(
        &self,
        session_id: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), SwitchboardError> {
        queries::credentials::write(self.db()?, session_id, key, value).await
    }

    async fn delete_credential(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<(), SwitchboardError> {
        queries::credentials::delete(self.db()?, session_id, key).await
    }

    async fn clear_credentials(&self, session_id: &str) -> Result<usize, SwitchboardError> {
        queries::credentials::clear_all(self.db()?, session_id).await
    }

    async fn load_credentials(
        &self,
        session_id: &str,
    ) -> Result<CredentialState, SwitchboardError> {
        queries::credentials::load_state(self.db()?, session_id).await
    }

    // --- Webhooks ---

    async fn upsert_webhook(
        &self,
        id: &str,
        session_id: &str,
        url: &str,
        events: &[String],
        secret: &str,
    ) -> Result<WebhookRegistration, SwitchboardError> {
        queries::webhooks::upsert(self.db()?, id, session_id, url, events, secret).await
    }

    async fn get_webhook(&self, id: &str) -> Result<Option<WebhookRegistration>, SwitchboardError> {
        queries::webhooks::get(self.db()?, id).await
    }

    async fn list_webhooks(
        &self,
        session_id: &str,
        active_only: bool,
    ) -> Result<Vec<WebhookRegistration>, SwitchboardError> {
        queries::webhooks::list_for_session(self.db()?, session_id, active_only).await
    }

    async fn set_webhook_active(&self, id: &str, active: bool) -> Result<(), SwitchboardError> {
        queries::webhooks::set_active(self.db()?, id, active).await
    }

    async fn record_webhook_result(
        &self,
        id: &str,
        success: bool,
    ) -> Result<(), SwitchboardError> {
        queries::webhooks::record_result(self.db()?, id, success).await
    }

    // --- Outbound queue ---

    async fn insert_queued(&self, message: &QueuedMessage) -> Result<(), SwitchboardError> {
        queries::queue::insert(self.db()?, message).await
    }

    async fn update_queued_retries(&self, id: &str, retries: u32) -> Result<(), SwitchboardError> {
        queries::queue::update_retries(self.db()?, id, retries).await
    }

    async fn delete_queued(&self, id: &str) -> Result<(), SwitchboardError> {
        queries::queue::delete(self.db()?, id).await
    }

    async fn delete_queued_for_session(
        &self,
        session_id: &str,
    ) -> Result<usize, SwitchboardError> {
        queries::queue::delete_for_session(self.db()?, session_id).await
    }

    async fn list_queued(&self) -> Result<Vec<QueuedMessage>, SwitchboardError> {
        queries::queue::list(self.db()?).await
    }
}
