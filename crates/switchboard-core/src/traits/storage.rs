// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Storage adapter trait for persistence backends (SQLite, etc.).

use async_trait::async_trait;

use crate::error::SwitchboardError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{
    AutoReplyConfig, CredentialState, QueuedMessage, SessionRecord, SessionStatus,
    WebhookRegistration,
};

/// Adapter for storage and persistence backends.
///
/// Session ids passed to session, credential and webhook methods are the
/// internal durable ids; queue methods use tenant session ids.
#[async_trait]
pub trait StorageAdapter: PluginAdapter {
    /// Initializes the storage backend (migrations, connection pool, etc.).
    async fn initialize(&self) -> Result<(), SwitchboardError>;

    /// Closes the storage backend, flushing pending writes and releasing connections.
    async fn close(&self) -> Result<(), SwitchboardError>;

    // --- Sessions ---

    async fn create_session(&self, session: &SessionRecord) -> Result<(), SwitchboardError>;

    async fn get_session(&self, id: &str) -> Result<Option<SessionRecord>, SwitchboardError>;

    /// Looks a session up by its tenant-assigned id.
    async fn find_session(
        &self,
        session_id: &str,
    ) -> Result<Option<SessionRecord>, SwitchboardError>;

    async fn list_sessions(&self, active_only: bool)
    -> Result<Vec<SessionRecord>, SwitchboardError>;

    async fn update_session_status(
        &self,
        id: &str,
        status: SessionStatus,
    ) -> Result<(), SwitchboardError>;

    async fn set_qr_code(&self, id: &str, qr_code: Option<&str>) -> Result<(), SwitchboardError>;

    /// Records a successful open: status, phone number, timestamp, QR cleared.
    async fn mark_connected(&self, id: &str, phone_number: &str) -> Result<(), SwitchboardError>;

    async fn set_auto_reply(
        &self,
        id: &str,
        auto_reply: &AutoReplyConfig,
    ) -> Result<(), SwitchboardError>;

    /// Deactivates a session so it is never resumed.
    async fn deactivate_session(&self, id: &str) -> Result<(), SwitchboardError>;

    // --- Credentials ---

    async fn read_credential(
        &self,
        session_id: &str,
        key: &str,
    ) -> Result<Option<Vec<u8>>, SwitchboardError>;

    async fn write_credential(
        &self,
        session_id: &str,
        key: &str,
        value: &[u8],
    ) -> Result<(), SwitchboardError>;

    async fn delete_credential(&self, session_id: &str, key: &str)
    -> Result<(), SwitchboardError>;

    /// Removes every credential key of a session in one step. Returns the count removed.
    async fn clear_credentials(&self, session_id: &str) -> Result<usize, SwitchboardError>;

    async fn load_credentials(&self, session_id: &str)
    -> Result<CredentialState, SwitchboardError>;

    // --- Webhooks ---

    /// Inserts a registration, or updates the existing one for (session, url).
    ///
    /// `secret` is only used when a new row is created.
    async fn upsert_webhook(
        &self,
        id: &str,
        session_id: &str,
        url: &str,
        events: &[String],
        secret: &str,
    ) -> Result<WebhookRegistration, SwitchboardError>;

    async fn get_webhook(&self, id: &str) -> Result<Option<WebhookRegistration>, SwitchboardError>;

    async fn list_webhooks(
        &self,
        session_id: &str,
        active_only: bool,
    ) -> Result<Vec<WebhookRegistration>, SwitchboardError>;

    async fn set_webhook_active(&self, id: &str, active: bool) -> Result<(), SwitchboardError>;

    async fn record_webhook_result(&self, id: &str, success: bool)
    -> Result<(), SwitchboardError>;

    // --- Outbound queue ---

    async fn insert_queued(&self, message: &QueuedMessage) -> Result<(), SwitchboardError>;

    async fn update_queued_retries(&self, id: &str, retries: u32) -> Result<(), SwitchboardError>;

    async fn delete_queued(&self, id: &str) -> Result<(), SwitchboardError>;

    async fn delete_queued_for_session(&self, session_id: &str)
    -> Result<usize, SwitchboardError>;

    /// Every persisted queued message, oldest first.
    async fn list_queued(&self) -> Result<Vec<QueuedMessage>, SwitchboardError>;
}
