// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test harness for end-to-end session manager testing.
//!
//! `TestHarness` assembles a [`SessionManager`] over temp SQLite storage and
//! a [`MockConnector`], and runs its event loop in the background.

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use switchboard_config::model::{StorageConfig, WebhookConfig};
use switchboard_core::types::{InboundEnvelope, InboundKind, SessionRecord};
use switchboard_core::{StorageAdapter, SwitchboardError};
use switchboard_session::{ManagerSettings, SessionManager};
use switchboard_storage::SqliteStorage;
use switchboard_webhook::WebhookDispatcher;

use crate::mock_connector::{MockConnection, MockConnector};

static NEXT_MESSAGE: AtomicU64 = AtomicU64::new(1);

/// How long [`TestHarness::wait_until`] polls before giving up.
const WAIT_LIMIT: Duration = Duration::from_secs(5);

/// Settings with millisecond timers; periodic drain and sweep are pushed
/// out of the way so tests drive them explicitly.
pub fn fast_settings() -> ManagerSettings {
    ManagerSettings {
        reconnect_delay: Duration::from_millis(50),
        max_credential_purges: 3,
        default_country_code: "91".to_string(),
        send_timeout: Duration::from_millis(200),
        max_send_timeout: Duration::from_secs(1),
        event_buffer: 64,
        drain_interval: Duration::from_secs(3600),
        max_retries: 3,
        probe_interval: Duration::from_secs(3600),
        sweep_interval: Duration::from_secs(3600),
        inactivity_threshold: Duration::from_secs(3600),
        probe_timeout: Duration::from_millis(100),
        resolver_max_entries: 100,
        resolver_max_age: Duration::from_secs(3600),
    }
}

/// A text message from `from`, as the network would report it.
pub fn inbound(from: &str, text: &str) -> InboundEnvelope {
    InboundEnvelope {
        message_id: format!("msg-{}", NEXT_MESSAGE.fetch_add(1, Ordering::Relaxed)),
        from: from.to_string(),
        sender_phone: None,
        from_me: false,
        push_name: Some("Tester".to_string()),
        timestamp: 1_767_225_600,
        kind: InboundKind::Text,
        text: Some(text.to_string()),
    }
}

/// Builder for creating test environments with configurable options.
pub struct TestHarnessBuilder {
    settings: ManagerSettings,
    webhook: WebhookConfig,
}

impl TestHarnessBuilder {
    fn new() -> Self {
        Self {
            settings: fast_settings(),
            webhook: WebhookConfig {
                timeout_secs: 2,
                ..WebhookConfig::default()
            },
        }
    }

    /// Adjust manager settings before the manager is built.
    pub fn with_settings(mut self, f: impl FnOnce(&mut ManagerSettings)) -> Self {
        f(&mut self.settings);
        self
    }

    /// Build the harness and start the manager's event loop.
    pub async fn build(self) -> Result<TestHarness, SwitchboardError> {
        let temp_dir = tempfile::TempDir::new().map_err(|e| SwitchboardError::Storage {
            source: e.into(),
        })?;
        let db_path = temp_dir.path().join("test.db");

        let storage = SqliteStorage::new(StorageConfig {
            database_path: db_path.to_string_lossy().to_string(),
            wal_mode: true,
        });
        storage.initialize().await?;
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);

        let connector = Arc::new(MockConnector::new());
        let webhooks = Arc::new(WebhookDispatcher::new(&self.webhook, storage.clone())?);
        let manager = SessionManager::new(self.settings, storage.clone(), connector.clone(), webhooks);

        let cancel = CancellationToken::new();
        let run = {
            let manager = manager.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move { manager.run(cancel).await })
        };

        Ok(TestHarness {
            manager,
            connector,
            storage,
            cancel,
            run: Some(run),
            _temp_dir: temp_dir,
        })
    }
}

/// A running session manager over mock connections and temp storage.
pub struct TestHarness {
    pub manager: SessionManager,
    pub connector: Arc<MockConnector>,
    /// SQLite storage adapter (temp DB, cleaned up on drop).
    pub storage: Arc<dyn StorageAdapter>,
    cancel: CancellationToken,
    run: Option<JoinHandle<Result<(), SwitchboardError>>>,
    /// Temp directory kept alive for cleanup on drop.
    _temp_dir: tempfile::TempDir,
}

impl TestHarness {
    pub fn builder() -> TestHarnessBuilder {
        TestHarnessBuilder::new()
    }

    /// Harness with default fast settings.
    pub async fn new() -> Result<Self, SwitchboardError> {
        Self::builder().build().await
    }

    /// Create a session record and connect it.
    pub async fn create(&self, session_id: &str) -> Result<SessionRecord, SwitchboardError> {
        let record = self.manager.create_session(session_id, None).await?;
        self.manager.connect(session_id).await?;
        Ok(record)
    }

    /// Create, connect and report the connection open as `phone`.
    pub async fn online(
        &self,
        session_id: &str,
        phone: &str,
    ) -> Result<MockConnection, SwitchboardError> {
        self.create(session_id).await?;
        let connection = self.latest(session_id)?;
        connection.open(phone).await;
        let manager = &self.manager;
        let connected = self
            .wait_until(|| async move {
                manager
                    .status(session_id)
                    .await
                    .is_ok_and(|s| s.connected)
            })
            .await;
        if !connected {
            return Err(SwitchboardError::Internal(format!(
                "session {session_id} never connected"
            )));
        }
        Ok(connection)
    }

    /// The most recent mock connection for a session.
    pub fn latest(&self, session_id: &str) -> Result<MockConnection, SwitchboardError> {
        self.connector
            .latest(session_id)
            .ok_or_else(|| SwitchboardError::Internal(format!("no connection opened for {session_id}")))
    }

    /// Poll `condition` until it holds or the wait limit passes.
    pub async fn wait_until<F, Fut>(&self, condition: F) -> bool
    where
        F: Fn() -> Fut,
        Fut: Future<Output = bool>,
    {
        let deadline = tokio::time::Instant::now() + WAIT_LIMIT;
        loop {
            if condition().await {
                return true;
            }
            if tokio::time::Instant::now() >= deadline {
                return false;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }

    /// Stop the event loop and wait for the manager to shut down.
    pub async fn shutdown(mut self) -> Result<(), SwitchboardError> {
        self.cancel.cancel();
        match self.run.take() {
            Some(run) => run
                .await
                .map_err(|e| SwitchboardError::Internal(format!("manager task failed: {e}")))?,
            None => Ok(()),
        }
    }
}

impl Drop for TestHarness {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn harness_brings_a_session_online() {
        let harness = TestHarness::new().await.unwrap();
        let connection = harness.online("tenant-a", "4915112345").await.unwrap();

        let status = harness.manager.status("tenant-a").await.unwrap();
        assert!(status.connected);
        assert_eq!(status.phone_number.as_deref(), Some("4915112345"));
        assert_eq!(connection.session_id, "tenant-a");

        harness.shutdown().await.unwrap();
    }
}
