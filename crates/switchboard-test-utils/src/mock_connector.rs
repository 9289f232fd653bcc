// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock connector for deterministic testing.
//!
//! `MockConnector` implements `Connector` with scripted open outcomes. Each
//! successful open yields a [`MockConnection`] the test uses to push
//! protocol events (QR, open, close, inbound messages) to the manager.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use switchboard_core::types::{
    CloseReason, ConnectionEvent, CredentialChange, CredentialState, InboundEnvelope,
};
use switchboard_core::{
    AdapterType, Connection, Connector, HealthStatus, PluginAdapter, SessionId, SwitchboardError,
};

use crate::mock_handle::MockHandle;

/// Outcome of the next scripted `open` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpenOutcome {
    Succeed,
    /// Fail with a transient connection error.
    Fail(String),
    /// Fail with [`SwitchboardError::CredentialsRejected`].
    RejectCredentials(String),
}

/// Test-side end of one opened connection.
#[derive(Clone)]
pub struct MockConnection {
    pub session_id: String,
    pub handle: Arc<MockHandle>,
    /// Credential state the connection was opened with.
    pub credentials: CredentialState,
    events: mpsc::Sender<ConnectionEvent>,
}

impl MockConnection {
    /// Push a raw event to the manager.
    pub async fn emit(&self, event: ConnectionEvent) {
        let _ = self.events.send(event).await;
    }

    pub async fn qr(&self, payload: &str) {
        self.emit(ConnectionEvent::QrIssued {
            payload: payload.to_string(),
        })
        .await;
    }

    /// Report the connection as open for the given phone digits.
    pub async fn open(&self, phone: &str) {
        self.emit(ConnectionEvent::Opened {
            self_address: format!("{phone}:7@s.whatsapp.net"),
        })
        .await;
    }

    pub async fn close(&self, reason: CloseReason) {
        self.emit(ConnectionEvent::Closed { reason }).await;
    }

    pub async fn receive(&self, envelope: InboundEnvelope) {
        self.emit(ConnectionEvent::MessageReceived(envelope)).await;
    }

    pub async fn update_credentials(&self, changes: Vec<CredentialChange>) {
        self.emit(ConnectionEvent::CredentialsUpdated(changes)).await;
    }
}

/// A mock connection factory.
pub struct MockConnector {
    opens: AtomicUsize,
    script: Mutex<VecDeque<OpenOutcome>>,
    open_delay: Mutex<Duration>,
    connections: Mutex<Vec<MockConnection>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockConnector {
    /// Create a connector whose opens all succeed immediately.
    pub fn new() -> Self {
        Self {
            opens: AtomicUsize::new(0),
            script: Mutex::new(VecDeque::new()),
            open_delay: Mutex::new(Duration::ZERO),
            connections: Mutex::new(Vec::new()),
        }
    }

    /// Queue outcomes for the next `open` calls; unscripted calls succeed.
    pub fn script(&self, outcomes: impl IntoIterator<Item = OpenOutcome>) {
        lock(&self.script).extend(outcomes);
    }

    /// Delay every subsequent `open` call.
    pub fn set_open_delay(&self, delay: Duration) {
        *lock(&self.open_delay) = delay;
    }

    /// Number of `open` calls, successful or not.
    pub fn open_count(&self) -> usize {
        self.opens.load(Ordering::SeqCst)
    }

    /// Successful opens for a session, oldest first.
    pub fn connections(&self, session_id: &str) -> Vec<MockConnection> {
        lock(&self.connections)
            .iter()
            .filter(|c| c.session_id == session_id)
            .cloned()
            .collect()
    }

    /// Most recent successful open for a session.
    pub fn latest(&self, session_id: &str) -> Option<MockConnection> {
        lock(&self.connections)
            .iter()
            .rev()
            .find(|c| c.session_id == session_id)
            .cloned()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl PluginAdapter for MockConnector {
    fn name(&self) -> &str {
        "mock-connector"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Connector
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        Ok(())
    }
}

#[async_trait]
impl Connector for MockConnector {
    async fn open(
        &self,
        session_id: &SessionId,
        credentials: CredentialState,
    ) -> Result<Connection, SwitchboardError> {
        self.opens.fetch_add(1, Ordering::SeqCst);
        let delay = *lock(&self.open_delay);
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let outcome = lock(&self.script)
            .pop_front()
            .unwrap_or(OpenOutcome::Succeed);
        match outcome {
            OpenOutcome::Succeed => {}
            OpenOutcome::Fail(message) => return Err(SwitchboardError::connection(message)),
            OpenOutcome::RejectCredentials(reason) => {
                return Err(SwitchboardError::CredentialsRejected {
                    session_id: session_id.to_string(),
                    reason,
                });
            }
        }

        let (tx, rx) = mpsc::channel(64);
        let handle = Arc::new(MockHandle::new());
        lock(&self.connections).push(MockConnection {
            session_id: session_id.to_string(),
            handle: handle.clone(),
            credentials,
            events: tx,
        });
        Ok(Connection { handle, events: rx })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_outcomes_run_in_order() {
        let connector = MockConnector::new();
        connector.script([
            OpenOutcome::Fail("down".into()),
            OpenOutcome::RejectCredentials("401".into()),
        ]);
        let sid = SessionId("s".into());

        let first = connector.open(&sid, CredentialState::default()).await;
        assert_eq!(first.err().map(|e| e.code()), Some("CONNECTION_ERROR"));
        let second = connector.open(&sid, CredentialState::default()).await;
        assert_eq!(second.err().map(|e| e.code()), Some("CREDENTIALS_REJECTED"));
        assert!(connector.open(&sid, CredentialState::default()).await.is_ok());

        assert_eq!(connector.open_count(), 3);
        assert_eq!(connector.connections("s").len(), 1);
    }

    #[tokio::test]
    async fn events_reach_the_connection_receiver() {
        let connector = MockConnector::new();
        let mut connection = connector
            .open(&SessionId("s".into()), CredentialState::default())
            .await
            .unwrap();
        connector.latest("s").unwrap().qr("qr-1").await;

        assert_eq!(
            connection.events.recv().await,
            Some(ConnectionEvent::QrIssued {
                payload: "qr-1".into()
            })
        );
    }
}
