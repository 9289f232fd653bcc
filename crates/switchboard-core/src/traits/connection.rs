// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The opaque connection primitive consumed by the session manager.
//!
//! A [`Connector`] opens one live connection per session. The protocol
//! itself (handshake, encryption, framing) lives behind it; the manager only
//! sees a [`ConnectionHandle`] for outbound calls and a bounded channel of
//! [`ConnectionEvent`]s for everything the network reports.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::SwitchboardError;
use crate::traits::adapter::PluginAdapter;
use crate::types::{ConnectionEvent, CredentialState, DeliveryId, OutboundPayload, SessionId};

/// A freshly opened connection.
pub struct Connection {
    pub handle: Arc<dyn ConnectionHandle>,
    /// Closed by the connector once the connection is gone for good.
    pub events: mpsc::Receiver<ConnectionEvent>,
}

/// Outbound operations on a live connection.
#[async_trait]
pub trait ConnectionHandle: Send + Sync + 'static {
    /// Sends a payload to a normalized network address.
    async fn send(
        &self,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<DeliveryId, SwitchboardError>;

    /// Lightweight liveness query.
    async fn probe(&self) -> Result<(), SwitchboardError>;

    /// Logs the account out, revoking its credentials on the network.
    async fn logout(&self) -> Result<(), SwitchboardError>;

    /// Drops the connection without logging out.
    async fn close(&self);
}

/// Factory for live connections.
#[async_trait]
pub trait Connector: PluginAdapter {
    /// Opens a connection with the given credential state.
    ///
    /// Empty credentials start a fresh pairing and the connection will emit
    /// [`ConnectionEvent::QrIssued`]. Credentials the network refuses
    /// outright yield [`SwitchboardError::CredentialsRejected`].
    async fn open(
        &self,
        session_id: &SessionId,
        credentials: CredentialState,
    ) -> Result<Connection, SwitchboardError>;
}
