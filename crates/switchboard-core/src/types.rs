// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Common types shared by the session manager, storage and connectors.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// Tenant-assigned identifier of a session.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Network-assigned identifier of a delivered outbound message.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeliveryId(pub String);

/// Health status reported by adapter health checks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HealthStatus {
    /// Adapter is fully operational.
    Healthy,
    /// Adapter is operational but experiencing issues.
    Degraded(String),
    /// Adapter is not operational.
    Unhealthy(String),
}

/// Identifies the type of adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
pub enum AdapterType {
    Connector,
    Storage,
}

// --- Sessions ---

/// Durable lifecycle status of a session.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Pending,
    Connected,
    Disconnected,
    Error,
}

/// Reply text used when a session enables auto-reply without setting one.
pub const DEFAULT_AUTO_REPLY_MESSAGE: &str =
    "Thank you for your message! We will get back to you soon.";

/// Per-session auto-reply policy.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AutoReplyConfig {
    pub enabled: bool,
    pub message: String,
}

impl Default for AutoReplyConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            message: DEFAULT_AUTO_REPLY_MESSAGE.to_string(),
        }
    }
}

/// A durable session record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Internal durable-storage id.
    pub id: String,
    /// Tenant-assigned session id.
    pub session_id: String,
    pub name: Option<String>,
    pub status: SessionStatus,
    pub phone_number: Option<String>,
    pub qr_code: Option<String>,
    pub auto_reply: AutoReplyConfig,
    pub is_active: bool,
    pub last_connected_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Point-in-time view of a session for API callers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub connected: bool,
    pub status: Option<SessionStatus>,
    pub phone_number: Option<String>,
    pub qr_payload: Option<String>,
}

// --- Webhooks ---

/// A tenant-configured webhook endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookRegistration {
    pub id: String,
    /// Durable id of the owning session.
    pub session_id: String,
    pub url: String,
    pub secret: String,
    pub events: Vec<String>,
    pub is_active: bool,
    pub failed_attempts: u32,
    pub last_success_at: Option<String>,
    pub last_failure_at: Option<String>,
    pub created_at: String,
}

// --- Outbound ---

/// Mimetype assumed for documents sent without one.
pub const DEFAULT_DOCUMENT_MIMETYPE: &str = "application/pdf";

/// Discriminant of an [`OutboundPayload`], as persisted and logged.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "lowercase")]
pub enum PayloadKind {
    Text,
    Image,
    Document,
    Video,
}

/// Content of an outbound send.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutboundPayload {
    Text {
        text: String,
    },
    Image {
        data: Vec<u8>,
        caption: Option<String>,
    },
    Document {
        data: Vec<u8>,
        filename: String,
        mimetype: Option<String>,
        caption: Option<String>,
    },
    Video {
        data: Vec<u8>,
        caption: Option<String>,
    },
}

impl OutboundPayload {
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text { text: text.into() }
    }

    pub fn kind(&self) -> PayloadKind {
        match self {
            Self::Text { .. } => PayloadKind::Text,
            Self::Image { .. } => PayloadKind::Image,
            Self::Document { .. } => PayloadKind::Document,
            Self::Video { .. } => PayloadKind::Video,
        }
    }

    /// Size of the binary attachment, zero for text.
    pub fn binary_len(&self) -> usize {
        match self {
            Self::Text { .. } => 0,
            Self::Image { data, .. } | Self::Document { data, .. } | Self::Video { data, .. } => {
                data.len()
            }
        }
    }
}

/// An outbound send buffered until its session is connected.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedMessage {
    pub id: String,
    /// Tenant-assigned session id.
    pub session_id: String,
    /// Normalized network address.
    pub recipient: String,
    pub payload: OutboundPayload,
    pub retries: u32,
    pub created_at: String,
}

/// Result status of a send request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Sent,
    Queued,
    Failed,
}

/// Outcome reported to the caller of a send operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub delivery_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SendOutcome {
    pub fn sent(delivery_id: DeliveryId) -> Self {
        Self {
            status: SendStatus::Sent,
            delivery_id: Some(delivery_id.0),
            error: None,
        }
    }

    pub fn queued(queue_id: impl Into<String>) -> Self {
        Self {
            status: SendStatus::Queued,
            delivery_id: Some(queue_id.into()),
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: SendStatus::Failed,
            delivery_id: None,
            error: Some(error.into()),
        }
    }
}

// --- Connection events ---

/// Why a connection closed.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumString, Serialize, Deserialize,
)]
#[strum(serialize_all = "camelCase")]
#[serde(rename_all = "camelCase")]
pub enum CloseReason {
    /// The account was logged out; credentials are revoked.
    LoggedOut,
    ConnectionLost,
    ConnectionClosed,
    TimedOut,
    /// Another client took over the session.
    Replaced,
    RestartRequired,
    #[serde(other)]
    Unknown,
}

impl CloseReason {
    pub fn is_logout(self) -> bool {
        matches!(self, Self::LoggedOut)
    }
}

/// Content category of an inbound message.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Display, EnumString, Serialize, Deserialize, Default,
)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum InboundKind {
    #[default]
    Text,
    Image,
    Document,
    Video,
    Audio,
    Sticker,
    #[serde(other)]
    Other,
}

/// A message received on a session, before address resolution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundEnvelope {
    pub message_id: String,
    /// Sender address as reported by the network; may be ephemeral.
    pub from: String,
    /// Stable phone address carried in message metadata, if any.
    #[serde(default)]
    pub sender_phone: Option<String>,
    #[serde(default)]
    pub from_me: bool,
    #[serde(default)]
    pub push_name: Option<String>,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(default)]
    pub kind: InboundKind,
    #[serde(default)]
    pub text: Option<String>,
}

/// One credential key changed by the connection. `None` deletes the key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CredentialChange {
    pub key: String,
    pub value: Option<Vec<u8>>,
}

/// Events emitted by a live connection handle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionEvent {
    QrIssued { payload: String },
    Opened { self_address: String },
    Closed { reason: CloseReason },
    MessageReceived(InboundEnvelope),
    CredentialsUpdated(Vec<CredentialChange>),
}

// --- Credentials ---

/// Key holding the primary credential document.
pub const CREDS_KEY: &str = "creds";

/// Field of the credential document without which it cannot be reused.
pub const IDENTITY_FIELD: &str = "identity";

/// Structural verdict on persisted credential state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CredentialCheck {
    /// Nothing persisted; a fresh pairing is needed.
    Empty,
    /// Usable for resuming the session.
    Complete,
    /// Present but unusable; must be purged.
    Incomplete,
}

/// Every persisted credential key for one session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CredentialState {
    pub entries: BTreeMap<String, Vec<u8>>,
}

impl CredentialState {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&[u8]> {
        self.entries.get(key).map(Vec::as_slice)
    }

    /// Inspects the `creds` document for the mandatory identity field.
    pub fn check(&self) -> CredentialCheck {
        if self.entries.is_empty() {
            return CredentialCheck::Empty;
        }
        let Some(creds) = self.get(CREDS_KEY) else {
            return CredentialCheck::Incomplete;
        };
        match serde_json::from_slice::<serde_json::Value>(creds) {
            Ok(serde_json::Value::Object(doc))
                if doc.get(IDENTITY_FIELD).is_some_and(|v| !v.is_null()) =>
            {
                CredentialCheck::Complete
            }
            _ => CredentialCheck::Incomplete,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn state(entries: &[(&str, &[u8])]) -> CredentialState {
        CredentialState {
            entries: entries
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_vec()))
                .collect(),
        }
    }

    #[test]
    fn empty_credentials_need_pairing() {
        assert_eq!(CredentialState::default().check(), CredentialCheck::Empty);
    }

    #[test]
    fn creds_with_identity_are_complete() {
        let s = state(&[(CREDS_KEY, br#"{"identity":{"pub":"abc"},"registered":true}"#)]);
        assert_eq!(s.check(), CredentialCheck::Complete);
    }

    #[test]
    fn creds_without_identity_are_incomplete() {
        let s = state(&[(CREDS_KEY, br#"{"registered":true}"#)]);
        assert_eq!(s.check(), CredentialCheck::Incomplete);

        let null_identity = state(&[(CREDS_KEY, br#"{"identity":null}"#)]);
        assert_eq!(null_identity.check(), CredentialCheck::Incomplete);
    }

    #[test]
    fn orphaned_keys_without_creds_are_incomplete() {
        let s = state(&[("pre-key-1", &[0xde, 0xad])]);
        assert_eq!(s.check(), CredentialCheck::Incomplete);
    }

    #[test]
    fn garbage_creds_are_incomplete() {
        let s = state(&[(CREDS_KEY, &[0xff, 0x00, 0x12])]);
        assert_eq!(s.check(), CredentialCheck::Incomplete);
    }

    #[test]
    fn session_status_uses_lowercase_names() {
        assert_eq!(SessionStatus::Connected.to_string(), "connected");
        assert_eq!(
            SessionStatus::from_str("disconnected").unwrap(),
            SessionStatus::Disconnected
        );
        assert_eq!(
            serde_json::to_string(&SessionStatus::Pending).unwrap(),
            "\"pending\""
        );
    }

    #[test]
    fn only_logged_out_is_a_logout() {
        assert!(CloseReason::LoggedOut.is_logout());
        assert!(!CloseReason::ConnectionLost.is_logout());
        assert!(!CloseReason::Replaced.is_logout());
        assert_eq!(CloseReason::LoggedOut.to_string(), "loggedOut");
    }

    #[test]
    fn unknown_close_reason_deserializes() {
        let reason: CloseReason = serde_json::from_str("\"somethingNew\"").unwrap();
        assert_eq!(reason, CloseReason::Unknown);
    }

    #[test]
    fn send_outcome_serializes_camel_case() {
        let outcome = SendOutcome::queued("q-1");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "queued");
        assert_eq!(json["deliveryId"], "q-1");
        assert!(json.get("error").is_none());
    }

    #[test]
    fn payload_kind_and_size() {
        let doc = OutboundPayload::Document {
            data: vec![0; 10],
            filename: "a.pdf".into(),
            mimetype: None,
            caption: None,
        };
        assert_eq!(doc.kind(), PayloadKind::Document);
        assert_eq!(doc.kind().to_string(), "document");
        assert_eq!(doc.binary_len(), 10);
        assert_eq!(OutboundPayload::text("hi").binary_len(), 0);
    }

    #[test]
    fn inbound_envelope_defaults_optional_fields() {
        let json = r#"{"messageId":"m1","from":"123@lid","timestamp":1700000000}"#;
        let env: InboundEnvelope = serde_json::from_str(json).unwrap();
        assert_eq!(env.kind, InboundKind::Text);
        assert!(!env.from_me);
        assert!(env.text.is_none());
        assert!(env.sender_phone.is_none());
    }
}
