// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Wire frames exchanged with the bridge sidecar.
//!
//! Binary payload data and credential values travel as standard base64.

use std::collections::BTreeMap;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};

use switchboard_core::SwitchboardError;
use switchboard_core::types::{
    CloseReason, ConnectionEvent, CredentialChange, CredentialState, InboundEnvelope,
    OutboundPayload,
};

/// Error code the sidecar uses when it refuses persisted credentials.
pub const CREDENTIALS_REJECTED: &str = "credentials_rejected";

/// A request sent to the sidecar. Every request is answered by an `ack` or
/// `error` frame carrying the same `requestId`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "op", rename_all = "camelCase")]
pub enum Request {
    #[serde(rename_all = "camelCase")]
    Open {
        request_id: String,
        credentials: BTreeMap<String, String>,
    },
    #[serde(rename_all = "camelCase")]
    Send {
        request_id: String,
        to: String,
        payload: WirePayload,
    },
    #[serde(rename_all = "camelCase")]
    Presence { request_id: String },
    #[serde(rename_all = "camelCase")]
    Logout { request_id: String },
}

impl Request {
    pub fn open(request_id: String, credentials: &CredentialState) -> Self {
        Self::Open {
            request_id,
            credentials: credentials
                .entries
                .iter()
                .map(|(k, v)| (k.clone(), STANDARD.encode(v)))
                .collect(),
        }
    }

    pub fn send(request_id: String, to: &str, payload: &OutboundPayload) -> Self {
        Self::Send {
            request_id,
            to: to.to_string(),
            payload: WirePayload::from(payload),
        }
    }

    pub fn request_id(&self) -> &str {
        match self {
            Self::Open { request_id, .. }
            | Self::Send { request_id, .. }
            | Self::Presence { request_id }
            | Self::Logout { request_id } => request_id,
        }
    }

    pub fn op(&self) -> &'static str {
        match self {
            Self::Open { .. } => "open",
            Self::Send { .. } => "send",
            Self::Presence { .. } => "presence",
            Self::Logout { .. } => "logout",
        }
    }
}

/// Outbound content with binary data base64-encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum WirePayload {
    Text {
        text: String,
    },
    Image {
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Document {
        data: String,
        filename: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        mimetype: Option<String>,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
    Video {
        data: String,
        #[serde(skip_serializing_if = "Option::is_none")]
        caption: Option<String>,
    },
}

impl From<&OutboundPayload> for WirePayload {
    fn from(payload: &OutboundPayload) -> Self {
        match payload {
            OutboundPayload::Text { text } => Self::Text { text: text.clone() },
            OutboundPayload::Image { data, caption } => Self::Image {
                data: STANDARD.encode(data),
                caption: caption.clone(),
            },
            OutboundPayload::Document {
                data,
                filename,
                mimetype,
                caption,
            } => Self::Document {
                data: STANDARD.encode(data),
                filename: filename.clone(),
                mimetype: mimetype.clone(),
                caption: caption.clone(),
            },
            OutboundPayload::Video { data, caption } => Self::Video {
                data: STANDARD.encode(data),
                caption: caption.clone(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct WireCredential {
    pub key: String,
    /// Base64 value; `null` deletes the key.
    pub value: Option<String>,
}

/// A frame received from the sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum Frame {
    Qr {
        payload: String,
    },
    #[serde(rename_all = "camelCase")]
    Opened {
        self_address: String,
    },
    Closed {
        reason: CloseReason,
    },
    Message(InboundEnvelope),
    Credentials {
        changes: Vec<WireCredential>,
    },
    #[serde(rename_all = "camelCase")]
    Ack {
        request_id: String,
        #[serde(default)]
        message_id: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Error {
        #[serde(default)]
        request_id: Option<String>,
        code: String,
        #[serde(default)]
        message: String,
    },
}

impl Frame {
    pub fn parse(text: &str) -> Result<Self, SwitchboardError> {
        serde_json::from_str(text).map_err(|e| SwitchboardError::Connection {
            message: format!("malformed bridge frame: {e}"),
            source: Some(Box::new(e)),
        })
    }

    /// Converts an unsolicited frame into a connection event.
    ///
    /// Returns `Ok(None)` for `ack`/`error` replies, which are routed to
    /// their pending request instead.
    pub fn into_event(self) -> Result<Option<ConnectionEvent>, SwitchboardError> {
        let event = match self {
            Self::Qr { payload } => ConnectionEvent::QrIssued { payload },
            Self::Opened { self_address } => ConnectionEvent::Opened { self_address },
            Self::Closed { reason } => ConnectionEvent::Closed { reason },
            Self::Message(envelope) => ConnectionEvent::MessageReceived(envelope),
            Self::Credentials { changes } => {
                let changes = changes
                    .into_iter()
                    .map(|c| {
                        let value = c.value.map(|v| decode(&c.key, &v)).transpose()?;
                        Ok(CredentialChange { key: c.key, value })
                    })
                    .collect::<Result<Vec<_>, SwitchboardError>>()?;
                ConnectionEvent::CredentialsUpdated(changes)
            }
            Self::Ack { .. } | Self::Error { .. } => return Ok(None),
        };
        Ok(Some(event))
    }
}

fn decode(key: &str, value: &str) -> Result<Vec<u8>, SwitchboardError> {
    STANDARD
        .decode(value)
        .map_err(|e| SwitchboardError::Connection {
            message: format!("credential `{key}` is not valid base64"),
            source: Some(Box::new(e)),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_core::types::InboundKind;

    #[test]
    fn open_request_encodes_credentials() {
        let mut state = CredentialState::default();
        state.entries.insert("creds".into(), b"{}".to_vec());
        let json = serde_json::to_value(Request::open("r1".into(), &state)).unwrap();
        assert_eq!(json["op"], "open");
        assert_eq!(json["requestId"], "r1");
        assert_eq!(json["credentials"]["creds"], "e30=");
    }

    #[test]
    fn send_request_carries_base64_media() {
        let payload = OutboundPayload::Document {
            data: vec![0xde, 0xad],
            filename: "invoice.pdf".into(),
            mimetype: Some("application/pdf".into()),
            caption: None,
        };
        let json =
            serde_json::to_value(Request::send("r2".into(), "4915112345@s.whatsapp.net", &payload))
                .unwrap();
        assert_eq!(json["op"], "send");
        assert_eq!(json["payload"]["kind"], "document");
        assert_eq!(json["payload"]["data"], "3q0=");
        assert!(json["payload"].get("caption").is_none());
    }

    #[test]
    fn parses_message_frame() {
        let frame = Frame::parse(
            r#"{"type":"message","messageId":"m1","from":"1@lid",
                "senderPhone":"4915112345@s.whatsapp.net","timestamp":1700000000,
                "kind":"image","text":"look"}"#,
        )
        .unwrap();
        let Some(ConnectionEvent::MessageReceived(envelope)) = frame.into_event().unwrap() else {
            panic!("expected message event");
        };
        assert_eq!(envelope.from, "1@lid");
        assert_eq!(envelope.kind, InboundKind::Image);
        assert!(!envelope.from_me);
    }

    #[test]
    fn unknown_close_reason_maps_to_unknown() {
        let frame = Frame::parse(r#"{"type":"closed","reason":"badSession"}"#).unwrap();
        assert_eq!(
            frame.into_event().unwrap(),
            Some(ConnectionEvent::Closed {
                reason: CloseReason::Unknown
            })
        );
    }

    #[test]
    fn credential_frames_decode_values() {
        let frame = Frame::parse(
            r#"{"type":"credentials","changes":[{"key":"creds","value":"e30="},{"key":"old","value":null}]}"#,
        )
        .unwrap();
        assert_eq!(
            frame.into_event().unwrap(),
            Some(ConnectionEvent::CredentialsUpdated(vec![
                CredentialChange {
                    key: "creds".into(),
                    value: Some(b"{}".to_vec())
                },
                CredentialChange {
                    key: "old".into(),
                    value: None
                },
            ]))
        );

        let bad = Frame::parse(r#"{"type":"credentials","changes":[{"key":"k","value":"!!"}]}"#)
            .unwrap();
        assert!(bad.into_event().is_err());
    }

    #[test]
    fn replies_are_not_events() {
        let ack = Frame::parse(r#"{"type":"ack","requestId":"r1","messageId":"wamid"}"#).unwrap();
        assert_eq!(ack.into_event().unwrap(), None);
        let err = Frame::parse(r#"{"type":"error","code":"credentials_rejected"}"#).unwrap();
        assert_eq!(err.into_event().unwrap(), None);
    }

    #[test]
    fn malformed_frame_is_a_connection_error() {
        let err = Frame::parse("{not json").unwrap_err();
        assert_eq!(err.code(), "CONNECTION_ERROR");
    }
}
