// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook event envelope and subscription matching.

use serde::Serialize;
use serde_json::{Map, Value};

pub const MESSAGE_RECEIVED: &str = "message.received";
pub const SESSION_CONNECTED: &str = "session.connected";
pub const SESSION_DISCONNECTED: &str = "session.disconnected";
pub const WEBHOOK_TEST: &str = "webhook.test";

/// Subscription entries that match every event.
pub const WILDCARDS: [&str; 2] = ["*", "all"];

/// JSON body of a delivery: `{event, sessionId, timestamp, ...fields}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookEvent {
    pub event: String,
    /// Tenant-assigned session id.
    pub session_id: String,
    /// Unix seconds.
    pub timestamp: i64,
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl WebhookEvent {
    /// New event stamped with the current time.
    pub fn new(event: &str, session_id: &str) -> Self {
        Self {
            event: event.to_string(),
            session_id: session_id.to_string(),
            timestamp: chrono::Utc::now().timestamp(),
            fields: Map::new(),
        }
    }

    pub fn with_timestamp(mut self, timestamp: i64) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Adds an event-specific field.
    pub fn field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }
}

/// Whether a subscribed-event set receives `event`.
pub fn subscribes(events: &[String], event: &str) -> bool {
    events
        .iter()
        .any(|e| e == event || WILDCARDS.contains(&e.as_str()))
}
