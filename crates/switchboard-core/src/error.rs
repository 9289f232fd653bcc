// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Error types for the Switchboard session gateway.

use thiserror::Error;

/// The primary error type used across all Switchboard adapter traits and core operations.
#[derive(Debug, Error)]
pub enum SwitchboardError {
    /// Configuration errors (invalid TOML, missing required fields, type mismatches).
    #[error("configuration error: {0}")]
    Config(String),

    /// Storage backend errors (database connection, query failure, serialization).
    #[error("storage error: {source}")]
    Storage {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// Connection primitive errors (socket failure, protocol error, send rejected).
    #[error("connection error: {message}")]
    Connection {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// The network refused the persisted credentials; retrying with them is pointless.
    #[error("credentials rejected for session {session_id}: {reason}")]
    CredentialsRejected { session_id: String, reason: String },

    /// A recipient failed phone-number normalization.
    #[error("invalid phone number `{input}`")]
    InvalidPhoneNumber { input: String },

    /// An ephemeral address has no known stable mapping.
    #[error("cannot resolve ephemeral address `{address}` to a phone address")]
    UnresolvedAddress { address: String },

    /// No durable or live session exists for the given id.
    #[error("session not found: {session_id}")]
    SessionNotFound { session_id: String },

    /// The session exists but has been deactivated.
    #[error("session {session_id} is inactive")]
    SessionInactive { session_id: String },

    /// Webhook registration or delivery errors.
    #[error("webhook error: {message}")]
    Webhook {
        message: String,
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// Operation timed out.
    #[error("operation timed out after {duration:?}")]
    Timeout { duration: std::time::Duration },

    /// Internal or unexpected errors.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SwitchboardError {
    /// Stable machine-readable code for API responses.
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(_) => "CONFIG_ERROR",
            Self::Storage { .. } => "STORAGE_ERROR",
            Self::Connection { .. } => "CONNECTION_ERROR",
            Self::CredentialsRejected { .. } => "CREDENTIALS_REJECTED",
            Self::InvalidPhoneNumber { .. } => "INVALID_PHONE_NUMBER",
            Self::UnresolvedAddress { .. } => "UNRESOLVED_ADDRESS",
            Self::SessionNotFound { .. } => "SESSION_NOT_FOUND",
            Self::SessionInactive { .. } => "SESSION_INACTIVE",
            Self::Webhook { .. } => "WEBHOOK_ERROR",
            Self::Timeout { .. } => "SEND_TIMEOUT",
            Self::Internal(_) => "INTERNAL_ERROR",
        }
    }

    /// Shorthand for a [`SwitchboardError::Connection`] without a source.
    pub fn connection(message: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            source: None,
        }
    }

    /// Shorthand for a [`SwitchboardError::Webhook`] without a source.
    pub fn webhook(message: impl Into<String>) -> Self {
        Self::Webhook {
            message: message.into(),
            source: None,
        }
    }
}
