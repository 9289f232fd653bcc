// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Core library for the Switchboard session gateway.
//!
//! This crate provides the error type, shared domain types, address
//! normalization and the adapter traits every other crate builds on:
//! the [`Connector`] that opens live connections and the
//! [`StorageAdapter`] that persists sessions, credentials, webhooks and
//! queued messages.

pub mod address;
pub mod error;
pub mod traits;
pub mod types;

// Re-export key items at crate root for ergonomic imports.
pub use error::SwitchboardError;
pub use types::{AdapterType, DeliveryId, HealthStatus, SessionId};

pub use traits::{Connection, ConnectionHandle, Connector, PluginAdapter, StorageAdapter};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_codes_are_stable() {
        let cases = [
            (SwitchboardError::Config("x".into()), "CONFIG_ERROR"),
            (
                SwitchboardError::Storage {
                    source: Box::new(std::io::Error::other("disk")),
                },
                "STORAGE_ERROR",
            ),
            (SwitchboardError::connection("reset"), "CONNECTION_ERROR"),
            (
                SwitchboardError::CredentialsRejected {
                    session_id: "s".into(),
                    reason: "bad mac".into(),
                },
                "CREDENTIALS_REJECTED",
            ),
            (
                SwitchboardError::InvalidPhoneNumber { input: "1".into() },
                "INVALID_PHONE_NUMBER",
            ),
            (
                SwitchboardError::UnresolvedAddress {
                    address: "1@lid".into(),
                },
                "UNRESOLVED_ADDRESS",
            ),
            (
                SwitchboardError::SessionNotFound {
                    session_id: "s".into(),
                },
                "SESSION_NOT_FOUND",
            ),
            (
                SwitchboardError::SessionInactive {
                    session_id: "s".into(),
                },
                "SESSION_INACTIVE",
            ),
            (SwitchboardError::webhook("boom"), "WEBHOOK_ERROR"),
            (
                SwitchboardError::Timeout {
                    duration: std::time::Duration::from_secs(25),
                },
                "SEND_TIMEOUT",
            ),
            (SwitchboardError::Internal("x".into()), "INTERNAL_ERROR"),
        ];
        for (err, code) in cases {
            assert_eq!(err.code(), code, "{err}");
        }
    }

    #[test]
    fn adapter_type_round_trips() {
        use std::str::FromStr;

        for variant in [AdapterType::Connector, AdapterType::Storage] {
            let s = variant.to_string();
            assert_eq!(AdapterType::from_str(&s).unwrap(), variant);
        }
    }

    #[test]
    fn health_status_variants() {
        assert_eq!(HealthStatus::Healthy, HealthStatus::Healthy);
        assert_ne!(HealthStatus::Degraded("slow".into()), HealthStatus::Healthy);
        assert_ne!(HealthStatus::Unhealthy("down".into()), HealthStatus::Healthy);
    }

    #[test]
    fn adapter_traits_are_object_safe() {
        fn _connector(_: &dyn Connector) {}
        fn _storage(_: &dyn StorageAdapter) {}
        fn _handle(_: &dyn ConnectionHandle) {}
    }
}
