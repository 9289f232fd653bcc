// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Session lifecycle management for the Switchboard gateway.
//!
//! The [`SessionManager`] is the central coordinator that:
//! - Opens one live connection per tenant session and reconnects on drops
//! - Persists credential state and purges it when it cannot be resumed
//! - Buffers sends for disconnected sessions and replays them on connect
//! - Resolves ephemeral sender addresses to stable phone addresses
//! - Probes idle connections and fans events out to webhooks

pub mod auto_reply;
pub mod credentials;
pub mod keepalive;
pub mod manager;
pub mod queue;
pub mod registry;
pub mod resolver;
pub mod settings;
pub mod shutdown;

pub use credentials::{CredentialStore, PreparedCredentials};
pub use keepalive::KeepAliveMonitor;
pub use manager::SessionManager;
pub use queue::{Attempt, DrainReport, OutboundQueue};
pub use resolver::IdentifierResolver;
pub use settings::ManagerSettings;
pub use shutdown::install_signal_handler;
