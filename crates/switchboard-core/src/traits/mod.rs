// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Adapter trait definitions.
//!
//! All adapters extend the [`PluginAdapter`] base trait and use
//! `#[async_trait]` for dynamic dispatch compatibility.

pub mod adapter;
pub mod connection;
pub mod storage;

pub use adapter::PluginAdapter;
pub use connection::{Connection, ConnectionHandle, Connector};
pub use storage::StorageAdapter;
