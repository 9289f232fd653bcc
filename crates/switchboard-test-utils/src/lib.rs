// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Test utilities for Switchboard integration tests.
//!
//! Provides mock connection primitives and a test harness for fast,
//! deterministic tests without a real messaging network.
//!
//! # Components
//!
//! - [`MockConnector`] - Connector with scripted open outcomes and recorded credentials
//! - [`MockHandle`] - Connection handle that captures sends and counts probes
//! - [`MockConnection`] - Test-side end of a mock connection for injecting events
//! - [`TestHarness`] - Temp SQLite storage plus a running [`SessionManager`](switchboard_session::SessionManager)

pub mod harness;
pub mod mock_connector;
pub mod mock_handle;

pub use harness::{TestHarness, fast_settings, inbound};
pub use mock_connector::{MockConnection, MockConnector, OpenOutcome};
pub use mock_handle::{MockHandle, SendBehavior, SentMessage};
