// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! WebSocket bridge to the protocol sidecar.
//!
//! The sidecar speaks the messaging network's protocol; this crate exposes
//! it to the session manager as a [`Connector`](switchboard_core::Connector).
//! Each session gets its own WebSocket carrying JSON frames: requests tagged
//! by `op` and answered with `ack`/`error`, plus unsolicited events tagged
//! by `type`.

pub mod connector;
pub mod frame;

pub use connector::{BridgeConnector, BridgeHandle};
