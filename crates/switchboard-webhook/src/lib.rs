// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook dispatcher for the Switchboard session gateway.
//!
//! Registrations are unique per (session, URL). Each delivery is a JSON
//! POST signed with HMAC-SHA256 over the exact body bytes.

pub mod dispatcher;
pub mod event;
pub mod signature;

pub use dispatcher::{WebhookDelivery, WebhookDispatcher};
pub use event::WebhookEvent;
