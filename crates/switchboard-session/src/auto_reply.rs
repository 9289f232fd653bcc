// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Auto-reply policy.

use switchboard_core::types::AutoReplyConfig;

/// The reply to send for an inbound message, if any.
///
/// Disabled policies and empty or whitespace-only text (media without a
/// caption) never produce a reply.
pub fn reply_for<'a>(policy: &'a AutoReplyConfig, inbound_text: Option<&str>) -> Option<&'a str> {
    if !policy.enabled {
        return None;
    }
    let text = inbound_text?;
    if text.trim().is_empty() || policy.message.trim().is_empty() {
        return None;
    }
    Some(policy.message.as_str())
}
