// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Typed query modules, one per table.

pub mod credentials;
pub mod queue;
pub mod sessions;
pub mod webhooks;
