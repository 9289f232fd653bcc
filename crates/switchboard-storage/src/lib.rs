// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! SQLite persistence layer for the Switchboard session gateway.
//!
//! Stores session records, per-session credential material, webhook
//! registrations and the outbound queue behind a single tokio-rusqlite
//! connection with embedded migrations.

pub mod adapter;
pub mod database;
pub mod queries;

pub use adapter::SqliteStorage;
pub use database::Database;
