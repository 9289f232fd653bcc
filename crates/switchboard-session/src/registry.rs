// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-memory registry of live sessions.
//!
//! An entry exists only while its connection is pending or connected, and
//! holds at most one handle per session id. Each entry carries the
//! generation of the connection attempt that created it; events and timers
//! tagged with an older generation must not touch a newer entry.

use std::collections::HashMap;
use std::sync::Arc;

use switchboard_core::ConnectionHandle;
use switchboard_core::types::{AutoReplyConfig, SessionStatus, StatusReport};
use tokio::time::Instant;

/// State of one live connection.
pub struct SessionEntry {
    /// Durable storage id of the session record.
    pub durable_id: String,
    pub generation: u64,
    pub handle: Arc<dyn ConnectionHandle>,
    pub status: SessionStatus,
    pub qr_code: Option<String>,
    pub phone_number: Option<String>,
    pub auto_reply: AutoReplyConfig,
    pub last_activity: Instant,
}

impl SessionEntry {
    pub fn new(
        durable_id: String,
        generation: u64,
        handle: Arc<dyn ConnectionHandle>,
        auto_reply: AutoReplyConfig,
    ) -> Self {
        Self {
            durable_id,
            generation,
            handle,
            status: SessionStatus::Pending,
            qr_code: None,
            phone_number: None,
            auto_reply,
            last_activity: Instant::now(),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == SessionStatus::Connected
    }

    pub fn touch(&mut self) {
        self.last_activity = Instant::now();
    }

    pub fn report(&self) -> StatusReport {
        StatusReport {
            connected: self.is_connected(),
            status: Some(self.status),
            phone_number: self.phone_number.clone(),
            qr_payload: self.qr_code.clone(),
        }
    }
}

/// Session id to live entry.
#[derive(Default)]
pub struct SessionRegistry {
    entries: HashMap<String, SessionEntry>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, session_id: &str) -> Option<&SessionEntry> {
        self.entries.get(session_id)
    }

    pub fn get_mut(&mut self, session_id: &str) -> Option<&mut SessionEntry> {
        self.entries.get_mut(session_id)
    }

    /// The entry, only if it still belongs to `generation`.
    pub fn current_mut(&mut self, session_id: &str, generation: u64) -> Option<&mut SessionEntry> {
        self.entries
            .get_mut(session_id)
            .filter(|e| e.generation == generation)
    }

    pub fn is_current(&self, session_id: &str, generation: u64) -> bool {
        self.entries
            .get(session_id)
            .is_some_and(|e| e.generation == generation)
    }

    /// Registers an entry, returning the one it replaced.
    pub fn insert(&mut self, session_id: &str, entry: SessionEntry) -> Option<SessionEntry> {
        self.entries.insert(session_id.to_string(), entry)
    }

    pub fn remove(&mut self, session_id: &str) -> Option<SessionEntry> {
        self.entries.remove(session_id)
    }

    /// Removes the entry only if it belongs to `generation`.
    pub fn remove_current(&mut self, session_id: &str, generation: u64) -> Option<SessionEntry> {
        if self.is_current(session_id, generation) {
            self.entries.remove(session_id)
        } else {
            None
        }
    }

    pub fn contains(&self, session_id: &str) -> bool {
        self.entries.contains_key(session_id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &SessionEntry)> {
        self.entries.iter()
    }

    /// Removes and returns every entry.
    pub fn drain(&mut self) -> Vec<(String, SessionEntry)> {
        self.entries.drain().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
