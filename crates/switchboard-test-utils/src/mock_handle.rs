// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Mock connection handle for deterministic testing.
//!
//! `MockHandle` implements `ConnectionHandle` with a switchable send
//! behaviour and captures everything sent for assertion in tests.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;

use switchboard_core::types::{DeliveryId, OutboundPayload};
use switchboard_core::{ConnectionHandle, SwitchboardError};

/// How [`MockHandle::send`] responds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SendBehavior {
    /// Accept and record the send.
    Succeed,
    /// Reject every send with a connection error carrying this message.
    Fail(String),
    /// Never complete; exercises send timeouts.
    Hang,
}

/// A send captured by the mock.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentMessage {
    pub to: String,
    pub payload: OutboundPayload,
}

impl SentMessage {
    /// Text body, if this was a text send.
    pub fn text(&self) -> Option<&str> {
        match &self.payload {
            OutboundPayload::Text { text } => Some(text),
            _ => None,
        }
    }
}

/// A mock live connection.
pub struct MockHandle {
    sent: Mutex<Vec<SentMessage>>,
    behavior: Mutex<SendBehavior>,
    attempts: AtomicUsize,
    probes: AtomicUsize,
    fail_probes: AtomicBool,
    hang_probes: AtomicBool,
    logged_out: AtomicBool,
    closes: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MockHandle {
    /// Create a handle that accepts every send.
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            behavior: Mutex::new(SendBehavior::Succeed),
            attempts: AtomicUsize::new(0),
            probes: AtomicUsize::new(0),
            fail_probes: AtomicBool::new(false),
            hang_probes: AtomicBool::new(false),
            logged_out: AtomicBool::new(false),
            closes: AtomicUsize::new(0),
        }
    }

    /// Change how subsequent sends respond.
    pub fn set_send_behavior(&self, behavior: SendBehavior) {
        *lock(&self.behavior) = behavior;
    }

    /// Successful sends, in order.
    pub fn sent(&self) -> Vec<SentMessage> {
        lock(&self.sent).clone()
    }

    pub fn sent_count(&self) -> usize {
        lock(&self.sent).len()
    }

    /// Every call to `send`, successful or not.
    pub fn send_attempts(&self) -> usize {
        self.attempts.load(Ordering::SeqCst)
    }

    pub fn probe_count(&self) -> usize {
        self.probes.load(Ordering::SeqCst)
    }

    /// Make probes fail (or succeed again).
    pub fn fail_probes(&self, fail: bool) {
        self.fail_probes.store(fail, Ordering::SeqCst);
    }

    /// Make subsequent probes never complete.
    pub fn hang_probes(&self, hang: bool) {
        self.hang_probes.store(hang, Ordering::SeqCst);
    }

    pub fn logged_out(&self) -> bool {
        self.logged_out.load(Ordering::SeqCst)
    }

    pub fn is_closed(&self) -> bool {
        self.closes.load(Ordering::SeqCst) > 0
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl Default for MockHandle {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ConnectionHandle for MockHandle {
    async fn send(
        &self,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<DeliveryId, SwitchboardError> {
        let n = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        let behavior = lock(&self.behavior).clone();
        match behavior {
            SendBehavior::Succeed => {
                lock(&self.sent).push(SentMessage {
                    to: to.to_string(),
                    payload: payload.clone(),
                });
                Ok(DeliveryId(format!("mock-delivery-{n}")))
            }
            SendBehavior::Fail(message) => Err(SwitchboardError::connection(message)),
            SendBehavior::Hang => std::future::pending().await,
        }
    }

    async fn probe(&self) -> Result<(), SwitchboardError> {
        self.probes.fetch_add(1, Ordering::SeqCst);
        if self.hang_probes.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.fail_probes.load(Ordering::SeqCst) {
            return Err(SwitchboardError::connection("probe failed"));
        }
        Ok(())
    }

    async fn logout(&self) -> Result<(), SwitchboardError> {
        self.logged_out.store(true, Ordering::SeqCst);
        Ok(())
    }

    async fn close(&self) {
        self.closes.fetch_add(1, Ordering::SeqCst);
    }
}
