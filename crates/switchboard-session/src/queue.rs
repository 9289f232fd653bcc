// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Outbound Message Queue.
//!
//! Buffers sends for sessions that are not connected and replays them with
//! a bounded retry count. The in-memory queue is mirrored to storage so
//! buffered sends survive a restart; storage failures are logged and do not
//! block the in-memory path.

use std::collections::VecDeque;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use switchboard_core::StorageAdapter;
use switchboard_core::types::QueuedMessage;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Outcome of one delivery attempt for a queued item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attempt {
    Delivered,
    /// Target session is not connected; counts as a spent attempt.
    NotConnected,
    Failed(String),
}

/// Summary of a drain or flush pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainReport {
    pub delivered: usize,
    pub requeued: usize,
    pub dropped: usize,
}

/// Whether an item may still be attempted.
pub fn should_retry(item: &QueuedMessage, max_retries: u32) -> bool {
    item.retries < max_retries
}

pub struct OutboundQueue {
    items: Mutex<VecDeque<QueuedMessage>>,
    storage: Option<Arc<dyn StorageAdapter>>,
    max_retries: u32,
    draining: AtomicBool,
}

/// Clears the drain flag when dropped.
struct DrainGuard<'a>(&'a AtomicBool);

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl OutboundQueue {
    pub fn new(storage: Option<Arc<dyn StorageAdapter>>, max_retries: u32) -> Self {
        Self {
            items: Mutex::new(VecDeque::new()),
            storage,
            max_retries,
            draining: AtomicBool::new(false),
        }
    }

    /// Appends an item and persists it.
    pub async fn enqueue(&self, item: QueuedMessage) {
        if let Some(storage) = &self.storage
            && let Err(e) = storage.insert_queued(&item).await
        {
            warn!(queue_id = %item.id, error = %e, "failed to persist queued message");
        }
        debug!(
            queue_id = %item.id,
            session_id = %item.session_id,
            recipient = %item.recipient,
            retries = item.retries,
            "message queued"
        );
        self.items.lock().await.push_back(item);
    }

    /// Reloads persisted items into memory. Returns the number restored.
    pub async fn restore(&self) -> usize {
        let Some(storage) = &self.storage else {
            return 0;
        };
        match storage.list_queued().await {
            Ok(rows) => {
                let count = rows.len();
                let mut items = self.items.lock().await;
                items.clear();
                items.extend(rows);
                if count > 0 {
                    info!(count, "restored queued messages");
                }
                count
            }
            Err(e) => {
                warn!(error = %e, "failed to restore queued messages");
                0
            }
        }
    }

    pub async fn len(&self) -> usize {
        self.items.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.items.lock().await.is_empty()
    }

    pub async fn len_for_session(&self, session_id: &str) -> usize {
        self.items
            .lock()
            .await
            .iter()
            .filter(|i| i.session_id == session_id)
            .count()
    }

    pub async fn snapshot(&self) -> Vec<QueuedMessage> {
        self.items.lock().await.iter().cloned().collect()
    }

    /// Discards every item of one session.
    pub async fn remove_session(&self, session_id: &str) -> usize {
        let removed = {
            let mut items = self.items.lock().await;
            let before = items.len();
            items.retain(|i| i.session_id != session_id);
            before - items.len()
        };
        if let Some(storage) = &self.storage
            && let Err(e) = storage.delete_queued_for_session(session_id).await
        {
            warn!(session_id, error = %e, "failed to purge persisted queue");
        }
        removed
    }

    /// Attempts every queued item once.
    ///
    /// Takes a snapshot and clears the queue first; items that stay queued
    /// are appended back. Returns `None` when another drain is in progress.
    pub async fn drain<F, Fut>(&self, deliver: F) -> Option<DrainReport>
    where
        F: Fn(QueuedMessage) -> Fut,
        Fut: Future<Output = Attempt>,
    {
        if self
            .draining
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            debug!("queue drain already running, skipping");
            return None;
        }
        let _guard = DrainGuard(&self.draining);

        let batch: Vec<QueuedMessage> = self.items.lock().await.drain(..).collect();
        Some(self.process(batch, deliver).await)
    }

    /// Attempts the items of one session immediately, in arrival order.
    pub async fn flush_session<F, Fut>(&self, session_id: &str, deliver: F) -> DrainReport
    where
        F: Fn(QueuedMessage) -> Fut,
        Fut: Future<Output = Attempt>,
    {
        let batch: Vec<QueuedMessage> = {
            let mut items = self.items.lock().await;
            let (batch, rest): (VecDeque<_>, VecDeque<_>) =
                items.drain(..).partition(|i| i.session_id == session_id);
            *items = rest;
            batch.into_iter().collect()
        };
        if !batch.is_empty() {
            debug!(session_id, count = batch.len(), "flushing queued messages");
        }
        self.process(batch, deliver).await
    }

    async fn process<F, Fut>(&self, batch: Vec<QueuedMessage>, deliver: F) -> DrainReport
    where
        F: Fn(QueuedMessage) -> Fut,
        Fut: Future<Output = Attempt>,
    {
        let mut report = DrainReport::default();
        let mut keep = Vec::new();

        for mut item in batch {
            if !should_retry(&item, self.max_retries) {
                warn!(
                    queue_id = %item.id,
                    session_id = %item.session_id,
                    recipient = %item.recipient,
                    retries = item.retries,
                    "dropping queued message, retry limit reached"
                );
                self.forget(&item.id).await;
                report.dropped += 1;
                continue;
            }

            let error = match deliver(item.clone()).await {
                Attempt::Delivered => {
                    self.forget(&item.id).await;
                    report.delivered += 1;
                    continue;
                }
                Attempt::NotConnected => "session not connected".to_string(),
                Attempt::Failed(error) => error,
            };

            item.retries += 1;
            if should_retry(&item, self.max_retries) {
                debug!(
                    queue_id = %item.id,
                    retries = item.retries,
                    error = %error,
                    "queued send not delivered, will retry"
                );
                self.persist_retries(&item).await;
                keep.push(item);
                report.requeued += 1;
            } else {
                warn!(
                    queue_id = %item.id,
                    session_id = %item.session_id,
                    recipient = %item.recipient,
                    retries = item.retries,
                    error = %error,
                    "dropping queued message after final attempt"
                );
                self.forget(&item.id).await;
                report.dropped += 1;
            }
        }

        if !keep.is_empty() {
            self.items.lock().await.extend(keep);
        }
        report
    }

    async fn forget(&self, id: &str) {
        if let Some(storage) = &self.storage
            && let Err(e) = storage.delete_queued(id).await
        {
            warn!(queue_id = id, error = %e, "failed to delete persisted queue item");
        }
    }

    async fn persist_retries(&self, item: &QueuedMessage) {
        if let Some(storage) = &self.storage
            && let Err(e) = storage.update_queued_retries(&item.id, item.retries).await
        {
            warn!(queue_id = %item.id, error = %e, "failed to persist retry count");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use switchboard_core::types::OutboundPayload;

    fn item(id: &str, session: &str, retries: u32) -> QueuedMessage {
        QueuedMessage {
            id: id.to_string(),
            session_id: session.to_string(),
            recipient: "15551234567@s.whatsapp.net".to_string(),
            payload: OutboundPayload::text(id),
            retries,
            created_at: "2026-01-01T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn retry_decision_is_bounded() {
        assert!(should_retry(&item("a", "s", 0), 3));
        assert!(should_retry(&item("a", "s", 2), 3));
        assert!(!should_retry(&item("a", "s", 3), 3));
        assert!(!should_retry(&item("a", "s", 7), 3));
    }

    #[tokio::test]
    async fn exhausted_item_is_dropped_without_attempt() {
        let queue = OutboundQueue::new(None, 3);
        queue.enqueue(item("spent", "s", 3)).await;
        let attempts = AtomicUsize::new(0);

        let report = queue
            .drain(|_| {
                attempts.fetch_add(1, Ordering::SeqCst);
                async { Attempt::Delivered }
            })
            .await
            .unwrap();

        assert_eq!(report.dropped, 1);
        assert_eq!(attempts.load(Ordering::SeqCst), 0);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn failures_increment_until_dropped() {
        let queue = OutboundQueue::new(None, 3);
        queue.enqueue(item("m", "s", 0)).await;

        for expected in 1..=2 {
            queue.drain(|_| async { Attempt::Failed("boom".into()) }).await.unwrap();
            assert_eq!(queue.snapshot().await[0].retries, expected);
        }
        let report = queue
            .drain(|_| async { Attempt::Failed("boom".into()) })
            .await
            .unwrap();
        assert_eq!(report.dropped, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn not_connected_passes_spend_retries() {
        let queue = OutboundQueue::new(None, 3);
        queue.enqueue(item("m", "s", 1)).await;
        let report = queue.drain(|_| async { Attempt::NotConnected }).await.unwrap();
        assert_eq!(report.requeued, 1);
        assert_eq!(queue.snapshot().await[0].retries, 2);

        let report = queue.drain(|_| async { Attempt::NotConnected }).await.unwrap();
        assert_eq!(report.dropped, 1);
        assert!(queue.is_empty().await);
    }

    #[tokio::test]
    async fn flush_is_scoped_and_ordered() {
        let queue = OutboundQueue::new(None, 3);
        queue.enqueue(item("a1", "alpha", 0)).await;
        queue.enqueue(item("b1", "beta", 0)).await;
        queue.enqueue(item("a2", "alpha", 0)).await;

        let seen = Mutex::new(Vec::new());
        let report = queue
            .flush_session("alpha", |m| {
                let seen = &seen;
                async move {
                    seen.lock().await.push(m.id);
                    Attempt::Delivered
                }
            })
            .await;

        assert_eq!(report.delivered, 2);
        assert_eq!(*seen.lock().await, vec!["a1", "a2"]);
        assert_eq!(queue.len_for_session("beta").await, 1);
        assert_eq!(queue.len().await, 1);
    }

    #[tokio::test]
    async fn overlapping_drain_is_skipped() {
        let queue = Arc::new(OutboundQueue::new(None, 3));
        queue.enqueue(item("m", "s", 0)).await;
        let gate = Arc::new(tokio::sync::Notify::new());

        let first = {
            let queue = queue.clone();
            let gate = gate.clone();
            tokio::spawn(async move {
                queue
                    .drain(|_| {
                        let gate = gate.clone();
                        async move {
                            gate.notified().await;
                            Attempt::Delivered
                        }
                    })
                    .await
            })
        };
        // Let the first drain reach the delivery await.
        while !queue.draining.load(Ordering::Acquire) {
            tokio::task::yield_now().await;
        }
        assert!(queue.drain(|_| async { Attempt::Delivered }).await.is_none());

        gate.notify_one();
        let report = first.await.unwrap().unwrap();
        assert_eq!(report.delivered, 1);
    }

    #[tokio::test]
    async fn remove_session_discards_only_that_session() {
        let queue = OutboundQueue::new(None, 3);
        queue.enqueue(item("a", "alpha", 0)).await;
        queue.enqueue(item("b", "beta", 0)).await;
        assert_eq!(queue.remove_session("alpha").await, 1);
        assert_eq!(queue.len().await, 1);
    }
}
