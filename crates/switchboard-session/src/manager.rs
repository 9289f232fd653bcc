// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection Lifecycle Controller.
//!
//! [`SessionManager`] owns the session registry and drives connect,
//! reconnect and disconnect. Every live connection forwards its events into
//! one bounded channel tagged with the attempt's generation; [`SessionManager::run`]
//! consumes that channel on a single task, so registry mutation for
//! protocol events has one writer. Events, timers and in-flight sends that
//! belong to a superseded generation are ignored.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use switchboard_core::address::{self, AddressKind};
use switchboard_core::types::{
    AutoReplyConfig, CloseReason, ConnectionEvent, CredentialChange, DEFAULT_DOCUMENT_MIMETYPE,
    InboundEnvelope, OutboundPayload, QueuedMessage, SendOutcome, SendStatus, SessionRecord,
    SessionStatus, StatusReport,
};
use switchboard_core::{
    Connection, ConnectionHandle, Connector, SessionId, StorageAdapter, SwitchboardError,
};
use switchboard_webhook::event as webhook_event;
use switchboard_webhook::{WebhookDispatcher, WebhookEvent};
use tokio::sync::{Mutex, mpsc};
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::auto_reply;
use crate::credentials::CredentialStore;
use crate::keepalive::{KeepAliveMonitor, SweepTarget};
use crate::queue::{Attempt, DrainReport, OutboundQueue};
use crate::registry::{SessionEntry, SessionRegistry};
use crate::resolver::IdentifierResolver;
use crate::settings::ManagerSettings;

type ConnectFuture = Shared<BoxFuture<'static, Result<StatusReport, Arc<SwitchboardError>>>>;

/// A connection event tagged with the attempt that produced it.
struct SessionEvent {
    session_id: String,
    generation: u64,
    event: ConnectionEvent,
}

/// A connect attempt that has not settled yet.
struct InFlight {
    id: u64,
    attempt: ConnectFuture,
    /// Cancelled by `disconnect`; the attempt then closes what it opened.
    cancel: CancellationToken,
}

struct ReconnectTimer {
    id: u64,
    token: CancellationToken,
}

struct Inner {
    settings: ManagerSettings,
    storage: Arc<dyn StorageAdapter>,
    connector: Arc<dyn Connector>,
    webhooks: Arc<WebhookDispatcher>,
    registry: Mutex<SessionRegistry>,
    queue: OutboundQueue,
    resolver: IdentifierResolver,
    keepalive: KeepAliveMonitor,
    credentials: CredentialStore,
    /// One pending connect per session id; cleared when the attempt settles.
    in_flight: Mutex<HashMap<String, InFlight>>,
    reconnects: Mutex<HashMap<String, ReconnectTimer>>,
    /// Consecutive incomplete-credential purges per session id.
    purge_streaks: Mutex<HashMap<String, u32>>,
    events_tx: mpsc::Sender<SessionEvent>,
    events_rx: Mutex<Option<mpsc::Receiver<SessionEvent>>>,
    next_generation: AtomicU64,
    shutdown: CancellationToken,
}

/// Multiplexes tenant sessions onto live connections.
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct SessionManager {
    inner: Arc<Inner>,
}

impl SessionManager {
    pub fn new(
        settings: ManagerSettings,
        storage: Arc<dyn StorageAdapter>,
        connector: Arc<dyn Connector>,
        webhooks: Arc<WebhookDispatcher>,
    ) -> Self {
        let (events_tx, events_rx) = mpsc::channel(settings.event_buffer.max(1));
        let shutdown = CancellationToken::new();
        let inner = Inner {
            queue: OutboundQueue::new(Some(storage.clone()), settings.max_retries),
            resolver: IdentifierResolver::new(
                settings.resolver_max_entries,
                settings.resolver_max_age,
            ),
            keepalive: KeepAliveMonitor::new(
                settings.probe_interval,
                settings.inactivity_threshold,
                settings.probe_timeout,
                shutdown.clone(),
            ),
            credentials: CredentialStore::new(storage.clone()),
            registry: Mutex::new(SessionRegistry::new()),
            in_flight: Mutex::new(HashMap::new()),
            reconnects: Mutex::new(HashMap::new()),
            purge_streaks: Mutex::new(HashMap::new()),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
            next_generation: AtomicU64::new(1),
            shutdown,
            settings,
            storage,
            connector,
            webhooks,
        };
        Self {
            inner: Arc::new(inner),
        }
    }

    pub fn settings(&self) -> &ManagerSettings {
        &self.inner.settings
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.inner.queue
    }

    pub fn resolver(&self) -> &IdentifierResolver {
        &self.inner.resolver
    }

    pub fn webhooks(&self) -> &WebhookDispatcher {
        &self.inner.webhooks
    }

    pub fn credentials(&self) -> &CredentialStore {
        &self.inner.credentials
    }

    /// Processes connection events and runs the queue and keep-alive timers
    /// until `cancel` fires, then shuts down.
    pub async fn run(&self, cancel: CancellationToken) -> Result<(), SwitchboardError> {
        let mut events = self
            .inner
            .events_rx
            .lock()
            .await
            .take()
            .ok_or_else(|| SwitchboardError::Internal("session manager is already running".into()))?;

        let settings = &self.inner.settings;
        let mut drain_tick = tokio::time::interval_at(
            Instant::now() + settings.drain_interval,
            settings.drain_interval,
        );
        drain_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut sweep_tick = tokio::time::interval_at(
            Instant::now() + settings.sweep_interval,
            settings.sweep_interval,
        );
        sweep_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!("session manager running");
        loop {
            tokio::select! {
                Some(event) = events.recv() => self.handle_event(event).await,
                _ = drain_tick.tick() => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        match this.drain_queue().await {
                            Some(report) if report != DrainReport::default() => {
                                debug!(
                                    delivered = report.delivered,
                                    requeued = report.requeued,
                                    dropped = report.dropped,
                                    "queue drained"
                                );
                            }
                            _ => {}
                        }
                    });
                }
                _ = sweep_tick.tick() => {
                    let this = self.clone();
                    tokio::spawn(async move {
                        this.sweep_keepalive().await;
                    });
                }
                _ = cancel.cancelled() => {
                    info!("shutdown signal received, stopping session manager");
                    break;
                }
            }
        }

        self.shutdown().await;
        Ok(())
    }

    /// Stops timers and closes every live connection without logging out,
    /// so durable status stays as it was and sessions resume on restart.
    pub async fn shutdown(&self) {
        self.inner.shutdown.cancel();
        self.inner.keepalive.disarm_all();
        self.inner.reconnects.lock().await.clear();

        let entries = self.inner.registry.lock().await.drain();
        let closed = entries.len();
        for (session_id, entry) in entries {
            entry.handle.close().await;
            debug!(session_id = %session_id, "connection closed for shutdown");
        }
        info!(closed, "session manager stopped");
    }

    // --- Session records ---

    /// Creates the durable record for a session, or returns the existing one.
    pub async fn create_session(
        &self,
        session_id: &str,
        name: Option<&str>,
    ) -> Result<SessionRecord, SwitchboardError> {
        if let Some(existing) = self.inner.storage.find_session(session_id).await? {
            if !existing.is_active {
                return Err(SwitchboardError::SessionInactive {
                    session_id: session_id.to_string(),
                });
            }
            return Ok(existing);
        }

        let now = chrono::Utc::now()
            .format("%Y-%m-%dT%H:%M:%S%.3fZ")
            .to_string();
        let record = SessionRecord {
            id: uuid::Uuid::new_v4().to_string(),
            session_id: session_id.to_string(),
            name: name.map(str::to_string),
            status: SessionStatus::Pending,
            phone_number: None,
            qr_code: None,
            auto_reply: AutoReplyConfig::default(),
            is_active: true,
            last_connected_at: None,
            created_at: now.clone(),
            updated_at: now,
        };
        self.inner.storage.create_session(&record).await?;
        info!(session_id, durable_id = %record.id, "session created");
        Ok(record)
    }

    /// Creates the durable record if needed, then connects.
    pub async fn create_and_connect(
        &self,
        session_id: &str,
        name: Option<&str>,
    ) -> Result<StatusReport, SwitchboardError> {
        self.create_session(session_id, name).await?;
        self.connect(session_id).await
    }

    pub async fn list_sessions(
        &self,
        active_only: bool,
    ) -> Result<Vec<SessionRecord>, SwitchboardError> {
        self.inner.storage.list_sessions(active_only).await
    }

    /// Replaces the auto-reply policy; an empty message keeps the current one.
    pub async fn set_auto_reply(
        &self,
        session_id: &str,
        enabled: bool,
        message: Option<String>,
    ) -> Result<AutoReplyConfig, SwitchboardError> {
        let record = self.require_session(session_id).await?;
        let policy = AutoReplyConfig {
            enabled,
            message: message
                .filter(|m| !m.trim().is_empty())
                .unwrap_or(record.auto_reply.message),
        };
        self.inner
            .storage
            .set_auto_reply(&record.id, &policy)
            .await?;
        if let Some(entry) = self.inner.registry.lock().await.get_mut(session_id) {
            entry.auto_reply = policy.clone();
        }
        info!(session_id, enabled, "auto-reply updated");
        Ok(policy)
    }

    /// Logs out, purges credentials and queued sends, and deactivates the
    /// record so it is never resumed.
    pub async fn delete_session(&self, session_id: &str) -> Result<(), SwitchboardError> {
        let record = self.require_session(session_id).await?;
        self.disconnect(session_id).await?;
        let purged = self.inner.queue.remove_session(session_id).await;
        self.inner.storage.deactivate_session(&record.id).await?;
        info!(session_id, purged_messages = purged, "session deleted");
        Ok(())
    }

    // --- Lifecycle ---

    /// Connects a session.
    ///
    /// A session that is already pending or connected is left alone. A
    /// concurrent call for the same id joins the attempt in flight instead
    /// of opening a second connection.
    pub async fn connect(&self, session_id: &str) -> Result<StatusReport, SwitchboardError> {
        let attempt = {
            let mut in_flight = self.inner.in_flight.lock().await;
            match in_flight.get(session_id) {
                Some(existing) => {
                    debug!(session_id, "joining in-flight connect");
                    existing.attempt.clone()
                }
                None => {
                    if let Some(report) = self.live_report(session_id).await {
                        debug!(session_id, "session already live, connect is a no-op");
                        return Ok(report);
                    }
                    let this = self.clone();
                    let id = session_id.to_string();
                    let attempt_id = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
                    let cancel = self.inner.shutdown.child_token();
                    let attempt_cancel = cancel.clone();
                    let task = tokio::spawn(async move {
                        let result = this
                            .open_session(&id, &attempt_cancel)
                            .await
                            .map_err(Arc::new);
                        let mut in_flight = this.inner.in_flight.lock().await;
                        if in_flight.get(&id).is_some_and(|f| f.id == attempt_id) {
                            in_flight.remove(&id);
                        }
                        result
                    });
                    let attempt: ConnectFuture = async move {
                        task.await.unwrap_or_else(|e| {
                            Err(Arc::new(SwitchboardError::Internal(format!(
                                "connect task failed: {e}"
                            ))))
                        })
                    }
                    .boxed()
                    .shared();
                    in_flight.insert(
                        session_id.to_string(),
                        InFlight {
                            id: attempt_id,
                            attempt: attempt.clone(),
                            cancel,
                        },
                    );
                    attempt
                }
            }
        };
        attempt.await.map_err(unshare)
    }

    /// Logs a session out and purges its credential state.
    ///
    /// No reconnect follows, and a connect still in flight is abandoned:
    /// whatever it opens is closed instead of registered. The durable record
    /// stays active and can be connected again, which starts a fresh pairing.
    pub async fn disconnect(&self, session_id: &str) -> Result<(), SwitchboardError> {
        let record = self.require_session(session_id).await?;
        self.cancel_reconnect(session_id).await;
        if let Some(pending) = self.inner.in_flight.lock().await.remove(session_id) {
            debug!(session_id, "abandoning in-flight connect");
            pending.cancel.cancel();
        }
        let entry = self.inner.registry.lock().await.remove(session_id);
        self.inner.keepalive.disarm(session_id);

        if let Some(entry) = entry {
            if let Err(e) = entry.handle.logout().await {
                warn!(session_id, error = %e, "logout failed, closing anyway");
            }
            entry.handle.close().await;
            self.emit(
                &record.id,
                WebhookEvent::new(webhook_event::SESSION_DISCONNECTED, session_id)
                    .field("reason", CloseReason::LoggedOut.to_string()),
            );
        }

        self.inner.credentials.clear_all(&record.id).await?;
        self.inner.purge_streaks.lock().await.remove(session_id);
        self.inner
            .storage
            .update_session_status(&record.id, SessionStatus::Disconnected)
            .await?;
        self.inner.storage.set_qr_code(&record.id, None).await?;
        info!(session_id, "session disconnected");
        Ok(())
    }

    /// Current status: live state when a connection exists, else the
    /// durable record.
    pub async fn status(&self, session_id: &str) -> Result<StatusReport, SwitchboardError> {
        if let Some(report) = self.live_report(session_id).await {
            return Ok(report);
        }
        let record = self.require_session(session_id).await?;
        let status = match record.status {
            SessionStatus::Connected | SessionStatus::Pending => SessionStatus::Disconnected,
            other => other,
        };
        Ok(StatusReport {
            connected: false,
            status: Some(status),
            phone_number: record.phone_number,
            qr_payload: None,
        })
    }

    /// Whether a live (pending or connected) connection exists.
    pub async fn has_session(&self, session_id: &str) -> bool {
        self.inner.registry.lock().await.contains(session_id)
    }

    /// The QR challenge awaiting a scan, if any.
    pub async fn qr_code(&self, session_id: &str) -> Option<String> {
        self.inner
            .registry
            .lock()
            .await
            .get(session_id)
            .and_then(|e| e.qr_code.clone())
    }

    /// Reconnects every active session last recorded as connected.
    pub async fn resume(&self) -> Result<usize, SwitchboardError> {
        let records = self.inner.storage.list_sessions(true).await?;
        let mut resumed = 0;
        for record in records
            .into_iter()
            .filter(|r| r.status == SessionStatus::Connected)
        {
            match self.connect(&record.session_id).await {
                Ok(_) => resumed += 1,
                Err(e) => {
                    warn!(session_id = %record.session_id, error = %e, "failed to resume session");
                }
            }
        }
        info!(count = resumed, "sessions resumed");
        Ok(resumed)
    }

    /// Reloads persisted queued sends into memory.
    pub async fn restore_queue(&self) -> usize {
        self.inner.queue.restore().await
    }

    // --- Sending ---

    pub async fn send_text(
        &self,
        session_id: &str,
        recipient: &str,
        text: &str,
    ) -> Result<SendOutcome, SwitchboardError> {
        self.send(session_id, recipient, OutboundPayload::text(text))
            .await
    }

    pub async fn send_image(
        &self,
        session_id: &str,
        recipient: &str,
        data: Vec<u8>,
        caption: Option<String>,
    ) -> Result<SendOutcome, SwitchboardError> {
        self.send(session_id, recipient, OutboundPayload::Image { data, caption })
            .await
    }

    pub async fn send_document(
        &self,
        session_id: &str,
        recipient: &str,
        data: Vec<u8>,
        filename: String,
        mimetype: Option<String>,
        caption: Option<String>,
    ) -> Result<SendOutcome, SwitchboardError> {
        let payload = OutboundPayload::Document {
            data,
            filename,
            mimetype,
            caption,
        };
        self.send(session_id, recipient, payload).await
    }

    pub async fn send_video(
        &self,
        session_id: &str,
        recipient: &str,
        data: Vec<u8>,
        caption: Option<String>,
    ) -> Result<SendOutcome, SwitchboardError> {
        self.send(session_id, recipient, OutboundPayload::Video { data, caption })
            .await
    }

    /// Sends a payload, queueing it when the session is not connected.
    ///
    /// Invalid recipients and unresolved ephemeral addresses are rejected
    /// before anything is queued or sent. A send that times out is queued
    /// with one retry already counted.
    pub async fn send(
        &self,
        session_id: &str,
        recipient: &str,
        payload: OutboundPayload,
    ) -> Result<SendOutcome, SwitchboardError> {
        let mut to = address::normalize_recipient(recipient, &self.inner.settings.default_country_code)?;
        if address::is_ephemeral(&to) {
            to = self
                .inner
                .resolver
                .resolve(&to)
                .ok_or_else(|| SwitchboardError::UnresolvedAddress {
                    address: to.clone(),
                })?;
        }
        let payload = with_default_mimetype(payload);

        let Some((handle, generation)) = self.live_handle(session_id).await else {
            self.require_session(session_id).await?;
            let queue_id = self.enqueue(session_id, &to, payload, 0).await;
            return Ok(SendOutcome::queued(queue_id));
        };

        let timeout = self.inner.settings.send_timeout_for(&payload);
        match tokio::time::timeout(timeout, handle.send(&to, &payload)).await {
            Ok(Ok(delivery_id)) => {
                self.touch(session_id, generation).await;
                debug!(session_id, recipient = %to, kind = %payload.kind(), "message sent");
                Ok(SendOutcome::sent(delivery_id))
            }
            Ok(Err(e)) => {
                warn!(session_id, recipient = %to, error = %e, "send failed");
                Ok(SendOutcome::failed(e.to_string()))
            }
            Err(_) => {
                let error = SwitchboardError::Timeout { duration: timeout };
                warn!(session_id, recipient = %to, error = %error, "send timed out, queueing for retry");
                let queue_id = self.enqueue(session_id, &to, payload, 1).await;
                Ok(SendOutcome {
                    status: SendStatus::Queued,
                    delivery_id: Some(queue_id),
                    error: Some(format!("send timed out after {}ms", timeout.as_millis())),
                })
            }
        }
    }

    /// Runs one pass over the whole queue. `None` if a drain is running.
    pub async fn drain_queue(&self) -> Option<DrainReport> {
        self.inner
            .queue
            .drain(|item| self.deliver_queued(item))
            .await
    }

    /// Replays the queued sends of one session.
    pub async fn flush_queue(&self, session_id: &str) -> DrainReport {
        self.inner
            .queue
            .flush_session(session_id, |item| self.deliver_queued(item))
            .await
    }

    /// Probes connected sessions idle past the inactivity threshold.
    pub async fn sweep_keepalive(&self) -> Option<usize> {
        let targets: Vec<SweepTarget> = self
            .inner
            .registry
            .lock()
            .await
            .iter()
            .filter(|(_, e)| e.is_connected())
            .map(|(id, e)| SweepTarget {
                session_id: id.clone(),
                last_activity: e.last_activity,
                handle: e.handle.clone(),
            })
            .collect();
        self.inner.keepalive.sweep(targets).await
    }

    async fn deliver_queued(&self, item: QueuedMessage) -> Attempt {
        let Some((handle, generation)) = self.live_handle(&item.session_id).await else {
            return Attempt::NotConnected;
        };
        let timeout = self.inner.settings.send_timeout_for(&item.payload);
        match tokio::time::timeout(timeout, handle.send(&item.recipient, &item.payload)).await {
            Ok(Ok(_)) => {
                self.touch(&item.session_id, generation).await;
                debug!(queue_id = %item.id, session_id = %item.session_id, "queued message delivered");
                Attempt::Delivered
            }
            Ok(Err(e)) => Attempt::Failed(e.to_string()),
            Err(_) => Attempt::Failed(SwitchboardError::Timeout { duration: timeout }.to_string()),
        }
    }

    async fn enqueue(
        &self,
        session_id: &str,
        recipient: &str,
        payload: OutboundPayload,
        retries: u32,
    ) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.inner
            .queue
            .enqueue(QueuedMessage {
                id: id.clone(),
                session_id: session_id.to_string(),
                recipient: recipient.to_string(),
                payload,
                retries,
                created_at: chrono::Utc::now()
                    .format("%Y-%m-%dT%H:%M:%S%.6fZ")
                    .to_string(),
            })
            .await;
        id
    }

    // --- Connection events ---

    async fn handle_event(&self, event: SessionEvent) {
        let SessionEvent {
            session_id,
            generation,
            event,
        } = event;
        match event {
            ConnectionEvent::QrIssued { payload } => {
                self.on_qr(&session_id, generation, payload).await
            }
            ConnectionEvent::Opened { self_address } => {
                self.on_open(&session_id, generation, &self_address).await
            }
            ConnectionEvent::Closed { reason } => {
                self.on_close(&session_id, generation, reason).await
            }
            ConnectionEvent::MessageReceived(envelope) => {
                self.on_message(&session_id, generation, envelope).await
            }
            ConnectionEvent::CredentialsUpdated(changes) => {
                self.on_credentials(&session_id, generation, &changes).await
            }
        }
    }

    async fn on_qr(&self, session_id: &str, generation: u64, payload: String) {
        let durable_id = {
            let mut registry = self.inner.registry.lock().await;
            let Some(entry) = registry.current_mut(session_id, generation) else {
                debug!(session_id, generation, "ignoring QR from stale connection");
                return;
            };
            entry.qr_code = Some(payload.clone());
            entry.durable_id.clone()
        };
        info!(session_id, "QR challenge issued");
        if let Err(e) = self
            .inner
            .storage
            .set_qr_code(&durable_id, Some(&payload))
            .await
        {
            warn!(session_id, error = %e, "failed to persist QR challenge");
        }
    }

    async fn on_open(&self, session_id: &str, generation: u64, self_address: &str) {
        let phone = address::user_part(self_address).to_string();
        let (durable_id, handle) = {
            let mut registry = self.inner.registry.lock().await;
            let Some(entry) = registry.current_mut(session_id, generation) else {
                debug!(session_id, generation, "ignoring open from stale connection");
                return;
            };
            entry.status = SessionStatus::Connected;
            entry.qr_code = None;
            entry.phone_number = Some(phone.clone());
            entry.touch();
            (entry.durable_id.clone(), entry.handle.clone())
        };
        info!(session_id, phone_number = %phone, generation, "session connected");

        if let Err(e) = self.inner.storage.mark_connected(&durable_id, &phone).await {
            warn!(session_id, error = %e, "failed to persist connected state");
        }
        self.inner.purge_streaks.lock().await.remove(session_id);
        self.inner.keepalive.arm(session_id, handle);

        let this = self.clone();
        let id = session_id.to_string();
        tokio::spawn(async move {
            let report = this.flush_queue(&id).await;
            if report != DrainReport::default() {
                info!(
                    session_id = %id,
                    delivered = report.delivered,
                    requeued = report.requeued,
                    dropped = report.dropped,
                    "queued messages flushed"
                );
            }
        });

        self.emit(
            &durable_id,
            WebhookEvent::new(webhook_event::SESSION_CONNECTED, session_id)
                .field("phoneNumber", phone),
        );
    }

    async fn on_close(&self, session_id: &str, generation: u64, reason: CloseReason) {
        let Some(entry) = self
            .inner
            .registry
            .lock()
            .await
            .remove_current(session_id, generation)
        else {
            debug!(session_id, generation, %reason, "ignoring close from stale connection");
            return;
        };
        self.inner.keepalive.disarm(session_id);
        info!(session_id, generation, %reason, "connection closed");

        if let Err(e) = self
            .inner
            .storage
            .update_session_status(&entry.durable_id, SessionStatus::Disconnected)
            .await
        {
            warn!(session_id, error = %e, "failed to persist disconnected state");
        }
        if let Err(e) = self.inner.storage.set_qr_code(&entry.durable_id, None).await {
            warn!(session_id, error = %e, "failed to clear QR challenge");
        }
        entry.handle.close().await;

        self.emit(
            &entry.durable_id,
            WebhookEvent::new(webhook_event::SESSION_DISCONNECTED, session_id)
                .field("reason", reason.to_string()),
        );

        if reason.is_logout() {
            info!(session_id, "logged out, not reconnecting");
            if let Err(e) = self.inner.credentials.clear_all(&entry.durable_id).await {
                warn!(session_id, error = %e, "failed to purge revoked credentials");
            }
        } else {
            self.schedule_reconnect(session_id).await;
        }
    }

    async fn on_message(&self, session_id: &str, generation: u64, envelope: InboundEnvelope) {
        if envelope.from_me {
            return;
        }
        let (durable_id, policy) = {
            let mut registry = self.inner.registry.lock().await;
            let Some(entry) = registry.current_mut(session_id, generation) else {
                debug!(session_id, generation, "ignoring message from stale connection");
                return;
            };
            entry.touch();
            (entry.durable_id.clone(), entry.auto_reply.clone())
        };

        let Some(from) = self.inner.resolver.resolve_inbound(&envelope) else {
            warn!(
                session_id,
                from = %envelope.from,
                message_id = %envelope.message_id,
                "dropping message from unresolved ephemeral address"
            );
            return;
        };
        debug!(session_id, from = %from, message_id = %envelope.message_id, "message received");

        self.emit(
            &durable_id,
            WebhookEvent::new(webhook_event::MESSAGE_RECEIVED, session_id)
                .with_timestamp(envelope.timestamp)
                .field("from", from.clone())
                .field("messageId", envelope.message_id.clone())
                .field("type", envelope.kind.to_string())
                .field("text", envelope.text.clone().unwrap_or_default())
                .field("pushName", envelope.push_name.clone()),
        );

        if address::kind(&from) == AddressKind::Group {
            return;
        }
        if let Some(reply) = auto_reply::reply_for(&policy, envelope.text.as_deref()) {
            let this = self.clone();
            let id = session_id.to_string();
            let reply = reply.to_string();
            tokio::spawn(async move {
                match this.send_text(&id, &from, &reply).await {
                    Ok(outcome) => {
                        debug!(session_id = %id, recipient = %from, status = %outcome.status, "auto-reply sent");
                    }
                    Err(e) => {
                        warn!(session_id = %id, recipient = %from, error = %e, "auto-reply failed");
                    }
                }
            });
        }
    }

    async fn on_credentials(&self, session_id: &str, generation: u64, changes: &[CredentialChange]) {
        let durable_id = {
            let registry = self.inner.registry.lock().await;
            match registry.get(session_id) {
                Some(entry) if entry.generation == generation => entry.durable_id.clone(),
                _ => {
                    debug!(session_id, generation, "ignoring credentials from stale connection");
                    return;
                }
            }
        };
        if let Err(e) = self.inner.credentials.apply(&durable_id, changes).await {
            warn!(session_id, error = %e, "failed to persist credential update");
        }
    }

    // --- Internals ---

    async fn open_session(
        &self,
        session_id: &str,
        cancel: &CancellationToken,
    ) -> Result<StatusReport, SwitchboardError> {
        let record = self.require_session(session_id).await?;
        if !record.is_active {
            return Err(SwitchboardError::SessionInactive {
                session_id: session_id.to_string(),
            });
        }
        self.cancel_reconnect(session_id).await;

        let prepared = self.inner.credentials.prepare(&record.id).await?;
        if prepared.purged {
            let streak = {
                let mut streaks = self.inner.purge_streaks.lock().await;
                let streak = streaks.entry(session_id.to_string()).or_insert(0);
                *streak += 1;
                *streak
            };
            if streak > self.inner.settings.max_credential_purges {
                warn!(session_id, streak, "credentials keep arriving incomplete, deactivating session");
                self.inner.purge_streaks.lock().await.remove(session_id);
                self.inner.storage.deactivate_session(&record.id).await?;
                return Err(SwitchboardError::CredentialsRejected {
                    session_id: session_id.to_string(),
                    reason: format!("credential state incomplete {streak} times in a row"),
                });
            }
        }

        let generation = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        info!(
            session_id,
            generation,
            resuming = !prepared.state.is_empty(),
            "opening connection"
        );
        let connection = match self
            .inner
            .connector
            .open(&SessionId(session_id.to_string()), prepared.state)
            .await
        {
            Ok(connection) => connection,
            Err(e @ SwitchboardError::CredentialsRejected { .. }) => {
                warn!(session_id, error = %e, "credentials rejected, deactivating session");
                if let Err(err) = self.inner.credentials.clear_all(&record.id).await {
                    warn!(session_id, error = %err, "failed to purge rejected credentials");
                }
                if let Err(err) = self.inner.storage.deactivate_session(&record.id).await {
                    warn!(session_id, error = %err, "failed to deactivate session");
                }
                return Err(e);
            }
            Err(e) => {
                warn!(session_id, error = %e, "connection setup failed");
                if cancel.is_cancelled() {
                    return Err(e);
                }
                if let Err(err) = self
                    .inner
                    .storage
                    .update_session_status(&record.id, SessionStatus::Error)
                    .await
                {
                    warn!(session_id, error = %err, "failed to persist error state");
                }
                return Err(e);
            }
        };

        let Connection { handle, events } = connection;

        // `disconnect` cancels before it takes the registry lock, so checking
        // under the lock means either it sees this entry or this sees the
        // cancellation.
        let (replaced, report) = {
            let mut registry = self.inner.registry.lock().await;
            if cancel.is_cancelled() {
                drop(registry);
                info!(session_id, generation, "connect abandoned, closing new connection");
                handle.close().await;
                return Err(SwitchboardError::connection(format!(
                    "connect for {session_id} was abandoned"
                )));
            }
            self.inner
                .storage
                .update_session_status(&record.id, SessionStatus::Pending)
                .await?;
            let entry = SessionEntry::new(record.id, generation, handle, record.auto_reply);
            let report = entry.report();
            (registry.insert(session_id, entry), report)
        };
        if let Some(previous) = replaced {
            previous.handle.close().await;
        }
        self.spawn_forwarder(session_id.to_string(), generation, events);
        Ok(report)
    }

    /// Forwards one connection's events into the manager channel.
    ///
    /// A stream that ends without a close event is reported as lost.
    fn spawn_forwarder(
        &self,
        session_id: String,
        generation: u64,
        mut events: mpsc::Receiver<ConnectionEvent>,
    ) {
        let tx = self.inner.events_tx.clone();
        let shutdown = self.inner.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    event = events.recv() => event,
                    _ = shutdown.cancelled() => return,
                };
                let Some(event) = event else { break };
                let closed = matches!(event, ConnectionEvent::Closed { .. });
                let tagged = SessionEvent {
                    session_id: session_id.clone(),
                    generation,
                    event,
                };
                if tx.send(tagged).await.is_err() || closed {
                    return;
                }
            }
            let lost = SessionEvent {
                session_id,
                generation,
                event: ConnectionEvent::Closed {
                    reason: CloseReason::ConnectionLost,
                },
            };
            let _ = tx.send(lost).await;
        });
    }

    async fn schedule_reconnect(&self, session_id: &str) {
        let token = self.inner.shutdown.child_token();
        let id = self.inner.next_generation.fetch_add(1, Ordering::SeqCst);
        let previous = self.inner.reconnects.lock().await.insert(
            session_id.to_string(),
            ReconnectTimer {
                id,
                token: token.clone(),
            },
        );
        if let Some(previous) = previous {
            previous.token.cancel();
        }

        let delay = self.inner.settings.reconnect_delay;
        info!(session_id, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
        let this = self.clone();
        let session_id = session_id.to_string();
        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep(delay) => {}
                _ = token.cancelled() => {
                    debug!(session_id = %session_id, "reconnect cancelled");
                    return;
                }
            }
            {
                let mut reconnects = this.inner.reconnects.lock().await;
                if reconnects.get(&session_id).is_some_and(|t| t.id == id) {
                    reconnects.remove(&session_id);
                }
            }
            match this.connect(&session_id).await {
                Ok(_) => info!(session_id = %session_id, "reconnect started"),
                Err(e) => warn!(session_id = %session_id, error = %e, "reconnect failed"),
            }
        });
    }

    async fn cancel_reconnect(&self, session_id: &str) {
        if let Some(timer) = self.inner.reconnects.lock().await.remove(session_id) {
            timer.token.cancel();
        }
    }

    async fn require_session(&self, session_id: &str) -> Result<SessionRecord, SwitchboardError> {
        self.inner
            .storage
            .find_session(session_id)
            .await?
            .ok_or_else(|| SwitchboardError::SessionNotFound {
                session_id: session_id.to_string(),
            })
    }

    async fn live_report(&self, session_id: &str) -> Option<StatusReport> {
        self.inner
            .registry
            .lock()
            .await
            .get(session_id)
            .map(SessionEntry::report)
    }

    async fn live_handle(&self, session_id: &str) -> Option<(Arc<dyn ConnectionHandle>, u64)> {
        self.inner
            .registry
            .lock()
            .await
            .get(session_id)
            .filter(|e| e.is_connected())
            .map(|e| (e.handle.clone(), e.generation))
    }

    async fn touch(&self, session_id: &str, generation: u64) {
        if let Some(entry) = self
            .inner
            .registry
            .lock()
            .await
            .current_mut(session_id, generation)
        {
            entry.touch();
        }
    }

    /// Delivers a webhook event in the background.
    fn emit(&self, durable_id: &str, event: WebhookEvent) {
        let webhooks = self.inner.webhooks.clone();
        let durable_id = durable_id.to_string();
        tokio::spawn(async move {
            webhooks.dispatch_event(&durable_id, &event).await;
        });
    }
}

fn with_default_mimetype(payload: OutboundPayload) -> OutboundPayload {
    match payload {
        OutboundPayload::Document {
            data,
            filename,
            mimetype: None,
            caption,
        } => OutboundPayload::Document {
            data,
            filename,
            mimetype: Some(DEFAULT_DOCUMENT_MIMETYPE.to_string()),
            caption,
        },
        other => other,
    }
}

/// Recovers an owned error from a shared connect outcome.
fn unshare(error: Arc<SwitchboardError>) -> SwitchboardError {
    match Arc::try_unwrap(error) {
        Ok(error) => error,
        Err(shared) => match shared.as_ref() {
            SwitchboardError::SessionNotFound { session_id } => SwitchboardError::SessionNotFound {
                session_id: session_id.clone(),
            },
            SwitchboardError::SessionInactive { session_id } => SwitchboardError::SessionInactive {
                session_id: session_id.clone(),
            },
            SwitchboardError::CredentialsRejected { session_id, reason } => {
                SwitchboardError::CredentialsRejected {
                    session_id: session_id.clone(),
                    reason: reason.clone(),
                }
            }
            other => SwitchboardError::Connection {
                message: other.to_string(),
                source: Some(Box::new(shared.clone())),
            },
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn documents_default_to_pdf() {
        let doc = with_default_mimetype(OutboundPayload::Document {
            data: vec![1],
            filename: "a.bin".to_string(),
            mimetype: None,
            caption: None,
        });
        match doc {
            OutboundPayload::Document { mimetype, .. } => {
                assert_eq!(mimetype.as_deref(), Some("application/pdf"));
            }
            other => panic!("unexpected payload {other:?}"),
        }

        let explicit = OutboundPayload::Document {
            data: vec![1],
            filename: "a.png".to_string(),
            mimetype: Some("image/png".to_string()),
            caption: None,
        };
        assert_eq!(with_default_mimetype(explicit.clone()), explicit);
    }

    #[test]
    fn shared_errors_keep_their_code() {
        let shared = Arc::new(SwitchboardError::SessionNotFound {
            session_id: "s".into(),
        });
        let _second_owner = shared.clone();
        assert_eq!(unshare(shared).code(), "SESSION_NOT_FOUND");

        let shared = Arc::new(SwitchboardError::connection("reset"));
        let _second_owner = shared.clone();
        assert_eq!(unshare(shared).code(), "CONNECTION_ERROR");
    }
}
