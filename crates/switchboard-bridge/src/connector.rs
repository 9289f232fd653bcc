// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `Connector` implementation over one WebSocket per session.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use switchboard_config::model::BridgeConfig;
use switchboard_core::types::{
    CloseReason, ConnectionEvent, CredentialState, DeliveryId, OutboundPayload,
};
use switchboard_core::{
    AdapterType, Connection, ConnectionHandle, Connector, HealthStatus, PluginAdapter, SessionId,
    SwitchboardError,
};

use crate::frame::{CREDENTIALS_REJECTED, Frame, Request};

/// Buffered connection events per session before the reader applies backpressure.
const EVENT_BUFFER: usize = 256;

/// Reply to a request: the sidecar's message id on `ack`, or its error.
type Reply = Result<Option<String>, BridgeFailure>;

#[derive(Debug, Clone)]
struct BridgeFailure {
    code: String,
    message: String,
}

/// Opens sidecar connections.
pub struct BridgeConnector {
    url: String,
    request_timeout: Duration,
}

impl BridgeConnector {
    pub fn new(config: &BridgeConfig) -> Self {
        Self {
            url: config.url.clone(),
            request_timeout: Duration::from_secs(config.request_timeout_secs),
        }
    }

    fn session_url(&self, session_id: &SessionId) -> Result<String, SwitchboardError> {
        let mut url = reqwest::Url::parse(&self.url).map_err(|e| SwitchboardError::Config(
            format!("invalid bridge url `{}`: {e}", self.url),
        ))?;
        url.query_pairs_mut().append_pair("session", &session_id.0);
        Ok(url.to_string())
    }
}

#[async_trait]
impl PluginAdapter for BridgeConnector {
    fn name(&self) -> &str {
        "bridge"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    fn adapter_type(&self) -> AdapterType {
        AdapterType::Connector
    }

    async fn health_check(&self) -> Result<HealthStatus, SwitchboardError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), SwitchboardError> {
        Ok(())
    }
}

#[async_trait]
impl Connector for BridgeConnector {
    async fn open(
        &self,
        session_id: &SessionId,
        credentials: CredentialState,
    ) -> Result<Connection, SwitchboardError> {
        let url = self.session_url(session_id)?;
        let (ws, _) = connect_async(url.as_str())
            .await
            .map_err(|e| SwitchboardError::Connection {
                message: format!("failed to reach bridge at {url}: {e}"),
                source: Some(Box::new(e)),
            })?;
        let (mut write, mut read) = ws.split();

        let (outgoing_tx, mut outgoing_rx) = mpsc::channel::<Message>(64);
        let (events_tx, events_rx) = mpsc::channel(EVENT_BUFFER);
        let link = Arc::new(Link {
            session_id: session_id.0.clone(),
            outgoing: outgoing_tx,
            pending: DashMap::new(),
            request_timeout: self.request_timeout,
            closed: AtomicBool::new(false),
        });

        // Writer: drains outgoing frames until the link is dropped or a close is sent.
        let writer_session = session_id.0.clone();
        tokio::spawn(async move {
            while let Some(msg) = outgoing_rx.recv().await {
                let closing = matches!(msg, Message::Close(_));
                if let Err(e) = write.send(msg).await {
                    debug!(session_id = %writer_session, error = %e, "bridge write failed");
                    break;
                }
                if closing {
                    break;
                }
            }
        });

        // Reader: routes replies to pending requests and everything else to the manager.
        let reader_link = link.clone();
        tokio::spawn(async move {
            let mut saw_close = false;
            while let Some(msg) = read.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Ping(data)) => {
                        let _ = reader_link.outgoing.send(Message::Pong(data)).await;
                        continue;
                    }
                    Ok(Message::Close(_)) => break,
                    Ok(_) => continue,
                    Err(e) => {
                        warn!(session_id = %reader_link.session_id, error = %e, "bridge read failed");
                        break;
                    }
                };
                let frame = match Frame::parse(text.as_str()) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(session_id = %reader_link.session_id, error = %e, "ignoring bridge frame");
                        continue;
                    }
                };
                match frame {
                    Frame::Ack {
                        request_id,
                        message_id,
                    } => reader_link.complete(&request_id, Ok(message_id)),
                    Frame::Error {
                        request_id,
                        code,
                        message,
                    } => match request_id {
                        Some(id) => reader_link.complete(&id, Err(BridgeFailure { code, message })),
                        None => warn!(
                            session_id = %reader_link.session_id,
                            code = %code,
                            message = %message,
                            "bridge reported error"
                        ),
                    },
                    other => match other.into_event() {
                        Ok(Some(event)) => {
                            saw_close = matches!(event, ConnectionEvent::Closed { .. });
                            if events_tx.send(event).await.is_err() || saw_close {
                                break;
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            warn!(session_id = %reader_link.session_id, error = %e, "ignoring bridge event");
                        }
                    },
                }
            }

            reader_link.closed.store(true, Ordering::SeqCst);
            reader_link.fail_pending();
            if !saw_close {
                let _ = events_tx
                    .send(ConnectionEvent::Closed {
                        reason: CloseReason::ConnectionLost,
                    })
                    .await;
            }
            debug!(session_id = %reader_link.session_id, "bridge reader stopped");
        });

        let request = Request::open(link.next_request_id(), &credentials);
        match link.request(request).await {
            Ok(_) => {}
            Err(RequestError::Failed(failure)) if failure.code == CREDENTIALS_REJECTED => {
                link.shutdown().await;
                return Err(SwitchboardError::CredentialsRejected {
                    session_id: session_id.0.clone(),
                    reason: failure.message,
                });
            }
            Err(e) => {
                link.shutdown().await;
                return Err(e.into_error("open"));
            }
        }

        info!(session_id = %session_id, resuming = !credentials.is_empty(), "bridge connection opened");
        Ok(Connection {
            handle: Arc::new(BridgeHandle { link }),
            events: events_rx,
        })
    }
}

enum RequestError {
    Failed(BridgeFailure),
    Timeout(Duration),
    Closed,
}

impl RequestError {
    fn into_error(self, op: &str) -> SwitchboardError {
        match self {
            Self::Failed(f) => SwitchboardError::connection(format!(
                "bridge rejected {op}: {} ({})",
                f.message, f.code
            )),
            Self::Timeout(duration) => SwitchboardError::Timeout { duration },
            Self::Closed => SwitchboardError::connection(format!(
                "bridge connection closed during {op}"
            )),
        }
    }
}

/// Shared state of one sidecar connection.
struct Link {
    session_id: String,
    outgoing: mpsc::Sender<Message>,
    pending: DashMap<String, oneshot::Sender<Reply>>,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl Link {
    fn next_request_id(&self) -> String {
        uuid::Uuid::new_v4().to_string()
    }

    async fn request(&self, request: Request) -> Result<Option<String>, RequestError> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(RequestError::Closed);
        }
        let request_id = request.request_id().to_string();
        let body = serde_json::to_string(&request).map_err(|e| {
            RequestError::Failed(BridgeFailure {
                code: "encode".to_string(),
                message: e.to_string(),
            })
        })?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(request_id.clone(), tx);
        if self.outgoing.send(Message::text(body)).await.is_err() {
            self.pending.remove(&request_id);
            return Err(RequestError::Closed);
        }
        debug!(session_id = %self.session_id, op = request.op(), request_id = %request_id, "bridge request sent");

        match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(Ok(message_id))) => Ok(message_id),
            Ok(Ok(Err(failure))) => Err(RequestError::Failed(failure)),
            Ok(Err(_)) => Err(RequestError::Closed),
            Err(_) => {
                self.pending.remove(&request_id);
                Err(RequestError::Timeout(self.request_timeout))
            }
        }
    }

    fn complete(&self, request_id: &str, reply: Reply) {
        match self.pending.remove(request_id) {
            Some((_, tx)) => {
                let _ = tx.send(reply);
            }
            None => debug!(session_id = %self.session_id, request_id, "reply for unknown request"),
        }
    }

    /// Drops every waiter; their requests resolve as closed.
    fn fail_pending(&self) {
        self.pending.clear();
    }

    async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            let _ = self.outgoing.send(Message::Close(None)).await;
        }
    }
}

/// Outbound side of a sidecar connection.
pub struct BridgeHandle {
    link: Arc<Link>,
}

#[async_trait]
impl ConnectionHandle for BridgeHandle {
    async fn send(
        &self,
        to: &str,
        payload: &OutboundPayload,
    ) -> Result<DeliveryId, SwitchboardError> {
        let request_id = self.link.next_request_id();
        let request = Request::send(request_id.clone(), to, payload);
        let message_id = self
            .link
            .request(request)
            .await
            .map_err(|e| e.into_error("send"))?;
        Ok(DeliveryId(message_id.unwrap_or(request_id)))
    }

    async fn probe(&self) -> Result<(), SwitchboardError> {
        let request = Request::Presence {
            request_id: self.link.next_request_id(),
        };
        self.link
            .request(request)
            .await
            .map(|_| ())
            .map_err(|e| e.into_error("presence"))
    }

    async fn logout(&self) -> Result<(), SwitchboardError> {
        let request = Request::Logout {
            request_id: self.link.next_request_id(),
        };
        self.link
            .request(request)
            .await
            .map(|_| ())
            .map_err(|e| e.into_error("logout"))
    }

    async fn close(&self) {
        self.link.shutdown().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_id_is_query_encoded() {
        let connector = BridgeConnector::new(&BridgeConfig {
            url: "ws://127.0.0.1:3001/bridge".into(),
            request_timeout_secs: 5,
        });
        let url = connector
            .session_url(&SessionId("tenant a&b".into()))
            .unwrap();
        assert_eq!(url, "ws://127.0.0.1:3001/bridge?session=tenant+a%26b");
    }

    #[test]
    fn invalid_bridge_url_is_a_config_error() {
        let connector = BridgeConnector::new(&BridgeConfig {
            url: "not a url".into(),
            request_timeout_secs: 5,
        });
        let err = connector.session_url(&SessionId("s".into())).unwrap_err();
        assert_eq!(err.code(), "CONFIG_ERROR");
    }
}
