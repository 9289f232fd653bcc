// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Webhook registration and delivery.
//!
//! Deliveries are fire-and-forget: a failed call is logged and counted on
//! the registration but never retried automatically. [`WebhookDispatcher::send_test`]
//! is the explicit replay path.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use rand::Rng;
use serde::Serialize;
use switchboard_config::model::WebhookConfig;
use switchboard_core::types::WebhookRegistration;
use switchboard_core::{StorageAdapter, SwitchboardError};
use tracing::{debug, info, warn};

use crate::event::{self, WebhookEvent};
use crate::signature;

pub const HEADER_SECRET: &str = "X-Webhook-Secret";
pub const HEADER_SIGNATURE: &str = "X-Webhook-Signature";
pub const HEADER_EVENT: &str = "X-Webhook-Event";

/// Result of one delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookDelivery {
    pub webhook_id: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Signs and posts events to tenant endpoints.
pub struct WebhookDispatcher {
    client: reqwest::Client,
    storage: Arc<dyn StorageAdapter>,
    preview_chars: usize,
}

impl WebhookDispatcher {
    pub fn new(
        config: &WebhookConfig,
        storage: Arc<dyn StorageAdapter>,
    ) -> Result<Self, SwitchboardError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()
            .map_err(|e| SwitchboardError::Webhook {
                message: format!("failed to build HTTP client: {e}"),
                source: Some(Box::new(e)),
            })?;
        Ok(Self {
            client,
            storage,
            preview_chars: config.response_preview_chars,
        })
    }

    /// Registers `url` for a session, or refreshes the existing pair.
    ///
    /// A new pair gets a fresh 32-byte hex secret; an existing pair keeps
    /// its secret and has its event set replaced.
    pub async fn register(
        &self,
        session_id: &str,
        url: &str,
        events: &[String],
    ) -> Result<WebhookRegistration, SwitchboardError> {
        let parsed = reqwest::Url::parse(url).map_err(|e| SwitchboardError::Webhook {
            message: format!("invalid webhook url {url}: {e}"),
            source: Some(Box::new(e)),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(SwitchboardError::webhook(format!(
                "webhook url must be http or https: {url}"
            )));
        }
        if events.is_empty() {
            return Err(SwitchboardError::webhook("at least one event is required"));
        }

        let secret = hex::encode(rand::thread_rng().r#gen::<[u8; 32]>());
        let id = uuid::Uuid::new_v4().to_string();
        let registration = self
            .storage
            .upsert_webhook(&id, session_id, url, events, &secret)
            .await?;
        info!(webhook_id = %registration.id, session_id, url, "webhook registered");
        Ok(registration)
    }

    /// Every registration of a session, active or not.
    pub async fn list(&self, session_id: &str) -> Result<Vec<WebhookRegistration>, SwitchboardError> {
        self.storage.list_webhooks(session_id, false).await
    }

    /// Stops deliveries to a registration.
    pub async fn deactivate(&self, webhook_id: &str) -> Result<(), SwitchboardError> {
        self.get(webhook_id).await?;
        self.storage.set_webhook_active(webhook_id, false).await?;
        info!(webhook_id, "webhook deactivated");
        Ok(())
    }

    /// Delivers a `webhook.test` event to one registration, active or not.
    pub async fn send_test(&self, webhook_id: &str) -> Result<WebhookDelivery, SwitchboardError> {
        let registration = self.get(webhook_id).await?;
        let tenant_id = self
            .storage
            .get_session(&registration.session_id)
            .await?
            .map(|s| s.session_id)
            .unwrap_or_else(|| registration.session_id.clone());
        let event = WebhookEvent::new(event::WEBHOOK_TEST, &tenant_id)
            .field("webhookId", registration.id.clone())
            .field("url", registration.url.clone());
        Ok(self.dispatch(&registration, &event).await)
    }

    /// Fans an event out to every active registration of a session that
    /// subscribes to it.
    pub async fn dispatch_event(&self, session_id: &str, event: &WebhookEvent) -> Vec<WebhookDelivery> {
        let registrations = match self.storage.list_webhooks(session_id, true).await {
            Ok(registrations) => registrations,
            Err(e) => {
                warn!(session_id, event = %event.event, error = %e, "failed to load webhooks");
                return Vec::new();
            }
        };
        let targets = registrations
            .iter()
            .filter(|r| event::subscribes(&r.events, &event.event));
        join_all(targets.map(|r| self.dispatch(r, event))).await
    }

    /// Posts one signed event and records the outcome.
    pub async fn dispatch(
        &self,
        registration: &WebhookRegistration,
        event: &WebhookEvent,
    ) -> WebhookDelivery {
        let delivery = self.post(registration, event).await;
        if let Err(e) = self
            .storage
            .record_webhook_result(&registration.id, delivery.success)
            .await
        {
            warn!(webhook_id = %registration.id, error = %e, "failed to record webhook result");
        }
        delivery
    }

    async fn post(&self, registration: &WebhookRegistration, event: &WebhookEvent) -> WebhookDelivery {
        let mut delivery = WebhookDelivery {
            webhook_id: registration.id.clone(),
            success: false,
            status: None,
            error: None,
        };
        let body = match serde_json::to_vec(event) {
            Ok(body) => body,
            Err(e) => {
                delivery.error = Some(format!("failed to serialize event: {e}"));
                return delivery;
            }
        };
        let signature = signature::sign(&registration.secret, &body);

        let result = self
            .client
            .post(&registration.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(HEADER_SECRET, &registration.secret)
            .header(HEADER_SIGNATURE, signature)
            .header(HEADER_EVENT, &event.event)
            .body(body)
            .send()
            .await;

        match result {
            Ok(response) if response.status().is_success() => {
                debug!(webhook_id = %registration.id, event = %event.event, "webhook delivered");
                delivery.success = true;
                delivery.status = Some(response.status().as_u16());
            }
            Ok(response) => {
                let status = response.status();
                let text = response.text().await.unwrap_or_default();
                let preview: String = text.chars().take(self.preview_chars).collect();
                warn!(
                    webhook_id = %registration.id,
                    event = %event.event,
                    status = status.as_u16(),
                    response = %preview,
                    "webhook delivery rejected"
                );
                delivery.status = Some(status.as_u16());
                delivery.error = Some(format!("endpoint returned {status}"));
            }
            Err(e) => {
                warn!(
                    webhook_id = %registration.id,
                    event = %event.event,
                    error = %e,
                    "webhook delivery failed"
                );
                delivery.error = Some(e.to_string());
            }
        }
        delivery
    }

    async fn get(&self, webhook_id: &str) -> Result<WebhookRegistration, SwitchboardError> {
        self.storage
            .get_webhook(webhook_id)
            .await?
            .ok_or_else(|| SwitchboardError::webhook(format!("webhook not found: {webhook_id}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use switchboard_config::model::StorageConfig;
    use switchboard_core::types::{AutoReplyConfig, SessionRecord, SessionStatus};
    use switchboard_storage::SqliteStorage;
    use tempfile::TempDir;
    use wiremock::matchers::{header, header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    async fn setup() -> (WebhookDispatcher, Arc<dyn StorageAdapter>, TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let storage = SqliteStorage::new(StorageConfig {
            database_path: dir.path().join("hooks.db").to_str().unwrap().to_string(),
            wal_mode: true,
        });
        storage.initialize().await.unwrap();
        storage
            .create_session(&SessionRecord {
                id: "d-1".to_string(),
                session_id: "tenant-a".to_string(),
                name: None,
                status: SessionStatus::Connected,
                phone_number: None,
                qr_code: None,
                auto_reply: AutoReplyConfig::default(),
                is_active: true,
                last_connected_at: None,
                created_at: "2026-01-01T00:00:00.000Z".to_string(),
                updated_at: "2026-01-01T00:00:00.000Z".to_string(),
            })
            .await
            .unwrap();
        let storage: Arc<dyn StorageAdapter> = Arc::new(storage);
        let config = WebhookConfig {
            timeout_secs: 2,
            ..WebhookConfig::default()
        };
        let dispatcher = WebhookDispatcher::new(&config, storage.clone()).unwrap();
        (dispatcher, storage, dir)
    }

    fn events(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn register_twice_reuses_secret() {
        let (dispatcher, _storage, _dir) = setup().await;
        let url = "https://example.com/hook";

        let first = dispatcher
            .register("d-1", url, &events(&[event::MESSAGE_RECEIVED]))
            .await
            .unwrap();
        let second = dispatcher.register("d-1", url, &events(&["*"])).await.unwrap();

        assert_eq!(first.secret.len(), 64);
        assert_eq!(first.secret, second.secret);
        assert_eq!(first.id, second.id);
        assert_eq!(second.events, vec!["*"]);
        assert_eq!(dispatcher.list("d-1").await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn register_rejects_bad_urls() {
        let (dispatcher, _storage, _dir) = setup().await;
        let ev = events(&["*"]);
        assert!(dispatcher.register("d-1", "not a url", &ev).await.is_err());
        assert!(dispatcher.register("d-1", "ftp://example.com/x", &ev).await.is_err());
        assert!(dispatcher.register("d-1", "https://example.com", &[]).await.is_err());
    }

    #[tokio::test]
    async fn delivery_is_signed_over_exact_body() {
        let (dispatcher, _storage, _dir) = setup().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header("X-Webhook-Event", "message.received"))
            .and(header_exists("X-Webhook-Signature"))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        let registration = dispatcher
            .register("d-1", &format!("{}/hook", server.uri()), &events(&[event::MESSAGE_RECEIVED]))
            .await
            .unwrap();
        let event = WebhookEvent::new(event::MESSAGE_RECEIVED, "tenant-a").field("text", "hello");
        let deliveries = dispatcher.dispatch_event("d-1", &event).await;
        assert_eq!(deliveries.len(), 1);
        assert!(deliveries[0].success);

        let requests = server.received_requests().await.unwrap();
        let request = &requests[0];
        let sig = request.headers.get("X-Webhook-Signature").unwrap().to_str().unwrap();
        assert_eq!(sig, signature::sign(&registration.secret, &request.body));
        let secret = request.headers.get("X-Webhook-Secret").unwrap().to_str().unwrap();
        assert_eq!(secret, registration.secret);
        let body: serde_json::Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["sessionId"], "tenant-a");
        assert_eq!(body["text"], "hello");
    }

    #[tokio::test]
    async fn unsubscribed_and_inactive_registrations_are_skipped() {
        let (dispatcher, _storage, _dir) = setup().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        dispatcher
            .register("d-1", &format!("{}/a", server.uri()), &events(&[event::SESSION_CONNECTED]))
            .await
            .unwrap();
        let disabled = dispatcher
            .register("d-1", &format!("{}/b", server.uri()), &events(&["all"]))
            .await
            .unwrap();
        dispatcher.deactivate(&disabled.id).await.unwrap();

        let event = WebhookEvent::new(event::MESSAGE_RECEIVED, "tenant-a");
        assert!(dispatcher.dispatch_event("d-1", &event).await.is_empty());
    }

    #[tokio::test]
    async fn failures_are_counted_and_success_resets() {
        let (dispatcher, storage, _dir) = setup().await;
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(204))
            .mount(&server)
            .await;

        let registration = dispatcher
            .register("d-1", &server.uri(), &events(&["*"]))
            .await
            .unwrap();

        let first = dispatcher.send_test(&registration.id).await.unwrap();
        assert!(!first.success);
        assert_eq!(first.status, Some(500));
        dispatcher.send_test(&registration.id).await.unwrap();
        let stored = storage.get_webhook(&registration.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 2);

        let third = dispatcher.send_test(&registration.id).await.unwrap();
        assert!(third.success);
        let stored = storage.get_webhook(&registration.id).await.unwrap().unwrap();
        assert_eq!(stored.failed_attempts, 0);
        assert!(stored.last_success_at.is_some());
    }

    #[tokio::test]
    async fn transport_failure_is_reported_not_raised() {
        let (dispatcher, _storage, _dir) = setup().await;
        // Nothing listens on port 9 of localhost.
        let registration = dispatcher
            .register("d-1", "http://127.0.0.1:9/hook", &events(&["*"]))
            .await
            .unwrap();
        let delivery = dispatcher.send_test(&registration.id).await.unwrap();
        assert!(!delivery.success);
        assert!(delivery.status.is_none());
        assert!(delivery.error.is_some());
    }

    #[tokio::test]
    async fn send_test_unknown_id_errors() {
        let (dispatcher, _storage, _dir) = setup().await;
        let err = dispatcher.send_test("missing").await.unwrap_err();
        assert_eq!(err.code(), "WEBHOOK_ERROR");
    }
}
