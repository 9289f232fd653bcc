// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! End-to-end flows across tenants: lifecycle, webhooks, auto-reply and the
//! outbound queue.

use std::time::Duration;

use serde_json::Value;
use switchboard_core::types::{SendStatus, SessionStatus};
use switchboard_test_utils::{TestHarness, inbound};
use switchboard_webhook::signature;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, ResponseTemplate};

async fn hook_server(route: &str) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path(route))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;
    server
}

fn events(requests: &[Request]) -> Vec<String> {
    requests
        .iter()
        .map(|r| {
            let body: Value = serde_json::from_slice(&r.body).unwrap();
            body["event"].as_str().unwrap().to_string()
        })
        .collect()
}

#[tokio::test]
async fn tenant_lifecycle_is_signed_and_isolated() {
    let server_a = hook_server("/a").await;
    let server_b = hook_server("/b").await;
    let harness = TestHarness::new().await.unwrap();

    let a = harness.manager.create_session("tenant-a", Some("Shop A")).await.unwrap();
    let b = harness.manager.create_session("tenant-b", Some("Shop B")).await.unwrap();
    let hook_a = harness
        .manager
        .webhooks()
        .register(&a.id, &format!("{}/a", server_a.uri()), &["*".to_string()])
        .await
        .unwrap();
    harness
        .manager
        .webhooks()
        .register(
            &b.id,
            &format!("{}/b", server_b.uri()),
            &["message.received".to_string()],
        )
        .await
        .unwrap();

    let conn_a = harness.online("tenant-a", "4915111111").await.unwrap();
    harness.online("tenant-b", "4915122222").await.unwrap();
    conn_a.receive(inbound("4915199999@s.whatsapp.net", "hello a")).await;
    harness.manager.disconnect("tenant-a").await.unwrap();

    let server_ref = &server_a;
    assert!(
        harness
            .wait_until(|| async {
                server_ref
                    .received_requests()
                    .await
                    .is_some_and(|r| r.len() >= 3)
            })
            .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    let requests = server_a.received_requests().await.unwrap();
    let mut seen = events(&requests);
    seen.sort();
    assert_eq!(
        seen,
        ["message.received", "session.connected", "session.disconnected"]
    );
    for request in &requests {
        let header = request
            .headers
            .get("x-webhook-signature")
            .unwrap()
            .to_str()
            .unwrap();
        assert!(signature::verify(&hook_a.secret, &request.body, header));
        let body: Value = serde_json::from_slice(&request.body).unwrap();
        assert_eq!(body["sessionId"], "tenant-a");
    }

    // tenant-b only subscribed to messages and received none.
    assert!(server_b.received_requests().await.unwrap().is_empty());

    let status_a = harness.manager.status("tenant-a").await.unwrap();
    assert!(!status_a.connected);
    let status_b = harness.manager.status("tenant-b").await.unwrap();
    assert!(status_b.connected);
    assert_eq!(status_b.status, Some(SessionStatus::Connected));
}

#[tokio::test]
async fn auto_reply_and_outbound_share_one_connection() {
    let harness = TestHarness::new().await.unwrap();
    harness.manager.create_session("tenant-a", None).await.unwrap();
    harness
        .manager
        .set_auto_reply("tenant-a", true, Some("We are closed today".to_string()))
        .await
        .unwrap();

    let queued = harness
        .manager
        .send_text("tenant-a", "491517777777", "your order shipped")
        .await
        .unwrap();
    assert_eq!(queued.status, SendStatus::Queued);

    let connection = harness.online("tenant-a", "4915111111").await.unwrap();
    connection
        .receive(inbound("4915188888@s.whatsapp.net", "are you open?"))
        .await;

    let handle = connection.handle.clone();
    assert!(harness.wait_until(|| async { handle.sent_count() == 2 }).await);
    let sent = handle.sent();
    let reply = sent
        .iter()
        .find(|m| m.to == "4915188888@s.whatsapp.net")
        .unwrap();
    assert_eq!(reply.text(), Some("We are closed today"));
    let flushed = sent
        .iter()
        .find(|m| m.to == "491517777777@s.whatsapp.net")
        .unwrap();
    assert_eq!(flushed.text(), Some("your order shipped"));

    let live = harness
        .manager
        .send_text("tenant-a", "491517777777", "tracking: 123")
        .await
        .unwrap();
    assert_eq!(live.status, SendStatus::Sent);
    assert!(live.delivery_id.is_some());
    assert_eq!(handle.sent_count(), 3);
}

#[tokio::test]
async fn deleted_tenant_cannot_be_recreated_or_resumed() {
    let harness = TestHarness::new().await.unwrap();
    harness.online("tenant-a", "4915111111").await.unwrap();
    harness.manager.delete_session("tenant-a").await.unwrap();

    let err = harness
        .manager
        .create_session("tenant-a", None)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "SESSION_INACTIVE");
    assert_eq!(harness.manager.resume().await.unwrap(), 0);
    assert!(harness.manager.list_sessions(true).await.unwrap().is_empty());
    assert_eq!(harness.manager.list_sessions(false).await.unwrap().len(), 1);
}
