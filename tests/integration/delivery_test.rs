//! End-to-end delivery through a live server and client transport.

mod helpers;

use std::sync::Arc;
use std::time::Duration;

use notifyhub_core::config::AppConfig;
use notifyhub_core::retry::RetryPolicy;
use notifyhub_core::types::UserId;
use notifyhub_entity::notification::{
    DeliveryMethod, DeliveryState, NotificationStatus, Priority,
};
use serde_json::Value;
use tokio::sync::mpsc;

use helpers::{RecordingEmailSender, TestServer, request};

#[tokio::test]
async fn test_connected_client_receives_and_acks() {
    let server = TestServer::start(AppConfig::default()).await;
    let user_id = UserId::new();

    let client = server.client(user_id);
    let (seen_tx, mut seen_rx) = mpsc::unbounded_channel::<Value>();
    client.subscribe("notification", move |payload| {
        let _ = seen_tx.send(payload.clone());
    });
    client.connect().await.unwrap();
    server.wait_for_connections(1).await;

    let outcome = server
        .engine
        .orchestrator
        .create_and_dispatch(request(
            user_id,
            vec![DeliveryMethod::Websocket],
            Priority::High,
        ))
        .await
        .unwrap();

    assert_eq!(outcome.attempts.len(), 1);
    assert!(outcome.attempts[0].success());
    assert_eq!(outcome.notification.delivery_state, DeliveryState::Delivered);
    assert_eq!(outcome.notification.status, NotificationStatus::Unread);

    let payload = seen_rx.recv().await.unwrap();
    assert_eq!(payload["id"], outcome.notification.id.to_string());
    assert_eq!(payload["title"], "Task assigned");

    let metrics = server.engine.metrics.get(&outcome.notification.id).unwrap();
    assert_eq!(metrics.channel(DeliveryMethod::Websocket).successes, 1);

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn test_every_socket_of_a_user_is_attempted() {
    let server = TestServer::start(AppConfig::default()).await;
    let user_id = UserId::new();

    let first = server.client(user_id);
    let second = server.client(user_id);
    first.connect().await.unwrap();
    second.connect().await.unwrap();
    server.wait_for_connections(2).await;
    assert_eq!(server.engine.registry.sockets_of(&user_id).len(), 2);

    let outcome = server
        .engine
        .orchestrator
        .create_and_dispatch(request(
            user_id,
            vec![DeliveryMethod::Websocket],
            Priority::Medium,
        ))
        .await
        .unwrap();

    assert_eq!(outcome.attempts.len(), 2);
    assert!(outcome.attempts.iter().all(|a| a.success()));

    first.disconnect().await;
    second.disconnect().await;
    server.wait_for_connections(0).await;
    server.stop().await;
}

#[tokio::test]
async fn test_offline_user_gets_email_only() {
    let mut config = AppConfig::default();
    config.delivery.email.retry = RetryPolicy::immediate(3);
    let email = Arc::new(RecordingEmailSender::failing(1));
    let server = TestServer::start_with_email(config, email.clone()).await;
    let user_id = UserId::new();

    let outcome = server
        .engine
        .orchestrator
        .create_and_dispatch(request(
            user_id,
            vec![DeliveryMethod::Websocket, DeliveryMethod::Email],
            Priority::Low,
        ))
        .await
        .unwrap();

    assert_eq!(outcome.attempts.len(), 1);
    assert_eq!(outcome.attempts[0].channel(), DeliveryMethod::Email);
    assert!(outcome.attempts[0].success());
    assert_eq!(outcome.notification.status, NotificationStatus::Unread);

    let sent = email.sent.lock().await;
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].to, user_id);
    drop(sent);

    server.stop().await;
}

#[tokio::test]
async fn test_client_emits_are_acknowledged_and_published() {
    let server = TestServer::start(AppConfig::default()).await;
    let user_id = UserId::new();
    let mut events = server.engine.registry.subscribe_events();

    let client = server.client(user_id);
    client.connect().await.unwrap();
    client
        .emit("typing", serde_json::json!({ "conversation": "c-1" }))
        .await
        .unwrap();

    let event = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(event.user_id, user_id);
    assert_eq!(event.event, "typing");
    assert_eq!(event.data["conversation"], "c-1");

    client.disconnect().await;
    server.stop().await;
}
