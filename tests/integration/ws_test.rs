//! Integration tests for the WebSocket handshake and connection lifecycle.

mod helpers;

use std::time::Duration;

use notifyhub_client::{ClientConfig, ClientTransport, TransportState};
use notifyhub_core::config::AppConfig;
use notifyhub_core::error::ErrorKind;
use notifyhub_core::retry::RetryPolicy;
use notifyhub_core::types::UserId;

use helpers::TestServer;

async fn wait_for_state(client: &ClientTransport, wanted: TransportState) {
    let mut states = client.state_changes();
    tokio::time::timeout(Duration::from_secs(5), states.wait_for(|s| *s == wanted))
        .await
        .unwrap_or_else(|_| panic!("client never reached {wanted}"))
        .unwrap();
}

#[tokio::test]
async fn test_invalid_credential_is_rejected() {
    let server = TestServer::start(AppConfig::default()).await;

    let config = ClientConfig::new(server.ws_url()).with_token("not-a-jwt");
    let client = server.client_with(config);
    let err = client.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::Authentication);
    assert_eq!(client.state(), TransportState::Error);
    assert_eq!(server.engine.registry.total_connections(), 0);

    server.stop().await;
}

#[tokio::test]
async fn test_capacity_is_enforced_at_handshake() {
    let mut config = AppConfig::default();
    config.realtime.max_connections = 1;
    let server = TestServer::start(config).await;

    let first = server.client(UserId::new());
    first.connect().await.unwrap();

    let second = server.client(UserId::new());
    let err = second.connect().await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::CapacityExceeded);
    assert_eq!(server.engine.registry.total_connections(), 1);
    assert_eq!(server.engine.snapshot().counters.connections_rejected, 1);

    first.disconnect().await;
    server.wait_for_connections(0).await;
    server.stop().await;
}

#[tokio::test]
async fn test_silent_client_is_evicted() {
    let mut config = AppConfig::default();
    config.realtime.ping_interval_ms = 200;
    let server = TestServer::start(config).await;

    let mut client_config = server.client_config(UserId::new());
    client_config.heartbeat_interval_ms = 60_000;
    client_config.max_reconnect_attempts = 0;
    let client = server.client_with(client_config);
    client.connect().await.unwrap();
    server.wait_for_connections(1).await;

    wait_for_state(&client, TransportState::Error).await;
    assert_eq!(server.engine.registry.total_connections(), 0);
    assert!(server.engine.snapshot().counters.stale_evicted >= 1);

    server.stop().await;
}

#[tokio::test]
async fn test_heartbeats_keep_connection_alive() {
    let mut config = AppConfig::default();
    config.realtime.ping_interval_ms = 200;
    let server = TestServer::start(config).await;

    let mut client_config = server.client_config(UserId::new());
    client_config.heartbeat_interval_ms = 50;
    let client = server.client_with(client_config);
    client.connect().await.unwrap();

    tokio::time::sleep(Duration::from_millis(1_000)).await;
    assert!(client.is_connected());
    assert_eq!(server.engine.registry.total_connections(), 1);
    assert_eq!(server.engine.snapshot().counters.stale_evicted, 0);

    client.disconnect().await;
    server.wait_for_connections(0).await;
    server.stop().await;
}

#[tokio::test]
async fn test_client_reconnects_after_server_side_close() {
    let server = TestServer::start(AppConfig::default()).await;
    let user_id = UserId::new();

    let mut client_config = server.client_config(user_id);
    client_config.reconnect_backoff = RetryPolicy::new(1, 50, 200, 0);
    let client = server.client_with(client_config);
    client.connect().await.unwrap();
    server.wait_for_connections(1).await;
    let original = server.engine.registry.sockets_of(&user_id);

    server.engine.registry.on_disconnect(&original[0]);
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let sockets = server.engine.registry.sockets_of(&user_id);
            if sockets.len() == 1 && sockets[0] != original[0] {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
    wait_for_state(&client, TransportState::Connected).await;

    client.disconnect().await;
    server.stop().await;
}

#[tokio::test]
async fn test_shutdown_closes_client_connections() {
    let server = TestServer::start(AppConfig::default()).await;
    let mut client_config = server.client_config(UserId::new());
    client_config.max_reconnect_attempts = 0;
    let client = server.client_with(client_config);
    client.connect().await.unwrap();

    server.engine.shutdown().await;
    wait_for_state(&client, TransportState::Error).await;
    assert_eq!(server.engine.registry.total_connections(), 0);

    server.stop().await;
}
