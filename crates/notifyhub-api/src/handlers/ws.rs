//! WebSocket upgrade handler.

use std::sync::Arc;

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum_extra::TypedHeader;
use axum_extra::headers::Authorization;
use axum_extra::headers::authorization::Bearer;
use futures::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio::time;
use tracing::{debug, info, warn};

use notifyhub_entity::message::ServerFrame;
use notifyhub_realtime::connection::ConnectionHandle;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters of the upgrade request.
#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    /// Bearer credential, for clients that cannot set headers.
    pub token: Option<String>,
}

/// GET /ws?token={jwt}
///
/// The credential is verified and a registry slot reserved before the
/// upgrade, so rejected clients get a plain 401 or 503.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    bearer: Option<TypedHeader<Authorization<Bearer>>>,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Result<Response, ApiError> {
    let token = query
        .token
        .as_deref()
        .or_else(|| bearer.as_ref().map(|TypedHeader(auth)| auth.token()));
    let user_id = state.engine.registry.authenticate(token).await?;

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return Ok(rejection.into_response()),
    };

    let (handle, outbound) = state.engine.registry.admit(user_id)?;

    let registry = state.engine.registry.clone();
    let socket_id = handle.id;
    Ok(ws
        .on_failed_upgrade(move |e| {
            warn!(socket_id = %socket_id, error = %e, "WebSocket upgrade failed");
            registry.on_disconnect(&socket_id);
        })
        .on_upgrade(move |socket| handle_socket(state, handle, outbound, socket)))
}

/// Pumps frames between the socket and the registry until either side ends.
async fn handle_socket(
    state: AppState,
    handle: Arc<ConnectionHandle>,
    mut outbound: mpsc::Receiver<ServerFrame>,
    socket: WebSocket,
) {
    let (mut sink, mut stream) = socket.split();
    let registry = state.engine.registry.clone();
    let socket_id = handle.id;
    let read_timeout = registry.config().ping_timeout();

    info!(socket_id = %socket_id, user_id = %handle.user_id, "WebSocket connection established");

    let writer_handle = handle.clone();
    let writer = tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = writer_handle.closed() => break,
                frame = outbound.recv() => {
                    let Some(frame) = frame else { break };
                    let text = match serde_json::to_string(&frame) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!(error = %e, "Failed to serialize frame");
                            continue;
                        }
                    };
                    if sink.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
            }
        }
        let _ = sink.close().await;
    });

    loop {
        tokio::select! {
            _ = handle.closed() => break,
            message = time::timeout(read_timeout, stream.next()) => match message {
                Err(_) => {
                    debug!(socket_id = %socket_id, "WebSocket read timed out");
                    break;
                }
                Ok(Some(Ok(Message::Text(text)))) => {
                    registry.handle_inbound(&socket_id, text.as_str()).await;
                }
                Ok(Some(Ok(Message::Close(_)))) | Ok(None) => break,
                Ok(Some(Ok(_))) => {}
                Ok(Some(Err(e))) => {
                    debug!(socket_id = %socket_id, error = %e, "WebSocket read failed");
                    break;
                }
            },
        }
    }

    registry.on_disconnect(&socket_id);
    if let Err(e) = writer.await {
        debug!(socket_id = %socket_id, error = %e, "Writer task ended abnormally");
    }

    info!(socket_id = %socket_id, "WebSocket connection closed");
}
