//! Frame transport beneath the client: a [`Connector`] produces a
//! [`Connection`], a pair of frame channels backed by a live socket.

use std::time::Duration;

use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use tokio::sync::mpsc;
use tokio::time::timeout;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::{HeaderValue, StatusCode, header::AUTHORIZATION};
use tokio_tungstenite::tungstenite::{self, Message};
use tracing::{debug, info, warn};

use notifyhub_core::error::AppError;
use notifyhub_core::result::AppResult;
use notifyhub_entity::message::{ClientFrame, ServerFrame};

use crate::config::ClientConfig;

/// An established connection, seen as two frame channels.
///
/// Dropping `outgoing` closes the socket. `incoming` yields `None` once the
/// socket is gone.
#[derive(Debug)]
pub struct Connection {
    /// Frames to send.
    pub outgoing: mpsc::Sender<ClientFrame>,
    /// Frames received.
    pub incoming: mpsc::Receiver<ServerFrame>,
}

/// Opens connections to the server.
#[async_trait]
pub trait Connector: Send + Sync + std::fmt::Debug + 'static {
    /// Perform the handshake and return the live connection.
    async fn connect(&self) -> AppResult<Connection>;
}

/// Characters escaped in the query token: everything but RFC 3986 unreserved.
const QUERY_VALUE: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'.')
    .remove(b'_')
    .remove(b'~');

/// WebSocket connector using `tokio-tungstenite`.
#[derive(Debug, Clone)]
pub struct WsConnector {
    url: String,
    token: Option<String>,
    connect_timeout: Duration,
    buffer: usize,
}

impl WsConnector {
    /// Build a connector from the client configuration.
    pub fn new(config: &ClientConfig) -> Self {
        Self {
            url: config.url.clone(),
            token: config.token.clone(),
            connect_timeout: config.connect_timeout(),
            buffer: config.channel_buffer_size.max(1),
        }
    }

    /// Endpoint with the credential in the query string, for servers that
    /// cannot read handshake headers.
    fn endpoint(&self) -> String {
        match &self.token {
            Some(token) => {
                let separator = if self.url.contains('?') { '&' } else { '?' };
                let token = utf8_percent_encode(token, QUERY_VALUE);
                format!("{}{}token={}", self.url, separator, token)
            }
            None => self.url.clone(),
        }
    }
}

#[async_trait]
impl Connector for WsConnector {
    async fn connect(&self) -> AppResult<Connection> {
        let mut request = self
            .endpoint()
            .into_client_request()
            .map_err(|e| AppError::configuration(format!("Invalid server URL: {e}")))?;
        if let Some(token) = &self.token {
            let value = HeaderValue::from_str(&format!("Bearer {token}"))
                .map_err(|e| AppError::configuration(format!("Invalid token: {e}")))?;
            request.headers_mut().insert(AUTHORIZATION, value);
        }

        debug!(url = %self.url, "Connecting");
        let (socket, _response) = timeout(self.connect_timeout, connect_async(request))
            .await
            .map_err(|_| AppError::connection("Connection timeout"))?
            .map_err(handshake_error)?;
        info!(url = %self.url, "Connected");

        let (mut sink, mut stream) = socket.split();
        let (out_tx, mut out_rx) = mpsc::channel::<ClientFrame>(self.buffer);
        let (in_tx, in_rx) = mpsc::channel::<ServerFrame>(self.buffer);

        tokio::spawn(async move {
            while let Some(frame) = out_rx.recv().await {
                let text = match serde_json::to_string(&frame) {
                    Ok(text) => text,
                    Err(e) => {
                        warn!(error = %e, "Failed to serialize frame");
                        continue;
                    }
                };
                if let Err(e) = sink.send(Message::Text(text.into())).await {
                    debug!(error = %e, "Socket write failed");
                    break;
                }
            }
            let _ = sink.close().await;
        });

        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = in_tx.closed() => break,
                    message = stream.next() => match message {
                        Some(Ok(Message::Text(text))) => {
                            match serde_json::from_str::<ServerFrame>(text.as_str()) {
                                Ok(frame) => {
                                    if in_tx.send(frame).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => warn!(error = %e, "Unparseable server frame"),
                            }
                        }
                        Some(Ok(Message::Close(frame))) => {
                            debug!(?frame, "Server closed connection");
                            break;
                        }
                        Some(Ok(_)) => {}
                        Some(Err(e)) => {
                            debug!(error = %e, "Socket read failed");
                            break;
                        }
                        None => break,
                    },
                }
            }
        });

        Ok(Connection {
            outgoing: out_tx,
            incoming: in_rx,
        })
    }
}

fn handshake_error(error: tungstenite::Error) -> AppError {
    match &error {
        tungstenite::Error::Http(response) => match response.status() {
            StatusCode::UNAUTHORIZED => AppError::authentication("Server rejected credential"),
            StatusCode::SERVICE_UNAVAILABLE => {
                AppError::capacity_exceeded("Server at connection capacity")
            }
            status => AppError::connection(format!("Handshake rejected: {status}")),
        },
        _ => AppError::connection(format!("Connection failed: {error}")),
    }
}
