//! WebSocket client for the dashboard event stream.
//!
//! One [`WsClient`] is one physical connection. It runs three pumps (read,
//! write, ping) and reports inbound frames and closure on the transport event
//! channel.

use std::time::Duration;

use futures_util::StreamExt;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use creatorguard_protocol::constants::WS_MAX_MESSAGE_SIZE;

use crate::transport::{Link, TransportEvent};
use crate::types::HeartbeatConfig;

/// Errors from opening a WebSocket connection.
#[derive(Debug, thiserror::Error)]
pub enum WsError {
    #[error("WebSocket error: {0}")]
    Ws(#[from] tungstenite::Error),

    #[error("handshake rejected with HTTP {0}")]
    Unauthorized(u16),

    #[error("handshake timed out after {0:?}")]
    HandshakeTimeout(Duration),

    #[error("connection closed")]
    Closed,
}

impl WsError {
    /// Splits out credential rejections so they aren't retried.
    fn from_handshake(err: tungstenite::Error) -> Self {
        if let tungstenite::Error::Http(response) = &err {
            let status = response.status().as_u16();
            if status == 401 || status == 403 {
                return Self::Unauthorized(status);
            }
        }
        Self::Ws(err)
    }
}

/// A live WebSocket connection.
pub struct WsClient {
    cancel: CancellationToken,
    _read_handle: JoinHandle<()>,
    _write_handle: JoinHandle<()>,
    _ping_handle: JoinHandle<()>,
}

impl WsClient {
    /// Connects and starts the pumps.
    ///
    /// `Opened` is sent on `events` before any pump starts, so it always
    /// precedes the connection's frames and its `Closed`.
    pub async fn connect(
        url: &str,
        generation: u64,
        heartbeat: &HeartbeatConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Self, WsError> {
        let mut ws_config = tungstenite::protocol::WebSocketConfig::default();
        ws_config.max_message_size = Some(WS_MAX_MESSAGE_SIZE);
        ws_config.max_frame_size = Some(WS_MAX_MESSAGE_SIZE);
        let handshake = tokio_tungstenite::connect_async_with_config(url, Some(ws_config), false);
        let (ws_stream, _) = tokio::time::timeout(heartbeat.handshake_timeout, handshake)
            .await
            .map_err(|_| WsError::HandshakeTimeout(heartbeat.handshake_timeout))?
            .map_err(WsError::from_handshake)?;
        let (write, read) = ws_stream.split();

        let (write_tx, write_rx) = mpsc::channel::<tungstenite::Message>(256);
        let cancel = CancellationToken::new();

        events
            .send(TransportEvent::Opened {
                generation,
                link: Link::new(write_tx.clone(), cancel.clone()),
            })
            .map_err(|_| WsError::Closed)?;
        debug!(generation, "websocket open");

        let write_handle = {
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::write::write_pump(write, write_rx, cancel))
        };

        let read_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::read::read_pump(
                read,
                generation,
                heartbeat.timeout,
                events,
                write_tx,
                cancel,
            ))
        };

        let ping_handle = {
            let write_tx = write_tx.clone();
            let cancel = cancel.clone();
            tokio::spawn(crate::pumps::ping::ping_pump(
                write_tx,
                heartbeat.interval,
                cancel,
            ))
        };

        Ok(Self {
            cancel,
            _read_handle: read_handle,
            _write_handle: write_handle,
            _ping_handle: ping_handle,
        })
    }

    /// Resolves once the connection has been torn down.
    pub async fn closed(&self) {
        self.cancel.cancelled().await;
    }
}

impl Drop for WsClient {
    fn drop(&mut self) {
        self.cancel.cancel();
        self._read_handle.abort();
        self._ping_handle.abort();
        // The write pump is left to finish so its close frame goes out.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_error_display() {
        assert_eq!(WsError::Closed.to_string(), "connection closed");
        assert_eq!(
            WsError::Unauthorized(401).to_string(),
            "handshake rejected with HTTP 401"
        );
        assert_eq!(
            WsError::HandshakeTimeout(Duration::from_secs(10)).to_string(),
            "handshake timed out after 10s"
        );
    }

    #[tokio::test]
    async fn connect_to_closed_port_fails() {
        let (events, mut rx) = mpsc::unbounded_channel();
        let result = WsClient::connect(
            "ws://127.0.0.1:1/ws",
            1,
            &HeartbeatConfig::default(),
            events,
        )
        .await;
        assert!(matches!(result, Err(WsError::Ws(_))));
        // No Opened event for a failed handshake.
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_upgrade_times_out() {
        // Accepts TCP into the backlog but never answers the upgrade.
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}/ws", listener.local_addr().unwrap());
        let heartbeat = HeartbeatConfig {
            handshake_timeout: Duration::from_secs(5),
            ..HeartbeatConfig::default()
        };

        let (events, mut rx) = mpsc::unbounded_channel();
        let result = WsClient::connect(&url, 1, &heartbeat, events).await;

        assert!(matches!(
            result,
            Err(WsError::HandshakeTimeout(d)) if d == Duration::from_secs(5)
        ));
        assert!(rx.try_recv().is_err());
        drop(listener);
    }
}
