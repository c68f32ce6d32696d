//! Transport seam between the manager and a physical connection.
//!
//! A [`Connector`] opens connections and reports everything that happens on
//! them as [`TransportEvent`]s on one channel. Each open request carries a
//! generation number; the manager ignores events from generations it has
//! already abandoned.

use std::fmt;

use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use creatorguard_protocol::constants::WS_CLOSE_UNAUTHORIZED;

use crate::error::ClientError;
use crate::types::HeartbeatConfig;
use crate::ws_client::WsClient;

/// Why a live connection ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CloseReason {
    /// The server sent a close frame.
    Remote { code: u16, reason: String },
    /// Nothing arrived within the heartbeat timeout.
    HeartbeatTimeout,
    /// The stream ended without a close frame.
    StreamEnded,
    /// Reading from the socket failed.
    ReadError(String),
}

impl CloseReason {
    /// Whether the server closed the session because the credential was
    /// rejected.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Remote { code, .. } if *code == WS_CLOSE_UNAUTHORIZED)
    }
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Remote { code, reason } if reason.is_empty() => {
                write!(f, "closed by server (code {code})")
            }
            Self::Remote { code, reason } => write!(f, "closed by server (code {code}): {reason}"),
            Self::HeartbeatTimeout => write!(f, "heartbeat timed out"),
            Self::StreamEnded => write!(f, "stream ended"),
            Self::ReadError(e) => write!(f, "read error: {e}"),
        }
    }
}

/// Everything a physical connection reports back to the manager.
#[derive(Debug)]
pub enum TransportEvent {
    /// Handshake completed; `link` is the outbound side.
    Opened { generation: u64, link: Link },
    /// A text frame arrived.
    Frame { generation: u64, text: String },
    /// A live connection ended on its own.
    Closed { generation: u64, reason: CloseReason },
    /// The connection could not be opened.
    Failed { generation: u64, error: ClientError },
}

impl TransportEvent {
    pub fn generation(&self) -> u64 {
        match self {
            Self::Opened { generation, .. }
            | Self::Frame { generation, .. }
            | Self::Closed { generation, .. }
            | Self::Failed { generation, .. } => *generation,
        }
    }
}

/// Outbound handle to one physical connection.
#[derive(Debug, Clone)]
pub struct Link {
    write_tx: mpsc::Sender<tungstenite::Message>,
    cancel: CancellationToken,
}

impl Link {
    pub fn new(write_tx: mpsc::Sender<tungstenite::Message>, cancel: CancellationToken) -> Self {
        Self { write_tx, cancel }
    }

    /// Queues a text frame without waiting. Fails if the connection is
    /// closing or the write queue is full.
    pub fn try_send_text(&self, text: String) -> bool {
        if self.cancel.is_cancelled() {
            return false;
        }
        self.write_tx
            .try_send(tungstenite::Message::Text(text.into()))
            .is_ok()
    }

    /// Tears the connection down. Pumps stop and a close frame is sent.
    pub fn close(&self) {
        self.cancel.cancel();
    }

    pub fn is_closed(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A request to open one physical connection.
#[derive(Debug, Clone)]
pub struct OpenRequest {
    pub generation: u64,
    /// Endpoint with the credential already bound.
    pub url: String,
    pub heartbeat: HeartbeatConfig,
}

/// Opens physical connections.
///
/// `open` must return immediately; the outcome is reported on `events`,
/// starting with exactly one `Opened` or `Failed` for the request's
/// generation.
pub trait Connector {
    fn open(&self, request: OpenRequest, events: mpsc::UnboundedSender<TransportEvent>);
}

/// Production connector backed by tokio-tungstenite.
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl Connector for WsConnector {
    fn open(&self, request: OpenRequest, events: mpsc::UnboundedSender<TransportEvent>) {
        tokio::spawn(async move {
            let generation = request.generation;
            match WsClient::connect(&request.url, generation, &request.heartbeat, events.clone())
                .await
            {
                // Keep the client (and its pump handles) alive until the
                // connection is torn down from either side.
                Ok(client) => client.closed().await,
                Err(e) => {
                    debug!(generation, error = %e, "connection attempt failed");
                    let _ = events.send(TransportEvent::Failed {
                        generation,
                        error: ClientError::from(&e),
                    });
                }
            }
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn close_reason_classification() {
        let unauthorized = CloseReason::Remote {
            code: WS_CLOSE_UNAUTHORIZED,
            reason: "token expired".into(),
        };
        assert!(unauthorized.is_unauthorized());
        assert!(!CloseReason::HeartbeatTimeout.is_unauthorized());
        assert!(
            !CloseReason::Remote {
                code: 1000,
                reason: String::new()
            }
            .is_unauthorized()
        );
    }

    #[test]
    fn close_reason_display() {
        assert_eq!(
            CloseReason::Remote {
                code: 1001,
                reason: String::new()
            }
            .to_string(),
            "closed by server (code 1001)"
        );
        assert_eq!(
            CloseReason::Remote {
                code: 4401,
                reason: "expired".into()
            }
            .to_string(),
            "closed by server (code 4401): expired"
        );
        assert_eq!(CloseReason::HeartbeatTimeout.to_string(), "heartbeat timed out");
    }

    #[test]
    fn link_send_fails_after_close() {
        let (tx, mut rx) = mpsc::channel(4);
        let link = Link::new(tx, CancellationToken::new());

        assert!(link.try_send_text("one".into()));
        assert!(matches!(rx.try_recv(), Ok(tungstenite::Message::Text(t)) if t.as_str() == "one"));

        link.close();
        assert!(link.is_closed());
        assert!(!link.try_send_text("two".into()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn link_send_fails_when_queue_full() {
        let (tx, _rx) = mpsc::channel(1);
        let link = Link::new(tx, CancellationToken::new());
        assert!(link.try_send_text("a".into()));
        assert!(!link.try_send_text("b".into()));
    }

    #[test]
    fn event_generation() {
        let event = TransportEvent::Frame {
            generation: 7,
            text: "{}".into(),
        };
        assert_eq!(event.generation(), 7);
    }
}
